//! Error types for link operations
//!
//! Only whole-call failures surface here. Failures on a single email, thread
//! or contact are counted in the result shapes instead.

use thiserror::Error;

use crate::db::DbError;

#[derive(Debug, Error)]
pub enum AutoLinkError {
    #[error("Store error: {0}")]
    Store(#[from] DbError),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
}
