//! Communication auto-linking: decides which emails and text threads belong
//! to a transaction and writes the junction rows.
//!
//! Flow: resolver -> date_range -> candidates -> address_filter (emails)
//! -> threads (texts) -> writer, driven by `autolink`.

pub mod address_filter;
pub mod autolink;
pub mod candidates;
pub mod date_range;
pub mod normalize;
pub mod resolver;
pub mod store;
pub mod threads;
pub mod writer;

pub use autolink::{
    AutoLinkOptions, AutoLinkResult, AutoLinker, CategoryResult, ContactLinkSummary,
    TransactionLinkResult,
};
pub use candidates::ContactMatch;
pub use date_range::{compute_transaction_date_range, DateRange};
pub use normalize::{content_contains_address, normalize_address, normalize_phone, phones_match};
pub use store::LinkStore;
pub use writer::LinkOutcome;
