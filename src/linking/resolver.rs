//! Loads the inputs of a linking run: a contact's usable identifiers and a
//! transaction's owner, property address and audit window.

use chrono::Utc;

use crate::db::DbError;

use super::date_range::{compute_transaction_date_range_at, DateRange, RangePolicy, TransactionDates};
use super::normalize::{normalize_address, normalize_phone, NormalizedAddress};
use super::store::LinkStore;

/// A contact's identifiers after normalization and de-duplication.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactIdentifiers {
    pub contact_id: String,
    /// Lower-cased addresses, primary first.
    pub emails: Vec<String>,
    /// Canonical phones (`+<digits>`) or lower-cased handles.
    pub phones: Vec<String>,
}

impl ContactIdentifiers {
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty() && self.phones.is_empty()
    }
}

/// A transaction resolved for linking.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    pub id: String,
    pub user_id: String,
    /// Parsed property address; None when absent or unparseable.
    pub address: Option<NormalizedAddress>,
    pub range: DateRange,
}

/// Load a contact and normalize its identifiers. Ok(None) if it does not exist.
pub fn resolve_contact<S: LinkStore + ?Sized>(
    store: &S,
    contact_id: &str,
) -> Result<Option<ContactIdentifiers>, DbError> {
    let Some(contact) = store.get_contact(contact_id)? else {
        return Ok(None);
    };

    let mut emails: Vec<String> = Vec::new();
    for raw in &contact.emails {
        let email = raw.trim().to_lowercase();
        if email.contains('@') && !emails.contains(&email) {
            emails.push(email);
        }
    }

    let mut phones: Vec<String> = Vec::new();
    for raw in &contact.phones {
        match normalize_phone(raw) {
            Some(phone) if !phones.contains(&phone) => phones.push(phone),
            Some(_) => {}
            None => log::debug!("Contact {}: ignoring unusable phone '{}'", contact_id, raw),
        }
    }

    Ok(Some(ContactIdentifiers {
        contact_id: contact.id,
        emails,
        phones,
    }))
}

/// Load a transaction and derive its audit window. An explicit `range`
/// replaces the derived one. Ok(None) if the transaction does not exist.
pub fn resolve_transaction<S: LinkStore + ?Sized>(
    store: &S,
    transaction_id: &str,
    policy: RangePolicy,
    range: Option<DateRange>,
) -> Result<Option<TransactionContext>, DbError> {
    let Some(txn) = store.get_transaction(transaction_id)? else {
        return Ok(None);
    };

    let range = range.unwrap_or_else(|| {
        compute_transaction_date_range_at(
            TransactionDates {
                started_at: txn.started_at.as_deref(),
                created_at: Some(txn.created_at.as_str()),
                closed_at: txn.closed_at.as_deref(),
            },
            Utc::now(),
            policy,
        )
    });

    let address = txn.property_address.as_deref().and_then(normalize_address);
    if txn.property_address.is_some() && address.is_none() {
        log::debug!(
            "Transaction {}: property address is not parseable, content filter disabled",
            transaction_id
        );
    }

    Ok(Some(TransactionContext {
        id: txn.id,
        user_id: txn.user_id,
        address,
        range,
    }))
}
