//! Persists link decisions into the `communications` junction table.
//!
//! Every write is check-then-insert. A concurrent writer that wins the race
//! trips one of the partial unique indexes, which is read back as
//! `AlreadyLinked`, so retrying a link is always a no-op.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::db::{DbError, LinkSource, NewLink};

use super::store::LinkStore;

/// Confidence for an email matched on a header substring.
pub const EMAIL_LINK_CONFIDENCE: f64 = 0.85;
/// Confidence for a thread matched on a phone number.
pub const THREAD_LINK_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LinkOutcome {
    Linked { link_id: String },
    AlreadyLinked,
    /// The communication row no longer exists.
    NotFound,
}

/// Counts for one contact inside a [`LinkTally`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContactTally {
    pub linked: usize,
    pub already_linked: usize,
    pub errors: usize,
}

/// Running totals for one category of link writes.
#[derive(Debug, Clone, Default)]
pub struct LinkTally {
    pub linked: usize,
    pub already_linked: usize,
    /// Candidates that were not attempted (messages without a thread id).
    pub set_aside: usize,
    pub errors: Vec<String>,
    pub per_contact: BTreeMap<String, ContactTally>,
}

impl LinkTally {
    /// Fold one write result in. Store failures and vanished rows become
    /// error strings naming the item; nothing is propagated.
    pub fn record(
        &mut self,
        kind: &str,
        item_id: &str,
        contact_id: &str,
        transaction_id: &str,
        result: Result<LinkOutcome, DbError>,
    ) {
        let contact = self.per_contact.entry(contact_id.to_string()).or_default();
        match result {
            Ok(LinkOutcome::Linked { .. }) => {
                self.linked += 1;
                contact.linked += 1;
            }
            Ok(LinkOutcome::AlreadyLinked) => {
                self.already_linked += 1;
                contact.already_linked += 1;
            }
            Ok(LinkOutcome::NotFound) => {
                contact.errors += 1;
                self.errors.push(format!("{kind} {item_id}: not found"));
            }
            Err(e) => {
                log::warn!(
                    "Failed to link {} {} (contact {}) to transaction {}: {}",
                    kind,
                    item_id,
                    contact_id,
                    transaction_id,
                    e
                );
                contact.errors += 1;
                self.errors.push(format!("{kind} {item_id}: {e}"));
            }
        }
    }
}

/// Link one email to a transaction.
pub fn link_email_to_transaction<S: LinkStore + ?Sized>(
    store: &S,
    email_id: &str,
    transaction_id: &str,
) -> Result<LinkOutcome, DbError> {
    if store.is_email_linked(email_id, transaction_id)? {
        return Ok(LinkOutcome::AlreadyLinked);
    }

    let Some(user_id) = store.get_email_owner(email_id)? else {
        log::warn!(
            "Email {} not found while linking to transaction {}",
            email_id,
            transaction_id
        );
        return Ok(LinkOutcome::NotFound);
    };

    let link_id = uuid::Uuid::new_v4().to_string();
    let link = NewLink {
        id: &link_id,
        user_id: &user_id,
        transaction_id,
        email_id: Some(email_id),
        message_id: None,
        thread_id: None,
        source: LinkSource::Auto,
        confidence: EMAIL_LINK_CONFIDENCE,
    };
    match store.insert_link(&link) {
        Ok(()) => Ok(LinkOutcome::Linked { link_id }),
        Err(e) if e.is_unique_violation() => {
            log::debug!(
                "Email {} was linked to transaction {} concurrently",
                email_id,
                transaction_id
            );
            Ok(LinkOutcome::AlreadyLinked)
        }
        Err(e) => Err(e),
    }
}

/// Link a whole conversation thread to a transaction. `first_message_id` is
/// recorded on the junction row as the representative message.
pub fn link_thread_to_transaction<S: LinkStore + ?Sized>(
    store: &S,
    user_id: &str,
    thread_id: &str,
    first_message_id: &str,
    transaction_id: &str,
) -> Result<LinkOutcome, DbError> {
    if store.is_thread_linked(thread_id, transaction_id)? {
        return Ok(LinkOutcome::AlreadyLinked);
    }

    let link_id = uuid::Uuid::new_v4().to_string();
    let link = NewLink {
        id: &link_id,
        user_id,
        transaction_id,
        email_id: None,
        message_id: Some(first_message_id),
        thread_id: Some(thread_id),
        source: LinkSource::Auto,
        confidence: THREAD_LINK_CONFIDENCE,
    };
    match store.insert_link(&link) {
        Ok(()) => {}
        Err(e) if e.is_unique_violation() => {
            log::debug!(
                "Thread {} was linked to transaction {} concurrently",
                thread_id,
                transaction_id
            );
            return Ok(LinkOutcome::AlreadyLinked);
        }
        Err(e) => return Err(e),
    }

    // The junction row is authoritative; the direct reference only keeps the
    // message-level exclusion in step.
    match store.set_thread_transaction(user_id, thread_id, transaction_id) {
        Ok(n) => log::debug!(
            "Thread {}: stamped {} message(s) with transaction {}",
            thread_id,
            n,
            transaction_id
        ),
        Err(e) => log::warn!(
            "Thread {}: failed to stamp transaction {} on messages: {}",
            thread_id,
            transaction_id,
            e
        ),
    }

    Ok(LinkOutcome::Linked { link_id })
}
