//! Narrows email candidates to those that mention the property address.
//!
//! Filtering is a preference, not a gate: when no candidate mentions the
//! address, the unfiltered search is issued again and its results are used.
//! An earlier run that already linked a mentioning email counts as a match, so
//! emails the filter dropped then stay unlinked on reruns.
//! Text messages are never filtered; conversations rarely restate the address.

use std::collections::HashSet;

use crate::db::DbError;

use super::candidates::{find_email_candidates, find_linked_email_ids, EmailCandidate};
use super::date_range::DateRange;
use super::normalize::{content_contains_address, NormalizedAddress};
use super::resolver::ContactIdentifiers;
use super::store::LinkStore;

/// Ids per content query; keeps each query well under SQLite's bound-parameter limit.
pub const CONTENT_BATCH_SIZE: usize = 100;

/// How the email candidate set was arrived at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFilterOutcome {
    /// No parseable property address, or filtering switched off.
    NotApplied,
    /// At least one candidate, or an email already linked to the
    /// transaction, mentioned the address; only mentioning candidates were kept.
    Filtered,
    /// Nothing mentioned the address; the unfiltered re-query was used.
    FellBack,
}

#[derive(Debug, Clone)]
pub struct EmailSearch {
    pub candidates: Vec<EmailCandidate>,
    pub outcome: AddressFilterOutcome,
}

/// Ids from `ids` whose subject or body mentions `address`, in input order.
/// Content is fetched `batch_size` ids at a time.
pub fn filter_ids_by_address<S: LinkStore + ?Sized>(
    store: &S,
    ids: &[String],
    address: &NormalizedAddress,
    batch_size: usize,
) -> Result<Vec<String>, DbError> {
    let mut matching: HashSet<String> = HashSet::new();
    for batch in ids.chunks(batch_size.max(1)) {
        for content in store.get_email_contents(batch)? {
            let subject_hit = content
                .subject
                .as_deref()
                .is_some_and(|s| content_contains_address(s, address));
            let body_hit = !subject_hit
                && content
                    .body
                    .as_deref()
                    .is_some_and(|b| content_contains_address(b, address));
            if subject_hit || body_hit {
                matching.insert(content.id);
            }
        }
    }
    Ok(ids.iter().filter(|id| matching.contains(*id)).cloned().collect())
}

/// Email candidate search with optional address narrowing and fallback.
pub fn find_email_candidates_for_address<S: LinkStore + ?Sized>(
    store: &S,
    user_id: &str,
    contacts: &[ContactIdentifiers],
    transaction_id: &str,
    range: &DateRange,
    address: Option<&NormalizedAddress>,
    batch_size: usize,
) -> Result<EmailSearch, DbError> {
    let candidates = find_email_candidates(store, user_id, contacts, transaction_id, range)?;

    let Some(address) = address else {
        return Ok(EmailSearch {
            candidates,
            outcome: AddressFilterOutcome::NotApplied,
        });
    };

    let ids: Vec<String> = candidates.iter().map(|c| c.email_id.clone()).collect();
    let keep: HashSet<String> = filter_ids_by_address(store, &ids, address, batch_size)?
        .into_iter()
        .collect();

    if !keep.is_empty() {
        log::debug!(
            "Transaction {}: {} of {} email candidates mention '{}'",
            transaction_id,
            keep.len(),
            candidates.len(),
            address.full
        );
        let candidates = candidates
            .into_iter()
            .filter(|c| keep.contains(&c.email_id))
            .collect();
        return Ok(EmailSearch {
            candidates,
            outcome: AddressFilterOutcome::Filtered,
        });
    }

    let linked = find_linked_email_ids(store, user_id, contacts, transaction_id, range)?;
    if !filter_ids_by_address(store, &linked, address, batch_size)?.is_empty() {
        log::debug!(
            "Transaction {}: no new email candidate mentions '{}', but a linked email does; dropping {} candidate(s)",
            transaction_id,
            address.full,
            candidates.len()
        );
        return Ok(EmailSearch {
            candidates: Vec::new(),
            outcome: AddressFilterOutcome::Filtered,
        });
    }

    log::info!(
        "Transaction {}: no email candidate mentions '{}', re-running unfiltered search",
        transaction_id,
        address.full
    );
    let candidates = find_email_candidates(store, user_id, contacts, transaction_id, range)?;
    Ok(EmailSearch {
        candidates,
        outcome: AddressFilterOutcome::FellBack,
    })
}
