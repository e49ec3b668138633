//! Collapses text-message candidates into conversation threads so each
//! conversation is linked once.

use super::candidates::{ContactMatch, TextCandidate};
use super::store::LinkStore;
use super::writer::{link_thread_to_transaction, LinkTally};

/// One conversation and the candidate messages that pointed at it.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadGroup {
    pub thread_id: String,
    /// Candidate message ids in first-seen order.
    pub message_ids: Vec<String>,
    /// Attribution of the first candidate in the thread.
    pub matched: ContactMatch,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadGrouping {
    pub threads: Vec<ThreadGroup>,
    /// Messages with no thread id yet; they wait for ingestion to backfill one.
    pub unthreaded: Vec<String>,
}

/// Group candidates by thread id, keeping the order threads were first seen.
pub fn group_by_thread(candidates: Vec<TextCandidate>) -> ThreadGrouping {
    let mut grouping = ThreadGrouping::default();
    for candidate in candidates {
        let Some(thread_id) = candidate.thread_id.filter(|t| !t.is_empty()) else {
            grouping.unthreaded.push(candidate.message_id);
            continue;
        };
        match grouping.threads.iter_mut().find(|g| g.thread_id == thread_id) {
            Some(group) => {
                if !group.message_ids.contains(&candidate.message_id) {
                    group.message_ids.push(candidate.message_id);
                }
            }
            None => grouping.threads.push(ThreadGroup {
                thread_id,
                message_ids: vec![candidate.message_id],
                matched: candidate.matched,
            }),
        }
    }
    grouping
}

/// Link every thread in `grouping` to the transaction, one write per thread.
pub fn link_thread_groups<S: LinkStore + ?Sized>(
    store: &S,
    user_id: &str,
    transaction_id: &str,
    grouping: &ThreadGrouping,
) -> LinkTally {
    let mut tally = LinkTally {
        set_aside: grouping.unthreaded.len(),
        ..Default::default()
    };
    if !grouping.unthreaded.is_empty() {
        log::debug!(
            "Transaction {}: setting aside {} message(s) without a thread id",
            transaction_id,
            grouping.unthreaded.len()
        );
    }

    for group in &grouping.threads {
        let Some(first) = group.message_ids.first() else {
            continue;
        };
        let result = link_thread_to_transaction(store, user_id, &group.thread_id, first, transaction_id);
        tally.record(
            "thread",
            &group.thread_id,
            group.matched.contact_id(),
            transaction_id,
            result,
        );
    }
    tally
}
