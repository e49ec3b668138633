//! Candidate search: unlinked emails and text messages whose participants
//! match a contact's identifiers inside the audit window.
//!
//! Emails match by case-insensitive substring on sender/recipients/CC. Texts
//! match by the last ten digits of a canonical phone against the denormalized
//! participants string, or, for rows without that string, by parsing the
//! structured participants payload.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::db::DbError;

use super::date_range::DateRange;
use super::normalize::{normalize_phone, phone_search_suffix};
use super::resolver::ContactIdentifiers;
use super::store::LinkStore;

/// Which contact identifier produced a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ContactMatch {
    Phone { value: String, contact_id: String },
    Email { value: String, contact_id: String },
}

impl ContactMatch {
    pub fn contact_id(&self) -> &str {
        match self {
            ContactMatch::Phone { contact_id, .. } | ContactMatch::Email { contact_id, .. } => {
                contact_id
            }
        }
    }

    pub fn value(&self) -> &str {
        match self {
            ContactMatch::Phone { value, .. } | ContactMatch::Email { value, .. } => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailCandidate {
    pub email_id: String,
    pub matched: ContactMatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextCandidate {
    pub message_id: String,
    pub thread_id: Option<String>,
    pub matched: ContactMatch,
}

/// Find unlinked emails exchanged with any of `contacts`.
///
/// The account owner's own address is removed from the search set first, so
/// a user is never matched against their own mailbox. When several contacts
/// match one email, the first contact wins the attribution.
pub fn find_email_candidates<S: LinkStore + ?Sized>(
    store: &S,
    user_id: &str,
    contacts: &[ContactIdentifiers],
    transaction_id: &str,
    range: &DateRange,
) -> Result<Vec<EmailCandidate>, DbError> {
    if contacts.iter().all(|c| c.emails.is_empty()) {
        log::debug!(
            "Transaction {}: no contact email addresses, skipping email search",
            transaction_id
        );
        return Ok(Vec::new());
    }

    let owner_email = store.get_user_email(user_id)?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates = Vec::new();
    let mut searched = 0usize;
    for contact in contacts {
        for address in &contact.emails {
            if owner_email.as_deref() == Some(address.as_str()) {
                log::debug!(
                    "Contact {}: skipping account owner's own address {}",
                    contact.contact_id,
                    address
                );
                continue;
            }
            searched += 1;
            for email_id in
                store.find_unlinked_emails_for_address(user_id, address, transaction_id, range)?
            {
                if seen.insert(email_id.clone()) {
                    candidates.push(EmailCandidate {
                        email_id,
                        matched: ContactMatch::Email {
                            value: address.clone(),
                            contact_id: contact.contact_id.clone(),
                        },
                    });
                }
            }
        }
    }

    if searched == 0 {
        log::debug!(
            "Transaction {}: only the owner's address remained, no email search issued",
            transaction_id
        );
    }
    Ok(candidates)
}

/// Find unlinked SMS/iMessage rows whose denormalized participants string
/// carries any contact phone.
pub fn find_text_candidates<S: LinkStore + ?Sized>(
    store: &S,
    user_id: &str,
    contacts: &[ContactIdentifiers],
    transaction_id: &str,
    range: &DateRange,
) -> Result<Vec<TextCandidate>, DbError> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates = Vec::new();
    let mut searched = 0usize;

    for contact in contacts {
        for phone in &contact.phones {
            let Some(suffix) = phone_search_suffix(phone) else {
                continue;
            };
            searched += 1;
            for row in store.find_unlinked_messages_for_phone(user_id, &suffix, transaction_id, range)? {
                if seen.insert(row.id.clone()) {
                    candidates.push(TextCandidate {
                        message_id: row.id,
                        thread_id: row.thread_id,
                        matched: ContactMatch::Phone {
                            value: phone.clone(),
                            contact_id: contact.contact_id.clone(),
                        },
                    });
                }
            }
        }
    }

    if searched == 0 {
        log::debug!(
            "Transaction {}: no usable contact phones, skipping text search",
            transaction_id
        );
    }
    Ok(candidates)
}

/// Find unlinked SMS/iMessage rows that only carry the structured participants
/// payload, attributing each to the first contact one of its handles belongs to.
pub fn find_structured_text_candidates<S: LinkStore + ?Sized>(
    store: &S,
    user_id: &str,
    contacts: &[ContactIdentifiers],
    transaction_id: &str,
    range: &DateRange,
) -> Result<Vec<TextCandidate>, DbError> {
    if contacts.iter().all(|c| c.is_empty()) {
        return Ok(Vec::new());
    }

    let mut candidates = Vec::new();
    for row in store.find_unlinked_structured_messages(user_id, transaction_id, range)? {
        let Some(payload) = row.participants.as_deref() else {
            continue;
        };
        let Some(handles) = participant_handles(payload) else {
            log::debug!("Message {}: malformed participants payload, no match", row.id);
            continue;
        };
        if let Some(matched) = handles.iter().find_map(|h| attribute_handle(h, contacts)) {
            candidates.push(TextCandidate {
                message_id: row.id,
                thread_id: row.thread_id,
                matched,
            });
        }
    }
    Ok(candidates)
}

/// Distinct emails exchanged with `contacts` inside the window that already
/// carry a link to this transaction, sorted by id. The owner's own address is
/// skipped. Feeds the "already linked" count of a rerun, where the candidate
/// queries themselves return nothing.
pub fn find_linked_email_ids<S: LinkStore + ?Sized>(
    store: &S,
    user_id: &str,
    contacts: &[ContactIdentifiers],
    transaction_id: &str,
    range: &DateRange,
) -> Result<Vec<String>, DbError> {
    if contacts.iter().all(|c| c.emails.is_empty()) {
        return Ok(Vec::new());
    }
    let owner_email = store.get_user_email(user_id)?;
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for address in contacts.iter().flat_map(|c| c.emails.iter()) {
        if owner_email.as_deref() == Some(address.as_str()) {
            continue;
        }
        seen.extend(store.find_linked_emails_for_address(user_id, address, transaction_id, range)?);
    }
    Ok(seen.into_iter().collect())
}

pub fn count_linked_emails<S: LinkStore + ?Sized>(
    store: &S,
    user_id: &str,
    contacts: &[ContactIdentifiers],
    transaction_id: &str,
    range: &DateRange,
) -> Result<usize, DbError> {
    Ok(find_linked_email_ids(store, user_id, contacts, transaction_id, range)?.len())
}

/// Distinct threads with a contact phone inside the window that are already
/// linked to this transaction.
pub fn count_linked_threads<S: LinkStore + ?Sized>(
    store: &S,
    user_id: &str,
    contacts: &[ContactIdentifiers],
    transaction_id: &str,
    range: &DateRange,
) -> Result<usize, DbError> {
    let mut seen: HashSet<String> = HashSet::new();
    for phone in contacts.iter().flat_map(|c| c.phones.iter()) {
        let Some(suffix) = phone_search_suffix(phone) else {
            continue;
        };
        seen.extend(store.find_linked_threads_for_phone(user_id, &suffix, transaction_id, range)?);
    }
    Ok(seen.len())
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct ParticipantsPayload {
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<OneOrMany>,
    #[serde(default)]
    chat_members: Option<Vec<String>>,
}

/// All handles named in a structured participants payload. None if the payload
/// is not valid JSON of the expected shape.
pub fn participant_handles(payload: &str) -> Option<Vec<String>> {
    let parsed: ParticipantsPayload = serde_json::from_str(payload).ok()?;
    let mut handles = Vec::new();
    if let Some(from) = parsed.from {
        handles.push(from);
    }
    match parsed.to {
        Some(OneOrMany::One(to)) => handles.push(to),
        Some(OneOrMany::Many(to)) => handles.extend(to),
        None => {}
    }
    handles.extend(parsed.chat_members.unwrap_or_default());
    handles.retain(|h| !h.trim().is_empty());
    Some(handles)
}

/// Attribute one participant handle to a contact, if it belongs to one.
/// Phone handles compare on canonical form; email handles (iMessage) compare
/// against the contact's email addresses.
pub fn attribute_handle(handle: &str, contacts: &[ContactIdentifiers]) -> Option<ContactMatch> {
    let canonical = normalize_phone(handle.trim())?;
    for contact in contacts {
        if contact.phones.contains(&canonical) {
            return Some(ContactMatch::Phone {
                value: canonical,
                contact_id: contact.contact_id.clone(),
            });
        }
        if canonical.contains('@') && contact.emails.contains(&canonical) {
            return Some(ContactMatch::Email {
                value: canonical,
                contact_id: contact.contact_id.clone(),
            });
        }
    }
    None
}
