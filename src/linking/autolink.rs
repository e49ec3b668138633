//! Auto-link orchestration.
//!
//! Three entry points share one linking pass:
//! - [`AutoLinker::auto_link_contact`] when a contact is assigned to a transaction,
//! - [`AutoLinker::resync_transaction`] to rerun that per contact,
//! - [`AutoLinker::auto_link_transaction`] for a single pass over all contacts.
//!
//! Failures on one email, thread or contact are logged and counted; the pass
//! carries on. Only store failures while resolving the call's own inputs
//! surface as `Err`.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::AutoLinkError;
use crate::types::AutoLinkConfig;

use super::address_filter::{find_email_candidates_for_address, CONTENT_BATCH_SIZE};
use super::candidates::{
    count_linked_emails, count_linked_threads, find_structured_text_candidates,
    find_text_candidates, EmailCandidate, TextCandidate,
};
use super::date_range::{DateRange, RangePolicy};
use super::resolver::{resolve_contact, resolve_transaction, ContactIdentifiers, TransactionContext};
use super::store::LinkStore;
use super::threads::{group_by_thread, link_thread_groups};
use super::writer::{link_email_to_transaction, ContactTally, LinkTally};

#[derive(Debug, Clone, Copy)]
pub struct AutoLinkOptions {
    pub address_filter: bool,
    pub content_batch_size: usize,
    pub range_policy: RangePolicy,
}

impl Default for AutoLinkOptions {
    fn default() -> Self {
        Self {
            address_filter: true,
            content_batch_size: CONTENT_BATCH_SIZE,
            range_policy: RangePolicy::default(),
        }
    }
}

impl From<&AutoLinkConfig> for AutoLinkOptions {
    fn from(config: &AutoLinkConfig) -> Self {
        Self {
            address_filter: config.address_filter,
            content_batch_size: config.content_batch_size,
            range_policy: config.range_policy(),
        }
    }
}

/// Counts for a single contact-transaction auto-link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoLinkResult {
    pub emails_linked: usize,
    /// Threads linked, not individual messages.
    pub messages_linked: usize,
    pub already_linked: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResult {
    pub linked: usize,
    /// Already linked, or set aside for lack of a thread id.
    pub skipped: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactLinkSummary {
    pub contact_id: String,
    pub emails_linked: usize,
    pub messages_linked: usize,
    pub already_linked: usize,
    pub errors: usize,
    /// Set when the contact could not be processed at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLinkResult {
    pub transaction_id: String,
    pub emails: CategoryResult,
    pub messages: CategoryResult,
    pub contacts: Vec<ContactLinkSummary>,
    /// Contact-level failures.
    pub errors: Vec<String>,
}

impl TransactionLinkResult {
    fn new(transaction_id: &str) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            ..Default::default()
        }
    }

    fn absorb(&mut self, pass: &LinkPass) {
        for (category, tally) in [(&mut self.emails, &pass.emails), (&mut self.messages, &pass.threads)] {
            category.linked += tally.linked;
            category.skipped += tally.already_linked + tally.set_aside;
            category.errors.extend(tally.errors.iter().cloned());
        }
    }
}

/// Tallies of one linking pass, per category.
#[derive(Debug, Default)]
struct LinkPass {
    emails: LinkTally,
    threads: LinkTally,
}

impl LinkPass {
    fn result(&self) -> AutoLinkResult {
        AutoLinkResult {
            emails_linked: self.emails.linked,
            messages_linked: self.threads.linked,
            already_linked: self.emails.already_linked + self.threads.already_linked,
            errors: self.emails.errors.len() + self.threads.errors.len(),
        }
    }

    fn contact_summary(&self, contact_id: &str) -> ContactLinkSummary {
        let email = self.emails.per_contact.get(contact_id).copied().unwrap_or_default();
        let thread = self.threads.per_contact.get(contact_id).copied().unwrap_or_default();
        ContactLinkSummary {
            contact_id: contact_id.to_string(),
            emails_linked: email.linked,
            messages_linked: thread.linked,
            already_linked: email.already_linked + thread.already_linked,
            errors: email.errors + thread.errors,
            error: None,
        }
    }
}

pub struct AutoLinker<'a, S: LinkStore + ?Sized> {
    store: &'a S,
    options: AutoLinkOptions,
    range: Option<DateRange>,
}

impl<'a, S: LinkStore + ?Sized> AutoLinker<'a, S> {
    pub fn new(store: &'a S, options: AutoLinkOptions) -> Self {
        Self {
            store,
            options,
            range: None,
        }
    }

    /// Search this window instead of the one derived from the transaction.
    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Link one contact's emails and text threads to a transaction.
    ///
    /// A missing contact or transaction, or a contact with no usable
    /// identifiers, yields all-zero counts.
    pub fn auto_link_contact(
        &self,
        contact_id: &str,
        transaction_id: &str,
    ) -> Result<AutoLinkResult, AutoLinkError> {
        Ok(self.run_contact(contact_id, transaction_id)?.result())
    }

    /// Rerun the single-contact flow for every contact assigned to the
    /// transaction. One contact failing does not stop the others.
    pub fn resync_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<TransactionLinkResult, AutoLinkError> {
        if self.store.get_transaction(transaction_id)?.is_none() {
            return Err(AutoLinkError::TransactionNotFound(transaction_id.to_string()));
        }
        let assigned = self.store.get_transaction_contacts(transaction_id)?;

        let mut result = TransactionLinkResult::new(transaction_id);
        let mut seen: HashSet<String> = HashSet::new();
        for assignment in assigned {
            let contact_id = assignment.contact_id;
            if !seen.insert(contact_id.clone()) {
                continue;
            }
            match self.run_contact(&contact_id, transaction_id) {
                Ok(pass) => {
                    result.absorb(&pass);
                    let counts = pass.result();
                    result.contacts.push(ContactLinkSummary {
                        contact_id,
                        emails_linked: counts.emails_linked,
                        messages_linked: counts.messages_linked,
                        already_linked: counts.already_linked,
                        errors: counts.errors,
                        error: None,
                    });
                }
                Err(e) => {
                    log::warn!(
                        "Resync of transaction {}: contact {} failed: {}",
                        transaction_id,
                        contact_id,
                        e
                    );
                    result.errors.push(format!("contact {contact_id}: {e}"));
                    result.contacts.push(ContactLinkSummary {
                        contact_id,
                        errors: 1,
                        error: Some(e.to_string()),
                        ..Default::default()
                    });
                }
            }
        }

        log_transaction_summary("Resync", &result);
        Ok(result)
    }

    /// One pass over all contacts of a transaction: address-filtered email
    /// matching, phone matching on texts, and structured-participant matching
    /// for texts without a flat participants string.
    pub fn auto_link_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<TransactionLinkResult, AutoLinkError> {
        let Some(txn) = self.resolve_transaction(transaction_id)? else {
            return Err(AutoLinkError::TransactionNotFound(transaction_id.to_string()));
        };
        let assigned = self.store.get_transaction_contacts(transaction_id)?;

        let mut result = TransactionLinkResult::new(transaction_id);
        let mut seen: HashSet<String> = HashSet::new();
        let mut order: Vec<(String, Option<String>)> = Vec::new();
        let mut contacts: Vec<ContactIdentifiers> = Vec::new();
        for assignment in assigned {
            let contact_id = assignment.contact_id;
            if !seen.insert(contact_id.clone()) {
                continue;
            }
            match resolve_contact(self.store, &contact_id) {
                Ok(Some(ids)) if ids.is_empty() => {
                    log::debug!("Contact {} has no usable identifiers", contact_id);
                    order.push((contact_id, None));
                }
                Ok(Some(ids)) => {
                    contacts.push(ids);
                    order.push((contact_id, None));
                }
                Ok(None) => {
                    log::warn!(
                        "Transaction {}: assigned contact {} not found",
                        transaction_id,
                        contact_id
                    );
                    order.push((contact_id, None));
                }
                Err(e) => {
                    log::warn!(
                        "Transaction {}: failed to load contact {}: {}",
                        transaction_id,
                        contact_id,
                        e
                    );
                    result.errors.push(format!("contact {contact_id}: {e}"));
                    order.push((contact_id, Some(e.to_string())));
                }
            }
        }

        let pass = if contacts.is_empty() {
            LinkPass::default()
        } else {
            self.link_pass(&txn, &contacts, true)
        };
        result.absorb(&pass);
        for (contact_id, error) in order {
            let summary = match error {
                Some(error) => ContactLinkSummary {
                    contact_id,
                    errors: 1,
                    error: Some(error),
                    ..Default::default()
                },
                None => pass.contact_summary(&contact_id),
            };
            result.contacts.push(summary);
        }

        log_transaction_summary("Full scan", &result);
        Ok(result)
    }

    fn resolve_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<TransactionContext>, AutoLinkError> {
        Ok(resolve_transaction(
            self.store,
            transaction_id,
            self.options.range_policy,
            self.range,
        )?)
    }

    fn run_contact(&self, contact_id: &str, transaction_id: &str) -> Result<LinkPass, AutoLinkError> {
        let Some(contact) = resolve_contact(self.store, contact_id)? else {
            log::warn!("Auto-link: contact {} not found", contact_id);
            return Ok(LinkPass::default());
        };
        let Some(txn) = self.resolve_transaction(transaction_id)? else {
            log::warn!("Auto-link: transaction {} not found", transaction_id);
            return Ok(LinkPass::default());
        };
        if contact.is_empty() {
            log::debug!(
                "Auto-link: contact {} has no usable emails or phones, nothing to link",
                contact_id
            );
            return Ok(LinkPass::default());
        }

        let pass = self.link_pass(&txn, std::slice::from_ref(&contact), false);
        let counts = pass.result();
        log::info!(
            "Auto-link contact {} -> transaction {}: {} email(s), {} thread(s) linked, {} already linked, {} error(s)",
            contact_id,
            transaction_id,
            counts.emails_linked,
            counts.messages_linked,
            counts.already_linked,
            counts.errors
        );
        Ok(pass)
    }

    /// Search, then link threads, then link emails. Query failures are
    /// counted against their category and leave the other category running.
    fn link_pass(
        &self,
        txn: &TransactionContext,
        contacts: &[ContactIdentifiers],
        structured: bool,
    ) -> LinkPass {
        let mut email_errors: Vec<String> = Vec::new();
        let mut text_errors: Vec<String> = Vec::new();

        let (emails, emails_already) = self.search_emails(txn, contacts, &mut email_errors);
        let (texts, threads_already) = self.search_texts(txn, contacts, structured, &mut text_errors);

        let grouping = group_by_thread(texts);
        let mut threads = link_thread_groups(self.store, &txn.user_id, &txn.id, &grouping);
        threads.already_linked += threads_already;
        text_errors.append(&mut threads.errors);
        threads.errors = text_errors;

        let mut email_tally = LinkTally {
            already_linked: emails_already,
            errors: email_errors,
            ..Default::default()
        };
        for candidate in &emails {
            let result = link_email_to_transaction(self.store, &candidate.email_id, &txn.id);
            email_tally.record(
                "email",
                &candidate.email_id,
                candidate.matched.contact_id(),
                &txn.id,
                result,
            );
        }

        // Pre-existing links are only known in aggregate; attribute them when
        // there is a single contact to attribute to.
        if let [only] = contacts {
            for (tally, already) in [(&mut email_tally, emails_already), (&mut threads, threads_already)] {
                if already > 0 {
                    let entry: &mut ContactTally =
                        tally.per_contact.entry(only.contact_id.clone()).or_default();
                    entry.already_linked += already;
                }
            }
        }

        LinkPass {
            emails: email_tally,
            threads,
        }
    }

    fn search_emails(
        &self,
        txn: &TransactionContext,
        contacts: &[ContactIdentifiers],
        errors: &mut Vec<String>,
    ) -> (Vec<EmailCandidate>, usize) {
        if contacts.iter().all(|c| c.emails.is_empty()) {
            log::debug!("Transaction {}: no contact emails, skipping email search", txn.id);
            return (Vec::new(), 0);
        }

        let already = match count_linked_emails(self.store, &txn.user_id, contacts, &txn.id, &txn.range) {
            Ok(n) => n,
            Err(e) => {
                log::warn!("Transaction {}: counting linked emails failed: {}", txn.id, e);
                errors.push(format!("linked email count: {e}"));
                0
            }
        };

        let address = if self.options.address_filter {
            txn.address.as_ref()
        } else {
            None
        };
        let candidates = match find_email_candidates_for_address(
            self.store,
            &txn.user_id,
            contacts,
            &txn.id,
            &txn.range,
            address,
            self.options.content_batch_size,
        ) {
            Ok(search) => search.candidates,
            Err(e) => {
                log::warn!("Transaction {}: email candidate search failed: {}", txn.id, e);
                errors.push(format!("email search: {e}"));
                Vec::new()
            }
        };
        (candidates, already)
    }

    fn search_texts(
        &self,
        txn: &TransactionContext,
        contacts: &[ContactIdentifiers],
        structured: bool,
        errors: &mut Vec<String>,
    ) -> (Vec<TextCandidate>, usize) {
        let mut texts: Vec<TextCandidate> = Vec::new();
        let mut already = 0;

        if contacts.iter().any(|c| !c.phones.is_empty()) {
            match count_linked_threads(self.store, &txn.user_id, contacts, &txn.id, &txn.range) {
                Ok(n) => already = n,
                Err(e) => {
                    log::warn!("Transaction {}: counting linked threads failed: {}", txn.id, e);
                    errors.push(format!("linked thread count: {e}"));
                }
            }
            match find_text_candidates(self.store, &txn.user_id, contacts, &txn.id, &txn.range) {
                Ok(found) => texts = found,
                Err(e) => {
                    log::warn!("Transaction {}: text candidate search failed: {}", txn.id, e);
                    errors.push(format!("text search: {e}"));
                }
            }
        } else {
            log::debug!("Transaction {}: no contact phones, skipping text search", txn.id);
        }

        if structured {
            match find_structured_text_candidates(self.store, &txn.user_id, contacts, &txn.id, &txn.range) {
                Ok(found) => {
                    let seen: HashSet<String> = texts.iter().map(|t| t.message_id.clone()).collect();
                    texts.extend(found.into_iter().filter(|t| !seen.contains(&t.message_id)));
                }
                Err(e) => {
                    log::warn!(
                        "Transaction {}: structured participant search failed: {}",
                        txn.id,
                        e
                    );
                    errors.push(format!("structured text search: {e}"));
                }
            }
        }

        (texts, already)
    }
}

fn log_transaction_summary(mode: &str, result: &TransactionLinkResult) {
    log::info!(
        "{} of transaction {}: {} email(s) and {} thread(s) linked, {} skipped, {} error(s) across {} contact(s)",
        mode,
        result.transaction_id,
        result.emails.linked,
        result.messages.linked,
        result.emails.skipped + result.messages.skipped,
        result.emails.errors.len() + result.messages.errors.len() + result.errors.len(),
        result.contacts.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::db::{AuditDb, Channel, DbContact, DbEmail, DbMessage, DbTransaction, DbUser, LinkSource, NewLink};
    use crate::linking::store::testing::InstrumentedStore;
    use chrono::{TimeZone, Utc};

    fn range() -> DateRange {
        DateRange {
            start: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).unwrap(),
        }
    }

    fn no_filter() -> AutoLinkOptions {
        AutoLinkOptions {
            address_filter: false,
            ..Default::default()
        }
    }

    /// User u1 (user@x.com), transaction t1 at 123 Oak St, buyer c1 with an
    /// email and a phone.
    fn seed_base(db: &AuditDb) {
        db.upsert_user(&DbUser {
            id: "u1".to_string(),
            email: Some("user@x.com".to_string()),
            display_name: Some("Agent".to_string()),
        })
        .expect("user");
        db.upsert_transaction(&DbTransaction {
            id: "t1".to_string(),
            user_id: "u1".to_string(),
            property_address: Some("123 Oak St, Portland, OR".to_string()),
            status: "active".to_string(),
            started_at: Some("2026-01-05T00:00:00Z".to_string()),
            created_at: "2026-01-05T00:00:00Z".to_string(),
            closed_at: None,
        })
        .expect("transaction");
        seed_contact(db, "c1", &["buyer@x.com"], &["415-555-0000"]);
        db.assign_contact_to_transaction("t1", "c1", "buyer").expect("assign");
    }

    fn seed_contact(db: &AuditDb, id: &str, emails: &[&str], phones: &[&str]) {
        db.upsert_contact(&DbContact {
            id: id.to_string(),
            user_id: "u1".to_string(),
            display_name: id.to_string(),
            emails: emails.iter().map(|s| s.to_string()).collect(),
            phones: phones.iter().map(|s| s.to_string()).collect(),
        })
        .expect("contact");
    }

    fn seed_email(db: &AuditDb, id: &str, sender: &str, body: &str, sent_at: &str) {
        db.upsert_email(&DbEmail {
            id: id.to_string(),
            user_id: "u1".to_string(),
            sender: Some(sender.to_string()),
            recipients: Some("user@x.com".to_string()),
            subject: Some("Update".to_string()),
            body_plain: Some(body.to_string()),
            sent_at: Some(sent_at.to_string()),
            ..Default::default()
        })
        .expect("email");
    }

    fn seed_text(db: &AuditDb, id: &str, thread: Option<&str>, flat: Option<&str>, participants: Option<&str>) {
        db.upsert_message(&DbMessage {
            id: id.to_string(),
            user_id: "u1".to_string(),
            channel: Channel::Sms,
            external_id: None,
            thread_id: thread.map(String::from),
            participants: participants.map(String::from),
            participants_flat: flat.map(String::from),
            body_text: Some("running 5 late".to_string()),
            sent_at: Some("2026-03-10T15:00:00Z".to_string()),
            transaction_id: None,
            is_duplicate: false,
        })
        .expect("message");
    }

    #[test]
    fn test_rerun_reports_already_linked() {
        let db = test_db();
        seed_base(&db);
        seed_email(&db, "e1", "buyer@x.com", "Walkthrough at 123 Oak St", "2026-02-01T10:00:00Z");
        seed_email(&db, "e2", "Buyer <BUYER@x.com>", "123 oak street keys", "2026-02-02T10:00:00Z");
        seed_text(&db, "m1", Some("th-1"), Some("+14155550000"), None);
        seed_text(&db, "m2", Some("th-1"), Some("+14155550000"), None);
        seed_text(&db, "m3", Some("th-2"), Some("4155550000"), None);

        let linker = AutoLinker::new(&db, AutoLinkOptions::default()).with_range(range());
        let first = linker.auto_link_contact("c1", "t1").expect("first run");
        assert_eq!(
            first,
            AutoLinkResult {
                emails_linked: 2,
                messages_linked: 2,
                already_linked: 0,
                errors: 0
            }
        );

        let second = linker.auto_link_contact("c1", "t1").expect("second run");
        assert_eq!(
            second,
            AutoLinkResult {
                emails_linked: 0,
                messages_linked: 0,
                already_linked: 4,
                errors: 0
            }
        );
        assert_eq!(db.list_links_for_transaction("t1").expect("list").len(), 4);
    }

    #[test]
    fn test_links_satisfy_foreign_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = AuditDb::open_at(dir.path().join("fk.db")).expect("open");
        let fk: i32 = db
            .conn_ref()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .expect("pragma");
        assert_eq!(fk, 1);

        seed_base(&db);
        seed_email(&db, "e1", "buyer@x.com", "Offer on 123 Oak St", "2026-02-01T10:00:00Z");
        seed_text(&db, "m1", Some("th-1"), Some("+14155550000"), None);

        let linker = AutoLinker::new(&db, AutoLinkOptions::default()).with_range(range());
        let result = linker.auto_link_contact("c1", "t1").expect("run");
        assert_eq!(
            result,
            AutoLinkResult {
                emails_linked: 1,
                messages_linked: 1,
                already_linked: 0,
                errors: 0
            }
        );
        let violations: i32 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM pragma_foreign_key_check", [], |row| row.get(0))
            .expect("fk check");
        assert_eq!(violations, 0);
    }

    #[test]
    fn test_store_error_on_one_email_does_not_abort_batch() {
        let db = test_db();
        seed_base(&db);
        seed_email(&db, "e1", "buyer@x.com", "hi", "2026-02-01T10:00:00Z");
        seed_email(&db, "e2", "buyer@x.com", "hi again", "2026-02-02T10:00:00Z");
        db.conn_ref()
            .execute_batch(
                "CREATE TRIGGER fail_e2 BEFORE INSERT ON communications
                 WHEN NEW.email_id = 'e2'
                 BEGIN SELECT RAISE(ABORT, 'disk on fire'); END;",
            )
            .expect("trigger");

        let linker = AutoLinker::new(&db, no_filter()).with_range(range());
        let result = linker.auto_link_contact("c1", "t1").expect("run");
        assert_eq!(result.emails_linked, 1);
        assert_eq!(result.errors, 1);
    }

    #[test]
    fn test_fallback_requery_issued_once() {
        let db = test_db();
        seed_base(&db);
        seed_email(&db, "e1", "buyer@x.com", "Lunch Tuesday?", "2026-02-01T10:00:00Z");
        db.insert_link(&NewLink {
            id: "l-manual",
            user_id: "u1",
            transaction_id: "t1",
            email_id: Some("e1"),
            message_id: None,
            thread_id: None,
            source: LinkSource::Manual,
            confidence: 1.0,
        })
        .expect("manual link");

        let store = InstrumentedStore::new(&db);
        let linker = AutoLinker::new(&store, AutoLinkOptions::default()).with_range(range());
        let result = linker.auto_link_contact("c1", "t1").expect("run");
        assert_eq!(result.emails_linked, 0);
        assert_eq!(result.already_linked, 1);
        assert_eq!(store.email_queries.get(), 2);
    }

    #[test]
    fn test_fallback_links_unmentioned_emails() {
        let db = test_db();
        seed_base(&db);
        seed_email(&db, "e1", "buyer@x.com", "Lunch Tuesday?", "2026-02-01T10:00:00Z");

        let linker = AutoLinker::new(&db, AutoLinkOptions::default()).with_range(range());
        let result = linker.auto_link_contact("c1", "t1").expect("run");
        assert_eq!(result.emails_linked, 1);
    }

    #[test]
    fn test_filtered_rerun_does_not_link_dropped_emails() {
        let db = test_db();
        seed_base(&db);
        seed_email(&db, "e1", "buyer@x.com", "Offer on 123 Oak St", "2026-02-01T10:00:00Z");
        seed_email(&db, "e2", "buyer@x.com", "Lunch tuesday?", "2026-02-02T10:00:00Z");

        let linker = AutoLinker::new(&db, AutoLinkOptions::default()).with_range(range());
        let first = linker.auto_link_contact("c1", "t1").expect("first run");
        assert_eq!(first.emails_linked, 1);
        assert_eq!(first.already_linked, 0);

        let second = linker.auto_link_contact("c1", "t1").expect("second run");
        assert_eq!(
            second,
            AutoLinkResult {
                emails_linked: 0,
                messages_linked: 0,
                already_linked: 1,
                errors: 0
            }
        );
        let links = db.list_links_for_transaction("t1").expect("list");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].email_id.as_deref(), Some("e1"));
    }

    #[test]
    fn test_address_filter_skips_unrelated_emails() {
        let db = test_db();
        seed_base(&db);
        seed_email(&db, "e1", "buyer@x.com", "Inspection at 123 Oak", "2026-02-01T10:00:00Z");
        seed_email(&db, "e2", "buyer@x.com", "Also looking at 1234 Oakland Ave", "2026-02-02T10:00:00Z");

        let linker = AutoLinker::new(&db, AutoLinkOptions::default()).with_range(range());
        let result = linker.auto_link_contact("c1", "t1").expect("run");
        assert_eq!(result.emails_linked, 1);
        let links = db.list_links_for_transaction("t1").expect("list");
        assert_eq!(links[0].email_id.as_deref(), Some("e1"));
    }

    #[test]
    fn test_missing_inputs_return_zeros() {
        let db = test_db();
        seed_base(&db);
        seed_contact(&db, "c-empty", &["no-at-sign"], &["12"]);
        let linker = AutoLinker::new(&db, AutoLinkOptions::default()).with_range(range());

        assert_eq!(linker.auto_link_contact("ghost", "t1").expect("run"), AutoLinkResult::default());
        assert_eq!(linker.auto_link_contact("c1", "ghost").expect("run"), AutoLinkResult::default());
        assert_eq!(linker.auto_link_contact("c-empty", "t1").expect("run"), AutoLinkResult::default());
    }

    #[test]
    fn test_unthreaded_texts_are_not_linked() {
        let db = test_db();
        seed_base(&db);
        seed_text(&db, "m1", None, Some("+14155550000"), None);

        let linker = AutoLinker::new(&db, no_filter()).with_range(range());
        let result = linker.auto_link_contact("c1", "t1").expect("run");
        assert_eq!(result, AutoLinkResult::default());
        assert!(db.list_links_for_transaction("t1").expect("list").is_empty());
    }

    #[test]
    fn test_resync_isolates_failing_contact() {
        let db = test_db();
        seed_base(&db);
        seed_contact(&db, "c2", &["seller@y.com"], &[]);
        db.assign_contact_to_transaction("t1", "c2", "seller").expect("assign");
        db.assign_contact_to_transaction("t1", "c1", "co-buyer").expect("assign twice");
        seed_contact(&db, "c3", &["lender@z.com"], &[]);
        db.assign_contact_to_transaction("t1", "c3", "lender").expect("assign");
        seed_email(&db, "e1", "buyer@x.com", "hi", "2026-02-01T10:00:00Z");
        seed_email(&db, "e3", "lender@z.com", "rate lock", "2026-02-03T10:00:00Z");

        let mut store = InstrumentedStore::new(&db);
        store.failing_contact = Some("c2".to_string());
        let linker = AutoLinker::new(&store, no_filter()).with_range(range());
        let result = linker.resync_transaction("t1").expect("resync");

        let ids: Vec<&str> = result.contacts.iter().map(|c| c.contact_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        assert_eq!(result.emails.linked, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("contact c2:"));
        assert!(result.contacts[1].error.is_some());
        assert_eq!(result.contacts[2].emails_linked, 1);
    }

    #[test]
    fn test_resync_unknown_transaction_is_error() {
        let db = test_db();
        let linker = AutoLinker::new(&db, AutoLinkOptions::default());
        let err = linker.resync_transaction("nope").expect_err("missing");
        assert!(matches!(err, AutoLinkError::TransactionNotFound(id) if id == "nope"));
        assert!(matches!(
            linker.auto_link_transaction("nope"),
            Err(AutoLinkError::TransactionNotFound(_))
        ));
    }

    #[test]
    fn test_full_scan_attributes_per_contact() {
        let db = test_db();
        seed_base(&db);
        seed_contact(&db, "c2", &[], &["(503) 555-1111"]);
        db.assign_contact_to_transaction("t1", "c2", "seller").expect("assign");
        db.assign_contact_to_transaction("t1", "c1", "co-buyer").expect("assign twice");

        seed_email(&db, "e1", "buyer@x.com", "Docs for 123 Oak St", "2026-02-01T10:00:00Z");
        seed_email(&db, "e-own", "user@x.com", "123 Oak St memo to self", "2026-02-01T11:00:00Z");
        seed_text(&db, "m1", Some("th-buyer"), Some("+14155550000"), None);
        seed_text(&db, "m2", Some("th-buyer"), Some("+14155550000"), None);
        seed_text(
            &db,
            "m3",
            Some("th-seller"),
            None,
            Some(r#"{"from": "+1 503 555 1111", "to": ["+14155559999"]}"#),
        );
        seed_text(&db, "m4", None, Some("5035551111"), None);

        let linker = AutoLinker::new(&db, AutoLinkOptions::default()).with_range(range());
        let result = linker.auto_link_transaction("t1").expect("scan");

        assert_eq!(result.emails.linked, 1);
        assert_eq!(result.messages.linked, 2);
        assert_eq!(result.messages.skipped, 1);
        assert!(result.errors.is_empty());
        assert_eq!(result.contacts.len(), 2);
        assert_eq!(result.contacts[0].contact_id, "c1");
        assert_eq!(result.contacts[0].emails_linked, 1);
        assert_eq!(result.contacts[0].messages_linked, 1);
        assert_eq!(result.contacts[1].contact_id, "c2");
        assert_eq!(result.contacts[1].messages_linked, 1);

        let rerun = linker.auto_link_transaction("t1").expect("rescan");
        assert_eq!(rerun.emails.linked + rerun.messages.linked, 0);
        assert_eq!(rerun.emails.skipped, 1);
    }

    #[test]
    fn test_transaction_result_serializes_camel_case() {
        let result = TransactionLinkResult {
            transaction_id: "t1".to_string(),
            emails: CategoryResult {
                linked: 2,
                skipped: 1,
                errors: vec![],
            },
            contacts: vec![ContactLinkSummary {
                contact_id: "c1".to_string(),
                emails_linked: 2,
                ..Default::default()
            }],
            ..Default::default()
        };
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["transactionId"], "t1");
        assert_eq!(json["emails"]["linked"], 2);
        assert_eq!(json["contacts"][0]["contactId"], "c1");
        assert_eq!(json["contacts"][0]["emailsLinked"], 2);
        assert!(json["contacts"][0].get("error").is_none());
    }
}
