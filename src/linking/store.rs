//! Store capability used by the linking engine.
//!
//! The engine depends on these named operations rather than on SQL text, so a
//! test can wrap or replace the SQLite store.

use crate::db::{
    AuditDb, DbContact, DbError, DbTransaction, DbTransactionContact, EmailContent, MessageRow,
    NewLink, StructuredMessageRow,
};

use super::date_range::DateRange;

pub trait LinkStore {
    fn get_contact(&self, contact_id: &str) -> Result<Option<DbContact>, DbError>;

    fn get_transaction(&self, transaction_id: &str) -> Result<Option<DbTransaction>, DbError>;

    fn get_transaction_contacts(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<DbTransactionContact>, DbError>;

    /// The account owner's own mailbox address.
    fn get_user_email(&self, user_id: &str) -> Result<Option<String>, DbError>;

    fn find_unlinked_emails_for_address(
        &self,
        user_id: &str,
        address: &str,
        transaction_id: &str,
        range: &DateRange,
    ) -> Result<Vec<String>, DbError>;

    fn find_linked_emails_for_address(
        &self,
        user_id: &str,
        address: &str,
        transaction_id: &str,
        range: &DateRange,
    ) -> Result<Vec<String>, DbError>;

    fn get_email_contents(&self, ids: &[String]) -> Result<Vec<EmailContent>, DbError>;

    fn find_unlinked_messages_for_phone(
        &self,
        user_id: &str,
        phone_suffix: &str,
        transaction_id: &str,
        range: &DateRange,
    ) -> Result<Vec<MessageRow>, DbError>;

    fn find_linked_threads_for_phone(
        &self,
        user_id: &str,
        phone_suffix: &str,
        transaction_id: &str,
        range: &DateRange,
    ) -> Result<Vec<String>, DbError>;

    fn find_unlinked_structured_messages(
        &self,
        user_id: &str,
        transaction_id: &str,
        range: &DateRange,
    ) -> Result<Vec<StructuredMessageRow>, DbError>;

    fn is_email_linked(&self, email_id: &str, transaction_id: &str) -> Result<bool, DbError>;

    fn is_thread_linked(&self, thread_id: &str, transaction_id: &str) -> Result<bool, DbError>;

    fn get_email_owner(&self, email_id: &str) -> Result<Option<String>, DbError>;

    fn insert_link(&self, link: &NewLink<'_>) -> Result<(), DbError>;

    fn set_thread_transaction(
        &self,
        user_id: &str,
        thread_id: &str,
        transaction_id: &str,
    ) -> Result<usize, DbError>;
}

impl LinkStore for AuditDb {
    fn get_contact(&self, contact_id: &str) -> Result<Option<DbContact>, DbError> {
        AuditDb::get_contact(self, contact_id)
    }

    fn get_transaction(&self, transaction_id: &str) -> Result<Option<DbTransaction>, DbError> {
        AuditDb::get_transaction(self, transaction_id)
    }

    fn get_transaction_contacts(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<DbTransactionContact>, DbError> {
        AuditDb::get_transaction_contacts(self, transaction_id)
    }

    fn get_user_email(&self, user_id: &str) -> Result<Option<String>, DbError> {
        AuditDb::get_user_email(self, user_id)
    }

    fn find_unlinked_emails_for_address(
        &self,
        user_id: &str,
        address: &str,
        transaction_id: &str,
        range: &DateRange,
    ) -> Result<Vec<String>, DbError> {
        AuditDb::find_unlinked_emails_for_address(self, user_id, address, transaction_id, range)
    }

    fn find_linked_emails_for_address(
        &self,
        user_id: &str,
        address: &str,
        transaction_id: &str,
        range: &DateRange,
    ) -> Result<Vec<String>, DbError> {
        AuditDb::find_linked_emails_for_address(self, user_id, address, transaction_id, range)
    }

    fn get_email_contents(&self, ids: &[String]) -> Result<Vec<EmailContent>, DbError> {
        AuditDb::get_email_contents(self, ids)
    }

    fn find_unlinked_messages_for_phone(
        &self,
        user_id: &str,
        phone_suffix: &str,
        transaction_id: &str,
        range: &DateRange,
    ) -> Result<Vec<MessageRow>, DbError> {
        AuditDb::find_unlinked_messages_for_phone(self, user_id, phone_suffix, transaction_id, range)
    }

    fn find_linked_threads_for_phone(
        &self,
        user_id: &str,
        phone_suffix: &str,
        transaction_id: &str,
        range: &DateRange,
    ) -> Result<Vec<String>, DbError> {
        AuditDb::find_linked_threads_for_phone(self, user_id, phone_suffix, transaction_id, range)
    }

    fn find_unlinked_structured_messages(
        &self,
        user_id: &str,
        transaction_id: &str,
        range: &DateRange,
    ) -> Result<Vec<StructuredMessageRow>, DbError> {
        AuditDb::find_unlinked_structured_messages(self, user_id, transaction_id, range)
    }

    fn is_email_linked(&self, email_id: &str, transaction_id: &str) -> Result<bool, DbError> {
        AuditDb::is_email_linked(self, email_id, transaction_id)
    }

    fn is_thread_linked(&self, thread_id: &str, transaction_id: &str) -> Result<bool, DbError> {
        AuditDb::is_thread_linked(self, thread_id, transaction_id)
    }

    fn get_email_owner(&self, email_id: &str) -> Result<Option<String>, DbError> {
        AuditDb::get_email_owner(self, email_id)
    }

    fn insert_link(&self, link: &NewLink<'_>) -> Result<(), DbError> {
        AuditDb::insert_link(self, link)
    }

    fn set_thread_transaction(
        &self,
        user_id: &str,
        thread_id: &str,
        transaction_id: &str,
    ) -> Result<usize, DbError> {
        AuditDb::set_thread_transaction(self, user_id, thread_id, transaction_id)
    }
}
