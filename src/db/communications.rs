use super::*;
use crate::linking::date_range::DateRange;

impl AuditDb {
    // =========================================================================
    // Emails and messages (written by ingestion)
    // =========================================================================

    /// Insert or update an ingested email.
    pub fn upsert_email(&self, email: &DbEmail) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO emails (
                id, user_id, external_id, thread_id, sender, recipients, cc,
                subject, body_plain, sent_at, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                thread_id = excluded.thread_id,
                sender = excluded.sender,
                recipients = excluded.recipients,
                cc = excluded.cc,
                subject = excluded.subject,
                body_plain = excluded.body_plain,
                sent_at = excluded.sent_at",
            params![
                email.id,
                email.user_id,
                email.external_id,
                email.thread_id,
                email.sender,
                email.recipients,
                email.cc,
                email.subject,
                email.body_plain,
                email.sent_at,
                now,
            ],
        )?;
        Ok(())
    }

    /// Insert or update an ingested SMS/iMessage. A later upsert may backfill
    /// `thread_id` or `participants_flat`; an existing direct transaction
    /// reference is never cleared.
    pub fn upsert_message(&self, message: &DbMessage) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO messages (
                id, user_id, channel, external_id, thread_id, participants, participants_flat,
                body_text, sent_at, transaction_id, is_duplicate, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                thread_id = COALESCE(excluded.thread_id, messages.thread_id),
                participants = COALESCE(excluded.participants, messages.participants),
                participants_flat = COALESCE(excluded.participants_flat, messages.participants_flat),
                body_text = excluded.body_text,
                sent_at = excluded.sent_at,
                transaction_id = COALESCE(messages.transaction_id, excluded.transaction_id),
                is_duplicate = excluded.is_duplicate",
            params![
                message.id,
                message.user_id,
                message.channel.as_str(),
                message.external_id,
                message.thread_id,
                message.participants,
                message.participants_flat,
                message.body_text,
                message.sent_at,
                message.transaction_id,
                message.is_duplicate as i32,
                now,
            ],
        )?;
        Ok(())
    }

    // =========================================================================
    // Candidate queries
    // =========================================================================

    /// Emails owned by `user_id` whose sender, recipients or CC mention `address`
    /// (case-insensitive substring), sent inside `range`, and not yet linked to
    /// `transaction_id` through the junction table.
    pub fn find_unlinked_emails_for_address(
        &self,
        user_id: &str,
        address: &str,
        transaction_id: &str,
        range: &DateRange,
    ) -> Result<Vec<String>, DbError> {
        self.query_emails_for_address(user_id, address, transaction_id, range, "NOT EXISTS")
    }

    /// Same match as [`find_unlinked_emails_for_address`](Self::find_unlinked_emails_for_address)
    /// but only emails that already carry a junction row for `transaction_id`.
    pub fn find_linked_emails_for_address(
        &self,
        user_id: &str,
        address: &str,
        transaction_id: &str,
        range: &DateRange,
    ) -> Result<Vec<String>, DbError> {
        self.query_emails_for_address(user_id, address, transaction_id, range, "EXISTS")
    }

    // `link_filter` is one of two fixed literals, never caller input.
    fn query_emails_for_address(
        &self,
        user_id: &str,
        address: &str,
        transaction_id: &str,
        range: &DateRange,
        link_filter: &'static str,
    ) -> Result<Vec<String>, DbError> {
        let needle = address.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT e.id FROM emails e
             WHERE e.user_id = ?1
               AND (instr(LOWER(COALESCE(e.sender, '')), ?2) > 0
                    OR instr(LOWER(COALESCE(e.recipients, '')), ?2) > 0
                    OR instr(LOWER(COALESCE(e.cc, '')), ?2) > 0)
               AND julianday(e.sent_at) BETWEEN julianday(?3) AND julianday(?4)
               AND {link_filter} (
                    SELECT 1 FROM communications c
                    WHERE c.email_id = e.id AND c.transaction_id = ?5
               )
             ORDER BY julianday(e.sent_at), e.id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                user_id,
                needle,
                range.start_rfc3339(),
                range.end_rfc3339(),
                transaction_id
            ],
            |row| row.get::<_, String>(0),
        )?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Subject and body for a batch of email ids. Callers keep the batch within
    /// SQLite's bound-parameter limit.
    pub fn get_email_contents(&self, ids: &[String]) -> Result<Vec<EmailContent>, DbError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT id, subject, body_plain FROM emails WHERE id IN ({})",
            placeholders.join(", ")
        );
        let param_values: Vec<&dyn rusqlite::types::ToSql> =
            ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(param_values.as_slice(), |row| {
            Ok(EmailContent {
                id: row.get(0)?,
                subject: row.get(1)?,
                body: row.get(2)?,
            })
        })?;
        let mut contents = Vec::new();
        for row in rows {
            contents.push(row?);
        }
        Ok(contents)
    }

    /// SMS/iMessage rows owned by `user_id` whose denormalized participants
    /// string contains `phone_suffix`, sent inside `range`, not flagged as
    /// duplicates, and not already tied to `transaction_id` by direct reference
    /// or by a thread-level link.
    pub fn find_unlinked_messages_for_phone(
        &self,
        user_id: &str,
        phone_suffix: &str,
        transaction_id: &str,
        range: &DateRange,
    ) -> Result<Vec<MessageRow>, DbError> {
        if phone_suffix.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT m.id, m.thread_id FROM messages m
             WHERE m.user_id = ?1
               AND m.channel IN ('sms', 'imessage')
               AND m.is_duplicate = 0
               AND instr(COALESCE(m.participants_flat, ''), ?2) > 0
               AND julianday(m.sent_at) BETWEEN julianday(?3) AND julianday(?4)
               AND (m.transaction_id IS NULL OR m.transaction_id != ?5)
               AND (m.thread_id IS NULL OR NOT EXISTS (
                    SELECT 1 FROM communications c
                    WHERE c.transaction_id = ?5 AND c.thread_id = m.thread_id
               ))
             ORDER BY julianday(m.sent_at), m.id",
        )?;
        let rows = stmt.query_map(
            params![
                user_id,
                phone_suffix,
                range.start_rfc3339(),
                range.end_rfc3339(),
                transaction_id
            ],
            |row| {
                Ok(MessageRow {
                    id: row.get(0)?,
                    thread_id: row.get(1)?,
                })
            },
        )?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Thread ids of SMS/iMessage rows matching `phone_suffix` inside `range`
    /// whose thread already has a junction row for `transaction_id`.
    pub fn find_linked_threads_for_phone(
        &self,
        user_id: &str,
        phone_suffix: &str,
        transaction_id: &str,
        range: &DateRange,
    ) -> Result<Vec<String>, DbError> {
        if phone_suffix.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT m.thread_id FROM messages m
             WHERE m.user_id = ?1
               AND m.channel IN ('sms', 'imessage')
               AND m.is_duplicate = 0
               AND m.thread_id IS NOT NULL
               AND instr(COALESCE(m.participants_flat, ''), ?2) > 0
               AND julianday(m.sent_at) BETWEEN julianday(?3) AND julianday(?4)
               AND EXISTS (
                    SELECT 1 FROM communications c
                    WHERE c.transaction_id = ?5 AND c.thread_id = m.thread_id
               )
             ORDER BY m.thread_id",
        )?;
        let rows = stmt.query_map(
            params![
                user_id,
                phone_suffix,
                range.start_rfc3339(),
                range.end_rfc3339(),
                transaction_id
            ],
            |row| row.get::<_, String>(0),
        )?;
        let mut threads = Vec::new();
        for row in rows {
            threads.push(row?);
        }
        Ok(threads)
    }

    /// SMS/iMessage rows that lack the denormalized participants string, with
    /// the same ownership, window and already-linked exclusions as
    /// [`find_unlinked_messages_for_phone`](Self::find_unlinked_messages_for_phone).
    pub fn find_unlinked_structured_messages(
        &self,
        user_id: &str,
        transaction_id: &str,
        range: &DateRange,
    ) -> Result<Vec<StructuredMessageRow>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT m.id, m.thread_id, m.participants FROM messages m
             WHERE m.user_id = ?1
               AND m.channel IN ('sms', 'imessage')
               AND m.is_duplicate = 0
               AND (m.participants_flat IS NULL OR m.participants_flat = '')
               AND m.participants IS NOT NULL
               AND julianday(m.sent_at) BETWEEN julianday(?2) AND julianday(?3)
               AND (m.transaction_id IS NULL OR m.transaction_id != ?4)
               AND (m.thread_id IS NULL OR NOT EXISTS (
                    SELECT 1 FROM communications c
                    WHERE c.transaction_id = ?4 AND c.thread_id = m.thread_id
               ))
             ORDER BY julianday(m.sent_at), m.id",
        )?;
        let rows = stmt.query_map(
            params![user_id, range.start_rfc3339(), range.end_rfc3339(), transaction_id],
            |row| {
                Ok(StructuredMessageRow {
                    id: row.get(0)?,
                    thread_id: row.get(1)?,
                    participants: row.get(2)?,
                })
            },
        )?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    // =========================================================================
    // Links (communications junction)
    // =========================================================================

    /// Whether a junction row already ties this email to the transaction.
    pub fn is_email_linked(&self, email_id: &str, transaction_id: &str) -> Result<bool, DbError> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM communications WHERE email_id = ?1 AND transaction_id = ?2
             )",
            params![email_id, transaction_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Whether a junction row already ties this thread to the transaction.
    pub fn is_thread_linked(&self, thread_id: &str, transaction_id: &str) -> Result<bool, DbError> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM communications WHERE thread_id = ?1 AND transaction_id = ?2
             )",
            params![thread_id, transaction_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Owning user of an email, or None if the email does not exist.
    pub fn get_email_owner(&self, email_id: &str) -> Result<Option<String>, DbError> {
        let mut stmt = self.conn.prepare("SELECT user_id FROM emails WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![email_id], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Write one junction row. Fails with a unique violation if another writer
    /// linked the same email or thread first.
    pub fn insert_link(&self, link: &NewLink<'_>) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO communications (
                id, user_id, transaction_id, email_id, message_id, thread_id,
                link_source, link_confidence, linked_at, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                link.id,
                link.user_id,
                link.transaction_id,
                link.email_id,
                link.message_id,
                link.thread_id,
                link.source.as_str(),
                link.confidence,
                now,
            ],
        )?;
        Ok(())
    }

    /// Stamp the direct transaction reference on every message of a thread that
    /// does not carry one yet. Returns the number of messages updated.
    pub fn set_thread_transaction(
        &self,
        user_id: &str,
        thread_id: &str,
        transaction_id: &str,
    ) -> Result<usize, DbError> {
        let rows = self.conn.execute(
            "UPDATE messages SET transaction_id = ?1
             WHERE user_id = ?2 AND thread_id = ?3 AND transaction_id IS NULL",
            params![transaction_id, user_id, thread_id],
        )?;
        Ok(rows)
    }

    /// All junction rows for a transaction, oldest first.
    pub fn list_links_for_transaction(&self, transaction_id: &str) -> Result<Vec<DbLink>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, transaction_id, email_id, message_id, thread_id,
                    link_source, link_confidence, linked_at
             FROM communications
             WHERE transaction_id = ?1
             ORDER BY linked_at, rowid",
        )?;
        let rows = stmt.query_map(params![transaction_id], map_link_row)?;
        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }
}

fn map_link_row(row: &rusqlite::Row) -> rusqlite::Result<DbLink> {
    let source: String = row.get(6)?;
    let link_source = LinkSource::parse(&source).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            format!("unknown link_source '{source}'").into(),
        )
    })?;
    Ok(DbLink {
        id: row.get(0)?,
        user_id: row.get(1)?,
        transaction_id: row.get(2)?,
        email_id: row.get(3)?,
        message_id: row.get(4)?,
        thread_id: row.get(5)?,
        link_source,
        link_confidence: row.get(7)?,
        linked_at: row.get(8)?,
    })
}
