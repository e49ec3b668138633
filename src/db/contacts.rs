use super::*;
use crate::linking::normalize::normalize_phone;

impl AuditDb {
    // =========================================================================
    // Contacts
    // =========================================================================

    /// Insert or update a contact and merge its email addresses and phone numbers.
    ///
    /// Identifier rows are additive: addresses already on file are kept. Phones
    /// are stored as entered plus their canonical form (NULL when unparseable).
    pub fn upsert_contact(&self, contact: &DbContact) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO contacts (id, user_id, display_name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                updated_at = excluded.updated_at",
            params![contact.id, contact.user_id, contact.display_name, now],
        )?;

        for (idx, email) in contact.emails.iter().enumerate() {
            let email = email.trim();
            if email.is_empty() {
                continue;
            }
            self.conn.execute(
                "INSERT OR IGNORE INTO contact_emails (id, contact_id, email, is_primary, created_at)
                 VALUES (?1, ?2, LOWER(?3), ?4, ?5)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    contact.id,
                    email,
                    (idx == 0) as i32,
                    now
                ],
            )?;
        }

        for (idx, phone) in contact.phones.iter().enumerate() {
            let phone = phone.trim();
            if phone.is_empty() {
                continue;
            }
            self.conn.execute(
                "INSERT OR IGNORE INTO contact_phones
                    (id, contact_id, phone_e164, phone_display, is_primary, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    contact.id,
                    normalize_phone(phone),
                    phone,
                    (idx == 0) as i32,
                    now
                ],
            )?;
        }
        Ok(())
    }

    /// Look up a contact by id with its identifier rows.
    pub fn get_contact(&self, contact_id: &str) -> Result<Option<DbContact>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, user_id, display_name FROM contacts WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![contact_id], |row| {
            Ok(DbContact {
                id: row.get(0)?,
                user_id: row.get(1)?,
                display_name: row.get(2)?,
                emails: Vec::new(),
                phones: Vec::new(),
            })
        })?;
        let Some(row) = rows.next() else {
            return Ok(None);
        };
        let mut contact = row?;
        contact.emails = self.get_contact_emails(contact_id)?;
        contact.phones = self.get_contact_phones(contact_id)?;
        Ok(Some(contact))
    }

    /// All email addresses on file for a contact, lower-cased, primary first.
    pub fn get_contact_emails(&self, contact_id: &str) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT email FROM contact_emails
             WHERE contact_id = ?1
             ORDER BY is_primary DESC, created_at, email",
        )?;
        let rows = stmt.query_map(params![contact_id], |row| row.get::<_, String>(0))?;
        let mut emails = Vec::new();
        for row in rows {
            emails.push(row?);
        }
        Ok(emails)
    }

    /// All phone numbers on file for a contact, canonical form when known,
    /// otherwise as entered. Primary first.
    pub fn get_contact_phones(&self, contact_id: &str) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(phone_e164, phone_display) FROM contact_phones
             WHERE contact_id = ?1
             ORDER BY is_primary DESC, created_at, phone_display",
        )?;
        let rows = stmt.query_map(params![contact_id], |row| row.get::<_, String>(0))?;
        let mut phones = Vec::new();
        for row in rows {
            phones.push(row?);
        }
        Ok(phones)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Insert or update a transaction's lifecycle fields.
    pub fn upsert_transaction(&self, txn: &DbTransaction) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO transactions (
                id, user_id, property_address, status, started_at, created_at, closed_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                property_address = excluded.property_address,
                status = excluded.status,
                started_at = excluded.started_at,
                closed_at = excluded.closed_at,
                updated_at = excluded.updated_at",
            params![
                txn.id,
                txn.user_id,
                txn.property_address,
                txn.status,
                txn.started_at,
                txn.created_at,
                txn.closed_at,
                now,
            ],
        )?;
        Ok(())
    }

    /// Look up a transaction by id.
    pub fn get_transaction(&self, transaction_id: &str) -> Result<Option<DbTransaction>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, property_address, status, started_at, created_at, closed_at
             FROM transactions WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![transaction_id], |row| {
            Ok(DbTransaction {
                id: row.get(0)?,
                user_id: row.get(1)?,
                property_address: row.get(2)?,
                status: row.get(3)?,
                started_at: row.get(4)?,
                created_at: row.get(5)?,
                closed_at: row.get(6)?,
            })
        })?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Assign a contact to a transaction under a role. Idempotent.
    pub fn assign_contact_to_transaction(
        &self,
        transaction_id: &str,
        contact_id: &str,
        role: &str,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO transaction_contacts (transaction_id, contact_id, role, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![transaction_id, contact_id, role, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Contacts assigned to a transaction, in assignment order.
    pub fn get_transaction_contacts(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<DbTransactionContact>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT contact_id, role FROM transaction_contacts
             WHERE transaction_id = ?1
             ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map(params![transaction_id], |row| {
            Ok(DbTransactionContact {
                contact_id: row.get(0)?,
                role: row.get(1)?,
            })
        })?;
        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::test_db;
    use super::*;

    fn sample_contact() -> DbContact {
        DbContact {
            id: "c1".to_string(),
            user_id: "u1".to_string(),
            display_name: "Jane Buyer".to_string(),
            emails: vec!["Jane@Buyer.com".to_string(), "jane.alt@mail.com".to_string()],
            phones: vec!["(415) 555-0000".to_string(), "12".to_string()],
        }
    }

    #[test]
    fn test_upsert_contact_normalizes_identifiers() {
        let db = test_db();
        db.upsert_contact(&sample_contact()).expect("upsert contact");

        let contact = db.get_contact("c1").expect("query").expect("contact exists");
        assert_eq!(contact.display_name, "Jane Buyer");
        assert_eq!(contact.emails, vec!["jane@buyer.com", "jane.alt@mail.com"]);
        // Unparseable numbers are kept as entered.
        assert_eq!(contact.phones, vec!["+14155550000", "12"]);
    }

    #[test]
    fn test_upsert_contact_is_additive() {
        let db = test_db();
        db.upsert_contact(&sample_contact()).expect("first upsert");
        let mut updated = sample_contact();
        updated.emails = vec!["jane@buyer.com".to_string(), "new@buyer.com".to_string()];
        updated.phones = vec![];
        db.upsert_contact(&updated).expect("second upsert");

        let emails = db.get_contact_emails("c1").expect("emails");
        assert_eq!(emails.len(), 3);
        assert!(emails.contains(&"new@buyer.com".to_string()));
        assert_eq!(db.get_contact_phones("c1").expect("phones").len(), 2);
    }

    #[test]
    fn test_missing_contact_returns_none() {
        let db = test_db();
        assert!(db.get_contact("nope").expect("query").is_none());
    }

    #[test]
    fn test_transaction_contacts_in_assignment_order() {
        let db = test_db();
        db.upsert_transaction(&DbTransaction {
            id: "t1".to_string(),
            user_id: "u1".to_string(),
            property_address: Some("123 Oak St, Portland, OR".to_string()),
            status: "active".to_string(),
            started_at: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            closed_at: None,
        })
        .expect("upsert transaction");
        db.assign_contact_to_transaction("t1", "c2", "seller").expect("assign");
        db.assign_contact_to_transaction("t1", "c1", "buyer").expect("assign");
        db.assign_contact_to_transaction("t1", "c1", "buyer").expect("assign twice");

        let assigned = db.get_transaction_contacts("t1").expect("query");
        let ids: Vec<&str> = assigned.iter().map(|c| c.contact_id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c1"]);

        let txn = db.get_transaction("t1").expect("query").expect("exists");
        assert_eq!(txn.property_address.as_deref(), Some("123 Oak St, Portland, OR"));
    }
}
