// 🗄️ SQLite Store - Customer documents as JSON rows + WAL
// Each customer is one JSON document; tracking and contact indexes are
// plain tables written inside the same transaction as the document.

use chrono::Utc;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

use super::{contact_entries, CardLocator, ContactKind, CustomerStore};
use crate::error::StoreError;
use crate::model::{Customer, TrackingIdKind};

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn customer_count(&self) -> Result<i64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM customers", [], |row| row.get(0))?;
        Ok(count)
    }
}

pub fn setup_database(conn: &Connection) -> Result<(), StoreError> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Customer documents
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS customers (
            customer_id TEXT PRIMARY KEY,
            version INTEGER NOT NULL,
            document TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Secondary indexes
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tracking_index (
            kind TEXT NOT NULL,
            value TEXT NOT NULL,
            customer_id TEXT NOT NULL,
            card_id TEXT NOT NULL,
            PRIMARY KEY (kind, value)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS contact_index (
            kind TEXT NOT NULL,
            value TEXT NOT NULL,
            customer_id TEXT NOT NULL,
            PRIMARY KEY (kind, value)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tracking_customer ON tracking_index(customer_id)",
        [],
    )?;

    Ok(())
}

fn decode(document: &str, version: i64) -> Result<Customer, StoreError> {
    let mut customer: Customer = serde_json::from_str(document)?;
    customer.version = version;
    Ok(customer)
}

impl CustomerStore for SqliteStore {
    fn load(&self, customer_id: &str) -> Result<Option<Customer>, StoreError> {
        let row: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT document, version FROM customers WHERE customer_id = ?1",
                params![customer_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(document, version)| decode(&document, version)).transpose()
    }

    fn save(&self, customer: &Customer) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;

        let stored_version: Option<i64> = tx
            .query_row(
                "SELECT version FROM customers WHERE customer_id = ?1",
                params![customer.customer_id],
                |row| row.get(0),
            )
            .optional()?;
        let found = stored_version.unwrap_or(0);
        if found != customer.version {
            return Err(StoreError::VersionConflict {
                customer_id: customer.customer_id.clone(),
                expected: customer.version,
                found,
            });
        }

        let mut next = customer.clone();
        next.version = found + 1;
        let document = serde_json::to_string(&next)?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO customers (customer_id, version, document, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(customer_id) DO UPDATE SET
                version = excluded.version,
                document = excluded.document,
                updated_at = excluded.updated_at",
            params![next.customer_id, next.version, document, now],
        )?;

        for card in &next.cards {
            for (kind, value) in &card.tracking_ids {
                let existing: Option<(String, String)> = tx
                    .query_row(
                        "SELECT customer_id, card_id FROM tracking_index WHERE kind = ?1 AND value = ?2",
                        params![kind.as_str(), value],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                match existing {
                    Some((owner, existing_card)) if owner != next.customer_id || existing_card != card.card_id => {
                        return Err(StoreError::IndexConflict {
                            kind: *kind,
                            value: value.clone(),
                            existing_card,
                            card_id: card.card_id.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        tx.execute(
                            "INSERT INTO tracking_index (kind, value, customer_id, card_id) VALUES (?1, ?2, ?3, ?4)",
                            params![kind.as_str(), value, next.customer_id, card.card_id],
                        )?;
                    }
                }
            }
        }

        // Contacts follow the current document; superseded values stop matching
        tx.execute(
            "DELETE FROM contact_index WHERE customer_id = ?1",
            params![next.customer_id],
        )?;
        for (kind, value) in contact_entries(&next) {
            tx.execute(
                "INSERT INTO contact_index (kind, value, customer_id) VALUES (?1, ?2, ?3)
                 ON CONFLICT(kind, value) DO UPDATE SET customer_id = excluded.customer_id",
                params![kind.as_str(), value, next.customer_id],
            )?;
        }

        tx.commit()?;
        debug!("Saved customer {} at version {}", next.customer_id, next.version);
        Ok(())
    }

    fn find_card(&self, kind: TrackingIdKind, value: &str) -> Result<Option<CardLocator>, StoreError> {
        let locator = self
            .conn
            .query_row(
                "SELECT customer_id, card_id FROM tracking_index WHERE kind = ?1 AND value = ?2",
                params![kind.as_str(), value],
                |row| {
                    Ok(CardLocator {
                        customer_id: row.get(0)?,
                        card_id: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(locator)
    }

    fn find_customer_by_contact(&self, kind: ContactKind, value: &str) -> Result<Option<String>, StoreError> {
        let customer_id = self
            .conn
            .query_row(
                "SELECT customer_id FROM contact_index WHERE kind = ?1 AND value = ?2",
                params![kind.as_str(), value],
                |row| row.get(0),
            )
            .optional()?;
        Ok(customer_id)
    }

    fn scan(&self) -> Result<Vec<Customer>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT document, version FROM customers ORDER BY customer_id")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|(document, version)| decode(document, *version))
            .collect()
    }
}
