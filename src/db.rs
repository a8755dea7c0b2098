use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::engine::{Participant, ReceiptItem};

/// Archived split, scoped to the owner who saved it.
/// Items and participants are stored as JSON columns - the split engine is
/// the only thing that interprets their structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    /// Stable identity (UUID)
    pub id: String,

    /// Owning user id
    pub owner: String,

    pub vendor: String,
    pub total: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    pub items: Vec<ReceiptItem>,
    pub participants: Vec<Participant>,

    pub created_at: DateTime<Utc>,
}

impl Receipt {
    pub fn new(
        owner: &str,
        vendor: &str,
        total: f64,
        image_url: Option<String>,
        items: Vec<ReceiptItem>,
        participants: Vec<Participant>,
    ) -> Self {
        Receipt {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            vendor: vendor.to_string(),
            total,
            image_url,
            items,
            participants,
            created_at: Utc::now(),
        }
    }
}

/// Per-user settings used when composing share messages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub account_name: String,
    pub payment_info: String,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Receipts Table (archived splits)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS receipts (
            id TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            vendor TEXT NOT NULL,
            total REAL NOT NULL,
            image_url TEXT,
            json_items TEXT NOT NULL,
            json_participants TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Profiles Table (share-message settings)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS profiles (
            user_id TEXT PRIMARY KEY,
            account_name TEXT NOT NULL DEFAULT '',
            payment_info TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    // ==========================================================================
    // Users Table (identity backing store)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            salt TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_receipts_owner ON receipts(owner)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_receipts_created ON receipts(created_at)",
        [],
    )?;

    Ok(())
}

pub fn insert_receipt(conn: &Connection, receipt: &Receipt) -> Result<()> {
    let items_json = serde_json::to_string(&receipt.items)?;
    let participants_json = serde_json::to_string(&receipt.participants)?;

    conn.execute(
        "INSERT INTO receipts (
            id, owner, vendor, total, image_url, json_items, json_participants, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            receipt.id,
            receipt.owner,
            receipt.vendor,
            receipt.total,
            receipt.image_url,
            items_json,
            participants_json,
            receipt.created_at.to_rfc3339(),
        ],
    )?;

    Ok(())
}

/// History view: the owner's archived splits, newest first.
pub fn get_receipts_for_owner(conn: &Connection, owner: &str) -> Result<Vec<Receipt>> {
    let mut stmt = conn.prepare(
        "SELECT id, owner, vendor, total, image_url, json_items, json_participants, created_at
         FROM receipts
         WHERE owner = ?1
         ORDER BY created_at DESC",
    )?;

    let receipts = stmt
        .query_map(params![owner], |row| {
            let items_json: String = row.get(5)?;
            let participants_json: String = row.get(6)?;
            let created_at_str: String = row.get(7)?;

            Ok(Receipt {
                id: row.get(0)?,
                owner: row.get(1)?,
                vendor: row.get(2)?,
                total: row.get(3)?,
                image_url: row.get(4)?,
                items: serde_json::from_str(&items_json).unwrap_or_default(),
                participants: serde_json::from_str(&participants_json).unwrap_or_default(),
                created_at: DateTime::parse_from_rfc3339(&created_at_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(receipts)
}

/// Delete one archived split. Owner-scoped so a user can only delete their
/// own rows. Returns whether a row was actually removed.
pub fn delete_receipt(conn: &Connection, owner: &str, receipt_id: &str) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM receipts WHERE id = ?1 AND owner = ?2",
        params![receipt_id, owner],
    )?;

    Ok(deleted > 0)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM receipts", [], |row| row.get(0))?;

    Ok(count)
}

pub fn get_profile(conn: &Connection, user_id: &str) -> Result<Option<UserProfile>> {
    let profile = conn
        .query_row(
            "SELECT account_name, payment_info FROM profiles WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(UserProfile {
                    account_name: row.get(0)?,
                    payment_info: row.get(1)?,
                })
            },
        )
        .optional()?;

    Ok(profile)
}

pub fn upsert_profile(conn: &Connection, user_id: &str, profile: &UserProfile) -> Result<()> {
    conn.execute(
        "INSERT INTO profiles (user_id, account_name, payment_info)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id) DO UPDATE SET
            account_name = excluded.account_name,
            payment_info = excluded.payment_info",
        params![user_id, profile.account_name, profile.payment_info],
    )?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_receipt(owner: &str, vendor: &str) -> Receipt {
        Receipt::new(
            owner,
            vendor,
            700.0,
            None,
            vec![
                ReceiptItem::new("Burger", 500.0),
                ReceiptItem::new("Fries", 200.0),
            ],
            vec![Participant::new("Ali"), Participant::new("Sara")],
        )
    }

    #[test]
    fn test_insert_and_list_roundtrip() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let receipt = test_receipt("user-1", "Cafe Lahore");
        insert_receipt(&conn, &receipt).unwrap();

        let receipts = get_receipts_for_owner(&conn, "user-1").unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].vendor, "Cafe Lahore");
        assert_eq!(receipts[0].items.len(), 2);
        assert_eq!(receipts[0].items[0].text, "Burger");
        assert_eq!(receipts[0].participants.len(), 2);
        assert_eq!(verify_count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_list_is_owner_scoped_and_recency_ordered() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let mut older = test_receipt("user-1", "First Diner");
        older.created_at = Utc::now() - chrono::Duration::hours(2);
        insert_receipt(&conn, &older).unwrap();
        insert_receipt(&conn, &test_receipt("user-1", "Second Diner")).unwrap();
        insert_receipt(&conn, &test_receipt("user-2", "Other Diner")).unwrap();

        let receipts = get_receipts_for_owner(&conn, "user-1").unwrap();
        assert_eq!(receipts.len(), 2);
        // Newest first
        assert_eq!(receipts[0].vendor, "Second Diner");
        assert_eq!(receipts[1].vendor, "First Diner");
    }

    #[test]
    fn test_delete_is_owner_scoped() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let receipt = test_receipt("user-1", "Cafe");
        insert_receipt(&conn, &receipt).unwrap();

        // Wrong owner: nothing happens
        assert!(!delete_receipt(&conn, "user-2", &receipt.id).unwrap());
        assert_eq!(verify_count(&conn).unwrap(), 1);

        assert!(delete_receipt(&conn, "user-1", &receipt.id).unwrap());
        assert_eq!(verify_count(&conn).unwrap(), 0);
    }

    #[test]
    fn test_profile_upsert_and_get() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        assert!(get_profile(&conn, "user-1").unwrap().is_none());

        upsert_profile(
            &conn,
            "user-1",
            &UserProfile {
                account_name: "Ali".to_string(),
                payment_info: "easypaisa 0300-1234567".to_string(),
            },
        )
        .unwrap();

        let profile = get_profile(&conn, "user-1").unwrap().unwrap();
        assert_eq!(profile.account_name, "Ali");

        // Second upsert overwrites
        upsert_profile(
            &conn,
            "user-1",
            &UserProfile {
                account_name: "Ali Khan".to_string(),
                payment_info: "jazzcash 0301-7654321".to_string(),
            },
        )
        .unwrap();

        let profile = get_profile(&conn, "user-1").unwrap().unwrap();
        assert_eq!(profile.account_name, "Ali Khan");
        assert_eq!(profile.payment_info, "jazzcash 0301-7654321");
    }
}
