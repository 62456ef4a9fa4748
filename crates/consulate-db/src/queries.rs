use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};

use consulate_types::models::{ApplicationKind, ApplicationStatus};

use crate::Database;
use crate::models::{ApplicationRow, HistoryRow, UserRow, now_timestamp};

/// Columns every application table shares, in select order.
const BASE_COLUMNS: &str =
    "id, user_name, status, tracking_number, shipping_carrier, created_at, updated_at";
const BASE_COLUMN_COUNT: usize = 7;

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        full_name: &str,
        is_admin: bool,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, password_hash, full_name, is_admin, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![username, password_hash, full_name, is_admin, now_timestamp()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", &username))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &id))
    }

    pub fn count_users(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?))
    }

    // -- Applications --

    /// Insert a new application owned by `user_name`. `form` is keyed by wire
    /// name; keys outside the kind's catalogue are ignored.
    pub fn insert_application(
        &self,
        kind: ApplicationKind,
        user_name: &str,
        form: &BTreeMap<&str, String>,
    ) -> Result<i64> {
        let fields = kind.form_fields();
        let now = now_timestamp();

        let mut columns = vec!["user_name", "status", "created_at", "updated_at"];
        let mut values: Vec<Option<String>> = vec![
            Some(user_name.to_string()),
            Some(ApplicationStatus::Pending.as_str().to_string()),
            Some(now.clone()),
            Some(now),
        ];
        for field in fields {
            columns.push(field.column);
            values.push(form.get(field.key).cloned());
        }

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            kind.table(),
            columns.join(", "),
            placeholders.join(", ")
        );

        self.with_conn(|conn| {
            conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_application(&self, kind: ApplicationKind, id: i64) -> Result<Option<ApplicationRow>> {
        let sql = format!("{} WHERE id = ?1", select_application(kind));
        self.with_conn(|conn| {
            Ok(conn
                .query_row(&sql, [id], |row| read_application(kind, row))
                .optional()?)
        })
    }

    /// Every application of `kind`, newest first.
    pub fn list_applications(&self, kind: ApplicationKind) -> Result<Vec<ApplicationRow>> {
        let sql = format!("{} ORDER BY created_at DESC, id DESC", select_application(kind));
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| read_application(kind, row))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_applications_for_user(
        &self,
        kind: ApplicationKind,
        user_name: &str,
    ) -> Result<Vec<ApplicationRow>> {
        let sql = format!(
            "{} WHERE user_name = ?1 ORDER BY created_at DESC, id DESC",
            select_application(kind)
        );
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_name], |row| read_application(kind, row))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Move an application to `status`, appending one history row. Runs in a
    /// single immediate transaction so concurrent transitions serialize and
    /// every one of them lands in the history.
    ///
    /// Returns the previous status, or `None` if the application is absent
    /// (in which case nothing is written).
    pub fn record_status_change(
        &self,
        kind: ApplicationKind,
        id: i64,
        status: ApplicationStatus,
        changed_by: &str,
    ) -> Result<Option<String>> {
        let table = kind.table();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let previous: Option<String> = tx
                .query_row(&format!("SELECT status FROM {table} WHERE id = ?1"), [id], |r| {
                    r.get(0)
                })
                .optional()?;
            let Some(previous) = previous else {
                return Ok(None);
            };

            let now = now_timestamp();
            tx.execute(
                "INSERT INTO application_status_history
                    (application_kind, application_id, status, previous_status, changed_by, changed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![kind.slug(), id, status.as_str(), &previous, changed_by, &now],
            )?;
            tx.execute(
                &format!("UPDATE {table} SET status = ?1, updated_at = ?2 WHERE id = ?3"),
                rusqlite::params![status.as_str(), &now, id],
            )?;
            tx.commit()?;

            Ok(Some(previous))
        })
    }

    /// Attach shipment details. Returns false if the application is absent.
    pub fn assign_tracking(
        &self,
        kind: ApplicationKind,
        id: i64,
        tracking_number: &str,
        carrier: Option<&str>,
    ) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET tracking_number = ?1, shipping_carrier = ?2, updated_at = ?3 WHERE id = ?4",
            kind.table()
        );
        self.with_conn(|conn| {
            let changed = conn.execute(
                &sql,
                rusqlite::params![tracking_number, carrier, now_timestamp(), id],
            )?;
            Ok(changed > 0)
        })
    }

    /// History of one application, oldest first.
    pub fn status_history(&self, kind: ApplicationKind, id: i64) -> Result<Vec<HistoryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, application_id, status, previous_status, changed_by, changed_at
                 FROM application_status_history
                 WHERE application_kind = ?1 AND application_id = ?2
                 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![kind.slug(), id], read_history)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch histories for a set of applications of one kind.
    pub fn status_histories(
        &self,
        kind: ApplicationKind,
        ids: &[i64],
    ) -> Result<HashMap<i64, Vec<HistoryRow>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (2..=ids.len() + 1).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, application_id, status, previous_status, changed_by, changed_at
                 FROM application_status_history
                 WHERE application_kind = ?1 AND application_id IN ({})
                 ORDER BY id ASC",
                placeholders.join(", ")
            );

            let mut params: Vec<&dyn rusqlite::types::ToSql> = Vec::with_capacity(ids.len() + 1);
            let slug = kind.slug();
            params.push(&slug);
            params.extend(ids.iter().map(|id| id as &dyn rusqlite::types::ToSql));

            let mut stmt = conn.prepare(&sql)?;
            let mut grouped: HashMap<i64, Vec<HistoryRow>> = HashMap::new();
            for row in stmt.query_map(params.as_slice(), read_history)? {
                let row = row?;
                grouped.entry(row.application_id).or_default().push(row);
            }
            Ok(grouped)
        })
    }

    /// `(status, count)` pairs for one kind.
    pub fn count_by_status(&self, kind: ApplicationKind) -> Result<Vec<(String, i64)>> {
        let sql = format!(
            "SELECT status, COUNT(*) FROM {} GROUP BY status ORDER BY status",
            kind.table()
        );
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(
    conn: &Connection,
    predicate: &str,
    value: &dyn rusqlite::types::ToSql,
) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, username, password_hash, full_name, is_admin, created_at FROM users WHERE {predicate}"
    ))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password_hash: row.get(2)?,
                full_name: row.get(3)?,
                is_admin: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn select_application(kind: ApplicationKind) -> String {
    let form_columns: Vec<&str> = kind.form_fields().iter().map(|f| f.column).collect();
    format!(
        "SELECT {}, {} FROM {}",
        BASE_COLUMNS,
        form_columns.join(", "),
        kind.table()
    )
}

fn read_application(kind: ApplicationKind, row: &Row<'_>) -> rusqlite::Result<ApplicationRow> {
    let mut fields = Vec::with_capacity(kind.form_fields().len());
    for (i, field) in kind.form_fields().iter().enumerate() {
        fields.push((field.key, row.get::<_, Option<String>>(BASE_COLUMN_COUNT + i)?));
    }

    Ok(ApplicationRow {
        id: row.get(0)?,
        kind,
        user_name: row.get(1)?,
        status: row.get(2)?,
        tracking_number: row.get(3)?,
        shipping_carrier: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        fields,
    })
}

fn read_history(row: &Row<'_>) -> rusqlite::Result<HistoryRow> {
    Ok(HistoryRow {
        id: row.get(0)?,
        application_id: row.get(1)?,
        status: row.get(2)?,
        previous_status: row.get(3)?,
        changed_by: row.get(4)?,
        changed_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_unique_violation;

    fn db_with_user(username: &str) -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user(username, "hash", "Test User", false).unwrap();
        db
    }

    fn visa_form() -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("fullName", "Ada Lovelace".to_string()),
            ("email", "ada@example.com".to_string()),
            ("visaType", "shortStay".to_string()),
        ])
    }

    #[test]
    fn duplicate_username_is_a_unique_violation() {
        let db = db_with_user("ada@example.com");
        let err = db
            .create_user("ada@example.com", "other", "Someone", false)
            .unwrap_err();
        assert!(is_unique_violation(&err));
        assert_eq!(db.count_users().unwrap(), 1);
    }

    #[test]
    fn users_are_found_by_name_and_id() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_user("admin@consulate.gov", "h", "Admin", true).unwrap();

        let by_name = db.get_user_by_username("admin@consulate.gov").unwrap().unwrap();
        assert_eq!(by_name.id, id);
        assert!(by_name.is_admin);
        assert!(db.get_user_by_id(id).unwrap().is_some());
        assert!(db.get_user_by_username("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn inserted_application_starts_pending() {
        let db = db_with_user("ada@example.com");
        let id = db
            .insert_application(ApplicationKind::Visa, "ada@example.com", &visa_form())
            .unwrap();

        let row = db.get_application(ApplicationKind::Visa, id).unwrap().unwrap();
        assert_eq!(row.status, "pending");
        assert_eq!(row.user_name, "ada@example.com");
        assert_eq!(row.field("visaType"), Some("shortStay"));
        assert_eq!(row.field("passportNumber"), None);
        assert!(row.tracking_number.is_none());

        // Ids are per table.
        assert!(db.get_application(ApplicationKind::Marriage, id).unwrap().is_none());
    }

    #[test]
    fn status_change_appends_history() {
        let db = db_with_user("ada@example.com");
        let id = db
            .insert_application(ApplicationKind::Visa, "ada@example.com", &visa_form())
            .unwrap();

        let prev = db
            .record_status_change(ApplicationKind::Visa, id, ApplicationStatus::UnderReview, "admin")
            .unwrap();
        assert_eq!(prev.as_deref(), Some("pending"));
        let prev = db
            .record_status_change(ApplicationKind::Visa, id, ApplicationStatus::Approved, "admin")
            .unwrap();
        assert_eq!(prev.as_deref(), Some("under_review"));

        let history = db.status_history(ApplicationKind::Visa, id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, "under_review");
        assert_eq!(history[0].previous_status.as_deref(), Some("pending"));
        assert_eq!(history[1].status, "approved");
        assert_eq!(history[1].previous_status.as_deref(), Some("under_review"));

        let row = db.get_application(ApplicationKind::Visa, id).unwrap().unwrap();
        assert_eq!(row.status, "approved");
    }

    #[test]
    fn status_change_on_missing_application_writes_nothing() {
        let db = Database::open_in_memory().unwrap();
        let prev = db
            .record_status_change(ApplicationKind::Marriage, 99, ApplicationStatus::Approved, "admin")
            .unwrap();
        assert!(prev.is_none());
        assert!(db.status_history(ApplicationKind::Marriage, 99).unwrap().is_empty());
    }

    #[test]
    fn histories_are_grouped_per_application() {
        let db = db_with_user("ada@example.com");
        let a = db
            .insert_application(ApplicationKind::Visa, "ada@example.com", &visa_form())
            .unwrap();
        let b = db
            .insert_application(ApplicationKind::Visa, "ada@example.com", &visa_form())
            .unwrap();
        db.record_status_change(ApplicationKind::Visa, a, ApplicationStatus::Denied, "admin")
            .unwrap();
        db.record_status_change(ApplicationKind::Visa, b, ApplicationStatus::Approved, "admin")
            .unwrap();
        db.record_status_change(ApplicationKind::Visa, b, ApplicationStatus::Shipped, "admin")
            .unwrap();

        let grouped = db.status_histories(ApplicationKind::Visa, &[a, b]).unwrap();
        assert_eq!(grouped[&a].len(), 1);
        assert_eq!(grouped[&b].len(), 2);
        assert_eq!(grouped[&b][1].status, "shipped");

        let listed = db.list_applications(ApplicationKind::Visa).unwrap();
        assert_eq!(listed.first().map(|r| r.id), Some(b));

        let counts = db.count_by_status(ApplicationKind::Visa).unwrap();
        assert_eq!(
            counts,
            vec![("denied".to_string(), 1), ("shipped".to_string(), 1)]
        );
    }

    #[test]
    fn tracking_is_stored_without_history() {
        let db = db_with_user("ada@example.com");
        let id = db
            .insert_application(ApplicationKind::Visa, "ada@example.com", &visa_form())
            .unwrap();

        assert!(db
            .assign_tracking(ApplicationKind::Visa, id, "1Z999", Some("ups"))
            .unwrap());
        assert!(!db
            .assign_tracking(ApplicationKind::Visa, id + 1, "1Z999", None)
            .unwrap());

        let row = db.get_application(ApplicationKind::Visa, id).unwrap().unwrap();
        assert_eq!(row.tracking_number.as_deref(), Some("1Z999"));
        assert_eq!(row.shipping_carrier.as_deref(), Some("ups"));
        assert!(db.status_history(ApplicationKind::Visa, id).unwrap().is_empty());
    }

    #[test]
    fn user_listing_filters_by_owner() {
        let db = db_with_user("ada@example.com");
        db.create_user("bob@example.com", "h", "Bob", false).unwrap();
        db.insert_application(ApplicationKind::Visa, "ada@example.com", &visa_form())
            .unwrap();
        db.insert_application(ApplicationKind::Visa, "bob@example.com", &visa_form())
            .unwrap();

        let ada = db
            .list_applications_for_user(ApplicationKind::Visa, "ada@example.com")
            .unwrap();
        assert_eq!(ada.len(), 1);
        assert_eq!(ada[0].user_name, "ada@example.com");
    }

    #[test]
    fn concurrent_status_changes_both_reach_history() {
        let dir = std::env::temp_dir().join(format!("consulate-race-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("race.db");
        let _ = std::fs::remove_file(&path);

        let db = Database::open(&path, 4).unwrap();
        db.create_user("ada@example.com", "h", "Ada", false).unwrap();
        let id = db
            .insert_application(ApplicationKind::Visa, "ada@example.com", &visa_form())
            .unwrap();

        let handles: Vec<_> = [ApplicationStatus::Approved, ApplicationStatus::Denied]
            .into_iter()
            .map(|status| {
                let db = db.clone();
                std::thread::spawn(move || {
                    db.record_status_change(ApplicationKind::Visa, id, status, "admin")
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_some());
        }

        let history = db.status_history(ApplicationKind::Visa, id).unwrap();
        assert_eq!(history.len(), 2);
        // The second transition saw the first one's result.
        assert_eq!(history[0].previous_status.as_deref(), Some("pending"));
        assert_eq!(history[1].previous_status.as_deref(), Some(history[0].status.as_str()));

        let final_status = db.get_application(ApplicationKind::Visa, id).unwrap().unwrap().status;
        assert_eq!(final_status, history[1].status);

        drop(db);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
