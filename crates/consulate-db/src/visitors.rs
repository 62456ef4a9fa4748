use anyhow::Result;

use crate::Database;
use crate::models::{VisitRow, now_timestamp};

/// A page view as recorded by the tracking endpoint.
pub struct NewVisit<'a> {
    pub session_id: Option<&'a str>,
    pub page_path: &'a str,
    pub referrer: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub ip_hash: Option<&'a str>,
    pub user_id: Option<i64>,
}

pub struct VisitTotals {
    pub total_views: i64,
    pub unique_sessions: i64,
    pub views_since: i64,
    pub top_pages: Vec<(String, i64)>,
}

impl Database {
    pub fn insert_visit(&self, visit: &NewVisit<'_>) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO visitor_logs
                    (session_id, page_path, referrer, user_agent, ip_hash, user_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    visit.session_id,
                    visit.page_path,
                    visit.referrer,
                    visit.user_agent,
                    visit.ip_hash,
                    visit.user_id,
                    now_timestamp(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn recent_visits(&self, limit: u32) -> Result<Vec<VisitRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, page_path, referrer, user_agent, ip_hash, user_id, created_at
                 FROM visitor_logs
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(VisitRow {
                        id: row.get(0)?,
                        session_id: row.get(1)?,
                        page_path: row.get(2)?,
                        referrer: row.get(3)?,
                        user_agent: row.get(4)?,
                        ip_hash: row.get(5)?,
                        user_id: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Aggregate counters. `since` is a stored-format timestamp bounding
    /// `views_since`; `top` caps the page ranking.
    pub fn visitor_totals(&self, since: &str, top: u32) -> Result<VisitTotals> {
        self.with_conn(|conn| {
            let (total_views, unique_sessions): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COUNT(DISTINCT session_id) FROM visitor_logs",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            let views_since: i64 = conn.query_row(
                "SELECT COUNT(*) FROM visitor_logs WHERE created_at >= ?1",
                [since],
                |r| r.get(0),
            )?;

            let mut stmt = conn.prepare(
                "SELECT page_path, COUNT(*) AS views FROM visitor_logs
                 GROUP BY page_path
                 ORDER BY views DESC, page_path ASC
                 LIMIT ?1",
            )?;
            let top_pages = stmt
                .query_map([top], |r| Ok((r.get(0)?, r.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(VisitTotals {
                total_views,
                unique_sessions,
                views_since,
                top_pages,
            })
        })
    }
}
