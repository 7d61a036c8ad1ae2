use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Params, Transaction};

use crate::error::{Error, Result, StorageError};
use crate::models::{
    CaptureRole, DeltaKind, DiffDelta, DiffPatch, DiffResult, HtmlSnapshot, MonitoredUrl,
    NewSnapshot, PatchId, PatchStats, PollId, PollingTime, ResultId, ResultSummary, SnapshotId,
    UrlId,
};
use crate::util;

/// Record store consumed by the diff core.
///
/// Every method that writes more than one row does so atomically: either all
/// rows are visible afterwards or none are.
pub trait Store: Send + Sync {
    fn save_url(&self, url: &str, created_at: DateTime<Utc>) -> Result<MonitoredUrl>;
    fn find_url(&self, id: UrlId) -> Result<Option<MonitoredUrl>>;
    fn list_urls(&self) -> Result<Vec<MonitoredUrl>>;
    fn set_url_active(&self, id: UrlId, active: bool) -> Result<()>;
    /// Hard delete; cascades to the URL's snapshots and results.
    fn delete_url(&self, id: UrlId) -> Result<()>;

    fn persist_snapshot(&self, snapshot: &NewSnapshot) -> Result<HtmlSnapshot>;
    /// Snapshots of one URL ordered by capture time, then id.
    fn list_snapshots(&self, url_id: UrlId) -> Result<Vec<HtmlSnapshot>>;
    /// Greatest capture time for the role, ties going to the higher id.
    fn latest_snapshot(&self, url_id: UrlId, role: CaptureRole) -> Result<Option<HtmlSnapshot>>;

    fn persist_diff_result(&self, result: &DiffResult) -> Result<ResultId>;
    fn load_diff_result(&self, id: ResultId) -> Result<Option<DiffResult>>;
    /// Removes the result, its patch, and the snapshots no other result references.
    fn delete_diff_result(&self, id: ResultId) -> Result<()>;
    /// Newest first.
    fn list_diff_results(&self, url_id: UrlId) -> Result<Vec<ResultSummary>>;

    fn record_poll(&self, polled_at: DateTime<Utc>, success: bool) -> Result<PollingTime>;
    fn last_poll(&self) -> Result<Option<PollingTime>>;
}

pub struct StorageEngine {
    conn: Mutex<Connection>,
}

impl StorageEngine {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            util::ensure_dir(parent)?;
        }
        let mut conn = Connection::open(path)?;
        init_db(&mut conn)?;
        tracing::debug!(db = %path.display(), "opened snapshot store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        init_db(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned.into())
    }
}

impl Store for StorageEngine {
    fn save_url(&self, url: &str, created_at: DateTime<Utc>) -> Result<MonitoredUrl> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO monitored_urls (url, active, created_at) VALUES (?1, 1, ?2)",
            params![url, created_at.timestamp_millis()],
        )?;
        let id = UrlId(conn.last_insert_rowid());
        Ok(MonitoredUrl {
            id,
            url: url.to_string(),
            active: true,
            created_at: from_millis(created_at.timestamp_millis())?,
        })
    }

    fn find_url(&self, id: UrlId) -> Result<Option<MonitoredUrl>> {
        let conn = self.conn()?;
        find_url_in(&conn, id)
    }

    fn list_urls(&self) -> Result<Vec<MonitoredUrl>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, url, active, created_at FROM monitored_urls ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(id, url, active, created_at)| -> Result<MonitoredUrl> {
                Ok(MonitoredUrl {
                    id: UrlId(id),
                    url,
                    active,
                    created_at: from_millis(created_at)?,
                })
            })
            .collect()
    }

    fn set_url_active(&self, id: UrlId, active: bool) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE monitored_urls SET active = ?1 WHERE id = ?2",
            params![active, id.0],
        )?;
        if changed == 0 {
            return Err(Error::not_found(format!("url {id}")));
        }
        Ok(())
    }

    fn delete_url(&self, id: UrlId) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM monitored_urls WHERE id = ?1", params![id.0])?;
        if changed == 0 {
            return Err(Error::not_found(format!("url {id}")));
        }
        Ok(())
    }

    fn persist_snapshot(&self, snapshot: &NewSnapshot) -> Result<HtmlSnapshot> {
        let compressed = compress_body(&snapshot.body)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if find_url_in(&tx, snapshot.url_id)?.is_none() {
            return Err(Error::not_found(format!("url {}", snapshot.url_id)));
        }
        tx.execute(
            "INSERT INTO html_snapshots (url_id, role, body, body_hash, captured_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snapshot.url_id.0,
                snapshot.role.as_str(),
                compressed,
                snapshot.body_hash,
                snapshot.captured_at.timestamp_millis()
            ],
        )?;
        let id = SnapshotId(tx.last_insert_rowid());
        tx.commit()?;
        Ok(HtmlSnapshot {
            id,
            url_id: snapshot.url_id,
            role: snapshot.role,
            body: snapshot.body.clone(),
            body_hash: snapshot.body_hash.clone(),
            captured_at: from_millis(snapshot.captured_at.timestamp_millis())?,
        })
    }

    fn list_snapshots(&self, url_id: UrlId) -> Result<Vec<HtmlSnapshot>> {
        let conn = self.conn()?;
        query_snapshots(
            &conn,
            "SELECT id, url_id, role, body, body_hash, captured_at FROM html_snapshots WHERE url_id = ?1 ORDER BY captured_at ASC, id ASC",
            params![url_id.0],
        )
    }

    fn latest_snapshot(&self, url_id: UrlId, role: CaptureRole) -> Result<Option<HtmlSnapshot>> {
        let conn = self.conn()?;
        let mut latest = query_snapshots(
            &conn,
            "SELECT id, url_id, role, body, body_hash, captured_at FROM html_snapshots WHERE url_id = ?1 AND role = ?2 ORDER BY captured_at DESC, id DESC LIMIT 1",
            params![url_id.0, role.as_str()],
        )?;
        Ok(latest.pop())
    }

    fn persist_diff_result(&self, result: &DiffResult) -> Result<ResultId> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if find_url_in(&tx, result.url_id)?.is_none() {
            return Err(Error::not_found(format!("url {}", result.url_id)));
        }
        for snapshot in &result.snapshots {
            let owner: Option<i64> = tx
                .query_row(
                    "SELECT url_id FROM html_snapshots WHERE id = ?1",
                    params![snapshot.id.0],
                    |row| row.get(0),
                )
                .optional()?;
            match owner {
                Some(owner) if owner == result.url_id.0 => {}
                Some(owner) => {
                    return Err(Error::validation(format!(
                        "snapshot {} belongs to url {owner}, not {}",
                        snapshot.id, result.url_id
                    )))
                }
                None => {
                    return Err(Error::validation(format!(
                        "snapshot {} has not been recorded",
                        snapshot.id
                    )))
                }
            }
        }

        let stats_json = serde_json::to_string(&result.patch.stats())?;
        tx.execute(
            "INSERT INTO diff_results (url_id, captured_at, stats_json) VALUES (?1, ?2, ?3)",
            params![
                result.url_id.0,
                result.captured_at.timestamp_millis(),
                stats_json
            ],
        )?;
        let result_id = ResultId(tx.last_insert_rowid());
        tx.execute(
            "INSERT INTO diff_patches (result_id, created_at) VALUES (?1, ?2)",
            params![result_id.0, result.patch.created_at.timestamp_millis()],
        )?;
        let patch_id = PatchId(tx.last_insert_rowid());
        insert_deltas(&tx, patch_id, &result.patch.deltas)?;
        for snapshot in &result.snapshots {
            tx.execute(
                "INSERT OR IGNORE INTO diff_result_snapshots (result_id, snapshot_id) VALUES (?1, ?2)",
                params![result_id.0, snapshot.id.0],
            )?;
        }
        tx.commit()?;
        Ok(result_id)
    }

    fn load_diff_result(&self, id: ResultId) -> Result<Option<DiffResult>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT r.url_id, r.captured_at, p.id, p.created_at FROM diff_results r JOIN diff_patches p ON p.result_id = r.id WHERE r.id = ?1",
                params![id.0],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((url_id, captured_at, patch_id, created_at)) = row else {
            return Ok(None);
        };
        let deltas = load_deltas(&conn, PatchId(patch_id))?;
        let snapshots = query_snapshots(
            &conn,
            "SELECT s.id, s.url_id, s.role, s.body, s.body_hash, s.captured_at FROM html_snapshots s JOIN diff_result_snapshots l ON l.snapshot_id = s.id WHERE l.result_id = ?1 ORDER BY s.captured_at ASC, s.id ASC",
            params![id.0],
        )?;
        Ok(Some(DiffResult {
            id: Some(id),
            url_id: UrlId(url_id),
            captured_at: from_millis(captured_at)?,
            patch: DiffPatch {
                id: Some(PatchId(patch_id)),
                deltas,
                created_at: from_millis(created_at)?,
            },
            snapshots,
        }))
    }

    fn delete_diff_result(&self, id: ResultId) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let snapshot_ids = {
            let mut stmt =
                tx.prepare("SELECT snapshot_id FROM diff_result_snapshots WHERE result_id = ?1")?;
            let ids = stmt
                .query_map(params![id.0], |row| row.get::<_, i64>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            ids
        };
        let changed = tx.execute("DELETE FROM diff_results WHERE id = ?1", params![id.0])?;
        if changed == 0 {
            return Err(Error::not_found(format!("diff result {id}")));
        }
        let mut removed = 0usize;
        for snapshot_id in snapshot_ids {
            removed += tx.execute(
                "DELETE FROM html_snapshots WHERE id = ?1 AND NOT EXISTS (SELECT 1 FROM diff_result_snapshots WHERE snapshot_id = ?1)",
                params![snapshot_id],
            )?;
        }
        tx.commit()?;
        tracing::debug!(result_id = %id, snapshots_removed = removed, "deleted diff result");
        Ok(())
    }

    fn list_diff_results(&self, url_id: UrlId) -> Result<Vec<ResultSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, url_id, captured_at, stats_json FROM diff_results WHERE url_id = ?1 ORDER BY captured_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map(params![url_id.0], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(id, url_id, captured_at, stats_json)| -> Result<ResultSummary> {
                let stats: PatchStats = serde_json::from_str(&stats_json)?;
                Ok(ResultSummary {
                    id: ResultId(id),
                    url_id: UrlId(url_id),
                    captured_at: from_millis(captured_at)?,
                    stats,
                })
            })
            .collect()
    }

    fn record_poll(&self, polled_at: DateTime<Utc>, success: bool) -> Result<PollingTime> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO polling_times (polled_at, success) VALUES (?1, ?2)",
            params![polled_at.timestamp_millis(), success],
        )?;
        Ok(PollingTime {
            id: PollId(conn.last_insert_rowid()),
            polled_at: from_millis(polled_at.timestamp_millis())?,
            success,
        })
    }

    fn last_poll(&self) -> Result<Option<PollingTime>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, polled_at, success FROM polling_times ORDER BY polled_at DESC, id DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, polled_at, success)| -> Result<PollingTime> {
            Ok(PollingTime {
                id: PollId(id),
                polled_at: from_millis(polled_at)?,
                success,
            })
        })
        .transpose()
    }
}

fn init_db(conn: &mut Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", &"WAL")?;
    conn.pragma_update(None, "synchronous", &"NORMAL")?;
    conn.pragma_update(None, "foreign_keys", &true)?;
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS monitored_urls (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL,
            active INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS html_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url_id INTEGER NOT NULL REFERENCES monitored_urls(id) ON DELETE CASCADE,
            role TEXT NOT NULL,
            body BLOB NOT NULL,
            body_hash TEXT NOT NULL,
            captured_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_snapshots_url_time
            ON html_snapshots (url_id, captured_at, id);

        CREATE INDEX IF NOT EXISTS idx_snapshots_url_role_time
            ON html_snapshots (url_id, role, captured_at, id);

        CREATE TABLE IF NOT EXISTS diff_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url_id INTEGER NOT NULL REFERENCES monitored_urls(id) ON DELETE CASCADE,
            captured_at INTEGER NOT NULL,
            stats_json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS diff_patches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            result_id INTEGER NOT NULL UNIQUE REFERENCES diff_results(id) ON DELETE CASCADE,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS diff_deltas (
            patch_id INTEGER NOT NULL REFERENCES diff_patches(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            kind TEXT NOT NULL,
            source_position INTEGER NOT NULL,
            target_position INTEGER NOT NULL,
            source_lines TEXT NOT NULL,
            target_lines TEXT NOT NULL,
            PRIMARY KEY (patch_id, position)
        );

        CREATE TABLE IF NOT EXISTS diff_result_snapshots (
            result_id INTEGER NOT NULL REFERENCES diff_results(id) ON DELETE CASCADE,
            snapshot_id INTEGER NOT NULL REFERENCES html_snapshots(id) ON DELETE CASCADE,
            PRIMARY KEY (result_id, snapshot_id)
        );

        CREATE TABLE IF NOT EXISTS polling_times (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            polled_at INTEGER NOT NULL,
            success INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn find_url_in(conn: &Connection, id: UrlId) -> Result<Option<MonitoredUrl>> {
    let row = conn
        .query_row(
            "SELECT id, url, active, created_at FROM monitored_urls WHERE id = ?1",
            params![id.0],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )
        .optional()?;
    row.map(|(id, url, active, created_at)| -> Result<MonitoredUrl> {
        Ok(MonitoredUrl {
            id: UrlId(id),
            url,
            active,
            created_at: from_millis(created_at)?,
        })
    })
    .transpose()
}

fn query_snapshots<P: Params>(conn: &Connection, sql: &str, args: P) -> Result<Vec<HtmlSnapshot>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(args, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter()
        .map(|(id, url_id, role, body, body_hash, captured_at)| -> Result<HtmlSnapshot> {
            let role: CaptureRole = role
                .parse()
                .map_err(|_| StorageError::Corrupt(format!("snapshot {id} has role {role:?}")))?;
            Ok(HtmlSnapshot {
                id: SnapshotId(id),
                url_id: UrlId(url_id),
                role,
                body: decompress_body(&body)?,
                body_hash,
                captured_at: from_millis(captured_at)?,
            })
        })
        .collect()
}

fn insert_deltas(tx: &Transaction<'_>, patch_id: PatchId, deltas: &[DiffDelta]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO diff_deltas (patch_id, position, kind, source_position, target_position, source_lines, target_lines) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for (position, delta) in deltas.iter().enumerate() {
        stmt.execute(params![
            patch_id.0,
            position as i64,
            delta.kind().as_str(),
            delta.source_position() as i64,
            delta.target_position() as i64,
            serde_json::to_string(delta.source_lines())?,
            serde_json::to_string(delta.target_lines())?,
        ])?;
    }
    Ok(())
}

fn load_deltas(conn: &Connection, patch_id: PatchId) -> Result<Vec<DiffDelta>> {
    let mut stmt = conn.prepare(
        "SELECT kind, source_position, target_position, source_lines, target_lines FROM diff_deltas WHERE patch_id = ?1 ORDER BY position",
    )?;
    let rows = stmt
        .query_map(params![patch_id.0], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter()
        .map(|row| delta_from_row(patch_id, row))
        .collect()
}

type DeltaRow = (String, i64, i64, String, String);

fn delta_from_row(patch_id: PatchId, row: DeltaRow) -> Result<DiffDelta> {
    let (kind, source_position, target_position, source_lines, target_lines) = row;
    let kind: DeltaKind = kind
        .parse()
        .map_err(|_| StorageError::Corrupt(format!("patch {patch_id} delta kind {kind:?}")))?;
    let source_position = source_position as usize;
    let target_position = target_position as usize;
    let source_lines: Vec<String> = serde_json::from_str(&source_lines)?;
    let target_lines: Vec<String> = serde_json::from_str(&target_lines)?;
    match kind {
        DeltaKind::Insert if source_lines.is_empty() => Ok(DiffDelta::Insert {
            source_position,
            target_position,
            lines: target_lines,
        }),
        DeltaKind::Delete if target_lines.is_empty() => Ok(DiffDelta::Delete {
            source_position,
            target_position,
            lines: source_lines,
        }),
        DeltaKind::Change => Ok(DiffDelta::Change {
            source_position,
            target_position,
            source_lines,
            target_lines,
        }),
        _ => Err(StorageError::Corrupt(format!(
            "patch {patch_id} holds a {} delta with lines on both sides",
            kind.as_str()
        ))
        .into()),
    }
}

fn compress_body(body: &str) -> Result<Vec<u8>> {
    Ok(zstd::encode_all(body.as_bytes(), 0)?)
}

fn decompress_body(bytes: &[u8]) -> Result<String> {
    let raw = zstd::decode_all(bytes)?;
    String::from_utf8(raw)
        .map_err(|err| StorageError::Corrupt(format!("snapshot body is not utf-8: {err}")).into())
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::Corrupt(format!("timestamp {ms} out of range")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::hash_body;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    fn new_snapshot(url_id: UrlId, role: CaptureRole, body: &str, ms: i64) -> NewSnapshot {
        NewSnapshot {
            url_id,
            role,
            body: body.to_string(),
            body_hash: hash_body(body),
            captured_at: at(ms),
        }
    }

    #[test]
    fn url_crud() {
        let store = StorageEngine::open_in_memory().unwrap();
        let url = store.save_url("https://example.com/foo.html", at(1_000)).unwrap();
        let found = store.find_url(url.id).unwrap().unwrap();
        assert_eq!(found, url);

        store.set_url_active(url.id, false).unwrap();
        assert!(!store.find_url(url.id).unwrap().unwrap().active);

        store.delete_url(url.id).unwrap();
        assert!(store.find_url(url.id).unwrap().is_none());
        assert!(store.delete_url(url.id).unwrap_err().is_not_found());
    }

    #[test]
    fn snapshot_bodies_round_trip_through_compression() {
        let store = StorageEngine::open_in_memory().unwrap();
        let url = store.save_url("https://example.com/", at(0)).unwrap();
        let body = "<html>\n<body>héllo wörld</body>\n</html>\n".repeat(50);
        let saved = store
            .persist_snapshot(&new_snapshot(url.id, CaptureRole::PreEvent, &body, 5))
            .unwrap();
        let listed = store.list_snapshots(url.id).unwrap();
        assert_eq!(listed, vec![saved]);
        assert_eq!(listed[0].body, body);
    }

    #[test]
    fn snapshot_for_unknown_url_is_not_found() {
        let store = StorageEngine::open_in_memory().unwrap();
        let err = store
            .persist_snapshot(&new_snapshot(UrlId(42), CaptureRole::PreEvent, "x", 1))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn last_poll_prefers_latest_then_highest_id() {
        let store = StorageEngine::open_in_memory().unwrap();
        assert!(store.last_poll().unwrap().is_none());
        store.record_poll(at(3_000), true).unwrap();
        store.record_poll(at(1_000), false).unwrap();
        let tie = store.record_poll(at(3_000), false).unwrap();
        assert_eq!(store.last_poll().unwrap(), Some(tie));
    }

    #[test]
    fn latest_snapshot_skips_unreadable_history() {
        let store = StorageEngine::open_in_memory().unwrap();
        let url = store.save_url("https://example.com/", at(0)).unwrap();
        let old_pre = store
            .persist_snapshot(&new_snapshot(url.id, CaptureRole::PreEvent, "old", 10))
            .unwrap();
        let pre = store
            .persist_snapshot(&new_snapshot(url.id, CaptureRole::PreEvent, "new", 20))
            .unwrap();
        let post = store
            .persist_snapshot(&new_snapshot(url.id, CaptureRole::PostEvent, "after", 30))
            .unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "UPDATE html_snapshots SET body = X'00' WHERE id = ?1",
                params![old_pre.id.0],
            )
            .unwrap();

        assert!(store.list_snapshots(url.id).is_err());
        assert_eq!(
            store.latest_snapshot(url.id, CaptureRole::PostEvent).unwrap(),
            Some(post)
        );
        assert_eq!(
            store.latest_snapshot(url.id, CaptureRole::PreEvent).unwrap(),
            Some(pre)
        );

        let other = store.save_url("https://example.com/other", at(0)).unwrap();
        assert!(store
            .latest_snapshot(other.id, CaptureRole::PostEvent)
            .unwrap()
            .is_none());
    }
}
