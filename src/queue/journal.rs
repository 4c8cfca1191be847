//! SQLite store of one embedded queue
//!
//! Each queue is a database file with three tables:
//!
//! - `pending`: waiting payloads ordered by `seq`; the head has the lowest seq
//! - `unacked`: in-flight deliveries keyed by their delivery tag
//! - `meta`: the next delivery tag, so tags are never reused after a reopen
//!
//! Every mutation runs in one transaction; the in-memory counters are only
//! updated after the commit succeeded.

use crate::queue::error::{BrokerError, BrokerResult};
use crate::queue::traits::Delivery;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS pending (
        seq INTEGER PRIMARY KEY,
        payload BLOB NOT NULL
    );
    CREATE TABLE IF NOT EXISTS unacked (
        tag INTEGER PRIMARY KEY,
        payload BLOB NOT NULL
    );
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    );
    INSERT OR IGNORE INTO meta (key, value) VALUES ('next_tag', 1);
";

/// Sequence number one below the current head
const HEAD_SEQ: &str = "SELECT COALESCE(MIN(seq), 1) - 1 FROM pending";

#[derive(Debug)]
pub(crate) struct Journal {
    conn: Connection,
    path: PathBuf,
    next_tag: u64,
    pending: usize,
    unacked: usize,
}

impl Journal {
    /// Open the store at `path`, creating an empty one if it does not exist
    pub(crate) fn open(path: &Path) -> BrokerResult<Self> {
        let storage = |e| BrokerError::storage(path, e);
        let conn = Connection::open(path).map_err(storage)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;
             PRAGMA temp_store = MEMORY;",
        )
        .map_err(storage)?;
        conn.execute_batch(SCHEMA).map_err(storage)?;

        let next_tag: i64 = conn
            .query_row("SELECT value FROM meta WHERE key = 'next_tag'", [], |row| row.get(0))
            .map_err(storage)?;
        let pending: i64 = conn
            .query_row("SELECT COUNT(*) FROM pending", [], |row| row.get(0))
            .map_err(storage)?;
        let unacked: i64 = conn
            .query_row("SELECT COUNT(*) FROM unacked", [], |row| row.get(0))
            .map_err(storage)?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            next_tag: next_tag.max(1) as u64,
            pending: pending as usize,
            unacked: unacked as usize,
        })
    }

    fn storage(&self, source: rusqlite::Error) -> BrokerError {
        BrokerError::storage(&self.path, source)
    }

    pub(crate) fn push(&mut self, payload: &[u8]) -> BrokerResult<()> {
        self.conn
            .execute("INSERT INTO pending (payload) VALUES (?1)", params![payload])
            .map_err(|e| self.storage(e))?;
        self.pending += 1;
        Ok(())
    }

    /// Take the head message; it stays in the unacked table unless `auto_ack`
    pub(crate) fn deliver(&mut self, auto_ack: bool) -> BrokerResult<Option<Delivery>> {
        let tag = if auto_ack { 0 } else { self.next_tag };
        let head = self.take_head(tag).map_err(|e| self.storage(e))?;
        let Some(payload) = head else {
            return Ok(None);
        };
        self.pending -= 1;
        if !auto_ack {
            self.next_tag += 1;
            self.unacked += 1;
        }
        Ok(Some(Delivery { payload, tag }))
    }

    fn take_head(&mut self, tag: u64) -> rusqlite::Result<Option<Vec<u8>>> {
        let tx = self.conn.transaction()?;
        let head: Option<(i64, Vec<u8>)> = tx
            .query_row(
                "SELECT seq, payload FROM pending ORDER BY seq LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((seq, payload)) = head else {
            return Ok(None);
        };
        tx.execute("DELETE FROM pending WHERE seq = ?1", params![seq])?;
        if tag > 0 {
            tx.execute(
                "INSERT INTO unacked (tag, payload) VALUES (?1, ?2)",
                params![tag as i64, payload],
            )?;
            tx.execute(
                "UPDATE meta SET value = ?1 WHERE key = 'next_tag'",
                params![(tag + 1) as i64],
            )?;
        }
        tx.commit()?;
        Ok(Some(payload))
    }

    pub(crate) fn acknowledge(&mut self, tag: u64) -> BrokerResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM unacked WHERE tag = ?1", params![tag as i64])
            .map_err(|e| self.storage(e))?;
        if removed > 0 {
            self.unacked -= 1;
        }
        Ok(removed > 0)
    }

    pub(crate) fn reject(&mut self, tag: u64) -> BrokerResult<bool> {
        let requeued = Self::requeue(&mut self.conn, &[tag]).map_err(|e| self.storage(e))?;
        self.pending += requeued;
        self.unacked -= requeued;
        Ok(requeued > 0)
    }

    /// Move every unacked entry back to the head, oldest delivery first
    pub(crate) fn recover(&mut self) -> BrokerResult<usize> {
        let tags = {
            let mut stmt = self
                .conn
                .prepare("SELECT tag FROM unacked ORDER BY tag DESC")
                .map_err(|e| self.storage(e))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, i64>(0))
                .map_err(|e| self.storage(e))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| self.storage(e))?
        };
        let tags: Vec<u64> = tags.into_iter().map(|t| t as u64).collect();
        let requeued = Self::requeue(&mut self.conn, &tags).map_err(|e| self.storage(e))?;
        self.pending += requeued;
        self.unacked -= requeued;
        Ok(requeued)
    }

    /// Push the given deliveries to the head in order; the last one ends up first
    fn requeue(conn: &mut Connection, tags: &[u64]) -> rusqlite::Result<usize> {
        let tx = conn.transaction()?;
        let mut requeued = 0;
        for tag in tags {
            let payload: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT payload FROM unacked WHERE tag = ?1",
                    params![*tag as i64],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(payload) = payload else {
                continue;
            };
            let seq: i64 = tx.query_row(HEAD_SEQ, [], |row| row.get(0))?;
            tx.execute(
                "INSERT INTO pending (seq, payload) VALUES (?1, ?2)",
                params![seq, payload],
            )?;
            tx.execute("DELETE FROM unacked WHERE tag = ?1", params![*tag as i64])?;
            requeued += 1;
        }
        tx.commit()?;
        Ok(requeued)
    }

    pub(crate) fn clear(&mut self) -> BrokerResult<()> {
        self.conn
            .execute("DELETE FROM pending", [])
            .map_err(|e| self.storage(e))?;
        self.pending = 0;
        Ok(())
    }

    pub(crate) fn available(&self) -> usize {
        self.pending
    }

    pub(crate) fn unacked(&self) -> usize {
        self.unacked
    }

    pub(crate) fn is_pending_empty(&self) -> bool {
        self.pending == 0
    }
}
