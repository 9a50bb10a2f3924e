// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print log: append-only SQLite ledger of submitted and finished jobs.
//
// Schema:
//   print_log(
//     id            INTEGER PRIMARY KEY AUTOINCREMENT,
//     timestamp     TEXT    NOT NULL,   -- RFC 3339
//     kind          TEXT    NOT NULL,   -- "request" or "result"
//     job_id        TEXT    NOT NULL,
//     document_hash TEXT    NOT NULL,   -- SHA-256 hex of the source, or ""
//     printer       TEXT    NOT NULL,
//     copies        INTEGER NOT NULL,
//     paper         TEXT    NOT NULL,
//     pages         TEXT    NOT NULL,
//     duplex        TEXT    NOT NULL,
//     color         TEXT    NOT NULL,
//     success       INTEGER NOT NULL,
//     details       TEXT
//   )

use std::io::Read;
use std::path::Path;

use chrono::Utc;
use labprint_core::error::{LabprintError, Result};
use labprint_core::types::{ColorMode, Job};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS print_log (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp     TEXT    NOT NULL,
    kind          TEXT    NOT NULL,
    job_id        TEXT    NOT NULL,
    document_hash TEXT    NOT NULL,
    printer       TEXT    NOT NULL,
    copies        INTEGER NOT NULL,
    paper         TEXT    NOT NULL,
    pages         TEXT    NOT NULL,
    duplex        TEXT    NOT NULL,
    color         TEXT    NOT NULL,
    success       INTEGER NOT NULL,
    details       TEXT
);";

fn db_err(e: rusqlite::Error) -> LabprintError {
    LabprintError::Database(e.to_string())
}

/// SHA-256 hex digest of the file at `path`.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintLogEntry {
    pub id: i64,
    pub timestamp: String,
    pub kind: String,
    pub job_id: String,
    pub document_hash: String,
    pub printer: String,
    pub copies: u32,
    pub paper: String,
    pub pages: String,
    pub duplex: String,
    pub color: String,
    pub success: bool,
    pub details: Option<String>,
}

/// Shared by every worker; the connection sits behind a mutex.
pub struct PrintLog {
    conn: Mutex<Connection>,
}

impl PrintLog {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;").map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;
        debug!("print log opened");
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn insert(&self, kind: &str, job: &Job, success: bool, details: Option<&str>) -> Result<()> {
        let hash = hash_file(&job.source_path).unwrap_or_default();
        let o = &job.options;
        let color = match o.color {
            ColorMode::Color => "color",
            ColorMode::Grayscale => "grayscale",
        };
        self.conn
            .lock()
            .execute(
                "INSERT INTO print_log (timestamp, kind, job_id, document_hash, printer, copies,
                 paper, pages, duplex, color, success, details)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    Utc::now().to_rfc3339(),
                    kind,
                    job.id.to_string(),
                    hash,
                    o.printer,
                    o.copies,
                    o.paper.keyword(),
                    o.page_range,
                    o.duplex.sides_keyword(),
                    color,
                    success as i32,
                    details,
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Log a submission.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub fn record_request(&self, job: &Job) -> Result<()> {
        self.insert("request", job, true, Some(&job.original_filename))
    }

    /// Log how a job ended; `details` carries the spool handle or the error.
    #[instrument(skip(self, job, details), fields(job_id = %job.id, success))]
    pub fn record_result(&self, job: &Job, success: bool, details: &str) -> Result<()> {
        self.insert("result", job, success, Some(details))
    }

    /// The most recent `limit` entries, newest first.
    pub fn recent_entries(&self, limit: u32) -> Result<Vec<PrintLogEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, kind, job_id, document_hash, printer, copies, paper,
                 pages, duplex, color, success, details
                 FROM print_log ORDER BY id DESC LIMIT ?1",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(PrintLogEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    kind: row.get(2)?,
                    job_id: row.get(3)?,
                    document_hash: row.get(4)?,
                    printer: row.get(5)?,
                    copies: row.get(6)?,
                    paper: row.get(7)?,
                    pages: row.get(8)?,
                    duplex: row.get(9)?,
                    color: row.get(10)?,
                    success: row.get::<_, i32>(11)? != 0,
                    details: row.get(12)?,
                })
            })
            .map_err(db_err)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err)?);
        }
        Ok(entries)
    }

    pub fn count(&self) -> Result<u64> {
        self.conn
            .lock()
            .query_row("SELECT COUNT(*) FROM print_log", [], |row| row.get(0))
            .map_err(db_err)
    }
}
