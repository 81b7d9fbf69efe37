// src/capture/record.rs
//! Change records built inside the write hook
//!
//! A record is created at the instant of write and never mutated afterwards.
//! Its canonical serialized form is a JSON object with a fixed field order:
//!
//! ```text
//! {"op":18,"db":"main","table":"users","rowid":7,"time":"2025-01-01T12:00:00.123456789Z"}
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::cell::Cell;
use std::fmt;

/// Kind of row-level write, carrying SQLite's action codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Insert,
    Update,
    Delete,
}

impl OpKind {
    /// `SQLITE_INSERT`
    pub const INSERT_CODE: i32 = 18;

    /// `SQLITE_UPDATE`
    pub const UPDATE_CODE: i32 = 23;

    /// `SQLITE_DELETE`
    pub const DELETE_CODE: i32 = 9;

    /// Map a raw hook code, `None` for anything unrecognized
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            Self::INSERT_CODE => Some(OpKind::Insert),
            Self::UPDATE_CODE => Some(OpKind::Update),
            Self::DELETE_CODE => Some(OpKind::Delete),
            _ => None,
        }
    }

    /// Raw code as delivered by the engine
    pub fn code(&self) -> i32 {
        match self {
            OpKind::Insert => Self::INSERT_CODE,
            OpKind::Update => Self::UPDATE_CODE,
            OpKind::Delete => Self::DELETE_CODE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Insert => "insert",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OpKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

/// One captured row-level write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    #[serde(rename = "op")]
    op: OpKind,

    #[serde(rename = "db")]
    db_name: String,

    table: String,

    #[serde(rename = "rowid")]
    row_id: i64,

    #[serde(rename = "time", serialize_with = "serialize_rfc3339_nanos")]
    captured_at: DateTime<Utc>,
}

impl ChangeRecord {
    /// Build a record stamped with the current time
    pub fn capture(op: OpKind, db_name: &str, table: &str, row_id: i64) -> Self {
        Self::with_timestamp(op, db_name, table, row_id, monotonic_now())
    }

    /// Build a record with an explicit timestamp
    pub fn with_timestamp(
        op: OpKind,
        db_name: &str,
        table: &str,
        row_id: i64,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            op,
            db_name: db_name.to_string(),
            table: table.to_string(),
            row_id,
            captured_at,
        }
    }

    pub fn op(&self) -> OpKind {
        self.op
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn row_id(&self) -> i64 {
        self.row_id
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Canonical JSON payload
    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn serialize_rfc3339_nanos<S: Serializer>(
    ts: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

thread_local! {
    static LAST_CAPTURE: Cell<Option<DateTime<Utc>>> = const { Cell::new(None) };
}

/// Wall-clock time, clamped so it never goes backwards on the calling thread
pub fn monotonic_now() -> DateTime<Utc> {
    let now = Utc::now();
    LAST_CAPTURE.with(|last| {
        let ts = match last.get() {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        last.set(Some(ts));
        ts
    })
}
