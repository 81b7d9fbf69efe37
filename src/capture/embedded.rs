// src/capture/embedded.rs
//! Hook registration on embedded SQLite connections
//!
//! SQLite hooks are per connection, so every connection that should be
//! observed must go through [`register`] once after it is opened.
//!
//! The update hook fires while the statement runs, before the transaction
//! is decided. Writes are held per connection and handed to the observer
//! only from the commit hook; the rollback hook discards them. A
//! `ROLLBACK TO` a savepoint does not reach either hook, so writes undone
//! that way are still reported when the outer transaction commits.

use crate::capture::hook::WriteObserver;
use crate::capture::record::OpKind;
use crate::utils::config::EmbeddedConfig;
use crate::utils::errors::{MirrorError, Result};
use parking_lot::Mutex;
use rusqlite::hooks::Action;
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Map SQLite's hook action onto an op kind
pub fn op_from_action(action: Action) -> Option<OpKind> {
    match action {
        Action::SQLITE_INSERT => Some(OpKind::Insert),
        Action::SQLITE_UPDATE => Some(OpKind::Update),
        Action::SQLITE_DELETE => Some(OpKind::Delete),
        _ => None,
    }
}

struct PendingWrite {
    op: OpKind,
    db_name: String,
    table: String,
    row_id: i64,
}

/// Writes of the open transaction on one connection
type Pending = Arc<Mutex<Vec<PendingWrite>>>;

/// Install the update, commit and rollback hooks of `conn`
///
/// `observer` sees each row-level write once its transaction commits, in
/// statement order. Replaces any hooks previously set on the same
/// connection.
pub fn register<O>(conn: &Connection, observer: Arc<O>)
where
    O: WriteObserver + ?Sized + 'static,
{
    let pending: Pending = Arc::new(Mutex::new(Vec::new()));

    let on_update = Arc::clone(&pending);
    conn.update_hook(Some(
        move |action: Action, db_name: &str, table: &str, row_id: i64| match op_from_action(action) {
            Some(op) => on_update.lock().push(PendingWrite {
                op,
                db_name: db_name.to_string(),
                table: table.to_string(),
                row_id,
            }),
            None => trace!(table, row_id, "Skipping unknown hook action"),
        },
    ));

    let on_commit = Arc::clone(&pending);
    conn.commit_hook(Some(move || {
        let writes = std::mem::take(&mut *on_commit.lock());
        for write in &writes {
            observer.on_write(write.op, &write.db_name, &write.table, write.row_id);
        }
        // false lets the commit proceed
        false
    }));

    let on_rollback = pending;
    conn.rollback_hook(Some(move || {
        let discarded = std::mem::take(&mut *on_rollback.lock()).len();
        if discarded > 0 {
            debug!(discarded, "Transaction rolled back, discarding pending changes");
        }
    }));

    debug!("Registered change capture hooks");
}

/// Open the embedded database and register `observer` on the connection
pub fn open_embedded<O>(config: &EmbeddedConfig, observer: Arc<O>) -> Result<Connection>
where
    O: WriteObserver + ?Sized + 'static,
{
    let conn = Connection::open(&config.path).map_err(|e| {
        MirrorError::Embedded(format!("Failed to open {:?}: {}", config.path, e))
    })?;

    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    conn.pragma_update(None, "foreign_keys", config.foreign_keys)?;

    register(&conn, observer);

    info!("Embedded database opened at {:?}", config.path);

    Ok(conn)
}
