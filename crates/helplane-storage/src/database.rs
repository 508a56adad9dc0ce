// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread: `Database` wraps a single `tokio_rusqlite::Connection`, query
//! modules accept `&Database` and go through `connection().call()`. Do NOT
//! create additional Connection instances for writes -- the single-writer
//! model is what keeps SQLITE_BUSY out of the pipeline.

use helplane_core::HelplaneError;

/// Handle to the single-writer SQLite connection.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path`, apply PRAGMAs, and
    /// run pending migrations.
    ///
    /// Migrations run on a short-lived blocking connection before the writer
    /// connection opens, so the writer never observes a half-migrated schema.
    pub async fn open(path: &str) -> Result<Self, HelplaneError> {
        if let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(map_tr_err)?;
        }

        let migrate_path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), HelplaneError> {
            let mut conn = rusqlite::Connection::open(&migrate_path).map_err(map_tr_err)?;
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(map_tr_err)?;
            crate::migrations::run_migrations(&mut conn)
        })
        .await
        .map_err(|e| HelplaneError::Internal(format!("migration task panicked: {e}")))??;

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(map_tr_err)?;

        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        tracing::debug!(path = %path, "database opened");
        Ok(Self { conn })
    }

    /// The underlying single-writer connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL before shutdown.
    pub async fn close(&self) -> Result<(), HelplaneError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        tracing::debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Wrap a connection/query error into the storage error variant.
pub(crate) fn map_tr_err<E>(e: E) -> HelplaneError
where
    E: std::error::Error + Send + Sync + 'static,
{
    HelplaneError::Storage {
        source: Box::new(e),
    }
}
