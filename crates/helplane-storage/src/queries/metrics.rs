// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metrics recording and windowed aggregation.

use helplane_core::HelplaneError;
use helplane_core::types::{Channel, ChannelMetrics};
use rusqlite::params;

use crate::database::Database;
use crate::queries::column_enum;

/// Record one processed-event metric row.
pub async fn record_metric(
    db: &Database,
    channel: Channel,
    latency_ms: i64,
    escalated: bool,
    tool_calls: u32,
) -> Result<(), HelplaneError> {
    let channel = channel.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO metrics (channel, latency_ms, escalated, tool_calls)
                 VALUES (?1, ?2, ?3, ?4)",
                params![channel, latency_ms, escalated, i64::from(tool_calls)],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Per-channel aggregates for `created_at` in `[from, to)`.
pub async fn channel_metrics(
    db: &Database,
    from: &str,
    to: &str,
) -> Result<Vec<ChannelMetrics>, HelplaneError> {
    let from = from.to_string();
    let to = to.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<ChannelMetrics>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT channel, COUNT(*), AVG(latency_ms), SUM(escalated)
                 FROM metrics
                 WHERE created_at >= ?1 AND created_at < ?2
                 GROUP BY channel
                 ORDER BY channel",
            )?;
            let rows = stmt.query_map(params![from, to], |row| {
                Ok(ChannelMetrics {
                    channel: column_enum(0, row.get(0)?)?,
                    events: row.get(1)?,
                    avg_latency_ms: row.get(2)?,
                    escalations: row.get(3)?,
                })
            })?;
            let mut metrics = Vec::new();
            for row in rows {
                metrics.push(row?);
            }
            Ok(metrics)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn metrics_aggregate_by_channel() {
        let (db, _dir) = setup_db().await;

        record_metric(&db, Channel::Email, 100, false, 0).await.unwrap();
        record_metric(&db, Channel::Email, 300, true, 2).await.unwrap();
        record_metric(&db, Channel::Chat, 50, false, 1).await.unwrap();

        let window = channel_metrics(&db, "2000-01-01T00:00:00.000Z", "2100-01-01T00:00:00.000Z")
            .await
            .unwrap();
        assert_eq!(window.len(), 2);

        let email = window.iter().find(|m| m.channel == Channel::Email).unwrap();
        assert_eq!(email.events, 2);
        assert!((email.avg_latency_ms - 200.0).abs() < f64::EPSILON);
        assert_eq!(email.escalations, 1);

        let chat = window.iter().find(|m| m.channel == Channel::Chat).unwrap();
        assert_eq!(chat.events, 1);
        assert_eq!(chat.escalations, 0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn window_bounds_exclude_outside_rows() {
        let (db, _dir) = setup_db().await;
        record_metric(&db, Channel::WebForm, 10, false, 0).await.unwrap();

        // A window entirely in the past sees nothing.
        let window = channel_metrics(&db, "2000-01-01T00:00:00.000Z", "2000-01-02T00:00:00.000Z")
            .await
            .unwrap();
        assert!(window.is_empty());

        db.close().await.unwrap();
    }
}
