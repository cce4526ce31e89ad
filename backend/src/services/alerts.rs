//! Alert outbox: restartable reads and background delivery

use std::time::Duration;

use serde::Deserialize;
use sqlx::PgPool;

use crate::error::AppResult;
use crate::external::AlertWebhookClient;
use crate::models::{AlertEvent, AlertRow};

const MAX_PAGE: i64 = 500;

#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    /// Last sequence number the caller has already seen
    pub after: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Clone)]
pub struct AlertService {
    db: PgPool,
}

impl AlertService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Events with `secuencia > after`, in sequence order
    pub async fn after(&self, after: i64, limit: i64) -> AppResult<Vec<AlertEvent>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT secuencia, payload, fecha
            FROM alert_events
            WHERE secuencia > $1
            ORDER BY secuencia
            LIMIT $2
            "#,
        )
        .bind(after)
        .bind(limit.clamp(1, MAX_PAGE))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(AlertEvent::try_from).collect()
    }

    /// Oldest undelivered events
    pub async fn pending(&self, batch_size: i64) -> AppResult<Vec<AlertEvent>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT secuencia, payload, fecha
            FROM alert_events
            WHERE delivered_at IS NULL
            ORDER BY secuencia
            LIMIT $1
            "#,
        )
        .bind(batch_size.clamp(1, MAX_PAGE))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(AlertEvent::try_from).collect()
    }

    pub async fn mark_delivered(&self, secuencia: i64) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE alert_events
            SET delivered_at = NOW(), attempts = attempts + 1, last_error = NULL
            WHERE secuencia = $1
            "#,
        )
        .bind(secuencia)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn record_failure(&self, secuencia: i64, error: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE alert_events SET attempts = attempts + 1, last_error = $2 WHERE secuencia = $1",
        )
        .bind(secuencia)
        .bind(error)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Deliver one batch in order, stopping at the first failure so the
    /// receiver never sees a gap; returns how many were delivered
    pub async fn dispatch_pending(
        &self,
        client: &AlertWebhookClient,
        batch_size: i64,
    ) -> AppResult<usize> {
        let mut delivered = 0;
        for event in self.pending(batch_size).await? {
            match client.deliver(&event).await {
                Ok(()) => {
                    self.mark_delivered(event.secuencia).await?;
                    delivered += 1;
                }
                Err(err) => {
                    tracing::warn!(secuencia = event.secuencia, "Alert delivery failed: {}", err);
                    self.record_failure(event.secuencia, &err.to_string()).await?;
                    break;
                }
            }
        }
        Ok(delivered)
    }
}

/// Background loop feeding the external alert emitter
pub async fn run_dispatcher(
    service: AlertService,
    client: AlertWebhookClient,
    interval: Duration,
    batch_size: i64,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match service.dispatch_pending(&client, batch_size).await {
            Ok(0) => {}
            Ok(n) => tracing::debug!(delivered = n, "Alerts dispatched"),
            Err(e) => tracing::error!("Alert dispatcher error: {}", e),
        }
    }
}
