use anyhow::Result;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tokio::time;
use tracing::{error, info};

use crate::db::DbPool;
use crate::models::*;
use crate::schema::*;

const BATCH_SIZE: i64 = 100;

/// Relays queued emails to the mail transport topic.
pub struct OutboxProcessor {
    pool: DbPool,
    producer: FutureProducer,
    topic: String,
    interval: Duration,
}

impl OutboxProcessor {
    pub fn new(pool: DbPool, producer: FutureProducer, topic: String, interval: Duration) -> Self {
        Self { pool, producer, topic, interval }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(self.interval);

        loop {
            interval.tick().await;

            if let Err(e) = self.process_email_queue().await {
                error!("Error processing email queue: {}", e);
            }
        }
    }

    /// Publishes one batch of unsent mail. Returns how many were sent.
    pub async fn process_email_queue(&self) -> Result<usize> {
        let mut conn = self.pool.get().await?;

        let unsent = email_queue::table
            .filter(email_queue::sent.eq(false))
            .order(email_queue::created_at.asc())
            .limit(BATCH_SIZE)
            .load::<QueuedEmail>(&mut conn)
            .await?;

        let mut sent = 0;
        for email in unsent {
            if let Err(e) = self.publish_email(&email).await {
                error!("Failed to publish email {}: {}", email.id, e);
                continue;
            }

            diesel::update(email_queue::table.filter(email_queue::id.eq(email.id)))
                .set((
                    email_queue::sent.eq(true),
                    email_queue::sent_at.eq(Some(Utc::now())),
                ))
                .execute(&mut conn)
                .await?;

            info!("Relayed email {} to {}", email.id, email.recipient_email);
            sent += 1;
        }

        Ok(sent)
    }

    async fn publish_email(&self, email: &QueuedEmail) -> Result<()> {
        let json = serde_json::to_string(&serde_json::json!({
            "id": email.id,
            "to": email.recipient_email,
            "subject": email.subject,
            "body": email.body,
            "template": email.template_name,
        }))?;
        let record = FutureRecord::to(&self.topic)
            .payload(&json)
            .key(&email.recipient_email);

        self.producer.send(record, Duration::from_secs(5)).await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to publish email: {}", e))?;

        Ok(())
    }
}
