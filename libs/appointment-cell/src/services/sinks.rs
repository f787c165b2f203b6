// libs/appointment-cell/src/services/sinks.rs
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{EvidenceRecord, EvidenceTarget, Notification};
use crate::services::dispatcher::{EvidenceSink, NotificationSink};

/// Writes notifications into the collaborator's `notifications` table.
pub struct SupabaseNotificationSink {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseNotificationSink {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl NotificationSink for SupabaseNotificationSink {
    async fn notify_in_app(&self, notification: Notification) -> Result<()> {
        debug!("Sending in-app notification to {}", notification.user_id);

        let _: serde_json::Value = self.supabase.insert(
            "notifications",
            None,
            json!({
                "user_id": notification.user_id,
                "title": notification.title,
                "message": notification.message,
                "link": notification.link,
                "is_read": false
            }),
        ).await?;

        Ok(())
    }
}

/// Writes evidence placeholders into the collaborator's `evidence_records` table.
pub struct SupabaseEvidenceSink {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseEvidenceSink {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl EvidenceSink for SupabaseEvidenceSink {
    async fn record(&self, target_type: EvidenceTarget, target_id: Uuid, summary: String) -> Result<EvidenceRecord> {
        self.supabase.insert(
            "evidence_records",
            None,
            json!({
                "target_type": target_type,
                "target_id": target_id,
                "summary": summary,
                "status": "PENDING"
            }),
        ).await
    }
}

/// Keeps notifications in process. Used when no Supabase project is configured.
#[derive(Default)]
pub struct InMemoryNotificationSink {
    sent: RwLock<Vec<Notification>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn notify_in_app(&self, notification: Notification) -> Result<()> {
        info!(
            user_id = %notification.user_id,
            link = %notification.link,
            "NOTIFY: {}", notification.title
        );
        self.sent.write().await.push(notification);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryEvidenceSink {
    records: RwLock<Vec<EvidenceRecord>>,
}

impl InMemoryEvidenceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<EvidenceRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl EvidenceSink for InMemoryEvidenceSink {
    async fn record(&self, target_type: EvidenceTarget, target_id: Uuid, summary: String) -> Result<EvidenceRecord> {
        let record = EvidenceRecord {
            id: Uuid::new_v4(),
            target_type,
            target_id,
            summary,
            status: "PENDING".to_string(),
            created_at: Utc::now(),
        };
        info!(
            target_type = %record.target_type,
            target_id = %record.target_id,
            "EVIDENCE: {}", record.summary
        );
        self.records.write().await.push(record.clone());
        Ok(record)
    }
}
