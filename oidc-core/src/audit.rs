//! Audit sink collaborator contract.
//!
//! The real audit store (append-only event log, queryable by operators) is
//! out of scope here; this trait and its in-memory ring buffer exist so
//! the rest of the system can depend on "an audit event was appended"
//! without knowing where it eventually lands.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, serde::Serialize)]
pub struct AuditEvent {
    pub at: DateTime<Utc>,
    pub credentials_id: Option<String>,
    pub session_id: Option<uuid::Uuid>,
    pub event_type: String,
    pub detail: serde_json::Value,
}

#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<()>;

    /// Tenants this credentials id was last granted access to, most recent
    /// first; used to pre-select a tenant on subsequent authorize requests.
    async fn last_authorized_tenants(&self, credentials_id: &str) -> Result<Vec<String>>;
}

/// Fixed-capacity in-memory sink. Oldest events are dropped once capacity
/// is exceeded.
pub struct InMemoryAuditSink {
    capacity: usize,
    events: Mutex<VecDeque<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit lock poisoned").iter().cloned().collect()
    }
}

#[async_trait::async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, event: AuditEvent) -> Result<()> {
        let mut events = self.events.lock().expect("audit lock poisoned");
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }

    async fn last_authorized_tenants(&self, credentials_id: &str) -> Result<Vec<String>> {
        let events = self.events.lock().expect("audit lock poisoned");
        let mut tenants = Vec::new();
        for event in events.iter().rev() {
            if event.credentials_id.as_deref() == Some(credentials_id)
                && event.event_type == "tenant_authorized"
            {
                if let Some(tenant) = event.detail.get("tenant_id").and_then(|v| v.as_str()) {
                    if !tenants.iter().any(|t: &String| t == tenant) {
                        tenants.push(tenant.to_string());
                    }
                }
            }
        }
        Ok(tenants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ring_buffer_drops_oldest_past_capacity() {
        let sink = InMemoryAuditSink::new(2);
        for i in 0..3 {
            sink.append(AuditEvent {
                at: Utc::now(),
                credentials_id: None,
                session_id: None,
                event_type: "test".to_string(),
                detail: serde_json::json!({ "i": i }),
            })
            .await
            .unwrap();
        }
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].detail["i"], 1);
        assert_eq!(events[1].detail["i"], 2);
    }

    #[tokio::test]
    async fn last_authorized_tenants_is_most_recent_first() {
        let sink = InMemoryAuditSink::new(10);
        for tenant in ["acme", "globex", "acme"] {
            sink.append(AuditEvent {
                at: Utc::now(),
                credentials_id: Some("alice".to_string()),
                session_id: None,
                event_type: "tenant_authorized".to_string(),
                detail: serde_json::json!({ "tenant_id": tenant }),
            })
            .await
            .unwrap();
        }
        let tenants = sink.last_authorized_tenants("alice").await.unwrap();
        assert_eq!(tenants, vec!["acme".to_string(), "globex".to_string()]);
    }
}
