use crate::models::{KycRecord, KycStatistics, KycStatus};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory KYC record store, keyed by customer id.
///
/// Holds at most one record per customer; saving again replaces it.
#[derive(Debug, Default)]
pub struct KycStore {
    records: RwLock<HashMap<String, KycRecord>>,
}

impl KycStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save(&self, record: KycRecord) {
        tracing::debug!(
            "Saving KYC record for {} ({})",
            record.customer_id,
            record.status.as_str()
        );
        self.records
            .write()
            .await
            .insert(record.customer_id.clone(), record);
    }

    pub async fn get(&self, customer_id: &str) -> Option<KycRecord> {
        self.records.read().await.get(customer_id).cloned()
    }

    /// Sets the status of an existing record and merges `details` into it.
    ///
    /// `approved` (bool) and `error_message` (string) land on their typed
    /// fields; every other key goes into the free-form details map.
    /// Returns `false` when no record exists for the customer.
    pub async fn update_status(
        &self,
        customer_id: &str,
        status: KycStatus,
        details: Option<Map<String, Value>>,
    ) -> bool {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(customer_id) else {
            return false;
        };

        record.status = status;
        for (key, value) in details.unwrap_or_default() {
            match key.as_str() {
                "approved" if value.is_boolean() => record.approved = value == Value::Bool(true),
                "error_message" if value.is_string() => {
                    record.error_message = value.as_str().map(str::to_string);
                }
                _ => {
                    record.details.insert(key, value);
                }
            }
        }
        record.updated_at = Utc::now();

        tracing::info!("KYC status for {} set to {}", customer_id, status.as_str());
        true
    }

    pub async fn statistics(&self) -> KycStatistics {
        let records = self.records.read().await;

        let total_applications = records.len();
        let errors = records
            .values()
            .filter(|r| r.status == KycStatus::Error)
            .count();
        let approved = records
            .values()
            .filter(|r| r.approved && r.status != KycStatus::Error)
            .count();
        let rejected = total_applications - approved - errors;

        let approval_rate = if total_applications > 0 {
            approved as f64 / total_applications as f64 * 100.0
        } else {
            0.0
        };

        KycStatistics {
            total_applications,
            approved,
            rejected,
            errors,
            approval_rate,
        }
    }

    /// Records matching every filter. A filter on a field the record does
    /// not carry never matches; an empty filter set returns everything.
    pub async fn search(&self, filters: &Map<String, Value>) -> Vec<KycRecord> {
        let records = self.records.read().await;
        let mut matches: Vec<KycRecord> = records
            .values()
            .filter(|record| filters.iter().all(|(key, value)| field_matches(record, key, value)))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matches
    }
}

fn field_matches(record: &KycRecord, key: &str, expected: &Value) -> bool {
    match key {
        "status" => expected.as_str() == Some(record.status.as_str()),
        "approved" => expected.as_bool() == Some(record.approved),
        "risk_level" => match (record.risk_level(), expected.as_str()) {
            (Some(level), Some(wanted)) => level.as_str() == wanted,
            _ => false,
        },
        "customer_id" => expected.as_str() == Some(record.customer_id.as_str()),
        other => record.details.get(other) == Some(expected),
    }
}
