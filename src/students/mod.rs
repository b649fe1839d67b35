//! Student record collaborator boundary.
//!
//! The student registry is owned by another service; veriscan only needs a
//! key lookup by credential uid. The trait keeps the scan flow testable
//! without a live registry, and the HTTP implementation covers production.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Credential fields crossing the boundary. The registry holds far more;
/// nothing beyond these is ever fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentRecord {
    pub uid: String,
    pub full_name: String,
    pub program: Option<String>,
    pub batch: Option<String>,
    pub degree_status: Option<String>,
    pub degree_generated_date: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait StudentDirectory: Send + Sync {
    /// Look up a student by credential uid. `Ok(None)` means not registered.
    async fn find_by_uid(&self, uid: &str) -> Result<Option<StudentRecord>>;
}

/// Fixed in-memory directory for local development and tests.
#[derive(Default)]
pub struct StaticStudentDirectory {
    records: HashMap<String, StudentRecord>,
}

impl StaticStudentDirectory {
    #[must_use]
    pub fn new(records: Vec<StudentRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.uid.clone(), record))
                .collect(),
        }
    }
}

#[async_trait]
impl StudentDirectory for StaticStudentDirectory {
    async fn find_by_uid(&self, uid: &str) -> Result<Option<StudentRecord>> {
        Ok(self.records.get(uid).cloned())
    }
}

/// Directory backed by the student records service.
pub struct HttpStudentDirectory {
    client: Client,
    base_url: String,
}

impl HttpStudentDirectory {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(5))
            .build()
            .context("failed to build student directory client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl StudentDirectory for HttpStudentDirectory {
    async fn find_by_uid(&self, uid: &str) -> Result<Option<StudentRecord>> {
        let url = format!("{}/students/{uid}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("student directory request failed")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = response
            .error_for_status()
            .context("student directory returned an error status")?;
        let record = response
            .json::<StudentRecord>()
            .await
            .context("invalid student record payload")?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(uid: &str) -> StudentRecord {
        StudentRecord {
            uid: uid.to_string(),
            full_name: "Ada Lovelace".to_string(),
            program: Some("BSCS".to_string()),
            batch: Some("2021".to_string()),
            degree_status: Some("Generated".to_string()),
            degree_generated_date: None,
        }
    }

    #[tokio::test]
    async fn static_directory_finds_seeded_records() -> anyhow::Result<()> {
        let directory = StaticStudentDirectory::new(vec![record("uid-1"), record("uid-2")]);
        let found = directory.find_by_uid("uid-1").await?;
        assert_eq!(found.map(|r| r.full_name), Some("Ada Lovelace".to_string()));
        assert!(directory.find_by_uid("uid-3").await?.is_none());
        Ok(())
    }

    #[test]
    fn http_directory_trims_trailing_slash() -> anyhow::Result<()> {
        let directory = HttpStudentDirectory::new("https://records.example.com/".to_string())?;
        assert_eq!(directory.base_url, "https://records.example.com");
        Ok(())
    }

    #[test]
    fn student_record_deserializes_minimal_payload() -> anyhow::Result<()> {
        let record: StudentRecord = serde_json::from_value(serde_json::json!({
            "uid": "uid-1",
            "full_name": "Ada Lovelace"
        }))?;
        assert_eq!(record.uid, "uid-1");
        assert!(record.degree_status.is_none());
        Ok(())
    }
}
