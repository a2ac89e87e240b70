//! Run monitoring.
//!
//! Every turn produces one [`RunRecord`]. The default monitor only logs it;
//! [`HttpMonitor`] also posts it to a collector. Recording never fails a
//! turn.

use chrono::{DateTime, Utc};
use relay_core::sources::MonitoringConfig;
use relay_core::{AppError, AppResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: String,
    pub name: String,
    pub session_id: String,
    pub question: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Active source kinds
    pub sources: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl RunRecord {
    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Receives a record per completed or failed turn.
#[async_trait::async_trait]
pub trait Monitor: Send + Sync {
    async fn record(&self, run: &RunRecord);
}

/// Logs run records.
#[derive(Debug, Clone, Default)]
pub struct TracingMonitor;

#[async_trait::async_trait]
impl Monitor for TracingMonitor {
    async fn record(&self, run: &RunRecord) {
        match run.error {
            None => tracing::info!(
                run_id = %run.id,
                session = %run.session_id,
                duration_ms = run.duration_ms(),
                "Run complete"
            ),
            Some(ref error) => tracing::warn!(
                run_id = %run.id,
                session = %run.session_id,
                duration_ms = run.duration_ms(),
                error = %error,
                "Run failed"
            ),
        }
    }
}

/// Posts run records to `<endpoint>/runs`.
#[derive(Debug, Clone)]
pub struct HttpMonitor {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    project: Option<String>,
}

impl HttpMonitor {
    pub fn new(config: &MonitoringConfig) -> AppResult<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| AppError::Config("Monitoring endpoint is not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build monitoring client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}/runs", endpoint.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            project: config.project.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, run: &RunRecord) -> AppResult<()> {
        let mut run = run.clone();
        if run.project.is_none() {
            run.project = self.project.clone();
        }

        let mut request = self.client.post(&self.url).json(&run);
        if let Some(ref key) = self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Other(format!("Failed to post run record: {}", e)))?;
        if !response.status().is_success() {
            return Err(AppError::Other(format!(
                "Monitoring endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Monitor for HttpMonitor {
    async fn record(&self, run: &RunRecord) {
        TracingMonitor.record(run).await;
        if let Err(e) = self.post(run).await {
            tracing::warn!(error = %e, run_id = %run.id, "Failed to record run");
        }
    }
}

/// The monitor for an optional monitoring section.
pub fn monitor_from_config(config: Option<&MonitoringConfig>) -> AppResult<Arc<dyn Monitor>> {
    match config {
        Some(config) if config.endpoint.is_some() => {
            let monitor = HttpMonitor::new(config)?;
            tracing::debug!(url = monitor.url(), "Posting run records");
            Ok(Arc::new(monitor))
        }
        _ => Ok(Arc::new(TracingMonitor)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RunRecord {
        let start = Utc::now();
        RunRecord {
            id: "run-1".to_string(),
            name: "Relay".to_string(),
            session_id: "s1".to_string(),
            question: "q".to_string(),
            answer: Some("a".to_string()),
            error: None,
            sources: vec!["sql".to_string()],
            project: None,
            start_time: start,
            end_time: start + chrono::Duration::milliseconds(25),
        }
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let value = serde_json::to_value(record()).unwrap();
        assert_eq!(value["sessionId"], "s1");
        assert!(value.get("startTime").is_some());
        assert!(value.get("error").is_none());
        assert_eq!(record().duration_ms(), 25);
        assert!(record().succeeded());
    }

    #[test]
    fn test_http_monitor_url() {
        let config = MonitoringConfig {
            endpoint: Some("https://collector.example.com/".to_string()),
            api_key: Some("k".to_string()),
            project: None,
        };
        assert_eq!(
            HttpMonitor::new(&config).unwrap().url(),
            "https://collector.example.com/runs"
        );
    }

    #[test]
    fn test_missing_endpoint_is_config_error() {
        assert!(matches!(
            HttpMonitor::new(&MonitoringConfig::default()),
            Err(AppError::Config(_))
        ));
        assert!(monitor_from_config(None).is_ok());
        assert!(monitor_from_config(Some(&MonitoringConfig::default())).is_ok());
    }
}
