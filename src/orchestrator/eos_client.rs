//! HTTP client for the external EOS optimizer service.
//!
//! The orchestrator talks to EOS through the [`EosApi`] trait so run
//! logic stays testable against fakes; [`HttpEosClient`] is the reqwest
//! implementation used in production.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::error::{DomainError, DomainResult};
use crate::parser::coerce_datetime_str;

/// Health probe result: raw payload plus the optimizer's own notion of its
/// last run time, when it reports one.
#[derive(Debug, Clone)]
pub struct EosHealthSnapshot {
    pub payload: JsonValue,
    pub eos_last_run_datetime: Option<DateTime<Utc>>,
}

/// Prediction refresh scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshScope {
    All,
    Pv,
    Prices,
    Load,
}

impl RefreshScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Pv => "pv",
            Self::Prices => "prices",
            Self::Load => "load",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw {
            "all" => Ok(Self::All),
            "pv" => Ok(Self::Pv),
            "prices" => Ok(Self::Prices),
            "load" => Ok(Self::Load),
            other => Err(DomainError::validation(format!(
                "unknown refresh scope '{other}' (expected all|pv|prices|load)"
            ))),
        }
    }
}

#[async_trait]
pub trait EosApi: Send + Sync {
    async fn get_health(&self) -> DomainResult<EosHealthSnapshot>;
    async fn get_config(&self) -> DomainResult<JsonValue>;
    async fn put_config_path(&self, path: &str, value: &JsonValue) -> DomainResult<JsonValue>;
    async fn update_predictions(&self, scope: RefreshScope) -> DomainResult<()>;
    async fn get_prediction_list(&self, key: &str) -> DomainResult<Vec<JsonValue>>;
    async fn optimize(&self, payload: &JsonValue, timeout: Duration) -> DomainResult<JsonValue>;
    async fn put_measurement_value(
        &self,
        key: &str,
        ts: DateTime<Utc>,
        value: f64,
    ) -> DomainResult<()>;
}

/// reqwest-backed EOS client.
#[derive(Clone)]
pub struct HttpEosClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpEosClient {
    pub fn new(base_url: &str) -> DomainResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DomainError::Fatal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn expect_ok(response: reqwest::Response, context: &str) -> DomainResult<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            return Err(DomainError::transient(format!(
                "EOS {context} returned status {status}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl EosApi for HttpEosClient {
    async fn get_health(&self) -> DomainResult<EosHealthSnapshot> {
        let response = self.http.get(self.url("/v1/health")).send().await?;
        let response = Self::expect_ok(response, "health").await?;
        let payload: JsonValue = response.json().await?;
        let eos_last_run_datetime = payload
            .get("last_run_datetime")
            .and_then(JsonValue::as_str)
            .and_then(coerce_datetime_str);
        Ok(EosHealthSnapshot { payload, eos_last_run_datetime })
    }

    async fn get_config(&self) -> DomainResult<JsonValue> {
        let response = self.http.get(self.url("/v1/config")).send().await?;
        let response = Self::expect_ok(response, "config").await?;
        Ok(response.json().await?)
    }

    async fn put_config_path(&self, path: &str, value: &JsonValue) -> DomainResult<JsonValue> {
        let trimmed = path.trim_matches('/');
        let response = self
            .http
            .put(self.url(&format!("/v1/config/{trimmed}")))
            .json(value)
            .send()
            .await?;
        let response = Self::expect_ok(response, "config update").await?;
        Ok(response.json().await?)
    }

    async fn update_predictions(&self, scope: RefreshScope) -> DomainResult<()> {
        let response = self
            .http
            .post(self.url("/v1/prediction/update"))
            .query(&[("scope", scope.as_str())])
            .send()
            .await?;
        Self::expect_ok(response, "prediction update").await?;
        Ok(())
    }

    async fn get_prediction_list(&self, key: &str) -> DomainResult<Vec<JsonValue>> {
        let response = self
            .http
            .get(self.url("/v1/prediction/list"))
            .query(&[("key", key)])
            .send()
            .await?;
        let response = Self::expect_ok(response, "prediction list").await?;
        let payload: JsonValue = response.json().await?;
        match payload {
            JsonValue::Array(items) => Ok(items),
            other => Ok(other
                .get("data")
                .and_then(JsonValue::as_array)
                .cloned()
                .unwrap_or_default()),
        }
    }

    async fn optimize(&self, payload: &JsonValue, timeout: Duration) -> DomainResult<JsonValue> {
        let response = self
            .http
            .post(self.url("/optimize"))
            .timeout(timeout)
            .json(payload)
            .send()
            .await?;
        let response = Self::expect_ok(response, "optimize").await?;
        Ok(response.json().await?)
    }

    async fn put_measurement_value(
        &self,
        key: &str,
        ts: DateTime<Utc>,
        value: f64,
    ) -> DomainResult<()> {
        let response = self
            .http
            .put(self.url("/v1/measurement/value"))
            .query(&[
                ("key", key.to_string()),
                ("datetime", ts.to_rfc3339()),
                ("value", value.to_string()),
            ])
            .send()
            .await?;
        Self::expect_ok(response, "measurement push").await?;
        Ok(())
    }
}
