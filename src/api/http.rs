//! HTTP implementation of [`DashboardApi`] on top of reqwest.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::{DashboardApi, HealthData, SummaryData};
use crate::config::{EndpointConfig, MonitorConfig};
use crate::error::ApiError;

pub struct HttpDashboardApi {
    client: reqwest::Client,
    base_url: String,
    ping_url: Url,
    summary_url: Url,
    health_url: Url,
    probe_timeout: Duration,
    request_timeout: Duration,
}

impl HttpDashboardApi {
    pub fn new(
        base: Url,
        endpoints: &EndpointConfig,
        probe_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let join = |path: &str| {
            base.join(path)
                .with_context(|| format!("Invalid endpoint path {:?} for {}", path, base))
        };

        Ok(Self {
            client: reqwest::Client::new(),
            ping_url: join(&endpoints.ping)?,
            summary_url: join(&endpoints.summary)?,
            health_url: join(&endpoints.health)?,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            probe_timeout,
            request_timeout,
        })
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        Self::new(
            config.base_url()?,
            &config.endpoints,
            config.probe_timeout(),
            config.request_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, ApiError> {
        let endpoint = url.path();
        let resp = self
            .client
            .get(url.clone())
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(endpoint, &self.base_url, e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ApiError::from_reqwest(endpoint, &self.base_url, e))?;

        if !status.is_success() {
            return Err(ApiError::status(endpoint, status, &body));
        }

        serde_json::from_str(&body).map_err(|source| ApiError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }
}

#[async_trait]
impl DashboardApi for HttpDashboardApi {
    async fn probe(&self) -> Result<(), ApiError> {
        let endpoint = self.ping_url.path();
        let resp = self
            .client
            .get(self.ping_url.clone())
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(endpoint, &self.base_url, e))?;

        let status = resp.status();
        debug!(endpoint, status = status.as_u16(), "Probe answered");
        if status.is_success() {
            Ok(())
        } else {
            Err(ApiError::status(endpoint, status, ""))
        }
    }

    async fn summary(&self) -> Result<SummaryData, ApiError> {
        self.get_json(&self.summary_url).await
    }

    async fn health(&self) -> Result<HealthData, ApiError> {
        self.get_json(&self.health_url).await
    }
}
