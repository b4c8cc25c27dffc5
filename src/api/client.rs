use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::ApiConfig;
use crate::error::{ChargeflowError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::models::{ChargingSession, Port, Vehicle};

/// Authenticated JSON client for the charging backend
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    logger: StructuredLogger,
}

impl BackendClient {
    /// Build a client from the API section of the configuration
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config
                .token
                .as_ref()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            logger: get_logger("api"),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .http
            .request(method, url)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, concat!("chargeflow/", env!("CARGO_PKG_VERSION")));
        if let Some(token) = &self.token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let resp = builder.send().await?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let err = error_from_response(resp).await;
        self.logger.debug(&format!("{what} failed: {err}"));
        Err(err)
    }

    /// GET a JSON document
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.send(self.request(Method::GET, path), path).await?;
        Ok(resp.json().await?)
    }

    /// POST a JSON body and decode the JSON reply
    pub async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let resp = self
            .send(self.request(Method::POST, path).json(body), path)
            .await?;
        Ok(resp.json().await?)
    }

    /// PATCH a JSON body and decode the JSON reply
    pub async fn patch_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let resp = self
            .send(self.request(Method::PATCH, path).json(body), path)
            .await?;
        Ok(resp.json().await?)
    }

    /// PATCH a JSON body; any success status is an ack, the reply is ignored
    pub async fn patch_ack<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<()> {
        self.send(self.request(Method::PATCH, path).json(body), path)
            .await?;
        Ok(())
    }

    /// Sessions of the current principal
    pub async fn list_sessions(&self) -> Result<Vec<ChargingSession>> {
        self.get_json("/sessions").await
    }

    pub async fn fetch_vehicle(&self, vehicle_id: i64) -> Result<Vehicle> {
        self.get_json(&format!("/vehicles/{vehicle_id}")).await
    }

    pub async fn fetch_port(&self, port_id: i64) -> Result<Port> {
        self.get_json(&format!("/ports/{port_id}")).await
    }
}

/// Turn a non-2xx reply into an API error carrying the backend's `detail`
async fn error_from_response(resp: Response) -> ChargeflowError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("detail").cloned())
        .map(|d| match d {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map_or_else(|| format!("HTTP {}", status.as_u16()), str::to_string)
        });
    ChargeflowError::api(status.as_u16(), detail)
}
