//! Service script invocation over HTTP.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info};

use super::conf::ConnectionConf;
use crate::config::ServiceConfig;
use crate::error::Result;

/// Calls `GET {endpoint}/{service}` for each service path of a `.svc` file.
#[derive(Debug, Clone)]
pub struct ServiceHandler {
    client: Client,
    endpoint: String,
}

impl ServiceHandler {
    pub fn new(conf: &ConnectionConf, config: &ServiceConfig) -> Result<Self> {
        let endpoint = conf.service_endpoint()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        info!("Service connection initialized: {}", endpoint);
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Invoke one service. The error is the message reported for the file.
    pub async fn invoke(&self, service: &str) -> std::result::Result<(), String> {
        let url = format!("{}/{}", self.endpoint, service.trim().trim_start_matches('/'));
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("Error executing service. {}", e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("Error executing service. {}", e))?;
        evaluate_response(status, &body)
    }
}

/// Success requires a 2xx status and a JSON body whose `status` is `"OK"`.
pub fn evaluate_response(status: StatusCode, body: &str) -> std::result::Result<(), String> {
    if !status.is_success() {
        return Err(status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| status.to_string()));
    }

    let data: Value = serde_json::from_str(body)
        .map_err(|e| format!("Error executing service. invalid response: {}", e))?;
    if data.get("status").and_then(Value::as_str) == Some("OK") {
        return Ok(());
    }

    let error = match data.get("error") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "service did not report OK".to_string(),
        Some(other) => other.to_string(),
    };
    Err(format!("Error executing service. {}", error))
}
