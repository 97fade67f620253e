//! HTTP client for the external compliance rule engine.
//!
//! The gate exposes one endpoint: `POST {base_url}/validate` with the
//! operation identity and candidate target status, answering
//! `{ "passed": bool, "errors": [{ "ruleCode": "...", "message": "..." }] }`.
//! Transport failures and timeouts collapse into `GateError::Unavailable`;
//! the transition engine decides what that means (fail-open or fail-closed).

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use despacho_core::compliance::{ComplianceGate, ComplianceReport, GateError, RuleCode, RuleViolation};
use despacho_core::config::GateConfig;
use despacho_core::domain::operation::Operation;
use despacho_core::lifecycle::catalog::OperationStatus;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateRequest<'a> {
    operation_id: &'a str,
    reference: &'a str,
    current_status: &'a str,
    target_status: &'a str,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateResponse {
    passed: bool,
    #[serde(default)]
    errors: Vec<WireViolation>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireViolation {
    rule_code: String,
    message: String,
}

pub struct HttpComplianceGate {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<SecretString>,
}

impl HttpComplianceGate {
    /// Builds the client from config. Fails if no base URL is configured or
    /// the underlying client cannot be constructed.
    pub fn from_config(config: &GateConfig) -> Result<Self, GateError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| GateError::Unavailable("gate.base_url is not configured".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| GateError::Unavailable(error.to_string()))?;

        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), api_token: config.api_token.clone() })
    }
}

#[async_trait]
impl ComplianceGate for HttpComplianceGate {
    async fn validate(
        &self,
        operation: &Operation,
        target: OperationStatus,
    ) -> Result<ComplianceReport, GateError> {
        let url = format!("{}/validate", self.base_url);
        let body = ValidateRequest {
            operation_id: &operation.id.0,
            reference: &operation.reference,
            current_status: operation.status.as_str(),
            target_status: target.as_str(),
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| GateError::Unavailable(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GateError::Unavailable(format!(
                "gate answered HTTP {status} for {url}"
            )));
        }

        let payload: ValidateResponse = response
            .json()
            .await
            .map_err(|error| GateError::InvalidResponse(error.to_string()))?;

        debug!(
            event_name = "compliance.gate_answered",
            operation_id = %operation.id,
            target = target.as_str(),
            passed = payload.passed,
            violations = payload.errors.len(),
            "compliance gate verdict received"
        );

        let violations: Vec<RuleViolation> = payload
            .errors
            .into_iter()
            .map(|violation| RuleViolation {
                code: RuleCode::parse(&violation.rule_code),
                message: violation.message,
            })
            .collect();

        if payload.passed {
            Ok(ComplianceReport::passing())
        } else {
            Ok(ComplianceReport::failing(violations))
        }
    }
}
