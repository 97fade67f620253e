//! JSON API over the operation service.
//!
//! Endpoints (all under `/api/v1`):
//! - `POST /operations`                          — create an operation in draft
//! - `GET  /operations/{id}`                     — fetch an operation
//! - `POST /operations/{id}/status`              — request a lifecycle transition
//! - `GET  /operations/{id}/compliance?target=…` — probe the compliance gate
//! - `GET  /operations/{id}/history`             — ordered status history
//! - `POST /operations/{id}/declarations`        — declaration intake
//! - `POST /operations/{id}/crossing`            — execute declaration crossing
//! - `GET  /operations/{id}/crossing`            — current crossing result
//! - `POST /operations/{id}/crossing/resolve`    — resolve a discrepancy result
//! - `POST /operations/{id}/gatt`                — submit the GATT valuation form
//!
//! Errors are structured payloads: `{ kind, message, from?, to?, violations? }`.
//! The kind strings are stable; clients switch on them, never on message text.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use despacho_core::compliance::ComplianceReport;
use despacho_core::domain::crossing::CrossingResult;
use despacho_core::domain::declaration::{Declaration, DeclarationType};
use despacho_core::domain::gatt::GattForm;
use despacho_core::domain::operation::{
    InspectionType, Operation, OperationId, StatusHistoryEntry,
};
use despacho_core::errors::{ApplicationError, DomainError};
use despacho_core::lifecycle::catalog::OperationStatus;

use crate::service::{
    CreateOperationInput, DeclarationIntakeInput, GattFormInput, OperationService, RequestContext,
    TariffLineInput,
};

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<OperationService>,
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateOperationRequest {
    pub reference: String,
    pub client_name: String,
    pub inspection_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub target_status: String,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ComplianceQuery {
    pub target: String,
}

#[derive(Debug, Deserialize)]
pub struct TariffLineRequest {
    pub line_number: u32,
    pub tariff_code: String,
    pub quantity: Decimal,
    pub unit_value: Decimal,
    pub total_value: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct IntakeDeclarationRequest {
    pub declaration_type: String,
    pub fob_value: Decimal,
    pub freight_value: Decimal,
    #[serde(default)]
    pub total_taxes: Decimal,
    pub gatt_method: Option<String>,
    #[serde(default)]
    pub lines: Vec<TariffLineRequest>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CrossingRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct ResolveCrossingRequest {
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct GattFormRequest {
    pub commercial_links: bool,
    pub commissions: Decimal,
    pub unrecorded_transport: Decimal,
    pub adjustment_amount: Decimal,
    pub justification: String,
}

#[derive(Debug, Serialize)]
pub struct ViolationPayload {
    pub rule_code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ComplianceResponse {
    pub passed: bool,
    pub errors: Vec<ViolationPayload>,
}

impl From<ComplianceReport> for ComplianceResponse {
    fn from(report: ComplianceReport) -> Self {
        Self {
            passed: report.passed,
            errors: report
                .violations
                .into_iter()
                .map(|violation| ViolationPayload {
                    rule_code: violation.code.as_str().to_string(),
                    message: violation.message,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violations: Option<Vec<ViolationPayload>>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(service: Arc<OperationService>) -> Router {
    Router::new()
        .route("/api/v1/operations", post(create_operation))
        .route("/api/v1/operations/{id}", get(get_operation))
        .route("/api/v1/operations/{id}/status", post(change_status))
        .route("/api/v1/operations/{id}/compliance", get(validate_compliance))
        .route("/api/v1/operations/{id}/history", get(list_history))
        .route("/api/v1/operations/{id}/declarations", post(intake_declaration))
        .route("/api/v1/operations/{id}/crossing", post(execute_crossing).get(get_crossing))
        .route("/api/v1/operations/{id}/crossing/resolve", post(resolve_crossing))
        .route("/api/v1/operations/{id}/gatt", post(save_gatt_form))
        .with_state(ApiState { service })
}

fn request_context(headers: &HeaderMap) -> RequestContext {
    let actor = header_value(headers, "x-actor").unwrap_or_else(|| "anonymous".to_string());
    let correlation_id = header_value(headers, "x-correlation-id")
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut context = RequestContext::new(actor, correlation_id);
    if let Some(forwarded) = header_value(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            context = context.with_source_ip(first.trim().to_string());
        }
    }
    context
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            kind: "VALIDATION_ERROR".to_string(),
            message: message.into(),
            from: None,
            to: None,
            violations: None,
        }),
    )
}

fn parse_status(raw: &str) -> Result<OperationStatus, (StatusCode, Json<ApiError>)> {
    OperationStatus::parse(raw)
        .ok_or_else(|| bad_request(format!("unknown operation status `{raw}`")))
}

fn error_response(error: ApplicationError) -> (StatusCode, Json<ApiError>) {
    let status = match error.kind() {
        "NOT_FOUND" => StatusCode::NOT_FOUND,
        "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
        "TERMINAL_STATE" | "CROSSING_RESOLVED" | "ALREADY_FINALIZED"
        | "CONCURRENT_MODIFICATION" => StatusCode::CONFLICT,
        "GATE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
        "PERSISTENCE_FAILURE" => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };

    let mut payload = ApiError {
        kind: error.kind().to_string(),
        message: error.to_string(),
        from: None,
        to: None,
        violations: None,
    };

    match &error {
        ApplicationError::Domain(DomainError::InvalidTransition { from, to }) => {
            payload.from = Some(from.as_str().to_string());
            payload.to = Some(to.as_str().to_string());
        }
        ApplicationError::Domain(DomainError::Compliance { violations }) => {
            payload.violations = Some(
                violations
                    .iter()
                    .map(|violation| ViolationPayload {
                        rule_code: violation.code.as_str().to_string(),
                        message: violation.message.clone(),
                    })
                    .collect(),
            );
        }
        _ => {}
    }

    (status, Json(payload))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn create_operation(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(payload): Json<CreateOperationRequest>,
) -> ApiResult<Operation> {
    let inspection_type = match &payload.inspection_type {
        Some(raw) => Some(
            InspectionType::parse(raw)
                .ok_or_else(|| bad_request(format!("unknown inspection type `{raw}`")))?,
        ),
        None => None,
    };
    if payload.reference.trim().is_empty() {
        return Err(bad_request("reference must not be empty"));
    }

    let context = request_context(&headers);
    let operation = state
        .service
        .create_operation(
            CreateOperationInput {
                reference: payload.reference,
                client_name: payload.client_name,
                inspection_type,
            },
            &context,
        )
        .await
        .map_err(error_response)?;
    Ok(Json(operation))
}

async fn get_operation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Operation> {
    let operation =
        state.service.get_operation(&OperationId(id)).await.map_err(error_response)?;
    Ok(Json(operation))
}

async fn change_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<ChangeStatusRequest>,
) -> ApiResult<Operation> {
    let target = parse_status(&payload.target_status)?;
    let context = request_context(&headers);

    let operation = state
        .service
        .change_status(&OperationId(id), target, payload.comment, &context)
        .await
        .map_err(error_response)?;
    Ok(Json(operation))
}

async fn validate_compliance(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<ComplianceQuery>,
) -> ApiResult<ComplianceResponse> {
    let target = parse_status(&query.target)?;
    let report = state
        .service
        .validate_compliance(&OperationId(id), target)
        .await
        .map_err(error_response)?;
    Ok(Json(report.into()))
}

async fn list_history(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<StatusHistoryEntry>> {
    let history =
        state.service.list_history(&OperationId(id)).await.map_err(error_response)?;
    Ok(Json(history))
}

async fn intake_declaration(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<IntakeDeclarationRequest>,
) -> ApiResult<Declaration> {
    let declaration_type = DeclarationType::parse(&payload.declaration_type).ok_or_else(|| {
        bad_request(format!("unknown declaration type `{}`", payload.declaration_type))
    })?;

    let context = request_context(&headers);
    let input = DeclarationIntakeInput {
        declaration_type,
        fob_value: payload.fob_value,
        freight_value: payload.freight_value,
        total_taxes: payload.total_taxes,
        gatt_method: payload.gatt_method,
        lines: payload
            .lines
            .into_iter()
            .map(|line| TariffLineInput {
                line_number: line.line_number,
                tariff_code: line.tariff_code,
                quantity: line.quantity,
                unit_value: line.unit_value,
                total_value: line.total_value,
                tax_rate: line.tax_rate,
                tax_amount: line.tax_amount,
            })
            .collect(),
    };

    let declaration = state
        .service
        .intake_declaration(&OperationId(id), input, &context)
        .await
        .map_err(error_response)?;
    Ok(Json(declaration))
}

async fn execute_crossing(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CrossingRequest>,
) -> ApiResult<CrossingResult> {
    let force = payload.force;
    let context = request_context(&headers);

    let result = state
        .service
        .execute_crossing(&OperationId(id), force, &context)
        .await
        .map_err(error_response)?;
    Ok(Json(result))
}

async fn get_crossing(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<CrossingResult> {
    let result = state.service.get_crossing(&OperationId(id)).await.map_err(error_response)?;
    Ok(Json(result))
}

async fn resolve_crossing(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<ResolveCrossingRequest>,
) -> ApiResult<CrossingResult> {
    let context = request_context(&headers);
    let result = state
        .service
        .resolve_crossing(&OperationId(id), &payload.comment, &context)
        .await
        .map_err(error_response)?;
    Ok(Json(result))
}

async fn save_gatt_form(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<GattFormRequest>,
) -> ApiResult<GattForm> {
    if payload.justification.trim().is_empty() {
        return Err(bad_request("justification must not be empty"));
    }

    let context = request_context(&headers);
    let form = state
        .service
        .save_gatt_form(
            &OperationId(id),
            GattFormInput {
                commercial_links: payload.commercial_links,
                commissions: payload.commissions,
                unrecorded_transport: payload.unrecorded_transport,
                adjustment_amount: payload.adjustment_amount,
                justification: payload.justification,
            },
            &context,
        )
        .await
        .map_err(error_response)?;
    Ok(Json(form))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    use despacho_core::audit::InMemoryAuditSink;
    use despacho_core::compliance::{RuleCode, RuleViolation, StaticComplianceGate};
    use despacho_core::lifecycle::catalog::OperationStatus;
    use despacho_db::repositories::{
        InMemoryCrossingRepository, InMemoryDeclarationRepository, InMemoryGattFormRepository,
        InMemoryOperationRepository,
    };

    use crate::service::OperationService;

    fn router_with_gate(gate: StaticComplianceGate) -> axum::Router {
        let service = OperationService::new(
            Arc::new(InMemoryOperationRepository::default()),
            Arc::new(InMemoryDeclarationRepository::default()),
            Arc::new(InMemoryCrossingRepository::default()),
            Arc::new(InMemoryGattFormRepository::default()),
            Arc::new(gate),
            Arc::new(InMemoryAuditSink::default()),
            true,
        );
        super::router(Arc::new(service))
    }

    async fn send(
        router: &axum::Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = match body {
            Some(body) => Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-actor", "broker-1")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => Request::builder()
                .method(method)
                .uri(uri)
                .header("x-actor", "broker-1")
                .body(Body::empty())
                .expect("request"),
        };

        let response = router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        let value: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    async fn create_operation(router: &axum::Router, inspection_type: Option<&str>) -> String {
        let (status, body) = send(
            router,
            "POST",
            "/api/v1/operations",
            Some(json!({
                "reference": "IMP-2026-0001",
                "client_name": "Acme Importers",
                "inspection_type": inspection_type,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["id"].as_str().expect("operation id").to_string()
    }

    fn declaration_body(declaration_type: &str, quantity: u32) -> Value {
        json!({
            "declaration_type": declaration_type,
            "fob_value": "1000.00",
            "freight_value": "150.00",
            "total_taxes": "210.60",
            "gatt_method": "transaction_value",
            "lines": [{
                "line_number": 1,
                "tariff_code": "8471.30.00",
                "quantity": quantity.to_string(),
                "unit_value": "100.00",
                "total_value": "1000.00",
                "tax_rate": "18.00",
                "tax_amount": "180.00",
            }],
        })
    }

    #[tokio::test]
    async fn lifecycle_transition_round_trips_over_http() {
        let router = router_with_gate(StaticComplianceGate::passing());
        let id = create_operation(&router, None).await;

        let (status, body) = send(
            &router,
            "POST",
            &format!("/api/v1/operations/{id}/status"),
            Some(json!({ "target_status": "documentation_complete", "comment": "docs ready" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "documentation_complete");
        assert_eq!(body["version"], 2);

        let (status, history) =
            send(&router, "GET", &format!("/api/v1/operations/{id}/history"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().expect("history array").len(), 1);
        assert_eq!(history[0]["actor"], "broker-1");
    }

    #[tokio::test]
    async fn invalid_transition_returns_structured_payload() {
        let router = router_with_gate(StaticComplianceGate::passing());
        let id = create_operation(&router, None).await;

        let (status, body) = send(
            &router,
            "POST",
            &format!("/api/v1/operations/{id}/status"),
            Some(json!({ "target_status": "submitted_to_customs" })),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "INVALID_TRANSITION");
        assert_eq!(body["from"], "draft");
        assert_eq!(body["to"], "submitted_to_customs");
    }

    #[tokio::test]
    async fn compliance_failure_lists_every_violation() {
        let gate = StaticComplianceGate::passing().with_violations(
            OperationStatus::DocumentationComplete,
            vec![
                RuleViolation::new(RuleCode::DocumentationIncomplete, "2 documents missing"),
                RuleViolation::new(RuleCode::DocumentBlocked, "invoice blocked"),
            ],
        );
        let router = router_with_gate(gate);
        let id = create_operation(&router, None).await;

        let (status, body) = send(
            &router,
            "POST",
            &format!("/api/v1/operations/{id}/status"),
            Some(json!({ "target_status": "documentation_complete" })),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "COMPLIANCE_FAILED");
        let violations = body["violations"].as_array().expect("violations");
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0]["rule_code"], "documentation_incomplete");

        let (status, probe) = send(
            &router,
            "GET",
            &format!("/api/v1/operations/{id}/compliance?target=documentation_complete"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(probe["passed"], false);
        assert_eq!(probe["errors"].as_array().expect("errors").len(), 2);
    }

    #[tokio::test]
    async fn crossing_flow_over_http() {
        let router = router_with_gate(StaticComplianceGate::passing());
        let id = create_operation(&router, None).await;

        for (declaration_type, quantity) in [("preliminary", 10), ("final", 12)] {
            let (status, _body) = send(
                &router,
                "POST",
                &format!("/api/v1/operations/{id}/declarations"),
                Some(declaration_body(declaration_type, quantity)),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, result) = send(
            &router,
            "POST",
            &format!("/api/v1/operations/{id}/crossing"),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["status"], "discrepancy");
        assert_eq!(result["discrepancies"].as_array().expect("list").len(), 1);
        assert_eq!(result["discrepancies"][0]["field"], "tariff_line_quantity");

        let (status, body) = send(
            &router,
            "POST",
            &format!("/api/v1/operations/{id}/crossing/resolve"),
            Some(json!({ "comment": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "VALIDATION_ERROR");

        let (status, resolved) = send(
            &router,
            "POST",
            &format!("/api/v1/operations/{id}/crossing/resolve"),
            Some(json!({ "comment": "quantity confirmed with carrier" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resolved["status"], "resolved");
        assert_eq!(resolved["resolved_by"], "broker-1");

        let (status, body) = send(
            &router,
            "POST",
            &format!("/api/v1/operations/{id}/crossing"),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "CROSSING_RESOLVED");

        let (status, _body) = send(
            &router,
            "POST",
            &format!("/api/v1/operations/{id}/crossing"),
            Some(json!({ "force": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn gatt_form_round_trips_and_finalizes() {
        let router = router_with_gate(StaticComplianceGate::passing());
        let id = create_operation(&router, Some("fisica")).await;

        let (status, _body) = send(
            &router,
            "POST",
            &format!("/api/v1/operations/{id}/declarations"),
            Some(declaration_body("final", 10)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let gatt_body = json!({
            "commercial_links": false,
            "commissions": "50.00",
            "unrecorded_transport": "20.00",
            "adjustment_amount": "-10.00",
            "justification": "buying commission not invoiced",
        });

        let (status, form) = send(
            &router,
            "POST",
            &format!("/api/v1/operations/{id}/gatt"),
            Some(gatt_body.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        // taxable base derives from CIF: 1000 + 150 + 20 = 1170; adjusted 1170 + 50 + 20 - 10
        assert_eq!(form["adjusted_taxable_base"], "1230.00");

        let (status, body) =
            send(&router, "POST", &format!("/api/v1/operations/{id}/gatt"), Some(gatt_body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "ALREADY_FINALIZED");
    }

    #[tokio::test]
    async fn unknown_operation_is_404() {
        let router = router_with_gate(StaticComplianceGate::passing());
        let (status, body) = send(&router, "GET", "/api/v1/operations/OP-404", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn unknown_status_string_is_a_validation_error() {
        let router = router_with_gate(StaticComplianceGate::passing());
        let id = create_operation(&router, None).await;

        let (status, body) = send(
            &router,
            "POST",
            &format!("/api/v1/operations/{id}/status"),
            Some(json!({ "target_status": "teleported" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "VALIDATION_ERROR");
    }
}
