// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::application::admission::{AdmissionService, AdmissionVerdict};

pub struct AppState {
    pub service: AdmissionService,
}

/// Admission webhook application.
///
/// `GET /` lists the loaded policy definitions; `POST /` decides an
/// admission request. Allow and deny are both HTTP 200 with different
/// payloads, matching the webhook protocol; only an unparsable body is a
/// client error.
pub fn app(service: AdmissionService) -> Router {
    let state = Arc::new(AppState { service });

    Router::new()
        .route("/", get(list_policies).post(decide))
        .with_state(state)
}

async fn list_policies(State(state): State<Arc<AppState>>) -> Json<Value> {
    let policies: Vec<Value> = state
        .service
        .policies()
        .iter()
        .map(|p| p.source.clone())
        .collect();
    Json(Value::Array(policies))
}

async fn decide(State(state): State<Arc<AppState>>, body: String) -> impl IntoResponse {
    let event: Value = match serde_json::from_str(&body) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "rejecting unparsable admission request");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": e.to_string()})),
            );
        }
    };

    let verdict = state.service.decide(&event).await;
    (StatusCode::OK, Json(envelope(&verdict)))
}

fn envelope(verdict: &AdmissionVerdict) -> Value {
    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "response": {
            "allowed": verdict.allowed,
            "warnings": verdict.warnings,
            "uid": verdict.uid,
            "status": {
                "code": verdict.code,
                "message": verdict.message
            }
        }
    })
}
