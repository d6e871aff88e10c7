//! HTTP API for the OblivionX key system.
//!
//! Thin boundary over [`oblivion_keys::KeyEngine`]: parses JSON request
//! bodies, invokes the engine, and serializes its outcomes. Business
//! results (no key, invalid key, expired key) travel as HTTP 200 with
//! boolean flags; only a missing parameter (400) and an incomplete
//! verification (403) map to HTTP error codes.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::SecondsFormat;
use oblivion_keys::{KeyEngine, KeyError, KeyStatus, Store, Validation};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::error;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub session_id: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub session_id: Option<String>,
    pub system: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ValidateRequest {
    pub key: Option<String>,
    pub hwid: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    pub key: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CheckKeyResponse {
    pub has_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ValidateKeyResponse {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// Maps an engine error to its wire representation.
fn error_reply(err: &KeyError) -> (StatusCode, Json<Ack>) {
    let (status, message) = match err {
        KeyError::MissingParameter(name) => (StatusCode::BAD_REQUEST, format!("Missing {name}")),
        KeyError::VerificationRequired => (
            StatusCode::FORBIDDEN,
            "Please complete the key system link verification first".to_string(),
        ),
        KeyError::Storage(_) | KeyError::Serialization(_) => {
            error!("storage failure: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
        }
    };
    (status, Json(Ack { success: false, message }))
}

async fn liveness() -> &'static str {
    "OblivionX API running"
}

async fn verify_link<S: Store + 'static>(
    State(engine): State<Arc<KeyEngine<S>>>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<Ack>, (StatusCode, Json<Ack>)> {
    let session_id = req.session_id.as_deref().unwrap_or("");
    engine
        .record_verification(session_id)
        .map_err(|err| error_reply(&err))?;
    Ok(Json(Ack {
        success: true,
        message: "Verification recorded".to_string(),
    }))
}

async fn generate_key<S: Store + 'static>(
    State(engine): State<Arc<KeyEngine<S>>>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, (StatusCode, Json<Ack>)> {
    let session_id = req.session_id.as_deref().unwrap_or("");
    let key = engine
        .generate_key(session_id, req.system.as_deref())
        .map_err(|err| error_reply(&err))?;
    Ok(Json(GenerateResponse { success: true, key }))
}

async fn check_key<S: Store + 'static>(
    State(engine): State<Arc<KeyEngine<S>>>,
    Json(req): Json<SessionRequest>,
) -> Json<CheckKeyResponse> {
    let session_id = req.session_id.as_deref().unwrap_or("");
    let response = match engine.check_key(session_id) {
        KeyStatus::Missing => CheckKeyResponse {
            has_key: false,
            key: None,
            expired: None,
            expires_in: None,
        },
        KeyStatus::Expired => CheckKeyResponse {
            has_key: false,
            key: None,
            expired: Some(true),
            expires_in: None,
        },
        KeyStatus::Active { key, expires_in_hours } => CheckKeyResponse {
            has_key: true,
            key: Some(key),
            expired: Some(false),
            expires_in: Some(expires_in_hours),
        },
    };
    Json(response)
}

async fn validate_key<S: Store + 'static>(
    State(engine): State<Arc<KeyEngine<S>>>,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<ValidateKeyResponse>, (StatusCode, Json<Ack>)> {
    let key = req.key.as_deref().unwrap_or("");
    let hwid = req.hwid.as_deref().unwrap_or("");
    let response = match engine.validate_key(key, hwid).map_err(|err| error_reply(&err))? {
        Validation::Invalid => ValidateKeyResponse {
            is_valid: false,
            message: Some("Invalid key"),
            expires_at: None,
        },
        Validation::Expired => ValidateKeyResponse {
            is_valid: false,
            message: Some("Key expired"),
            expires_at: None,
        },
        Validation::Valid { expires_at } => ValidateKeyResponse {
            is_valid: true,
            message: None,
            expires_at: Some(expires_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        },
    };
    Ok(Json(response))
}

/// Build the HTTP API router over the given engine.
pub fn build_router<S: Store + 'static>(engine: Arc<KeyEngine<S>>) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/api/verify-link", post(verify_link::<S>))
        .route("/api/generate-key", post(generate_key::<S>))
        .route("/api/check-key", post(check_key::<S>))
        .route("/api/validate-key", post(validate_key::<S>))
        // The verification pages and the executor call from other origins.
        .layer(CorsLayer::permissive())
        .with_state(engine)
}
