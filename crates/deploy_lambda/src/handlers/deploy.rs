use deploy_core::contract::RawManifest;
use deploy_core::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::adapters::ControlPlane;
use crate::config::ReconcilerConfig;
use crate::error::DeployError;
use crate::reconcile::deploy;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiGatewayResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: Value,
    pub body: String,
}

impl ApiGatewayResponse {
    pub fn body_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Runs one deployment for an API-Gateway-style event (or a bare manifest
/// object) and renders the outcome as an HTTP response.
pub fn handle_deploy_event(
    event: Value,
    fallback_name: Option<String>,
    plane: &impl ControlPlane,
    config: &ReconcilerConfig,
) -> ApiGatewayResponse {
    let payload = match normalize_apigw_event(event) {
        Ok(value) => value,
        Err(message) => return validation_error_response(&message),
    };

    let raw = match serde_json::from_value::<RawManifest>(payload) {
        Ok(value) => value,
        Err(error) => return validation_error_response(&format!("Malformed manifest: {error}")),
    };

    match deploy(raw, fallback_name, plane, config) {
        Ok(summary) => success_response(200, summary),
        Err(error) => deploy_error_response(&error),
    }
}

/// [`handle_deploy_event`] for callers on a multi-threaded Tokio runtime.
///
/// The pipeline blocks (control-plane calls and poll sleeps), so it runs via
/// `block_in_place` instead of on the async worker.
pub async fn serve_deploy_event(
    event: Value,
    fallback_name: Option<String>,
    plane: &impl ControlPlane,
    config: &ReconcilerConfig,
) -> ApiGatewayResponse {
    tokio::task::block_in_place(|| handle_deploy_event(event, fallback_name, plane, config))
}

fn normalize_apigw_event(event: Value) -> Result<Value, String> {
    let Some(object) = event.as_object() else {
        return Err("Request payload must be a JSON object".to_string());
    };

    let Some(body) = object.get("body") else {
        return Ok(event);
    };

    match body {
        Value::Null => Ok(json!({})),
        Value::Object(_) => Ok(body.clone()),
        Value::String(text) => {
            serde_json::from_str(text).map_err(|error| format!("Malformed JSON body: {error}"))
        }
        _ => Err("Request body must be a JSON object".to_string()),
    }
}

pub fn deploy_error_response(error: &DeployError) -> ApiGatewayResponse {
    let payload = match error {
        DeployError::Validation(ValidationError::PolicyDenied(violations)) => {
            warn!(component = "handler", event = "policy_denied", violations = violations.len());
            json!({
                "error": error.kind(),
                "message": error.to_string(),
                "violations": violations,
            })
        }
        DeployError::Validation(ValidationError::Manifest(message)) => {
            warn!(component = "handler", event = "validation_failed", message = %message);
            json!({
                "error": error.kind(),
                "message": message,
            })
        }
        DeployError::ControlPlane { operation, reason } => {
            error!(component = "handler", event = "control_plane_failed", operation, reason = %reason);
            json!({
                "error": error.kind(),
                "message": error.to_string(),
                "operation": operation,
            })
        }
        DeployError::Timeout { resource, attempts } => {
            error!(component = "handler", event = "poll_timed_out", resource = %resource, attempts);
            json!({
                "error": error.kind(),
                "message": error.to_string(),
                "resource": resource,
                "attempts": attempts,
            })
        }
    };
    error_response(error.status_code(), payload)
}

fn validation_error_response(message: &str) -> ApiGatewayResponse {
    deploy_error_response(&DeployError::Validation(ValidationError::new(message)))
}

fn success_response(status_code: u16, payload: impl Serialize) -> ApiGatewayResponse {
    match serde_json::to_string(&payload) {
        Ok(body) => ApiGatewayResponse {
            status_code,
            headers: json!({"Content-Type": "application/json"}),
            body,
        },
        Err(error) => error_response(
            500,
            json!({
                "error": "serialization_error",
                "message": error.to_string(),
            }),
        ),
    }
}

fn error_response(status_code: u16, payload: Value) -> ApiGatewayResponse {
    ApiGatewayResponse {
        status_code,
        headers: json!({"Content-Type": "application/json"}),
        body: payload.to_string(),
    }
}
