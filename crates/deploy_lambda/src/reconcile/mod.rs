//! Reconciliation pipeline: normalize, reconcile the execution role, then
//! reconcile the function.
//!
//! The role always goes first because the function binds to the role's
//! final identifier.

pub mod function;
pub mod lookup;
pub mod role;

use deploy_core::contract::{
    account_from_manifest, manifest_fingerprint, normalize_manifest, Manifest, NormalizeContext,
    RawManifest,
};
use serde::Serialize;
use tracing::info;

use crate::adapters::identity::IdentityService;
use crate::adapters::ControlPlane;
use crate::config::ReconcilerConfig;
use crate::error::DeployError;

pub use self::function::{reconcile_function, resolve_latest_image, FunctionOutcome};
pub use self::role::{reconcile_role, RoleOutcome};

pub const SUCCESS_MESSAGE: &str = "Deployment Successful";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentSummary {
    pub message: String,
    pub manifest_fingerprint: String,
    pub role: ReconcileAction,
    pub role_ref: String,
    pub function: ReconcileAction,
    pub function_ref: String,
    pub image_uri: String,
}

/// Normalizes `raw`, resolving account and region from the manifest's own
/// repository identifier when present and from `identity` otherwise.
pub fn prepare_manifest(
    raw: RawManifest,
    fallback_name: Option<String>,
    identity: &impl IdentityService,
) -> Result<Manifest, DeployError> {
    let account = match account_from_manifest(&raw)? {
        Some(account) => account,
        None => identity
            .current_account_and_region()
            .map_err(|reason| DeployError::control_plane("current_account_and_region", reason))?,
    };

    let manifest = normalize_manifest(
        raw,
        &NormalizeContext {
            fallback_name,
            account,
        },
    )?;
    Ok(manifest)
}

pub fn deploy(
    raw: RawManifest,
    fallback_name: Option<String>,
    plane: &impl ControlPlane,
    config: &ReconcilerConfig,
) -> Result<DeploymentSummary, DeployError> {
    let mut manifest = prepare_manifest(raw, fallback_name, plane)?;
    let fingerprint = manifest_fingerprint(&manifest)?;
    info!(
        component = "deploy",
        event = "manifest_normalized",
        manifest_fingerprint = %fingerprint,
        function_ref = %manifest.function_ref,
        role_ref = %manifest.role_ref,
        repository_ref = %manifest.repository_ref,
    );

    let role = reconcile_role(plane, &mut manifest)?;
    let function = reconcile_function(plane, &manifest, &config.wait)?;

    info!(
        component = "deploy",
        event = "deployment_succeeded",
        manifest_fingerprint = %fingerprint,
        function_ref = %function.function_arn,
    );
    Ok(DeploymentSummary {
        message: SUCCESS_MESSAGE.to_string(),
        manifest_fingerprint: fingerprint,
        role: role.action,
        role_ref: role.role_arn,
        function: function.action,
        function_ref: function.function_arn,
        image_uri: function.image_uri,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use deploy_core::naming::AccountRegion;
    use serde_json::json;

    use super::*;
    use crate::adapters::in_memory::{ControlPlaneCall, InMemoryControlPlane};
    use crate::wait::WaitPolicy;

    fn config() -> ReconcilerConfig {
        ReconcilerConfig {
            wait: WaitPolicy::immediate(3),
            ..ReconcilerConfig::default()
        }
    }

    fn raw(value: serde_json::Value) -> RawManifest {
        serde_json::from_value(value).expect("manifest should deserialize")
    }

    #[test]
    fn account_comes_from_identity_when_repository_is_derived() {
        let plane = InMemoryControlPlane::new(AccountRegion::new("123456789012", "eu-west-1"));

        let manifest =
            prepare_manifest(raw(json!({"name": "orders"})), None, &plane).expect("normalized");

        assert_eq!(
            manifest.repository_ref,
            "arn:aws:ecr:eu-west-1:123456789012:repository/orders"
        );
        assert_eq!(plane.calls(), vec![ControlPlaneCall::CurrentAccount]);
    }

    #[test]
    fn explicit_repository_skips_identity_lookup() {
        let plane = InMemoryControlPlane::new(AccountRegion::new("123456789012", "eu-west-1"));

        let manifest = prepare_manifest(
            raw(json!({
                "name": "orders",
                "repository_ref": "arn:aws:ecr:us-west-2:999988887777:repository/shared/orders"
            })),
            None,
            &plane,
        )
        .expect("normalized");

        assert_eq!(
            manifest.function_ref,
            "arn:aws:lambda:us-west-2:999988887777:function:orders"
        );
        assert!(plane.calls().is_empty());
    }

    #[test]
    fn deploys_role_before_function() {
        let plane = InMemoryControlPlane::new(AccountRegion::new("123456789012", "eu-west-1"))
            .with_image("orders", &["v1"], Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap());

        let summary =
            deploy(raw(json!({"name": "orders"})), None, &plane, &config()).expect("deployed");

        assert_eq!(summary.message, SUCCESS_MESSAGE);
        assert_eq!(summary.role, ReconcileAction::Created);
        assert_eq!(summary.function, ReconcileAction::Created);
        assert_eq!(summary.manifest_fingerprint.len(), 64);

        let calls = plane.calls();
        let role_created = calls
            .iter()
            .position(|call| matches!(call, ControlPlaneCall::CreateRole { .. }))
            .expect("role should be created");
        let function_created = calls
            .iter()
            .position(|call| matches!(call, ControlPlaneCall::CreateFunction { .. }))
            .expect("function should be created");
        assert!(role_created < function_created);
    }

    #[test]
    fn denied_policy_makes_no_remote_calls() {
        let plane = InMemoryControlPlane::new(AccountRegion::new("123456789012", "eu-west-1"));

        let error = deploy(
            raw(json!({
                "name": "orders",
                "repository_ref": "arn:aws:ecr:eu-west-1:123456789012:repository/orders",
                "policy": {"Statement": [{"Action": "iam:PassRole", "Resource": "*"}]}
            })),
            None,
            &plane,
            &config(),
        )
        .expect_err("policy should be denied");

        assert_eq!(error.status_code(), 403);
        assert!(plane.calls().is_empty());
    }
}
