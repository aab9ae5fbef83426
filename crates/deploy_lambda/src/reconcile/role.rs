use deploy_core::contract::{Manifest, LOGGING_POLICY_NAME, PERMISSIONS_POLICY_NAME};
use deploy_core::error::ValidationError;
use deploy_core::naming::parse_role_arn;
use deploy_core::policy::PolicyDocument;
use serde::Serialize;
use tracing::info;

use crate::adapters::roles::RoleService;
use crate::error::DeployError;
use crate::reconcile::lookup::find_by_identifier;
use crate::reconcile::ReconcileAction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleOutcome {
    pub action: ReconcileAction,
    pub role_arn: String,
}

/// Brings the execution role named by `manifest.role_ref` in line with the
/// manifest.
///
/// An existing role keeps its remote identifier, and `manifest.role_ref` is
/// rewritten to that exact spelling so later bindings match byte for byte.
/// Inline policies are reset on every run: whatever is attached gets deleted,
/// then `logging_policy` and (when the manifest carries one)
/// `permissions_policy` are written.
pub fn reconcile_role(
    roles: &impl RoleService,
    manifest: &mut Manifest,
) -> Result<RoleOutcome, DeployError> {
    let trust_document = policy_json(&manifest.derived.trust_policy)?;

    let existing = roles
        .list_roles()
        .map_err(|reason| DeployError::control_plane("list_roles", reason))?;

    let (action, role_name) = match find_by_identifier(&existing, &manifest.role_ref) {
        Some(record) => {
            roles
                .update_trust_policy(&record.role_name, &trust_document)
                .map_err(|reason| DeployError::control_plane("update_trust_policy", reason))?;
            manifest.role_ref = record.arn.clone();
            (ReconcileAction::Updated, record.role_name.clone())
        }
        None => {
            let locator = parse_role_arn(&manifest.role_ref)?;
            roles
                .create_role(&locator.path, &locator.name, &trust_document)
                .map_err(|reason| DeployError::control_plane("create_role", reason))?;
            (ReconcileAction::Created, locator.name)
        }
    };
    info!(
        component = "role_reconciler",
        event = "role_reconciled",
        role_ref = %manifest.role_ref,
        action = ?action,
    );

    reset_inline_policies(roles, &role_name, manifest)?;

    Ok(RoleOutcome {
        action,
        role_arn: manifest.role_ref.clone(),
    })
}

fn reset_inline_policies(
    roles: &impl RoleService,
    role_name: &str,
    manifest: &Manifest,
) -> Result<(), DeployError> {
    let attached = roles
        .list_inline_policies(role_name)
        .map_err(|reason| DeployError::control_plane("list_inline_policies", reason))?;
    for policy_name in &attached {
        roles
            .delete_inline_policy(role_name, policy_name)
            .map_err(|reason| DeployError::control_plane("delete_inline_policy", reason))?;
    }

    let logs_document = policy_json(&manifest.derived.logs_policy)?;
    roles
        .put_inline_policy(role_name, LOGGING_POLICY_NAME, &logs_document)
        .map_err(|reason| DeployError::control_plane("put_inline_policy", reason))?;

    if let Some(policy) = &manifest.policy {
        let document = policy_json(policy)?;
        roles
            .put_inline_policy(role_name, PERMISSIONS_POLICY_NAME, &document)
            .map_err(|reason| DeployError::control_plane("put_inline_policy", reason))?;
    }

    info!(
        component = "role_reconciler",
        event = "inline_policies_reset",
        role_name,
        removed = attached.len(),
        permissions_policy = manifest.policy.is_some(),
    );
    Ok(())
}

pub(crate) fn policy_json(document: &PolicyDocument) -> Result<String, DeployError> {
    document.to_json().map_err(|error| {
        ValidationError::new(format!("policy document is not serializable: {error}")).into()
    })
}
