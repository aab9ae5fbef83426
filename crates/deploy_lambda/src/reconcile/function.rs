use deploy_core::contract::Manifest;
use deploy_core::naming::{parse_repository_arn, RepositoryLocator};
use serde::Serialize;
use tracing::{info, warn};

use crate::adapters::functions::{FunctionConfiguration, FunctionService, UpdateStatus};
use crate::adapters::images::ImageRegistry;
use crate::error::DeployError;
use crate::reconcile::lookup::find_by_identifier;
use crate::reconcile::ReconcileAction;
use crate::wait::{wait_until, WaitError, WaitPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionOutcome {
    pub action: ReconcileAction,
    pub function_arn: String,
    pub image_uri: String,
}

/// Reference to the most recently pushed image in `repository`.
///
/// The newest image is addressed by its first tag, or by digest when it
/// carries no tag.
pub fn resolve_latest_image(
    registry: &impl ImageRegistry,
    repository: &RepositoryLocator,
) -> Result<String, DeployError> {
    let images = registry
        .list_images(repository)
        .map_err(|reason| DeployError::control_plane("list_images", reason))?;

    let latest = images
        .iter()
        .max_by_key(|image| image.pushed_at)
        .ok_or_else(|| {
            DeployError::control_plane(
                "list_images",
                format!(
                    "repository {} contains no images",
                    repository.repository_name
                ),
            )
        })?;

    if let Some(tag) = latest.tags.first() {
        return Ok(repository.image_uri(tag));
    }
    latest
        .digest
        .as_deref()
        .map(|digest| repository.image_digest_uri(digest))
        .ok_or_else(|| {
            DeployError::control_plane(
                "list_images",
                format!(
                    "latest image in {} has neither a tag nor a digest",
                    repository.repository_name
                ),
            )
        })
}

pub fn reconcile_function<P>(
    plane: &P,
    manifest: &Manifest,
    wait: &WaitPolicy,
) -> Result<FunctionOutcome, DeployError>
where
    P: FunctionService + ImageRegistry,
{
    let repository = parse_repository_arn(&manifest.repository_ref)?;
    let image_uri = resolve_latest_image(plane, &repository)?;
    let configuration = FunctionConfiguration {
        role_arn: manifest.role_ref.clone(),
        description: manifest.settings.description.clone(),
        memory_mb: manifest.settings.memory_mb,
        timeout_seconds: manifest.settings.timeout_seconds,
        ephemeral_storage_mb: manifest.settings.ephemeral_storage_mb,
    };

    let existing = plane
        .list_functions()
        .map_err(|reason| DeployError::control_plane("list_functions", reason))?;

    let outcome = match find_by_identifier(&existing, &manifest.function_ref) {
        None => {
            let function_arn = plane
                .create_function(&manifest.function_ref, &configuration, &image_uri)
                .map_err(|reason| DeployError::control_plane("create_function", reason))?;
            FunctionOutcome {
                action: ReconcileAction::Created,
                function_arn,
                image_uri,
            }
        }
        Some(record) => {
            let function_arn = record.arn.clone();
            wait_for_function_idle(plane, &function_arn, wait)?;
            plane
                .update_configuration(&function_arn, &configuration)
                .map_err(|reason| DeployError::control_plane("update_configuration", reason))?;
            wait_for_function_update(plane, &function_arn, wait)?;
            plane
                .update_code(&function_arn, &image_uri, true)
                .map_err(|reason| DeployError::control_plane("update_code", reason))?;
            FunctionOutcome {
                action: ReconcileAction::Updated,
                function_arn,
                image_uri,
            }
        }
    };

    info!(
        component = "function_reconciler",
        event = "function_reconciled",
        function_ref = %outcome.function_arn,
        image_uri = %outcome.image_uri,
        action = ?outcome.action,
    );
    Ok(outcome)
}

/// Blocks until no update of `identifier` is in flight, whatever its
/// outcome. A previous run's code update may still be settling, and the
/// control plane rejects a configuration change until it does.
pub fn wait_for_function_idle(
    functions: &impl FunctionService,
    identifier: &str,
    wait: &WaitPolicy,
) -> Result<(), DeployError> {
    let result = wait_until(wait, "get_update_status", |_| {
        match functions.get_update_status(identifier)? {
            UpdateStatus::Successful => Ok(Some(())),
            UpdateStatus::Failed(reason) => {
                warn!(
                    component = "function_reconciler",
                    event = "previous_update_failed",
                    function_ref = %identifier,
                    reason = %reason,
                );
                Ok(Some(()))
            }
            UpdateStatus::Pending => Ok(None),
        }
    });
    settle_result(result, identifier)
}

/// Blocks until the last configuration update of `identifier` settles.
///
/// A `Failed` status is reported with the remote reason untouched.
pub fn wait_for_function_update(
    functions: &impl FunctionService,
    identifier: &str,
    wait: &WaitPolicy,
) -> Result<(), DeployError> {
    let result = wait_until(wait, "get_update_status", |_| {
        match functions.get_update_status(identifier)? {
            UpdateStatus::Successful => Ok(Some(())),
            UpdateStatus::Failed(reason) => Err(reason),
            UpdateStatus::Pending => Ok(None),
        }
    });
    settle_result(result, identifier)
}

fn settle_result(result: Result<(), WaitError<String>>, identifier: &str) -> Result<(), DeployError> {
    match result {
        Ok(()) => Ok(()),
        Err(WaitError::Failed(reason)) => {
            Err(DeployError::control_plane("get_update_status", reason))
        }
        Err(WaitError::Exhausted { attempts }) => Err(DeployError::Timeout {
            resource: identifier.to_string(),
            attempts,
        }),
    }
}
