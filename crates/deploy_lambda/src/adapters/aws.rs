//! Control-plane gateway backed by the AWS SDK.
//!
//! The SDK is async; the gateway traits are synchronous, so every call is
//! driven to completion on the current Tokio runtime via `block_in_place`.
//! Callers must therefore run on a multi-threaded runtime.

use std::future::Future;

use aws_sdk_lambda::types::{EphemeralStorage, FunctionCode, LastUpdateStatus, PackageType};
use chrono::{DateTime, Utc};
use deploy_core::naming::{AccountRegion, RepositoryLocator};

use crate::adapters::functions::{
    FunctionConfiguration, FunctionRecord, FunctionService, UpdateStatus,
};
use crate::adapters::identity::IdentityService;
use crate::adapters::images::{ImageDetail, ImageRegistry};
use crate::adapters::roles::{RoleRecord, RoleService};

#[derive(Clone)]
pub struct AwsControlPlane {
    sdk_config: aws_config::SdkConfig,
    region: Option<String>,
    iam: aws_sdk_iam::Client,
    lambda: aws_sdk_lambda::Client,
    ecr: aws_sdk_ecr::Client,
    sts: aws_sdk_sts::Client,
}

impl AwsControlPlane {
    pub async fn load() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::from_config(&config)
    }

    pub fn from_config(config: &aws_config::SdkConfig) -> Self {
        Self {
            sdk_config: config.clone(),
            region: config.region().map(ToString::to_string),
            iam: aws_sdk_iam::Client::new(config),
            lambda: aws_sdk_lambda::Client::new(config),
            ecr: aws_sdk_ecr::Client::new(config),
            sts: aws_sdk_sts::Client::new(config),
        }
    }

    /// ECR client for the repository's own region; the shared client when
    /// that is the configured region.
    fn ecr_for(&self, repository: &RepositoryLocator) -> aws_sdk_ecr::Client {
        match regional_override(self.region.as_deref(), &repository.region) {
            Some(region) => {
                let config = aws_sdk_ecr::config::Builder::from(&self.sdk_config)
                    .region(aws_sdk_ecr::config::Region::new(region.to_string()))
                    .build();
                aws_sdk_ecr::Client::from_conf(config)
            }
            None => self.ecr.clone(),
        }
    }
}

fn regional_override<'a>(configured: Option<&str>, repository_region: &'a str) -> Option<&'a str> {
    (configured != Some(repository_region)).then_some(repository_region)
}

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

fn to_i32(field: &str, value: u32) -> Result<i32, String> {
    i32::try_from(value).map_err(|_| format!("{field}={value} is out of range"))
}

impl IdentityService for AwsControlPlane {
    fn current_account_and_region(&self) -> Result<AccountRegion, String> {
        let region = self
            .region
            .clone()
            .ok_or_else(|| "no AWS region is configured".to_string())?;
        let identity = block_on(self.sts.get_caller_identity().send()).map_err(|error| {
            format!(
                "failed to resolve caller identity: {}",
                aws_sdk_sts::error::DisplayErrorContext(&error)
            )
        })?;
        let account_id = identity
            .account()
            .ok_or_else(|| "caller identity has no account id".to_string())?;
        Ok(AccountRegion::new(account_id, region))
    }
}

impl RoleService for AwsControlPlane {
    fn list_roles(&self) -> Result<Vec<RoleRecord>, String> {
        let roles = block_on(
            self.iam
                .list_roles()
                .into_paginator()
                .items()
                .send()
                .try_collect(),
        )
        .map_err(|error| {
            format!(
                "failed to list roles: {}",
                aws_sdk_iam::error::DisplayErrorContext(&error)
            )
        })?;

        Ok(roles
            .into_iter()
            .map(|role| RoleRecord {
                arn: role.arn().to_string(),
                role_name: role.role_name().to_string(),
                path: role.path().to_string(),
            })
            .collect())
    }

    fn create_role(&self, path: &str, role_name: &str, trust_policy: &str) -> Result<(), String> {
        block_on(
            self.iam
                .create_role()
                .path(path)
                .role_name(role_name)
                .assume_role_policy_document(trust_policy)
                .send(),
        )
        .map(|_| ())
        .map_err(|error| {
            format!(
                "failed to create role {role_name}: {}",
                aws_sdk_iam::error::DisplayErrorContext(&error)
            )
        })
    }

    fn update_trust_policy(&self, role_name: &str, trust_policy: &str) -> Result<(), String> {
        block_on(
            self.iam
                .update_assume_role_policy()
                .role_name(role_name)
                .policy_document(trust_policy)
                .send(),
        )
        .map(|_| ())
        .map_err(|error| {
            format!(
                "failed to update trust policy of {role_name}: {}",
                aws_sdk_iam::error::DisplayErrorContext(&error)
            )
        })
    }

    fn list_inline_policies(&self, role_name: &str) -> Result<Vec<String>, String> {
        block_on(
            self.iam
                .list_role_policies()
                .role_name(role_name)
                .into_paginator()
                .items()
                .send()
                .try_collect(),
        )
        .map_err(|error| {
            format!(
                "failed to list inline policies of {role_name}: {}",
                aws_sdk_iam::error::DisplayErrorContext(&error)
            )
        })
    }

    fn delete_inline_policy(&self, role_name: &str, policy_name: &str) -> Result<(), String> {
        block_on(
            self.iam
                .delete_role_policy()
                .role_name(role_name)
                .policy_name(policy_name)
                .send(),
        )
        .map(|_| ())
        .map_err(|error| {
            format!(
                "failed to delete inline policy {policy_name} of {role_name}: {}",
                aws_sdk_iam::error::DisplayErrorContext(&error)
            )
        })
    }

    fn put_inline_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<(), String> {
        block_on(
            self.iam
                .put_role_policy()
                .role_name(role_name)
                .policy_name(policy_name)
                .policy_document(document)
                .send(),
        )
        .map(|_| ())
        .map_err(|error| {
            format!(
                "failed to put inline policy {policy_name} on {role_name}: {}",
                aws_sdk_iam::error::DisplayErrorContext(&error)
            )
        })
    }
}

impl FunctionService for AwsControlPlane {
    fn list_functions(&self) -> Result<Vec<FunctionRecord>, String> {
        let functions = block_on(
            self.lambda
                .list_functions()
                .into_paginator()
                .items()
                .send()
                .try_collect(),
        )
        .map_err(|error| {
            format!(
                "failed to list functions: {}",
                aws_sdk_lambda::error::DisplayErrorContext(&error)
            )
        })?;

        Ok(functions
            .into_iter()
            .filter_map(|function| {
                Some(FunctionRecord {
                    arn: function.function_arn()?.to_string(),
                    function_name: function.function_name().unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    fn create_function(
        &self,
        function_name: &str,
        configuration: &FunctionConfiguration,
        image_uri: &str,
    ) -> Result<String, String> {
        let storage = EphemeralStorage::builder()
            .size(to_i32(
                "ephemeral_storage_mb",
                configuration.ephemeral_storage_mb,
            )?)
            .build()
            .map_err(|error| format!("invalid ephemeral storage: {error}"))?;

        let response = block_on(
            self.lambda
                .create_function()
                .function_name(function_name)
                .role(&configuration.role_arn)
                .package_type(PackageType::Image)
                .code(FunctionCode::builder().image_uri(image_uri).build())
                .description(&configuration.description)
                .memory_size(to_i32("memory_mb", configuration.memory_mb)?)
                .timeout(to_i32("timeout_seconds", configuration.timeout_seconds)?)
                .ephemeral_storage(storage)
                .publish(true)
                .send(),
        )
        .map_err(|error| {
            format!(
                "failed to create function {function_name}: {}",
                aws_sdk_lambda::error::DisplayErrorContext(&error)
            )
        })?;

        Ok(response
            .function_arn()
            .unwrap_or(function_name)
            .to_string())
    }

    fn update_configuration(
        &self,
        identifier: &str,
        configuration: &FunctionConfiguration,
    ) -> Result<(), String> {
        let storage = EphemeralStorage::builder()
            .size(to_i32(
                "ephemeral_storage_mb",
                configuration.ephemeral_storage_mb,
            )?)
            .build()
            .map_err(|error| format!("invalid ephemeral storage: {error}"))?;

        block_on(
            self.lambda
                .update_function_configuration()
                .function_name(identifier)
                .role(&configuration.role_arn)
                .description(&configuration.description)
                .memory_size(to_i32("memory_mb", configuration.memory_mb)?)
                .timeout(to_i32("timeout_seconds", configuration.timeout_seconds)?)
                .ephemeral_storage(storage)
                .send(),
        )
        .map(|_| ())
        .map_err(|error| {
            format!(
                "failed to update configuration of {identifier}: {}",
                aws_sdk_lambda::error::DisplayErrorContext(&error)
            )
        })
    }

    fn get_update_status(&self, identifier: &str) -> Result<UpdateStatus, String> {
        let response = block_on(
            self.lambda
                .get_function_configuration()
                .function_name(identifier)
                .send(),
        )
        .map_err(|error| {
            format!(
                "failed to read configuration of {identifier}: {}",
                aws_sdk_lambda::error::DisplayErrorContext(&error)
            )
        })?;

        Ok(match response.last_update_status() {
            None | Some(LastUpdateStatus::Successful) => UpdateStatus::Successful,
            Some(LastUpdateStatus::Failed) => UpdateStatus::Failed(
                response
                    .last_update_status_reason()
                    .unwrap_or("unknown")
                    .to_string(),
            ),
            Some(_) => UpdateStatus::Pending,
        })
    }

    fn update_code(&self, identifier: &str, image_uri: &str, publish: bool) -> Result<(), String> {
        block_on(
            self.lambda
                .update_function_code()
                .function_name(identifier)
                .image_uri(image_uri)
                .publish(publish)
                .send(),
        )
        .map(|_| ())
        .map_err(|error| {
            format!(
                "failed to update code of {identifier}: {}",
                aws_sdk_lambda::error::DisplayErrorContext(&error)
            )
        })
    }
}

impl ImageRegistry for AwsControlPlane {
    fn list_images(&self, repository: &RepositoryLocator) -> Result<Vec<ImageDetail>, String> {
        let ecr = self.ecr_for(repository);
        let images = block_on(
            ecr.describe_images()
                .registry_id(&repository.account_id)
                .repository_name(&repository.repository_name)
                .into_paginator()
                .items()
                .send()
                .try_collect(),
        )
        .map_err(|error| {
            format!(
                "failed to describe images of {}: {}",
                repository.repository_name,
                aws_sdk_ecr::error::DisplayErrorContext(&error)
            )
        })?;

        Ok(images
            .into_iter()
            .filter_map(|image| {
                let pushed = image.image_pushed_at()?;
                Some(ImageDetail {
                    tags: image.image_tags().to_vec(),
                    digest: image.image_digest().map(ToString::to_string),
                    pushed_at: DateTime::<Utc>::from_timestamp(pushed.secs(), pushed.subsec_nanos())?,
                })
            })
            .collect())
    }
}
