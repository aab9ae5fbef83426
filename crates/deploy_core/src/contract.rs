use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ValidationError;
use crate::naming::{
    function_arn, parse_function_arn, parse_repository_arn, parse_role_arn, repository_arn,
    role_arn, sanitize_name, AccountRegion,
};
use crate::policy::{logs_policy, trust_policy, validate_policy, PolicyDocument};

pub const DEFAULT_DESCRIPTION: &str = "";
pub const DEFAULT_TIMEOUT_SECONDS: u32 = 30;
pub const DEFAULT_MEMORY_MB: u32 = 128;
pub const DEFAULT_EPHEMERAL_STORAGE_MB: u32 = 512;

pub const TIMEOUT_SECONDS_RANGE: (u32, u32) = (1, 900);
pub const MEMORY_MB_RANGE: (u32, u32) = (128, 10_240);
pub const EPHEMERAL_STORAGE_MB_RANGE: (u32, u32) = (512, 10_240);

pub const LOGGING_POLICY_NAME: &str = "logging_policy";
pub const PERMISSIONS_POLICY_NAME: &str = "permissions_policy";

/// Manifest as supplied by the caller. Every field is optional here; the
/// normalizer decides what is required and what gets a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawManifest {
    #[serde(default, alias = "lambda_name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, alias = "repository_arn", skip_serializing_if = "Option::is_none")]
    pub repository_ref: Option<String>,
    #[serde(default, alias = "lambda_arn", skip_serializing_if = "Option::is_none")]
    pub function_ref: Option<String>,
    #[serde(default, alias = "role_arn", skip_serializing_if = "Option::is_none")]
    pub role_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "timeout", skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
    #[serde(default, alias = "memory", skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u32>,
    #[serde(
        default,
        alias = "ephemeral_storage",
        skip_serializing_if = "Option::is_none"
    )]
    pub ephemeral_storage_mb: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSettings {
    pub description: String,
    pub timeout_seconds: u32,
    pub memory_mb: u32,
    pub ephemeral_storage_mb: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedPolicies {
    pub logs_policy: PolicyDocument,
    pub trust_policy: PolicyDocument,
}

/// Canonical desired state handed to the reconcilers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub repository_ref: String,
    pub function_ref: String,
    pub role_ref: String,
    pub settings: FunctionSettings,
    pub policy: Option<PolicyDocument>,
    pub derived: DerivedPolicies,
}

impl Manifest {
    /// Caller-facing form of this manifest; normalizing it again yields an
    /// equal record.
    pub fn to_raw(&self) -> RawManifest {
        RawManifest {
            name: Some(self.name.clone()),
            repository_ref: Some(self.repository_ref.clone()),
            function_ref: Some(self.function_ref.clone()),
            role_ref: Some(self.role_ref.clone()),
            description: Some(self.settings.description.clone()),
            timeout_seconds: Some(self.settings.timeout_seconds),
            memory_mb: Some(self.settings.memory_mb),
            ephemeral_storage_mb: Some(self.settings.ephemeral_storage_mb),
            policy: self.policy.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizeContext {
    /// Used when the manifest carries no `name`, e.g. the working directory
    /// name of a local run.
    pub fallback_name: Option<String>,
    pub account: AccountRegion,
}

/// Account and region implied by an explicit `repository_ref`, if any.
pub fn account_from_manifest(
    raw: &RawManifest,
) -> Result<Option<AccountRegion>, ValidationError> {
    raw.repository_ref
        .as_deref()
        .map(|value| parse_repository_arn(value).map(|locator| locator.account()))
        .transpose()
}

pub fn normalize_manifest(
    raw: RawManifest,
    context: &NormalizeContext,
) -> Result<Manifest, ValidationError> {
    let name = resolve_name(raw.name.as_deref(), context.fallback_name.as_deref())?;

    let repository_ref = raw
        .repository_ref
        .unwrap_or_else(|| repository_arn(&context.account, &name));
    let function_ref = raw
        .function_ref
        .unwrap_or_else(|| function_arn(&context.account, &name));
    let role_ref = raw
        .role_ref
        .unwrap_or_else(|| role_arn(&context.account, &name));

    parse_repository_arn(&repository_ref)?;
    parse_role_arn(&role_ref)?;
    let function = parse_function_arn(&function_ref)?;

    let settings = FunctionSettings {
        description: merge_default(raw.description, DEFAULT_DESCRIPTION.to_string()),
        timeout_seconds: checked_range(
            "timeout_seconds",
            merge_default(raw.timeout_seconds, DEFAULT_TIMEOUT_SECONDS),
            TIMEOUT_SECONDS_RANGE,
        )?,
        memory_mb: checked_range(
            "memory_mb",
            merge_default(raw.memory_mb, DEFAULT_MEMORY_MB),
            MEMORY_MB_RANGE,
        )?,
        ephemeral_storage_mb: checked_range(
            "ephemeral_storage_mb",
            merge_default(raw.ephemeral_storage_mb, DEFAULT_EPHEMERAL_STORAGE_MB),
            EPHEMERAL_STORAGE_MB_RANGE,
        )?,
    };

    if let Some(policy) = &raw.policy {
        let validation = validate_policy(policy);
        if !validation.is_ok() {
            return Err(ValidationError::PolicyDenied(validation.errors()));
        }
    }

    let derived = DerivedPolicies {
        logs_policy: logs_policy(&function),
        trust_policy: trust_policy(&function_ref),
    };

    Ok(Manifest {
        name,
        repository_ref,
        function_ref,
        role_ref,
        settings,
        policy: raw.policy,
        derived,
    })
}

fn resolve_name(name: Option<&str>, fallback: Option<&str>) -> Result<String, ValidationError> {
    let candidate = name
        .filter(|value| !value.trim().is_empty())
        .or(fallback)
        .ok_or_else(|| ValidationError::new("name is required"))?;

    let sanitized = sanitize_name(candidate);
    if sanitized.is_empty() {
        return Err(ValidationError::new(format!(
            "name '{candidate}' has no identifier-safe characters"
        )));
    }
    Ok(sanitized)
}

/// Returns `default` only when `current` is absent; present values win even
/// when they are zero or empty.
pub fn merge_default<T>(current: Option<T>, default: T) -> T {
    current.unwrap_or(default)
}

fn checked_range(field: &str, value: u32, (min, max): (u32, u32)) -> Result<u32, ValidationError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::new(format!(
            "{field} must be between {min} and {max}, got {value}"
        )))
    }
}

pub fn manifest_fingerprint(manifest: &Manifest) -> Result<String, ValidationError> {
    let encoded = stable_contract_json(manifest)?;
    let mut hasher = Sha256::new();
    hasher.update(encoded);
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn stable_contract_json(value: impl Serialize) -> Result<String, ValidationError> {
    serde_json::to_string(&value)
        .map_err(|error| ValidationError::new(format!("manifest is not serializable: {error}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn context() -> NormalizeContext {
        NormalizeContext {
            fallback_name: None,
            account: AccountRegion::new("123456789012", "eu-west-1"),
        }
    }

    fn raw(value: serde_json::Value) -> RawManifest {
        serde_json::from_value(value).expect("manifest should deserialize")
    }

    #[test]
    fn fills_defaults_and_derives_identifiers() {
        let manifest = normalize_manifest(raw(json!({"name": "Orders API"})), &context())
            .expect("manifest should normalize");

        assert_eq!(manifest.name, "Orders_API");
        assert_eq!(
            manifest.function_ref,
            "arn:aws:lambda:eu-west-1:123456789012:function:orders_api"
        );
        assert_eq!(
            manifest.role_ref,
            "arn:aws:iam::123456789012:role/lambda/orders_api"
        );
        assert_eq!(
            manifest.repository_ref,
            "arn:aws:ecr:eu-west-1:123456789012:repository/orders_api"
        );
        assert_eq!(
            manifest.settings,
            FunctionSettings {
                description: String::new(),
                timeout_seconds: 30,
                memory_mb: 128,
                ephemeral_storage_mb: 512,
            }
        );
        assert!(manifest.policy.is_none());
    }

    #[test]
    fn keeps_explicit_values_and_identifiers() {
        let manifest = normalize_manifest(
            raw(json!({
                "name": "worker",
                "repository_ref": "arn:aws:ecr:us-east-1:111122223333:repository/Team/Worker",
                "function_ref": "arn:aws:lambda:us-east-1:111122223333:function:Worker",
                "role_ref": "arn:aws:iam::111122223333:role/custom/WorkerRole",
                "description": "nightly export",
                "timeout_seconds": 300,
                "memory_mb": 1024,
                "ephemeral_storage_mb": 2048
            })),
            &context(),
        )
        .expect("manifest should normalize");

        assert_eq!(
            manifest.repository_ref,
            "arn:aws:ecr:us-east-1:111122223333:repository/Team/Worker"
        );
        assert_eq!(
            manifest.function_ref,
            "arn:aws:lambda:us-east-1:111122223333:function:Worker"
        );
        assert_eq!(
            manifest.role_ref,
            "arn:aws:iam::111122223333:role/custom/WorkerRole"
        );
        assert_eq!(manifest.settings.description, "nightly export");
        assert_eq!(manifest.settings.timeout_seconds, 300);
        assert_eq!(manifest.settings.memory_mb, 1024);
        assert_eq!(manifest.settings.ephemeral_storage_mb, 2048);
    }

    #[test]
    fn accepts_legacy_field_names() {
        let manifest = normalize_manifest(
            raw(json!({
                "lambda_name": "legacy",
                "repository_arn": "arn:aws:ecr:us-east-1:111122223333:repository/legacy",
                "timeout": 60,
                "memory": 256,
                "ephemeral_storage": 1024
            })),
            &context(),
        )
        .expect("manifest should normalize");

        assert_eq!(manifest.name, "legacy");
        assert_eq!(manifest.settings.timeout_seconds, 60);
        assert_eq!(manifest.settings.memory_mb, 256);
        assert_eq!(manifest.settings.ephemeral_storage_mb, 1024);
    }

    #[test]
    fn explicit_zero_is_rejected_instead_of_defaulted() {
        let error = normalize_manifest(raw(json!({"name": "w", "timeout_seconds": 0})), &context())
            .expect_err("zero timeout should fail");

        assert_eq!(
            error,
            ValidationError::new("timeout_seconds must be between 1 and 900, got 0")
        );
    }

    #[test]
    fn name_falls_back_to_context() {
        let context = NormalizeContext {
            fallback_name: Some("my-project dir".to_string()),
            ..context()
        };

        let manifest =
            normalize_manifest(RawManifest::default(), &context).expect("manifest should normalize");
        assert_eq!(manifest.name, "my-project_dir");
    }

    #[test]
    fn missing_name_without_fallback_is_rejected() {
        let error = normalize_manifest(raw(json!({"name": "  "})), &context())
            .expect_err("blank name should fail");
        assert_eq!(error, ValidationError::new("name is required"));

        let error = normalize_manifest(raw(json!({"name": "!!!"})), &context())
            .expect_err("unsanitizable name should fail");
        assert!(matches!(error, ValidationError::Manifest(_)));
    }

    #[test]
    fn malformed_explicit_identifiers_are_rejected() {
        let error = normalize_manifest(
            raw(json!({"name": "w", "role_ref": "arn:aws:iam::111:user/w"})),
            &context(),
        )
        .expect_err("user arn should fail");

        assert!(error.to_string().contains("role_ref"));
    }

    #[test]
    fn policy_violations_are_reported_in_full() {
        let error = normalize_manifest(
            raw(json!({
                "name": "w",
                "policy": {
                    "Statement": [
                        {"Action": "iam:CreateUser", "Resource": "*"},
                        {"Action": "secretsmanager:GetSecretValue", "Resource": "*"}
                    ]
                }
            })),
            &context(),
        )
        .expect_err("policy should be denied");

        let violations = error.violations();
        assert_eq!(violations.len(), 2);
        assert!(violations[0].starts_with("Statement 0:"));
        assert!(violations[1].starts_with("Statement 1:"));
    }

    #[test]
    fn derives_log_and_trust_policies_from_function_ref() {
        let manifest = normalize_manifest(raw(json!({"name": "orders"})), &context())
            .expect("manifest should normalize");

        let logs = serde_json::to_value(&manifest.derived.logs_policy).expect("serialize");
        assert_eq!(
            logs["Statement"][1]["Resource"][0],
            "arn:aws:logs:eu-west-1:123456789012:log-group:/aws/lambda/orders:*"
        );
        let trust = serde_json::to_value(&manifest.derived.trust_policy).expect("serialize");
        assert_eq!(
            trust["Statement"][0]["Condition"]["ArnLike"]["AWS:SourceArn"],
            manifest.function_ref.as_str()
        );
    }

    #[test]
    fn renormalizing_is_stable() {
        let first = normalize_manifest(
            raw(json!({
                "name": "orders",
                "policy": {"Statement": {"Action": "s3:GetObject", "Resource": "*"}}
            })),
            &context(),
        )
        .expect("manifest should normalize");

        let second =
            normalize_manifest(first.to_raw(), &context()).expect("manifest should renormalize");

        assert_eq!(first, second);
        assert_eq!(
            manifest_fingerprint(&first).expect("fingerprint"),
            manifest_fingerprint(&second).expect("fingerprint")
        );
    }

    #[test]
    fn account_comes_from_repository_ref() {
        let manifest = raw(json!({
            "repository_ref": "arn:aws:ecr:ap-south-1:444455556666:repository/svc"
        }));

        assert_eq!(
            account_from_manifest(&manifest).expect("repository arn should parse"),
            Some(AccountRegion::new("444455556666", "ap-south-1"))
        );
        assert_eq!(
            account_from_manifest(&RawManifest::default()).expect("absent ref is fine"),
            None
        );
    }
}
