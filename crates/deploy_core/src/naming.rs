use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const MAX_NAME_LEN: usize = 57;
pub const ROLE_PATH: &str = "/lambda/";
const PARTITION: &str = "aws";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRegion {
    pub account_id: String,
    pub region: String,
}

impl AccountRegion {
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
        }
    }
}

/// Reduces an arbitrary string to an identifier-safe function name.
///
/// Runs of characters outside `[A-Za-z0-9_-]` collapse to a single `_`,
/// leading and trailing separators are stripped, and the result is capped at
/// [`MAX_NAME_LEN`] characters. Applying it twice yields the same value.
pub fn sanitize_name(raw: &str) -> String {
    let mut replaced = String::with_capacity(raw.len());
    let mut in_invalid_run = false;
    for ch in raw.chars() {
        if is_name_char(ch) {
            replaced.push(ch);
            in_invalid_run = false;
        } else if !in_invalid_run {
            replaced.push('_');
            in_invalid_run = true;
        }
    }

    let truncated: String = trim_separators(&replaced)
        .chars()
        .take(MAX_NAME_LEN)
        .collect();
    trim_separators(&truncated).to_string()
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

fn trim_separators(value: &str) -> &str {
    value.trim_matches(|ch| ch == '_' || ch == '-')
}

pub fn function_arn(account: &AccountRegion, name: &str) -> String {
    format!(
        "arn:{PARTITION}:lambda:{}:{}:function:{name}",
        account.region, account.account_id
    )
    .to_lowercase()
}

pub fn role_arn(account: &AccountRegion, name: &str) -> String {
    format!(
        "arn:{PARTITION}:iam::{}:role{ROLE_PATH}{name}",
        account.account_id
    )
    .to_lowercase()
}

pub fn repository_arn(account: &AccountRegion, name: &str) -> String {
    format!(
        "arn:{PARTITION}:ecr:{}:{}:repository/{name}",
        account.region, account.account_id
    )
    .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ArnParts<'a> {
    partition: &'a str,
    service: &'a str,
    region: &'a str,
    account_id: &'a str,
    resource: &'a str,
}

fn split_arn(value: &str) -> Option<ArnParts<'_>> {
    let mut parts = value.splitn(6, ':');
    if parts.next()? != "arn" {
        return None;
    }
    Some(ArnParts {
        partition: parts.next()?,
        service: parts.next()?,
        region: parts.next()?,
        account_id: parts.next()?,
        resource: parts.next()?,
    })
}

/// Image registry repository, parsed from
/// `arn:aws:ecr:<region>:<account>:repository/<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLocator {
    pub region: String,
    pub account_id: String,
    pub repository_name: String,
}

impl RepositoryLocator {
    pub fn image_uri(&self, tag: &str) -> String {
        format!("{}:{tag}", self.registry_path())
    }

    pub fn image_digest_uri(&self, digest: &str) -> String {
        format!("{}@{digest}", self.registry_path())
    }

    fn registry_path(&self) -> String {
        format!(
            "{}.dkr.ecr.{}.amazonaws.com/{}",
            self.account_id, self.region, self.repository_name
        )
    }

    pub fn account(&self) -> AccountRegion {
        AccountRegion::new(self.account_id.clone(), self.region.clone())
    }
}

pub fn parse_repository_arn(value: &str) -> Result<RepositoryLocator, ValidationError> {
    let invalid = || {
        ValidationError::new(format!(
            "repository_ref '{value}' is not an image repository ARN"
        ))
    };
    let parts = split_arn(value).ok_or_else(invalid)?;
    let repository_name = parts
        .resource
        .strip_prefix("repository/")
        .filter(|name| !name.is_empty())
        .ok_or_else(invalid)?;
    if parts.service != "ecr" || parts.region.is_empty() || parts.account_id.is_empty() {
        return Err(invalid());
    }

    Ok(RepositoryLocator {
        region: parts.region.to_string(),
        account_id: parts.account_id.to_string(),
        repository_name: repository_name.to_string(),
    })
}

/// Path and name of an IAM role, split from `arn:aws:iam::<account>:role<path><name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleLocator {
    pub path: String,
    pub name: String,
}

pub fn parse_role_arn(value: &str) -> Result<RoleLocator, ValidationError> {
    let invalid = || ValidationError::new(format!("role_ref '{value}' is not an IAM role ARN"));
    let parts = split_arn(value).ok_or_else(invalid)?;
    if parts.service != "iam" || parts.account_id.is_empty() {
        return Err(invalid());
    }
    let path_and_name = parts.resource.strip_prefix("role/").ok_or_else(invalid)?;
    let (directory, name) = match path_and_name.rsplit_once('/') {
        Some((directory, name)) => (directory, name),
        None => ("", path_and_name),
    };
    if name.is_empty() {
        return Err(invalid());
    }

    let path = if directory.is_empty() {
        "/".to_string()
    } else {
        format!("/{directory}/")
    };
    Ok(RoleLocator {
        path,
        name: name.to_string(),
    })
}

/// Function identity, split from `arn:<partition>:lambda:<region>:<account>:function:<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionLocator {
    pub partition: String,
    pub region: String,
    pub account_id: String,
    pub function_name: String,
}

impl FunctionLocator {
    /// Account-wide log namespace used for `logs:CreateLogGroup`.
    pub fn log_namespace_arn(&self) -> String {
        format!(
            "arn:{}:logs:{}:{}:*",
            self.partition, self.region, self.account_id
        )
    }

    /// Streams of the function's own log group.
    pub fn log_group_arn(&self) -> String {
        format!(
            "arn:{}:logs:{}:{}:log-group:/aws/lambda/{}:*",
            self.partition, self.region, self.account_id, self.function_name
        )
    }
}

pub fn parse_function_arn(value: &str) -> Result<FunctionLocator, ValidationError> {
    let invalid = || {
        ValidationError::new(format!(
            "function_ref '{value}' is not a Lambda function ARN"
        ))
    };
    let parts = split_arn(value).ok_or_else(invalid)?;
    let qualified = parts.resource.strip_prefix("function:").ok_or_else(invalid)?;
    let function_name = qualified.split(':').next().unwrap_or_default();
    if parts.service != "lambda"
        || parts.region.is_empty()
        || parts.account_id.is_empty()
        || function_name.is_empty()
    {
        return Err(invalid());
    }

    Ok(FunctionLocator {
        partition: parts.partition.to_string(),
        region: parts.region.to_string(),
        account_id: parts.account_id.to_string(),
        function_name: function_name.to_string(),
    })
}
