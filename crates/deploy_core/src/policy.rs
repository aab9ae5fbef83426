//! Permission policy documents and the least-privilege gate applied to them.
//!
//! A requested policy is checked statically, before any control-plane call:
//!
//! * actions in the `iam` namespace may only be read/list operations
//!   (`iam:Get*`, `iam:List*`);
//! * actions that can read secrets or invoke other functions must name
//!   fully-qualified resources, never wildcards.
//!
//! Matching is case-insensitive and wildcard-aware in both directions, so an
//! action pattern such as `secretsmanager:*` or `*` counts as requesting the
//! sensitive action it covers.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::naming::FunctionLocator;

pub const POLICY_VERSION: &str = "2012-10-17";
pub const PRIVILEGED_NAMESPACE: &str = "iam";
pub const ALLOWED_PRIVILEGED_PATTERNS: [&str; 2] = ["iam:Get*", "iam:List*"];
pub const SENSITIVE_ACTIONS: [&str; 2] = ["secretsmanager:GetSecretValue", "lambda:InvokeFunction"];
const NOT_ACTION_KEY: &str = "NotAction";
const COMPUTE_SERVICE_PRINCIPAL: &str = "lambda.amazonaws.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            Self::One(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(values: Vec<T>) -> Self {
        Self::Many(values)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "Statement", default)]
    pub statement: OneOrMany<Statement>,
}

impl PolicyDocument {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self {
            version: Some(POLICY_VERSION.to_string()),
            statement: OneOrMany::Many(statements),
        }
    }

    pub fn statements(&self) -> &[Statement] {
        self.statement.as_slice()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// One policy statement. Keys this crate does not interpret (`NotAction`,
/// `NotResource`, ...) are kept in `extra` so the document reaches the
/// control plane unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "Sid", default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(rename = "Effect", default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<Effect>,
    #[serde(rename = "Principal", default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Value>,
    #[serde(rename = "Action", default, skip_serializing_if = "Option::is_none")]
    pub action: Option<OneOrMany<String>>,
    #[serde(rename = "Resource", default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<OneOrMany<String>>,
    #[serde(rename = "Condition", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Statement {
    pub fn allow(actions: Vec<String>, resources: Vec<String>) -> Self {
        Self {
            sid: None,
            effect: Some(Effect::Allow),
            principal: None,
            action: Some(OneOrMany::Many(actions)),
            resource: Some(OneOrMany::Many(resources)),
            condition: None,
            extra: Map::new(),
        }
    }

    pub fn actions(&self) -> &[String] {
        self.action.as_ref().map(OneOrMany::as_slice).unwrap_or(&[])
    }

    pub fn resources(&self) -> Option<&[String]> {
        self.resource.as_ref().map(OneOrMany::as_slice)
    }

    /// An allowing statement that names the actions it does *not* grant
    /// reaches every other action, `iam:*` and the sensitive ones included.
    /// A missing `Effect` counts as allowing.
    pub fn grants_by_exclusion(&self) -> bool {
        self.effect != Some(Effect::Deny) && self.extra.contains_key(NOT_ACTION_KEY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyViolation {
    pub statement_index: usize,
    pub action: String,
    pub reason: String,
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Statement {}: {}", self.statement_index, self.reason)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyValidation {
    violations: Vec<PolicyViolation>,
}

impl PolicyValidation {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[PolicyViolation] {
        &self.violations
    }

    pub fn errors(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }
}

pub fn validate_policy(policy: &PolicyDocument) -> PolicyValidation {
    let mut violations = Vec::new();

    for (statement_index, statement) in policy.statements().iter().enumerate() {
        if statement.grants_by_exclusion() {
            violations.push(PolicyViolation {
                statement_index,
                action: NOT_ACTION_KEY.to_string(),
                reason: format!(
                    "'{NOT_ACTION_KEY}' may only be used with a Deny effect; list the allowed actions explicitly."
                ),
            });
        }

        for action in statement.actions() {
            if reaches_privileged_namespace(action)
                && !ALLOWED_PRIVILEGED_PATTERNS
                    .iter()
                    .any(|pattern| glob_matches(pattern, action))
            {
                violations.push(PolicyViolation {
                    statement_index,
                    action: action.clone(),
                    reason: format!(
                        "IAM action '{action}' is not permitted (only {} allowed).",
                        ALLOWED_PRIVILEGED_PATTERNS.join("/")
                    ),
                });
            }

            for sensitive in SENSITIVE_ACTIONS
                .iter()
                .filter(|sensitive| glob_matches(action, sensitive))
            {
                let resources = statement.resources().unwrap_or(&[]);
                if resources.is_empty() {
                    violations.push(PolicyViolation {
                        statement_index,
                        action: action.clone(),
                        reason: format!(
                            "'{sensitive}' (via '{action}') must list fully-qualified resource ARNs."
                        ),
                    });
                    continue;
                }

                for resource in resources.iter().filter(|resource| has_wildcard(resource)) {
                    violations.push(PolicyViolation {
                        statement_index,
                        action: action.clone(),
                        reason: format!(
                            "'{sensitive}' (via '{action}') must use fully-qualified resource ARNs, not wildcards ('{resource}')."
                        ),
                    });
                }
            }
        }
    }

    PolicyValidation { violations }
}

fn reaches_privileged_namespace(action: &str) -> bool {
    let namespace = action
        .split_once(':')
        .map(|(namespace, _)| namespace)
        .unwrap_or(action);
    glob_matches(namespace, PRIVILEGED_NAMESPACE)
}

fn has_wildcard(resource: &str) -> bool {
    resource.contains(['*', '?'])
}

/// Case-insensitive shell-style match supporting `*` and `?`.
fn glob_matches(pattern: &str, candidate: &str) -> bool {
    let mut expression = String::with_capacity(pattern.len() + 8);
    expression.push_str("(?is)^");
    for ch in pattern.chars() {
        match ch {
            '*' => expression.push_str(".*"),
            '?' => expression.push('.'),
            other => expression.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expression.push('$');

    matches_failing_closed(Regex::new(&expression), candidate)
}

/// A pattern that fails to compile is treated as matching everything.
fn matches_failing_closed(compiled: Result<Regex, regex::Error>, candidate: &str) -> bool {
    compiled.map(|regex| regex.is_match(candidate)).unwrap_or(true)
}

/// Inline policy letting the function write to its own log group.
pub fn logs_policy(function: &FunctionLocator) -> PolicyDocument {
    PolicyDocument::new(vec![
        Statement {
            action: Some(OneOrMany::One("logs:CreateLogGroup".to_string())),
            resource: Some(OneOrMany::One(function.log_namespace_arn())),
            ..Statement::allow(Vec::new(), Vec::new())
        },
        Statement::allow(
            vec![
                "logs:CreateLogStream".to_string(),
                "logs:PutLogEvents".to_string(),
            ],
            vec![function.log_group_arn()],
        ),
    ])
}

/// Trust document letting the compute platform assume the role on behalf of
/// exactly one function.
pub fn trust_policy(function_arn: &str) -> PolicyDocument {
    PolicyDocument::new(vec![Statement {
        principal: Some(serde_json::json!({ "Service": COMPUTE_SERVICE_PRINCIPAL })),
        action: Some(OneOrMany::One("sts:AssumeRole".to_string())),
        resource: None,
        condition: Some(serde_json::json!({
            "ArnLike": { "AWS:SourceArn": function_arn }
        })),
        ..Statement::allow(Vec::new(), Vec::new())
    }])
}
