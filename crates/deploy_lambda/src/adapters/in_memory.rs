//! In-process control plane used by the reconciler tests.
//!
//! State lives behind a mutex so the gateway traits can take `&self`, and every
//! call is appended to a journal that tests assert against.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use deploy_core::naming::{AccountRegion, RepositoryLocator};

use crate::adapters::functions::{
    FunctionConfiguration, FunctionRecord, FunctionService, UpdateStatus,
};
use crate::adapters::identity::IdentityService;
use crate::adapters::images::{ImageDetail, ImageRegistry};
use crate::adapters::roles::{RoleRecord, RoleService};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPlaneCall {
    CurrentAccount,
    ListRoles,
    CreateRole { path: String, role_name: String },
    UpdateTrustPolicy { role_name: String },
    ListInlinePolicies { role_name: String },
    DeleteInlinePolicy { role_name: String, policy_name: String },
    PutInlinePolicy { role_name: String, policy_name: String },
    ListFunctions,
    CreateFunction { function_name: String },
    UpdateConfiguration { identifier: String },
    GetUpdateStatus { identifier: String },
    UpdateCode { identifier: String, image_uri: String },
    ListImages { repository_name: String },
}

impl ControlPlaneCall {
    /// Whether the call changes remote state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::CreateRole { .. }
                | Self::UpdateTrustPolicy { .. }
                | Self::DeleteInlinePolicy { .. }
                | Self::PutInlinePolicy { .. }
                | Self::CreateFunction { .. }
                | Self::UpdateConfiguration { .. }
                | Self::UpdateCode { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleState {
    pub arn: String,
    pub role_name: String,
    pub path: String,
    pub trust_policy: String,
    pub inline_policies: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionState {
    pub arn: String,
    pub function_name: String,
    pub configuration: FunctionConfiguration,
    pub image_uri: String,
    pub published_versions: u32,
    pending_polls: u32,
}

#[derive(Debug, Default)]
struct State {
    roles: Vec<RoleState>,
    functions: Vec<FunctionState>,
    images: HashMap<String, Vec<ImageDetail>>,
    calls: Vec<ControlPlaneCall>,
    failures: HashMap<&'static str, String>,
    update_failure: Option<String>,
    pending_polls_per_update: u32,
}

#[derive(Debug)]
pub struct InMemoryControlPlane {
    account: AccountRegion,
    state: Mutex<State>,
}

impl InMemoryControlPlane {
    pub fn new(account: AccountRegion) -> Self {
        Self {
            account,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_role(self, arn: &str, inline_policies: &[&str]) -> Self {
        let (path, role_name) = split_role_arn(arn);
        self.state().roles.push(RoleState {
            arn: arn.to_string(),
            role_name,
            path,
            trust_policy: "{}".to_string(),
            inline_policies: inline_policies
                .iter()
                .map(|name| (name.to_string(), "{}".to_string()))
                .collect(),
        });
        self
    }

    pub fn with_function(self, arn: &str, configuration: FunctionConfiguration) -> Self {
        self.state().functions.push(FunctionState {
            arn: arn.to_string(),
            function_name: function_name_of(arn).to_string(),
            configuration,
            image_uri: String::new(),
            published_versions: 1,
            pending_polls: 0,
        });
        self
    }

    pub fn with_image(self, repository_name: &str, tags: &[&str], pushed_at: DateTime<Utc>) -> Self {
        self.state()
            .images
            .entry(repository_name.to_string())
            .or_default()
            .push(ImageDetail {
                tags: tags.iter().map(ToString::to_string).collect(),
                digest: Some(format!("sha256:{}", pushed_at.timestamp())),
                pushed_at,
            });
        self
    }

    /// Each configuration or code update stays `Pending` for this many status
    /// polls; further updates are rejected until then.
    pub fn with_pending_polls(self, polls: u32) -> Self {
        self.state().pending_polls_per_update = polls;
        self
    }

    /// Configuration updates settle as `Failed` with this reason.
    pub fn with_update_failure(self, reason: &str) -> Self {
        self.state().update_failure = Some(reason.to_string());
        self
    }

    /// Makes the named trait operation (e.g. `"put_inline_policy"`) fail.
    pub fn with_failure(self, operation: &'static str, reason: &str) -> Self {
        self.state().failures.insert(operation, reason.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ControlPlaneCall> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&ControlPlaneCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn role(&self, arn: &str) -> Option<RoleState> {
        self.state()
            .roles
            .iter()
            .find(|role| role.arn.eq_ignore_ascii_case(arn))
            .cloned()
    }

    pub fn function(&self, arn: &str) -> Option<FunctionState> {
        self.state()
            .functions
            .iter()
            .find(|function| function.arn.eq_ignore_ascii_case(arn))
            .cloned()
    }

    fn record(
        &self,
        operation: &'static str,
        call: ControlPlaneCall,
    ) -> Result<MutexGuard<'_, State>, String> {
        let mut state = self.state();
        state.calls.push(call);
        if let Some(reason) = state.failures.get(operation).cloned() {
            return Err(reason);
        }
        Ok(state)
    }
}

fn split_role_arn(arn: &str) -> (String, String) {
    let resource = arn.split_once(":role").map(|(_, rest)| rest).unwrap_or("/");
    match resource.rsplit_once('/') {
        Some((directory, name)) => (format!("{directory}/"), name.to_string()),
        None => ("/".to_string(), resource.to_string()),
    }
}

fn function_name_of(identifier: &str) -> &str {
    identifier
        .split_once(":function:")
        .map(|(_, name)| name)
        .unwrap_or(identifier)
}

fn find_function<'a>(state: &'a mut State, identifier: &str) -> Result<&'a mut FunctionState, String> {
    state
        .functions
        .iter_mut()
        .find(|function| function.arn == identifier || function.function_name == identifier)
        .ok_or_else(|| format!("ResourceNotFoundException: Function not found: {identifier}"))
}

fn reject_while_pending(function: &FunctionState) -> Result<(), String> {
    if function.pending_polls > 0 {
        return Err(format!(
            "ResourceConflictException: An update is in progress for resource: {}",
            function.arn
        ));
    }
    Ok(())
}

fn find_role<'a>(state: &'a mut State, role_name: &str) -> Result<&'a mut RoleState, String> {
    state
        .roles
        .iter_mut()
        .find(|role| role.role_name == role_name)
        .ok_or_else(|| format!("NoSuchEntity: The role with name {role_name} cannot be found."))
}

impl IdentityService for InMemoryControlPlane {
    fn current_account_and_region(&self) -> Result<AccountRegion, String> {
        self.record("current_account_and_region", ControlPlaneCall::CurrentAccount)?;
        Ok(self.account.clone())
    }
}

impl RoleService for InMemoryControlPlane {
    fn list_roles(&self) -> Result<Vec<RoleRecord>, String> {
        let state = self.record("list_roles", ControlPlaneCall::ListRoles)?;
        Ok(state
            .roles
            .iter()
            .map(|role| RoleRecord {
                arn: role.arn.clone(),
                role_name: role.role_name.clone(),
                path: role.path.clone(),
            })
            .collect())
    }

    fn create_role(&self, path: &str, role_name: &str, trust_policy: &str) -> Result<(), String> {
        let mut state = self.record(
            "create_role",
            ControlPlaneCall::CreateRole {
                path: path.to_string(),
                role_name: role_name.to_string(),
            },
        )?;
        if state.roles.iter().any(|role| role.role_name == role_name) {
            return Err(format!("EntityAlreadyExists: Role with name {role_name} already exists."));
        }
        let arn = format!(
            "arn:aws:iam::{}:role{path}{role_name}",
            self.account.account_id
        );
        state.roles.push(RoleState {
            arn,
            role_name: role_name.to_string(),
            path: path.to_string(),
            trust_policy: trust_policy.to_string(),
            inline_policies: BTreeMap::new(),
        });
        Ok(())
    }

    fn update_trust_policy(&self, role_name: &str, trust_policy: &str) -> Result<(), String> {
        let mut state = self.record(
            "update_trust_policy",
            ControlPlaneCall::UpdateTrustPolicy {
                role_name: role_name.to_string(),
            },
        )?;
        find_role(&mut state, role_name)?.trust_policy = trust_policy.to_string();
        Ok(())
    }

    fn list_inline_policies(&self, role_name: &str) -> Result<Vec<String>, String> {
        let mut state = self.record(
            "list_inline_policies",
            ControlPlaneCall::ListInlinePolicies {
                role_name: role_name.to_string(),
            },
        )?;
        Ok(find_role(&mut state, role_name)?
            .inline_policies
            .keys()
            .cloned()
            .collect())
    }

    fn delete_inline_policy(&self, role_name: &str, policy_name: &str) -> Result<(), String> {
        let mut state = self.record(
            "delete_inline_policy",
            ControlPlaneCall::DeleteInlinePolicy {
                role_name: role_name.to_string(),
                policy_name: policy_name.to_string(),
            },
        )?;
        find_role(&mut state, role_name)?
            .inline_policies
            .remove(policy_name)
            .map(|_| ())
            .ok_or_else(|| format!("NoSuchEntity: policy {policy_name} is not attached"))
    }

    fn put_inline_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<(), String> {
        let mut state = self.record(
            "put_inline_policy",
            ControlPlaneCall::PutInlinePolicy {
                role_name: role_name.to_string(),
                policy_name: policy_name.to_string(),
            },
        )?;
        find_role(&mut state, role_name)?
            .inline_policies
            .insert(policy_name.to_string(), document.to_string());
        Ok(())
    }
}

impl FunctionService for InMemoryControlPlane {
    fn list_functions(&self) -> Result<Vec<FunctionRecord>, String> {
        let state = self.record("list_functions", ControlPlaneCall::ListFunctions)?;
        Ok(state
            .functions
            .iter()
            .map(|function| FunctionRecord {
                arn: function.arn.clone(),
                function_name: function.function_name.clone(),
            })
            .collect())
    }

    fn create_function(
        &self,
        function_name: &str,
        configuration: &FunctionConfiguration,
        image_uri: &str,
    ) -> Result<String, String> {
        let mut state = self.record(
            "create_function",
            ControlPlaneCall::CreateFunction {
                function_name: function_name.to_string(),
            },
        )?;
        let name = function_name_of(function_name).to_string();
        if state.functions.iter().any(|function| function.function_name == name) {
            return Err(format!("ResourceConflictException: Function already exist: {name}"));
        }
        if !state
            .roles
            .iter()
            .any(|role| role.arn == configuration.role_arn)
        {
            return Err(format!(
                "InvalidParameterValueException: The role defined for the function cannot be assumed: {}",
                configuration.role_arn
            ));
        }
        let arn = format!(
            "arn:aws:lambda:{}:{}:function:{name}",
            self.account.region, self.account.account_id
        );
        state.functions.push(FunctionState {
            arn: arn.clone(),
            function_name: name,
            configuration: configuration.clone(),
            image_uri: image_uri.to_string(),
            published_versions: 1,
            pending_polls: 0,
        });
        Ok(arn)
    }

    fn update_configuration(
        &self,
        identifier: &str,
        configuration: &FunctionConfiguration,
    ) -> Result<(), String> {
        let mut state = self.record(
            "update_configuration",
            ControlPlaneCall::UpdateConfiguration {
                identifier: identifier.to_string(),
            },
        )?;
        let pending_polls = state.pending_polls_per_update;
        let function = find_function(&mut state, identifier)?;
        reject_while_pending(function)?;
        function.configuration = configuration.clone();
        function.pending_polls = pending_polls;
        Ok(())
    }

    fn get_update_status(&self, identifier: &str) -> Result<UpdateStatus, String> {
        let mut state = self.record(
            "get_update_status",
            ControlPlaneCall::GetUpdateStatus {
                identifier: identifier.to_string(),
            },
        )?;
        let update_failure = state.update_failure.clone();
        let function = find_function(&mut state, identifier)?;
        if function.pending_polls > 0 {
            function.pending_polls -= 1;
            return Ok(UpdateStatus::Pending);
        }
        Ok(match update_failure {
            Some(reason) => UpdateStatus::Failed(reason),
            None => UpdateStatus::Successful,
        })
    }

    fn update_code(&self, identifier: &str, image_uri: &str, publish: bool) -> Result<(), String> {
        let mut state = self.record(
            "update_code",
            ControlPlaneCall::UpdateCode {
                identifier: identifier.to_string(),
                image_uri: image_uri.to_string(),
            },
        )?;
        let pending_polls = state.pending_polls_per_update;
        let function = find_function(&mut state, identifier)?;
        reject_while_pending(function)?;
        function.image_uri = image_uri.to_string();
        function.pending_polls = pending_polls;
        if publish {
            function.published_versions += 1;
        }
        Ok(())
    }
}

impl ImageRegistry for InMemoryControlPlane {
    fn list_images(&self, repository: &RepositoryLocator) -> Result<Vec<ImageDetail>, String> {
        let state = self.record(
            "list_images",
            ControlPlaneCall::ListImages {
                repository_name: repository.repository_name.clone(),
            },
        )?;
        state
            .images
            .get(&repository.repository_name)
            .cloned()
            .ok_or_else(|| {
                format!(
                    "RepositoryNotFoundException: repository {} does not exist",
                    repository.repository_name
                )
            })
    }
}
