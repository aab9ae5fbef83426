#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRecord {
    pub arn: String,
    pub role_name: String,
    pub path: String,
}

/// Role and inline-policy operations. Documents are passed as JSON text.
pub trait RoleService {
    /// All roles in the account, every page included.
    fn list_roles(&self) -> Result<Vec<RoleRecord>, String>;
    fn create_role(&self, path: &str, role_name: &str, trust_policy: &str) -> Result<(), String>;
    fn update_trust_policy(&self, role_name: &str, trust_policy: &str) -> Result<(), String>;
    fn list_inline_policies(&self, role_name: &str) -> Result<Vec<String>, String>;
    fn delete_inline_policy(&self, role_name: &str, policy_name: &str) -> Result<(), String>;
    fn put_inline_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<(), String>;
}
