#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRecord {
    pub arn: String,
    pub function_name: String,
}

/// Settings applied on both create and configuration update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionConfiguration {
    pub role_arn: String,
    pub description: String,
    pub memory_mb: u32,
    pub timeout_seconds: u32,
    pub ephemeral_storage_mb: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    Pending,
    Successful,
    Failed(String),
}

impl UpdateStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

pub trait FunctionService {
    /// All functions in the region, every page included.
    fn list_functions(&self) -> Result<Vec<FunctionRecord>, String>;
    /// Creates an image-packaged function and publishes its first version.
    /// Returns the function ARN reported by the control plane.
    fn create_function(
        &self,
        function_name: &str,
        configuration: &FunctionConfiguration,
        image_uri: &str,
    ) -> Result<String, String>;
    fn update_configuration(
        &self,
        identifier: &str,
        configuration: &FunctionConfiguration,
    ) -> Result<(), String>;
    fn get_update_status(&self, identifier: &str) -> Result<UpdateStatus, String>;
    fn update_code(&self, identifier: &str, image_uri: &str, publish: bool) -> Result<(), String>;
}
