use chrono::{DateTime, Utc};
use deploy_core::naming::RepositoryLocator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDetail {
    pub tags: Vec<String>,
    pub digest: Option<String>,
    pub pushed_at: DateTime<Utc>,
}

pub trait ImageRegistry {
    fn list_images(&self, repository: &RepositoryLocator) -> Result<Vec<ImageDetail>, String>;
}
