use crate::domain::result::DomainResult;
use async_trait::async_trait;

/// Catalog entry for a capability (permission codename such as `view_asset`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Capability {
    pub codename: String,
    pub name: String,
}

/// Input for registering a capability in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterCapabilityRepoInput {
    pub codename: String,
    pub name: String,
}

/// Repository trait for the capability catalog
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CapabilityRepository: Send + Sync {
    /// Register a capability; registering an existing codename is a no-op
    async fn register_capability(&self, input: RegisterCapabilityRepoInput)
        -> DomainResult<Capability>;

    /// Get a capability by codename
    async fn get_capability(&self, codename: &str) -> DomainResult<Option<Capability>>;

    /// List the whole catalog ordered by codename
    async fn list_capabilities(&self) -> DomainResult<Vec<Capability>>;
}
