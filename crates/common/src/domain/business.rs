use crate::domain::resource::{Resource, ResourceKind, ResourceNode};
use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Business domain entity, the tenant every permission is scoped to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Business {
    pub id: String,
    pub name: String,
    pub tin: String,
    pub utr: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for creating a business with a generated ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateBusinessRepoInput {
    pub id: String,
    pub name: String,
    pub tin: String,
    pub utr: String,
}

/// Input for getting a business by ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBusinessRepoInput {
    pub business_id: String,
}

/// Repository trait for business storage operations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BusinessRepository: Send + Sync {
    /// Create a business (name, tin and utr are unique)
    async fn create_business(&self, input: CreateBusinessRepoInput) -> DomainResult<Business>;

    /// Get a business by ID
    async fn get_business(&self, input: GetBusinessRepoInput) -> DomainResult<Option<Business>>;

    /// List all businesses ordered by name
    async fn list_businesses(&self) -> DomainResult<Vec<Business>>;
}

impl Resource for Business {
    fn node(&self) -> ResourceNode {
        ResourceNode::new(ResourceKind::Business, self.id.clone())
    }
}
