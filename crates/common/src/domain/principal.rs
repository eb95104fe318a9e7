use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Authenticated actor as supplied by the authentication layer.
///
/// Authorization only ever looks at `id`, `active` and `superuser`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub active: bool,
    pub superuser: bool,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            active: true,
            superuser: false,
        }
    }

    pub fn superuser(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            active: true,
            superuser: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Stored principal row (the `users` table)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalRecord {
    pub id: String,
    pub email: String,
    pub active: bool,
    pub superuser: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&PrincipalRecord> for Principal {
    fn from(record: &PrincipalRecord) -> Self {
        Principal {
            id: record.id.clone(),
            active: record.active,
            superuser: record.superuser,
        }
    }
}

/// Input for creating a principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePrincipalRepoInput {
    pub id: String,
    pub email: String,
    pub active: bool,
    pub superuser: bool,
}

/// Input for getting a principal by ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetPrincipalRepoInput {
    pub principal_id: String,
}

/// Repository trait for principal storage operations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PrincipalRepository: Send + Sync {
    /// Create a principal (fails with PrincipalAlreadyExists on duplicate id or email)
    async fn create_principal(&self, input: CreatePrincipalRepoInput)
        -> DomainResult<PrincipalRecord>;

    /// Get a principal by ID
    async fn get_principal(
        &self,
        input: GetPrincipalRepoInput,
    ) -> DomainResult<Option<PrincipalRecord>>;
}
