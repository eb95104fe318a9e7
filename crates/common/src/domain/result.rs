use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Unknown resource kind: {0}")]
    UnknownResourceKind(String),

    #[error("Invalid capability: {0}")]
    InvalidCapability(String),

    #[error("No business owns resource: {0}")]
    UnresolvedTenant(String),

    #[error("Role {role_id} is excluded from capabilities: {}", capabilities.join(", "))]
    ExclusionViolation {
        role_id: String,
        capabilities: Vec<String>,
    },

    #[error("Principal not found: {0}")]
    PrincipalNotFound(String),

    #[error("Principal already exists: {0}")]
    PrincipalAlreadyExists(String),

    #[error("Business not found: {0}")]
    BusinessNotFound(String),

    #[error("Business already exists: {0}")]
    BusinessAlreadyExists(String),

    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("Role already exists: {0}")]
    RoleAlreadyExists(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusion_violation_names_every_capability() {
        let err = DomainError::ExclusionViolation {
            role_id: "admin".to_string(),
            capabilities: vec!["delete_asset".to_string(), "change_asset".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Role admin is excluded from capabilities: delete_asset, change_asset"
        );
    }
}
