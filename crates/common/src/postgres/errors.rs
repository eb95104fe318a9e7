use crate::domain::DomainError;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Constraint that rejected a write, by SQLSTATE class
pub(crate) enum Violation<'a> {
    Unique(&'a str),
    ForeignKey(&'a str),
}

pub(crate) fn violation(err: &tokio_postgres::Error) -> Option<Violation<'_>> {
    let db_err = err.as_db_error()?;
    let constraint = db_err.constraint().unwrap_or_default();
    match db_err.code().code() {
        UNIQUE_VIOLATION => Some(Violation::Unique(constraint)),
        FOREIGN_KEY_VIOLATION => Some(Violation::ForeignKey(constraint)),
        _ => None,
    }
}

/// Map a foreign-key failure on a grant-like row to the entity that is missing.
///
/// Constraint names follow `<table>_<column>_fkey`.
pub(crate) fn missing_reference(
    constraint: &str,
    principal_id: &str,
    business_id: &str,
    role_id: &str,
    capability: &str,
) -> Option<DomainError> {
    if constraint.ends_with("principal_id_fkey") {
        Some(DomainError::PrincipalNotFound(principal_id.to_string()))
    } else if constraint.ends_with("business_id_fkey") {
        Some(DomainError::BusinessNotFound(business_id.to_string()))
    } else if constraint.ends_with("role_id_fkey") {
        Some(DomainError::RoleNotFound(role_id.to_string()))
    } else if constraint.ends_with("capability_fkey") {
        Some(DomainError::InvalidCapability(capability.to_string()))
    } else {
        None
    }
}

pub(crate) fn repository_error(err: tokio_postgres::Error) -> DomainError {
    DomainError::RepositoryError(err.into())
}
