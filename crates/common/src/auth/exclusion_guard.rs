use crate::domain::{DomainError, DomainResult};
use std::collections::BTreeSet;

/// Reject a role-capability addition that collides with the role's exclusions.
///
/// Stores call this inside the same transaction (or write lock) that applies
/// the addition, passing the exclusions read in that transaction.
pub fn enforce_exclusions(
    role_id: &str,
    requested: &[String],
    excluded: &BTreeSet<String>,
) -> DomainResult<()> {
    let offending: BTreeSet<&String> = requested
        .iter()
        .filter(|capability| excluded.contains(*capability))
        .collect();

    if offending.is_empty() {
        return Ok(());
    }

    Err(DomainError::ExclusionViolation {
        role_id: role_id.to_string(),
        capabilities: offending.into_iter().cloned().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exclusions(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_allows_when_nothing_is_excluded() {
        let requested = vec!["view_asset".to_string(), "add_asset".to_string()];
        assert!(enforce_exclusions("admin", &requested, &BTreeSet::new()).is_ok());
    }

    #[test]
    fn test_allows_disjoint_request() {
        let requested = vec!["view_asset".to_string()];
        let excluded = exclusions(&["delete_asset"]);
        assert!(enforce_exclusions("admin", &requested, &excluded).is_ok());
    }

    #[test]
    fn test_rejects_and_names_each_offender_once() {
        let requested = vec![
            "delete_asset".to_string(),
            "view_asset".to_string(),
            "change_asset".to_string(),
            "delete_asset".to_string(),
        ];
        let excluded = exclusions(&["delete_asset", "change_asset"]);

        let result = enforce_exclusions("admin", &requested, &excluded);
        match result {
            Err(DomainError::ExclusionViolation {
                role_id,
                capabilities,
            }) => {
                assert_eq!(role_id, "admin");
                assert_eq!(
                    capabilities,
                    vec!["change_asset".to_string(), "delete_asset".to_string()]
                );
            }
            other => panic!("Expected ExclusionViolation, got {:?}", other),
        }
    }
}
