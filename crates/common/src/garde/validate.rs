//! Garde validation utilities.

use crate::domain::DomainError;
use garde::{Report, Validate};

/// Convert garde validation report to DomainError
pub fn validate_struct<T>(value: &T) -> Result<(), DomainError>
where
    T: Validate,
    T::Context: Default,
{
    value
        .validate()
        .map_err(|report| DomainError::ValidationError(format_validation_errors(&report)))
}

/// Custom garde rule for capability codenames such as `view_asset`.
///
/// A codename is `{action}_{domain}` in lowercase ASCII, with exactly one
/// separating underscore.
pub fn capability_codename(value: &str, _ctx: &()) -> garde::Result {
    let Some((action, domain)) = value.split_once('_') else {
        return Err(garde::Error::new("must look like {action}_{domain}"));
    };

    let is_word = |part: &str| {
        !part.is_empty() && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    };

    if !is_word(action) || !is_word(domain) {
        return Err(garde::Error::new(
            "must be lowercase ascii words joined by a single underscore",
        ));
    }
    Ok(())
}

/// Custom garde rule applying [`capability_codename`] to every element
#[allow(clippy::ptr_arg)]
pub fn capability_codenames(values: &Vec<String>, ctx: &()) -> garde::Result {
    values
        .iter()
        .try_for_each(|value| capability_codename(value, ctx))
}

/// Format validation errors from garde Report into a human-readable string
fn format_validation_errors(report: &Report) -> String {
    report
        .iter()
        .map(|(path, error)| {
            if path.to_string().is_empty() {
                error.message().to_string()
            } else {
                format!("{}: {}", path, error.message())
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
