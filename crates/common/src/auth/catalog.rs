use crate::domain::{Capability, DomainError, DomainResult, ResourceKind};

/// Actions a capability can name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    View,
    Add,
    Change,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::View, Action::Add, Action::Change, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Add => "add",
            Action::Change => "change",
            Action::Delete => "delete",
        }
    }
}

/// Map an HTTP verb to the action it performs.
///
/// Verbs are matched exactly (`GET`, not `get`); anything else is
/// `DomainError::UnknownMethod`.
pub fn action_for(method: &str) -> DomainResult<Action> {
    match method {
        "GET" => Ok(Action::View),
        "POST" => Ok(Action::Add),
        "PUT" | "PATCH" => Ok(Action::Change),
        "DELETE" => Ok(Action::Delete),
        other => Err(DomainError::UnknownMethod(other.to_string())),
    }
}

/// Capability codename guarding `action` on resources of `kind`
pub fn capability_for(kind: ResourceKind, action: Action) -> String {
    compose_capability(kind.as_str(), action)
}

/// `"{action}_{kind}"` with the kind lower-cased
pub fn compose_capability(kind: &str, action: Action) -> String {
    format!("{}_{}", action.as_str(), kind.to_lowercase())
}

/// One catalog entry per (action, resource kind) pair
pub fn default_capabilities() -> Vec<Capability> {
    ResourceKind::ALL
        .iter()
        .flat_map(|kind| {
            Action::ALL.iter().map(move |action| Capability {
                codename: capability_for(*kind, *action),
                name: format!("Can {} {}", action.as_str(), kind.as_str()),
            })
        })
        .collect()
}
