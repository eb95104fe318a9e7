use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Resource types whose access is decided through their owning business.
///
/// The string form doubles as the capability domain, so `Asset` is guarded by
/// `view_asset`, `add_asset` and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Business,
    Headquarters,
    InternalLocation,
    SystemSegregation,
    Asset,
    AssetSystem,
    SubsystemComponent,
    MinimumComponent,
    User,
    Group,
}

/// A single-valued relation declared on a resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    /// Column/field holding the related id
    pub field: &'static str,
    pub target: ResourceKind,
}

const fn relation(field: &'static str, target: ResourceKind) -> Relation {
    Relation { field, target }
}

const NO_RELATIONS: &[Relation] = &[];
const HEADQUARTERS_RELATIONS: &[Relation] = &[relation("business_id", ResourceKind::Business)];
const INTERNAL_LOCATION_RELATIONS: &[Relation] =
    &[relation("headquarters_id", ResourceKind::Headquarters)];
const ASSET_RELATIONS: &[Relation] = &[
    relation("internal_location_id", ResourceKind::InternalLocation),
    relation("system_segregation_id", ResourceKind::SystemSegregation),
];
const ASSET_SYSTEM_RELATIONS: &[Relation] = &[relation("asset_id", ResourceKind::Asset)];
const SUBSYSTEM_COMPONENT_RELATIONS: &[Relation] =
    &[relation("asset_system_id", ResourceKind::AssetSystem)];
const MINIMUM_COMPONENT_RELATIONS: &[Relation] = &[relation(
    "subsystem_component_id",
    ResourceKind::SubsystemComponent,
)];

impl ResourceKind {
    pub const ALL: [ResourceKind; 10] = [
        ResourceKind::Business,
        ResourceKind::Headquarters,
        ResourceKind::InternalLocation,
        ResourceKind::SystemSegregation,
        ResourceKind::Asset,
        ResourceKind::AssetSystem,
        ResourceKind::SubsystemComponent,
        ResourceKind::MinimumComponent,
        ResourceKind::User,
        ResourceKind::Group,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Business => "business",
            ResourceKind::Headquarters => "headquarters",
            ResourceKind::InternalLocation => "internallocation",
            ResourceKind::SystemSegregation => "systemsegregation",
            ResourceKind::Asset => "asset",
            ResourceKind::AssetSystem => "assetsystem",
            ResourceKind::SubsystemComponent => "subsystemcomponent",
            ResourceKind::MinimumComponent => "minimumcomponent",
            ResourceKind::User => "user",
            ResourceKind::Group => "group",
        }
    }

    /// Declared single-valued relations, in traversal order
    pub fn relations(&self) -> &'static [Relation] {
        match self {
            ResourceKind::Headquarters => HEADQUARTERS_RELATIONS,
            ResourceKind::InternalLocation => INTERNAL_LOCATION_RELATIONS,
            ResourceKind::Asset => ASSET_RELATIONS,
            ResourceKind::AssetSystem => ASSET_SYSTEM_RELATIONS,
            ResourceKind::SubsystemComponent => SUBSYSTEM_COMPONENT_RELATIONS,
            ResourceKind::MinimumComponent => MINIMUM_COMPONENT_RELATIONS,
            ResourceKind::Business
            | ResourceKind::SystemSegregation
            | ResourceKind::User
            | ResourceKind::Group => NO_RELATIONS,
        }
    }

    /// Chain of relations leading from this kind to a business.
    ///
    /// The first declared branch that reaches a business wins, which is the
    /// same branch a depth-first resolution takes. `None` means the kind is
    /// global and never owned by a business.
    pub fn business_path(&self) -> Option<Vec<Relation>> {
        if *self == ResourceKind::Business {
            return Some(Vec::new());
        }
        self.relations().iter().find_map(|relation| {
            relation.target.business_path().map(|mut rest| {
                rest.insert(0, *relation);
                rest
            })
        })
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_ascii_lowercase().replace('_', "");
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| DomainError::UnknownResourceKind(s.to_string()))
    }
}

/// Identity of one resource instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A resource instance as seen by ownership resolution: its identity, the
/// related instances it points at, and an optional direct business shortcut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNode {
    pub reference: ResourceRef,
    pub relations: Vec<ResourceRef>,
    pub business_id: Option<String>,
}

impl ResourceNode {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            reference: ResourceRef::new(kind, id),
            relations: Vec::new(),
            business_id: None,
        }
    }

    /// Build a node from the values of `kind`'s declared relations, given in
    /// declaration order. Null values are skipped.
    pub fn from_relation_values(
        kind: ResourceKind,
        id: impl Into<String>,
        values: &[Option<&str>],
    ) -> Self {
        let relations = kind
            .relations()
            .iter()
            .zip(values)
            .filter_map(|(relation, value)| {
                value.map(|related_id| ResourceRef::new(relation.target, related_id))
            })
            .collect();

        Self {
            reference: ResourceRef::new(kind, id),
            relations,
            business_id: None,
        }
    }

    pub fn with_relation(mut self, kind: ResourceKind, id: impl Into<String>) -> Self {
        self.relations.push(ResourceRef::new(kind, id));
        self
    }

    pub fn with_business_shortcut(mut self, business_id: impl Into<String>) -> Self {
        self.business_id = Some(business_id.into());
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.reference.kind
    }
}

/// Anything that can be presented to the authorization engine
pub trait Resource {
    fn node(&self) -> ResourceNode;
}

impl Resource for ResourceNode {
    fn node(&self) -> ResourceNode {
        self.clone()
    }
}

/// Set of businesses a list query is restricted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantScope {
    /// No restriction (superusers), including resources no business owns
    All,
    Only(BTreeSet<String>),
}

impl TenantScope {
    pub fn contains(&self, business_id: &str) -> bool {
        match self {
            TenantScope::All => true,
            TenantScope::Only(ids) => ids.contains(business_id),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, TenantScope::Only(ids) if ids.is_empty())
    }
}

/// Read access to resource instances and their single-valued relations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ResourceGraph: Send + Sync {
    /// Load one resource with its populated relations
    async fn get_node(&self, resource: &ResourceRef) -> DomainResult<Option<ResourceNode>>;

    /// List resources of `kind` whose owning business falls inside `scope`
    async fn list_resources(
        &self,
        kind: ResourceKind,
        scope: &TenantScope,
    ) -> DomainResult<Vec<ResourceRef>>;
}
