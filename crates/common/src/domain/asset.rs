use crate::domain::resource::{Resource, ResourceKind, ResourceNode};

/// Global classification of assets (electrical, hydraulic, ...); owned by no business
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemSegregation {
    pub id: String,
    pub segregation_type: String,
    pub description: String,
}

impl Resource for SystemSegregation {
    fn node(&self) -> ResourceNode {
        ResourceNode::new(ResourceKind::SystemSegregation, self.id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub internal_location_id: Option<String>,
    pub system_segregation_id: Option<String>,
}

impl Resource for Asset {
    fn node(&self) -> ResourceNode {
        ResourceNode::from_relation_values(
            ResourceKind::Asset,
            self.id.clone(),
            &[
                self.internal_location_id.as_deref(),
                self.system_segregation_id.as_deref(),
            ],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSystem {
    pub id: String,
    pub asset_id: String,
    pub name: String,
}

impl Resource for AssetSystem {
    fn node(&self) -> ResourceNode {
        ResourceNode::from_relation_values(
            ResourceKind::AssetSystem,
            self.id.clone(),
            &[Some(self.asset_id.as_str())],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemComponent {
    pub id: String,
    pub asset_system_id: String,
    pub name: String,
}

impl Resource for SubsystemComponent {
    fn node(&self) -> ResourceNode {
        ResourceNode::from_relation_values(
            ResourceKind::SubsystemComponent,
            self.id.clone(),
            &[Some(self.asset_system_id.as_str())],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinimumComponent {
    pub id: String,
    pub subsystem_component_id: String,
    pub name: String,
}

impl Resource for MinimumComponent {
    fn node(&self) -> ResourceNode {
        ResourceNode::from_relation_values(
            ResourceKind::MinimumComponent,
            self.id.clone(),
            &[Some(self.subsystem_component_id.as_str())],
        )
    }
}
