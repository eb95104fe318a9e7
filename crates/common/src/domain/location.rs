use crate::domain::resource::{Resource, ResourceKind, ResourceNode};

/// Headquarters of a business
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headquarters {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub address: String,
    pub phone: String,
}

impl Resource for Headquarters {
    fn node(&self) -> ResourceNode {
        ResourceNode::from_relation_values(
            ResourceKind::Headquarters,
            self.id.clone(),
            &[Some(self.business_id.as_str())],
        )
    }
}

/// Room or area inside a headquarters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalLocation {
    pub id: String,
    pub headquarters_id: String,
    pub name: String,
    pub floor: String,
    pub room_number: String,
}

impl Resource for InternalLocation {
    fn node(&self) -> ResourceNode {
        ResourceNode::from_relation_values(
            ResourceKind::InternalLocation,
            self.id.clone(),
            &[Some(self.headquarters_id.as_str())],
        )
    }
}
