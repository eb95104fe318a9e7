use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::domain::{DomainResult, ResourceGraph, ResourceKind, ResourceNode, ResourceRef};

/// Finds the business that owns a resource by walking its single-valued relations
#[derive(Clone)]
pub struct OwnershipResolver {
    graph: Arc<dyn ResourceGraph>,
}

impl OwnershipResolver {
    pub fn new(graph: Arc<dyn ResourceGraph>) -> Self {
        Self { graph }
    }

    pub async fn resolve(&self, resource: &ResourceNode) -> DomainResult<Option<String>> {
        resolve_owner(self.graph.as_ref(), resource).await
    }
}

fn business_of(node: &ResourceNode) -> Option<String> {
    if node.kind() == ResourceKind::Business {
        return Some(node.reference.id.clone());
    }
    node.business_id.clone()
}

/// Depth-first search from `resource` to the first business reachable through
/// its relations, in declaration order.
///
/// Each instance is visited at most once, so cyclic graphs terminate. Related
/// ids that no longer resolve to an instance are skipped.
#[instrument(skip(graph, resource), fields(resource = %resource.reference))]
pub async fn resolve_owner(
    graph: &dyn ResourceGraph,
    resource: &ResourceNode,
) -> DomainResult<Option<String>> {
    if let Some(business_id) = business_of(resource) {
        return Ok(Some(business_id));
    }

    let mut visited: HashSet<ResourceRef> = HashSet::from([resource.reference.clone()]);
    let mut pending: Vec<ResourceRef> = resource.relations.iter().rev().cloned().collect();

    while let Some(next) = pending.pop() {
        if !visited.insert(next.clone()) {
            continue;
        }

        let Some(node) = graph.get_node(&next).await? else {
            debug!(related = %next, "related resource not found, skipping");
            continue;
        };

        if let Some(business_id) = business_of(&node) {
            debug!(business_id = %business_id, via = %next, "resolved owning business");
            return Ok(Some(business_id));
        }

        pending.extend(
            node.relations
                .iter()
                .rev()
                .filter(|related| !visited.contains(*related))
                .cloned(),
        );
    }

    debug!("no business reachable from resource");
    Ok(None)
}
