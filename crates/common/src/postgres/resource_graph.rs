use crate::domain::{
    DomainError, DomainResult, ResourceGraph, ResourceKind, ResourceNode, ResourceRef,
    TenantScope,
};
use crate::postgres::errors::repository_error;
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Table holding the instances of each resource kind.
///
/// Relation columns are named after `ResourceKind::relations()` fields.
fn table_for(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Business => "businesses",
        ResourceKind::Headquarters => "headquarters",
        ResourceKind::InternalLocation => "internal_locations",
        ResourceKind::SystemSegregation => "system_segregations",
        ResourceKind::Asset => "assets",
        ResourceKind::AssetSystem => "asset_systems",
        ResourceKind::SubsystemComponent => "subsystem_components",
        ResourceKind::MinimumComponent => "minimum_components",
        ResourceKind::User => "users",
        ResourceKind::Group => "roles",
    }
}

fn select_node_sql(kind: ResourceKind) -> String {
    let columns: Vec<&str> = std::iter::once("id")
        .chain(kind.relations().iter().map(|relation| relation.field))
        .collect();
    format!(
        "SELECT {} FROM {} WHERE id = $1",
        columns.join(", "),
        table_for(kind)
    )
}

/// Ids of `kind` whose owning business is in `$1`, joined along the kind's business path
fn scoped_list_sql(kind: ResourceKind) -> Option<String> {
    let path = kind.business_path()?;

    let mut sql = format!("SELECT t0.id FROM {} t0", table_for(kind));
    let Some((last, hops)) = path.split_last() else {
        sql.push_str(" WHERE t0.id = ANY($1) ORDER BY t0.id");
        return Some(sql);
    };

    for (index, relation) in hops.iter().enumerate() {
        sql.push_str(&format!(
            " JOIN {table} t{next} ON t{next}.id = t{index}.{field}",
            table = table_for(relation.target),
            next = index + 1,
            field = relation.field,
        ));
    }
    sql.push_str(&format!(
        " WHERE t{}.{} = ANY($1) ORDER BY t0.id",
        hops.len(),
        last.field
    ));
    Some(sql)
}

/// Resource graph over the asset/location tables
#[derive(Clone)]
pub struct PostgresResourceGraph {
    client: PostgresClient,
}

impl PostgresResourceGraph {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceGraph for PostgresResourceGraph {
    #[instrument(skip(self), fields(resource = %resource))]
    async fn get_node(&self, resource: &ResourceRef) -> DomainResult<Option<ResourceNode>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(select_node_sql(resource.kind).as_str(), &[&resource.id])
            .await
            .map_err(repository_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let values: Vec<Option<String>> = (1..=resource.kind.relations().len())
            .map(|column| row.get::<_, Option<String>>(column))
            .collect();
        let borrowed: Vec<Option<&str>> = values.iter().map(Option::as_deref).collect();

        Ok(Some(ResourceNode::from_relation_values(
            resource.kind,
            resource.id.clone(),
            &borrowed,
        )))
    }

    #[instrument(skip(self, scope), fields(kind = kind.as_str()))]
    async fn list_resources(
        &self,
        kind: ResourceKind,
        scope: &TenantScope,
    ) -> DomainResult<Vec<ResourceRef>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = match scope {
            TenantScope::All => conn
                .query(
                    format!("SELECT id FROM {} ORDER BY id", table_for(kind)).as_str(),
                    &[],
                )
                .await
                .map_err(repository_error)?,
            TenantScope::Only(business_ids) => {
                let Some(sql) = scoped_list_sql(kind) else {
                    debug!("kind is not owned by any business");
                    return Ok(Vec::new());
                };
                let business_ids: Vec<&str> = business_ids.iter().map(String::as_str).collect();
                conn.query(sql.as_str(), &[&business_ids])
                    .await
                    .map_err(repository_error)?
            }
        };

        let resources: Vec<ResourceRef> = rows
            .iter()
            .map(|row| ResourceRef::new(kind, row.get::<_, String>("id")))
            .collect();

        debug!(count = resources.len(), "listed resources");
        Ok(resources)
    }
}
