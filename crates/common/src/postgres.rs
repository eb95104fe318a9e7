mod access_fact_repository;
mod business_repository;
mod capability_repository;
mod client;
mod config;
mod direct_grant_repository;
mod errors;
mod migration_runner;
mod principal_repository;
mod resource_graph;
mod role_membership_repository;
mod role_repository;

pub use access_fact_repository::*;
pub use business_repository::*;
pub use capability_repository::*;
pub use client::*;
pub use config::*;
pub use direct_grant_repository::*;
pub use migration_runner::*;
pub use principal_repository::*;
pub use resource_graph::*;
pub use role_membership_repository::*;
pub use role_repository::*;
