mod authorization_provider;
mod authorization_service;
mod catalog;
mod exclusion_guard;
mod ownership;

pub use authorization_provider::*;
pub use authorization_service::*;
pub use catalog::*;
pub use exclusion_guard::*;
pub use ownership::*;
