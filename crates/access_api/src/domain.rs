mod access_admin_service;
mod access_gate;

pub use access_admin_service::*;
pub use access_gate::*;
