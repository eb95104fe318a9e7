mod access_fact;
mod asset;
mod business;
mod capability;
mod grant;
mod location;
mod membership;
mod principal;
mod resource;
mod result;
mod role;

pub use access_fact::*;
pub use asset::*;
pub use business::*;
pub use capability::*;
pub use grant::*;
pub use location::*;
pub use membership::*;
pub use principal::*;
pub use resource::*;
pub use result::*;
pub use role::*;
