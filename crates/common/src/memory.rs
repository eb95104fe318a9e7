mod in_memory_access_store;

pub use in_memory_access_store::*;
