//! Local persistence collaborator and the record <-> domain mapping used at
//! every backend boundary.

pub mod mapping;
pub mod store_backend;

pub use store_backend::StoreBackend;
