pub mod config;
pub mod crypto;
pub mod errors;
pub mod strength;
pub mod vault;

pub use errors::{Result, VaultError};
pub use vault::VaultStore;
