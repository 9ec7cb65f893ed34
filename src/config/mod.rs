//! Configuration loading (`.credvault.toml`).

pub mod settings;

pub use settings::Settings;
