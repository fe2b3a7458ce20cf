/// Database configuration, connection and schema creation
pub mod database;

/// Application settings loaded from config.toml
pub mod settings;
