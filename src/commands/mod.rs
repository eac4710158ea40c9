// ABOUTME: Command implementations for the CLI
// ABOUTME: Exports migrate, schema, and validate commands

pub mod migrate;
pub mod schema;
pub mod validate;

pub use migrate::{migrate, MigrateOptions};
pub use schema::schema;
pub use validate::validate;
