// ABOUTME: Library module for mysql-clone-migrator
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod catalog;
pub mod checkpoint;
pub mod client;
pub mod commands;
pub mod config;
pub mod filters;
pub mod mysql;
pub mod progress;
pub mod report;
pub mod schema;
pub mod transfer;
pub mod utils;
