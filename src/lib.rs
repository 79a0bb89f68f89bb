//! dbmigration - versioned, logged, forward-only SQL schema migrations
//!
//! A database is created from the schema, function, data and finish scripts
//! of a version, or restored from a dump, and then moved forward one
//! migration script at a time. Every script run is recorded in a version
//! log table inside the database itself.

pub mod admin;
pub mod backend;
pub mod cli;
pub mod config;
pub mod config_validator;
pub mod core;
pub mod logging;
pub mod migrations;
pub mod script;
pub mod tables;
pub mod version;
