//! Core types, configuration, and rule parsing for the refix tool.
//!
//! This crate provides the foundational types used across the workspace:
//!
//! - [`FileId`] and [`Guid`], the two halves of a script reference
//! - [`FileId::compute`], the engine-compatible file ID hash
//! - [`Config`], the `appsettings.json` schema
//! - [`RuleSet`], the parsed replacement tables
//! - [`ConfigError`] for setup failures

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod rules;
pub mod types;

pub use config::{Config, DEFAULT_CONFIG_FILE};
pub use error::ConfigError;
pub use rules::{AssemblyBinding, GuidReplacement, RuleSet, ScriptReplacement};
pub use types::{FileId, Guid};
