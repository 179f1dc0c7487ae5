//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`check`] - Pre-flight safety check for a download
//! - [`config`] - Configuration management (path, init, list)
//! - [`detect`] - Region detection from a point or view extent
//! - [`dir`] - Service directory listing
//! - [`download`] - Layer download into a GeoPackage
//! - [`layers`] - Layer listing for one service
//! - [`services`] - Registry regions and their services

pub mod check;
pub mod common;
pub mod config;
pub mod detect;
pub mod dir;
pub mod download;
pub mod layers;
pub mod services;
