//! sessync - uploads sanitized AI coding-assistant sessions
//!
//! This crate provides the core functionality for the `sessync` CLI tool.
//!
//! # Architecture
//!
//! - [`readers`] - Session readers (Claude Code logs, Cursor database)
//! - [`model`] - Data types (Message, Session, Tool)
//! - [`sanitize`] - Redaction of code, secrets and personal data
//! - [`sync`] - Batching, upload and the sync orchestrator
//! - [`config`] - Paths, config file and persisted sync boundaries
//! - [`cli`] - Command-line interface using clap
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod readers;
pub mod sanitize;
pub mod sync;

pub use error::{Error, Result};
