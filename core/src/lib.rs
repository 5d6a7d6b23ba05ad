//! DevEnv Manager Core Library
//!
//! This crate provides the core functionality for creating, starting,
//! stopping, deleting and shelling into development environments backed by
//! multipass VMs or LXD containers.

pub mod backend;
pub mod config;
pub mod error;
pub mod manager;
pub mod model;
pub mod registry;
pub mod templates;
pub mod worker;

pub use backend::{default_backends, Backend, CommandOutput, CommandRunner, SystemRunner};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use manager::{EnvironmentManager, TERMINAL_CANDIDATES};
pub use model::*;
pub use registry::{EnvironmentRecord, EnvironmentRegistry};
pub use templates::{Template, TemplateCatalog};
pub use worker::{Event, Operation, Request, Worker};
