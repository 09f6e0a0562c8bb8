//! Depot - Repository resolution and caching engine
//!
//! Resolves artifact paths against hosted and proxied repositories, caches
//! remote content and remote failures, rewrites latest-version requests and
//! moves or copies trees between repositories.

pub mod clock;
pub mod config;
pub mod error;
pub mod layout;
pub mod metadata;
pub mod mover;
pub mod remote;
pub mod repo;
pub mod repo_path;
pub mod resolve;
pub mod resource;
pub mod security;
pub mod store;
pub mod telemetry;

pub use error::{DepotError, DepotResult};
pub use repo::RepositoryService;
pub use repo_path::RepoPath;
