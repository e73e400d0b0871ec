//! Shared types, error model, and configuration for the sourcing workspace.
//!
//! This crate is the foundation depended on by all other sourcing crates.
//! It provides:
//! - [`SourcingError`]: the unified error type
//! - Domain types ([`CredentialContext`], [`SearchFilter`], [`SessionToken`],
//!   [`CandidateRecord`], [`SaveOutcome`])
//! - Configuration ([`AppConfig`], [`WorkflowConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ServicesConfig, WorkflowConfig, WorkflowSection, apply_env_overrides, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_endpoints,
};
pub use error::{ErrorKind, Result, SourcingError};
pub use types::{
    CandidateRecord, CredentialContext, Credentials, FailureDetail, RunId, RunRequest,
    SaveOutcome, SaveStatus, SearchFilter, Secret, SessionToken, SkillList,
};
