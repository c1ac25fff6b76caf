//! Plugin Host Capabilities (C10, spec §4.10): the immutable execution
//! context, `kb.*`/`secrets.*` capability surfaces exposed to plugin code,
//! and the worker-side `_handle_plugin_execution_job` flow that invokes a
//! registered plugin entrypoint under it.

pub mod context;
pub mod error;
pub mod execution;
pub mod kb;
pub mod knowledge_object;
pub mod limits;
pub mod rbac;
pub mod secrets;

pub use context::PluginContext;
pub use error::{CapabilityError, PluginHostError};
pub use execution::{
    handle_plugin_execution_job, PluginEntrypoint, PluginExecutionRepository, PluginHost,
    PluginRegistry, ScheduleKnowledgeBaseResolver,
};
pub use kb::KbCapability;
pub use knowledge_object::KnowledgeObject;
pub use limits::RequestLimiter;
pub use rbac::RbacChecker;
pub use secrets::{Scope, SecretStore, SecretsCapability};
