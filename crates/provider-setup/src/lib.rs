//! Provider connection and model synchronization engine.
//!
//! Onboards an AI provider (credentials → connectivity test → save → model
//! discovery) and keeps its model catalog's saved/active/default flags
//! consistent while they are edited one at a time or in bulk.
//!
//! - [`ProviderConsole`]: provider registry and lifecycle transitions.
//! - [`catalog`]: the in-memory catalog and its synchronizer.
//! - [`enforcer`]: pure flag cascade and invariant checks.
//! - [`BulkCoordinator`]: optimistic flag updates with rollback.
//! - [`HttpBackend`]: the admin API binding.

pub mod backend;
pub mod catalog;
pub mod console;
pub mod coordinator;
pub mod enforcer;
pub mod error;
pub mod events;
pub mod model;
pub mod prober;
pub mod provider;
pub mod service;
mod state;
pub mod status;

#[cfg(test)]
mod testing;

pub use {
    backend::{ConnectionReport, HttpBackend, ProviderBackend, ProviderRecord},
    catalog::{Catalog, CatalogSummary, CatalogSynchronizer, ModelQuery, Repair},
    console::ProviderConsole,
    coordinator::{BulkAction, BulkCoordinator, BulkOutcome, UpdateBatch},
    enforcer::{Enforcement, FlagEdit, ModelDelta, Violation},
    error::{Error, Result},
    events::{MODELS_TOPIC, STATUS_TOPIC, SetupBroadcaster},
    model::{FlagField, ModelPatch, ProviderModel},
    prober::ConnectivityProber,
    provider::{Credentials, CredentialsPatch, Provider, TestResult},
    service::LiveProviderSetupService,
    status::{FailedStage, Operation, ProviderStatus},
};
