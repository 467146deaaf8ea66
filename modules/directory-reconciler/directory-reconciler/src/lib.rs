//! Directory Reconciler
//!
//! Drives directory objects (applications, users, application passwords,
//! access package resource requests) to a desired state through the client
//! traits defined in `directory-reconciler-sdk`, which are re-exported here.

pub use directory_reconciler_sdk::{
    AccessPackageResourceRequestClient, ApplicationsClient, DirectoryClients, DirectoryError,
    DomainsClient, ODataFilter, UsersClient,
};

pub mod config;
pub mod domain;
pub mod infra;
pub mod logging;

mod humantime_serde;

pub use config::{LoggingConfig, OperationTimeouts, ReconcilerConfig};
pub use domain::engine::{Created, DriftOf, EngineSettings, OperationContext, Reconciler, ResourceAdapter, StateOf};
pub use domain::error::{Operation, ReconcileError, ReconcileErrorKind};
pub use domain::ids::{CredentialId, CredentialKind, IdError, IdFormat, ObjectId, ResourceId};
pub use domain::lock::{LockKey, NameGuard, NameLock};
pub use domain::service::DirectoryReconciler;
pub use domain::state::{Drift, PersistedState, ResourceState};
pub use domain::upgrade::{UpgradeChain, upgrade_password_id};
pub use infra::InMemoryDirectory;
pub use logging::init_logging;
