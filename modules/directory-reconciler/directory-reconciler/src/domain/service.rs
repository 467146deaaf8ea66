//! Entry point that wires directory clients, configuration and the shared
//! name-lock registry into one reconciler per resource type.

use std::sync::Arc;

use directory_reconciler_sdk::DirectoryClients;

use crate::config::ReconcilerConfig;
use crate::domain::engine::{EngineSettings, Reconciler};
use crate::domain::lock::NameLock;
use crate::domain::resources::{
    AccessPackageResourceRequestAdapter, ApplicationAdapter, ApplicationPasswordAdapter,
    DomainsDataSource, UserAdapter, UserLookup,
};

/// Builds reconcilers that share one [`NameLock`] registry.
///
/// Reconcilers built from the same `DirectoryReconciler` serialize their
/// sub-resource mutations on a parent against each other.
pub struct DirectoryReconciler {
    clients: DirectoryClients,
    locks: Arc<NameLock>,
    config: ReconcilerConfig,
}

impl DirectoryReconciler {
    #[must_use]
    pub fn new(clients: DirectoryClients, config: ReconcilerConfig) -> Self {
        Self::with_locks(clients, config, Arc::new(NameLock::new()))
    }

    /// Shares an existing lock registry, e.g. with another instance in the
    /// same process.
    #[must_use]
    pub fn with_locks(clients: DirectoryClients, config: ReconcilerConfig, locks: Arc<NameLock>) -> Self {
        tracing::debug!(
            tenant_id = %config.tenant_id,
            prevent_duplicate_names = config.prevent_duplicate_names,
            "directory reconciler ready"
        );
        Self {
            clients,
            locks,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    #[must_use]
    pub fn locks(&self) -> &Arc<NameLock> {
        &self.locks
    }

    fn settings(&self) -> EngineSettings {
        EngineSettings {
            timeouts: self.config.timeouts,
            poll_interval: self.config.consistency_poll_interval,
            prevent_duplicate_names: self.config.prevent_duplicate_names,
        }
    }

    #[must_use]
    pub fn applications(&self) -> Reconciler<ApplicationAdapter> {
        Reconciler::new(
            ApplicationAdapter::new(Arc::clone(&self.clients.applications)),
            Arc::clone(&self.locks),
            self.settings(),
        )
    }

    #[must_use]
    pub fn application_passwords(&self) -> Reconciler<ApplicationPasswordAdapter> {
        Reconciler::new(
            ApplicationPasswordAdapter::new(Arc::clone(&self.clients.applications)),
            Arc::clone(&self.locks),
            self.settings(),
        )
    }

    #[must_use]
    pub fn users(&self) -> Reconciler<UserAdapter> {
        Reconciler::new(
            UserAdapter::new(Arc::clone(&self.clients.users)),
            Arc::clone(&self.locks),
            self.settings(),
        )
    }

    #[must_use]
    pub fn access_package_resource_requests(&self) -> Reconciler<AccessPackageResourceRequestAdapter> {
        Reconciler::new(
            AccessPackageResourceRequestAdapter::new(Arc::clone(
                &self.clients.access_package_resource_requests,
            )),
            Arc::clone(&self.locks),
            self.settings(),
        )
    }

    #[must_use]
    pub fn domains(&self) -> DomainsDataSource {
        DomainsDataSource::new(
            Arc::clone(&self.clients.domains),
            self.config.tenant_id.clone(),
            self.settings(),
        )
    }

    #[must_use]
    pub fn user_lookup(&self) -> UserLookup {
        UserLookup::new(Arc::clone(&self.clients.users), self.settings())
    }
}

impl std::fmt::Debug for DirectoryReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryReconciler")
            .field("clients", &self.clients)
            .field("locks", &self.locks)
            .field("config", &self.config)
            .finish()
    }
}
