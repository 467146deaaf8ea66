#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

//! Common test utilities for directory-reconciler integration tests

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use directory_reconciler::{
    AccessPackageResourceRequestClient, ApplicationsClient, DirectoryClients, DirectoryError,
    DirectoryReconciler, DomainsClient, InMemoryDirectory, LoggingConfig, ODataFilter,
    OperationTimeouts, ReconcilerConfig, UsersClient, init_logging,
};
use directory_reconciler_sdk::{
    AccessPackageResourceRequest, Application, ApplicationPatch, Domain, PasswordCredential, User,
    UserPatch,
};
use parking_lot::Mutex;

/// Wraps [`InMemoryDirectory`] and records how it is called.
///
/// - every call is journaled as `"{family}.{method} {target}"`
/// - concurrent writes per target object are tracked to detect overlap
/// - failures can be injected per method name, one call at a time
/// - reads can lag behind application updates to exercise polling
#[derive(Default)]
pub struct RecordingDirectory {
    inner: InMemoryDirectory,
    journal: Mutex<Vec<String>>,
    app_patches: Mutex<Vec<ApplicationPatch>>,
    latency: Mutex<Duration>,
    active: Mutex<HashMap<String, usize>>,
    max_overlap: Mutex<HashMap<String, usize>>,
    failures: Mutex<HashMap<&'static str, Vec<DirectoryError>>>,
    stale_reads: AtomicUsize,
    stale_snapshot: Mutex<Option<Application>>,
    strip_next_create_id: AtomicBool,
}

impl RecordingDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_domains(domains: Vec<Domain>) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryDirectory::new().with_domains(domains),
            ..Self::default()
        })
    }

    pub fn inner(&self) -> &InMemoryDirectory {
        &self.inner
    }

    /// Delay added to every call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Makes the next call to `method` fail with `error`.
    pub fn fail_next(&self, method: &'static str, error: DirectoryError) {
        self.failures.lock().entry(method).or_default().push(error);
    }

    /// The next `reads` application reads after an update still return the
    /// application as it was before that update.
    pub fn lag_reads_after_update(&self, reads: usize) {
        self.stale_reads.store(reads, Ordering::SeqCst);
    }

    /// The next application create succeeds remotely but returns no ID.
    pub fn strip_next_create_id(&self) {
        self.strip_next_create_id.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.journal.lock().len()
    }

    /// Number of calls whose method is `method`.
    pub fn calls_to(&self, method: &str) -> usize {
        self.journal
            .lock()
            .iter()
            .filter(|c| c.split(' ').next() == Some(method))
            .count()
    }

    pub fn clear_calls(&self) {
        self.journal.lock().clear();
        self.app_patches.lock().clear();
    }

    pub fn app_patches(&self) -> Vec<ApplicationPatch> {
        self.app_patches.lock().clone()
    }

    /// Highest number of writes that were in flight at once against `target`.
    pub fn max_overlap(&self, target: &str) -> usize {
        self.max_overlap.lock().get(target).copied().unwrap_or(0)
    }

    async fn observe<T, F>(&self, method: &'static str, target: &str, call: F) -> Result<T, DirectoryError>
    where
        F: Future<Output = Result<T, DirectoryError>>,
    {
        self.journal.lock().push(format!("{method} {target}"));

        let injected = self.failures.lock().get_mut(method).and_then(|errors| errors.pop());
        if let Some(err) = injected {
            return Err(err);
        }

        let write = is_write(method);
        if write {
            let mut active = self.active.lock();
            let now = active.entry(target.to_owned()).or_default();
            *now += 1;
            let mut max = self.max_overlap.lock();
            let peak = max.entry(target.to_owned()).or_default();
            *peak = (*peak).max(*now);
        }

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let result = call.await;

        if write && let Some(now) = self.active.lock().get_mut(target) {
            *now -= 1;
        }
        result
    }
}

fn is_write(method: &str) -> bool {
    !matches!(
        method.rsplit('.').next(),
        Some("get" | "list" | "list_owners")
    )
}

// =============================================================================
// Client families
// =============================================================================

#[async_trait]
impl ApplicationsClient for RecordingDirectory {
    async fn get(&self, id: &str) -> Result<Application, DirectoryError> {
        self.observe("applications.get", id, async {
            let stale = self.stale_snapshot.lock().clone();
            if let Some(stale) = stale
                && self
                    .stale_reads
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Ok(stale);
            }
            ApplicationsClient::get(&self.inner, id).await
        })
        .await
    }

    async fn list(&self, filter: &ODataFilter) -> Result<Vec<Application>, DirectoryError> {
        self.observe("applications.list", filter.value(), ApplicationsClient::list(&self.inner, filter))
            .await
    }

    async fn create(&self, application: Application) -> Result<Application, DirectoryError> {
        let mut created = self
            .observe("applications.create", "-", ApplicationsClient::create(&self.inner, application))
            .await?;
        if self.strip_next_create_id.swap(false, Ordering::SeqCst) {
            created.id = None;
        }
        Ok(created)
    }

    async fn update(&self, id: &str, patch: ApplicationPatch) -> Result<(), DirectoryError> {
        self.app_patches.lock().push(patch.clone());
        self.observe("applications.update", id, async {
            if self.stale_reads.load(Ordering::SeqCst) > 0 {
                let before = ApplicationsClient::get(&self.inner, id).await.ok();
                *self.stale_snapshot.lock() = before;
            }
            ApplicationsClient::update(&self.inner, id, patch).await
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<(), DirectoryError> {
        self.observe("applications.delete", id, ApplicationsClient::delete(&self.inner, id))
            .await
    }

    async fn add_password(
        &self,
        id: &str,
        credential: PasswordCredential,
    ) -> Result<PasswordCredential, DirectoryError> {
        self.observe("applications.add_password", id, self.inner.add_password(id, credential))
            .await
    }

    async fn remove_password(&self, id: &str, key_id: &str) -> Result<(), DirectoryError> {
        self.observe("applications.remove_password", id, self.inner.remove_password(id, key_id))
            .await
    }

    async fn list_owners(&self, id: &str) -> Result<Vec<String>, DirectoryError> {
        self.observe("applications.list_owners", id, self.inner.list_owners(id))
            .await
    }

    async fn add_owners(&self, id: &str, owners: &[String]) -> Result<(), DirectoryError> {
        self.observe("applications.add_owners", id, self.inner.add_owners(id, owners))
            .await
    }

    async fn remove_owners(&self, id: &str, owners: &[String]) -> Result<(), DirectoryError> {
        self.observe("applications.remove_owners", id, self.inner.remove_owners(id, owners))
            .await
    }
}

#[async_trait]
impl UsersClient for RecordingDirectory {
    async fn get(&self, id: &str) -> Result<User, DirectoryError> {
        self.observe("users.get", id, UsersClient::get(&self.inner, id)).await
    }

    async fn list(&self, filter: &ODataFilter) -> Result<Vec<User>, DirectoryError> {
        self.observe("users.list", filter.value(), UsersClient::list(&self.inner, filter))
            .await
    }

    async fn create(&self, user: User) -> Result<User, DirectoryError> {
        self.observe("users.create", "-", UsersClient::create(&self.inner, user))
            .await
    }

    async fn update(&self, id: &str, patch: UserPatch) -> Result<(), DirectoryError> {
        self.observe("users.update", id, UsersClient::update(&self.inner, id, patch))
            .await
    }

    async fn delete(&self, id: &str) -> Result<(), DirectoryError> {
        self.observe("users.delete", id, UsersClient::delete(&self.inner, id))
            .await
    }
}

#[async_trait]
impl DomainsClient for RecordingDirectory {
    async fn list(&self) -> Result<Vec<Domain>, DirectoryError> {
        self.observe("domains.list", "-", DomainsClient::list(&self.inner))
            .await
    }
}

#[async_trait]
impl AccessPackageResourceRequestClient for RecordingDirectory {
    async fn get(&self, id: &str) -> Result<AccessPackageResourceRequest, DirectoryError> {
        self.observe(
            "requests.get",
            id,
            AccessPackageResourceRequestClient::get(&self.inner, id),
        )
        .await
    }

    async fn create(
        &self,
        request: AccessPackageResourceRequest,
        run_now: bool,
    ) -> Result<AccessPackageResourceRequest, DirectoryError> {
        self.observe(
            "requests.create",
            "-",
            AccessPackageResourceRequestClient::create(&self.inner, request, run_now),
        )
        .await
    }

    async fn delete(&self, request: &AccessPackageResourceRequest) -> Result<(), DirectoryError> {
        let id = request.id.clone().unwrap_or_default();
        self.observe(
            "requests.delete",
            &id,
            AccessPackageResourceRequestClient::delete(&self.inner, request),
        )
        .await
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Short deadlines and a fast poll so failing tests fail quickly.
pub fn test_config() -> ReconcilerConfig {
    ReconcilerConfig {
        tenant_id: "tenant-1".to_owned(),
        timeouts: OperationTimeouts::uniform(Duration::from_secs(10)),
        consistency_poll_interval: Duration::from_millis(5),
        ..ReconcilerConfig::default()
    }
}

pub fn reconciler(dir: &Arc<RecordingDirectory>) -> DirectoryReconciler {
    reconciler_with(dir, test_config())
}

pub fn reconciler_with(dir: &Arc<RecordingDirectory>, config: ReconcilerConfig) -> DirectoryReconciler {
    init_test_logging();
    DirectoryReconciler::new(DirectoryClients::from_backend(Arc::clone(dir)), config)
}

pub fn init_test_logging() {
    let _installed = init_logging(&LoggingConfig {
        level: "directory_reconciler=debug".to_owned(),
        json: false,
    });
}
