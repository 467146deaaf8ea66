//! Directory client traits.
//!
//! These traits are the only way the reconciler talks to the directory
//! service. Implementations own transport concerns (authentication, retry,
//! pagination); every primitive is a single logical call that either succeeds
//! or fails with a final [`DirectoryError`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DirectoryError;
use crate::models::{
    AccessPackageResourceRequest, Application, ApplicationPatch, Domain, PasswordCredential, User,
    UserPatch,
};
use crate::odata::ODataFilter;

/// Application registrations and their owned sub-collections.
#[async_trait]
pub trait ApplicationsClient: Send + Sync {
    /// Fetch one application by object ID.
    ///
    /// # Errors
    ///
    /// * `404` - If no application with the given object ID exists
    async fn get(&self, id: &str) -> Result<Application, DirectoryError>;

    /// List applications matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns the service error if the query fails.
    async fn list(&self, filter: &ODataFilter) -> Result<Vec<Application>, DirectoryError>;

    /// Create an application and return the stored record, including the
    /// service-assigned `id` and `app_id`.
    ///
    /// # Errors
    ///
    /// Returns the service error if the application is rejected.
    async fn create(&self, application: Application) -> Result<Application, DirectoryError>;

    /// Apply a partial update. Fields absent from the patch are left untouched.
    ///
    /// # Errors
    ///
    /// * `404` - If the application does not exist
    async fn update(&self, id: &str, patch: ApplicationPatch) -> Result<(), DirectoryError>;

    /// Delete an application.
    ///
    /// # Errors
    ///
    /// * `404` - If the application does not exist
    async fn delete(&self, id: &str) -> Result<(), DirectoryError>;

    /// Add a password credential. The returned credential carries the
    /// generated `key_id` and, this one time only, the `secret_text`.
    ///
    /// # Errors
    ///
    /// * `404` - If the application does not exist
    async fn add_password(
        &self,
        id: &str,
        credential: PasswordCredential,
    ) -> Result<PasswordCredential, DirectoryError>;

    /// Remove a password credential by key ID.
    ///
    /// # Errors
    ///
    /// * `404` - If the application or the credential does not exist
    async fn remove_password(&self, id: &str, key_id: &str) -> Result<(), DirectoryError>;

    /// Object IDs of the application's owners.
    ///
    /// # Errors
    ///
    /// * `404` - If the application does not exist
    async fn list_owners(&self, id: &str) -> Result<Vec<String>, DirectoryError>;

    /// Add owners by object ID.
    ///
    /// # Errors
    ///
    /// * `404` - If the application does not exist
    async fn add_owners(&self, id: &str, owners: &[String]) -> Result<(), DirectoryError>;

    /// Remove owners by object ID.
    ///
    /// # Errors
    ///
    /// * `404` - If the application does not exist
    async fn remove_owners(&self, id: &str, owners: &[String]) -> Result<(), DirectoryError>;
}

/// User accounts.
#[async_trait]
pub trait UsersClient: Send + Sync {
    /// Fetch one user by object ID.
    ///
    /// # Errors
    ///
    /// * `404` - If no user with the given object ID exists
    async fn get(&self, id: &str) -> Result<User, DirectoryError>;

    /// List users matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns the service error if the query fails.
    async fn list(&self, filter: &ODataFilter) -> Result<Vec<User>, DirectoryError>;

    /// Create a user and return the stored record.
    ///
    /// # Errors
    ///
    /// Returns the service error if the user is rejected (e.g. UPN taken).
    async fn create(&self, user: User) -> Result<User, DirectoryError>;

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// * `404` - If the user does not exist
    async fn update(&self, id: &str, patch: UserPatch) -> Result<(), DirectoryError>;

    /// Delete a user.
    ///
    /// # Errors
    ///
    /// * `404` - If the user does not exist
    async fn delete(&self, id: &str) -> Result<(), DirectoryError>;
}

/// Tenant domains. Read-only.
#[async_trait]
pub trait DomainsClient: Send + Sync {
    /// All domains registered with the tenant.
    ///
    /// # Errors
    ///
    /// Returns the service error if the query fails.
    async fn list(&self) -> Result<Vec<Domain>, DirectoryError>;
}

/// Identity-governance catalog resource requests.
#[async_trait]
pub trait AccessPackageResourceRequestClient: Send + Sync {
    /// Fetch one request by ID.
    ///
    /// # Errors
    ///
    /// * `404` - If no request with the given ID exists
    async fn get(&self, id: &str) -> Result<AccessPackageResourceRequest, DirectoryError>;

    /// Submit a request. With `run_now` the service processes it immediately
    /// instead of queueing it.
    ///
    /// # Errors
    ///
    /// Returns the service error if the request is rejected.
    async fn create(
        &self,
        request: AccessPackageResourceRequest,
        run_now: bool,
    ) -> Result<AccessPackageResourceRequest, DirectoryError>;

    /// Withdraw the resource the given request added to its catalog.
    ///
    /// # Errors
    ///
    /// * `404` - If the request or its resource no longer exists
    async fn delete(&self, request: &AccessPackageResourceRequest) -> Result<(), DirectoryError>;
}

/// One handle per client family, shared by every reconciler.
#[derive(Clone)]
pub struct DirectoryClients {
    pub applications: Arc<dyn ApplicationsClient>,
    pub users: Arc<dyn UsersClient>,
    pub domains: Arc<dyn DomainsClient>,
    pub access_package_resource_requests: Arc<dyn AccessPackageResourceRequestClient>,
}

impl DirectoryClients {
    /// Uses a single backend for every client family.
    #[must_use]
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ApplicationsClient
            + UsersClient
            + DomainsClient
            + AccessPackageResourceRequestClient
            + 'static,
    {
        Self {
            applications: backend.clone(),
            users: backend.clone(),
            domains: backend.clone(),
            access_package_resource_requests: backend,
        }
    }
}

impl std::fmt::Debug for DirectoryClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryClients").finish_non_exhaustive()
    }
}
