//! In-memory directory backend.
//!
//! Implements every client family over one process-local store. It enforces
//! the service rules the reconcilers depend on: enabled app roles and
//! permission scopes cannot be removed or re-valued, password secrets are
//! only returned once, and user principal names are unique.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use directory_reconciler_sdk::{
    AccessPackageResourceRequest, AccessPackageResourceRequestClient, AppRole, Application,
    ApplicationPatch, ApplicationsClient, DirectoryError, Domain, DomainsClient, ODataFilter,
    PasswordCredential, PermissionScope, User, UserPatch, UsersClient,
};
use http::StatusCode;
use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Store {
    applications: HashMap<String, StoredApplication>,
    users: HashMap<String, User>,
    domains: Vec<Domain>,
    requests: HashMap<String, AccessPackageResourceRequest>,
}

struct StoredApplication {
    application: Application,
    owners: BTreeSet<String>,
}

/// Process-local stand-in for the directory service.
#[derive(Default)]
pub struct InMemoryDirectory {
    store: Mutex<Store>,
}

fn bad_request(message: impl Into<String>) -> DirectoryError {
    DirectoryError::status(StatusCode::BAD_REQUEST, message)
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn unsupported_filter(filter: &ODataFilter) -> DirectoryError {
    bad_request(format!("unsupported filter property '{}'", filter.field()))
}

/// Enabled entries must be disabled before they are removed or re-valued.
fn check_enabled_entries<'a>(
    kind: &str,
    existing: impl IntoIterator<Item = (Uuid, bool, Option<&'a str>)>,
    replacement: &[(Uuid, Option<&str>)],
) -> Result<(), DirectoryError> {
    for (id, enabled, value) in existing {
        if !enabled {
            continue;
        }
        match replacement.iter().find(|(new_id, _)| *new_id == id) {
            None => {
                return Err(bad_request(format!(
                    "{kind} {id} must be disabled before it can be deleted"
                )));
            }
            Some((_, new_value)) if *new_value != value => {
                return Err(bad_request(format!(
                    "{kind} {id} must be disabled before its value can be changed"
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn check_roles(current: &[AppRole], next: &[AppRole]) -> Result<(), DirectoryError> {
    let replacement: Vec<(Uuid, Option<&str>)> = next.iter().map(|r| (r.id, r.value.as_deref())).collect();
    check_enabled_entries(
        "app role",
        current.iter().map(|r| (r.id, r.is_enabled, r.value.as_deref())),
        &replacement,
    )
}

fn check_scopes(current: &[PermissionScope], next: &[PermissionScope]) -> Result<(), DirectoryError> {
    let replacement: Vec<(Uuid, Option<&str>)> = next.iter().map(|s| (s.id, s.value.as_deref())).collect();
    check_enabled_entries(
        "permission scope",
        current.iter().map(|s| (s.id, s.is_enabled, s.value.as_deref())),
        &replacement,
    )
}

fn apply_application_patch(app: &mut Application, patch: ApplicationPatch) -> Result<(), DirectoryError> {
    if let Some(roles) = &patch.app_roles {
        check_roles(app.app_roles.as_deref().unwrap_or_default(), roles)?;
    }
    if let Some(api) = &patch.api {
        let current = app
            .api
            .as_ref()
            .map(|a| a.oauth2_permission_scopes.as_slice())
            .unwrap_or_default();
        check_scopes(current, &api.oauth2_permission_scopes)?;
    }

    if let Some(v) = patch.display_name {
        app.display_name = Some(v);
    }
    if let Some(v) = patch.api {
        app.api = Some(v);
    }
    if let Some(v) = patch.app_roles {
        app.app_roles = Some(v);
    }
    if let Some(v) = patch.is_fallback_public_client {
        app.is_fallback_public_client = Some(v);
    }
    if let Some(v) = patch.group_membership_claims {
        app.group_membership_claims = Some(v);
    }
    if let Some(v) = patch.identifier_uris {
        app.identifier_uris = Some(v);
    }
    if let Some(v) = patch.optional_claims {
        app.optional_claims = Some(v);
    }
    if let Some(v) = patch.required_resource_access {
        app.required_resource_access = Some(v);
    }
    if let Some(v) = patch.sign_in_audience {
        app.sign_in_audience = Some(v);
    }
    if let Some(v) = patch.web {
        app.web = Some(v);
    }
    Ok(())
}

fn apply_user_patch(user: &mut User, patch: UserPatch) {
    fn set(target: &mut Option<String>, change: Option<Option<String>>) {
        if let Some(value) = change {
            *target = value;
        }
    }

    if let Some(v) = patch.account_enabled {
        user.account_enabled = Some(v);
    }
    if let Some(v) = patch.display_name {
        user.display_name = Some(v);
    }
    if let Some(v) = patch.mail_nickname {
        user.mail_nickname = Some(v);
    }
    set(&mut user.city, patch.city);
    set(&mut user.company_name, patch.company_name);
    set(&mut user.country, patch.country);
    set(&mut user.department, patch.department);
    set(&mut user.given_name, patch.given_name);
    set(&mut user.job_title, patch.job_title);
    set(&mut user.mobile_phone, patch.mobile_phone);
    set(&mut user.office_location, patch.office_location);
    set(&mut user.postal_code, patch.postal_code);
    set(&mut user.state, patch.state);
    set(&mut user.street_address, patch.street_address);
    set(&mut user.surname, patch.surname);
    set(&mut user.usage_location, patch.usage_location);
    if let Some(v) = patch.on_premises_immutable_id {
        user.on_premises_immutable_id = Some(v);
    }
}

impl InMemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the tenant's domain list.
    #[must_use]
    pub fn with_domains(self, domains: Vec<Domain>) -> Self {
        self.store.lock().domains = domains;
        self
    }

    #[must_use]
    pub fn application_count(&self) -> usize {
        self.store.lock().applications.len()
    }

    #[must_use]
    pub fn user_count(&self) -> usize {
        self.store.lock().users.len()
    }

    fn not_found(kind: &str, id: &str) -> DirectoryError {
        DirectoryError::not_found(format!("{kind} '{id}' does not exist"))
    }
}

impl std::fmt::Debug for InMemoryDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.store.lock();
        f.debug_struct("InMemoryDirectory")
            .field("applications", &store.applications.len())
            .field("users", &store.users.len())
            .field("domains", &store.domains.len())
            .field("requests", &store.requests.len())
            .finish()
    }
}

// =============================================================================
// Applications
// =============================================================================

#[async_trait]
impl ApplicationsClient for InMemoryDirectory {
    async fn get(&self, id: &str) -> Result<Application, DirectoryError> {
        let store = self.store.lock();
        store
            .applications
            .get(id)
            .map(|s| s.application.clone())
            .ok_or_else(|| Self::not_found("application", id))
    }

    async fn list(&self, filter: &ODataFilter) -> Result<Vec<Application>, DirectoryError> {
        if filter.field() != "displayName" {
            return Err(unsupported_filter(filter));
        }
        let store = self.store.lock();
        Ok(store
            .applications
            .values()
            .filter(|s| s.application.display_name.as_deref() == Some(filter.value()))
            .map(|s| s.application.clone())
            .collect())
    }

    async fn create(&self, mut application: Application) -> Result<Application, DirectoryError> {
        if application.display_name.as_deref().is_none_or(str::is_empty) {
            return Err(bad_request("displayName is required"));
        }
        let id = new_id();
        application.id = Some(id.clone());
        application.app_id = Some(new_id());
        application.password_credentials = Some(Vec::new());

        self.store.lock().applications.insert(
            id,
            StoredApplication {
                application: application.clone(),
                owners: BTreeSet::new(),
            },
        );
        Ok(application)
    }

    async fn update(&self, id: &str, patch: ApplicationPatch) -> Result<(), DirectoryError> {
        let mut store = self.store.lock();
        let stored = store
            .applications
            .get_mut(id)
            .ok_or_else(|| Self::not_found("application", id))?;
        apply_application_patch(&mut stored.application, patch)
    }

    async fn delete(&self, id: &str) -> Result<(), DirectoryError> {
        self.store
            .lock()
            .applications
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found("application", id))
    }

    async fn add_password(
        &self,
        id: &str,
        credential: PasswordCredential,
    ) -> Result<PasswordCredential, DirectoryError> {
        let mut store = self.store.lock();
        let stored = store
            .applications
            .get_mut(id)
            .ok_or_else(|| Self::not_found("application", id))?;

        let secret = format!("{}~{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let stored_credential = PasswordCredential {
            key_id: Some(new_id()),
            hint: Some(secret.chars().take(3).collect()),
            secret_text: None,
            ..credential
        };
        stored
            .application
            .password_credentials
            .get_or_insert_with(Vec::new)
            .push(stored_credential.clone());

        Ok(PasswordCredential {
            secret_text: Some(secret),
            ..stored_credential
        })
    }

    async fn remove_password(&self, id: &str, key_id: &str) -> Result<(), DirectoryError> {
        let mut store = self.store.lock();
        let stored = store
            .applications
            .get_mut(id)
            .ok_or_else(|| Self::not_found("application", id))?;
        let credentials = stored.application.password_credentials.get_or_insert_with(Vec::new);
        let before = credentials.len();
        credentials.retain(|c| c.key_id.as_deref() != Some(key_id));
        if credentials.len() == before {
            return Err(Self::not_found("password credential", key_id));
        }
        Ok(())
    }

    async fn list_owners(&self, id: &str) -> Result<Vec<String>, DirectoryError> {
        let store = self.store.lock();
        store
            .applications
            .get(id)
            .map(|s| s.owners.iter().cloned().collect())
            .ok_or_else(|| Self::not_found("application", id))
    }

    async fn add_owners(&self, id: &str, owners: &[String]) -> Result<(), DirectoryError> {
        let mut store = self.store.lock();
        let stored = store
            .applications
            .get_mut(id)
            .ok_or_else(|| Self::not_found("application", id))?;
        if let Some(existing) = owners.iter().find(|o| stored.owners.contains(*o)) {
            return Err(bad_request(format!("owner '{existing}' already exists")));
        }
        stored.owners.extend(owners.iter().cloned());
        Ok(())
    }

    async fn remove_owners(&self, id: &str, owners: &[String]) -> Result<(), DirectoryError> {
        let mut store = self.store.lock();
        let stored = store
            .applications
            .get_mut(id)
            .ok_or_else(|| Self::not_found("application", id))?;
        if let Some(missing) = owners.iter().find(|o| !stored.owners.contains(*o)) {
            return Err(Self::not_found("owner", missing));
        }
        for owner in owners {
            stored.owners.remove(owner);
        }
        Ok(())
    }
}

// =============================================================================
// Users
// =============================================================================

#[async_trait]
impl UsersClient for InMemoryDirectory {
    async fn get(&self, id: &str) -> Result<User, DirectoryError> {
        self.store
            .lock()
            .users
            .get(id)
            .cloned()
            .ok_or_else(|| Self::not_found("user", id))
    }

    async fn list(&self, filter: &ODataFilter) -> Result<Vec<User>, DirectoryError> {
        let select: fn(&User) -> Option<&str> = match filter.field() {
            "userPrincipalName" => |u| u.user_principal_name.as_deref(),
            "mailNickname" => |u| u.mail_nickname.as_deref(),
            "displayName" => |u| u.display_name.as_deref(),
            _ => return Err(unsupported_filter(filter)),
        };
        let store = self.store.lock();
        Ok(store
            .users
            .values()
            .filter(|u| select(u) == Some(filter.value()))
            .cloned()
            .collect())
    }

    async fn create(&self, mut user: User) -> Result<User, DirectoryError> {
        let Some(upn) = user.user_principal_name.clone().filter(|u| !u.is_empty()) else {
            return Err(bad_request("userPrincipalName is required"));
        };
        if user
            .password_profile
            .as_ref()
            .and_then(|p| p.password.as_deref())
            .is_none_or(str::is_empty)
        {
            return Err(bad_request("passwordProfile.password is required"));
        }

        let mut store = self.store.lock();
        if store
            .users
            .values()
            .any(|u| u.user_principal_name.as_deref() == Some(upn.as_str()))
        {
            return Err(bad_request(format!("userPrincipalName '{upn}' is already in use")));
        }

        let id = new_id();
        user.id = Some(id.clone());
        user.password_profile = None;
        user.user_type = Some("Member".to_owned());
        store.users.insert(id, user.clone());
        Ok(user)
    }

    async fn update(&self, id: &str, patch: UserPatch) -> Result<(), DirectoryError> {
        let mut store = self.store.lock();
        let user = store.users.get_mut(id).ok_or_else(|| Self::not_found("user", id))?;
        apply_user_patch(user, patch);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), DirectoryError> {
        self.store
            .lock()
            .users
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found("user", id))
    }
}

// =============================================================================
// Domains and access package resource requests
// =============================================================================

#[async_trait]
impl DomainsClient for InMemoryDirectory {
    async fn list(&self) -> Result<Vec<Domain>, DirectoryError> {
        Ok(self.store.lock().domains.clone())
    }
}

#[async_trait]
impl AccessPackageResourceRequestClient for InMemoryDirectory {
    async fn get(&self, id: &str) -> Result<AccessPackageResourceRequest, DirectoryError> {
        self.store
            .lock()
            .requests
            .get(id)
            .cloned()
            .ok_or_else(|| Self::not_found("access package resource request", id))
    }

    async fn create(
        &self,
        mut request: AccessPackageResourceRequest,
        run_now: bool,
    ) -> Result<AccessPackageResourceRequest, DirectoryError> {
        if request.catalog_id.as_deref().is_none_or(str::is_empty) {
            return Err(bad_request("catalogId is required"));
        }
        let id = new_id();
        request.id = Some(id.clone());
        if run_now {
            request.request_state = Some("Delivered".to_owned());
            request.request_status = Some("Fulfilled".to_owned());
        } else {
            request.request_state = Some("Submitted".to_owned());
            request.request_status = Some("Accepted".to_owned());
        }
        self.store.lock().requests.insert(id, request.clone());
        Ok(request)
    }

    async fn delete(&self, request: &AccessPackageResourceRequest) -> Result<(), DirectoryError> {
        let id = request.id.as_deref().unwrap_or_default();
        self.store
            .lock()
            .requests
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found("access package resource request", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use directory_reconciler_sdk::{AppRoleAllowedMemberType, PasswordProfile};

    fn role(n: u128, enabled: bool, value: &str) -> AppRole {
        AppRole {
            id: Uuid::from_u128(n),
            allowed_member_types: vec![AppRoleAllowedMemberType::User],
            description: None,
            display_name: None,
            is_enabled: enabled,
            value: Some(value.to_owned()),
        }
    }

    async fn app_with_roles(dir: &InMemoryDirectory, roles: Vec<AppRole>) -> String {
        let app = ApplicationsClient::create(
            dir,
            Application {
                display_name: Some("app".to_owned()),
                app_roles: Some(roles),
                ..Application::default()
            },
        )
        .await
        .unwrap();
        app.id.unwrap()
    }

    #[tokio::test]
    async fn test_enabled_role_cannot_be_removed() {
        let dir = InMemoryDirectory::new();
        let id = app_with_roles(&dir, vec![role(1, true, "read")]).await;

        let remove = ApplicationPatch {
            app_roles: Some(Vec::new()),
            ..ApplicationPatch::default()
        };
        let err = ApplicationsClient::update(&dir, &id, remove.clone()).await.unwrap_err();
        assert_eq!(err.http_status(), Some(StatusCode::BAD_REQUEST));

        let disable = ApplicationPatch {
            app_roles: Some(vec![role(1, false, "read")]),
            ..ApplicationPatch::default()
        };
        ApplicationsClient::update(&dir, &id, disable).await.unwrap();
        ApplicationsClient::update(&dir, &id, remove).await.unwrap();
    }

    #[tokio::test]
    async fn test_password_secret_returned_once() {
        let dir = InMemoryDirectory::new();
        let id = app_with_roles(&dir, Vec::new()).await;

        let added = dir.add_password(&id, PasswordCredential::default()).await.unwrap();
        assert!(added.secret_text.is_some());
        let key_id = added.key_id.unwrap();

        let app = ApplicationsClient::get(&dir, &id).await.unwrap();
        let stored = &app.password_credentials.unwrap()[0];
        assert_eq!(stored.key_id.as_deref(), Some(key_id.as_str()));
        assert!(stored.secret_text.is_none());

        dir.remove_password(&id, &key_id).await.unwrap();
        assert!(dir.remove_password(&id, &key_id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_user_upn_is_unique_and_password_not_stored() {
        let dir = InMemoryDirectory::new();
        let user = User {
            user_principal_name: Some("alice@contoso.com".to_owned()),
            password_profile: Some(PasswordProfile {
                force_change_password_next_sign_in: false,
                password: Some("pw".to_owned()),
            }),
            ..User::default()
        };

        let created = UsersClient::create(&dir, user.clone()).await.unwrap();
        assert!(created.password_profile.is_none());
        assert_eq!(created.user_type.as_deref(), Some("Member"));
        assert!(UsersClient::create(&dir, user).await.is_err());

        let filter = ODataFilter::eq("userPrincipalName", "alice@contoso.com");
        assert_eq!(UsersClient::list(&dir, &filter).await.unwrap().len(), 1);
        let bogus = ODataFilter::eq("jobTitle", "x");
        assert!(UsersClient::list(&dir, &bogus).await.is_err());
    }
}
