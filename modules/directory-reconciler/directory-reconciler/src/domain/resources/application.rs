//! Application registrations.
//!
//! Besides the primary object this adapter reconciles two kinds of
//! sub-collections under the application's name lock:
//!
//! - owners, by set difference against the service
//! - app roles and OAuth2 permission scopes, which the service refuses to
//!   remove while they are enabled; stale entries are disabled first and the
//!   removal is sent once the service reports them disabled

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use directory_reconciler_sdk::{
    AppRole, AppRoleAllowedMemberType, Application, ApplicationApi, ApplicationPatch, ImplicitGrantSettings,
    ApplicationsClient, GroupMembershipClaim, ODataFilter, OptionalClaims, PermissionScope,
    PermissionScopeType, RequiredResourceAccess, SignInAudience, WebApplication,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::engine::{Created, OperationContext, ResourceAdapter};
use crate::domain::error::ReconcileError;
use crate::domain::ids::ObjectId;
use crate::domain::state::ResourceState;
use crate::domain::validate;

pub const RESOURCE_TYPE: &str = "application";

// =============================================================================
// Desired state and record
// =============================================================================

/// Role that can be granted to users or applications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRoleSpec {
    pub id: Uuid,
    pub allowed_member_types: BTreeSet<AppRoleAllowedMemberType>,
    pub description: String,
    pub display_name: String,
    pub enabled: bool,
    pub value: Option<String>,
}

/// Delegated permission exposed by the application's API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionScopeSpec {
    pub id: Uuid,
    pub admin_consent_description: String,
    pub admin_consent_display_name: String,
    pub enabled: bool,
    pub scope_type: PermissionScopeType,
    pub user_consent_description: Option<String>,
    pub user_consent_display_name: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationSpec {
    pub display_name: String,
    pub oauth2_permission_scopes: Vec<PermissionScopeSpec>,
    pub app_roles: Vec<AppRoleSpec>,
    pub fallback_public_client_enabled: bool,
    pub group_membership_claims: BTreeSet<GroupMembershipClaim>,
    pub identifier_uris: Vec<String>,
    pub optional_claims: Option<OptionalClaims>,
    /// Object IDs of owning users or service principals.
    pub owners: BTreeSet<String>,
    pub required_resource_access: Vec<RequiredResourceAccess>,
    pub sign_in_audience: SignInAudience,
    pub web: Option<WebApplication>,
    /// Refuse to create or rename into a display name that is already taken.
    pub prevent_duplicate_names: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationRecord {
    pub object_id: String,
    pub application_id: String,
    pub display_name: String,
    pub oauth2_permission_scopes: Vec<PermissionScopeSpec>,
    pub app_roles: Vec<AppRoleSpec>,
    pub fallback_public_client_enabled: bool,
    pub group_membership_claims: BTreeSet<GroupMembershipClaim>,
    pub identifier_uris: Vec<String>,
    pub optional_claims: Option<OptionalClaims>,
    pub owners: BTreeSet<String>,
    pub required_resource_access: Vec<RequiredResourceAccess>,
    pub sign_in_audience: SignInAudience,
    pub web: Option<WebApplication>,
}

// =============================================================================
// Wire mapping
// =============================================================================

#[must_use]
pub fn expand_app_role(role: &AppRoleSpec) -> AppRole {
    AppRole {
        id: role.id,
        allowed_member_types: role.allowed_member_types.iter().copied().collect(),
        description: Some(role.description.clone()),
        display_name: Some(role.display_name.clone()),
        is_enabled: role.enabled,
        value: role.value.clone(),
    }
}

#[must_use]
pub fn flatten_app_role(role: &AppRole) -> AppRoleSpec {
    AppRoleSpec {
        id: role.id,
        allowed_member_types: role.allowed_member_types.iter().copied().collect(),
        description: role.description.clone().unwrap_or_default(),
        display_name: role.display_name.clone().unwrap_or_default(),
        enabled: role.is_enabled,
        value: role.value.clone(),
    }
}

#[must_use]
pub fn expand_permission_scope(scope: &PermissionScopeSpec) -> PermissionScope {
    PermissionScope {
        id: scope.id,
        admin_consent_description: Some(scope.admin_consent_description.clone()),
        admin_consent_display_name: Some(scope.admin_consent_display_name.clone()),
        is_enabled: scope.enabled,
        scope_type: Some(scope.scope_type),
        user_consent_description: scope.user_consent_description.clone(),
        user_consent_display_name: scope.user_consent_display_name.clone(),
        value: scope.value.clone(),
    }
}

#[must_use]
pub fn flatten_permission_scope(scope: &PermissionScope) -> PermissionScopeSpec {
    PermissionScopeSpec {
        id: scope.id,
        admin_consent_description: scope.admin_consent_description.clone().unwrap_or_default(),
        admin_consent_display_name: scope.admin_consent_display_name.clone().unwrap_or_default(),
        enabled: scope.is_enabled,
        scope_type: scope.scope_type.unwrap_or(PermissionScopeType::User),
        user_consent_description: scope.user_consent_description.clone(),
        user_consent_display_name: scope.user_consent_display_name.clone(),
        value: scope.value.clone(),
    }
}

fn sorted_roles(roles: &[AppRoleSpec]) -> Vec<AppRoleSpec> {
    let mut roles = roles.to_vec();
    roles.sort_by_key(|r| r.id);
    roles
}

fn sorted_scopes(scopes: &[PermissionScopeSpec]) -> Vec<PermissionScopeSpec> {
    let mut scopes = scopes.to_vec();
    scopes.sort_by_key(|s| s.id);
    scopes
}

fn sorted_resource_access(input: &[RequiredResourceAccess]) -> Vec<RequiredResourceAccess> {
    let mut out = input.to_vec();
    for entry in &mut out {
        entry.resource_access.sort_by_key(|a| a.id);
    }
    out.sort_by(|a, b| a.resource_app_id.cmp(&b.resource_app_id));
    out
}

/// Treats an all-default web block as absent, which is how the service
/// reports an application that never configured one.
fn normalized_web(web: Option<&WebApplication>) -> Option<WebApplication> {
    let mut web = web?.clone();
    if web.implicit_grant_settings == Some(ImplicitGrantSettings::default()) {
        web.implicit_grant_settings = None;
    }
    (web != WebApplication::default()).then_some(web)
}

fn normalized_claims(claims: Option<&OptionalClaims>) -> Option<OptionalClaims> {
    claims.filter(|c| **c != OptionalClaims::default()).cloned()
}

/// Wire record for creating an application from `spec`. Owners are written
/// separately.
#[must_use]
pub fn expand_application(spec: &ApplicationSpec) -> Application {
    Application {
        display_name: Some(spec.display_name.clone()),
        api: Some(ApplicationApi {
            oauth2_permission_scopes: sorted_scopes(&spec.oauth2_permission_scopes)
                .iter()
                .map(expand_permission_scope)
                .collect(),
        }),
        app_roles: Some(sorted_roles(&spec.app_roles).iter().map(expand_app_role).collect()),
        is_fallback_public_client: Some(spec.fallback_public_client_enabled),
        group_membership_claims: Some(spec.group_membership_claims.iter().copied().collect()),
        identifier_uris: Some(spec.identifier_uris.clone()),
        optional_claims: normalized_claims(spec.optional_claims.as_ref()),
        required_resource_access: Some(sorted_resource_access(&spec.required_resource_access)),
        sign_in_audience: Some(spec.sign_in_audience),
        web: normalized_web(spec.web.as_ref()),
        ..Application::default()
    }
}

/// Typed snapshot of a wire record plus its owners.
#[must_use]
pub fn flatten_application(app: &Application, owners: Vec<String>) -> ApplicationRecord {
    let app_roles: Vec<AppRoleSpec> = app
        .app_roles
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(flatten_app_role)
        .collect();
    let scopes: Vec<PermissionScopeSpec> = app
        .api
        .as_ref()
        .map(|api| api.oauth2_permission_scopes.iter().map(flatten_permission_scope).collect())
        .unwrap_or_default();

    ApplicationRecord {
        object_id: app.id.clone().unwrap_or_default(),
        application_id: app.app_id.clone().unwrap_or_default(),
        display_name: app.display_name.clone().unwrap_or_default(),
        oauth2_permission_scopes: sorted_scopes(&scopes),
        app_roles: sorted_roles(&app_roles),
        fallback_public_client_enabled: app.is_fallback_public_client.unwrap_or(false),
        group_membership_claims: app
            .group_membership_claims
            .iter()
            .flatten()
            .copied()
            .collect(),
        identifier_uris: app.identifier_uris.clone().unwrap_or_default(),
        optional_claims: normalized_claims(app.optional_claims.as_ref()),
        owners: owners.into_iter().collect(),
        required_resource_access: sorted_resource_access(
            app.required_resource_access.as_deref().unwrap_or_default(),
        ),
        sign_in_audience: app.sign_in_audience.unwrap_or_default(),
        web: normalized_web(app.web.as_ref()),
    }
}

/// Minimal patch moving `record` to `desired`. Owners are not part of it.
#[must_use]
pub fn patch_for(record: &ApplicationRecord, desired: &ApplicationSpec) -> ApplicationPatch {
    let roles = sorted_roles(&desired.app_roles);
    let scopes = sorted_scopes(&desired.oauth2_permission_scopes);
    let resource_access = sorted_resource_access(&desired.required_resource_access);
    let web = normalized_web(desired.web.as_ref());
    let claims = normalized_claims(desired.optional_claims.as_ref());

    ApplicationPatch {
        display_name: (record.display_name != desired.display_name)
            .then(|| desired.display_name.clone()),
        api: (record.oauth2_permission_scopes != scopes).then(|| ApplicationApi {
            oauth2_permission_scopes: scopes.iter().map(expand_permission_scope).collect(),
        }),
        app_roles: (record.app_roles != roles).then(|| roles.iter().map(expand_app_role).collect()),
        is_fallback_public_client: (record.fallback_public_client_enabled
            != desired.fallback_public_client_enabled)
            .then_some(desired.fallback_public_client_enabled),
        group_membership_claims: (record.group_membership_claims != desired.group_membership_claims)
            .then(|| desired.group_membership_claims.iter().copied().collect()),
        identifier_uris: (record.identifier_uris != desired.identifier_uris)
            .then(|| desired.identifier_uris.clone()),
        optional_claims: (record.optional_claims != claims).then(|| claims.unwrap_or_default()),
        required_resource_access: (record.required_resource_access != resource_access)
            .then_some(resource_access),
        sign_in_audience: (record.sign_in_audience != desired.sign_in_audience)
            .then_some(desired.sign_in_audience),
        web: (record.web != web).then(|| web.unwrap_or_default()),
    }
}

/// Remote roles that are enabled but about to be removed or re-valued.
#[must_use]
pub fn stale_app_roles(remote: &[AppRole], desired: &[AppRoleSpec]) -> Vec<Uuid> {
    remote
        .iter()
        .filter(|r| r.is_enabled && !desired.iter().any(|d| d.id == r.id && d.value == r.value))
        .map(|r| r.id)
        .collect()
}

/// Remote scopes that are enabled but about to be removed or re-valued.
#[must_use]
pub fn stale_permission_scopes(remote: &[PermissionScope], desired: &[PermissionScopeSpec]) -> Vec<Uuid> {
    remote
        .iter()
        .filter(|s| s.is_enabled && !desired.iter().any(|d| d.id == s.id && d.value == s.value))
        .map(|s| s.id)
        .collect()
}

fn remote_scopes(app: &Application) -> Vec<PermissionScope> {
    app.api
        .as_ref()
        .map(|api| api.oauth2_permission_scopes.clone())
        .unwrap_or_default()
}

fn any_still_enabled(app: &Application, roles: &[Uuid], scopes: &[Uuid]) -> bool {
    let role_enabled = app
        .app_roles
        .iter()
        .flatten()
        .any(|r| r.is_enabled && roles.contains(&r.id));
    let scope_enabled = remote_scopes(app)
        .iter()
        .any(|s| s.is_enabled && scopes.contains(&s.id));
    role_enabled || scope_enabled
}

// =============================================================================
// Adapter
// =============================================================================

#[derive(Clone)]
pub struct ApplicationAdapter {
    client: Arc<dyn ApplicationsClient>,
}

impl ApplicationAdapter {
    #[must_use]
    pub fn new(client: Arc<dyn ApplicationsClient>) -> Self {
        Self { client }
    }

    /// Adds missing owners and removes extra ones. Callers hold the
    /// application's name lock.
    async fn sync_owners(
        &self,
        ctx: &OperationContext,
        id: &str,
        desired: &BTreeSet<String>,
    ) -> Result<(), ReconcileError> {
        let current: BTreeSet<String> = ctx
            .call(self.client.list_owners(id))
            .await
            .map_err(|e| e.with_field("owners"))?
            .into_iter()
            .collect();

        let to_add: Vec<String> = desired.difference(&current).cloned().collect();
        let to_remove: Vec<String> = current.difference(desired).cloned().collect();

        if !to_add.is_empty() {
            tracing::debug!(application = id, count = to_add.len(), "adding owners");
            ctx.call(self.client.add_owners(id, &to_add))
                .await
                .map_err(|e| e.with_field("owners"))?;
        }
        if !to_remove.is_empty() {
            tracing::debug!(application = id, count = to_remove.len(), "removing owners");
            ctx.call(self.client.remove_owners(id, &to_remove))
                .await
                .map_err(|e| e.with_field("owners"))?;
        }
        Ok(())
    }

    /// Disables enabled roles and scopes that `desired` drops or re-values,
    /// then waits until the service reports them disabled. Returns whether
    /// anything was disabled. Callers hold the application's name lock.
    async fn disable_stale_entries(
        &self,
        ctx: &OperationContext,
        id: &str,
        desired: &ApplicationSpec,
    ) -> Result<bool, ReconcileError> {
        let remote = ctx.call(self.client.get(id)).await?;
        let roles = remote.app_roles.clone().unwrap_or_default();
        let scopes = remote_scopes(&remote);

        let stale_roles = stale_app_roles(&roles, &desired.app_roles);
        let stale_scopes = stale_permission_scopes(&scopes, &desired.oauth2_permission_scopes);
        if stale_roles.is_empty() && stale_scopes.is_empty() {
            return Ok(false);
        }

        tracing::debug!(
            application = id,
            roles = stale_roles.len(),
            scopes = stale_scopes.len(),
            "disabling app roles and permission scopes before removal"
        );

        let patch = ApplicationPatch {
            app_roles: (!stale_roles.is_empty()).then(|| {
                roles
                    .into_iter()
                    .map(|mut r| {
                        if stale_roles.contains(&r.id) {
                            r.is_enabled = false;
                        }
                        r
                    })
                    .collect()
            }),
            api: (!stale_scopes.is_empty()).then(|| ApplicationApi {
                oauth2_permission_scopes: scopes
                    .into_iter()
                    .map(|mut s| {
                        if stale_scopes.contains(&s.id) {
                            s.is_enabled = false;
                        }
                        s
                    })
                    .collect(),
            }),
            ..ApplicationPatch::default()
        };
        ctx.call(self.client.update(id, patch)).await?;

        loop {
            let app = ctx.call(self.client.get(id)).await?;
            if !any_still_enabled(&app, &stale_roles, &stale_scopes) {
                return Ok(true);
            }
            ctx.pause().await?;
        }
    }
}

#[async_trait]
impl ResourceAdapter for ApplicationAdapter {
    const RESOURCE_TYPE: &'static str = RESOURCE_TYPE;

    type Id = ObjectId;
    type Desired = ApplicationSpec;
    type Record = ApplicationRecord;

    fn validate(&self, desired: &ApplicationSpec) -> Result<(), ReconcileError> {
        validate::non_empty("display_name", &desired.display_name)?;

        for role in &desired.app_roles {
            if role.allowed_member_types.is_empty() {
                return Err(ReconcileError::validation(
                    "app_role.allowed_member_types",
                    format!("app role {} must allow at least one member type", role.id),
                ));
            }
            validate::non_empty("app_role.description", &role.description)?;
            validate::non_empty("app_role.display_name", &role.display_name)?;
            if let Some(value) = &role.value {
                validate::claim_value("app_role.value", value)?;
            }
        }
        validate::unique_entries(
            "app_role",
            desired.app_roles.iter().map(|r| (r.id, r.value.as_deref())),
        )?;

        for scope in &desired.oauth2_permission_scopes {
            validate::non_empty(
                "oauth2_permission_scope.admin_consent_display_name",
                &scope.admin_consent_display_name,
            )?;
            validate::non_empty(
                "oauth2_permission_scope.admin_consent_description",
                &scope.admin_consent_description,
            )?;
            if let Some(value) = &scope.value {
                validate::claim_value("oauth2_permission_scope.value", value)?;
            }
        }
        validate::unique_entries(
            "oauth2_permission_scope",
            desired
                .oauth2_permission_scopes
                .iter()
                .map(|s| (s.id, s.value.as_deref())),
        )?;

        for owner in &desired.owners {
            validate::uuid("owners", owner)?;
        }
        Ok(())
    }

    fn display_name<'a>(&self, desired: &'a ApplicationSpec) -> Option<&'a str> {
        Some(&desired.display_name)
    }

    fn prevent_duplicate_names(&self, desired: &ApplicationSpec) -> bool {
        desired.prevent_duplicate_names
    }

    async fn find_by_display_name(
        &self,
        ctx: &OperationContext,
        name: &str,
    ) -> Result<Vec<String>, ReconcileError> {
        let filter = ODataFilter::eq("displayName", name);
        let found = ctx.call(self.client.list(&filter)).await?;
        Ok(found.into_iter().map(|app| app.id.unwrap_or_default()).collect())
    }

    async fn create(
        &self,
        ctx: &OperationContext,
        desired: &ApplicationSpec,
    ) -> Result<Created, ReconcileError> {
        let app = ctx.call(self.client.create(expand_application(desired))).await?;
        Ok(Created::new(app.id.unwrap_or_default()))
    }

    async fn after_create(
        &self,
        ctx: &OperationContext,
        id: &ObjectId,
        desired: &ApplicationSpec,
    ) -> Result<(), ReconcileError> {
        if desired.owners.is_empty() {
            return Ok(());
        }
        ctx.locked(
            RESOURCE_TYPE,
            id.as_str(),
            self.sync_owners(ctx, id.as_str(), &desired.owners),
        )
        .await
    }

    async fn read(
        &self,
        ctx: &OperationContext,
        id: &ObjectId,
    ) -> Result<Option<ApplicationRecord>, ReconcileError> {
        let Some(app) = ctx.call_opt(self.client.get(id.as_str())).await? else {
            return Ok(None);
        };
        let Some(owners) = ctx
            .call_opt(self.client.list_owners(id.as_str()))
            .await
            .map_err(|e| e.with_field("owners"))?
        else {
            return Ok(None);
        };
        Ok(Some(flatten_application(&app, owners)))
    }

    async fn update(
        &self,
        ctx: &OperationContext,
        current: &ResourceState<ObjectId, ApplicationRecord>,
        desired: &ApplicationSpec,
    ) -> Result<Option<SecretString>, ReconcileError> {
        let id = current.id.as_str();
        ctx.locked(RESOURCE_TYPE, id, async {
            let disabled = self
                .disable_stale_entries(ctx, id, desired)
                .await
                .map_err(|e| e.with_field("app_role"))?;

            let mut patch = patch_for(&current.record, desired);
            if disabled {
                // the disable step rewrote both collections remotely
                patch.app_roles = Some(sorted_roles(&desired.app_roles).iter().map(expand_app_role).collect());
                patch.api = Some(ApplicationApi {
                    oauth2_permission_scopes: sorted_scopes(&desired.oauth2_permission_scopes)
                        .iter()
                        .map(expand_permission_scope)
                        .collect(),
                });
            }
            if !patch.is_empty() {
                ctx.call(self.client.update(id, patch)).await?;
            }

            self.sync_owners(ctx, id, &desired.owners).await
        })
        .await?;
        Ok(None)
    }

    async fn delete(
        &self,
        ctx: &OperationContext,
        id: &ObjectId,
        _current: &ApplicationRecord,
    ) -> Result<(), ReconcileError> {
        ctx.call(self.client.delete(id.as_str())).await
    }
}
