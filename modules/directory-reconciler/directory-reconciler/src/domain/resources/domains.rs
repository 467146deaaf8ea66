//! Read-only view of the tenant's domains.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use directory_reconciler_sdk::{Domain, DomainsClient};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::domain::engine::{EngineSettings, OperationContext};
use crate::domain::error::{Operation, ReconcileError};

pub const RESOURCE_TYPE: &str = "domains";

/// Restricts the result to one kind of domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainKind {
    Default,
    Initial,
    Root,
}

/// Filters applied to the domain list. A domain that does not report a
/// property is never excluded by a filter on that property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainsQuery {
    pub admin_managed: bool,
    pub include_unverified: bool,
    pub only: Option<DomainKind>,
    /// Every listed service must be supported.
    pub supports_services: Vec<String>,
}

impl DomainsQuery {
    /// # Errors
    ///
    /// Default and initial domains are always verified, so asking for
    /// unverified ones together with either is rejected.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.include_unverified && matches!(self.only, Some(DomainKind::Default | DomainKind::Initial)) {
            return Err(ReconcileError::validation(
                "include_unverified",
                "cannot be combined with only_default or only_initial",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn matches(&self, domain: &Domain) -> bool {
        let excluded_by = |flag: Option<bool>| flag == Some(false);

        if self.admin_managed && excluded_by(domain.is_admin_managed) {
            return false;
        }
        let kind_flag = match self.only {
            Some(DomainKind::Default) => domain.is_default,
            Some(DomainKind::Initial) => domain.is_initial,
            Some(DomainKind::Root) => domain.is_root,
            None => None,
        };
        if excluded_by(kind_flag) {
            return false;
        }
        if !self.include_unverified && excluded_by(domain.is_verified) {
            return false;
        }
        if let Some(supported) = &domain.supported_services
            && !self.supports_services.iter().all(|s| supported.contains(s))
        {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainInfo {
    pub domain_name: String,
    pub authentication_type: Option<String>,
    pub admin_managed: Option<bool>,
    pub default: Option<bool>,
    pub initial: Option<bool>,
    pub root: Option<bool>,
    pub verified: Option<bool>,
    pub supported_services: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainsResult {
    /// Stable for a given tenant and set of domain names.
    pub id: String,
    pub domains: Vec<DomainInfo>,
}

/// `domains#{tenant}#{base64url(sha1(names joined by "/"))}`.
#[must_use]
pub fn domains_id(tenant_id: &str, names: &[&str]) -> String {
    let digest = Sha1::digest(names.join("/").as_bytes());
    format!("domains#{tenant_id}#{}", URL_SAFE.encode(digest))
}

pub struct DomainsDataSource {
    client: Arc<dyn DomainsClient>,
    tenant_id: String,
    settings: EngineSettings,
}

impl DomainsDataSource {
    #[must_use]
    pub fn new(
        client: Arc<dyn DomainsClient>,
        tenant_id: impl Into<String>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            client,
            tenant_id: tenant_id.into(),
            settings,
        }
    }

    /// Lists the domains matching `query`.
    ///
    /// # Errors
    ///
    /// `Validation` for conflicting filters or when nothing matches,
    /// `Remote`/`Timeout` from the service.
    #[tracing::instrument(skip_all, fields(resource = RESOURCE_TYPE))]
    pub async fn read(&self, query: &DomainsQuery) -> Result<DomainsResult, ReconcileError> {
        let ctx = OperationContext::read_only(Operation::Read, RESOURCE_TYPE, &self.settings);
        query.validate().map_err(|e| ctx.error(e))?;

        let all = ctx.call(self.client.list()).await?;
        let domains: Vec<DomainInfo> = all
            .into_iter()
            .filter(|d| query.matches(d))
            .filter_map(|d| {
                Some(DomainInfo {
                    domain_name: d.id?,
                    authentication_type: d.authentication_type,
                    admin_managed: d.is_admin_managed,
                    default: d.is_default,
                    initial: d.is_initial,
                    root: d.is_root,
                    verified: d.is_verified,
                    supported_services: d.supported_services.unwrap_or_default(),
                })
            })
            .collect();

        if domains.is_empty() {
            return Err(ctx.error(ReconcileError::validation(
                "filters",
                "no domains found for the provided filters",
            )));
        }

        let names: Vec<&str> = domains.iter().map(|d| d.domain_name.as_str()).collect();
        let id = domains_id(&self.tenant_id, &names);
        tracing::debug!(count = domains.len(), id = %id, "listed domains");
        Ok(DomainsResult { id, domains })
    }
}

impl std::fmt::Debug for DomainsDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainsDataSource")
            .field("tenant_id", &self.tenant_id)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
