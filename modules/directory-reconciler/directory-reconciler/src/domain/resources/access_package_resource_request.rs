//! Requests that add a resource to an identity-governance catalog.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use directory_reconciler_sdk::{
    AccessPackageResource, AccessPackageResourceOriginSystem, AccessPackageResourceRequest,
    AccessPackageResourceRequestClient, AccessPackageResourceRequestType, AccessPackageResourceType,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::domain::engine::{Created, OperationContext, ResourceAdapter};
use crate::domain::error::ReconcileError;
use crate::domain::ids::ObjectId;
use crate::domain::state::ResourceState;
use crate::domain::validate;

pub const RESOURCE_TYPE: &str = "access_package_resource_request";

/// Resource to onboard into the catalog. Only sent on create, so the record
/// keeps the value it was created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPackageResourceSpec {
    pub origin_id: String,
    pub origin_system: AccessPackageResourceOriginSystem,
    pub description: Option<String>,
    pub display_name: Option<String>,
    pub is_pending_onboarding: bool,
    pub resource_type: Option<AccessPackageResourceType>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPackageResourceRequestSpec {
    pub catalog_id: String,
    pub request_type: AccessPackageResourceRequestType,
    pub expiration_date_time: Option<DateTime<Utc>>,
    pub justification: Option<String>,
    pub resource: Option<AccessPackageResourceSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessPackageResourceRequestRecord {
    pub id: String,
    pub catalog_id: String,
    pub expiration_date_time: Option<DateTime<Utc>>,
    pub justification: Option<String>,
    pub request_state: Option<String>,
    pub request_status: Option<String>,
    pub request_type: Option<AccessPackageResourceRequestType>,
    pub resource: Option<AccessPackageResourceSpec>,
}

#[must_use]
pub fn expand_request(spec: &AccessPackageResourceRequestSpec) -> AccessPackageResourceRequest {
    AccessPackageResourceRequest {
        catalog_id: Some(spec.catalog_id.clone()),
        expiration_date_time: spec.expiration_date_time,
        justification: spec.justification.clone(),
        request_type: Some(spec.request_type),
        access_package_resource: spec.resource.as_ref().map(|r| AccessPackageResource {
            description: r.description.clone(),
            display_name: r.display_name.clone(),
            is_pending_onboarding: Some(r.is_pending_onboarding),
            origin_id: Some(r.origin_id.clone()),
            origin_system: Some(r.origin_system),
            resource_type: r.resource_type,
            url: r.url.clone(),
            ..AccessPackageResource::default()
        }),
        ..AccessPackageResourceRequest::default()
    }
}

#[must_use]
pub fn flatten_request(request: AccessPackageResourceRequest) -> AccessPackageResourceRequestRecord {
    AccessPackageResourceRequestRecord {
        id: request.id.unwrap_or_default(),
        catalog_id: request.catalog_id.unwrap_or_default(),
        expiration_date_time: request.expiration_date_time,
        justification: request.justification,
        request_state: request.request_state,
        request_status: request.request_status,
        request_type: request.request_type,
        resource: None,
    }
}

#[derive(Clone)]
pub struct AccessPackageResourceRequestAdapter {
    client: Arc<dyn AccessPackageResourceRequestClient>,
}

impl AccessPackageResourceRequestAdapter {
    #[must_use]
    pub fn new(client: Arc<dyn AccessPackageResourceRequestClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceAdapter for AccessPackageResourceRequestAdapter {
    const RESOURCE_TYPE: &'static str = RESOURCE_TYPE;

    type Id = ObjectId;
    type Desired = AccessPackageResourceRequestSpec;
    type Record = AccessPackageResourceRequestRecord;

    fn validate(&self, desired: &AccessPackageResourceRequestSpec) -> Result<(), ReconcileError> {
        validate::non_empty("catalog_id", &desired.catalog_id)?;
        if let Some(justification) = &desired.justification {
            validate::non_empty("justification", justification)?;
        }
        if let Some(resource) = &desired.resource {
            validate::non_empty("access_package_resource.origin_id", &resource.origin_id)?;
            for (field, value) in [
                ("access_package_resource.description", &resource.description),
                ("access_package_resource.display_name", &resource.display_name),
                ("access_package_resource.url", &resource.url),
            ] {
                if let Some(value) = value {
                    validate::non_empty(field, value)?;
                }
            }
        }
        Ok(())
    }

    fn force_new_changes(
        &self,
        current: &AccessPackageResourceRequestRecord,
        desired: &AccessPackageResourceRequestSpec,
    ) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if current.catalog_id != desired.catalog_id {
            fields.push("catalog_id");
        }
        if current.expiration_date_time != desired.expiration_date_time {
            fields.push("expiration_date_time");
        }
        if current.justification != desired.justification {
            fields.push("justification");
        }
        if current.request_type != Some(desired.request_type) {
            fields.push("request_type");
        }
        if current.resource != desired.resource {
            fields.push("access_package_resource");
        }
        fields
    }

    fn remember_inputs(
        &self,
        record: &mut AccessPackageResourceRequestRecord,
        desired: &AccessPackageResourceRequestSpec,
    ) {
        record.resource.clone_from(&desired.resource);
    }

    fn carry_inputs(
        &self,
        previous: &AccessPackageResourceRequestRecord,
        fresh: &mut AccessPackageResourceRequestRecord,
    ) {
        fresh.resource.clone_from(&previous.resource);
    }

    async fn create(
        &self,
        ctx: &OperationContext,
        desired: &AccessPackageResourceRequestSpec,
    ) -> Result<Created, ReconcileError> {
        let created = ctx.call(self.client.create(expand_request(desired), true)).await?;
        Ok(Created::new(created.id.unwrap_or_default()))
    }

    async fn read(
        &self,
        ctx: &OperationContext,
        id: &ObjectId,
    ) -> Result<Option<AccessPackageResourceRequestRecord>, ReconcileError> {
        Ok(ctx.call_opt(self.client.get(id.as_str())).await?.map(flatten_request))
    }

    async fn update(
        &self,
        _ctx: &OperationContext,
        _current: &ResourceState<ObjectId, AccessPackageResourceRequestRecord>,
        _desired: &AccessPackageResourceRequestSpec,
    ) -> Result<Option<SecretString>, ReconcileError> {
        Ok(None)
    }

    async fn delete(
        &self,
        ctx: &OperationContext,
        id: &ObjectId,
        _current: &AccessPackageResourceRequestRecord,
    ) -> Result<(), ReconcileError> {
        // the service needs the full request, not just its ID
        let Some(request) = ctx.call_opt(self.client.get(id.as_str())).await? else {
            return Ok(());
        };
        ctx.call(self.client.delete(&request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> AccessPackageResourceRequestSpec {
        AccessPackageResourceRequestSpec {
            catalog_id: "catalog-1".to_owned(),
            request_type: AccessPackageResourceRequestType::AdminAdd,
            expiration_date_time: None,
            justification: Some("onboard billing".to_owned()),
            resource: Some(AccessPackageResourceSpec {
                origin_id: "group-1".to_owned(),
                origin_system: AccessPackageResourceOriginSystem::AadGroup,
                description: None,
                display_name: Some("Billing".to_owned()),
                is_pending_onboarding: false,
                resource_type: None,
                url: None,
            }),
        }
    }

    #[test]
    fn test_expand_request() {
        let request = expand_request(&spec());
        assert_eq!(request.catalog_id.as_deref(), Some("catalog-1"));
        assert_eq!(request.request_type, Some(AccessPackageResourceRequestType::AdminAdd));
        let resource = request.access_package_resource.unwrap();
        assert_eq!(resource.origin_id.as_deref(), Some("group-1"));
        assert_eq!(resource.origin_system, Some(AccessPackageResourceOriginSystem::AadGroup));
        assert!(request.id.is_none());
    }

    #[test]
    fn test_inputs_are_force_new() {
        let adapter =
            AccessPackageResourceRequestAdapter::new(Arc::new(crate::infra::InMemoryDirectory::new()));
        let mut request = expand_request(&spec());
        request.id = Some("req-1".to_owned());
        let mut record = flatten_request(request);
        assert!(record.resource.is_none());
        adapter.remember_inputs(&mut record, &spec());
        assert!(adapter.force_new_changes(&record, &spec()).is_empty());

        let mut changed = spec();
        changed.justification = None;
        changed.request_type = AccessPackageResourceRequestType::AdminRemove;
        if let Some(resource) = changed.resource.as_mut() {
            resource.origin_id = "group-2".to_owned();
        }
        assert_eq!(
            adapter.force_new_changes(&record, &changed),
            vec!["justification", "request_type", "access_package_resource"]
        );
    }

    #[test]
    fn test_validate() {
        let adapter =
            AccessPackageResourceRequestAdapter::new(Arc::new(crate::infra::InMemoryDirectory::new()));
        assert!(adapter.validate(&spec()).is_ok());

        let mut bad = spec();
        bad.catalog_id = String::new();
        assert_eq!(adapter.validate(&bad).unwrap_err().field(), Some("catalog_id"));

        let mut bad = spec();
        if let Some(resource) = bad.resource.as_mut() {
            resource.url = Some(" ".to_owned());
        }
        assert_eq!(
            adapter.validate(&bad).unwrap_err().field(),
            Some("access_package_resource.url")
        );
    }
}
