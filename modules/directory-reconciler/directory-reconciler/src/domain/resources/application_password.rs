//! Server-generated password credentials of an application.
//!
//! The secret is only ever returned by the create call, so it lives in
//! [`ResourceState::secret`]. Every input attribute is immutable; changing
//! one means replacing the credential. `end_date_relative` is kept in the
//! record from create onwards since reads only return the resolved date.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use directory_reconciler_sdk::{ApplicationsClient, PasswordCredential};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::engine::{Created, OperationContext, ResourceAdapter};
use crate::domain::error::ReconcileError;
use crate::domain::ids::{CredentialId, CredentialKind};
use crate::domain::resources::application;
use crate::domain::state::{PersistedState, ResourceState};
use crate::domain::upgrade::{UpgradeChain, upgrade_password_id};
use crate::domain::validate;

pub const RESOURCE_TYPE: &str = "application_password";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationPasswordSpec {
    pub application_object_id: String,
    pub display_name: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// Lifetime from now, e.g. `"240h"`. Conflicts with `end_date`.
    pub end_date_relative: Option<String>,
}

impl ApplicationPasswordSpec {
    #[must_use]
    pub fn new(application_object_id: impl Into<String>) -> Self {
        Self {
            application_object_id: application_object_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationPasswordRecord {
    pub application_object_id: String,
    pub key_id: String,
    pub display_name: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// Relative lifetime the credential was created with. The service only
    /// reports the resolved `end_date`.
    pub end_date_relative: Option<String>,
}

/// Builds the credential to add for `spec`, resolving a relative end date
/// against `now`.
///
/// # Errors
///
/// Returns a validation error for conflicting or unparsable dates.
pub fn password_credential_for(
    spec: &ApplicationPasswordSpec,
    now: DateTime<Utc>,
) -> Result<PasswordCredential, ReconcileError> {
    let end_date = match (spec.end_date, spec.end_date_relative.as_deref()) {
        (Some(_), Some(_)) => {
            return Err(ReconcileError::validation(
                "end_date_relative",
                "conflicts with end_date",
            ));
        }
        (Some(end), None) => Some(end),
        (None, Some(relative)) => Some(relative_end_date(relative, now)?),
        (None, None) => None,
    };

    if let (Some(start), Some(end)) = (spec.start_date, end_date)
        && end <= start
    {
        return Err(ReconcileError::validation(
            "end_date",
            "must be later than start_date",
        ));
    }

    Ok(PasswordCredential {
        display_name: spec.display_name.clone(),
        start_date_time: spec.start_date,
        end_date_time: end_date,
        ..PasswordCredential::default()
    })
}

fn relative_end_date(relative: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ReconcileError> {
    let invalid = |reason: String| ReconcileError::validation("end_date_relative", reason);

    let lifetime = humantime::parse_duration(relative)
        .map_err(|e| invalid(format!("'{relative}' is not a valid duration: {e}")))?;
    if lifetime.is_zero() {
        return Err(invalid("must be greater than zero".to_owned()));
    }
    TimeDelta::from_std(lifetime)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| invalid(format!("'{relative}' is too large")))
}

#[must_use]
pub fn flatten_password(application_object_id: &str, credential: &PasswordCredential) -> ApplicationPasswordRecord {
    ApplicationPasswordRecord {
        application_object_id: application_object_id.to_owned(),
        key_id: credential.key_id.clone().unwrap_or_default(),
        display_name: credential.display_name.clone(),
        start_date: credential.start_date_time,
        end_date: credential.end_date_time,
        end_date_relative: None,
    }
}

/// Schema version 0 stored the identity as `{objectId}` or
/// `{objectId}/{keyId}`, named the display name `description`, and kept the
/// caller-chosen secret as the `value` attribute.
fn upgrade_from_v0(mut state: PersistedState) -> Result<PersistedState, ReconcileError> {
    let new_id = upgrade_password_id(&state.id, state.attribute_str("key_id"))
        .map_err(|e| ReconcileError::from(e).with_identity(state.id.clone()))?;
    state.id = new_id;

    if let Some(attrs) = state.attributes.as_object_mut() {
        if let Some(description) = attrs.remove("description")
            && !attrs.contains_key("display_name")
        {
            attrs.insert("display_name".to_owned(), description);
        }
        if let Some(Value::String(value)) = attrs.remove("value")
            && state.secret.is_none()
        {
            state.secret = Some(value);
        }
        for date in ["start_date", "end_date", "end_date_relative"] {
            if attrs.get(date).and_then(Value::as_str) == Some("") {
                attrs.remove(date);
            }
        }
    }
    Ok(state)
}

#[derive(Clone)]
pub struct ApplicationPasswordAdapter {
    client: Arc<dyn ApplicationsClient>,
}

impl ApplicationPasswordAdapter {
    #[must_use]
    pub fn new(client: Arc<dyn ApplicationsClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceAdapter for ApplicationPasswordAdapter {
    const RESOURCE_TYPE: &'static str = RESOURCE_TYPE;
    const SCHEMA_VERSION: u32 = 1;

    type Id = CredentialId;
    type Desired = ApplicationPasswordSpec;
    type Record = ApplicationPasswordRecord;

    fn validate(&self, desired: &ApplicationPasswordSpec) -> Result<(), ReconcileError> {
        validate::uuid("application_object_id", &desired.application_object_id)?;
        if let Some(name) = &desired.display_name {
            validate::non_empty("display_name", name)?;
        }
        password_credential_for(desired, Utc::now()).map(|_| ())
    }

    fn force_new_changes(
        &self,
        current: &ApplicationPasswordRecord,
        desired: &ApplicationPasswordSpec,
    ) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if current.application_object_id != desired.application_object_id {
            fields.push("application_object_id");
        }
        if desired.display_name.is_some() && desired.display_name != current.display_name {
            fields.push("display_name");
        }
        if desired.start_date.is_some() && desired.start_date != current.start_date {
            fields.push("start_date");
        }
        if desired.end_date.is_some() && desired.end_date != current.end_date {
            fields.push("end_date");
        }
        if desired.end_date_relative != current.end_date_relative {
            fields.push("end_date_relative");
        }
        fields
    }

    fn remember_inputs(&self, record: &mut ApplicationPasswordRecord, desired: &ApplicationPasswordSpec) {
        record.end_date_relative.clone_from(&desired.end_date_relative);
    }

    fn carry_inputs(&self, previous: &ApplicationPasswordRecord, fresh: &mut ApplicationPasswordRecord) {
        fresh.end_date_relative.clone_from(&previous.end_date_relative);
    }

    async fn create(
        &self,
        ctx: &OperationContext,
        desired: &ApplicationPasswordSpec,
    ) -> Result<Created, ReconcileError> {
        let credential = password_credential_for(desired, Utc::now())?;
        let object_id = desired.application_object_id.as_str();

        ctx.locked(application::RESOURCE_TYPE, object_id, async {
            let app = ctx
                .call_opt(self.client.get(object_id))
                .await
                .map_err(|e| e.with_field("application_object_id"))?
                .ok_or_else(|| {
                    ReconcileError::validation(
                        "application_object_id",
                        format!("application with object ID '{object_id}' was not found"),
                    )
                })?;
            let app_id = app.id.filter(|id| !id.is_empty()).ok_or_else(|| {
                ReconcileError::invalid_server_response("application returned without an object ID")
            })?;

            let added = ctx.call(self.client.add_password(&app_id, credential)).await?;
            let key_id = added.key_id.filter(|k| !k.is_empty()).ok_or_else(|| {
                ReconcileError::invalid_server_response("password credential returned without a key ID")
            })?;
            let secret = added.secret_text.filter(|s| !s.is_empty()).ok_or_else(|| {
                ReconcileError::invalid_server_response("password credential returned without a secret")
                    .with_created_identity(
                        CredentialId::new(app_id.clone(), CredentialKind::Password, key_id.clone()).to_string(),
                    )
            })?;

            let id = CredentialId::new(app_id, CredentialKind::Password, key_id);
            Ok(Created::new(id.to_string()).with_secret(SecretString::from(secret)))
        })
        .await
    }

    async fn read(
        &self,
        ctx: &OperationContext,
        id: &CredentialId,
    ) -> Result<Option<ApplicationPasswordRecord>, ReconcileError> {
        if id.kind() != CredentialKind::Password {
            return Err(ReconcileError::validation(
                "id",
                format!("'{id}' does not identify a password credential"),
            ));
        }

        let Some(app) = ctx.call_opt(self.client.get(id.object_id())).await? else {
            return Ok(None);
        };
        let credential = app
            .password_credentials
            .iter()
            .flatten()
            .find(|c| c.key_id.as_deref() == Some(id.key_id()));

        match credential {
            Some(credential) => Ok(Some(flatten_password(id.object_id(), credential))),
            None => {
                tracing::debug!(application = id.object_id(), key_id = id.key_id(), "password credential not found");
                Ok(None)
            }
        }
    }

    async fn update(
        &self,
        _ctx: &OperationContext,
        _current: &ResourceState<CredentialId, ApplicationPasswordRecord>,
        _desired: &ApplicationPasswordSpec,
    ) -> Result<Option<SecretString>, ReconcileError> {
        Ok(None)
    }

    async fn delete(
        &self,
        ctx: &OperationContext,
        id: &CredentialId,
        _current: &ApplicationPasswordRecord,
    ) -> Result<(), ReconcileError> {
        ctx.locked(
            application::RESOURCE_TYPE,
            id.object_id(),
            ctx.call(self.client.remove_password(id.object_id(), id.key_id())),
        )
        .await
    }

    fn upgrades(&self) -> UpgradeChain {
        UpgradeChain::new().with_step(0, upgrade_from_v0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const APP: &str = "11111111-1111-1111-1111-111111111111";
    const KEY: &str = "22222222-2222-2222-2222-222222222222";

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_relative_end_date_is_resolved_from_now() {
        let now = at("2026-01-01T00:00:00Z");
        let spec = ApplicationPasswordSpec {
            end_date_relative: Some("240h".to_owned()),
            ..ApplicationPasswordSpec::new(APP)
        };
        let credential = password_credential_for(&spec, now).unwrap();
        assert_eq!(credential.end_date_time, Some(at("2026-01-11T00:00:00Z")));
        assert!(credential.secret_text.is_none());
    }

    #[test]
    fn test_end_date_conflicts() {
        let now = Utc::now();
        let spec = ApplicationPasswordSpec {
            end_date: Some(now),
            end_date_relative: Some("1h".to_owned()),
            ..ApplicationPasswordSpec::new(APP)
        };
        let err = password_credential_for(&spec, now).unwrap_err();
        assert_eq!(err.field(), Some("end_date_relative"));

        let spec = ApplicationPasswordSpec {
            end_date_relative: Some("soon".to_owned()),
            ..ApplicationPasswordSpec::new(APP)
        };
        assert!(password_credential_for(&spec, now).is_err());

        let spec = ApplicationPasswordSpec {
            start_date: Some(at("2026-02-01T00:00:00Z")),
            end_date: Some(at("2026-01-01T00:00:00Z")),
            ..ApplicationPasswordSpec::new(APP)
        };
        assert_eq!(password_credential_for(&spec, now).unwrap_err().field(), Some("end_date"));
    }

    #[test]
    fn test_all_inputs_are_force_new() {
        let adapter = ApplicationPasswordAdapter::new(Arc::new(crate::infra::InMemoryDirectory::new()));
        let record = ApplicationPasswordRecord {
            application_object_id: APP.to_owned(),
            key_id: KEY.to_owned(),
            display_name: Some("ci".to_owned()),
            start_date: Some(at("2026-01-01T00:00:00Z")),
            end_date: None,
            end_date_relative: Some("240h".to_owned()),
        };

        let same = ApplicationPasswordSpec {
            end_date_relative: Some("240h".to_owned()),
            ..ApplicationPasswordSpec::new(APP)
        };
        assert!(adapter.force_new_changes(&record, &same).is_empty());

        let desired = ApplicationPasswordSpec {
            display_name: Some("deploy".to_owned()),
            start_date: Some(at("2026-03-01T00:00:00Z")),
            end_date_relative: Some("1h".to_owned()),
            ..ApplicationPasswordSpec::new("33333333-3333-3333-3333-333333333333")
        };
        assert_eq!(
            adapter.force_new_changes(&record, &desired),
            vec!["application_object_id", "display_name", "start_date", "end_date_relative"]
        );
        assert_eq!(
            adapter.force_new_changes(&record, &ApplicationPasswordSpec::new(APP)),
            vec!["end_date_relative"]
        );
    }

    #[test]
    fn test_upgrade_from_v0() {
        let state = PersistedState::new(
            0,
            APP,
            json!({
                "application_object_id": APP,
                "key_id": KEY,
                "description": "ci",
                "value": "s3cr3t",
                "start_date": "2026-01-01T00:00:00Z",
                "end_date": "",
                "end_date_relative": "240h",
            }),
        );

        let upgraded = upgrade_from_v0(state).unwrap();
        assert_eq!(upgraded.id, format!("{APP}/password/{KEY}"));
        assert_eq!(upgraded.secret.as_deref(), Some("s3cr3t"));
        assert_eq!(upgraded.attributes["display_name"], json!("ci"));
        assert!(upgraded.attributes.get("value").is_none());
        assert!(upgraded.attributes.get("end_date").is_none());

        let record: ApplicationPasswordRecord = serde_json::from_value(upgraded.attributes).unwrap();
        assert_eq!(record.key_id, KEY);
        assert_eq!(record.display_name.as_deref(), Some("ci"));
        assert_eq!(record.end_date, None);
        assert_eq!(record.end_date_relative.as_deref(), Some("240h"));
    }

    #[test]
    fn test_upgrade_from_v0_without_key_id_fails() {
        let state = PersistedState::new(0, APP, json!({ "application_object_id": APP }));
        let err = upgrade_from_v0(state).unwrap_err();
        assert!(err.is_malformed_identifier());
        assert_eq!(err.identity(), Some(APP));
    }
}
