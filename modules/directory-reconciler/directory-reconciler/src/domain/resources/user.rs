//! User accounts.

use std::sync::Arc;

use async_trait::async_trait;
use directory_reconciler_sdk::{PasswordProfile, User, UserPatch, UsersClient};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::domain::engine::{Created, OperationContext, ResourceAdapter};
use crate::domain::error::ReconcileError;
use crate::domain::ids::ObjectId;
use crate::domain::state::ResourceState;
use crate::domain::validate;

pub const RESOURCE_TYPE: &str = "user";

const MAX_PASSWORD_LEN: usize = 256;

#[derive(Debug, Clone)]
pub struct UserSpec {
    /// Sign-in name. Cannot be changed once the user exists.
    pub user_principal_name: String,
    pub display_name: String,
    pub account_enabled: bool,
    /// Required on create; afterwards only sent when it changes.
    pub password: Option<SecretString>,
    pub force_password_change: bool,
    /// Defaults to the part of the UPN before `@`.
    pub mail_nickname: Option<String>,
    pub city: Option<String>,
    pub company_name: Option<String>,
    pub country: Option<String>,
    pub department: Option<String>,
    pub given_name: Option<String>,
    pub job_title: Option<String>,
    pub mobile_phone: Option<String>,
    pub office_location: Option<String>,
    pub postal_code: Option<String>,
    pub state: Option<String>,
    pub street_address: Option<String>,
    pub surname: Option<String>,
    pub usage_location: Option<String>,
    pub onpremises_immutable_id: Option<String>,
}

impl UserSpec {
    /// Enabled account with only the required attributes set.
    #[must_use]
    pub fn new(
        user_principal_name: impl Into<String>,
        display_name: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            user_principal_name: user_principal_name.into(),
            display_name: display_name.into(),
            account_enabled: true,
            password: Some(password),
            force_password_change: false,
            mail_nickname: None,
            city: None,
            company_name: None,
            country: None,
            department: None,
            given_name: None,
            job_title: None,
            mobile_phone: None,
            office_location: None,
            postal_code: None,
            state: None,
            street_address: None,
            surname: None,
            usage_location: None,
            onpremises_immutable_id: None,
        }
    }

    fn effective_mail_nickname(&self) -> String {
        match self.mail_nickname.as_deref().filter(|n| !n.is_empty()) {
            Some(nickname) => nickname.to_owned(),
            None => self
                .user_principal_name
                .split('@')
                .next()
                .unwrap_or_default()
                .to_owned(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRecord {
    pub object_id: String,
    pub user_principal_name: String,
    pub display_name: String,
    pub account_enabled: bool,
    pub mail: Option<String>,
    pub mail_nickname: String,
    pub city: Option<String>,
    pub company_name: Option<String>,
    pub country: Option<String>,
    pub department: Option<String>,
    pub given_name: Option<String>,
    pub job_title: Option<String>,
    pub mobile_phone: Option<String>,
    pub office_location: Option<String>,
    pub postal_code: Option<String>,
    pub state: Option<String>,
    pub street_address: Option<String>,
    pub surname: Option<String>,
    pub usage_location: Option<String>,
    pub onpremises_immutable_id: Option<String>,
    pub onpremises_sam_account_name: Option<String>,
    pub onpremises_user_principal_name: Option<String>,
    pub user_type: Option<String>,
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

/// Wire record for creating `spec`. The caller checks the password first.
#[must_use]
pub fn expand_user(spec: &UserSpec) -> User {
    User {
        account_enabled: Some(spec.account_enabled),
        city: non_blank(spec.city.as_ref()),
        company_name: non_blank(spec.company_name.as_ref()),
        country: non_blank(spec.country.as_ref()),
        department: non_blank(spec.department.as_ref()),
        display_name: Some(spec.display_name.clone()),
        given_name: non_blank(spec.given_name.as_ref()),
        job_title: non_blank(spec.job_title.as_ref()),
        mail_nickname: Some(spec.effective_mail_nickname()),
        mobile_phone: non_blank(spec.mobile_phone.as_ref()),
        office_location: non_blank(spec.office_location.as_ref()),
        on_premises_immutable_id: non_blank(spec.onpremises_immutable_id.as_ref()),
        password_profile: Some(PasswordProfile {
            force_change_password_next_sign_in: spec.force_password_change,
            password: spec.password.as_ref().map(|p| p.expose_secret().to_owned()),
        }),
        postal_code: non_blank(spec.postal_code.as_ref()),
        state: non_blank(spec.state.as_ref()),
        street_address: non_blank(spec.street_address.as_ref()),
        surname: non_blank(spec.surname.as_ref()),
        usage_location: non_blank(spec.usage_location.as_ref()),
        user_principal_name: Some(spec.user_principal_name.clone()),
        ..User::default()
    }
}

#[must_use]
pub fn flatten_user(user: User) -> UserRecord {
    UserRecord {
        object_id: user.id.unwrap_or_default(),
        user_principal_name: user.user_principal_name.unwrap_or_default(),
        display_name: user.display_name.unwrap_or_default(),
        account_enabled: user.account_enabled.unwrap_or(false),
        mail: user.mail,
        mail_nickname: user.mail_nickname.unwrap_or_default(),
        city: user.city,
        company_name: user.company_name,
        country: user.country,
        department: user.department,
        given_name: user.given_name,
        job_title: user.job_title,
        mobile_phone: user.mobile_phone,
        office_location: user.office_location,
        postal_code: user.postal_code,
        state: user.state,
        street_address: user.street_address,
        surname: user.surname,
        usage_location: user.usage_location,
        onpremises_immutable_id: user.on_premises_immutable_id,
        onpremises_sam_account_name: user.on_premises_sam_account_name,
        onpremises_user_principal_name: user.on_premises_user_principal_name,
        user_type: user.user_type,
    }
}

/// `Some(value)` when the optional attribute changes; `Some(None)` clears it.
fn nullable_change(current: Option<&String>, desired: Option<&String>) -> Option<Option<String>> {
    let desired = non_blank(desired);
    (non_blank(current) != desired).then_some(desired)
}

fn password_changed(desired: Option<&SecretString>, current: Option<&SecretString>) -> bool {
    match (desired, current) {
        (Some(new), Some(old)) => new.expose_secret() != old.expose_secret(),
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Minimal patch moving `current` to `desired`. `current_password` is the
/// last password this reconciler set, if any.
#[must_use]
pub fn patch_for(
    current: &UserRecord,
    current_password: Option<&SecretString>,
    desired: &UserSpec,
) -> UserPatch {
    let nickname = desired.mail_nickname.as_ref().filter(|n| !n.is_empty());
    let send_password = password_changed(desired.password.as_ref(), current_password);

    UserPatch {
        account_enabled: (current.account_enabled != desired.account_enabled)
            .then_some(desired.account_enabled),
        display_name: (current.display_name != desired.display_name).then(|| desired.display_name.clone()),
        mail_nickname: nickname.filter(|n| **n != current.mail_nickname).cloned(),
        city: nullable_change(current.city.as_ref(), desired.city.as_ref()),
        company_name: nullable_change(current.company_name.as_ref(), desired.company_name.as_ref()),
        country: nullable_change(current.country.as_ref(), desired.country.as_ref()),
        department: nullable_change(current.department.as_ref(), desired.department.as_ref()),
        given_name: nullable_change(current.given_name.as_ref(), desired.given_name.as_ref()),
        job_title: nullable_change(current.job_title.as_ref(), desired.job_title.as_ref()),
        mobile_phone: nullable_change(current.mobile_phone.as_ref(), desired.mobile_phone.as_ref()),
        office_location: nullable_change(current.office_location.as_ref(), desired.office_location.as_ref()),
        postal_code: nullable_change(current.postal_code.as_ref(), desired.postal_code.as_ref()),
        state: nullable_change(current.state.as_ref(), desired.state.as_ref()),
        street_address: nullable_change(current.street_address.as_ref(), desired.street_address.as_ref()),
        surname: nullable_change(current.surname.as_ref(), desired.surname.as_ref()),
        usage_location: nullable_change(current.usage_location.as_ref(), desired.usage_location.as_ref()),
        on_premises_immutable_id: non_blank(desired.onpremises_immutable_id.as_ref())
            .filter(|id| current.onpremises_immutable_id.as_ref() != Some(id)),
        password_profile: send_password.then(|| PasswordProfile {
            force_change_password_next_sign_in: desired.force_password_change,
            password: desired.password.as_ref().map(|p| p.expose_secret().to_owned()),
        }),
    }
}

#[derive(Clone)]
pub struct UserAdapter {
    client: Arc<dyn UsersClient>,
}

impl UserAdapter {
    #[must_use]
    pub fn new(client: Arc<dyn UsersClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceAdapter for UserAdapter {
    const RESOURCE_TYPE: &'static str = RESOURCE_TYPE;

    type Id = ObjectId;
    type Desired = UserSpec;
    type Record = UserRecord;

    fn validate(&self, desired: &UserSpec) -> Result<(), ReconcileError> {
        validate::email_like("user_principal_name", &desired.user_principal_name)?;
        validate::non_empty("display_name", &desired.display_name)?;
        if let Some(password) = &desired.password {
            let len = password.expose_secret().chars().count();
            if len == 0 || len > MAX_PASSWORD_LEN {
                return Err(ReconcileError::validation(
                    "password",
                    format!("must be between 1 and {MAX_PASSWORD_LEN} characters"),
                ));
            }
        }
        Ok(())
    }

    fn force_new_changes(&self, current: &UserRecord, desired: &UserSpec) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if current.user_principal_name != desired.user_principal_name {
            fields.push("user_principal_name");
        }
        fields
    }

    async fn create(&self, ctx: &OperationContext, desired: &UserSpec) -> Result<Created, ReconcileError> {
        let Some(password) = desired.password.clone() else {
            return Err(ReconcileError::validation(
                "password",
                "is required when creating a user",
            ));
        };

        let user = ctx.call(self.client.create(expand_user(desired))).await?;
        Ok(Created::new(user.id.unwrap_or_default()).with_secret(password))
    }

    async fn read(&self, ctx: &OperationContext, id: &ObjectId) -> Result<Option<UserRecord>, ReconcileError> {
        Ok(ctx.call_opt(self.client.get(id.as_str())).await?.map(flatten_user))
    }

    async fn update(
        &self,
        ctx: &OperationContext,
        current: &ResourceState<ObjectId, UserRecord>,
        desired: &UserSpec,
    ) -> Result<Option<SecretString>, ReconcileError> {
        let patch = patch_for(&current.record, current.secret.as_ref(), desired);
        if patch.is_empty() {
            tracing::debug!(id = %current.id, "user already matches desired state");
            return Ok(None);
        }

        let new_password = patch
            .password_profile
            .is_some()
            .then(|| desired.password.clone())
            .flatten();
        ctx.call(self.client.update(current.id.as_str(), patch)).await?;
        Ok(new_password)
    }

    async fn delete(&self, ctx: &OperationContext, id: &ObjectId, _current: &UserRecord) -> Result<(), ReconcileError> {
        ctx.call(self.client.delete(id.as_str())).await
    }
}
