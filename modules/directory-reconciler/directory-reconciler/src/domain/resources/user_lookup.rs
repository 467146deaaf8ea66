//! Looks up a single existing user.

use std::fmt;
use std::sync::Arc;

use directory_reconciler_sdk::{DirectoryError, ODataFilter, User, UsersClient};

use crate::domain::engine::{EngineSettings, OperationContext};
use crate::domain::error::{Operation, ReconcileError};
use crate::domain::resources::user::{UserRecord, flatten_user};

pub const RESOURCE_TYPE: &str = "user";

/// How to find the user. Exactly one selector is allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserSelector {
    UserPrincipalName(String),
    ObjectId(String),
    MailNickname(String),
}

impl UserSelector {
    /// Builds a selector from optional inputs, ignoring empty ones.
    ///
    /// # Errors
    ///
    /// `Validation` unless exactly one input is set.
    pub fn from_fields(
        user_principal_name: Option<&str>,
        object_id: Option<&str>,
        mail_nickname: Option<&str>,
    ) -> Result<Self, ReconcileError> {
        let set = |v: Option<&str>| v.filter(|s| !s.is_empty()).map(str::to_owned);
        let mut selectors = [
            set(user_principal_name).map(Self::UserPrincipalName),
            set(object_id).map(Self::ObjectId),
            set(mail_nickname).map(Self::MailNickname),
        ]
        .into_iter()
        .flatten();

        match (selectors.next(), selectors.next()) {
            (Some(selector), None) => Ok(selector),
            _ => Err(ReconcileError::validation(
                "user_principal_name",
                "exactly one of user_principal_name, object_id or mail_nickname must be supplied",
            )),
        }
    }

    /// Attribute name the selector matches on.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            Self::UserPrincipalName(_) => "user_principal_name",
            Self::ObjectId(_) => "object_id",
            Self::MailNickname(_) => "mail_nickname",
        }
    }

    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::UserPrincipalName(v) | Self::ObjectId(v) | Self::MailNickname(v) => v,
        }
    }
}

pub struct UserLookup {
    client: Arc<dyn UsersClient>,
    settings: EngineSettings,
}

impl UserLookup {
    #[must_use]
    pub fn new(client: Arc<dyn UsersClient>, settings: EngineSettings) -> Self {
        Self { client, settings }
    }

    /// Finds the one user matching `selector`.
    ///
    /// # Errors
    ///
    /// - `Remote` not-found when no user matches
    /// - `Validation` when more than one user matches
    /// - `InvalidServerResponse` when the match has no object ID
    #[tracing::instrument(skip_all, fields(resource = RESOURCE_TYPE, by = selector.field()))]
    pub async fn find(&self, selector: &UserSelector) -> Result<UserRecord, ReconcileError> {
        let ctx = OperationContext::read_only(Operation::Read, RESOURCE_TYPE, &self.settings);
        let field = selector.field();
        let value = selector.value();

        let user = match selector {
            UserSelector::ObjectId(id) => ctx.call_opt(self.client.get(id)).await?,
            UserSelector::UserPrincipalName(v) => self.single(&ctx, field, "userPrincipalName", v).await?,
            UserSelector::MailNickname(v) => self.single(&ctx, field, "mailNickname", v).await?,
        };

        let user = user.ok_or_else(|| {
            ctx.error(
                ReconcileError::from(DirectoryError::not_found(format!(
                    "no user found with {field} '{value}'"
                )))
                .with_field(field),
            )
        })?;
        if user.id.as_deref().is_none_or(str::is_empty) {
            return Err(ctx.error(ReconcileError::invalid_server_response(
                "user returned without an object ID",
            )));
        }
        Ok(flatten_user(user))
    }

    async fn single(
        &self,
        ctx: &OperationContext,
        field: &'static str,
        wire_field: &'static str,
        value: &str,
    ) -> Result<Option<User>, ReconcileError> {
        let filter = ODataFilter::eq(wire_field, value);
        let mut users = ctx.call(self.client.list(&filter)).await?;
        if users.len() > 1 {
            return Err(ctx.error(ReconcileError::validation(
                field,
                format!("more than one user found with {field} '{value}'"),
            )));
        }
        Ok(users.pop())
    }
}

impl fmt::Debug for UserLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserLookup")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
