//! Reconciliation error types.

use std::fmt;

use directory_reconciler_sdk::DirectoryError;
use http::StatusCode;
use thiserror::Error;

use crate::domain::ids::IdError;

/// Lifecycle operation that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Import,
    Load,
    Persist,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Import => "import",
            Self::Load => "load",
            Self::Persist => "persist",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What went wrong.
#[derive(Error, Debug)]
pub enum ReconcileErrorKind {
    /// Another object already uses the requested display name.
    #[error("an object with display name '{display_name}' already exists (id {existing_id}); import it instead")]
    Duplicate {
        existing_id: String,
        display_name: String,
    },

    /// The service answered successfully but the payload is unusable.
    #[error("invalid server response")]
    InvalidServerResponse,

    /// Desired state was rejected before any remote call.
    #[error("validation failed")]
    Validation,

    /// A persisted or supplied identity could not be decoded.
    #[error(transparent)]
    MalformedIdentifier(#[from] IdError),

    /// The directory service returned an error.
    #[error(transparent)]
    Remote(#[from] DirectoryError),

    /// The operation deadline elapsed.
    #[error("operation deadline exceeded")]
    Timeout,
}

/// Error returned by every reconciler operation.
///
/// Carries the failure [`ReconcileErrorKind`] plus where it happened: the
/// operation, resource type, identity, and attribute path.
#[derive(Debug)]
pub struct ReconcileError {
    kind: ReconcileErrorKind,
    operation: Option<Operation>,
    resource_type: Option<&'static str>,
    identity: Option<String>,
    field: Option<String>,
    message: Option<String>,
    created_identity: Option<String>,
}

impl ReconcileError {
    #[must_use]
    pub fn new(kind: ReconcileErrorKind) -> Self {
        Self {
            kind,
            operation: None,
            resource_type: None,
            identity: None,
            field: None,
            message: None,
            created_identity: None,
        }
    }

    /// Creates a `Validation` error for an attribute path.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ReconcileErrorKind::Validation)
            .with_field(field)
            .with_message(message)
    }

    /// Creates an `InvalidServerResponse` error.
    #[must_use]
    pub fn invalid_server_response(message: impl Into<String>) -> Self {
        Self::new(ReconcileErrorKind::InvalidServerResponse).with_message(message)
    }

    /// Creates a `Duplicate` error.
    #[must_use]
    pub fn duplicate(existing_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::new(ReconcileErrorKind::Duplicate {
            existing_id: existing_id.into(),
            display_name: display_name.into(),
        })
        .with_field("display_name")
    }

    #[must_use]
    pub fn timeout() -> Self {
        Self::new(ReconcileErrorKind::Timeout)
    }

    #[must_use]
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    #[must_use]
    pub fn with_resource_type(mut self, resource_type: &'static str) -> Self {
        self.resource_type = Some(resource_type);
        self
    }

    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Records the identity of an object that was created before the failure.
    #[must_use]
    pub fn with_created_identity(mut self, identity: impl Into<String>) -> Self {
        self.created_identity = Some(identity.into());
        self
    }

    /// Fills operation and resource type if they are not already set.
    #[must_use]
    pub(crate) fn in_context(mut self, operation: Operation, resource_type: &'static str) -> Self {
        self.operation.get_or_insert(operation);
        self.resource_type.get_or_insert(resource_type);
        self
    }

    #[must_use]
    pub fn kind(&self) -> &ReconcileErrorKind {
        &self.kind
    }

    #[must_use]
    pub fn operation(&self) -> Option<Operation> {
        self.operation
    }

    #[must_use]
    pub fn resource_type(&self) -> Option<&'static str> {
        self.resource_type
    }

    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Attribute path the error refers to, e.g. `app_role` or `owners`.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Identity of an object that exists remotely even though the operation
    /// failed. Callers should persist it so the object is not orphaned.
    #[must_use]
    pub fn created_identity(&self) -> Option<&str> {
        self.created_identity.as_deref()
    }

    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self.kind, ReconcileErrorKind::Duplicate { .. })
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self.kind, ReconcileErrorKind::Validation)
    }

    #[must_use]
    pub fn is_malformed_identifier(&self) -> bool {
        matches!(self.kind, ReconcileErrorKind::MalformedIdentifier(_))
    }

    #[must_use]
    pub fn is_invalid_server_response(&self) -> bool {
        matches!(self.kind, ReconcileErrorKind::InvalidServerResponse)
    }

    /// Returns `true` if running the same operation again may succeed:
    /// timeouts, transport failures, throttling, and server-side errors.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            ReconcileErrorKind::Timeout => true,
            ReconcileErrorKind::Remote(err) => match err.http_status() {
                None => true,
                Some(status) => status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
            },
            ReconcileErrorKind::Duplicate { .. }
            | ReconcileErrorKind::InvalidServerResponse
            | ReconcileErrorKind::Validation
            | ReconcileErrorKind::MalformedIdentifier(_) => false,
        }
    }

    /// Identity of the conflicting object for `Duplicate` errors.
    #[must_use]
    pub fn duplicate_identity(&self) -> Option<&str> {
        match &self.kind {
            ReconcileErrorKind::Duplicate { existing_id, .. } => Some(existing_id),
            _ => None,
        }
    }
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(operation) = self.operation {
            write!(f, "{operation} ")?;
        }
        f.write_str(self.resource_type.unwrap_or("resource"))?;
        if let Some(identity) = &self.identity {
            write!(f, " '{identity}'")?;
        }
        if let Some(field) = &self.field {
            write!(f, " [{field}]")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        write!(f, ": {}", self.kind)
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<ReconcileErrorKind> for ReconcileError {
    fn from(kind: ReconcileErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<DirectoryError> for ReconcileError {
    fn from(err: DirectoryError) -> Self {
        Self::new(ReconcileErrorKind::Remote(err))
    }
}

impl From<IdError> for ReconcileError {
    fn from(err: IdError) -> Self {
        Self::new(ReconcileErrorKind::MalformedIdentifier(err)).with_field("id")
    }
}
