//! Resource identities.
//!
//! Simple resources are identified by the remote object ID. Credentials are
//! nested under an application and carry a composite identity
//! `{objectId}/{kind}/{keyId}`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

const SEPARATOR: char = '/';

/// Why an identity string could not be decoded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier '{id}' must have {expected} segments separated by '/', found {found}")]
    SegmentCount {
        id: String,
        expected: usize,
        found: usize,
    },

    #[error("identifier '{id}' contains an empty segment")]
    EmptySegment { id: String },

    #[error("unknown credential kind '{kind}' in identifier '{id}'")]
    UnknownKind { id: String, kind: String },

    #[error("identifier '{id}' uses the {format} format; the stored state must be upgraded first")]
    Legacy { id: String, format: IdFormat },

    #[error("identifier '{id}' is not a valid UUID")]
    NotUuid { id: String },

    #[error("legacy identifier '{id}' cannot be upgraded without a stored key ID")]
    MissingKeyId { id: String },
}

/// Identity that can be rendered to and parsed from its persisted string form.
///
/// `decode(x.to_string()) == x` holds for every value.
pub trait ResourceId: fmt::Display + fmt::Debug + Clone + Send + Sync + Sized + 'static {
    /// Parses a persisted identity.
    ///
    /// # Errors
    ///
    /// Returns [`IdError`] when `s` does not match the current format.
    fn decode(s: &str) -> Result<Self, IdError>;

    /// Parses an identity supplied by a user for import. Stricter than
    /// [`ResourceId::decode`]: object IDs must be UUIDs.
    ///
    /// # Errors
    ///
    /// Returns [`IdError`] when `s` is not an importable identity.
    fn decode_import(s: &str) -> Result<Self, IdError> {
        Self::decode(s)
    }
}

// =============================================================================
// ObjectId
// =============================================================================

/// Remote object ID of a simple (non-nested) resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    /// Parses an object ID that must be a UUID.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::NotUuid`] if `s` is not a UUID.
    pub fn parse_uuid(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        Uuid::parse_str(s).map_err(|_| IdError::NotUuid { id: s.to_owned() })?;
        Ok(Self(s.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ResourceId for ObjectId {
    fn decode(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        let found = s.split(SEPARATOR).count();
        if found != 1 {
            return Err(IdError::SegmentCount {
                id: s.to_owned(),
                expected: 1,
                found,
            });
        }
        Ok(Self(s.to_owned()))
    }

    fn decode_import(s: &str) -> Result<Self, IdError> {
        Self::parse_uuid(s)
    }
}

// =============================================================================
// CredentialId
// =============================================================================

/// Kind of credential attached to an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    Password,
    Certificate,
}

impl CredentialKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Certificate => "certificate",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" => Ok(Self::Password),
            "certificate" => Ok(Self::Certificate),
            _ => Err(()),
        }
    }
}

/// On-disk shape of a credential identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdFormat {
    /// `{objectId}/{kind}/{keyId}`
    Current,
    /// `{objectId}/{keyId}`
    LegacyPair,
    /// `{objectId}`; the key ID lives in a separate attribute.
    LegacyFlat,
}

impl fmt::Display for IdFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Current => "current",
            Self::LegacyPair => "legacy objectId/keyId",
            Self::LegacyFlat => "legacy flat",
        })
    }
}

/// Composite identity of a credential: parent object, kind, key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialId {
    object_id: String,
    kind: CredentialKind,
    key_id: String,
}

impl CredentialId {
    #[must_use]
    pub fn new(object_id: impl Into<String>, kind: CredentialKind, key_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            kind,
            key_id: key_id.into(),
        }
    }

    /// Object ID of the owning application.
    #[must_use]
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    #[must_use]
    pub fn kind(&self) -> CredentialKind {
        self.kind
    }

    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Classifies a persisted identity by shape without validating its parts.
    ///
    /// # Errors
    ///
    /// Returns [`IdError`] when `s` is empty, has an empty segment, or has more
    /// than three segments.
    pub fn detect(s: &str) -> Result<IdFormat, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        let segments: Vec<&str> = s.split(SEPARATOR).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(IdError::EmptySegment { id: s.to_owned() });
        }
        match segments.len() {
            1 => Ok(IdFormat::LegacyFlat),
            2 => Ok(IdFormat::LegacyPair),
            3 => Ok(IdFormat::Current),
            found => Err(IdError::SegmentCount {
                id: s.to_owned(),
                expected: 3,
                found,
            }),
        }
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}{SEPARATOR}{}", self.object_id, self.kind, self.key_id)
    }
}

impl ResourceId for CredentialId {
    fn decode(s: &str) -> Result<Self, IdError> {
        let format = Self::detect(s)?;
        if format != IdFormat::Current {
            return Err(IdError::Legacy {
                id: s.to_owned(),
                format,
            });
        }

        let mut parts = s.splitn(3, SEPARATOR);
        let (Some(object_id), Some(kind), Some(key_id)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(IdError::SegmentCount {
                id: s.to_owned(),
                expected: 3,
                found: s.split(SEPARATOR).count(),
            });
        };

        let kind = kind.parse::<CredentialKind>().map_err(|()| IdError::UnknownKind {
            id: s.to_owned(),
            kind: kind.to_owned(),
        })?;

        Ok(Self::new(object_id, kind, key_id))
    }

    fn decode_import(s: &str) -> Result<Self, IdError> {
        let id = Self::decode(s)?;
        ObjectId::parse_uuid(&id.object_id)?;
        ObjectId::parse_uuid(&id.key_id)?;
        Ok(id)
    }
}
