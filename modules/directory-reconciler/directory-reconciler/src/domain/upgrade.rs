//! Migration of persisted state written by older schema versions.

use crate::domain::error::ReconcileError;
use crate::domain::ids::{CredentialId, CredentialKind, IdError, IdFormat, ResourceId};
use crate::domain::state::PersistedState;

/// Rewrites a password credential identity into the current
/// `{objectId}/password/{keyId}` form.
///
/// Current-format identities are returned unchanged, so applying this twice
/// yields the same value as applying it once. A legacy flat identity carries
/// only the object ID; the key ID comes from the persisted `key_id` attribute.
///
/// # Errors
///
/// Returns [`IdError`] when `old` is malformed, or when it is a legacy flat
/// identity and `key_id` is missing or empty.
pub fn upgrade_password_id(old: &str, key_id: Option<&str>) -> Result<String, IdError> {
    match CredentialId::detect(old)? {
        IdFormat::Current => Ok(CredentialId::decode(old)?.to_string()),
        IdFormat::LegacyPair => {
            let (object_id, key_id) = old
                .split_once('/')
                .ok_or_else(|| IdError::EmptySegment { id: old.to_owned() })?;
            Ok(CredentialId::new(object_id, CredentialKind::Password, key_id).to_string())
        }
        IdFormat::LegacyFlat => {
            let key_id = key_id
                .filter(|k| !k.is_empty())
                .ok_or_else(|| IdError::MissingKeyId { id: old.to_owned() })?;
            Ok(CredentialId::new(old, CredentialKind::Password, key_id).to_string())
        }
    }
}

/// One migration step from `from_version` to `from_version + 1`.
#[derive(Clone, Copy)]
pub struct StateUpgrade {
    pub from_version: u32,
    pub apply: fn(PersistedState) -> Result<PersistedState, ReconcileError>,
}

impl std::fmt::Debug for StateUpgrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateUpgrade")
            .field("from_version", &self.from_version)
            .finish_non_exhaustive()
    }
}

/// Ordered set of [`StateUpgrade`] steps for one resource type.
#[derive(Debug, Clone, Default)]
pub struct UpgradeChain {
    steps: Vec<StateUpgrade>,
}

impl UpgradeChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_step(
        mut self,
        from_version: u32,
        apply: fn(PersistedState) -> Result<PersistedState, ReconcileError>,
    ) -> Self {
        self.steps.push(StateUpgrade {
            from_version,
            apply,
        });
        self
    }

    /// Applies steps one version at a time until `state` reaches `target`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `state` is newer than `target` or a step
    /// is missing, and propagates any error from a step.
    pub fn run(&self, mut state: PersistedState, target: u32) -> Result<PersistedState, ReconcileError> {
        if state.schema_version > target {
            return Err(ReconcileError::validation(
                "schema_version",
                format!(
                    "state was written by schema version {}, newer than supported version {target}",
                    state.schema_version
                ),
            ));
        }

        while state.schema_version < target {
            let version = state.schema_version;
            let step = self
                .steps
                .iter()
                .find(|s| s.from_version == version)
                .ok_or_else(|| {
                    ReconcileError::validation(
                        "schema_version",
                        format!("no state upgrade registered from schema version {version}"),
                    )
                })?;

            tracing::debug!(id = %state.id, from = version, to = version + 1, "upgrading persisted state");
            state = (step.apply)(state)?;
            state.schema_version = version + 1;
        }

        Ok(state)
    }
}
