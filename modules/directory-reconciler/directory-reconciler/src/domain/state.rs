//! Resource state as returned to callers and as persisted between runs.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized state of one managed object.
#[derive(Debug, Clone)]
pub struct ResourceState<I, R> {
    pub id: I,
    /// Schema version `record` conforms to.
    pub schema_version: u32,
    /// Last-read snapshot of the object's attributes.
    pub record: R,
    /// Write-only value the service never returns on read (a user password or
    /// a generated application secret). Carried across refreshes.
    pub secret: Option<SecretString>,
}

/// Outcome of refreshing a known object against the service.
#[derive(Debug, Clone)]
pub enum Drift<I, R> {
    /// The object no longer exists; it should be removed from state.
    Absent,
    /// The service matches the last snapshot.
    InSync(ResourceState<I, R>),
    /// The service changed outside of reconciliation.
    Drifted {
        state: ResourceState<I, R>,
        /// Attribute paths that differ from the previous snapshot.
        changed: Vec<String>,
    },
}

impl<I, R> Drift<I, R> {
    /// The refreshed state, unless the object is gone.
    #[must_use]
    pub fn state(&self) -> Option<&ResourceState<I, R>> {
        match self {
            Self::Absent => None,
            Self::InSync(state) | Self::Drifted { state, .. } => Some(state),
        }
    }

    #[must_use]
    pub fn into_state(self) -> Option<ResourceState<I, R>> {
        match self {
            Self::Absent => None,
            Self::InSync(state) | Self::Drifted { state, .. } => Some(state),
        }
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// On-disk shape of a [`ResourceState`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub schema_version: u32,
    pub id: String,
    pub attributes: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl PersistedState {
    #[must_use]
    pub fn new(schema_version: u32, id: impl Into<String>, attributes: Value) -> Self {
        Self {
            schema_version,
            id: id.into(),
            attributes,
            secret: None,
        }
    }

    #[must_use]
    pub fn with_secret(mut self, secret: Option<&SecretString>) -> Self {
        self.secret = secret.map(|s| s.expose_secret().to_owned());
        self
    }

    /// String attribute by name, if present and non-empty.
    #[must_use]
    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
    }
}

impl fmt::Debug for PersistedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedState")
            .field("schema_version", &self.schema_version)
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Attribute paths whose values differ between two JSON snapshots.
///
/// Objects are compared key by key and reported as dotted paths; any other
/// value (including arrays) is compared as a whole.
#[must_use]
pub fn changed_paths(old: &Value, new: &Value) -> Vec<String> {
    let mut changed = Vec::new();
    collect_changes("", old, new, &mut changed);
    changed
}

fn collect_changes(prefix: &str, old: &Value, new: &Value, out: &mut Vec<String>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            let mut keys: Vec<&String> = a.keys().chain(b.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                collect_changes(
                    &path,
                    a.get(key).unwrap_or(&Value::Null),
                    b.get(key).unwrap_or(&Value::Null),
                    out,
                );
            }
        }
        _ if old != new => out.push(prefix.to_owned()),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_changed_paths_reports_nested_keys() {
        let old = json!({ "display_name": "a", "web": { "logout_url": null, "redirect_uris": ["x"] } });
        let new = json!({ "display_name": "a", "web": { "logout_url": "https://l", "redirect_uris": ["x", "y"] } });
        assert_eq!(
            changed_paths(&old, &new),
            vec!["web.logout_url".to_owned(), "web.redirect_uris".to_owned()]
        );
    }

    #[test]
    fn test_changed_paths_missing_key_equals_null() {
        let old = json!({ "city": null });
        let new = json!({});
        assert!(changed_paths(&old, &new).is_empty());
    }

    #[test]
    fn test_persisted_state_serde_shape() {
        let state = PersistedState::new(1, "obj/password/key", json!({ "key_id": "key" }))
            .with_secret(Some(&SecretString::from("s3cret".to_owned())));
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(
            value,
            json!({
                "schema_version": 1,
                "id": "obj/password/key",
                "attributes": { "key_id": "key" },
                "secret": "s3cret"
            })
        );
        let back: PersistedState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
        assert!(!format!("{back:?}").contains("s3cret"));
    }

    #[test]
    fn test_attribute_str_ignores_empty() {
        let state = PersistedState::new(0, "x", json!({ "key_id": "", "other": "v" }));
        assert_eq!(state.attribute_str("key_id"), None);
        assert_eq!(state.attribute_str("other"), Some("v"));
        assert_eq!(state.attribute_str("missing"), None);
    }
}
