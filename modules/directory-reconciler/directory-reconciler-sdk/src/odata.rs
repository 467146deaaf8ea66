use std::fmt;

/// Single-field `OData` equality filter, e.g. `userPrincipalName eq 'alice@example.com'`.
///
/// This is the only filter shape the reconciler issues. Callers treat a
/// `list` result with more than one match as an error and an empty result as
/// not-found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ODataFilter {
    field: &'static str,
    value: String,
}

impl ODataFilter {
    /// Builds `field eq 'value'`.
    #[must_use]
    pub fn eq(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }

    /// The filtered property name.
    #[must_use]
    pub fn field(&self) -> &'static str {
        self.field
    }

    /// The unescaped comparison value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for ODataFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // OData string literals escape a single quote by doubling it
        write!(f, "{} eq '{}'", self.field, self.value.replace('\'', "''"))
    }
}
