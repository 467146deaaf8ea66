//! Local pre-flight checks shared by resource adapters.

use std::collections::HashSet;

use uuid::Uuid;

use crate::domain::error::ReconcileError;

/// Rejects an empty or whitespace-only value.
///
/// # Errors
///
/// Returns a validation error for `field`.
pub fn non_empty(field: &str, value: &str) -> Result<(), ReconcileError> {
    if value.trim().is_empty() {
        return Err(ReconcileError::validation(field, "must not be empty"));
    }
    Ok(())
}

/// Requires a UUID.
///
/// # Errors
///
/// Returns a validation error for `field`.
pub fn uuid(field: &str, value: &str) -> Result<(), ReconcileError> {
    Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|_| ReconcileError::validation(field, format!("'{value}' is not a valid UUID")))
}

/// Requires a `local@domain` shape with exactly one `@`.
///
/// # Errors
///
/// Returns a validation error for `field`.
pub fn email_like(field: &str, value: &str) -> Result<(), ReconcileError> {
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ReconcileError::validation(
            field,
            format!("'{value}' must be in the form user@domain"),
        ));
    }
    Ok(())
}

/// Checks a claim value emitted in tokens: no whitespace, no leading `.`.
///
/// # Errors
///
/// Returns a validation error for `field`.
pub fn claim_value(field: &str, value: &str) -> Result<(), ReconcileError> {
    if value.is_empty() {
        return Err(ReconcileError::validation(field, "value must not be empty"));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(ReconcileError::validation(
            field,
            format!("value '{value}' must not contain whitespace"),
        ));
    }
    if value.starts_with('.') {
        return Err(ReconcileError::validation(
            field,
            format!("value '{value}' must not start with '.'"),
        ));
    }
    Ok(())
}

/// Requires pairwise-unique IDs and, where set, pairwise-unique values within
/// one group of entries.
///
/// # Errors
///
/// Returns a validation error for `field` naming the first repeated ID or
/// value.
pub fn unique_entries<'a>(
    field: &str,
    entries: impl IntoIterator<Item = (Uuid, Option<&'a str>)>,
) -> Result<(), ReconcileError> {
    let mut ids = HashSet::new();
    let mut values = HashSet::new();
    for (id, value) in entries {
        if !ids.insert(id) {
            return Err(ReconcileError::validation(field, format!("duplicate ID {id}")));
        }
        if let Some(value) = value
            && !values.insert(value)
        {
            return Err(ReconcileError::validation(
                field,
                format!("duplicate value '{value}'"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_like() {
        assert!(email_like("upn", "alice@contoso.com").is_ok());
        for bad in ["alice", "@contoso.com", "alice@", "a@b@c", "al ice@contoso.com"] {
            assert!(email_like("upn", bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_claim_value() {
        assert!(claim_value("app_role", "Billing.Read").is_ok());
        assert!(claim_value("app_role", "Billing Read").is_err());
        assert!(claim_value("app_role", ".hidden").is_err());
        assert!(claim_value("app_role", "").is_err());
    }

    #[test]
    fn test_unique_entries() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);

        assert!(unique_entries("app_role", [(a, Some("read")), (b, Some("write"))]).is_ok());
        assert!(unique_entries("app_role", [(a, None), (b, None)]).is_ok());

        let err = unique_entries("app_role", [(a, Some("read")), (b, Some("read"))]).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.field(), Some("app_role"));

        assert!(unique_entries("app_role", [(a, Some("read")), (a, Some("write"))]).is_err());
    }

    #[test]
    fn test_uuid_and_non_empty() {
        assert!(uuid("id", "00000000-0000-0000-0000-000000000001").is_ok());
        assert!(uuid("id", "nope").is_err());
        assert!(non_empty("display_name", " ").is_err());
        assert!(non_empty("display_name", "x").is_ok());
    }
}
