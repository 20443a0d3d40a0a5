//! Three-way federated attribute merge.
//!
//! On every login sync each optional profile field is resolved from
//! three sources: the value the IdP asserts now, the value the IdP
//! asserted last time (the snapshot kept on the external-id binding),
//! and the value currently stored (which may be user-supplied). An
//! IdP-sourced change always wins; a user override survives as long as
//! the IdP keeps asserting the same value, or stops asserting the
//! attribute entirely.

use serde_json::Value;
use tracing::info;

use crate::models::account::Account;

/// Allowed affiliation values. Anything else is forced to `member`.
pub const AFFILIATION_VALUES: &[&str] = &[
    "faculty",
    "student",
    "staff",
    "employee",
    "member",
    "affiliate",
    "alum",
    "library-walk-in",
];

/// The merged field set applied to an account on registration sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationUpdate {
    pub displayname: String,
    pub email: String,
    pub first_name: Option<String>,
    pub surname: Option<String>,
    pub phone_number: Option<String>,
    pub mobile_number: Option<String>,
    pub organisation: Option<String>,
    pub orcid: Option<String>,
    pub affiliation: Option<String>,
}

/// Normalize an attribute value: trim whitespace, empty becomes absent.
#[must_use]
pub fn normalize(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Resolve one field from its three sources.
///
/// All inputs are normalized before resolution. Returns the value to
/// store.
#[must_use]
pub fn merge_field(
    current_idp: Option<&str>,
    previous_idp: Option<&str>,
    stored: Option<&str>,
) -> Option<String> {
    let current_idp = normalize(current_idp);
    let previous_idp = normalize(previous_idp);
    let stored = normalize(stored);

    match (current_idp, previous_idp) {
        // Attribute not (or no longer) provided by the IdP: keep what we
        // had, which may be a user-supplied value.
        (None, _) => stored,
        // First time the IdP asserts this attribute: it overrides any
        // existing value.
        (Some(current), None) => Some(current),
        (Some(current), Some(previous)) => {
            if stored.is_none() || current != previous {
                // Nothing stored yet, or the IdP changed the value:
                // adopt the IdP value, replacing any user override.
                Some(current)
            } else {
                // IdP value unchanged: a user override survives.
                stored
            }
        }
    }
}

fn attr<'a>(attrs: &'a Value, key: &str) -> Option<&'a str> {
    attrs.get(key).and_then(Value::as_str)
}

fn merge_named(
    attrs: &Value,
    previous: &Value,
    key: &str,
    stored: Option<&str>,
    subject: &str,
) -> Option<String> {
    let current_idp = attr(attrs, key);
    let previous_idp = attr(previous, key);
    let merged = merge_field(current_idp, previous_idp, stored);

    let stored_norm = normalize(stored);
    if merged != stored_norm {
        if previous_idp.is_none() && stored_norm.is_some() {
            info!(
                attribute = key,
                user = subject,
                old = ?stored_norm,
                new = ?merged,
                "IdP overrode attribute"
            );
        } else if normalize(previous_idp).is_some() {
            info!(
                attribute = key,
                user = subject,
                old = ?normalize(previous_idp),
                new = ?merged,
                "IdP changed attribute"
            );
        }
    }
    merged
}

/// Build the registration update for an account from the current IdP
/// attribute map and the previous snapshot.
///
/// Display name and email are not merged: they are always overwritten
/// from the current attributes. `attrs` must carry `fullname` and
/// `mail`; missing values fall back to the stored ones.
#[must_use]
pub fn build_registration_update(
    account: &Account,
    attrs: &Value,
    previous: &Value,
) -> RegistrationUpdate {
    let displayname = normalize(attr(attrs, "fullname"))
        .or_else(|| account.displayname.clone())
        .unwrap_or_default();
    let email = normalize(attr(attrs, "mail"))
        .or_else(|| account.email.clone())
        .unwrap_or_default();
    let subject = displayname.clone();

    // A real or test IdP can hand us bogus affiliation values, or none
    // at all. Every synced account carries at least `member`.
    let affiliation = match merge_named(
        attrs,
        previous,
        "affiliation",
        account.affiliation.as_deref(),
        &subject,
    ) {
        Some(value) if AFFILIATION_VALUES.contains(&value.as_str()) => Some(value),
        other => {
            info!(
                user = %subject,
                old = ?other,
                new = "member",
                "Fixed bad affiliation"
            );
            Some("member".to_string())
        }
    };

    RegistrationUpdate {
        displayname,
        email,
        first_name: merge_named(
            attrs,
            previous,
            "firstname",
            account.first_name.as_deref(),
            &subject,
        ),
        surname: merge_named(
            attrs,
            previous,
            "surname",
            account.surname.as_deref(),
            &subject,
        ),
        phone_number: merge_named(
            attrs,
            previous,
            "telephonenumber",
            account.phone_number.as_deref(),
            &subject,
        ),
        mobile_number: merge_named(
            attrs,
            previous,
            "mobilenumber",
            account.mobile_number.as_deref(),
            &subject,
        ),
        organisation: merge_named(
            attrs,
            previous,
            "organisation",
            account.organisation.as_deref(),
            &subject,
        ),
        orcid: merge_named(attrs, previous, "orcid", account.orcid.as_deref(), &subject),
        affiliation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    use crate::models::account::AccountState;

    fn account() -> Account {
        Account {
            id: 42,
            displayname: Some("A B".to_string()),
            email: Some("a@x.com".to_string()),
            state: AccountState::Registered,
            registered_at: Some(Utc::now()),
            terms_accepted_at: Some(Utc::now()),
            terms_version: Some("v1".to_string()),
            last_login: None,
            keystone_user_id: None,
            ignore_username_not_email: false,
            first_name: None,
            surname: None,
            phone_number: None,
            mobile_number: None,
            organisation: None,
            orcid: None,
            affiliation: None,
            expiry_status: None,
            expiry_next_step: None,
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Some("  x  ")), Some("x".to_string()));
        assert_eq!(normalize(Some("   ")), None);
        assert_eq!(normalize(Some("")), None);
        assert_eq!(normalize(None), None);
    }

    #[test]
    fn test_merge_absent_keeps_stored() {
        // IdP silent: user-supplied value survives.
        assert_eq!(
            merge_field(None, None, Some("kept")),
            Some("kept".to_string())
        );
        assert_eq!(
            merge_field(None, Some("was-here"), Some("kept")),
            Some("kept".to_string())
        );
        assert_eq!(merge_field(None, None, None), None);
    }

    #[test]
    fn test_merge_first_assertion_overrides() {
        // IdP asserts for the first time: overrides any stored value.
        assert_eq!(
            merge_field(Some("idp"), None, Some("user")),
            Some("idp".to_string())
        );
        assert_eq!(merge_field(Some("idp"), None, None), Some("idp".to_string()));
    }

    #[test]
    fn test_merge_unchanged_idp_keeps_override() {
        assert_eq!(
            merge_field(Some("same"), Some("same"), Some("override")),
            Some("override".to_string())
        );
    }

    #[test]
    fn test_merge_changed_idp_replaces_override() {
        assert_eq!(
            merge_field(Some("new"), Some("old"), Some("override")),
            Some("new".to_string())
        );
    }

    #[test]
    fn test_merge_no_stored_adopts_current() {
        assert_eq!(
            merge_field(Some("v"), Some("v"), None),
            Some("v".to_string())
        );
    }

    #[test]
    fn test_merge_is_idempotent() {
        // Applying the same attribute map twice leaves the merged
        // result unchanged after the second application.
        let first = merge_field(Some("v2"), Some("v1"), Some("user"));
        assert_eq!(first, Some("v2".to_string()));
        // Second application: previous snapshot now reports v2 as well.
        let second = merge_field(Some("v2"), Some("v2"), first.as_deref());
        assert_eq!(second, first);
    }

    #[test]
    fn test_bad_affiliation_forced_to_member() {
        let acct = account();
        let attrs = json!({
            "fullname": "A B",
            "mail": "a@x.com",
            "affiliation": "parasite",
        });
        let update = build_registration_update(&acct, &attrs, &json!({}));
        assert_eq!(update.affiliation, Some("member".to_string()));
    }

    #[test]
    fn test_absent_affiliation_defaults_to_member() {
        let acct = account();
        let attrs = json!({
            "fullname": "A B",
            "mail": "a@x.com",
        });
        let update = build_registration_update(&acct, &attrs, &json!({}));
        assert_eq!(update.affiliation, Some("member".to_string()));
    }

    #[test]
    fn test_valid_affiliation_kept() {
        let acct = account();
        let attrs = json!({
            "fullname": "A B",
            "mail": "a@x.com",
            "affiliation": "staff",
        });
        let update = build_registration_update(&acct, &attrs, &json!({}));
        assert_eq!(update.affiliation, Some("staff".to_string()));
    }

    #[test]
    fn test_displayname_and_email_always_overwritten() {
        let acct = account();
        let attrs = json!({
            "fullname": "New Name",
            "mail": "new@x.com",
        });
        let update = build_registration_update(&acct, &attrs, &json!({}));
        assert_eq!(update.displayname, "New Name");
        assert_eq!(update.email, "new@x.com");
    }

    #[test]
    fn test_full_update_merges_profile_fields() {
        let mut acct = account();
        acct.phone_number = Some("12345".to_string());
        acct.organisation = Some("User Supplied Org".to_string());

        let attrs = json!({
            "fullname": "A B",
            "mail": "a@x.com",
            "firstname": "A",
            "surname": "B",
            "organisation": "Example University",
        });
        // Previous snapshot asserted the same organisation: the stored
        // user override wins. firstname/surname are first assertions.
        let previous = json!({ "organisation": "Example University" });

        let update = build_registration_update(&acct, &attrs, &previous);
        assert_eq!(update.first_name, Some("A".to_string()));
        assert_eq!(update.surname, Some("B".to_string()));
        assert_eq!(update.phone_number, Some("12345".to_string()));
        assert_eq!(update.organisation, Some("User Supplied Org".to_string()));
        assert_eq!(update.orcid, None);
    }
}
