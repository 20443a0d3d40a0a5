//! Work request payloads.

use serde::{Deserialize, Serialize};

/// Identity attributes captured at registration time.
///
/// `id`, `mail` and `fullname` are required; everything else is
/// optional profile enrichment carried through to the stored account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistrationAttrs {
    /// Persistent federated identifier.
    pub id: String,
    pub mail: String,
    pub fullname: String,
    /// Entity id of the identity provider the user arrived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telephonenumber: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobilenumber: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organisation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orcid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
}

/// A unit of work carried through the durable queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkRequest {
    /// Provision directory resources for a freshly registered account.
    CreateUser { attrs: RegistrationAttrs },

    /// Re-run the ORCID lookup for an existing account.
    RefreshOrcid {
        account_id: i64,
        /// Overrides the stored email when present.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },

    /// Push the stored profile back out to the directory record.
    SyncDirectoryUser {
        account_id: i64,
        /// Also reset the directory username to the stored email.
        #[serde(default)]
        set_username_as_email: bool,
    },
}

impl WorkRequest {
    /// Short label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            WorkRequest::CreateUser { .. } => "create_user",
            WorkRequest::RefreshOrcid { .. } => "refresh_orcid",
            WorkRequest::SyncDirectoryUser { .. } => "sync_directory_user",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs() -> RegistrationAttrs {
        RegistrationAttrs {
            id: "idp!sp!abc123".to_string(),
            mail: "alice@example.edu".to_string(),
            fullname: "Alice Example".to_string(),
            idp: Some("https://idp.example.edu/idp".to_string()),
            firstname: Some("Alice".to_string()),
            surname: Some("Example".to_string()),
            telephonenumber: None,
            mobilenumber: None,
            organisation: Some("Example University".to_string()),
            orcid: None,
            affiliation: Some("staff".to_string()),
        }
    }

    #[test]
    fn test_request_round_trip() {
        let request = WorkRequest::CreateUser { attrs: attrs() };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["kind"], "create_user");
        assert_eq!(json["attrs"]["mail"], "alice@example.edu");

        let back: WorkRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_refresh_orcid_omits_absent_email() {
        let request = WorkRequest::RefreshOrcid {
            account_id: 42,
            email: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["kind"], "refresh_orcid");
        assert!(json.get("email").is_none());
    }

    #[test]
    fn test_sync_defaults_username_flag() {
        let json = serde_json::json!({
            "kind": "sync_directory_user",
            "account_id": 7,
        });
        let request: WorkRequest = serde_json::from_value(json).unwrap();
        assert_eq!(
            request,
            WorkRequest::SyncDirectoryUser {
                account_id: 7,
                set_username_as_email: false,
            }
        );
    }
}
