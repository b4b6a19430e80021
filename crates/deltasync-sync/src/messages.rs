//! Pull protocol message types.
//!
//! Field names are the JSON names existing clients send and expect.

use deltasync_core::{Checksum, ContentHash, Patch};
use serde::{Deserialize, Serialize};

/// A client asking to be brought up to date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    #[serde(rename = "accountID")]
    pub account_id: String,

    #[serde(rename = "clientID")]
    pub client_id: String,

    /// Hex hash of the state the client last saw; empty if none.
    #[serde(rename = "baseStateID", default)]
    pub base_state_id: String,

    /// Checksum the client computed for that state; 8 hex digits.
    #[serde(default)]
    pub checksum: String,

    /// Opaque credential forwarded to the client view source.
    #[serde(
        rename = "clientViewAuth",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_view_auth: Option<String>,
}

impl PullRequest {
    /// A request from a client with no prior state.
    pub fn fresh(account_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            client_id: client_id.into(),
            base_state_id: String::new(),
            checksum: String::new(),
            client_view_auth: None,
        }
    }

    /// A request from a client that last saw `state_id` with `checksum`.
    pub fn from_state(
        account_id: impl Into<String>,
        client_id: impl Into<String>,
        state_id: &ContentHash,
        checksum: Checksum,
    ) -> Self {
        Self {
            base_state_id: state_id.to_hex(),
            checksum: checksum.to_hex(),
            ..Self::fresh(account_id, client_id)
        }
    }
}

/// The server's answer to a pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Hash of the head the patch leads to.
    #[serde(rename = "stateID")]
    pub state_id: ContentHash,

    #[serde(rename = "lastMutationID")]
    pub last_mutation_id: u64,

    /// Edit script from the client's basis (or from anything, on full
    /// resync) to the head.
    pub patch: Patch,

    /// Checksum of the head; clients verify their result against it.
    pub checksum: Checksum,

    /// Outcome of the upstream refresh, if one was attempted.
    #[serde(
        rename = "clientViewInfo",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_view_info: Option<ClientViewInfo>,
}

impl PullResponse {
    /// Whether the patch starts by clearing the client's state.
    pub fn is_full_resync(&self) -> bool {
        self.patch.first().is_some_and(|op| op.is_remove_all())
    }
}

/// Diagnostic result of fetching the client view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientViewInfo {
    /// HTTP status of the upstream call; 0 if no response was received.
    #[serde(rename = "httpStatusCode")]
    pub http_status_code: u16,

    /// Empty on success.
    #[serde(rename = "errorMessage")]
    pub error_message: String,
}

impl ClientViewInfo {
    pub fn ok() -> Self {
        Self {
            http_status_code: 200,
            error_message: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltasync_core::Operation;

    #[test]
    fn test_request_field_names() {
        let json = r#"{"accountID":"acct","clientID":"c1","baseStateID":"","checksum":"00000000"}"#;
        let req: PullRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.account_id, "acct");
        assert_eq!(req.client_id, "c1");
        assert_eq!(req.checksum, "00000000");
        assert!(req.client_view_auth.is_none());

        let minimal: PullRequest =
            serde_json::from_str(r#"{"accountID":"a","clientID":"c"}"#).unwrap();
        assert_eq!(minimal, PullRequest::fresh("a", "c"));
    }

    #[test]
    fn test_response_serialization() {
        let resp = PullResponse {
            state_id: ContentHash::from_bytes([0xab; 32]),
            last_mutation_id: 3,
            patch: vec![Operation::remove_all()],
            checksum: Checksum::from_u32(0x0102_0304),
            client_view_info: None,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(
            json,
            format!(
                r#"{{"stateID":"{}","lastMutationID":3,"patch":[{{"op":"remove","path":"/"}}],"checksum":"01020304"}}"#,
                "ab".repeat(32)
            )
        );
        assert!(resp.is_full_resync());

        let back: PullResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resp);
    }

    #[test]
    fn test_client_view_info_names() {
        let info = ClientViewInfo {
            http_status_code: 500,
            error_message: "boom".into(),
        };
        assert_eq!(
            serde_json::to_string(&info).unwrap(),
            r#"{"httpStatusCode":500,"errorMessage":"boom"}"#
        );
    }
}
