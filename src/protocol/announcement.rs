//! Announcement record exchanged on the rendezvous queue.
//!
//! Wire shape (JSON):
//!
//! ```text
//! { "localSessionId": "<uuid>", "remoteSessionId": "<uuid>", "clientVersion": 1 }
//! ```
//!
//! Ids are always from the point of view of the sender (the initiator).

use serde::{Deserialize, Serialize};

use super::identity::SessionIdentity;
use super::CLIENT_VERSION;
use crate::error::{BusError, Result};

/// Identity metadata published once by an initiator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    /// Partition the initiator listens on
    pub local_session_id: String,
    /// Partition the initiator will send to
    pub remote_session_id: String,
    /// Protocol version tag
    pub client_version: u32,
}

impl Announcement {
    /// Build the announcement for an initiator's identity
    pub fn from_identity(identity: &SessionIdentity) -> Self {
        Self {
            local_session_id: identity.local.clone(),
            remote_session_id: identity.remote.clone(),
            client_version: CLIENT_VERSION,
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode and validate an announcement body.
    ///
    /// Every failure, including a well-formed record with unusable
    /// identifiers or an unknown version, is reported as
    /// [`BusError::MalformedAnnouncement`].
    pub fn from_json(json: &str) -> Result<Self> {
        let announcement: Self = serde_json::from_str(json)
            .map_err(|e| BusError::MalformedAnnouncement(e.to_string()))?;
        announcement.validate()?;
        Ok(announcement)
    }

    /// Check ids are present and distinct and the version is understood
    pub fn validate(&self) -> Result<()> {
        if self.client_version != CLIENT_VERSION {
            return Err(BusError::MalformedAnnouncement(format!(
                "unsupported client version {} (expected {})",
                self.client_version, CLIENT_VERSION
            )));
        }
        if self.local_session_id.is_empty() || self.remote_session_id.is_empty() {
            return Err(BusError::MalformedAnnouncement(
                "empty session id".to_string(),
            ));
        }
        if self.local_session_id == self.remote_session_id {
            return Err(BusError::MalformedAnnouncement(
                "local and remote session ids are identical".to_string(),
            ));
        }
        Ok(())
    }

    /// Identity a responder adopts from this record, cross-wired.
    pub fn responder_identity(&self) -> SessionIdentity {
        SessionIdentity::cross_wired(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let announcement = Announcement {
            local_session_id: "a".to_string(),
            remote_session_id: "b".to_string(),
            client_version: 1,
        };
        let json = announcement.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"localSessionId":"a","remoteSessionId":"b","clientVersion":1}"#
        );
    }

    #[test]
    fn test_parse_valid() {
        let parsed = Announcement::from_json(
            r#"{"localSessionId":"a","remoteSessionId":"b","clientVersion":1}"#,
        )
        .unwrap();
        assert_eq!(parsed.local_session_id, "a");
        assert_eq!(parsed.remote_session_id, "b");
    }

    #[test]
    fn test_parse_garbage() {
        let err = Announcement::from_json("not json").unwrap_err();
        assert!(matches!(err, BusError::MalformedAnnouncement(_)));

        let err = Announcement::from_json(r#"{"localSessionId":"a"}"#).unwrap_err();
        assert!(matches!(err, BusError::MalformedAnnouncement(_)));
    }

    #[test]
    fn test_rejects_unusable_ids() {
        for body in [
            r#"{"localSessionId":"","remoteSessionId":"b","clientVersion":1}"#,
            r#"{"localSessionId":"a","remoteSessionId":"a","clientVersion":1}"#,
            r#"{"localSessionId":"a","remoteSessionId":"b","clientVersion":2}"#,
        ] {
            assert!(
                matches!(
                    Announcement::from_json(body),
                    Err(BusError::MalformedAnnouncement(_))
                ),
                "accepted {body}"
            );
        }
    }

    #[test]
    fn test_from_identity() {
        let identity = SessionIdentity::generate();
        let announcement = Announcement::from_identity(&identity);
        assert_eq!(announcement.local_session_id, identity.local);
        assert_eq!(announcement.remote_session_id, identity.remote);
        assert_eq!(announcement.client_version, CLIENT_VERSION);
        assert!(announcement.validate().is_ok());
    }
}
