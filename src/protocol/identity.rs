//! Session identity: the pair of partitions one peer listens on and sends to.

use super::announcement::Announcement;

/// Listen / send partitions of one peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentity {
    /// Partition this peer listens on
    pub local: String,
    /// Partition this peer sends to
    pub remote: String,
}

impl SessionIdentity {
    /// Fresh pair of distinct random ids (initiator side)
    pub fn generate() -> Self {
        Self {
            local: uuid::Uuid::new_v4().to_string(),
            remote: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Adopt an initiator's announcement.
    ///
    /// Intentionally cross-wired: we listen where the initiator sends and
    /// send where it listens.
    pub fn cross_wired(announcement: &Announcement) -> Self {
        Self {
            local: announcement.remote_session_id.clone(),
            remote: announcement.local_session_id.clone(),
        }
    }

    /// The identity the other end of this session holds
    pub fn reciprocal(&self) -> Self {
        Self {
            local: self.remote.clone(),
            remote: self.local.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generate_distinct_non_empty() {
        let identity = SessionIdentity::generate();
        assert!(!identity.local.is_empty());
        assert!(!identity.remote.is_empty());
        assert_ne!(identity.local, identity.remote);

        let other = SessionIdentity::generate();
        assert_ne!(identity.local, other.local);
    }

    #[test]
    fn test_cross_wired() {
        let initiator = SessionIdentity {
            local: "A".to_string(),
            remote: "B".to_string(),
        };
        let responder = SessionIdentity::cross_wired(&Announcement::from_identity(&initiator));
        assert_eq!(responder.local, "B");
        assert_eq!(responder.remote, "A");
    }

    proptest! {
        #[test]
        fn prop_cross_wiring_is_reciprocal(local in "[a-z0-9-]{1,36}", remote in "[a-z0-9-]{1,36}") {
            prop_assume!(local != remote);
            let initiator = SessionIdentity { local, remote };
            let responder = Announcement::from_identity(&initiator).responder_identity();

            // each side listens where the other sends
            prop_assert_eq!(&responder.local, &initiator.remote);
            prop_assert_eq!(&responder.remote, &initiator.local);
            prop_assert_eq!(responder.reciprocal(), initiator);
        }
    }
}
