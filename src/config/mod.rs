//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - Builder constructors (for embedding)

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BusError, Result};

/// Environment variable holding the role (`initiator` / `responder`)
pub const ENV_ROLE: &str = "SYMBUS_ROLE";
/// Environment variable holding the transport connection string
pub const ENV_CONNECTION_STRING: &str = "SYMBUS_CONNECTION_STRING";
/// Environment variable holding the rendezvous queue name
pub const ENV_ROOT_QUEUE: &str = "SYMBUS_ROOT_QUEUE";
/// Environment variable holding the session queue name
pub const ENV_SESSION_QUEUE: &str = "SYMBUS_SESSION_QUEUE";

/// Which half of the negotiation an instance runs.
///
/// Fixed at construction and never changes for the lifetime of a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Generates the session ids and announces them.
    Initiator,
    /// Waits for an announcement and adopts its ids, cross-wired.
    Responder,
}

impl Role {
    /// Get descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initiator => "initiator",
            Self::Responder => "responder",
        }
    }

    /// True for [`Role::Initiator`].
    pub fn is_initiator(&self) -> bool {
        *self == Self::Initiator
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Role {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "initiator" | "server" => Ok(Self::Initiator),
            "responder" | "client" => Ok(Self::Responder),
            _ => Err(BusError::Config(format!("Unknown role: {s}"))),
        }
    }
}

/// Queue names used by a bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Shared rendezvous (announcement) queue
    pub root: String,

    /// Session-partitioned data queue
    pub session: String,
}

/// Construction options for a [`crate::SymmetricBus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Negotiation role
    pub role: Role,

    /// Transport connection descriptor, handed verbatim to the connector
    pub connection_string: String,

    /// Queue configuration
    pub queues: QueueConfig,
}

impl BusConfig {
    /// Create a configuration for the given role
    pub fn new(
        role: Role,
        connection_string: impl Into<String>,
        root_queue: impl Into<String>,
        session_queue: impl Into<String>,
    ) -> Self {
        Self {
            role,
            connection_string: connection_string.into(),
            queues: QueueConfig {
                root: root_queue.into(),
                session: session_queue.into(),
            },
        }
    }

    /// Create an initiator configuration
    pub fn initiator(
        connection_string: impl Into<String>,
        root_queue: impl Into<String>,
        session_queue: impl Into<String>,
    ) -> Self {
        Self::new(Role::Initiator, connection_string, root_queue, session_queue)
    }

    /// Create a responder configuration
    pub fn responder(
        connection_string: impl Into<String>,
        root_queue: impl Into<String>,
        session_queue: impl Into<String>,
    ) -> Self {
        Self::new(Role::Responder, connection_string, root_queue, session_queue)
    }

    /// Same queues and connection, different role
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let role = require_env(ENV_ROLE)?.parse()?;
        let config = Self::new(
            role,
            require_env(ENV_CONNECTION_STRING)?,
            require_env(ENV_ROOT_QUEUE)?,
            require_env(ENV_SESSION_QUEUE)?,
        );
        config.validate()?;
        Ok(config)
    }

    /// Check that every field is usable
    pub fn validate(&self) -> Result<()> {
        if self.connection_string.trim().is_empty() {
            return Err(BusError::Config("connection string is empty".to_string()));
        }
        if self.queues.root.trim().is_empty() {
            return Err(BusError::Config("root queue name is empty".to_string()));
        }
        if self.queues.session.trim().is_empty() {
            return Err(BusError::Config("session queue name is empty".to_string()));
        }
        if self.queues.root == self.queues.session {
            return Err(BusError::Config(format!(
                "root and session queue must differ (both '{}')",
                self.queues.root
            )));
        }
        Ok(())
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| BusError::Config(format!("{key} is not set")))
}
