//! Schema version advertised in the `X-Ezchat-Protocol` header.
//!
//! The client sends its version on every REST request and reads the server's
//! back from the response. A major mismatch means the message schema may have
//! changed under us.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Version of the message schema this client understands.
pub const PROTOCOL_VERSION: Version = Version::new(1, 0);

/// Header carrying [`PROTOCOL_VERSION`] on REST requests and responses.
pub const PROTOCOL_VERSION_HEADER: &str = "X-Ezchat-Protocol";

/// A `major.minor` schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

/// How a peer's version relates to ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    Exact,
    /// Same major, the peer has additions we ignore.
    PeerNewer,
    /// Same major, the peer lacks additions we may send.
    PeerOlder,
    Incompatible,
}

impl Compatibility {
    pub fn is_compatible(self) -> bool {
        self != Compatibility::Incompatible
    }
}

/// A version header that is not `major.minor`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid protocol version {0:?}")]
pub struct ParseVersionError(String);

impl Version {
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Classify `peer` relative to `self`.
    #[must_use]
    pub fn compare(&self, peer: &Version) -> Compatibility {
        if self.major != peer.major {
            Compatibility::Incompatible
        } else if peer.minor > self.minor {
            Compatibility::PeerNewer
        } else if peer.minor < self.minor {
            Compatibility::PeerOlder
        } else {
            Compatibility::Exact
        }
    }
}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseVersionError(value.to_string());
        let (major, minor) = value.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Self::new(
            major.parse().map_err(|_| invalid())?,
            minor.parse().map_err(|_| invalid())?,
        ))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
