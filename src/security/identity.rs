//! Who a request is attributed to.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};

/// Subject of a validated access credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable subject id (`user_id` claim, falling back to `sub`).
    pub subject_id: String,
    /// Human-readable name (`sub` claim).
    pub display_name: String,
    /// Natural expiry of the credential.
    pub expires_at: DateTime<Utc>,
}

/// Key used for rate limiting: the authenticated subject when there is one,
/// otherwise the caller's address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientIdentity {
    User(Identity),
    Address(IpAddr),
}

impl ClientIdentity {
    /// Cache key fragment, e.g. `user:42` or `ip:10.0.0.7`.
    pub fn rate_key(&self) -> String {
        match self {
            ClientIdentity::User(identity) => format!("user:{}", identity.subject_id),
            ClientIdentity::Address(ip) => format!("ip:{ip}"),
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            ClientIdentity::User(identity) => Some(identity),
            ClientIdentity::Address(_) => None,
        }
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rate_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_keys() {
        let user = ClientIdentity::User(Identity {
            subject_id: "42".into(),
            display_name: "alice".into(),
            expires_at: Utc::now(),
        });
        assert_eq!(user.rate_key(), "user:42");
        assert_eq!(user.identity().map(|i| i.display_name.as_str()), Some("alice"));

        let anon = ClientIdentity::Address("10.0.0.7".parse().unwrap());
        assert_eq!(anon.rate_key(), "ip:10.0.0.7");
        assert!(anon.identity().is_none());
    }
}
