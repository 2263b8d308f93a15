//! Client identity newtypes and tab-affinity ids.
//!
//! A [`ClientId`] is the caller-facing identity of a connection. When the
//! host offers tab-scoped storage, the id actually sent to the gateway is a
//! [`TabClientId`]: the client id suffixed with a time + random token that is
//! persisted per tab, so reloading a tab reattaches to the same server-side
//! dispatcher while separate tabs get their own.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage key prefix under which tab-affinity ids are persisted.
pub const TAB_STORAGE_KEY_PREFIX: &str = "jenkins-sse-gateway-client-";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_id!(
    /// Caller-facing connection identity.
    ClientId
);

string_id!(
    /// Id sent to the gateway: the client id, optionally tab-suffixed.
    TabClientId
);

impl From<&ClientId> for TabClientId {
    fn from(id: &ClientId) -> Self {
        Self(id.0.clone())
    }
}

/// Storage key for the tab-affinity id of `client_id`.
pub fn tab_storage_key(client_id: &ClientId) -> String {
    format!("{TAB_STORAGE_KEY_PREFIX}{client_id}")
}

/// Mint a fresh tab-affinity id: `{client}-{epoch millis}-{random base36}`.
pub fn mint_tab_client_id(client_id: &ClientId) -> TabClientId {
    let millis = chrono::Utc::now().timestamp_millis();
    let token = to_base36(u64::from(rand::random::<u32>()));
    TabClientId(format!("{client_id}-{millis}-{token}"))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_owned();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    digits.iter().rev().map(|&b| char::from(b)).collect()
}
