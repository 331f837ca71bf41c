//! Validated identifier types for rooms, users and events

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Longest identifier of any kind, in bytes
pub const MAX_SIZE: usize = 255;

#[derive(Debug, Clone, Error)]
#[error("invalid {kind}: {value:?}")]
pub struct InvalidId {
    pub kind: &'static str,
    pub value: String,
}

fn check_host(value: &str) -> bool {
    matches!(value.split_once(':'), Some((local, host)) if local.len() > 1 && !host.is_empty())
}

macro_rules! define_validated {
    ($(
        $(#[$attr:meta])*
        $name:ident($sigil:literal, $value:ident) $body:block
    )*) => {$(
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub const SIGIL: char = $sigil;

            /// Check whether the provided value is valid for this type.
            pub fn validate($value: &str) -> Result<(), InvalidId> {
                let valid = $value.len() > 1
                    && $value.len() <= MAX_SIZE
                    && $value.starts_with($sigil)
                    && !$value.contains('\0')
                    && $body;

                if valid {
                    Ok(())
                } else {
                    Err(InvalidId {
                        kind: stringify!($name),
                        value: $value.to_string(),
                    })
                }
            }

            pub fn new(value: impl Into<String>) -> Result<Self, InvalidId> {
                let value = value.into();
                Self::validate(&value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn as_bytes(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }

        impl TryFrom<String> for $name {
            type Error = InvalidId;

            fn try_from(value: String) -> Result<Self, InvalidId> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = InvalidId;

            fn try_from(value: &str) -> Result<Self, InvalidId> {
                Self::new(value)
            }
        }

        impl FromStr for $name {
            type Err = InvalidId;

            fn from_str(value: &str) -> Result<Self, InvalidId> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    )*};
}

define_validated! {
    /// `!opaque:origin`
    RoomId('!', value) {
        check_host(value)
    }

    /// `@localpart:origin`
    UserId('@', value) {
        check_host(value)
    }

    /// `$reference` or, for old room versions, `$opaque:origin`
    EventId('$', value) {
        !value.contains(char::is_whitespace)
    }
}

impl UserId {
    /// The sigil and localpart, e.g. `@alice`
    pub fn local(&self) -> &str {
        self.0.split_once(':').map_or(&self.0, |(local, _)| local)
    }

    /// The server name, e.g. `example.org`
    pub fn host(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, host)| host)
    }
}

impl RoomId {
    pub fn host(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, host)| host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation() {
        assert!(RoomId::new("!abc:example.org").is_ok());
        assert!(RoomId::new("!abc").is_err());
        assert!(RoomId::new("#abc:example.org").is_err());
        assert!(UserId::new("@:example.org").is_err());
        assert!(EventId::new("$").is_err());
        assert!(EventId::new("$abc def").is_err());
        assert!(EventId::new("$".to_string() + &"a".repeat(MAX_SIZE)).is_err());
    }

    #[test]
    fn user_parts() {
        let user = UserId::new("@alice:example.org").unwrap();
        assert_eq!(user.local(), "@alice");
        assert_eq!(user.host(), "example.org");
    }

    #[test]
    fn serde_validates() {
        let ok: RoomId = serde_json::from_str("\"!r:x\"").unwrap();
        assert_eq!(ok.as_str(), "!r:x");
        assert!(serde_json::from_str::<UserId>("\"bob\"").is_err());
    }
}
