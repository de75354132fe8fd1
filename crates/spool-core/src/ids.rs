use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(MessageId, "msg");
branded_id!(SnapshotId, "snap");

/// Maximum accepted length for a caller-supplied thread key.
pub const MAX_THREAD_KEY_LEN: usize = 256;

/// A caller-supplied conversation key. Unlike generated ids, thread keys
/// arrive over the wire and must be validated before touching storage.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadKey(String);

impl ThreadKey {
    /// Validate and wrap a raw key. Rejects empty keys, keys over
    /// [`MAX_THREAD_KEY_LEN`] bytes, and keys containing whitespace or
    /// control characters.
    pub fn parse(raw: &str) -> Result<Self, ThreadKeyError> {
        if raw.is_empty() {
            return Err(ThreadKeyError::Empty);
        }
        if raw.len() > MAX_THREAD_KEY_LEN {
            return Err(ThreadKeyError::TooLong {
                len: raw.len(),
                max: MAX_THREAD_KEY_LEN,
            });
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ThreadKeyError::InvalidChars);
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ThreadKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ThreadKey {
    type Err = ThreadKeyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ThreadKeyError {
    #[error("thread key is empty")]
    Empty,
    #[error("thread key is {len} bytes, maximum is {max}")]
    TooLong { len: usize, max: usize },
    #[error("thread key contains whitespace or control characters")]
    InvalidChars,
}
