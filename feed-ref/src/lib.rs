use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{borrow::Borrow, convert::TryFrom, fmt, str::FromStr};
use thiserror::Error as ThisError;
use uuid::Uuid;

const TEMPORARY_PREFIX: &str = "tmp-";

#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefError {
    #[error("Does not match as {ref_type}: {input:?}")]
    BadFormat {
        ref_type: &'static str,
        input: String,
    },
}

pub fn single_regex() -> &'static Regex {
    lazy_static! {
        static ref RE: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:@-]*$").unwrap();
    }
    &RE
}

pub fn is_match(string: &str) -> bool {
    single_regex().is_match(string)
}

macro_rules! string_ref {
    ($(#[$meta:meta])* $name:ident, $ref_type:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
        #[serde(try_from = "String")]
        pub struct $name(String);

        impl $name {
            pub fn from_string(string: String) -> Result<Self, RefError> {
                if !is_match(string.as_str()) {
                    Err(RefError::BadFormat {
                        ref_type: $ref_type,
                        input: string,
                    })
                } else {
                    Ok(Self(string))
                }
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl TryFrom<String> for $name {
            type Error = RefError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                $name::from_string(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = RefError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                $name::from_string(value.to_string())
            }
        }

        impl FromStr for $name {
            type Err = RefError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::from_string(s.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.0.as_str())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.0.as_str()
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<&$name> for String {
            fn from(value: &$name) -> String {
                value.0.clone()
            }
        }
    };
}

string_ref!(
    /// Identifies one feed item in the catalog.
    ItemId,
    "Item"
);
string_ref!(
    /// Identifies a member of the alumni directory.
    UserId,
    "User"
);
string_ref!(
    /// Identifies a comment within an item's comment sequence.
    ///
    /// Comments created optimistically carry a temporary id until the
    /// remote hands back the authoritative one.
    CommentId,
    "Comment"
);
string_ref!(OptionId, "PollOption");
string_ref!(GroupId, "Group");
string_ref!(EventId, "Event");
string_ref!(JobId, "Job");

impl ItemId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl CommentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn temporary() -> Self {
        Self(format!("{}{}", TEMPORARY_PREFIX, Uuid::new_v4()))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_PREFIX)
    }
}
