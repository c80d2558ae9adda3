//! Object identities and adapter names.
//!
//! An [`Identity`] is a `(category, name)` pair naming a remote object. Its
//! string form is `category/name`, or just `name` when the category is empty.
//! [`AdapterName`] and [`ReplicaGroupName`] are opaque, non-empty strings.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, IDENTITY_SEPARATOR};

/// Identity of a remote object.
///
/// Deserialization applies the same checks as [`Identity::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "IdentityParts")]
pub struct Identity {
    category: String,
    name: String,
}

/// Unchecked wire form of an [`Identity`].
#[derive(Deserialize)]
struct IdentityParts {
    category: String,
    name: String,
}

impl TryFrom<IdentityParts> for Identity {
    type Error = Error;

    fn try_from(parts: IdentityParts) -> Result<Self, Self::Error> {
        Self::new(parts.category, parts.name)
    }
}

impl Identity {
    /// Creates an identity from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if `name` is empty or either part
    /// contains the `/` separator.
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Result<Self, Error> {
        let category = category.into();
        let name = name.into();

        if name.is_empty() {
            return Err(Error::InvalidIdentity("name cannot be empty".to_string()));
        }
        if category.contains(IDENTITY_SEPARATOR) || name.contains(IDENTITY_SEPARATOR) {
            return Err(Error::InvalidIdentity(format!(
                "'{}' separator not allowed inside category or name",
                IDENTITY_SEPARATOR
            )));
        }

        Ok(Self { category, name })
    }

    /// Parses `category/name` or `name`.
    pub fn parse(s: &str) -> Result<Self, Error> {
        match s.split_once(IDENTITY_SEPARATOR) {
            Some((category, name)) => Self::new(category, name),
            None => Self::new("", s),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.category.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}{}{}", self.category, IDENTITY_SEPARATOR, self.name)
        }
    }
}

impl FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

macro_rules! name_type {
    ($(#[$meta:meta])* $ty:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $ty(String);

        impl $ty {
            /// Parses a non-empty name.
            pub fn parse(s: &str) -> Result<Self, Error> {
                if s.trim().is_empty() {
                    return Err(Error::InvalidName(format!(
                        "{} cannot be empty",
                        stringify!($ty)
                    )));
                }
                Ok(Self(s.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $ty {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

name_type!(
    /// Name of an object adapter, a logical group of endpoints.
    AdapterName
);

name_type!(
    /// Name of a replica group, a set of interchangeable adapters.
    ReplicaGroupName
);
