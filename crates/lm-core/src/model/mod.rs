use serde::{Deserialize, Serialize};
use std::fmt;

mod geo;
mod record;
mod snapshot;

pub use geo::{DateRange, GeoPoint};
pub use record::{Emotion, MediaKind, MediaRef, Record};
pub use snapshot::Snapshot;

/// Stable key of a record inside its collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

/// Identity of the user owning a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

macro_rules! impl_string_key {
    ($($t:ident),*) => {
        $(
            impl $t {
                pub fn new(value: impl Into<String>) -> Self {
                    Self(value.into())
                }

                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl fmt::Display for $t {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $t {
                fn from(value: &str) -> Self {
                    Self(value.to_string())
                }
            }

            impl From<String> for $t {
                fn from(value: String) -> Self {
                    Self(value)
                }
            }
        )*
    }
}

impl_string_key!(RecordId, OwnerId);
