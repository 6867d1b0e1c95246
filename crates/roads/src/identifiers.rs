//! Typed identifiers for roads and their derived segments.
//!
//! Road ids come straight from the source data (OSM way ids), segment ids are
//! local to one index and handed out in insertion order.

use std::fmt;

macro_rules! impl_identifier {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

impl_identifier!(RoadId);
impl_identifier!(SegmentId);

impl SegmentId {
    /// The id following this one in an auto-incrementing sequence
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}
