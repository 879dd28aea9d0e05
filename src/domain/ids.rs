//! Domain identifier types with validation
//!
//! Newtype wrappers for the identifiers that key deduplication and batch
//! files. Each type rejects empty values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Creates a new ", $label, " from a string")]
            pub fn new(id: impl Into<String>) -> Result<Self, String> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(format!("{} cannot be empty", $label));
                }
                Ok(Self(id))
            }

            #[doc = concat!("Returns the ", $label, " as a string slice")]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes self and returns the inner String
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a sampling event (`dwc:eventID`)
    ///
    /// ```
    /// use dwca_publisher::domain::ids::EventId;
    /// use std::str::FromStr;
    ///
    /// let id = EventId::from_str("urn:lsid:artportalen.se:event:42").unwrap();
    /// assert_eq!(id.as_str(), "urn:lsid:artportalen.se:event:42");
    /// ```
    EventId,
    "Event ID"
);

string_id!(
    /// Identifier of a single occurrence (`dwc:occurrenceID`)
    OccurrenceId,
    "Occurrence ID"
);

string_id!(
    /// Batch identifier supplied by the caller of `write_batch`
    ///
    /// The empty batch id is represented by [`BatchId::default_batch`].
    BatchId,
    "Batch ID"
);

impl BatchId {
    /// The batch used when a caller passes an empty batch id
    pub fn default_batch() -> Self {
        Self("default".to_string())
    }

    /// Resolve a caller-supplied batch id, mapping empty strings to the default batch
    pub fn resolve(raw: &str) -> Self {
        Self::new(raw).unwrap_or_else(|_| Self::default_batch())
    }

    /// File-name safe form of the id
    pub fn file_suffix(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect()
    }
}
