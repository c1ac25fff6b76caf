//! Opaque, string-backed identifiers.
//!
//! Every entity in the data model carries an ID that is "an opaque string
//! unique within its kind" (spec data model, §3). We still want the
//! type-checker to stop a `DocumentId` from being passed where a `JobId` is
//! expected, so each kind gets its own newtype generated by [`define_id`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generates a fresh random identifier (UUIDv4 rendered as a string).
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

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
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

define_id!(JobId);
define_id!(DocumentId);
define_id!(DocumentChunkId);
define_id!(DocumentQueryId);
define_id!(KnowledgeBaseId);
define_id!(PluginFeedId);
define_id!(PluginExecutionId);
define_id!(ExperienceId);
define_id!(ExperienceRunId);
define_id!(UserId);
