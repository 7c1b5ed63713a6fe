use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a node participating in execution.
    NodeId
);

string_id!(
    /// Identifier of one flow execution; the unit of partitioning.
    ExecutionId
);

string_id!(
    /// Identifier of a step inside a flow execution.
    StepId
);

string_id!(
    /// Identifier of a CRDT operation.
    OperationId
);

string_id!(
    /// Address returned by a content-addressable store.
    ContentId
);

impl OperationId {
    /// Generate a fresh random operation id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
