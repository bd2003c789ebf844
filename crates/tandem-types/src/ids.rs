//! Stable numeric identifiers.

use serde::{Deserialize, Serialize};

/// Identifier of an exchanged data field.
///
/// Assigned by the embedding configuration and stable for the lifetime of a
/// coupling run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DataId(pub i32);

impl DataId {
    pub fn new(id: i32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for DataId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "data-{}", self.0)
    }
}

/// Identifier of the mesh a data field lives on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MeshId(pub i32);

impl MeshId {
    pub fn new(id: i32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MeshId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mesh-{}", self.0)
    }
}
