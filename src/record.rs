//! Kinetic records
//!
//! The unit a successful read returns and a write stores.

use crate::protocol::Algorithm;

/// A value with its version, integrity tag and tag algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KineticRecord {
    value: Vec<u8>,
    version: Vec<u8>,
    tag: Vec<u8>,
    algorithm: Option<Algorithm>,
}

impl KineticRecord {
    pub fn new(
        value: impl Into<Vec<u8>>,
        version: impl Into<Vec<u8>>,
        tag: impl Into<Vec<u8>>,
        algorithm: Option<Algorithm>,
    ) -> Self {
        Self {
            value: value.into(),
            version: version.into(),
            tag: tag.into(),
            algorithm,
        }
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn version(&self) -> &[u8] {
        &self.version
    }

    pub fn tag(&self) -> &[u8] {
        &self.tag
    }

    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    pub fn into_value(self) -> Vec<u8> {
        self.value
    }
}
