//! Residency error types

use crate::backend::BackendError;
use thiserror::Error;

/// Errors reported by slot pools, registries and the managers built on them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    /// The slot pool has no empty slot left.
    #[error("capacity exceeded: all {capacity} slots are occupied")]
    CapacityExceeded { capacity: u32 },

    /// A resource could not be activated because every slot is in use.
    #[error("out of resources: all {capacity} {kind} slots are in use")]
    OutOfResources { kind: &'static str, capacity: u32 },

    /// Unknown resource id or name, or an unresolved texture name.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// The caller broke a usage or slot invariant.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The device failed to create an object.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl SlotError {
    pub(crate) fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    /// True for both pool-level and manager-level exhaustion.
    pub fn is_out_of_resources(&self) -> bool {
        matches!(
            self,
            SlotError::CapacityExceeded { .. } | SlotError::OutOfResources { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SlotError::NotFound { .. })
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, SlotError::InvalidState(_))
    }
}

pub type SlotResult<T> = Result<T, SlotError>;
