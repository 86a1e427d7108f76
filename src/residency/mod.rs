//! Fixed-capacity, reference-counted residency of logical resources in
//! device slots.
//!
//! [`SlotPool`] hands out slot indices, [`Registry`] owns every logical
//! resource, [`DeviceMirror`] keeps a flat record buffer in sync with the
//! device, and [`SlotManager`] ties them together.

pub mod field;
pub mod manager;
pub mod mirror;
pub mod record;
pub mod registry;
pub mod slots;

pub use field::Field;
pub use manager::{ResidencyState, SlotManager, SlotManagerConfig, SlotResource};
pub use mirror::DeviceMirror;
pub use record::PackedRecord;
pub use registry::{Entry, Registry, ResourceId};
pub use slots::SlotPool;
