//! Backend abstraction layer
//!
//! Provides the device capability trait plus a wgpu implementation and a
//! CPU-side dummy used by tests and headless tools.

pub mod dummy;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use dummy::{BufferWrite, DummyBackend};
pub use traits::*;
pub use types::*;
pub use wgpu_backend::WgpuBackend;
