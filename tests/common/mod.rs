//! Common utilities for residency integration tests.
//!
//! Tests run against every backend through `&dyn GraphicsBackend`; device
//! contents are checked with `read_buffer`, which waits for queued writes.

#![allow(dead_code)]

use slotted_renderer::backend::BufferHandle;
use slotted_renderer::{DummyBackend, GraphicsBackend, WgpuBackend};

/// Available GPU backends for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Dummy backend (CPU-side buffers, always available).
    Dummy,
    /// WebGPU backend (via wgpu, needs an adapter).
    WebGpu,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Dummy => "dummy",
            Backend::WebGpu => "webgpu",
        }
    }
}

/// Test context owning the device for one test.
pub struct TestContext {
    pub backend: Backend,
    device: Box<dyn GraphicsBackend>,
}

impl TestContext {
    /// Create a context for the given backend.
    ///
    /// Returns `None` if the backend is not available on this machine.
    pub fn new(backend: Backend) -> Option<Self> {
        init_logging();
        let device: Box<dyn GraphicsBackend> = match backend {
            Backend::Dummy => Box::new(DummyBackend::new()),
            Backend::WebGpu => Box::new(WgpuBackend::new_headless().ok()?),
        };
        Some(Self { backend, device })
    }

    pub fn device(&self) -> &dyn GraphicsBackend {
        self.device.as_ref()
    }

    /// Read back a buffer range after all queued writes complete.
    pub fn read(&self, buffer: BufferHandle, offset: u64, size: u64) -> Vec<u8> {
        self.device
            .read_buffer(buffer, offset, size)
            .expect("Failed to read back buffer")
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
