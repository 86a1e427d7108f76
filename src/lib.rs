//! Slotted Renderer - fixed-capacity GPU residency for materials and shadow maps
//!
//! A scene can hold any number of materials and shadow maps, but only a fixed
//! number of them live on the device at once. Each resident resource owns one
//! slot of a flat record buffer (and, for shadow maps, one layer of a depth
//! texture array); shaders index records by slot.
//!
//! # Features
//! - Reference-counted slot pools with lowest-free-slot reuse
//! - Packed, shader-visible records kept in sync through a CPU mirror
//! - Whole-buffer and diff uploads
//! - Layered texture library resolved by name
//! - wgpu backend plus a CPU-side dummy backend for tests and tools

pub mod backend;
pub mod error;
pub mod residency;
pub mod resources;
pub mod scene;
pub mod shaders;

use std::sync::Arc;

use parking_lot::Mutex;

pub use backend::{DummyBackend, GraphicsBackend, WgpuBackend};
pub use error::{SlotError, SlotResult};
pub use residency::{
    Field, ResidencyState, ResourceId, SlotManager, SlotManagerConfig, SlotResource,
};
pub use resources::{
    Material, MaterialDescriptor, MaterialId, MaterialManager, MaterialManagerConfig, ShadowMap,
    ShadowMapConfig, ShadowMapDescriptor, ShadowMapId, ShadowMapper, TextureData, TextureLibrary,
    TextureLibraryConfig, TextureLookup,
};

/// A pool guarded by one lock, for hosts that touch it from several threads
pub type Shared<T> = Arc<Mutex<T>>;

/// Configuration for every pool of a [`Residency`]
#[derive(Debug, Clone, Default)]
pub struct ResidencyConfig {
    pub materials: MaterialManagerConfig,
    pub shadows: ShadowMapConfig,
    pub textures: TextureLibraryConfig,
}

impl ResidencyConfig {
    pub fn with_material_capacity(mut self, capacity: u32) -> Self {
        self.materials.capacity = capacity;
        self
    }

    pub fn with_shadow_map_capacity(mut self, capacity: u32) -> Self {
        self.shadows.capacity = capacity;
        self
    }

    pub fn with_shadow_map_resolution(mut self, resolution: u32) -> Self {
        self.shadows.resolution = resolution;
        self
    }

    pub fn with_texture_capacity(mut self, capacity: u32) -> Self {
        self.textures.capacity = capacity;
        self
    }

    pub fn with_texture_size(mut self, layer_size: u32) -> Self {
        self.textures.layer_size = layer_size;
        self
    }
}

/// Material table, shadow mapper and the texture library materials refer to
pub struct Residency {
    pub materials: MaterialManager,
    pub shadows: ShadowMapper,
    pub textures: TextureLibrary,
}

impl Residency {
    pub fn new<B: GraphicsBackend + ?Sized>(
        backend: &B,
        config: &ResidencyConfig,
    ) -> SlotResult<Self> {
        Ok(Self {
            materials: MaterialManager::new(backend, &config.materials)?,
            shadows: ShadowMapper::new(backend, &config.shadows)?,
            textures: TextureLibrary::new(backend, &config.textures)?,
        })
    }

    /// Create a material with texture names resolved by the bundled library
    pub fn create_material(&mut self, descriptor: MaterialDescriptor) -> SlotResult<MaterialId> {
        self.materials.create_from(descriptor, &self.textures)
    }

    pub fn apply_material_descriptor<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        id: MaterialId,
        descriptor: MaterialDescriptor,
    ) -> SlotResult<()> {
        self.materials.apply_descriptor(backend, id, descriptor, &self.textures)
    }

    pub fn into_shared(self) -> Shared<Self> {
        Arc::new(Mutex::new(self))
    }

    pub fn destroy<B: GraphicsBackend + ?Sized>(self, backend: &B) {
        self.materials.destroy(backend);
        self.shadows.destroy(backend);
        self.textures.destroy(backend);
    }
}

/// Install the logger: `env_logger` natively (`RUST_LOG`, default `info`),
/// the browser console on the web. Safe to call more than once.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("info");
    let _ = env_logger::Builder::from_env(env).try_init();
}

#[cfg(target_arch = "wasm32")]
pub fn init_logging() {
    // Set up panic hook for better error messages in console
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}
