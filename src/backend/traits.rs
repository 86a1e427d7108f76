//! Core backend abstraction traits
//!
//! [`GraphicsBackend`] is the whole device capability the residency layer relies
//! on: allocate buffers and textures, write bytes at an offset, and create
//! views, samplers and bind groups. Writes are queued by the device and never
//! awaited.

use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create bind group: {0}")]
    BindGroupCreationFailed(String),
    #[error("Failed to read back buffer: {0}")]
    ReadbackFailed(String),
    #[error("Out of memory")]
    OutOfMemory,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a texture view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewHandle(pub(crate) u64);

/// Handle to a sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerHandle(pub(crate) u64);

/// Handle to a bind group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupHandle(pub(crate) u64);

/// Handle to a bind group layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutHandle(pub(crate) u64);

/// Bind group entry for creating bind groups
#[derive(Debug, Clone)]
pub enum BindGroupEntry {
    Buffer {
        buffer: BufferHandle,
        offset: u64,
        size: Option<u64>,
    },
    Texture(TextureViewHandle),
    Sampler(SamplerHandle),
}

/// Bind group layout entry
#[derive(Debug, Clone)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub visibility: ShaderStageFlags,
    pub ty: BindingType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderStageFlags(u32);

impl ShaderStageFlags {
    pub const VERTEX: Self = Self(1 << 0);
    pub const FRAGMENT: Self = Self(1 << 1);
    pub const VERTEX_FRAGMENT: Self = Self((1 << 0) | (1 << 1));

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for ShaderStageFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Binding type
#[derive(Debug, Clone)]
pub enum BindingType {
    StorageBuffer {
        read_only: bool,
    },
    Texture {
        sample_type: TextureSampleType,
        view_dimension: TextureViewDimension,
    },
    Sampler {
        comparison: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSampleType {
    Float { filterable: bool },
    Depth,
}

/// Device capability consumed by the slot managers.
///
/// Methods take `&self`: implementations synchronize their own handle tables,
/// so a backend can be shared between threads that each hold a pool lock.
pub trait GraphicsBackend {
    /// Human readable backend name
    fn name(&self) -> &'static str;

    /// Create a buffer
    fn create_buffer(&self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    /// Write data to a buffer. Queued; never waits for completion.
    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]);

    /// Copy `size` bytes starting at `offset` back to the CPU.
    ///
    /// Blocks until the device has finished all queued work; meant for tests
    /// and debugging tools, not the frame loop.
    fn read_buffer(&self, buffer: BufferHandle, offset: u64, size: u64) -> BackendResult<Vec<u8>>;

    /// Create a texture; `desc.depth` array layers
    fn create_texture(&self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Create a texture view
    fn create_texture_view(
        &self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> BackendResult<TextureViewHandle>;

    /// Write tightly packed texel data into one array layer
    fn write_texture(
        &self,
        texture: TextureHandle,
        layer: u32,
        data: &[u8],
        width: u32,
        height: u32,
    );

    /// Create a sampler
    fn create_sampler(&self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle>;

    /// Create a bind group layout
    fn create_bind_group_layout(
        &self,
        label: Option<&str>,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle>;

    /// Create a bind group
    fn create_bind_group(
        &self,
        label: Option<&str>,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle>;

    /// Destroy a buffer
    fn destroy_buffer(&self, buffer: BufferHandle);

    /// Destroy a texture
    fn destroy_texture(&self, texture: TextureHandle);

    /// Destroy a texture view
    fn destroy_texture_view(&self, view: TextureViewHandle);

    /// Destroy a sampler
    fn destroy_sampler(&self, sampler: SamplerHandle);

    /// Destroy a bind group layout
    fn destroy_bind_group_layout(&self, layout: BindGroupLayoutHandle);

    /// Destroy a bind group
    fn destroy_bind_group(&self, bind_group: BindGroupHandle);
}
