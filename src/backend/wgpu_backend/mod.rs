//! wgpu backend implementation

use crate::backend::traits::*;
use crate::backend::types::*;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Resource storage behind the opaque handles
#[derive(Default)]
struct ResourceTables {
    buffers: HashMap<u64, wgpu::Buffer>,
    textures: HashMap<u64, wgpu::Texture>,
    texture_views: HashMap<u64, wgpu::TextureView>,
    samplers: HashMap<u64, wgpu::Sampler>,
    bind_group_layouts: HashMap<u64, wgpu::BindGroupLayout>,
    bind_groups: HashMap<u64, wgpu::BindGroup>,

    // Handle counters
    next_buffer_id: u64,
    next_texture_id: u64,
    next_view_id: u64,
    next_sampler_id: u64,
    next_layout_id: u64,
    next_bind_group_id: u64,
}

impl ResourceTables {
    fn bump(counter: &mut u64) -> u64 {
        *counter += 1;
        *counter
    }
}

/// wgpu backend implementation
///
/// Either adopts a device the host application already owns (the host keeps
/// the surface and presentation) or creates a headless one.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    resources: RwLock<ResourceTables>,
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }

    fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
        let mut result = wgpu::BufferUsages::empty();
        if usage.contains(BufferUsage::MAP_READ) {
            result |= wgpu::BufferUsages::MAP_READ;
        }
        if usage.contains(BufferUsage::COPY_SRC) {
            result |= wgpu::BufferUsages::COPY_SRC;
        }
        if usage.contains(BufferUsage::COPY_DST) {
            result |= wgpu::BufferUsages::COPY_DST;
        }
        if usage.contains(BufferUsage::STORAGE) {
            result |= wgpu::BufferUsages::STORAGE;
        }
        result
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_SRC) {
            result |= wgpu::TextureUsages::COPY_SRC;
        }
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        result
    }

    fn convert_view_dimension(dimension: TextureViewDimension) -> wgpu::TextureViewDimension {
        match dimension {
            TextureViewDimension::D2 => wgpu::TextureViewDimension::D2,
            TextureViewDimension::D2Array => wgpu::TextureViewDimension::D2Array,
        }
    }

    fn convert_compare_function(func: CompareFunction) -> wgpu::CompareFunction {
        match func {
            CompareFunction::Never => wgpu::CompareFunction::Never,
            CompareFunction::Less => wgpu::CompareFunction::Less,
            CompareFunction::Equal => wgpu::CompareFunction::Equal,
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::Greater => wgpu::CompareFunction::Greater,
            CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
            CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        }
    }

    fn convert_filter_mode(mode: FilterMode) -> wgpu::FilterMode {
        match mode {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }

    fn convert_address_mode(mode: AddressMode) -> wgpu::AddressMode {
        match mode {
            AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
        }
    }

    fn convert_binding_type(ty: &BindingType) -> wgpu::BindingType {
        match ty {
            BindingType::StorageBuffer { read_only } => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage {
                    read_only: *read_only,
                },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            BindingType::Texture {
                sample_type,
                view_dimension,
            } => wgpu::BindingType::Texture {
                sample_type: match sample_type {
                    TextureSampleType::Float { filterable } => {
                        wgpu::TextureSampleType::Float { filterable: *filterable }
                    }
                    TextureSampleType::Depth => wgpu::TextureSampleType::Depth,
                },
                view_dimension: Self::convert_view_dimension(*view_dimension),
                multisampled: false,
            },
            BindingType::Sampler { comparison } => wgpu::BindingType::Sampler(if *comparison {
                wgpu::SamplerBindingType::Comparison
            } else {
                wgpu::SamplerBindingType::Filtering
            }),
        }
    }
}

impl WgpuBackend {
    /// Wrap a device and queue owned by the host application
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            resources: RwLock::new(ResourceTables::default()),
        }
    }

    /// Create a device without a surface
    pub async fn new_headless_async() -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Residency Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        Ok(Self::new(device, queue))
    }

    /// Blocking variant of [`WgpuBackend::new_headless_async`]
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new_headless() -> BackendResult<Self> {
        pollster::block_on(Self::new_headless_async())
    }

    /// Get reference to the wgpu device
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get reference to the wgpu queue
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Run `f` with the wgpu buffer behind a handle
    pub fn with_buffer<T>(
        &self,
        buffer: BufferHandle,
        f: impl FnOnce(&wgpu::Buffer) -> T,
    ) -> Option<T> {
        self.resources.read().buffers.get(&buffer.0).map(f)
    }

    /// Run `f` with the wgpu texture view behind a handle
    pub fn with_texture_view<T>(
        &self,
        view: TextureViewHandle,
        f: impl FnOnce(&wgpu::TextureView) -> T,
    ) -> Option<T> {
        self.resources.read().texture_views.get(&view.0).map(f)
    }

    /// Run `f` with the wgpu bind group behind a handle
    pub fn with_bind_group<T>(
        &self,
        bind_group: BindGroupHandle,
        f: impl FnOnce(&wgpu::BindGroup) -> T,
    ) -> Option<T> {
        self.resources.read().bind_groups.get(&bind_group.0).map(f)
    }
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size: desc.size,
            usage: Self::convert_buffer_usage(desc.usage),
            mapped_at_creation: desc.mapped_at_creation,
        });

        let mut tables = self.resources.write();
        let id = ResourceTables::bump(&mut tables.next_buffer_id);
        tables.buffers.insert(id, buffer);

        Ok(BufferHandle(id))
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        if let Some(buf) = self.resources.read().buffers.get(&buffer.0) {
            self.queue.write_buffer(buf, offset, data);
        }
    }

    fn read_buffer(&self, buffer: BufferHandle, offset: u64, size: u64) -> BackendResult<Vec<u8>> {
        let align = wgpu::COPY_BUFFER_ALIGNMENT;
        let aligned_offset = offset - offset % align;
        let aligned_end = (offset + size).div_ceil(align) * align;
        let copy_size = aligned_end - aligned_offset;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size: copy_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        {
            let tables = self.resources.read();
            let source = tables
                .buffers
                .get(&buffer.0)
                .ok_or_else(|| BackendError::ReadbackFailed("Buffer not found".into()))?;
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Readback Encoder"),
                });
            encoder.copy_buffer_to_buffer(source, aligned_offset, &staging, 0, copy_size);
            self.queue.submit(Some(encoder.finish()));
        }

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?;

        let start = (offset - aligned_offset) as usize;
        let bytes = {
            let mapped = slice.get_mapped_range();
            mapped[start..start + size as usize].to_vec()
        };
        staging.unmap();

        Ok(bytes)
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.depth,
            },
            mip_level_count: desc.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(desc.format),
            usage: Self::convert_texture_usage(desc.usage),
            view_formats: &[],
        });

        let mut tables = self.resources.write();
        let id = ResourceTables::bump(&mut tables.next_texture_id);
        tables.textures.insert(id, texture);

        Ok(TextureHandle(id))
    }

    fn create_texture_view(
        &self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> BackendResult<TextureViewHandle> {
        let mut tables = self.resources.write();
        let tex = tables
            .textures
            .get(&texture.0)
            .ok_or_else(|| BackendError::TextureCreationFailed("Texture not found".into()))?;

        let view = tex.create_view(&wgpu::TextureViewDescriptor {
            label: desc.label.as_deref(),
            dimension: Some(Self::convert_view_dimension(desc.dimension)),
            base_array_layer: desc.base_array_layer,
            array_layer_count: desc.array_layer_count,
            ..Default::default()
        });

        let id = ResourceTables::bump(&mut tables.next_view_id);
        tables.texture_views.insert(id, view);

        Ok(TextureViewHandle(id))
    }

    fn write_texture(
        &self,
        texture: TextureHandle,
        layer: u32,
        data: &[u8],
        width: u32,
        height: u32,
    ) {
        if let Some(tex) = self.resources.read().textures.get(&texture.0) {
            let bytes_per_row = data.len() as u32 / height.max(1);
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: tex,
                    mip_level: 0,
                    origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: Self::convert_address_mode(desc.address_mode_u),
            address_mode_v: Self::convert_address_mode(desc.address_mode_v),
            address_mode_w: Self::convert_address_mode(desc.address_mode_w),
            mag_filter: Self::convert_filter_mode(desc.mag_filter),
            min_filter: Self::convert_filter_mode(desc.min_filter),
            mipmap_filter: Self::convert_filter_mode(desc.mipmap_filter),
            lod_min_clamp: 0.0,
            lod_max_clamp: f32::MAX,
            compare: desc.compare.map(Self::convert_compare_function),
            anisotropy_clamp: 1,
            border_color: None,
        });

        let mut tables = self.resources.write();
        let id = ResourceTables::bump(&mut tables.next_sampler_id);
        tables.samplers.insert(id, sampler);

        Ok(SamplerHandle(id))
    }

    fn create_bind_group_layout(
        &self,
        label: Option<&str>,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        let wgpu_entries: Vec<wgpu::BindGroupLayoutEntry> = entries
            .iter()
            .map(|e| {
                let mut visibility = wgpu::ShaderStages::empty();
                if e.visibility.contains(ShaderStageFlags::VERTEX) {
                    visibility |= wgpu::ShaderStages::VERTEX;
                }
                if e.visibility.contains(ShaderStageFlags::FRAGMENT) {
                    visibility |= wgpu::ShaderStages::FRAGMENT;
                }

                wgpu::BindGroupLayoutEntry {
                    binding: e.binding,
                    visibility,
                    ty: Self::convert_binding_type(&e.ty),
                    count: None,
                }
            })
            .collect();

        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label,
                entries: &wgpu_entries,
            });

        let mut tables = self.resources.write();
        let id = ResourceTables::bump(&mut tables.next_layout_id);
        tables.bind_group_layouts.insert(id, layout);

        Ok(BindGroupLayoutHandle(id))
    }

    fn create_bind_group(
        &self,
        label: Option<&str>,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let bind_group = {
            let tables = self.resources.read();
            let layout_ref = tables
                .bind_group_layouts
                .get(&layout.0)
                .ok_or_else(|| BackendError::BindGroupCreationFailed("Layout not found".into()))?;

            let mut wgpu_entries = Vec::with_capacity(entries.len());
            for (binding, entry) in entries {
                let resource = match entry {
                    BindGroupEntry::Buffer { buffer, offset, size } => {
                        let buf = tables.buffers.get(&buffer.0).ok_or_else(|| {
                            BackendError::BindGroupCreationFailed(format!(
                                "Buffer {:?} not found",
                                buffer
                            ))
                        })?;
                        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: buf,
                            offset: *offset,
                            size: size.and_then(std::num::NonZeroU64::new),
                        })
                    }
                    BindGroupEntry::Texture(view) => {
                        let v = tables.texture_views.get(&view.0).ok_or_else(|| {
                            BackendError::BindGroupCreationFailed(format!(
                                "View {:?} not found",
                                view
                            ))
                        })?;
                        wgpu::BindingResource::TextureView(v)
                    }
                    BindGroupEntry::Sampler(sampler) => {
                        let s = tables.samplers.get(&sampler.0).ok_or_else(|| {
                            BackendError::BindGroupCreationFailed(format!(
                                "Sampler {:?} not found",
                                sampler
                            ))
                        })?;
                        wgpu::BindingResource::Sampler(s)
                    }
                };
                wgpu_entries.push(wgpu::BindGroupEntry {
                    binding: *binding,
                    resource,
                });
            }

            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label,
                layout: layout_ref,
                entries: &wgpu_entries,
            })
        };

        let mut tables = self.resources.write();
        let id = ResourceTables::bump(&mut tables.next_bind_group_id);
        tables.bind_groups.insert(id, bind_group);

        Ok(BindGroupHandle(id))
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        if let Some(buf) = self.resources.write().buffers.remove(&buffer.0) {
            buf.destroy();
        }
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        if let Some(tex) = self.resources.write().textures.remove(&texture.0) {
            tex.destroy();
        }
    }

    fn destroy_texture_view(&self, view: TextureViewHandle) {
        self.resources.write().texture_views.remove(&view.0);
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        self.resources.write().samplers.remove(&sampler.0);
    }

    fn destroy_bind_group_layout(&self, layout: BindGroupLayoutHandle) {
        self.resources.write().bind_group_layouts.remove(&layout.0);
    }

    fn destroy_bind_group(&self, bind_group: BindGroupHandle) {
        self.resources.write().bind_groups.remove(&bind_group.0);
    }
}
