//! Shadow maps resident in a depth texture array
//!
//! Slot `n` owns both record `n` of the shadow record buffer and layer `n` of
//! the depth texture array. A per-frame shadow pass renders each entry of
//! [`ShadowMapper::passes`] into its layer; lighting shaders read the records
//! and sample the array with the comparison sampler.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{SlotError, SlotResult};
use crate::residency::{
    Field, PackedRecord, ResourceId, SlotManager, SlotManagerConfig, SlotResource,
};
use crate::scene::{DirectionalLight, LightId, SpotLight};

pub const DEFAULT_DEPTH_BIAS: f32 = 0.005;
pub const DEFAULT_NORMAL_BIAS: f32 = 0.02;
pub const DEFAULT_NAME: &str = "shadow map";

/// Id of a shadow map registered with a [`ShadowMapper`]
pub type ShadowMapId = ResourceId<ShadowMap>;

/// One light's shadow map
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowMap {
    pub name: String,
    pub light: Option<LightId>,
    pub view: Mat4,
    pub projection: Mat4,
    pub depth_bias: f32,
    pub normal_bias: f32,
}

impl Default for ShadowMap {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            light: None,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            depth_bias: DEFAULT_DEPTH_BIAS,
            normal_bias: DEFAULT_NORMAL_BIAS,
        }
    }
}

impl ShadowMap {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Orthographic shadow of a directional light over a box around `center`
    pub fn directional(
        name: &str,
        light: &DirectionalLight,
        center: Vec3,
        half_extent: f32,
    ) -> Self {
        let distance = half_extent * 2.0;
        Self {
            name: name.to_string(),
            view: light.shadow_view(center, distance),
            projection: light.shadow_projection(half_extent, 0.1, distance * 2.0),
            ..Default::default()
        }
    }

    /// Perspective shadow of a spot light's cone
    pub fn spot(name: &str, light: &SpotLight) -> Self {
        Self {
            name: name.to_string(),
            view: light.shadow_view(),
            projection: light.shadow_projection(0.1),
            ..Default::default()
        }
    }

    pub fn with_light(mut self, light: LightId) -> Self {
        self.light = Some(light);
        self
    }

    pub fn with_bias(mut self, depth_bias: f32, normal_bias: f32) -> Self {
        self.depth_bias = depth_bias;
        self.normal_bias = normal_bias;
        self
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view
    }

    pub fn apply_descriptor(&mut self, descriptor: ShadowMapDescriptor) {
        descriptor.name.merge_into(&mut self.name, DEFAULT_NAME.to_string());
        descriptor.light.merge_option(&mut self.light);
        descriptor.view.merge_into(&mut self.view, Mat4::IDENTITY);
        descriptor.projection.merge_into(&mut self.projection, Mat4::IDENTITY);
        descriptor.depth_bias.merge_into(&mut self.depth_bias, DEFAULT_DEPTH_BIAS);
        descriptor.normal_bias.merge_into(&mut self.normal_bias, DEFAULT_NORMAL_BIAS);
    }
}

impl SlotResource for ShadowMap {
    type Record = ShadowMapRecord;
    const KIND: &'static str = "shadow map";

    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, slot: u32) -> ShadowMapRecord {
        ShadowMapRecord {
            view_proj: self.view_proj(),
            params: Vec4::new(self.depth_bias, self.normal_bias, slot as f32, 1.0),
        }
    }
}

/// Shadow-map record for GPU, 80 bytes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShadowMapRecord {
    pub view_proj: Mat4,
    /// x = depth bias, y = normal bias, z = array layer, w = 1 when live
    pub params: Vec4,
}

impl ShadowMapRecord {
    pub fn is_live(&self) -> bool {
        self.params.w != 0.0
    }

    pub fn layer(&self) -> u32 {
        self.params.z as u32
    }
}

impl PackedRecord for ShadowMapRecord {
    const WGSL_NAME: &'static str = "ShadowMapRecord";
    const MEMBERS: &'static [(&'static str, usize)] = &[
        ("view_proj", std::mem::offset_of!(ShadowMapRecord, view_proj)),
        ("params", std::mem::offset_of!(ShadowMapRecord, params)),
    ];

    fn wgsl() -> &'static str {
        crate::shaders::SHADOW_MAP_RECORD_WGSL
    }
}

/// Partial shadow-map update; `Clear` restores defaults and detaches the light.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadowMapDescriptor {
    pub name: Field<String>,
    pub light: Field<LightId>,
    pub view: Field<Mat4>,
    pub projection: Field<Mat4>,
    pub depth_bias: Field<f32>,
    pub normal_bias: Field<f32>,
}

/// Shadow mapper configuration
#[derive(Debug, Clone)]
pub struct ShadowMapConfig {
    /// Number of shadow maps resident at once
    pub capacity: u32,
    /// Width and height of each depth layer
    pub resolution: u32,
    pub format: TextureFormat,
}

impl Default for ShadowMapConfig {
    fn default() -> Self {
        Self {
            capacity: 4,
            resolution: 2048,
            format: TextureFormat::Depth32Float,
        }
    }
}

impl ShadowMapConfig {
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.resolution = resolution;
        self
    }
}

/// What a shadow pass needs to render one resident map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowPass {
    pub id: ShadowMapId,
    pub slot: u32,
    /// Depth attachment for this map's layer
    pub view: TextureViewHandle,
    pub view_proj: Mat4,
}

pub struct ShadowMapper {
    slots: SlotManager<ShadowMap>,
    resolution: u32,
    depth_texture: TextureHandle,
    layer_views: Vec<TextureViewHandle>,
    array_view: TextureViewHandle,
    sampler: SamplerHandle,
    layout: BindGroupLayoutHandle,
    bind_group: BindGroupHandle,
}

impl ShadowMapper {
    pub fn new<B: GraphicsBackend + ?Sized>(
        backend: &B,
        config: &ShadowMapConfig,
    ) -> SlotResult<Self> {
        if !config.format.is_depth() {
            return Err(SlotError::InvalidState(format!(
                "shadow maps need a depth format, got {:?}",
                config.format
            )));
        }

        let slots = SlotManager::new(
            backend,
            &SlotManagerConfig::new("Shadow Map Records", config.capacity),
        )?;

        let depth_texture = backend.create_texture(&TextureDescriptor {
            label: Some("Shadow Map Array".into()),
            width: config.resolution,
            height: config.resolution,
            depth: config.capacity,
            mip_levels: 1,
            format: config.format,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        })?;
        let layer_views = (0..config.capacity)
            .map(|layer| {
                backend.create_texture_view(
                    depth_texture,
                    &TextureViewDescriptor::layer(layer)
                        .with_label(format!("Shadow Map Layer {}", layer)),
                )
            })
            .collect::<BackendResult<Vec<_>>>()?;
        let array_view = backend.create_texture_view(
            depth_texture,
            &TextureViewDescriptor::array().with_label("Shadow Map Array"),
        )?;
        let sampler = backend.create_sampler(&SamplerDescriptor::shadow_comparison())?;

        let layout = backend.create_bind_group_layout(
            Some("Shadow Map Layout"),
            &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStageFlags::VERTEX_FRAGMENT,
                    ty: BindingType::StorageBuffer { read_only: true },
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStageFlags::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Depth,
                        view_dimension: TextureViewDimension::D2Array,
                    },
                },
                BindGroupLayoutEntry {
                    binding: 2,
                    visibility: ShaderStageFlags::FRAGMENT,
                    ty: BindingType::Sampler { comparison: true },
                },
            ],
        )?;
        let bind_group = backend.create_bind_group(
            Some("Shadow Map Bind Group"),
            layout,
            &[
                (
                    0,
                    BindGroupEntry::Buffer {
                        buffer: slots.buffer(),
                        offset: 0,
                        size: None,
                    },
                ),
                (1, BindGroupEntry::Texture(array_view)),
                (2, BindGroupEntry::Sampler(sampler)),
            ],
        )?;

        log::info!(
            "Shadow mapper: {} layers of {}x{}",
            config.capacity,
            config.resolution,
            config.resolution
        );

        Ok(Self {
            slots,
            resolution: config.resolution,
            depth_texture,
            layer_views,
            array_view,
            sampler,
            layout,
            bind_group,
        })
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn depth_texture(&self) -> TextureHandle {
        self.depth_texture
    }

    pub fn array_view(&self) -> TextureViewHandle {
        self.array_view
    }

    pub fn sampler(&self) -> SamplerHandle {
        self.sampler
    }

    pub fn layout(&self) -> BindGroupLayoutHandle {
        self.layout
    }

    pub fn bind_group(&self) -> BindGroupHandle {
        self.bind_group
    }

    pub fn slots(&self) -> &SlotManager<ShadowMap> {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut SlotManager<ShadowMap> {
        &mut self.slots
    }

    pub fn capacity(&self) -> u32 {
        self.slots.capacity()
    }

    pub fn usage(&self) -> u32 {
        self.slots.usage()
    }

    pub fn create(&mut self, shadow_map: ShadowMap) -> ShadowMapId {
        self.slots.create(shadow_map)
    }

    pub fn create_from(&mut self, descriptor: ShadowMapDescriptor) -> ShadowMapId {
        let mut shadow_map = ShadowMap::default();
        shadow_map.apply_descriptor(descriptor);
        self.slots.create(shadow_map)
    }

    pub fn apply_descriptor<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        id: ShadowMapId,
        descriptor: ShadowMapDescriptor,
    ) -> SlotResult<()> {
        self.slots.modify(backend, id, |shadow_map| {
            shadow_map.apply_descriptor(descriptor);
            Ok(())
        })
    }

    pub fn get(&self, id: ShadowMapId) -> SlotResult<&ShadowMap> {
        self.slots.get(id)
    }

    pub fn get_mut(&mut self, id: ShadowMapId) -> SlotResult<&mut ShadowMap> {
        self.slots.get_mut(id)
    }

    pub fn get_by_name(&self, name: &str) -> SlotResult<&ShadowMap> {
        self.slots.get_by_name(name)
    }

    pub fn find_by_name(&self, name: &str) -> Option<ShadowMapId> {
        self.slots.find_by_name(name)
    }

    /// Shadow maps of one light, in creation order
    pub fn find_by_light(&self, light: LightId) -> Vec<ShadowMapId> {
        self.slots
            .iter()
            .filter(|(_, map)| map.light == Some(light))
            .map(|(id, _)| id)
            .collect()
    }

    /// Array layer the shadow map renders into and is sampled from
    pub fn use_shadow_map<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        id: ShadowMapId,
    ) -> SlotResult<u32> {
        self.slots.use_resource(backend, id)
    }

    pub fn use_by_name<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        name: &str,
    ) -> SlotResult<u32> {
        self.slots.use_by_name(backend, name)
    }

    pub fn release<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        id: ShadowMapId,
    ) -> SlotResult<()> {
        self.slots.release(backend, id)
    }

    pub fn release_by_name<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        name: &str,
    ) -> SlotResult<()> {
        self.slots.release_by_name(backend, name)
    }

    pub fn update<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        id: ShadowMapId,
    ) -> SlotResult<u64> {
        self.slots.update(backend, id)
    }

    pub fn update_all<B: GraphicsBackend + ?Sized>(&mut self, backend: &B) -> SlotResult<()> {
        self.slots.update_all(backend)
    }

    /// Depth attachment of a resident shadow map
    pub fn render_target(&self, id: ShadowMapId) -> SlotResult<TextureViewHandle> {
        let slot = self.slots.slot(id)?.ok_or_else(|| {
            SlotError::InvalidState(format!("shadow map {} is not resident", id))
        })?;
        self.layer_view(slot)
    }

    /// Resident shadow maps in slot order
    pub fn passes(&self) -> SlotResult<Vec<ShadowPass>> {
        self.slots
            .resident()
            .map(|(slot, id)| {
                Ok(ShadowPass {
                    id,
                    slot,
                    view: self.layer_view(slot)?,
                    view_proj: self.slots.get(id)?.view_proj(),
                })
            })
            .collect()
    }

    fn layer_view(&self, slot: u32) -> SlotResult<TextureViewHandle> {
        self.layer_views
            .get(slot as usize)
            .copied()
            .ok_or_else(|| SlotError::InvalidState(format!("no depth layer for slot {}", slot)))
    }

    /// Release every device object the mapper created.
    pub fn destroy<B: GraphicsBackend + ?Sized>(self, backend: &B) {
        backend.destroy_bind_group(self.bind_group);
        backend.destroy_bind_group_layout(self.layout);
        backend.destroy_sampler(self.sampler);
        backend.destroy_texture_view(self.array_view);
        for view in self.layer_views {
            backend.destroy_texture_view(view);
        }
        backend.destroy_texture(self.depth_texture);
        self.slots.destroy(backend);
    }
}
