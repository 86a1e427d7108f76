//! Materials and the slot-resident material table
//!
//! Shaders see materials as an array of [`MaterialRecord`] in a read-only
//! storage buffer and index it with the slot returned by
//! [`MaterialManager::use_material`].

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{SlotError, SlotResult};
use crate::residency::{
    Field, PackedRecord, ResourceId, SlotManager, SlotManagerConfig, SlotResource,
};
use crate::resources::texture::TextureLookup;

pub const DEFAULT_AMBIENT: Vec3 = Vec3::splat(0.1);
pub const DEFAULT_DIFFUSE: Vec4 = Vec4::ONE;
pub const DEFAULT_SPECULAR: Vec3 = Vec3::splat(0.5);
pub const DEFAULT_EMISSIVE: Vec3 = Vec3::ZERO;
pub const DEFAULT_SHININESS: f32 = 32.0;
pub const DEFAULT_NAME: &str = "material";

/// Texture-array layers a material samples from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterialTextures {
    pub colour: Option<u32>,
    pub normal: Option<u32>,
    pub specular: Option<u32>,
    pub emissive: Option<u32>,
}

impl MaterialTextures {
    /// Layers in record order, -1 for none
    pub fn packed(&self) -> [i32; 4] {
        [self.colour, self.normal, self.specular, self.emissive]
            .map(|layer| layer.map_or(-1, |l| l as i32))
    }
}

/// Id of a material registered with a [`MaterialManager`]
pub type MaterialId = ResourceId<Material>;

/// Blinn-Phong material properties
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub ambient: Vec3,
    pub diffuse: Vec4,
    pub specular: Vec3,
    pub emissive: Vec3,
    pub shininess: f32,
    pub textures: MaterialTextures,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            ambient: DEFAULT_AMBIENT,
            diffuse: DEFAULT_DIFFUSE,
            specular: DEFAULT_SPECULAR,
            emissive: DEFAULT_EMISSIVE,
            shininess: DEFAULT_SHININESS,
            textures: MaterialTextures::default(),
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_ambient(mut self, ambient: Vec3) -> Self {
        self.ambient = ambient;
        self
    }

    pub fn with_diffuse(mut self, diffuse: Vec4) -> Self {
        self.diffuse = diffuse;
        self
    }

    pub fn with_specular(mut self, specular: Vec3) -> Self {
        self.specular = specular;
        self
    }

    pub fn with_emissive(mut self, emissive: Vec3) -> Self {
        self.emissive = emissive;
        self
    }

    pub fn with_shininess(mut self, shininess: f32) -> Self {
        self.shininess = shininess;
        self
    }

    pub fn with_textures(mut self, textures: MaterialTextures) -> Self {
        self.textures = textures;
        self
    }

    /// Merge a descriptor into this material.
    ///
    /// Texture names are resolved before anything is written, so an unknown
    /// name leaves the material as it was.
    pub fn apply_descriptor(
        &mut self,
        descriptor: MaterialDescriptor,
        lookup: &impl TextureLookup,
    ) -> SlotResult<()> {
        let resolve = |name: String| {
            lookup
                .resolve_texture(&name)
                .ok_or_else(|| SlotError::not_found("texture", name))
        };
        let textures = descriptor.textures;
        let colour = textures.colour.try_map(resolve)?;
        let normal = textures.normal.try_map(resolve)?;
        let specular_map = textures.specular.try_map(resolve)?;
        let emissive_map = textures.emissive.try_map(resolve)?;

        descriptor.name.merge_into(&mut self.name, DEFAULT_NAME.to_string());
        descriptor.ambient.merge_into(&mut self.ambient, DEFAULT_AMBIENT);
        descriptor.diffuse.merge_into(&mut self.diffuse, DEFAULT_DIFFUSE);
        descriptor.specular.merge_into(&mut self.specular, DEFAULT_SPECULAR);
        descriptor.emissive.merge_into(&mut self.emissive, DEFAULT_EMISSIVE);
        descriptor.shininess.merge_into(&mut self.shininess, DEFAULT_SHININESS);
        colour.merge_option(&mut self.textures.colour);
        normal.merge_option(&mut self.textures.normal);
        specular_map.merge_option(&mut self.textures.specular);
        emissive_map.merge_option(&mut self.textures.emissive);
        Ok(())
    }

    /// Pack for the GPU
    pub fn record(&self) -> MaterialRecord {
        MaterialRecord {
            ambient: self.ambient.extend(1.0),
            diffuse: self.diffuse,
            specular: self.specular.extend(1.0),
            emissive: self.emissive.extend(1.0),
            textures: self.textures.packed(),
            shininess: self.shininess,
            _padding: [0.0; 3],
        }
    }

    // Preset materials

    pub fn plastic(color: Vec3) -> Self {
        Self::new("plastic")
            .with_ambient(color * 0.1)
            .with_diffuse(color.extend(1.0))
            .with_specular(Vec3::splat(0.5))
            .with_shininess(32.0)
    }

    pub fn metal(color: Vec3, shininess: f32) -> Self {
        Self::new("metal")
            .with_ambient(color * 0.25)
            .with_diffuse((color * 0.4).extend(1.0))
            .with_specular(color)
            .with_shininess(shininess)
    }

    pub fn gold() -> Self {
        let mut material = Self::metal(Vec3::new(1.0, 0.766, 0.336), 51.2);
        material.name = "gold".to_string();
        material
    }

    pub fn silver() -> Self {
        let mut material = Self::metal(Vec3::new(0.972, 0.960, 0.915), 76.8);
        material.name = "silver".to_string();
        material
    }

    pub fn rubber(color: Vec3) -> Self {
        Self::new("rubber")
            .with_ambient(Vec3::splat(0.02))
            .with_diffuse(color.extend(1.0))
            .with_specular(Vec3::splat(0.1))
            .with_shininess(10.0)
    }

    pub fn emissive(color: Vec3) -> Self {
        Self::new("emissive")
            .with_diffuse(Vec4::ONE)
            .with_emissive(color)
    }
}

impl SlotResource for Material {
    type Record = MaterialRecord;
    const KIND: &'static str = "material";

    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, _slot: u32) -> MaterialRecord {
        self.record()
    }
}

/// Material record for GPU, 96 bytes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialRecord {
    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
    pub emissive: Vec4,
    pub textures: [i32; 4], // colour, normal, specular, emissive; -1 = none
    pub shininess: f32,
    pub _padding: [f32; 3],
}

impl PackedRecord for MaterialRecord {
    const WGSL_NAME: &'static str = "MaterialRecord";
    const MEMBERS: &'static [(&'static str, usize)] = &[
        ("ambient", std::mem::offset_of!(MaterialRecord, ambient)),
        ("diffuse", std::mem::offset_of!(MaterialRecord, diffuse)),
        ("specular", std::mem::offset_of!(MaterialRecord, specular)),
        ("emissive", std::mem::offset_of!(MaterialRecord, emissive)),
        ("textures", std::mem::offset_of!(MaterialRecord, textures)),
        ("shininess", std::mem::offset_of!(MaterialRecord, shininess)),
    ];

    fn wgsl() -> &'static str {
        crate::shaders::MATERIAL_RECORD_WGSL
    }
}

/// Texture names of a descriptor, resolved through a [`TextureLookup`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialTextureNames {
    pub colour: Field<String>,
    pub normal: Field<String>,
    pub specular: Field<String>,
    pub emissive: Field<String>,
}

/// Partial material update.
///
/// `Unset` fields are left alone, `Clear` resets colours and shininess to
/// their defaults and unsets textures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialDescriptor {
    pub name: Field<String>,
    pub ambient: Field<Vec3>,
    pub diffuse: Field<Vec4>,
    pub specular: Field<Vec3>,
    pub emissive: Field<Vec3>,
    pub shininess: Field<f32>,
    pub textures: MaterialTextureNames,
}

impl MaterialDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Field::Value(name.into());
        self
    }

    pub fn ambient(mut self, ambient: Vec3) -> Self {
        self.ambient = Field::Value(ambient);
        self
    }

    pub fn diffuse(mut self, diffuse: Vec4) -> Self {
        self.diffuse = Field::Value(diffuse);
        self
    }

    pub fn specular(mut self, specular: Vec3) -> Self {
        self.specular = Field::Value(specular);
        self
    }

    pub fn emissive(mut self, emissive: Vec3) -> Self {
        self.emissive = Field::Value(emissive);
        self
    }

    pub fn shininess(mut self, shininess: f32) -> Self {
        self.shininess = Field::Value(shininess);
        self
    }

    pub fn colour_texture(mut self, name: Option<&str>) -> Self {
        self.textures.colour = Field::from_option(name.map(str::to_string));
        self
    }

    pub fn normal_texture(mut self, name: Option<&str>) -> Self {
        self.textures.normal = Field::from_option(name.map(str::to_string));
        self
    }

    pub fn specular_texture(mut self, name: Option<&str>) -> Self {
        self.textures.specular = Field::from_option(name.map(str::to_string));
        self
    }

    pub fn emissive_texture(mut self, name: Option<&str>) -> Self {
        self.textures.emissive = Field::from_option(name.map(str::to_string));
        self
    }
}

/// Material manager configuration
#[derive(Debug, Clone)]
pub struct MaterialManagerConfig {
    pub capacity: u32,
}

impl Default for MaterialManagerConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

/// Slot-resident material table plus the bind group exposing it to shaders.
pub struct MaterialManager {
    slots: SlotManager<Material>,
    layout: BindGroupLayoutHandle,
    bind_group: BindGroupHandle,
}

impl MaterialManager {
    pub fn new<B: GraphicsBackend + ?Sized>(
        backend: &B,
        config: &MaterialManagerConfig,
    ) -> SlotResult<Self> {
        let slots = SlotManager::new(
            backend,
            &SlotManagerConfig::new("Material Records", config.capacity),
        )?;

        let layout = backend.create_bind_group_layout(
            Some("Material Layout"),
            &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::VERTEX_FRAGMENT,
                ty: BindingType::StorageBuffer { read_only: true },
            }],
        )?;
        let bind_group = backend.create_bind_group(
            Some("Material Bind Group"),
            layout,
            &[(
                0,
                BindGroupEntry::Buffer {
                    buffer: slots.buffer(),
                    offset: 0,
                    size: None,
                },
            )],
        )?;

        Ok(Self {
            slots,
            layout,
            bind_group,
        })
    }

    pub fn layout(&self) -> BindGroupLayoutHandle {
        self.layout
    }

    pub fn bind_group(&self) -> BindGroupHandle {
        self.bind_group
    }

    pub fn slots(&self) -> &SlotManager<Material> {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut SlotManager<Material> {
        &mut self.slots
    }

    pub fn capacity(&self) -> u32 {
        self.slots.capacity()
    }

    pub fn usage(&self) -> u32 {
        self.slots.usage()
    }

    pub fn create(&mut self, material: Material) -> MaterialId {
        self.slots.create(material)
    }

    /// Create a default material with `descriptor` merged in.
    ///
    /// Nothing is registered when a texture name does not resolve.
    pub fn create_from(
        &mut self,
        descriptor: MaterialDescriptor,
        lookup: &impl TextureLookup,
    ) -> SlotResult<MaterialId> {
        let mut material = Material::default();
        material.apply_descriptor(descriptor, lookup)?;
        Ok(self.slots.create(material))
    }

    /// Merge `descriptor` into a material and refresh its slot if resident.
    pub fn apply_descriptor<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        id: MaterialId,
        descriptor: MaterialDescriptor,
        lookup: &impl TextureLookup,
    ) -> SlotResult<()> {
        self.slots
            .modify(backend, id, |material| material.apply_descriptor(descriptor, lookup))
    }

    pub fn get(&self, id: MaterialId) -> SlotResult<&Material> {
        self.slots.get(id)
    }

    pub fn get_mut(&mut self, id: MaterialId) -> SlotResult<&mut Material> {
        self.slots.get_mut(id)
    }

    pub fn get_by_name(&self, name: &str) -> SlotResult<&Material> {
        self.slots.get_by_name(name)
    }

    pub fn find_by_name(&self, name: &str) -> Option<MaterialId> {
        self.slots.find_by_name(name)
    }

    /// Slot index shaders use to read the material
    pub fn use_material<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        id: MaterialId,
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
        id: MaterialId,
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
        id: MaterialId,
    ) -> SlotResult<u64> {
        self.slots.update(backend, id)
    }

    pub fn update_all<B: GraphicsBackend + ?Sized>(&mut self, backend: &B) -> SlotResult<()> {
        self.slots.update_all(backend)
    }

    pub fn destroy<B: GraphicsBackend + ?Sized>(self, backend: &B) {
        backend.destroy_bind_group(self.bind_group);
        backend.destroy_bind_group_layout(self.layout);
        self.slots.destroy(backend);
    }
}
