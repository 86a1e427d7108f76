//! Texture loading and the layered texture library materials refer to

use std::collections::HashMap;
use std::path::Path;

use image::{DynamicImage, GenericImageView};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{SlotError, SlotResult};
use crate::residency::SlotPool;

/// Resolves texture names to texture-array layers.
pub trait TextureLookup {
    fn resolve_texture(&self, name: &str) -> Option<u32>;
}

impl TextureLookup for HashMap<String, u32> {
    fn resolve_texture(&self, name: &str) -> Option<u32> {
        self.get(name).copied()
    }
}

/// Loaded texture data
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Load texture from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path).map_err(|e| e.to_string())?;
        Ok(Self::from_image(img, &name))
    }

    /// Load texture from encoded bytes (PNG, JPEG, ...)
    pub fn from_bytes(bytes: &[u8], name: &str) -> Result<Self, String> {
        let img = image::load_from_memory(bytes).map_err(|e| e.to_string())?;
        Ok(Self::from_image(img, name))
    }

    fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            format: TextureFormat::Rgba8UnormSrgb,
            data: img.to_rgba8().into_raw(),
            name: name.to_string(),
        }
    }

    /// Square texture of one colour
    pub fn solid_color(size: u32, color: [u8; 4], name: &str) -> Self {
        Self {
            width: size,
            height: size,
            format: TextureFormat::Rgba8UnormSrgb,
            data: color.repeat((size * size) as usize),
            name: name.to_string(),
        }
    }

    pub fn white(size: u32) -> Self {
        Self::solid_color(size, [255, 255, 255, 255], "white")
    }

    /// Checkerboard of 8x8 texel squares
    pub fn checkerboard(size: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let is_even = ((x / 8) + (y / 8)) % 2 == 0;
                data.extend_from_slice(if is_even { &color1 } else { &color2 });
            }
        }

        Self {
            width: size,
            height: size,
            format: TextureFormat::Rgba8UnormSrgb,
            data,
            name: "checkerboard".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Texture library configuration
#[derive(Debug, Clone)]
pub struct TextureLibraryConfig {
    /// Number of array layers
    pub capacity: u32,
    /// Width and height of every layer
    pub layer_size: u32,
    pub format: TextureFormat,
}

impl Default for TextureLibraryConfig {
    fn default() -> Self {
        Self {
            capacity: 16,
            layer_size: 512,
            format: TextureFormat::Rgba8UnormSrgb,
        }
    }
}

impl TextureLibraryConfig {
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_layer_size(mut self, layer_size: u32) -> Self {
        self.layer_size = layer_size;
        self
    }
}

/// Named textures stored as layers of one texture array.
///
/// Every texture must match the array's layer size and format; no packing or
/// resizing happens here. Removing a texture does not update materials that
/// still refer to its layer.
pub struct TextureLibrary {
    config: TextureLibraryConfig,
    texture: TextureHandle,
    view: TextureViewHandle,
    sampler: SamplerHandle,
    layers: SlotPool<String>,
}

impl TextureLibrary {
    pub fn new<B: GraphicsBackend + ?Sized>(
        backend: &B,
        config: &TextureLibraryConfig,
    ) -> SlotResult<Self> {
        let texture = backend.create_texture(&TextureDescriptor {
            label: Some("Texture Library".into()),
            width: config.layer_size,
            height: config.layer_size,
            depth: config.capacity,
            mip_levels: 1,
            format: config.format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        let view = backend.create_texture_view(
            texture,
            &TextureViewDescriptor::array().with_label("Texture Library"),
        )?;
        let sampler = backend.create_sampler(&SamplerDescriptor::repeating())?;

        log::info!(
            "Texture library: {} layers of {}x{} {:?}",
            config.capacity,
            config.layer_size,
            config.layer_size,
            config.format
        );

        Ok(Self {
            config: config.clone(),
            texture,
            view,
            sampler,
            layers: SlotPool::new(config.capacity),
        })
    }

    pub fn capacity(&self) -> u32 {
        self.layers.capacity()
    }

    pub fn usage(&self) -> u32 {
        self.layers.usage()
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    /// Array view over every layer
    pub fn view(&self) -> TextureViewHandle {
        self.view
    }

    pub fn sampler(&self) -> SamplerHandle {
        self.sampler
    }

    /// Upload a texture into the lowest free layer and return the layer.
    pub fn insert<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        data: &TextureData,
    ) -> SlotResult<u32> {
        let size = self.config.layer_size;
        if data.width != size || data.height != size {
            return Err(SlotError::InvalidState(format!(
                "texture '{}' is {}x{}, library layers are {}x{}",
                data.name, data.width, data.height, size, size
            )));
        }
        if data.format != self.config.format {
            return Err(SlotError::InvalidState(format!(
                "texture '{}' is {:?}, library holds {:?}",
                data.name, data.format, self.config.format
            )));
        }
        let expected = (size * size * data.format.bytes_per_pixel()) as usize;
        if data.data.len() != expected {
            return Err(SlotError::InvalidState(format!(
                "texture '{}' has {} bytes of texels, expected {}",
                data.name,
                data.data.len(),
                expected
            )));
        }
        if self.resolve_texture(&data.name).is_some() {
            return Err(SlotError::InvalidState(format!(
                "texture '{}' is already in the library",
                data.name
            )));
        }

        let layer = self.layers.allocate(data.name.clone()).map_err(|err| match err {
            SlotError::CapacityExceeded { capacity } => {
                log::warn!("Texture library full, cannot insert '{}'", data.name);
                SlotError::OutOfResources {
                    kind: "texture",
                    capacity,
                }
            }
            other => other,
        })?;

        backend.write_texture(self.texture, layer, &data.data, data.width, data.height);
        log::debug!("Texture '{}' -> layer {}", data.name, layer);
        Ok(layer)
    }

    /// Free the layer of a named texture and return it.
    pub fn remove(&mut self, name: &str) -> SlotResult<u32> {
        let layer = self
            .resolve_texture(name)
            .ok_or_else(|| SlotError::not_found("texture", name))?;
        self.layers.free(layer)?;
        log::debug!("Texture '{}' left layer {}", name, layer);
        Ok(layer)
    }

    pub fn name_at(&self, layer: u32) -> Option<&str> {
        self.layers.occupant_at(layer).map(String::as_str)
    }

    pub fn destroy<B: GraphicsBackend + ?Sized>(self, backend: &B) {
        backend.destroy_sampler(self.sampler);
        backend.destroy_texture_view(self.view);
        backend.destroy_texture(self.texture);
    }
}

impl TextureLookup for TextureLibrary {
    fn resolve_texture(&self, name: &str) -> Option<u32> {
        self.layers
            .occupied()
            .find(|(_, occupant)| occupant.as_str() == name)
            .map(|(layer, _)| layer)
    }
}
