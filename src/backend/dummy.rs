//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't touch a GPU. Buffers are plain byte vectors so that
//! queued writes can be read back and inspected, and every write is logged in
//! submission order.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::backend::traits::*;
use crate::backend::types::*;

/// One queued buffer write, as seen by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferWrite {
    pub buffer: BufferHandle,
    pub offset: u64,
    pub len: u64,
}

struct DummyTexture {
    desc: TextureDescriptor,
    layers: Vec<Vec<u8>>,
}

#[derive(Default)]
struct DummyState {
    buffers: HashMap<u64, Vec<u8>>,
    textures: HashMap<u64, DummyTexture>,
    views: HashMap<u64, (TextureHandle, TextureViewDescriptor)>,
    samplers: HashMap<u64, SamplerDescriptor>,
    layouts: HashMap<u64, Vec<BindGroupLayoutEntry>>,
    bind_groups: HashMap<u64, Vec<(u32, BindGroupEntry)>>,
    writes: Vec<BufferWrite>,
    next_id: u64,
}

impl DummyState {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Dummy GPU backend.
#[derive(Default)]
pub struct DummyBackend {
    state: Mutex<DummyState>,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents of a buffer.
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(&buffer.0).cloned()
    }

    /// Every buffer write issued so far, oldest first.
    pub fn writes(&self) -> Vec<BufferWrite> {
        self.state.lock().writes.clone()
    }

    /// Forget the write log (buffer contents are kept).
    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    /// Descriptor a texture was created with.
    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<TextureDescriptor> {
        self.state.lock().textures.get(&texture.0).map(|t| t.desc.clone())
    }

    /// Texel data last written into one texture layer.
    pub fn texture_layer(&self, texture: TextureHandle, layer: u32) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let texture = state.textures.get(&texture.0)?;
        texture.layers.get(layer as usize).cloned()
    }

    /// Texture and descriptor behind a view.
    pub fn view_descriptor(
        &self,
        view: TextureViewHandle,
    ) -> Option<(TextureHandle, TextureViewDescriptor)> {
        self.state.lock().views.get(&view.0).cloned()
    }

    /// Descriptor a sampler was created with.
    pub fn sampler_descriptor(&self, sampler: SamplerHandle) -> Option<SamplerDescriptor> {
        self.state.lock().samplers.get(&sampler.0).cloned()
    }

    /// Entries a bind group was created with.
    pub fn bind_group_entries(
        &self,
        bind_group: BindGroupHandle,
    ) -> Option<Vec<(u32, BindGroupEntry)>> {
        self.state.lock().bind_groups.get(&bind_group.0).cloned()
    }

    /// Number of live device objects of every kind.
    pub fn live_objects(&self) -> usize {
        let state = self.state.lock();
        state.buffers.len()
            + state.textures.len()
            + state.views.len()
            + state.samplers.len()
            + state.layouts.len()
            + state.bind_groups.len()
    }
}

impl GraphicsBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        let size = usize::try_from(desc.size).map_err(|_| BackendError::OutOfMemory)?;
        let mut state = self.state.lock();
        let id = state.next();
        state.buffers.insert(id, vec![0; size]);
        Ok(BufferHandle(id))
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let mut state = self.state.lock();
        let Some(contents) = state.buffers.get_mut(&buffer.0) else {
            log::error!("DummyBackend: write to unknown buffer {:?}", buffer);
            return;
        };
        let len = contents.len();
        let target = usize::try_from(offset)
            .ok()
            .and_then(|start| Some(start..start.checked_add(data.len())?))
            .and_then(|range| contents.get_mut(range));
        let Some(target) = target else {
            log::error!(
                "DummyBackend: write of {} bytes at {} overruns buffer of {} bytes",
                data.len(),
                offset,
                len
            );
            return;
        };
        target.copy_from_slice(data);
        state.writes.push(BufferWrite {
            buffer,
            offset,
            len: data.len() as u64,
        });
    }

    fn read_buffer(&self, buffer: BufferHandle, offset: u64, size: u64) -> BackendResult<Vec<u8>> {
        let state = self.state.lock();
        let contents = state
            .buffers
            .get(&buffer.0)
            .ok_or_else(|| BackendError::ReadbackFailed("Buffer not found".into()))?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let end = usize::try_from(size)
            .ok()
            .and_then(|size| start.checked_add(size))
            .unwrap_or(usize::MAX);
        contents
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                BackendError::ReadbackFailed(format!("Range {}..{} out of bounds", start, end))
            })
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}x{})",
            desc.label,
            desc.width,
            desc.height,
            desc.depth
        );
        if desc.width == 0 || desc.height == 0 || desc.depth == 0 {
            return Err(BackendError::TextureCreationFailed("Zero-sized texture".into()));
        }
        let mut state = self.state.lock();
        let id = state.next();
        state.textures.insert(
            id,
            DummyTexture {
                desc: desc.clone(),
                layers: vec![Vec::new(); desc.depth as usize],
            },
        );
        Ok(TextureHandle(id))
    }

    fn create_texture_view(
        &self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> BackendResult<TextureViewHandle> {
        let mut state = self.state.lock();
        let layers = state
            .textures
            .get(&texture.0)
            .map(|t| t.desc.depth)
            .ok_or_else(|| BackendError::TextureCreationFailed("Texture not found".into()))?;
        let count = desc.array_layer_count.unwrap_or(layers.saturating_sub(desc.base_array_layer));
        if count == 0 || desc.base_array_layer + count > layers {
            return Err(BackendError::TextureCreationFailed(format!(
                "View layers {}..{} outside texture with {} layers",
                desc.base_array_layer,
                desc.base_array_layer + count,
                layers
            )));
        }
        let id = state.next();
        state.views.insert(id, (texture, desc.clone()));
        Ok(TextureViewHandle(id))
    }

    fn write_texture(
        &self,
        texture: TextureHandle,
        layer: u32,
        data: &[u8],
        _width: u32,
        _height: u32,
    ) {
        let mut state = self.state.lock();
        match state
            .textures
            .get_mut(&texture.0)
            .and_then(|t| t.layers.get_mut(layer as usize))
        {
            Some(slot) => *slot = data.to_vec(),
            None => log::error!(
                "DummyBackend: write to missing texture layer {:?}/{}",
                texture,
                layer
            ),
        }
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        log::trace!("DummyBackend: creating sampler {:?}", desc.label);
        let mut state = self.state.lock();
        let id = state.next();
        state.samplers.insert(id, desc.clone());
        Ok(SamplerHandle(id))
    }

    fn create_bind_group_layout(
        &self,
        _label: Option<&str>,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        let mut state = self.state.lock();
        let id = state.next();
        state.layouts.insert(id, entries.to_vec());
        Ok(BindGroupLayoutHandle(id))
    }

    fn create_bind_group(
        &self,
        _label: Option<&str>,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let mut state = self.state.lock();
        let expected = state
            .layouts
            .get(&layout.0)
            .map(Vec::len)
            .ok_or_else(|| BackendError::BindGroupCreationFailed("Layout not found".into()))?;
        if expected != entries.len() {
            return Err(BackendError::BindGroupCreationFailed(format!(
                "Layout has {} entries, got {}",
                expected,
                entries.len()
            )));
        }
        let id = state.next();
        state.bind_groups.insert(id, entries.to_vec());
        Ok(BindGroupHandle(id))
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        self.state.lock().buffers.remove(&buffer.0);
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        self.state.lock().textures.remove(&texture.0);
    }

    fn destroy_texture_view(&self, view: TextureViewHandle) {
        self.state.lock().views.remove(&view.0);
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        self.state.lock().samplers.remove(&sampler.0);
    }

    fn destroy_bind_group_layout(&self, layout: BindGroupLayoutHandle) {
        self.state.lock().layouts.remove(&layout.0);
    }

    fn destroy_bind_group(&self, bind_group: BindGroupHandle) {
        self.state.lock().bind_groups.remove(&bind_group.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_buffer(backend: &DummyBackend, size: u64) -> BufferHandle {
        backend
            .create_buffer(&BufferDescriptor {
                label: Some("test".into()),
                size,
                usage: BufferUsage::STORAGE | BufferUsage::COPY_DST,
                mapped_at_creation: false,
            })
            .unwrap()
    }

    #[test]
    fn test_buffers_start_zeroed() {
        let backend = DummyBackend::new();
        let buffer = storage_buffer(&backend, 16);
        assert_eq!(backend.buffer_contents(buffer).unwrap(), vec![0; 16]);
    }

    #[test]
    fn test_write_then_read_back() {
        let backend = DummyBackend::new();
        let buffer = storage_buffer(&backend, 16);
        backend.write_buffer(buffer, 4, &[1, 2, 3, 4]);

        assert_eq!(backend.read_buffer(buffer, 4, 4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(
            backend.writes(),
            vec![BufferWrite {
                buffer,
                offset: 4,
                len: 4
            }]
        );
    }

    #[test]
    fn test_overrunning_write_is_dropped() {
        let backend = DummyBackend::new();
        let buffer = storage_buffer(&backend, 8);
        backend.write_buffer(buffer, 4, &[9; 8]);

        assert_eq!(backend.buffer_contents(buffer).unwrap(), vec![0; 8]);
        assert!(backend.writes().is_empty());
    }

    #[test]
    fn test_destroyed_objects_leave_tables() {
        let backend = DummyBackend::new();
        let buffer = storage_buffer(&backend, 16);
        let texture = backend.create_texture(&TextureDescriptor::default()).unwrap();
        let view = backend
            .create_texture_view(texture, &TextureViewDescriptor::default())
            .unwrap();
        let sampler = backend.create_sampler(&SamplerDescriptor::default()).unwrap();
        assert_eq!(backend.live_objects(), 4);

        backend.destroy_sampler(sampler);
        backend.destroy_texture_view(view);
        backend.destroy_texture(texture);
        backend.destroy_buffer(buffer);

        assert!(backend.view_descriptor(view).is_none());
        assert!(backend.sampler_descriptor(sampler).is_none());
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn test_layer_view_must_fit() {
        let backend = DummyBackend::new();
        let texture = backend
            .create_texture(&TextureDescriptor {
                depth: 2,
                ..Default::default()
            })
            .unwrap();

        assert!(backend
            .create_texture_view(texture, &TextureViewDescriptor::layer(1))
            .is_ok());
        assert!(backend
            .create_texture_view(texture, &TextureViewDescriptor::layer(2))
            .is_err());
    }
}
