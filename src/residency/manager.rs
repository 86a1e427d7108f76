//! Activation and usage protocol over a slot pool
//!
//! A [`SlotManager`] multiplexes an unbounded set of logical resources onto a
//! fixed number of device slots. A resource moves through three states:
//!
//! - `Inactive`: no slot, usage 0
//! - `Resident`: holds a slot and its record is on the device, usage 0
//! - `InUse`: holds a slot, usage > 0
//!
//! Exhaustion is a hard error. Nothing is ever evicted to make room, not even
//! a resident resource with no users.

use crate::backend::{BufferHandle, BufferUsage, GraphicsBackend};
use crate::error::{SlotError, SlotResult};
use crate::residency::mirror::DeviceMirror;
use crate::residency::record::PackedRecord;
use crate::residency::registry::{Registry, ResourceId};
use crate::residency::slots::SlotPool;

/// A logical resource that can be made resident in a slot.
pub trait SlotResource {
    type Record: PackedRecord;

    /// Resource kind used in logs and errors
    const KIND: &'static str;

    fn name(&self) -> &str;

    /// Pack the resource into the record stored at `slot`.
    fn encode(&self, slot: u32) -> Self::Record;
}

/// Slot manager configuration
#[derive(Debug, Clone)]
pub struct SlotManagerConfig {
    pub label: String,
    pub capacity: u32,
    pub usage: BufferUsage,
}

impl Default for SlotManagerConfig {
    fn default() -> Self {
        Self {
            label: "Slot Records".to_string(),
            capacity: 16,
            usage: BufferUsage::STORAGE | BufferUsage::COPY_SRC,
        }
    }
}

impl SlotManagerConfig {
    pub fn new(label: impl Into<String>, capacity: u32) -> Self {
        Self {
            label: label.into(),
            capacity,
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, usage: BufferUsage) -> Self {
        self.usage = usage;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidencyState {
    Inactive,
    Resident { slot: u32 },
    InUse { slot: u32, usage: u32 },
}

impl ResidencyState {
    pub fn slot(&self) -> Option<u32> {
        match self {
            ResidencyState::Inactive => None,
            ResidencyState::Resident { slot } | ResidencyState::InUse { slot, .. } => Some(*slot),
        }
    }
}

pub struct SlotManager<R: SlotResource> {
    label: String,
    registry: Registry<R>,
    pool: SlotPool<ResourceId<R>>,
    mirror: DeviceMirror,
}

impl<R: SlotResource> SlotManager<R> {
    /// Allocate a zeroed record buffer for `config.capacity` slots.
    pub fn new<B: GraphicsBackend + ?Sized>(
        backend: &B,
        config: &SlotManagerConfig,
    ) -> SlotResult<Self> {
        let size = config.capacity as u64 * R::Record::size();
        let mirror = DeviceMirror::new(backend, &config.label, size, config.usage)?;
        log::info!(
            "{}: {} {} slots of {} bytes on {}",
            config.label,
            config.capacity,
            R::KIND,
            R::Record::size(),
            backend.name()
        );
        Ok(Self {
            label: config.label.clone(),
            registry: Registry::new(R::KIND),
            pool: SlotPool::new(config.capacity),
            mirror,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn capacity(&self) -> u32 {
        self.pool.capacity()
    }

    /// Number of occupied slots
    pub fn usage(&self) -> u32 {
        self.pool.usage()
    }

    /// Number of logical resources ever created
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Device buffer holding `capacity` packed records
    pub fn buffer(&self) -> BufferHandle {
        self.mirror.buffer()
    }

    /// Register a resource. It stays inactive until activated or used.
    pub fn create(&mut self, resource: R) -> ResourceId<R> {
        self.registry.create(resource)
    }

    pub fn get(&self, id: ResourceId<R>) -> SlotResult<&R> {
        Ok(&self.registry.get(id)?.resource)
    }

    /// Mutable access. The next `use_resource` or `update` re-uploads the record.
    pub fn get_mut(&mut self, id: ResourceId<R>) -> SlotResult<&mut R> {
        let entry = self.registry.get_mut(id)?;
        entry.dirty = true;
        Ok(&mut entry.resource)
    }

    /// Mutate a resource and push the change to its slot if it is active.
    ///
    /// `f` must leave the resource untouched when it fails; nothing is
    /// uploaded in that case.
    pub fn modify<B: GraphicsBackend + ?Sized, T>(
        &mut self,
        backend: &B,
        id: ResourceId<R>,
        f: impl FnOnce(&mut R) -> SlotResult<T>,
    ) -> SlotResult<T> {
        let entry = self.registry.get_mut(id)?;
        let result = f(&mut entry.resource)?;
        entry.dirty = true;
        self.update(backend, id)?;
        Ok(result)
    }

    /// Every resource in creation order
    pub fn iter(&self) -> impl Iterator<Item = (ResourceId<R>, &R)> + '_ {
        self.registry.iter().map(|(id, entry)| (id, &entry.resource))
    }

    pub fn find_by_name(&self, name: &str) -> Option<ResourceId<R>> {
        self.registry.find(|resource| resource.name() == name)
    }

    pub fn get_by_name(&self, name: &str) -> SlotResult<&R> {
        let id = self.id_by_name(name)?;
        self.get(id)
    }

    fn id_by_name(&self, name: &str) -> SlotResult<ResourceId<R>> {
        self.find_by_name(name)
            .ok_or_else(|| SlotError::not_found(R::KIND, name))
    }

    pub fn slot(&self, id: ResourceId<R>) -> SlotResult<Option<u32>> {
        Ok(self.registry.get(id)?.slot)
    }

    pub fn usage_count(&self, id: ResourceId<R>) -> SlotResult<u32> {
        Ok(self.registry.get(id)?.usage)
    }

    pub fn state(&self, id: ResourceId<R>) -> SlotResult<ResidencyState> {
        let entry = self.registry.get(id)?;
        Ok(match (entry.slot, entry.usage) {
            (None, _) => ResidencyState::Inactive,
            (Some(slot), 0) => ResidencyState::Resident { slot },
            (Some(slot), usage) => ResidencyState::InUse { slot, usage },
        })
    }

    /// Resident resources in slot order
    pub fn resident(&self) -> impl Iterator<Item = (u32, ResourceId<R>)> + '_ {
        self.pool.occupied().map(|(slot, id)| (slot, *id))
    }

    /// Decode the record currently stored in a slot.
    pub fn record(&self, slot: u32) -> SlotResult<R::Record> {
        self.mirror.record(slot)
    }

    /// Give `id` a slot and upload its record.
    ///
    /// Already active resources keep their slot and nothing is written.
    pub fn activate<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        id: ResourceId<R>,
    ) -> SlotResult<u32> {
        let entry = self.registry.get_mut(id)?;
        if let Some(slot) = entry.slot {
            return Ok(slot);
        }

        let slot = self.pool.allocate(id).map_err(|err| match err {
            SlotError::CapacityExceeded { capacity } => {
                log::warn!(
                    "{}: cannot activate {} '{}', all {} slots are in use",
                    self.label,
                    R::KIND,
                    entry.resource.name(),
                    capacity
                );
                SlotError::OutOfResources {
                    kind: R::KIND,
                    capacity,
                }
            }
            other => other,
        })?;

        let record = entry.resource.encode(slot);
        if let Err(err) = self.mirror.write_record(backend, slot, &record) {
            self.pool.free(slot)?;
            return Err(err);
        }
        entry.slot = Some(slot);
        entry.dirty = false;

        log::debug!(
            "{}: {} '{}' {} -> slot {}",
            self.label,
            R::KIND,
            entry.resource.name(),
            id,
            slot
        );
        Ok(slot)
    }

    /// Free the slot of an unused resource and zero its record.
    ///
    /// Inactive resources are left alone.
    pub fn deactivate<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        id: ResourceId<R>,
    ) -> SlotResult<()> {
        let entry = self.registry.get_mut(id)?;
        let Some(slot) = entry.slot else {
            return Ok(());
        };
        if entry.usage > 0 {
            return Err(SlotError::InvalidState(format!(
                "{} '{}' still has {} users",
                R::KIND,
                entry.resource.name(),
                entry.usage
            )));
        }

        self.pool.free(slot)?;
        entry.slot = None;
        entry.dirty = false;
        log::debug!(
            "{}: {} '{}' {} left slot {}",
            self.label,
            R::KIND,
            entry.resource.name(),
            id,
            slot
        );

        self.mirror.clear_record::<B, R::Record>(backend, slot)
    }

    /// Take a reference to `id`, activating it if needed, and return its slot.
    pub fn use_resource<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        id: ResourceId<R>,
    ) -> SlotResult<u32> {
        let slot = match self.registry.get(id)?.slot {
            Some(slot) => {
                self.refresh(backend, id)?;
                slot
            }
            None => self.activate(backend, id)?,
        };
        self.registry.get_mut(id)?.usage += 1;
        Ok(slot)
    }

    pub fn use_by_name<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        name: &str,
    ) -> SlotResult<u32> {
        let id = self.id_by_name(name)?;
        self.use_resource(backend, id)
    }

    /// Drop a reference and deactivate once nobody uses the resource.
    pub fn release<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        id: ResourceId<R>,
    ) -> SlotResult<()> {
        self.release_with(backend, id, true)
    }

    pub fn release_by_name<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        name: &str,
    ) -> SlotResult<()> {
        let id = self.id_by_name(name)?;
        self.release(backend, id)
    }

    /// Drop a reference; with `deactivate_if_unused == false` the resource
    /// stays resident at usage 0.
    pub fn release_with<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        id: ResourceId<R>,
        deactivate_if_unused: bool,
    ) -> SlotResult<()> {
        let entry = self.registry.get_mut(id)?;
        if entry.usage == 0 {
            return Err(SlotError::InvalidState(format!(
                "{} '{}' released more often than used",
                R::KIND,
                entry.resource.name()
            )));
        }
        entry.usage -= 1;

        if entry.usage == 0 && deactivate_if_unused {
            self.deactivate(backend, id)?;
        }
        Ok(())
    }

    /// Re-upload the changed part of an active resource's record.
    ///
    /// Returns the number of bytes written; inactive resources write nothing.
    pub fn update<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        id: ResourceId<R>,
    ) -> SlotResult<u64> {
        let entry = self.registry.get_mut(id)?;
        let Some(slot) = entry.slot else {
            return Ok(0);
        };
        let record = entry.resource.encode(slot);
        let written = self.mirror.write_record_diff(backend, slot, &record)?;
        entry.dirty = false;
        Ok(written)
    }

    /// Re-encode every active resource and upload the buffer in one write.
    pub fn update_all<B: GraphicsBackend + ?Sized>(&mut self, backend: &B) -> SlotResult<()> {
        for (_, entry) in self.registry.iter_mut() {
            if let Some(slot) = entry.slot {
                self.mirror.stage(slot, &entry.resource.encode(slot))?;
                entry.dirty = false;
            }
        }
        self.mirror.flush_all(backend);
        Ok(())
    }

    /// Release the device buffer.
    pub fn destroy<B: GraphicsBackend + ?Sized>(self, backend: &B) {
        log::debug!("{}: destroying", self.label);
        self.mirror.destroy(backend);
    }

    fn refresh<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        id: ResourceId<R>,
    ) -> SlotResult<()> {
        if self.registry.get(id)?.dirty {
            self.update(backend, id)?;
        }
        Ok(())
    }
}
