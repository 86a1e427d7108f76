//! CPU mirror of a flat device buffer of packed records
//!
//! Every upload lands in the CPU copy first and is then queued on the device
//! with a single `write_buffer`. Uploads are never awaited or retried.

use crate::backend::{BackendError, BufferDescriptor, BufferHandle, BufferUsage, GraphicsBackend};
use crate::error::{SlotError, SlotResult};
use crate::residency::record::{self, PackedRecord};

/// Device writes must start and end on this many bytes.
pub const WRITE_ALIGNMENT: usize = 4;

pub struct DeviceMirror {
    label: String,
    buffer: BufferHandle,
    bytes: Vec<u8>,
}

impl DeviceMirror {
    /// Allocate a zeroed device buffer of `size` bytes.
    ///
    /// `COPY_DST` is always added to `usage` since every update is a queue write.
    pub fn new<B: GraphicsBackend + ?Sized>(
        backend: &B,
        label: &str,
        size: u64,
        usage: BufferUsage,
    ) -> SlotResult<Self> {
        let len = usize::try_from(size).map_err(|_| BackendError::OutOfMemory)?;
        let buffer = backend.create_buffer(&BufferDescriptor {
            label: Some(label.to_string()),
            size,
            usage: usage | BufferUsage::COPY_DST,
            mapped_at_creation: false,
        })?;
        Ok(Self {
            label: label.to_string(),
            buffer,
            bytes: vec![0; len],
        })
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// What the device will hold once queued writes complete
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Write `data` at `offset`, first into the mirror, then on the device.
    pub fn upload<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &B,
        offset: u64,
        data: &[u8],
    ) -> SlotResult<()> {
        let len = self.bytes.len();
        let target = usize::try_from(offset)
            .ok()
            .and_then(|start| Some(start..start.checked_add(data.len())?))
            .and_then(|range| self.bytes.get_mut(range));
        let Some(target) = target else {
            return Err(SlotError::InvalidState(format!(
                "upload of {} bytes at {} overruns {} ({} bytes)",
                data.len(),
                offset,
                self.label,
                len
            )));
        };
        target.copy_from_slice(data);
        log::trace!("{}: uploading {} bytes at {}", self.label, data.len(), offset);
        backend.write_buffer(self.buffer, offset, data);
        Ok(())
    }

    /// Upload a whole record into its slot.
    pub fn write_record<B: GraphicsBackend + ?Sized, R: PackedRecord>(
        &mut self,
        backend: &B,
        slot: u32,
        record: &R,
    ) -> SlotResult<()> {
        self.upload(backend, record::record_offset::<R>(slot), bytemuck::bytes_of(record))
    }

    /// Upload only the smallest aligned span of a record that changed.
    ///
    /// Returns the number of bytes sent to the device, 0 when the slot already
    /// holds `record`.
    pub fn write_record_diff<B: GraphicsBackend + ?Sized, R: PackedRecord>(
        &mut self,
        backend: &B,
        slot: u32,
        record: &R,
    ) -> SlotResult<u64> {
        let range = record::record_range::<R>(slot);
        let new = bytemuck::bytes_of(record);
        let Some(old) = self.bytes.get(range.clone()) else {
            return Err(SlotError::InvalidState(format!(
                "slot {} lies outside {} ({} bytes)",
                slot,
                self.label,
                self.bytes.len()
            )));
        };

        let Some((first, last)) = changed_span(old, new) else {
            return Ok(0);
        };
        let start = first / WRITE_ALIGNMENT * WRITE_ALIGNMENT;
        let end = ((last + 1).div_ceil(WRITE_ALIGNMENT) * WRITE_ALIGNMENT).min(new.len());

        self.upload(backend, (range.start + start) as u64, &new[start..end])?;
        Ok((end - start) as u64)
    }

    /// Zero a slot's region, on the device too.
    pub fn clear_record<B: GraphicsBackend + ?Sized, R: PackedRecord>(
        &mut self,
        backend: &B,
        slot: u32,
    ) -> SlotResult<()> {
        let zeros = vec![0u8; R::size() as usize];
        self.upload(backend, record::record_offset::<R>(slot), &zeros)
    }

    /// Mutate the mirror without touching the device; pair with [`Self::flush_all`].
    pub fn stage<R: PackedRecord>(&mut self, slot: u32, record: &R) -> SlotResult<()> {
        record::encode_at(&mut self.bytes, slot, record)
    }

    /// Send the whole mirror in one write.
    pub fn flush_all<B: GraphicsBackend + ?Sized>(&self, backend: &B) {
        log::trace!("{}: uploading all {} bytes", self.label, self.bytes.len());
        backend.write_buffer(self.buffer, 0, &self.bytes);
    }

    pub fn record<R: PackedRecord>(&self, slot: u32) -> SlotResult<R> {
        record::decode_at(&self.bytes, slot)
    }

    pub fn destroy<B: GraphicsBackend + ?Sized>(self, backend: &B) {
        backend.destroy_buffer(self.buffer);
    }
}

/// First and last differing byte positions
fn changed_span(old: &[u8], new: &[u8]) -> Option<(usize, usize)> {
    let first = old.iter().zip(new).position(|(a, b)| a != b)?;
    let last = old.iter().zip(new).rposition(|(a, b)| a != b)?;
    Some((first, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BufferWrite, DummyBackend};
    use crate::residency::record::tests::TestRecord;

    fn mirror(backend: &DummyBackend, slots: u64) -> DeviceMirror {
        DeviceMirror::new(
            backend,
            "test records",
            slots * TestRecord::size(),
            BufferUsage::STORAGE,
        )
        .unwrap()
    }

    #[test]
    fn test_upload_is_bounds_checked() {
        let backend = DummyBackend::new();
        let mut mirror = mirror(&backend, 2);

        assert!(mirror.upload(&backend, 28, &[1; 4]).is_ok());
        assert!(mirror.upload(&backend, 30, &[1; 4]).unwrap_err().is_invalid_state());
        assert_eq!(backend.writes().len(), 1);
    }

    #[test]
    fn test_upload_at_huge_offset_is_rejected() {
        let backend = DummyBackend::new();
        let mut mirror = mirror(&backend, 2);

        let err = mirror.upload(&backend, u64::MAX, &[1; 4]).unwrap_err();
        assert!(err.is_invalid_state());
        let err = mirror.upload(&backend, u64::MAX - 1, &[]).unwrap_err();
        assert!(err.is_invalid_state());
        assert!(backend.writes().is_empty());
        assert!(mirror.bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_full_record_write() {
        let backend = DummyBackend::new();
        let mut mirror = mirror(&backend, 3);
        let record = TestRecord {
            value: [1.0, 2.0, 3.0],
            tag: 9,
        };
        mirror.write_record(&backend, 2, &record).unwrap();

        let device = backend.buffer_contents(mirror.buffer()).unwrap();
        assert_eq!(device, mirror.bytes());
        assert_eq!(&device[32..48], bytemuck::bytes_of(&record));
        assert_eq!(
            backend.writes(),
            vec![BufferWrite {
                buffer: mirror.buffer(),
                offset: 32,
                len: 16
            }]
        );
    }

    #[test]
    fn test_diff_write_sends_changed_words_only() {
        let backend = DummyBackend::new();
        let mut mirror = mirror(&backend, 2);
        let mut record = TestRecord {
            value: [1.0, 2.0, 3.0],
            tag: 1,
        };
        mirror.write_record(&backend, 1, &record).unwrap();
        backend.clear_writes();

        record.value[1] = 5.0;
        assert_eq!(mirror.write_record_diff(&backend, 1, &record).unwrap(), 4);
        assert_eq!(
            backend.writes(),
            vec![BufferWrite {
                buffer: mirror.buffer(),
                offset: 20,
                len: 4
            }]
        );
        assert_eq!(mirror.record::<TestRecord>(1).unwrap(), record);
    }

    #[test]
    fn test_diff_write_spans_first_to_last_change() {
        let backend = DummyBackend::new();
        let mut mirror = mirror(&backend, 1);
        let record = TestRecord {
            value: [1.0, 0.0, 0.0],
            tag: 3,
        };

        assert_eq!(mirror.write_record_diff(&backend, 0, &record).unwrap(), 16);
        assert_eq!(mirror.write_record_diff(&backend, 0, &record).unwrap(), 0);
        assert_eq!(backend.writes().len(), 1);
    }

    #[test]
    fn test_clear_record_zero_fills() {
        let backend = DummyBackend::new();
        let mut mirror = mirror(&backend, 2);
        let record = TestRecord {
            value: [4.0; 3],
            tag: 4,
        };
        mirror.write_record(&backend, 0, &record).unwrap();
        mirror.write_record(&backend, 1, &record).unwrap();
        mirror.clear_record::<_, TestRecord>(&backend, 0).unwrap();

        let device = backend.buffer_contents(mirror.buffer()).unwrap();
        assert!(device[..16].iter().all(|b| *b == 0));
        assert_eq!(&device[16..], bytemuck::bytes_of(&record));
    }

    #[test]
    fn test_flush_all_is_one_write() {
        let backend = DummyBackend::new();
        let mut mirror = mirror(&backend, 4);
        for slot in 0..4 {
            mirror
                .stage(
                    slot,
                    &TestRecord {
                        value: [slot as f32; 3],
                        tag: slot,
                    },
                )
                .unwrap();
        }
        assert!(backend.writes().is_empty());

        mirror.flush_all(&backend);
        assert_eq!(backend.writes().len(), 1);
        assert_eq!(backend.buffer_contents(mirror.buffer()).unwrap(), mirror.bytes());
    }
}
