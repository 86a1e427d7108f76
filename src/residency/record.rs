//! Packed record codec
//!
//! A record is a fixed-size `Pod` struct whose bytes are exactly what shaders
//! read. Slot `n` of a pool lives at `n * size_of::<R>()` in the flat buffer.

use std::ops::Range;

use bytemuck::Pod;

use crate::error::{SlotError, SlotResult};

/// Fixed-size, shader-visible binary encoding of one resource.
pub trait PackedRecord: Pod {
    /// Name of the matching WGSL struct
    const WGSL_NAME: &'static str;

    /// Shader-visible members and their byte offsets, in declaration order.
    /// Padding fields are left out.
    const MEMBERS: &'static [(&'static str, usize)];

    /// WGSL source declaring the struct
    fn wgsl() -> &'static str;

    /// Record size in bytes
    fn size() -> u64 {
        std::mem::size_of::<Self>() as u64
    }
}

/// Byte offset of a slot in the flat buffer
pub fn record_offset<R: PackedRecord>(slot: u32) -> u64 {
    slot as u64 * R::size()
}

/// Byte range of a slot in the flat buffer
pub fn record_range<R: PackedRecord>(slot: u32) -> Range<usize> {
    let start = record_offset::<R>(slot) as usize;
    start..start + R::size() as usize
}

/// Write `record` into its slot of `bytes`.
pub fn encode_at<R: PackedRecord>(bytes: &mut [u8], slot: u32, record: &R) -> SlotResult<()> {
    let range = record_range::<R>(slot);
    let len = bytes.len();
    let target = bytes.get_mut(range.clone()).ok_or_else(|| {
        SlotError::InvalidState(format!(
            "slot {} ({:?}) lies outside a {}-byte buffer",
            slot, range, len
        ))
    })?;
    target.copy_from_slice(bytemuck::bytes_of(record));
    Ok(())
}

/// Read the record stored in a slot of `bytes`.
pub fn decode_at<R: PackedRecord>(bytes: &[u8], slot: u32) -> SlotResult<R> {
    let range = record_range::<R>(slot);
    let source = bytes.get(range.clone()).ok_or_else(|| {
        SlotError::InvalidState(format!(
            "slot {} ({:?}) lies outside a {}-byte buffer",
            slot,
            range,
            bytes.len()
        ))
    })?;
    Ok(bytemuck::pod_read_unaligned(source))
}
