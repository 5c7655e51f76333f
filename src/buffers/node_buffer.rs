//! Generic Node-Data Buffer
//!
//! Host-side record mirror + slot arena + dirty-range tracking shared by
//! the transform and indirection buffers (the material buffer layers
//! hash-dedup on top, see [`super::material`]).
//!
//! # Growth Protocol
//!
//! Capacity exhaustion and low-water breaches only *record* a growth
//! request; the resize itself happens in [`NodeDataBuffer::begin_frame`],
//! between frames, before any allocate of the new frame is served and never
//! concurrently with a commit. After a resize the GPU storage is fresh, so
//! the dirty range is widened to cover every previously-resident slot.

use bytemuck::{Pod, Zeroable};
use rustc_hash::FxHashSet;

use super::{BufferUpdateRange, NodeBufferKind, NodeDataSink, SlotArena, SlotIndex};
use crate::errors::{RenderError, Result};
use crate::records::{NodeIndirectionData, NodeTransformData};
use crate::settings::BufferSettings;

/// Transform-record buffer; one fresh slot per node.
pub type TransformBuffer = NodeDataBuffer<NodeTransformData>;

/// Indirection-record buffer; one fresh slot per node.
pub type IndirectionBuffer = NodeDataBuffer<NodeIndirectionData>;

/// Fixed-capacity record container with free list and dirty-range tracking.
pub struct NodeDataBuffer<T: Pod> {
    kind: NodeBufferKind,
    records: Vec<T>,
    arena: SlotArena,
    dirty: BufferUpdateRange,
    /// Slots already touched this frame; guards duplicate range-widening.
    processed: FxHashSet<u32>,
    pending_capacity: Option<u32>,
    growth_factor: u32,
    low_water_divisor: u32,
    allow_growth: bool,
}

impl<T: Pod + PartialEq> NodeDataBuffer<T> {
    #[must_use]
    pub fn new(kind: NodeBufferKind, settings: &BufferSettings) -> Self {
        let capacity = match kind {
            NodeBufferKind::Material => settings.max_concurrent_materials,
            NodeBufferKind::Transform | NodeBufferKind::Indirection => settings.max_visible_nodes,
        };
        Self {
            kind,
            records: vec![T::zeroed(); capacity as usize],
            arena: SlotArena::new(capacity),
            dirty: BufferUpdateRange::EMPTY,
            processed: FxHashSet::default(),
            pending_capacity: None,
            growth_factor: settings.growth_factor.max(2),
            low_water_divisor: settings.low_water_divisor.max(1),
            allow_growth: settings.allow_growth,
        }
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> NodeBufferKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.arena.capacity()
    }

    #[inline]
    #[must_use]
    pub fn free_len(&self) -> u32 {
        self.arena.free_len()
    }

    #[inline]
    #[must_use]
    pub fn live_len(&self) -> u32 {
        self.arena.live_len()
    }

    /// Leases a fresh slot from the free list.
    ///
    /// On exhaustion a growth request is recorded (served next frame) and
    /// [`RenderError::CapacityExhausted`] is returned.
    pub fn allocate(&mut self) -> Result<SlotIndex> {
        match self.arena.allocate() {
            Some(slot) => Ok(slot),
            None => {
                self.request_growth();
                Err(RenderError::CapacityExhausted {
                    kind: self.kind,
                    capacity: self.capacity(),
                })
            }
        }
    }

    /// Returns a slot to the free list. Stale handles are ignored.
    pub fn release(&mut self, slot: SlotIndex) -> bool {
        self.arena.release(slot)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, slot: SlotIndex) -> bool {
        self.arena.contains(slot)
    }

    #[must_use]
    pub fn get(&self, slot: SlotIndex) -> Option<&T> {
        self.arena
            .contains(slot)
            .then(|| &self.records[slot.index() as usize])
    }

    /// Copies `record` into the local mirror and widens the dirty range.
    pub fn write(&mut self, slot: SlotIndex, record: T) -> Result<()> {
        self.check_live(slot)?;
        self.records[slot.index() as usize] = record;
        self.dirty.widen(slot.index());
        Ok(())
    }

    /// Like [`write`](Self::write) but skips the copy (and the range
    /// widening) when the mirror already holds an identical record.
    ///
    /// Returns whether a GPU update became necessary through this call.
    pub fn write_if_changed(&mut self, slot: SlotIndex, record: T) -> Result<bool> {
        self.check_live(slot)?;
        let current = &mut self.records[slot.index() as usize];
        if *current == record {
            return Ok(false);
        }
        *current = record;
        self.dirty.widen(slot.index());
        Ok(true)
    }

    /// Idempotent per-frame usage marker.
    ///
    /// Returns `true` only for the first call on `slot` this frame; callers
    /// use that to gate once-per-frame work when several passes reference
    /// the same slot.
    pub fn mark_used_this_frame(&mut self, slot: SlotIndex) -> Result<bool> {
        self.check_live(slot)?;
        Ok(self.processed.insert(slot.index()))
    }

    /// True when `mark_used_this_frame` has been called on `slot` this frame.
    #[must_use]
    pub fn is_marked_this_frame(&self, slot: SlotIndex) -> bool {
        self.processed.contains(&slot.index())
    }

    #[inline]
    #[must_use]
    pub fn dirty_range(&self) -> &BufferUpdateRange {
        &self.dirty
    }

    /// Uploads the dirty byte range (if any), then resets the range and the
    /// per-frame processed set. Called once per frame.
    ///
    /// Returns the `(byte_offset, byte_len)` that was uploaded.
    pub fn commit(&mut self, sink: &dyn NodeDataSink) -> Option<(u64, u64)> {
        let uploaded = if self.dirty.is_empty() {
            None
        } else {
            let stride = self.kind.stride();
            let first = self.dirty.first_idx() as usize;
            let last = self.dirty.last_idx() as usize;
            let offset = self.dirty.byte_offset(stride);
            let bytes: &[u8] = bytemuck::cast_slice(&self.records[first..=last]);
            sink.upload(self.kind, offset, bytes);
            Some((offset, bytes.len() as u64))
        };
        self.dirty.reset();
        self.processed.clear();

        // Low-water check: the resize request is served before the next
        // frame's first allocate, never concurrently with this commit.
        let low_water = (self.capacity() / self.low_water_divisor).max(1);
        if self.allow_growth && self.free_len() < low_water {
            self.request_growth();
        }
        uploaded
    }

    /// Applies a pending growth request. Must run between frames while no
    /// commit is in flight.
    pub fn begin_frame(&mut self, sink: &dyn NodeDataSink) {
        debug_assert!(
            self.processed.is_empty(),
            "{} frame started without a commit",
            self.kind.label()
        );
        if let Some(new_capacity) = self.pending_capacity.take() {
            self.apply_growth(sink, new_capacity);
        }
    }

    fn apply_growth(&mut self, sink: &dyn NodeDataSink, new_capacity: u32) {
        let old_capacity = self.capacity();
        log::info!(
            "{} resizing: {} -> {} slots",
            self.kind.label(),
            old_capacity,
            new_capacity
        );
        self.records.resize(new_capacity as usize, T::zeroed());
        self.arena.grow(new_capacity);
        sink.grow(self.kind, u64::from(new_capacity) * self.kind.stride());

        // The GPU storage was recreated; everything resident must re-upload.
        if self.live_len() > 0 && old_capacity > 0 {
            self.dirty.widen(0);
            self.dirty.widen(old_capacity - 1);
        }
    }

    fn request_growth(&mut self) {
        if !self.allow_growth || self.pending_capacity.is_some() {
            return;
        }
        let next = (self.capacity().saturating_mul(self.growth_factor)).max(self.capacity() + 1);
        log::warn!(
            "{} growth requested: {} -> {} slots",
            self.kind.label(),
            self.capacity(),
            next
        );
        self.pending_capacity = Some(next);
    }

    fn check_live(&self, slot: SlotIndex) -> Result<()> {
        if self.arena.contains(slot) {
            Ok(())
        } else {
            Err(RenderError::StaleSlot {
                kind: self.kind,
                index: slot.index(),
                generation: slot.generation(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::sink::test_support::RecordingSink;
    use crate::records::NodeIndirectionData;

    fn small_settings() -> BufferSettings {
        BufferSettings {
            max_visible_nodes: 8,
            max_concurrent_materials: 4,
            ..BufferSettings::default()
        }
    }

    #[test]
    fn write_widens_and_commit_resets() {
        let sink = RecordingSink::default();
        let mut buffer: IndirectionBuffer =
            NodeDataBuffer::new(NodeBufferKind::Indirection, &small_settings());
        let a = buffer.allocate().unwrap();
        let b = buffer.allocate().unwrap();
        buffer.write(a, NodeIndirectionData::new(1, 1)).unwrap();
        buffer.write(b, NodeIndirectionData::new(2, 2)).unwrap();

        let (offset, len) = buffer.commit(&sink).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(len, 2 * NodeBufferKind::Indirection.stride());
        assert!(buffer.dirty_range().is_empty());
        assert!(buffer.commit(&sink).is_none());
    }

    #[test]
    fn write_if_changed_skips_identical_records() {
        let sink = RecordingSink::default();
        let mut buffer: IndirectionBuffer =
            NodeDataBuffer::new(NodeBufferKind::Indirection, &small_settings());
        let slot = buffer.allocate().unwrap();
        let record = NodeIndirectionData::new(3, 4);
        assert!(buffer.write_if_changed(slot, record).unwrap());
        buffer.commit(&sink);
        assert!(!buffer.write_if_changed(slot, record).unwrap());
        assert!(buffer.dirty_range().is_empty());
    }

    #[test]
    fn mark_used_is_idempotent_within_a_frame() {
        let sink = RecordingSink::default();
        let mut buffer: IndirectionBuffer =
            NodeDataBuffer::new(NodeBufferKind::Indirection, &small_settings());
        let slot = buffer.allocate().unwrap();
        assert!(buffer.mark_used_this_frame(slot).unwrap());
        assert!(!buffer.mark_used_this_frame(slot).unwrap());
        buffer.commit(&sink);
        assert!(buffer.mark_used_this_frame(slot).unwrap());
    }

    #[test]
    fn exhaustion_requests_growth_served_next_frame() {
        let sink = RecordingSink::default();
        let mut buffer: IndirectionBuffer =
            NodeDataBuffer::new(NodeBufferKind::Indirection, &small_settings());
        for _ in 0..8 {
            buffer.allocate().unwrap();
        }
        assert!(matches!(
            buffer.allocate(),
            Err(RenderError::CapacityExhausted { .. })
        ));

        buffer.commit(&sink);
        buffer.begin_frame(&sink);
        assert_eq!(buffer.capacity(), 16);
        assert!(buffer.allocate().is_ok());
        assert_eq!(sink.grow_calls(), 1);
    }

    #[test]
    fn stale_write_is_rejected() {
        let mut buffer: IndirectionBuffer =
            NodeDataBuffer::new(NodeBufferKind::Indirection, &small_settings());
        let slot = buffer.allocate().unwrap();
        buffer.release(slot);
        assert!(matches!(
            buffer.write(slot, NodeIndirectionData::INVALID),
            Err(RenderError::StaleSlot { .. })
        ));
    }
}
