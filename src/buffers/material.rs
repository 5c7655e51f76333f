//! Deduplicated Material Buffer
//!
//! Layers content-hash deduplication, reference counting and frame-lifetime
//! eviction on top of [`NodeDataBuffer`]. Many nodes sharing an identical
//! material configuration share one GPU slot.
//!
//! # Eviction Rules
//!
//! `frames_since_last_used` increments every frame a slot is not referenced
//! by any visible node. A slot becomes eligible for reuse once its reference
//! count is zero and it has sat unreferenced for a full
//! `max_frame_lifetime` window — and never while the current in-flight
//! frame references it (guarded by the per-frame processed set).

use rustc_hash::FxHashMap;

use super::node_buffer::NodeDataBuffer;
use super::{NodeBufferKind, NodeDataSink, SlotIndex};
use crate::errors::Result;
use crate::records::{NodeMaterialData, hash_material_data};
use crate::settings::BufferSettings;

/// Host-side bookkeeping for one live material slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialLookupInfo {
    /// The slot this entry describes.
    pub slot: SlotIndex,
    /// Content hash of the record stored in the slot. Stable for the
    /// slot's lifetime.
    pub hash: u64,
    /// Frames this slot has gone unreferenced by any visible node.
    pub frames_since_last_used: u32,
    /// Number of nodes currently bound to this slot.
    pub ref_count: u32,
    /// False for collision-fallback slots, which are never shared.
    pub shared: bool,
}

/// Result of a material slot request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialLease {
    /// The leased (possibly shared) slot.
    pub slot: SlotIndex,
    /// True for a dedup cache hit — no record was written.
    pub reused: bool,
}

/// Content-hash-deduplicated material record buffer.
pub struct MaterialBuffer {
    inner: NodeDataBuffer<NodeMaterialData>,
    /// hash → shared slot. Collision-fallback slots are deliberately absent.
    lookup: FxHashMap<u64, SlotIndex>,
    /// Indexed by slot index; `None` for free slots.
    info: Vec<Option<MaterialLookupInfo>>,
    max_frame_lifetime: u32,
}

impl MaterialBuffer {
    #[must_use]
    pub fn new(settings: &BufferSettings) -> Self {
        let inner = NodeDataBuffer::new(NodeBufferKind::Material, settings);
        let capacity = inner.capacity() as usize;
        Self {
            inner,
            lookup: FxHashMap::default(),
            info: vec![None; capacity],
            max_frame_lifetime: settings.max_frame_lifetime,
        }
    }

    /// Resolves a slot for `record`, deduplicating by content hash.
    ///
    /// A live slot with a matching hash and identical content is returned
    /// directly (cache hit, no write). A hash collision against different
    /// content falls back to a guaranteed-unique slot so that no other
    /// node's material is ever corrupted. Otherwise a free — or expired —
    /// slot is allocated and the hash registered.
    ///
    /// Every successful lease increments the slot's reference count.
    pub fn lease(&mut self, record: &NodeMaterialData) -> Result<MaterialLease> {
        let hash = hash_material_data(record);

        if let Some(&slot) = self.lookup.get(&hash) {
            if self.inner.contains(slot) {
                if self.inner.get(slot) == Some(record) {
                    self.inner.mark_used_this_frame(slot)?;
                    let info = self.info_mut(slot);
                    info.frames_since_last_used = 0;
                    info.ref_count += 1;
                    return Ok(MaterialLease { slot, reused: true });
                }
                log::debug!(
                    "material hash collision on {hash:#018x}; falling back to a unique slot"
                );
                return self.lease_new(hash, record, false);
            }
            // Registration outlived its slot (evicted); drop it.
            self.lookup.remove(&hash);
        }

        self.lease_new(hash, record, true)
    }

    /// Per-frame refresh for a slot a node stays bound to.
    ///
    /// Resets the unused-frame counter and marks the slot as referenced by
    /// the current frame. Idempotent within a frame.
    pub fn touch(&mut self, slot: SlotIndex) -> Result<()> {
        if self.inner.mark_used_this_frame(slot)? {
            self.info_mut(slot).frames_since_last_used = 0;
        }
        Ok(())
    }

    /// Drops one node's reference to `slot`.
    ///
    /// The slot is not freed here — once the count reaches zero the
    /// frame-lifetime clock decides when it may be reused.
    pub fn release_ref(&mut self, slot: SlotIndex) {
        if !self.inner.contains(slot) {
            return;
        }
        if let Some(info) = &mut self.info[slot.index() as usize] {
            info.ref_count = info.ref_count.saturating_sub(1);
        }
    }

    /// Ages every live slot not referenced this frame. Must run before
    /// [`commit`](Self::commit) clears the per-frame processed set.
    pub fn age_unreferenced(&mut self) {
        for entry in self.info.iter_mut().flatten() {
            if !self.inner.is_marked_this_frame(entry.slot) {
                entry.frames_since_last_used += 1;
            }
        }
    }

    /// See [`NodeDataBuffer::commit`].
    pub fn commit(&mut self, sink: &dyn NodeDataSink) -> Option<(u64, u64)> {
        self.inner.commit(sink)
    }

    /// See [`NodeDataBuffer::begin_frame`].
    pub fn begin_frame(&mut self, sink: &dyn NodeDataSink) {
        self.inner.begin_frame(sink);
        if self.info.len() < self.inner.capacity() as usize {
            self.info.resize(self.inner.capacity() as usize, None);
        }
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, slot: SlotIndex) -> bool {
        self.inner.contains(slot)
    }

    /// Bookkeeping for a live slot.
    #[must_use]
    pub fn lookup_info(&self, slot: SlotIndex) -> Option<&MaterialLookupInfo> {
        if !self.inner.contains(slot) {
            return None;
        }
        self.info[slot.index() as usize].as_ref()
    }

    /// Shared slot registered for `hash`, if any.
    #[must_use]
    pub fn slot_for_hash(&self, hash: u64) -> Option<SlotIndex> {
        self.lookup.get(&hash).copied().filter(|&s| self.inner.contains(s))
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.inner.capacity()
    }

    #[inline]
    #[must_use]
    pub fn live_len(&self) -> u32 {
        self.inner.live_len()
    }

    #[inline]
    #[must_use]
    pub fn dirty_range(&self) -> &super::BufferUpdateRange {
        self.inner.dirty_range()
    }

    fn lease_new(
        &mut self,
        hash: u64,
        record: &NodeMaterialData,
        shared: bool,
    ) -> Result<MaterialLease> {
        let slot = self.allocate_slot()?;
        self.inner.write(slot, *record)?;
        self.inner.mark_used_this_frame(slot)?;
        self.info[slot.index() as usize] = Some(MaterialLookupInfo {
            slot,
            hash,
            frames_since_last_used: 0,
            ref_count: 1,
            shared,
        });
        if shared {
            self.lookup.insert(hash, slot);
        }
        Ok(MaterialLease {
            slot,
            reused: false,
        })
    }

    /// Free-list allocation, falling back to evicting the least recently
    /// used expired slot when the free list is empty.
    fn allocate_slot(&mut self) -> Result<SlotIndex> {
        if self.inner.free_len() == 0
            && let Some(victim) = self.find_expired_slot()
        {
            self.evict(victim);
        }
        self.inner.allocate()
    }

    fn find_expired_slot(&self) -> Option<SlotIndex> {
        self.info
            .iter()
            .flatten()
            .filter(|e| {
                e.ref_count == 0
                    && e.frames_since_last_used >= self.max_frame_lifetime
                    && !self.inner.is_marked_this_frame(e.slot)
            })
            .max_by_key(|e| e.frames_since_last_used)
            .map(|e| e.slot)
    }

    fn evict(&mut self, victim: SlotIndex) {
        let Some(entry) = self.info[victim.index() as usize].take() else {
            return;
        };
        if entry.shared && self.lookup.get(&entry.hash) == Some(&victim) {
            self.lookup.remove(&entry.hash);
        }
        self.inner.release(victim);
        log::debug!(
            "evicted material slot {} after {} unreferenced frames",
            victim.index(),
            entry.frames_since_last_used
        );
    }

    fn info_mut(&mut self, slot: SlotIndex) -> &mut MaterialLookupInfo {
        self.info[slot.index() as usize]
            .as_mut()
            .expect("live material slot without lookup info")
    }
}

#[cfg(test)]
mod tests {
    use glam::UVec4;

    use super::*;
    use crate::buffers::sink::test_support::RecordingSink;
    use crate::records::material::pack_u8x4;

    fn settings(materials: u32, lifetime: u32) -> BufferSettings {
        BufferSettings {
            max_concurrent_materials: materials,
            max_frame_lifetime: lifetime,
            allow_growth: false,
            ..BufferSettings::default()
        }
    }

    fn record(tag: u8) -> NodeMaterialData {
        NodeMaterialData {
            packed: UVec4::new(pack_u8x4([tag, 0, 0, 0]), 0, 0, 0),
            ..NodeMaterialData::default()
        }
    }

    fn end_frame(buffer: &mut MaterialBuffer, sink: &RecordingSink) {
        buffer.age_unreferenced();
        buffer.commit(sink);
        buffer.begin_frame(sink);
    }

    #[test]
    fn identical_records_share_a_slot() {
        let mut buffer = MaterialBuffer::new(&settings(4, 2));
        let a = buffer.lease(&record(1)).unwrap();
        let b = buffer.lease(&record(1)).unwrap();
        assert_eq!(a.slot, b.slot);
        assert!(!a.reused);
        assert!(b.reused);
        assert_eq!(buffer.lookup_info(a.slot).unwrap().ref_count, 2);
    }

    #[test]
    fn distinct_records_get_distinct_slots() {
        let mut buffer = MaterialBuffer::new(&settings(4, 2));
        let a = buffer.lease(&record(1)).unwrap();
        let b = buffer.lease(&record(2)).unwrap();
        assert_ne!(a.slot, b.slot);
    }

    #[test]
    fn expired_slot_is_reused_under_pressure() {
        let sink = RecordingSink::default();
        let lifetime = 2;
        let mut buffer = MaterialBuffer::new(&settings(1, lifetime));

        let first = buffer.lease(&record(1)).unwrap();
        buffer.release_ref(first.slot);
        end_frame(&mut buffer, &sink);

        // Unreferenced but not yet expired: allocation pressure must fail.
        assert!(buffer.lease(&record(2)).is_err());
        end_frame(&mut buffer, &sink);
        end_frame(&mut buffer, &sink);

        // Past the lifetime window the slot is reclaimed.
        let second = buffer.lease(&record(2)).unwrap();
        assert_eq!(second.slot.index(), first.slot.index());
        assert!(!buffer.contains(first.slot));
    }

    #[test]
    fn referenced_slot_is_never_evicted() {
        let sink = RecordingSink::default();
        let mut buffer = MaterialBuffer::new(&settings(1, 1));
        let held = buffer.lease(&record(1)).unwrap();
        for _ in 0..4 {
            end_frame(&mut buffer, &sink);
        }
        // ref_count is still 1, so the slot may not be reclaimed.
        assert!(buffer.lease(&record(2)).is_err());
        assert!(buffer.contains(held.slot));
    }
}
