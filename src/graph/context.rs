//! Render Graph Context
//!
//! [`RenderGraphContext`] owns the three executor buffers and the node→slot
//! binding table, constructed once at device initialization and shared by
//! reference with every stage executor. Mutation goes through the
//! shared/exclusive locks in here; stages resolving disjoint nodes contend
//! only briefly on the per-buffer locks, and a node shared across passes
//! (e.g. shadow and main both referencing one object) is serialized by the
//! same locks plus the per-frame processed sets.
//!
//! # Lock Order
//!
//! `bindings` before any buffer lock, buffers never nested with each other.
//! Growth applies in [`begin_frame`](RenderGraphContext::begin_frame) while
//! the caller guarantees no stage task is in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard};
use rustc_hash::FxHashMap;

use crate::buffers::{
    IndirectionBuffer, MaterialBuffer, NodeBufferKind, NodeDataBuffer, NodeDataSink, SlotIndex,
    TransformBuffer,
};
use crate::errors::Result;
use crate::records::{NodeIndirectionData, hash_material_data};
use crate::scene::{NodeKey, VisibleNode};
use crate::settings::RenderSettings;

/// Slots a node currently holds across the three buffers.
#[derive(Debug, Clone, Copy, Default)]
struct NodeBinding {
    transform: SlotIndex,
    indirection: SlotIndex,
    material: SlotIndex,
    material_hash: u64,
}

/// Shared executor-buffer state for every stage of a device.
pub struct RenderGraphContext {
    transforms: RwLock<TransformBuffer>,
    materials: RwLock<MaterialBuffer>,
    indirections: RwLock<IndirectionBuffer>,
    bindings: RwLock<FxHashMap<NodeKey, NodeBinding>>,
    data_sink: Arc<dyn NodeDataSink>,
    frame_index: AtomicU64,
}

impl RenderGraphContext {
    #[must_use]
    pub fn new(settings: &RenderSettings, data_sink: Arc<dyn NodeDataSink>) -> Self {
        Self {
            transforms: RwLock::new(NodeDataBuffer::new(
                NodeBufferKind::Transform,
                &settings.buffers,
            )),
            materials: RwLock::new(MaterialBuffer::new(&settings.buffers)),
            indirections: RwLock::new(NodeDataBuffer::new(
                NodeBufferKind::Indirection,
                &settings.buffers,
            )),
            bindings: RwLock::new(FxHashMap::default()),
            data_sink,
            frame_index: AtomicU64::new(0),
        }
    }

    /// Opens a new frame: applies pending buffer growth and advances the
    /// frame counter. Must not overlap stage tasks or commits.
    pub fn begin_frame(&self) -> u64 {
        let sink = &*self.data_sink;
        self.transforms.write().begin_frame(sink);
        self.materials.write().begin_frame(sink);
        self.indirections.write().begin_frame(sink);
        self.frame_index.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Flushes the dirty range of each buffer to the GPU in a fixed,
    /// deterministic order: transform, material, indirection. Material
    /// aging runs first so eviction clocks tick exactly once per frame.
    ///
    /// Returns whether any byte range was uploaded.
    pub fn commit_buffers(&self) -> bool {
        let sink = &*self.data_sink;
        let mut uploaded = self.transforms.write().commit(sink).is_some();
        {
            let mut materials = self.materials.write();
            materials.age_unreferenced();
            uploaded |= materials.commit(sink).is_some();
        }
        uploaded |= self.indirections.write().commit(sink).is_some();
        uploaded
    }

    /// Current frame number (1-based once rendering has started).
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index.load(Ordering::Acquire)
    }

    // ========================================================================
    // Node resolve operations (called from stage executors)
    // ========================================================================

    /// Resolves the node's transform slot, allocating on first sight and
    /// rewriting the record when the transform is dirty. Idempotent within
    /// a frame: only the first stage touching the node writes.
    pub(crate) fn resolve_node_transform(&self, node: &VisibleNode) -> Result<SlotIndex> {
        let mut bindings = self.bindings.write();
        let binding = bindings.entry(node.key).or_default();
        let mut transforms = self.transforms.write();

        let (slot, fresh) = if binding.transform.is_valid() && transforms.contains(binding.transform)
        {
            (binding.transform, false)
        } else {
            let slot = transforms.allocate()?;
            binding.transform = slot;
            (slot, true)
        };

        let first_this_frame = transforms.mark_used_this_frame(slot)?;
        if first_this_frame && (fresh || node.component.transform_dirty()) {
            transforms.write(slot, node.component.transform().to_record(node.bounds))?;
        }
        Ok(slot)
    }

    /// Resolves the node's (possibly shared) material slot.
    ///
    /// When the node's computed hash no longer matches its cached slot, a
    /// new slot is leased and the old one's reference count is decremented.
    pub(crate) fn resolve_node_material(&self, node: &VisibleNode) -> Result<SlotIndex> {
        let record = node.component.material().pack();
        let hash = hash_material_data(&record);

        let mut bindings = self.bindings.write();
        let binding = bindings.entry(node.key).or_default();
        let mut materials = self.materials.write();

        if binding.material.is_valid()
            && binding.material_hash == hash
            && materials.contains(binding.material)
        {
            materials.touch(binding.material)?;
            return Ok(binding.material);
        }

        let previous = binding.material;
        let lease = materials.lease(&record)?;
        if previous.is_valid() {
            materials.release_ref(previous);
        }
        binding.material = lease.slot;
        binding.material_hash = hash;
        Ok(lease.slot)
    }

    /// Populates the node's indirection entry from its resolved slots.
    ///
    /// Returns whether the indirection buffer needs a GPU update from this
    /// call.
    pub(crate) fn resolve_node_indirection(
        &self,
        node: &VisibleNode,
        transform_slot: SlotIndex,
        material_slot: SlotIndex,
    ) -> Result<(SlotIndex, bool)> {
        let mut bindings = self.bindings.write();
        let binding = bindings.entry(node.key).or_default();
        let mut indirections = self.indirections.write();

        let slot = if binding.indirection.is_valid() && indirections.contains(binding.indirection) {
            binding.indirection
        } else {
            let slot = indirections.allocate()?;
            binding.indirection = slot;
            slot
        };

        indirections.mark_used_this_frame(slot)?;
        let dirty = indirections.write_if_changed(
            slot,
            NodeIndirectionData::new(transform_slot.index(), material_slot.index()),
        )?;
        Ok((slot, dirty))
    }

    // ========================================================================
    // Rendering-component lifecycle hooks
    // ========================================================================

    /// Registers a node; slots are still leased lazily on first visibility.
    pub fn on_rendering_component_creation(&self, key: NodeKey) {
        self.bindings.write().entry(key).or_default();
    }

    /// Releases every slot the node holds. Must be called when the node is
    /// destroyed, or its slots leak until process teardown.
    pub fn on_rendering_component_destruction(&self, key: NodeKey) {
        let Some(binding) = self.bindings.write().remove(&key) else {
            return;
        };
        if binding.transform.is_valid() {
            self.transforms.write().release(binding.transform);
        }
        if binding.indirection.is_valid() {
            self.indirections.write().release(binding.indirection);
        }
        if binding.material.is_valid() {
            self.materials.write().release_ref(binding.material);
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Read access to the transform buffer (inspection only).
    pub fn transforms(&self) -> RwLockReadGuard<'_, TransformBuffer> {
        self.transforms.read()
    }

    /// Read access to the material buffer (inspection only).
    pub fn materials(&self) -> RwLockReadGuard<'_, MaterialBuffer> {
        self.materials.read()
    }

    /// Read access to the indirection buffer (inspection only).
    pub fn indirections(&self) -> RwLockReadGuard<'_, IndirectionBuffer> {
        self.indirections.read()
    }

    /// The node's current transform slot, if bound.
    #[must_use]
    pub fn transform_slot_of(&self, key: NodeKey) -> Option<SlotIndex> {
        let bindings = self.bindings.read();
        let slot = bindings.get(&key)?.transform;
        (slot.is_valid() && self.transforms.read().contains(slot)).then_some(slot)
    }

    /// The node's current material slot, if bound.
    #[must_use]
    pub fn material_slot_of(&self, key: NodeKey) -> Option<SlotIndex> {
        let bindings = self.bindings.read();
        let slot = bindings.get(&key)?.material;
        (slot.is_valid() && self.materials.read().contains(slot)).then_some(slot)
    }

    /// The node's current indirection buffer index, if bound.
    #[must_use]
    pub fn indirection_index_of(&self, key: NodeKey) -> Option<u32> {
        let bindings = self.bindings.read();
        let slot = bindings.get(&key)?.indirection;
        (slot.is_valid() && self.indirections.read().contains(slot)).then(|| slot.index())
    }
}
