//! Node-Data Buffer Tests
//!
//! Tests for:
//! - Slot uniqueness and material deduplication across visible nodes
//! - Dirty-range soundness of the per-frame commit
//! - Free-list recycling through the component lifecycle hooks
//! - Material slot aging, eviction eligibility and current-frame safety
//! - Capacity exhaustion and frame-boundary growth

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::{Vec3, Vec4};
use slotmap::SlotMap;

use ember_render::buffers::sink::test_support::RecordingSink;
use ember_render::buffers::{NodeBufferKind, NodeDataBuffer, TransformBuffer};
use ember_render::buffers::material::MaterialBuffer;
use ember_render::records::NodeMaterialData;
use ember_render::scene::{
    AlphaMode, BoundingSphere, DrawGeometry, MaterialDescriptor, NodeKey, RenderingComponent,
    TransformSnapshot, VisibleNode,
};
use ember_render::{
    BufferSettings, CameraSnapshot, CommandList, MemoryBarrier, RenderGraphContext, RenderPass,
    RenderPassExecutor, RenderSettings, RenderStage, StageStats,
};

// ============================================================================
// Harness
// ============================================================================

struct TestComponent {
    transform: TransformSnapshot,
    dirty: bool,
    material: Mutex<MaterialDescriptor>,
    geometry: DrawGeometry,
    transform_reads: AtomicUsize,
}

impl TestComponent {
    fn with_material(material: MaterialDescriptor) -> Arc<Self> {
        Arc::new(Self {
            transform: TransformSnapshot::default(),
            dirty: true,
            material: Mutex::new(material),
            geometry: DrawGeometry::new(1, 36),
            transform_reads: AtomicUsize::new(0),
        })
    }

    fn opaque(tag: f32) -> Arc<Self> {
        Self::with_material(MaterialDescriptor {
            albedo: Vec4::new(tag, 0.5, 0.5, 1.0),
            alpha: AlphaMode::Opaque,
            ..MaterialDescriptor::default()
        })
    }

    fn set_material(&self, material: MaterialDescriptor) {
        *self.material.lock().unwrap() = material;
    }
}

impl RenderingComponent for TestComponent {
    fn transform(&self) -> TransformSnapshot {
        self.transform_reads.fetch_add(1, Ordering::SeqCst);
        self.transform
    }

    fn transform_dirty(&self) -> bool {
        self.dirty
    }

    fn material(&self) -> MaterialDescriptor {
        *self.material.lock().unwrap()
    }

    fn draw_geometry(&self) -> DrawGeometry {
        self.geometry
    }
}

fn make_node(
    keys: &mut SlotMap<NodeKey, ()>,
    component: &Arc<TestComponent>,
    position: Vec3,
) -> VisibleNode {
    VisibleNode {
        key: keys.insert(()),
        bounds: BoundingSphere::new(position, 1.0),
        component: Arc::clone(component) as Arc<dyn RenderingComponent>,
    }
}

fn test_settings(nodes: u32, materials: u32) -> RenderSettings {
    RenderSettings {
        buffers: BufferSettings {
            max_visible_nodes: nodes,
            max_concurrent_materials: materials,
            ..BufferSettings::default()
        },
        ..RenderSettings::default()
    }
}

fn run_pass(
    ctx: &RenderGraphContext,
    executor: &mut RenderPassExecutor,
    nodes: &[VisibleNode],
) -> StageStats {
    let params = RenderPass::for_stage(executor.stage()).params().clone();
    let mut cmd = CommandList::new("test");
    let mut barrier = MemoryBarrier::default();
    executor
        .do_custom_pass(ctx, &CameraSnapshot::default(), &params, nodes, &mut cmd, &mut barrier)
        .expect("pass should succeed")
}

// ============================================================================
// Slot uniqueness & material dedup (the A/B/C scenario)
// ============================================================================

#[test]
fn three_nodes_two_materials_share_and_split_slots() {
    let settings = test_settings(64, 16);
    let sink = Arc::new(RecordingSink::default());
    let ctx = RenderGraphContext::new(&settings, sink.clone());
    let mut executor = RenderPassExecutor::new(RenderStage::Display);
    let mut keys = SlotMap::with_key();

    let shared = TestComponent::opaque(0.25);
    let unique = TestComponent::opaque(0.75);
    let a = make_node(&mut keys, &shared, Vec3::new(0.0, 0.0, 1.0));
    let b = make_node(&mut keys, &shared, Vec3::new(0.0, 0.0, 2.0));
    let c = make_node(&mut keys, &unique, Vec3::new(0.0, 0.0, 3.0));

    ctx.begin_frame();
    let stats = run_pass(&ctx, &mut executor, &[a.clone(), b.clone(), c.clone()]);
    assert_eq!(stats.visible, 3);
    assert_eq!(stats.skipped, 0);

    // Every node holds exactly one transform slot and one indirection slot.
    let transform_slots: Vec<_> = [&a, &b, &c]
        .iter()
        .map(|n| ctx.transform_slot_of(n.key).expect("transform slot"))
        .collect();
    assert_ne!(transform_slots[0], transform_slots[1]);
    assert_ne!(transform_slots[1], transform_slots[2]);
    assert_ne!(transform_slots[0], transform_slots[2]);

    // A and B share one material slot; C gets its own.
    let mat_a = ctx.material_slot_of(a.key).expect("material slot");
    let mat_b = ctx.material_slot_of(b.key).expect("material slot");
    let mat_c = ctx.material_slot_of(c.key).expect("material slot");
    assert_eq!(mat_a, mat_b);
    assert_ne!(mat_a, mat_c);
    assert_eq!(ctx.materials().live_len(), 2);
    assert_eq!(
        ctx.materials().lookup_info(mat_a).unwrap().ref_count,
        2,
        "A and B both reference the shared slot"
    );

    // The material dirty range spans exactly the two newly-written slots.
    {
        let materials = ctx.materials();
        let range = materials.dirty_range();
        assert_eq!(range.slot_count(), 2);
        assert!(range.contains(mat_a.index()));
        assert!(range.contains(mat_c.index()));
    }

    // Commit uploads exactly two material records, then the range is empty.
    ctx.commit_buffers();
    let material_upload = sink
        .uploads()
        .into_iter()
        .find(|u| u.kind == NodeBufferKind::Material)
        .expect("material range uploaded");
    assert_eq!(
        material_upload.byte_len,
        2 * NodeBufferKind::Material.stride()
    );
    assert!(ctx.materials().dirty_range().is_empty());
}

#[test]
fn shared_node_resolves_once_across_stages() {
    let settings = test_settings(16, 8);
    let ctx = RenderGraphContext::new(&settings, Arc::new(RecordingSink::default()));
    let mut shadow = RenderPassExecutor::new(RenderStage::Shadow);
    let mut display = RenderPassExecutor::new(RenderStage::Display);
    let mut keys = SlotMap::with_key();

    let component = TestComponent::opaque(0.5);
    let node = make_node(&mut keys, &component, Vec3::ZERO);

    ctx.begin_frame();
    run_pass(&ctx, &mut shadow, std::slice::from_ref(&node));
    let slot_after_shadow = ctx.transform_slot_of(node.key).unwrap();
    run_pass(&ctx, &mut display, std::slice::from_ref(&node));

    // Same slot, and the transform record was built exactly once this frame.
    assert_eq!(ctx.transform_slot_of(node.key).unwrap(), slot_after_shadow);
    assert_eq!(component.transform_reads.load(Ordering::SeqCst), 1);
    // One lease, refreshed (not re-leased) by the second stage.
    let mat = ctx.material_slot_of(node.key).unwrap();
    assert_eq!(ctx.materials().lookup_info(mat).unwrap().ref_count, 1);
}

// ============================================================================
// Dirty-range soundness
// ============================================================================

#[test]
fn commit_uploads_a_superset_of_mutated_indices_then_resets() {
    let sink = RecordingSink::default();
    let settings = BufferSettings {
        max_visible_nodes: 16,
        ..BufferSettings::default()
    };
    let mut buffer: TransformBuffer =
        NodeDataBuffer::new(NodeBufferKind::Transform, &settings);

    let slots: Vec<_> = (0..6).map(|_| buffer.allocate().unwrap()).collect();
    for &i in &[1usize, 4] {
        buffer
            .write(slots[i], ember_render::records::NodeTransformData::default())
            .unwrap();
        buffer.mark_used_this_frame(slots[i]).unwrap();
    }

    let (offset, len) = buffer.commit(&sink).expect("dirty range uploads");
    let stride = NodeBufferKind::Transform.stride();
    // Mutated indices {1, 4} lie inside the uploaded byte span.
    assert!(offset <= stride);
    assert!(offset + len >= 5 * stride);
    assert!(buffer.dirty_range().is_empty());

    // Nothing mutated since: the next commit uploads nothing.
    assert!(buffer.commit(&sink).is_none());
}

#[test]
fn steady_state_frame_uploads_nothing() {
    let settings = test_settings(16, 8);
    let sink = Arc::new(RecordingSink::default());
    let ctx = RenderGraphContext::new(&settings, sink.clone());
    let mut executor = RenderPassExecutor::new(RenderStage::Display);
    let mut keys = SlotMap::with_key();

    // A clean component: transform only written on first sight.
    let component = Arc::new(TestComponent {
        transform: TransformSnapshot::default(),
        dirty: false,
        material: Mutex::new(MaterialDescriptor::default()),
        geometry: DrawGeometry::new(7, 12),
        transform_reads: AtomicUsize::new(0),
    });
    let node = make_node(&mut keys, &component, Vec3::ZERO);

    ctx.begin_frame();
    run_pass(&ctx, &mut executor, std::slice::from_ref(&node));
    assert!(ctx.commit_buffers(), "first frame uploads the new records");

    ctx.begin_frame();
    run_pass(&ctx, &mut executor, std::slice::from_ref(&node));
    assert!(
        !ctx.commit_buffers(),
        "unchanged node must not re-upload any range"
    );
}

// ============================================================================
// Free-list recycling through the lifecycle hooks
// ============================================================================

#[test]
fn destroyed_nodes_return_their_slots_for_reuse() {
    let settings = test_settings(8, 8);
    let ctx = RenderGraphContext::new(&settings, Arc::new(RecordingSink::default()));
    let mut executor = RenderPassExecutor::new(RenderStage::Display);
    let mut keys = SlotMap::with_key();

    let component = TestComponent::opaque(0.1);
    let first: Vec<_> = (0..4)
        .map(|i| make_node(&mut keys, &component, Vec3::new(i as f32, 0.0, 0.0)))
        .collect();

    ctx.begin_frame();
    run_pass(&ctx, &mut executor, &first);
    let mut original: Vec<u32> = first
        .iter()
        .map(|n| ctx.transform_slot_of(n.key).unwrap().index())
        .collect();
    original.sort_unstable();

    for node in &first {
        ctx.on_rendering_component_destruction(node.key);
        assert!(ctx.transform_slot_of(node.key).is_none());
    }
    ctx.commit_buffers();

    ctx.begin_frame();
    let second: Vec<_> = (0..4)
        .map(|i| make_node(&mut keys, &component, Vec3::new(i as f32, 1.0, 0.0)))
        .collect();
    run_pass(&ctx, &mut executor, &second);
    let mut recycled: Vec<u32> = second
        .iter()
        .map(|n| ctx.transform_slot_of(n.key).unwrap().index())
        .collect();
    recycled.sort_unstable();

    // Idempotent recycling: exactly the original index set, no leaks.
    assert_eq!(recycled, original);
}

// ============================================================================
// Material aging & eviction
// ============================================================================

fn material_record(tag: f32) -> NodeMaterialData {
    MaterialDescriptor {
        albedo: Vec4::new(tag, 0.0, 0.0, 1.0),
        ..MaterialDescriptor::default()
    }
    .pack()
}

#[test]
fn slot_becomes_eligible_exactly_after_the_lifetime_window() {
    let lifetime = 3;
    let sink = RecordingSink::default();
    let mut buffer = MaterialBuffer::new(&BufferSettings {
        max_concurrent_materials: 1,
        max_frame_lifetime: lifetime,
        allow_growth: false,
        ..BufferSettings::default()
    });

    // Frame 0: lease and immediately drop the node's reference.
    let first = buffer.lease(&material_record(0.1)).unwrap();
    buffer.release_ref(first.slot);
    buffer.age_unreferenced();
    buffer.commit(&sink);
    buffer.begin_frame(&sink);

    // Frames 1..=lifetime: unreferenced but not yet expired.
    for frame in 1..=lifetime {
        assert!(
            buffer.lease(&material_record(0.9)).is_err(),
            "slot reused during frame {frame}, before its lifetime elapsed"
        );
        buffer.age_unreferenced();
        buffer.commit(&sink);
        buffer.begin_frame(&sink);
    }

    // Frame lifetime + 1: the slot is reclaimable.
    let second = buffer.lease(&material_record(0.9)).unwrap();
    assert_eq!(second.slot.index(), first.slot.index());
    assert!(!buffer.contains(first.slot), "old handle must be stale");
}

#[test]
fn slot_referenced_by_the_current_frame_is_never_reused() {
    let sink = RecordingSink::default();
    let mut buffer = MaterialBuffer::new(&BufferSettings {
        max_concurrent_materials: 1,
        max_frame_lifetime: 0,
        allow_growth: false,
        ..BufferSettings::default()
    });

    // Leased and referenced this frame: even with a zero lifetime the slot
    // must survive until the frame ends.
    let held = buffer.lease(&material_record(0.2)).unwrap();
    buffer.release_ref(held.slot);
    assert!(buffer.lease(&material_record(0.8)).is_err());
    assert!(buffer.contains(held.slot));
}

#[test]
fn material_change_releases_the_old_slot_reference() {
    let settings = test_settings(16, 8);
    let ctx = RenderGraphContext::new(&settings, Arc::new(RecordingSink::default()));
    let mut executor = RenderPassExecutor::new(RenderStage::Display);
    let mut keys = SlotMap::with_key();

    let component = TestComponent::opaque(0.3);
    let node = make_node(&mut keys, &component, Vec3::ZERO);

    ctx.begin_frame();
    run_pass(&ctx, &mut executor, std::slice::from_ref(&node));
    let old_slot = ctx.material_slot_of(node.key).unwrap();
    ctx.commit_buffers();

    // The node's appearance changes; its hash no longer matches the slot.
    component.set_material(MaterialDescriptor {
        albedo: Vec4::new(0.9, 0.9, 0.9, 1.0),
        ..MaterialDescriptor::default()
    });

    ctx.begin_frame();
    run_pass(&ctx, &mut executor, std::slice::from_ref(&node));
    let new_slot = ctx.material_slot_of(node.key).unwrap();
    assert_ne!(new_slot, old_slot);
    assert_eq!(
        ctx.materials().lookup_info(old_slot).unwrap().ref_count,
        0,
        "old slot's reference count must drop when the hash changes"
    );
    assert_eq!(ctx.materials().lookup_info(new_slot).unwrap().ref_count, 1);
}

// ============================================================================
// Capacity growth
// ============================================================================

#[test]
fn exhausted_buffer_grows_at_the_frame_boundary() {
    let settings = test_settings(2, 8);
    let sink = Arc::new(RecordingSink::default());
    let ctx = RenderGraphContext::new(&settings, sink.clone());
    let mut executor = RenderPassExecutor::new(RenderStage::Display);
    let mut keys = SlotMap::with_key();

    let component = TestComponent::opaque(0.6);
    let nodes: Vec<_> = (0..3)
        .map(|i| make_node(&mut keys, &component, Vec3::new(i as f32, 0.0, 0.0)))
        .collect();

    ctx.begin_frame();
    let stats = run_pass(&ctx, &mut executor, &nodes);
    assert_eq!(stats.skipped, 1, "third node cannot lease a slot yet");
    ctx.commit_buffers();

    // The growth request is served before the next frame's allocations.
    ctx.begin_frame();
    assert!(ctx.transforms().capacity() >= 4);
    assert!(sink.grow_calls() >= 1);
    let stats = run_pass(&ctx, &mut executor, &nodes);
    assert_eq!(stats.skipped, 0);
    for node in &nodes {
        assert!(ctx.transform_slot_of(node.key).is_some());
    }
}
