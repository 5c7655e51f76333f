//! Node-Data Upload Sink
//!
//! [`NodeDataSink`] is the narrow seam between the host-side buffer mirrors
//! and the GPU-resident storage. Production code uses [`WgpuNodeDataSink`];
//! tests substitute the recording double from [`test_support`].

use parking_lot::RwLock;

use super::NodeBufferKind;
use crate::settings::BufferSettings;

/// Byte-range upload interface for the three node-data buffers.
///
/// Implementations must tolerate concurrent `upload` calls; `grow` is only
/// invoked between frames while no upload is in flight.
pub trait NodeDataSink: Send + Sync {
    /// Copies `bytes` into the storage for `kind` at `byte_offset`.
    fn upload(&self, kind: NodeBufferKind, byte_offset: u64, bytes: &[u8]);

    /// Recreates the storage for `kind` at `new_size` bytes. Previous
    /// contents are discarded; the caller re-uploads resident records.
    fn grow(&self, kind: NodeBufferKind, new_size: u64);
}

struct GpuStorage {
    buffer: wgpu::Buffer,
    size: u64,
}

/// wgpu-backed sink: one storage buffer per record kind.
pub struct WgpuNodeDataSink {
    device: wgpu::Device,
    queue: wgpu::Queue,
    storages: [RwLock<GpuStorage>; 3],
}

impl WgpuNodeDataSink {
    #[must_use]
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, settings: &BufferSettings) -> Self {
        let make = |kind: NodeBufferKind, slots: u32| {
            let size = u64::from(slots) * kind.stride();
            RwLock::new(GpuStorage {
                buffer: Self::create_storage(&device, kind, size),
                size,
            })
        };
        let storages = [
            make(NodeBufferKind::Transform, settings.max_visible_nodes),
            make(NodeBufferKind::Material, settings.max_concurrent_materials),
            make(NodeBufferKind::Indirection, settings.max_visible_nodes),
        ];
        Self {
            device,
            queue,
            storages,
        }
    }

    fn create_storage(device: &wgpu::Device, kind: NodeBufferKind, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(kind.label()),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn storage(&self, kind: NodeBufferKind) -> &RwLock<GpuStorage> {
        &self.storages[kind as usize]
    }

    /// Clones the handle to the current storage buffer for bind-group
    /// creation. The handle is invalidated by the next `grow`.
    #[must_use]
    pub fn buffer(&self, kind: NodeBufferKind) -> wgpu::Buffer {
        self.storage(kind).read().buffer.clone()
    }

    /// Current byte size of the storage for `kind`.
    #[must_use]
    pub fn size(&self, kind: NodeBufferKind) -> u64 {
        self.storage(kind).read().size
    }
}

impl NodeDataSink for WgpuNodeDataSink {
    fn upload(&self, kind: NodeBufferKind, byte_offset: u64, bytes: &[u8]) {
        let storage = self.storage(kind).read();
        debug_assert!(
            byte_offset + bytes.len() as u64 <= storage.size,
            "{} upload out of bounds",
            kind.label()
        );
        self.queue.write_buffer(&storage.buffer, byte_offset, bytes);
    }

    fn grow(&self, kind: NodeBufferKind, new_size: u64) {
        let mut storage = self.storage(kind).write();
        log::info!(
            "{} storage resizing: {} -> {} bytes",
            kind.label(),
            storage.size,
            new_size
        );
        storage.buffer.destroy();
        storage.buffer = Self::create_storage(&self.device, kind, new_size);
        storage.size = new_size;
    }
}

/// Recording sink used by the crate's test-suites.
pub mod test_support {
    use std::sync::Mutex;

    use super::{NodeBufferKind, NodeDataSink};

    /// One recorded upload call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct UploadCall {
        pub kind: NodeBufferKind,
        pub byte_offset: u64,
        pub byte_len: u64,
    }

    /// Sink that records every call instead of touching a GPU.
    #[derive(Default)]
    pub struct RecordingSink {
        uploads: Mutex<Vec<UploadCall>>,
        grows: Mutex<Vec<(NodeBufferKind, u64)>>,
    }

    impl RecordingSink {
        #[must_use]
        pub fn uploads(&self) -> Vec<UploadCall> {
            self.uploads.lock().unwrap().clone()
        }

        #[must_use]
        pub fn grow_calls(&self) -> usize {
            self.grows.lock().unwrap().len()
        }

        pub fn clear(&self) {
            self.uploads.lock().unwrap().clear();
            self.grows.lock().unwrap().clear();
        }
    }

    impl NodeDataSink for RecordingSink {
        fn upload(&self, kind: NodeBufferKind, byte_offset: u64, bytes: &[u8]) {
            self.uploads.lock().unwrap().push(UploadCall {
                kind,
                byte_offset,
                byte_len: bytes.len() as u64,
            });
        }

        fn grow(&self, kind: NodeBufferKind, new_size: u64) {
            self.grows.lock().unwrap().push((kind, new_size));
        }
    }
}
