#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod buffers;
pub mod errors;
pub mod graph;
pub mod records;
pub mod scene;
pub mod settings;
pub mod tasks;

pub use buffers::{BufferUpdateRange, NodeBufferKind, NodeDataSink, SlotIndex};
pub use errors::{RenderError, Result};
pub use graph::commands::{CommandList, EncodedCommand, FrameSubmission, MemoryBarrier};
pub use graph::context::RenderGraphContext;
pub use graph::executor::{ParseResult, RenderPassExecutor, StageStats};
pub use graph::manager::{FrameInput, RenderPassManager, StageView, SubmitQueue};
pub use graph::params::{DrawMask, RenderPassParams, SubPassFlags, TargetId};
pub use graph::pass::RenderPass;
pub use graph::schedule::StageGraph;
pub use graph::stage::RenderStage;
pub use records::{NodeIndirectionData, NodeMaterialData, NodeTransformData, hash_material_data};
pub use scene::camera::CameraSnapshot;
pub use scene::{
    BoundingSphere, DrawGeometry, MaterialDescriptor, NodeKey, RenderingComponent,
    TransformSnapshot, VisibleNode,
};
pub use settings::{BufferSettings, RenderSettings, SchedulerSettings};
