//! Frame-scoped render graph.
//!
//! Callers enumerate a frame's GPU work as passes with explicit resource
//! inputs and outputs on a [`GraphBuilder`]; [`compile`] turns that
//! declaration into an executable [`Graph`]. Compilation computes every
//! transient resource's lifetime, packs all transients into one aliased
//! device-memory block, schedules the barrier transitions between passes,
//! materializes deduplicated descriptor sets and framebuffers, and emits a
//! flat step list that [`Graph::execute`] replays against a command
//! recorder.
//!
//! The graph is rebuilt every frame; nothing here persists across frames
//! except the process-wide pipeline and descriptor-layout caches.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use vermeil_graph::*;
//! # use vermeil_rhi::*;
//! # fn demo(device: Arc<dyn Device>, target: Arc<dyn RhiImage>) {
//! let mut builder = GraphBuilder::new();
//! let target = builder.register_external_image(
//!     target,
//!     ExternalResourceStates {
//!         input_state: ResourceState::Undefined,
//!         output_state: ResourceState::ShaderReadOnly,
//!     },
//! );
//! let rtv = builder.create_texture_rtv(target);
//! builder.add_pass(
//!     "triangle",
//!     PassParameters::new().attachments(
//!         FramebufferAttachments::new().color(
//!             rtv,
//!             LoadOp::Clear(ClearValue::Color([0.0; 4])),
//!             StoreOp::Store,
//!         ),
//!     ),
//!     PassHint::Raster,
//!     |recorder, _resources| recorder.draw(3, 1, 0, 0),
//! );
//! let mut allocator = TransientAllocator::new();
//! let mut graph = builder.compile(&device, &mut allocator).unwrap();
//! # }
//! ```

pub mod alloc;
pub mod attachments;
pub mod blackboard;
pub mod builder;
pub mod compile;
pub mod descriptors;
pub mod error;
pub mod exec;
pub mod handle;
pub mod lifetime;
pub mod params;
pub mod pipeline_cache;
pub mod transition;

pub use self::alloc::{TransientAllocator, TRANSIENT_ALIGNMENT};
pub use self::attachments::{Attachment, FramebufferAttachments, MAX_COLOR_ATTACHMENTS};
pub use self::blackboard::Blackboard;
pub use self::builder::{ExternalResourceStates, GpuMarkerScope, GraphBuilder, PassHint};
pub use self::compile::compile;
pub use self::descriptors::{
    clear_descriptor_layout_cache, GroupResource, ResourceGroupDescription, ResourceGroupEntry,
};
pub use self::error::CompileError;
pub use self::exec::{
    Graph, GraphStatistics, PassResources, Step, TransientAllocation,
};
pub use self::handle::{
    AccelHandle, BufferHandle, BufferViewHandle, ImageHandle, ImageViewHandle,
    ResourceGroupHandle,
};
pub use self::lifetime::{AccessKind, ResourceIndex};
pub use self::params::{ParameterEntry, ParameterValue, PassParameters};
pub use self::pipeline_cache::PipelineCache;
pub use self::transition::{
    transition_allowed, transition_masks, PlannedBarrier, TransitionMasks,
};
