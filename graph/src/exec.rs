//! The compiled graph and its executor.
//!
//! `compile` lowers the declarations into a flat step list (uploads,
//! barrier batches, passes); `execute` replays it against a command
//! recorder. Execution never fails synchronously; GPU failures surface
//! through the caller's fence/semaphore plumbing.

use crate::builder::{PassFn, PassHint};
use crate::handle::{BufferViewHandle, ImageViewHandle, ResourceGroupHandle};
use crate::lifetime::ResourceIndex;
use crate::transition::{transition_masks, PlannedBarrier};
use std::io;
use std::sync::Arc;
use vermeil_rhi::{
    BarrierDesc, CommandRecorder, Device, ImageViewRange, PushConstantRange,
    RenderPassBeginInfo, ResourceState, RhiBuffer, RhiBufferView, RhiDescriptorSet,
    RhiDeviceMemory, RhiFramebuffer, RhiImage, RhiImageView, RhiPipeline, RhiSampler, ScissorRect,
    Viewport,
};

/// One entry of the compiled step list.
#[derive(Debug)]
pub enum Step {
    /// Copy a staging buffer into a transient resource ahead of its first
    /// read. Image uploads carry their own `Undefined -> TransferDst`
    /// transition.
    Upload {
        staging: usize,
        dst: ResourceIndex,
    },
    /// Barrier batch ahead of a pass (or the terminal reconciliation).
    Barriers(Vec<PlannedBarrier>),
    /// Run one pass.
    Pass(usize),
}

pub(crate) enum PhysicalImage {
    Transient(Box<dyn RhiImage>),
    External(Arc<dyn RhiImage>),
}

impl PhysicalImage {
    pub fn as_rhi(&self) -> &dyn RhiImage {
        match self {
            PhysicalImage::Transient(image) => image.as_ref(),
            PhysicalImage::External(image) => image.as_ref(),
        }
    }
}

pub(crate) enum PhysicalBuffer {
    Transient(Box<dyn RhiBuffer>),
    External(Arc<dyn RhiBuffer>),
}

impl PhysicalBuffer {
    pub fn as_rhi(&self) -> &dyn RhiBuffer {
        match self {
            PhysicalBuffer::Transient(buffer) => buffer.as_ref(),
            PhysicalBuffer::External(buffer) => buffer.as_ref(),
        }
    }
}

/// Placement of one transient inside the shared device-memory block.
#[derive(Clone, Debug)]
pub struct TransientAllocation {
    pub resource: ResourceIndex,
    pub name: String,
    pub offset: u64,
    pub size: u64,
    pub first_pass: usize,
    pub last_pass: usize,
}

#[derive(Clone, Debug, Default)]
pub struct GraphStatistics {
    pub transient_memory_size: u64,
    pub transient_resource_count: usize,
    pub barrier_count: usize,
    pub upload_count: usize,
    pub descriptor_sets_created: usize,
    pub descriptor_sets_reused: usize,
    pub pipeline_cache_hits: usize,
    pub pipeline_cache_misses: usize,
}

pub(crate) struct CompiledPass {
    pub name: String,
    pub hint: PassHint,
    pub closure: Option<PassFn>,
    pub pipeline: Option<usize>,
    pub framebuffer: Option<usize>,
    pub begin_info: Option<RenderPassBeginInfo>,
    /// (set index, descriptor-set table index), bind order.
    pub sets: Vec<(u32, usize)>,
    pub texture_views: Vec<(ImageViewHandle, usize)>,
    pub buffer_views: Vec<(BufferViewHandle, usize)>,
    pub groups: Vec<(ResourceGroupHandle, usize)>,
    pub push_constants: Vec<PushConstantRange>,
}

/// An executable, fully-materialized frame graph. Rebuilt every frame;
/// dropping it releases all transient resources and the backing memory.
pub struct Graph {
    pub(crate) device: Arc<dyn Device>,
    pub(crate) memory: Option<Box<dyn RhiDeviceMemory>>,
    pub(crate) images: Vec<Option<PhysicalImage>>,
    pub(crate) buffers: Vec<Option<PhysicalBuffer>>,
    pub(crate) image_views: Vec<Option<Box<dyn RhiImageView>>>,
    pub(crate) buffer_views: Vec<Option<Box<dyn RhiBufferView>>>,
    pub(crate) samplers: Vec<Box<dyn RhiSampler>>,
    pub(crate) descriptor_sets: Vec<Box<dyn RhiDescriptorSet>>,
    pub(crate) framebuffers: Vec<Box<dyn RhiFramebuffer>>,
    pub(crate) staging: Vec<Box<dyn RhiBuffer>>,
    pub(crate) pipelines: Vec<Arc<dyn RhiPipeline>>,
    pub(crate) passes: Vec<CompiledPass>,
    pub(crate) steps: Vec<Step>,
    pub(crate) allocations: Vec<TransientAllocation>,
    pub(crate) statistics: GraphStatistics,
}

impl Graph {
    /// The compiled step list, for diagnostics and tests.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn statistics(&self) -> &GraphStatistics {
        &self.statistics
    }

    /// Planned placements of every transient resource.
    pub fn transient_allocations(&self) -> &[TransientAllocation] {
        &self.allocations
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// The backing block shared by all transients, when any were planned.
    pub fn transient_memory(&self) -> Option<&dyn RhiDeviceMemory> {
        self.memory.as_deref()
    }

    /// Replays the compiled steps. Pass closures are consumed; a second
    /// call replays barriers and uploads but skips already-run closures.
    pub fn execute(&mut self, recorder: &mut dyn CommandRecorder) {
        for step_idx in 0..self.steps.len() {
            match &self.steps[step_idx] {
                Step::Upload { staging, dst } => {
                    self.record_upload(recorder, *staging, *dst);
                }
                Step::Barriers(batch) => {
                    let descs = self.barrier_descs(batch);
                    if !descs.is_empty() {
                        recorder.pipeline_barrier(&descs);
                    }
                }
                Step::Pass(pass_idx) => {
                    let pass_idx = *pass_idx;
                    let closure = self.passes[pass_idx].closure.take();
                    let pass = &self.passes[pass_idx];
                    let resources = PassResources {
                        graph: &*self,
                        pass,
                    };

                    match pass.hint {
                        PassHint::Immediate => {
                            if let Some(closure) = closure {
                                closure(&mut *recorder, &resources);
                            }
                        }
                        PassHint::Raster => {
                            if let (Some(fb), Some(info)) =
                                (pass.framebuffer, pass.begin_info.as_ref())
                            {
                                recorder
                                    .begin_render_pass(self.framebuffers[fb].as_ref(), info);
                                recorder
                                    .set_viewport(&Viewport::from((info.width, info.height)));
                                recorder
                                    .set_scissor(&ScissorRect::from((info.width, info.height)));
                            }
                            if let Some(pipeline) = pass.pipeline {
                                recorder.bind_pipeline(self.pipelines[pipeline].as_ref());
                            }
                            for &(set, idx) in &pass.sets {
                                recorder
                                    .bind_descriptor_set(set, self.descriptor_sets[idx].as_ref());
                            }
                            if let Some(closure) = closure {
                                closure(&mut *recorder, &resources);
                            }
                            if pass.framebuffer.is_some() {
                                recorder.end_render_pass();
                            }
                        }
                        PassHint::Compute | PassHint::RayTracing => {
                            if let Some(pipeline) = pass.pipeline {
                                recorder.bind_pipeline(self.pipelines[pipeline].as_ref());
                            }
                            for &(set, idx) in &pass.sets {
                                recorder
                                    .bind_descriptor_set(set, self.descriptor_sets[idx].as_ref());
                            }
                            if let Some(closure) = closure {
                                closure(&mut *recorder, &resources);
                            }
                        }
                    }
                }
            }
        }
    }

    fn record_upload(&self, recorder: &mut dyn CommandRecorder, staging: usize, dst: ResourceIndex) {
        let staging_buffer = self.staging[staging].as_ref();
        match dst {
            ResourceIndex::Image(i) => {
                let image = self.images[i]
                    .as_ref()
                    .expect("upload targets a materialized image")
                    .as_rhi();
                let desc = image.description();
                let range =
                    ImageViewRange::ALL.resolve(desc.mip_levels(), desc.array_layers());
                let masks =
                    transition_masks(ResourceState::Undefined, ResourceState::TransferDst)
                        .expect("upload transition is in the table");
                recorder.pipeline_barrier(&[BarrierDesc::Image {
                    image,
                    old_state: ResourceState::Undefined,
                    new_state: ResourceState::TransferDst,
                    src_stages: masks.src_stages,
                    src_access: masks.src_access,
                    dst_stages: masks.dst_stages,
                    dst_access: masks.dst_access,
                    range,
                }]);
                recorder.copy_buffer_to_image(staging_buffer, image);
            }
            ResourceIndex::Buffer(i) => {
                let buffer = self.buffers[i]
                    .as_ref()
                    .expect("upload targets a materialized buffer")
                    .as_rhi();
                let size = staging_buffer.description().size;
                recorder.copy_buffer(staging_buffer, buffer, 0, 0, size);
            }
        }
    }

    fn barrier_descs<'g>(&'g self, batch: &[PlannedBarrier]) -> Vec<BarrierDesc<'g>> {
        batch
            .iter()
            .filter_map(|barrier| match barrier.resource {
                ResourceIndex::Image(i) => self.images[i].as_ref().map(|image| {
                    BarrierDesc::Image {
                        image: image.as_rhi(),
                        old_state: barrier.old_state,
                        new_state: barrier.new_state,
                        src_stages: barrier.masks.src_stages,
                        src_access: barrier.masks.src_access,
                        dst_stages: barrier.masks.dst_stages,
                        dst_access: barrier.masks.dst_access,
                        range: barrier.range,
                    }
                }),
                ResourceIndex::Buffer(i) => self.buffers[i].as_ref().map(|buffer| {
                    BarrierDesc::Buffer {
                        buffer: buffer.as_rhi(),
                        old_state: barrier.old_state,
                        new_state: barrier.new_state,
                        src_stages: barrier.masks.src_stages,
                        src_access: barrier.masks.src_access,
                        dst_stages: barrier.masks.dst_stages,
                        dst_access: barrier.masks.dst_access,
                    }
                }),
            })
            .collect()
    }

    /// Pretty-prints the compiled schedule.
    pub fn dump(&self, w: &mut dyn io::Write) -> io::Result<()> {
        writeln!(
            w,
            "graph: {} passes, {} steps, {} transient bytes, {} sampler(s), {} set(s)",
            self.passes.len(),
            self.steps.len(),
            self.statistics.transient_memory_size,
            self.samplers.len(),
            self.descriptor_sets.len()
        )?;
        for allocation in &self.allocations {
            writeln!(
                w,
                "  transient '{}' {:?}: offset {:#x}, {} bytes, passes [{}, {}]",
                allocation.name,
                allocation.resource,
                allocation.offset,
                allocation.size,
                allocation.first_pass,
                allocation.last_pass
            )?;
        }
        for step in &self.steps {
            match step {
                Step::Upload { staging, dst } => {
                    writeln!(w, "  upload staging #{} -> {:?}", staging, dst)?;
                }
                Step::Barriers(batch) => {
                    for barrier in batch {
                        writeln!(
                            w,
                            "  barrier {:?}: {:?} -> {:?} (mips {}+{}, layers {}+{})",
                            barrier.resource,
                            barrier.old_state,
                            barrier.new_state,
                            barrier.range.base_mip,
                            barrier.range.mip_count,
                            barrier.range.base_layer,
                            barrier.range.layer_count
                        )?;
                    }
                }
                Step::Pass(i) => {
                    let pass = &self.passes[*i];
                    writeln!(
                        w,
                        "  pass '{}' ({:?}): pipeline={:?}, {} set(s)",
                        pass.name,
                        pass.hint,
                        pass.pipeline,
                        pass.sets.len()
                    )?;
                }
            }
        }
        Ok(())
    }
}

/// Read-only lookup from parameter-block handles to the physical objects
/// materialized for one pass. Handed to the pass closure.
pub struct PassResources<'g> {
    graph: &'g Graph,
    pass: &'g CompiledPass,
}

impl<'g> PassResources<'g> {
    /// The framebuffer of a raster pass.
    pub fn framebuffer(&self) -> &dyn RhiFramebuffer {
        let idx = self
            .pass
            .framebuffer
            .unwrap_or_else(|| panic!("pass '{}' has no framebuffer", self.pass.name));
        self.graph.framebuffers[idx].as_ref()
    }

    pub fn texture_view(&self, view: ImageViewHandle) -> &dyn RhiImageView {
        let idx = self
            .pass
            .texture_views
            .iter()
            .find(|(handle, _)| *handle == view)
            .map(|(_, idx)| *idx)
            .unwrap_or_else(|| {
                panic!("view {:?} is not part of pass '{}'", view, self.pass.name)
            });
        self.graph.image_views[idx]
            .as_ref()
            .expect("views of accessed resources are materialized")
            .as_ref()
    }

    pub fn buffer_view(&self, view: BufferViewHandle) -> &dyn RhiBufferView {
        let idx = self
            .pass
            .buffer_views
            .iter()
            .find(|(handle, _)| *handle == view)
            .map(|(_, idx)| *idx)
            .unwrap_or_else(|| {
                panic!("view {:?} is not part of pass '{}'", view, self.pass.name)
            });
        self.graph.buffer_views[idx]
            .as_ref()
            .expect("views of accessed resources are materialized")
            .as_ref()
    }

    /// The physical descriptor set a declared group materialized into.
    pub fn resource_group(&self, group: ResourceGroupHandle) -> &dyn RhiDescriptorSet {
        let idx = self
            .pass
            .groups
            .iter()
            .find(|(handle, _)| *handle == group)
            .map(|(_, idx)| *idx)
            .unwrap_or_else(|| {
                panic!("group {:?} is not part of pass '{}'", group, self.pass.name)
            });
        self.graph.descriptor_sets[idx].as_ref()
    }

    /// Sets a named push-constant block, validating name, size and stages
    /// against the bound pipeline's layout.
    pub fn push_constants(&self, recorder: &mut dyn CommandRecorder, name: &str, data: &[u8]) {
        let range = match self.pass.push_constants.iter().find(|p| p.name == name) {
            Some(range) => range,
            None => {
                if cfg!(debug_assertions) {
                    panic!(
                        "pass '{}' has no push constant named '{}'",
                        self.pass.name, name
                    );
                }
                log::error!(
                    "pass '{}' has no push constant named '{}'; ignored",
                    self.pass.name,
                    name
                );
                return;
            }
        };
        if data.len() != range.size as usize {
            if cfg!(debug_assertions) {
                panic!(
                    "push constant '{}' expects {} bytes, got {}",
                    name,
                    range.size,
                    data.len()
                );
            }
            log::error!(
                "push constant '{}' expects {} bytes, got {}; ignored",
                name,
                range.size,
                data.len()
            );
            return;
        }
        recorder.push_constants(range.stages, 0, data);
    }
}
