//! Graph compilation.
//!
//! Lowers the builder's declarations into an executable [`Graph`]:
//! lifetime analysis, aliased transient allocation, staging uploads, view
//! materialization, barrier planning, pipeline and descriptor-set
//! construction, and finally the flat step list the executor replays.

use crate::alloc::{plan_offsets, TransientAllocator, TransientRequest, TRANSIENT_ALIGNMENT};
use crate::builder::{BufferDecl, GraphBuilder, ImageDecl, PassHint};
use crate::descriptors::{
    entry_hash, get_or_create_layout, GroupResource, ResourceGroupDescription,
};
use crate::error::CompileError;
use crate::exec::{
    CompiledPass, Graph, GraphStatistics, PhysicalBuffer, PhysicalImage, Step,
    TransientAllocation,
};
use crate::handle::{BufferViewHandle, ImageViewHandle, ResourceGroupHandle};
use crate::lifetime::{self, ResourceIndex};
use crate::params::{ParameterEntry, ParameterValue, PassParameters};
use crate::pipeline_cache::{
    merge_parameters, merge_pipeline_layout, pipeline_fingerprint, AttachmentSignature,
    MergedParameter, PipelineCache,
};
use crate::transition::{PlannedBarrier, TransitionPlanner};
use fxhash::{FxHashMap, FxHashSet};
use log::{debug, warn};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use std::time::Instant;
use vermeil_rhi::{
    AttachmentOps, BufferDescription, BufferUsageFlags, BufferViewDescription, DescriptorResource,
    DescriptorType, DescriptorWrite, Device, Format, ImageViewDescription, ImageViewRange,
    PipelineDescription, RenderPassBeginInfo, ResourceGroupLayoutBinding,
    ResourceGroupLayoutDescription, ResourceState, RhiAccelerationStructure, RhiBuffer,
    RhiBufferView, RhiDescriptorSet, RhiImageView, RhiSampler, SamplerDescription, ShaderStage,
    ShaderStageFlags,
};

/// Compiles a builder against a device, drawing transient memory from
/// `allocator`. Consumes the builder; on error no graph is produced and
/// the device is left without dangling partial state beyond cache entries.
pub fn compile(
    builder: GraphBuilder,
    device: &Arc<dyn Device>,
    allocator: &mut TransientAllocator,
) -> Result<Graph, CompileError> {
    compile_graph(builder, device, allocator)
}

enum ResolvedResource {
    ImageView(usize),
    BufferView(usize),
    Sampler(SamplerDescription),
    Accel(usize),
}

struct ResolvedBinding {
    binding: u32,
    kind: DescriptorType,
    stages: ShaderStageFlags,
    /// Handle (or sampler description) identity for structural hashing.
    identity: u64,
    resource: ResolvedResource,
}

/// Build-local descriptor machinery: the sampler cache and the
/// structural-hash descriptor-set cache.
struct SetFactory<'a> {
    device: &'a dyn Device,
    accels: &'a [Arc<dyn RhiAccelerationStructure>],
    image_views: &'a [Option<Box<dyn RhiImageView>>],
    buffer_views: &'a [Option<Box<dyn RhiBufferView>>],
    samplers: Vec<Box<dyn RhiSampler>>,
    sampler_cache: FxHashMap<SamplerDescription, usize>,
    descriptor_sets: Vec<Box<dyn RhiDescriptorSet>>,
    set_cache: FxHashMap<u64, usize>,
    created: usize,
    reused: usize,
}

impl<'a> SetFactory<'a> {
    fn sampler_index(&mut self, desc: &SamplerDescription) -> Result<usize, CompileError> {
        if let Some(&idx) = self.sampler_cache.get(desc) {
            return Ok(idx);
        }
        let sampler = self.device.create_sampler(desc)?;
        let idx = self.samplers.len();
        self.samplers.push(sampler);
        self.sampler_cache.insert(*desc, idx);
        Ok(idx)
    }

    /// Materializes one descriptor set, deduplicating structurally
    /// identical sets across passes.
    fn materialize(&mut self, bindings: &[ResolvedBinding]) -> Result<usize, CompileError> {
        let hash = bindings.iter().fold(0u64, |h, b| {
            h ^ entry_hash(b.binding, b.kind, b.identity, b.stages)
        });
        if let Some(&idx) = self.set_cache.get(&hash) {
            self.reused += 1;
            return Ok(idx);
        }

        // samplers first so the write phase only reads
        let mut sampler_indices: Vec<Option<usize>> = Vec::with_capacity(bindings.len());
        for binding in bindings {
            sampler_indices.push(match &binding.resource {
                ResolvedResource::Sampler(desc) => Some(self.sampler_index(desc)?),
                _ => None,
            });
        }

        let mut writes = Vec::with_capacity(bindings.len());
        for (binding, sampler_idx) in bindings.iter().zip(&sampler_indices) {
            let resource = match &binding.resource {
                ResolvedResource::ImageView(idx) => {
                    let view = self.image_views[*idx]
                        .as_ref()
                        .expect("views of accessed resources are materialized")
                        .as_ref();
                    match binding.kind {
                        DescriptorType::SampledImage => DescriptorResource::SampledImage(view),
                        DescriptorType::StorageImage => DescriptorResource::StorageImage(view),
                        _ => unreachable!("image view bound as {:?}", binding.kind),
                    }
                }
                ResolvedResource::BufferView(idx) => {
                    let view = self.buffer_views[*idx]
                        .as_ref()
                        .expect("views of accessed resources are materialized")
                        .as_ref();
                    match binding.kind {
                        DescriptorType::UniformBuffer => DescriptorResource::UniformBuffer(view),
                        DescriptorType::StorageBuffer => DescriptorResource::StorageBuffer(view),
                        _ => unreachable!("buffer view bound as {:?}", binding.kind),
                    }
                }
                ResolvedResource::Sampler(_) => DescriptorResource::Sampler(
                    self.samplers[sampler_idx.expect("sampler resolved above")].as_ref(),
                ),
                ResolvedResource::Accel(idx) => {
                    DescriptorResource::AccelerationStructure(self.accels[*idx].as_ref())
                }
            };
            writes.push(DescriptorWrite {
                binding: binding.binding,
                resource,
            });
        }

        let layout_desc = ResourceGroupLayoutDescription {
            bindings: bindings
                .iter()
                .map(|b| ResourceGroupLayoutBinding {
                    binding: b.binding,
                    kind: b.kind,
                    count: 1,
                    stages: b.stages,
                })
                .collect(),
        };
        let layout = get_or_create_layout(self.device, &layout_desc)?;
        let set = self.device.create_descriptor_set(layout.as_ref(), &writes)?;

        let idx = self.descriptor_sets.len();
        self.descriptor_sets.push(set);
        self.set_cache.insert(hash, idx);
        self.created += 1;
        Ok(idx)
    }
}

fn resolve_group_bindings(
    builder: &GraphBuilder,
    group: &ResourceGroupDescription,
) -> Result<Vec<ResolvedBinding>, CompileError> {
    group
        .entries
        .iter()
        .map(|entry| {
            let identity = entry.resource.identity();
            let kind = entry.resource.kind();
            let resource = match &entry.resource {
                GroupResource::TextureSrv(v) | GroupResource::TextureUav(v) => {
                    ResolvedResource::ImageView(builder.image_view_index_of(*v).ok_or_else(
                        || {
                            CompileError::Declaration(format!(
                                "resource group references unregistered view {:?}",
                                v
                            ))
                        },
                    )?)
                }
                GroupResource::BufferSrv(v)
                | GroupResource::BufferUav(v)
                | GroupResource::BufferCbv(v) => {
                    ResolvedResource::BufferView(builder.buffer_view_index_of(*v).ok_or_else(
                        || {
                            CompileError::Declaration(format!(
                                "resource group references unregistered view {:?}",
                                v
                            ))
                        },
                    )?)
                }
                GroupResource::Sampler(desc) => ResolvedResource::Sampler(*desc),
                GroupResource::AccelerationStructure(a) => {
                    ResolvedResource::Accel(builder.accel_index_of(*a).ok_or_else(|| {
                        CompileError::Declaration(format!(
                            "resource group references unregistered acceleration structure {:?}",
                            a
                        ))
                    })?)
                }
            };
            Ok(ResolvedBinding {
                binding: entry.binding,
                kind,
                stages: entry.stages,
                identity,
                resource,
            })
        })
        .collect()
}

fn resolve_loose_binding(
    builder: &GraphBuilder,
    pass_name: &str,
    entry: &ParameterEntry,
    parameter: &MergedParameter,
) -> Result<ResolvedBinding, CompileError> {
    let mismatch = |declared: &str| {
        CompileError::Pipeline(format!(
            "pass '{}': parameter '{}' is declared as {} but the shader expects {:?}",
            pass_name, parameter.name, declared, parameter.kind
        ))
    };
    let (identity, resource) = match (&entry.value, parameter.kind) {
        (ParameterValue::TextureSrv(v), DescriptorType::SampledImage) => (
            v.raw(),
            ResolvedResource::ImageView(builder.image_view_index_of(*v).expect("analyzed")),
        ),
        (ParameterValue::TextureUav(v), DescriptorType::StorageImage) => (
            v.raw(),
            ResolvedResource::ImageView(builder.image_view_index_of(*v).expect("analyzed")),
        ),
        (ParameterValue::BufferSrv(v), DescriptorType::StorageBuffer)
        | (ParameterValue::BufferUav(v), DescriptorType::StorageBuffer) => (
            v.raw(),
            ResolvedResource::BufferView(builder.buffer_view_index_of(*v).expect("analyzed")),
        ),
        (ParameterValue::BufferCbv(v), DescriptorType::UniformBuffer) => (
            v.raw(),
            ResolvedResource::BufferView(builder.buffer_view_index_of(*v).expect("analyzed")),
        ),
        (ParameterValue::Sampler(desc), DescriptorType::Sampler) => {
            (fxhash::hash64(desc), ResolvedResource::Sampler(*desc))
        }
        (
            ParameterValue::AccelerationStructure(a),
            DescriptorType::AccelerationStructure,
        ) => (
            a.raw(),
            ResolvedResource::Accel(builder.accel_index_of(*a).expect("analyzed")),
        ),
        (ParameterValue::TextureSrv(_), _) => return Err(mismatch("a texture SRV")),
        (ParameterValue::TextureUav(_), _) => return Err(mismatch("a texture UAV")),
        (ParameterValue::BufferSrv(_), _) => return Err(mismatch("a buffer SRV")),
        (ParameterValue::BufferUav(_), _) => return Err(mismatch("a buffer UAV")),
        (ParameterValue::BufferCbv(_), _) => return Err(mismatch("a buffer CBV")),
        (ParameterValue::Sampler(_), _) => return Err(mismatch("a sampler")),
        (ParameterValue::AccelerationStructure(_), _) => {
            return Err(mismatch("an acceleration structure"))
        }
        (ParameterValue::ResourceGroup { .. }, _) => {
            return Err(mismatch("a resource group"))
        }
    };
    Ok(ResolvedBinding {
        binding: parameter.binding,
        kind: parameter.kind,
        stages: parameter.stages,
        identity,
        resource,
    })
}

fn validate_stage_set(
    pass_name: &str,
    desc: &PipelineDescription,
) -> Result<(), CompileError> {
    let expect = |stage: &vermeil_rhi::ShaderStageDescription,
                  wanted: ShaderStage|
     -> Result<(), CompileError> {
        let actual = stage.reflection.entry_point.stage;
        if actual != wanted {
            return Err(CompileError::Pipeline(format!(
                "pass '{}': expected a {:?} stage, found {:?} ('{}')",
                pass_name, wanted, actual, stage.reflection.entry_point.name
            )));
        }
        Ok(())
    };
    match desc {
        PipelineDescription::Graphics(d) => {
            expect(&d.vertex, ShaderStage::Vertex)?;
            expect(&d.fragment, ShaderStage::Fragment)?;
        }
        PipelineDescription::Compute(d) => {
            expect(&d.compute, ShaderStage::Compute)?;
        }
        PipelineDescription::RayTracing(d) => {
            expect(&d.raygen, ShaderStage::RayGeneration)?;
            for stage in &d.miss {
                expect(stage, ShaderStage::Miss)?;
            }
            for stage in &d.closest_hit {
                expect(stage, ShaderStage::ClosestHit)?;
            }
        }
    }
    Ok(())
}

struct AttachmentInfo {
    view_idx: usize,
    image_idx: usize,
    range: ImageViewRange,
    format: Format,
    width: u32,
    height: u32,
    is_depth: bool,
}

fn attachment_info(
    builder: &GraphBuilder,
    pass_name: &str,
    view: ImageViewHandle,
) -> Result<AttachmentInfo, CompileError> {
    let view_idx = builder.image_view_index_of(view).ok_or_else(|| {
        CompileError::Declaration(format!(
            "pass '{}' attaches unregistered view {:?}",
            pass_name, view
        ))
    })?;
    let decl = &builder.image_views[view_idx];
    let image_idx = builder
        .image_index_of(decl.image)
        .expect("view targets were checked during analysis");
    let desc = builder.images[image_idx].description();
    let range = decl.range.resolve(desc.mip_levels(), desc.array_layers());
    let format = decl.format.unwrap_or(desc.format);
    Ok(AttachmentInfo {
        view_idx,
        image_idx,
        range,
        format,
        width: (desc.dimensions.width() >> range.base_mip).max(1),
        height: (desc.dimensions.height() >> range.base_mip).max(1),
        is_depth: format.is_depth(),
    })
}

/// Registers every view a pass references so `PassResources` can resolve
/// handles during execution.
fn collect_pass_views(
    builder: &GraphBuilder,
    params: &PassParameters,
    texture_views: &mut Vec<(ImageViewHandle, usize)>,
    buffer_views: &mut Vec<(BufferViewHandle, usize)>,
) {
    let mut push_texture = |views: &mut Vec<(ImageViewHandle, usize)>, handle: ImageViewHandle| {
        if views.iter().any(|(h, _)| *h == handle) {
            return;
        }
        if let Some(idx) = builder.image_view_index_of(handle) {
            views.push((handle, idx));
        }
    };
    let mut push_buffer = |views: &mut Vec<(BufferViewHandle, usize)>, handle: BufferViewHandle| {
        if views.iter().any(|(h, _)| *h == handle) {
            return;
        }
        if let Some(idx) = builder.buffer_view_index_of(handle) {
            views.push((handle, idx));
        }
    };

    for entry in &params.entries {
        match &entry.value {
            ParameterValue::TextureSrv(v) | ParameterValue::TextureUav(v) => {
                push_texture(texture_views, *v)
            }
            ParameterValue::BufferSrv(v)
            | ParameterValue::BufferUav(v)
            | ParameterValue::BufferCbv(v) => push_buffer(buffer_views, *v),
            ParameterValue::ResourceGroup { group, .. } => {
                if let Some(gidx) = builder.group_index_of(*group) {
                    for group_entry in &builder.groups[gidx].entries {
                        match &group_entry.resource {
                            GroupResource::TextureSrv(v) | GroupResource::TextureUav(v) => {
                                push_texture(texture_views, *v)
                            }
                            GroupResource::BufferSrv(v)
                            | GroupResource::BufferUav(v)
                            | GroupResource::BufferCbv(v) => push_buffer(buffer_views, *v),
                            _ => {}
                        }
                    }
                }
            }
            _ => {}
        }
    }
    if let Some(attachments) = &params.attachments {
        for attachment in attachments.color_attachments() {
            push_texture(texture_views, attachment.view);
        }
        if let Some(attachment) = attachments.depth_stencil_attachment() {
            push_texture(texture_views, attachment.view);
        }
    }
}

pub(crate) fn compile_graph(
    mut builder: GraphBuilder,
    device: &Arc<dyn Device>,
    allocator: &mut TransientAllocator,
) -> Result<Graph, CompileError> {
    let start = Instant::now();

    if let Some(error) = builder.errors.first() {
        return Err(error.clone());
    }

    let analysis = lifetime::analyze(&builder)?;
    let pass_count = builder.passes.len();

    // ---- transient placement plan
    let mut requests: Vec<TransientRequest> = Vec::new();
    for (i, decl) in builder.images.iter().enumerate() {
        if decl.is_external() || analysis.image_accesses[i].is_empty() {
            continue;
        }
        let (first, last) = analysis
            .image_interval(i)
            .expect("non-empty access list has an interval");
        requests.push(TransientRequest {
            resource: ResourceIndex::Image(i),
            size: decl.description().byte_size().max(1),
            align: TRANSIENT_ALIGNMENT,
            first,
            last,
        });
    }
    for (i, decl) in builder.buffers.iter().enumerate() {
        if decl.is_external() || analysis.buffer_accesses[i].is_empty() {
            continue;
        }
        let (first, last) = analysis
            .buffer_interval(i)
            .expect("non-empty access list has an interval");
        requests.push(TransientRequest {
            resource: ResourceIndex::Buffer(i),
            size: decl.description().size.max(1),
            align: TRANSIENT_ALIGNMENT,
            first,
            last,
        });
    }

    let plan = plan_offsets(&requests);
    let memory = allocator.allocate(device.as_ref(), plan.total)?;
    debug!(
        "planned {} transient resource(s) into {} bytes",
        requests.len(),
        plan.total
    );

    // ---- physical resources
    let mut images: Vec<Option<PhysicalImage>> =
        (0..builder.images.len()).map(|_| None).collect();
    let mut buffers: Vec<Option<PhysicalBuffer>> =
        (0..builder.buffers.len()).map(|_| None).collect();
    let mut allocations: Vec<TransientAllocation> = Vec::with_capacity(requests.len());

    for (k, request) in requests.iter().enumerate() {
        let offset = plan.offsets[k];
        let backing = memory
            .as_ref()
            .expect("a non-empty plan allocated device memory");
        match request.resource {
            ResourceIndex::Image(i) => {
                let mut desc = match &builder.images[i] {
                    ImageDecl::Transient { desc, .. } => desc.clone(),
                    ImageDecl::External { .. } => unreachable!("externals are never planned"),
                };
                desc.usage |= analysis.image_usage[i];
                let image = device.create_image(&desc)?;
                device.bind_image_memory(image.as_ref(), backing.as_ref(), offset)?;
                allocations.push(TransientAllocation {
                    resource: request.resource,
                    name: desc.name.clone(),
                    offset,
                    size: request.size,
                    first_pass: request.first,
                    last_pass: request.last,
                });
                images[i] = Some(PhysicalImage::Transient(image));
            }
            ResourceIndex::Buffer(i) => {
                let mut desc = match &builder.buffers[i] {
                    BufferDecl::Transient { desc, .. } => desc.clone(),
                    BufferDecl::External { .. } => unreachable!("externals are never planned"),
                };
                desc.usage |= analysis.buffer_usage[i];
                let buffer = device.create_buffer(&desc)?;
                device.bind_buffer_memory(buffer.as_ref(), backing.as_ref(), offset)?;
                allocations.push(TransientAllocation {
                    resource: request.resource,
                    name: desc.name.clone(),
                    offset,
                    size: request.size,
                    first_pass: request.first,
                    last_pass: request.last,
                });
                buffers[i] = Some(PhysicalBuffer::Transient(buffer));
            }
        }
    }
    for (i, decl) in builder.images.iter().enumerate() {
        if let ImageDecl::External { resource, .. } = decl {
            images[i] = Some(PhysicalImage::External(resource.clone()));
        }
    }
    for (i, decl) in builder.buffers.iter().enumerate() {
        if let BufferDecl::External { resource, .. } = decl {
            buffers[i] = Some(PhysicalBuffer::External(resource.clone()));
        }
    }

    // ---- staging uploads
    let mut staging: Vec<Box<dyn RhiBuffer>> = Vec::new();
    let mut uploads_per_pass: Vec<Vec<Step>> = (0..pass_count).map(|_| Vec::new()).collect();
    let mut upload_count = 0usize;
    for (i, decl) in builder.images.iter().enumerate() {
        let data = match decl {
            ImageDecl::Transient {
                initial_data: Some(data),
                ..
            } => data,
            _ => continue,
        };
        if analysis.image_accesses[i].is_empty() {
            continue;
        }
        let first = analysis.image_accesses[i][0].pass;
        let staging_desc = BufferDescription {
            name: format!("staging:{}", builder.image_name(i)),
            size: (data.len() as u64).max(1),
            stride: 0,
            usage: BufferUsageFlags::TRANSFER_SRC | BufferUsageFlags::HOST_VISIBLE,
        };
        let buffer = device.create_buffer(&staging_desc)?;
        device.write_buffer(buffer.as_ref(), 0, data)?;
        uploads_per_pass[first].push(Step::Upload {
            staging: staging.len(),
            dst: ResourceIndex::Image(i),
        });
        staging.push(buffer);
        upload_count += 1;
    }
    for (i, decl) in builder.buffers.iter().enumerate() {
        let data = match decl {
            BufferDecl::Transient {
                initial_data: Some(data),
                ..
            } => data,
            _ => continue,
        };
        if analysis.buffer_accesses[i].is_empty() {
            continue;
        }
        let first = analysis.buffer_accesses[i][0].pass;
        let staging_desc = BufferDescription {
            name: format!("staging:{}", builder.buffer_name(i)),
            size: (data.len() as u64).max(1),
            stride: 0,
            usage: BufferUsageFlags::TRANSFER_SRC | BufferUsageFlags::HOST_VISIBLE,
        };
        let buffer = device.create_buffer(&staging_desc)?;
        device.write_buffer(buffer.as_ref(), 0, data)?;
        uploads_per_pass[first].push(Step::Upload {
            staging: staging.len(),
            dst: ResourceIndex::Buffer(i),
        });
        staging.push(buffer);
        upload_count += 1;
    }

    // ---- view materialization
    let mut image_views: Vec<Option<Box<dyn RhiImageView>>> =
        (0..builder.image_views.len()).map(|_| None).collect();
    for (v, decl) in builder.image_views.iter().enumerate() {
        let image_idx = builder
            .image_index_of(decl.image)
            .expect("view targets were checked during analysis");
        if let Some(physical) = &images[image_idx] {
            let view_desc = ImageViewDescription {
                kind: decl.kind,
                format: decl.format,
                range: decl.range,
            };
            image_views[v] = Some(device.create_image_view(physical.as_rhi(), &view_desc)?);
        }
    }
    let mut buffer_views: Vec<Option<Box<dyn RhiBufferView>>> =
        (0..builder.buffer_views.len()).map(|_| None).collect();
    for (v, decl) in builder.buffer_views.iter().enumerate() {
        let buffer_idx = builder
            .buffer_index_of(decl.buffer)
            .expect("view targets were checked during analysis");
        if let Some(physical) = &buffers[buffer_idx] {
            let view_desc = BufferViewDescription::whole(decl.kind);
            buffer_views[v] = Some(device.create_buffer_view(physical.as_rhi(), &view_desc)?);
        }
    }

    // ---- per-pass lowering
    let mut set_factory = SetFactory {
        device: device.as_ref(),
        accels: &builder.accels,
        image_views: &image_views,
        buffer_views: &buffer_views,
        samplers: Vec::new(),
        sampler_cache: FxHashMap::default(),
        descriptor_sets: Vec::new(),
        set_cache: FxHashMap::default(),
        created: 0,
        reused: 0,
    };
    let mut planner = TransitionPlanner::new(&builder, &analysis);
    let mut steps: Vec<Step> = Vec::new();
    let mut passes: Vec<CompiledPass> = Vec::with_capacity(pass_count);
    let mut framebuffers: Vec<Box<dyn vermeil_rhi::RhiFramebuffer>> = Vec::new();
    let mut pipelines: Vec<Arc<dyn vermeil_rhi::RhiPipeline>> = Vec::new();
    let mut pipeline_cache_hits = 0usize;
    let mut pipeline_cache_misses = 0usize;

    let pass_decls = mem::take(&mut builder.passes);
    for (pass_idx, decl) in pass_decls.into_iter().enumerate() {
        steps.append(&mut uploads_per_pass[pass_idx]);

        let barriers: Vec<PlannedBarrier> =
            planner.transitions_for_pass(&analysis.pass_accesses[pass_idx]);

        // framebuffer construction and the attachment signature
        let mut framebuffer_idx = None;
        let mut begin_info = None;
        let mut attachment_signatures: Vec<AttachmentSignature> = Vec::new();
        if let Some(attachments) = &decl.params.attachments {
            if decl.hint != PassHint::Raster {
                return Err(CompileError::Declaration(format!(
                    "pass '{}' declares framebuffer attachments but its hint is {:?}",
                    decl.name, decl.hint
                )));
            }
            if attachments.color_attachments().is_empty()
                && attachments.depth_stencil_attachment().is_none()
            {
                return Err(CompileError::Declaration(format!(
                    "pass '{}' declares an empty framebuffer-attachments block",
                    decl.name
                )));
            }

            let mut infos: Vec<(AttachmentInfo, &crate::attachments::Attachment)> = Vec::new();
            for attachment in attachments.color_attachments() {
                infos.push((
                    attachment_info(&builder, &decl.name, attachment.view)?,
                    attachment,
                ));
            }
            if let Some(attachment) = attachments.depth_stencil_attachment() {
                infos.push((
                    attachment_info(&builder, &decl.name, attachment.view)?,
                    attachment,
                ));
            }

            let (width, height) = (infos[0].0.width, infos[0].0.height);
            for (info, _) in &infos {
                if info.width != width || info.height != height {
                    return Err(CompileError::Declaration(format!(
                        "pass '{}': attachment on image '{}' is {}x{}, framebuffer is {}x{}",
                        decl.name,
                        builder.image_name(info.image_idx),
                        info.width,
                        info.height,
                        width,
                        height
                    )));
                }
            }

            let color_count = attachments.color_attachments().len();
            let color_refs: Vec<&dyn RhiImageView> = infos[..color_count]
                .iter()
                .map(|(info, _)| {
                    image_views[info.view_idx]
                        .as_ref()
                        .expect("attachment views are materialized")
                        .as_ref()
                })
                .collect();
            let depth_ref: Option<&dyn RhiImageView> = infos[color_count..].first().map(
                |(info, _)| {
                    image_views[info.view_idx]
                        .as_ref()
                        .expect("attachment views are materialized")
                        .as_ref()
                },
            );

            let framebuffer = device.create_framebuffer(&color_refs, depth_ref, width, height)?;
            framebuffer_idx = Some(framebuffers.len());
            framebuffers.push(framebuffer);

            begin_info = Some(RenderPassBeginInfo {
                color_ops: attachments
                    .color_attachments()
                    .iter()
                    .map(|a| AttachmentOps {
                        load: a.load,
                        store: a.store,
                    })
                    .collect::<SmallVec<[AttachmentOps; 8]>>(),
                depth_stencil_ops: attachments.depth_stencil_attachment().map(|a| {
                    AttachmentOps {
                        load: a.load,
                        store: a.store,
                    }
                }),
                width,
                height,
            });

            for (info, attachment) in &infos {
                let final_state = if info.is_depth {
                    ResourceState::DepthStencilAttachment
                } else {
                    ResourceState::ColorAttachment
                };
                let initial_state = barriers
                    .iter()
                    .find(|b| {
                        b.resource == ResourceIndex::Image(info.image_idx)
                            && b.range.base_mip == info.range.base_mip
                            && b.range.base_layer == info.range.base_layer
                    })
                    .map(|b| b.old_state)
                    .unwrap_or(final_state);
                attachment_signatures.push(AttachmentSignature {
                    format: info.format,
                    load: attachment.load,
                    store: attachment.store,
                    initial_state,
                    final_state,
                });
            }
        }

        if !barriers.is_empty() {
            steps.push(Step::Barriers(barriers));
        }

        // pipeline
        let mut pipeline_idx = None;
        let mut push_constants = Vec::new();
        let mut merged_params: Option<Vec<MergedParameter>> = None;
        if let Some(pipeline_desc) = &decl.params.pipeline {
            let kind_matches_hint = matches!(
                (decl.hint, pipeline_desc),
                (PassHint::Raster, PipelineDescription::Graphics(_))
                    | (PassHint::Compute, PipelineDescription::Compute(_))
                    | (PassHint::RayTracing, PipelineDescription::RayTracing(_))
            );
            if !kind_matches_hint {
                return Err(CompileError::Pipeline(format!(
                    "pass '{}' has hint {:?} but declares a {} pipeline",
                    decl.name,
                    decl.hint,
                    pipeline_desc.kind_name()
                )));
            }
            validate_stage_set(&decl.name, pipeline_desc)?;

            let stages = pipeline_desc.stages();
            let layout = merge_pipeline_layout(&stages)?;
            let fingerprint = pipeline_fingerprint(pipeline_desc, &attachment_signatures);
            let (pipeline, hit) = PipelineCache::global().get_or_create(
                device.as_ref(),
                fingerprint,
                &layout,
                pipeline_desc,
            )?;
            if hit {
                pipeline_cache_hits += 1;
            } else {
                pipeline_cache_misses += 1;
            }
            pipeline_idx = Some(pipelines.len());
            pipelines.push(pipeline);
            push_constants = layout.push_constants.clone();
            merged_params = Some(merge_parameters(&stages)?);
        }

        // descriptor sets: explicit groups first, then reflection-driven
        let mut sets: Vec<(u32, usize)> = Vec::new();
        let mut groups_map: Vec<(ResourceGroupHandle, usize)> = Vec::new();
        for entry in &decl.params.entries {
            if let ParameterValue::ResourceGroup { set, group } = &entry.value {
                let gidx = builder
                    .group_index_of(*group)
                    .expect("group handles were checked during analysis");
                let bindings = resolve_group_bindings(&builder, &builder.groups[gidx])?;
                let table_idx = set_factory.materialize(&bindings)?;
                sets.push((*set, table_idx));
                groups_map.push((*group, table_idx));
            }
        }
        if let Some(parameters) = &merged_params {
            let explicit_sets: FxHashSet<u32> = sets.iter().map(|&(s, _)| s).collect();
            let mut per_set: BTreeMap<u32, Vec<ResolvedBinding>> = BTreeMap::new();
            for parameter in parameters {
                if explicit_sets.contains(&parameter.set) {
                    continue;
                }
                let entry = decl
                    .params
                    .entries
                    .iter()
                    .find(|e| e.name == parameter.name)
                    .ok_or_else(|| {
                        CompileError::Pipeline(format!(
                            "pass '{}': shader parameter '{}' (set {}, slot {}) has no \
                             parameter-block member",
                            decl.name, parameter.name, parameter.set, parameter.binding
                        ))
                    })?;
                let binding = resolve_loose_binding(&builder, &decl.name, entry, parameter)?;
                per_set.entry(parameter.set).or_default().push(binding);
            }
            for (set, mut bindings) in per_set {
                bindings.sort_by_key(|b| b.binding);
                let table_idx = set_factory.materialize(&bindings)?;
                sets.push((set, table_idx));
            }
            for entry in &decl.params.entries {
                if matches!(entry.value, ParameterValue::ResourceGroup { .. }) {
                    continue;
                }
                if !parameters.iter().any(|p| p.name == entry.name) {
                    warn!(
                        "pass '{}': parameter '{}' does not appear in the shader reflection",
                        decl.name, entry.name
                    );
                }
            }
        }
        sets.sort_by_key(|&(set, _)| set);

        let mut texture_views_map = Vec::new();
        let mut buffer_views_map = Vec::new();
        collect_pass_views(
            &builder,
            &decl.params,
            &mut texture_views_map,
            &mut buffer_views_map,
        );

        passes.push(CompiledPass {
            name: decl.name,
            hint: decl.hint,
            closure: decl.closure,
            pipeline: pipeline_idx,
            framebuffer: framebuffer_idx,
            begin_info,
            sets,
            texture_views: texture_views_map,
            buffer_views: buffer_views_map,
            groups: groups_map,
            push_constants,
        });
        steps.push(Step::Pass(pass_idx));
    }

    // ---- terminal reconciliation of externals
    let terminal = planner.terminal_transitions(&builder);
    if !terminal.is_empty() {
        steps.push(Step::Barriers(terminal));
    }

    let SetFactory {
        samplers,
        descriptor_sets,
        created,
        reused,
        ..
    } = set_factory;

    let statistics = GraphStatistics {
        transient_memory_size: plan.total,
        transient_resource_count: requests.len(),
        barrier_count: planner.barrier_count,
        upload_count,
        descriptor_sets_created: created,
        descriptor_sets_reused: reused,
        pipeline_cache_hits,
        pipeline_cache_misses,
    };
    debug!(
        "compiled render graph in {}us: {} pass(es), {} barrier(s), {} set(s) ({} reused)",
        start.elapsed().as_micros(),
        passes.len(),
        statistics.barrier_count,
        statistics.descriptor_sets_created,
        statistics.descriptor_sets_reused,
    );

    Ok(Graph {
        device: device.clone(),
        memory,
        images,
        buffers,
        image_views,
        buffer_views,
        samplers,
        descriptor_sets,
        framebuffers,
        staging,
        pipelines,
        passes,
        steps,
        allocations,
        statistics,
    })
}
