//! Lifetime analysis.
//!
//! Walks the declared passes in order and produces, for every resource,
//! the ordered list of accesses (pass index, access kind, required state,
//! subresource range), plus the per-pass access lists the transition
//! planner consumes and the usage flags inferred for transient creation.

use crate::builder::{BufferDecl, GraphBuilder, ImageDecl};
use crate::descriptors::GroupResource;
use crate::error::CompileError;
use crate::handle::{BufferViewHandle, ImageViewHandle};
use crate::params::ParameterValue;
use fxhash::FxHashMap;
use vermeil_rhi::{
    BufferUsageFlags, BufferViewKind, Format, ImageUsageFlags, ImageViewKind, ImageViewRange,
    ResourceState,
};

/// Index of a declared resource inside the builder tables.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum ResourceIndex {
    Image(usize),
    Buffer(usize),
}

/// Shader-visible role of one access.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AccessKind {
    /// Render-target or depth-stencil attachment.
    Attachment,
    /// Sampled / shader-resource read.
    Sampled,
    /// Unordered (read-write) access.
    Storage,
    /// Uniform constant read.
    Constant,
    /// Synthetic upload destination for initial-data resources.
    CopyDestination,
}

impl AccessKind {
    pub fn is_write(self) -> bool {
        matches!(
            self,
            AccessKind::Attachment | AccessKind::Storage | AccessKind::CopyDestination
        )
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct ResourceAccess {
    pub pass: usize,
    pub kind: AccessKind,
    pub state: ResourceState,
    /// Resolved subresource range (meaningful for images).
    pub range: ImageViewRange,
}

pub(crate) struct LifetimeAnalysis {
    pub image_accesses: Vec<Vec<ResourceAccess>>,
    pub buffer_accesses: Vec<Vec<ResourceAccess>>,
    /// Per pass, in parameter order; consumed by the transition planner.
    pub pass_accesses: Vec<Vec<(ResourceIndex, ResourceAccess)>>,
    pub image_usage: Vec<ImageUsageFlags>,
    pub buffer_usage: Vec<BufferUsageFlags>,
}

impl LifetimeAnalysis {
    /// First/last pass a transient image must be alive for.
    pub fn image_interval(&self, index: usize) -> Option<(usize, usize)> {
        interval(&self.image_accesses[index])
    }

    pub fn buffer_interval(&self, index: usize) -> Option<(usize, usize)> {
        interval(&self.buffer_accesses[index])
    }
}

fn interval(accesses: &[ResourceAccess]) -> Option<(usize, usize)> {
    let first = accesses.first()?.pass;
    let last = accesses.iter().map(|a| a.pass).max().unwrap_or(first);
    Some((first, last))
}

fn resolve_image_view(
    builder: &GraphBuilder,
    view: ImageViewHandle,
    expected: ImageViewKind,
    context: &str,
) -> Result<(usize, ImageViewRange, Format), CompileError> {
    let view_idx = builder.image_view_index_of(view).ok_or_else(|| {
        CompileError::Declaration(format!(
            "{} references image view {:?} which is not registered in this builder",
            context, view
        ))
    })?;
    let decl = &builder.image_views[view_idx];
    if decl.kind != expected {
        return Err(CompileError::Declaration(format!(
            "{} expects a {:?} view but {:?} was created as {:?}",
            context, expected, view, decl.kind
        )));
    }
    let image_idx = builder.image_index_of(decl.image).ok_or_else(|| {
        CompileError::Declaration(format!(
            "view {:?} references image {:?} which is not registered in this builder",
            view, decl.image
        ))
    })?;
    let desc = builder.images[image_idx].description();
    let range = decl.range.resolve(desc.mip_levels(), desc.array_layers());
    let format = decl.format.unwrap_or(desc.format);
    Ok((image_idx, range, format))
}

fn resolve_buffer_view(
    builder: &GraphBuilder,
    view: BufferViewHandle,
    expected: BufferViewKind,
    context: &str,
) -> Result<usize, CompileError> {
    let view_idx = builder.buffer_view_index_of(view).ok_or_else(|| {
        CompileError::Declaration(format!(
            "{} references buffer view {:?} which is not registered in this builder",
            context, view
        ))
    })?;
    let decl = &builder.buffer_views[view_idx];
    if decl.kind != expected {
        return Err(CompileError::Declaration(format!(
            "{} expects a {:?} view but {:?} was created as {:?}",
            context, expected, view, decl.kind
        )));
    }
    builder.buffer_index_of(decl.buffer).ok_or_else(|| {
        CompileError::Declaration(format!(
            "view {:?} references buffer {:?} which is not registered in this builder",
            view, decl.buffer
        ))
    })
}

/// Resolves one parameter-block entry into resource accesses. Resource
/// groups expand one level deep; nesting is a declaration error.
fn resolve_parameter(
    builder: &GraphBuilder,
    value: &ParameterValue,
    pass_idx: usize,
    context: &str,
    allow_group: bool,
    accesses: &mut Vec<(ResourceIndex, ResourceAccess)>,
) -> Result<(), CompileError> {
    match value {
        ParameterValue::TextureSrv(v) => {
            let (image, range, _) =
                resolve_image_view(builder, *v, ImageViewKind::ShaderResource, context)?;
            accesses.push((
                ResourceIndex::Image(image),
                ResourceAccess {
                    pass: pass_idx,
                    kind: AccessKind::Sampled,
                    state: ResourceState::ShaderReadOnly,
                    range,
                },
            ));
        }
        ParameterValue::TextureUav(v) => {
            let (image, range, _) =
                resolve_image_view(builder, *v, ImageViewKind::UnorderedAccess, context)?;
            accesses.push((
                ResourceIndex::Image(image),
                ResourceAccess {
                    pass: pass_idx,
                    kind: AccessKind::Storage,
                    state: ResourceState::General,
                    range,
                },
            ));
        }
        ParameterValue::BufferSrv(v) => {
            let buffer = resolve_buffer_view(builder, *v, BufferViewKind::ShaderResource, context)?;
            accesses.push((
                ResourceIndex::Buffer(buffer),
                ResourceAccess {
                    pass: pass_idx,
                    kind: AccessKind::Sampled,
                    state: ResourceState::ShaderReadOnly,
                    range: ImageViewRange::ALL,
                },
            ));
        }
        ParameterValue::BufferUav(v) => {
            let buffer =
                resolve_buffer_view(builder, *v, BufferViewKind::UnorderedAccess, context)?;
            accesses.push((
                ResourceIndex::Buffer(buffer),
                ResourceAccess {
                    pass: pass_idx,
                    kind: AccessKind::Storage,
                    state: ResourceState::General,
                    range: ImageViewRange::ALL,
                },
            ));
        }
        ParameterValue::BufferCbv(v) => {
            let buffer = resolve_buffer_view(builder, *v, BufferViewKind::Constant, context)?;
            accesses.push((
                ResourceIndex::Buffer(buffer),
                ResourceAccess {
                    pass: pass_idx,
                    kind: AccessKind::Constant,
                    state: ResourceState::ConstantBuffer,
                    range: ImageViewRange::ALL,
                },
            ));
        }
        ParameterValue::Sampler(_) => {}
        ParameterValue::AccelerationStructure(a) => {
            if builder.accel_index_of(*a).is_none() {
                return Err(CompileError::Declaration(format!(
                    "{} references acceleration structure {:?} which is not registered",
                    context, a
                )));
            }
        }
        ParameterValue::ResourceGroup { group, .. } => {
            if !allow_group {
                return Err(CompileError::Declaration(format!(
                    "{} nests a resource group inside a resource group",
                    context
                )));
            }
            let group_idx = builder.group_index_of(*group).ok_or_else(|| {
                CompileError::Declaration(format!(
                    "{} references resource group {:?} which is not registered",
                    context, group
                ))
            })?;
            for entry in &builder.groups[group_idx].entries {
                let value = match &entry.resource {
                    GroupResource::TextureSrv(v) => ParameterValue::TextureSrv(*v),
                    GroupResource::TextureUav(v) => ParameterValue::TextureUav(*v),
                    GroupResource::BufferSrv(v) => ParameterValue::BufferSrv(*v),
                    GroupResource::BufferUav(v) => ParameterValue::BufferUav(*v),
                    GroupResource::BufferCbv(v) => ParameterValue::BufferCbv(*v),
                    GroupResource::Sampler(s) => ParameterValue::Sampler(*s),
                    GroupResource::AccelerationStructure(a) => {
                        ParameterValue::AccelerationStructure(*a)
                    }
                };
                resolve_parameter(builder, &value, pass_idx, context, false, accesses)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn analyze(builder: &GraphBuilder) -> Result<LifetimeAnalysis, CompileError> {
    let mut image_accesses: Vec<Vec<ResourceAccess>> = vec![Vec::new(); builder.images.len()];
    let mut buffer_accesses: Vec<Vec<ResourceAccess>> = vec![Vec::new(); builder.buffers.len()];
    let mut pass_accesses: Vec<Vec<(ResourceIndex, ResourceAccess)>> =
        Vec::with_capacity(builder.passes.len());

    for (pass_idx, pass) in builder.passes.iter().enumerate() {
        let context = format!("pass '{}'", pass.name);
        let mut accesses: Vec<(ResourceIndex, ResourceAccess)> = Vec::new();

        for entry in &pass.params.entries {
            resolve_parameter(builder, &entry.value, pass_idx, &context, true, &mut accesses)?;
        }

        if let Some(attachments) = &pass.params.attachments {
            for attachment in attachments.color_attachments() {
                let (image, range, format) = resolve_image_view(
                    builder,
                    attachment.view,
                    ImageViewKind::RenderTarget,
                    &context,
                )?;
                if format.is_depth() {
                    return Err(CompileError::Declaration(format!(
                        "{} binds depth-format image '{}' as a color attachment",
                        context,
                        builder.image_name(image)
                    )));
                }
                accesses.push((
                    ResourceIndex::Image(image),
                    ResourceAccess {
                        pass: pass_idx,
                        kind: AccessKind::Attachment,
                        state: ResourceState::ColorAttachment,
                        range,
                    },
                ));
            }
            if let Some(attachment) = attachments.depth_stencil_attachment() {
                let (image, range, format) = resolve_image_view(
                    builder,
                    attachment.view,
                    ImageViewKind::RenderTarget,
                    &context,
                )?;
                if !format.is_depth() {
                    return Err(CompileError::Declaration(format!(
                        "{} binds color-format image '{}' as the depth-stencil attachment",
                        context,
                        builder.image_name(image)
                    )));
                }
                accesses.push((
                    ResourceIndex::Image(image),
                    ResourceAccess {
                        pass: pass_idx,
                        kind: AccessKind::Attachment,
                        state: ResourceState::DepthStencilAttachment,
                        range,
                    },
                ));
            }
        }

        check_same_pass_conflicts(builder, &context, &accesses)?;

        for (resource, access) in &accesses {
            match resource {
                ResourceIndex::Image(i) => image_accesses[*i].push(*access),
                ResourceIndex::Buffer(i) => buffer_accesses[*i].push(*access),
            }
        }
        pass_accesses.push(accesses);
    }

    // a transient image may serve as storage or as attachment, never both
    for (i, decl) in builder.images.iter().enumerate() {
        if decl.is_external() {
            continue;
        }
        let has_storage = image_accesses[i]
            .iter()
            .any(|a| a.kind == AccessKind::Storage);
        let has_attachment = image_accesses[i]
            .iter()
            .any(|a| a.kind == AccessKind::Attachment);
        if has_storage && has_attachment {
            return Err(CompileError::Analysis(format!(
                "transient image '{}' is used both as a storage target and as an attachment",
                builder.image_name(i)
            )));
        }
    }

    // usage inference + synthetic upload accesses
    let mut image_usage = vec![ImageUsageFlags::empty(); builder.images.len()];
    for (i, decl) in builder.images.iter().enumerate() {
        let mut usage = decl.description().usage;
        for access in &image_accesses[i] {
            usage |= match access.kind {
                AccessKind::Attachment => {
                    if decl.description().format.is_depth() {
                        ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                    } else {
                        ImageUsageFlags::COLOR_ATTACHMENT
                    }
                }
                AccessKind::Sampled => ImageUsageFlags::SAMPLED,
                AccessKind::Storage => ImageUsageFlags::STORAGE,
                AccessKind::Constant => ImageUsageFlags::empty(),
                AccessKind::CopyDestination => ImageUsageFlags::TRANSFER_DST,
            };
        }
        if let ImageDecl::Transient {
            initial_data: Some(_),
            ..
        } = decl
        {
            if let Some(first) = image_accesses[i].first().map(|a| a.pass) {
                usage |= ImageUsageFlags::TRANSFER_DST;
                image_accesses[i].insert(
                    0,
                    ResourceAccess {
                        pass: first,
                        kind: AccessKind::CopyDestination,
                        state: ResourceState::TransferDst,
                        range: ImageViewRange::ALL,
                    },
                );
            }
        }
        image_usage[i] = usage;
        if image_accesses[i].is_empty() && !decl.is_external() {
            log::warn!(
                "transient image '{}' is never accessed by any pass; excluded from allocation",
                builder.image_name(i)
            );
        }
    }

    let mut buffer_usage = vec![BufferUsageFlags::empty(); builder.buffers.len()];
    for (i, decl) in builder.buffers.iter().enumerate() {
        let mut usage = decl.description().usage;
        for access in &buffer_accesses[i] {
            usage |= match access.kind {
                AccessKind::Sampled | AccessKind::Storage => BufferUsageFlags::STORAGE,
                AccessKind::Constant => BufferUsageFlags::CONSTANT,
                AccessKind::CopyDestination => BufferUsageFlags::TRANSFER_DST,
                AccessKind::Attachment => BufferUsageFlags::empty(),
            };
        }
        if let BufferDecl::Transient {
            initial_data: Some(_),
            ..
        } = decl
        {
            if let Some(first) = buffer_accesses[i].first().map(|a| a.pass) {
                usage |= BufferUsageFlags::TRANSFER_DST;
                buffer_accesses[i].insert(
                    0,
                    ResourceAccess {
                        pass: first,
                        kind: AccessKind::CopyDestination,
                        state: ResourceState::TransferDst,
                        range: ImageViewRange::ALL,
                    },
                );
            }
        }
        buffer_usage[i] = usage;
        if buffer_accesses[i].is_empty() && !decl.is_external() {
            log::warn!(
                "transient buffer '{}' is never accessed by any pass; excluded from allocation",
                builder.buffer_name(i)
            );
        }
    }

    Ok(LifetimeAnalysis {
        image_accesses,
        buffer_accesses,
        pass_accesses,
        image_usage,
        buffer_usage,
    })
}

fn check_same_pass_conflicts(
    builder: &GraphBuilder,
    context: &str,
    accesses: &[(ResourceIndex, ResourceAccess)],
) -> Result<(), CompileError> {
    let mut seen: FxHashMap<ResourceIndex, (bool, bool)> = FxHashMap::default();
    for (resource, access) in accesses {
        let entry = seen.entry(*resource).or_insert((false, false));
        if access.kind.is_write() {
            entry.1 = true;
        } else {
            entry.0 = true;
        }
    }
    for (resource, (read, write)) in seen {
        if read && write {
            let name = match resource {
                ResourceIndex::Image(i) => builder.image_name(i),
                ResourceIndex::Buffer(i) => builder.buffer_name(i),
            };
            return Err(CompileError::Analysis(format!(
                "{} references '{}' as both read-only and read-write",
                context, name
            )));
        }
    }
    Ok(())
}
