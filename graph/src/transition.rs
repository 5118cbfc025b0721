//! Barrier planning.
//!
//! The planner tracks every resource's current state (per mip/layer cell
//! for images) and emits the minimal barrier batch ahead of each pass.
//! The (old, new) pair table is spelled out exhaustively; a pair outside
//! the table is a programmer bug: it panics in debug builds and is logged
//! and skipped in release builds.

use crate::builder::{BufferDecl, GraphBuilder, ImageDecl};
use crate::lifetime::{AccessKind, LifetimeAnalysis, ResourceAccess, ResourceIndex};
use fxhash::FxHashSet;
use vermeil_rhi::{AccessFlags, ImageViewRange, PipelineStageFlags, ResourceState};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TransitionMasks {
    pub src_stages: PipelineStageFlags,
    pub src_access: AccessFlags,
    pub dst_stages: PipelineStageFlags,
    pub dst_access: AccessFlags,
}

/// The transition table. Pairs absent from this match have no defined
/// barrier and must never be requested.
#[allow(clippy::match_like_matches_macro)]
pub fn transition_allowed(old: ResourceState, new: ResourceState) -> bool {
    use ResourceState::*;
    match (old, new) {
        // initial transitions out of undefined contents
        (Undefined, TransferSrc)
        | (Undefined, TransferDst)
        | (Undefined, General)
        | (Undefined, ColorAttachment)
        | (Undefined, DepthStencilAttachment)
        | (Undefined, ShaderReadOnly)
        | (Undefined, ConstantBuffer)
        | (Undefined, Present) => true,

        // post-upload consumption
        (TransferDst, ShaderReadOnly)
        | (TransferDst, ConstantBuffer)
        | (TransferDst, General)
        | (TransferDst, TransferSrc)
        | (TransferDst, TransferDst)
        | (TransferDst, ColorAttachment)
        | (TransferDst, DepthStencilAttachment)
        | (TransferDst, Present) => true,

        // storage results consumed or recycled; the write-write pair is
        // the mandated barrier between consecutive storage writers
        (General, ShaderReadOnly)
        | (General, ConstantBuffer)
        | (General, General)
        | (General, TransferSrc)
        | (General, TransferDst)
        | (General, ColorAttachment)
        | (General, DepthStencilAttachment)
        | (General, Present) => true,

        // attachment results consumed, re-targeted or presented
        (ColorAttachment, ShaderReadOnly)
        | (ColorAttachment, General)
        | (ColorAttachment, TransferSrc)
        | (ColorAttachment, TransferDst)
        | (ColorAttachment, ColorAttachment)
        | (ColorAttachment, Present) => true,

        (DepthStencilAttachment, ShaderReadOnly)
        | (DepthStencilAttachment, General)
        | (DepthStencilAttachment, TransferSrc)
        | (DepthStencilAttachment, DepthStencilAttachment) => true,

        // read states back into producers
        (ShaderReadOnly, ColorAttachment)
        | (ShaderReadOnly, DepthStencilAttachment)
        | (ShaderReadOnly, General)
        | (ShaderReadOnly, TransferSrc)
        | (ShaderReadOnly, TransferDst)
        | (ShaderReadOnly, ConstantBuffer)
        | (ShaderReadOnly, Present) => true,

        (ConstantBuffer, TransferDst)
        | (ConstantBuffer, General)
        | (ConstantBuffer, ShaderReadOnly) => true,

        (TransferSrc, ShaderReadOnly)
        | (TransferSrc, General)
        | (TransferSrc, TransferDst)
        | (TransferSrc, ColorAttachment)
        | (TransferSrc, DepthStencilAttachment) => true,

        // swapchain round trips
        (Present, ColorAttachment)
        | (Present, TransferSrc)
        | (Present, TransferDst)
        | (Present, ShaderReadOnly) => true,

        _ => false,
    }
}

/// Masks for an allowed transition, composed from the per-state halves.
pub fn transition_masks(old: ResourceState, new: ResourceState) -> Option<TransitionMasks> {
    if !transition_allowed(old, new) {
        return None;
    }
    Some(TransitionMasks {
        src_stages: old.stage_mask(),
        src_access: old.access_mask(),
        dst_stages: new.stage_mask(),
        dst_access: new.access_mask(),
    })
}

fn masks_or_report(old: ResourceState, new: ResourceState) -> Option<TransitionMasks> {
    match transition_masks(old, new) {
        Some(masks) => Some(masks),
        None => {
            if cfg!(debug_assertions) {
                panic!("no transition path from {:?} to {:?}", old, new);
            }
            log::error!(
                "no transition path from {:?} to {:?}; barrier skipped",
                old,
                new
            );
            None
        }
    }
}

/// A planned barrier, scoped to a subresource range for images.
#[derive(Copy, Clone, Debug)]
pub struct PlannedBarrier {
    pub resource: ResourceIndex,
    pub old_state: ResourceState,
    pub new_state: ResourceState,
    pub range: ImageViewRange,
    pub masks: TransitionMasks,
}

/// Per-image state grid, one cell per (mip, layer).
struct SubresourceStates {
    mips: u32,
    states: Vec<ResourceState>,
}

impl SubresourceStates {
    fn new(mips: u32, layers: u32, state: ResourceState) -> SubresourceStates {
        SubresourceStates {
            mips,
            states: vec![state; (mips * layers) as usize],
        }
    }

    fn cell(&self, mip: u32, layer: u32) -> ResourceState {
        self.states[(layer * self.mips + mip) as usize]
    }

    fn set_range(&mut self, range: &ImageViewRange, state: ResourceState) {
        for layer in range.base_layer..range.base_layer + range.layer_count {
            for mip in range.base_mip..range.base_mip + range.mip_count {
                self.states[(layer * self.mips + mip) as usize] = state;
            }
        }
    }

    /// Uniform state over the range, or `None` when cells diverge.
    fn uniform_state(&self, range: &ImageViewRange) -> Option<ResourceState> {
        let mut result = None;
        for layer in range.base_layer..range.base_layer + range.layer_count {
            for mip in range.base_mip..range.base_mip + range.mip_count {
                let state = self.cell(mip, layer);
                match result {
                    None => result = Some(state),
                    Some(s) if s != state => return None,
                    _ => {}
                }
            }
        }
        result
    }
}

pub(crate) struct TransitionPlanner {
    image_states: Vec<SubresourceStates>,
    buffer_states: Vec<ResourceState>,
    // resources already brought into their pass state this pass
    touched_images: FxHashSet<(usize, u32, u32)>,
    touched_buffers: FxHashSet<usize>,
    pub barrier_count: usize,
}

impl TransitionPlanner {
    pub fn new(builder: &GraphBuilder, analysis: &LifetimeAnalysis) -> TransitionPlanner {
        let image_states = builder
            .images
            .iter()
            .enumerate()
            .map(|(i, decl)| {
                let desc = decl.description();
                let initial = match decl {
                    ImageDecl::External { states, .. } => states.input_state,
                    ImageDecl::Transient { initial_data, .. } => {
                        // uploads leave initial-data images in TransferDst
                        let uploaded = initial_data.is_some()
                            && !analysis.image_accesses[i].is_empty();
                        if uploaded {
                            ResourceState::TransferDst
                        } else {
                            ResourceState::Undefined
                        }
                    }
                };
                SubresourceStates::new(desc.mip_levels(), desc.array_layers(), initial)
            })
            .collect();
        let buffer_states = builder
            .buffers
            .iter()
            .enumerate()
            .map(|(i, decl)| match decl {
                BufferDecl::External { states, .. } => states.input_state,
                BufferDecl::Transient { initial_data, .. } => {
                    let uploaded =
                        initial_data.is_some() && !analysis.buffer_accesses[i].is_empty();
                    if uploaded {
                        ResourceState::TransferDst
                    } else {
                        ResourceState::Undefined
                    }
                }
            })
            .collect();
        TransitionPlanner {
            image_states,
            buffer_states,
            touched_images: FxHashSet::default(),
            touched_buffers: FxHashSet::default(),
            barrier_count: 0,
        }
    }

    /// Barriers required ahead of one pass, in parameter order.
    pub fn transitions_for_pass(
        &mut self,
        accesses: &[(ResourceIndex, ResourceAccess)],
    ) -> Vec<PlannedBarrier> {
        self.touched_images.clear();
        self.touched_buffers.clear();
        let mut barriers = Vec::new();

        for (resource, access) in accesses {
            // upload transitions are folded into the upload step itself
            if access.kind == AccessKind::CopyDestination {
                continue;
            }
            match *resource {
                ResourceIndex::Buffer(index) => {
                    self.buffer_transition(index, access.state, &mut barriers);
                }
                ResourceIndex::Image(index) => {
                    self.image_transition(index, access.state, &access.range, &mut barriers);
                }
            }
        }

        self.barrier_count += barriers.len();
        barriers
    }

    fn buffer_transition(
        &mut self,
        index: usize,
        state: ResourceState,
        barriers: &mut Vec<PlannedBarrier>,
    ) {
        if !self.touched_buffers.insert(index) {
            // a second access in the same pass is ordered by the closure,
            // not by the planner
            return;
        }
        let current = self.buffer_states[index];
        if current == state && !state.is_write() {
            return;
        }
        if let Some(masks) = masks_or_report(current, state) {
            barriers.push(PlannedBarrier {
                resource: ResourceIndex::Buffer(index),
                old_state: current,
                new_state: state,
                range: ImageViewRange::ALL,
                masks,
            });
        }
        self.buffer_states[index] = state;
    }

    fn image_transition(
        &mut self,
        index: usize,
        state: ResourceState,
        range: &ImageViewRange,
        barriers: &mut Vec<PlannedBarrier>,
    ) {
        let fresh = self
            .touched_images
            .insert((index, range.base_mip, range.base_layer));
        if !fresh {
            return;
        }

        let states = &mut self.image_states[index];
        if let Some(current) = states.uniform_state(range) {
            if current == state && !state.is_write() {
                return;
            }
            if let Some(masks) = masks_or_report(current, state) {
                barriers.push(PlannedBarrier {
                    resource: ResourceIndex::Image(index),
                    old_state: current,
                    new_state: state,
                    range: *range,
                    masks,
                });
            }
            states.set_range(range, state);
            return;
        }

        // mixed per-cell states: emit one barrier per layer run of equal
        // state within each mip
        for mip in range.base_mip..range.base_mip + range.mip_count {
            let mut layer = range.base_layer;
            let end = range.base_layer + range.layer_count;
            while layer < end {
                let current = states.cell(mip, layer);
                let mut run = 1;
                while layer + run < end && states.cell(mip, layer + run) == current {
                    run += 1;
                }
                if current != state || state.is_write() {
                    if let Some(masks) = masks_or_report(current, state) {
                        barriers.push(PlannedBarrier {
                            resource: ResourceIndex::Image(index),
                            old_state: current,
                            new_state: state,
                            range: ImageViewRange {
                                base_mip: mip,
                                mip_count: 1,
                                base_layer: layer,
                                layer_count: run,
                            },
                            masks,
                        });
                    }
                }
                layer += run;
            }
        }
        states.set_range(range, state);
    }

    /// Final barriers bringing every external resource back to its
    /// declared output state, touched or not.
    pub fn terminal_transitions(&mut self, builder: &GraphBuilder) -> Vec<PlannedBarrier> {
        let mut barriers = Vec::new();

        for (index, decl) in builder.images.iter().enumerate() {
            let states = match decl {
                ImageDecl::External { states, .. } => states,
                ImageDecl::Transient { .. } => continue,
            };
            let desc = decl.description();
            let full = ImageViewRange::ALL.resolve(desc.mip_levels(), desc.array_layers());
            let grid = &mut self.image_states[index];
            for mip in 0..full.mip_count {
                let mut layer = 0;
                while layer < full.layer_count {
                    let current = grid.cell(mip, layer);
                    let mut run = 1;
                    while layer + run < full.layer_count && grid.cell(mip, layer + run) == current {
                        run += 1;
                    }
                    if current != states.output_state {
                        if let Some(masks) = masks_or_report(current, states.output_state) {
                            barriers.push(PlannedBarrier {
                                resource: ResourceIndex::Image(index),
                                old_state: current,
                                new_state: states.output_state,
                                range: ImageViewRange {
                                    base_mip: mip,
                                    mip_count: 1,
                                    base_layer: layer,
                                    layer_count: run,
                                },
                                masks,
                            });
                        }
                    }
                    layer += run;
                }
            }
            grid.set_range(&full, states.output_state);
        }

        for (index, decl) in builder.buffers.iter().enumerate() {
            let states = match decl {
                BufferDecl::External { states, .. } => states,
                BufferDecl::Transient { .. } => continue,
            };
            let current = self.buffer_states[index];
            if current != states.output_state {
                if let Some(masks) = masks_or_report(current, states.output_state) {
                    barriers.push(PlannedBarrier {
                        resource: ResourceIndex::Buffer(index),
                        old_state: current,
                        new_state: states.output_state,
                        range: ImageViewRange::ALL,
                        masks,
                    });
                }
                self.buffer_states[index] = states.output_state;
            }
        }

        self.barrier_count += barriers.len();
        barriers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covered_pairs_have_masks() {
        use ResourceState::*;
        let pairs = [
            (Undefined, TransferDst),
            (Undefined, General),
            (Undefined, ColorAttachment),
            (Undefined, DepthStencilAttachment),
            (TransferDst, ShaderReadOnly),
            (General, ShaderReadOnly),
            (ColorAttachment, ShaderReadOnly),
            (DepthStencilAttachment, ShaderReadOnly),
            (ShaderReadOnly, ColorAttachment),
            (ShaderReadOnly, General),
            (ColorAttachment, Present),
        ];
        for (old, new) in pairs {
            assert!(
                transition_masks(old, new).is_some(),
                "missing entry for {:?} -> {:?}",
                old,
                new
            );
        }
    }

    #[test]
    fn nonsense_pairs_are_rejected() {
        use ResourceState::*;
        assert!(!transition_allowed(Present, General));
        assert!(!transition_allowed(DepthStencilAttachment, Present));
        assert!(!transition_allowed(ConstantBuffer, ColorAttachment));
        // anything back into undefined is meaningless
        assert!(!transition_allowed(ShaderReadOnly, Undefined));
        assert!(!transition_allowed(General, Undefined));
    }

    #[test]
    fn masks_compose_state_halves() {
        let masks = transition_masks(
            ResourceState::ColorAttachment,
            ResourceState::ShaderReadOnly,
        )
        .unwrap();
        assert_eq!(
            masks.src_stages,
            PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert!(masks.src_access.contains(AccessFlags::COLOR_ATTACHMENT_WRITE));
        assert!(masks.dst_access.contains(AccessFlags::SHADER_READ));
    }
}
