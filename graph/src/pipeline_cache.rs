//! Process-wide pipeline cache and pipeline-layout derivation.
//!
//! Pipelines are memoized by a 64-bit structural fingerprint of the stage
//! module hashes, the bit-exact fixed-function state, the framebuffer
//! attachment signature and (for ray tracing) the recursion depth. The
//! cache lives for the process; `clear` is wired to renderer shutdown.

use crate::error::CompileError;
use fxhash::{FxHashMap, FxHasher};
use lazy_static::lazy_static;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use vermeil_rhi::{
    DescriptorType, Device, Format, LoadOp, PipelineDescription, PipelineLayoutDescription,
    PushConstantRange, ResourceGroupLayoutBinding, ResourceGroupLayoutDescription, ResourceState,
    RhiPipeline, ShaderStageDescription, ShaderStageFlags, StoreOp,
};

/// Per-attachment slice of the pipeline fingerprint.
#[derive(Copy, Clone, Debug)]
pub(crate) struct AttachmentSignature {
    pub format: Format,
    pub load: LoadOp,
    pub store: StoreOp,
    pub initial_state: ResourceState,
    pub final_state: ResourceState,
}

impl AttachmentSignature {
    fn fold(&self, hasher: &mut FxHasher) {
        self.format.hash(hasher);
        self.load.tag().hash(hasher);
        self.store.hash(hasher);
        self.initial_state.hash(hasher);
        self.final_state.hash(hasher);
    }
}

pub(crate) fn pipeline_fingerprint(
    desc: &PipelineDescription,
    attachments: &[AttachmentSignature],
) -> u64 {
    let mut hasher = FxHasher::default();
    match desc {
        PipelineDescription::Graphics(d) => {
            0u8.hash(&mut hasher);
            d.vertex.module_hash.hash(&mut hasher);
            d.fragment.module_hash.hash(&mut hasher);
            d.rasterization.hash(&mut hasher);
            d.depth_stencil.hash(&mut hasher);
            d.color_blend.hash(&mut hasher);
        }
        PipelineDescription::Compute(d) => {
            1u8.hash(&mut hasher);
            d.compute.module_hash.hash(&mut hasher);
        }
        PipelineDescription::RayTracing(d) => {
            2u8.hash(&mut hasher);
            d.raygen.module_hash.hash(&mut hasher);
            for stage in &d.miss {
                stage.module_hash.hash(&mut hasher);
            }
            for stage in &d.closest_hit {
                stage.module_hash.hash(&mut hasher);
            }
            d.max_ray_recursion_depth.hash(&mut hasher);
        }
    }
    attachments.len().hash(&mut hasher);
    for attachment in attachments {
        attachment.fold(&mut hasher);
    }
    hasher.finish()
}

/// One shader-visible binding after merging every stage's reflection.
#[derive(Clone, Debug)]
pub(crate) struct MergedParameter {
    pub name: String,
    pub set: u32,
    pub binding: u32,
    pub kind: DescriptorType,
    pub count: u32,
    pub stages: ShaderStageFlags,
}

/// Merges stage reflections binding-wise: stage masks union per
/// (set, binding); kinds and counts must agree.
pub(crate) fn merge_parameters(
    stages: &[&ShaderStageDescription],
) -> Result<Vec<MergedParameter>, CompileError> {
    let mut merged: Vec<MergedParameter> = Vec::new();
    let mut index: FxHashMap<(u32, u32), usize> = FxHashMap::default();

    for stage in stages {
        let reflection = &stage.reflection;
        let stage_flag = reflection.entry_point.stage.flag();
        for parameter in &reflection.parameters {
            let key = (parameter.set, parameter.binding);
            match index.get(&key) {
                None => {
                    index.insert(key, merged.len());
                    merged.push(MergedParameter {
                        name: parameter.name.clone(),
                        set: parameter.set,
                        binding: parameter.binding,
                        kind: parameter.kind,
                        count: parameter.element_count,
                        stages: parameter.stages | stage_flag,
                    });
                }
                Some(&i) => {
                    let existing = &mut merged[i];
                    if existing.kind != parameter.kind {
                        return Err(CompileError::Pipeline(format!(
                            "binding (set {}, slot {}) is {:?} in one stage and {:?} in another",
                            parameter.set, parameter.binding, existing.kind, parameter.kind
                        )));
                    }
                    if existing.count != parameter.element_count {
                        return Err(CompileError::Pipeline(format!(
                            "binding (set {}, slot {}) disagrees on element count across stages",
                            parameter.set, parameter.binding
                        )));
                    }
                    existing.stages |= parameter.stages | stage_flag;
                }
            }
        }
    }
    Ok(merged)
}

/// Merges push constants name-wise; sizes must agree across stages.
pub(crate) fn merge_push_constants(
    stages: &[&ShaderStageDescription],
) -> Result<Vec<PushConstantRange>, CompileError> {
    let mut push_constants: Vec<PushConstantRange> = Vec::new();
    for stage in stages {
        for push in &stage.reflection.push_constants {
            match push_constants.iter_mut().find(|p| p.name == push.name) {
                None => push_constants.push(push.clone()),
                Some(existing) => {
                    if existing.size != push.size {
                        return Err(CompileError::Pipeline(format!(
                            "push constant '{}' is {} bytes in one stage and {} in another",
                            push.name, existing.size, push.size
                        )));
                    }
                    existing.stages |= push.stages;
                }
            }
        }
    }
    Ok(push_constants)
}

/// Derives the full pipeline layout from the merged reflections.
pub(crate) fn merge_pipeline_layout(
    stages: &[&ShaderStageDescription],
) -> Result<PipelineLayoutDescription, CompileError> {
    let merged = merge_parameters(stages)?;
    let push_constants = merge_push_constants(stages)?;

    let max_set = merged.iter().map(|p| p.set).max();
    let mut set_layouts =
        vec![ResourceGroupLayoutDescription::default(); max_set.map_or(0, |s| s as usize + 1)];
    for parameter in &merged {
        set_layouts[parameter.set as usize]
            .bindings
            .push(ResourceGroupLayoutBinding {
                binding: parameter.binding,
                kind: parameter.kind,
                count: parameter.count,
                stages: parameter.stages,
            });
    }
    for layout in &mut set_layouts {
        layout.bindings.sort_by_key(|b| b.binding);
    }

    Ok(PipelineLayoutDescription {
        set_layouts,
        push_constants,
    })
}

pub struct PipelineCache {
    pipelines: Mutex<FxHashMap<u64, Arc<dyn RhiPipeline>>>,
}

lazy_static! {
    static ref GLOBAL_PIPELINE_CACHE: PipelineCache = PipelineCache {
        pipelines: Mutex::new(FxHashMap::default()),
    };
}

impl PipelineCache {
    pub fn global() -> &'static PipelineCache {
        &GLOBAL_PIPELINE_CACHE
    }

    pub fn len(&self) -> usize {
        self.pipelines.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached pipeline; outstanding `Arc`s stay valid.
    pub fn clear(&self) {
        self.pipelines.lock().unwrap().clear();
    }

    /// Returns the cached pipeline for `fingerprint` or creates it.
    /// The boolean is true on a cache hit.
    pub(crate) fn get_or_create(
        &self,
        device: &dyn Device,
        fingerprint: u64,
        layout: &PipelineLayoutDescription,
        desc: &PipelineDescription,
    ) -> Result<(Arc<dyn RhiPipeline>, bool), CompileError> {
        let mut cache = self.pipelines.lock().unwrap();
        if let Some(pipeline) = cache.get(&fingerprint) {
            return Ok((pipeline.clone(), true));
        }
        let pipeline: Arc<dyn RhiPipeline> = Arc::from(
            device
                .create_pipeline(layout, desc)
                .map_err(|e| CompileError::Pipeline(e.to_string()))?,
        );
        cache.insert(fingerprint, pipeline.clone());
        Ok((pipeline, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vermeil_rhi::{ShaderParameter, ShaderReflection, ShaderStage};

    fn stage(
        stage: ShaderStage,
        module_hash: u64,
        parameters: Vec<ShaderParameter>,
        push_constants: Vec<PushConstantRange>,
    ) -> ShaderStageDescription {
        let mut reflection = ShaderReflection::new("main", stage);
        reflection.parameters = parameters;
        reflection.push_constants = push_constants;
        ShaderStageDescription {
            module_hash,
            reflection,
        }
    }

    fn parameter(name: &str, set: u32, binding: u32, kind: DescriptorType) -> ShaderParameter {
        ShaderParameter {
            name: name.to_string(),
            set,
            binding,
            kind,
            element_count: 1,
            stages: ShaderStageFlags::empty(),
        }
    }

    #[test]
    fn merge_unions_stage_masks() {
        let vertex = stage(
            ShaderStage::Vertex,
            1,
            vec![parameter("u_frame", 0, 0, DescriptorType::UniformBuffer)],
            vec![],
        );
        let fragment = stage(
            ShaderStage::Fragment,
            2,
            vec![
                parameter("u_frame", 0, 0, DescriptorType::UniformBuffer),
                parameter("u_albedo", 0, 1, DescriptorType::SampledImage),
            ],
            vec![],
        );
        let layout = merge_pipeline_layout(&[&vertex, &fragment]).unwrap();
        assert_eq!(layout.set_layouts.len(), 1);
        let bindings = &layout.set_layouts[0].bindings;
        assert_eq!(bindings.len(), 2);
        assert!(bindings[0]
            .stages
            .contains(ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT));
        assert_eq!(bindings[1].stages, ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn merge_rejects_kind_mismatch() {
        let vertex = stage(
            ShaderStage::Vertex,
            1,
            vec![parameter("a", 0, 0, DescriptorType::UniformBuffer)],
            vec![],
        );
        let fragment = stage(
            ShaderStage::Fragment,
            2,
            vec![parameter("a", 0, 0, DescriptorType::SampledImage)],
            vec![],
        );
        assert!(matches!(
            merge_pipeline_layout(&[&vertex, &fragment]),
            Err(CompileError::Pipeline(_))
        ));
    }

    #[test]
    fn merge_rejects_push_constant_size_mismatch() {
        let vertex = stage(
            ShaderStage::Vertex,
            1,
            vec![],
            vec![PushConstantRange {
                name: "pc".to_string(),
                size: 16,
                stages: ShaderStageFlags::VERTEX,
            }],
        );
        let fragment = stage(
            ShaderStage::Fragment,
            2,
            vec![],
            vec![PushConstantRange {
                name: "pc".to_string(),
                size: 32,
                stages: ShaderStageFlags::FRAGMENT,
            }],
        );
        assert!(matches!(
            merge_pipeline_layout(&[&vertex, &fragment]),
            Err(CompileError::Pipeline(_))
        ));
    }

    #[test]
    fn fingerprint_tracks_attachment_signature() {
        let compute = PipelineDescription::Compute(vermeil_rhi::ComputePipelineDescription {
            compute: stage(ShaderStage::Compute, 7, vec![], vec![]),
        });
        let a = pipeline_fingerprint(&compute, &[]);
        let b = pipeline_fingerprint(
            &compute,
            &[AttachmentSignature {
                format: Format::Rgba8Unorm,
                load: LoadOp::DontCare,
                store: StoreOp::Store,
                initial_state: ResourceState::Undefined,
                final_state: ResourceState::ColorAttachment,
            }],
        );
        assert_ne!(a, b);
    }
}
