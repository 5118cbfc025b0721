//! Shader reflection records.
//!
//! The shader front-end (compiler, on-disk reflection format) lives outside
//! this crate; the graph consumes already-parsed records. A stage is
//! identified to the backend by the hash of its compiled module.

use crate::descriptor::DescriptorType;
use crate::format::Format;
use bitflags::bitflags;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
    RayGeneration,
    Miss,
    ClosestHit,
}

bitflags! {
    #[derive(Default)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX         = 1 << 0;
        const FRAGMENT       = 1 << 1;
        const COMPUTE        = 1 << 2;
        const RAY_GENERATION = 1 << 3;
        const MISS           = 1 << 4;
        const CLOSEST_HIT    = 1 << 5;
        const ALL_GRAPHICS   = Self::VERTEX.bits | Self::FRAGMENT.bits;
    }
}

impl ShaderStage {
    pub fn flag(self) -> ShaderStageFlags {
        match self {
            ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => ShaderStageFlags::COMPUTE,
            ShaderStage::RayGeneration => ShaderStageFlags::RAY_GENERATION,
            ShaderStage::Miss => ShaderStageFlags::MISS,
            ShaderStage::ClosestHit => ShaderStageFlags::CLOSEST_HIT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntryPoint {
    pub name: String,
    pub stage: ShaderStage,
}

/// One shader-visible binding.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShaderParameter {
    pub name: String,
    pub set: u32,
    pub binding: u32,
    pub kind: DescriptorType,
    pub element_count: u32,
    pub stages: ShaderStageFlags,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    pub name: String,
    pub size: u32,
    pub stages: ShaderStageFlags,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexInput {
    pub location: u32,
    pub format: Format,
}

/// Pre-parsed description of one shader stage's interface.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShaderReflection {
    pub entry_point: EntryPoint,
    pub parameters: Vec<ShaderParameter>,
    pub push_constants: Vec<PushConstantRange>,
    pub vertex_inputs: Vec<VertexInput>,
}

impl ShaderReflection {
    pub fn new(entry_point: &str, stage: ShaderStage) -> ShaderReflection {
        ShaderReflection {
            entry_point: EntryPoint {
                name: entry_point.to_string(),
                stage,
            },
            parameters: Vec::new(),
            push_constants: Vec::new(),
            vertex_inputs: Vec::new(),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&ShaderParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// One stage of a pipeline: the module identity plus its reflection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShaderStageDescription {
    pub module_hash: u64,
    pub reflection: ShaderReflection,
}
