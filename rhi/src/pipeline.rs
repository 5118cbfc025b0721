//! Fixed-function state and pipeline descriptions.
//!
//! Every state type here is `Eq + Hash` bit-exactly (floats are `NotNan`)
//! so a pipeline description can serve as a cache key.

use crate::descriptor::ResourceGroupLayoutDescription;
use crate::reflect::{PushConstantRange, ShaderStageDescription};
use bitflags::bitflags;
use ordered_float::NotNan;

bitflags! {
    #[derive(Default)]
    pub struct CullModeFlags: u32 {
        const NONE = 0;
        const FRONT = 1;
        const BACK = 2;
        const FRONT_AND_BACK = Self::FRONT.bits | Self::BACK.bits;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PolygonMode {
    Line,
    Fill,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FrontFace {
    Clockwise,
    CounterClockwise,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DepthBias {
    Disabled,
    Enabled {
        constant_factor: NotNan<f32>,
        clamp: NotNan<f32>,
        slope_factor: NotNan<f32>,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct RasterizationState {
    pub depth_clamp_enable: bool,
    pub rasterizer_discard_enable: bool,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullModeFlags,
    pub depth_bias: DepthBias,
    pub front_face: FrontFace,
    pub line_width: NotNan<f32>,
}

impl Default for RasterizationState {
    fn default() -> Self {
        RasterizationState {
            depth_clamp_enable: false,
            rasterizer_discard_enable: false,
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullModeFlags::NONE,
            depth_bias: DepthBias::Disabled,
            front_face: FrontFace::CounterClockwise,
            line_width: 1.0f32.into(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementAndClamp,
    DecrementAndClamp,
    Invert,
    IncrementAndWrap,
    DecrementAndWrap,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct StencilOpState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum StencilTest {
    Disabled,
    Enabled {
        front: StencilOpState,
        back: StencilOpState,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DepthBoundsTest {
    Disabled,
    Enabled {
        min_depth_bounds: NotNan<f32>,
        max_depth_bounds: NotNan<f32>,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct DepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: CompareOp,
    pub depth_bounds_test: DepthBoundsTest,
    pub stencil_test: StencilTest,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        DepthStencilState {
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare_op: CompareOp::Less,
            depth_bounds_test: DepthBoundsTest::Disabled,
            stencil_test: StencilTest::Disabled,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LogicOp {
    Clear,
    And,
    Copy,
    NoOp,
    Xor,
    Or,
    Invert,
    Set,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    SrcAlphaSaturate,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

bitflags! {
    pub struct ColorComponentFlags: u32 {
        const R = 0b0001;
        const G = 0b0010;
        const B = 0b0100;
        const A = 0b1000;
        const ALL = Self::R.bits | Self::G.bits | Self::B.bits | Self::A.bits;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ColorBlendAttachmentState {
    Disabled,
    Enabled {
        src_color_blend_factor: BlendFactor,
        dst_color_blend_factor: BlendFactor,
        color_blend_op: BlendOp,
        src_alpha_blend_factor: BlendFactor,
        dst_alpha_blend_factor: BlendFactor,
        alpha_blend_op: BlendOp,
        color_write_mask: ColorComponentFlags,
    },
}

impl ColorBlendAttachmentState {
    pub const ALPHA_BLENDING: ColorBlendAttachmentState = ColorBlendAttachmentState::Enabled {
        color_blend_op: BlendOp::Add,
        src_color_blend_factor: BlendFactor::SrcAlpha,
        dst_color_blend_factor: BlendFactor::OneMinusSrcAlpha,
        alpha_blend_op: BlendOp::Add,
        src_alpha_blend_factor: BlendFactor::SrcAlpha,
        dst_alpha_blend_factor: BlendFactor::OneMinusSrcAlpha,
        color_write_mask: ColorComponentFlags::ALL,
    };
}

impl Default for ColorBlendAttachmentState {
    fn default() -> Self {
        ColorBlendAttachmentState::Disabled
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ColorBlendState {
    pub logic_op: Option<LogicOp>,
    /// One entry per color attachment; an empty list means blending
    /// disabled everywhere.
    pub attachments: Vec<ColorBlendAttachmentState>,
    pub blend_constants: [NotNan<f32>; 4],
}

impl Default for ColorBlendState {
    fn default() -> Self {
        ColorBlendState {
            logic_op: None,
            attachments: Vec::new(),
            blend_constants: [
                0.0f32.into(),
                0.0f32.into(),
                0.0f32.into(),
                0.0f32.into(),
            ],
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl From<(u32, u32)> for Viewport {
    fn from((w, h): (u32, u32)) -> Self {
        Viewport {
            x: 0.0,
            y: 0.0,
            width: w as f32,
            height: h as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl From<(u32, u32)> for ScissorRect {
    fn from((w, h): (u32, u32)) -> Self {
        ScissorRect {
            x: 0,
            y: 0,
            width: w,
            height: h,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct GraphicsPipelineDescription {
    pub vertex: ShaderStageDescription,
    pub fragment: ShaderStageDescription,
    pub rasterization: RasterizationState,
    pub depth_stencil: DepthStencilState,
    pub color_blend: ColorBlendState,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ComputePipelineDescription {
    pub compute: ShaderStageDescription,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RayTracingPipelineDescription {
    pub raygen: ShaderStageDescription,
    pub miss: Vec<ShaderStageDescription>,
    pub closest_hit: Vec<ShaderStageDescription>,
    pub max_ray_recursion_depth: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum PipelineDescription {
    Graphics(GraphicsPipelineDescription),
    Compute(ComputePipelineDescription),
    RayTracing(RayTracingPipelineDescription),
}

impl PipelineDescription {
    /// All stages involved, in a fixed order.
    pub fn stages(&self) -> Vec<&ShaderStageDescription> {
        match self {
            PipelineDescription::Graphics(d) => vec![&d.vertex, &d.fragment],
            PipelineDescription::Compute(d) => vec![&d.compute],
            PipelineDescription::RayTracing(d) => {
                let mut stages = vec![&d.raygen];
                stages.extend(d.miss.iter());
                stages.extend(d.closest_hit.iter());
                stages
            }
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            PipelineDescription::Graphics(_) => "graphics",
            PipelineDescription::Compute(_) => "compute",
            PipelineDescription::RayTracing(_) => "ray-tracing",
        }
    }
}

/// Descriptor-set layouts plus push-constant ranges, merged over all
/// stages of one pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PipelineLayoutDescription {
    /// Indexed by set number; empty sets hold no bindings.
    pub set_layouts: Vec<ResourceGroupLayoutDescription>,
    pub push_constants: Vec<PushConstantRange>,
}
