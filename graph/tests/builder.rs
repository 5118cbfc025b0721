//! Declaration-surface and error-path tests.

use std::sync::Arc;
use vermeil_graph::*;
use vermeil_rhi::*;
use vermeil_rhi_null::{NullDevice, NullImage};

fn test_device() -> Arc<dyn Device> {
    Arc::new(NullDevice::new())
}

fn image_2d(name: &str, width: u32, height: u32, format: Format) -> ImageDescription {
    ImageDescription {
        name: name.to_string(),
        dimensions: Dimensions::Dim2d { width, height },
        format,
        ..Default::default()
    }
}

fn compile(builder: GraphBuilder) -> Result<Graph, CompileError> {
    let device = test_device();
    let mut allocator = TransientAllocator::new();
    builder.compile(&device, &mut allocator)
}

#[test]
fn external_registration_is_idempotent() {
    let image: Arc<dyn RhiImage> = Arc::new(NullImage::new(image_2d(
        "shared",
        32,
        32,
        Format::Rgba8Unorm,
    )));
    let mut builder = GraphBuilder::new();
    let first = builder.register_external_image(image.clone(), ExternalResourceStates::default());
    let second = builder.register_external_image(image, ExternalResourceStates::default());
    assert_eq!(first, second);
    assert!(compile(builder).is_ok());
}

#[test]
fn conflicting_external_registration_fails_the_build() {
    let image: Arc<dyn RhiImage> = Arc::new(NullImage::new(image_2d(
        "shared",
        32,
        32,
        Format::Rgba8Unorm,
    )));
    let mut builder = GraphBuilder::new();
    builder.register_external_image(image.clone(), ExternalResourceStates::default());
    builder.register_external_image(
        image,
        ExternalResourceStates {
            input_state: ResourceState::Undefined,
            output_state: ResourceState::Present,
        },
    );
    assert!(matches!(
        compile(builder),
        Err(CompileError::Declaration(_))
    ));
}

#[test]
fn color_attachment_cap_is_enforced() {
    let mut builder = GraphBuilder::new();
    let mut attachments = FramebufferAttachments::new();
    for i in 0..(MAX_COLOR_ATTACHMENTS + 1) {
        let image = builder.create_image(image_2d(
            &format!("target{}", i),
            64,
            64,
            Format::Rgba8Unorm,
        ));
        let rtv = builder.create_texture_rtv(image);
        attachments = attachments.color(rtv, LoadOp::DontCare, StoreOp::Store);
    }
    builder.add_pass(
        "overflow",
        PassParameters::new().attachments(attachments),
        PassHint::Raster,
        |_, _| {},
    );
    assert!(matches!(
        compile(builder),
        Err(CompileError::Declaration(_))
    ));
}

#[test]
fn duplicate_attachment_blocks_fail_the_build() {
    let mut builder = GraphBuilder::new();
    let image = builder.create_image(image_2d("target", 64, 64, Format::Rgba8Unorm));
    let rtv = builder.create_texture_rtv(image);
    builder.add_pass(
        "twice",
        PassParameters::new()
            .attachments(FramebufferAttachments::new().color(
                rtv,
                LoadOp::DontCare,
                StoreOp::Store,
            ))
            .attachments(FramebufferAttachments::new().color(
                rtv,
                LoadOp::DontCare,
                StoreOp::Store,
            )),
        PassHint::Raster,
        |_, _| {},
    );
    assert!(matches!(
        compile(builder),
        Err(CompileError::Declaration(_))
    ));
}

#[test]
fn foreign_handles_are_rejected() {
    let mut other = GraphBuilder::new();
    let foreign_image = other.create_image(image_2d("foreign", 16, 16, Format::Rgba8Unorm));
    let foreign_view = other.create_texture_srv(foreign_image);

    let mut builder = GraphBuilder::new();
    builder.add_pass(
        "use-foreign",
        PassParameters::new().texture_srv("u_tex", foreign_view),
        PassHint::Immediate,
        |_, _| {},
    );
    assert!(matches!(
        compile(builder),
        Err(CompileError::Declaration(_))
    ));
}

#[test]
fn invalid_default_handles_never_resolve() {
    let mut builder = GraphBuilder::new();
    builder.add_pass(
        "bad",
        PassParameters::new().texture_srv("u_tex", ImageViewHandle::INVALID),
        PassHint::Immediate,
        |_, _| {},
    );
    assert!(matches!(
        compile(builder),
        Err(CompileError::Declaration(_))
    ));
}

#[test]
fn same_pass_read_write_conflict_is_an_analysis_error() {
    let mut builder = GraphBuilder::new();
    let image = builder.create_image(image_2d("scratch", 64, 64, Format::Rgba8Unorm));
    let srv = builder.create_texture_srv(image);
    let uav = builder.create_texture_uav(image);
    builder.add_pass(
        "conflicted",
        PassParameters::new()
            .texture_srv("u_in", srv)
            .texture_uav("u_out", uav),
        PassHint::Compute,
        |_, _| {},
    );
    assert!(matches!(compile(builder), Err(CompileError::Analysis(_))));
}

#[test]
fn storage_and_attachment_roles_cannot_mix() {
    let mut builder = GraphBuilder::new();
    let image = builder.create_image(image_2d("mixed", 64, 64, Format::Rgba8Unorm));
    let uav = builder.create_texture_uav(image);
    let rtv = builder.create_texture_rtv(image);
    builder.add_pass(
        "write-storage",
        PassParameters::new().texture_uav("u_out", uav),
        PassHint::Compute,
        |_, _| {},
    );
    builder.add_pass(
        "write-attachment",
        PassParameters::new().attachments(FramebufferAttachments::new().color(
            rtv,
            LoadOp::DontCare,
            StoreOp::Store,
        )),
        PassHint::Raster,
        |_, _| {},
    );
    assert!(matches!(compile(builder), Err(CompileError::Analysis(_))));
}

#[test]
fn attachment_dimensions_must_match() {
    let mut builder = GraphBuilder::new();
    let big = builder.create_image(image_2d("big", 128, 128, Format::Rgba8Unorm));
    let small = builder.create_image(image_2d("small", 64, 64, Format::D32Float));
    let big_rtv = builder.create_texture_rtv(big);
    let small_rtv = builder.create_texture_rtv(small);
    builder.add_pass(
        "mismatched",
        PassParameters::new().attachments(
            FramebufferAttachments::new()
                .color(big_rtv, LoadOp::DontCare, StoreOp::Store)
                .depth_stencil(small_rtv, LoadOp::DontCare, StoreOp::Store),
        ),
        PassHint::Raster,
        |_, _| {},
    );
    assert!(matches!(
        compile(builder),
        Err(CompileError::Declaration(_))
    ));
}

#[test]
fn mip_base_scales_the_framebuffer_dimensions() {
    let mut builder = GraphBuilder::new();
    let mipped = builder.create_image(ImageDescription {
        mipmaps: MipmapsCount::Log2,
        ..image_2d("mipped", 512, 512, Format::Rgba8Unorm)
    });
    let flat = builder.create_image(image_2d("flat", 256, 256, Format::D32Float));
    let mip1_rtv =
        builder.create_texture_rtv_with(mipped, None, ImageViewRange::single_mip(1));
    let flat_rtv = builder.create_texture_rtv(flat);
    builder.add_pass(
        "halved",
        PassParameters::new().attachments(
            FramebufferAttachments::new()
                .color(mip1_rtv, LoadOp::DontCare, StoreOp::Store)
                .depth_stencil(flat_rtv, LoadOp::DontCare, StoreOp::Store),
        ),
        PassHint::Raster,
        |_, _| {},
    );
    assert!(compile(builder).is_ok());
}

#[test]
fn depth_format_cannot_be_a_color_attachment() {
    let mut builder = GraphBuilder::new();
    let depth = builder.create_image(image_2d("depth", 64, 64, Format::D32Float));
    let rtv = builder.create_texture_rtv(depth);
    builder.add_pass(
        "wrong-slot",
        PassParameters::new().attachments(FramebufferAttachments::new().color(
            rtv,
            LoadOp::DontCare,
            StoreOp::Store,
        )),
        PassHint::Raster,
        |_, _| {},
    );
    assert!(matches!(
        compile(builder),
        Err(CompileError::Declaration(_))
    ));
}

#[test]
fn hint_and_pipeline_kind_must_agree() {
    let compute = PipelineDescription::Compute(ComputePipelineDescription {
        compute: ShaderStageDescription {
            module_hash: 0xdead,
            reflection: ShaderReflection::new("main", ShaderStage::Compute),
        },
    });
    let mut builder = GraphBuilder::new();
    builder.add_pass(
        "mismatched",
        PassParameters::new().pipeline(compute),
        PassHint::Raster,
        |_, _| {},
    );
    assert!(matches!(compile(builder), Err(CompileError::Pipeline(_))));
}

#[test]
fn missing_parameter_for_shader_binding_is_a_pipeline_error() {
    let mut reflection = ShaderReflection::new("main", ShaderStage::Compute);
    reflection.parameters = vec![ShaderParameter {
        name: "u_missing".to_string(),
        set: 0,
        binding: 0,
        kind: DescriptorType::StorageImage,
        element_count: 1,
        stages: ShaderStageFlags::COMPUTE,
    }];
    let pipeline = PipelineDescription::Compute(ComputePipelineDescription {
        compute: ShaderStageDescription {
            module_hash: 0xbeef,
            reflection,
        },
    });
    let mut builder = GraphBuilder::new();
    builder.add_pass(
        "incomplete",
        PassParameters::new().pipeline(pipeline),
        PassHint::Compute,
        |_, _| {},
    );
    assert!(matches!(compile(builder), Err(CompileError::Pipeline(_))));
}

#[test]
fn parameter_kind_must_match_reflection() {
    let mut builder = GraphBuilder::new();
    let image = builder.create_image(image_2d("tex", 16, 16, Format::Rgba8Unorm));
    let srv = builder.create_texture_srv(image);

    let mut reflection = ShaderReflection::new("main", ShaderStage::Compute);
    reflection.parameters = vec![ShaderParameter {
        name: "u_tex".to_string(),
        set: 0,
        binding: 0,
        kind: DescriptorType::StorageImage,
        element_count: 1,
        stages: ShaderStageFlags::COMPUTE,
    }];
    let pipeline = PipelineDescription::Compute(ComputePipelineDescription {
        compute: ShaderStageDescription {
            module_hash: 0xf00d,
            reflection,
        },
    });
    builder.add_pass(
        "mismatched-kind",
        PassParameters::new()
            .pipeline(pipeline)
            .texture_srv("u_tex", srv),
        PassHint::Compute,
        |_, _| {},
    );
    assert!(matches!(compile(builder), Err(CompileError::Pipeline(_))));
}

#[test]
fn structurally_identical_groups_share_a_handle() {
    let mut builder = GraphBuilder::new();
    let image = builder.create_image(image_2d("tex", 16, 16, Format::Rgba8Unorm));
    let srv = builder.create_texture_srv(image);
    let first = builder.create_resource_group(ResourceGroupDescription::new().entry(
        0,
        ShaderStageFlags::FRAGMENT,
        GroupResource::TextureSrv(srv),
    ));
    let second = builder.create_resource_group(ResourceGroupDescription::new().entry(
        0,
        ShaderStageFlags::FRAGMENT,
        GroupResource::TextureSrv(srv),
    ));
    assert_eq!(first, second);
}

#[test]
fn unused_transients_are_excluded_from_allocation() {
    let device = test_device();
    let mut builder = GraphBuilder::new();
    builder.create_image(image_2d("orphan", 1024, 1024, Format::Rgba32Float));
    let mut allocator = TransientAllocator::new();
    let graph = builder.compile(&device, &mut allocator).unwrap();
    assert_eq!(graph.statistics().transient_memory_size, 0);
    assert!(graph.transient_allocations().is_empty());
}
