//! End-to-end graph scenarios against the recording null backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vermeil_graph::*;
use vermeil_rhi::*;
use vermeil_rhi_null::{NullDevice, NullImage, NullRecorder, RecordedCommand};

const MIB: u64 = 1 << 20;

fn test_device() -> (Arc<NullDevice>, Arc<dyn Device>) {
    let null = Arc::new(NullDevice::new());
    let device: Arc<dyn Device> = null.clone();
    (null, device)
}

fn image_2d(name: &str, width: u32, height: u32, format: Format) -> ImageDescription {
    ImageDescription {
        name: name.to_string(),
        dimensions: Dimensions::Dim2d { width, height },
        format,
        ..Default::default()
    }
}

fn storage_buffer(name: &str, size: u64) -> BufferDescription {
    BufferDescription {
        name: name.to_string(),
        size,
        stride: 0,
        usage: BufferUsageFlags::STORAGE,
    }
}

/// Distinct module hashes per test so the process-wide pipeline cache
/// never aliases pipelines across tests.
fn fresh_module_hash() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(0x1000);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

fn stage_desc(stage: ShaderStage, reflection: ShaderReflection) -> ShaderStageDescription {
    ShaderStageDescription {
        module_hash: fresh_module_hash(),
        reflection,
    }
}

fn plain_graphics_pipeline() -> PipelineDescription {
    PipelineDescription::Graphics(GraphicsPipelineDescription {
        vertex: stage_desc(
            ShaderStage::Vertex,
            ShaderReflection::new("main", ShaderStage::Vertex),
        ),
        fragment: stage_desc(
            ShaderStage::Fragment,
            ShaderReflection::new("main", ShaderStage::Fragment),
        ),
        rasterization: Default::default(),
        depth_stencil: Default::default(),
        color_blend: Default::default(),
    })
}

fn image_barriers<'a>(recorder: &'a NullRecorder, image: &str) -> Vec<&'a RecordedCommand> {
    recorder
        .commands()
        .iter()
        .filter(|c| matches!(c, RecordedCommand::ImageBarrier { image: name, .. } if name == image))
        .collect()
}

#[test]
fn empty_graph_compiles_and_executes_as_noop() {
    let (null, device) = test_device();
    let builder = GraphBuilder::new();
    let mut allocator = TransientAllocator::new();
    let mut graph = builder.compile(&device, &mut allocator).unwrap();

    assert!(graph.steps().is_empty());
    assert_eq!(graph.statistics().transient_memory_size, 0);
    assert_eq!(null.memory_allocations(), 0);

    let mut recorder = NullRecorder::new();
    graph.execute(&mut recorder);
    assert!(recorder.commands().is_empty());
}

#[test]
fn untouched_external_with_matching_states_needs_no_barrier() {
    let (null, device) = test_device();
    let target = Arc::new(NullImage::new(image_2d(
        "persistent",
        64,
        64,
        Format::Rgba8Unorm,
    )));
    let mut builder = GraphBuilder::new();
    builder.register_external_image(target, ExternalResourceStates::default());
    let mut allocator = TransientAllocator::new();
    let mut graph = builder.compile(&device, &mut allocator).unwrap();

    assert_eq!(graph.statistics().barrier_count, 0);
    assert_eq!(null.memory_allocations(), 0);

    let mut recorder = NullRecorder::new();
    graph.execute(&mut recorder);
    assert!(recorder.commands().is_empty());
}

#[test]
fn untouched_external_still_reaches_its_output_state() {
    let (_, device) = test_device();
    let target = Arc::new(NullImage::new(image_2d(
        "persistent",
        64,
        64,
        Format::Rgba8Unorm,
    )));
    let mut builder = GraphBuilder::new();
    builder.register_external_image(
        target,
        ExternalResourceStates {
            input_state: ResourceState::Undefined,
            output_state: ResourceState::ShaderReadOnly,
        },
    );
    let mut allocator = TransientAllocator::new();
    let mut graph = builder.compile(&device, &mut allocator).unwrap();

    let mut recorder = NullRecorder::new();
    graph.execute(&mut recorder);
    let barriers = image_barriers(&recorder, "persistent");
    assert_eq!(barriers.len(), 1);
    assert!(matches!(
        barriers[0],
        RecordedCommand::ImageBarrier {
            old_state: ResourceState::Undefined,
            new_state: ResourceState::ShaderReadOnly,
            ..
        }
    ));
}

#[test]
fn offscreen_triangle() {
    let (null, device) = test_device();
    let target = Arc::new(NullImage::new(image_2d(
        "offscreen",
        512,
        512,
        Format::Rgba8Unorm,
    )));

    let mut builder = GraphBuilder::new();
    let target = builder.register_external_image(
        target,
        ExternalResourceStates {
            input_state: ResourceState::Undefined,
            output_state: ResourceState::ShaderReadOnly,
        },
    );
    let rtv = builder.create_texture_rtv(target);
    builder.add_pass(
        "triangle",
        PassParameters::new()
            .pipeline(plain_graphics_pipeline())
            .attachments(FramebufferAttachments::new().color(
                rtv,
                LoadOp::Clear(ClearValue::Color([0.0, 0.0, 0.0, 1.0])),
                StoreOp::Store,
            )),
        PassHint::Raster,
        |recorder, _resources| recorder.draw(3, 1, 0, 0),
    );

    let mut allocator = TransientAllocator::new();
    let mut graph = builder.compile(&device, &mut allocator).unwrap();

    // no transients, no device memory
    assert_eq!(graph.statistics().transient_memory_size, 0);
    assert_eq!(null.memory_allocations(), 0);
    assert_eq!(null.framebuffers_created(), 1);

    let mut recorder = NullRecorder::new();
    graph.execute(&mut recorder);

    let barriers = image_barriers(&recorder, "offscreen");
    assert_eq!(barriers.len(), 2);
    assert!(matches!(
        barriers[0],
        RecordedCommand::ImageBarrier {
            old_state: ResourceState::Undefined,
            new_state: ResourceState::ColorAttachment,
            ..
        }
    ));
    assert!(matches!(
        barriers[1],
        RecordedCommand::ImageBarrier {
            old_state: ResourceState::ColorAttachment,
            new_state: ResourceState::ShaderReadOnly,
            ..
        }
    ));
    assert!(recorder.commands().contains(&RecordedCommand::BeginRenderPass {
        width: 512,
        height: 512,
        color_count: 1,
        has_depth: false,
    }));
    assert!(recorder.commands().contains(&RecordedCommand::Draw {
        vertex_count: 3,
        instance_count: 1,
    }));
}

#[test]
fn depth_prepass_then_lighting_then_present() {
    let (null, device) = test_device();
    let swapchain = Arc::new(NullImage::new(image_2d(
        "swapchain",
        1920,
        1080,
        Format::Bgra8Unorm,
    )));

    let mut builder = GraphBuilder::new();
    let depth = builder.create_image(image_2d("depth", 1920, 1080, Format::D32Float));
    let color = builder.create_image(image_2d("hdr", 1920, 1080, Format::Rgba16Float));
    let swapchain = builder.register_external_image(
        swapchain,
        ExternalResourceStates {
            input_state: ResourceState::Undefined,
            output_state: ResourceState::Present,
        },
    );

    let depth_rtv = builder.create_texture_rtv(depth);
    let depth_srv = builder.create_texture_srv(depth);
    let color_rtv = builder.create_texture_rtv(color);
    let color_srv = builder.create_texture_srv(color);
    let swapchain_rtv = builder.create_texture_rtv(swapchain);

    builder.add_pass(
        "depth-prepass",
        PassParameters::new().attachments(FramebufferAttachments::new().depth_stencil(
            depth_rtv,
            LoadOp::Clear(ClearValue::DepthStencil {
                depth: 1.0,
                stencil: 0,
            }),
            StoreOp::Store,
        )),
        PassHint::Raster,
        |_, _| {},
    );
    builder.add_pass(
        "lighting",
        PassParameters::new()
            .texture_srv("u_depth", depth_srv)
            .attachments(FramebufferAttachments::new().color(
                color_rtv,
                LoadOp::DontCare,
                StoreOp::Store,
            )),
        PassHint::Raster,
        |_, _| {},
    );
    builder.add_pass(
        "present-blit",
        PassParameters::new()
            .texture_srv("u_hdr", color_srv)
            .attachments(FramebufferAttachments::new().color(
                swapchain_rtv,
                LoadOp::DontCare,
                StoreOp::Store,
            )),
        PassHint::Raster,
        |_, _| {},
    );

    let mut allocator = TransientAllocator::new();
    let mut graph = builder.compile(&device, &mut allocator).unwrap();

    // both transients allocated from one block
    let allocations = graph.transient_allocations();
    assert_eq!(allocations.len(), 2);
    assert_eq!(null.memory_allocations(), 1);
    let depth_alloc = allocations.iter().find(|a| a.name == "depth").unwrap();
    let color_alloc = allocations.iter().find(|a| a.name == "hdr").unwrap();
    // lifetimes overlap at the lighting pass: byte ranges must be disjoint
    assert!(
        depth_alloc.offset + depth_alloc.size <= color_alloc.offset
            || color_alloc.offset + color_alloc.size <= depth_alloc.offset
    );

    let mut recorder = NullRecorder::new();
    graph.execute(&mut recorder);

    let depth_barriers = image_barriers(&recorder, "depth");
    assert_eq!(depth_barriers.len(), 2);
    assert!(matches!(
        depth_barriers[0],
        RecordedCommand::ImageBarrier {
            old_state: ResourceState::Undefined,
            new_state: ResourceState::DepthStencilAttachment,
            ..
        }
    ));
    assert!(matches!(
        depth_barriers[1],
        RecordedCommand::ImageBarrier {
            old_state: ResourceState::DepthStencilAttachment,
            new_state: ResourceState::ShaderReadOnly,
            ..
        }
    ));

    let swapchain_barriers = image_barriers(&recorder, "swapchain");
    assert_eq!(swapchain_barriers.len(), 2);
    assert!(matches!(
        swapchain_barriers[1],
        RecordedCommand::ImageBarrier {
            old_state: ResourceState::ColorAttachment,
            new_state: ResourceState::Present,
            ..
        }
    ));
}

#[test]
fn compute_then_sample() {
    let (_, device) = test_device();
    let mut builder = GraphBuilder::new();
    let texture = builder.create_image(image_2d("procedural", 256, 256, Format::Rgba8Unorm));
    let uav = builder.create_texture_uav(texture);
    let srv = builder.create_texture_srv(texture);

    let (width, height) = (256u32, 256u32);
    builder.add_pass(
        "generate",
        PassParameters::new().texture_uav("u_output", uav),
        PassHint::Compute,
        move |recorder, _| recorder.dispatch(width / 16, height / 16, 1),
    );
    builder.add_pass(
        "consume",
        PassParameters::new().texture_srv("u_input", srv),
        PassHint::Immediate,
        |_, _| {},
    );

    let mut allocator = TransientAllocator::new();
    let mut graph = builder.compile(&device, &mut allocator).unwrap();
    let mut recorder = NullRecorder::new();
    graph.execute(&mut recorder);

    let barriers = image_barriers(&recorder, "procedural");
    assert_eq!(barriers.len(), 2);
    assert!(matches!(
        barriers[0],
        RecordedCommand::ImageBarrier {
            old_state: ResourceState::Undefined,
            new_state: ResourceState::General,
            ..
        }
    ));
    assert!(matches!(
        barriers[1],
        RecordedCommand::ImageBarrier {
            old_state: ResourceState::General,
            new_state: ResourceState::ShaderReadOnly,
            ..
        }
    ));
    assert!(recorder
        .commands()
        .contains(&RecordedCommand::Dispatch { x: 16, y: 16, z: 1 }));
}

#[test]
fn consecutive_storage_writers_get_a_memory_barrier() {
    let (_, device) = test_device();
    let mut builder = GraphBuilder::new();
    let texture = builder.create_image(image_2d("scratch", 128, 128, Format::R32Uint));
    let uav_a = builder.create_texture_uav(texture);
    let uav_b = builder.create_texture_uav(texture);

    builder.add_pass(
        "write-a",
        PassParameters::new().texture_uav("u_data", uav_a),
        PassHint::Compute,
        |_, _| {},
    );
    builder.add_pass(
        "write-b",
        PassParameters::new().texture_uav("u_data", uav_b),
        PassHint::Compute,
        |_, _| {},
    );

    let mut allocator = TransientAllocator::new();
    let mut graph = builder.compile(&device, &mut allocator).unwrap();
    let mut recorder = NullRecorder::new();
    graph.execute(&mut recorder);

    let barriers = image_barriers(&recorder, "scratch");
    assert_eq!(barriers.len(), 2);
    assert!(matches!(
        barriers[1],
        RecordedCommand::ImageBarrier {
            old_state: ResourceState::General,
            new_state: ResourceState::General,
            ..
        }
    ));
}

#[test]
fn initial_data_image_uploads_once_before_first_read() {
    let (_, device) = test_device();
    let mut builder = GraphBuilder::new();
    let pixels = vec![0xffu8; 4 * 4 * 4];
    let texture = builder.create_image_with_data(
        image_2d("lut", 4, 4, Format::Rgba8Unorm),
        pixels.clone(),
    );
    let srv = builder.create_texture_srv(texture);
    builder.add_pass(
        "consume",
        PassParameters::new().texture_srv("u_lut", srv),
        PassHint::Immediate,
        |_, _| {},
    );

    let mut allocator = TransientAllocator::new();
    let mut graph = builder.compile(&device, &mut allocator).unwrap();

    assert_eq!(graph.statistics().upload_count, 1);
    assert!(matches!(
        graph.steps(),
        [Step::Upload { .. }, Step::Barriers(_), Step::Pass(0)]
    ));

    let mut recorder = NullRecorder::new();
    graph.execute(&mut recorder);

    let commands = recorder.commands();
    assert!(matches!(
        commands[0],
        RecordedCommand::ImageBarrier {
            old_state: ResourceState::Undefined,
            new_state: ResourceState::TransferDst,
            ..
        }
    ));
    assert_eq!(
        commands[1],
        RecordedCommand::CopyBufferToImage {
            image: "lut".to_string()
        }
    );
    assert!(matches!(
        commands[2],
        RecordedCommand::ImageBarrier {
            old_state: ResourceState::TransferDst,
            new_state: ResourceState::ShaderReadOnly,
            ..
        }
    ));
}

#[test]
fn disjoint_buffer_lifetimes_share_one_mebibyte() {
    let (null, device) = test_device();
    let mut builder = GraphBuilder::new();
    let a = builder.create_buffer(storage_buffer("a", MIB));
    let b = builder.create_buffer(storage_buffer("b", MIB));
    let c = builder.create_buffer(storage_buffer("c", MIB));
    let a_uav = builder.create_buffer_uav(a);
    let b_uav = builder.create_buffer_uav(b);
    let c_uav = builder.create_buffer_uav(c);

    for (name, uav) in [("p0", a_uav), ("p1", b_uav), ("p2", c_uav)] {
        builder.add_pass(
            name,
            PassParameters::new().buffer_uav("u_data", uav),
            PassHint::Compute,
            |_, _| {},
        );
    }

    let mut allocator = TransientAllocator::new();
    let graph = builder.compile(&device, &mut allocator).unwrap();
    assert_eq!(graph.statistics().transient_memory_size, MIB);
    assert_eq!(null.allocated_bytes(), MIB);
    for allocation in graph.transient_allocations() {
        assert_eq!(allocation.offset, 0);
    }
}

#[test]
fn pairwise_overlapping_buffers_cannot_alias() {
    let (_, device) = test_device();
    let mut builder = GraphBuilder::new();
    let a = builder.create_buffer(storage_buffer("a", MIB));
    let b = builder.create_buffer(storage_buffer("b", MIB));
    let c = builder.create_buffer(storage_buffer("c", MIB));
    let a_uav = builder.create_buffer_uav(a);
    let b_uav = builder.create_buffer_uav(b);
    let c_uav = builder.create_buffer_uav(c);

    // intervals: a = [0,1], b = [0,2], c = [1,2]
    builder.add_pass(
        "p0",
        PassParameters::new()
            .buffer_uav("u_a", a_uav)
            .buffer_uav("u_b", b_uav),
        PassHint::Compute,
        |_, _| {},
    );
    builder.add_pass(
        "p1",
        PassParameters::new()
            .buffer_uav("u_a", a_uav)
            .buffer_uav("u_c", c_uav),
        PassHint::Compute,
        |_, _| {},
    );
    builder.add_pass(
        "p2",
        PassParameters::new()
            .buffer_uav("u_b", b_uav)
            .buffer_uav("u_c", c_uav),
        PassHint::Compute,
        |_, _| {},
    );

    let mut allocator = TransientAllocator::new();
    let graph = builder.compile(&device, &mut allocator).unwrap();
    assert_eq!(graph.statistics().transient_memory_size, 3 * MIB);
}

#[test]
fn identical_bindings_share_one_descriptor_set() {
    let (null, device) = test_device();
    let mut builder = GraphBuilder::new();
    let texture = builder.create_image(image_2d("shared", 64, 64, Format::Rgba8Unorm));
    let srv = builder.create_texture_srv(texture);

    let mut reflection = ShaderReflection::new("main", ShaderStage::Compute);
    reflection.parameters = vec![
        ShaderParameter {
            name: "u_tex".to_string(),
            set: 0,
            binding: 0,
            kind: DescriptorType::SampledImage,
            element_count: 1,
            stages: ShaderStageFlags::COMPUTE,
        },
        ShaderParameter {
            name: "u_samp".to_string(),
            set: 0,
            binding: 1,
            kind: DescriptorType::Sampler,
            element_count: 1,
            stages: ShaderStageFlags::COMPUTE,
        },
    ];
    let pipeline = PipelineDescription::Compute(ComputePipelineDescription {
        compute: stage_desc(ShaderStage::Compute, reflection),
    });

    // seed pass so the texture is written before it is sampled
    let uav = builder.create_texture_uav(texture);
    builder.add_pass(
        "seed",
        PassParameters::new().texture_uav("u_out", uav),
        PassHint::Compute,
        |_, _| {},
    );
    for name in ["first", "second"] {
        builder.add_pass(
            name,
            PassParameters::new()
                .pipeline(pipeline.clone())
                .texture_srv("u_tex", srv)
                .sampler("u_samp", SamplerDescription::LINEAR_MIPMAP_LINEAR),
            PassHint::Compute,
            |_, _| {},
        );
    }

    let mut allocator = TransientAllocator::new();
    let graph = builder.compile(&device, &mut allocator).unwrap();

    assert_eq!(graph.statistics().descriptor_sets_created, 1);
    assert_eq!(graph.statistics().descriptor_sets_reused, 1);
    assert_eq!(null.descriptor_sets_created(), 1);
}

#[test]
fn cubemap_faces_transition_per_layer() {
    let (_, device) = test_device();
    let hdr = Arc::new(NullImage::new(ImageDescription {
        name: "environment".to_string(),
        dimensions: Dimensions::Cubemap { size: 256 },
        format: Format::Rgba16Float,
        ..Default::default()
    }));

    let mut builder = GraphBuilder::new();
    let environment = builder.register_external_image(hdr, ExternalResourceStates::default());
    let environment_srv = builder.create_texture_srv(environment);
    let irradiance = builder.create_image(ImageDescription {
        name: "irradiance".to_string(),
        dimensions: Dimensions::Cubemap { size: 32 },
        format: Format::Rgba16Float,
        ..Default::default()
    });

    for face in 0..6u32 {
        let face_rtv = builder.create_texture_rtv_with(
            irradiance,
            None,
            ImageViewRange::single_layer(face),
        );
        builder.add_pass(
            &format!("convolve-face-{}", face),
            PassParameters::new()
                .texture_srv("u_environment", environment_srv)
                .attachments(FramebufferAttachments::new().color(
                    face_rtv,
                    LoadOp::DontCare,
                    StoreOp::Store,
                )),
            PassHint::Raster,
            |_, _| {},
        );
    }
    let mut consume = PassParameters::new();
    for face in 0..6u32 {
        let face_srv = builder.create_texture_srv_with(
            irradiance,
            None,
            ImageViewRange::single_layer(face),
        );
        consume = consume.texture_srv(&format!("u_face_{}", face), face_srv);
    }
    builder.add_pass("consume", consume, PassHint::Immediate, |_, _| {});

    let mut allocator = TransientAllocator::new();
    let mut graph = builder.compile(&device, &mut allocator).unwrap();
    let mut recorder = NullRecorder::new();
    graph.execute(&mut recorder);

    let barriers = image_barriers(&recorder, "irradiance");
    assert_eq!(barriers.len(), 12);
    for (face, barrier) in barriers[..6].iter().enumerate() {
        assert!(matches!(
            barrier,
            RecordedCommand::ImageBarrier {
                old_state: ResourceState::Undefined,
                new_state: ResourceState::ColorAttachment,
                base_layer,
                layer_count: 1,
                ..
            } if *base_layer == face as u32
        ));
    }
    for (face, barrier) in barriers[6..].iter().enumerate() {
        assert!(matches!(
            barrier,
            RecordedCommand::ImageBarrier {
                old_state: ResourceState::ColorAttachment,
                new_state: ResourceState::ShaderReadOnly,
                base_layer,
                layer_count: 1,
                ..
            } if *base_layer == face as u32
        ));
    }
    // the environment cubemap enters and stays in its read state
    assert!(image_barriers(&recorder, "environment").is_empty());
}

#[test]
fn rebuilding_reproduces_offsets() {
    fn build(device: &Arc<dyn Device>) -> Vec<(String, u64, u64)> {
        let mut builder = GraphBuilder::new();
        let a = builder.create_buffer(storage_buffer("a", 3 * MIB));
        let b = builder.create_buffer(storage_buffer("b", MIB));
        let c = builder.create_buffer(storage_buffer("c", 2 * MIB));
        let views: Vec<_> = [a, b, c]
            .iter()
            .map(|&h| builder.create_buffer_uav(h))
            .collect();
        builder.add_pass(
            "p0",
            PassParameters::new()
                .buffer_uav("u_a", views[0])
                .buffer_uav("u_b", views[1]),
            PassHint::Compute,
            |_, _| {},
        );
        builder.add_pass(
            "p1",
            PassParameters::new()
                .buffer_uav("u_b", views[1])
                .buffer_uav("u_c", views[2]),
            PassHint::Compute,
            |_, _| {},
        );
        let mut allocator = TransientAllocator::new();
        let graph = builder.compile(device, &mut allocator).unwrap();
        graph
            .transient_allocations()
            .iter()
            .map(|a| (a.name.clone(), a.offset, a.size))
            .collect()
    }

    let (_, device) = test_device();
    assert_eq!(build(&device), build(&device));
}

#[test]
fn gpu_markers_wrap_passes_with_debug_labels() {
    let (_, device) = test_device();
    let mut builder = GraphBuilder::new();
    builder.begin_gpu_marker("frame");
    builder.add_pass(
        "inner",
        PassParameters::new(),
        PassHint::Immediate,
        |_, _| {},
    );
    builder.end_gpu_marker();

    let mut allocator = TransientAllocator::new();
    let mut graph = builder.compile(&device, &mut allocator).unwrap();
    let mut recorder = NullRecorder::new();
    graph.execute(&mut recorder);

    assert_eq!(
        recorder.commands(),
        &[
            RecordedCommand::BeginDebugLabel("frame".to_string()),
            RecordedCommand::EndDebugLabel,
        ]
    );
}

#[test]
fn push_constants_validate_against_the_pipeline() {
    let (_, device) = test_device();
    let mut reflection = ShaderReflection::new("main", ShaderStage::Compute);
    reflection.push_constants = vec![PushConstantRange {
        name: "u_push".to_string(),
        size: 16,
        stages: ShaderStageFlags::COMPUTE,
    }];
    let pipeline = PipelineDescription::Compute(ComputePipelineDescription {
        compute: stage_desc(ShaderStage::Compute, reflection),
    });

    let mut builder = GraphBuilder::new();
    builder.add_pass(
        "dispatch",
        PassParameters::new().pipeline(pipeline),
        PassHint::Compute,
        |recorder, resources| {
            resources.push_constants(recorder, "u_push", &[0u8; 16]);
            recorder.dispatch(1, 1, 1);
        },
    );

    let mut allocator = TransientAllocator::new();
    let mut graph = builder.compile(&device, &mut allocator).unwrap();
    let mut recorder = NullRecorder::new();
    graph.execute(&mut recorder);

    assert!(recorder.commands().contains(&RecordedCommand::PushConstants {
        stages: ShaderStageFlags::COMPUTE,
        offset: 0,
        size: 16,
    }));
}

#[test]
fn dump_describes_the_schedule() {
    let (_, device) = test_device();
    let mut builder = GraphBuilder::new();
    let buffer = builder.create_buffer(storage_buffer("scratch", 1024));
    let uav = builder.create_buffer_uav(buffer);
    builder.add_pass(
        "fill",
        PassParameters::new().buffer_uav("u_data", uav),
        PassHint::Compute,
        |_, _| {},
    );

    let mut allocator = TransientAllocator::new();
    let graph = builder.compile(&device, &mut allocator).unwrap();
    let mut output = Vec::new();
    graph.dump(&mut output).unwrap();
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("pass 'fill'"));
    assert!(text.contains("scratch"));
}
