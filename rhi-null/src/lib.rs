//! Headless backend.
//!
//! Implements the full capability set against no GPU at all: every
//! creation call returns a recording object and every recorder call is
//! appended to a typed command log. The test suite asserts against the
//! logs and creation counters; backend authors can diff their
//! implementation's behavior against this one.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use vermeil_rhi::{
    BarrierDesc, BufferDescription, BufferViewDescription, CommandRecorder, DescriptorWrite,
    Device, ImageDescription, ImageViewDescription, MemoryPropertyFlags, PipelineDescription,
    PipelineLayoutDescription, RenderPassBeginInfo, ResourceGroupLayoutDescription, ResourceState,
    RhiAccelerationStructure, RhiBuffer, RhiBufferView, RhiDescriptorSet, RhiDescriptorSetLayout,
    RhiDeviceMemory, RhiError, RhiFence, RhiFramebuffer, RhiImage, RhiImageView, RhiPipeline,
    RhiSampler, RhiSemaphore, SamplerDescription, ScissorRect, ShaderStageFlags, Viewport,
};

pub struct NullImage {
    desc: ImageDescription,
    bound_offset: Mutex<Option<u64>>,
}

impl NullImage {
    pub fn new(desc: ImageDescription) -> NullImage {
        NullImage {
            desc,
            bound_offset: Mutex::new(None),
        }
    }

    /// Offset this image was bound at, if any.
    pub fn bound_offset(&self) -> Option<u64> {
        *self.bound_offset.lock().unwrap()
    }
}

impl RhiImage for NullImage {
    fn description(&self) -> &ImageDescription {
        &self.desc
    }
}

pub struct NullBuffer {
    desc: BufferDescription,
    bound_offset: Mutex<Option<u64>>,
    data: Mutex<Vec<u8>>,
}

impl NullBuffer {
    pub fn new(desc: BufferDescription) -> NullBuffer {
        NullBuffer {
            desc,
            bound_offset: Mutex::new(None),
            data: Mutex::new(Vec::new()),
        }
    }

    pub fn bound_offset(&self) -> Option<u64> {
        *self.bound_offset.lock().unwrap()
    }

    /// Bytes written through `Device::write_buffer`.
    pub fn written_data(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

impl RhiBuffer for NullBuffer {
    fn description(&self) -> &BufferDescription {
        &self.desc
    }
}

pub struct NullImageView {
    pub desc: ImageViewDescription,
    /// Name of the image the view was created against.
    pub image_name: String,
}

impl RhiImageView for NullImageView {}

pub struct NullBufferView {
    pub desc: BufferViewDescription,
    pub buffer_name: String,
}

impl RhiBufferView for NullBufferView {}

pub struct NullSampler {
    pub desc: SamplerDescription,
}

impl RhiSampler for NullSampler {}

pub struct NullPipeline {
    pub kind: &'static str,
    pub layout: PipelineLayoutDescription,
}

impl RhiPipeline for NullPipeline {}

pub struct NullFramebuffer {
    pub width: u32,
    pub height: u32,
    pub color_count: usize,
    pub has_depth: bool,
}

impl RhiFramebuffer for NullFramebuffer {}

pub struct NullDescriptorSetLayout {
    pub desc: ResourceGroupLayoutDescription,
}

impl RhiDescriptorSetLayout for NullDescriptorSetLayout {}

pub struct NullDescriptorSet {
    /// (binding, descriptor kind) of each write, in order.
    pub writes: Vec<(u32, vermeil_rhi::DescriptorType)>,
}

impl RhiDescriptorSet for NullDescriptorSet {}

#[derive(Default)]
pub struct NullAccelerationStructure;

impl NullAccelerationStructure {
    pub fn new() -> NullAccelerationStructure {
        NullAccelerationStructure
    }
}

impl RhiAccelerationStructure for NullAccelerationStructure {}

pub struct NullDeviceMemory {
    size: u64,
}

impl RhiDeviceMemory for NullDeviceMemory {
    fn size(&self) -> u64 {
        self.size
    }
}

pub struct NullFence {
    signaled: AtomicBool,
}

impl RhiFence for NullFence {
    fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    fn wait(&self) {
        // nothing ever signals from a null GPU; report immediately
        self.signaled.store(true, Ordering::Release);
    }

    fn reset(&self) {
        self.signaled.store(false, Ordering::Release);
    }
}

pub struct NullSemaphore;

impl RhiSemaphore for NullSemaphore {}

/// Creation counters of a [`NullDevice`].
#[derive(Default)]
pub struct Counters {
    pub images: AtomicUsize,
    pub buffers: AtomicUsize,
    pub image_views: AtomicUsize,
    pub buffer_views: AtomicUsize,
    pub samplers: AtomicUsize,
    pub descriptor_set_layouts: AtomicUsize,
    pub descriptor_sets: AtomicUsize,
    pub framebuffers: AtomicUsize,
    pub pipelines: AtomicUsize,
    pub memory_allocations: AtomicUsize,
    pub allocated_bytes: AtomicU64,
}

#[derive(Default)]
pub struct NullDevice {
    counters: Counters,
}

impl NullDevice {
    pub fn new() -> NullDevice {
        Default::default()
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn images_created(&self) -> usize {
        self.counters.images.load(Ordering::Relaxed)
    }

    pub fn buffers_created(&self) -> usize {
        self.counters.buffers.load(Ordering::Relaxed)
    }

    pub fn descriptor_sets_created(&self) -> usize {
        self.counters.descriptor_sets.load(Ordering::Relaxed)
    }

    pub fn framebuffers_created(&self) -> usize {
        self.counters.framebuffers.load(Ordering::Relaxed)
    }

    pub fn pipelines_created(&self) -> usize {
        self.counters.pipelines.load(Ordering::Relaxed)
    }

    pub fn memory_allocations(&self) -> usize {
        self.counters.memory_allocations.load(Ordering::Relaxed)
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.counters.allocated_bytes.load(Ordering::Relaxed)
    }
}

impl Device for NullDevice {
    fn create_image(&self, desc: &ImageDescription) -> Result<Box<dyn RhiImage>, RhiError> {
        self.counters.images.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(NullImage::new(desc.clone())))
    }

    fn create_buffer(&self, desc: &BufferDescription) -> Result<Box<dyn RhiBuffer>, RhiError> {
        self.counters.buffers.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(NullBuffer::new(desc.clone())))
    }

    fn create_sampler(&self, desc: &SamplerDescription) -> Result<Box<dyn RhiSampler>, RhiError> {
        self.counters.samplers.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(NullSampler { desc: *desc }))
    }

    fn create_image_view(
        &self,
        image: &dyn RhiImage,
        desc: &ImageViewDescription,
    ) -> Result<Box<dyn RhiImageView>, RhiError> {
        self.counters.image_views.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(NullImageView {
            desc: *desc,
            image_name: image.description().name.clone(),
        }))
    }

    fn create_buffer_view(
        &self,
        buffer: &dyn RhiBuffer,
        desc: &BufferViewDescription,
    ) -> Result<Box<dyn RhiBufferView>, RhiError> {
        self.counters.buffer_views.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(NullBufferView {
            desc: *desc,
            buffer_name: buffer.description().name.clone(),
        }))
    }

    fn allocate_memory(
        &self,
        size: u64,
        _memory_type_index: u32,
    ) -> Result<Box<dyn RhiDeviceMemory>, RhiError> {
        self.counters.memory_allocations.fetch_add(1, Ordering::Relaxed);
        self.counters
            .allocated_bytes
            .fetch_add(size, Ordering::Relaxed);
        Ok(Box::new(NullDeviceMemory { size }))
    }

    fn find_memory_type(
        &self,
        _type_filter: u32,
        _properties: MemoryPropertyFlags,
    ) -> Option<u32> {
        Some(0)
    }

    fn bind_image_memory(
        &self,
        image: &dyn RhiImage,
        memory: &dyn RhiDeviceMemory,
        offset: u64,
    ) -> Result<(), RhiError> {
        if offset >= memory.size() && memory.size() > 0 {
            return Err(RhiError::InvalidDescription(format!(
                "image bound at offset {} beyond allocation of {} bytes",
                offset,
                memory.size()
            )));
        }
        let image = image
            .downcast_ref::<NullImage>()
            .ok_or_else(|| RhiError::InvalidDescription("foreign image object".to_string()))?;
        *image.bound_offset.lock().unwrap() = Some(offset);
        Ok(())
    }

    fn bind_buffer_memory(
        &self,
        buffer: &dyn RhiBuffer,
        memory: &dyn RhiDeviceMemory,
        offset: u64,
    ) -> Result<(), RhiError> {
        if offset >= memory.size() && memory.size() > 0 {
            return Err(RhiError::InvalidDescription(format!(
                "buffer bound at offset {} beyond allocation of {} bytes",
                offset,
                memory.size()
            )));
        }
        let buffer = buffer
            .downcast_ref::<NullBuffer>()
            .ok_or_else(|| RhiError::InvalidDescription("foreign buffer object".to_string()))?;
        *buffer.bound_offset.lock().unwrap() = Some(offset);
        Ok(())
    }

    fn write_buffer(
        &self,
        buffer: &dyn RhiBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), RhiError> {
        let buffer = buffer
            .downcast_ref::<NullBuffer>()
            .ok_or_else(|| RhiError::InvalidDescription("foreign buffer object".to_string()))?;
        let mut contents = buffer.data.lock().unwrap();
        let end = offset as usize + data.len();
        if contents.len() < end {
            contents.resize(end, 0);
        }
        contents[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn create_descriptor_set_layout(
        &self,
        desc: &ResourceGroupLayoutDescription,
    ) -> Result<Box<dyn RhiDescriptorSetLayout>, RhiError> {
        self.counters
            .descriptor_set_layouts
            .fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(NullDescriptorSetLayout { desc: desc.clone() }))
    }

    fn create_descriptor_set(
        &self,
        _layout: &dyn RhiDescriptorSetLayout,
        writes: &[DescriptorWrite],
    ) -> Result<Box<dyn RhiDescriptorSet>, RhiError> {
        self.counters.descriptor_sets.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(NullDescriptorSet {
            writes: writes
                .iter()
                .map(|w| (w.binding, w.resource.kind()))
                .collect(),
        }))
    }

    fn create_framebuffer(
        &self,
        color_attachments: &[&dyn RhiImageView],
        depth_stencil_attachment: Option<&dyn RhiImageView>,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn RhiFramebuffer>, RhiError> {
        self.counters.framebuffers.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(NullFramebuffer {
            width,
            height,
            color_count: color_attachments.len(),
            has_depth: depth_stencil_attachment.is_some(),
        }))
    }

    fn create_pipeline(
        &self,
        layout: &PipelineLayoutDescription,
        desc: &PipelineDescription,
    ) -> Result<Box<dyn RhiPipeline>, RhiError> {
        self.counters.pipelines.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(NullPipeline {
            kind: desc.kind_name(),
            layout: layout.clone(),
        }))
    }

    fn create_fence(&self, signaled: bool) -> Result<Box<dyn RhiFence>, RhiError> {
        Ok(Box::new(NullFence {
            signaled: AtomicBool::new(signaled),
        }))
    }

    fn create_semaphore(&self) -> Result<Box<dyn RhiSemaphore>, RhiError> {
        Ok(Box::new(NullSemaphore))
    }
}

/// One recorded command.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCommand {
    Begin,
    End,
    BeginRenderPass {
        width: u32,
        height: u32,
        color_count: usize,
        has_depth: bool,
    },
    EndRenderPass,
    SetViewport {
        width: f32,
        height: f32,
    },
    SetScissor {
        width: u32,
        height: u32,
    },
    BindPipeline {
        kind: &'static str,
    },
    BindDescriptorSet {
        set: u32,
    },
    PushConstants {
        stages: ShaderStageFlags,
        offset: u32,
        size: usize,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    CopyBuffer {
        size: u64,
    },
    CopyBufferToImage {
        image: String,
    },
    ImageBarrier {
        image: String,
        old_state: ResourceState,
        new_state: ResourceState,
        base_mip: u32,
        mip_count: u32,
        base_layer: u32,
        layer_count: u32,
    },
    BufferBarrier {
        buffer: String,
        old_state: ResourceState,
        new_state: ResourceState,
    },
    BeginDebugLabel(String),
    EndDebugLabel,
}

#[derive(Default)]
pub struct NullRecorder {
    commands: Vec<RecordedCommand>,
}

impl NullRecorder {
    pub fn new() -> NullRecorder {
        Default::default()
    }

    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Only the barrier commands, in order.
    pub fn barriers(&self) -> Vec<&RecordedCommand> {
        self.commands
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    RecordedCommand::ImageBarrier { .. } | RecordedCommand::BufferBarrier { .. }
                )
            })
            .collect()
    }
}

impl CommandRecorder for NullRecorder {
    fn begin(&mut self) {
        self.commands.push(RecordedCommand::Begin);
    }

    fn end(&mut self) {
        self.commands.push(RecordedCommand::End);
    }

    fn begin_render_pass(&mut self, framebuffer: &dyn RhiFramebuffer, info: &RenderPassBeginInfo) {
        let (color_count, has_depth) = framebuffer
            .downcast_ref::<NullFramebuffer>()
            .map(|fb| (fb.color_count, fb.has_depth))
            .unwrap_or((info.color_ops.len(), info.depth_stencil_ops.is_some()));
        self.commands.push(RecordedCommand::BeginRenderPass {
            width: info.width,
            height: info.height,
            color_count,
            has_depth,
        });
    }

    fn end_render_pass(&mut self) {
        self.commands.push(RecordedCommand::EndRenderPass);
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.commands.push(RecordedCommand::SetViewport {
            width: viewport.width,
            height: viewport.height,
        });
    }

    fn set_scissor(&mut self, scissor: &ScissorRect) {
        self.commands.push(RecordedCommand::SetScissor {
            width: scissor.width,
            height: scissor.height,
        });
    }

    fn bind_pipeline(&mut self, pipeline: &dyn RhiPipeline) {
        let kind = pipeline
            .downcast_ref::<NullPipeline>()
            .map(|p| p.kind)
            .unwrap_or("foreign");
        self.commands.push(RecordedCommand::BindPipeline { kind });
    }

    fn bind_descriptor_set(&mut self, set_index: u32, _set: &dyn RhiDescriptorSet) {
        self.commands
            .push(RecordedCommand::BindDescriptorSet { set: set_index });
    }

    fn push_constants(&mut self, stages: ShaderStageFlags, offset: u32, data: &[u8]) {
        self.commands.push(RecordedCommand::PushConstants {
            stages,
            offset,
            size: data.len(),
        });
    }

    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) {
        self.commands.push(RecordedCommand::Draw {
            vertex_count,
            instance_count,
        });
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.commands.push(RecordedCommand::DrawIndexed {
            index_count,
            instance_count,
        });
    }

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        self.commands.push(RecordedCommand::Dispatch {
            x: group_count_x,
            y: group_count_y,
            z: group_count_z,
        });
    }

    fn copy_buffer(
        &mut self,
        _src: &dyn RhiBuffer,
        _dst: &dyn RhiBuffer,
        _src_offset: u64,
        _dst_offset: u64,
        size: u64,
    ) {
        self.commands.push(RecordedCommand::CopyBuffer { size });
    }

    fn copy_buffer_to_image(&mut self, _src: &dyn RhiBuffer, dst: &dyn RhiImage) {
        self.commands.push(RecordedCommand::CopyBufferToImage {
            image: dst.description().name.clone(),
        });
    }

    fn pipeline_barrier(&mut self, barriers: &[BarrierDesc]) {
        for barrier in barriers {
            match barrier {
                BarrierDesc::Image {
                    image,
                    old_state,
                    new_state,
                    range,
                    ..
                } => self.commands.push(RecordedCommand::ImageBarrier {
                    image: image.description().name.clone(),
                    old_state: *old_state,
                    new_state: *new_state,
                    base_mip: range.base_mip,
                    mip_count: range.mip_count,
                    base_layer: range.base_layer,
                    layer_count: range.layer_count,
                }),
                BarrierDesc::Buffer {
                    buffer,
                    old_state,
                    new_state,
                    ..
                } => self.commands.push(RecordedCommand::BufferBarrier {
                    buffer: buffer.description().name.clone(),
                    old_state: *old_state,
                    new_state: *new_state,
                }),
            }
        }
    }

    fn begin_debug_label(&mut self, name: &str) {
        self.commands
            .push(RecordedCommand::BeginDebugLabel(name.to_string()));
    }

    fn end_debug_label(&mut self) {
        self.commands.push(RecordedCommand::EndDebugLabel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_counts_creations() {
        let device = NullDevice::new();
        let desc = ImageDescription {
            name: "probe".to_string(),
            ..Default::default()
        };
        device.create_image(&desc).unwrap();
        device.create_image(&desc).unwrap();
        assert_eq!(device.images_created(), 2);
    }

    #[test]
    fn write_buffer_captures_bytes() {
        let device = NullDevice::new();
        let buffer = device
            .create_buffer(&BufferDescription {
                name: "staging".to_string(),
                size: 8,
                ..Default::default()
            })
            .unwrap();
        device.write_buffer(buffer.as_ref(), 2, &[1, 2, 3]).unwrap();
        let null = buffer.downcast_ref::<NullBuffer>().unwrap();
        assert_eq!(null.written_data(), vec![0, 0, 1, 2, 3]);
    }
}
