//! The backend capability set.
//!
//! Everything the render graph calls is expressed through these traits; a
//! backend (Vulkan, DirectX-12, or the null test backend) implements them
//! and the core only ever holds erased `dyn` objects. `Downcast` lets a
//! backend recover its concrete types on the way back in.

use crate::buffer::BufferDescription;
use crate::descriptor::{DescriptorWrite, ResourceGroupLayoutDescription};
use crate::error::RhiError;
use crate::framebuffer::RenderPassBeginInfo;
use crate::image::{ImageDescription, ImageViewRange, SamplerDescription};
use crate::format::Format;
use crate::pipeline::{
    PipelineDescription, PipelineLayoutDescription, ScissorRect, Viewport,
};
use crate::reflect::ShaderStageFlags;
use crate::sync::{BarrierDesc, MemoryPropertyFlags};
use downcast_rs::{impl_downcast, Downcast};

pub trait RhiImage: Downcast + Send + Sync {
    fn description(&self) -> &ImageDescription;
}
impl_downcast!(RhiImage);

pub trait RhiBuffer: Downcast + Send + Sync {
    fn description(&self) -> &BufferDescription;
}
impl_downcast!(RhiBuffer);

pub trait RhiImageView: Downcast + Send + Sync {}
impl_downcast!(RhiImageView);

pub trait RhiBufferView: Downcast + Send + Sync {}
impl_downcast!(RhiBufferView);

pub trait RhiSampler: Downcast + Send + Sync {}
impl_downcast!(RhiSampler);

pub trait RhiPipeline: Downcast + Send + Sync {}
impl_downcast!(RhiPipeline);

pub trait RhiFramebuffer: Downcast + Send + Sync {}
impl_downcast!(RhiFramebuffer);

pub trait RhiDescriptorSetLayout: Downcast + Send + Sync {}
impl_downcast!(RhiDescriptorSetLayout);

pub trait RhiDescriptorSet: Downcast + Send + Sync {}
impl_downcast!(RhiDescriptorSet);

pub trait RhiAccelerationStructure: Downcast + Send + Sync {}
impl_downcast!(RhiAccelerationStructure);

pub trait RhiDeviceMemory: Downcast + Send + Sync {
    fn size(&self) -> u64;
}
impl_downcast!(RhiDeviceMemory);

/// GPU-to-CPU signal.
pub trait RhiFence: Downcast + Send + Sync {
    fn is_signaled(&self) -> bool;
    fn wait(&self);
    fn reset(&self);
}
impl_downcast!(RhiFence);

/// GPU-to-GPU binary semaphore.
pub trait RhiSemaphore: Downcast + Send + Sync {}
impl_downcast!(RhiSemaphore);

/// Kind of projection an image view exposes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ImageViewKind {
    /// Read-only in shaders.
    ShaderResource,
    /// Read-write in shaders.
    UnorderedAccess,
    /// Framebuffer attachment.
    RenderTarget,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ImageViewDescription {
    pub kind: ImageViewKind,
    /// Overrides the image's format when set.
    pub format: Option<Format>,
    pub range: ImageViewRange,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BufferViewKind {
    /// Read-only in shaders.
    ShaderResource,
    /// Read-write in shaders.
    UnorderedAccess,
    /// Small uniform read.
    Constant,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct BufferViewDescription {
    pub kind: BufferViewKind,
    pub offset: u64,
    /// Bytes visible through the view; `u64::MAX` means the rest of the
    /// buffer.
    pub size: u64,
}

impl BufferViewDescription {
    pub fn whole(kind: BufferViewKind) -> BufferViewDescription {
        BufferViewDescription {
            kind,
            offset: 0,
            size: u64::MAX,
        }
    }
}

/// Object-creation surface of a backend device.
pub trait Device: Send + Sync {
    fn create_image(&self, desc: &ImageDescription) -> Result<Box<dyn RhiImage>, RhiError>;

    fn create_buffer(&self, desc: &BufferDescription) -> Result<Box<dyn RhiBuffer>, RhiError>;

    fn create_sampler(&self, desc: &SamplerDescription) -> Result<Box<dyn RhiSampler>, RhiError>;

    /// Views may only be created after the image has memory bound.
    fn create_image_view(
        &self,
        image: &dyn RhiImage,
        desc: &ImageViewDescription,
    ) -> Result<Box<dyn RhiImageView>, RhiError>;

    fn create_buffer_view(
        &self,
        buffer: &dyn RhiBuffer,
        desc: &BufferViewDescription,
    ) -> Result<Box<dyn RhiBufferView>, RhiError>;

    fn allocate_memory(
        &self,
        size: u64,
        memory_type_index: u32,
    ) -> Result<Box<dyn RhiDeviceMemory>, RhiError>;

    /// Index of a memory type accepted by `type_filter` with the requested
    /// properties, or `None` if the device has no such type.
    fn find_memory_type(&self, type_filter: u32, properties: MemoryPropertyFlags) -> Option<u32>;

    fn bind_image_memory(
        &self,
        image: &dyn RhiImage,
        memory: &dyn RhiDeviceMemory,
        offset: u64,
    ) -> Result<(), RhiError>;

    fn bind_buffer_memory(
        &self,
        buffer: &dyn RhiBuffer,
        memory: &dyn RhiDeviceMemory,
        offset: u64,
    ) -> Result<(), RhiError>;

    /// Writes bytes into a host-visible buffer.
    fn write_buffer(
        &self,
        buffer: &dyn RhiBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), RhiError>;

    fn create_descriptor_set_layout(
        &self,
        desc: &ResourceGroupLayoutDescription,
    ) -> Result<Box<dyn RhiDescriptorSetLayout>, RhiError>;

    fn create_descriptor_set(
        &self,
        layout: &dyn RhiDescriptorSetLayout,
        writes: &[DescriptorWrite],
    ) -> Result<Box<dyn RhiDescriptorSet>, RhiError>;

    fn create_framebuffer(
        &self,
        color_attachments: &[&dyn RhiImageView],
        depth_stencil_attachment: Option<&dyn RhiImageView>,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn RhiFramebuffer>, RhiError>;

    fn create_pipeline(
        &self,
        layout: &PipelineLayoutDescription,
        desc: &PipelineDescription,
    ) -> Result<Box<dyn RhiPipeline>, RhiError>;

    fn create_fence(&self, signaled: bool) -> Result<Box<dyn RhiFence>, RhiError>;

    fn create_semaphore(&self) -> Result<Box<dyn RhiSemaphore>, RhiError>;
}

/// Command-recording surface. Recording never fails; GPU failures surface
/// through fences and semaphores at submission, outside the core.
pub trait CommandRecorder {
    fn begin(&mut self);
    fn end(&mut self);

    fn begin_render_pass(&mut self, framebuffer: &dyn RhiFramebuffer, info: &RenderPassBeginInfo);
    fn end_render_pass(&mut self);

    fn set_viewport(&mut self, viewport: &Viewport);
    fn set_scissor(&mut self, scissor: &ScissorRect);

    fn bind_pipeline(&mut self, pipeline: &dyn RhiPipeline);
    fn bind_descriptor_set(&mut self, set_index: u32, set: &dyn RhiDescriptorSet);
    fn push_constants(&mut self, stages: ShaderStageFlags, offset: u32, data: &[u8]);

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32);

    fn copy_buffer(
        &mut self,
        src: &dyn RhiBuffer,
        dst: &dyn RhiBuffer,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    );
    fn copy_buffer_to_image(&mut self, src: &dyn RhiBuffer, dst: &dyn RhiImage);

    fn pipeline_barrier(&mut self, barriers: &[BarrierDesc]);

    fn begin_debug_label(&mut self, name: &str);
    fn end_debug_label(&mut self);
}
