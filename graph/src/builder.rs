//! Pass and resource declaration.
//!
//! The builder only accumulates: resource creations, external
//! registrations, views, resource groups and pass closures. Nothing talks
//! to the device until `compile`, and declaration errors are recorded and
//! reported there, so a failed build leaves no side effects behind.

use crate::descriptors::ResourceGroupDescription;
use crate::error::CompileError;
use crate::exec::{Graph, PassResources};
use crate::handle::{
    AccelHandle, BufferHandle, BufferViewHandle, ImageHandle, ImageViewHandle,
    ResourceGroupHandle,
};
use crate::params::PassParameters;
use crate::alloc::TransientAllocator;
use crate::attachments::MAX_COLOR_ATTACHMENTS;
use fxhash::FxHashMap;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::slice;
use std::sync::Arc;
use vermeil_rhi::{
    BufferDescription, BufferUsageFlags, BufferViewKind, CommandRecorder, Device, Format,
    ImageDescription, ImageViewKind, ImageViewRange, ResourceState, RhiAccelerationStructure,
    RhiBuffer, RhiImage,
};

/// Scheduling hint attached to a pass declaration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PassHint {
    /// The closure records its own commands; no pipeline or render pass
    /// is set up around it.
    Immediate,
    Raster,
    Compute,
    RayTracing,
}

/// Entry and required exit states of an externally-owned resource.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ExternalResourceStates {
    pub input_state: ResourceState,
    pub output_state: ResourceState,
}

impl Default for ExternalResourceStates {
    fn default() -> Self {
        ExternalResourceStates {
            input_state: ResourceState::ShaderReadOnly,
            output_state: ResourceState::ShaderReadOnly,
        }
    }
}

pub(crate) type PassFn = Box<dyn FnOnce(&mut dyn CommandRecorder, &PassResources) + 'static>;

pub(crate) struct PassDecl {
    pub name: String,
    pub hint: PassHint,
    pub params: PassParameters,
    pub closure: Option<PassFn>,
}

pub(crate) enum ImageDecl {
    Transient {
        desc: ImageDescription,
        initial_data: Option<Vec<u8>>,
    },
    External {
        resource: Arc<dyn RhiImage>,
        states: ExternalResourceStates,
    },
}

impl ImageDecl {
    pub fn description(&self) -> &ImageDescription {
        match self {
            ImageDecl::Transient { desc, .. } => desc,
            ImageDecl::External { resource, .. } => resource.description(),
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, ImageDecl::External { .. })
    }
}

pub(crate) enum BufferDecl {
    Transient {
        desc: BufferDescription,
        initial_data: Option<Vec<u8>>,
    },
    External {
        resource: Arc<dyn RhiBuffer>,
        states: ExternalResourceStates,
    },
}

impl BufferDecl {
    pub fn description(&self) -> &BufferDescription {
        match self {
            BufferDecl::Transient { desc, .. } => desc,
            BufferDecl::External { resource, .. } => resource.description(),
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, BufferDecl::External { .. })
    }
}

pub(crate) struct ImageViewDecl {
    pub image: ImageHandle,
    pub kind: ImageViewKind,
    pub format: Option<Format>,
    pub range: ImageViewRange,
}

pub(crate) struct BufferViewDecl {
    pub buffer: BufferHandle,
    pub kind: BufferViewKind,
}

pub struct GraphBuilder {
    pub(crate) images: Vec<ImageDecl>,
    pub(crate) buffers: Vec<BufferDecl>,
    pub(crate) image_views: Vec<ImageViewDecl>,
    pub(crate) buffer_views: Vec<BufferViewDecl>,
    pub(crate) groups: Vec<ResourceGroupDescription>,
    pub(crate) accels: Vec<Arc<dyn RhiAccelerationStructure>>,
    pub(crate) passes: Vec<PassDecl>,
    pub(crate) errors: Vec<CompileError>,

    image_index: FxHashMap<ImageHandle, usize>,
    buffer_index: FxHashMap<BufferHandle, usize>,
    image_view_index: FxHashMap<ImageViewHandle, usize>,
    buffer_view_index: FxHashMap<BufferViewHandle, usize>,
    group_index: FxHashMap<ResourceGroupHandle, usize>,
    accel_index: FxHashMap<AccelHandle, usize>,

    // identity (thin pointer) of registered externals, for idempotence
    external_images: FxHashMap<usize, ImageHandle>,
    external_buffers: FxHashMap<usize, BufferHandle>,
    external_accels: FxHashMap<usize, AccelHandle>,
    group_hashes: FxHashMap<u64, ResourceGroupHandle>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> GraphBuilder {
        GraphBuilder {
            images: Vec::new(),
            buffers: Vec::new(),
            image_views: Vec::new(),
            buffer_views: Vec::new(),
            groups: Vec::new(),
            accels: Vec::new(),
            passes: Vec::new(),
            errors: Vec::new(),
            image_index: FxHashMap::default(),
            buffer_index: FxHashMap::default(),
            image_view_index: FxHashMap::default(),
            buffer_view_index: FxHashMap::default(),
            group_index: FxHashMap::default(),
            accel_index: FxHashMap::default(),
            external_images: FxHashMap::default(),
            external_buffers: FxHashMap::default(),
            external_accels: FxHashMap::default(),
            group_hashes: FxHashMap::default(),
        }
    }

    fn declaration_error(&mut self, message: String) {
        self.errors.push(CompileError::Declaration(message));
    }

    //----------------------------------------------------------------------------------------------
    // Images

    /// Declares a transient image; memory is aliased-suballocated at
    /// compile time and released when the graph is dropped.
    pub fn create_image(&mut self, desc: ImageDescription) -> ImageHandle {
        if let Err(e) = desc.validate() {
            self.declaration_error(e);
        }
        let handle = ImageHandle::mint();
        self.image_index.insert(handle, self.images.len());
        self.images.push(ImageDecl::Transient {
            desc,
            initial_data: None,
        });
        handle
    }

    /// Declares a transient image whose contents are uploaded from
    /// `data` before its first read.
    pub fn create_image_with_data(&mut self, desc: ImageDescription, data: Vec<u8>) -> ImageHandle {
        if let Err(e) = desc.validate() {
            self.declaration_error(e);
        }
        let handle = ImageHandle::mint();
        self.image_index.insert(handle, self.images.len());
        self.images.push(ImageDecl::Transient {
            desc,
            initial_data: Some(data),
        });
        handle
    }

    /// Registers a caller-owned image. Idempotent for the same resource;
    /// re-registering with different states is a declaration error.
    pub fn register_external_image(
        &mut self,
        resource: Arc<dyn RhiImage>,
        states: ExternalResourceStates,
    ) -> ImageHandle {
        let identity = Arc::as_ptr(&resource) as *const () as usize;
        if let Some(&existing) = self.external_images.get(&identity) {
            let idx = self.image_index[&existing];
            if let ImageDecl::External {
                states: declared, ..
            } = &self.images[idx]
            {
                if *declared != states {
                    self.declaration_error(format!(
                        "external image '{}' re-registered with conflicting states",
                        resource.description().name
                    ));
                }
            }
            return existing;
        }
        let handle = ImageHandle::mint();
        self.external_images.insert(identity, handle);
        self.image_index.insert(handle, self.images.len());
        self.images.push(ImageDecl::External { resource, states });
        handle
    }

    //----------------------------------------------------------------------------------------------
    // Buffers

    pub fn create_buffer(&mut self, desc: BufferDescription) -> BufferHandle {
        self.insert_transient_buffer(desc, None)
    }

    pub fn create_buffer_with_data(&mut self, desc: BufferDescription, data: Vec<u8>) -> BufferHandle {
        if data.len() as u64 > desc.size {
            self.declaration_error(format!(
                "buffer '{}' initial data ({} bytes) exceeds its declared size ({} bytes)",
                desc.name,
                data.len(),
                desc.size
            ));
        }
        self.insert_transient_buffer(desc, Some(data))
    }

    /// Declares a constant buffer holding one value of `T`.
    pub fn create_constant_buffer<T: Copy + 'static>(&mut self, name: &str, value: &T) -> BufferHandle {
        let size = mem::size_of::<T>();
        let bytes =
            unsafe { slice::from_raw_parts(value as *const T as *const u8, size) }.to_vec();
        let desc = BufferDescription {
            name: name.to_string(),
            // zero-sized payloads still get an addressable buffer
            size: (size as u64).max(1),
            stride: 0,
            usage: BufferUsageFlags::CONSTANT,
        };
        self.insert_transient_buffer(desc, if size > 0 { Some(bytes) } else { None })
    }

    /// Declares a structured (storage) buffer holding a slice of `T`.
    pub fn create_structured_buffer<T: Copy + 'static>(
        &mut self,
        name: &str,
        values: &[T],
    ) -> BufferHandle {
        let size = mem::size_of_val(values);
        let bytes =
            unsafe { slice::from_raw_parts(values.as_ptr() as *const u8, size) }.to_vec();
        let desc = BufferDescription {
            name: name.to_string(),
            size: (size as u64).max(1),
            stride: mem::size_of::<T>() as u32,
            usage: BufferUsageFlags::STORAGE,
        };
        self.insert_transient_buffer(desc, if size > 0 { Some(bytes) } else { None })
    }

    fn insert_transient_buffer(
        &mut self,
        desc: BufferDescription,
        initial_data: Option<Vec<u8>>,
    ) -> BufferHandle {
        let handle = BufferHandle::mint();
        self.buffer_index.insert(handle, self.buffers.len());
        self.buffers.push(BufferDecl::Transient { desc, initial_data });
        handle
    }

    pub fn register_external_buffer(
        &mut self,
        resource: Arc<dyn RhiBuffer>,
        states: ExternalResourceStates,
    ) -> BufferHandle {
        let identity = Arc::as_ptr(&resource) as *const () as usize;
        if let Some(&existing) = self.external_buffers.get(&identity) {
            let idx = self.buffer_index[&existing];
            if let BufferDecl::External {
                states: declared, ..
            } = &self.buffers[idx]
            {
                if *declared != states {
                    self.declaration_error(format!(
                        "external buffer '{}' re-registered with conflicting states",
                        resource.description().name
                    ));
                }
            }
            return existing;
        }
        let handle = BufferHandle::mint();
        self.external_buffers.insert(identity, handle);
        self.buffer_index.insert(handle, self.buffers.len());
        self.buffers.push(BufferDecl::External { resource, states });
        handle
    }

    //----------------------------------------------------------------------------------------------
    // Views

    pub fn create_texture_srv(&mut self, image: ImageHandle) -> ImageViewHandle {
        self.create_texture_view(image, ImageViewKind::ShaderResource, None, ImageViewRange::ALL)
    }

    pub fn create_texture_srv_with(
        &mut self,
        image: ImageHandle,
        format: Option<Format>,
        range: ImageViewRange,
    ) -> ImageViewHandle {
        self.create_texture_view(image, ImageViewKind::ShaderResource, format, range)
    }

    pub fn create_texture_uav(&mut self, image: ImageHandle) -> ImageViewHandle {
        self.create_texture_view(image, ImageViewKind::UnorderedAccess, None, ImageViewRange::ALL)
    }

    pub fn create_texture_uav_with(
        &mut self,
        image: ImageHandle,
        format: Option<Format>,
        range: ImageViewRange,
    ) -> ImageViewHandle {
        self.create_texture_view(image, ImageViewKind::UnorderedAccess, format, range)
    }

    pub fn create_texture_rtv(&mut self, image: ImageHandle) -> ImageViewHandle {
        self.create_texture_view(image, ImageViewKind::RenderTarget, None, ImageViewRange::ALL)
    }

    pub fn create_texture_rtv_with(
        &mut self,
        image: ImageHandle,
        format: Option<Format>,
        range: ImageViewRange,
    ) -> ImageViewHandle {
        self.create_texture_view(image, ImageViewKind::RenderTarget, format, range)
    }

    fn create_texture_view(
        &mut self,
        image: ImageHandle,
        kind: ImageViewKind,
        format: Option<Format>,
        range: ImageViewRange,
    ) -> ImageViewHandle {
        if !self.image_index.contains_key(&image) {
            self.declaration_error(format!(
                "view references unknown image handle {:?}",
                image
            ));
        }
        let handle = ImageViewHandle::mint();
        self.image_view_index.insert(handle, self.image_views.len());
        self.image_views.push(ImageViewDecl {
            image,
            kind,
            format,
            range,
        });
        handle
    }

    pub fn create_buffer_srv(&mut self, buffer: BufferHandle) -> BufferViewHandle {
        self.create_buffer_view(buffer, BufferViewKind::ShaderResource)
    }

    pub fn create_buffer_uav(&mut self, buffer: BufferHandle) -> BufferViewHandle {
        self.create_buffer_view(buffer, BufferViewKind::UnorderedAccess)
    }

    pub fn create_buffer_cbv(&mut self, buffer: BufferHandle) -> BufferViewHandle {
        self.create_buffer_view(buffer, BufferViewKind::Constant)
    }

    fn create_buffer_view(&mut self, buffer: BufferHandle, kind: BufferViewKind) -> BufferViewHandle {
        if !self.buffer_index.contains_key(&buffer) {
            self.declaration_error(format!(
                "view references unknown buffer handle {:?}",
                buffer
            ));
        }
        let handle = BufferViewHandle::mint();
        self.buffer_view_index
            .insert(handle, self.buffer_views.len());
        self.buffer_views.push(BufferViewDecl { buffer, kind });
        handle
    }

    //----------------------------------------------------------------------------------------------
    // Resource groups and acceleration structures

    /// Declares a resource group. Structurally identical declarations
    /// return the previously minted handle.
    pub fn create_resource_group(&mut self, desc: ResourceGroupDescription) -> ResourceGroupHandle {
        let hash = desc.structural_hash();
        if let Some(&existing) = self.group_hashes.get(&hash) {
            return existing;
        }
        let handle = ResourceGroupHandle::mint();
        self.group_hashes.insert(hash, handle);
        self.group_index.insert(handle, self.groups.len());
        self.groups.push(desc);
        handle
    }

    pub fn register_external_acceleration_structure(
        &mut self,
        accel: Arc<dyn RhiAccelerationStructure>,
    ) -> AccelHandle {
        let identity = Arc::as_ptr(&accel) as *const () as usize;
        if let Some(&existing) = self.external_accels.get(&identity) {
            return existing;
        }
        let handle = AccelHandle::mint();
        self.external_accels.insert(identity, handle);
        self.accel_index.insert(handle, self.accels.len());
        self.accels.push(accel);
        handle
    }

    //----------------------------------------------------------------------------------------------
    // Debug markers

    /// Enqueues a debug-label push; shows up as a closure-only pass.
    pub fn begin_gpu_marker(&mut self, name: &str) {
        let label = name.to_string();
        self.passes.push(PassDecl {
            name: format!("marker:{}", name),
            hint: PassHint::Immediate,
            params: PassParameters::new(),
            closure: Some(Box::new(move |recorder, _| {
                recorder.begin_debug_label(&label)
            })),
        });
    }

    pub fn end_gpu_marker(&mut self) {
        self.passes.push(PassDecl {
            name: "marker:end".to_string(),
            hint: PassHint::Immediate,
            params: PassParameters::new(),
            closure: Some(Box::new(|recorder, _| recorder.end_debug_label())),
        });
    }

    /// Guard that closes the marker when dropped.
    pub fn gpu_marker_scope(&mut self, name: &str) -> GpuMarkerScope<'_> {
        self.begin_gpu_marker(name);
        GpuMarkerScope { builder: self }
    }

    //----------------------------------------------------------------------------------------------
    // Passes

    pub fn add_pass<F>(&mut self, name: &str, params: PassParameters, hint: PassHint, closure: F)
    where
        F: FnOnce(&mut dyn CommandRecorder, &PassResources) + 'static,
    {
        if params.attachments_redeclared {
            self.declaration_error(format!(
                "pass '{}' declares more than one framebuffer-attachments block",
                name
            ));
        }
        if let Some(attachments) = &params.attachments {
            if attachments.color.len() > MAX_COLOR_ATTACHMENTS {
                self.declaration_error(format!(
                    "pass '{}' declares {} color attachments, the cap is {}",
                    name,
                    attachments.color.len(),
                    MAX_COLOR_ATTACHMENTS
                ));
            }
        }
        self.passes.push(PassDecl {
            name: name.to_string(),
            hint,
            params,
            closure: Some(Box::new(closure)),
        });
    }

    /// Compiles the accumulated declarations into an executable graph.
    pub fn compile(
        self,
        device: &Arc<dyn Device>,
        allocator: &mut TransientAllocator,
    ) -> Result<Graph, CompileError> {
        crate::compile::compile_graph(self, device, allocator)
    }

    //----------------------------------------------------------------------------------------------
    // Internal resolution

    pub(crate) fn image_index_of(&self, handle: ImageHandle) -> Option<usize> {
        self.image_index.get(&handle).copied()
    }

    pub(crate) fn buffer_index_of(&self, handle: BufferHandle) -> Option<usize> {
        self.buffer_index.get(&handle).copied()
    }

    pub(crate) fn image_view_index_of(&self, handle: ImageViewHandle) -> Option<usize> {
        self.image_view_index.get(&handle).copied()
    }

    pub(crate) fn buffer_view_index_of(&self, handle: BufferViewHandle) -> Option<usize> {
        self.buffer_view_index.get(&handle).copied()
    }

    pub(crate) fn group_index_of(&self, handle: ResourceGroupHandle) -> Option<usize> {
        self.group_index.get(&handle).copied()
    }

    pub(crate) fn accel_index_of(&self, handle: AccelHandle) -> Option<usize> {
        self.accel_index.get(&handle).copied()
    }

    pub(crate) fn image_name(&self, index: usize) -> &str {
        &self.images[index].description().name
    }

    pub(crate) fn buffer_name(&self, index: usize) -> &str {
        &self.buffers[index].description().name
    }
}

pub struct GpuMarkerScope<'a> {
    builder: &'a mut GraphBuilder,
}

impl<'a> Deref for GpuMarkerScope<'a> {
    type Target = GraphBuilder;

    fn deref(&self) -> &GraphBuilder {
        self.builder
    }
}

impl<'a> DerefMut for GpuMarkerScope<'a> {
    fn deref_mut(&mut self) -> &mut GraphBuilder {
        self.builder
    }
}

impl<'a> Drop for GpuMarkerScope<'a> {
    fn drop(&mut self) {
        self.builder.end_gpu_marker();
    }
}
