//! Resource groups and descriptor-set deduplication support.
//!
//! Two caches live here: the process-wide descriptor-set *layout* cache
//! (bound to renderer lifetime, mutation under a lock) and the structural
//! hashing used by the build-local descriptor-*set* cache in the compiler.

use crate::error::CompileError;
use crate::handle::{AccelHandle, BufferViewHandle, ImageViewHandle};
use fxhash::FxHashMap;
use lazy_static::lazy_static;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use vermeil_rhi::{
    DescriptorType, Device, ResourceGroupLayoutDescription, RhiDescriptorSetLayout,
    SamplerDescription, ShaderStageFlags,
};

/// A resource bound into a declared group.
#[derive(Clone, Debug)]
pub enum GroupResource {
    TextureSrv(ImageViewHandle),
    TextureUav(ImageViewHandle),
    BufferSrv(BufferViewHandle),
    BufferUav(BufferViewHandle),
    BufferCbv(BufferViewHandle),
    Sampler(SamplerDescription),
    AccelerationStructure(AccelHandle),
}

impl GroupResource {
    pub fn kind(&self) -> DescriptorType {
        match self {
            GroupResource::TextureSrv(_) => DescriptorType::SampledImage,
            GroupResource::TextureUav(_) => DescriptorType::StorageImage,
            GroupResource::BufferSrv(_) => DescriptorType::StorageBuffer,
            GroupResource::BufferUav(_) => DescriptorType::StorageBuffer,
            GroupResource::BufferCbv(_) => DescriptorType::UniformBuffer,
            GroupResource::Sampler(_) => DescriptorType::Sampler,
            GroupResource::AccelerationStructure(_) => DescriptorType::AccelerationStructure,
        }
    }

    /// Identity of the bound resource for structural hashing: the tagged
    /// handle value, or the sampler description hash (samplers are value
    /// types).
    pub(crate) fn identity(&self) -> u64 {
        match self {
            GroupResource::TextureSrv(v) | GroupResource::TextureUav(v) => v.raw(),
            GroupResource::BufferSrv(v)
            | GroupResource::BufferUav(v)
            | GroupResource::BufferCbv(v) => v.raw(),
            GroupResource::Sampler(s) => fxhash::hash64(s),
            GroupResource::AccelerationStructure(a) => a.raw(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResourceGroupEntry {
    pub binding: u32,
    pub stages: ShaderStageFlags,
    pub resource: GroupResource,
}

/// A declared resource group: the table of bindings a pass hands to one
/// descriptor set.
#[derive(Clone, Debug, Default)]
pub struct ResourceGroupDescription {
    pub entries: Vec<ResourceGroupEntry>,
}

impl ResourceGroupDescription {
    pub fn new() -> ResourceGroupDescription {
        Default::default()
    }

    pub fn entry(
        mut self,
        binding: u32,
        stages: ShaderStageFlags,
        resource: GroupResource,
    ) -> Self {
        self.entries.push(ResourceGroupEntry {
            binding,
            stages,
            resource,
        });
        self
    }

    /// Multiset hash of the entries; declaration order does not matter.
    pub fn structural_hash(&self) -> u64 {
        self.entries.iter().fold(0u64, |h, e| {
            h ^ entry_hash(e.binding, e.resource.kind(), e.resource.identity(), e.stages)
        })
    }
}

/// Hash of one materialized binding, folded (xor) into a set's identity.
pub(crate) fn entry_hash(
    binding: u32,
    kind: DescriptorType,
    view_identity: u64,
    stages: ShaderStageFlags,
) -> u64 {
    let mut hasher = fxhash::FxHasher::default();
    binding.hash(&mut hasher);
    kind.hash(&mut hasher);
    view_identity.hash(&mut hasher);
    stages.bits().hash(&mut hasher);
    hasher.finish()
}

lazy_static! {
    static ref LAYOUT_CACHE: Mutex<FxHashMap<u64, Arc<dyn RhiDescriptorSetLayout>>> =
        Mutex::new(FxHashMap::default());
}

/// Fetches or creates the physical layout for a structural layout
/// description. Process-wide; callers share layouts across graphs.
pub(crate) fn get_or_create_layout(
    device: &dyn Device,
    desc: &ResourceGroupLayoutDescription,
) -> Result<Arc<dyn RhiDescriptorSetLayout>, CompileError> {
    let key = desc.structural_hash();
    let mut cache = LAYOUT_CACHE.lock().unwrap();
    if let Some(layout) = cache.get(&key) {
        return Ok(layout.clone());
    }
    let layout: Arc<dyn RhiDescriptorSetLayout> =
        Arc::from(device.create_descriptor_set_layout(desc)?);
    cache.insert(key, layout.clone());
    Ok(layout)
}

/// Drops every cached layout. Call at renderer shutdown (or between tests);
/// outstanding `Arc`s stay valid.
pub fn clear_descriptor_layout_cache() {
    LAYOUT_CACHE.lock().unwrap().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_hash_ignores_entry_order() {
        let a = ImageViewHandle::mint();
        let b = BufferViewHandle::mint();
        let g1 = ResourceGroupDescription::new()
            .entry(0, ShaderStageFlags::FRAGMENT, GroupResource::TextureSrv(a))
            .entry(1, ShaderStageFlags::FRAGMENT, GroupResource::BufferCbv(b));
        let g2 = ResourceGroupDescription::new()
            .entry(1, ShaderStageFlags::FRAGMENT, GroupResource::BufferCbv(b))
            .entry(0, ShaderStageFlags::FRAGMENT, GroupResource::TextureSrv(a));
        assert_eq!(g1.structural_hash(), g2.structural_hash());
    }

    #[test]
    fn group_hash_distinguishes_bindings() {
        let a = ImageViewHandle::mint();
        let g1 = ResourceGroupDescription::new().entry(
            0,
            ShaderStageFlags::FRAGMENT,
            GroupResource::TextureSrv(a),
        );
        let g2 = ResourceGroupDescription::new().entry(
            1,
            ShaderStageFlags::FRAGMENT,
            GroupResource::TextureSrv(a),
        );
        assert_ne!(g1.structural_hash(), g2.structural_hash());
    }
}
