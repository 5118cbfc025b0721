//! Descriptor types and resource-group layout records.

use crate::reflect::ShaderStageFlags;
use crate::traits::{
    RhiAccelerationStructure, RhiBufferView, RhiImageView, RhiSampler,
};
use std::hash::{Hash, Hasher};

/// Descriptor type
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DescriptorType {
    Sampler,
    SampledImage,
    StorageImage,
    UniformBuffer,
    StorageBuffer,
    AccelerationStructure,
}

/// One entry (binding) in a resource-group layout.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ResourceGroupLayoutBinding {
    pub binding: u32,
    pub kind: DescriptorType,
    pub count: u32,
    pub stages: ShaderStageFlags,
}

/// Layout of one resource group (descriptor set).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Default)]
pub struct ResourceGroupLayoutDescription {
    pub bindings: Vec<ResourceGroupLayoutBinding>,
}

impl ResourceGroupLayoutDescription {
    /// Structural identity, independent of binding declaration order.
    pub fn structural_hash(&self) -> u64 {
        let mut h = 0u64;
        for b in &self.bindings {
            let mut hasher = fxhash::FxHasher::default();
            b.hash(&mut hasher);
            h ^= hasher.finish();
        }
        h
    }
}

/// A physical resource bound into a descriptor set.
#[derive(Copy, Clone)]
pub enum DescriptorResource<'a> {
    SampledImage(&'a dyn RhiImageView),
    StorageImage(&'a dyn RhiImageView),
    UniformBuffer(&'a dyn RhiBufferView),
    StorageBuffer(&'a dyn RhiBufferView),
    Sampler(&'a dyn RhiSampler),
    AccelerationStructure(&'a dyn RhiAccelerationStructure),
}

impl<'a> DescriptorResource<'a> {
    pub fn kind(&self) -> DescriptorType {
        match self {
            DescriptorResource::SampledImage(_) => DescriptorType::SampledImage,
            DescriptorResource::StorageImage(_) => DescriptorType::StorageImage,
            DescriptorResource::UniformBuffer(_) => DescriptorType::UniformBuffer,
            DescriptorResource::StorageBuffer(_) => DescriptorType::StorageBuffer,
            DescriptorResource::Sampler(_) => DescriptorType::Sampler,
            DescriptorResource::AccelerationStructure(_) => DescriptorType::AccelerationStructure,
        }
    }
}

/// One write into a descriptor set at creation time.
#[derive(Copy, Clone)]
pub struct DescriptorWrite<'a> {
    pub binding: u32,
    pub resource: DescriptorResource<'a>,
}
