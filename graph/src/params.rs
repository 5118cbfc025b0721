//! Pass parameter blocks.
//!
//! A parameter block is the flat, deterministically-ordered list of
//! resource inputs a pass declares: views, samplers, acceleration
//! structures, pre-built resource groups, plus at most one framebuffer
//! attachment block and at most one pipeline description. Entries keep
//! their insertion order; names are matched against shader reflection when
//! descriptor sets are materialized.

use crate::attachments::FramebufferAttachments;
use crate::handle::{AccelHandle, BufferViewHandle, ImageViewHandle, ResourceGroupHandle};
use vermeil_rhi::{PipelineDescription, SamplerDescription};

#[derive(Clone, Debug)]
pub enum ParameterValue {
    TextureSrv(ImageViewHandle),
    TextureUav(ImageViewHandle),
    BufferSrv(BufferViewHandle),
    BufferUav(BufferViewHandle),
    BufferCbv(BufferViewHandle),
    Sampler(SamplerDescription),
    AccelerationStructure(AccelHandle),
    /// Binds an already-declared group at an explicit set index.
    ResourceGroup {
        set: u32,
        group: ResourceGroupHandle,
    },
}

#[derive(Clone, Debug)]
pub struct ParameterEntry {
    pub name: String,
    pub value: ParameterValue,
}

#[derive(Default)]
pub struct PassParameters {
    pub(crate) entries: Vec<ParameterEntry>,
    pub(crate) attachments: Option<FramebufferAttachments>,
    pub(crate) attachments_redeclared: bool,
    pub(crate) pipeline: Option<PipelineDescription>,
}

impl PassParameters {
    pub fn new() -> PassParameters {
        Default::default()
    }

    fn push(mut self, name: &str, value: ParameterValue) -> Self {
        self.entries.push(ParameterEntry {
            name: name.to_string(),
            value,
        });
        self
    }

    pub fn texture_srv(self, name: &str, view: ImageViewHandle) -> Self {
        self.push(name, ParameterValue::TextureSrv(view))
    }

    pub fn texture_uav(self, name: &str, view: ImageViewHandle) -> Self {
        self.push(name, ParameterValue::TextureUav(view))
    }

    pub fn buffer_srv(self, name: &str, view: BufferViewHandle) -> Self {
        self.push(name, ParameterValue::BufferSrv(view))
    }

    pub fn buffer_uav(self, name: &str, view: BufferViewHandle) -> Self {
        self.push(name, ParameterValue::BufferUav(view))
    }

    pub fn buffer_cbv(self, name: &str, view: BufferViewHandle) -> Self {
        self.push(name, ParameterValue::BufferCbv(view))
    }

    pub fn sampler(self, name: &str, desc: SamplerDescription) -> Self {
        self.push(name, ParameterValue::Sampler(desc))
    }

    pub fn acceleration_structure(self, name: &str, accel: AccelHandle) -> Self {
        self.push(name, ParameterValue::AccelerationStructure(accel))
    }

    pub fn resource_group(self, set: u32, group: ResourceGroupHandle) -> Self {
        let name = format!("set{}", set);
        self.push(&name, ParameterValue::ResourceGroup { set, group })
    }

    /// Sets the framebuffer attachment block; singleton per pass.
    pub fn attachments(mut self, attachments: FramebufferAttachments) -> Self {
        if self.attachments.is_some() {
            self.attachments_redeclared = true;
        }
        self.attachments = Some(attachments);
        self
    }

    pub fn pipeline(mut self, pipeline: PipelineDescription) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn entries(&self) -> &[ParameterEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_declaration_order() {
        let a = ImageViewHandle::mint();
        let b = BufferViewHandle::mint();
        let params = PassParameters::new()
            .texture_srv("u_color", a)
            .buffer_cbv("u_frame", b)
            .sampler("u_sampler", SamplerDescription::LINEAR_MIPMAP_LINEAR);
        let names: Vec<_> = params.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["u_color", "u_frame", "u_sampler"]);
    }

    #[test]
    fn second_attachment_block_is_flagged() {
        let params = PassParameters::new()
            .attachments(FramebufferAttachments::new())
            .attachments(FramebufferAttachments::new());
        assert!(params.attachments_redeclared);
    }
}
