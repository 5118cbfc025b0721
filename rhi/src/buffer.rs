//! Buffer descriptions.

use bitflags::bitflags;

bitflags! {
    #[derive(Default)]
    pub struct BufferUsageFlags: u32 {
        const VERTEX                       = 0b0000_0001;
        const INDEX                        = 0b0000_0010;
        const CONSTANT                     = 0b0000_0100;
        const STORAGE                      = 0b0000_1000;
        const TRANSFER_SRC                 = 0b0001_0000;
        const TRANSFER_DST                 = 0b0010_0000;
        const ACCELERATION_STRUCTURE_INPUT = 0b0100_0000;
        const HOST_VISIBLE                 = 0b1000_0000;
    }
}

/// Description of a buffer resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferDescription {
    pub name: String,
    pub size: u64,
    /// Element stride for structured access, 0 when irrelevant.
    pub stride: u32,
    pub usage: BufferUsageFlags,
}

impl Default for BufferDescription {
    fn default() -> Self {
        BufferDescription {
            name: String::new(),
            size: 0,
            stride: 0,
            usage: BufferUsageFlags::empty(),
        }
    }
}
