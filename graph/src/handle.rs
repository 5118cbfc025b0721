//! Typed handles for graph entities.
//!
//! A handle is a process-unique 64-bit value: the kind tag lives in the
//! top byte, the serial in the lower 56 bits. Serial zero is the reserved
//! invalid sentinel, so a defaulted handle never resolves.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

const KIND_SHIFT: u32 = 56;
const SERIAL_MASK: u64 = (1 << KIND_SHIFT) - 1;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub(crate) enum HandleKind {
    Image = 1,
    Buffer = 2,
    ImageView = 3,
    BufferView = 4,
    ResourceGroup = 5,
    AccelerationStructure = 6,
}

fn mint(kind: HandleKind) -> u64 {
    let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
    assert!(serial <= SERIAL_MASK, "handle serial space exhausted");
    ((kind as u64) << KIND_SHIFT) | serial
}

macro_rules! define_handle {
    ($(#[$doc:meta])* $name:ident, $kind:expr) => {
        $(#[$doc])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// The reserved sentinel; never resolves.
            pub const INVALID: $name = $name(($kind as u64) << KIND_SHIFT);

            pub(crate) fn mint() -> $name {
                $name(mint($kind))
            }

            pub fn is_valid(self) -> bool {
                self.0 & SERIAL_MASK != 0
            }

            /// The raw tagged value, usable as a cache key.
            pub fn raw(self) -> u64 {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}(#{})", stringify!($name), self.0 & SERIAL_MASK)
            }
        }
    };
}

define_handle!(
    /// A transient or external image declared in a builder.
    ImageHandle,
    HandleKind::Image
);
define_handle!(
    /// A transient or external buffer declared in a builder.
    BufferHandle,
    HandleKind::Buffer
);
define_handle!(
    /// A typed projection over an image.
    ImageViewHandle,
    HandleKind::ImageView
);
define_handle!(
    /// A typed projection over a buffer.
    BufferViewHandle,
    HandleKind::BufferView
);
define_handle!(
    /// A declared resource group (descriptor set).
    ResourceGroupHandle,
    HandleKind::ResourceGroup
);
define_handle!(
    /// An externally-owned acceleration structure.
    AccelHandle,
    HandleKind::AccelerationStructure
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique() {
        let a = ImageHandle::mint();
        let b = ImageHandle::mint();
        assert_ne!(a, b);
        assert!(a.is_valid() && b.is_valid());
    }

    #[test]
    fn invalid_handles_compare_equal() {
        assert_eq!(ImageHandle::INVALID, ImageHandle::default());
        assert!(!ImageHandle::INVALID.is_valid());
    }

    #[test]
    fn kinds_do_not_collide() {
        // Same serial space, distinct tags.
        assert_ne!(ImageHandle::INVALID.raw(), BufferHandle::INVALID.raw());
    }
}
