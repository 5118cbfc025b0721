//! Backend error type.

use crate::sync::MemoryPropertyFlags;
use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum RhiError {
    #[error("out of device memory (requested {size} bytes)")]
    OutOfMemory { size: u64 },

    #[error("no memory type matches filter {type_filter:#x} with properties {properties:?}")]
    NoSuitableMemoryType {
        type_filter: u32,
        properties: MemoryPropertyFlags,
    },

    #[error("invalid resource description: {0}")]
    InvalidDescription(String),

    #[error("unsupported on this backend: {0}")]
    Unsupported(String),
}
