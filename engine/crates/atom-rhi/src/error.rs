use ash::vk;

use crate::device::{DeviceIndex, HardwareQueueClass};

/// RHI 层的错误
#[derive(Debug, thiserror::Error)]
pub enum RhiError {
    #[error("device {device} is out of range, device count is {device_count}")]
    InvalidDevice { device: DeviceIndex, device_count: u32 },

    #[error("out of device memory: requested {requested} bytes, {available} bytes available")]
    OutOfMemory { requested: u64, available: u64 },

    #[error("invalid {0} handle")]
    InvalidHandle(&'static str),

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("buffer `{0}` is not host visible")]
    NotHostVisible(String),

    #[error("pipeline state `{name}` cannot be used for {usage}")]
    PipelineMismatch { name: String, usage: &'static str },

    #[error("{command} is not supported on the {queue} queue")]
    UnsupportedQueue {
        command: &'static str,
        queue: HardwareQueueClass,
    },

    #[error("viewport and scissor must be set in the current scope before drawing")]
    ViewportNotSet,

    #[error("submit index {index} is outside of the assigned range [{start}, {end})")]
    SubmitIndexOutOfRange { index: u32, start: u32, end: u32 },

    #[error("threads per group {requested:?} do not match numthreads {declared:?} of pipeline `{name}`")]
    ThreadGroupMismatch {
        name: String,
        requested: [u16; 3],
        declared: [u16; 3],
    },

    #[error("root constants of {size} bytes exceed the {capacity} bytes declared by pipeline `{name}`")]
    RootConstantsOverflow { name: String, size: usize, capacity: u32 },

    #[error("indexed draw without an index buffer view")]
    MissingIndexBuffer,

    #[error("copy out of bounds: {0}")]
    CopyOutOfBounds(String),

    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("unsupported format {0:?}")]
    UnsupportedFormat(vk::Format),

    #[error("vulkan error: {0}")]
    Vulkan(#[from] vk::Result),
}

pub type RhiResult<T> = Result<T, RhiError>;
