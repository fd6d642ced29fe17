//! 纯 CPU 的参考后端
//!
//! 不依赖 GPU，命令在提交时回放到按设备分开的内存中，用于测试与调试 FrameGraph。

mod command_list;
mod device;

pub use command_list::{RecordedCommand, SoftCommandList};
pub use device::{RecordedCommandList, SoftDevice, SoftDeviceDesc, SubmissionRecord};
