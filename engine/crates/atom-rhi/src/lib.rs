//! Atom RHI
//!
//! FrameGraph 与具体图形 API 之间的一层：
//! - 资源描述（image / buffer / view / pipeline state / SRG）
//! - 资源状态（stage + access + layout），用于 barrier 计算
//! - DrawItem / DispatchItem / CopyItem 以及 `CommandList` 抽象
//! - 多设备（multi-GPU）的索引类型
//! - `soft`：纯 CPU 的参考后端，用于测试与回读
//! - `vulkan`：把命令翻译为 ash 调用

pub mod commands;
pub mod device;
pub mod error;
pub mod format;
pub mod resources;
pub mod soft;
pub mod state;
pub mod vulkan;

pub use error::{RhiError, RhiResult};
