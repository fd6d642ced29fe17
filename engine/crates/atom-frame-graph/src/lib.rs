//! Atom FrameGraph
//!
//! 声明式的 GPU 命令提交调度：
//! - scope producer 在 Prepare 中声明对 attachment 的读写
//! - FrameGraph 根据声明建立依赖、线性化、计算 transient 别名与 barrier
//! - 按估计的工作量把 scope 划分到多个 command list，并行录制后按队列提交
//!
//! 入口是 [`FrameScheduler`]：注册长期存在的 [`ScopeProducer`]，每帧调用
//! [`FrameScheduler::execute_frame`]，只参与当前帧的 producer 通过 [`FrameGraphBuilder`] 传入。
//!
//! # 使用示例
//!
//! ```ignore
//! let mut scheduler = FrameScheduler::new(SoftDevice::default(), FrameSchedulerConfig::default())?;
//!
//! scheduler.register_scope_producer(Box::new(FnScopeProducer::new(
//!     "DepthPrePass",
//!     (),
//!     |_, frame| {
//!         frame.attachment_database().create_transient_image(TransientImageDescriptor::new("Depth", depth_desc))?;
//!         frame.use_depth_stencil_attachment(
//!             ImageScopeAttachmentDescriptor::new("Depth")
//!                 .with_load_store(LoadStoreAction::clear(ClearValue::depth_stencil(1.0, 0))),
//!             ScopeAttachmentAccess::Write,
//!         )?;
//!         Ok(())
//!     },
//!     |_, _| Ok(()),
//!     |_, context| {
//!         context.command_list().submit_draw(&draw_item, 0)?;
//!         Ok(())
//!     },
//! )))?;
//!
//! loop {
//!     let statistics = scheduler.execute_frame(FrameGraphBuilder::new())?;
//! }
//! ```

pub mod attachment;
pub mod barrier;
pub mod builder;
pub mod compiler;
pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod graph;
pub mod id;
pub mod interface;
pub mod lifetime;
pub mod partition;
pub mod producer;
pub mod readback;
pub mod scheduler;
pub mod scope;
pub mod transient_pool;

pub use attachment::{
    AttachmentLifetimeType, AttachmentType, BufferScopeAttachmentDescriptor, ImageScopeAttachmentDescriptor,
    LoadAction, LoadStoreAction, ScopeAttachmentAccess, ScopeAttachmentUsage, StoreAction, TransientBufferDescriptor,
    TransientImageDescriptor,
};
pub use builder::FrameGraphBuilder;
pub use config::FrameSchedulerConfig;
pub use context::{FrameGraphCompileContext, FrameGraphExecuteContext, ScopeAttachmentLookup};
pub use database::{AttachmentDatabase, AttachmentDescriptor, AttachmentResource, AttachmentState};
pub use error::{FrameGraphError, FrameGraphResult};
pub use id::{AttachmentId, ScopeId};
pub use interface::FrameGraphInterface;
pub use producer::{FnScopeProducer, ScopeProducer};
pub use readback::{AttachmentReadback, ReadbackCallback, ReadbackResult};
pub use scheduler::{FrameScheduler, FrameStatistics};
pub use scope::ScopeState;
