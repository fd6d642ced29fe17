use atom_rhi::device::RhiDevice;

use crate::{
    context::{FrameGraphCompileContext, FrameGraphExecuteContext},
    id::ScopeId,
    interface::FrameGraphInterface,
};

/// 一个 scope 的工作单元
///
/// 每帧依次经历：
/// 1. `prepare`：声明 attachment 的使用方式，所有 scope 串行执行；
/// 2. `compile`：attachment 已解析，查询 view、更新 SRG，不同 scope 并行执行；
/// 3. `execute`：向 command list 提交工作项，不同 scope、不同 command list 并行执行；
/// 4. `frame_end`：录制的 command list 提交之后调用。
///
/// 任何一步返回错误时，该 scope 在当前帧被跳过，其他 scope 不受影响
pub trait ScopeProducer: Send + Sync {
    fn scope_id(&self) -> &ScopeId;

    /// 只做声明，同样的输入应当得到同样的声明
    fn prepare(&mut self, frame: &mut FrameGraphInterface<'_>) -> anyhow::Result<()>;

    fn compile(&mut self, _context: &FrameGraphCompileContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// 只提交 `context.submit_range()` 内的工作项
    fn execute(&self, context: &mut FrameGraphExecuteContext<'_>) -> anyhow::Result<()>;

    /// `submitted` 为 false 时，本帧为该 scope 录制的命令不会在 GPU 上执行
    ///
    /// 只有进入 Execute 的 scope 会收到这个调用
    fn frame_end(&mut self, _device: &dyn RhiDevice, _submitted: bool) {}
}

/// 由闭包组成的 scope producer，捕获的数据由 `data` 持有
pub struct FnScopeProducer<D, P, C, E> {
    scope_id: ScopeId,
    data: D,
    prepare: P,
    compile: C,
    execute: E,
}

impl<D, P, C, E> FnScopeProducer<D, P, C, E>
where
    D: Send + Sync,
    P: FnMut(&mut D, &mut FrameGraphInterface<'_>) -> anyhow::Result<()> + Send + Sync,
    C: FnMut(&mut D, &FrameGraphCompileContext<'_>) -> anyhow::Result<()> + Send + Sync,
    E: Fn(&D, &mut FrameGraphExecuteContext<'_>) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(scope_id: impl Into<ScopeId>, data: D, prepare: P, compile: C, execute: E) -> Self {
        Self {
            scope_id: scope_id.into(),
            data,
            prepare,
            compile,
            execute,
        }
    }
}

// getters
impl<D, P, C, E> FnScopeProducer<D, P, C, E> {
    #[inline]
    pub fn data(&self) -> &D {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut D {
        &mut self.data
    }
}

impl<D, P, C, E> ScopeProducer for FnScopeProducer<D, P, C, E>
where
    D: Send + Sync,
    P: FnMut(&mut D, &mut FrameGraphInterface<'_>) -> anyhow::Result<()> + Send + Sync,
    C: FnMut(&mut D, &FrameGraphCompileContext<'_>) -> anyhow::Result<()> + Send + Sync,
    E: Fn(&D, &mut FrameGraphExecuteContext<'_>) -> anyhow::Result<()> + Send + Sync,
{
    #[inline]
    fn scope_id(&self) -> &ScopeId {
        &self.scope_id
    }

    fn prepare(&mut self, frame: &mut FrameGraphInterface<'_>) -> anyhow::Result<()> {
        (self.prepare)(&mut self.data, frame)
    }

    fn compile(&mut self, context: &FrameGraphCompileContext<'_>) -> anyhow::Result<()> {
        (self.compile)(&mut self.data, context)
    }

    fn execute(&self, context: &mut FrameGraphExecuteContext<'_>) -> anyhow::Result<()> {
        (self.execute)(&self.data, context)
    }
}
