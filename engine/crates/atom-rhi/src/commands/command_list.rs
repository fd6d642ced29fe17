use std::ops::Range;

use crate::{
    RhiError, RhiResult,
    commands::{
        barrier::{BufferBarrier, ImageBarrier},
        item::{CopyItem, DispatchItem, DrawItem, Scissor, Viewport},
    },
    device::{DeviceIndex, HardwareQueueClass},
    resources::{buffer::BufferHandle, clear::ClearValue, image::ImageHandle},
    state::ImageState,
};

/// 一个 command list 负责的工作项区间 `[start, end)`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SubmitRange {
    pub start: u32,
    pub end: u32,
}

impl SubmitRange {
    #[inline]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    #[inline]
    pub const fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    #[inline]
    pub const fn contains(&self, index: u32) -> bool {
        self.start <= index && index < self.end
    }

    #[inline]
    pub fn indices(&self) -> Range<u32> {
        self.start..self.end
    }
}

/// 命令录制接口
///
/// 每个 command list 只在一个线程上录制；不同 command list 可以并行录制。
/// 同一个 command list 中的命令保持提交顺序。
pub trait CommandList: Send {
    fn device_index(&self) -> DeviceIndex;
    fn queue_class(&self) -> HardwareQueueClass;

    /// 开始录制一个 scope，viewport / scissor 状态在此重置
    fn begin_scope(&mut self, name: &str, submit_range: SubmitRange);
    fn end_scope(&mut self);

    fn set_viewports(&mut self, viewports: &[Viewport]);
    fn set_scissors(&mut self, scissors: &[Scissor]);

    /// `submit_index` 必须位于当前 scope 的 submit range 内
    fn submit_draw(&mut self, item: &DrawItem<'_>, submit_index: u32) -> RhiResult<()>;
    fn submit_dispatch(&mut self, item: &DispatchItem<'_>, submit_index: u32) -> RhiResult<()>;
    fn submit_copy(&mut self, item: &CopyItem, submit_index: u32) -> RhiResult<()>;

    fn pipeline_barrier(&mut self, image_barriers: &[ImageBarrier], buffer_barriers: &[BufferBarrier]);

    /// `state` 是 image 当前所处的状态
    fn clear_image(&mut self, image: ImageHandle, state: ImageState, value: &ClearValue) -> RhiResult<()>;
    fn clear_buffer(&mut self, buffer: BufferHandle, value: &ClearValue) -> RhiResult<()>;
}

/// scope 内的录制状态，各个后端共享这部分校验
#[derive(Clone, Debug, Default)]
pub struct ScopeRecordingState {
    scope_name: Option<String>,
    submit_range: SubmitRange,
    viewport_set: bool,
    scissor_set: bool,
}

impl ScopeRecordingState {
    pub fn begin(&mut self, name: &str, submit_range: SubmitRange) {
        if let Some(previous) = &self.scope_name {
            log::warn!("scope `{previous}` was not ended before `{name}` began");
        }
        *self = Self {
            scope_name: Some(name.to_string()),
            submit_range,
            viewport_set: false,
            scissor_set: false,
        };
    }

    pub fn end(&mut self) {
        *self = Self::default();
    }

    #[inline]
    pub fn scope_name(&self) -> Option<&str> {
        self.scope_name.as_deref()
    }

    #[inline]
    pub fn submit_range(&self) -> SubmitRange {
        self.submit_range
    }

    #[inline]
    pub fn set_viewport(&mut self) {
        self.viewport_set = true;
    }

    #[inline]
    pub fn set_scissor(&mut self) {
        self.scissor_set = true;
    }

    pub fn check_submit_index(&self, index: u32) -> RhiResult<()> {
        if self.submit_range.contains(index) {
            Ok(())
        } else {
            Err(RhiError::SubmitIndexOutOfRange {
                index,
                start: self.submit_range.start,
                end: self.submit_range.end,
            })
        }
    }

    pub fn check_draw_state(&self) -> RhiResult<()> {
        if self.viewport_set && self.scissor_set { Ok(()) } else { Err(RhiError::ViewportNotSet) }
    }
}
