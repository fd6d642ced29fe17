//! Barrier 自动计算
//!
//! 按线性执行顺序模拟每个 attachment 的状态变化，生成 scope 开始前需要的 barrier。
//! 同一个 layout 下的连续读取共用一次写入后的同步，不会重复插入 barrier。

use std::collections::HashMap;

use ash::vk;
use atom_rhi::state::{BufferState, ImageState};

use crate::database::AttachmentState;

/// 图像 Barrier 描述
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageBarrierDesc {
    /// attachment 索引（当前帧的 attachment 表）
    pub attachment: usize,
    pub src_state: ImageState,
    pub dst_state: ImageState,
    /// 图像 aspect（COLOR / DEPTH / STENCIL）
    pub aspect: vk::ImageAspectFlags,
}

impl ImageBarrierDesc {
    pub fn new(attachment: usize, src_state: ImageState, dst_state: ImageState) -> Self {
        Self {
            attachment,
            src_state,
            dst_state,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }

    /// 设置 aspect
    pub fn with_aspect(mut self, aspect: vk::ImageAspectFlags) -> Self {
        self.aspect = aspect;
        self
    }
}

/// 缓冲区 Barrier 描述
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferBarrierDesc {
    pub attachment: usize,
    pub src_state: BufferState,
    pub dst_state: BufferState,
}

impl BufferBarrierDesc {
    pub fn new(attachment: usize, src_state: BufferState, dst_state: BufferState) -> Self {
        Self {
            attachment,
            src_state,
            dst_state,
        }
    }
}

/// scope 执行前需要的 Barrier 集合
#[derive(Clone, Debug, Default)]
pub struct ScopeBarriers {
    pub image_barriers: Vec<ImageBarrierDesc>,
    pub buffer_barriers: Vec<BufferBarrierDesc>,
}

impl ScopeBarriers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_barriers(&self) -> bool {
        !self.image_barriers.is_empty() || !self.buffer_barriers.is_empty()
    }

    pub fn image_barrier_count(&self) -> usize {
        self.image_barriers.len()
    }

    pub fn buffer_barrier_count(&self) -> usize {
        self.buffer_barriers.len()
    }
}

/// 单个资源的同步状态
#[derive(Clone, Copy, Debug)]
struct ResourceTracker {
    layout: vk::ImageLayout,
    /// 最后一次写入（或 layout 转换）的 stage 与写 access
    last_write: Option<(vk::PipelineStageFlags2, vk::AccessFlags2)>,
    /// 最后一次写入之后读取过的 stage
    read_stages: vk::PipelineStageFlags2,
    /// 已经与最后一次写入同步过的 stage / access
    synced_stages: vk::PipelineStageFlags2,
    synced_access: vk::AccessFlags2,
    /// 最后一个使用者要求的状态
    last_state: AttachmentState,
}

impl ResourceTracker {
    fn from_state(state: AttachmentState) -> Self {
        let (stage, access, layout, is_write, src_access) = Self::unpack(&state);
        let idle = stage == vk::PipelineStageFlags2::TOP_OF_PIPE && access == vk::AccessFlags2::NONE;
        Self {
            layout,
            last_write: is_write.then_some((stage, src_access)),
            read_stages: if is_write || idle { vk::PipelineStageFlags2::empty() } else { stage },
            synced_stages: vk::PipelineStageFlags2::empty(),
            synced_access: vk::AccessFlags2::empty(),
            last_state: state,
        }
    }

    fn unpack(
        state: &AttachmentState,
    ) -> (vk::PipelineStageFlags2, vk::AccessFlags2, vk::ImageLayout, bool, vk::AccessFlags2) {
        match state {
            AttachmentState::Image(s) => (s.stage, s.access, s.layout, s.is_write(), s.src_access()),
            AttachmentState::Buffer(s) => (s.stage, s.access, vk::ImageLayout::UNDEFINED, s.is_write(), s.src_access()),
        }
    }

    /// 转换到 `dst`，需要 barrier 时返回 (src stage, src access, old layout)
    fn transition(&mut self, dst: AttachmentState) -> Option<(vk::PipelineStageFlags2, vk::AccessFlags2, vk::ImageLayout)> {
        let (dst_stage, dst_access, dst_layout, dst_is_write, dst_src_access) = Self::unpack(&dst);
        self.last_state = dst;
        let old_layout = self.layout;
        let needs_layout = old_layout != dst_layout;

        if dst_is_write || needs_layout {
            let emit = needs_layout || self.last_write.is_some() || !self.read_stages.is_empty();
            let (write_stage, write_access) = self.last_write.unwrap_or_default();
            let mut src_stage = write_stage | self.read_stages;
            if src_stage.is_empty() {
                src_stage = vk::PipelineStageFlags2::TOP_OF_PIPE;
            }

            self.layout = dst_layout;
            self.read_stages = vk::PipelineStageFlags2::empty();
            if dst_is_write {
                self.last_write = Some((dst_stage, dst_src_access));
                self.synced_stages = vk::PipelineStageFlags2::empty();
                self.synced_access = vk::AccessFlags2::empty();
            } else {
                // layout 转换本身视为一次写入
                self.last_write = Some((dst_stage, vk::AccessFlags2::NONE));
                self.read_stages = dst_stage;
                self.synced_stages = dst_stage;
                self.synced_access = dst_access;
            }

            return emit.then_some((src_stage, write_access, old_layout));
        }

        // 同一 layout 下的读取
        let result = match self.last_write {
            None => None,
            Some(_) if self.synced_stages.contains(dst_stage) && self.synced_access.contains(dst_access) => None,
            Some((write_stage, write_access)) => {
                self.synced_stages |= dst_stage;
                self.synced_access |= dst_access;
                Some((write_stage, write_access, old_layout))
            }
        };
        self.read_stages |= dst_stage;
        result
    }
}

/// Barrier 计算器
///
/// 跟踪每个 attachment 的状态；没有设置初始状态的 attachment 从 UNDEFINED 开始
#[derive(Default)]
pub struct BarrierCalculator {
    trackers: HashMap<usize, ResourceTracker>,
}

impl BarrierCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置 attachment 进入当前帧时的状态
    pub fn set_initial_state(&mut self, attachment: usize, state: AttachmentState) {
        self.trackers.insert(attachment, ResourceTracker::from_state(state));
    }

    /// 复用上一帧的物理资源：等待上一帧的最后一次访问，内容视为未定义
    pub fn set_discarded_state(&mut self, attachment: usize, previous: AttachmentState) {
        let mut tracker = ResourceTracker::from_state(previous);
        tracker.layout = vk::ImageLayout::UNDEFINED;
        self.trackers.insert(attachment, tracker);
    }

    /// `to` 与 `from` 共用内存：继承 `from` 的同步状态，内容视为未定义
    pub fn inherit_alias(&mut self, from: usize, to: usize) {
        if let Some(mut tracker) = self.trackers.get(&from).copied() {
            tracker.layout = vk::ImageLayout::UNDEFINED;
            self.trackers.insert(to, tracker);
        }
    }

    #[inline]
    pub fn is_tracked(&self, attachment: usize) -> bool {
        self.trackers.contains_key(&attachment)
    }

    pub fn require_image(&mut self, attachment: usize, dst: ImageState) -> Option<ImageBarrierDesc> {
        let tracker = self
            .trackers
            .entry(attachment)
            .or_insert_with(|| ResourceTracker::from_state(AttachmentState::Image(ImageState::UNDEFINED)));
        let (stage, access, layout) = tracker.transition(AttachmentState::Image(dst))?;
        Some(ImageBarrierDesc::new(attachment, ImageState::new(stage, access, layout), dst))
    }

    pub fn require_buffer(&mut self, attachment: usize, dst: BufferState) -> Option<BufferBarrierDesc> {
        let tracker = self
            .trackers
            .entry(attachment)
            .or_insert_with(|| ResourceTracker::from_state(AttachmentState::Buffer(BufferState::UNDEFINED)));
        let (stage, access, _) = tracker.transition(AttachmentState::Buffer(dst))?;
        Some(BufferBarrierDesc::new(attachment, BufferState::new(stage, access), dst))
    }

    /// 最后一个使用者要求的状态，作为下一帧的初始状态
    pub fn final_state(&self, attachment: usize) -> Option<AttachmentState> {
        self.trackers.get(&attachment).map(|t| t.last_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_barrier_layout_change() {
        let mut calculator = BarrierCalculator::new();
        let barrier = calculator.require_image(0, ImageState::COLOR_ATTACHMENT_WRITE).unwrap();
        assert_eq!(barrier.src_state.layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.dst_state, ImageState::COLOR_ATTACHMENT_WRITE);
    }

    #[test]
    fn test_image_barrier_write_to_read() {
        let mut calculator = BarrierCalculator::new();
        calculator.require_image(0, ImageState::STORAGE_WRITE_COMPUTE);
        let barrier = calculator.require_image(0, ImageState::SHADER_READ_GRAPHICS).unwrap();
        assert_eq!(barrier.src_state.stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(barrier.src_state.access, vk::AccessFlags2::SHADER_STORAGE_WRITE);
        assert_eq!(barrier.src_state.layout, vk::ImageLayout::GENERAL);

        // 同 layout 的只读到只读可以跳过
        assert!(calculator.require_image(0, ImageState::SHADER_READ_GRAPHICS).is_none());

        // 新的 stage 需要与之前的写入同步
        let barrier = calculator.require_image(0, ImageState::SHADER_READ_COMPUTE).unwrap();
        assert_eq!(barrier.src_state.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(barrier.dst_state.stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
    }

    #[test]
    fn test_write_after_read_waits_for_readers() {
        let mut calculator = BarrierCalculator::new();
        calculator.require_buffer(0, BufferState::TRANSFER_DST);
        calculator.require_buffer(0, BufferState::INPUT_ASSEMBLY).unwrap();
        let barrier = calculator.require_buffer(0, BufferState::STORAGE_WRITE_COMPUTE).unwrap();
        assert!(barrier.src_state.stage.contains(vk::PipelineStageFlags2::VERTEX_INPUT));
        assert!(barrier.src_state.stage.contains(vk::PipelineStageFlags2::TRANSFER));
        assert_eq!(calculator.final_state(0), Some(AttachmentState::Buffer(BufferState::STORAGE_WRITE_COMPUTE)));
    }

    #[test]
    fn test_first_buffer_write_needs_no_barrier() {
        let mut calculator = BarrierCalculator::new();
        assert!(calculator.require_buffer(0, BufferState::TRANSFER_DST).is_none());
        // 写后写
        assert!(calculator.require_buffer(0, BufferState::TRANSFER_DST).is_some());
    }

    #[test]
    fn test_imported_read_state() {
        let mut calculator = BarrierCalculator::new();
        calculator.set_initial_state(0, AttachmentState::Image(ImageState::SHADER_READ_GRAPHICS));
        assert!(calculator.require_image(0, ImageState::SHADER_READ_GRAPHICS).is_none());

        let barrier = calculator.require_image(0, ImageState::COLOR_ATTACHMENT_WRITE).unwrap();
        assert_eq!(barrier.src_state.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(barrier.src_state.access, vk::AccessFlags2::NONE);
    }

    #[test]
    fn test_alias_inherits_sync() {
        let mut calculator = BarrierCalculator::new();
        calculator.require_image(0, ImageState::COLOR_ATTACHMENT_WRITE);
        calculator.require_image(0, ImageState::SHADER_READ_GRAPHICS);
        calculator.inherit_alias(0, 1);
        assert!(calculator.is_tracked(1));

        let barrier = calculator.require_image(1, ImageState::COLOR_ATTACHMENT_WRITE).unwrap();
        assert_eq!(barrier.src_state.layout, vk::ImageLayout::UNDEFINED);
        assert!(barrier.src_state.stage.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
    }

    #[test]
    fn test_discarded_state_waits_for_previous_frame() {
        let mut calculator = BarrierCalculator::new();
        calculator.set_discarded_state(0, AttachmentState::Image(ImageState::COLOR_ATTACHMENT_WRITE));
        let barrier = calculator.require_image(0, ImageState::COLOR_ATTACHMENT_WRITE).unwrap();
        assert_eq!(barrier.src_state.layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.src_state.stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(barrier.src_state.access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);

        // 新建的 buffer 第一次写入不需要 barrier，复用的需要
        let mut calculator = BarrierCalculator::new();
        assert!(calculator.require_buffer(0, BufferState::TRANSFER_DST).is_none());
        calculator.set_discarded_state(1, AttachmentState::Buffer(BufferState::TRANSFER_DST));
        let barrier = calculator.require_buffer(1, BufferState::TRANSFER_DST).unwrap();
        assert_eq!(barrier.src_state.stage, vk::PipelineStageFlags2::TRANSFER);
    }
}
