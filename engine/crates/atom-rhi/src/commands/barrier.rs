//! 已解析到物理资源的 barrier
//!
//! 由 FrameGraph 根据状态转换计算，交给 `CommandList::pipeline_barrier` 录制。

use ash::vk;

use crate::{
    resources::{buffer::BufferHandle, image::ImageHandle},
    state::{BufferState, ImageState},
};

/// 图像 barrier
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: ImageHandle,
    pub src_state: ImageState,
    pub dst_state: ImageState,
    /// 图像 aspect（COLOR / DEPTH / STENCIL）
    pub aspect: vk::ImageAspectFlags,
}

impl ImageBarrier {
    #[inline]
    pub fn new(image: ImageHandle, src_state: ImageState, dst_state: ImageState) -> Self {
        Self {
            image,
            src_state,
            dst_state,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }

    /// builder
    #[inline]
    pub fn with_aspect(mut self, aspect: vk::ImageAspectFlags) -> Self {
        self.aspect = aspect;
        self
    }

    #[inline]
    pub fn is_layout_transition(&self) -> bool {
        self.src_state.layout != self.dst_state.layout
    }

    /// 转换为 vk 结构体，需要提供实际的 `vk::Image`
    ///
    /// 覆盖所有 mip 与 layer
    pub fn to_vk(&self, image: vk::Image) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2 {
            src_stage_mask: self.src_state.stage,
            src_access_mask: self.src_state.src_access(),
            dst_stage_mask: self.dst_state.stage,
            dst_access_mask: self.dst_state.access,
            old_layout: self.src_state.layout,
            new_layout: self.dst_state.layout,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: self.aspect,
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count: vk::REMAINING_ARRAY_LAYERS,
            },
            ..Default::default()
        }
    }
}

/// 缓冲区 barrier，覆盖整个 buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: BufferHandle,
    pub src_state: BufferState,
    pub dst_state: BufferState,
}

impl BufferBarrier {
    #[inline]
    pub fn new(buffer: BufferHandle, src_state: BufferState, dst_state: BufferState) -> Self {
        Self {
            buffer,
            src_state,
            dst_state,
        }
    }

    pub fn to_vk(&self, buffer: vk::Buffer) -> vk::BufferMemoryBarrier2<'static> {
        vk::BufferMemoryBarrier2 {
            src_stage_mask: self.src_state.stage,
            src_access_mask: self.src_state.src_access(),
            dst_stage_mask: self.dst_state.stage,
            dst_access_mask: self.dst_state.access,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            buffer,
            offset: 0,
            size: vk::WHOLE_SIZE,
            ..Default::default()
        }
    }
}
