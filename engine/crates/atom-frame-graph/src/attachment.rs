//! attachment 与 scope attachment 的声明类型
//!
//! scope 在 Prepare 中用 `ScopeAttachmentUsage` + `ScopeAttachmentAccess` 声明对 attachment 的使用，
//! 这里负责把声明映射为 RHI 的资源状态（stage / access / layout）以及 transient 资源需要的 usage flags。

use std::fmt::{Display, Formatter};

use ash::vk;
use atom_rhi::{
    device::HardwareQueueClass,
    resources::{
        buffer::{BufferDescriptor, BufferViewDescriptor},
        clear::ClearValue,
        image::{ImageDescriptor, ImageViewDescriptor},
    },
    state::{BufferState, ImageState},
};

use crate::id::AttachmentId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttachmentType {
    Image,
    Buffer,
}

impl Display for AttachmentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Buffer => f.write_str("buffer"),
        }
    }
}

/// attachment 的生命周期
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttachmentLifetimeType {
    /// 只在当前帧有效，由 FrameGraph 分配，可能与其他 transient 共享内存
    Transient,
    /// 外部资源，FrameGraph 只记录使用方式
    Imported,
    /// 由 scheduler 持有、每帧自动导入的资源，状态跨帧延续
    Persistent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScopeAttachmentAccess {
    Read,
    Write,
    ReadWrite,
}

impl ScopeAttachmentAccess {
    #[inline]
    pub fn is_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    #[inline]
    pub fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoadAction {
    Clear,
    #[default]
    Load,
    DontCare,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StoreAction {
    #[default]
    Store,
    DontCare,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LoadStoreAction {
    pub load_action: LoadAction,
    pub store_action: StoreAction,
    /// `None` 时使用 transient attachment 的 optimized clear value
    pub clear_value: Option<ClearValue>,
}

impl LoadStoreAction {
    #[inline]
    pub fn clear(value: ClearValue) -> Self {
        Self {
            load_action: LoadAction::Clear,
            store_action: StoreAction::Store,
            clear_value: Some(value),
        }
    }

    #[inline]
    pub fn dont_care() -> Self {
        Self {
            load_action: LoadAction::DontCare,
            store_action: StoreAction::Store,
            clear_value: None,
        }
    }

    /// builder
    #[inline]
    pub fn with_store_action(mut self, store_action: StoreAction) -> Self {
        self.store_action = store_action;
        self
    }
}

/// scope 以何种方式使用 attachment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScopeAttachmentUsage {
    RenderTarget,
    DepthStencil,
    Shader,
    InputAssembly,
    Resolve,
    Copy,
}

impl ScopeAttachmentUsage {
    /// 该用法是否可以作用于某种 attachment
    pub fn supports(self, attachment_type: AttachmentType) -> bool {
        match self {
            Self::RenderTarget | Self::DepthStencil | Self::Resolve => attachment_type == AttachmentType::Image,
            Self::InputAssembly => attachment_type == AttachmentType::Buffer,
            Self::Shader | Self::Copy => true,
        }
    }

    /// 该用法下 image 需要处于的状态
    pub fn image_state(self, access: ScopeAttachmentAccess, queue: HardwareQueueClass) -> ImageState {
        use ScopeAttachmentAccess::*;

        match (self, access) {
            (Self::RenderTarget, Read) => ImageState::new(
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags2::COLOR_ATTACHMENT_READ,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ),
            (Self::RenderTarget, Write) | (Self::Resolve, _) => ImageState::COLOR_ATTACHMENT_WRITE,
            (Self::RenderTarget, ReadWrite) => ImageState::COLOR_ATTACHMENT_READ_WRITE,

            (Self::DepthStencil, Read) => ImageState::DEPTH_STENCIL_READ,
            (Self::DepthStencil, Write) => ImageState::DEPTH_STENCIL_WRITE,
            (Self::DepthStencil, ReadWrite) => ImageState::DEPTH_STENCIL_READ_WRITE,

            (Self::Shader, access) => {
                let state = match (queue, access) {
                    (HardwareQueueClass::Graphics, Read) => ImageState::SHADER_READ_GRAPHICS,
                    (HardwareQueueClass::Graphics, Write) => ImageState::STORAGE_WRITE_GRAPHICS,
                    (HardwareQueueClass::Graphics, ReadWrite) => ImageState::STORAGE_READ_WRITE_GRAPHICS,
                    (_, Read) => ImageState::SHADER_READ_COMPUTE,
                    (_, Write) => ImageState::STORAGE_WRITE_COMPUTE,
                    (_, ReadWrite) => ImageState::STORAGE_READ_WRITE_COMPUTE,
                };
                ImageState {
                    stage: state.stage | shader_stages(queue),
                    ..state
                }
            }

            (Self::Copy, Read) => ImageState::TRANSFER_SRC,
            (Self::Copy, _) => ImageState::TRANSFER_DST,

            (Self::InputAssembly, _) => ImageState::GENERAL,
        }
    }

    /// 该用法下 buffer 需要处于的状态
    pub fn buffer_state(self, access: ScopeAttachmentAccess, queue: HardwareQueueClass) -> BufferState {
        use ScopeAttachmentAccess::*;

        match (self, access) {
            (Self::InputAssembly, _) => BufferState::INPUT_ASSEMBLY,
            (Self::Shader, access) => {
                let state = match (queue, access) {
                    (HardwareQueueClass::Graphics, Read) => BufferState::SHADER_READ_GRAPHICS,
                    (HardwareQueueClass::Graphics, Write) => BufferState::STORAGE_WRITE_GRAPHICS,
                    (HardwareQueueClass::Graphics, ReadWrite) => BufferState::STORAGE_READ_WRITE_GRAPHICS,
                    (_, Read) => BufferState::SHADER_READ_COMPUTE,
                    (_, Write) => BufferState::STORAGE_WRITE_COMPUTE,
                    (_, ReadWrite) => BufferState::STORAGE_READ_WRITE_COMPUTE,
                };
                BufferState {
                    stage: state.stage | shader_stages(queue),
                    ..state
                }
            }
            (Self::Copy, Read) => BufferState::TRANSFER_SRC,
            (Self::Copy, _) => BufferState::TRANSFER_DST,
            (Self::RenderTarget | Self::DepthStencil | Self::Resolve, _) => BufferState::UNDEFINED,
        }
    }

    /// transient image 需要带上的 usage flags
    pub fn required_image_usage(self, access: ScopeAttachmentAccess) -> vk::ImageUsageFlags {
        match self {
            Self::RenderTarget | Self::Resolve => vk::ImageUsageFlags::COLOR_ATTACHMENT,
            Self::DepthStencil => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            Self::Shader if access.is_write() => vk::ImageUsageFlags::STORAGE,
            Self::Shader => vk::ImageUsageFlags::SAMPLED,
            Self::Copy if access.is_write() => vk::ImageUsageFlags::TRANSFER_DST,
            Self::Copy => vk::ImageUsageFlags::TRANSFER_SRC,
            Self::InputAssembly => vk::ImageUsageFlags::empty(),
        }
    }

    /// transient buffer 需要带上的 usage flags
    pub fn required_buffer_usage(self, access: ScopeAttachmentAccess) -> vk::BufferUsageFlags {
        match self {
            Self::InputAssembly => vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::INDEX_BUFFER,
            Self::Shader => vk::BufferUsageFlags::STORAGE_BUFFER,
            Self::Copy if access.is_write() => vk::BufferUsageFlags::TRANSFER_DST,
            Self::Copy => vk::BufferUsageFlags::TRANSFER_SRC,
            Self::RenderTarget | Self::DepthStencil | Self::Resolve => vk::BufferUsageFlags::empty(),
        }
    }
}

/// 着色器读写额外覆盖的 stage：graphics 队列上也可能执行 dispatch
fn shader_stages(queue: HardwareQueueClass) -> vk::PipelineStageFlags2 {
    match queue {
        HardwareQueueClass::Graphics => vk::PipelineStageFlags2::COMPUTE_SHADER,
        HardwareQueueClass::Compute => vk::PipelineStageFlags2::COMPUTE_SHADER,
        HardwareQueueClass::Copy => vk::PipelineStageFlags2::ALL_COMMANDS,
    }
}

/// scope 对一个 image attachment 的声明
#[derive(Clone, Debug, PartialEq)]
pub struct ImageScopeAttachmentDescriptor {
    pub attachment_id: AttachmentId,
    pub view: ImageViewDescriptor,
    pub load_store: LoadStoreAction,
}

impl ImageScopeAttachmentDescriptor {
    pub fn new(attachment_id: impl Into<AttachmentId>) -> Self {
        Self {
            attachment_id: attachment_id.into(),
            view: ImageViewDescriptor::default(),
            load_store: LoadStoreAction::default(),
        }
    }

    /// builder
    #[inline]
    pub fn with_view(mut self, view: ImageViewDescriptor) -> Self {
        self.view = view;
        self
    }

    /// builder
    #[inline]
    pub fn with_load_store(mut self, load_store: LoadStoreAction) -> Self {
        self.load_store = load_store;
        self
    }
}

/// scope 对一个 buffer attachment 的声明
#[derive(Clone, Debug, PartialEq)]
pub struct BufferScopeAttachmentDescriptor {
    pub attachment_id: AttachmentId,
    pub view: BufferViewDescriptor,
    pub load_store: LoadStoreAction,
}

impl BufferScopeAttachmentDescriptor {
    pub fn new(attachment_id: impl Into<AttachmentId>) -> Self {
        Self {
            attachment_id: attachment_id.into(),
            view: BufferViewDescriptor::default(),
            load_store: LoadStoreAction::default(),
        }
    }

    /// builder
    #[inline]
    pub fn with_view(mut self, view: BufferViewDescriptor) -> Self {
        self.view = view;
        self
    }

    /// builder
    #[inline]
    pub fn with_load_store(mut self, load_store: LoadStoreAction) -> Self {
        self.load_store = load_store;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ScopeAttachmentDescriptor {
    Image(ImageScopeAttachmentDescriptor),
    Buffer(BufferScopeAttachmentDescriptor),
}

impl ScopeAttachmentDescriptor {
    #[inline]
    pub fn attachment_id(&self) -> &AttachmentId {
        match self {
            Self::Image(desc) => &desc.attachment_id,
            Self::Buffer(desc) => &desc.attachment_id,
        }
    }

    #[inline]
    pub fn attachment_type(&self) -> AttachmentType {
        match self {
            Self::Image(_) => AttachmentType::Image,
            Self::Buffer(_) => AttachmentType::Buffer,
        }
    }
}

impl From<ImageScopeAttachmentDescriptor> for ScopeAttachmentDescriptor {
    fn from(desc: ImageScopeAttachmentDescriptor) -> Self {
        Self::Image(desc)
    }
}

impl From<BufferScopeAttachmentDescriptor> for ScopeAttachmentDescriptor {
    fn from(desc: BufferScopeAttachmentDescriptor) -> Self {
        Self::Buffer(desc)
    }
}

/// 创建 transient image 的参数
#[derive(Clone, Debug, PartialEq)]
pub struct TransientImageDescriptor {
    pub attachment_id: AttachmentId,
    pub descriptor: ImageDescriptor,
    /// `LoadAction::Clear` 没有指定 clear value 时使用
    pub optimized_clear_value: Option<ClearValue>,
}

impl TransientImageDescriptor {
    pub fn new(attachment_id: impl Into<AttachmentId>, descriptor: ImageDescriptor) -> Self {
        Self {
            attachment_id: attachment_id.into(),
            descriptor,
            optimized_clear_value: None,
        }
    }

    /// builder
    #[inline]
    pub fn with_optimized_clear_value(mut self, value: ClearValue) -> Self {
        self.optimized_clear_value = Some(value);
        self
    }
}

/// 创建 transient buffer 的参数
#[derive(Clone, Debug, PartialEq)]
pub struct TransientBufferDescriptor {
    pub attachment_id: AttachmentId,
    pub descriptor: BufferDescriptor,
}

impl TransientBufferDescriptor {
    pub fn new(attachment_id: impl Into<AttachmentId>, descriptor: BufferDescriptor) -> Self {
        Self {
            attachment_id: attachment_id.into(),
            descriptor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_supports_type() {
        assert!(ScopeAttachmentUsage::RenderTarget.supports(AttachmentType::Image));
        assert!(!ScopeAttachmentUsage::DepthStencil.supports(AttachmentType::Buffer));
        assert!(!ScopeAttachmentUsage::InputAssembly.supports(AttachmentType::Image));
        assert!(ScopeAttachmentUsage::Copy.supports(AttachmentType::Buffer));
    }

    #[test]
    fn test_image_state_mapping() {
        use ScopeAttachmentAccess::*;
        let gfx = HardwareQueueClass::Graphics;

        assert_eq!(ScopeAttachmentUsage::DepthStencil.image_state(Write, gfx), ImageState::DEPTH_STENCIL_WRITE);
        assert_eq!(ScopeAttachmentUsage::Copy.image_state(Read, gfx), ImageState::TRANSFER_SRC);

        let sampled = ScopeAttachmentUsage::Shader.image_state(Read, gfx);
        assert_eq!(sampled.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert!(sampled.stage.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::COMPUTE_SHADER));

        let storage = ScopeAttachmentUsage::Shader.image_state(ReadWrite, HardwareQueueClass::Compute);
        assert_eq!(storage, ImageState::STORAGE_READ_WRITE_COMPUTE);
        assert!(storage.is_write());
    }

    #[test]
    fn test_required_usage() {
        use ScopeAttachmentAccess::*;
        assert_eq!(
            ScopeAttachmentUsage::Shader.required_image_usage(Write),
            vk::ImageUsageFlags::STORAGE
        );
        assert_eq!(
            ScopeAttachmentUsage::Copy.required_buffer_usage(Read),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
    }
}
