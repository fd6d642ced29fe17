//! 当前帧的 attachment 表
//!
//! 记录每个 attachment 的描述、生命周期、初始状态以及解析后的物理资源。
//! imported / persistent attachment 在导入时即解析完成；transient attachment 在编译、分配之后才解析。

use atom_rhi::{
    resources::{
        buffer::{BufferDescriptor, BufferHandle, BufferView, BufferViewDescriptor},
        clear::ClearValue,
        image::{ImageDescriptor, ImageHandle, ImageView, ImageViewDescriptor},
    },
    state::{BufferState, ImageState},
};
use indexmap::IndexMap;

use crate::{
    attachment::{AttachmentLifetimeType, AttachmentType, TransientBufferDescriptor, TransientImageDescriptor},
    error::{FrameGraphError, FrameGraphResult},
    id::AttachmentId,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentDescriptor {
    Image(ImageDescriptor),
    Buffer(BufferDescriptor),
}

impl AttachmentDescriptor {
    #[inline]
    pub fn attachment_type(&self) -> AttachmentType {
        match self {
            Self::Image(_) => AttachmentType::Image,
            Self::Buffer(_) => AttachmentType::Buffer,
        }
    }

    #[inline]
    pub fn as_image(&self) -> Option<&ImageDescriptor> {
        match self {
            Self::Image(desc) => Some(desc),
            Self::Buffer(_) => None,
        }
    }

    #[inline]
    pub fn as_buffer(&self) -> Option<&BufferDescriptor> {
        match self {
            Self::Buffer(desc) => Some(desc),
            Self::Image(_) => None,
        }
    }
}

/// attachment 解析后的物理资源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentResource {
    Image(ImageHandle),
    Buffer(BufferHandle),
}

/// 资源状态，用于描述 attachment 进入当前帧时的状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentState {
    Image(ImageState),
    Buffer(BufferState),
}

#[derive(Clone, Debug)]
pub struct FrameAttachment {
    pub id: AttachmentId,
    pub lifetime: AttachmentLifetimeType,
    pub descriptor: AttachmentDescriptor,
    pub initial_state: AttachmentState,
    pub optimized_clear_value: Option<ClearValue>,
    pub(crate) resource: Option<AttachmentResource>,
}

impl FrameAttachment {
    #[inline]
    pub fn attachment_type(&self) -> AttachmentType {
        self.descriptor.attachment_type()
    }

    #[inline]
    pub fn resource(&self) -> Option<AttachmentResource> {
        self.resource
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        self.lifetime == AttachmentLifetimeType::Transient
    }
}

#[derive(Default)]
pub struct AttachmentDatabase {
    attachments: IndexMap<AttachmentId, FrameAttachment>,
}

// new & init
impl AttachmentDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

// 注册
impl AttachmentDatabase {
    /// 注册只在当前帧有效的 image，物理资源在编译后分配
    pub fn create_transient_image(&mut self, desc: TransientImageDescriptor) -> FrameGraphResult<()> {
        desc.descriptor.validate().map_err(|reason| FrameGraphError::InvalidDescriptor {
            id: desc.attachment_id.clone(),
            reason,
        })?;

        self.insert(FrameAttachment {
            id: desc.attachment_id,
            lifetime: AttachmentLifetimeType::Transient,
            descriptor: AttachmentDescriptor::Image(desc.descriptor),
            initial_state: AttachmentState::Image(ImageState::UNDEFINED),
            optimized_clear_value: desc.optimized_clear_value,
            resource: None,
        })
    }

    pub fn create_transient_buffer(&mut self, desc: TransientBufferDescriptor) -> FrameGraphResult<()> {
        if desc.descriptor.byte_size == 0 {
            return Err(FrameGraphError::InvalidDescriptor {
                id: desc.attachment_id,
                reason: "buffer size is zero".to_string(),
            });
        }

        self.insert(FrameAttachment {
            id: desc.attachment_id,
            lifetime: AttachmentLifetimeType::Transient,
            descriptor: AttachmentDescriptor::Buffer(desc.descriptor),
            initial_state: AttachmentState::Buffer(BufferState::UNDEFINED),
            optimized_clear_value: None,
            resource: None,
        })
    }

    /// 导入外部 image
    ///
    /// `initial_state` 是 image 当前所处的状态，作为第一个 barrier 的 src
    pub fn import_image(
        &mut self,
        id: impl Into<AttachmentId>,
        image: ImageHandle,
        descriptor: ImageDescriptor,
        initial_state: ImageState,
    ) -> FrameGraphResult<()> {
        self.import(
            id.into(),
            AttachmentLifetimeType::Imported,
            AttachmentResource::Image(image),
            AttachmentDescriptor::Image(descriptor),
            AttachmentState::Image(initial_state),
        )
    }

    pub fn import_buffer(
        &mut self,
        id: impl Into<AttachmentId>,
        buffer: BufferHandle,
        descriptor: BufferDescriptor,
        initial_state: BufferState,
    ) -> FrameGraphResult<()> {
        self.import(
            id.into(),
            AttachmentLifetimeType::Imported,
            AttachmentResource::Buffer(buffer),
            AttachmentDescriptor::Buffer(descriptor),
            AttachmentState::Buffer(initial_state),
        )
    }

    pub(crate) fn import(
        &mut self,
        id: AttachmentId,
        lifetime: AttachmentLifetimeType,
        resource: AttachmentResource,
        descriptor: AttachmentDescriptor,
        initial_state: AttachmentState,
    ) -> FrameGraphResult<()> {
        self.insert(FrameAttachment {
            id,
            lifetime,
            descriptor,
            initial_state,
            optimized_clear_value: None,
            resource: Some(resource),
        })
    }

    fn insert(&mut self, attachment: FrameAttachment) -> FrameGraphResult<()> {
        if self.attachments.contains_key(&attachment.id) {
            return Err(FrameGraphError::DuplicateAttachment(attachment.id));
        }
        self.attachments.insert(attachment.id.clone(), attachment);
        Ok(())
    }
}

// 查询
impl AttachmentDatabase {
    #[inline]
    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.attachments.contains_key(id)
    }

    #[inline]
    pub fn find(&self, id: &str) -> Option<&FrameAttachment> {
        self.attachments.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameAttachment> {
        self.attachments.values()
    }

    /// 覆盖整个 image 的 view，解析之前返回 `None`
    pub fn get_image_view(&self, id: &str) -> Option<ImageView> {
        self.image_view(id, ImageViewDescriptor::default())
    }

    /// 覆盖整个 buffer 的 view，解析之前返回 `None`
    pub fn get_buffer_view(&self, id: &str) -> Option<BufferView> {
        self.buffer_view(id, BufferViewDescriptor::default())
    }

    pub(crate) fn image_view(&self, id: &str, descriptor: ImageViewDescriptor) -> Option<ImageView> {
        match self.find(id)?.resource? {
            AttachmentResource::Image(image) => Some(ImageView { image, descriptor }),
            AttachmentResource::Buffer(_) => None,
        }
    }

    pub(crate) fn buffer_view(&self, id: &str, descriptor: BufferViewDescriptor) -> Option<BufferView> {
        match self.find(id)?.resource? {
            AttachmentResource::Buffer(buffer) => Some(BufferView { buffer, descriptor }),
            AttachmentResource::Image(_) => None,
        }
    }

    #[inline]
    pub(crate) fn index_of(&self, id: &str) -> Option<usize> {
        self.attachments.get_index_of(id)
    }

    #[inline]
    pub(crate) fn get_index(&self, index: usize) -> Option<&FrameAttachment> {
        self.attachments.get_index(index).map(|(_, attachment)| attachment)
    }
}

// 帧内维护
impl AttachmentDatabase {
    /// 撤销某个位置之后注册的 attachment，Prepare 失败时回滚
    pub(crate) fn truncate(&mut self, len: usize) {
        self.attachments.truncate(len);
    }

    pub(crate) fn resolve(&mut self, index: usize, resource: AttachmentResource) {
        if let Some((_, attachment)) = self.attachments.get_index_mut(index) {
            attachment.resource = Some(resource);
        }
    }

    /// 清除所有 transient attachment 的解析结果
    pub(crate) fn unresolve_transients(&mut self) {
        for attachment in self.attachments.values_mut().filter(|a| a.is_transient()) {
            attachment.resource = None;
        }
    }

    /// transient 描述需要补上 scope 用法要求的 usage flags
    pub(crate) fn descriptor_mut(&mut self, index: usize) -> Option<&mut AttachmentDescriptor> {
        self.attachments.get_index_mut(index).map(|(_, attachment)| &mut attachment.descriptor)
    }
}
