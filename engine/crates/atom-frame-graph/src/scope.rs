use atom_rhi::{
    device::{DeviceIndex, HardwareQueueClass},
    resources::{buffer::BufferViewDescriptor, image::ImageViewDescriptor},
    state::{BufferState, ImageState},
};

use crate::{
    attachment::{AttachmentType, LoadAction, LoadStoreAction, ScopeAttachmentAccess, ScopeAttachmentUsage},
    id::{AttachmentId, ScopeId},
};

/// scope 在一帧中的进度
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ScopeState {
    #[default]
    Unregistered,
    Prepared,
    Compiled,
    Executed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeAttachmentView {
    Image(ImageViewDescriptor),
    Buffer(BufferViewDescriptor),
}

impl ScopeAttachmentView {
    #[inline]
    pub fn attachment_type(&self) -> AttachmentType {
        match self {
            Self::Image(_) => AttachmentType::Image,
            Self::Buffer(_) => AttachmentType::Buffer,
        }
    }
}

/// scope 在 Prepare 中声明的一次 attachment 使用
#[derive(Clone, Debug, PartialEq)]
pub struct ScopeAttachment {
    pub attachment_id: AttachmentId,
    pub usage: ScopeAttachmentUsage,
    pub access: ScopeAttachmentAccess,
    pub load_store: LoadStoreAction,
    pub view: ScopeAttachmentView,
}

impl ScopeAttachment {
    /// 计算依赖与 barrier 时使用的访问方式
    ///
    /// render target / depth stencil 以 Load 方式写入时会先读取原有内容
    pub fn effective_access(&self) -> ScopeAttachmentAccess {
        let loads_previous = matches!(self.usage, ScopeAttachmentUsage::RenderTarget | ScopeAttachmentUsage::DepthStencil)
            && self.load_store.load_action == LoadAction::Load;
        if self.access == ScopeAttachmentAccess::Write && loads_previous {
            ScopeAttachmentAccess::ReadWrite
        } else {
            self.access
        }
    }

    #[inline]
    pub fn image_state(&self, queue: HardwareQueueClass) -> ImageState {
        self.usage.image_state(self.effective_access(), queue)
    }

    #[inline]
    pub fn buffer_state(&self, queue: HardwareQueueClass) -> BufferState {
        self.usage.buffer_state(self.effective_access(), queue)
    }

    #[inline]
    pub fn clears(&self) -> bool {
        self.load_store.load_action == LoadAction::Clear
    }
}

/// 一帧中的 scope：Prepare 收集到的全部声明
#[derive(Clone, Debug)]
pub struct Scope {
    pub(crate) id: ScopeId,
    pub(crate) attachments: Vec<ScopeAttachment>,
    pub(crate) estimated_item_count: u32,
    pub(crate) queue: HardwareQueueClass,
    pub(crate) device: DeviceIndex,
    pub(crate) execute_after: Vec<ScopeId>,
    pub(crate) execute_before: Vec<ScopeId>,
}

// new & init
impl Scope {
    pub fn new(id: ScopeId) -> Self {
        Self {
            id,
            attachments: Vec::new(),
            estimated_item_count: 0,
            queue: HardwareQueueClass::Graphics,
            device: DeviceIndex::PRIMARY,
            execute_after: Vec::new(),
            execute_before: Vec::new(),
        }
    }
}

// getters
impl Scope {
    #[inline]
    pub fn id(&self) -> &ScopeId {
        &self.id
    }

    #[inline]
    pub fn attachments(&self) -> &[ScopeAttachment] {
        &self.attachments
    }

    #[inline]
    pub fn estimated_item_count(&self) -> u32 {
        self.estimated_item_count
    }

    #[inline]
    pub fn queue(&self) -> HardwareQueueClass {
        self.queue
    }

    #[inline]
    pub fn device(&self) -> DeviceIndex {
        self.device
    }

    #[inline]
    pub fn execute_after(&self) -> &[ScopeId] {
        &self.execute_after
    }

    #[inline]
    pub fn execute_before(&self) -> &[ScopeId] {
        &self.execute_before
    }

    pub fn find_attachment(&self, id: &str) -> Option<&ScopeAttachment> {
        self.attachments.iter().find(|a| a.attachment_id.as_str() == id)
    }

    #[inline]
    pub fn uses(&self, id: &str) -> bool {
        self.find_attachment(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use atom_rhi::resources::clear::ClearValue;

    use super::*;

    fn attachment(usage: ScopeAttachmentUsage, access: ScopeAttachmentAccess, load_store: LoadStoreAction) -> ScopeAttachment {
        ScopeAttachment {
            attachment_id: "Color".into(),
            usage,
            access,
            load_store,
            view: ScopeAttachmentView::Image(ImageViewDescriptor::default()),
        }
    }

    #[test]
    fn test_effective_access() {
        let load = attachment(ScopeAttachmentUsage::RenderTarget, ScopeAttachmentAccess::Write, LoadStoreAction::default());
        assert_eq!(load.effective_access(), ScopeAttachmentAccess::ReadWrite);
        assert_eq!(load.image_state(HardwareQueueClass::Graphics), ImageState::COLOR_ATTACHMENT_READ_WRITE);

        let clear = attachment(
            ScopeAttachmentUsage::RenderTarget,
            ScopeAttachmentAccess::Write,
            LoadStoreAction::clear(ClearValue::color(0.0, 0.0, 0.0, 1.0)),
        );
        assert_eq!(clear.effective_access(), ScopeAttachmentAccess::Write);
        assert!(clear.clears());

        let dont_care =
            attachment(ScopeAttachmentUsage::DepthStencil, ScopeAttachmentAccess::Write, LoadStoreAction::dont_care());
        assert_eq!(dont_care.image_state(HardwareQueueClass::Graphics), ImageState::DEPTH_STENCIL_WRITE);

        // 着色器写入不会 load
        let storage = attachment(ScopeAttachmentUsage::Shader, ScopeAttachmentAccess::Write, LoadStoreAction::default());
        assert_eq!(storage.effective_access(), ScopeAttachmentAccess::Write);
    }

    #[test]
    fn test_find_attachment() {
        let mut scope = Scope::new("Forward".into());
        scope.attachments.push(attachment(
            ScopeAttachmentUsage::RenderTarget,
            ScopeAttachmentAccess::Write,
            LoadStoreAction::default(),
        ));
        assert!(scope.uses("Color"));
        assert!(!scope.uses("Depth"));
        assert_eq!(scope.queue(), HardwareQueueClass::Graphics);
        assert_eq!(scope.device(), DeviceIndex::PRIMARY);
    }
}
