//! Compile / Execute 阶段交给 scope producer 的上下文
//!
//! 两种上下文都只能查询 scope 自己在 Prepare 中声明过的 attachment，
//! 未声明的 id 一律返回 `None`。

use atom_rhi::{
    commands::command_list::{CommandList, SubmitRange},
    device::{DeviceIndex, HardwareQueueClass, RhiDevice, SubmitId},
    resources::{
        buffer::{BufferDescriptor, BufferHandle, BufferView},
        image::{ImageDescriptor, ImageHandle, ImageView},
    },
};

use crate::{
    database::{AttachmentDatabase, AttachmentResource},
    id::ScopeId,
    scope::{Scope, ScopeAttachment, ScopeAttachmentView},
};

/// 只暴露 scope 已声明的 attachment
#[derive(Clone, Copy)]
pub struct ScopeAttachmentLookup<'a> {
    scope: &'a Scope,
    database: &'a AttachmentDatabase,
}

impl<'a> ScopeAttachmentLookup<'a> {
    pub(crate) fn new(scope: &'a Scope, database: &'a AttachmentDatabase) -> Self {
        Self { scope, database }
    }

    #[inline]
    pub fn scope_id(&self) -> &'a ScopeId {
        &self.scope.id
    }

    #[inline]
    pub fn scope_attachments(&self) -> &'a [ScopeAttachment] {
        &self.scope.attachments
    }

    /// 按声明时的 view 描述解析
    pub fn get_image_view(&self, id: &str) -> Option<ImageView> {
        match self.scope.find_attachment(id)?.view {
            ScopeAttachmentView::Image(view) => self.database.image_view(id, view),
            ScopeAttachmentView::Buffer(_) => None,
        }
    }

    pub fn get_buffer_view(&self, id: &str) -> Option<BufferView> {
        match self.scope.find_attachment(id)?.view {
            ScopeAttachmentView::Buffer(view) => self.database.buffer_view(id, view),
            ScopeAttachmentView::Image(_) => None,
        }
    }

    pub fn get_image(&self, id: &str) -> Option<ImageHandle> {
        match self.resource(id)? {
            AttachmentResource::Image(image) => Some(image),
            AttachmentResource::Buffer(_) => None,
        }
    }

    pub fn get_buffer(&self, id: &str) -> Option<BufferHandle> {
        match self.resource(id)? {
            AttachmentResource::Buffer(buffer) => Some(buffer),
            AttachmentResource::Image(_) => None,
        }
    }

    pub fn image_descriptor(&self, id: &str) -> Option<ImageDescriptor> {
        self.declared(id)?;
        self.database.find(id)?.descriptor.as_image().copied()
    }

    pub fn buffer_descriptor(&self, id: &str) -> Option<BufferDescriptor> {
        self.declared(id)?;
        self.database.find(id)?.descriptor.as_buffer().copied()
    }

    fn resource(&self, id: &str) -> Option<AttachmentResource> {
        self.declared(id)?;
        self.database.find(id)?.resource()
    }

    #[inline]
    fn declared(&self, id: &str) -> Option<&'a ScopeAttachment> {
        self.scope.find_attachment(id)
    }
}

/// Compile 阶段：所有 Prepare 完成，attachment 已解析
///
/// 在这里更新 SRG、查询 view；不能再声明 attachment
pub struct FrameGraphCompileContext<'a> {
    attachments: ScopeAttachmentLookup<'a>,
    device: &'a dyn RhiDevice,
}

impl<'a> FrameGraphCompileContext<'a> {
    pub(crate) fn new(attachments: ScopeAttachmentLookup<'a>, device: &'a dyn RhiDevice) -> Self {
        Self { attachments, device }
    }
}

// getters
impl<'a> FrameGraphCompileContext<'a> {
    #[inline]
    pub fn device(&self) -> &'a dyn RhiDevice {
        self.device
    }

    #[inline]
    pub fn device_index(&self) -> DeviceIndex {
        self.attachments.scope.device
    }

    #[inline]
    pub fn scope_id(&self) -> &'a ScopeId {
        self.attachments.scope_id()
    }

    #[inline]
    pub fn attachments(&self) -> &ScopeAttachmentLookup<'a> {
        &self.attachments
    }

    #[inline]
    pub fn get_image_view(&self, id: &str) -> Option<ImageView> {
        self.attachments.get_image_view(id)
    }

    #[inline]
    pub fn get_buffer_view(&self, id: &str) -> Option<BufferView> {
        self.attachments.get_buffer_view(id)
    }
}

/// Execute 阶段：向 command list 提交工作项
///
/// 一个 scope 被划分为多个 command list 时，每个 command list 都有独立的 context，
/// 只提交 `submit_range` 内的工作项
pub struct FrameGraphExecuteContext<'a> {
    attachments: ScopeAttachmentLookup<'a>,
    command_list: &'a mut dyn CommandList,
    command_list_index: u32,
    command_list_count: u32,
    submit_range: SubmitRange,
    submit_id: SubmitId,
}

impl<'a> FrameGraphExecuteContext<'a> {
    pub(crate) fn new(
        attachments: ScopeAttachmentLookup<'a>,
        command_list: &'a mut dyn CommandList,
        command_list_index: u32,
        command_list_count: u32,
        submit_range: SubmitRange,
        submit_id: SubmitId,
    ) -> Self {
        Self {
            attachments,
            command_list,
            command_list_index,
            command_list_count,
            submit_range,
            submit_id,
        }
    }
}

// getters
impl<'a> FrameGraphExecuteContext<'a> {
    #[inline]
    pub fn command_list(&mut self) -> &mut dyn CommandList {
        &mut *self.command_list
    }

    #[inline]
    pub fn device_index(&self) -> DeviceIndex {
        self.attachments.scope.device
    }

    #[inline]
    pub fn queue_class(&self) -> HardwareQueueClass {
        self.attachments.scope.queue
    }

    #[inline]
    pub fn command_list_index(&self) -> u32 {
        self.command_list_index
    }

    #[inline]
    pub fn command_list_count(&self) -> u32 {
        self.command_list_count
    }

    #[inline]
    pub fn submit_range(&self) -> SubmitRange {
        self.submit_range
    }

    /// 录制的命令会随这次提交执行
    #[inline]
    pub fn submit_id(&self) -> SubmitId {
        self.submit_id
    }

    #[inline]
    pub fn scope_id(&self) -> &'a ScopeId {
        self.attachments.scope_id()
    }

    #[inline]
    pub fn attachments(&self) -> &ScopeAttachmentLookup<'a> {
        &self.attachments
    }

    #[inline]
    pub fn get_image_view(&self, id: &str) -> Option<ImageView> {
        self.attachments.get_image_view(id)
    }

    #[inline]
    pub fn get_buffer_view(&self, id: &str) -> Option<BufferView> {
        self.attachments.get_buffer_view(id)
    }
}

#[cfg(test)]
mod tests {
    use ash::vk;
    use atom_rhi::resources::image::ImageViewDescriptor;
    use slotmap::KeyData;

    use super::*;
    use crate::attachment::{LoadStoreAction, ScopeAttachmentAccess, ScopeAttachmentUsage};

    #[test]
    fn test_undeclared_lookup_returns_none() {
        let mut db = AttachmentDatabase::new();
        let desc = ImageDescriptor::new_2d(4, 4, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::SAMPLED);
        let image = ImageHandle::from(KeyData::from_ffi(1));
        db.import_image("Declared", image, desc, Default::default()).unwrap();
        db.import_image("Other", image, desc, Default::default()).unwrap();

        let mut scope = Scope::new("Post".into());
        scope.attachments.push(ScopeAttachment {
            attachment_id: "Declared".into(),
            usage: ScopeAttachmentUsage::Shader,
            access: ScopeAttachmentAccess::Read,
            load_store: LoadStoreAction::default(),
            view: ScopeAttachmentView::Image(ImageViewDescriptor::mip(0)),
        });

        let lookup = ScopeAttachmentLookup::new(&scope, &db);
        let view = lookup.get_image_view("Declared").unwrap();
        assert_eq!(view.image, image);
        assert_eq!(view.descriptor, ImageViewDescriptor::mip(0));
        assert_eq!(lookup.image_descriptor("Declared"), Some(desc));

        // 数据库中存在，但 scope 没有声明
        assert!(lookup.get_image_view("Other").is_none());
        assert!(lookup.get_image("Other").is_none());
        assert!(lookup.get_buffer_view("Declared").is_none());
        assert!(lookup.get_image_view("Missing").is_none());
    }
}
