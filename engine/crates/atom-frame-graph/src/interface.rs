//! Prepare 阶段交给 scope producer 的接口
//!
//! scope 通过它声明 attachment 的使用方式、工作量估计、队列与设备，
//! 也可以通过 `attachment_database()` 创建 transient attachment 或导入外部资源。

use atom_rhi::{
    RhiError,
    device::{DeviceIndex, HardwareQueueClass, RhiDevice},
};

use crate::{
    attachment::{
        BufferScopeAttachmentDescriptor, ImageScopeAttachmentDescriptor, LoadAction, ScopeAttachmentAccess,
        ScopeAttachmentDescriptor, ScopeAttachmentUsage,
    },
    database::AttachmentDatabase,
    error::{FrameGraphError, FrameGraphResult},
    id::ScopeId,
    scope::{Scope, ScopeAttachment, ScopeAttachmentView},
};

pub struct FrameGraphInterface<'a> {
    scope: &'a mut Scope,
    database: &'a mut AttachmentDatabase,
    device: &'a dyn RhiDevice,
}

// new & init
impl<'a> FrameGraphInterface<'a> {
    pub(crate) fn new(scope: &'a mut Scope, database: &'a mut AttachmentDatabase, device: &'a dyn RhiDevice) -> Self {
        Self {
            scope,
            database,
            device,
        }
    }
}

// getters
impl FrameGraphInterface<'_> {
    #[inline]
    pub fn scope_id(&self) -> &ScopeId {
        &self.scope.id
    }

    #[inline]
    pub fn device(&self) -> &dyn RhiDevice {
        self.device
    }

    /// 在 Prepare 中创建 transient attachment 或导入外部资源
    #[inline]
    pub fn attachment_database(&mut self) -> &mut AttachmentDatabase {
        self.database
    }
}

// attachment 声明
impl FrameGraphInterface<'_> {
    pub fn use_color_attachment(
        &mut self,
        desc: ImageScopeAttachmentDescriptor,
        access: ScopeAttachmentAccess,
    ) -> FrameGraphResult<()> {
        self.use_attachment(ScopeAttachmentUsage::RenderTarget, desc.into(), access)
    }

    pub fn use_depth_stencil_attachment(
        &mut self,
        desc: ImageScopeAttachmentDescriptor,
        access: ScopeAttachmentAccess,
    ) -> FrameGraphResult<()> {
        self.use_attachment(ScopeAttachmentUsage::DepthStencil, desc.into(), access)
    }

    /// 着色器读取（采样）或写入（storage）
    pub fn use_shader_attachment(
        &mut self,
        desc: impl Into<ScopeAttachmentDescriptor>,
        access: ScopeAttachmentAccess,
    ) -> FrameGraphResult<()> {
        self.use_attachment(ScopeAttachmentUsage::Shader, desc.into(), access)
    }

    /// 顶点、索引 buffer，只读
    pub fn use_input_assembly_attachment(&mut self, desc: BufferScopeAttachmentDescriptor) -> FrameGraphResult<()> {
        self.use_attachment(ScopeAttachmentUsage::InputAssembly, desc.into(), ScopeAttachmentAccess::Read)
    }

    /// MSAA resolve 的目标，只写
    pub fn use_resolve_attachment(&mut self, desc: ImageScopeAttachmentDescriptor) -> FrameGraphResult<()> {
        self.use_attachment(ScopeAttachmentUsage::Resolve, desc.into(), ScopeAttachmentAccess::Write)
    }

    /// 拷贝的源（Read）或目标（Write）
    pub fn use_copy_attachment(
        &mut self,
        desc: impl Into<ScopeAttachmentDescriptor>,
        access: ScopeAttachmentAccess,
    ) -> FrameGraphResult<()> {
        self.use_attachment(ScopeAttachmentUsage::Copy, desc.into(), access)
    }

    pub fn use_attachment(
        &mut self,
        usage: ScopeAttachmentUsage,
        desc: ScopeAttachmentDescriptor,
        access: ScopeAttachmentAccess,
    ) -> FrameGraphResult<()> {
        let id = desc.attachment_id().clone();
        let invalid_usage = |reason: String| FrameGraphError::InvalidUsage {
            scope: self.scope.id.clone(),
            attachment: id.clone(),
            reason,
        };

        let attachment = self.database.find(&id).ok_or_else(|| FrameGraphError::UnknownAttachment(id.clone()))?;
        if attachment.attachment_type() != desc.attachment_type() {
            return Err(FrameGraphError::AttachmentTypeMismatch {
                id: id.clone(),
                expected: desc.attachment_type(),
                actual: attachment.attachment_type(),
            });
        }
        if !usage.supports(desc.attachment_type()) {
            return Err(invalid_usage(format!("{usage:?} cannot be used with a {} attachment", desc.attachment_type())));
        }
        if self.scope.uses(&id) {
            return Err(invalid_usage("attachment is already used by this scope".to_string()));
        }

        let (view, load_store) = match desc {
            ScopeAttachmentDescriptor::Image(desc) => (ScopeAttachmentView::Image(desc.view), desc.load_store),
            ScopeAttachmentDescriptor::Buffer(desc) => (ScopeAttachmentView::Buffer(desc.view), desc.load_store),
        };
        if load_store.load_action == LoadAction::Clear && !access.is_write() {
            return Err(invalid_usage("clear load action requires write access".to_string()));
        }

        self.scope.attachments.push(ScopeAttachment {
            attachment_id: id,
            usage,
            access,
            load_store,
            view,
        });
        Ok(())
    }
}

// 调度参数
impl FrameGraphInterface<'_> {
    /// Execute 时要提交的工作项数量，决定 command list 的划分
    #[inline]
    pub fn set_estimated_item_count(&mut self, count: u32) {
        self.scope.estimated_item_count = count;
    }

    /// 当前 scope 在 `scope` 之后执行，与 attachment 无关
    pub fn execute_after(&mut self, scope: impl Into<ScopeId>) {
        let scope = scope.into();
        if !self.scope.execute_after.contains(&scope) {
            self.scope.execute_after.push(scope);
        }
    }

    /// 当前 scope 在 `scope` 之前执行，与 attachment 无关
    pub fn execute_before(&mut self, scope: impl Into<ScopeId>) {
        let scope = scope.into();
        if !self.scope.execute_before.contains(&scope) {
            self.scope.execute_before.push(scope);
        }
    }

    #[inline]
    pub fn set_hardware_queue_class(&mut self, queue: HardwareQueueClass) {
        self.scope.queue = queue;
    }

    pub fn set_device_index(&mut self, device: DeviceIndex) -> FrameGraphResult<()> {
        let device_count = self.device.device_count();
        if device.0 >= device_count {
            return Err(RhiError::InvalidDevice { device, device_count }.into());
        }
        self.scope.device = device;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ash::vk;
    use atom_rhi::{
        resources::{
            buffer::BufferDescriptor,
            clear::ClearValue,
            image::{ImageDescriptor, ImageViewDescriptor},
        },
        soft::{SoftDevice, SoftDeviceDesc},
    };

    use super::*;
    use crate::attachment::{LoadStoreAction, TransientBufferDescriptor, TransientImageDescriptor};

    fn database() -> AttachmentDatabase {
        let mut db = AttachmentDatabase::new();
        db.create_transient_image(TransientImageDescriptor::new(
            "Color",
            ImageDescriptor::new_2d(8, 8, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::empty()),
        ))
        .unwrap();
        db.create_transient_buffer(TransientBufferDescriptor::new(
            "Vertices",
            BufferDescriptor::new(256, vk::BufferUsageFlags::empty()),
        ))
        .unwrap();
        db
    }

    #[test]
    fn test_declarations() {
        let device = SoftDevice::default();
        let mut db = database();
        let mut scope = Scope::new("Forward".into());
        let mut interface = FrameGraphInterface::new(&mut scope, &mut db, &device);

        interface
            .use_color_attachment(
                ImageScopeAttachmentDescriptor::new("Color")
                    .with_view(ImageViewDescriptor::mip(0))
                    .with_load_store(LoadStoreAction::clear(ClearValue::color(1.0, 0.0, 0.0, 1.0))),
                ScopeAttachmentAccess::Write,
            )
            .unwrap();
        interface.use_input_assembly_attachment(BufferScopeAttachmentDescriptor::new("Vertices")).unwrap();
        interface.set_estimated_item_count(3);
        interface.execute_after("Shadow");
        interface.execute_after("Shadow");

        assert_eq!(scope.attachments().len(), 2);
        assert_eq!(scope.attachments()[1].access, ScopeAttachmentAccess::Read);
        assert_eq!(scope.estimated_item_count(), 3);
        assert_eq!(scope.execute_after().len(), 1);
    }

    #[test]
    fn test_invalid_declarations() {
        let device = SoftDevice::default();
        let mut db = database();
        let mut scope = Scope::new("Forward".into());
        let mut interface = FrameGraphInterface::new(&mut scope, &mut db, &device);

        assert!(matches!(
            interface.use_color_attachment(ImageScopeAttachmentDescriptor::new("Missing"), ScopeAttachmentAccess::Write),
            Err(FrameGraphError::UnknownAttachment(_))
        ));
        assert!(matches!(
            interface.use_color_attachment(ImageScopeAttachmentDescriptor::new("Vertices"), ScopeAttachmentAccess::Write),
            Err(FrameGraphError::AttachmentTypeMismatch { .. })
        ));
        assert!(matches!(
            interface.use_shader_attachment(
                ImageScopeAttachmentDescriptor::new("Color")
                    .with_load_store(LoadStoreAction::clear(ClearValue::default())),
                ScopeAttachmentAccess::Read
            ),
            Err(FrameGraphError::InvalidUsage { .. })
        ));

        interface.use_shader_attachment(ImageScopeAttachmentDescriptor::new("Color"), ScopeAttachmentAccess::Read).unwrap();
        assert!(matches!(
            interface.use_copy_attachment(ImageScopeAttachmentDescriptor::new("Color"), ScopeAttachmentAccess::Read),
            Err(FrameGraphError::InvalidUsage { .. })
        ));
    }

    #[test]
    fn test_device_index_is_validated() {
        let device = SoftDevice::new(SoftDeviceDesc {
            device_count: 2,
            ..Default::default()
        });
        let mut db = AttachmentDatabase::new();
        let mut scope = Scope::new("Copy".into());
        let mut interface = FrameGraphInterface::new(&mut scope, &mut db, &device);

        interface.set_device_index(DeviceIndex(1)).unwrap();
        assert!(matches!(
            interface.set_device_index(DeviceIndex(2)),
            Err(FrameGraphError::Rhi(RhiError::InvalidDevice { .. }))
        ));
        interface.set_hardware_queue_class(HardwareQueueClass::Copy);
        assert_eq!(scope.device(), DeviceIndex(1));
        assert_eq!(scope.queue(), HardwareQueueClass::Copy);
    }
}
