//! attachment 回读
//!
//! `AttachmentReadback` 本身是一个 scope producer：请求之后的下一帧把 attachment 拷贝到
//! host 可见的 buffer，之后每次 `tick` 查询提交是否完成，完成时读出数据并调用回调。
//! 整个过程不阻塞 FrameGraph。
//!
//! 拷贝没有被执行或没有被提交（scope 被剔除、录制失败、提交失败）时，回读 buffer 被释放，
//! 请求被丢弃，回调不会被调用。
//!
//! image 回读 mip 0 / layer 0，数据按行紧密排列、左上角为原点；通道顺序由调用者解释。

use anyhow::Context;
use atom_rhi::{
    commands::item::{CopyBufferDescriptor, CopyImageToBufferDescriptor, CopyItem},
    device::{DeviceIndex, RhiDevice, SubmitId},
    resources::buffer::{BufferDescriptor, BufferHandle},
};
use parking_lot::Mutex;

use crate::{
    attachment::{BufferScopeAttachmentDescriptor, ImageScopeAttachmentDescriptor, ScopeAttachmentAccess},
    context::FrameGraphExecuteContext,
    database::AttachmentDescriptor,
    id::{AttachmentId, ScopeId},
    interface::FrameGraphInterface,
    producer::ScopeProducer,
};

/// 回读的结果
#[derive(Clone, Debug)]
pub struct ReadbackResult {
    pub attachment_id: AttachmentId,
    pub descriptor: AttachmentDescriptor,
    pub data: Vec<u8>,
}

pub type ReadbackCallback = Box<dyn FnOnce(ReadbackResult) + Send>;

enum ReadbackState {
    Idle,
    /// 等待下一帧的 Prepare
    Requested {
        attachment_id: AttachmentId,
        callback: ReadbackCallback,
    },
    /// 已创建回读 buffer
    ///
    /// `recorded` 在 Execute 中录制拷贝时写入，提交成功后移动到 `submit`
    Copying {
        attachment_id: AttachmentId,
        callback: ReadbackCallback,
        descriptor: AttachmentDescriptor,
        buffer: BufferHandle,
        byte_size: u64,
        recorded: Option<(SubmitId, DeviceIndex)>,
        submit: Option<(SubmitId, DeviceIndex)>,
    },
}

pub struct AttachmentReadback {
    scope_id: ScopeId,
    state: Mutex<ReadbackState>,
}

// new & init
impl AttachmentReadback {
    pub fn new(scope_id: impl Into<ScopeId>) -> Self {
        Self {
            scope_id: scope_id.into(),
            state: Mutex::new(ReadbackState::Idle),
        }
    }
}

impl AttachmentReadback {
    /// 请求回读，上一次回读还没有完成时返回 false
    pub fn read_attachment(&self, attachment_id: impl Into<AttachmentId>, callback: ReadbackCallback) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, ReadbackState::Idle) {
            return false;
        }
        *state = ReadbackState::Requested {
            attachment_id: attachment_id.into(),
            callback,
        };
        true
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        matches!(*self.state.lock(), ReadbackState::Idle)
    }

    /// 提交完成时读出数据并调用回调，返回回调是否被调用
    pub fn tick(&self, device: &dyn RhiDevice) -> bool {
        let mut state = self.state.lock();
        let ReadbackState::Copying {
            buffer,
            byte_size,
            submit: Some((submit_id, device_index)),
            ..
        } = *state
        else {
            return false;
        };
        if !device.is_submit_complete(submit_id) {
            return false;
        }

        let ReadbackState::Copying {
            attachment_id,
            callback,
            descriptor,
            ..
        } = std::mem::replace(&mut *state, ReadbackState::Idle)
        else {
            return false;
        };
        drop(state);

        let data = device.read_buffer(buffer, device_index, 0, byte_size);
        device.destroy_buffer(buffer);
        match data {
            Ok(data) => {
                log::debug!("readback of `{attachment_id}` completed: {} bytes", data.len());
                callback(ReadbackResult {
                    attachment_id,
                    descriptor,
                    data,
                });
                true
            }
            Err(err) => {
                log::error!("failed to read back `{attachment_id}`: {err}");
                false
            }
        }
    }

    /// 释放还没有完成的回读 buffer
    pub fn cancel(&self, device: &dyn RhiDevice) {
        if let ReadbackState::Copying { buffer, .. } = std::mem::replace(&mut *self.state.lock(), ReadbackState::Idle) {
            device.destroy_buffer(buffer);
        }
    }
}

impl ScopeProducer for AttachmentReadback {
    #[inline]
    fn scope_id(&self) -> &ScopeId {
        &self.scope_id
    }

    fn prepare(&mut self, frame: &mut FrameGraphInterface<'_>) -> anyhow::Result<()> {
        let state = self.state.get_mut();

        // 上一帧声明的拷贝没有进入 Execute
        if let ReadbackState::Copying {
            attachment_id,
            buffer,
            submit: None,
            ..
        } = state
        {
            log::warn!("readback of `{attachment_id}` dropped: the copy scope did not execute");
            frame.device().destroy_buffer(*buffer);
            *state = ReadbackState::Idle;
            return Ok(());
        }

        if !matches!(state, ReadbackState::Requested { .. }) {
            return Ok(());
        }
        let ReadbackState::Requested { attachment_id, callback } = std::mem::replace(state, ReadbackState::Idle) else {
            return Ok(());
        };

        let Some(attachment) = frame.attachment_database().find(&attachment_id) else {
            log::warn!("readback of `{attachment_id}` dropped: attachment does not exist in this frame");
            return Ok(());
        };
        let descriptor = attachment.descriptor;
        let byte_size = match &descriptor {
            AttachmentDescriptor::Image(desc) => desc
                .subresource_size()
                .with_context(|| format!("cannot read back `{attachment_id}` with format {:?}", desc.format))?,
            AttachmentDescriptor::Buffer(desc) => desc.byte_size,
        };

        match descriptor {
            AttachmentDescriptor::Image(_) => frame.use_copy_attachment(
                ImageScopeAttachmentDescriptor::new(attachment_id.clone()),
                ScopeAttachmentAccess::Read,
            )?,
            AttachmentDescriptor::Buffer(_) => frame.use_copy_attachment(
                BufferScopeAttachmentDescriptor::new(attachment_id.clone()),
                ScopeAttachmentAccess::Read,
            )?,
        }
        frame.set_estimated_item_count(1);

        let buffer = frame
            .device()
            .create_buffer(&format!("{attachment_id}-readback"), &BufferDescriptor::readback(byte_size))?;
        *state = ReadbackState::Copying {
            attachment_id,
            callback,
            descriptor,
            buffer,
            byte_size,
            recorded: None,
            submit: None,
        };
        Ok(())
    }

    fn execute(&self, context: &mut FrameGraphExecuteContext<'_>) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        let ReadbackState::Copying {
            attachment_id,
            descriptor,
            buffer,
            byte_size,
            recorded,
            submit,
            ..
        } = &mut *state
        else {
            return Ok(());
        };
        if submit.is_some() || recorded.is_some() || !context.submit_range().contains(0) {
            return Ok(());
        }

        let item = match descriptor {
            AttachmentDescriptor::Image(desc) => {
                let image = context
                    .attachments()
                    .get_image(attachment_id)
                    .with_context(|| format!("`{attachment_id}` is not resolved"))?;
                let extent = desc.extent();
                CopyItem::ImageToBuffer(CopyImageToBufferDescriptor {
                    source: image,
                    source_origin: [0, 0, 0],
                    size: [extent.width, extent.height, extent.depth],
                    destination: *buffer,
                    destination_offset: 0,
                    destination_bytes_per_row: 0,
                })
            }
            AttachmentDescriptor::Buffer(_) => {
                let source = context
                    .attachments()
                    .get_buffer(attachment_id)
                    .with_context(|| format!("`{attachment_id}` is not resolved"))?;
                CopyItem::Buffer(CopyBufferDescriptor {
                    source,
                    source_offset: 0,
                    destination: *buffer,
                    destination_offset: 0,
                    size: *byte_size,
                })
            }
        };

        context.command_list().submit_copy(&item, 0)?;
        *recorded = Some((context.submit_id(), context.device_index()));
        Ok(())
    }

    fn frame_end(&mut self, device: &dyn RhiDevice, submitted: bool) {
        let state = self.state.get_mut();
        let ReadbackState::Copying {
            attachment_id,
            buffer,
            recorded,
            submit,
            ..
        } = state
        else {
            return;
        };
        // 之前的帧已经提交，等待 tick
        if submit.is_some() {
            return;
        }

        match recorded.take() {
            Some(recorded) if submitted => *submit = Some(recorded),
            _ => {
                log::warn!("readback of `{attachment_id}` dropped: the copy was not submitted");
                device.destroy_buffer(*buffer);
                *state = ReadbackState::Idle;
            }
        }
    }
}
