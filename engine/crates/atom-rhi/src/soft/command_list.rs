use std::sync::Arc;

use itertools::Itertools;

use super::device::{SoftDeviceInner, image_copy_rows};
use crate::{
    RhiError, RhiResult,
    commands::{
        barrier::{BufferBarrier, ImageBarrier},
        command_list::{CommandList, ScopeRecordingState, SubmitRange},
        item::{CopyItem, DispatchItem, DrawArguments, DrawItem, Scissor, Viewport},
    },
    device::{DeviceIndex, HardwareQueueClass},
    format,
    resources::{
        buffer::{BufferHandle, IndexBufferView, StreamBufferView},
        clear::ClearValue,
        image::ImageHandle,
        pipeline::{PipelineStateHandle, ShaderResourceGroupHandle},
    },
    state::ImageState,
};

/// 软件后端录制下来的命令
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCommand {
    BeginScope {
        name: String,
        submit_range: SubmitRange,
    },
    EndScope,
    SetViewports(Vec<Viewport>),
    SetScissors(Vec<Scissor>),
    Barrier {
        images: Vec<ImageBarrier>,
        buffers: Vec<BufferBarrier>,
    },
    ClearImage {
        image: ImageHandle,
        value: ClearValue,
    },
    ClearBuffer {
        buffer: BufferHandle,
        value: ClearValue,
    },
    Draw {
        submit_index: u32,
        pipeline_state: PipelineStateHandle,
        shader_resource_groups: Vec<ShaderResourceGroupHandle>,
        index_buffer_view: Option<IndexBufferView>,
        stream_buffer_views: Vec<StreamBufferView>,
        arguments: DrawArguments,
        root_constants: Vec<u8>,
    },
    Dispatch {
        submit_index: u32,
        pipeline_state: PipelineStateHandle,
        shader_resource_groups: Vec<ShaderResourceGroupHandle>,
        group_count: [u32; 3],
        root_constants: Vec<u8>,
    },
    Copy {
        submit_index: u32,
        item: CopyItem,
    },
}

/// 软件后端的 command list：只录制，提交时由设备回放
pub struct SoftCommandList {
    name: String,
    device: DeviceIndex,
    queue: HardwareQueueClass,
    shared: Arc<SoftDeviceInner>,
    state: ScopeRecordingState,
    commands: Vec<RecordedCommand>,
}

// new & init
impl SoftCommandList {
    pub(crate) fn new(name: &str, device: DeviceIndex, queue: HardwareQueueClass, shared: Arc<SoftDeviceInner>) -> Self {
        Self {
            name: name.to_string(),
            device,
            queue,
            shared,
            state: ScopeRecordingState::default(),
            commands: Vec::new(),
        }
    }
}

// getters
impl SoftCommandList {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    pub(crate) fn into_commands(self) -> (String, DeviceIndex, HardwareQueueClass, Vec<RecordedCommand>) {
        (self.name, self.device, self.queue, self.commands)
    }
}

// tools
impl SoftCommandList {
    fn check_shader_resource_groups(&self, srgs: &[ShaderResourceGroupHandle]) -> RhiResult<()> {
        let resources = self.shared.resources.read();
        if srgs.iter().all(|srg| resources.srgs.contains_key(*srg)) {
            Ok(())
        } else {
            Err(RhiError::InvalidHandle("shader resource group"))
        }
    }

    fn check_copy(&self, item: &CopyItem) -> RhiResult<()> {
        let resources = self.shared.resources.read();
        let buffer_size = |buffer: BufferHandle| {
            resources
                .buffers
                .get(buffer)
                .map(|b| b.descriptor.byte_size)
                .ok_or(RhiError::InvalidHandle("buffer"))
        };

        match item {
            CopyItem::Buffer(copy) => {
                let src_size = buffer_size(copy.source)?;
                let dst_size = buffer_size(copy.destination)?;
                let fits = |offset: u64, size: u64| offset.checked_add(copy.size).is_some_and(|end| end <= size);
                if !fits(copy.source_offset, src_size) || !fits(copy.destination_offset, dst_size) {
                    return Err(RhiError::CopyOutOfBounds(format!(
                        "{} bytes from offset {} (size {src_size}) to offset {} (size {dst_size})",
                        copy.size, copy.source_offset, copy.destination_offset
                    )));
                }
            }
            CopyItem::BufferToImage(copy) => {
                let image = resources.images.get(copy.destination).ok_or(RhiError::InvalidHandle("image"))?;
                let rows = image_copy_rows(
                    &image.descriptor,
                    copy.destination_origin,
                    copy.size,
                    copy.source_bytes_per_row,
                )?;
                check_rows_in_buffer(&rows, copy.source_offset, buffer_size(copy.source)?)?;
            }
            CopyItem::ImageToBuffer(copy) => {
                let image = resources.images.get(copy.source).ok_or(RhiError::InvalidHandle("image"))?;
                let rows =
                    image_copy_rows(&image.descriptor, copy.source_origin, copy.size, copy.destination_bytes_per_row)?;
                check_rows_in_buffer(&rows, copy.destination_offset, buffer_size(copy.destination)?)?;
            }
        }
        Ok(())
    }
}

fn check_rows_in_buffer(rows: &[(usize, usize, usize)], buffer_offset: u64, buffer_size: u64) -> RhiResult<()> {
    let rows_end = rows.iter().map(|(_, buffer_rel, len)| buffer_rel + len).max().unwrap_or(0) as u64;
    match rows_end.checked_add(buffer_offset) {
        Some(required) if required <= buffer_size => Ok(()),
        required => Err(RhiError::CopyOutOfBounds(format!(
            "image rows need {rows_end} bytes at offset {buffer_offset} ({required:?}), buffer has {buffer_size}"
        ))),
    }
}

impl CommandList for SoftCommandList {
    #[inline]
    fn device_index(&self) -> DeviceIndex {
        self.device
    }

    #[inline]
    fn queue_class(&self) -> HardwareQueueClass {
        self.queue
    }

    fn begin_scope(&mut self, name: &str, submit_range: SubmitRange) {
        self.state.begin(name, submit_range);
        self.commands.push(RecordedCommand::BeginScope {
            name: name.to_string(),
            submit_range,
        });
    }

    fn end_scope(&mut self) {
        self.state.end();
        self.commands.push(RecordedCommand::EndScope);
    }

    fn set_viewports(&mut self, viewports: &[Viewport]) {
        if viewports.is_empty() {
            return;
        }
        self.state.set_viewport();
        self.commands.push(RecordedCommand::SetViewports(viewports.to_vec()));
    }

    fn set_scissors(&mut self, scissors: &[Scissor]) {
        if scissors.is_empty() {
            return;
        }
        self.state.set_scissor();
        self.commands.push(RecordedCommand::SetScissors(scissors.to_vec()));
    }

    fn submit_draw(&mut self, item: &DrawItem<'_>, submit_index: u32) -> RhiResult<()> {
        self.state.check_submit_index(submit_index)?;
        self.state.check_draw_state()?;

        let pipeline = self
            .shared
            .resources
            .read()
            .pipelines
            .get(item.pipeline_state)
            .cloned()
            .ok_or(RhiError::InvalidHandle("pipeline state"))?;
        item.validate(&pipeline, self.queue)?;
        self.check_shader_resource_groups(item.shader_resource_groups)?;

        self.commands.push(RecordedCommand::Draw {
            submit_index,
            pipeline_state: item.pipeline_state,
            shader_resource_groups: item.shader_resource_groups.to_vec(),
            index_buffer_view: item.index_buffer_view,
            stream_buffer_views: item.stream_buffer_views.to_vec(),
            arguments: item.arguments,
            root_constants: item.root_constants.to_vec(),
        });
        Ok(())
    }

    fn submit_dispatch(&mut self, item: &DispatchItem<'_>, submit_index: u32) -> RhiResult<()> {
        self.state.check_submit_index(submit_index)?;

        let pipeline = self
            .shared
            .resources
            .read()
            .pipelines
            .get(item.pipeline_state)
            .cloned()
            .ok_or(RhiError::InvalidHandle("pipeline state"))?;
        item.validate(&pipeline, self.queue)?;
        self.check_shader_resource_groups(item.shader_resource_groups)?;

        self.commands.push(RecordedCommand::Dispatch {
            submit_index,
            pipeline_state: item.pipeline_state,
            shader_resource_groups: item.shader_resource_groups.to_vec(),
            group_count: item.arguments.group_count(),
            root_constants: item.root_constants.to_vec(),
        });
        Ok(())
    }

    fn submit_copy(&mut self, item: &CopyItem, submit_index: u32) -> RhiResult<()> {
        self.state.check_submit_index(submit_index)?;
        self.check_copy(item)?;
        self.commands.push(RecordedCommand::Copy {
            submit_index,
            item: *item,
        });
        Ok(())
    }

    fn pipeline_barrier(&mut self, image_barriers: &[ImageBarrier], buffer_barriers: &[BufferBarrier]) {
        if image_barriers.is_empty() && buffer_barriers.is_empty() {
            return;
        }
        log::trace!(
            "[{}] barrier: images [{}], buffers {}",
            self.name,
            image_barriers.iter().map(|b| format!("{:?}->{:?}", b.src_state.layout, b.dst_state.layout)).join(", "),
            buffer_barriers.len()
        );
        self.commands.push(RecordedCommand::Barrier {
            images: image_barriers.to_vec(),
            buffers: buffer_barriers.to_vec(),
        });
    }

    fn clear_image(&mut self, image: ImageHandle, _state: ImageState, value: &ClearValue) -> RhiResult<()> {
        let format = self
            .shared
            .resources
            .read()
            .images
            .get(image)
            .map(|i| i.descriptor.format)
            .ok_or(RhiError::InvalidHandle("image"))?;
        format::encode_clear_value(format, value)?;

        self.commands.push(RecordedCommand::ClearImage { image, value: *value });
        Ok(())
    }

    fn clear_buffer(&mut self, buffer: BufferHandle, value: &ClearValue) -> RhiResult<()> {
        if !self.shared.resources.read().buffers.contains_key(buffer) {
            return Err(RhiError::InvalidHandle("buffer"));
        }
        self.commands.push(RecordedCommand::ClearBuffer { buffer, value: *value });
        Ok(())
    }
}
