use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};
use slotmap::SlotMap;

use super::command_list::{RecordedCommand, SoftCommandList};
use crate::{
    RhiError, RhiResult,
    commands::item::CopyItem,
    device::{DeviceIndex, HardwareQueueClass, MultiDevice, RhiBackend, RhiDevice, SubmitId, SubmitInfo},
    format,
    resources::{
        buffer::{BufferDescriptor, BufferHandle, HeapMemoryLevel},
        image::{ImageDescriptor, ImageHandle},
        pipeline::{PipelineStateDescriptor, PipelineStateHandle, ShaderResourceGroupData, ShaderResourceGroupHandle},
    },
};

/// 软件设备的创建参数
#[derive(Clone, Debug)]
pub struct SoftDeviceDesc {
    pub device_count: u32,
    /// 所有设备合计的内存上限，`None` 表示不限制
    pub memory_budget: Option<u64>,
    /// 保留的提交记录数量，超出后丢弃最旧的记录
    pub submission_history: usize,
}

impl Default for SoftDeviceDesc {
    fn default() -> Self {
        Self {
            device_count: 1,
            memory_budget: None,
            submission_history: 256,
        }
    }
}

pub(crate) struct SoftImage {
    pub(crate) name: String,
    pub(crate) descriptor: ImageDescriptor,
    pub(crate) memory: MultiDevice<Vec<u8>>,
}

pub(crate) struct SoftBuffer {
    pub(crate) name: String,
    pub(crate) descriptor: BufferDescriptor,
    pub(crate) memory: MultiDevice<Vec<u8>>,
}

pub(crate) struct SoftShaderResourceGroup {
    pub(crate) name: String,
    pub(crate) data: ShaderResourceGroupData,
    pub(crate) compile_count: u64,
}

#[derive(Default)]
pub(crate) struct SoftResources {
    pub(crate) images: SlotMap<ImageHandle, SoftImage>,
    pub(crate) buffers: SlotMap<BufferHandle, SoftBuffer>,
    pub(crate) pipelines: SlotMap<PipelineStateHandle, PipelineStateDescriptor>,
    pub(crate) srgs: SlotMap<ShaderResourceGroupHandle, SoftShaderResourceGroup>,
    allocated_bytes: u64,
}

/// 一个 command list 在提交时的记录
#[derive(Clone, Debug)]
pub struct RecordedCommandList {
    pub name: String,
    pub device: DeviceIndex,
    pub queue: HardwareQueueClass,
    pub commands: Vec<RecordedCommand>,
}

/// 一次提交的记录
#[derive(Clone, Debug)]
pub struct SubmissionRecord {
    pub info: SubmitInfo,
    pub command_lists: Vec<RecordedCommandList>,
}

impl SubmissionRecord {
    /// 按录制顺序列出本次提交中开始的 scope
    pub fn scope_names(&self) -> Vec<&str> {
        self.commands()
            .filter_map(|command| match command {
                RecordedCommand::BeginScope { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn commands(&self) -> impl Iterator<Item = &RecordedCommand> {
        self.command_lists.iter().flat_map(|list| list.commands.iter())
    }
}

pub(crate) struct SoftDeviceInner {
    desc: SoftDeviceDesc,
    pub(crate) resources: RwLock<SoftResources>,
    next_submit_id: AtomicU64,
    /// 已提交的最大 id，与 timeline semaphore 的计数值含义相同
    completed_submit_id: AtomicU64,
    fail_next_submit: AtomicBool,
    submissions: Mutex<VecDeque<SubmissionRecord>>,
}

/// 纯 CPU 的参考设备
///
/// 资源是按设备分开的字节数组；命令在 `submit` 时同步回放，
/// clear / copy 会真实修改内存，draw / dispatch 只做校验与记录。
#[derive(Clone)]
pub struct SoftDevice {
    inner: Arc<SoftDeviceInner>,
}

// new & init
impl SoftDevice {
    pub fn new(desc: SoftDeviceDesc) -> Self {
        log::info!(
            "create soft device: {} device(s), memory budget {:?}",
            desc.device_count,
            desc.memory_budget
        );
        Self {
            inner: Arc::new(SoftDeviceInner {
                desc,
                resources: RwLock::new(SoftResources::default()),
                next_submit_id: AtomicU64::new(1),
                completed_submit_id: AtomicU64::new(0),
                fail_next_submit: AtomicBool::new(false),
                submissions: Mutex::new(VecDeque::new()),
            }),
        }
    }
}

impl Default for SoftDevice {
    fn default() -> Self {
        Self::new(SoftDeviceDesc::default())
    }
}

// getters
impl SoftDevice {
    #[inline]
    pub fn allocated_bytes(&self) -> u64 {
        self.inner.resources.read().allocated_bytes
    }

    #[inline]
    pub fn live_image_count(&self) -> usize {
        self.inner.resources.read().images.len()
    }

    #[inline]
    pub fn live_buffer_count(&self) -> usize {
        self.inner.resources.read().buffers.len()
    }

    /// 直接读取 image 在某个设备上的内存，用于调试与测试
    pub fn read_image(&self, image: ImageHandle, device: DeviceIndex) -> Option<Vec<u8>> {
        self.inner.resources.read().images.get(image)?.memory.get(device).cloned()
    }

    pub fn image_name(&self, image: ImageHandle) -> Option<String> {
        self.inner.resources.read().images.get(image).map(|i| i.name.clone())
    }

    pub fn shader_resource_group_data(&self, srg: ShaderResourceGroupHandle) -> Option<(ShaderResourceGroupData, u64)> {
        self.inner.resources.read().srgs.get(srg).map(|s| (s.data.clone(), s.compile_count))
    }

    /// 保留的提交记录的快照，按提交顺序
    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        self.inner.submissions.lock().iter().cloned().collect()
    }

    pub fn clear_submissions(&self) {
        self.inner.submissions.lock().clear();
    }

    /// 让下一次 `submit` 失败，用于模拟设备丢失
    pub fn fail_next_submit(&self) {
        self.inner.fail_next_submit.store(true, Ordering::Relaxed);
    }
}

// tools
impl SoftDevice {
    fn check_device(&self, device: DeviceIndex) -> RhiResult<()> {
        if device.0 < self.inner.desc.device_count {
            Ok(())
        } else {
            Err(RhiError::InvalidDevice {
                device,
                device_count: self.inner.desc.device_count,
            })
        }
    }

    fn reserve(&self, resources: &mut SoftResources, per_device_bytes: u64) -> RhiResult<()> {
        let requested = per_device_bytes * self.inner.desc.device_count as u64;
        if let Some(budget) = self.inner.desc.memory_budget {
            let available = budget.saturating_sub(resources.allocated_bytes);
            if requested > available {
                return Err(RhiError::OutOfMemory { requested, available });
            }
        }
        resources.allocated_bytes += requested;
        Ok(())
    }

    fn release(&self, resources: &mut SoftResources, per_device_bytes: u64) {
        let bytes = per_device_bytes * self.inner.desc.device_count as u64;
        resources.allocated_bytes = resources.allocated_bytes.saturating_sub(bytes);
    }

    fn host_buffer<'a>(resources: &'a SoftResources, buffer: BufferHandle) -> RhiResult<&'a SoftBuffer> {
        let buffer = resources.buffers.get(buffer).ok_or(RhiError::InvalidHandle("buffer"))?;
        if buffer.descriptor.memory_level != HeapMemoryLevel::Host {
            return Err(RhiError::NotHostVisible(buffer.name.clone()));
        }
        Ok(buffer)
    }
}

/// image 区域与紧密排列的 buffer 之间逐行的对应关系
///
/// 返回 `(image 内偏移, buffer 内相对偏移, 字节数)`，只针对 mip 0 / layer 0
pub(crate) fn image_copy_rows(
    descriptor: &ImageDescriptor,
    origin: [u32; 3],
    size: [u32; 3],
    bytes_per_row: u32,
) -> RhiResult<Vec<(usize, usize, usize)>> {
    let texel = format::texel_size(descriptor.format).ok_or(RhiError::UnsupportedFormat(descriptor.format))? as usize;
    let extent = [descriptor.width, descriptor.height, descriptor.depth];
    if (0..3).any(|i| origin[i] as u64 + size[i] as u64 > extent[i] as u64) {
        return Err(RhiError::CopyOutOfBounds(format!(
            "region {origin:?} + {size:?} exceeds image extent {extent:?}"
        )));
    }

    let row_bytes = size[0] as usize * texel;
    let buffer_row_pitch = if bytes_per_row == 0 { row_bytes } else { bytes_per_row as usize };
    if buffer_row_pitch < row_bytes {
        return Err(RhiError::CopyOutOfBounds(format!(
            "bytes per row {buffer_row_pitch} is smaller than a row of {row_bytes} bytes"
        )));
    }

    let (width, height) = (descriptor.width as usize, descriptor.height as usize);
    let mut rows = Vec::with_capacity(size[1] as usize * size[2] as usize);
    for z in 0..size[2] as usize {
        for y in 0..size[1] as usize {
            let image_texel = ((origin[2] as usize + z) * height + origin[1] as usize + y) * width + origin[0] as usize;
            let buffer_rel = (z * size[1] as usize + y) * buffer_row_pitch;
            rows.push((image_texel * texel, buffer_rel, row_bytes));
        }
    }
    Ok(rows)
}

fn fill_pattern(memory: &mut [u8], pattern: &[u8]) {
    for chunk in memory.chunks_mut(pattern.len()) {
        chunk.copy_from_slice(&pattern[..chunk.len()]);
    }
}

// 回放
impl SoftDevice {
    fn replay(resources: &mut SoftResources, device: DeviceIndex, command: &RecordedCommand) -> RhiResult<()> {
        match command {
            RecordedCommand::ClearImage { image, value } => {
                let image = resources.images.get_mut(*image).ok_or(RhiError::InvalidHandle("image"))?;
                let pattern = format::encode_clear_value(image.descriptor.format, value)?;
                let memory = image.memory.get_mut(device).ok_or(RhiError::InvalidHandle("image memory"))?;
                fill_pattern(memory, &pattern);
            }
            RecordedCommand::ClearBuffer { buffer, value } => {
                let buffer = resources.buffers.get_mut(*buffer).ok_or(RhiError::InvalidHandle("buffer"))?;
                let memory = buffer.memory.get_mut(device).ok_or(RhiError::InvalidHandle("buffer memory"))?;
                fill_pattern(memory, &value.fill_word().to_le_bytes());
            }
            RecordedCommand::Copy { item, .. } => Self::replay_copy(resources, device, item)?,
            // 软件设备不执行 shader
            _ => {}
        }
        Ok(())
    }

    fn replay_copy(resources: &mut SoftResources, device: DeviceIndex, item: &CopyItem) -> RhiResult<()> {
        let missing = || RhiError::InvalidHandle("copy resource");
        match item {
            CopyItem::Buffer(copy) => {
                let (src, size) = (copy.source_offset as usize, copy.size as usize);
                let data = resources
                    .buffers
                    .get(copy.source)
                    .and_then(|b| b.memory.get(device))
                    .ok_or_else(missing)?[src..src + size]
                    .to_vec();
                let dst = copy.destination_offset as usize;
                let memory = resources
                    .buffers
                    .get_mut(copy.destination)
                    .and_then(|b| b.memory.get_mut(device))
                    .ok_or_else(missing)?;
                memory[dst..dst + size].copy_from_slice(&data);
            }
            CopyItem::BufferToImage(copy) => {
                let image = resources.images.get(copy.destination).ok_or_else(missing)?;
                let rows = image_copy_rows(
                    &image.descriptor,
                    copy.destination_origin,
                    copy.size,
                    copy.source_bytes_per_row,
                )?;
                let source = resources
                    .buffers
                    .get(copy.source)
                    .and_then(|b| b.memory.get(device))
                    .ok_or_else(missing)?
                    .clone();
                let memory = resources
                    .images
                    .get_mut(copy.destination)
                    .and_then(|i| i.memory.get_mut(device))
                    .ok_or_else(missing)?;
                for (image_offset, buffer_rel, len) in rows {
                    let src = copy.source_offset as usize + buffer_rel;
                    memory[image_offset..image_offset + len].copy_from_slice(&source[src..src + len]);
                }
            }
            CopyItem::ImageToBuffer(copy) => {
                let image = resources.images.get(copy.source).ok_or_else(missing)?;
                let rows =
                    image_copy_rows(&image.descriptor, copy.source_origin, copy.size, copy.destination_bytes_per_row)?;
                let source = image.memory.get(device).ok_or_else(missing)?.clone();
                let memory = resources
                    .buffers
                    .get_mut(copy.destination)
                    .and_then(|b| b.memory.get_mut(device))
                    .ok_or_else(missing)?;
                for (image_offset, buffer_rel, len) in rows {
                    let dst = copy.destination_offset as usize + buffer_rel;
                    memory[dst..dst + len].copy_from_slice(&source[image_offset..image_offset + len]);
                }
            }
        }
        Ok(())
    }
}

impl RhiDevice for SoftDevice {
    #[inline]
    fn device_count(&self) -> u32 {
        self.inner.desc.device_count
    }

    fn create_image(&self, name: &str, descriptor: &ImageDescriptor) -> RhiResult<ImageHandle> {
        descriptor.validate().map_err(RhiError::InvalidDescriptor)?;
        let bytes = descriptor.byte_size().ok_or(RhiError::UnsupportedFormat(descriptor.format))?;

        let mut resources = self.inner.resources.write();
        self.reserve(&mut resources, bytes)?;
        let image = resources.images.insert(SoftImage {
            name: name.to_string(),
            descriptor: *descriptor,
            memory: MultiDevice::from_fn(self.device_count(), |_| vec![0; bytes as usize]),
        });
        log::debug!("soft device: create image `{name}` {}x{} {:?}", descriptor.width, descriptor.height, descriptor.format);
        Ok(image)
    }

    fn destroy_image(&self, image: ImageHandle) {
        let mut resources = self.inner.resources.write();
        if let Some(removed) = resources.images.remove(image) {
            let bytes = removed.descriptor.byte_size().unwrap_or(0);
            self.release(&mut resources, bytes);
            log::debug!("soft device: destroy image `{}`", removed.name);
        }
    }

    fn image_descriptor(&self, image: ImageHandle) -> Option<ImageDescriptor> {
        self.inner.resources.read().images.get(image).map(|i| i.descriptor)
    }

    fn create_buffer(&self, name: &str, descriptor: &BufferDescriptor) -> RhiResult<BufferHandle> {
        if descriptor.byte_size == 0 {
            return Err(RhiError::InvalidDescriptor(format!("buffer `{name}` has zero size")));
        }

        let mut resources = self.inner.resources.write();
        self.reserve(&mut resources, descriptor.byte_size)?;
        let buffer = resources.buffers.insert(SoftBuffer {
            name: name.to_string(),
            descriptor: *descriptor,
            memory: MultiDevice::from_fn(self.device_count(), |_| vec![0; descriptor.byte_size as usize]),
        });
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let mut resources = self.inner.resources.write();
        if let Some(removed) = resources.buffers.remove(buffer) {
            self.release(&mut resources, removed.descriptor.byte_size);
        }
    }

    fn buffer_descriptor(&self, buffer: BufferHandle) -> Option<BufferDescriptor> {
        self.inner.resources.read().buffers.get(buffer).map(|b| b.descriptor)
    }

    fn write_buffer(&self, buffer: BufferHandle, device: DeviceIndex, offset: u64, data: &[u8]) -> RhiResult<()> {
        self.check_device(device)?;
        let mut resources = self.inner.resources.write();
        let name = Self::host_buffer(&resources, buffer)?.name.clone();
        let memory = resources
            .buffers
            .get_mut(buffer)
            .and_then(|b| b.memory.get_mut(device))
            .ok_or(RhiError::InvalidHandle("buffer"))?;

        let start = offset as usize;
        let end = start + data.len();
        if end > memory.len() {
            return Err(RhiError::CopyOutOfBounds(format!(
                "write of {} bytes at {offset} into `{name}` ({} bytes)",
                data.len(),
                memory.len()
            )));
        }
        memory[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferHandle, device: DeviceIndex, offset: u64, size: u64) -> RhiResult<Vec<u8>> {
        self.check_device(device)?;
        let resources = self.inner.resources.read();
        let buffer = Self::host_buffer(&resources, buffer)?;
        let memory = buffer.memory.get(device).ok_or(RhiError::InvalidHandle("buffer"))?;

        let start = offset as usize;
        let end = start + size as usize;
        if end > memory.len() {
            return Err(RhiError::CopyOutOfBounds(format!(
                "read of {size} bytes at {offset} from `{}` ({} bytes)",
                buffer.name,
                memory.len()
            )));
        }
        Ok(memory[start..end].to_vec())
    }

    fn create_pipeline_state(&self, descriptor: &PipelineStateDescriptor) -> RhiResult<PipelineStateHandle> {
        Ok(self.inner.resources.write().pipelines.insert(descriptor.clone()))
    }

    fn destroy_pipeline_state(&self, pipeline_state: PipelineStateHandle) {
        self.inner.resources.write().pipelines.remove(pipeline_state);
    }

    fn pipeline_state_descriptor(&self, pipeline_state: PipelineStateHandle) -> Option<PipelineStateDescriptor> {
        self.inner.resources.read().pipelines.get(pipeline_state).cloned()
    }

    fn create_shader_resource_group(&self, name: &str) -> RhiResult<ShaderResourceGroupHandle> {
        Ok(self.inner.resources.write().srgs.insert(SoftShaderResourceGroup {
            name: name.to_string(),
            data: ShaderResourceGroupData::default(),
            compile_count: 0,
        }))
    }

    fn destroy_shader_resource_group(&self, srg: ShaderResourceGroupHandle) {
        self.inner.resources.write().srgs.remove(srg);
    }

    fn compile_shader_resource_group(
        &self,
        srg: ShaderResourceGroupHandle,
        data: ShaderResourceGroupData,
    ) -> RhiResult<()> {
        let mut resources = self.inner.resources.write();
        let SoftResources {
            images, buffers, srgs, ..
        } = &mut *resources;

        let group = srgs.get_mut(srg).ok_or(RhiError::InvalidHandle("shader resource group"))?;
        if data.image_views.iter().any(|view| !images.contains_key(view.image))
            || data.buffer_views.iter().any(|view| !buffers.contains_key(view.buffer))
        {
            return Err(RhiError::InvalidDescriptor(format!(
                "shader resource group `{}` binds a destroyed resource",
                group.name
            )));
        }
        group.data = data;
        group.compile_count += 1;
        Ok(())
    }

    fn allocate_submit_id(&self) -> SubmitId {
        SubmitId(self.inner.next_submit_id.fetch_add(1, Ordering::Relaxed))
    }

    fn is_submit_complete(&self, id: SubmitId) -> bool {
        id.0 <= self.inner.completed_submit_id.load(Ordering::Acquire)
    }
}

impl RhiBackend for SoftDevice {
    type CommandList = SoftCommandList;

    fn begin_command_list(
        &self,
        device: DeviceIndex,
        queue: HardwareQueueClass,
        name: &str,
    ) -> RhiResult<Self::CommandList> {
        self.check_device(device)?;
        Ok(SoftCommandList::new(name, device, queue, self.inner.clone()))
    }

    fn submit(&self, info: &SubmitInfo, command_lists: Vec<Self::CommandList>) -> RhiResult<()> {
        self.check_device(info.device)?;
        if self.inner.fail_next_submit.swap(false, Ordering::Relaxed) {
            return Err(RhiError::InvalidSubmission(format!("submit {:?} failed: device lost", info.id)));
        }
        if let Some(pending) = info.waits.iter().find(|wait| !self.is_submit_complete(**wait)) {
            return Err(RhiError::InvalidSubmission(format!(
                "submit {:?} waits on {pending:?}, which has not been submitted",
                info.id
            )));
        }

        let mut recorded = Vec::with_capacity(command_lists.len());
        {
            let mut resources = self.inner.resources.write();
            for command_list in command_lists {
                let (name, device, queue, commands) = command_list.into_commands();
                if device != info.device || queue != info.queue {
                    return Err(RhiError::InvalidSubmission(format!(
                        "command list `{name}` was recorded for {device}/{queue}, submitted to {}/{}",
                        info.device, info.queue
                    )));
                }
                for command in &commands {
                    Self::replay(&mut resources, device, command)?;
                }
                recorded.push(RecordedCommandList {
                    name,
                    device,
                    queue,
                    commands,
                });
            }
        }

        self.inner.completed_submit_id.fetch_max(info.id.0, Ordering::Release);

        let history = self.inner.desc.submission_history;
        let mut submissions = self.inner.submissions.lock();
        submissions.push_back(SubmissionRecord {
            info: info.clone(),
            command_lists: recorded,
        });
        while submissions.len() > history {
            submissions.pop_front();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ash::vk;

    use super::*;
    use crate::{
        commands::{
            command_list::{CommandList, SubmitRange},
            item::{CopyBufferDescriptor, CopyImageToBufferDescriptor, DrawArguments, DrawItem, Scissor, Viewport},
        },
        resources::clear::ClearValue,
        state::ImageState,
    };

    fn color_target(device: &SoftDevice, width: u32, height: u32) -> ImageHandle {
        let desc = ImageDescriptor::new_2d(
            width,
            height,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
        );
        device.create_image("target", &desc).unwrap()
    }

    #[test]
    fn test_memory_budget() {
        let device = SoftDevice::new(SoftDeviceDesc {
            device_count: 2,
            memory_budget: Some(1024),
            ..Default::default()
        });
        let desc = BufferDescriptor::new(256, vk::BufferUsageFlags::STORAGE_BUFFER);

        let a = device.create_buffer("a", &desc).unwrap();
        let _b = device.create_buffer("b", &desc).unwrap();
        assert_eq!(device.allocated_bytes(), 1024);
        assert!(matches!(
            device.create_buffer("c", &desc),
            Err(RhiError::OutOfMemory {
                requested: 512,
                available: 0
            })
        ));

        device.destroy_buffer(a);
        assert_eq!(device.allocated_bytes(), 512);
        assert!(device.create_buffer("c", &desc).is_ok());
    }

    #[test]
    fn test_clear_and_readback() {
        let device = SoftDevice::default();
        let image = color_target(&device, 2, 2);
        let readback = device.create_buffer("readback", &BufferDescriptor::readback(16)).unwrap();

        let mut cmd = device.begin_command_list(DeviceIndex::PRIMARY, HardwareQueueClass::Graphics, "clear").unwrap();
        cmd.begin_scope("Clear", SubmitRange::new(0, 1));
        cmd.clear_image(image, ImageState::TRANSFER_DST, &ClearValue::color(1.0, 0.0, 0.0, 1.0)).unwrap();
        cmd.submit_copy(
            &CopyItem::ImageToBuffer(CopyImageToBufferDescriptor {
                source: image,
                source_origin: [0, 0, 0],
                size: [2, 2, 1],
                destination: readback,
                destination_offset: 0,
                destination_bytes_per_row: 0,
            }),
            0,
        )
        .unwrap();
        cmd.end_scope();

        let id = device.allocate_submit_id();
        assert!(!device.is_submit_complete(id));
        device
            .submit(&SubmitInfo::new(id, DeviceIndex::PRIMARY, HardwareQueueClass::Graphics), vec![cmd])
            .unwrap();
        assert!(device.is_submit_complete(id));

        let bytes = device.read_buffer(readback, DeviceIndex::PRIMARY, 0, 16).unwrap();
        assert_eq!(bytes, [255, 0, 0, 255].repeat(4));
    }

    #[test]
    fn test_copy_out_of_bounds() {
        let device = SoftDevice::default();
        let image = color_target(&device, 4, 4);
        let small = device.create_buffer("small", &BufferDescriptor::readback(8)).unwrap();

        let mut cmd = device.begin_command_list(DeviceIndex::PRIMARY, HardwareQueueClass::Copy, "copy").unwrap();
        cmd.begin_scope("Copy", SubmitRange::new(0, 1));
        let copy = CopyItem::ImageToBuffer(CopyImageToBufferDescriptor {
            source: image,
            source_origin: [0, 0, 0],
            size: [4, 4, 1],
            destination: small,
            destination_offset: 0,
            destination_bytes_per_row: 0,
        });
        assert!(matches!(cmd.submit_copy(&copy, 0), Err(RhiError::CopyOutOfBounds(_))));
        assert!(matches!(cmd.submit_copy(&copy, 1), Err(RhiError::SubmitIndexOutOfRange { .. })));
    }

    #[test]
    fn test_copy_offset_overflow() {
        let device = SoftDevice::default();
        let a = device.create_buffer("a", &BufferDescriptor::staging(16)).unwrap();
        let b = device.create_buffer("b", &BufferDescriptor::readback(16)).unwrap();
        let image = color_target(&device, 2, 2);

        let mut cmd = device.begin_command_list(DeviceIndex::PRIMARY, HardwareQueueClass::Copy, "copy").unwrap();
        cmd.begin_scope("Copy", SubmitRange::new(0, 1));
        let buffer_copy = |source_offset, destination_offset| {
            CopyItem::Buffer(CopyBufferDescriptor {
                source: a,
                source_offset,
                destination: b,
                destination_offset,
                size: 8,
            })
        };
        assert!(matches!(cmd.submit_copy(&buffer_copy(u64::MAX - 4, 0), 0), Err(RhiError::CopyOutOfBounds(_))));
        assert!(matches!(cmd.submit_copy(&buffer_copy(0, u64::MAX), 0), Err(RhiError::CopyOutOfBounds(_))));

        let image_copy = CopyItem::ImageToBuffer(CopyImageToBufferDescriptor {
            source: image,
            source_origin: [0, 0, 0],
            size: [2, 2, 1],
            destination: b,
            destination_offset: u64::MAX - 1,
            destination_bytes_per_row: 0,
        });
        assert!(matches!(cmd.submit_copy(&image_copy, 0), Err(RhiError::CopyOutOfBounds(_))));

        cmd.submit_copy(&buffer_copy(8, 8), 0).unwrap();
        cmd.end_scope();
    }

    #[test]
    fn test_draw_requires_viewport() {
        let device = SoftDevice::default();
        let pipeline = device.create_pipeline_state(&PipelineStateDescriptor::draw("tri")).unwrap();
        let item = DrawItem::new(pipeline, DrawArguments::linear(3));

        let mut cmd = device.begin_command_list(DeviceIndex::PRIMARY, HardwareQueueClass::Graphics, "draw").unwrap();
        cmd.begin_scope("A", SubmitRange::new(0, 1));
        assert!(matches!(cmd.submit_draw(&item, 0), Err(RhiError::ViewportNotSet)));
        cmd.set_viewports(&[Viewport::from_size(4, 4)]);
        cmd.set_scissors(&[Scissor::from_size(4, 4)]);
        cmd.submit_draw(&item, 0).unwrap();
        cmd.end_scope();

        // 状态不会跨 scope 继承
        cmd.begin_scope("B", SubmitRange::new(0, 1));
        assert!(matches!(cmd.submit_draw(&item, 0), Err(RhiError::ViewportNotSet)));
    }

    #[test]
    fn test_submit_waits_must_be_complete() {
        let device = SoftDevice::default();
        let early = device.allocate_submit_id();
        let late = device.allocate_submit_id();
        let info = SubmitInfo::new(late, DeviceIndex::PRIMARY, HardwareQueueClass::Compute).wait(early);
        assert!(matches!(device.submit(&info, vec![]), Err(RhiError::InvalidSubmission(_))));

        device
            .submit(&SubmitInfo::new(early, DeviceIndex::PRIMARY, HardwareQueueClass::Graphics), vec![])
            .unwrap();
        device.submit(&info, vec![]).unwrap();
        assert_eq!(device.submissions().len(), 2);
    }

    #[test]
    fn test_submission_history_is_bounded() {
        let device = SoftDevice::new(SoftDeviceDesc {
            submission_history: 4,
            ..Default::default()
        });
        let mut ids = Vec::new();
        for _ in 0..10 {
            let id = device.allocate_submit_id();
            device
                .submit(&SubmitInfo::new(id, DeviceIndex::PRIMARY, HardwareQueueClass::Graphics), vec![])
                .unwrap();
            ids.push(id);
        }

        let kept = device.submissions().iter().map(|s| s.info.id).collect::<Vec<_>>();
        assert_eq!(kept, ids[6..]);
        // 丢弃的记录不影响完成状态
        assert!(ids.iter().all(|id| device.is_submit_complete(*id)));
        assert!(!device.is_submit_complete(device.allocate_submit_id()));

        device.clear_submissions();
        assert!(device.is_submit_complete(ids[0]));
    }

    #[test]
    fn test_failed_submit_is_not_complete() {
        let device = SoftDevice::default();
        let id = device.allocate_submit_id();
        let info = SubmitInfo::new(id, DeviceIndex::PRIMARY, HardwareQueueClass::Graphics);

        device.fail_next_submit();
        assert!(matches!(device.submit(&info, vec![]), Err(RhiError::InvalidSubmission(_))));
        assert!(!device.is_submit_complete(id));
        assert!(device.submissions().is_empty());

        device.submit(&info, vec![]).unwrap();
        assert!(device.is_submit_complete(id));
    }

    #[test]
    fn test_host_access() {
        let device = SoftDevice::new(SoftDeviceDesc {
            device_count: 2,
            ..Default::default()
        });
        let gpu_only =
            device.create_buffer("gpu", &BufferDescriptor::new(16, vk::BufferUsageFlags::STORAGE_BUFFER)).unwrap();
        assert!(matches!(
            device.write_buffer(gpu_only, DeviceIndex::PRIMARY, 0, &[1, 2, 3]),
            Err(RhiError::NotHostVisible(_))
        ));

        let staging = device.create_buffer("staging", &BufferDescriptor::staging(4)).unwrap();
        device.write_buffer(staging, DeviceIndex(1), 0, &[9, 9, 9, 9]).unwrap();
        assert!(device.write_buffer(staging, DeviceIndex(2), 0, &[1]).is_err());
        assert!(device.write_buffer(staging, DeviceIndex(0), 2, &[1, 2, 3]).is_err());
    }
}
