//! 设备抽象
//!
//! 多设备（multi-GPU）通过显式的 `DeviceIndex` 与按设备索引的数组 `MultiDevice<T>` 表达，
//! 不依赖任何全局状态。

use std::fmt::{Display, Formatter};

use crate::{
    RhiResult,
    commands::command_list::CommandList,
    resources::{
        buffer::{BufferDescriptor, BufferHandle},
        image::{ImageDescriptor, ImageHandle},
        pipeline::{PipelineStateDescriptor, PipelineStateHandle, ShaderResourceGroupData, ShaderResourceGroupHandle},
    },
};

/// 最多支持的设备数量，与 `DeviceMask` 的位数一致
pub const MAX_DEVICE_COUNT: u32 = 8;

/// 设备索引
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIndex(pub u32);

impl DeviceIndex {
    pub const PRIMARY: Self = Self(0);

    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for DeviceIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

bitflags::bitflags! {
    /// 设备集合
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DeviceMask: u32 {
        const DEVICE_0 = 1 << 0;
        const DEVICE_1 = 1 << 1;
        const DEVICE_2 = 1 << 2;
        const DEVICE_3 = 1 << 3;
        const DEVICE_4 = 1 << 4;
        const DEVICE_5 = 1 << 5;
        const DEVICE_6 = 1 << 6;
        const DEVICE_7 = 1 << 7;
    }
}

impl DeviceMask {
    #[inline]
    pub fn from_device(device: DeviceIndex) -> Self {
        if device.0 >= MAX_DEVICE_COUNT {
            return Self::empty();
        }
        Self::from_bits_truncate(1 << device.0)
    }

    /// 前 `count` 个设备
    #[inline]
    pub fn first_n(count: u32) -> Self {
        let count = count.min(MAX_DEVICE_COUNT);
        Self::from_bits_truncate(((1u64 << count) - 1) as u32)
    }

    #[inline]
    pub fn contains_device(self, device: DeviceIndex) -> bool {
        !Self::from_device(device).is_empty() && self.contains(Self::from_device(device))
    }

    pub fn devices(self) -> impl Iterator<Item = DeviceIndex> {
        (0..MAX_DEVICE_COUNT).map(DeviceIndex).filter(move |d| self.contains_device(*d))
    }
}

/// 按设备索引的数组，每个设备持有一份 `T`
///
/// 资源在每个设备上都有独立的实体（显存、native handle 等）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiDevice<T> {
    items: Vec<T>,
}

// new & init
impl<T> MultiDevice<T> {
    pub fn from_fn(device_count: u32, mut f: impl FnMut(DeviceIndex) -> T) -> Self {
        Self {
            items: (0..device_count).map(|i| f(DeviceIndex(i))).collect(),
        }
    }

    pub fn try_from_fn<E>(device_count: u32, mut f: impl FnMut(DeviceIndex) -> Result<T, E>) -> Result<Self, E> {
        let items = (0..device_count).map(|i| f(DeviceIndex(i))).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { items })
    }
}

// getters
impl<T> MultiDevice<T> {
    #[inline]
    pub fn device_count(&self) -> u32 {
        self.items.len() as u32
    }

    #[inline]
    pub fn device_mask(&self) -> DeviceMask {
        DeviceMask::first_n(self.device_count())
    }

    #[inline]
    pub fn get(&self, device: DeviceIndex) -> Option<&T> {
        self.items.get(device.index())
    }

    #[inline]
    pub fn get_mut(&mut self, device: DeviceIndex) -> Option<&mut T> {
        self.items.get_mut(device.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = (DeviceIndex, &T)> {
        self.items.iter().enumerate().map(|(i, item)| (DeviceIndex(i as u32), item))
    }
}

/// 硬件队列类型
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HardwareQueueClass {
    #[default]
    Graphics,
    Compute,
    Copy,
}

impl HardwareQueueClass {
    pub const ALL: [Self; 3] = [Self::Graphics, Self::Compute, Self::Copy];

    #[inline]
    pub fn supports_draw(self) -> bool {
        self == Self::Graphics
    }

    #[inline]
    pub fn supports_dispatch(self) -> bool {
        matches!(self, Self::Graphics | Self::Compute)
    }

    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            Self::Graphics => "graphics",
            Self::Compute => "compute",
            Self::Copy => "copy",
        }
    }
}

impl Display for HardwareQueueClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 一次队列提交的标识，单调递增
///
/// 类似 timeline semaphore 的 value：跨队列的等待通过它表达
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmitId(pub u64);

/// 队列提交信息
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitInfo {
    pub id: SubmitId,
    pub device: DeviceIndex,
    pub queue: HardwareQueueClass,
    /// 需要等待完成的其他提交（通常来自其他队列）
    pub waits: Vec<SubmitId>,
}

impl SubmitInfo {
    pub fn new(id: SubmitId, device: DeviceIndex, queue: HardwareQueueClass) -> Self {
        Self {
            id,
            device,
            queue,
            waits: Vec::new(),
        }
    }

    /// builder
    #[inline]
    pub fn wait(mut self, id: SubmitId) -> Self {
        if !self.waits.contains(&id) {
            self.waits.push(id);
        }
        self
    }
}

/// 设备上的资源与同步操作
///
/// object safe，FrameGraph 的回调通过 `&dyn RhiDevice` 访问设备
pub trait RhiDevice: Send + Sync {
    fn device_count(&self) -> u32;

    #[inline]
    fn device_mask(&self) -> DeviceMask {
        DeviceMask::first_n(self.device_count())
    }

    /// 在所有设备上创建 image
    fn create_image(&self, name: &str, descriptor: &ImageDescriptor) -> RhiResult<ImageHandle>;
    fn destroy_image(&self, image: ImageHandle);
    fn image_descriptor(&self, image: ImageHandle) -> Option<ImageDescriptor>;

    /// 在所有设备上创建 buffer
    fn create_buffer(&self, name: &str, descriptor: &BufferDescriptor) -> RhiResult<BufferHandle>;
    fn destroy_buffer(&self, buffer: BufferHandle);
    fn buffer_descriptor(&self, buffer: BufferHandle) -> Option<BufferDescriptor>;

    /// 写入 host visible 的 buffer
    fn write_buffer(&self, buffer: BufferHandle, device: DeviceIndex, offset: u64, data: &[u8]) -> RhiResult<()>;
    /// 读取 host visible 的 buffer
    fn read_buffer(&self, buffer: BufferHandle, device: DeviceIndex, offset: u64, size: u64) -> RhiResult<Vec<u8>>;

    fn create_pipeline_state(&self, descriptor: &PipelineStateDescriptor) -> RhiResult<PipelineStateHandle>;
    fn destroy_pipeline_state(&self, pipeline_state: PipelineStateHandle);
    fn pipeline_state_descriptor(&self, pipeline_state: PipelineStateHandle) -> Option<PipelineStateDescriptor>;

    fn create_shader_resource_group(&self, name: &str) -> RhiResult<ShaderResourceGroupHandle>;
    fn destroy_shader_resource_group(&self, srg: ShaderResourceGroupHandle);
    /// 提交 SRG 的常量与资源绑定
    fn compile_shader_resource_group(
        &self,
        srg: ShaderResourceGroupHandle,
        data: ShaderResourceGroupData,
    ) -> RhiResult<()>;

    /// 预分配一个提交 id，录制命令时就能知道命令会随哪次提交执行
    fn allocate_submit_id(&self) -> SubmitId;
    /// 非阻塞查询
    fn is_submit_complete(&self, id: SubmitId) -> bool;
}

/// 可以录制并提交命令的设备
pub trait RhiBackend: RhiDevice {
    type CommandList: CommandList + 'static;

    fn begin_command_list(
        &self,
        device: DeviceIndex,
        queue: HardwareQueueClass,
        name: &str,
    ) -> RhiResult<Self::CommandList>;

    /// 同一个提交中的 command list 按顺序执行
    fn submit(&self, info: &SubmitInfo, command_lists: Vec<Self::CommandList>) -> RhiResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_mask() {
        let mask = DeviceMask::first_n(3);
        assert_eq!(mask, DeviceMask::DEVICE_0 | DeviceMask::DEVICE_1 | DeviceMask::DEVICE_2);
        assert!(mask.contains_device(DeviceIndex(2)));
        assert!(!mask.contains_device(DeviceIndex(3)));
        assert!(!mask.contains_device(DeviceIndex(40)));
        assert_eq!(mask.devices().collect::<Vec<_>>(), vec![DeviceIndex(0), DeviceIndex(1), DeviceIndex(2)]);
        assert_eq!(DeviceMask::first_n(8).bits(), 0xFF);
    }

    #[test]
    fn test_multi_device() {
        let mut values = MultiDevice::from_fn(2, |d| d.0 * 10);
        assert_eq!(values.device_count(), 2);
        assert_eq!(values.get(DeviceIndex(1)), Some(&10));
        assert_eq!(values.get(DeviceIndex(2)), None);

        *values.get_mut(DeviceIndex(0)).unwrap() = 7;
        assert_eq!(values.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![7, 10]);

        let failed: Result<MultiDevice<u32>, &str> =
            MultiDevice::try_from_fn(2, |d| if d.0 == 1 { Err("oom") } else { Ok(0) });
        assert_eq!(failed, Err("oom"));
    }

    #[test]
    fn test_queue_capabilities() {
        assert!(HardwareQueueClass::Graphics.supports_draw());
        assert!(!HardwareQueueClass::Compute.supports_draw());
        assert!(HardwareQueueClass::Compute.supports_dispatch());
        assert!(!HardwareQueueClass::Copy.supports_dispatch());
    }
}
