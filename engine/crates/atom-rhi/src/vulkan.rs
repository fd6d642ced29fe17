//! 把 `CommandList` 的命令翻译为 ash 调用
//!
//! 物理资源（`vk::Image`、`vk::Pipeline` 等）由 `VulkanResourceResolver` 提供，
//! command buffer 的分配、begin / end 与提交由外部负责。

use std::{ffi::CString, sync::Arc};

use ash::vk;
use itertools::Itertools;

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
        buffer::BufferHandle,
        clear::ClearValue,
        image::{ImageDescriptor, ImageHandle},
        pipeline::{PipelineStateDescriptor, PipelineStateHandle, ShaderResourceGroupHandle},
    },
    state::ImageState,
};

const SCOPE_LABEL_COLOR: [f32; 4] = [0.2, 0.6, 0.9, 1.0];

/// 已创建好的 Vulkan 管线
#[derive(Clone, Debug)]
pub struct VulkanPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub bind_point: vk::PipelineBindPoint,
    pub descriptor: PipelineStateDescriptor,
    /// push constants 可见的 shader stage
    pub root_constant_stages: vk::ShaderStageFlags,
}

/// 把 RHI handle 解析为某个设备上的 Vulkan 对象
pub trait VulkanResourceResolver: Send + Sync {
    fn image(&self, device: DeviceIndex, image: ImageHandle) -> Option<vk::Image>;
    fn image_descriptor(&self, image: ImageHandle) -> Option<ImageDescriptor>;
    fn buffer(&self, device: DeviceIndex, buffer: BufferHandle) -> Option<vk::Buffer>;
    fn pipeline(&self, device: DeviceIndex, pipeline_state: PipelineStateHandle) -> Option<VulkanPipeline>;
    fn descriptor_set(&self, device: DeviceIndex, srg: ShaderResourceGroupHandle) -> Option<vk::DescriptorSet>;
}

pub struct VulkanCommandList<R: VulkanResourceResolver> {
    device: ash::Device,
    debug_utils: Option<ash::ext::debug_utils::Device>,
    command_buffer: vk::CommandBuffer,

    device_index: DeviceIndex,
    queue: HardwareQueueClass,
    resolver: Arc<R>,
    state: ScopeRecordingState,
}

// new & init
impl<R: VulkanResourceResolver> VulkanCommandList<R> {
    /// `command_buffer` 需要已经处于 recording 状态
    pub fn new(
        device: ash::Device,
        debug_utils: Option<ash::ext::debug_utils::Device>,
        command_buffer: vk::CommandBuffer,
        device_index: DeviceIndex,
        queue: HardwareQueueClass,
        resolver: Arc<R>,
    ) -> Self {
        Self {
            device,
            debug_utils,
            command_buffer,
            device_index,
            queue,
            resolver,
            state: ScopeRecordingState::default(),
        }
    }
}

// getters
impl<R: VulkanResourceResolver> VulkanCommandList<R> {
    #[inline]
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }
}

// tools
impl<R: VulkanResourceResolver> VulkanCommandList<R> {
    fn vk_image(&self, image: ImageHandle) -> RhiResult<vk::Image> {
        self.resolver.image(self.device_index, image).ok_or(RhiError::InvalidHandle("image"))
    }

    fn vk_buffer(&self, buffer: BufferHandle) -> RhiResult<vk::Buffer> {
        self.resolver.buffer(self.device_index, buffer).ok_or(RhiError::InvalidHandle("buffer"))
    }

    fn bind_pipeline_and_resources(
        &self,
        pipeline: &VulkanPipeline,
        srgs: &[ShaderResourceGroupHandle],
        root_constants: &[u8],
    ) -> RhiResult<()> {
        let descriptor_sets = srgs
            .iter()
            .map(|srg| {
                self.resolver
                    .descriptor_set(self.device_index, *srg)
                    .ok_or(RhiError::InvalidHandle("shader resource group"))
            })
            .collect::<RhiResult<Vec<_>>>()?;

        unsafe {
            self.device.cmd_bind_pipeline(self.command_buffer, pipeline.bind_point, pipeline.pipeline);
            if !descriptor_sets.is_empty() {
                self.device.cmd_bind_descriptor_sets(
                    self.command_buffer,
                    pipeline.bind_point,
                    pipeline.layout,
                    0,
                    &descriptor_sets,
                    &[],
                );
            }
            if !root_constants.is_empty() {
                self.device.cmd_push_constants(
                    self.command_buffer,
                    pipeline.layout,
                    pipeline.root_constant_stages,
                    0,
                    root_constants,
                );
            }
        }
        Ok(())
    }

    fn image_copy_region(
        &self,
        image: ImageHandle,
        buffer_offset: u64,
        bytes_per_row: u32,
        origin: [u32; 3],
        size: [u32; 3],
    ) -> RhiResult<vk::BufferImageCopy> {
        let descriptor = self.resolver.image_descriptor(image).ok_or(RhiError::InvalidHandle("image"))?;
        buffer_image_copy(&descriptor, buffer_offset, bytes_per_row, origin, size)
    }

    fn transition(&self, image: vk::Image, aspect: vk::ImageAspectFlags, from: ImageState, to: ImageState) {
        let barrier = ImageBarrier {
            image: ImageHandle::default(),
            src_state: from,
            dst_state: to,
            aspect,
        }
        .to_vk(image);
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&barrier));
        unsafe {
            self.device.cmd_pipeline_barrier2(self.command_buffer, &dependency_info);
        }
    }
}

/// draw 之前的校验，返回解析后的管线
fn resolve_draw_pipeline<R: VulkanResourceResolver>(
    resolver: &R,
    device: DeviceIndex,
    queue: HardwareQueueClass,
    state: &ScopeRecordingState,
    item: &DrawItem<'_>,
    submit_index: u32,
) -> RhiResult<VulkanPipeline> {
    state.check_submit_index(submit_index)?;
    state.check_draw_state()?;
    let pipeline = resolver.pipeline(device, item.pipeline_state).ok_or(RhiError::InvalidHandle("pipeline state"))?;
    item.validate(&pipeline.descriptor, queue)?;
    Ok(pipeline)
}

fn resolve_dispatch_pipeline<R: VulkanResourceResolver>(
    resolver: &R,
    device: DeviceIndex,
    queue: HardwareQueueClass,
    state: &ScopeRecordingState,
    item: &DispatchItem<'_>,
    submit_index: u32,
) -> RhiResult<VulkanPipeline> {
    state.check_submit_index(submit_index)?;
    let pipeline = resolver.pipeline(device, item.pipeline_state).ok_or(RhiError::InvalidHandle("pipeline state"))?;
    item.validate(&pipeline.descriptor, queue)?;
    Ok(pipeline)
}

/// 设备上不存在的资源会被跳过
fn resolve_barriers<R: VulkanResourceResolver>(
    resolver: &R,
    device: DeviceIndex,
    image_barriers: &[ImageBarrier],
    buffer_barriers: &[BufferBarrier],
) -> (Vec<vk::ImageMemoryBarrier2<'static>>, Vec<vk::BufferMemoryBarrier2<'static>>) {
    let images = image_barriers
        .iter()
        .filter_map(|barrier| match resolver.image(device, barrier.image) {
            Some(image) => Some(barrier.to_vk(image)),
            None => {
                log::error!("barrier references an image missing on {device}");
                None
            }
        })
        .collect_vec();
    let buffers = buffer_barriers
        .iter()
        .filter_map(|barrier| match resolver.buffer(device, barrier.buffer) {
            Some(buffer) => Some(barrier.to_vk(buffer)),
            None => {
                log::error!("barrier references a buffer missing on {device}");
                None
            }
        })
        .collect_vec();
    (images, buffers)
}

/// clear 命令接受的 layout 只有 GENERAL 与 TRANSFER_DST
fn clear_state(state: ImageState) -> ImageState {
    match state.layout {
        vk::ImageLayout::GENERAL | vk::ImageLayout::TRANSFER_DST_OPTIMAL => state,
        _ => ImageState::TRANSFER_DST,
    }
}

enum VulkanClearValue {
    Color(vk::ClearColorValue),
    DepthStencil(vk::ClearDepthStencilValue),
}

fn vulkan_clear_value(value: &ClearValue, format: vk::Format) -> RhiResult<VulkanClearValue> {
    match (*value, format::is_depth_stencil(format)) {
        (ClearValue::DepthStencil { depth, stencil }, true) => {
            Ok(VulkanClearValue::DepthStencil(vk::ClearDepthStencilValue {
                depth,
                stencil: stencil as u32,
            }))
        }
        (ClearValue::Vector4Float(float32), false) => Ok(VulkanClearValue::Color(vk::ClearColorValue { float32 })),
        (ClearValue::Vector4Uint(uint32), false) => Ok(VulkanClearValue::Color(vk::ClearColorValue { uint32 })),
        _ => Err(RhiError::InvalidDescriptor(format!("clear value {value:?} does not match format {format:?}"))),
    }
}

/// 计算 buffer 与 image 之间的拷贝区域，`bytes_per_row == 0` 表示紧密排列
pub fn buffer_image_copy(
    descriptor: &ImageDescriptor,
    buffer_offset: u64,
    bytes_per_row: u32,
    origin: [u32; 3],
    size: [u32; 3],
) -> RhiResult<vk::BufferImageCopy> {
    let texel = format::texel_size(descriptor.format).ok_or(RhiError::UnsupportedFormat(descriptor.format))?;
    if bytes_per_row % texel != 0 {
        return Err(RhiError::CopyOutOfBounds(format!(
            "bytes per row {bytes_per_row} is not a multiple of the texel size {texel}"
        )));
    }

    Ok(vk::BufferImageCopy {
        buffer_offset,
        buffer_row_length: bytes_per_row / texel,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: descriptor.aspect(),
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D {
            x: origin[0] as i32,
            y: origin[1] as i32,
            z: origin[2] as i32,
        },
        image_extent: vk::Extent3D {
            width: size[0],
            height: size[1],
            depth: size[2],
        },
    })
}

impl<R: VulkanResourceResolver + 'static> CommandList for VulkanCommandList<R> {
    #[inline]
    fn device_index(&self) -> DeviceIndex {
        self.device_index
    }

    #[inline]
    fn queue_class(&self) -> HardwareQueueClass {
        self.queue
    }

    fn begin_scope(&mut self, name: &str, submit_range: SubmitRange) {
        self.state.begin(name, submit_range);
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        if let Ok(label_name) = CString::new(name) {
            unsafe {
                debug_utils.cmd_begin_debug_utils_label(
                    self.command_buffer,
                    &vk::DebugUtilsLabelEXT::default().label_name(label_name.as_c_str()).color(SCOPE_LABEL_COLOR),
                );
            }
        }
    }

    fn end_scope(&mut self) {
        self.state.end();
        if let Some(debug_utils) = &self.debug_utils {
            unsafe { debug_utils.cmd_end_debug_utils_label(self.command_buffer) }
        }
    }

    fn set_viewports(&mut self, viewports: &[Viewport]) {
        if viewports.is_empty() {
            return;
        }
        let viewports = viewports.iter().map(Viewport::to_vk).collect_vec();
        unsafe {
            self.device.cmd_set_viewport(self.command_buffer, 0, &viewports);
        }
        self.state.set_viewport();
    }

    fn set_scissors(&mut self, scissors: &[Scissor]) {
        if scissors.is_empty() {
            return;
        }
        let scissors = scissors.iter().map(Scissor::to_vk).collect_vec();
        unsafe {
            self.device.cmd_set_scissor(self.command_buffer, 0, &scissors);
        }
        self.state.set_scissor();
    }

    fn submit_draw(&mut self, item: &DrawItem<'_>, submit_index: u32) -> RhiResult<()> {
        let pipeline = resolve_draw_pipeline(
            self.resolver.as_ref(),
            self.device_index,
            self.queue,
            &self.state,
            item,
            submit_index,
        )?;
        self.bind_pipeline_and_resources(&pipeline, item.shader_resource_groups, item.root_constants)?;

        let (vertex_buffers, offsets): (Vec<_>, Vec<_>) = item
            .stream_buffer_views
            .iter()
            .map(|view| Ok((self.vk_buffer(view.buffer)?, view.byte_offset)))
            .collect::<RhiResult<Vec<_>>>()?
            .into_iter()
            .unzip();

        unsafe {
            if !vertex_buffers.is_empty() {
                self.device.cmd_bind_vertex_buffers(self.command_buffer, 0, &vertex_buffers, &offsets);
            }
            if let Some(index_view) = &item.index_buffer_view {
                self.device.cmd_bind_index_buffer(
                    self.command_buffer,
                    self.vk_buffer(index_view.buffer)?,
                    index_view.byte_offset,
                    index_view.format.to_vk(),
                );
            }

            match item.arguments {
                DrawArguments::Indexed {
                    index_count,
                    instance_count,
                    index_offset,
                    vertex_offset,
                    instance_offset,
                } => self.device.cmd_draw_indexed(
                    self.command_buffer,
                    index_count,
                    instance_count,
                    index_offset,
                    vertex_offset,
                    instance_offset,
                ),
                DrawArguments::Linear {
                    vertex_count,
                    instance_count,
                    vertex_offset,
                    instance_offset,
                } => self.device.cmd_draw(
                    self.command_buffer,
                    vertex_count,
                    instance_count,
                    vertex_offset,
                    instance_offset,
                ),
            }
        }
        Ok(())
    }

    fn submit_dispatch(&mut self, item: &DispatchItem<'_>, submit_index: u32) -> RhiResult<()> {
        let pipeline = resolve_dispatch_pipeline(
            self.resolver.as_ref(),
            self.device_index,
            self.queue,
            &self.state,
            item,
            submit_index,
        )?;
        self.bind_pipeline_and_resources(&pipeline, item.shader_resource_groups, item.root_constants)?;

        let [x, y, z] = item.arguments.group_count();
        unsafe {
            self.device.cmd_dispatch(self.command_buffer, x, y, z);
        }
        Ok(())
    }

    fn submit_copy(&mut self, item: &CopyItem, submit_index: u32) -> RhiResult<()> {
        self.state.check_submit_index(submit_index)?;

        match item {
            CopyItem::Buffer(copy) => {
                let region = vk::BufferCopy {
                    src_offset: copy.source_offset,
                    dst_offset: copy.destination_offset,
                    size: copy.size,
                };
                let (src, dst) = (self.vk_buffer(copy.source)?, self.vk_buffer(copy.destination)?);
                unsafe {
                    self.device.cmd_copy_buffer(self.command_buffer, src, dst, std::slice::from_ref(&region));
                }
            }
            CopyItem::BufferToImage(copy) => {
                let region = self.image_copy_region(
                    copy.destination,
                    copy.source_offset,
                    copy.source_bytes_per_row,
                    copy.destination_origin,
                    copy.size,
                )?;
                let (src, dst) = (self.vk_buffer(copy.source)?, self.vk_image(copy.destination)?);
                unsafe {
                    self.device.cmd_copy_buffer_to_image(
                        self.command_buffer,
                        src,
                        dst,
                        ImageState::TRANSFER_DST.layout,
                        std::slice::from_ref(&region),
                    );
                }
            }
            CopyItem::ImageToBuffer(copy) => {
                let region = self.image_copy_region(
                    copy.source,
                    copy.destination_offset,
                    copy.destination_bytes_per_row,
                    copy.source_origin,
                    copy.size,
                )?;
                let (src, dst) = (self.vk_image(copy.source)?, self.vk_buffer(copy.destination)?);
                unsafe {
                    self.device.cmd_copy_image_to_buffer(
                        self.command_buffer,
                        src,
                        ImageState::TRANSFER_SRC.layout,
                        dst,
                        std::slice::from_ref(&region),
                    );
                }
            }
        }
        Ok(())
    }

    fn pipeline_barrier(&mut self, image_barriers: &[ImageBarrier], buffer_barriers: &[BufferBarrier]) {
        let (images, buffers) =
            resolve_barriers(self.resolver.as_ref(), self.device_index, image_barriers, buffer_barriers);
        if images.is_empty() && buffers.is_empty() {
            return;
        }

        let dependency_info =
            vk::DependencyInfo::default().image_memory_barriers(&images).buffer_memory_barriers(&buffers);
        unsafe {
            self.device.cmd_pipeline_barrier2(self.command_buffer, &dependency_info);
        }
    }

    /// clear 需要 GENERAL 或 TRANSFER_DST layout，其他 layout 会临时转换后再转回 `state`
    fn clear_image(&mut self, image: ImageHandle, state: ImageState, value: &ClearValue) -> RhiResult<()> {
        let descriptor = self.resolver.image_descriptor(image).ok_or(RhiError::InvalidHandle("image"))?;
        let vk_image = self.vk_image(image)?;
        let aspect = descriptor.aspect();
        let range = vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            layer_count: vk::REMAINING_ARRAY_LAYERS,
        };

        let clear_value = vulkan_clear_value(value, descriptor.format)?;
        let clear_state = clear_state(state);
        if clear_state != state {
            self.transition(vk_image, aspect, state, clear_state);
        }

        match clear_value {
            VulkanClearValue::DepthStencil(depth_stencil) => unsafe {
                self.device.cmd_clear_depth_stencil_image(
                    self.command_buffer,
                    vk_image,
                    clear_state.layout,
                    &depth_stencil,
                    std::slice::from_ref(&range),
                );
            },
            VulkanClearValue::Color(color) => unsafe {
                self.device.cmd_clear_color_image(
                    self.command_buffer,
                    vk_image,
                    clear_state.layout,
                    &color,
                    std::slice::from_ref(&range),
                );
            },
        }

        if clear_state != state {
            self.transition(vk_image, aspect, clear_state, state);
        }
        Ok(())
    }

    fn clear_buffer(&mut self, buffer: BufferHandle, value: &ClearValue) -> RhiResult<()> {
        let vk_buffer = self.vk_buffer(buffer)?;
        unsafe {
            self.device.cmd_fill_buffer(self.command_buffer, vk_buffer, 0, vk::WHOLE_SIZE, value.fill_word());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use ash::vk::Handle;
    use slotmap::SlotMap;

    use super::*;
    use crate::{commands::item::DispatchArguments, state::BufferState};

    #[derive(Default)]
    struct TableResolver {
        images: HashMap<ImageHandle, vk::Image>,
        buffers: HashMap<BufferHandle, vk::Buffer>,
        pipelines: HashMap<PipelineStateHandle, VulkanPipeline>,
    }

    impl VulkanResourceResolver for TableResolver {
        fn image(&self, _device: DeviceIndex, image: ImageHandle) -> Option<vk::Image> {
            self.images.get(&image).copied()
        }

        fn image_descriptor(&self, _image: ImageHandle) -> Option<ImageDescriptor> {
            None
        }

        fn buffer(&self, _device: DeviceIndex, buffer: BufferHandle) -> Option<vk::Buffer> {
            self.buffers.get(&buffer).copied()
        }

        fn pipeline(&self, _device: DeviceIndex, pipeline_state: PipelineStateHandle) -> Option<VulkanPipeline> {
            self.pipelines.get(&pipeline_state).cloned()
        }

        fn descriptor_set(&self, _device: DeviceIndex, _srg: ShaderResourceGroupHandle) -> Option<vk::DescriptorSet> {
            None
        }
    }

    fn vulkan_pipeline(descriptor: PipelineStateDescriptor) -> VulkanPipeline {
        VulkanPipeline {
            pipeline: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            descriptor,
            root_constant_stages: vk::ShaderStageFlags::empty(),
        }
    }

    #[test]
    fn test_draw_validation() {
        let mut handles = SlotMap::<PipelineStateHandle, ()>::with_key();
        let (draw, dispatch, missing) = (handles.insert(()), handles.insert(()), handles.insert(()));
        let mut resolver = TableResolver::default();
        resolver.pipelines.insert(draw, vulkan_pipeline(PipelineStateDescriptor::draw("draw")));
        resolver.pipelines.insert(dispatch, vulkan_pipeline(PipelineStateDescriptor::dispatch("cs", [8, 8, 1])));

        let device = DeviceIndex::PRIMARY;
        let graphics = HardwareQueueClass::Graphics;
        let mut state = ScopeRecordingState::default();
        state.begin("Draw", SubmitRange::new(0, 2));

        let item = DrawItem::new(draw, DrawArguments::linear(3));
        assert!(matches!(
            resolve_draw_pipeline(&resolver, device, graphics, &state, &item, 0),
            Err(RhiError::ViewportNotSet)
        ));

        state.set_viewport();
        state.set_scissor();
        assert!(resolve_draw_pipeline(&resolver, device, graphics, &state, &item, 1).is_ok());
        assert!(matches!(
            resolve_draw_pipeline(&resolver, device, graphics, &state, &item, 2),
            Err(RhiError::SubmitIndexOutOfRange { index: 2, start: 0, end: 2 })
        ));
        assert!(matches!(
            resolve_draw_pipeline(&resolver, device, HardwareQueueClass::Compute, &state, &item, 0),
            Err(RhiError::UnsupportedQueue { .. })
        ));

        let wrong_pipeline = DrawItem::new(dispatch, DrawArguments::linear(3));
        assert!(matches!(
            resolve_draw_pipeline(&resolver, device, graphics, &state, &wrong_pipeline, 0),
            Err(RhiError::PipelineMismatch { .. })
        ));
        let unresolved = DrawItem::new(missing, DrawArguments::linear(3));
        assert!(matches!(
            resolve_draw_pipeline(&resolver, device, graphics, &state, &unresolved, 0),
            Err(RhiError::InvalidHandle(_))
        ));

        // dispatch 不需要视口
        state.end();
        state.begin("Dispatch", SubmitRange::new(0, 1));
        let dispatch_item = DispatchItem::new(dispatch, DispatchArguments::Groups([1, 1, 1]));
        assert!(
            resolve_dispatch_pipeline(&resolver, device, HardwareQueueClass::Compute, &state, &dispatch_item, 0)
                .is_ok()
        );
        assert!(matches!(
            resolve_dispatch_pipeline(&resolver, device, HardwareQueueClass::Copy, &state, &dispatch_item, 0),
            Err(RhiError::UnsupportedQueue { .. })
        ));
    }

    #[test]
    fn test_barriers_skip_unresolved_resources() {
        let mut image_handles = SlotMap::<ImageHandle, ()>::with_key();
        let mut buffer_handles = SlotMap::<BufferHandle, ()>::with_key();
        let (image, lost_image) = (image_handles.insert(()), image_handles.insert(()));
        let buffer = buffer_handles.insert(());

        let mut resolver = TableResolver::default();
        resolver.images.insert(image, vk::Image::from_raw(7));
        resolver.buffers.insert(buffer, vk::Buffer::from_raw(9));

        let image_barriers = [
            ImageBarrier::new(image, ImageState::UNDEFINED, ImageState::COLOR_ATTACHMENT_WRITE),
            ImageBarrier::new(lost_image, ImageState::UNDEFINED, ImageState::TRANSFER_DST),
        ];
        let buffer_barriers = [BufferBarrier::new(buffer, BufferState::UNDEFINED, BufferState::INPUT_ASSEMBLY)];
        let (images, buffers) =
            resolve_barriers(&resolver, DeviceIndex::PRIMARY, &image_barriers, &buffer_barriers);

        assert_eq!(images.len(), 1);
        assert_eq!(images[0].image, vk::Image::from_raw(7));
        assert_eq!(images[0].new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(buffers.len(), 1);
        assert_eq!(buffers[0].buffer, vk::Buffer::from_raw(9));
    }

    #[test]
    fn test_clear_value_and_layout() {
        assert_eq!(clear_state(ImageState::GENERAL), ImageState::GENERAL);
        assert_eq!(clear_state(ImageState::TRANSFER_DST), ImageState::TRANSFER_DST);
        assert_eq!(clear_state(ImageState::COLOR_ATTACHMENT_WRITE), ImageState::TRANSFER_DST);

        let depth = vulkan_clear_value(&ClearValue::depth_stencil(1.0, 3), vk::Format::D24_UNORM_S8_UINT).unwrap();
        assert!(matches!(depth, VulkanClearValue::DepthStencil(v) if v.depth == 1.0 && v.stencil == 3));

        let color = vulkan_clear_value(&ClearValue::color(0.0, 1.0, 0.0, 1.0), vk::Format::R8G8B8A8_UNORM).unwrap();
        let VulkanClearValue::Color(color) = color else {
            panic!("expected a color clear value");
        };
        assert_eq!(unsafe { color.float32 }, [0.0, 1.0, 0.0, 1.0]);

        assert!(matches!(
            vulkan_clear_value(&ClearValue::depth_stencil(1.0, 0), vk::Format::R8G8B8A8_UNORM),
            Err(RhiError::InvalidDescriptor(_))
        ));
        assert!(matches!(
            vulkan_clear_value(&ClearValue::color(0.0, 0.0, 0.0, 0.0), vk::Format::D32_SFLOAT),
            Err(RhiError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn test_buffer_image_copy_row_length() {
        let desc = ImageDescriptor::new_2d(64, 32, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::TRANSFER_SRC);
        let region = buffer_image_copy(&desc, 256, 512, [4, 8, 0], [16, 16, 1]).unwrap();
        assert_eq!(region.buffer_row_length, 128);
        assert_eq!(region.buffer_offset, 256);
        assert_eq!(region.image_offset.y, 8);
        assert_eq!(region.image_subresource.aspect_mask, vk::ImageAspectFlags::COLOR);

        let tight = buffer_image_copy(&desc, 0, 0, [0, 0, 0], [64, 32, 1]).unwrap();
        assert_eq!(tight.buffer_row_length, 0);

        assert!(matches!(
            buffer_image_copy(&desc, 0, 10, [0, 0, 0], [1, 1, 1]),
            Err(RhiError::CopyOutOfBounds(_))
        ));
    }

    #[test]
    fn test_buffer_image_copy_depth_aspect() {
        let desc = ImageDescriptor::new_2d(
            8,
            8,
            vk::Format::D32_SFLOAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
        );
        let region = buffer_image_copy(&desc, 0, 0, [0, 0, 0], [8, 8, 1]).unwrap();
        assert_eq!(region.image_subresource.aspect_mask, vk::ImageAspectFlags::DEPTH);
    }
}
