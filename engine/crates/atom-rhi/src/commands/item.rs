//! 提交给 command list 的工作项
//!
//! DrawItem / DispatchItem 只借用资源句柄的切片，不分配内存，
//! 多个线程可以同时从只读的共享数据构造它们。

use ash::vk;

use crate::{
    RhiError, RhiResult,
    device::HardwareQueueClass,
    resources::{
        buffer::{BufferHandle, IndexBufferView, StreamBufferView},
        image::ImageHandle,
        pipeline::{PipelineStateDescriptor, PipelineStateHandle, PipelineStateType, ShaderResourceGroupHandle},
    },
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
    pub min_z: f32,
    pub max_z: f32,
}

impl Viewport {
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            min_x: 0.0,
            min_y: 0.0,
            max_x: width as f32,
            max_y: height as f32,
            min_z: 0.0,
            max_z: 1.0,
        }
    }

    pub fn to_vk(&self) -> vk::Viewport {
        vk::Viewport {
            x: self.min_x,
            y: self.min_y,
            width: self.max_x - self.min_x,
            height: self.max_y - self.min_y,
            min_depth: self.min_z,
            max_depth: self.max_z,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scissor {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Scissor {
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            min_x: 0,
            min_y: 0,
            max_x: width as i32,
            max_y: height as i32,
        }
    }

    pub fn to_vk(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D {
                x: self.min_x,
                y: self.min_y,
            },
            extent: vk::Extent2D {
                width: (self.max_x - self.min_x).max(0) as u32,
                height: (self.max_y - self.min_y).max(0) as u32,
            },
        }
    }
}

/// 绘制参数
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawArguments {
    Indexed {
        index_count: u32,
        instance_count: u32,
        index_offset: u32,
        vertex_offset: i32,
        instance_offset: u32,
    },
    Linear {
        vertex_count: u32,
        instance_count: u32,
        vertex_offset: u32,
        instance_offset: u32,
    },
}

impl DrawArguments {
    #[inline]
    pub fn indexed(index_count: u32) -> Self {
        Self::Indexed {
            index_count,
            instance_count: 1,
            index_offset: 0,
            vertex_offset: 0,
            instance_offset: 0,
        }
    }

    #[inline]
    pub fn linear(vertex_count: u32) -> Self {
        Self::Linear {
            vertex_count,
            instance_count: 1,
            vertex_offset: 0,
            instance_offset: 0,
        }
    }

    /// builder
    pub fn with_instances(mut self, count: u32) -> Self {
        match &mut self {
            Self::Indexed { instance_count, .. } | Self::Linear { instance_count, .. } => *instance_count = count,
        }
        self
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DrawItem<'a> {
    pub pipeline_state: PipelineStateHandle,
    pub shader_resource_groups: &'a [ShaderResourceGroupHandle],
    pub index_buffer_view: Option<IndexBufferView>,
    pub stream_buffer_views: &'a [StreamBufferView],
    pub arguments: DrawArguments,
    /// 每个 draw 独立的小块常量，不经过 SRG
    pub root_constants: &'a [u8],
}

impl<'a> DrawItem<'a> {
    pub fn new(pipeline_state: PipelineStateHandle, arguments: DrawArguments) -> Self {
        Self {
            pipeline_state,
            shader_resource_groups: &[],
            index_buffer_view: None,
            stream_buffer_views: &[],
            arguments,
            root_constants: &[],
        }
    }

    /// builder
    #[inline]
    pub fn with_shader_resource_groups(mut self, srgs: &'a [ShaderResourceGroupHandle]) -> Self {
        self.shader_resource_groups = srgs;
        self
    }

    /// builder
    #[inline]
    pub fn with_index_buffer_view(mut self, view: IndexBufferView) -> Self {
        self.index_buffer_view = Some(view);
        self
    }

    /// builder
    #[inline]
    pub fn with_stream_buffer_views(mut self, views: &'a [StreamBufferView]) -> Self {
        self.stream_buffer_views = views;
        self
    }

    /// builder
    #[inline]
    pub fn with_root_constants<T: bytemuck::Pod>(mut self, constants: &'a T) -> Self {
        self.root_constants = bytemuck::bytes_of(constants);
        self
    }

    /// 检查 draw item 与管线、队列是否匹配
    pub fn validate(&self, pipeline: &PipelineStateDescriptor, queue: HardwareQueueClass) -> RhiResult<()> {
        if !queue.supports_draw() {
            return Err(RhiError::UnsupportedQueue { command: "draw", queue });
        }
        if pipeline.pipeline_type != PipelineStateType::Draw {
            return Err(RhiError::PipelineMismatch {
                name: pipeline.name.clone(),
                usage: "draw",
            });
        }
        if matches!(self.arguments, DrawArguments::Indexed { .. }) && self.index_buffer_view.is_none() {
            return Err(RhiError::MissingIndexBuffer);
        }
        validate_root_constants(pipeline, self.root_constants)
    }
}

/// dispatch 的规模
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchArguments {
    /// 给出线程总数，group 数量自动计算
    ///
    /// `threads_per_group` 必须与 shader 的 numthreads 一致
    Direct {
        total_threads: [u32; 3],
        threads_per_group: [u16; 3],
    },
    /// 直接给出 group 数量
    Groups([u32; 3]),
}

impl DispatchArguments {
    /// 实际 dispatch 的 group 数量
    pub fn group_count(&self) -> [u32; 3] {
        match *self {
            Self::Direct {
                total_threads,
                threads_per_group,
            } => std::array::from_fn(|i| total_threads[i].div_ceil((threads_per_group[i] as u32).max(1))),
            Self::Groups(groups) => groups,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DispatchItem<'a> {
    pub pipeline_state: PipelineStateHandle,
    pub shader_resource_groups: &'a [ShaderResourceGroupHandle],
    pub arguments: DispatchArguments,
    pub root_constants: &'a [u8],
}

impl<'a> DispatchItem<'a> {
    pub fn new(pipeline_state: PipelineStateHandle, arguments: DispatchArguments) -> Self {
        Self {
            pipeline_state,
            shader_resource_groups: &[],
            arguments,
            root_constants: &[],
        }
    }

    /// builder
    #[inline]
    pub fn with_shader_resource_groups(mut self, srgs: &'a [ShaderResourceGroupHandle]) -> Self {
        self.shader_resource_groups = srgs;
        self
    }

    /// builder
    #[inline]
    pub fn with_root_constants<T: bytemuck::Pod>(mut self, constants: &'a T) -> Self {
        self.root_constants = bytemuck::bytes_of(constants);
        self
    }

    pub fn validate(&self, pipeline: &PipelineStateDescriptor, queue: HardwareQueueClass) -> RhiResult<()> {
        if !queue.supports_dispatch() {
            return Err(RhiError::UnsupportedQueue {
                command: "dispatch",
                queue,
            });
        }
        let PipelineStateType::Dispatch { num_threads } = pipeline.pipeline_type else {
            return Err(RhiError::PipelineMismatch {
                name: pipeline.name.clone(),
                usage: "dispatch",
            });
        };
        if let DispatchArguments::Direct { threads_per_group, .. } = self.arguments {
            if threads_per_group != num_threads {
                return Err(RhiError::ThreadGroupMismatch {
                    name: pipeline.name.clone(),
                    requested: threads_per_group,
                    declared: num_threads,
                });
            }
        }
        validate_root_constants(pipeline, self.root_constants)
    }
}

fn validate_root_constants(pipeline: &PipelineStateDescriptor, root_constants: &[u8]) -> RhiResult<()> {
    if root_constants.len() > pipeline.root_constants_size as usize {
        return Err(RhiError::RootConstantsOverflow {
            name: pipeline.name.clone(),
            size: root_constants.len(),
            capacity: pipeline.root_constants_size,
        });
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CopyBufferDescriptor {
    pub source: BufferHandle,
    pub source_offset: u64,
    pub destination: BufferHandle,
    pub destination_offset: u64,
    pub size: u64,
}

/// buffer 中的数据按行紧密排列（`bytes_per_row` 为 0 时按宽度推断）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CopyBufferToImageDescriptor {
    pub source: BufferHandle,
    pub source_offset: u64,
    pub source_bytes_per_row: u32,
    pub destination: ImageHandle,
    pub destination_origin: [u32; 3],
    pub size: [u32; 3],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CopyImageToBufferDescriptor {
    pub source: ImageHandle,
    pub source_origin: [u32; 3],
    pub size: [u32; 3],
    pub destination: BufferHandle,
    pub destination_offset: u64,
    pub destination_bytes_per_row: u32,
}

/// 拷贝工作项，只访问 mip 0 / layer 0
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyItem {
    Buffer(CopyBufferDescriptor),
    BufferToImage(CopyBufferToImageDescriptor),
    ImageToBuffer(CopyImageToBufferDescriptor),
}
