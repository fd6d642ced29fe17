use super::{buffer::BufferView, image::ImageView};

slotmap::new_key_type! {
    pub struct PipelineStateHandle;
    /// Shader Resource Group：一组绑定给 shader 的资源与常量
    pub struct ShaderResourceGroupHandle;
}

/// 管线类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineStateType {
    Draw,
    /// `num_threads` 对应 shader 中声明的 numthreads
    Dispatch { num_threads: [u16; 3] },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineStateDescriptor {
    pub name: String,
    pub pipeline_type: PipelineStateType,
    /// inline root constants 的字节数上限
    pub root_constants_size: u32,
}

impl PipelineStateDescriptor {
    pub fn draw(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pipeline_type: PipelineStateType::Draw,
            root_constants_size: 0,
        }
    }

    pub fn dispatch(name: impl Into<String>, num_threads: [u16; 3]) -> Self {
        Self {
            name: name.into(),
            pipeline_type: PipelineStateType::Dispatch { num_threads },
            root_constants_size: 0,
        }
    }

    /// builder
    #[inline]
    pub fn with_root_constants_size(mut self, size: u32) -> Self {
        self.root_constants_size = size;
        self
    }
}

/// SRG 在 Compile 阶段提交的数据
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShaderResourceGroupData {
    pub constants: Vec<u8>,
    pub image_views: Vec<ImageView>,
    pub buffer_views: Vec<BufferView>,
}

impl ShaderResourceGroupData {
    pub fn new() -> Self {
        Self::default()
    }

    /// builder
    pub fn with_constants<T: bytemuck::Pod>(mut self, constants: &T) -> Self {
        self.constants = bytemuck::bytes_of(constants).to_vec();
        self
    }

    /// builder
    pub fn with_image_view(mut self, view: ImageView) -> Self {
        self.image_views.push(view);
        self
    }

    /// builder
    pub fn with_buffer_view(mut self, view: BufferView) -> Self {
        self.buffer_views.push(view);
        self
    }
}
