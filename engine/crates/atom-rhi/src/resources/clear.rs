use ash::vk;

/// 清除值
///
/// 与格式无关，实际写入的字节由 `format::encode_clear_value` 决定
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearValue {
    Vector4Float([f32; 4]),
    Vector4Uint([u32; 4]),
    DepthStencil { depth: f32, stencil: u8 },
}

impl Default for ClearValue {
    fn default() -> Self {
        Self::Vector4Float([0.0; 4])
    }
}

impl ClearValue {
    #[inline]
    pub fn color(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self::Vector4Float([r, g, b, a])
    }

    #[inline]
    pub fn depth_stencil(depth: f32, stencil: u8) -> Self {
        Self::DepthStencil { depth, stencil }
    }

    /// 填充 buffer 时使用的 32 位值
    pub fn fill_word(&self) -> u32 {
        match self {
            Self::Vector4Float(c) => c[0].to_bits(),
            Self::Vector4Uint(c) => c[0],
            Self::DepthStencil { depth, .. } => depth.to_bits(),
        }
    }

    pub fn to_vk(&self) -> vk::ClearValue {
        match *self {
            Self::Vector4Float(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            Self::Vector4Uint(uint32) => vk::ClearValue {
                color: vk::ClearColorValue { uint32 },
            },
            Self::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth,
                    stencil: stencil as u32,
                },
            },
        }
    }
}
