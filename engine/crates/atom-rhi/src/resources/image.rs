use ash::vk;

use crate::format;

slotmap::new_key_type! {
    /// 设备上的 image 对象
    pub struct ImageHandle;
}

/// 图像描述
///
/// 包含创建 image 所需的所有信息
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub width: u32,
    pub height: u32,
    /// 3D 纹理的深度
    pub depth: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub samples: vk::SampleCountFlags,
    pub image_type: vk::ImageType,
}

impl Default for ImageDescriptor {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            format: vk::Format::R8G8B8A8_UNORM,
            usage: vk::ImageUsageFlags::SAMPLED,
            samples: vk::SampleCountFlags::TYPE_1,
            image_type: vk::ImageType::TYPE_2D,
        }
    }
}

// new & init & builder
impl ImageDescriptor {
    #[inline]
    pub fn new_2d(width: u32, height: u32, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            width,
            height,
            format,
            usage,
            ..Default::default()
        }
    }

    /// builder
    #[inline]
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// builder
    #[inline]
    pub fn with_array_layers(mut self, array_layers: u32) -> Self {
        self.array_layers = array_layers;
        self
    }

    /// builder
    #[inline]
    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }
}

// getters
impl ImageDescriptor {
    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        vk::Extent3D {
            width: self.width,
            height: self.height,
            depth: self.depth,
        }
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        format::infer_aspect(self.format)
    }

    /// mip 0、layer 0 按行紧密排列时的字节数
    pub fn subresource_size(&self) -> Option<u64> {
        let texel = format::texel_size(self.format)? as u64;
        Some(self.width as u64 * self.height as u64 * self.depth as u64 * texel)
    }

    /// 所有 mip 与 layer 的字节数
    pub fn byte_size(&self) -> Option<u64> {
        let texel = format::texel_size(self.format)? as u64;
        let mut total = 0;
        for mip in 0..self.mip_levels.max(1) {
            let w = (self.width >> mip).max(1) as u64;
            let h = (self.height >> mip).max(1) as u64;
            let d = (self.depth >> mip).max(1) as u64;
            total += w * h * d * texel;
        }
        Some(total * self.array_layers.max(1) as u64)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return Err(format!("image extent {}x{}x{} has a zero dimension", self.width, self.height, self.depth));
        }
        if self.mip_levels == 0 || self.array_layers == 0 {
            return Err("mip levels and array layers must be at least 1".to_string());
        }
        if format::texel_size(self.format).is_none() {
            return Err(format!("format {:?} is not supported", self.format));
        }
        Ok(())
    }
}

/// 图像视图描述
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageViewDescriptor {
    /// `None` 表示沿用 image 的格式
    pub format: Option<vk::Format>,
    /// 为空时根据格式推断
    pub aspect: vk::ImageAspectFlags,
    pub base_mip_level: u32,
    pub mip_level_count: u32,
    pub base_array_layer: u32,
    pub array_layer_count: u32,
}

impl Default for ImageViewDescriptor {
    fn default() -> Self {
        Self {
            format: None,
            aspect: vk::ImageAspectFlags::empty(),
            base_mip_level: 0,
            mip_level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            array_layer_count: vk::REMAINING_ARRAY_LAYERS,
        }
    }
}

impl ImageViewDescriptor {
    /// 单个 mip 的视图
    pub fn mip(level: u32) -> Self {
        Self {
            base_mip_level: level,
            mip_level_count: 1,
            ..Default::default()
        }
    }

    /// builder
    #[inline]
    pub fn with_aspect(mut self, aspect: vk::ImageAspectFlags) -> Self {
        self.aspect = aspect;
        self
    }

    /// 视图覆盖的 subresource range，aspect 为空时根据 `image_format` 推断
    pub fn subresource_range(&self, image_format: vk::Format) -> vk::ImageSubresourceRange {
        let aspect_mask = if self.aspect.is_empty() {
            format::infer_aspect(self.format.unwrap_or(image_format))
        } else {
            self.aspect
        };
        vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: self.base_mip_level,
            level_count: self.mip_level_count,
            base_array_layer: self.base_array_layer,
            layer_count: self.array_layer_count,
        }
    }
}

/// 已解析的图像视图：物理 image + 视图描述
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageView {
    pub image: ImageHandle,
    pub descriptor: ImageViewDescriptor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size_with_mips() {
        let desc = ImageDescriptor::new_2d(4, 4, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::SAMPLED)
            .with_mip_levels(3);
        // 4x4 + 2x2 + 1x1
        assert_eq!(desc.byte_size(), Some((16 + 4 + 1) * 4));
        assert_eq!(desc.subresource_size(), Some(64));
    }

    #[test]
    fn test_validate() {
        let mut desc = ImageDescriptor::new_2d(0, 4, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::SAMPLED);
        assert!(desc.validate().is_err());
        desc.width = 4;
        assert!(desc.validate().is_ok());
        desc.format = vk::Format::BC7_UNORM_BLOCK;
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_view_infers_aspect() {
        let range = ImageViewDescriptor::default().subresource_range(vk::Format::D32_SFLOAT);
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::DEPTH);
        assert_eq!(range.level_count, vk::REMAINING_MIP_LEVELS);

        let range = ImageViewDescriptor::mip(2).subresource_range(vk::Format::R8G8B8A8_UNORM);
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!((range.base_mip_level, range.level_count), (2, 1));
    }
}
