//! 像素格式相关的工具函数

use ash::vk;

use crate::{RhiError, RhiResult, resources::clear::ClearValue};

/// 单个 texel 的字节数，不支持的格式返回 None
pub fn texel_size(format: vk::Format) -> Option<u32> {
    let size = match format {
        vk::Format::R8_UNORM | vk::Format::R8_UINT | vk::Format::S8_UINT => 1,
        vk::Format::R8G8_UNORM | vk::Format::R16_SFLOAT | vk::Format::R16_UINT | vk::Format::D16_UNORM => 2,
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::R8G8B8A8_UINT
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::A2B10G10R10_UNORM_PACK32
        | vk::Format::R16G16_SFLOAT
        | vk::Format::R32_SFLOAT
        | vk::Format::R32_UINT
        | vk::Format::D32_SFLOAT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::X8_D24_UNORM_PACK32 => 4,
        // depth 与 stencil 分开存放，这里按 4 + 4 对齐
        vk::Format::D32_SFLOAT_S8_UINT
        | vk::Format::R16G16B16A16_SFLOAT
        | vk::Format::R32G32_SFLOAT
        | vk::Format::R32G32_UINT => 8,
        vk::Format::R32G32B32A32_SFLOAT | vk::Format::R32G32B32A32_UINT => 16,
        _ => return None,
    };
    Some(size)
}

/// 根据格式推断 image aspect
pub fn infer_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }

        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,

        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }

        _ => vk::ImageAspectFlags::COLOR,
    }
}

#[inline]
pub fn is_depth_stencil(format: vk::Format) -> bool {
    infer_aspect(format).intersects(vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL)
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 { c * 12.92 } else { 1.055 * c.powf(1.0 / 2.4) - 0.055 }
}

#[inline]
fn unorm8(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// 把 clear value 编码成一个 texel 的字节
///
/// 字节顺序与内存中的通道顺序一致：B8G8R8A8 会交换 R 与 B
pub fn encode_clear_value(format: vk::Format, value: &ClearValue) -> RhiResult<Vec<u8>> {
    let unsupported = || RhiError::UnsupportedFormat(format);

    let bytes = match (*value, format) {
        (ClearValue::Vector4Float(c), vk::Format::R8_UNORM) => vec![unorm8(c[0])],
        (ClearValue::Vector4Float(c), vk::Format::R8G8_UNORM) => vec![unorm8(c[0]), unorm8(c[1])],
        (ClearValue::Vector4Float(c), vk::Format::R8G8B8A8_UNORM) => c.iter().map(|v| unorm8(*v)).collect(),
        (ClearValue::Vector4Float(c), vk::Format::B8G8R8A8_UNORM) => {
            vec![unorm8(c[2]), unorm8(c[1]), unorm8(c[0]), unorm8(c[3])]
        }
        (ClearValue::Vector4Float(c), vk::Format::R8G8B8A8_SRGB) => vec![
            unorm8(linear_to_srgb(c[0])),
            unorm8(linear_to_srgb(c[1])),
            unorm8(linear_to_srgb(c[2])),
            unorm8(c[3]),
        ],
        (ClearValue::Vector4Float(c), vk::Format::B8G8R8A8_SRGB) => vec![
            unorm8(linear_to_srgb(c[2])),
            unorm8(linear_to_srgb(c[1])),
            unorm8(linear_to_srgb(c[0])),
            unorm8(c[3]),
        ],
        (ClearValue::Vector4Float(c), vk::Format::R32_SFLOAT) => c[0].to_le_bytes().to_vec(),
        (ClearValue::Vector4Float(c), vk::Format::R32G32_SFLOAT) => bytemuck::cast_slice::<f32, u8>(&c[..2]).to_vec(),
        (ClearValue::Vector4Float(c), vk::Format::R32G32B32A32_SFLOAT) => bytemuck::cast_slice::<f32, u8>(&c).to_vec(),
        (ClearValue::Vector4Uint(c), vk::Format::R8_UINT) => vec![c[0] as u8],
        (ClearValue::Vector4Uint(c), vk::Format::R8G8B8A8_UINT) => c.iter().map(|v| *v as u8).collect(),
        (ClearValue::Vector4Uint(c), vk::Format::R16_UINT) => (c[0] as u16).to_le_bytes().to_vec(),
        (ClearValue::Vector4Uint(c), vk::Format::R32_UINT) => c[0].to_le_bytes().to_vec(),
        (ClearValue::Vector4Uint(c), vk::Format::R32G32_UINT) => bytemuck::cast_slice::<u32, u8>(&c[..2]).to_vec(),
        (ClearValue::Vector4Uint(c), vk::Format::R32G32B32A32_UINT) => bytemuck::cast_slice::<u32, u8>(&c).to_vec(),
        (ClearValue::DepthStencil { depth, .. }, vk::Format::D16_UNORM) => {
            ((depth.clamp(0.0, 1.0) * u16::MAX as f32).round() as u16).to_le_bytes().to_vec()
        }
        (ClearValue::DepthStencil { depth, .. }, vk::Format::D32_SFLOAT) => depth.to_le_bytes().to_vec(),
        (ClearValue::DepthStencil { depth, .. }, vk::Format::X8_D24_UNORM_PACK32) => {
            let d24 = (depth.clamp(0.0, 1.0) * 0x00FF_FFFF as f32).round() as u32;
            d24.to_le_bytes().to_vec()
        }
        (ClearValue::DepthStencil { depth, stencil }, vk::Format::D24_UNORM_S8_UINT) => {
            let d24 = (depth.clamp(0.0, 1.0) * 0x00FF_FFFF as f32).round() as u32;
            (d24 | ((stencil as u32) << 24)).to_le_bytes().to_vec()
        }
        (ClearValue::DepthStencil { depth, stencil }, vk::Format::D32_SFLOAT_S8_UINT) => {
            let mut bytes = depth.to_le_bytes().to_vec();
            bytes.extend_from_slice(&[stencil, 0, 0, 0]);
            bytes
        }
        (ClearValue::DepthStencil { stencil, .. }, vk::Format::S8_UINT) => vec![stencil],
        _ => return Err(unsupported()),
    };

    debug_assert_eq!(Some(bytes.len() as u32), texel_size(format));
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_aspect() {
        assert_eq!(infer_aspect(vk::Format::R8G8B8A8_UNORM), vk::ImageAspectFlags::COLOR);
        assert_eq!(infer_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            infer_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert!(is_depth_stencil(vk::Format::S8_UINT));
        assert!(!is_depth_stencil(vk::Format::B8G8R8A8_UNORM));
    }

    #[test]
    fn test_encode_color_channel_order() {
        let red = ClearValue::Vector4Float([1.0, 0.0, 0.0, 1.0]);
        assert_eq!(encode_clear_value(vk::Format::R8G8B8A8_UNORM, &red).unwrap(), vec![255, 0, 0, 255]);
        assert_eq!(encode_clear_value(vk::Format::B8G8R8A8_UNORM, &red).unwrap(), vec![0, 0, 255, 255]);
    }

    #[test]
    fn test_encode_depth() {
        let clear = ClearValue::DepthStencil { depth: 1.0, stencil: 3 };
        assert_eq!(encode_clear_value(vk::Format::D32_SFLOAT, &clear).unwrap(), 1.0f32.to_le_bytes().to_vec());
        assert_eq!(encode_clear_value(vk::Format::D24_UNORM_S8_UINT, &clear).unwrap(), vec![0xFF, 0xFF, 0xFF, 3]);
    }

    #[test]
    fn test_encode_mismatch() {
        let clear = ClearValue::DepthStencil { depth: 1.0, stencil: 0 };
        assert!(matches!(
            encode_clear_value(vk::Format::R8G8B8A8_UNORM, &clear),
            Err(RhiError::UnsupportedFormat(_))
        ));
        assert!(texel_size(vk::Format::BC1_RGB_UNORM_BLOCK).is_none());
    }
}
