use ash::vk;

slotmap::new_key_type! {
    /// 设备上的 buffer 对象
    pub struct BufferHandle;
}

/// buffer 所在的内存层级
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HeapMemoryLevel {
    /// 显存，CPU 不可见
    #[default]
    Device,
    /// CPU 可见（staging / readback）
    Host,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub byte_size: u64,
    pub usage: vk::BufferUsageFlags,
    pub memory_level: HeapMemoryLevel,
}

impl BufferDescriptor {
    #[inline]
    pub fn new(byte_size: u64, usage: vk::BufferUsageFlags) -> Self {
        Self {
            byte_size,
            usage,
            memory_level: HeapMemoryLevel::Device,
        }
    }

    /// CPU 可读的回读 buffer
    #[inline]
    pub fn readback(byte_size: u64) -> Self {
        Self {
            byte_size,
            usage: vk::BufferUsageFlags::TRANSFER_DST,
            memory_level: HeapMemoryLevel::Host,
        }
    }

    /// CPU 可写的上传 buffer
    #[inline]
    pub fn staging(byte_size: u64) -> Self {
        Self {
            byte_size,
            usage: vk::BufferUsageFlags::TRANSFER_SRC,
            memory_level: HeapMemoryLevel::Host,
        }
    }
}

/// buffer 视图描述
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferViewDescriptor {
    pub offset: u64,
    /// `vk::WHOLE_SIZE` 表示直到 buffer 末尾
    pub size: u64,
    pub element_stride: u32,
}

impl Default for BufferViewDescriptor {
    fn default() -> Self {
        Self {
            offset: 0,
            size: vk::WHOLE_SIZE,
            element_stride: 0,
        }
    }
}

impl BufferViewDescriptor {
    pub fn structured(first_element: u64, element_count: u64, element_stride: u32) -> Self {
        Self {
            offset: first_element * element_stride as u64,
            size: element_count * element_stride as u64,
            element_stride,
        }
    }

    pub fn raw(offset: u64, size: u64) -> Self {
        Self {
            offset,
            size,
            element_stride: 0,
        }
    }

    /// 在给定 buffer 大小下的实际字节数
    #[inline]
    pub fn resolved_size(&self, buffer_size: u64) -> u64 {
        if self.size == vk::WHOLE_SIZE { buffer_size.saturating_sub(self.offset) } else { self.size }
    }
}

/// 已解析的 buffer 视图
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferView {
    pub buffer: BufferHandle,
    pub descriptor: BufferViewDescriptor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

impl IndexFormat {
    #[inline]
    pub fn size(self) -> u32 {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }

    #[inline]
    pub fn to_vk(self) -> vk::IndexType {
        match self {
            Self::Uint16 => vk::IndexType::UINT16,
            Self::Uint32 => vk::IndexType::UINT32,
        }
    }
}

/// 索引 buffer 视图
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexBufferView {
    pub buffer: BufferHandle,
    pub byte_offset: u64,
    pub byte_count: u32,
    pub format: IndexFormat,
}

/// 顶点流 buffer 视图
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamBufferView {
    pub buffer: BufferHandle,
    pub byte_offset: u64,
    pub byte_count: u32,
    pub byte_stride: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_size() {
        assert_eq!(BufferViewDescriptor::default().resolved_size(256), 256);
        assert_eq!(BufferViewDescriptor::raw(64, vk::WHOLE_SIZE).resolved_size(256), 192);
        let structured = BufferViewDescriptor::structured(2, 4, 16);
        assert_eq!((structured.offset, structured.resolved_size(1024)), (32, 64));
    }
}
