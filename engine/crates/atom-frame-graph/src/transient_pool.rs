//! transient 物理资源的跨帧缓存
//!
//! 每帧按 slot 的描述取出资源，帧结束后放回；闲置超过指定帧数的资源被释放。
//! 资源记录最后一次使用后的状态，复用时下一帧的第一个 barrier 从这个状态开始同步。

use atom_rhi::{RhiResult, device::RhiDevice};

use crate::database::{AttachmentDescriptor, AttachmentResource, AttachmentState};

#[derive(Clone, Copy, Debug)]
struct PooledResource {
    resource: AttachmentResource,
    descriptor: AttachmentDescriptor,
    idle_frames: u32,
    /// 新建的资源为 `None`
    last_state: Option<AttachmentState>,
}

#[derive(Default)]
pub struct TransientPool {
    /// 当前帧正在使用
    active: Vec<PooledResource>,
    free: Vec<PooledResource>,
}

impl TransientPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取出一个描述完全一致的资源，没有时创建
    ///
    /// 创建失败时先释放闲置资源再重试一次
    pub fn acquire(
        &mut self,
        device: &dyn RhiDevice,
        name: &str,
        descriptor: &AttachmentDescriptor,
    ) -> RhiResult<AttachmentResource> {
        if let Some(index) = self.free.iter().position(|r| r.descriptor == *descriptor) {
            let mut pooled = self.free.swap_remove(index);
            pooled.idle_frames = 0;
            self.active.push(pooled);
            return Ok(pooled.resource);
        }

        let resource = match Self::create(device, name, descriptor) {
            Ok(resource) => resource,
            Err(err) if !self.free.is_empty() => {
                log::debug!("transient allocation `{name}` failed ({err}), releasing {} idle resources", self.free.len());
                for pooled in std::mem::take(&mut self.free) {
                    Self::destroy(device, pooled.resource);
                }
                Self::create(device, name, descriptor)?
            }
            Err(err) => return Err(err),
        };

        self.active.push(PooledResource {
            resource,
            descriptor: *descriptor,
            idle_frames: 0,
            last_state: None,
        });
        Ok(resource)
    }

    /// 当前帧取出的资源在之前的帧中最后一次使用后的状态
    pub fn last_state(&self, resource: AttachmentResource) -> Option<AttachmentState> {
        self.active.iter().find(|r| r.resource == resource).and_then(|r| r.last_state)
    }

    pub fn set_last_state(&mut self, resource: AttachmentResource, state: AttachmentState) {
        if let Some(pooled) = self.active.iter_mut().find(|r| r.resource == resource) {
            pooled.last_state = Some(state);
        }
    }

    /// 把当前帧取出的资源放回，不做释放
    pub fn recycle(&mut self) {
        self.free.append(&mut self.active);
    }

    /// 帧结束：闲置资源计数加一，超过 `max_idle_frames` 的释放，再放回当前帧的资源
    pub fn end_frame(&mut self, device: &dyn RhiDevice, max_idle_frames: u32) {
        let mut released = 0;
        self.free.retain_mut(|pooled| {
            pooled.idle_frames += 1;
            if pooled.idle_frames > max_idle_frames {
                Self::destroy(device, pooled.resource);
                released += 1;
                false
            } else {
                true
            }
        });
        if released > 0 {
            log::debug!("released {released} idle transient resources");
        }
        self.recycle();
    }

    pub fn release_all(&mut self, device: &dyn RhiDevice) {
        for pooled in self.active.drain(..).chain(self.free.drain(..)) {
            Self::destroy(device, pooled.resource);
        }
    }

    #[inline]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    #[inline]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}

// helpers
impl TransientPool {
    fn create(device: &dyn RhiDevice, name: &str, descriptor: &AttachmentDescriptor) -> RhiResult<AttachmentResource> {
        Ok(match descriptor {
            AttachmentDescriptor::Image(desc) => AttachmentResource::Image(device.create_image(name, desc)?),
            AttachmentDescriptor::Buffer(desc) => AttachmentResource::Buffer(device.create_buffer(name, desc)?),
        })
    }

    fn destroy(device: &dyn RhiDevice, resource: AttachmentResource) {
        match resource {
            AttachmentResource::Image(image) => device.destroy_image(image),
            AttachmentResource::Buffer(buffer) => device.destroy_buffer(buffer),
        }
    }
}

#[cfg(test)]
mod tests {
    use ash::vk;
    use atom_rhi::{
        resources::{buffer::BufferDescriptor, image::ImageDescriptor},
        soft::{SoftDevice, SoftDeviceDesc},
        state::ImageState,
    };

    use super::*;

    fn image_desc(width: u32) -> AttachmentDescriptor {
        AttachmentDescriptor::Image(ImageDescriptor::new_2d(
            width,
            4,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED,
        ))
    }

    #[test]
    fn test_reuse_across_frames() {
        let device = SoftDevice::default();
        let mut pool = TransientPool::new();

        let first = pool.acquire(&device, "A", &image_desc(4)).unwrap();
        pool.end_frame(&device, 3);

        let second = pool.acquire(&device, "B", &image_desc(4)).unwrap();
        assert_eq!(first, second);
        let other = pool.acquire(&device, "C", &image_desc(8)).unwrap();
        assert_ne!(first, other);
        assert_eq!(pool.active_count(), 2);
        assert_eq!(device.live_image_count(), 2);

        pool.release_all(&device);
        assert_eq!(device.live_image_count(), 0);
    }

    #[test]
    fn test_last_state_follows_the_resource() {
        let device = SoftDevice::default();
        let mut pool = TransientPool::new();
        let written = AttachmentState::Image(ImageState::COLOR_ATTACHMENT_WRITE);

        let first = pool.acquire(&device, "A", &image_desc(4)).unwrap();
        assert_eq!(pool.last_state(first), None);
        pool.set_last_state(first, written);
        pool.end_frame(&device, 3);

        let reused = pool.acquire(&device, "B", &image_desc(4)).unwrap();
        assert_eq!(reused, first);
        assert_eq!(pool.last_state(reused), Some(written));

        let fresh = pool.acquire(&device, "C", &image_desc(4)).unwrap();
        assert_eq!(pool.last_state(fresh), None);
    }

    #[test]
    fn test_idle_resources_are_released() {
        let device = SoftDevice::default();
        let mut pool = TransientPool::new();
        pool.acquire(&device, "A", &image_desc(4)).unwrap();
        pool.end_frame(&device, 1);
        assert_eq!(pool.free_count(), 1);

        // 闲置 1 帧保留，闲置 2 帧释放
        pool.end_frame(&device, 1);
        assert_eq!(pool.free_count(), 1);
        pool.end_frame(&device, 1);
        assert_eq!(pool.free_count(), 0);
        assert_eq!(device.live_image_count(), 0);
    }

    #[test]
    fn test_out_of_memory_releases_idle() {
        let device = SoftDevice::new(SoftDeviceDesc {
            memory_budget: Some(128),
            ..Default::default()
        });
        let mut pool = TransientPool::new();
        let small = AttachmentDescriptor::Buffer(BufferDescriptor::new(64, vk::BufferUsageFlags::STORAGE_BUFFER));
        let large = AttachmentDescriptor::Buffer(BufferDescriptor::new(128, vk::BufferUsageFlags::STORAGE_BUFFER));

        pool.acquire(&device, "Small", &small).unwrap();
        pool.recycle();
        pool.acquire(&device, "Large", &large).unwrap();
        assert_eq!(device.live_buffer_count(), 1);

        assert!(pool.acquire(&device, "TooLarge", &small).is_err());
    }
}
