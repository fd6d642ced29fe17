//! transient attachment 的生命周期与内存别名
//!
//! 生命周期是 attachment 在线性执行顺序中第一次与最后一次被使用的位置。
//! 生命周期不重叠、描述兼容的 attachment 共用同一个 slot，即同一个物理资源。

use std::collections::HashMap;

use atom_rhi::resources::{buffer::BufferDescriptor, image::ImageDescriptor};

use crate::database::AttachmentDescriptor;

/// `[first_use, last_use]`，都是线性执行顺序中的位置
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentLifetime {
    pub attachment: usize,
    pub first_use: usize,
    pub last_use: usize,
}

impl AttachmentLifetime {
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.first_use <= other.last_use && other.first_use <= self.last_use
    }
}

/// 一个物理资源，按时间先后被若干 attachment 使用
#[derive(Clone, Debug)]
pub struct TransientSlot {
    /// 合并了所有使用者需求的描述
    pub descriptor: AttachmentDescriptor,
    pub lifetime_end: usize,
    /// 按生命周期先后排列
    pub attachments: Vec<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct AliasingPlan {
    pub slots: Vec<TransientSlot>,
    slot_of: HashMap<usize, usize>,
}

impl AliasingPlan {
    #[inline]
    pub fn slot_of(&self, attachment: usize) -> Option<usize> {
        self.slot_of.get(&attachment).copied()
    }

    /// 共用 slot 的相邻 attachment：(先使用的, 后使用的)
    pub fn alias_pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.slots
            .iter()
            .flat_map(|slot| slot.attachments.windows(2).map(|pair| (pair[0], pair[1])))
    }

    /// 与其他 attachment 共用物理资源的 attachment 数量
    pub fn aliased_attachment_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.attachments.len() > 1).map(|slot| slot.attachments.len()).sum()
    }
}

/// 统计 transient attachment 的生命周期
///
/// - `order`：线性执行顺序中的 scope 索引
/// - `uses[scope]`：scope 使用的 attachment 索引
pub fn compute_lifetimes(
    order: &[usize],
    uses: &[Vec<usize>],
    is_transient: impl Fn(usize) -> bool,
) -> Vec<AttachmentLifetime> {
    let mut lifetimes: Vec<AttachmentLifetime> = Vec::new();
    let mut index_of: HashMap<usize, usize> = HashMap::new();

    for (position, &scope) in order.iter().enumerate() {
        for &attachment in uses[scope].iter().filter(|&&a| is_transient(a)) {
            match index_of.get(&attachment) {
                Some(&i) => lifetimes[i].last_use = position,
                None => {
                    index_of.insert(attachment, lifetimes.len());
                    lifetimes.push(AttachmentLifetime {
                        attachment,
                        first_use: position,
                        last_use: position,
                    });
                }
            }
        }
    }

    lifetimes
}

/// 贪心的区间着色：按首次使用排序，复用第一个已经空闲且兼容的 slot
///
/// `enable_aliasing` 为 false 时每个 attachment 独占一个 slot
pub fn plan_aliasing(
    mut lifetimes: Vec<AttachmentLifetime>,
    descriptor_of: impl Fn(usize) -> Option<AttachmentDescriptor>,
    enable_aliasing: bool,
) -> AliasingPlan {
    lifetimes.sort_by_key(|lt| (lt.first_use, lt.attachment));

    let mut plan = AliasingPlan::default();
    for lifetime in lifetimes {
        let Some(descriptor) = descriptor_of(lifetime.attachment) else {
            continue;
        };

        let reused = enable_aliasing
            .then(|| {
                plan.slots.iter_mut().enumerate().find_map(|(slot_index, slot)| {
                    if slot.lifetime_end >= lifetime.first_use {
                        return None;
                    }
                    let merged = merge_descriptors(&slot.descriptor, &descriptor)?;
                    slot.descriptor = merged;
                    slot.lifetime_end = lifetime.last_use;
                    slot.attachments.push(lifetime.attachment);
                    Some(slot_index)
                })
            })
            .flatten();

        let slot_index = reused.unwrap_or_else(|| {
            plan.slots.push(TransientSlot {
                descriptor,
                lifetime_end: lifetime.last_use,
                attachments: vec![lifetime.attachment],
            });
            plan.slots.len() - 1
        });
        plan.slot_of.insert(lifetime.attachment, slot_index);
    }

    plan
}

/// 两个描述能否共用一个物理资源，可以时返回合并后的描述
pub fn merge_descriptors(a: &AttachmentDescriptor, b: &AttachmentDescriptor) -> Option<AttachmentDescriptor> {
    match (a, b) {
        (AttachmentDescriptor::Image(a), AttachmentDescriptor::Image(b)) => {
            merge_images(a, b).map(AttachmentDescriptor::Image)
        }
        (AttachmentDescriptor::Buffer(a), AttachmentDescriptor::Buffer(b)) => {
            merge_buffers(a, b).map(AttachmentDescriptor::Buffer)
        }
        _ => None,
    }
}

fn merge_images(a: &ImageDescriptor, b: &ImageDescriptor) -> Option<ImageDescriptor> {
    // 除 usage 外必须完全一致
    let compatible = ImageDescriptor { usage: b.usage, ..*a } == *b;
    compatible.then(|| ImageDescriptor {
        usage: a.usage | b.usage,
        ..*a
    })
}

fn merge_buffers(a: &BufferDescriptor, b: &BufferDescriptor) -> Option<BufferDescriptor> {
    (a.memory_level == b.memory_level).then(|| BufferDescriptor {
        byte_size: a.byte_size.max(b.byte_size),
        usage: a.usage | b.usage,
        memory_level: a.memory_level,
    })
}
