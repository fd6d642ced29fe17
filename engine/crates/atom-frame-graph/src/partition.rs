//! 把 scope 的工作项划分到多个 command list
//!
//! 每个 command list 负责连续的一段 `[start, end)`，所有区间首尾相接、覆盖 `[0, N)`。

use atom_rhi::commands::command_list::SubmitRange;

/// `item_count` 个工作项划分为若干个区间
///
/// command list 数量 K = clamp(ceil(N / min_items), 1, max_lists)，
/// 每个区间 ceil(N / K) 项，最后一个区间取剩余部分，空的尾部区间被丢弃。
/// N = 0 时仍然返回一个空区间 `[0, 0)`，保证 Execute 被调用一次
pub fn partition_items(item_count: u32, max_lists: u32, min_items_per_list: u32) -> Vec<SubmitRange> {
    if item_count == 0 {
        return vec![SubmitRange::new(0, 0)];
    }

    let list_count = item_count.div_ceil(min_items_per_list.max(1)).clamp(1, max_lists.max(1));
    let chunk = u64::from(item_count.div_ceil(list_count));

    // 在 u64 中计算边界，N 接近 u32::MAX 时 (i + 1) * chunk 会超出 u32
    let bound = |i: u32| (u64::from(i) * chunk).min(u64::from(item_count)) as u32;
    (0..list_count)
        .map(|i| SubmitRange::new(bound(i), bound(i + 1)))
        .filter(|range| !range.is_empty())
        .collect()
}
