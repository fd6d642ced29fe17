//! FrameGraph 编译
//!
//! 输入所有 scope 在 Prepare 中的声明，输出：
//! - 线性执行顺序（依赖关系 + 显式顺序，无关的 scope 保持注册顺序）
//! - transient attachment 的别名方案
//! - 每个 scope 执行前的 barrier
//! - 每个 scope 的 command list 划分
//! - 按 (设备, 队列) 划分的提交组以及组之间的等待
//!
//! 编译不分配任何资源，分配失败时可以剔除 scope 后重新编译。

use std::collections::HashMap;

use ash::vk;
use atom_rhi::{
    commands::command_list::SubmitRange,
    device::{DeviceIndex, HardwareQueueClass},
};
use itertools::Itertools;

use crate::{
    barrier::{BarrierCalculator, ScopeBarriers},
    config::FrameSchedulerConfig,
    database::{AttachmentDatabase, AttachmentDescriptor, AttachmentState},
    error::{FrameGraphError, FrameGraphResult},
    graph::{DependencyAnalyzer, DependencyGraph, DependencyKind},
    lifetime::{AliasingPlan, compute_lifetimes, plan_aliasing},
    partition::partition_items,
    scope::{Scope, ScopeAttachmentView},
};

/// 一次队列提交：线性顺序中连续的、位于同一 (设备, 队列) 的 scope
#[derive(Clone, Debug)]
pub struct SubmissionGroup {
    pub device: DeviceIndex,
    pub queue: HardwareQueueClass,
    /// 按执行顺序排列的 scope 索引
    pub scopes: Vec<usize>,
    /// 需要等待的其他提交组（其他队列或其他设备）
    pub waits: Vec<usize>,
}

/// 编译后的 FrameGraph，只在当前帧有效
pub struct CompiledFrameGraph {
    /// 执行顺序（scope 索引）
    execution_order: Vec<usize>,
    dep_graph: DependencyGraph,
    /// 每个 scope 的 barriers（按 scope 索引）
    barriers: Vec<ScopeBarriers>,
    /// 每个 scope 的 command list 划分（按 scope 索引）
    partitions: Vec<Vec<SubmitRange>>,
    groups: Vec<SubmissionGroup>,
    aliasing: AliasingPlan,
    /// 非 transient attachment 在本帧结束时的状态
    final_states: Vec<(usize, AttachmentState)>,
    /// 每个 transient slot 的物理资源在本帧结束时的状态
    slot_final_states: Vec<Option<AttachmentState>>,
}

pub struct FrameGraphCompiler;

impl FrameGraphCompiler {
    /// 编译当前帧
    ///
    /// transient attachment 的描述会补上 scope 用法需要的 usage flags
    pub fn compile(
        scopes: &[Scope],
        database: &mut AttachmentDatabase,
        config: &FrameSchedulerConfig,
    ) -> FrameGraphResult<CompiledFrameGraph> {
        let _span = tracy_client::span!("FrameGraphCompiler::compile");

        let scope_count = scopes.len();

        // 收集每个 scope 使用的 attachment 索引
        let accesses = scopes
            .iter()
            .map(|scope| {
                scope
                    .attachments
                    .iter()
                    .filter_map(|a| database.index_of(&a.attachment_id).map(|index| (index, a.effective_access())))
                    .collect_vec()
            })
            .collect_vec();

        // 依赖分析
        let mut dep_graph = DependencyAnalyzer::analyze(scope_count, &accesses);
        Self::add_explicit_edges(scopes, &mut dep_graph);

        // 拓扑排序
        let execution_order = dep_graph.topological_sort().map_err(|cycle| {
            FrameGraphError::DependencyCycle(cycle.iter().map(|&i| scopes[i].id.clone()).collect())
        })?;

        Self::apply_required_usage(scopes, database);

        // transient 别名
        let uses = accesses.iter().map(|a| a.iter().map(|&(index, _)| index).collect_vec()).collect_vec();
        let lifetimes = compute_lifetimes(&execution_order, &uses, |index| {
            database.get_index(index).is_some_and(|a| a.is_transient())
        });
        let aliasing = plan_aliasing(
            lifetimes,
            |index| database.get_index(index).map(|a| a.descriptor),
            config.enable_transient_aliasing,
        );

        // 共用内存的 attachment：后一个的所有使用者依赖前一个的所有使用者
        for (prev, next) in aliasing.alias_pairs().collect_vec() {
            let prev_users = (0..scope_count).filter(|&s| uses[s].contains(&prev)).collect_vec();
            let next_users = (0..scope_count).filter(|&s| uses[s].contains(&next)).collect_vec();
            for (&producer, &consumer) in prev_users.iter().cartesian_product(&next_users) {
                dep_graph.add_edge(producer, consumer, DependencyKind::Alias, vec![prev, next]);
            }
        }

        let (barriers, final_states, slot_final_states) =
            Self::compute_barriers(scopes, database, &execution_order, &aliasing, &HashMap::new());

        let partitions = scopes
            .iter()
            .map(|scope| {
                partition_items(
                    scope.estimated_item_count,
                    config.max_command_lists_per_scope,
                    config.min_items_per_command_list,
                )
            })
            .collect_vec();

        let groups = Self::build_submission_groups(scopes, &execution_order, &dep_graph);

        Ok(CompiledFrameGraph {
            execution_order,
            dep_graph,
            barriers,
            partitions,
            groups,
            aliasing,
            final_states,
            slot_final_states,
        })
    }

    /// ExecuteAfter / ExecuteBefore，未知的 scope 只打印警告
    fn add_explicit_edges(scopes: &[Scope], dep_graph: &mut DependencyGraph) {
        let index_of: HashMap<&str, usize> = scopes.iter().enumerate().map(|(i, s)| (s.id.as_str(), i)).collect();

        for (scope_idx, scope) in scopes.iter().enumerate() {
            for other in &scope.execute_after {
                match index_of.get(other.as_str()) {
                    Some(&producer) => dep_graph.add_edge(producer, scope_idx, DependencyKind::Explicit, vec![]),
                    None => log::warn!("scope `{}` executes after unknown scope `{other}`, ignored", scope.id),
                }
            }
            for other in &scope.execute_before {
                match index_of.get(other.as_str()) {
                    Some(&consumer) => dep_graph.add_edge(scope_idx, consumer, DependencyKind::Explicit, vec![]),
                    None => log::warn!("scope `{}` executes before unknown scope `{other}`, ignored", scope.id),
                }
            }
        }
    }

    /// transient attachment 需要支持所有 scope 的用法
    fn apply_required_usage(scopes: &[Scope], database: &mut AttachmentDatabase) {
        for scope in scopes {
            for attachment in &scope.attachments {
                let Some(index) = database.index_of(&attachment.attachment_id) else {
                    continue;
                };
                if !database.get_index(index).is_some_and(|a| a.is_transient()) {
                    continue;
                }
                let access = attachment.effective_access();
                match database.descriptor_mut(index) {
                    Some(AttachmentDescriptor::Image(desc)) => {
                        desc.usage |= attachment.usage.required_image_usage(access);
                        if attachment.clears() {
                            desc.usage |= vk::ImageUsageFlags::TRANSFER_DST;
                        }
                    }
                    Some(AttachmentDescriptor::Buffer(desc)) => {
                        desc.usage |= attachment.usage.required_buffer_usage(access);
                        if attachment.clears() {
                            desc.usage |= vk::BufferUsageFlags::TRANSFER_DST;
                        }
                    }
                    None => {}
                }
            }
        }
    }

    /// 计算每个 scope 需要的 barriers
    ///
    /// 模拟 scope 的执行顺序，跟踪 attachment 的状态变化
    ///
    /// `slot_history`：slot 复用的物理资源在上一帧结束时的状态
    fn compute_barriers(
        scopes: &[Scope],
        database: &AttachmentDatabase,
        execution_order: &[usize],
        aliasing: &AliasingPlan,
        slot_history: &HashMap<usize, AttachmentState>,
    ) -> (Vec<ScopeBarriers>, Vec<(usize, AttachmentState)>, Vec<Option<AttachmentState>>) {
        let alias_prev: HashMap<usize, usize> = aliasing.alias_pairs().map(|(prev, next)| (next, prev)).collect();
        let mut calculator = BarrierCalculator::new();
        for (index, attachment) in database.iter().enumerate() {
            if !attachment.is_transient() {
                calculator.set_initial_state(index, attachment.initial_state);
            } else if !alias_prev.contains_key(&index) {
                if let Some(&previous) = aliasing.slot_of(index).and_then(|slot| slot_history.get(&slot)) {
                    calculator.set_discarded_state(index, previous);
                }
            }
        }

        let mut barriers = vec![ScopeBarriers::new(); scopes.len()];
        for &scope_idx in execution_order {
            let scope = &scopes[scope_idx];
            let scope_barriers = &mut barriers[scope_idx];

            for scope_attachment in &scope.attachments {
                let Some(index) = database.index_of(&scope_attachment.attachment_id) else {
                    continue;
                };
                let Some(attachment) = database.get_index(index) else {
                    continue;
                };

                if !calculator.is_tracked(index) {
                    if let Some(&prev) = alias_prev.get(&index) {
                        calculator.inherit_alias(prev, index);
                    }
                }

                match (&attachment.descriptor, scope_attachment.view) {
                    (AttachmentDescriptor::Image(desc), ScopeAttachmentView::Image(_)) => {
                        if let Some(barrier) = calculator.require_image(index, scope_attachment.image_state(scope.queue)) {
                            scope_barriers.image_barriers.push(barrier.with_aspect(desc.aspect()));
                        }
                    }
                    (AttachmentDescriptor::Buffer(_), ScopeAttachmentView::Buffer(_)) => {
                        if let Some(barrier) = calculator.require_buffer(index, scope_attachment.buffer_state(scope.queue))
                        {
                            scope_barriers.buffer_barriers.push(barrier);
                        }
                    }
                    _ => log::warn!(
                        "scope `{}` uses attachment `{}` with a mismatched view",
                        scope.id,
                        scope_attachment.attachment_id
                    ),
                }
            }
        }

        let final_states = database
            .iter()
            .enumerate()
            .filter(|(_, attachment)| !attachment.is_transient())
            .filter_map(|(index, _)| calculator.final_state(index).map(|state| (index, state)))
            .collect_vec();
        let slot_final_states = aliasing
            .slots
            .iter()
            .map(|slot| slot.attachments.iter().rev().find_map(|&index| calculator.final_state(index)))
            .collect_vec();

        (barriers, final_states, slot_final_states)
    }

    /// 线性顺序中连续的、位于同一 (设备, 队列) 的 scope 合并为一次提交
    ///
    /// 依赖来自其他 (设备, 队列) 时，提交需要等待对应的组
    fn build_submission_groups(
        scopes: &[Scope],
        execution_order: &[usize],
        dep_graph: &DependencyGraph,
    ) -> Vec<SubmissionGroup> {
        let mut groups: Vec<SubmissionGroup> = Vec::new();
        let mut group_of = vec![usize::MAX; scopes.len()];

        for &scope_idx in execution_order {
            let scope = &scopes[scope_idx];
            let key = (scope.device, scope.queue);
            if groups.last().is_none_or(|g| (g.device, g.queue) != key) {
                groups.push(SubmissionGroup {
                    device: scope.device,
                    queue: scope.queue,
                    scopes: Vec::new(),
                    waits: Vec::new(),
                });
            }
            let group_idx = groups.len() - 1;
            group_of[scope_idx] = group_idx;

            for pred in dep_graph.predecessors(scope_idx) {
                let pred_group = group_of[pred];
                if pred_group == group_idx || pred_group == usize::MAX {
                    continue;
                }
                let same_queue = (groups[pred_group].device, groups[pred_group].queue) == key;
                if !same_queue && !groups[group_idx].waits.contains(&pred_group) {
                    groups[group_idx].waits.push(pred_group);
                }
            }
            groups[group_idx].scopes.push(scope_idx);
        }

        groups
    }
}

// getters
impl CompiledFrameGraph {
    #[inline]
    pub fn execution_order(&self) -> &[usize] {
        &self.execution_order
    }

    #[inline]
    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.dep_graph
    }

    #[inline]
    pub fn barriers(&self, scope_idx: usize) -> &ScopeBarriers {
        &self.barriers[scope_idx]
    }

    #[inline]
    pub fn partitions(&self, scope_idx: usize) -> &[SubmitRange] {
        &self.partitions[scope_idx]
    }

    #[inline]
    pub fn submission_groups(&self) -> &[SubmissionGroup] {
        &self.groups
    }

    #[inline]
    pub fn aliasing(&self) -> &AliasingPlan {
        &self.aliasing
    }

    #[inline]
    pub fn final_states(&self) -> &[(usize, AttachmentState)] {
        &self.final_states
    }

    #[inline]
    pub fn slot_final_state(&self, slot: usize) -> Option<AttachmentState> {
        self.slot_final_states.get(slot).copied().flatten()
    }

    pub fn command_list_count(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    pub fn image_barrier_count(&self) -> usize {
        self.barriers.iter().map(ScopeBarriers::image_barrier_count).sum()
    }

    pub fn buffer_barrier_count(&self) -> usize {
        self.barriers.iter().map(ScopeBarriers::buffer_barrier_count).sum()
    }
}

impl CompiledFrameGraph {
    /// transient slot 分配到了上一帧用过的物理资源时，从上一帧结束时的状态重新计算 barriers
    pub fn seed_transient_history(
        &mut self,
        scopes: &[Scope],
        database: &AttachmentDatabase,
        slot_history: &HashMap<usize, AttachmentState>,
    ) {
        if slot_history.is_empty() {
            return;
        }
        let (barriers, final_states, slot_final_states) =
            FrameGraphCompiler::compute_barriers(scopes, database, &self.execution_order, &self.aliasing, slot_history);
        self.barriers = barriers;
        self.final_states = final_states;
        self.slot_final_states = slot_final_states;
    }

    /// 打印执行计划（用于调试）
    ///
    /// 输出每个 scope 的执行顺序、attachment 使用方式、barrier、command list 划分，
    /// 以及 transient 别名和提交组
    pub fn print_execution_plan(&self, scopes: &[Scope], database: &AttachmentDatabase) {
        let attachment_name = |index: usize| database.get_index(index).map(|a| a.id.as_str()).unwrap_or("<unknown>");

        log::info!("╔══════════════════════════════════════════════════════════════════╗");
        log::info!("║              FrameGraph Execution Plan                           ║");
        log::info!("╠══════════════════════════════════════════════════════════════════╣");
        log::info!(
            "║ Total Scopes: {}  |  Execution Order: [{}]",
            scopes.len(),
            self.execution_order.iter().map(|&i| scopes[i].id.as_str()).join(" → ")
        );
        log::info!("╚══════════════════════════════════════════════════════════════════╝");

        for (order, &scope_idx) in self.execution_order.iter().enumerate() {
            let scope = &scopes[scope_idx];
            let barriers = &self.barriers[scope_idx];

            log::info!("");
            log::info!("┌─────────────────────────────────────────────────────────────────┐");
            log::info!(
                "│ [{}/{}] Scope: \"{}\" ({}, {})",
                order + 1,
                self.execution_order.len(),
                scope.id,
                scope.device,
                scope.queue
            );
            log::info!("├─────────────────────────────────────────────────────────────────┤");

            for attachment in &scope.attachments {
                let icon = if attachment.effective_access().is_write() { "✏️ " } else { "📖" };
                log::info!(
                    "│   {} \"{}\" {:?} {:?} (load: {:?}, store: {:?})",
                    icon,
                    attachment.attachment_id,
                    attachment.usage,
                    attachment.effective_access(),
                    attachment.load_store.load_action,
                    attachment.load_store.store_action
                );
            }

            log::info!(
                "│ Command Lists: {}",
                self.partitions[scope_idx].iter().map(|r| format!("[{}, {})", r.start, r.end)).join(" ")
            );

            // 打印 Barrier 详细信息
            if barriers.has_barriers() {
                log::info!("├─────────────────────────────────────────────────────────────────┤");
                log::info!(
                    "│ Barriers: {} image, {} buffer",
                    barriers.image_barrier_count(),
                    barriers.buffer_barrier_count()
                );

                for barrier in &barriers.image_barriers {
                    let layout_change = if barrier.src_state.layout != barrier.dst_state.layout {
                        format!("{:?} → {:?}", barrier.src_state.layout, barrier.dst_state.layout)
                    } else {
                        format!("{:?} (no layout change)", barrier.src_state.layout)
                    };
                    log::info!("│   🔒 Image \"{}\":", attachment_name(barrier.attachment));
                    log::info!("│       Layout: {}", layout_change);
                    log::info!(
                        "│       Stage:  {} → {}",
                        Self::format_pipeline_stage(barrier.src_state.stage),
                        Self::format_pipeline_stage(barrier.dst_state.stage)
                    );
                    log::info!(
                        "│       Access: {} → {}",
                        Self::format_access_flags(barrier.src_state.access),
                        Self::format_access_flags(barrier.dst_state.access)
                    );
                    log::info!("│       Aspect: {:?}", barrier.aspect);
                }

                for barrier in &barriers.buffer_barriers {
                    log::info!("│   🔒 Buffer \"{}\":", attachment_name(barrier.attachment));
                    log::info!(
                        "│       Stage:  {} → {}",
                        Self::format_pipeline_stage(barrier.src_state.stage),
                        Self::format_pipeline_stage(barrier.dst_state.stage)
                    );
                    log::info!(
                        "│       Access: {} → {}",
                        Self::format_access_flags(barrier.src_state.access),
                        Self::format_access_flags(barrier.dst_state.access)
                    );
                }
            } else {
                log::info!("│ No barriers required");
            }

            log::info!("└─────────────────────────────────────────────────────────────────┘");
        }

        log::info!("");
        for (slot_idx, slot) in self.aliasing.slots.iter().enumerate() {
            log::info!(
                "Transient slot {}: [{}]",
                slot_idx,
                slot.attachments.iter().map(|&a| attachment_name(a)).join(", ")
            );
        }
        for (group_idx, group) in self.groups.iter().enumerate() {
            log::info!(
                "Submit {}: {} {} [{}] waits [{}]",
                group_idx,
                group.device,
                group.queue,
                group.scopes.iter().map(|&s| scopes[s].id.as_str()).join(", "),
                group.waits.iter().join(", ")
            );
        }
        log::info!("═══════════════════════ End of Execution Plan ═══════════════════════");
    }

    /// 格式化 PipelineStageFlags2 为可读字符串
    fn format_pipeline_stage(stage: vk::PipelineStageFlags2) -> String {
        const NAMES: &[(vk::PipelineStageFlags2, &str)] = &[
            (vk::PipelineStageFlags2::TOP_OF_PIPE, "TOP_OF_PIPE"),
            (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, "BOTTOM_OF_PIPE"),
            (vk::PipelineStageFlags2::DRAW_INDIRECT, "DRAW_INDIRECT"),
            (vk::PipelineStageFlags2::VERTEX_INPUT, "VERTEX_INPUT"),
            (vk::PipelineStageFlags2::INDEX_INPUT, "INDEX_INPUT"),
            (vk::PipelineStageFlags2::VERTEX_SHADER, "VERTEX_SHADER"),
            (vk::PipelineStageFlags2::FRAGMENT_SHADER, "FRAGMENT_SHADER"),
            (vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, "COLOR_ATTACHMENT_OUTPUT"),
            (vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, "EARLY_FRAGMENT_TESTS"),
            (vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS, "LATE_FRAGMENT_TESTS"),
            (vk::PipelineStageFlags2::COMPUTE_SHADER, "COMPUTE_SHADER"),
            (vk::PipelineStageFlags2::TRANSFER, "TRANSFER"),
            (vk::PipelineStageFlags2::HOST, "HOST"),
            (vk::PipelineStageFlags2::ALL_COMMANDS, "ALL_COMMANDS"),
        ];

        let stages = NAMES.iter().filter(|(flag, _)| stage.contains(*flag)).map(|(_, name)| *name).collect_vec();
        if stages.is_empty() { format!("{:?}", stage) } else { stages.join(" | ") }
    }

    /// 格式化 AccessFlags2 为可读字符串
    fn format_access_flags(access: vk::AccessFlags2) -> String {
        const NAMES: &[(vk::AccessFlags2, &str)] = &[
            (vk::AccessFlags2::INDIRECT_COMMAND_READ, "INDIRECT_CMD_READ"),
            (vk::AccessFlags2::INDEX_READ, "INDEX_READ"),
            (vk::AccessFlags2::VERTEX_ATTRIBUTE_READ, "VERTEX_ATTR_READ"),
            (vk::AccessFlags2::UNIFORM_READ, "UNIFORM_READ"),
            (vk::AccessFlags2::SHADER_SAMPLED_READ, "SHADER_SAMPLED_READ"),
            (vk::AccessFlags2::SHADER_STORAGE_READ, "STORAGE_READ"),
            (vk::AccessFlags2::SHADER_STORAGE_WRITE, "STORAGE_WRITE"),
            (vk::AccessFlags2::COLOR_ATTACHMENT_READ, "COLOR_ATTACH_READ"),
            (vk::AccessFlags2::COLOR_ATTACHMENT_WRITE, "COLOR_ATTACH_WRITE"),
            (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ, "DEPTH_ATTACH_READ"),
            (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE, "DEPTH_ATTACH_WRITE"),
            (vk::AccessFlags2::TRANSFER_READ, "TRANSFER_READ"),
            (vk::AccessFlags2::TRANSFER_WRITE, "TRANSFER_WRITE"),
            (vk::AccessFlags2::HOST_READ, "HOST_READ"),
            (vk::AccessFlags2::MEMORY_READ, "MEMORY_READ"),
            (vk::AccessFlags2::MEMORY_WRITE, "MEMORY_WRITE"),
        ];

        if access == vk::AccessFlags2::NONE {
            return "NONE".to_string();
        }
        let flags = NAMES.iter().filter(|(flag, _)| access.contains(*flag)).map(|(_, name)| *name).collect_vec();
        if flags.is_empty() { format!("{:?}", access) } else { flags.join(" | ") }
    }
}
