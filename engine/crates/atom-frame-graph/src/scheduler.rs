//! FrameScheduler：驱动每帧的 Prepare → Compile → Execute
//!
//! 一帧的流程：
//! 1. 所有 scope 串行 Prepare，收集 attachment 声明
//! 2. 编译 FrameGraph，为 transient slot 分配物理资源；分配失败时剔除相关 scope 后重新编译
//! 3. 所有 scope 并行 Compile
//! 4. 按 (scope, command list) 并行录制，按提交组依次提交
//! 5. 持久 attachment 的状态延续到下一帧，transient 资源放回缓存

use std::collections::HashMap;

use atom_rhi::{
    RhiResult,
    commands::{
        barrier::{BufferBarrier, ImageBarrier},
        command_list::{CommandList, SubmitRange},
    },
    device::{RhiBackend, RhiDevice, SubmitId, SubmitInfo},
    resources::{
        buffer::{BufferDescriptor, BufferHandle},
        clear::ClearValue,
        image::{ImageDescriptor, ImageHandle},
    },
    state::{BufferState, ImageState},
};
use ash::vk;
use indexmap::IndexMap;
use itertools::Itertools;
use rayon::prelude::*;

use crate::{
    attachment::AttachmentLifetimeType,
    barrier::ScopeBarriers,
    builder::FrameGraphBuilder,
    compiler::{CompiledFrameGraph, FrameGraphCompiler},
    config::FrameSchedulerConfig,
    context::{FrameGraphCompileContext, FrameGraphExecuteContext, ScopeAttachmentLookup},
    database::{AttachmentDatabase, AttachmentDescriptor, AttachmentResource, AttachmentState},
    error::{FrameGraphError, FrameGraphResult},
    id::{AttachmentId, ScopeId},
    interface::FrameGraphInterface,
    lifetime::AliasingPlan,
    producer::ScopeProducer,
    scope::{Scope, ScopeAttachment, ScopeState},
    transient_pool::TransientPool,
};

/// 一帧的统计信息
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStatistics {
    pub frame_index: u64,
    /// 参与编译的 scope
    pub scope_count: usize,
    /// Prepare / Compile / Execute 失败，或因 transient 分配失败被剔除的 scope
    pub skipped_scope_count: usize,
    pub command_list_count: usize,
    pub submission_count: usize,
    pub image_barrier_count: usize,
    pub buffer_barrier_count: usize,
    pub transient_slot_count: usize,
    pub aliased_attachment_count: usize,
}

struct RegisteredScope {
    producer: Box<dyn ScopeProducer>,
    enabled: bool,
}

/// 由 scheduler 持有、每帧自动导入的 attachment
struct PersistentAttachment {
    resource: AttachmentResource,
    descriptor: AttachmentDescriptor,
    /// 上一帧结束时的状态
    state: AttachmentState,
}

/// 录制一个 command list 的任务
#[derive(Clone, Copy, Debug)]
struct RecordJob {
    group: usize,
    scope: usize,
    index: u32,
    count: u32,
    range: SubmitRange,
}

pub struct FrameScheduler<B: RhiBackend> {
    backend: B,
    config: FrameSchedulerConfig,
    thread_pool: rayon::ThreadPool,

    /// 按注册顺序排列
    producers: IndexMap<ScopeId, RegisteredScope>,
    persistent: IndexMap<AttachmentId, PersistentAttachment>,
    transient_pool: TransientPool,

    scope_states: HashMap<ScopeId, ScopeState>,
    scope_attachments: HashMap<ScopeId, Vec<ScopeAttachment>>,
    last_execution_order: Vec<ScopeId>,
    last_statistics: FrameStatistics,
    frame_index: u64,
}

// new & init
impl<B: RhiBackend> FrameScheduler<B> {
    pub fn new(backend: B, config: FrameSchedulerConfig) -> FrameGraphResult<Self> {
        tracy_client::Client::start();

        let mut pool_builder =
            rayon::ThreadPoolBuilder::new().thread_name(|index| format!("FrameGraph-Worker-{}", index));
        if config.worker_threads > 0 {
            pool_builder = pool_builder.num_threads(config.worker_threads);
        }
        let thread_pool = pool_builder.build()?;

        log::info!(
            "create frame scheduler: {} worker threads, {} device(s)",
            thread_pool.current_num_threads(),
            backend.device_count()
        );

        Ok(Self {
            backend,
            config,
            thread_pool,
            producers: IndexMap::new(),
            persistent: IndexMap::new(),
            transient_pool: TransientPool::new(),
            scope_states: HashMap::new(),
            scope_attachments: HashMap::new(),
            last_execution_order: Vec::new(),
            last_statistics: FrameStatistics::default(),
            frame_index: 0,
        })
    }
}

// getters
impl<B: RhiBackend> FrameScheduler<B> {
    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn config(&self) -> &FrameSchedulerConfig {
        &self.config
    }

    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// 当前帧（或最近一帧）中 scope 的进度，没有参与该帧的 scope 为 `Unregistered`
    pub fn scope_state(&self, id: &str) -> ScopeState {
        self.scope_states.get(id).copied().unwrap_or_default()
    }

    /// scope 最近一次 Prepare 声明的 attachment
    pub fn scope_attachments(&self, id: &str) -> Option<&[ScopeAttachment]> {
        self.scope_attachments.get(id).map(Vec::as_slice)
    }

    #[inline]
    pub fn last_execution_order(&self) -> &[ScopeId] {
        &self.last_execution_order
    }

    #[inline]
    pub fn last_statistics(&self) -> &FrameStatistics {
        &self.last_statistics
    }

    #[inline]
    pub fn is_registered(&self, id: &str) -> bool {
        self.producers.contains_key(id)
    }

    pub fn is_scope_enabled(&self, id: &str) -> bool {
        self.producers.get(id).is_some_and(|s| s.enabled)
    }

    pub fn persistent_resource(&self, id: &str) -> Option<AttachmentResource> {
        self.persistent.get(id).map(|a| a.resource)
    }

    #[inline]
    pub fn transient_pool(&self) -> &TransientPool {
        &self.transient_pool
    }
}

// scope producer 管理
impl<B: RhiBackend> FrameScheduler<B> {
    /// 注册长期存在的 scope producer，每帧都会参与调度
    pub fn register_scope_producer(&mut self, producer: Box<dyn ScopeProducer>) -> FrameGraphResult<()> {
        let id = producer.scope_id().clone();
        if self.producers.contains_key(&id) {
            log::error!("scope `{id}` is already registered");
            return Err(FrameGraphError::DuplicateScopeId(id));
        }

        log::info!("register scope producer `{id}`");
        self.producers.insert(id, RegisteredScope { producer, enabled: true });
        Ok(())
    }

    pub fn unregister_scope_producer(&mut self, id: &str) -> Option<Box<dyn ScopeProducer>> {
        let registered = self.producers.shift_remove(id)?;
        self.scope_states.remove(id);
        self.scope_attachments.remove(id);
        log::info!("unregister scope producer `{id}`");
        Some(registered.producer)
    }

    /// 禁用的 scope 不参与之后的帧，Prepare 也不会被调用
    pub fn set_scope_enabled(&mut self, id: &str, enabled: bool) -> FrameGraphResult<()> {
        let registered = self.producers.get_mut(id).ok_or_else(|| FrameGraphError::UnknownScope(ScopeId::new(id)))?;
        if registered.enabled != enabled {
            log::info!("scope `{id}` {}", if enabled { "enabled" } else { "disabled" });
        }
        registered.enabled = enabled;
        Ok(())
    }
}

// 持久 attachment
impl<B: RhiBackend> FrameScheduler<B> {
    /// 创建由 scheduler 持有的 image，每帧以 `id` 自动导入，状态跨帧延续
    pub fn create_persistent_image(
        &mut self,
        id: impl Into<AttachmentId>,
        descriptor: ImageDescriptor,
    ) -> FrameGraphResult<ImageHandle> {
        let id = id.into();
        if self.persistent.contains_key(&id) {
            return Err(FrameGraphError::DuplicateAttachment(id));
        }
        descriptor.validate().map_err(|reason| FrameGraphError::InvalidDescriptor { id: id.clone(), reason })?;

        let image = self.backend.create_image(&id, &descriptor)?;
        log::info!("create persistent image `{id}`: {}x{} {:?}", descriptor.width, descriptor.height, descriptor.format);
        self.persistent.insert(
            id,
            PersistentAttachment {
                resource: AttachmentResource::Image(image),
                descriptor: AttachmentDescriptor::Image(descriptor),
                state: AttachmentState::Image(ImageState::UNDEFINED),
            },
        );
        Ok(image)
    }

    pub fn create_persistent_buffer(
        &mut self,
        id: impl Into<AttachmentId>,
        descriptor: BufferDescriptor,
    ) -> FrameGraphResult<BufferHandle> {
        let id = id.into();
        if self.persistent.contains_key(&id) {
            return Err(FrameGraphError::DuplicateAttachment(id));
        }
        if descriptor.byte_size == 0 {
            return Err(FrameGraphError::InvalidDescriptor {
                id,
                reason: "buffer size is zero".to_string(),
            });
        }

        let buffer = self.backend.create_buffer(&id, &descriptor)?;
        log::info!("create persistent buffer `{id}`: {} bytes", descriptor.byte_size);
        self.persistent.insert(
            id,
            PersistentAttachment {
                resource: AttachmentResource::Buffer(buffer),
                descriptor: AttachmentDescriptor::Buffer(descriptor),
                state: AttachmentState::Buffer(BufferState::UNDEFINED),
            },
        );
        Ok(buffer)
    }

    pub fn destroy_persistent_attachment(&mut self, id: &str) -> bool {
        let Some(attachment) = self.persistent.shift_remove(id) else {
            return false;
        };
        destroy_resource(&self.backend, attachment.resource);
        log::info!("destroy persistent attachment `{id}`");
        true
    }
}

// 帧调度
impl<B: RhiBackend> FrameScheduler<B> {
    /// 调度一帧：已注册且启用的 producer，以及 `builder` 中只参与当前帧的 producer
    ///
    /// 单个 scope 的错误只会让该 scope 被跳过；依赖环、提交失败等整帧错误通过 `Err` 返回
    pub fn execute_frame(&mut self, builder: FrameGraphBuilder<'_>) -> FrameGraphResult<FrameStatistics> {
        let _span = tracy_client::span!("FrameScheduler::execute_frame");

        let Self {
            backend,
            config,
            thread_pool,
            producers: registered,
            persistent,
            transient_pool,
            scope_states,
            scope_attachments,
            last_execution_order,
            last_statistics,
            frame_index,
        } = self;
        let backend: &B = backend;

        *frame_index += 1;
        scope_states.clear();

        let mut producers: Vec<&mut dyn ScopeProducer> = Vec::with_capacity(registered.len() + builder.len());
        for registered_scope in registered.values_mut().filter(|s| s.enabled) {
            producers.push(registered_scope.producer.as_mut());
        }
        for producer in builder.into_producers() {
            if producers.iter().any(|p| p.scope_id() == producer.scope_id()) {
                log::error!("scope `{}` appears twice in frame {}, skipped", producer.scope_id(), frame_index);
                continue;
            }
            producers.push(producer);
        }

        let mut database = AttachmentDatabase::new();
        for (id, attachment) in persistent.iter() {
            database.import(
                id.clone(),
                AttachmentLifetimeType::Persistent,
                attachment.resource,
                attachment.descriptor,
                attachment.state,
            )?;
        }

        // ================================ Prepare
        let mut skipped_scope_count = 0;
        let mut scopes = Vec::with_capacity(producers.len());
        let mut active: Vec<&mut dyn ScopeProducer> = Vec::with_capacity(producers.len());
        {
            let _span = tracy_client::span!("FrameScheduler::prepare");
            for producer in producers {
                let mut scope = Scope::new(producer.scope_id().clone());
                let checkpoint = database.len();
                let result = producer.prepare(&mut FrameGraphInterface::new(&mut scope, &mut database, backend));

                match result {
                    Ok(()) => {
                        scope_states.insert(scope.id.clone(), ScopeState::Prepared);
                        scope_attachments.insert(scope.id.clone(), scope.attachments.clone());
                        scopes.push(scope);
                        active.push(producer);
                    }
                    Err(err) => {
                        log::error!("scope `{}` failed to prepare, skipped: {err:#}", scope.id);
                        scope_attachments.remove(&scope.id);
                        database.truncate(checkpoint);
                        skipped_scope_count += 1;
                    }
                }
            }
        }

        // ================================ FrameGraph 编译与 transient 分配
        let compiled =
            Self::compile_and_allocate(backend, config, transient_pool, &mut database, &mut scopes, &mut active)?;
        skipped_scope_count += scope_states.len() - scopes.len();

        if config.log_execution_plan {
            compiled.print_execution_plan(&scopes, &database);
        }

        // ================================ Compile
        let compile_ok: Vec<bool> = {
            let _span = tracy_client::span!("FrameScheduler::compile");
            let database = &database;
            let device: &dyn RhiDevice = backend;
            thread_pool.install(|| {
                active
                    .par_iter_mut()
                    .zip(scopes.par_iter())
                    .map(|(producer, scope)| {
                        let context = FrameGraphCompileContext::new(ScopeAttachmentLookup::new(scope, database), device);
                        match producer.compile(&context) {
                            Ok(()) => true,
                            Err(err) => {
                                log::error!("scope `{}` failed to compile, skipped: {err:#}", scope.id);
                                false
                            }
                        }
                    })
                    .collect()
            })
        };
        for (scope, _) in scopes.iter().zip(&compile_ok).filter(|(_, ok)| **ok) {
            scope_states.insert(scope.id.clone(), ScopeState::Compiled);
        }
        skipped_scope_count += compile_ok.iter().filter(|ok| !**ok).count();

        // ================================ Execute
        let submit_ids = compiled.submission_groups().iter().map(|_| backend.allocate_submit_id()).collect_vec();
        let jobs = Self::record_jobs(&compiled);
        let recorded: Vec<RhiResult<(B::CommandList, bool)>> = {
            let _span = tracy_client::span!("FrameScheduler::execute");
            let (scopes, active, database, compiled, compile_ok) = (&scopes, &active, &database, &compiled, &compile_ok);
            let submit_ids = &submit_ids;
            thread_pool.install(|| {
                jobs.par_iter()
                    .map(|job| -> RhiResult<(B::CommandList, bool)> {
                        let scope = &scopes[job.scope];
                        let name = format!("{}#{}", scope.id, job.index);
                        let mut command_list = backend.begin_command_list(scope.device, scope.queue, &name)?;
                        command_list.begin_scope(&scope.id, job.range);

                        // barrier 与 clear 由第一个 command list 负责
                        if job.index == 0 {
                            record_barriers(&mut command_list, compiled.barriers(job.scope), database);
                            record_clears(&mut command_list, scope, database);
                        }

                        let mut executed = false;
                        if compile_ok[job.scope] {
                            let mut context = FrameGraphExecuteContext::new(
                                ScopeAttachmentLookup::new(scope, database),
                                &mut command_list,
                                job.index,
                                job.count,
                                job.range,
                                submit_ids[job.group],
                            );
                            match active[job.scope].execute(&mut context) {
                                Ok(()) => executed = true,
                                Err(err) => log::error!(
                                    "scope `{}` failed to execute command list {}/{}: {err:#}",
                                    scope.id,
                                    job.index + 1,
                                    job.count
                                ),
                            }
                        }

                        command_list.end_scope();
                        Ok((command_list, executed))
                    })
                    .collect()
            })
        };

        let mut executed = compile_ok.clone();
        let mut submitted_groups = vec![false; compiled.submission_groups().len()];
        let submit_result =
            Self::submit(backend, &compiled, &jobs, recorded, &submit_ids, &mut executed, &mut submitted_groups);

        // ================================ 帧结束
        let mut submitted = vec![false; scopes.len()];
        for (group, _) in compiled.submission_groups().iter().zip(&submitted_groups).filter(|(_, ok)| **ok) {
            for &scope in &group.scopes {
                submitted[scope] = true;
            }
        }
        for (producer, &submitted) in active.iter_mut().zip(&submitted) {
            producer.frame_end(backend, submitted);
        }

        // 提交失败时 GPU 上的状态未知，保留上一帧的记录
        if submit_result.is_ok() {
            for (slot_idx, slot) in compiled.aliasing().slots.iter().enumerate() {
                let resource = slot.attachments.first().and_then(|&index| database.get_index(index)?.resource());
                if let (Some(resource), Some(state)) = (resource, compiled.slot_final_state(slot_idx)) {
                    transient_pool.set_last_state(resource, state);
                }
            }
            for &(index, state) in compiled.final_states() {
                let Some(attachment) = database.get_index(index) else {
                    continue;
                };
                if attachment.lifetime != AttachmentLifetimeType::Persistent {
                    continue;
                }
                if let Some(persistent) = persistent.get_mut(&attachment.id) {
                    persistent.state = state;
                }
            }
        }
        transient_pool.end_frame(backend, config.transient_pool_max_idle_frames);
        *last_execution_order = compiled.execution_order().iter().map(|&i| scopes[i].id.clone()).collect();

        submit_result?;

        for (scope, _) in scopes.iter().zip(&executed).filter(|(_, ok)| **ok) {
            scope_states.insert(scope.id.clone(), ScopeState::Executed);
        }
        skipped_scope_count += compile_ok.iter().zip(&executed).filter(|(compiled, executed)| **compiled && !**executed).count();

        let statistics = FrameStatistics {
            frame_index: *frame_index,
            scope_count: scopes.len(),
            skipped_scope_count,
            command_list_count: jobs.len(),
            submission_count: compiled.submission_groups().len(),
            image_barrier_count: compiled.image_barrier_count(),
            buffer_barrier_count: compiled.buffer_barrier_count(),
            transient_slot_count: compiled.aliasing().slots.len(),
            aliased_attachment_count: compiled.aliasing().aliased_attachment_count(),
        };
        log::debug!("frame {} executed: {:?}", frame_index, statistics);
        *last_statistics = statistics.clone();
        Ok(statistics)
    }

    /// 编译 FrameGraph 并分配 transient 资源
    ///
    /// 分配失败时剔除使用了失败 attachment 的 scope，然后重新编译
    fn compile_and_allocate(
        backend: &B,
        config: &FrameSchedulerConfig,
        transient_pool: &mut TransientPool,
        database: &mut AttachmentDatabase,
        scopes: &mut Vec<Scope>,
        producers: &mut Vec<&mut dyn ScopeProducer>,
    ) -> FrameGraphResult<CompiledFrameGraph> {
        loop {
            let mut compiled = FrameGraphCompiler::compile(scopes, database, config)?;
            let err = match Self::allocate_transients(backend, transient_pool, database, compiled.aliasing()) {
                Ok(slot_history) => {
                    compiled.seed_transient_history(scopes, database, &slot_history);
                    return Ok(compiled);
                }
                Err(err) => err,
            };

            transient_pool.recycle();
            database.unresolve_transients();

            let FrameGraphError::TransientAllocation { attachments: failed, .. } = &err else {
                return Err(err);
            };
            let keep = scopes
                .iter()
                .map(|scope| !scope.attachments.iter().any(|a| failed.contains(&a.attachment_id)))
                .collect_vec();
            if keep.iter().all(|k| *k) {
                return Err(err);
            }

            for (scope, _) in scopes.iter().zip(&keep).filter(|(_, keep)| !**keep) {
                log::warn!("scope `{}` skipped for this frame: {err}", scope.id);
            }
            retain_by_mask(scopes, &keep);
            retain_by_mask(producers, &keep);
        }
    }

    /// 每个 slot 取出一个物理资源，slot 中所有 attachment 解析到该资源
    ///
    /// 返回复用了旧资源的 slot 与资源在之前的帧中最后的状态
    fn allocate_transients(
        backend: &B,
        transient_pool: &mut TransientPool,
        database: &mut AttachmentDatabase,
        aliasing: &AliasingPlan,
    ) -> FrameGraphResult<HashMap<usize, AttachmentState>> {
        let mut slot_history = HashMap::new();
        for (slot_idx, slot) in aliasing.slots.iter().enumerate() {
            let ids = slot
                .attachments
                .iter()
                .filter_map(|&index| database.get_index(index).map(|a| a.id.clone()))
                .collect_vec();

            let resource = match transient_pool.acquire(backend, &ids.iter().join("+"), &slot.descriptor) {
                Ok(resource) => resource,
                Err(source) => {
                    return Err(FrameGraphError::TransientAllocation { attachments: ids, source });
                }
            };
            if let Some(state) = transient_pool.last_state(resource) {
                slot_history.insert(slot_idx, state);
            }
            for &index in &slot.attachments {
                database.resolve(index, resource);
            }
        }
        Ok(slot_history)
    }

    /// 按提交组、执行顺序、command list 顺序展开录制任务
    fn record_jobs(compiled: &CompiledFrameGraph) -> Vec<RecordJob> {
        let mut jobs = Vec::with_capacity(compiled.command_list_count());
        for (group_idx, group) in compiled.submission_groups().iter().enumerate() {
            for &scope_idx in &group.scopes {
                let partitions = compiled.partitions(scope_idx);
                for (index, &range) in partitions.iter().enumerate() {
                    jobs.push(RecordJob {
                        group: group_idx,
                        scope: scope_idx,
                        index: index as u32,
                        count: partitions.len() as u32,
                        range,
                    });
                }
            }
        }
        jobs
    }

    /// 同一个提交组的 command list 按录制任务的顺序提交
    fn submit(
        backend: &B,
        compiled: &CompiledFrameGraph,
        jobs: &[RecordJob],
        recorded: Vec<RhiResult<(B::CommandList, bool)>>,
        submit_ids: &[SubmitId],
        executed: &mut [bool],
        submitted_groups: &mut [bool],
    ) -> FrameGraphResult<()> {
        let _span = tracy_client::span!("FrameScheduler::submit");

        let groups = compiled.submission_groups();
        let mut command_lists: Vec<Vec<B::CommandList>> = groups.iter().map(|_| Vec::new()).collect();
        for (job, result) in jobs.iter().zip(recorded) {
            let (command_list, ok) = result?;
            executed[job.scope] &= ok;
            command_lists[job.group].push(command_list);
        }

        for (group_idx, ((group, lists), &id)) in groups.iter().zip(command_lists).zip(submit_ids).enumerate() {
            let info = group
                .waits
                .iter()
                .fold(SubmitInfo::new(id, group.device, group.queue), |info, &wait| info.wait(submit_ids[wait]));
            backend.submit(&info, lists)?;
            submitted_groups[group_idx] = true;
        }
        Ok(())
    }
}

impl<B: RhiBackend> Drop for FrameScheduler<B> {
    fn drop(&mut self) {
        self.transient_pool.release_all(&self.backend);
        for (_, attachment) in self.persistent.drain(..) {
            destroy_resource(&self.backend, attachment.resource);
        }
    }
}

fn record_barriers(command_list: &mut dyn CommandList, barriers: &ScopeBarriers, database: &AttachmentDatabase) {
    if !barriers.has_barriers() {
        return;
    }

    let image_barriers = barriers
        .image_barriers
        .iter()
        .filter_map(|desc| match database.get_index(desc.attachment)?.resource()? {
            AttachmentResource::Image(image) => {
                Some(ImageBarrier::new(image, desc.src_state, desc.dst_state).with_aspect(desc.aspect))
            }
            AttachmentResource::Buffer(_) => None,
        })
        .collect_vec();
    let buffer_barriers = barriers
        .buffer_barriers
        .iter()
        .filter_map(|desc| match database.get_index(desc.attachment)?.resource()? {
            AttachmentResource::Buffer(buffer) => Some(BufferBarrier::new(buffer, desc.src_state, desc.dst_state)),
            AttachmentResource::Image(_) => None,
        })
        .collect_vec();

    command_list.pipeline_barrier(&image_barriers, &buffer_barriers);
}

/// `LoadAction::Clear` 在 scope 开始时清除 attachment
///
/// 没有指定 clear value 时依次使用 optimized clear value、格式的默认值
fn record_clears(command_list: &mut dyn CommandList, scope: &Scope, database: &AttachmentDatabase) {
    for scope_attachment in scope.attachments.iter().filter(|a| a.clears()) {
        let Some(attachment) = database.find(&scope_attachment.attachment_id) else {
            continue;
        };
        let value = scope_attachment.load_store.clear_value.or(attachment.optimized_clear_value);

        let result = match attachment.resource() {
            Some(AttachmentResource::Image(image)) => {
                let value = value.unwrap_or_else(|| default_clear_value(&attachment.descriptor));
                command_list.clear_image(image, scope_attachment.image_state(scope.queue), &value)
            }
            Some(AttachmentResource::Buffer(buffer)) => command_list.clear_buffer(buffer, &value.unwrap_or_default()),
            None => continue,
        };
        if let Err(err) = result {
            log::error!("scope `{}` failed to clear `{}`: {err}", scope.id, scope_attachment.attachment_id);
        }
    }
}

fn default_clear_value(descriptor: &AttachmentDescriptor) -> ClearValue {
    match descriptor {
        AttachmentDescriptor::Image(desc) if desc.aspect().contains(vk::ImageAspectFlags::DEPTH) => {
            ClearValue::depth_stencil(1.0, 0)
        }
        _ => ClearValue::default(),
    }
}

fn destroy_resource(device: &dyn RhiDevice, resource: AttachmentResource) {
    match resource {
        AttachmentResource::Image(image) => device.destroy_image(image),
        AttachmentResource::Buffer(buffer) => device.destroy_buffer(buffer),
    }
}

fn retain_by_mask<T>(items: &mut Vec<T>, keep: &[bool]) {
    let mut index = 0;
    items.retain(|_| {
        let kept = keep[index];
        index += 1;
        kept
    });
}

#[cfg(test)]
mod tests {
    use atom_rhi::soft::SoftDevice;

    use super::*;
    use crate::producer::FnScopeProducer;

    fn empty_producer(id: &str) -> Box<dyn ScopeProducer> {
        Box::new(FnScopeProducer::new(id, (), |_, _| Ok(()), |_, _| Ok(()), |_, _| Ok(())))
    }

    #[test]
    fn test_retain_by_mask() {
        let mut items = vec![1, 2, 3, 4];
        retain_by_mask(&mut items, &[true, false, true, false]);
        assert_eq!(items, vec![1, 3]);
    }

    #[test]
    fn test_register_and_disable() {
        let mut scheduler = FrameScheduler::new(SoftDevice::default(), FrameSchedulerConfig::default()).unwrap();
        scheduler.register_scope_producer(empty_producer("A")).unwrap();
        scheduler.register_scope_producer(empty_producer("B")).unwrap();
        assert!(matches!(
            scheduler.register_scope_producer(empty_producer("A")),
            Err(FrameGraphError::DuplicateScopeId(_))
        ));

        scheduler.set_scope_enabled("A", false).unwrap();
        assert!(scheduler.set_scope_enabled("Missing", false).is_err());

        let statistics = scheduler.execute_frame(FrameGraphBuilder::new()).unwrap();
        assert_eq!(statistics.scope_count, 1);
        assert_eq!(scheduler.scope_state("A"), ScopeState::Unregistered);
        assert_eq!(scheduler.scope_state("B"), ScopeState::Executed);
        assert_eq!(scheduler.last_execution_order(), &[ScopeId::new("B")]);

        assert!(scheduler.unregister_scope_producer("B").is_some());
        assert!(!scheduler.is_registered("B"));
    }

    #[test]
    fn test_persistent_attachments() {
        let mut scheduler = FrameScheduler::new(SoftDevice::default(), FrameSchedulerConfig::default()).unwrap();
        let desc = ImageDescriptor::new_2d(4, 4, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::SAMPLED);
        let image = scheduler.create_persistent_image("History", desc).unwrap();
        assert_eq!(scheduler.persistent_resource("History"), Some(AttachmentResource::Image(image)));
        assert!(matches!(
            scheduler.create_persistent_image("History", desc),
            Err(FrameGraphError::DuplicateAttachment(_))
        ));
        assert!(scheduler.create_persistent_buffer("Empty", BufferDescriptor::new(0, vk::BufferUsageFlags::empty())).is_err());

        assert_eq!(scheduler.backend().live_image_count(), 1);
        assert!(scheduler.destroy_persistent_attachment("History"));
        assert!(!scheduler.destroy_persistent_attachment("History"));
        assert_eq!(scheduler.backend().live_image_count(), 0);
    }
}
