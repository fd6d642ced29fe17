mod common;

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use ash::vk;
use atom_frame_graph::{
    AttachmentReadback, FnScopeProducer, FrameGraphBuilder, FrameGraphError, ImageScopeAttachmentDescriptor,
    LoadStoreAction, ReadbackResult, ScopeAttachmentAccess, ScopeProducer, ScopeState, TransientImageDescriptor,
};
use atom_rhi::{
    commands::command_list::SubmitRange,
    device::DeviceIndex,
    resources::{
        clear::ClearValue,
        image::{ImageDescriptor, ImageView},
    },
    soft::{RecordedCommand, SoftDevice},
};
use parking_lot::Mutex;

#[test]
fn test_depth_prepass_shared_with_lighting() {
    let mut scheduler = common::scheduler(SoftDevice::default());

    let mut depth_pre_pass = FnScopeProducer::new(
        "DepthPrePass",
        Option::<ImageView>::None,
        |_, frame| {
            frame.attachment_database().create_transient_image(TransientImageDescriptor::new(
                "Depth",
                ImageDescriptor::new_2d(4, 4, vk::Format::D32_SFLOAT, vk::ImageUsageFlags::empty()),
            ))?;
            frame.use_depth_stencil_attachment(
                ImageScopeAttachmentDescriptor::new("Depth")
                    .with_load_store(LoadStoreAction::clear(ClearValue::depth_stencil(1.0, 0))),
                ScopeAttachmentAccess::Write,
            )?;
            Ok(())
        },
        |view, context| {
            *view = context.get_image_view("Depth");
            Ok(())
        },
        |_, _| Ok(()),
    );
    let mut lighting = FnScopeProducer::new(
        "Lighting",
        Option::<ImageView>::None,
        |_, frame| {
            frame.use_shader_attachment(ImageScopeAttachmentDescriptor::new("Depth"), ScopeAttachmentAccess::Read)?;
            Ok(())
        },
        |view, context| {
            *view = context.get_image_view("Depth");
            Ok(())
        },
        |_, _| Ok(()),
    );

    let mut builder = FrameGraphBuilder::new();
    builder.import_scope_producer(&mut depth_pre_pass).import_scope_producer(&mut lighting);
    scheduler.execute_frame(builder).unwrap();

    let written = depth_pre_pass.data().unwrap();
    let read = lighting.data().unwrap();
    assert_eq!(written.image, read.image);

    // D32_SFLOAT 的 1.0
    let memory = scheduler.backend().read_image(read.image, DeviceIndex::PRIMARY).unwrap();
    assert_eq!(memory, 1.0f32.to_le_bytes().repeat(16));

    let lighting_barriers = common::commands_of_scope(scheduler.backend(), "Lighting")
        .into_iter()
        .filter_map(|command| match command {
            RecordedCommand::Barrier { images, .. } => Some(images),
            _ => None,
        })
        .flatten()
        .collect::<Vec<_>>();
    assert_eq!(lighting_barriers.len(), 1);
    assert_eq!(lighting_barriers[0].aspect, vk::ImageAspectFlags::DEPTH);
    assert_eq!(lighting_barriers[0].src_state.layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
}

#[test]
fn test_seventeen_items_over_four_command_lists() {
    let mut scheduler = common::scheduler(SoftDevice::default());

    let mut producer = FnScopeProducer::new(
        "Particles",
        Mutex::new(Vec::<(u32, SubmitRange)>::new()),
        |_, frame| {
            frame.set_estimated_item_count(17);
            Ok(())
        },
        |_, _| Ok(()),
        |calls, context| {
            assert_eq!(context.command_list_count(), 4);
            calls.lock().push((context.command_list_index(), context.submit_range()));
            Ok(())
        },
    );

    let mut builder = FrameGraphBuilder::new();
    builder.import_scope_producer(&mut producer);
    let statistics = scheduler.execute_frame(builder).unwrap();
    assert_eq!(statistics.command_list_count, 4);

    let mut calls = producer.data().lock().clone();
    calls.sort_by_key(|(index, _)| *index);
    assert_eq!(
        calls,
        vec![
            (0, SubmitRange::new(0, 5)),
            (1, SubmitRange::new(5, 10)),
            (2, SubmitRange::new(10, 15)),
            (3, SubmitRange::new(15, 17)),
        ]
    );

    // 同一个 scope 的 command list 按索引顺序提交
    let submitted = common::all_commands(scheduler.backend())
        .into_iter()
        .filter_map(|command| match command {
            RecordedCommand::BeginScope { submit_range, .. } => Some(submit_range),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(submitted, calls.iter().map(|(_, range)| *range).collect::<Vec<_>>());
}

#[test]
fn test_duplicate_scope_registration_is_rejected() {
    let mut scheduler = common::scheduler(SoftDevice::default());
    let executions = Arc::new(AtomicU32::new(0));

    let forward = |executions: Arc<AtomicU32>| -> Box<dyn ScopeProducer> {
        Box::new(FnScopeProducer::new(
            "Forward",
            executions,
            |_, _| Ok(()),
            |_, _| Ok(()),
            |executions, _| {
                executions.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
        ))
    };

    scheduler.register_scope_producer(forward(executions.clone())).unwrap();
    let result = scheduler.register_scope_producer(forward(executions.clone()));
    assert!(matches!(result, Err(FrameGraphError::DuplicateScopeId(id)) if id.as_str() == "Forward"));

    scheduler.execute_frame(FrameGraphBuilder::new()).unwrap();
    assert_eq!(executions.load(Ordering::Relaxed), 1);
    assert_eq!(scheduler.scope_state("Forward"), ScopeState::Executed);
}

fn clear_scope(scope: &'static str, attachment: &'static str, color: [f32; 4]) -> impl ScopeProducer {
    FnScopeProducer::new(
        scope,
        (),
        move |_, frame| {
            frame
                .attachment_database()
                .create_transient_image(TransientImageDescriptor::new(attachment, common::color_desc(2, 2)))?;
            frame.use_color_attachment(
                ImageScopeAttachmentDescriptor::new(attachment)
                    .with_load_store(LoadStoreAction::clear(ClearValue::Vector4Float(color))),
                ScopeAttachmentAccess::Write,
            )?;
            Ok(())
        },
        |_, _| Ok(()),
        |_, _| Ok(()),
    )
}

/// 执行一帧：写入 attachment 并回读，返回回读到的数据
fn write_and_read_back(
    scheduler: &mut atom_frame_graph::FrameScheduler<SoftDevice>,
    scope: &'static str,
    attachment: &'static str,
    color: [f32; 4],
) -> (Vec<u8>, usize) {
    let mut writer = clear_scope(scope, attachment, color);
    let mut readback = AttachmentReadback::new(format!("{scope}Readback"));
    let result: Arc<Mutex<Option<ReadbackResult>>> = Arc::new(Mutex::new(None));
    let slot = result.clone();
    assert!(readback.read_attachment(attachment, Box::new(move |r| *slot.lock() = Some(r))));

    let mut builder = FrameGraphBuilder::new();
    builder.import_scope_producer(&mut writer).import_scope_producer(&mut readback);
    scheduler.execute_frame(builder).unwrap();
    assert!(readback.tick(scheduler.backend()));

    let data = result.lock().take().map(|r| r.data).unwrap_or_default();
    (data, scheduler.backend().live_image_count())
}

#[test]
fn test_transient_image_reused_across_frames() {
    let mut scheduler = common::scheduler(SoftDevice::default());

    let (foo, images_after_first) = write_and_read_back(&mut scheduler, "WriteFoo", "Foo", [1.0, 0.0, 0.0, 1.0]);
    assert_eq!(foo, [255, 0, 0, 255].repeat(4));

    let (bar, images_after_second) = write_and_read_back(&mut scheduler, "WriteBar", "Bar", [0.0, 0.0, 1.0, 1.0]);
    assert_eq!(bar, [0, 0, 255, 255].repeat(4));

    // Bar 复用 Foo 的物理 image，数据互不影响
    assert_eq!(images_after_first, 1);
    assert_eq!(images_after_second, 1);
    assert_eq!(scheduler.backend().live_buffer_count(), 0);
}

#[test]
fn test_zero_items_still_executes_once() {
    let mut scheduler = common::scheduler(SoftDevice::default());

    let mut producer = FnScopeProducer::new(
        "Empty",
        Mutex::new(Vec::<(u32, u32, SubmitRange)>::new()),
        |_, frame| {
            frame.set_estimated_item_count(0);
            Ok(())
        },
        |_, _| Ok(()),
        |calls, context| {
            calls
                .lock()
                .push((context.command_list_index(), context.command_list_count(), context.submit_range()));
            Ok(())
        },
    );

    let mut builder = FrameGraphBuilder::new();
    builder.import_scope_producer(&mut producer);
    let statistics = scheduler.execute_frame(builder).unwrap();

    assert_eq!(*producer.data().lock(), vec![(0, 1, SubmitRange::new(0, 0))]);
    assert_eq!(statistics.command_list_count, 1);
    assert_eq!(scheduler.scope_state("Empty"), ScopeState::Executed);
}
