#![allow(dead_code)]

use ash::vk;
use atom_frame_graph::{FrameScheduler, FrameSchedulerConfig};
use atom_rhi::{
    resources::image::ImageDescriptor,
    soft::{RecordedCommand, SoftDevice},
};

/// 每个工作项都可以单独成为一个 command list，最多 4 个
pub fn test_config() -> FrameSchedulerConfig {
    FrameSchedulerConfig::default()
        .with_min_items_per_command_list(1)
        .with_max_command_lists_per_scope(4)
        .with_worker_threads(2)
}

pub fn scheduler(device: SoftDevice) -> FrameScheduler<SoftDevice> {
    atom_crate_tools::init_log::try_init_log(log::LevelFilter::Debug);
    FrameScheduler::new(device, test_config()).unwrap()
}

pub fn color_desc(width: u32, height: u32) -> ImageDescriptor {
    ImageDescriptor::new_2d(width, height, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::empty())
}

/// 所有提交中的命令，按提交顺序展开
pub fn all_commands(device: &SoftDevice) -> Vec<RecordedCommand> {
    device.submissions().iter().flat_map(|s| s.commands().cloned().collect::<Vec<_>>()).collect()
}

/// 所有提交中开始的 scope，按提交顺序展开
pub fn scope_sequence(device: &SoftDevice) -> Vec<String> {
    all_commands(device)
        .into_iter()
        .filter_map(|command| match command {
            RecordedCommand::BeginScope { name, .. } => Some(name),
            _ => None,
        })
        .collect()
}

/// `scope` 开始之后、结束之前录制的命令
pub fn commands_of_scope(device: &SoftDevice, scope: &str) -> Vec<RecordedCommand> {
    let mut inside = false;
    let mut result = Vec::new();
    for command in all_commands(device) {
        match &command {
            RecordedCommand::BeginScope { name, .. } => inside = name == scope,
            RecordedCommand::EndScope => inside = false,
            _ if inside => result.push(command),
            _ => {}
        }
    }
    result
}
