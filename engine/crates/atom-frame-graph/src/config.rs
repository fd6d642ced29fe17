use std::{fs, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::FrameGraphResult;

/// FrameScheduler 的配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSchedulerConfig {
    /// 一个 scope 最多划分的 command list 数量
    pub max_command_lists_per_scope: u32,

    /// 每个 command list 至少负责的工作项数量
    pub min_items_per_command_list: u32,

    /// 录制线程数量，0 表示使用 rayon 的默认值
    pub worker_threads: usize,

    /// 关闭后每个 transient attachment 独占一个物理资源
    pub enable_transient_aliasing: bool,

    /// 缓存的 transient 资源闲置多少帧之后释放
    pub transient_pool_max_idle_frames: u32,

    /// 每帧打印执行计划
    pub log_execution_plan: bool,
}

impl Default for FrameSchedulerConfig {
    fn default() -> Self {
        Self {
            max_command_lists_per_scope: 8,
            min_items_per_command_list: 16,
            worker_threads: 0,
            enable_transient_aliasing: true,
            transient_pool_max_idle_frames: 3,
            log_execution_plan: false,
        }
    }
}

// builder
impl FrameSchedulerConfig {
    #[inline]
    pub fn with_max_command_lists_per_scope(mut self, count: u32) -> Self {
        self.max_command_lists_per_scope = count;
        self
    }

    #[inline]
    pub fn with_min_items_per_command_list(mut self, count: u32) -> Self {
        self.min_items_per_command_list = count;
        self
    }

    #[inline]
    pub fn with_worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = count;
        self
    }

    #[inline]
    pub fn with_transient_aliasing(mut self, enable: bool) -> Self {
        self.enable_transient_aliasing = enable;
        self
    }

    #[inline]
    pub fn with_transient_pool_max_idle_frames(mut self, frames: u32) -> Self {
        self.transient_pool_max_idle_frames = frames;
        self
    }

    #[inline]
    pub fn with_log_execution_plan(mut self, enable: bool) -> Self {
        self.log_execution_plan = enable;
        self
    }
}

// 加载
impl FrameSchedulerConfig {
    /// 缺省的字段使用默认值
    pub fn from_json(json: &str) -> FrameGraphResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).with_context(|| format!("读取配置文件失败: {:?}", path.as_ref()))?;
        Self::from_json(&content).with_context(|| format!("解析配置失败: {:?}", path.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = FrameSchedulerConfig::from_json(r#"{ "max_command_lists_per_scope": 4, "log_execution_plan": true }"#)
            .unwrap();
        assert_eq!(config.max_command_lists_per_scope, 4);
        assert!(config.log_execution_plan);
        assert_eq!(config.min_items_per_command_list, 16);
        assert!(config.enable_transient_aliasing);
    }

    #[test]
    fn test_invalid_json() {
        assert!(FrameSchedulerConfig::from_json("{ \"worker_threads\": -1 }").is_err());
        assert!(FrameSchedulerConfig::from_file("does/not/exist.json").is_err());
    }

    #[test]
    fn test_builder() {
        let config = FrameSchedulerConfig::default()
            .with_max_command_lists_per_scope(4)
            .with_min_items_per_command_list(1)
            .with_transient_aliasing(false);
        let round_trip = FrameSchedulerConfig::from_json(&serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(round_trip, config);
    }
}
