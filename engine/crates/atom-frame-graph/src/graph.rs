//! 依赖图构建和拓扑排序
//!
//! 分析 scope 之间的 attachment 依赖关系，构建 DAG 并进行拓扑排序。

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
};

use crate::attachment::ScopeAttachmentAccess;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// 写后读
    ReadAfterWrite,
    /// 读后写
    WriteAfterRead,
    /// 写后写
    WriteAfterWrite,
    /// ExecuteAfter / ExecuteBefore
    Explicit,
    /// transient attachment 共用同一块内存
    Alias,
}

/// 依赖边：从 producer 到 consumer
#[derive(Clone, Debug)]
pub struct DependencyEdge {
    /// 先执行的 scope 索引
    pub producer: usize,
    /// 后执行的 scope 索引
    pub consumer: usize,
    pub kind: DependencyKind,
    /// 涉及的 attachment 索引
    pub attachments: Vec<usize>,
}

/// 依赖图
///
/// 节点是当前帧的 scope（按注册顺序编号），用于拓扑排序和提交等待的计算。
pub struct DependencyGraph {
    scope_count: usize,
    /// 邻接表（出边）
    adjacency: Vec<Vec<usize>>,
    /// 入度表
    in_degrees: Vec<usize>,
    edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    pub fn new(scope_count: usize) -> Self {
        Self {
            scope_count,
            adjacency: vec![Vec::new(); scope_count],
            in_degrees: vec![0; scope_count],
            edges: Vec::new(),
        }
    }

    /// 添加依赖边，自环会被忽略
    pub fn add_edge(&mut self, producer: usize, consumer: usize, kind: DependencyKind, attachments: Vec<usize>) {
        if producer == consumer {
            return;
        }

        // 避免重复边
        if !self.adjacency[producer].contains(&consumer) {
            self.adjacency[producer].push(consumer);
            self.in_degrees[consumer] += 1;
        }

        self.edges.push(DependencyEdge {
            producer,
            consumer,
            kind,
            attachments,
        });
    }

    /// 执行拓扑排序，没有依赖关系的 scope 保持注册顺序
    ///
    /// # 返回
    /// - `Ok(order)`: 拓扑排序后的 scope 索引列表
    /// - `Err(cycle)`: 检测到循环依赖，返回未能排序的 scope 索引
    pub fn topological_sort(&self) -> Result<Vec<usize>, Vec<usize>> {
        let mut in_degrees = self.in_degrees.clone();
        let mut ready: BinaryHeap<Reverse<usize>> =
            (0..self.scope_count).filter(|&i| in_degrees[i] == 0).map(Reverse).collect();
        let mut result = Vec::with_capacity(self.scope_count);

        while let Some(Reverse(node)) = ready.pop() {
            result.push(node);

            for &neighbor in &self.adjacency[node] {
                in_degrees[neighbor] -= 1;
                if in_degrees[neighbor] == 0 {
                    ready.push(Reverse(neighbor));
                }
            }
        }

        if result.len() != self.scope_count {
            let remaining: Vec<usize> = (0..self.scope_count).filter(|&i| in_degrees[i] > 0).collect();
            Err(remaining)
        } else {
            Ok(result)
        }
    }

    /// scope 的直接前驱
    pub fn predecessors(&self, scope_index: usize) -> Vec<usize> {
        self.adjacency
            .iter()
            .enumerate()
            .filter(|(_, adj)| adj.contains(&scope_index))
            .map(|(i, _)| i)
            .collect()
    }

    #[inline]
    pub fn successors(&self, scope_index: usize) -> &[usize] {
        &self.adjacency[scope_index]
    }

    #[inline]
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    #[inline]
    pub fn scope_count(&self) -> usize {
        self.scope_count
    }
}

/// 依赖分析器
pub struct DependencyAnalyzer;

impl DependencyAnalyzer {
    /// 按注册顺序分析 attachment 的读写，构建依赖图
    ///
    /// `accesses[scope]` 是该 scope 使用的 (attachment 索引, 访问方式)。
    ///
    /// 规则：
    /// - 写后读（RAW）：reader 依赖上一个 writer
    /// - 读后写（WAR）：writer 依赖上一次写入之后的所有 reader
    /// - 写后写（WAW）：后一个 writer 依赖前一个 writer
    pub fn analyze(scope_count: usize, accesses: &[Vec<(usize, ScopeAttachmentAccess)>]) -> DependencyGraph {
        let mut graph = DependencyGraph::new(scope_count);

        // 每个 attachment 的最后写入者
        let mut last_writer: HashMap<usize, usize> = HashMap::new();
        // 每个 attachment 在最后一次写入后的读取者
        let mut readers_since_write: HashMap<usize, Vec<usize>> = HashMap::new();

        for (scope_idx, scope_accesses) in accesses.iter().enumerate().take(scope_count) {
            for &(attachment, access) in scope_accesses {
                let writer = last_writer.get(&attachment).copied();

                if access.is_read() {
                    if let Some(writer) = writer {
                        graph.add_edge(writer, scope_idx, DependencyKind::ReadAfterWrite, vec![attachment]);
                    }
                }

                if access.is_write() {
                    if let Some(writer) = writer.filter(|_| !access.is_read()) {
                        graph.add_edge(writer, scope_idx, DependencyKind::WriteAfterWrite, vec![attachment]);
                    }
                    for reader in readers_since_write.remove(&attachment).unwrap_or_default() {
                        graph.add_edge(reader, scope_idx, DependencyKind::WriteAfterRead, vec![attachment]);
                    }
                    last_writer.insert(attachment, scope_idx);
                } else {
                    readers_since_write.entry(attachment).or_default().push(scope_idx);
                }
            }
        }

        graph
    }
}
