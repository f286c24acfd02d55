use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::Serialize;

/// 一条排序结果，`score` 为距离，越小越相似
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: u64,
    pub score: f32,
}

impl Eq for Neighbor {}

impl Ord for Neighbor {
    // 分数相同时按索引升序，保证排序结果确定
    fn cmp(&self, other: &Self) -> Ordering {
        self.score.total_cmp(&other.score).then(self.index.cmp(&other.index))
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// 保留距离最小的 k 个结果
///
/// 内部为大顶堆，堆顶为当前保留结果中最差的一个
pub struct TopKNeighbors {
    heap: BinaryHeap<Neighbor>,
    k: usize,
}

impl TopKNeighbors {
    pub fn new(k: usize) -> Self {
        Self { heap: BinaryHeap::with_capacity(k.saturating_add(1).min(4096)), k }
    }

    pub fn push(&mut self, neighbor: Neighbor) {
        if self.k == 0 {
            return;
        }
        if self.heap.len() < self.k {
            self.heap.push(neighbor);
        } else if let Some(mut worst) = self.heap.peek_mut() {
            if neighbor < *worst {
                *worst = neighbor;
            }
        }
    }

    pub fn extend(&mut self, neighbors: impl IntoIterator<Item = Neighbor>) {
        for neighbor in neighbors {
            self.push(neighbor);
        }
    }

    /// 合并另一个 TopK
    pub fn merge(&mut self, other: TopKNeighbors) {
        self.extend(other.heap.into_vec());
    }

    /// 按距离升序返回
    pub fn into_sorted_vec(self) -> Vec<Neighbor> {
        self.heap.into_sorted_vec()
    }
}
