//! 特征库：只追加的定长向量存储
//!
//! 底层为单个 LMDB 文件，`meta` 数据库保存各数据集的头部，
//! 直方图保存在 `histograms` 数据库中，键为大端序的位置编号，值为 f32 数组。
//! 位置编号即为条目的 `histogram_feature_index`，一旦分配永不复用。

mod header;
mod topk;

use std::collections::BTreeSet;
use std::ops::Range;
use std::path::Path;

use byteorder::BigEndian;
use heed::types::{Bytes, SerdeBincode, Str, U64};
use heed::{Database, Env, EnvFlags, EnvOpenOptions, MdbError, WithTls};
use log::{debug, info};
use ndarray::prelude::*;
use rayon::prelude::*;

pub use self::header::*;
pub use self::topk::*;
use crate::error::{Error, Result};
use crate::histogram::ColorSpace;

/// 直方图数据集名称
pub const HISTOGRAMS: &str = "histograms";
/// 头部数据库名称
const META: &str = "meta";
/// 此处直接映射 64GiB 虚拟地址空间，实际占用随数据增长
const MAP_SIZE: usize = 1 << 36;

pub struct FeatureStore {
    /// lmdb env
    env: Env<WithTls>,
    /// 当前数据集的头部
    header: StoreHeader,
    /// 向量数据库
    db_vectors: Database<U64<BigEndian>, Bytes>,
}

impl FeatureStore {
    /// 打开特征库，不存在时按给定形状创建
    ///
    /// 已存在的特征库如果形状、颜色空间或格式版本与请求不一致，返回 `StoreCorrupt`
    pub fn initialize(path: impl AsRef<Path>, shape: Shape, color_space: ColorSpace) -> Result<Self> {
        Self::open_with(path, |_| StoreHeader::new(shape, color_space))
    }

    /// 打开特征库，请求的布局由 `layout` 根据已有头部给出
    ///
    /// 特征库不存在时 `layout` 收到 `None`，返回的头部用于创建新的数据集
    pub fn open_with<F>(path: impl AsRef<Path>, layout: F) -> Result<Self>
    where
        F: FnOnce(Option<&StoreHeader>) -> StoreHeader,
    {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut options = EnvOpenOptions::new();
        options.map_size(MAP_SIZE).max_dbs(8);
        // 使用单文件布局，路径即为数据文件
        let env = unsafe {
            options.flags(EnvFlags::NO_SUB_DIR);
            options.open(path)
        }
        .map_err(|e| match e {
            heed::Error::Mdb(MdbError::Invalid) | heed::Error::Mdb(MdbError::VersionMismatch) => {
                Error::StoreCorrupt(format!("{} 不是有效的特征库", path.display()))
            }
            e => e.into(),
        })?;

        let mut txn = env.write_txn()?;
        let db_meta = env.create_database::<Str, SerdeBincode<StoreHeader>>(&mut txn, Some(META))?;
        let db_vectors = env.create_database::<U64<BigEndian>, Bytes>(&mut txn, Some(HISTOGRAMS))?;

        let existing = db_meta.get(&txn, HISTOGRAMS)?;
        let requested = layout(existing.as_ref());
        if requested.shape.is_empty() {
            return Err(Error::InvalidConfig(format!("向量形状不能为空: {}", requested.shape)));
        }

        match existing {
            Some(header) => header.check(&requested)?,
            None => {
                if !db_vectors.is_empty(&txn)? {
                    return Err(Error::StoreCorrupt("数据集缺少头部".to_string()));
                }
                info!(
                    "创建特征库: {}, 形状 {}, 颜色空间 {:?}",
                    path.display(),
                    requested.shape,
                    requested.color_space
                );
                db_meta.put(&mut txn, HISTOGRAMS, &requested)?;
            }
        }

        // 位置编号必须从 0 开始连续分配
        let len = db_vectors.len(&txn)?;
        if let Some((last, _)) = db_vectors.last(&txn)? {
            if last + 1 != len {
                return Err(Error::StoreCorrupt(format!(
                    "位置编号不连续: 共 {len} 条, 最大编号 {last}"
                )));
            }
        }
        txn.commit()?;

        debug!("特征库已打开: {}, 共 {} 条向量", path.display(), len);
        Ok(Self { env, header: requested, db_vectors })
    }

    pub fn header(&self) -> &StoreHeader {
        &self.header
    }

    pub fn shape(&self) -> Shape {
        self.header.shape
    }

    /// 当前向量数量
    pub fn len(&self) -> Result<u64> {
        let txn = self.env.read_txn()?;
        Ok(self.db_vectors.len(&txn)?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// 追加一条向量，返回分配的位置编号
    pub fn append(&self, vector: ArrayView3<f32>) -> Result<u64> {
        let range = self.append_batch(std::iter::once(vector))?;
        Ok(range.start)
    }

    /// 在同一个事务中追加多条向量，要么全部写入，要么全部不写入
    pub fn append_batch<'a, I>(&self, vectors: I) -> Result<Range<u64>>
    where
        I: IntoIterator<Item = ArrayView3<'a, f32>>,
    {
        let shape = self.shape();
        // 写事务之间由 lmdb 串行化，读者只能看到已提交的完整向量
        let mut txn = self.env.write_txn()?;
        let start = self.db_vectors.len(&txn)?;
        let mut index = start;
        for vector in vectors {
            if vector.dim() != shape.dim() {
                return Err(Error::shape_mismatch(shape.dim(), vector.dim()));
            }
            let data = vector.iter().copied().collect::<Vec<f32>>();
            self.db_vectors.put(&mut txn, &index, bytemuck::cast_slice(&data))?;
            index += 1;
        }
        txn.commit()?;
        Ok(start..index)
    }

    /// 读取指定位置的向量
    pub fn get(&self, index: u64) -> Result<Array3<f32>> {
        let txn = self.env.read_txn()?;
        match self.db_vectors.get(&txn, &index)? {
            Some(raw) => decode_vector(self.shape(), raw),
            None => Err(Error::IndexOutOfRange { index, len: self.db_vectors.len(&txn)? }),
        }
    }

    /// 用 `comparator(stored, query)` 对候选向量打分，返回距离最小的 k 条，按距离升序
    ///
    /// `candidates` 为 `None` 时扫描全部向量，重复的候选只计算一次
    pub fn scan_and_rank<F>(
        &self,
        query: ArrayView3<f32>,
        comparator: F,
        k: usize,
        candidates: Option<&[u64]>,
    ) -> Result<Vec<Neighbor>>
    where
        F: Fn(ArrayView3<f32>, ArrayView3<f32>) -> Result<f32> + Sync,
    {
        let txn = self.env.read_txn()?;
        let total = self.db_vectors.len(&txn)?;
        if total == 0 && k > 0 {
            return Err(Error::EmptyStore);
        }
        if k == 0 {
            return Ok(vec![]);
        }

        let rows: Vec<(u64, &[u8])> = match candidates {
            Some(candidates) => candidates
                .iter()
                .copied()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .map(|index| match self.db_vectors.get(&txn, &index)? {
                    Some(raw) => Ok((index, raw)),
                    None => Err(Error::IndexOutOfRange { index, len: total }),
                })
                .collect::<Result<_>>()?,
            None => self.db_vectors.iter(&txn)?.map(|item| item.map_err(Error::from)).collect::<Result<_>>()?,
        };

        let shape = self.shape();
        let top = rows
            .par_iter()
            .map(|&(index, raw)| -> Result<Neighbor> {
                let stored = decode_vector(shape, raw)?;
                let score = comparator(stored.view(), query)?;
                Ok(Neighbor { index, score })
            })
            .try_fold(
                || TopKNeighbors::new(k),
                |mut top, neighbor| -> Result<TopKNeighbors> {
                    top.push(neighbor?);
                    Ok(top)
                },
            )
            .try_reduce(
                || TopKNeighbors::new(k),
                |mut a, b| {
                    a.merge(b);
                    Ok(a)
                },
            )?;

        Ok(top.into_sorted_vec())
    }

    /// 导出全部向量到一个 `(n, rows, cols, bins)` 数组
    pub fn export(&self) -> Result<Array4<f32>> {
        let shape = self.shape();
        let txn = self.env.read_txn()?;
        let n = self.db_vectors.len(&txn)? as usize;
        let mut data = Vec::with_capacity(n * shape.len());
        for item in self.db_vectors.iter(&txn)? {
            let (_, raw) = item?;
            data.extend(decode_vector(shape, raw)?);
        }
        Array4::from_shape_vec((n, shape.rows, shape.cols, shape.bins), data)
            .map_err(|e| Error::StoreCorrupt(e.to_string()))
    }
}

/// lmdb 不保证读取到的数据是对齐的，这里总是复制一份
fn decode_vector(shape: Shape, raw: &[u8]) -> Result<Array3<f32>> {
    if raw.len() != shape.len() * size_of::<f32>() {
        return Err(Error::StoreCorrupt(format!(
            "向量长度错误: 期望 {} 字节, 实际 {} 字节",
            shape.len() * size_of::<f32>(),
            raw.len()
        )));
    }
    let data: Vec<f32> = bytemuck::pod_collect_to_vec(raw);
    Array3::from_shape_vec(shape.dim(), data).map_err(|e| Error::StoreCorrupt(e.to_string()))
}
