use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::histogram::ColorSpace;

/// 特征库格式版本，格式发生不兼容变化时递增
pub const FORMAT_VERSION: u32 = 1;

/// 空间直方图的形状：`rows × cols` 个网格，每个网格 `bins` 个桶
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub rows: usize,
    pub cols: usize,
    pub bins: usize,
}

impl Shape {
    pub fn new(rows: usize, cols: usize, bins: usize) -> Self {
        Self { rows, cols, bins }
    }

    /// 向量中 f32 的数量
    pub fn len(&self) -> usize {
        self.rows * self.cols * self.bins
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        (self.rows, self.cols, self.bins)
    }

    /// 每个颜色通道的量化级数，要求 `bins` 为立方数
    pub fn levels(&self) -> Result<usize> {
        let levels = (self.bins as f64).cbrt().round() as usize;
        if levels == 0 || levels.pow(3) != self.bins {
            return Err(Error::InvalidConfig(format!("直方图桶数 {} 不是立方数", self.bins)));
        }
        Ok(levels)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.rows, self.cols, self.bins)
    }
}

/// 写入特征库的数据集头部，打开时用于校验
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHeader {
    pub version: u32,
    pub shape: Shape,
    pub color_space: ColorSpace,
}

impl StoreHeader {
    pub fn new(shape: Shape, color_space: ColorSpace) -> Self {
        Self { version: FORMAT_VERSION, shape, color_space }
    }

    /// 检查已存在的头部是否与请求的配置一致
    pub fn check(&self, requested: &StoreHeader) -> Result<()> {
        if self.version != requested.version {
            return Err(Error::StoreCorrupt(format!(
                "格式版本不一致: 文件为 {}, 程序为 {}",
                self.version, requested.version
            )));
        }
        if self.shape != requested.shape {
            return Err(Error::StoreCorrupt(format!(
                "向量形状不一致: 文件为 {}, 请求为 {}",
                self.shape, requested.shape
            )));
        }
        if self.color_space != requested.color_space {
            return Err(Error::StoreCorrupt(format!(
                "颜色空间不一致: 文件为 {:?}, 请求为 {:?}",
                self.color_space, requested.color_space
            )));
        }
        Ok(())
    }
}
