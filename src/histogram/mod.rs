//! 空间颜色直方图
//!
//! 图片被划分为 `rows × cols` 个网格，每个网格内统计一个联合颜色直方图，
//! 直方图按网格内参与统计的像素数归一化。

mod color;
mod compare;

use std::path::Path;

use image::RgbaImage;
use ndarray::prelude::*;

pub use self::color::*;
pub use self::compare::*;
use crate::error::{Error, Result};
use crate::store::Shape;

/// 直方图提取器，形状和颜色空间必须与特征库一致
#[derive(Debug, Clone, Copy)]
pub struct HistogramExtractor {
    shape: Shape,
    color_space: ColorSpace,
    levels: usize,
}

impl HistogramExtractor {
    pub fn new(shape: Shape, color_space: ColorSpace) -> Result<Self> {
        let levels = shape.levels()?;
        if shape.rows == 0 || shape.cols == 0 {
            return Err(Error::InvalidConfig(format!("网格不能为空: {shape}")));
        }
        Ok(Self { shape, color_space, levels })
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// 计算一张完整帧的直方图，所有像素都参与统计
    pub fn extract(&self, image: &RgbaImage) -> Array3<f32> {
        self.compute(image, |_| true).0
    }

    /// 计算查询图片的直方图，并追加掩码通道
    ///
    /// 背景像素（透明或纯黑）不参与统计，每个网格的掩码值为有效像素所占比例
    pub fn extract_masked(&self, image: &RgbaImage) -> Result<Array3<f32>> {
        let (hist, mask) = self.compute(image, |px| !is_background(px));
        append_mask(hist.view(), mask.view())
    }

    fn compute<F>(&self, image: &RgbaImage, is_valid: F) -> (Array3<f32>, Array2<f32>)
    where
        F: Fn(&image::Rgba<u8>) -> bool,
    {
        let Shape { rows, cols, bins } = self.shape;
        let (width, height) = image.dimensions();

        let mut hist = Array3::<f32>::zeros((rows, cols, bins));
        let mut valid = Array2::<f32>::zeros((rows, cols));
        let mut total = Array2::<f32>::zeros((rows, cols));

        for (x, y, px) in image.enumerate_pixels() {
            let r = y as usize * rows / height as usize;
            let c = x as usize * cols / width as usize;
            total[[r, c]] += 1.;
            if !is_valid(px) {
                continue;
            }
            let [red, green, blue, _] = px.0;
            hist[[r, c, self.color_space.bin([red, green, blue], self.levels)]] += 1.;
            valid[[r, c]] += 1.;
        }

        for ((mut cell, &n), t) in hist.lanes_mut(Axis(2)).into_iter().zip(valid.iter()).zip(total.iter_mut())
        {
            if n > 0. {
                cell /= n;
            }
            *t = if *t > 0. { n / *t } else { 0. };
        }
        (hist, total)
    }
}

/// 在直方图最后追加一个掩码通道，两者的网格必须一致
pub fn append_mask<'a>(hist: ArrayView3<'a, f32>, mask: ArrayView2<'a, f32>) -> Result<Array3<f32>> {
    let mask = mask.insert_axis(Axis(2));
    ndarray::concatenate(Axis(2), &[hist, mask]).map_err(|e| {
        Error::InvalidConfig(format!("掩码网格 {:?} 与直方图 {:?} 不一致: {}", mask.dim(), hist.dim(), e))
    })
}

/// 背景像素：完全透明，或者 RGB 全为 0
pub fn is_background(px: &image::Rgba<u8>) -> bool {
    let [r, g, b, a] = px.0;
    a == 0 || (r == 0 && g == 0 && b == 0)
}

/// 从内存中解码图片
pub fn decode_image(data: &[u8]) -> Result<RgbaImage> {
    let image = image::load_from_memory(data).map_err(|e| Error::Decode(e.to_string()))?;
    check_size(image.to_rgba8())
}

/// 从文件读取图片
pub fn read_image(path: impl AsRef<Path>) -> Result<RgbaImage> {
    let path = path.as_ref();
    let image = image::open(path).map_err(|e| Error::Decode(format!("{}: {}", path.display(), e)))?;
    check_size(image.to_rgba8())
}

fn check_size(image: RgbaImage) -> Result<RgbaImage> {
    if image.width() == 0 || image.height() == 0 {
        return Err(Error::Decode("图片尺寸为 0".to_string()));
    }
    Ok(image)
}
