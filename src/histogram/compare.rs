use ndarray::prelude::*;

use crate::error::{Error, Result};

/// 计算存储的直方图与查询直方图之间的距离，越小越相似
///
/// `stored` 形状为 `rows × cols × bins`，`query` 形状为 `rows × cols × bins` 或
/// `rows × cols × (bins + 1)`，后者最后一个通道为掩码，取值范围 [0, 1]。
///
/// 每个网格计算卡方距离 `0.5 * Σ (s - q)² / (s + q)`，再以掩码为权重取加权平均。
/// 掩码为 0 的网格完全不参与计算；掩码全部为 0 时返回 `InvalidMask`。
pub fn histogram_distance(stored: ArrayView3<f32>, query: ArrayView3<f32>) -> Result<f32> {
    let (rows, cols, bins) = stored.dim();
    let (qrows, qcols, qbins) = query.dim();
    if (qrows, qcols) != (rows, cols) || (qbins != bins && qbins != bins + 1) {
        return Err(Error::shape_mismatch(stored.dim(), query.dim()));
    }
    let masked = qbins == bins + 1;

    let mut total = 0f64;
    let mut weights = 0f64;
    for r in 0..rows {
        for c in 0..cols {
            let weight = if masked { query[[r, c, bins]] } else { 1. };
            if !(0. ..=1.).contains(&weight) {
                return Err(Error::InvalidMask(format!("掩码取值 {weight} 超出 [0, 1]")));
            }
            if weight == 0. {
                continue;
            }
            let s = stored.slice(s![r, c, ..]);
            let q = query.slice(s![r, c, ..bins]);
            total += weight as f64 * chi_squared(s, q);
            weights += weight as f64;
        }
    }

    if weights == 0. {
        return Err(Error::InvalidMask("掩码全部为 0".to_string()));
    }
    Ok((total / weights) as f32)
}

#[inline]
fn chi_squared(s: ArrayView1<f32>, q: ArrayView1<f32>) -> f64 {
    let mut sum = 0f64;
    for (&a, &b) in s.iter().zip(q.iter()) {
        let denom = (a + b) as f64;
        if denom > 0. {
            let diff = (a - b) as f64;
            sum += diff * diff / denom;
        }
    }
    0.5 * sum
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    fn random_histogram(rows: usize, cols: usize, bins: usize) -> Array3<f32> {
        let mut rng = rand::rng();
        let mut h = Array3::from_shape_fn((rows, cols, bins), |_| rng.random::<f32>());
        for mut cell in h.lanes_mut(Axis(2)) {
            let sum = cell.sum();
            cell /= sum;
        }
        h
    }

    fn with_mask(h: &Array3<f32>, mask: &Array2<f32>) -> Array3<f32> {
        let mask = mask.clone().insert_axis(Axis(2));
        ndarray::concatenate(Axis(2), &[h.view(), mask.view()]).unwrap()
    }

    #[test]
    fn test_identity_is_zero() {
        let h = random_histogram(4, 4, 8);
        assert_eq!(histogram_distance(h.view(), h.view()).unwrap(), 0.);

        let masked = with_mask(&h, &Array2::ones((4, 4)));
        assert_eq!(histogram_distance(h.view(), masked.view()).unwrap(), 0.);
    }

    #[test]
    fn test_distance_range() {
        let a = random_histogram(3, 3, 27);
        let b = random_histogram(3, 3, 27);
        let d = histogram_distance(a.view(), b.view()).unwrap();
        assert!(d > 0. && d <= 1.);
        // 对称
        assert!((d - histogram_distance(b.view(), a.view()).unwrap()).abs() < 1e-6);
    }

    #[test]
    fn test_masked_cells_ignored() {
        let stored = random_histogram(4, 4, 8);
        let mut q1 = random_histogram(4, 4, 8);
        let mut q2 = q1.clone();
        // 两个查询只在被遮挡的网格 (0, 1) 上不同
        q1.slice_mut(s![0, 1, ..]).fill(0.);
        q2.slice_mut(s![0, 1, ..]).fill(1.);
        q2[[0, 1, 0]] = 7.;

        let mut mask = Array2::ones((4, 4));
        mask[[0, 1]] = 0.;
        let q1 = with_mask(&q1, &mask);
        let q2 = with_mask(&q2, &mask);

        let d1 = histogram_distance(stored.view(), q1.view()).unwrap();
        let d2 = histogram_distance(stored.view(), q2.view()).unwrap();
        assert_eq!(d1, d2);
    }

    #[test]
    fn test_partial_weight() {
        let stored = Array3::<f32>::zeros((1, 2, 2));
        let mut query = Array3::<f32>::zeros((1, 2, 3));
        // 网格 0 完全不同，网格 1 完全相同
        query[[0, 0, 0]] = 1.;
        query[[0, 0, 2]] = 0.5;
        query[[0, 1, 2]] = 1.;
        let d = histogram_distance(stored.view(), query.view()).unwrap();
        assert!((d - 0.5 * 0.5 / 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_all_zero_mask() {
        let stored = random_histogram(4, 4, 8);
        let query = with_mask(&random_histogram(4, 4, 8), &Array2::zeros((4, 4)));
        assert!(matches!(
            histogram_distance(stored.view(), query.view()),
            Err(Error::InvalidMask(_))
        ));
    }

    #[test]
    fn test_mask_out_of_range() {
        let stored = random_histogram(2, 2, 8);
        let mut mask = Array2::ones((2, 2));
        mask[[1, 1]] = 2.;
        let query = with_mask(&random_histogram(2, 2, 8), &mask);
        assert!(matches!(
            histogram_distance(stored.view(), query.view()),
            Err(Error::InvalidMask(_))
        ));
    }

    #[test]
    fn test_shape_mismatch() {
        let stored = random_histogram(4, 4, 8);
        for dim in [(4, 4, 7), (4, 4, 10), (3, 4, 8)] {
            let query = Array3::<f32>::zeros(dim);
            assert!(matches!(
                histogram_distance(stored.view(), query.view()),
                Err(Error::ShapeMismatch { .. })
            ));
        }
    }
}
