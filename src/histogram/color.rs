use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// 计算直方图时使用的颜色空间
///
/// 离线提取和在线查询必须使用同一个颜色空间，因此它会被写入特征库的头部
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    /// CIE L*a*b*，D65 白点
    #[default]
    Lab,
    /// sRGB
    Rgb,
}

impl ColorSpace {
    /// 将一个 sRGB 像素量化到 `levels³` 个联合直方图桶中的一个
    pub fn bin(self, rgb: [u8; 3], levels: usize) -> usize {
        let [c0, c1, c2] = match self {
            Self::Lab => {
                let [l, a, b] = srgb_to_lab(rgb);
                [l / 100., (a + 128.) / 256., (b + 128.) / 256.]
            }
            Self::Rgb => rgb.map(|c| c as f32 / 256.),
        };
        let q = |v: f32| ((v * levels as f32) as usize).min(levels - 1);
        (q(c0) * levels + q(c1)) * levels + q(c2)
    }
}

/// sRGB 转换到 L*a*b*，L 的范围为 [0, 100]，a/b 大致位于 [-128, 127]
pub fn srgb_to_lab([r, g, b]: [u8; 3]) -> [f32; 3] {
    let [r, g, b] = [r, g, b].map(|c| {
        let c = c as f32 / 255.;
        if c <= 0.04045 { c / 12.92 } else { ((c + 0.055) / 1.055).powf(2.4) }
    });

    let x = (0.412453 * r + 0.357580 * g + 0.180423 * b) / 0.950456;
    let y = 0.212671 * r + 0.715160 * g + 0.072169 * b;
    let z = (0.019334 * r + 0.119193 * g + 0.950227 * b) / 1.088754;

    let f = |t: f32| if t > 0.008856 { t.cbrt() } else { 7.787 * t + 16. / 116. };

    let l = if y > 0.008856 { 116. * y.cbrt() - 16. } else { 903.3 * y };
    let a = 500. * (f(x) - f(y));
    let b = 200. * (f(y) - f(z));
    [l, a, b]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lab_extremes() {
        let [l, a, b] = srgb_to_lab([255, 255, 255]);
        assert!((l - 100.).abs() < 0.1, "L = {l}");
        assert!(a.abs() < 0.5 && b.abs() < 0.5);

        let [l, a, b] = srgb_to_lab([0, 0, 0]);
        assert!(l.abs() < 1e-3 && a.abs() < 1e-3 && b.abs() < 1e-3);

        // 纯红色的 a 分量应当明显为正
        let [_, a, _] = srgb_to_lab([255, 0, 0]);
        assert!(a > 60.);
    }

    #[test]
    fn test_bin_range() {
        for space in [ColorSpace::Lab, ColorSpace::Rgb] {
            for rgb in [[0, 0, 0], [255, 255, 255], [255, 0, 0], [0, 255, 0], [0, 0, 255]] {
                assert!(space.bin(rgb, 4) < 64);
            }
        }
        assert_eq!(ColorSpace::Rgb.bin([0, 0, 0], 4), 0);
        assert_eq!(ColorSpace::Rgb.bin([255, 255, 255], 4), 63);
        assert_ne!(ColorSpace::Lab.bin([0, 0, 0], 4), ColorSpace::Lab.bin([255, 255, 255], 4));
    }
}
