//! 描述文本的语义相似度搜索
//!
//! 文本向量由 [`TextEncoder`] 提供，相似度为余弦相似度，结果按相似度降序排列，
//! 相似度相同时按语料中的顺序排列。

use ndarray::prelude::*;
use rayon::prelude::*;

/// 文本编码器，将任意文本编码为定长向量
pub trait TextEncoder: Send + Sync {
    /// 向量维度
    fn dim(&self) -> usize;

    /// 编码一段文本，返回长度为 `dim()` 的向量
    fn encode(&self, text: &str) -> Vec<f32>;
}

/// 基于特征哈希的编码器
///
/// 单词和单词的字符三元组经过 blake3 哈希后映射到固定维度，最终做 L2 归一化。
/// 不需要任何模型文件，适合作为默认编码器。
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dim: usize,
}

impl HashingEncoder {
    pub fn new(dim: usize) -> Self {
        assert!(dim > 0, "encoder dimension must be positive");
        Self { dim }
    }

    fn add(&self, v: &mut [f32], feature: &str, weight: f32) {
        let hash = blake3::hash(feature.as_bytes());
        let h: u64 = bytemuck::pod_read_unaligned(&hash.as_bytes()[..8]);
        let sign = if h >> 63 == 0 { 1. } else { -1. };
        v[(h % self.dim as u64) as usize] += sign * weight;
    }
}

impl Default for HashingEncoder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl TextEncoder for HashingEncoder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let text = text.to_lowercase();
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            self.add(&mut v, word, 1.);
            let chars = format!("#{word}#").chars().collect::<Vec<_>>();
            for gram in chars.windows(3) {
                self.add(&mut v, &gram.iter().collect::<String>(), 0.5);
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0. {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

/// 预先计算好的描述向量，按语料顺序排列
pub struct CaptionIndex {
    embeddings: Array2<f32>,
}

impl CaptionIndex {
    /// 编码全部描述文本
    pub fn build<S: AsRef<str> + Sync>(encoder: &dyn TextEncoder, captions: &[S]) -> Self {
        let dim = encoder.dim();
        let rows = captions.par_iter().map(|c| normalized(encoder.encode(c.as_ref()))).collect::<Vec<_>>();
        let mut embeddings = Array2::zeros((rows.len(), dim));
        for (mut row, v) in embeddings.rows_mut().into_iter().zip(rows) {
            row.iter_mut().zip(v).for_each(|(dst, src)| *dst = src);
        }
        Self { embeddings }
    }

    pub fn len(&self) -> usize {
        self.embeddings.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 返回与查询最相似的 `top_n` 条描述，格式为 `(语料位置, 余弦相似度)`
    pub fn search(&self, encoder: &dyn TextEncoder, query: &str, top_n: usize) -> Vec<(usize, f32)> {
        let q = normalized(encoder.encode(query));
        if q.len() != self.embeddings.ncols() {
            return vec![];
        }
        let scores = self.embeddings.dot(&ArrayView1::from(&q[..]));
        rank_descending(scores.iter().copied(), top_n)
    }
}

/// 对语料中的每条描述即时编码并计算相似度，返回 `(条目, 相似度)`
pub fn search<'a, T, F>(
    encoder: &dyn TextEncoder,
    query: &str,
    corpus: &'a [T],
    caption_of: F,
    top_n: usize,
) -> Vec<(&'a T, f32)>
where
    T: Sync,
    F: Fn(&T) -> &str + Sync,
{
    let q = normalized(encoder.encode(query));
    let scores = corpus
        .par_iter()
        .map(|item| cosine(&q, &normalized(encoder.encode(caption_of(item)))))
        .collect::<Vec<_>>();
    rank_descending(scores, top_n).into_iter().map(|(i, s)| (&corpus[i], s)).collect()
}

/// 余弦相似度，任意一方为零向量时为 0
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot = a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0. || nb == 0. { 0. } else { dot / (na * nb) }
}

fn normalized(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0. {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

fn rank_descending(scores: impl IntoIterator<Item = f32>, top_n: usize) -> Vec<(usize, f32)> {
    let mut ranked = scores.into_iter().enumerate().collect::<Vec<_>>();
    // 稳定排序，相似度相同的保持语料顺序
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(top_n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORPUS: [&str; 5] = [
        "a man riding a horse on the beach",
        "two cats sleeping on a red sofa",
        "a car driving through the city at night",
        "a cat sleeping on a sofa",
        "a man riding a horse on the beach",
    ];

    #[test]
    fn test_encoder_normalized() {
        let encoder = HashingEncoder::new(64);
        let v = encoder.encode("Hello, world!");
        assert_eq!(v.len(), 64);
        assert!((v.iter().map(|x| x * x).sum::<f32>() - 1.).abs() < 1e-5);
        assert!(encoder.encode("  ,, ").iter().all(|&x| x == 0.));
        assert_eq!(encoder.encode("HELLO world"), encoder.encode("hello, World"));
    }

    #[test]
    fn test_search_ranking() {
        let encoder = HashingEncoder::default();
        let result = search(&encoder, "cat sleeping on a sofa", &CORPUS, |s| *s, 2);
        assert_eq!(result.len(), 2);
        assert_eq!(*result[0].0, CORPUS[3]);
        assert!((result[0].1 - 1.).abs() < 1e-5);
        assert_eq!(*result[1].0, CORPUS[1]);
    }

    #[test]
    fn test_full_corpus_is_permutation() {
        let encoder = HashingEncoder::default();
        let corpus = CORPUS.iter().copied().enumerate().collect::<Vec<_>>();
        let result = search(&encoder, "horse", &corpus, |(_, s)| *s, corpus.len());
        assert_eq!(result.len(), corpus.len());
        let mut positions = result.iter().map(|(item, _)| item.0).collect::<Vec<_>>();
        // 相同的描述按语料顺序排列
        assert_eq!(&positions[..2], &[0, 4]);
        positions.sort();
        assert_eq!(positions, vec![0, 1, 2, 3, 4]);
        assert!(result.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_caption_index_matches_search() {
        let encoder = HashingEncoder::new(128);
        let index = CaptionIndex::build(&encoder, &CORPUS);
        assert_eq!(index.len(), CORPUS.len());

        let indexed = index.search(&encoder, "city car", CORPUS.len());
        let direct = search(&encoder, "city car", &CORPUS, |s| *s, CORPUS.len());
        assert_eq!(indexed.len(), direct.len());
        assert_eq!(indexed[0].0, 2);
        assert_eq!(*direct[0].0, CORPUS[2]);
        for ((_, a), (_, b)) in indexed.iter().zip(&direct) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_cosine() {
        assert_eq!(cosine(&[1., 0.], &[0., 1.]), 0.);
        assert!((cosine(&[1., 1.], &[2., 2.]) - 1.).abs() < 1e-6);
        assert_eq!(cosine(&[0., 0.], &[1., 2.]), 0.);
    }
}
