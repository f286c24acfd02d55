use std::sync::LazyLock;

use prometheus::*;

static METRIC_QUERY_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("fs_query_count", "count of the queries", &["kind"]).unwrap()
});

static METRIC_QUERY_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!("fs_query_duration", "duration of the query in seconds", &["kind"])
        .unwrap()
});

static METRIC_QUERY_RESULTS: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "fs_query_results",
        "number of results returned by the query",
        &["kind"],
        vec![0., 1., 10., 50., 100., 500., 1000., 2000.]
    )
    .unwrap()
});

/// 查询类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Text,
    Embedding,
    Image,
    Similar,
}

impl QueryKind {
    fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Embedding => "embedding",
            Self::Image => "image",
            Self::Similar => "similar",
        }
    }
}

/// 记录一次查询的耗时和结果数量
pub fn observe_query(kind: QueryKind, duration: f32, results: usize) {
    let label = kind.label();
    METRIC_QUERY_COUNT.with_label_values(&[label]).inc();
    METRIC_QUERY_DURATION.with_label_values(&[label]).observe(duration as f64);
    METRIC_QUERY_RESULTS.with_label_values(&[label]).observe(results as f64);
}
