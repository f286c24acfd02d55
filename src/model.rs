use serde::{Deserialize, Serialize};

/// 一帧视频截图及其元数据
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Entry {
    /// 条目 ID
    pub id: i64,
    /// 在特征库中的位置，与条目一一对应且永不复用
    pub histogram_feature_index: u64,
    /// 所属电影
    pub movie_name: String,
    /// 帧号
    pub frame_pos: i64,
    /// 截图路径
    pub thumbnail_path: String,
    /// 描述文本
    pub caption: String,
    /// 物体识别标签
    pub labels: Vec<String>,
}

impl Entry {
    /// 用于 token 查询的小写字符串：全部标签加上描述
    pub fn query_strings(&self) -> impl Iterator<Item = String> + '_ {
        self.labels.iter().chain(std::iter::once(&self.caption)).map(|s| s.to_lowercase())
    }
}

/// 待导入的条目，特征位置在写入特征库后才会分配
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub movie_name: String,
    pub frame_pos: i64,
    pub thumbnail_path: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub labels: Vec<String>,
}
