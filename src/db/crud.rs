use sqlx::{Executor, Result, Sqlite, SqlitePool};

use super::EntryRecord;
use crate::model::NewEntry;

/// 添加条目记录，返回条目 ID
pub async fn add_entry<'c, E>(executor: E, entry: &NewEntry, histogram_feature_index: u64) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let labels = serde_json::to_string(&entry.labels).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    let (id,) = sqlx::query_as::<_, (i64,)>(
        r#"
        INSERT INTO entry (histogram_feature_index, movie_name, frame_pos, thumbnail_path, caption, labels)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(histogram_feature_index as i64)
    .bind(&entry.movie_name)
    .bind(entry.frame_pos)
    .bind(&entry.thumbnail_path)
    .bind(&entry.caption)
    .bind(labels)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// 检查截图路径是否已经存在
pub async fn check_thumbnail(executor: &SqlitePool, path: &str) -> Result<bool> {
    let (count,) = sqlx::query_as::<_, (i64,)>(
        r#"
        SELECT COUNT(*) as count FROM entry WHERE thumbnail_path = ?
        "#,
    )
    .bind(path)
    .fetch_one(executor)
    .await?;

    Ok(count > 0)
}

/// 获取全部条目，按特征位置排序
pub async fn get_entries(executor: &SqlitePool) -> Result<Vec<EntryRecord>> {
    sqlx::query_as::<_, EntryRecord>(
        r#"
        SELECT id, histogram_feature_index, movie_name, frame_pos, thumbnail_path, caption, labels
        FROM entry ORDER BY histogram_feature_index ASC
        "#,
    )
    .fetch_all(executor)
    .await
}

pub async fn count_entries(executor: &SqlitePool) -> Result<u64> {
    let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM entry").fetch_one(executor).await?;
    Ok(count as u64)
}
