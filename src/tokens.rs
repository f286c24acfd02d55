use std::collections::HashSet;
use std::ops::Deref;

use crate::model::Entry;

/// 将查询字符串按逗号拆分为小写 token，空 token 会被忽略
pub fn parse_tokens(query: &str) -> Vec<String> {
    query.split(',').map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty()).collect()
}

/// 返回所有 token 都能在标签或描述中找到（子串匹配）的条目
///
/// token 之间为 AND 关系，同一个 token 只要出现在任意一个字符串中即可。
/// 不含任何有效 token 的查询匹配全部条目。
pub fn filter_by_tokens<I, E>(query: &str, entries: I) -> Vec<E>
where
    I: IntoIterator<Item = E>,
    E: Deref<Target = Entry>,
{
    let tokens = parse_tokens(query);
    entries
        .into_iter()
        .filter(|entry| {
            let strings = entry.query_strings().collect::<Vec<_>>();
            tokens.iter().all(|token| strings.iter().any(|s| s.contains(token.as_str())))
        })
        .collect()
}

/// 只保留 ID 在子集中的结果，保持原有顺序；子集为空时不做过滤
pub fn filter_by_ids<T, F>(results: Vec<T>, ids: &[i64], id_of: F) -> Vec<T>
where
    F: Fn(&T) -> i64,
{
    if ids.is_empty() {
        return results;
    }
    let ids = ids.iter().copied().collect::<HashSet<_>>();
    results.into_iter().filter(|r| ids.contains(&id_of(r))).collect()
}
