//! 多样性过滤
//!
//! 基于词集合 Jaccard 相似度的近似去重，而不是精确字符串匹配。
//! 选择与补齐拆成两步：管线先用 `select_diverse` 判断是否需要格式修复，
//! 最后再按配置的补齐策略处理数量不足的结果。

use std::collections::HashSet;

use crate::config::PadPolicy;

/// 两行之间允许的最大相似度
pub const MAX_SIMILARITY: f64 = 0.7;

/// 小写化后按非字母数字字符切分的词集合
fn tokens(line: &str) -> HashSet<String> {
    line.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalized(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// 两行文本的 Jaccard 相似度；两个空词集（纯标点）视为完全相同
pub fn jaccard(a: &str, b: &str) -> f64 {
    let set_a = tokens(a);
    let set_b = tokens(b);
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.len() + set_b.len() - intersection;
    if union == 0 {
        return 1.0;
    }
    intersection as f64 / union as f64
}

fn too_similar(a: &str, b: &str) -> bool {
    normalized(a) == normalized(b) || jaccard(a, b) > MAX_SIMILARITY
}

/// 按输入顺序贪心挑选彼此足够不同的行，最多 `limit` 条
pub fn select_diverse(candidates: &[String], limit: usize) -> Vec<String> {
    let mut kept: Vec<String> = Vec::new();
    for line in candidates {
        if kept.len() >= limit {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if kept.iter().any(|k| too_similar(k, line)) {
            continue;
        }
        kept.push(line.to_string());
    }
    kept
}

/// 按策略补齐到 `target` 条；空输入保持为空
pub fn pad(mut lines: Vec<String>, target: usize, policy: PadPolicy) -> Vec<String> {
    if policy == PadPolicy::RepeatLast {
        if let Some(last) = lines.last().cloned() {
            while lines.len() < target {
                lines.push(last.clone());
            }
        }
    }
    lines.truncate(target);
    lines
}
