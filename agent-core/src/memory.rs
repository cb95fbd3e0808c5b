//! Append-only vector memory store persisted as JSON lines under
//! `config_dir/memory.jsonl`: a 256-dimensional bag-of-tokens embedding
//! (SHA-1-hashed token buckets, L2-normalized), full-scan cosine search,
//! and atomic temp-file-rename rewrites for delete/update.

use std::path::Path;
use std::path::PathBuf;

use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use sha1::Digest;
use sha1::Sha1;

use crate::error::Result;

const MEM_FILE: &str = "memory.jsonl";
const DIM: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub ts: String,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub meta: Value,
    #[serde(default)]
    pub vec: Vec<f64>,
}

fn mem_path(config_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(config_dir)?;
    Ok(config_dir.join(MEM_FILE))
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn token_bucket(tok: &str) -> usize {
    let digest = Sha1::digest(tok.as_bytes());
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(buf) % DIM as u64) as usize
}

/// Bag-of-tokens embedding: hash each whitespace-split lowercased token into
/// one of `DIM` buckets, increment, then L2-normalize.
fn embed_local(text: &str) -> Vec<f64> {
    let mut vec = vec![0.0f64; DIM];
    for tok in tokenize(text) {
        vec[token_bucket(&tok)] += 1.0;
    }
    let norm = vec.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm = if norm == 0.0 { 1.0 } else { norm };
    vec.iter().map(|x| x / norm).collect()
}

fn cosine(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn load_entries(path: &Path) -> Vec<MemoryEntry> {
    let Ok(text) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect()
}

fn rewrite_atomic(path: &Path, entries: &[MemoryEntry]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let mut buf = String::new();
    for e in entries {
        buf.push_str(&serde_json::to_string(e)?);
        buf.push('\n');
    }
    std::fs::write(&tmp, buf)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub fn add(config_dir: &Path, text: &str, tags: Vec<String>, meta: Value) -> Result<Value> {
    let path = mem_path(config_dir)?;
    let entry = MemoryEntry {
        id: uuid::Uuid::new_v4().to_string(),
        ts: Utc::now().to_rfc3339(),
        vec: embed_local(text),
        text: text.to_string(),
        tags,
        meta,
    };
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
    use std::io::Write;
    writeln!(file, "{}", serde_json::to_string(&entry)?)?;
    Ok(json!({"id": entry.id, "ts": entry.ts, "tags": entry.tags}))
}

pub fn list(config_dir: &Path, limit: usize, tag: Option<&str>) -> Result<Value> {
    let path = mem_path(config_dir)?;
    let mut entries = load_entries(&path);
    if let Some(tag) = tag {
        entries.retain(|e| e.tags.iter().any(|t| t == tag));
    }
    let start = entries.len().saturating_sub(limit);
    let items: Vec<Value> = entries[start..]
        .iter()
        .map(|e| json!({"id": e.id, "ts": e.ts, "tags": e.tags, "text": e.text}))
        .collect();
    Ok(json!({"count": items.len(), "items": items}))
}

pub fn delete(config_dir: &Path, id: &str) -> Result<Value> {
    let path = mem_path(config_dir)?;
    let entries = load_entries(&path);
    let before = entries.len();
    let kept: Vec<MemoryEntry> = entries.into_iter().filter(|e| e.id != id).collect();
    if kept.len() == before {
        return Ok(json!({"deleted": false, "reason": "not found"}));
    }
    rewrite_atomic(&path, &kept)?;
    Ok(json!({"deleted": true, "id": id}))
}

pub fn search(config_dir: &Path, query: &str, top_k: usize, tag: Option<&str>) -> Result<Value> {
    let path = mem_path(config_dir)?;
    let mut entries = load_entries(&path);
    if let Some(tag) = tag {
        entries.retain(|e| e.tags.iter().any(|t| t == tag));
    }
    if entries.is_empty() {
        return Ok(json!({"results": []}));
    }
    let q = embed_local(query);
    let mut scored: Vec<(f64, &MemoryEntry)> = entries
        .iter()
        .map(|e| {
            let v = if e.vec.len() == DIM { e.vec.clone() } else { embed_local(&e.text) };
            (cosine(&q, &v), e)
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    let results: Vec<Value> = scored
        .into_iter()
        .take(top_k)
        .map(|(score, e)| json!({"id": e.id, "score": score, "ts": e.ts, "tags": e.tags, "text": e.text}))
        .collect();
    Ok(json!({"results": results}))
}

pub fn update(
    config_dir: &Path,
    id: &str,
    text: Option<&str>,
    tags: Option<Vec<String>>,
    meta: Option<Value>,
) -> Result<Value> {
    let path = mem_path(config_dir)?;
    let mut entries = load_entries(&path);
    let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
        return Ok(json!({"updated": false, "reason": "not found"}));
    };
    if let Some(text) = text {
        entry.text = text.to_string();
        entry.vec = embed_local(text);
    }
    if let Some(tags) = tags {
        entry.tags = tags;
    }
    if let Some(meta) = meta {
        entry.meta = meta;
    }
    rewrite_atomic(&path, &entries)?;
    Ok(json!({"updated": true, "id": id}))
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn add_then_search_finds_top_hit() {
        let dir = tempdir().unwrap();
        let added = add(dir.path(), "the quick brown fox", vec!["animal".into()], Value::Null).unwrap();
        let id = added["id"].as_str().unwrap().to_string();
        let results = search(dir.path(), "quick brown fox", 5, None).unwrap();
        let top = &results["results"][0];
        assert_eq!(top["id"], id);
    }

    #[test]
    fn delete_removes_entry() {
        let dir = tempdir().unwrap();
        let added = add(dir.path(), "hello world", vec![], Value::Null).unwrap();
        let id = added["id"].as_str().unwrap().to_string();
        let del = delete(dir.path(), &id).unwrap();
        assert_eq!(del["deleted"], true);
        let listed = list(dir.path(), 50, None).unwrap();
        assert_eq!(listed["count"], 0);
    }

    #[test]
    fn update_reembeds_on_text_change() {
        let dir = tempdir().unwrap();
        let added = add(dir.path(), "alpha beta", vec![], Value::Null).unwrap();
        let id = added["id"].as_str().unwrap().to_string();
        update(dir.path(), &id, Some("gamma delta"), None, None).unwrap();
        let results = search(dir.path(), "gamma delta", 1, None).unwrap();
        assert_eq!(results["results"][0]["id"], id);
    }

    #[test]
    fn tag_filter_excludes_non_matching() {
        let dir = tempdir().unwrap();
        add(dir.path(), "foo", vec!["a".into()], Value::Null).unwrap();
        add(dir.path(), "bar", vec!["b".into()], Value::Null).unwrap();
        let listed = list(dir.path(), 50, Some("a")).unwrap();
        assert_eq!(listed["count"], 1);
    }
}
