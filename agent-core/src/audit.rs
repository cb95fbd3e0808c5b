//! Append-only JSONL audit logs under `<log_dir>/{llm,tool}.jsonl`.
//! The event shapes (`{ts, direction, text, reasoning, raw}` for `llm`,
//! `{ts, tool, args, result}` for `tool`) are part of the observable
//! contract, so the field names below are load-bearing.

use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde_json::Value;
use serde_json::json;

use crate::error::Result;

fn append_line(log_dir: &Path, name: &str, mut event: Value) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;
    if let Value::Object(map) = &mut event {
        map.insert("ts".to_string(), json!(Utc::now().to_rfc3339()));
    }
    let path = log_dir.join(format!("{name}.jsonl"));
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", serde_json::to_string(&event)?)?;
    Ok(())
}

pub fn log_llm(log_dir: &Path, direction: &str, text: &str, reasoning: Option<&str>, raw: Option<&Value>) {
    let event = json!({
        "direction": direction,
        "text": text,
        "reasoning": reasoning,
        "raw": raw,
    });
    if let Err(err) = append_line(log_dir, "llm", event) {
        tracing::warn!(%err, "failed to write llm audit log");
    }
}

pub fn log_tool(log_dir: &Path, tool: &str, args: &Value, result: &Value) {
    let event = json!({
        "tool": tool,
        "args": args,
        "result": result,
    });
    if let Err(err) = append_line(log_dir, "tool", event) {
        tracing::warn!(%err, "failed to write tool audit log");
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn log_tool_appends_jsonl_line_with_ts() {
        let dir = tempdir().unwrap();
        log_tool(dir.path(), "read_file", &json!({"path": "a.txt"}), &json!({"bytes": 2}));
        let text = std::fs::read_to_string(dir.path().join("tool.jsonl")).unwrap();
        let line: Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(line["tool"], "read_file");
        assert!(line["ts"].is_string());
    }
}
