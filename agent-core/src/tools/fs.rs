//! Workspace-confined filesystem tools; confinement itself lives in
//! `crate::util::resolve_in_workspace`.

use serde_json::Value;
use serde_json::json;

use crate::tools::ToolContext;
use crate::util::resolve_in_workspace;

fn err(e: impl std::fmt::Display) -> Value {
    json!({"error": e.to_string()})
}

pub fn read_file(args: &Value, ctx: &ToolContext<'_>) -> Value {
    let Some(path) = args.get("path").and_then(Value::as_str) else {
        return err("path is required");
    };
    let max_bytes = args.get("max_bytes").and_then(Value::as_u64).unwrap_or(200_000) as usize;
    let resolved = match resolve_in_workspace(ctx.workspace_root, path) {
        Ok(p) => p,
        Err(e) => return err(e),
    };
    let data = match std::fs::read(&resolved) {
        Ok(d) => d,
        Err(e) => return err(e),
    };
    let truncated = data.len() > max_bytes;
    let data = if truncated { &data[..max_bytes] } else { &data[..] };
    let content = String::from_utf8_lossy(data).into_owned();
    json!({
        "path": resolved.to_string_lossy(),
        "bytes": data.len(),
        "truncated": truncated,
        "content": content,
    })
}

pub fn write_file(args: &Value, ctx: &ToolContext<'_>) -> Value {
    let Some(path) = args.get("path").and_then(Value::as_str) else {
        return err("path is required");
    };
    let content = args.get("content").and_then(Value::as_str).unwrap_or("");
    let append = args.get("append").and_then(Value::as_bool).unwrap_or(false);
    let resolved = match resolve_in_workspace(ctx.workspace_root, path) {
        Ok(p) => p,
        Err(e) => return err(e),
    };
    if let Some(parent) = resolved.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(e);
        }
    }
    let result = if append {
        use std::io::Write;
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&resolved)
            .and_then(|mut f| f.write_all(content.as_bytes()))
    } else {
        std::fs::write(&resolved, content)
    };
    if let Err(e) = result {
        return err(e);
    }
    json!({"path": resolved.to_string_lossy(), "written": content.len(), "append": append})
}

pub fn list_dir(args: &Value, ctx: &ToolContext<'_>) -> Value {
    let Some(path) = args.get("path").and_then(Value::as_str) else {
        return err("path is required");
    };
    let resolved = match resolve_in_workspace(ctx.workspace_root, path) {
        Ok(p) => p,
        Err(e) => return err(e),
    };
    if !resolved.exists() {
        return json!({"path": resolved.to_string_lossy(), "exists": false, "entries": []});
    }
    let mut entries = Vec::new();
    let iter = match std::fs::read_dir(&resolved) {
        Ok(i) => i,
        Err(e) => return err(e),
    };
    for child in iter {
        let Ok(child) = child else { continue };
        let Ok(meta) = child.metadata() else { continue };
        entries.push(json!({
            "name": child.file_name().to_string_lossy(),
            "is_dir": meta.is_dir(),
            "size": if meta.is_file() { Some(meta.len()) } else { None },
        }));
    }
    json!({"path": resolved.to_string_lossy(), "exists": true, "entries": entries})
}

pub fn delete_path(args: &Value, ctx: &ToolContext<'_>) -> Value {
    let Some(path) = args.get("path").and_then(Value::as_str) else {
        return err("path is required");
    };
    let recursive = args.get("recursive").and_then(Value::as_bool).unwrap_or(false);
    let resolved = match resolve_in_workspace(ctx.workspace_root, path) {
        Ok(p) => p,
        Err(e) => return err(e),
    };
    if !resolved.exists() {
        return json!({"path": resolved.to_string_lossy(), "deleted": false, "reason": "not found"});
    }
    if resolved.is_dir() {
        let result = if recursive { std::fs::remove_dir_all(&resolved) } else { std::fs::remove_dir(&resolved) };
        return match result {
            Ok(()) => json!({"path": resolved.to_string_lossy(), "deleted": true, "type": "dir", "recursive": recursive}),
            Err(e) => json!({"path": resolved.to_string_lossy(), "deleted": false, "error": e.to_string()}),
        };
    }
    match std::fs::remove_file(&resolved) {
        Ok(()) => json!({"path": resolved.to_string_lossy(), "deleted": true, "type": "file"}),
        Err(e) => err(e),
    }
}

pub fn move_path(args: &Value, ctx: &ToolContext<'_>) -> Value {
    let (Some(src), Some(dst)) = (args.get("src").and_then(Value::as_str), args.get("dst").and_then(Value::as_str)) else {
        return err("src and dst are required");
    };
    let overwrite = args.get("overwrite").and_then(Value::as_bool).unwrap_or(false);
    let sp = match resolve_in_workspace(ctx.workspace_root, src) {
        Ok(p) => p,
        Err(e) => return err(e),
    };
    let dp = match resolve_in_workspace(ctx.workspace_root, dst) {
        Ok(p) => p,
        Err(e) => return err(e),
    };
    if dp.exists() && !overwrite {
        return json!({"src": sp.to_string_lossy(), "dst": dp.to_string_lossy(), "moved": false, "error": "destination exists"});
    }
    if let Some(parent) = dp.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(e);
        }
    }
    match std::fs::rename(&sp, &dp) {
        Ok(()) => json!({"src": sp.to_string_lossy(), "dst": dp.to_string_lossy(), "moved": true}),
        Err(e) => err(e),
    }
}

pub fn copy_path(args: &Value, ctx: &ToolContext<'_>) -> Value {
    let (Some(src), Some(dst)) = (args.get("src").and_then(Value::as_str), args.get("dst").and_then(Value::as_str)) else {
        return err("src and dst are required");
    };
    let overwrite = args.get("overwrite").and_then(Value::as_bool).unwrap_or(false);
    let sp = match resolve_in_workspace(ctx.workspace_root, src) {
        Ok(p) => p,
        Err(e) => return err(e),
    };
    let dp = match resolve_in_workspace(ctx.workspace_root, dst) {
        Ok(p) => p,
        Err(e) => return err(e),
    };
    if dp.exists() && !overwrite {
        return json!({"src": sp.to_string_lossy(), "dst": dp.to_string_lossy(), "copied": false, "error": "destination exists"});
    }
    if let Some(parent) = dp.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(e);
        }
    }
    let result = if sp.is_dir() {
        if dp.exists() {
            if let Err(e) = std::fs::remove_dir_all(&dp) {
                return err(e);
            }
        }
        copy_dir_recursive(&sp, &dp)
    } else {
        std::fs::copy(&sp, &dp).map(|_| ())
    };
    match result {
        Ok(()) => json!({"src": sp.to_string_lossy(), "dst": dp.to_string_lossy(), "copied": true}),
        Err(e) => err(e),
    }
}

fn copy_dir_recursive(src: &std::path::Path, dst: &std::path::Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

pub fn make_dir(args: &Value, ctx: &ToolContext<'_>) -> Value {
    let Some(path) = args.get("path").and_then(Value::as_str) else {
        return err("path is required");
    };
    let resolved = match resolve_in_workspace(ctx.workspace_root, path) {
        Ok(p) => p,
        Err(e) => return err(e),
    };
    match std::fs::create_dir_all(&resolved) {
        Ok(()) => json!({"path": resolved.to_string_lossy(), "created": true}),
        Err(e) => err(e),
    }
}

pub fn replace_in_file(args: &Value, ctx: &ToolContext<'_>) -> Value {
    let Some(path) = args.get("path").and_then(Value::as_str) else {
        return err("path is required");
    };
    let find = args.get("find").and_then(Value::as_str).unwrap_or("");
    let replace = args.get("replace").and_then(Value::as_str).unwrap_or("");
    let regex = args.get("regex").and_then(Value::as_bool).unwrap_or(false);
    let count = args.get("count").and_then(Value::as_u64).map(|v| v as usize);
    let resolved = match resolve_in_workspace(ctx.workspace_root, path) {
        Ok(p) => p,
        Err(e) => return err(e),
    };
    let text = match std::fs::read_to_string(&resolved) {
        Ok(t) => t,
        Err(e) => return err(e),
    };
    let (new_text, n) = if regex {
        match regex_lite::Regex::new(find) {
            Ok(re) => replace_regex(&re, &text, replace, count),
            Err(e) => return err(e),
        }
    } else {
        replace_literal(&text, find, replace, count)
    };
    if let Err(e) = std::fs::write(&resolved, new_text) {
        return err(e);
    }
    json!({"path": resolved.to_string_lossy(), "replaced": n})
}

fn replace_literal(text: &str, find: &str, replace: &str, count: Option<usize>) -> (String, usize) {
    match count {
        None => {
            let n = if find.is_empty() { 0 } else { text.matches(find).count() };
            (text.replace(find, replace), n)
        }
        Some(limit) => (text.replacen(find, replace, limit), limit),
    }
}

fn replace_regex(re: &regex_lite::Regex, text: &str, replace: &str, count: Option<usize>) -> (String, usize) {
    let limit = count.unwrap_or(usize::MAX);
    let mut n = 0;
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in re.find_iter(text) {
        if n >= limit {
            break;
        }
        out.push_str(&text[last..m.start()]);
        out.push_str(replace);
        last = m.end();
        n += 1;
    }
    out.push_str(&text[last..]);
    (out, n)
}
