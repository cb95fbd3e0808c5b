//! `browser_headless` tool: tries chromium-family binaries with
//! `--headless=new --dump-dom`, falling back to a plain `web_get` when
//! none are available.

use serde_json::Value;
use serde_json::json;
use tokio::process::Command;

use crate::tools::web::fetch_capped;

const DOM_CAP: usize = 200_000;

fn candidate_engines(engine: Option<&str>) -> Vec<String> {
    match engine {
        None | Some("auto") | Some("chromium") => {
            vec!["chromium", "chromium-browser", "google-chrome", "google-chrome-stable"]
                .into_iter()
                .map(str::to_string)
                .collect()
        }
        Some(other) => vec![other.to_string()],
    }
}

pub async fn headless_browse(args: &Value) -> Value {
    let url = args.get("url").and_then(Value::as_str).unwrap_or("");
    let engine = args.get("engine").and_then(Value::as_str);
    let timeout = args.get("timeout").and_then(Value::as_u64).unwrap_or(60);

    for binname in candidate_engines(engine) {
        let mut command = Command::new(&binname);
        command
            .args(["--headless=new", "--disable-gpu", "--dump-dom", url])
            .kill_on_drop(true);
        let Ok(Ok(output)) = tokio::time::timeout(std::time::Duration::from_secs(timeout), command.output()).await
        else {
            continue;
        };
        if output.status.success() && !output.stdout.is_empty() {
            let truncated = output.stdout.len() > DOM_CAP;
            let slice = if truncated { &output.stdout[..DOM_CAP] } else { &output.stdout[..] };
            let dom = String::from_utf8_lossy(slice).into_owned();
            return json!({"engine": binname, "status": "ok", "dom": dom, "truncated": truncated});
        }
    }

    let mut fallback = fetch_capped(url, DOM_CAP).await;
    if let Value::Object(map) = &mut fallback {
        map.insert("engine".to_string(), json!("urllib"));
    }
    fallback
}
