//! `web_get`/`web_search` tools: a capped GET, and a crude anchor-tag scrape
//! of DuckDuckGo's HTML result page (no JS engine).

use regex_lite::Regex;
use serde_json::Value;
use serde_json::json;

const TIMEOUT_SECS: u64 = 30;

pub async fn web_get(args: &Value) -> Value {
    let Some(url) = args.get("url").and_then(Value::as_str) else {
        return json!({"error": "url is required"});
    };
    let max_bytes = args.get("max_bytes").and_then(Value::as_u64).unwrap_or(200_000) as usize;
    fetch_capped(url, max_bytes).await
}

pub(crate) async fn fetch_capped(url: &str, max_bytes: usize) -> Value {
    let client = match reqwest::Client::builder().timeout(std::time::Duration::from_secs(TIMEOUT_SECS)).build() {
        Ok(c) => c,
        Err(e) => return json!({"url": url, "error": e.to_string()}),
    };
    let response = match client.get(url).send().await {
        Ok(r) => r,
        Err(e) => return json!({"url": url, "error": e.to_string()}),
    };
    let status = response.status().as_u16();
    let bytes = match response.bytes().await {
        Ok(b) => b,
        Err(e) => return json!({"url": url, "error": e.to_string()}),
    };
    let truncated = bytes.len() > max_bytes;
    let slice = if truncated { &bytes[..max_bytes] } else { &bytes[..] };
    let content = String::from_utf8_lossy(slice).into_owned();
    json!({"url": url, "status": status, "truncated": truncated, "content": content})
}

#[expect(clippy::expect_used)]
pub async fn web_search(args: &Value) -> Value {
    let query = args.get("query").and_then(Value::as_str).unwrap_or("");
    let max_results = args.get("max_results").and_then(Value::as_u64).unwrap_or(5) as usize;
    let url = format!("https://duckduckgo.com/html/?q={}", urlencoding_encode(query));

    let client = match reqwest::Client::builder().timeout(std::time::Duration::from_secs(TIMEOUT_SECS)).build() {
        Ok(c) => c,
        Err(e) => return json!({"query": query, "error": e.to_string()}),
    };
    let response = client.get(&url).header("User-Agent", "Mozilla/5.0").send().await;
    let html = match response {
        Ok(r) => match r.text().await {
            Ok(t) => t,
            Err(e) => return json!({"query": query, "error": e.to_string()}),
        },
        Err(e) => return json!({"query": query, "error": e.to_string()}),
    };

    let re = Regex::new(r#"(?is)<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#)
        .expect("static regex is valid");
    let tag_re = Regex::new(r"<[^>]+>").expect("static regex is valid");
    let mut results = Vec::new();
    for caps in re.captures_iter(&html) {
        if results.len() >= max_results {
            break;
        }
        let href = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let raw_title = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let title = tag_re.replace_all(raw_title, "").trim().to_string();
        results.push(json!({"title": title, "url": href}));
    }
    json!({"query": query, "results": results})
}

fn urlencoding_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
