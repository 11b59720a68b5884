//! Image search tool — scrapes the Bing image results page.
//!
//! Each result tile carries an `m` attribute holding HTML-escaped JSON with
//! the full-size image url (`murl`) and title (`t`). Tiles without usable
//! metadata fall back to plain `<img src>` urls that look like images.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Serialize;
use serde_json::{Value, json};
use shihui_core::error::ToolError;
use shihui_core::tool::{ParamKind, ParameterSchema, Tool, ToolCategory, ToolParams};
use tracing::{debug, info, warn};

const BING_IMAGES: &str = "https://cn.bing.com/images/search";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/84.0.4147.105 Safari/537.36";
const DEFAULT_COUNT: u64 = 10;
const MAX_COUNT: u64 = 50;

static TILE_META: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bm="(\{[^"]*\})""#).expect("valid regex"));
static IMG_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<img[^>]*?\b(?:data-src|src)="([^"]+)"[^>]*>"#).expect("valid regex"));
static IMG_ALT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\balt="([^"]*)""#).expect("valid regex"));

const IMAGE_HINTS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", "images/", "/image/", "photo", "pic",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageResult {
    pub url: String,
    pub title: String,
    pub source: &'static str,
}

fn unescape_html(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Whether a url plausibly points at an image.
pub fn is_image_url(url: &str) -> bool {
    if url.len() < 10 {
        return false;
    }
    let lower = url.to_lowercase();
    IMAGE_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Extract up to `limit` images from a results page.
pub fn parse_results(html: &str, query: &str, limit: usize) -> Vec<ImageResult> {
    let fallback_title = format!("{query}相关图片");
    let mut results: Vec<ImageResult> = Vec::new();

    for caps in TILE_META.captures_iter(html) {
        let Ok(meta) = serde_json::from_str::<Value>(&unescape_html(&caps[1])) else {
            debug!("Skipping tile with unparseable metadata");
            continue;
        };
        let Some(url) = meta.get("murl").and_then(Value::as_str) else { continue };
        if !is_image_url(url) {
            continue;
        }
        let title = meta
            .get("t")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map_or_else(|| fallback_title.clone(), String::from);
        results.push(ImageResult { url: url.to_string(), title, source: "bing" });
        if results.len() >= limit {
            return results;
        }
    }

    if results.is_empty() {
        warn!("No image tiles found, page layout may have changed");
        for caps in IMG_SRC.captures_iter(html) {
            let url = unescape_html(&caps[1]);
            if !is_image_url(&url) {
                continue;
            }
            let title = IMG_ALT
                .captures(&caps[0])
                .map(|c| unescape_html(c[1].trim()))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| fallback_title.clone());
            results.push(ImageResult { url, title, source: "bing" });
            if results.len() >= limit {
                break;
            }
        }
    }

    results
}

pub struct ImageSearchTool {
    endpoint: String,
    client: reqwest::Client,
}

impl Default for ImageSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageSearchTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            endpoint: BING_IMAGES.to_string(),
            client,
        }
    }

    /// Point the crawler at a different results page.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn fetch_page(&self, query: &str, count: u64) -> Result<String, ToolError> {
        let fetch = (count * 2).min(MAX_COUNT).to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("count", fetch.as_str()), ("form", "HDRSC2"), ("first", "1")])
            .send()
            .await
            .map_err(|e| ToolError::failed(self.name(), e))?;

        if !response.status().is_success() {
            return Err(ToolError::failed(self.name(), format!("Bing请求失败: HTTP {}", response.status())));
        }
        response.text().await.map_err(|e| ToolError::failed(self.name(), e))
    }
}

#[async_trait]
impl Tool for ImageSearchTool {
    fn name(&self) -> &str {
        "image_search"
    }

    fn description(&self) -> &str {
        "Bing图片搜索工具，用于搜索美食相关图片（基于爬虫技术）"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::new()
            .required("query", ParamKind::String, "图片搜索关键词，如'红烧肉'、'川菜'等")
            .optional("count", ParamKind::Integer, "需要搜索的图片数量 (1-50，默认10)")
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Image
    }

    async fn execute(&self, params: &ToolParams) -> Result<Value, ToolError> {
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("搜索关键词不能为空".into()));
        }
        let count = params
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_COUNT)
            .clamp(1, MAX_COUNT);

        info!(query, count, "Searching images");
        let html = self.fetch_page(query, count).await?;
        let images = parse_results(&html, query, count as usize);
        if images.is_empty() {
            return Err(ToolError::failed(self.name(), format!("未找到关于'{query}'的图片")));
        }

        Ok(json!({
            "success": true,
            "query": query,
            "count": images.len(),
            "images": images,
            "message": format!("成功找到 {} 张关于'{query}'的图片", images.len()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <div class="imgpt">
          <a class="iusc" m="{&quot;murl&quot;:&quot;https://img.example.com/hongshaorou.jpg&quot;,&quot;t&quot;:&quot;红烧肉做法&quot;}" href="/images/x"></a>
          <a class="iusc" m="{&quot;murl&quot;:&quot;https://example.com/page&quot;,&quot;t&quot;:&quot;not an image&quot;}"></a>
          <a class="iusc" m="{&quot;murl&quot;:&quot;https://img.example.com/rsr2.png&quot;,&quot;t&quot;:&quot;&quot;}"></a>
        </div>"#;

    #[test]
    fn parses_tile_metadata() {
        let images = parse_results(PAGE, "红烧肉", 10);
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].url, "https://img.example.com/hongshaorou.jpg");
        assert_eq!(images[0].title, "红烧肉做法");
        assert_eq!(images[1].title, "红烧肉相关图片");
        assert_eq!(images[1].source, "bing");
    }

    #[test]
    fn respects_limit() {
        assert_eq!(parse_results(PAGE, "红烧肉", 1).len(), 1);
    }

    #[test]
    fn falls_back_to_img_tags() {
        let html = r#"<img alt="麻婆豆腐" src="https://img.example.com/mapo.webp"><img src="/sa/logo.svg">"#;
        let images = parse_results(html, "麻婆豆腐", 5);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].title, "麻婆豆腐");
    }

    #[test]
    fn image_url_heuristics() {
        assert!(is_image_url("https://a.com/x/photo/1"));
        assert!(is_image_url("https://a.com/1.JPEG"));
        assert!(!is_image_url("https://a.com/article"));
        assert!(!is_image_url("a.jpg"));
    }

    #[tokio::test]
    async fn blank_query_rejected() {
        let mut params = ToolParams::new();
        params.insert("query".into(), json!("   "));
        let err = ImageSearchTool::new().execute(&params).await.unwrap_err();
        assert_eq!(err, ToolError::InvalidArguments("搜索关键词不能为空".into()));
    }
}
