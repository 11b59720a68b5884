//! Web search through the Bing Web Search API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use shihui_core::error::ToolError;
use shihui_core::tool::{ParamKind, ParameterSchema, Tool, ToolCategory, ToolParams};
use tracing::info;

const ENDPOINT: &str = "https://api.bing.microsoft.com/v7.0/search";
const DEFAULT_COUNT: u64 = 5;

#[derive(Debug, Default, Deserialize)]
struct WebPage {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    snippet: String,
    #[serde(default, rename = "dateLastCrawled")]
    date_last_crawled: String,
}

#[derive(Debug, Default, Deserialize)]
struct WebPages {
    #[serde(default)]
    value: Vec<WebPage>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchReply {
    #[serde(default, rename = "webPages")]
    web_pages: WebPages,
}

fn search_result(reply: SearchReply, query: &str) -> Value {
    let results: Vec<Value> = reply
        .web_pages
        .value
        .into_iter()
        .map(|page| {
            json!({
                "title": page.name,
                "url": page.url,
                "snippet": page.snippet,
                "date": page.date_last_crawled,
            })
        })
        .collect();
    json!({
        "success": true,
        "query": query,
        "total_results": results.len(),
        "results": results,
    })
}

pub struct BingSearchTool {
    api_key: Option<String>,
    client: reqwest::Client,
}

impl BingSearchTool {
    pub fn new(api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        }
    }
}

#[async_trait]
impl Tool for BingSearchTool {
    fn name(&self) -> &str {
        "bing_search"
    }

    fn description(&self) -> &str {
        "必应搜索工具，用于获取最新的网络信息"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::new()
            .required("query", ParamKind::String, "搜索查询")
            .optional("count", ParamKind::Integer, "结果数量，默认5")
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Search
    }

    async fn execute(&self, params: &ToolParams) -> Result<Value, ToolError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ToolError::failed(self.name(), "未配置 BING_API_KEY"));
        };
        let query = params.get("query").and_then(Value::as_str).unwrap_or_default();
        let count = params
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_COUNT)
            .to_string();

        info!(query, "Searching the web");
        let response = self
            .client
            .get(ENDPOINT)
            .header("Ocp-Apim-Subscription-Key", api_key)
            .query(&[("q", query), ("count", count.as_str()), ("responseFilter", "Webpages")])
            .send()
            .await
            .map_err(|e| ToolError::failed(self.name(), e))?;
        if !response.status().is_success() {
            return Err(ToolError::failed(self.name(), format!("搜索失败: {}", response.status().as_u16())));
        }

        let reply: SearchReply = response.json().await.map_err(|e| ToolError::failed(self.name(), e))?;
        Ok(search_result(reply, query))
    }
}
