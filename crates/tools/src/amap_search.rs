//! Amap (高德) POI search — restaurants by keyword, or around a point.
//!
//! The result already carries a `location_list` display envelope.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use shihui_core::error::ToolError;
use shihui_core::tool::{ParamKind, ParameterSchema, Tool, ToolCategory, ToolParams};
use tracing::{debug, info};

const BASE_URL: &str = "https://restapi.amap.com/v3";
const DEFAULT_CITY: &str = "长沙";
const DEFAULT_RADIUS: &str = "5000";
const PAGE_SIZE: &str = "20";

/// Amap returns `[]` for empty string fields; treat any non-string as empty.
fn lenient_string<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct BizExt {
    #[serde(default, deserialize_with = "lenient_string")]
    rating: String,
    #[serde(default, deserialize_with = "lenient_string")]
    cost: String,
    #[serde(default, deserialize_with = "lenient_string")]
    tag: String,
}

#[derive(Debug, Deserialize)]
struct Poi {
    #[serde(default, deserialize_with = "lenient_string")]
    id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    address: String,
    #[serde(default, deserialize_with = "lenient_string")]
    location: String,
    #[serde(default, deserialize_with = "lenient_string")]
    distance: String,
    #[serde(default, deserialize_with = "lenient_string")]
    tel: String,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    kind: String,
    #[serde(default, deserialize_with = "lenient_string")]
    business_area: String,
    #[serde(default)]
    biz_ext: Option<BizExt>,
}

#[derive(Debug, Deserialize)]
struct SearchReply {
    #[serde(default, deserialize_with = "lenient_string")]
    status: String,
    #[serde(default, deserialize_with = "lenient_string")]
    info: String,
    #[serde(default)]
    pois: Vec<Poi>,
    #[serde(default)]
    suggestion: Value,
}

/// "1.2km" at or above a kilometre, whole metres below.
pub fn format_distance(raw: &str) -> String {
    match raw.parse::<f64>() {
        Ok(m) if m >= 1000.0 => format!("{:.1}km", m / 1000.0),
        Ok(m) => format!("{}m", m as u64),
        Err(_) => raw.to_string(),
    }
}

/// Spending tier from the average cost per person.
pub fn price_level(cost: &str) -> String {
    if cost.is_empty() {
        return String::new();
    }
    match cost.parse::<f64>() {
        Ok(c) if c <= 30.0 => "经济实惠".into(),
        Ok(c) if c <= 80.0 => "中等消费".into(),
        Ok(_) => "高档消费".into(),
        Err(_) => format!("人均{cost}元"),
    }
}

fn valid_coords(location: &str) -> bool {
    let mut parts = location.split(',').map(str::trim);
    matches!(
        (parts.next(), parts.next()),
        (Some(lng), Some(lat)) if lng.parse::<f64>().is_ok() && lat.parse::<f64>().is_ok()
    )
}

fn location_item(poi: Poi) -> Value {
    let biz = poi.biz_ext.unwrap_or_default();
    let rating = biz.rating.parse::<f64>().unwrap_or(0.0);
    let rating = if rating > 0.0 { rating.to_string() } else { "暂无评分".into() };
    let distance = if poi.distance.is_empty() { String::new() } else { format_distance(&poi.distance) };
    let tags: Vec<&str> = biz.tag.split(';').filter(|t| !t.is_empty()).collect();

    json!({
        "id": poi.id,
        "name": poi.name,
        "address": poi.address,
        "distance": distance,
        "rating": rating,
        "price_level": price_level(&biz.cost),
        "map_url": format!("https://uri.amap.com/marker?position={}&name={}", poi.location.replace(' ', ""), poi.name),
        "tel": poi.tel,
        "type": poi.kind,
        "location_coords": poi.location,
        "business_area": poi.business_area,
        "tags": tags,
    })
}

fn search_result(reply: SearchReply, keyword: &str) -> Result<Value, String> {
    if reply.status != "1" {
        return Err(if reply.info.is_empty() { "未知错误".into() } else { reply.info });
    }

    let locations: Vec<Value> = reply
        .pois
        .into_iter()
        .filter(|poi| {
            let ok = valid_coords(&poi.location);
            if !ok {
                debug!(name = %poi.name, location = %poi.location, "Skipping POI without usable coordinates");
            }
            ok
        })
        .map(location_item)
        .collect();

    info!(keyword, found = locations.len(), "Amap search complete");
    Ok(json!({
        "success": true,
        "display_type": "location_list",
        "display_data": {
            "total_found": locations.len(),
            "locations": locations,
            "search_query": keyword,
        },
        "display_config": {
            "show_map_links": true,
            "show_ratings": true,
            "show_distance": true,
        },
        "suggestion": reply.suggestion,
    }))
}

pub struct AmapSearchTool {
    api_key: Option<String>,
    client: reqwest::Client,
}

impl AmapSearchTool {
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

fn str_param<'a>(params: &'a ToolParams, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

#[async_trait]
impl Tool for AmapSearchTool {
    fn name(&self) -> &str {
        "amap_search"
    }

    fn description(&self) -> &str {
        "高德地图搜索工具，用于查找餐厅、美食地点等"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::new()
            .required("keyword", ParamKind::String, "搜索关键词，如'火锅'、'川菜'等")
            .optional("location", ParamKind::String, "中心点坐标，格式：经度,纬度")
            .optional("city", ParamKind::String, "城市名称，默认长沙")
            .optional("radius", ParamKind::String, "搜索半径（米），默认5000")
            .optional("type", ParamKind::String, "POI类型，如'050000'(餐饮服务)")
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Location
    }

    async fn execute(&self, params: &ToolParams) -> Result<Value, ToolError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ToolError::failed(self.name(), "未配置 AMAP_API_KEY"));
        };
        let keyword = str_param(params, "keyword").unwrap_or_default();

        let mut query: Vec<(&str, &str)> = vec![
            ("key", api_key),
            ("keywords", keyword),
            ("city", str_param(params, "city").unwrap_or(DEFAULT_CITY)),
            ("output", "json"),
            ("offset", PAGE_SIZE),
            ("page", "1"),
            ("extensions", "all"),
        ];
        let endpoint = match str_param(params, "location") {
            Some(location) => {
                query.push(("location", location));
                query.push(("radius", str_param(params, "radius").unwrap_or(DEFAULT_RADIUS)));
                format!("{BASE_URL}/place/around")
            }
            None => format!("{BASE_URL}/place/text"),
        };
        if let Some(kind) = str_param(params, "type") {
            query.push(("types", kind));
        }

        let response = self
            .client
            .get(&endpoint)
            .query(&query)
            .send()
            .await
            .map_err(|e| ToolError::failed(self.name(), e))?;
        if !response.status().is_success() {
            return Err(ToolError::failed(self.name(), format!("API请求失败: {}", response.status().as_u16())));
        }

        let reply: SearchReply = response.json().await.map_err(|e| ToolError::failed(self.name(), e))?;
        search_result(reply, keyword).map_err(|e| ToolError::failed(self.name(), e))
    }
}
