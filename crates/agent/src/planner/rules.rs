//! Keyword rule engine used when the model cannot produce a plan.
//!
//! Rules are checked in order and the first match wins; an image request
//! that also mentions a recipe is still an image request.

use serde_json::json;
use shihui_core::plan::{Plan, ResponseType};
use shihui_core::tool::ToolParams;

use super::query::{enhance_keywords, extract_food_name, image_query};

const DEFAULT_INTENT: &str = "回答用户关于美食的问题";
const DEFAULT_PLACE: &str = "餐厅";
const PLACE_KEYWORDS: &[&str] = &["火锅", "川菜", "粤菜", "湘菜", "烧烤", "西餐"];

/// What a message is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Image,
    Recipe,
    Recommendation,
    Location,
    General,
}

const RULES: &[(Intent, &[&str])] = &[
    (Intent::Image, &["图片", "照片", "看看", "展示", "搜索图片", "显示", "图像", "看一下", "瞧瞧"]),
    (Intent::Recipe, &["做法", "菜谱", "怎么做", "制作方法", "烹饪", "料理", "步骤"]),
    (Intent::Recommendation, &["推荐", "建议", "什么好吃", "吃什么"]),
    (Intent::Location, &["附近", "餐厅", "饭店", "哪里有", "地址", "位置"]),
];

pub fn classify(message: &str) -> Intent {
    let lower = message.to_lowercase();
    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map_or(Intent::General, |(intent, _)| *intent)
}

fn params(value: serde_json::Value) -> ToolParams {
    match value {
        serde_json::Value::Object(map) => map,
        _ => ToolParams::new(),
    }
}

/// Build a plan from keywords alone. Never fails.
pub fn fallback_plan(message: &str) -> Plan {
    match classify(message) {
        Intent::Image => Plan::text("搜索美食图片")
            .with_tool("image_search", params(json!({"query": image_query(message), "count": 5})))
            .with_response_type(ResponseType::Image),

        Intent::Recipe => {
            let dish = extract_food_name(message);
            let query = enhance_keywords(&dish, message);
            Plan::text("生成菜谱并展示图片")
                .with_tool("recipe_generator", params(json!({"dish_name": dish})))
                .with_tool("image_search", params(json!({"query": query})))
                .with_response_type(ResponseType::Recipe)
        }

        Intent::Recommendation => Plan::text("美食推荐")
            .with_tool("food_recommendation", params(json!({"preferences": {}, "count": 5})))
            .with_response_type(ResponseType::Recommendation),

        Intent::Location => {
            let keyword = PLACE_KEYWORDS
                .iter()
                .find(|k| message.contains(*k))
                .copied()
                .unwrap_or(DEFAULT_PLACE);
            Plan::text("搜索餐厅位置")
                .with_tool("amap_search", params(json!({"keyword": keyword})))
                .with_response_type(ResponseType::Location)
        }

        Intent::General => Plan::text(DEFAULT_INTENT),
    }
}
