//! Result enricher — turns raw tool outcomes into display envelopes.
//!
//! Pure and idempotent: a payload that already is an envelope comes back
//! unchanged.

use serde_json::{Map, Value, json};
use shihui_core::display::{DisplayEnvelope, DisplayType};
use shihui_core::tool::ToolOutcome;

fn field<'a>(payload: &'a Value, key: &str) -> Option<&'a Value> {
    payload.get(key).filter(|v| !v.is_null())
}

fn array(payload: &Value, key: &str) -> Vec<Value> {
    field(payload, key).and_then(Value::as_array).cloned().unwrap_or_default()
}

fn string(payload: &Value, key: &str) -> Value {
    field(payload, key).cloned().unwrap_or_else(|| json!(""))
}

/// Recommendation categories in first-seen order.
fn categories(recommendations: &[Value]) -> Vec<Value> {
    let mut seen: Vec<Value> = Vec::new();
    for category in recommendations.iter().filter_map(|r| field(r, "category")) {
        if !seen.contains(category) {
            seen.push(category.clone());
        }
    }
    seen
}

fn image_gallery(payload: &Value) -> (DisplayType, Value, Value) {
    let images = array(payload, "images");
    let mut data = json!({
        "images": images,
        "total": images.len(),
        "query": string(payload, "query"),
    });
    if images.is_empty() {
        data["message"] = field(payload, "message").cloned().unwrap_or_else(|| json!("未找到图片"));
    }
    let config = json!({"layout": "grid", "columns": 3, "show_modal": true, "lazy_load": true});
    (DisplayType::ImageGallery, config, data)
}

fn recommendation_cards(payload: &Value) -> (DisplayType, Value, Value) {
    let recommendations = array(payload, "recommendations");
    let total = field(payload, "total_count").cloned().unwrap_or_else(|| json!(recommendations.len()));
    let data = json!({
        "categories": categories(&recommendations),
        "recommendations": recommendations,
        "total_count": total,
    });
    let config = json!({"layout": "card_grid", "show_ratings": true, "show_difficulty": true, "interactive": true});
    (DisplayType::RecommendationCards, config, data)
}

fn recipe_detailed(payload: &Value) -> (DisplayType, Value, Value) {
    let recipe = field(payload, "data").cloned().unwrap_or_else(|| json!({}));
    let data = json!({
        "metadata": {
            "prep_time": string(&recipe, "prep_time"),
            "cook_time": string(&recipe, "cook_time"),
            "difficulty": string(&recipe, "difficulty"),
            "serving_size": string(&recipe, "serving_size"),
        },
        "recipe": recipe,
    });
    let config = json!({
        "layout": "detailed_card",
        "show_nutrition": true,
        "show_steps": true,
        "interactive": true,
        "printable": true,
    });
    (DisplayType::RecipeDetailed, config, data)
}

fn location_list(payload: &Value) -> (DisplayType, Value, Value) {
    let mut locations = array(payload, "locations");
    if locations.is_empty() {
        locations = array(payload, "results");
    }
    let data = json!({
        "total_found": locations.len(),
        "locations": locations,
        "search_query": string(payload, "query"),
    });
    let config = json!({"layout": "list_with_map", "show_distance": true, "show_rating": true, "interactive": true});
    (DisplayType::LocationList, config, data)
}

fn weather_card(payload: &Value) -> (DisplayType, Value, Value) {
    let data = json!({
        "weather": field(payload, "weather").cloned().unwrap_or_else(|| json!({})),
        "food_suggestions": array(payload, "food_suggestions"),
        "location": string(payload, "location"),
    });
    let config = json!({
        "layout": "card_with_suggestions",
        "show_temperature": true,
        "show_suggestions": true,
        "animated": true,
    });
    (DisplayType::WeatherCard, config, data)
}

fn search_results(payload: &Value) -> (DisplayType, Value, Value) {
    let data = json!({
        "results": array(payload, "results"),
        "query": string(payload, "query"),
        "total_results": field(payload, "total_results").cloned().unwrap_or_else(|| json!(0)),
    });
    let config = json!({"layout": "compact_list", "show_snippets": true, "max_results": 5});
    (DisplayType::SearchResults, config, data)
}

/// Build the display envelope for one tool outcome.
pub fn enrich(tool_name: &str, outcome: &ToolOutcome) -> DisplayEnvelope {
    if !outcome.success {
        return DisplayEnvelope {
            tool_name: tool_name.to_string(),
            display_type: DisplayType::Error,
            display_config: Value::Object(Map::new()),
            display_data: json!({"error": outcome.error.clone().unwrap_or_default()}),
        };
    }

    let raw = outcome.result.clone().unwrap_or(Value::Null);
    let payload = match raw.get("result") {
        Some(inner) if inner.is_object() => inner.clone(),
        _ => raw.clone(),
    };

    if let Some(envelope) = DisplayEnvelope::from_payload(tool_name, &payload) {
        return envelope;
    }

    let (display_type, display_config, display_data) = match tool_name {
        "image_search" => image_gallery(&payload),
        "food_recommendation" => recommendation_cards(&payload),
        "recipe_generator" => recipe_detailed(&payload),
        "amap_search" => location_list(&payload),
        "weather_api" => weather_card(&payload),
        "bing_search" => search_results(&payload),
        _ => (DisplayType::SimpleText, json!({"layout": "plain", "format": "json"}), raw),
    };

    DisplayEnvelope {
        tool_name: tool_name.to_string(),
        display_type,
        display_config,
        display_data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(name: &str, payload: Value) -> ToolOutcome {
        ToolOutcome::ok(name, payload, 0.1)
    }

    #[test]
    fn image_gallery_counts_images() {
        let env = enrich(
            "image_search",
            &ok("image_search", json!({"query": "红烧肉", "images": [{"url": "a.jpg"}, {"url": "b.jpg"}]})),
        );
        assert_eq!(env.display_type, DisplayType::ImageGallery);
        assert_eq!(env.display_data["total"], 2);
        assert_eq!(env.display_data["query"], "红烧肉");
        assert!(env.display_data.get("message").is_none());
        assert_eq!(env.display_config["columns"], 3);
    }

    #[test]
    fn empty_gallery_gets_message() {
        let env = enrich("image_search", &ok("image_search", json!({"query": "x"})));
        assert_eq!(env.display_data["images"], json!([]));
        assert_eq!(env.display_data["total"], 0);
        assert_eq!(env.display_data["message"], "未找到图片");
    }

    #[test]
    fn recommendation_categories_in_first_seen_order() {
        let env = enrich(
            "food_recommendation",
            &ok(
                "food_recommendation",
                json!({"total_count": 3, "recommendations": [
                    {"dish_name": "麻婆豆腐", "category": "川菜"},
                    {"dish_name": "白切鸡", "category": "粤菜"},
                    {"dish_name": "回锅肉", "category": "川菜"}
                ]}),
            ),
        );
        assert_eq!(env.display_data["categories"], json!(["川菜", "粤菜"]));
        assert_eq!(env.display_data["total_count"], 3);
    }

    #[test]
    fn recipe_metadata_from_nested_result() {
        let env = enrich(
            "recipe_generator",
            &ok(
                "recipe_generator",
                json!({"result": {"success": true, "data": {"dish_name": "红烧肉", "prep_time": "15", "difficulty": "中等"}}}),
            ),
        );
        assert_eq!(env.display_type, DisplayType::RecipeDetailed);
        assert_eq!(env.display_data["recipe"]["dish_name"], "红烧肉");
        assert_eq!(env.display_data["metadata"]["prep_time"], "15");
        assert_eq!(env.display_data["metadata"]["cook_time"], "");
    }

    #[test]
    fn recipe_without_data_has_empty_defaults() {
        let env = enrich("recipe_generator", &ok("recipe_generator", json!({})));
        assert_eq!(env.display_data["recipe"], json!({}));
        assert_eq!(env.display_data["metadata"]["serving_size"], "");
    }

    #[test]
    fn location_list_falls_back_to_results() {
        let env = enrich(
            "amap_search",
            &ok("amap_search", json!({"query": "火锅", "results": [{"name": "老火锅"}]})),
        );
        assert_eq!(env.display_type, DisplayType::LocationList);
        assert_eq!(env.display_data["total_found"], 1);
        assert_eq!(env.display_data["search_query"], "火锅");
    }

    #[test]
    fn tool_supplied_envelope_is_kept() {
        let payload = json!({
            "success": true,
            "display_type": "location_list",
            "display_data": {"total_found": 0, "locations": [], "search_query": "川菜"},
            "display_config": {"show_map_links": true}
        });
        let env = enrich("amap_search", &ok("amap_search", payload));
        assert_eq!(env.display_config, json!({"show_map_links": true}));
        assert_eq!(env.display_data["search_query"], "川菜");
    }

    #[test]
    fn weather_and_search_defaults() {
        let env = enrich("weather_api", &ok("weather_api", json!({"display_type": "weather_card", "location": "长沙"})));
        assert_eq!(env.display_type, DisplayType::WeatherCard);
        assert_eq!(env.display_data["weather"], json!({}));
        assert_eq!(env.display_data["location"], "长沙");

        let env = enrich("bing_search", &ok("bing_search", json!({})));
        assert_eq!(env.display_data["total_results"], 0);
        assert_eq!(env.display_data["results"], json!([]));
    }

    #[test]
    fn unknown_tool_is_simple_text() {
        let payload = json!({"answer": 42});
        let env = enrich("calculator", &ok("calculator", payload.clone()));
        assert_eq!(env.display_type, DisplayType::SimpleText);
        assert_eq!(env.display_data, payload);
    }

    #[test]
    fn unknown_tool_keeps_wrapped_payload() {
        let raw = json!({"success": true, "result": {"answer": 42}});
        let env = enrich("calculator", &ok("calculator", raw.clone()));
        assert_eq!(env.display_type, DisplayType::SimpleText);
        assert_eq!(env.display_data, raw);
    }

    #[test]
    fn failure_maps_to_error() {
        let outcome = ToolOutcome::failed("weather_api", "未配置 OPENWEATHER_API_KEY", 0.0);
        let env = enrich("weather_api", &outcome);
        assert_eq!(env.display_type, DisplayType::Error);
        assert_eq!(env.display_data["error"], "未配置 OPENWEATHER_API_KEY");
    }

    #[test]
    fn enrichment_is_idempotent() {
        let cases = [
            ("image_search", json!({"images": [], "query": "q"})),
            ("food_recommendation", json!({"recommendations": [{"category": "川菜"}]})),
            ("recipe_generator", json!({"data": {"prep_time": "10"}})),
            ("weather_api", json!({"weather": {"temperature": "20°C"}})),
            ("bing_search", json!({"results": [], "query": "q"})),
            ("custom", json!({"k": "v"})),
        ];
        for (name, payload) in cases {
            let once = enrich(name, &ok(name, payload));
            let twice = enrich(name, &ok(name, serde_json::to_value(&once).unwrap()));
            assert_eq!(once, twice, "{name}");
        }
    }
}
