//! Recipe generator — asks the selected model for a structured recipe.
//!
//! The reply is expected to contain a JSON object; anything else is wrapped
//! into a minimal recipe. When no model is reachable a fixed template is
//! returned instead, so this tool only fails on missing parameters.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use shihui_core::error::ToolError;
use shihui_core::message::Message;
use shihui_core::tool::{ParamKind, ParameterSchema, Tool, ToolCategory, ToolParams};
use shihui_providers::ModelRouter;
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = "你是一位专业的烹饪大师和营养专家，擅长创作详细的菜谱。";
const MAX_RECIPE_TOKENS: u32 = 2500;

const JSON_LAYOUT: &str = r#"
请按以下JSON格式生成菜谱：

{
    "dish_name": "菜名",
    "description": "菜品简介",
    "prep_time": "准备时间（分钟）",
    "cook_time": "烹饪时间（分钟）",
    "total_time": "总时间（分钟）",
    "difficulty": "难度等级",
    "serving_size": "份数",
    "ingredients": [
        {"name": "食材名称", "amount": "用量", "unit": "单位", "notes": "备注（可选）"}
    ],
    "equipment": ["所需厨具"],
    "steps": [
        {"step_number": 1, "instruction": "详细步骤说明", "time": "此步骤耗时", "tips": "小贴士（可选）"}
    ],
    "tips_and_variations": ["制作技巧和变化建议"],
    "storage_tips": "保存方法",
    "nutrition_highlights": "营养特点"
}

请确保菜谱详细、实用，步骤清晰易懂。"#;

/// What to cook and for whom.
#[derive(Debug, Clone)]
pub struct RecipeRequest {
    pub dish_name: String,
    pub cuisine_type: String,
    pub difficulty: String,
    pub serving_size: u64,
    pub dietary_restrictions: Vec<String>,
    pub available_ingredients: Vec<String>,
    pub model_id: Option<String>,
}

fn string_list(params: &ToolParams, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

fn string_or(params: &ToolParams, key: &str, default: &str) -> String {
    params
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

impl RecipeRequest {
    fn from_params(params: &ToolParams) -> Self {
        Self {
            dish_name: string_or(params, "dish_name", "家常菜"),
            cuisine_type: string_or(params, "cuisine_type", "家常菜"),
            difficulty: string_or(params, "difficulty", "简单"),
            serving_size: params
                .get("serving_size")
                .and_then(Value::as_u64)
                .unwrap_or(2)
                .clamp(1, 10),
            dietary_restrictions: string_list(params, "dietary_restrictions"),
            available_ingredients: string_list(params, "available_ingredients"),
            model_id: params
                .get("model_id")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from),
        }
    }

    fn prompt(&self) -> String {
        let mut prompt = format!(
            "请为\"{}\"生成一份详细的菜谱。要求如下：\n\n基本信息：\n- 菜系：{}\n- 难度：{}\n- 份数：{}人份\n",
            self.dish_name, self.cuisine_type, self.difficulty, self.serving_size
        );
        if !self.dietary_restrictions.is_empty() {
            prompt.push_str(&format!("- 饮食限制：{}\n", self.dietary_restrictions.join(", ")));
        }
        if !self.available_ingredients.is_empty() {
            prompt.push_str(&format!("- 优先使用食材：{}\n", self.available_ingredients.join(", ")));
        }
        prompt.push_str(JSON_LAYOUT);
        prompt
    }
}

fn now() -> String {
    chrono::Local::now().to_rfc3339()
}

fn parse_recipe(text: &str, dish_name: &str) -> Value {
    match shihui_core::json::extract_object(text) {
        Some(mut recipe) => {
            recipe.insert("generated_time".into(), json!(now()));
            recipe.insert("source".into(), json!("AI生成"));
            Value::Object(recipe)
        }
        None => {
            warn!(dish_name, "Recipe reply was not JSON, wrapping raw text");
            manual_recipe(text, dish_name)
        }
    }
}

fn manual_recipe(text: &str, dish_name: &str) -> Value {
    let instruction = if text.chars().count() > 200 {
        format!("{}...", text.chars().take(200).collect::<String>())
    } else {
        text.to_string()
    };
    json!({
        "dish_name": dish_name,
        "description": format!("{dish_name}的详细制作方法"),
        "prep_time": "15",
        "cook_time": "30",
        "total_time": "45",
        "difficulty": "中等",
        "serving_size": "2-3",
        "ingredients": [{"name": "主料", "amount": "适量", "unit": "", "notes": "根据配方调整"}],
        "equipment": ["炒锅", "锅铲", "菜板", "刀具"],
        "steps": [{
            "step_number": 1,
            "instruction": instruction,
            "time": "按步骤进行",
            "tips": "请参考详细说明"
        }],
        "tips_and_variations": ["根据个人口味调整调料"],
        "storage_tips": "密封保存，及时食用",
        "nutrition_highlights": "营养丰富，搭配均衡",
        "generated_time": now(),
        "source": "AI生成"
    })
}

/// Template used when no model could produce a recipe.
pub fn default_recipe(dish_name: &str) -> Value {
    json!({
        "dish_name": dish_name,
        "description": format!("经典{dish_name}制作方法"),
        "prep_time": "15",
        "cook_time": "30",
        "total_time": "45",
        "difficulty": "中等",
        "serving_size": "2-3",
        "ingredients": [{"name": "主要食材", "amount": "适量", "unit": "", "notes": "根据实际情况调整"}],
        "equipment": ["基本厨具"],
        "steps": [{
            "step_number": 1,
            "instruction": "抱歉，菜谱生成暂时不可用，请稍后再试或寻找其他资源。",
            "time": "",
            "tips": ""
        }],
        "tips_and_variations": ["可根据个人喜好调整"],
        "storage_tips": "常温保存，及时食用",
        "nutrition_highlights": "营养丰富",
        "nutrition": {"per_serving": {"calories": "适量"}, "notes": "数据暂不可用"},
        "generated_time": now(),
        "source": "默认模板",
        "status": "fallback"
    })
}

/// Rough per-serving figures from ingredient names.
pub fn estimate_nutrition(ingredients: &[Value]) -> Value {
    let (mut calories, mut protein, mut carbs, mut fat) = (0u32, 0u32, 0u32, 0u32);

    for ingredient in ingredients {
        let name = ingredient
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| name.contains(w));

        if has(&["肉", "鸡", "鱼", "虾", "蛋"]) {
            calories += 150;
            protein += 20;
            fat += 8;
        } else if has(&["菜", "瓜", "豆", "笋"]) {
            calories += 25;
            protein += 2;
            carbs += 5;
        } else if has(&["米", "面", "粉", "饼"]) {
            calories += 100;
            carbs += 20;
            protein += 3;
        } else {
            calories += 50;
            carbs += 8;
        }
    }

    json!({
        "per_serving": {
            "calories": format!("{calories}大卡"),
            "protein": format!("{protein}g"),
            "carbohydrates": format!("{carbs}g"),
            "fat": format!("{fat}g"),
            "fiber": "适量",
            "sodium": "根据调料而定"
        },
        "health_benefits": ["提供优质蛋白质", "富含维生素和矿物质", "营养搭配均衡"],
        "notes": "营养数据为估算值，具体数值可能因食材品质和制作方法而异"
    })
}

pub struct RecipeGeneratorTool {
    router: Arc<ModelRouter>,
}

impl RecipeGeneratorTool {
    pub fn new(router: Arc<ModelRouter>) -> Self {
        Self { router }
    }

    async fn generate(&self, request: &RecipeRequest) -> Value {
        let Some(route) = self.router.resolve(request.model_id.as_deref()) else {
            warn!("No model available, using default recipe");
            return default_recipe(&request.dish_name);
        };
        info!(model_id = %route.id, dish_name = %request.dish_name, "Generating recipe");

        let messages = vec![Message::system(SYSTEM_PROMPT), Message::user(request.prompt())];
        let provider_request = route
            .request(messages)
            .with_max_tokens(route.max_tokens.min(MAX_RECIPE_TOKENS));

        let text = match route.provider.complete(provider_request).await {
            Ok(response) => response.message.content,
            Err(e) => {
                warn!(model_id = %route.id, error = %e, "Recipe generation failed, using default recipe");
                return default_recipe(&request.dish_name);
            }
        };

        let mut recipe = parse_recipe(&text, &request.dish_name);
        let ingredients = recipe
            .get("ingredients")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if let Some(map) = recipe.as_object_mut() {
            map.insert("nutrition".into(), estimate_nutrition(&ingredients));
            map.insert("generated_by".into(), json!(route.display_name));
            map.insert("model_id".into(), json!(route.id));
        }
        recipe
    }
}

#[async_trait]
impl Tool for RecipeGeneratorTool {
    fn name(&self) -> &str {
        "recipe_generator"
    }

    fn description(&self) -> &str {
        "AI菜谱生成工具，使用用户选择的默认模型生成详细的烹饪菜谱"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::new()
            .required("dish_name", ParamKind::String, "要生成菜谱的菜名")
            .optional("cuisine_type", ParamKind::String, "菜系类型")
            .optional("difficulty", ParamKind::String, "难度等级: 简单/中等/困难")
            .optional("serving_size", ParamKind::Integer, "份数 (1-10)")
            .optional("dietary_restrictions", ParamKind::Array, "饮食限制（如素食、无糖等）")
            .optional("available_ingredients", ParamKind::Array, "可用的食材列表")
            .optional("model_id", ParamKind::String, "指定使用的模型ID，缺省时使用默认模型")
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Recipe
    }

    async fn execute(&self, params: &ToolParams) -> Result<Value, ToolError> {
        let request = RecipeRequest::from_params(params);
        let recipe = self.generate(&request).await;

        Ok(json!({
            "success": true,
            "tool_name": self.name(),
            "data": recipe,
            "message": format!("成功生成{}的详细菜谱", request.dish_name),
        }))
    }
}
