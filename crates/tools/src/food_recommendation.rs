//! Food recommendation tool — picks dishes from a built-in dataset.
//!
//! Sources, in order: mood, current season, dietary restrictions and cooking
//! skill. Results are de-duplicated by dish name and capped at eight.

use async_trait::async_trait;
use chrono::Datelike;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::Serialize;
use shihui_core::error::ToolError;
use shihui_core::tool::{ParamKind, ParameterSchema, Tool, ToolCategory, ToolParams};

const MAX_RECOMMENDATIONS: usize = 8;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Difficulty {
    Easy,
    Medium,
    Hard,
}

struct Cuisine {
    name: &'static str,
    dishes: &'static [&'static str],
    difficulty: Difficulty,
}

const CUISINES: &[Cuisine] = &[
    Cuisine {
        name: "川菜",
        dishes: &["麻婆豆腐", "回锅肉", "宫保鸡丁", "鱼香肉丝", "水煮鱼", "麻辣香锅"],
        difficulty: Difficulty::Medium,
    },
    Cuisine {
        name: "粤菜",
        dishes: &["白切鸡", "烧鹅", "蒸排骨", "虾饺", "叉烧", "煲仔饭"],
        difficulty: Difficulty::Hard,
    },
    Cuisine {
        name: "湘菜",
        dishes: &["剁椒鱼头", "口味虾", "辣椒炒肉", "东安子鸡", "糖醋排骨"],
        difficulty: Difficulty::Medium,
    },
    Cuisine {
        name: "家常菜",
        dishes: &["番茄炒蛋", "青椒肉丝", "红烧肉", "糖醋里脊", "蒜蓉菠菜"],
        difficulty: Difficulty::Easy,
    },
];

const DIETARY: &[(&str, &[&str])] = &[
    ("素食", &["麻婆豆腐", "蒜蓉菠菜", "红烧茄子", "干煸四季豆"]),
    ("低热量", &["蒸蛋羹", "清蒸鱼", "白灼菜心", "冬瓜汤"]),
    ("高蛋白", &["白切鸡", "蒸蛋", "牛肉汤", "豆腐炖鱼"]),
    ("儿童适宜", &["番茄炒蛋", "蒸蛋羹", "胡萝卜炖牛肉", "玉米排骨汤"]),
];

const SEASONAL: &[(&str, &[&str])] = &[
    ("春季", &["春笋炒肉", "韭菜炒蛋", "菠菜汤", "豌豆尖"]),
    ("夏季", &["凉拌黄瓜", "冬瓜汤", "绿豆汤", "清蒸鱼"]),
    ("秋季", &["栗子烧鸡", "莲藕排骨汤", "银耳汤", "秋梨汤"]),
    ("冬季", &["羊肉汤", "红烧肉", "火锅", "炖牛肉"]),
];

const MOODS: &[(&str, &[&str])] = &[
    ("开心", &["糖醋排骨", "可乐鸡翅", "红烧肉", "蛋炒饭"]),
    ("减压", &["小米粥", "银耳汤", "蒸蛋羹", "绿茶"]),
    ("聚会", &["火锅", "烤肉", "麻辣香锅", "干锅"]),
    ("浪漫", &["红酒牛排", "三文鱼", "意面", "提拉米苏"]),
];

fn lookup(table: &'static [(&'static str, &'static [&'static str])], key: &str) -> Option<&'static [&'static str]> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

fn season_for_month(month: u32) -> &'static str {
    match month {
        3..=5 => "春季",
        6..=8 => "夏季",
        9..=11 => "秋季",
        _ => "冬季",
    }
}

fn dish_difficulty(dish: &str) -> &'static str {
    match dish {
        "番茄炒蛋" | "蒸蛋羹" | "青椒肉丝" => "简单",
        "烧鹅" | "叉烧" | "蒸排骨" => "困难",
        _ => "中等",
    }
}

fn cooking_time(dish: &str) -> &'static str {
    match dish {
        "番茄炒蛋" | "青椒肉丝" | "蒜蓉菠菜" => "15-20分钟",
        "红烧肉" | "炖牛肉" | "羊肉汤" => "1-2小时",
        _ => "30-45分钟",
    }
}

fn basic_ingredients(dish: &str) -> &'static [&'static str] {
    match dish {
        "番茄炒蛋" => &["鸡蛋", "番茄", "盐", "糖", "葱"],
        "麻婆豆腐" => &["豆腐", "肉末", "豆瓣酱", "花椒", "葱"],
        "宫保鸡丁" => &["鸡胸肉", "花生米", "青椒", "干辣椒", "生抽"],
        "红烧肉" => &["五花肉", "冰糖", "生抽", "老抽", "料酒"],
        _ => &["根据菜谱准备"],
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub dish_name: String,
    pub category: &'static str,
    pub reason: String,
    pub difficulty: &'static str,
    pub cooking_time: &'static str,
    pub ingredients: Vec<&'static str>,
    pub nutrition_score: u32,
    pub popularity: u32,
}

fn recommend<R: Rng + ?Sized>(rng: &mut R, dish: &str, category: &'static str, reason: String) -> Recommendation {
    Recommendation {
        dish_name: dish.to_string(),
        category,
        reason,
        difficulty: dish_difficulty(dish),
        cooking_time: cooking_time(dish),
        ingredients: basic_ingredients(dish).to_vec(),
        nutrition_score: rng.random_range(70..=95),
        popularity: rng.random_range(60..=100),
    }
}

/// Inputs the generator understands.
#[derive(Debug, Default)]
pub struct RecommendationRequest {
    pub mood: Option<String>,
    pub dietary_restrictions: Vec<String>,
    pub skill_level: String,
}

impl RecommendationRequest {
    fn from_params(params: &ToolParams) -> Self {
        Self {
            mood: params.get("mood").and_then(|v| v.as_str()).map(String::from),
            dietary_restrictions: params
                .get("dietary_restrictions")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default(),
            skill_level: params
                .get("skill_level")
                .and_then(|v| v.as_str())
                .unwrap_or("medium")
                .to_string(),
        }
    }
}

/// Produce up to eight unique recommendations.
pub fn generate<R: Rng + ?Sized>(request: &RecommendationRequest, month: u32, rng: &mut R) -> Vec<Recommendation> {
    let mut recs = Vec::new();

    if let Some(foods) = request.mood.as_deref().and_then(|m| lookup(MOODS, m)) {
        let mood = request.mood.as_deref().unwrap_or_default();
        for food in foods.iter().take(2) {
            recs.push(recommend(rng, food, "心情推荐", format!("适合{mood}时享用")));
        }
    }

    let season = season_for_month(month);
    if let Some(foods) = lookup(SEASONAL, season) {
        let picked: Vec<&&str> = foods.choose_multiple(rng, 2).collect();
        for food in picked {
            recs.push(recommend(rng, food, "时令推荐", format!("{season}时令美食")));
        }
    }

    for restriction in &request.dietary_restrictions {
        if let Some(foods) = lookup(DIETARY, restriction) {
            for food in foods.iter().take(2) {
                recs.push(recommend(rng, food, "健康推荐", format!("适合{restriction}饮食")));
            }
        }
    }

    let max_difficulty = match request.skill_level.as_str() {
        "easy" => Some(Difficulty::Easy),
        "medium" => Some(Difficulty::Medium),
        "hard" => Some(Difficulty::Hard),
        _ => None,
    };
    if let Some(max) = max_difficulty {
        let picks: Vec<&str> = CUISINES
            .iter()
            .filter(|c| c.difficulty <= max)
            .filter_map(|c| c.dishes.choose(rng).copied())
            .take(3)
            .collect();
        for dish in picks {
            recs.push(recommend(rng, dish, "技能推荐", format!("适合{}水平制作", request.skill_level)));
        }
    }

    let mut seen = std::collections::HashSet::new();
    recs.retain(|r| seen.insert(r.dish_name.clone()));
    recs.truncate(MAX_RECOMMENDATIONS);
    recs
}

pub struct FoodRecommendationTool;

#[async_trait]
impl Tool for FoodRecommendationTool {
    fn name(&self) -> &str {
        "food_recommendation"
    }

    fn description(&self) -> &str {
        "智能美食推荐工具，基于用户偏好推荐美食"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::new()
            .optional("preferences", ParamKind::Object, "用户偏好设置")
            .optional("weather", ParamKind::String, "当前天气情况")
            .optional("mood", ParamKind::String, "当前心情: 开心/减压/聚会/浪漫")
            .optional("dietary_restrictions", ParamKind::Array, "饮食限制: 素食/低热量/高蛋白/儿童适宜")
            .optional("skill_level", ParamKind::String, "烹饪技能水平: easy/medium/hard")
            .optional("occasion", ParamKind::String, "用餐场合")
            .optional("count", ParamKind::Integer, "推荐数量")
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Recommendation
    }

    async fn execute(&self, params: &ToolParams) -> Result<serde_json::Value, ToolError> {
        let request = RecommendationRequest::from_params(params);
        let month = chrono::Local::now().month();
        let recommendations = generate(&request, month, &mut rand::rng());

        Ok(serde_json::json!({
            "success": true,
            "total_count": recommendations.len(),
            "recommendations": recommendations,
            "generated_at": chrono::Local::now().to_rfc3339(),
        }))
    }
}
