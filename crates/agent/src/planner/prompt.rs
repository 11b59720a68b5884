//! Prompt text for planning and intent analysis.

use shihui_core::context::ConversationContext;
use shihui_core::tool::ToolMetadata;

const RECOGNITION_RULES: &str = "**重要识别规则：**
1. 如果用户提到\"图片\"、\"照片\"、\"看看\"、\"展示\"、\"搜索图片\"等关键词，必须使用image_search工具，参数名为query
2. 如果用户要求菜谱或做法，使用recipe_generator工具，参数名为dish_name
3. 如果用户询问餐厅位置，使用amap_search工具，参数名为keyword
4. 如果用户要求美食推荐，使用food_recommendation工具，参数名为preferences

**图片搜索query生成规则：**
- 分析用户需求，主动生成最优的搜索关键词（不是简单提取）
- 根据食物类型智能增强关键词以提高搜索效果
- 例如：\"给我看看红烧肉的图片\" → 生成query: \"红烧肉 美食 成品\"
- 例如：\"我想看看川菜的照片\" → 生成query: \"川菜 菜谱 特色菜\"
- 例如：\"展示一些意大利面的图片\" → 生成query: \"意大利面 pasta 美食\"";

const PLAN_LAYOUT: &str = "{
    \"intent\": \"用户意图描述\",
    \"tools\": [\"需要使用的工具列表\"],
    \"parameters\": {\"工具名\": {\"参数\": \"值\"}},
    \"response_type\": \"text/recipe/recommendation/location/image\"
}";

const DETAILED_PLAN_LAYOUT: &str = "{
    \"intent\": \"用户意图描述\",
    \"tools\": [\"需要使用的工具列表\"],
    \"parameters\": {\"工具名\": {\"参数\": \"值\"}},
    \"response_type\": \"text/recipe/recommendation/location/image\",
    \"strategy\": \"回答策略描述\",
    \"reasoning\": \"选择这个策略的原因\"
}";

/// One line per tool: name, description and parameters.
pub fn tool_catalog(tools: &[ToolMetadata]) -> String {
    tools
        .iter()
        .map(|tool| {
            let params: Vec<String> = tool
                .parameters
                .fields
                .iter()
                .map(|f| format!("{}({})", f.name, if f.required { "必需" } else { "可选" }))
                .collect();
            if params.is_empty() {
                format!("- {}: {}", tool.name, tool.description)
            } else {
                format!("- {}: {}【参数：{}】", tool.name, tool.description, params.join("，"))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn context_lines(context: &ConversationContext) -> String {
    let enabled: Vec<&str> = context.enabled_tools.iter().map(String::as_str).collect();
    format!(
        "用户偏好：{}\n当前位置：{}\n可用工具：{}",
        serde_json::Value::Object(context.preferences.clone()),
        context.location.as_deref().unwrap_or("未知"),
        if enabled.is_empty() { "全部".to_string() } else { enabled.join(", ") },
    )
}

/// System prompt asking for a JSON plan. `detailed` also asks for
/// `strategy` and `reasoning`.
pub fn planning_prompt(message: &str, context: &ConversationContext, tools: &[ToolMetadata], detailed: bool) -> String {
    let (task, layout) = if detailed {
        ("请分析用户的消息，制定详细的回答策略。", DETAILED_PLAN_LAYOUT)
    } else {
        ("请分析用户的消息，判断需要使用哪些工具来最好地回答用户的问题。", PLAN_LAYOUT)
    };
    format!(
        "你是美食AI助手的计划模块。{task}\n\n可用工具：\n{}\n\n{RECOGNITION_RULES}\n\n{}\n\n\
         请返回JSON格式的计划（必须严格按照JSON格式）：\n{layout}\n\n用户消息：{message}",
        tool_catalog(tools),
        context_lines(context),
    )
}

/// System prompt for the streamed intent analysis.
pub fn intent_prompt(message: &str, context: &ConversationContext) -> String {
    let enabled: Vec<&str> = context.enabled_tools.iter().map(String::as_str).collect();
    format!(
        "你是一个专业的美食AI助手，正在分析用户的问题。请详细分析用户的意图和需求。\n\n\
         用户的历史偏好：{}\n当前可用工具：{}\n\n\
         请按以下格式分析用户意图：\n\
         1. 用户的核心需求是什么？\n\
         2. 用户可能期望什么样的回答？\n\
         3. 这个问题的难度如何？\n\
         4. 需要哪些信息来回答这个问题？\n\n\
         请用简洁明了的语言分析，让用户能看懂你的思考过程。\n\n用户问题：{message}",
        serde_json::Value::Object(context.preferences.clone()),
        if enabled.is_empty() { "全部".to_string() } else { enabled.join(", ") },
    )
}

/// Shown in place of the intent analysis when the model is unreachable.
pub fn intent_fallback(message: &str) -> String {
    format!("我正在分析您的问题：「{message}」\n\n看起来您想了解美食相关的信息，让我为您查找相关资料。")
}
