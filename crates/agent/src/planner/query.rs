//! Image-search query generation from a free-form message.
//!
//! A food term is isolated by stripping filler words, then expanded with
//! qualifiers that make image results more relevant.

const PUNCTUATION: &[char] = &[
    '，', '。', '！', '？', '：', '；', '“', '”', '‘', '’', '（', '）', '【', '】', '[', ']', '(',
    ')', ',', '.', '!', '?', ':', ';', '"', '\'', '-',
];

/// Removed in order; longer phrases come before their fragments.
const STOP_WORDS: &[&str] = &[
    "给我看看", "我想看看", "请搜索", "能给我", "麻烦给", "能否给我",
    "给我", "帮我", "我想", "请", "能否", "可以", "麻烦", "能",
    "看看", "展示", "显示", "搜索", "找", "查找", "瞧瞧", "看",
    "图片", "照片", "图像", "图", "相片", "照",
    "一些", "几张", "几个", "一点", "几种", "一张", "一下", "成品", "制作",
    "的", "了", "吗", "呢", "吧", "啊", "呀",
];

/// Character classes tried in order when stripping leaves too little:
/// meat, seafood and egg, vegetable, staple, dessert, tofu.
const FOOD_CLASSES: &[&[char]] = &[
    &['肉'],
    &['鱼', '虾', '蟹', '蛋'],
    &['菜'],
    &['汤', '粥', '面', '条', '饭'],
    &['糖', '饼', '干', '蛋', '糕'],
    &['豆', '腐'],
];

const DEFAULT_FOOD: &str = "美食";
const MAX_FOOD_CHARS: usize = 8;

const CURATED: &[(&str, &str)] = &[
    ("红烧肉", "红烧肉 家常菜 美食"),
    ("宫保鸡丁", "宫保鸡丁 川菜 经典"),
    ("麻婆豆腐", "麻婆豆腐 川菜 豆腐"),
    ("糖醋里脊", "糖醋里脊 酸甜 家常菜"),
    ("回锅肉", "回锅肉 川菜 家常"),
    ("鱼香肉丝", "鱼香肉丝 川菜 下饭菜"),
    ("川菜", "川菜 四川菜 麻辣"),
    ("粤菜", "粤菜 广东菜 清淡"),
    ("湘菜", "湘菜 湖南菜 辣椒"),
    ("鲁菜", "鲁菜 山东菜 传统"),
    ("意大利面", "意大利面 pasta 西餐"),
    ("牛排", "牛排 steak 西餐"),
    ("寿司", "寿司 日本料理 生鱼片"),
    ("拉面", "拉面 日式 汤面"),
    ("披萨", "披萨 pizza 西餐"),
    ("蛋糕", "蛋糕 甜品 烘焙"),
    ("奶茶", "奶茶 饮品 珍珠"),
    ("冰淇淋", "冰淇淋 甜品 夏季"),
    ("包子", "包子 早餐 蒸"),
    ("饺子", "饺子 传统 面食"),
    ("面条", "面条 主食 汤面"),
    ("米饭", "米饭 主食 搭配"),
];

/// Lexical category of a food term and the qualifiers it gets.
const CATEGORIES: &[(&[&str], &str)] = &[
    (&["肉", "鸡", "鸭", "鱼", "虾", "蟹"], "美食 荤菜"),
    (&["菜", "豆腐", "萝卜", "土豆"], "蔬菜 家常菜"),
    (&["面", "饭", "粥", "包子", "饺子"], "主食 传统"),
    (&["汤", "羹"], "汤品 营养"),
    (&["糕", "饼", "甜"], "甜品 烘焙"),
];
const GENERIC_QUALIFIER: &str = "美食 菜谱";

/// What the user wants to see; at most one suffix is added.
const CONTEXT_SUFFIXES: &[(&[&str], &str)] = &[
    (&["做法", "制作", "步骤"], "制作过程"),
    (&["成品", "完成", "最终"], "成品图"),
    (&["材料", "食材"], "食材"),
];

fn is_cjk(c: char) -> bool {
    ('一'..='龯').contains(&c)
}

/// Longest run of CJK characters that contains a character from `class`.
fn longest_run_with(message: &str, class: &[char]) -> Option<String> {
    let mut best: Option<String> = None;
    let mut run = String::new();
    let mut hit = false;

    let mut close = |run: &mut String, hit: &mut bool| {
        if *hit && best.as_ref().is_none_or(|b| run.chars().count() > b.chars().count()) {
            best = Some(run.clone());
        }
        run.clear();
        *hit = false;
    };

    for c in message.chars() {
        if is_cjk(c) {
            run.push(c);
            hit |= class.contains(&c);
        } else {
            close(&mut run, &mut hit);
        }
    }
    close(&mut run, &mut hit);
    best
}

/// Isolate the food term in a message, e.g. "给我看看红烧肉的图片" → "红烧肉".
pub fn extract_food_name(message: &str) -> String {
    let mut cleaned: String = message.trim().chars().filter(|c| !PUNCTUATION.contains(c)).collect();
    for word in STOP_WORDS {
        cleaned = cleaned.replace(word, "");
    }
    cleaned.retain(|c| !c.is_whitespace());

    if cleaned.chars().count() < 2 {
        if let Some(found) = FOOD_CLASSES
            .iter()
            .filter_map(|class| longest_run_with(message, class))
            .find(|run| run.chars().count() >= 2)
        {
            cleaned = found;
        }
    }

    if cleaned.chars().count() < 2 {
        return DEFAULT_FOOD.to_string();
    }
    cleaned.chars().take(MAX_FOOD_CHARS).collect()
}

/// Expand a food term into an image-search query.
///
/// Curated terms are returned as-is. Others get category qualifiers and, when
/// the message asks for it, one context suffix.
pub fn enhance_keywords(food: &str, message: &str) -> String {
    if let Some((_, curated)) = CURATED.iter().find(|(name, _)| *name == food) {
        return curated.to_string();
    }

    let qualifier = CATEGORIES
        .iter()
        .find(|(words, _)| words.iter().any(|w| food.contains(w)))
        .map_or(GENERIC_QUALIFIER, |(_, q)| q);
    let mut query = format!("{food} {qualifier}");

    if let Some((_, suffix)) = CONTEXT_SUFFIXES
        .iter()
        .find(|(words, _)| words.iter().any(|w| message.contains(w)))
    {
        query.push(' ');
        query.push_str(suffix);
    }
    query
}

/// Image-search query for a message.
pub fn image_query(message: &str) -> String {
    enhance_keywords(&extract_food_name(message), message)
}
