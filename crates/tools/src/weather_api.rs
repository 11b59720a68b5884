//! Weather tool — OpenWeather current conditions and forecast, plus
//! dishes that suit the weather.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use shihui_core::error::ToolError;
use shihui_core::tool::{ParamKind, ParameterSchema, Tool, ToolCategory, ToolParams};
use tracing::{info, warn};

const CURRENT_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
const FORECAST_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";
pub const DEFAULT_CITY: &str = "Changsha,CN";
const MAX_SUGGESTIONS: usize = 4;
const FORECAST_SLOTS: usize = 8;

const DIRECTIONS: [&str; 8] = ["北风", "东北风", "东风", "东南风", "南风", "西南风", "西风", "西北风"];

/// Map a wind bearing in degrees to one of eight compass directions.
pub fn wind_direction(deg: f64) -> &'static str {
    let index = ((deg.rem_euclid(360.0) + 22.5) / 45.0) as usize % 8;
    DIRECTIONS[index]
}

/// Up to four dishes for the given conditions and temperature (°C).
pub fn food_suggestions(description: &str, temperature: f64) -> Vec<&'static str> {
    let mut suggestions: Vec<&'static str> = if temperature < 10.0 {
        vec!["热汤面条", "麻辣火锅", "红烧肉", "羊肉汤"]
    } else if temperature > 30.0 {
        vec!["冰镇啤酒", "凉面", "冰淇淋", "冷饮"]
    } else {
        vec!["时令蔬菜", "清爽小菜", "温热汤品"]
    };

    let desc = description.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| desc.contains(w));
    if mentions(&["rain", "雨", "drizzle", "shower"]) {
        suggestions.extend(["热茶", "暖胃粥品", "温补汤品"]);
    } else if mentions(&["clear", "晴", "sunny"]) {
        suggestions.extend(["户外烧烤", "清爽沙拉", "新鲜果汁"]);
    } else if mentions(&["snow", "雪", "sleet"]) {
        suggestions.extend(["热乎火锅", "温热饮品", "滋补炖品"]);
    } else if mentions(&["cloud", "云", "overcast"]) {
        suggestions.extend(["温和汤品", "舒适茶饮", "营养餐点"]);
    }

    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}

#[derive(Debug, Default, Deserialize)]
struct Main {
    temp: Option<f64>,
    feels_like: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Condition {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Default, Deserialize)]
struct Wind {
    #[serde(default)]
    speed: f64,
    #[serde(default)]
    deg: f64,
}

#[derive(Debug, Default, Deserialize)]
struct Sys {
    #[serde(default)]
    country: String,
}

#[derive(Debug, Deserialize)]
struct Coord {
    lat: f64,
    lon: f64,
}

/// One observation, shared by the current and forecast endpoints.
#[derive(Debug, Default, Deserialize)]
struct Observation {
    main: Option<Main>,
    #[serde(default)]
    weather: Vec<Condition>,
    #[serde(default)]
    wind: Wind,
    visibility: Option<f64>,
    dt_txt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CurrentReply {
    #[serde(flatten)]
    observation: Observation,
    #[serde(default)]
    name: String,
    #[serde(default)]
    sys: Sys,
    coord: Option<Coord>,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ForecastCity {
    #[serde(default)]
    name: String,
    #[serde(default)]
    country: String,
}

#[derive(Debug, Deserialize)]
struct ForecastReply {
    list: Option<Vec<Observation>>,
    #[serde(default)]
    city: ForecastCity,
    message: Option<String>,
}

fn fmt_reading(value: Option<f64>, unit: &str, precision: usize) -> String {
    match value {
        Some(v) => format!("{v:.precision$}{unit}"),
        None => format!("--{unit}"),
    }
}

impl Observation {
    fn description(&self) -> &str {
        self.weather.first().map_or("", |c| c.description.as_str())
    }

    fn temperature(&self) -> Option<f64> {
        self.main.as_ref().and_then(|m| m.temp)
    }

    fn weather_card(&self, report_time: &str) -> Value {
        let main = self.main.as_ref();
        let mut card = json!({
            "temperature": fmt_reading(self.temperature(), "°C", 1),
            "humidity": fmt_reading(main.and_then(|m| m.humidity), "%", 0),
            "wind_direction": wind_direction(self.wind.deg),
            "wind_power": format!("{:.1} m/s", self.wind.speed),
            "description": self.description(),
            "feels_like": fmt_reading(main.and_then(|m| m.feels_like), "°C", 1),
            "pressure": fmt_reading(main.and_then(|m| m.pressure), " hPa", 0),
            "report_time": report_time,
        });
        if let Some(visibility) = self.visibility {
            card["visibility"] = json!(format!("{visibility:.0} m"));
        }
        card
    }

    fn suggestions(&self) -> Vec<&'static str> {
        food_suggestions(self.description(), self.temperature().unwrap_or(20.0))
    }
}

fn current_result(reply: CurrentReply) -> Result<Value, String> {
    if reply.observation.main.is_none() {
        return Err(reply.message.unwrap_or_else(|| "未知错误".into()));
    }

    let mut city = reply.name;
    if city.is_empty() {
        city = match &reply.coord {
            Some(c) => format!("经纬度({}, {})", c.lat, c.lon),
            None => "长沙".into(),
        };
    }
    if !reply.sys.country.is_empty() && reply.sys.country != "CN" {
        city = format!("{city}, {}", reply.sys.country);
    }

    let obs = &reply.observation;
    Ok(json!({
        "success": true,
        "display_type": "weather_card",
        "city": city,
        "location": city,
        "province": "",
        "weather": obs.weather_card("当前"),
        "food_suggestions": obs.suggestions(),
    }))
}

fn forecast_result(reply: ForecastReply) -> Result<Value, String> {
    let Some(list) = reply.list else {
        return Err(reply.message.unwrap_or_else(|| "未知错误".into()));
    };
    let Some(today) = list.first() else {
        return Err("未获取到预报数据".into());
    };

    let mut city = if reply.city.name.is_empty() { "未知城市".to_string() } else { reply.city.name };
    if !reply.city.country.is_empty() {
        city = format!("{city}, {}", reply.city.country);
    }

    let split = |obs: &Observation| -> (String, String) {
        let txt = obs.dt_txt.as_deref().unwrap_or_default();
        let mut parts = txt.splitn(2, ' ');
        (
            parts.next().unwrap_or_default().to_string(),
            parts.next().unwrap_or_default().to_string(),
        )
    };
    let (today_date, _) = split(today);
    let report_time = if today_date.is_empty() { "今日".to_string() } else { today_date };

    let forecast: Vec<Value> = list
        .iter()
        .take(FORECAST_SLOTS)
        .map(|obs| {
            let (date, time) = split(obs);
            json!({
                "date": date,
                "time": time,
                "temperature": fmt_reading(obs.temperature(), "°C", 1),
                "description": obs.description(),
                "humidity": fmt_reading(obs.main.as_ref().and_then(|m| m.humidity), "%", 0),
            })
        })
        .collect();

    Ok(json!({
        "success": true,
        "display_type": "weather_card",
        "city": city,
        "location": city,
        "province": "",
        "weather": today.weather_card(&report_time),
        "forecast": forecast,
        "food_suggestions": today.suggestions(),
    }))
}

pub struct WeatherApiTool {
    api_key: Option<String>,
    default_city: String,
    client: reqwest::Client,
}

impl WeatherApiTool {
    pub fn new(api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            default_city: DEFAULT_CITY.to_string(),
            client,
        }
    }

    pub fn with_default_city(mut self, city: impl Into<String>) -> Self {
        self.default_city = city.into();
        self
    }
}

#[async_trait]
impl Tool for WeatherApiTool {
    fn name(&self) -> &str {
        "weather_api"
    }

    fn description(&self) -> &str {
        "天气API工具，用于获取天气信息和基于天气的美食推荐"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::new()
            .optional("city", ParamKind::String, "城市名称（可包含国家代码，如'Beijing,CN'），与经纬度二选一")
            .optional("lat", ParamKind::Number, "纬度（与city二选一，需同时提供lon）")
            .optional("lon", ParamKind::Number, "经度（与city二选一，需同时提供lat）")
            .optional("extensions", ParamKind::String, "返回结果类型：base(当前天气) 或 forecast(天气预报)")
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Weather
    }

    async fn execute(&self, params: &ToolParams) -> Result<Value, ToolError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ToolError::failed(self.name(), "未配置 OPENWEATHER_API_KEY"));
        };

        let forecast = params.get("extensions").and_then(Value::as_str) == Some("forecast");
        let city = params
            .get("city")
            .and_then(Value::as_str)
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(&self.default_city);
        let coords = params
            .get("lat")
            .and_then(Value::as_f64)
            .zip(params.get("lon").and_then(Value::as_f64));

        let mut query: Vec<(&str, String)> = vec![
            ("appid", api_key.to_string()),
            ("units", "metric".into()),
            ("lang", "zh_cn".into()),
        ];
        match coords {
            Some((lat, lon)) => {
                query.push(("lat", lat.to_string()));
                query.push(("lon", lon.to_string()));
            }
            None => query.push(("q", city.to_string())),
        }

        info!(city, forecast, "Querying weather");
        let url = if forecast { FORECAST_URL } else { CURRENT_URL };
        let response = self
            .client
            .get(url)
            .query(&query)
            .send()
            .await
            .map_err(|e| ToolError::failed(self.name(), e))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "OpenWeather request failed");
            return Err(ToolError::failed(self.name(), format!("天气API请求失败: {}", response.status().as_u16())));
        }

        let parsed = if forecast {
            let reply: ForecastReply = response.json().await.map_err(|e| ToolError::failed(self.name(), e))?;
            forecast_result(reply)
        } else {
            let reply: CurrentReply = response.json().await.map_err(|e| ToolError::failed(self.name(), e))?;
            current_result(reply)
        };
        parsed.map_err(|message| ToolError::failed(self.name(), format!("天气查询失败: {message}")))
    }
}
