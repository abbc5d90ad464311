//! Buyer requirement extraction
//!
//! Turns a free-text home-buying request (or a partially structured intake
//! form) into the structured requirement fields the search and matching
//! tools consume.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tool::{Tool, ToolContext};

const TOOL_NAME: &str = "extract_requirements";

/// Known districts and the city they belong to
const DISTRICTS: &[(&str, &str)] = &[
    ("朝阳区", "北京"),
    ("海淀区", "北京"),
    ("西城区", "北京"),
    ("东城区", "北京"),
    ("丰台区", "北京"),
    ("石景山区", "北京"),
    ("通州区", "北京"),
    ("昌平区", "北京"),
    ("大兴区", "北京"),
    ("顺义区", "北京"),
    ("浦东新区", "上海"),
    ("徐汇区", "上海"),
    ("静安区", "上海"),
    ("黄浦区", "上海"),
    ("长宁区", "上海"),
    ("闵行区", "上海"),
    ("杨浦区", "上海"),
    ("普陀区", "上海"),
    ("虹口区", "上海"),
    ("宝山区", "上海"),
];

const CITIES: &[&str] = &["北京", "上海", "广州", "深圳", "杭州", "南京"];

/// Filler words that precede a school name in conversational requests
const SCHOOL_PREFIXES: &[&str] = &[
    "最好是", "最好", "希望是", "希望", "要求是", "要求", "需要", "想要", "对口", "靠近", "是", "在", "要",
];

lazy_static! {
    static ref BUDGET_RANGE: Regex =
        Regex::new(r"(\d+(?:\.\d+)?)\s*(?:万)?\s*[-~～到至]\s*(\d+(?:\.\d+)?)\s*万").unwrap();
    static ref BUDGET_SINGLE: Regex = Regex::new(r"(\d+(?:\.\d+)?)\s*万").unwrap();
    static ref AFTER_CITY_DISTRICT: Regex =
        Regex::new(r"(?:北京|上海|广州|深圳|杭州|南京)市?(\p{Han}{1,3}?(?:新区|区))").unwrap();
    static ref SCHOOL: Regex = Regex::new(r"\p{Han}{2,10}?(?:小学|中学|学校)").unwrap();
    static ref COMMUTE: Regex = Regex::new(r"通勤\D{0,8}?(\d+)\s*分钟").unwrap();
}

/// Structured buyer requirements
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    /// Budget in the canonical `300-500万` / `500万以内` form
    pub budget: Option<String>,
    pub area: Option<String>,
    pub city: Option<String>,
    pub school_district: Option<String>,
    /// Commute requirement in the canonical `通勤30分钟以内` form
    pub commute: Option<String>,
    /// Lower budget bound in yuan
    pub budget_min: Option<f64>,
    /// Upper budget bound in yuan
    pub budget_max: Option<f64>,
    /// Maximum commute in minutes
    pub max_commute_time: Option<u32>,
}

impl Requirements {
    /// True when nothing at all was recognised
    pub fn is_empty(&self) -> bool {
        self.budget.is_none()
            && self.area.is_none()
            && self.school_district.is_none()
            && self.commute.is_none()
    }

    /// Extract requirements from free text
    pub fn from_text(text: &str) -> Self {
        let mut req = Requirements::default();

        let (min, max) = parse_budget(text);
        req.set_budget(min, max);

        if let Some((area, city)) = find_district(text) {
            req.area = Some(area);
            req.city = city;
        }
        if req.city.is_none() {
            req.city = CITIES.iter().find(|c| text.contains(*c)).map(|c| c.to_string());
        }

        // Remove district and budget text so they cannot bleed into the school match.
        let mut remainder = text.to_string();
        if let Some(ref area) = req.area {
            remainder = remainder.replace(area.as_str(), " ");
        }
        req.school_district = find_school(&remainder);

        if let Some(minutes) = parse_commute(text) {
            req.max_commute_time = Some(minutes);
            req.commute = Some(format!("通勤{}分钟以内", minutes));
        }

        req
    }

    fn set_budget(&mut self, min: Option<f64>, max: Option<f64>) {
        self.budget_min = min;
        self.budget_max = max;
        self.budget = match (min, max) {
            (Some(lo), Some(hi)) => Some(format!("{}-{}万", wan(lo), wan(hi))),
            (None, Some(hi)) => Some(format!("{}万以内", wan(hi))),
            (Some(lo), None) => Some(format!("{}万以上", wan(lo))),
            (None, None) => None,
        };
    }

    /// Overlay explicitly supplied structured fields
    fn apply_fields(&mut self, input: &Value) {
        match input.get("budget") {
            Some(Value::String(s)) => {
                let (min, max) = parse_budget(s);
                if min.is_some() || max.is_some() {
                    self.set_budget(min, max);
                }
            }
            Some(Value::Number(n)) => {
                if let Some(yuan) = n.as_f64().filter(|v| *v > 0.0) {
                    self.set_budget(None, Some(yuan));
                }
            }
            _ => {}
        }

        let location = input
            .get("area")
            .or_else(|| input.get("preferred_location"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(location) = location {
            match find_district(location) {
                Some((area, city)) => {
                    self.area = Some(area);
                    if city.is_some() {
                        self.city = city;
                    }
                }
                None => self.area = Some(strip_city(location).to_string()),
            }
        }

        if let Some(school) = input
            .get("school_district")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
        {
            self.school_district = Some(school.trim().to_string());
        }

        if let Some(commute) = input.get("commute").and_then(Value::as_str) {
            if let Some(minutes) = parse_commute(commute).or_else(|| first_number(commute)) {
                self.max_commute_time = Some(minutes);
                self.commute = Some(format!("通勤{}分钟以内", minutes));
            }
        }
    }
}

/// Parse a budget phrase into yuan bounds
///
/// Recognises `300-500万`, `500万以内`, `500万以下`, `500万以上`, and a bare
/// amount such as `500万` or `500万预算`, which is treated as a ceiling.
pub fn parse_budget(text: &str) -> (Option<f64>, Option<f64>) {
    if let Some(caps) = BUDGET_RANGE.captures(text) {
        let lo = caps[1].parse::<f64>().ok().map(|v| v * 10_000.0);
        let hi = caps[2].parse::<f64>().ok().map(|v| v * 10_000.0);
        return (lo, hi);
    }

    if let Some(m) = BUDGET_SINGLE.captures(text) {
        let amount = m[1].parse::<f64>().ok().map(|v| v * 10_000.0);
        let tail = &text[m.get(0).map(|g| g.end()).unwrap_or(0)..];
        let tail = tail.trim_start_matches('元');
        if tail.starts_with("以上") || tail.starts_with("起") {
            return (amount, None);
        }
        return (None, amount);
    }

    (None, None)
}

/// Parse `通勤N分钟` into minutes
pub fn parse_commute(text: &str) -> Option<u32> {
    COMMUTE
        .captures(text)
        .and_then(|caps| caps[1].parse::<u32>().ok())
}

fn first_number(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn find_district(text: &str) -> Option<(String, Option<String>)> {
    if let Some((name, city)) = DISTRICTS.iter().find(|(name, _)| text.contains(*name)) {
        return Some((name.to_string(), Some(city.to_string())));
    }

    AFTER_CITY_DISTRICT.captures(text).map(|caps| {
        let city = CITIES.iter().find(|c| text.contains(*c)).map(|c| c.to_string());
        (caps[1].to_string(), city)
    })
}

fn find_school(text: &str) -> Option<String> {
    let found = SCHOOL.find(text)?;
    let mut name = found.as_str();
    loop {
        let stripped = SCHOOL_PREFIXES
            .iter()
            .find_map(|prefix| name.strip_prefix(prefix));
        match stripped {
            Some(rest) if rest.chars().count() > 2 => name = rest,
            _ => break,
        }
    }
    Some(name.to_string())
}

fn strip_city(location: &str) -> &str {
    for city in CITIES {
        if let Some(rest) = location.strip_prefix(city) {
            let rest = rest.trim_start_matches('市');
            if !rest.is_empty() {
                return rest;
            }
        }
    }
    location
}

fn wan(yuan: f64) -> String {
    let value = yuan / 10_000.0;
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Tool that extracts structured buyer requirements
#[derive(Debug, Default)]
pub struct RequirementExtractionTool;

impl RequirementExtractionTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for RequirementExtractionTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "从用户自然语言输入中提取购房需求，包括预算、区域、学区和通勤，并以JSON格式返回。"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "用户的自然语言购房需求" },
                "budget": { "type": ["string", "number"], "description": "预算，如 300-500万 或以元计的数字" },
                "area": { "type": "string" },
                "preferred_location": { "type": "string" },
                "school_district": { "type": "string" },
                "commute": { "type": "string" }
            }
        })
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "budget": { "type": "string" },
                "area": { "type": "string" },
                "city": { "type": "string" },
                "school_district": { "type": "string" },
                "commute": { "type": "string" },
                "budget_min": { "type": "number" },
                "budget_max": { "type": "number" },
                "max_commute_time": { "type": "integer" }
            }
        })
    }

    async fn invoke(&self, input: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let mut req = match input.get("query").and_then(Value::as_str) {
            Some(query) => Requirements::from_text(query),
            None => Requirements::default(),
        };
        req.apply_fields(&input);

        if req.is_empty() {
            return Err(ToolError::recoverable(
                TOOL_NAME,
                "no budget, area, school or commute requirement found in the input",
            ));
        }

        serde_json::to_value(&req).map_err(|e| ToolError::fatal(TOOL_NAME, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_budget_forms() {
        assert_eq!(parse_budget("300-500万"), (Some(3_000_000.0), Some(5_000_000.0)));
        assert_eq!(parse_budget("300万到500万"), (Some(3_000_000.0), Some(5_000_000.0)));
        assert_eq!(parse_budget("500万以内"), (None, Some(5_000_000.0)));
        assert_eq!(parse_budget("500万预算"), (None, Some(5_000_000.0)));
        assert_eq!(parse_budget("800万以上"), (Some(8_000_000.0), None));
        assert_eq!(parse_budget("没有预算"), (None, None));
    }

    #[test]
    fn test_from_text_shanghai_request() {
        let req = Requirements::from_text("分析上海浦东新区500万预算的购房选择");
        assert_eq!(req.area.as_deref(), Some("浦东新区"));
        assert_eq!(req.city.as_deref(), Some("上海"));
        assert_eq!(req.budget.as_deref(), Some("500万以内"));
        assert_eq!(req.budget_max, Some(5_000_000.0));
        assert_eq!(req.school_district, None);
    }

    #[test]
    fn test_from_text_beijing_request() {
        let req = Requirements::from_text(
            "我想在朝阳区买一套300-500万的房子，最好是朝阳实验小学的学区房，通勤时间不超过30分钟",
        );
        assert_eq!(req.area.as_deref(), Some("朝阳区"));
        assert_eq!(req.budget.as_deref(), Some("300-500万"));
        assert_eq!(req.school_district.as_deref(), Some("朝阳实验小学"));
        assert_eq!(req.max_commute_time, Some(30));
        assert_eq!(req.commute.as_deref(), Some("通勤30分钟以内"));
    }

    #[test]
    fn test_strip_city() {
        assert_eq!(strip_city("上海市嘉定区"), "嘉定区");
        assert_eq!(strip_city("嘉定区"), "嘉定区");
    }

    #[tokio::test]
    async fn test_structured_fields_override_text() {
        let tool = RequirementExtractionTool::new();
        let out = tool
            .invoke(
                json!({
                    "customer_name": "张伟",
                    "budget": 4_500_000,
                    "preferred_location": "上海浦东新区"
                }),
                &ToolContext::detached("requirement_analyst"),
            )
            .await
            .unwrap();

        assert_eq!(out["area"], "浦东新区");
        assert_eq!(out["budget_max"], 4_500_000.0);
        assert_eq!(out["budget"], "450万以内");
    }

    #[tokio::test]
    async fn test_empty_input_is_recoverable() {
        let tool = RequirementExtractionTool::new();
        let err = tool
            .invoke(json!({"query": "你好"}), &ToolContext::detached("a"))
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
    }
}
