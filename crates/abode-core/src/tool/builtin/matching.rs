//! Listing scoring and recommendation
//!
//! Each listing gets a score in `[0, 1]` for budget, area, school and commute
//! fit. The weighted total ranks the listings; the top `k` are returned with
//! a short reason and a summary of the whole recommendation set.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::listings::PropertyListing;
use super::requirements::{parse_budget, parse_commute};
use crate::error::ToolError;
use crate::tool::{Tool, ToolContext};

const TOOL_NAME: &str = "recommend_properties";
const DEFAULT_TOP_K: usize = 3;

/// Relative importance of each criterion, normalized to sum to 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchingWeights {
    pub budget: f64,
    pub area: f64,
    pub school: f64,
    pub commute: f64,
}

impl MatchingWeights {
    pub fn new(budget: f64, area: f64, school: f64, commute: f64) -> Self {
        let total = budget + area + school + commute;
        if total <= 0.0 {
            return Self::default();
        }
        Self {
            budget: budget / total,
            area: area / total,
            school: school / total,
            commute: commute / total,
        }
    }
}

impl Default for MatchingWeights {
    fn default() -> Self {
        Self::new(0.4, 0.2, 0.3, 0.3)
    }
}

/// Per-criterion scores for one listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub budget: f64,
    pub area: f64,
    pub school: f64,
    pub commute: f64,
}

/// What the buyer asked for, as seen by the scorer
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchCriteria {
    pub budget_min: Option<f64>,
    pub budget_max: Option<f64>,
    /// Budget phrase, or a ceiling in yuan
    pub budget: Option<Value>,
    pub area: Option<String>,
    pub school_district: Option<String>,
    pub max_commute_time: Option<u32>,
    pub commute: Option<String>,
}

impl MatchCriteria {
    /// Fill numeric bounds from the textual forms when they are missing
    fn normalized(mut self) -> Self {
        if self.budget_min.is_none() && self.budget_max.is_none() {
            match self.budget {
                Some(Value::String(ref text)) => {
                    let (min, max) = parse_budget(text);
                    self.budget_min = min;
                    self.budget_max = max;
                }
                Some(Value::Number(ref n)) => self.budget_max = n.as_f64(),
                _ => {}
            }
        }
        if self.max_commute_time.is_none() {
            self.max_commute_time = self.commute.as_deref().and_then(parse_commute);
        }
        self
    }
}

pub fn budget_score(price: f64, min: Option<f64>, max: Option<f64>) -> f64 {
    let over = |max: f64| (1.0 - (price - max) / max).max(0.0);
    let under = |min: f64| (price / min).max(0.0);

    match (min, max) {
        (None, None) => 0.5,
        (Some(min), None) => {
            if price >= min {
                1.0
            } else {
                under(min)
            }
        }
        (None, Some(max)) => {
            if price <= max {
                1.0
            } else {
                over(max)
            }
        }
        (Some(min), Some(max)) => {
            if price < min {
                under(min)
            } else if price > max {
                over(max)
            } else {
                1.0
            }
        }
    }
}

fn neighbours(area: &str) -> &'static [&'static str] {
    match area {
        "朝阳区" => &["海淀区", "东城区"],
        "海淀区" => &["朝阳区", "西城区"],
        "西城区" => &["海淀区", "东城区"],
        "东城区" => &["西城区", "朝阳区"],
        "丰台区" => &["朝阳区", "西城区"],
        "浦东新区" => &["黄浦区", "杨浦区", "闵行区"],
        "徐汇区" => &["闵行区", "长宁区", "黄浦区"],
        "闵行区" => &["徐汇区", "浦东新区"],
        "黄浦区" => &["浦东新区", "徐汇区", "静安区"],
        _ => &[],
    }
}

pub fn area_score(listing_area: &str, wanted: Option<&str>) -> f64 {
    let Some(wanted) = wanted.filter(|w| !w.is_empty()) else {
        return 0.5;
    };
    if wanted.contains(listing_area) || listing_area.contains(wanted) {
        return 1.0;
    }
    if neighbours(wanted).contains(&listing_area) {
        return 0.7;
    }
    0.2
}

fn school_quality(school: &str) -> f64 {
    match school {
        "北京第二实验小学" => 0.95,
        "中关村第一小学" => 0.90,
        "朝阳实验小学" => 0.85,
        "朝阳外国语学校" => 0.88,
        "丰台第五小学" => 0.75,
        "丰台实验小学" => 0.78,
        "世界外国语小学" => 0.93,
        "上海实验学校" => 0.92,
        "福山外国语小学" => 0.90,
        "建平实验小学" => 0.88,
        "闵行实验小学" => 0.80,
        _ => 0.6,
    }
}

pub fn school_score(listing_school: &str, wanted: Option<&str>) -> f64 {
    let Some(wanted) = wanted.filter(|w| !w.is_empty()) else {
        return 0.5;
    };
    if wanted.contains(listing_school) || listing_school.contains(wanted) {
        return 1.0;
    }
    let diff = (school_quality(listing_school) - school_quality(wanted)).abs();
    (1.0 - diff * 2.0).max(0.0)
}

pub fn commute_score(minutes: u32, max: Option<u32>) -> f64 {
    match max {
        None => (1.0 - f64::from(minutes) / 60.0).max(0.0),
        Some(max) if minutes <= max => 1.0,
        Some(0) => 0.0,
        Some(max) => {
            let excess = f64::from(minutes - max) / f64::from(max);
            (1.0 - excess).max(0.0)
        }
    }
}

fn reason(scores: &ScoreBreakdown) -> String {
    let mut parts = Vec::new();
    let mut grade = |score: f64, good: &'static str, fair: &'static str| {
        if score >= 0.8 {
            parts.push(good);
        } else if score >= 0.6 {
            parts.push(fair);
        }
    };
    grade(scores.budget, "价格符合预算", "价格基本符合预算");
    grade(scores.area, "位置优越", "位置较好");
    grade(scores.school, "学区优质", "学区不错");
    grade(scores.commute, "通勤便利", "通勤较为便利");

    if parts.is_empty() {
        "综合条件一般".to_string()
    } else {
        parts.join("，")
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A ranked recommendation
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub rank: usize,
    pub property_id: String,
    pub address: String,
    pub price: f64,
    pub area: String,
    pub school_district: String,
    pub commute_time: u32,
    pub matching_score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub reason: String,
}

/// Scores and ranks listings
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    weights: MatchingWeights,
}

impl Matcher {
    pub fn new(weights: MatchingWeights) -> Self {
        Self { weights }
    }

    pub fn score(&self, listing: &PropertyListing, criteria: &MatchCriteria) -> (f64, ScoreBreakdown) {
        let breakdown = ScoreBreakdown {
            budget: budget_score(listing.price, criteria.budget_min, criteria.budget_max),
            area: area_score(&listing.area, criteria.area.as_deref()),
            school: school_score(&listing.school_district, criteria.school_district.as_deref()),
            commute: commute_score(listing.commute_time, criteria.max_commute_time),
        };
        let total = breakdown.budget * self.weights.budget
            + breakdown.area * self.weights.area
            + breakdown.school * self.weights.school
            + breakdown.commute * self.weights.commute;
        (total, breakdown)
    }

    /// Rank listings best-first and keep the top `k`
    ///
    /// Equal totals keep their input order.
    pub fn recommend(
        &self,
        listings: &[PropertyListing],
        criteria: &MatchCriteria,
        top_k: usize,
    ) -> Vec<Recommendation> {
        let mut scored: Vec<_> = listings
            .iter()
            .map(|l| {
                let (total, breakdown) = self.score(l, criteria);
                (l, total, breakdown)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(top_k)
            .enumerate()
            .map(|(i, (l, total, breakdown))| Recommendation {
                rank: i + 1,
                property_id: l.property_id.clone(),
                address: l.address.clone(),
                price: l.price,
                area: l.area.clone(),
                school_district: l.school_district.clone(),
                commute_time: l.commute_time,
                matching_score: round2(total),
                reason: reason(&breakdown),
                score_breakdown: ScoreBreakdown {
                    budget: round2(breakdown.budget),
                    area: round2(breakdown.area),
                    school: round2(breakdown.school),
                    commute: round2(breakdown.commute),
                },
            })
            .collect()
    }
}

/// Summary document for a recommendation set
pub fn summarize(recommendations: &[Recommendation]) -> Value {
    let Some(top) = recommendations.first() else {
        return json!({
            "message": "未找到合适的房源推荐",
            "total_recommendations": 0,
            "recommendations": [],
        });
    };

    let count = recommendations.len();
    let average =
        recommendations.iter().map(|r| r.matching_score).sum::<f64>() / count as f64;
    let min_price = recommendations
        .iter()
        .map(|r| r.price)
        .fold(f64::INFINITY, f64::min);
    let max_price = recommendations
        .iter()
        .map(|r| r.price)
        .fold(f64::NEG_INFINITY, f64::max);

    json!({
        "total_recommendations": count,
        "average_matching_score": round2(average),
        "price_range": { "min": min_price, "max": max_price },
        "top_recommendation": {
            "property_id": top.property_id,
            "address": top.address,
            "price": top.price,
            "matching_score": top.matching_score,
            "reason": top.reason,
        },
        "recommendations": recommendations,
    })
}

/// Tool that ranks candidate listings against buyer requirements
#[derive(Debug, Clone, Default)]
pub struct RecommendationTool {
    matcher: Matcher,
}

impl RecommendationTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: MatchingWeights) -> Self {
        Self {
            matcher: Matcher::new(weights),
        }
    }
}

#[async_trait]
impl Tool for RecommendationTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "根据匹配度（预算、区域、学区、通勤）为候选房源打分排序，并生成推荐总结。"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "properties": { "type": "array", "description": "候选房源列表" },
                "budget_min": { "type": "number" },
                "budget_max": { "type": "number" },
                "budget": { "type": ["string", "number"] },
                "area": { "type": "string" },
                "school_district": { "type": "string" },
                "max_commute_time": { "type": "integer" },
                "commute": { "type": "string" },
                "top_k": { "type": "integer" }
            },
            "required": ["properties"]
        })
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "total_recommendations": { "type": "integer" },
                "average_matching_score": { "type": "number" },
                "price_range": { "type": "object" },
                "top_recommendation": { "type": "object" },
                "recommendations": { "type": "array" }
            },
            "required": ["total_recommendations", "recommendations"]
        })
    }

    async fn invoke(&self, input: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let listings: Vec<PropertyListing> = input
            .get("properties")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ToolError::recoverable(TOOL_NAME, format!("invalid listings: {}", e)))?
            .ok_or_else(|| ToolError::recoverable(TOOL_NAME, "no candidate listings supplied"))?;

        let criteria: MatchCriteria = serde_json::from_value(input.clone())
            .map_err(|e| ToolError::recoverable(TOOL_NAME, format!("invalid criteria: {}", e)))?;
        let top_k = input
            .get("top_k")
            .and_then(Value::as_u64)
            .map(|k| k as usize)
            .filter(|k| *k > 0)
            .unwrap_or(DEFAULT_TOP_K);

        let recommendations = self
            .matcher
            .recommend(&listings, &criteria.normalized(), top_k);
        Ok(summarize(&recommendations))
    }
}
