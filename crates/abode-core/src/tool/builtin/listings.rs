//! Property listing search over the bundled listing catalogue

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tool::{Tool, ToolContext};

const TOOL_NAME: &str = "search_properties";

/// A property listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyListing {
    pub property_id: String,
    pub city: String,
    /// Price in yuan
    pub price: f64,
    pub area: String,
    /// Floor area in square metres
    pub size: f64,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub school_district: String,
    /// Commute to the city centre in minutes
    pub commute_time: u32,
    pub address: String,
    pub listing_date: String,
    pub property_type: String,
}

/// Search filters; absent filters match everything
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilters {
    pub budget_min: Option<f64>,
    pub budget_max: Option<f64>,
    pub area: Option<String>,
    pub school_district: Option<String>,
    pub max_commute_time: Option<u32>,
}

impl SearchFilters {
    pub fn matches(&self, listing: &PropertyListing) -> bool {
        if let Some(min) = self.budget_min {
            if listing.price < min {
                return false;
            }
        }
        if let Some(max) = self.budget_max {
            if listing.price > max {
                return false;
            }
        }
        if let Some(ref area) = self.area {
            if !area.is_empty() && !listing.area.contains(area.as_str()) {
                return false;
            }
        }
        if let Some(ref school) = self.school_district {
            if !school.is_empty() && !listing.school_district.contains(school.as_str()) {
                return false;
            }
        }
        if let Some(max_commute) = self.max_commute_time {
            if listing.commute_time > max_commute {
                return false;
            }
        }
        true
    }
}

#[allow(clippy::too_many_arguments)]
fn listing(
    id: &str,
    city: &str,
    price: f64,
    area: &str,
    size: f64,
    rooms: (u32, u32),
    school: &str,
    commute: u32,
    address: &str,
    listed: &str,
) -> PropertyListing {
    PropertyListing {
        property_id: id.to_string(),
        city: city.to_string(),
        price,
        area: area.to_string(),
        size,
        bedrooms: rooms.0,
        bathrooms: rooms.1,
        school_district: school.to_string(),
        commute_time: commute,
        address: address.to_string(),
        listing_date: listed.to_string(),
        property_type: "公寓".to_string(),
    }
}

/// The bundled listing catalogue
pub fn sample_listings() -> Vec<PropertyListing> {
    vec![
        listing("P001", "北京", 3_500_000.0, "朝阳区", 120.5, (3, 2), "朝阳实验小学", 25, "朝阳区建国路88号", "2024-01-15"),
        listing("P002", "北京", 4_200_000.0, "海淀区", 95.0, (2, 1), "中关村第一小学", 30, "海淀区中关村大街123号", "2024-01-20"),
        listing("P003", "北京", 2_800_000.0, "丰台区", 85.0, (2, 1), "丰台第五小学", 35, "丰台区南三环西路456号", "2024-01-18"),
        listing("P004", "北京", 5_800_000.0, "西城区", 140.0, (3, 2), "北京第二实验小学", 15, "西城区金融街789号", "2024-01-22"),
        listing("P005", "北京", 3_200_000.0, "朝阳区", 110.0, (3, 2), "朝阳外国语学校", 28, "朝阳区望京西路321号", "2024-01-25"),
        listing("P006", "上海", 4_800_000.0, "浦东新区", 89.0, (2, 1), "建平实验小学", 35, "浦东新区张杨路1200弄", "2024-02-02"),
        listing("P007", "上海", 3_900_000.0, "浦东新区", 76.0, (2, 1), "福山外国语小学", 40, "浦东新区东方路888弄", "2024-02-05"),
        listing("P008", "上海", 6_500_000.0, "浦东新区", 118.0, (3, 2), "上海实验学校", 30, "浦东新区世纪大道1500号", "2024-02-08"),
        listing("P009", "上海", 5_200_000.0, "徐汇区", 82.0, (2, 1), "世界外国语小学", 25, "徐汇区漕溪北路600弄", "2024-02-10"),
        listing("P010", "上海", 3_100_000.0, "闵行区", 95.0, (3, 1), "闵行实验小学", 45, "闵行区七莘路3000弄", "2024-02-12"),
    ]
}

/// Tool that searches the listing catalogue
#[derive(Debug, Clone)]
pub struct PropertySearchTool {
    listings: Vec<PropertyListing>,
}

impl PropertySearchTool {
    pub fn new() -> Self {
        Self::with_listings(sample_listings())
    }

    pub fn with_listings(listings: Vec<PropertyListing>) -> Self {
        Self { listings }
    }

    pub fn search(&self, filters: &SearchFilters) -> Vec<&PropertyListing> {
        self.listings.iter().filter(|l| filters.matches(l)).collect()
    }
}

impl Default for PropertySearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for PropertySearchTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "根据结构化需求搜索匹配的房源信息，包括价格、区域、学区等条件。"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "budget_min": { "type": "number", "description": "预算下限（元）" },
                "budget_max": { "type": "number", "description": "预算上限（元）" },
                "area": { "type": "string" },
                "school_district": { "type": "string" },
                "max_commute_time": { "type": "integer", "description": "最长通勤时间（分钟）" }
            }
        })
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "total_count": { "type": "integer" },
                "properties": { "type": "array" }
            },
            "required": ["total_count", "properties"]
        })
    }

    async fn invoke(&self, input: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let filters: SearchFilters = serde_json::from_value(input)
            .map_err(|e| ToolError::recoverable(TOOL_NAME, format!("invalid filters: {}", e)))?;

        let found = self.search(&filters);
        tracing::debug!(count = found.len(), "property search finished");

        Ok(json!({
            "total_count": found.len(),
            "properties": found,
        }))
    }
}
