//! Builtin real-estate tools compiled into abode-core
//!
//! - `extract_requirements`: free text or intake fields to structured requirements
//! - `search_properties`: filter the bundled listing catalogue
//! - `analyze_market`: per-district market snapshot
//! - `recommend_properties`: score, rank and summarize candidate listings
//! - `web_search`: query an external search API (needs an API key)

mod listings;
mod market;
mod matching;
mod requirements;
mod web_search;

use std::path::PathBuf;
use std::sync::Arc;

pub use listings::{sample_listings, PropertyListing, PropertySearchTool, SearchFilters};
pub use market::{market_for, MarketAnalysisTool, MarketSnapshot};
pub use matching::{
    area_score, budget_score, commute_score, school_score, summarize, MatchCriteria, Matcher,
    MatchingWeights, Recommendation, RecommendationTool, ScoreBreakdown,
};
pub use requirements::{parse_budget, parse_commute, RequirementExtractionTool, Requirements};
pub use web_search::{WebSearchTool, DEFAULT_SEARCH_ENDPOINT, SEARCH_API_KEY_VAR};

use super::ToolCatalog;
use crate::error::ConfigError;

/// Settings the builtin tools take from the startup environment
#[derive(Debug, Clone)]
pub struct BuiltinSettings {
    pub search_api_key: Option<String>,
    pub search_endpoint: String,
    /// Extra PEM bundle trusted by outbound HTTP clients
    pub ca_bundle: Option<PathBuf>,
}

impl Default for BuiltinSettings {
    fn default() -> Self {
        Self {
            search_api_key: None,
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            ca_bundle: None,
        }
    }
}

/// Catalog holding every builtin implementation
pub fn catalog(settings: &BuiltinSettings) -> Result<ToolCatalog, ConfigError> {
    let search = WebSearchTool::new(
        settings.search_endpoint.clone(),
        settings.search_api_key.clone(),
        settings.ca_bundle.as_deref(),
    )?;

    Ok(ToolCatalog::new()
        .with(Arc::new(RequirementExtractionTool::new()))
        .with(Arc::new(PropertySearchTool::new()))
        .with(Arc::new(MarketAnalysisTool::new()))
        .with(Arc::new(RecommendationTool::new()))
        .with(Arc::new(search)))
}
