//! Trip-report lookups.
//!
//! Reports come from the Washington Trails Association site: a trail search
//! yields the hike page, whose trip-report listing holds recent free-text
//! reports from hikers.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;

use crate::config::ReportSettings;
use crate::errors::ReportError;

/// Keywords scanned for in report text, paired with the hazard they signal.
const HAZARD_KEYWORDS: &[(&str, &str)] = &[
    ("snow", "snow"),
    ("ice", "ice"),
    ("icy", "ice"),
    ("microspikes", "ice"),
    ("mud", "mud"),
    ("muddy", "mud"),
    ("blowdown", "downed trees"),
    ("downed tree", "downed trees"),
    ("washout", "washout"),
    ("washed out", "washout"),
    ("bear", "bears"),
    ("cougar", "cougars"),
    ("wasp", "wasps"),
    ("hornet", "wasps"),
    ("mosquito", "bugs"),
    ("bugs", "bugs"),
    ("closed", "closure"),
    ("closure", "closure"),
    ("flood", "flooding"),
    ("avalanche", "avalanche"),
    ("rockfall", "rockfall"),
];

/// Abstraction over trip-report sources.
/// Real implementation: `WtaClient`.
#[async_trait]
pub trait TripReportSource: Send + Sync {
    /// Find the page URL of the trail, if the source knows it.
    async fn find_trail_url(&self, trail_name: &str) -> Result<Option<String>, ReportError>;

    /// Recent report texts for the trail page, newest first.
    async fn recent_reports(&self, trail_url: &str) -> Result<Vec<String>, ReportError>;
}

/// Scan reports for hazard keywords. Each hazard is listed once, in the
/// order first seen.
pub fn check_hazards(reports: &[String]) -> Vec<String> {
    let mut hazards: Vec<String> = Vec::new();
    for report in reports {
        let lower = report.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        for (keyword, hazard) in HAZARD_KEYWORDS {
            let found = if keyword.contains(' ') {
                lower.contains(keyword)
            } else {
                words.iter().any(|w| w == keyword)
            };
            if found && !hazards.iter().any(|h| h == hazard) {
                hazards.push(hazard.to_string());
            }
        }
    }
    hazards
}

pub struct WtaClient {
    http: reqwest::Client,
    base_url: String,
}

impl WtaClient {
    pub fn new(settings: &ReportSettings) -> Result<Self, ReportError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!("hikebot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReportError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_html(&self, url: &str, query: &[(&str, &str)]) -> Result<String, ReportError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ReportError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ReportError::Network(format!("HTTP {}", response.status())));
        }

        response
            .text()
            .await
            .map_err(|e| ReportError::Network(e.to_string()))
    }
}

#[async_trait]
impl TripReportSource for WtaClient {
    async fn find_trail_url(&self, trail_name: &str) -> Result<Option<String>, ReportError> {
        let url = format!("{}/go-outside/hikes", self.base_url);
        let html = self.fetch_html(&url, &[("title", trail_name)]).await?;
        let found = parse_search_results(&html)?;
        debug!(trail = trail_name, found = ?found, "WTA search");
        Ok(found.map(|href| absolutize(&self.base_url, &href)))
    }

    async fn recent_reports(&self, trail_url: &str) -> Result<Vec<String>, ReportError> {
        let url = format!("{}/@@related_tripreport_listing", trail_url.trim_end_matches('/'));
        let html = self.fetch_html(&url, &[]).await?;
        parse_trip_reports(&html)
    }
}

fn selector(css: &str) -> Result<Selector, ReportError> {
    Selector::parse(css).map_err(|e| ReportError::Parse(e.to_string()))
}

/// First hike link on a search results page.
pub fn parse_search_results(html: &str) -> Result<Option<String>, ReportError> {
    let document = Html::parse_document(html);
    let links = selector("a.listitem-title, .search-result-item h3 a")?;
    Ok(document
        .select(&links)
        .filter_map(|el| el.value().attr("href"))
        .find(|href| href.contains("/hikes/"))
        .map(str::to_string))
}

/// Report bodies on a trip-report listing page, whitespace collapsed.
pub fn parse_trip_reports(html: &str) -> Result<Vec<String>, ReportError> {
    let document = Html::parse_document(html);
    let bodies = selector(".trip-report .report-text, .item .show-with-full")?;
    Ok(document
        .select(&bodies)
        .map(|el| {
            el.text()
                .flat_map(|t| t.split_whitespace())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|text| !text.is_empty())
        .collect())
}

fn absolutize(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!("{}/{}", base, href.trim_start_matches('/'))
    }
}
