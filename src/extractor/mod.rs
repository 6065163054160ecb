//! Record extraction from captured pages.
//!
//! Everything in here is pure: documents in, typed rows out. Network and
//! storage live in their own modules so extraction stays testable against
//! fixture files.

pub mod blob;
pub mod campaign;
pub mod creator;
pub mod money;
pub mod rewards;
pub mod select;
pub mod status;
pub mod taxonomy;
pub mod text;
pub mod updates;

use std::error::Error;
use std::fmt;

use chrono::{DateTime, NaiveDate};
use scraper::Html;

use crate::db::{CampaignRow, CreatorProjectRow, CreatorRow, QualityFlagRow, RewardRow};

/// Where a document came from and when it was captured
/// (`YYYYMMDD-HHMMSS`). Fetches stamp this at download time; archive
/// ingest recovers it from the capture filename.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub source: String,
    pub accessed: Option<String>,
}

impl PageContext {
    pub fn new(source: impl Into<String>, accessed: Option<String>) -> Self {
        PageContext {
            source: source.into(),
            accessed,
        }
    }

    /// `YYYYMMDD` half of the capture stamp.
    pub fn date_accessed(&self) -> Option<String> {
        self.stamp_parts().map(|(date, _)| date.to_string())
    }

    /// `HHMMSS` half of the capture stamp.
    pub fn time_accessed(&self) -> Option<String> {
        self.stamp_parts().map(|(_, time)| time.to_string())
    }

    fn stamp_parts(&self) -> Option<(&str, &str)> {
        let stamp = self.accessed.as_deref()?;
        let (date, time) = stamp.split_once('-')?;
        let digits = date.bytes().chain(time.bytes()).all(|b| b.is_ascii_digit());
        if date.len() == 8 && time.len() == 6 && digits {
            Some((date, time))
        } else {
            None
        }
    }
}

/// The capture is not a scrapeable page: an anti-bot interstitial, a
/// deleted account, or an error page. These go to the missing-page
/// ledger instead of the record tables.
#[derive(Debug, Clone)]
pub struct Unusable {
    pub source: String,
    pub reason: &'static str,
}

impl Unusable {
    pub fn new(source: &str, reason: &'static str) -> Self {
        Unusable {
            source: source.to_string(),
            reason,
        }
    }
}

impl fmt::Display for Unusable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

impl Error for Unusable {}

#[derive(Debug)]
pub struct ExtractedCampaign {
    pub record: CampaignRow,
    pub rewards: Vec<RewardRow>,
    pub flags: Vec<QualityFlagRow>,
}

#[derive(Debug)]
pub struct ExtractedCreator {
    pub record: CreatorRow,
    pub projects: Vec<CreatorProjectRow>,
    pub flags: Vec<QualityFlagRow>,
}

/// Extract one campaign from its main document plus the optional
/// `/rewards` companion.
pub fn extract_campaign(
    doc: &Html,
    rewards_doc: Option<&Html>,
    ctx: &PageContext,
) -> Result<ExtractedCampaign, Unusable> {
    campaign::extract(doc, rewards_doc, ctx)
}

/// Extract one creator from the about page plus the paginated
/// created/backed listing documents.
pub fn extract_creator(
    about: &Html,
    created: &[Html],
    backed: &[Html],
    ctx: &PageContext,
) -> Result<ExtractedCreator, Unusable> {
    creator::extract(about, created, backed, ctx)
}

/// Canonical record URL of a captured document, when it carries one.
pub fn page_url(doc: &Html) -> Option<String> {
    select::first_attr(doc, &[r#"meta[property="og:url"]"#], "content")
        .map(|u| canonical_url(&u))
}

/// Strip query and fragment, drop any trailing slash.
pub(crate) fn canonical_url(url: &str) -> String {
    let base = url.split(['?', '#']).next().unwrap_or(url);
    base.trim_end_matches('/').to_string()
}

/// `(creator_id, project_id)` from the last two path segments of a
/// canonical campaign url.
pub(crate) fn ids_from_url(url: &str) -> (Option<String>, Option<String>) {
    let segments: Vec<&str> = url.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [.., creator, project] => (Some((*creator).to_string()), Some((*project).to_string())),
        _ => (None, None),
    }
}

/// Dates appear as RFC 3339 stamps, offset stamps without the colon, or
/// bare `YYYY-MM-DD`.
pub(crate) fn parse_iso_date(stamp: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(stamp) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_str(stamp, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.date_naive());
    }
    NaiveDate::parse_from_str(stamp, "%Y-%m-%d").ok()
}
