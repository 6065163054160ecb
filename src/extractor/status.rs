//! Campaign lifecycle state and the selector sets it gates.
//!
//! Live pages and finished (spotlight) pages render the funding figures
//! under entirely different markup, so the money/backer lookups pick their
//! selector chain off the classified status. When classification fails the
//! union chain is used, live variants first.

use scraper::Html;

use super::select;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Live,
    Successful,
    Failed,
    Canceled,
    Suspended,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Live => "Live",
            Status::Successful => "Successful",
            Status::Failed => "Failed",
            Status::Canceled => "Canceled",
            Status::Suspended => "Suspended",
        }
    }

    /// Map the lowercase state carried in embedded JSON payloads.
    pub fn from_state(state: &str) -> Option<Status> {
        match state {
            "live" | "started" | "submitted" => Some(Status::Live),
            "successful" => Some(Status::Successful),
            "failed" => Some(Status::Failed),
            "canceled" => Some(Status::Canceled),
            "suspended" => Some(Status::Suspended),
            _ => None,
        }
    }
}

/// Banner markers rendered on finished campaigns, checked in order.
const FINISHED_MARKERS: &[(Status, &[&str])] = &[
    (
        Status::Successful,
        &["#funding-successful", "div.Campaign-state-successful"],
    ),
    (
        Status::Failed,
        &["#funding-unsuccessful", "div.Campaign-state-failed"],
    ),
    (
        Status::Canceled,
        &["#funding-canceled", "div.Campaign-state-canceled"],
    ),
    (
        Status::Suspended,
        &["#funding-suspended", "div.Campaign-state-suspended"],
    ),
];

/// Elements only the live layout renders: the countdown paragraph and the
/// green pledged figure.
const LIVE_MARKERS: &[&str] = &["p.mb3.mb0-lg.type-12", "span.ksr-green-700"];

/// Classify a campaign document. The JSON-carried state wins when present;
/// otherwise the page markers decide. `None` means the layout gave no
/// signal either way.
pub fn classify(doc: &Html, blob_state: Option<&str>) -> Option<Status> {
    if let Some(status) = blob_state.and_then(Status::from_state) {
        return Some(status);
    }
    for (status, markers) in FINISHED_MARKERS {
        if select::first_element(doc, markers).is_some() {
            return Some(*status);
        }
    }
    if select::first_element(doc, LIVE_MARKERS).is_some() {
        return Some(Status::Live);
    }
    None
}

const LIVE_GOAL: &[&str] = &[
    "span.inline-block-sm.hide span.money",
    "span.inline-block-sm.hide",
];
const SPOTLIGHT_GOAL: &[&str] = &[
    "div.type-12.medium.navy-500 span.money",
    "span.money.goal",
];
const ANY_GOAL: &[&str] = &[
    "span.inline-block-sm.hide span.money",
    "span.inline-block-sm.hide",
    "div.type-12.medium.navy-500 span.money",
    "span.money.goal",
];

const LIVE_PLEDGED: &[&str] = &["span.ksr-green-700"];
const SPOTLIGHT_PLEDGED: &[&str] = &["div.NS_campaigns__spotlight_stats span.money"];
const ANY_PLEDGED: &[&str] = &[
    "span.ksr-green-700",
    "div.NS_campaigns__spotlight_stats span.money",
];

const LIVE_BACKERS: &[&str] = &["div.block.type-16.type-24-md.medium.soft-black"];
const SPOTLIGHT_BACKERS: &[&str] = &["div.NS_campaigns__spotlight_stats b"];
const ANY_BACKERS: &[&str] = &[
    "div.block.type-16.type-24-md.medium.soft-black",
    "div.NS_campaigns__spotlight_stats b",
];

pub fn goal_chain(status: Option<Status>) -> &'static [&'static str] {
    match status {
        Some(Status::Live) => LIVE_GOAL,
        Some(_) => SPOTLIGHT_GOAL,
        None => ANY_GOAL,
    }
}

pub fn pledged_chain(status: Option<Status>) -> &'static [&'static str] {
    match status {
        Some(Status::Live) => LIVE_PLEDGED,
        Some(_) => SPOTLIGHT_PLEDGED,
        None => ANY_PLEDGED,
    }
}

pub fn backers_chain(status: Option<Status>) -> &'static [&'static str] {
    match status {
        Some(Status::Live) => LIVE_BACKERS,
        Some(_) => SPOTLIGHT_BACKERS,
        None => ANY_BACKERS,
    }
}
