//! Launch date recovery from the updates timeline.
//!
//! Campaign pages stopped rendering their start date years ago; the
//! updates tab still pins a "launched" divider with a machine-readable
//! timestamp. Merged into the campaign records as a second pass.

use chrono::NaiveDate;
use scraper::Html;

use super::{parse_iso_date, select};

const LAUNCH_DIVIDER: &[&str] = &[
    "div.timeline__divider--launched time[datetime]",
    "section.js-launched time[datetime]",
];

pub fn launch_date(doc: &Html) -> Option<NaiveDate> {
    select::first_attr(doc, LAUNCH_DIVIDER, "datetime")
        .as_deref()
        .and_then(parse_iso_date)
}
