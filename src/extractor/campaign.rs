//! Campaign page extraction.
//!
//! Reads one captured campaign document (plus the optional `/rewards`
//! companion) into a [`CampaignRow`]. Field lookups go embedded JSON
//! first, then the status-gated HTML chains; anything that stays
//! unresolved is recorded as missing rather than guessed.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;
use scraper::Html;

use super::status::{self, Status};
use super::{
    blob, canonical_url, ids_from_url, money, parse_iso_date, rewards, select, taxonomy, text,
    ExtractedCampaign, PageContext, Unusable,
};
use crate::db::{CampaignRow, QualityFlagRow};

const OG_URL: &[&str] = &[r#"meta[property="og:url"]"#];
const META_DESCRIPTION: &[&str] = &[r#"meta[name="description"]"#];

/// Localized total rendered next to the native pledged figure on
/// non-USD campaigns ("About US$ 1,300").
const CONVERSION_PREVIEW: &[&str] = &[
    "div.type-12.medium.navy-600 span.money",
    "span.usd-conversion span.money",
];

const LIVE_DEADLINE: &[&str] = &["p.mb3.mb0-lg.type-12"];
const FUNDING_PERIOD: &[&str] = &[
    "div.NS_projects__funding_period time[datetime]",
    "p.f5 time[datetime]",
];

const HIGHLIGHT: &[&str] = &[
    r#"div[class="grid-row grid-row mb5-lg mb0-md order-0-md order-2-lg"]"#,
    "div.grid-row.mb5-lg.mb0-md",
];
const DESCRIPTION_CONTAINER: &[&str] = &["div.col.col-8.description-container"];
const PLAY_BUTTON: &str = "svg.svg-icon__icon--play";

const PWL_BADGE: &[&str] = &[r#"a[href*="projects-we-love"]"#];
const MAKE100_BADGE: &[&str] = &[r#"a[href*="make100"]"#];

/// Category and location render as sibling pills under the title block.
const CATEGORY_LOCATION_PILLS: &str = "span.ml1";

const CREATOR_PROJECT_COUNT: &[&str] = &["a.dark-grey-500.keyboard-focusable"];

const COMMENTS_BADGE: &[&str] = &[r#"data[itemprop="Project[comments_count]"]"#];
const UPDATES_BADGE: &[&str] = &[r#"a[data-content="updates"]"#];
const FAQ_BADGE: &[&str] = &[r#"a[data-content="faqs"]"#];
const COUNT_CHILD: &[&str] = &["span.count"];

const FULL_DESCRIPTION: &[&str] = &[
    r#"div[class="full-description js-full-description responsive-media formatted-lists"]"#,
    "div.full-description",
];
const RISKS: &[&str] = &[r#"div[class="mb3 mb10-sm mb3 js-risks"]"#, "div.js-risks"];

/// "March 14 2019 2:59 AM" inside the live countdown paragraph.
static DEADLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z][a-z]+ \d{1,2} \d{4} \d{1,2}:\d{2} [AP]M)").unwrap());

pub fn extract(
    doc: &Html,
    rewards_doc: Option<&Html>,
    ctx: &PageContext,
) -> Result<ExtractedCampaign, Unusable> {
    let url = select::first_attr(doc, OG_URL, "content")
        .map(|u| canonical_url(&u))
        .ok_or_else(|| Unusable::new(&ctx.source, "canonical og:url marker not found"))?;

    let (creator_id, project_id) = ids_from_url(&url);
    let initial = blob::project_initial(doc).unwrap_or_default();
    let intro = meta_intro(doc);
    let mut flags: Vec<QualityFlagRow> = Vec::new();

    let title = initial.name.clone().or(intro.title);
    let creator_name = initial
        .creator
        .as_ref()
        .and_then(|c| c.name.clone())
        .or(intro.creator);
    let blurb = initial.blurb.clone().or(intro.blurb);

    let status_val = status::classify(doc, initial.state.as_deref());

    let backers = initial.backers_count.or_else(|| {
        select::first_text(doc, status::backers_chain(status_val))
            .and_then(|t| text::digits_i64(&t))
    });

    let goal_money =
        select::first_text(doc, status::goal_chain(status_val)).and_then(|t| money::parse(&t));
    let pledged_money =
        select::first_text(doc, status::pledged_chain(status_val)).and_then(|t| money::parse(&t));
    let preview = select::first_text(doc, CONVERSION_PREVIEW).and_then(|t| money::parse(&t));

    // Pledged is the reference pair for the rate: the preview restates it
    // in the display currency. Pages without a preview convert at 1.0.
    let (conversion_rate, preview_symbol) = match (&pledged_money, &preview) {
        (Some(native), Some(display)) => (
            money::conversion_rate(native.amount, display.amount),
            Some(display.symbol.clone()),
        ),
        _ => (1.0, None),
    };

    let original_curr_symbol = pledged_money
        .as_ref()
        .map(|m| m.symbol.clone())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            goal_money
                .as_ref()
                .map(|m| m.symbol.clone())
                .filter(|s| !s.is_empty())
        });
    let converted_curr_symbol = preview_symbol
        .filter(|s| !s.is_empty())
        .or_else(|| original_curr_symbol.clone());

    let goal = goal_money.as_ref().map(|m| m.amount);
    let pledged = pledged_money.as_ref().map(|m| m.amount);
    let converted_goal = goal.map(|g| g * conversion_rate);
    let converted_pledged = pledged.map(|p| p * conversion_rate);

    let end = initial
        .deadline_at
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.date_naive())
        .or_else(|| match status_val {
            Some(Status::Live) => live_end(doc),
            Some(_) => funding_end(doc),
            None => live_end(doc).or_else(|| funding_end(doc)),
        });
    let (endday, endmonth, endyear) = split_date(end);

    let (num_photos, num_videos) = media_counts(doc);

    let pwl = match initial.is_project_we_love {
        Some(flag) => Some(i64::from(flag)),
        None => Some(i64::from(select::first_element(doc, PWL_BADGE).is_some())),
    };
    let make100 = Some(i64::from(select::first_element(doc, MAKE100_BADGE).is_some()));

    let pills = select::all_texts(doc, CATEGORY_LOCATION_PILLS);
    let raw_category = initial
        .category
        .as_ref()
        .and_then(|c| c.name.clone())
        .or_else(|| pills.first().map(|p| text::clean_text(p)));
    let location = initial
        .location
        .as_ref()
        .and_then(|l| l.displayable_name.clone())
        .or_else(|| pills.last().map(|p| text::clean_text(p)));

    let (category, subcategory) = match raw_category.filter(|c| !c.is_empty()) {
        None => (None, None),
        Some(raw) => match taxonomy::resolve(&raw) {
            Ok((parent, sub)) => (Some(parent.to_string()), sub.map(str::to_string)),
            Err(_) => {
                flags.push(QualityFlagRow {
                    url: url.clone(),
                    field: "category".to_string(),
                    value: raw,
                });
                (None, None)
            }
        },
    };

    let collaborators = initial.collaborators.as_ref().map(|c| {
        let entries: Vec<[String; 3]> = c
            .edges
            .iter()
            .map(|edge| {
                [
                    edge.node.name.clone().unwrap_or_default(),
                    edge.node.url.clone().unwrap_or_default(),
                    edge.title.clone().unwrap_or_default(),
                ]
            })
            .collect();
        serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string())
    });

    let num_projects = initial
        .creator
        .as_ref()
        .and_then(|c| c.created_count())
        .or_else(|| {
            select::first_text(doc, CREATOR_PROJECT_COUNT)
                .and_then(|t| t.split_whitespace().next().map(str::to_string))
                .and_then(|first| text::digits_i64(&first))
        });
    let num_backed = initial.creator.as_ref().and_then(|c| c.backed_count());

    let num_comments = badge_count(doc, COMMENTS_BADGE, &[]);
    let num_updates = badge_count(doc, UPDATES_BADGE, COUNT_CHILD);
    let num_faq = badge_count(doc, FAQ_BADGE, COUNT_CHILD);

    let description = select::first_text(doc, FULL_DESCRIPTION);
    let risk = select::first_text(doc, RISKS).and_then(|r| strip_risk_frame(&r));

    let tiers = rewards_doc
        .map(|d| rewards::extract(&url, d))
        .unwrap_or_default();
    let num_rewards = rewards_doc.map(|_| tiers.len() as i64);

    let record = CampaignRow {
        url,
        project_id,
        creator_id,
        date_accessed: ctx.date_accessed(),
        time_accessed: ctx.time_accessed(),
        title,
        creator_name,
        blurb,
        verified_identity: initial.verified_identity.clone(),
        status: status_val.map(|s| s.as_str().to_string()),
        backers,
        collaborators,
        original_curr_symbol,
        converted_curr_symbol,
        conversion_rate,
        goal,
        converted_goal,
        pledged,
        converted_pledged,
        startday: None,
        startmonth: None,
        startyear: None,
        endday,
        endmonth,
        endyear,
        num_photos,
        num_videos,
        pwl,
        make100,
        category,
        subcategory,
        location,
        num_projects,
        num_backed,
        num_comments,
        num_updates,
        num_faq,
        description,
        risk,
        num_rewards,
    };

    Ok(ExtractedCampaign {
        record,
        rewards: tiers,
        flags,
    })
}

#[derive(Debug, Default)]
struct MetaIntro {
    creator: Option<String>,
    title: Option<String>,
    blurb: Option<String>,
}

/// The description meta tag opens with "<creator> is raising funds for
/// <title> on Kickstarter!" and closes with the blurb on its own line.
fn meta_intro(doc: &Html) -> MetaIntro {
    let content = match select::first_attr(doc, META_DESCRIPTION, "content") {
        Some(content) => content,
        None => return MetaIntro::default(),
    };
    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());
    let headline = match lines.next() {
        Some(line) => line,
        None => return MetaIntro::default(),
    };
    let blurb = lines.last().map(str::to_string);

    let (creator, title) = match headline.split_once(" is raising funds for ") {
        Some((creator, rest)) => {
            let rest = rest.trim();
            let title = rest
                .strip_suffix(" on Kickstarter!")
                .or_else(|| rest.strip_suffix(" on Kickstarter"))
                .unwrap_or(rest)
                .trim();
            (Some(creator.trim().to_string()), Some(title.to_string()))
        }
        None => (None, None),
    };

    MetaIntro {
        creator,
        title,
        blurb,
    }
}

fn live_end(doc: &Html) -> Option<NaiveDate> {
    let raw = select::first_text(doc, LIVE_DEADLINE)?;
    let cleaned = text::clean_text(&raw);
    let stamp = DEADLINE_RE.captures(&cleaned)?.get(1)?.as_str().to_string();
    NaiveDateTime::parse_from_str(&stamp, "%B %d %Y %I:%M %p")
        .ok()
        .map(|dt| dt.date())
}

/// Finished pages list the funding period as two `time` elements; the
/// last one is the close.
fn funding_end(doc: &Html) -> Option<NaiveDate> {
    for sel in FUNDING_PERIOD {
        let stamps = select::all_attrs(doc, sel, "datetime");
        if let Some(last) = stamps.last() {
            return parse_iso_date(last);
        }
    }
    None
}

fn split_date(date: Option<NaiveDate>) -> (Option<i64>, Option<i64>, Option<i64>) {
    match date {
        Some(d) => (
            Some(i64::from(d.day())),
            Some(i64::from(d.month())),
            Some(i64::from(d.year())),
        ),
        None => (None, None, None),
    }
}

/// Photos and videos across the media highlight and the story body. A
/// play overlay in the highlight marks a video player; otherwise plain
/// `video` elements and oEmbed shells are counted.
fn media_counts(doc: &Html) -> (i64, i64) {
    let mut photos = 0i64;
    let mut videos = 0i64;
    if let Some(highlight) = select::first_element(doc, HIGHLIGHT) {
        photos += select::count_in(highlight, "img") as i64;
        let plays = select::count_in(highlight, PLAY_BUTTON);
        videos += if plays > 0 {
            plays as i64
        } else {
            select::count_in(highlight, "video") as i64
        };
    }
    if let Some(body) = select::first_element(doc, DESCRIPTION_CONTAINER) {
        photos += select::count_in(body, "img") as i64;
        videos += select::count_in(body, "video") as i64;
        videos += select::count_in(body, "div.template.oembed") as i64;
    }
    (photos, videos)
}

/// A counter badge that exists without a count child reads as zero; a
/// badge the page never rendered reads as missing.
fn badge_count(doc: &Html, anchor: &[&str], count_child: &[&str]) -> Option<i64> {
    let badge = select::first_element(doc, anchor)?;
    let figure = if count_child.is_empty() {
        badge.text().collect::<String>()
    } else {
        match select::first_element_in(badge, count_child) {
            Some(child) => child.text().collect::<String>(),
            None => return Some(0),
        }
    };
    Some(text::digits_i64(&figure).unwrap_or(0))
}

/// The risks section opens with its heading line and closes with the
/// accountability link line; only what sits between is the statement.
fn strip_risk_frame(raw: &str) -> Option<String> {
    let lines: Vec<&str> = raw.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.len() <= 2 {
        return None;
    }
    Some(lines[1..lines.len() - 1].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::PageContext;

    fn fixture(name: &str) -> Html {
        let path = format!("tests/fixtures/{name}");
        let html = std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("read {path}: {e}"));
        Html::parse_document(&html)
    }

    fn ctx() -> PageContext {
        PageContext::new("tests/fixtures/live_campaign.html", Some("20190312-010622".to_string()))
    }

    #[test]
    fn live_campaign_end_to_end() {
        let doc = fixture("live_campaign.html");
        let rewards_doc = fixture("rewards_page.html");
        let out = extract(&doc, Some(&rewards_doc), &ctx()).unwrap();
        let c = &out.record;

        assert_eq!(c.url, "https://www.kickstarter.com/projects/janemaker/solar-lantern");
        assert_eq!(c.creator_id.as_deref(), Some("janemaker"));
        assert_eq!(c.project_id.as_deref(), Some("solar-lantern"));
        assert_eq!(c.date_accessed.as_deref(), Some("20190312"));
        assert_eq!(c.time_accessed.as_deref(), Some("010622"));

        assert_eq!(c.title.as_deref(), Some("Solar Lantern"));
        assert_eq!(c.creator_name.as_deref(), Some("Jane Maker"));
        assert_eq!(c.blurb.as_deref(), Some("A lantern that charges itself."));
        assert_eq!(c.status.as_deref(), Some("Live"));

        // "$1,234 goal" and "$2,500 pledged"; no conversion preview on a
        // USD page, so the rate stays 1.0.
        assert_eq!(c.goal, Some(1234.0));
        assert_eq!(c.pledged, Some(2500.0));
        assert_eq!(c.conversion_rate, 1.0);
        assert_eq!(c.converted_goal, Some(1234.0));
        assert_eq!(c.converted_pledged, Some(2500.0));
        assert_eq!(c.original_curr_symbol.as_deref(), Some("$"));
        assert_eq!(c.converted_curr_symbol.as_deref(), Some("$"));

        assert_eq!(c.backers, Some(56));
        assert_eq!((c.endday, c.endmonth, c.endyear), (Some(14), Some(3), Some(2019)));
        assert_eq!(c.category.as_deref(), Some("Technology"));
        assert_eq!(c.subcategory.as_deref(), Some("Gadgets"));
        assert_eq!(c.location.as_deref(), Some("Portland, OR"));

        assert_eq!(c.num_comments, Some(7));
        assert_eq!(c.num_updates, Some(3));
        // FAQ badge present but no count child.
        assert_eq!(c.num_faq, Some(0));

        assert_eq!(c.num_rewards, Some(2));
        assert_eq!(out.rewards.len(), 2);
        assert_eq!(out.rewards[0].backer_limit, None);
        assert_eq!(out.rewards[1].gone, 1);
        assert_eq!(out.rewards[1].backers, Some(5));
        assert_eq!(out.rewards[1].backer_limit, Some(5));

        assert!(out.flags.is_empty());
        // Start date is merged later from the updates timeline.
        assert_eq!(c.startday, None);
    }

    #[test]
    fn spotlight_campaign_reads_finished_layout() {
        let doc = fixture("spotlight_campaign.html");
        let out = extract(&doc, None, &ctx()).unwrap();
        let c = &out.record;

        assert_eq!(c.status.as_deref(), Some("Successful"));
        assert_eq!(c.pledged, Some(602874.0));
        assert_eq!(c.goal, Some(500000.0));
        assert_eq!(c.backers, Some(8120));
        assert_eq!(c.original_curr_symbol.as_deref(), Some("£"));
        assert_eq!((c.endday, c.endmonth, c.endyear), (Some(1), Some(4), Some(2019)));

        // No rewards document captured: count is missing, not zero.
        assert_eq!(c.num_rewards, None);
        assert!(out.rewards.is_empty());
    }

    #[test]
    fn page_without_canonical_url_is_unusable() {
        let doc = Html::parse_document(
            "<html><head><title>Attention Required</title></head><body><div id=\"px-captcha\"></div></body></html>",
        );
        let err = extract(&doc, None, &ctx()).unwrap_err();
        assert!(err.to_string().contains("og:url"));
    }

    #[test]
    fn unknown_category_is_flagged_not_guessed() {
        let html = r#"<html><head>
            <meta property="og:url" content="https://www.kickstarter.com/projects/a/b">
        </head><body>
            <span class="ml1">Quantum Baskets</span>
            <span class="ml1">Austin, TX</span>
        </body></html>"#;
        let doc = Html::parse_document(html);
        let out = extract(&doc, None, &ctx()).unwrap();
        assert_eq!(out.record.category, None);
        assert_eq!(out.record.subcategory, None);
        assert_eq!(out.flags.len(), 1);
        assert_eq!(out.flags[0].field, "category");
        assert_eq!(out.flags[0].value, "Quantum Baskets");
    }

    #[test]
    fn missing_fields_stay_missing_without_errors() {
        let html = r#"<html><head>
            <meta property="og:url" content="https://www.kickstarter.com/projects/a/b?ref=discovery">
        </head><body><p>bare page</p></body></html>"#;
        let doc = Html::parse_document(html);
        let out = extract(&doc, None, &ctx()).unwrap();
        let c = &out.record;

        // Query string is stripped from the canonical url.
        assert_eq!(c.url, "https://www.kickstarter.com/projects/a/b");
        assert_eq!(c.title, None);
        assert_eq!(c.goal, None);
        assert_eq!(c.pledged, None);
        assert_eq!(c.conversion_rate, 1.0);
        assert_eq!(c.status, None);
        assert_eq!(c.backers, None);
        // Counter badges absent from the page entirely.
        assert_eq!(c.num_comments, None);
        assert_eq!(c.num_updates, None);
        assert_eq!(c.num_faq, None);
    }
}
