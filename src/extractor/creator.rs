//! Creator profile extraction.
//!
//! The about page carries the biography block; the created/backed listing
//! pages carry `data-projects` payloads that are concatenated across
//! pagination in page order.

use scraper::Html;

use super::{
    blob, canonical_url, parse_iso_date, select, taxonomy, text, ExtractedCreator, PageContext,
    Unusable,
};
use crate::db::{CreatorProjectRow, CreatorRow, QualityFlagRow};

const OG_URL: &[&str] = &[r#"meta[property="og:url"]"#];
const OG_TITLE: &[&str] = &[r#"meta[property="og:title"]"#];
const NAME: &[&str] = &["h1.h5.bold", "h1"];
const JOINED: &[&str] = &["span.joined time[datetime]", "span.joined > time"];
const LOCATION: &[&str] = &["span.location > a", "span.location"];
const BIOGRAPHY: &[&str] = &[
    r#"div[class="grid-col-12 grid-col-8-sm grid-col-6-md"]"#,
    "div.readability",
    "div.bio",
];
const CREATED_COUNT: &[&str] = &["span.created a", "span.created"];
const BACKED_COUNT: &[&str] = &["span.backed a", "span.backed"];
const COMMENTS: &[&str] = &["div.comments-list p", "ol.comments p"];

pub fn extract(
    about: &Html,
    created: &[Html],
    backed: &[Html],
    ctx: &PageContext,
) -> Result<ExtractedCreator, Unusable> {
    let url = select::first_attr(about, OG_URL, "content")
        .map(|u| canonical_url(&u))
        .ok_or_else(|| Unusable::new(&ctx.source, "canonical og:url marker not found"))?;

    let creator_id = url
        .split('/')
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string);

    let name = select::first_attr(about, OG_TITLE, "content")
        .map(|n| text::clean_text(&n))
        .or_else(|| select::first_text(about, NAME).map(|n| text::clean_text(&n)));

    let joined = select::first_attr(about, JOINED, "datetime")
        .as_deref()
        .and_then(parse_iso_date);
    let (join_day, join_month, join_year) = match joined {
        Some(d) => {
            use chrono::Datelike;
            (
                Some(i64::from(d.day())),
                Some(i64::from(d.month())),
                Some(i64::from(d.year())),
            )
        }
        None => (None, None, None),
    };

    let location = select::first_text(about, LOCATION).map(|l| text::clean_text(&l));
    let biography = select::first_text(about, BIOGRAPHY);

    let social = social_flags(about);

    let comment_texts: Vec<String> = comments(about);
    let comments_json = if comment_texts.is_empty() {
        None
    } else {
        serde_json::to_string(&comment_texts).ok()
    };

    let mut flags: Vec<QualityFlagRow> = Vec::new();
    let mut projects: Vec<CreatorProjectRow> = Vec::new();

    let created_summaries = blob::project_summaries(created);
    for (i, summary) in created_summaries.iter().enumerate() {
        projects.push(summary_row(&url, "created", i as i64, summary, &mut flags));
    }
    let backed_summaries = blob::project_summaries(backed);
    for (i, summary) in backed_summaries.iter().enumerate() {
        projects.push(summary_row(&url, "backed", i as i64, summary, &mut flags));
    }

    // Sidebar badges are authoritative; a complete listing stands in when
    // the badge is missing.
    let num_created = select::first_text(about, CREATED_COUNT)
        .and_then(|t| text::digits_i64(&t))
        .or_else(|| (!created.is_empty()).then_some(created_summaries.len() as i64));
    let num_backed = select::first_text(about, BACKED_COUNT)
        .and_then(|t| text::digits_i64(&t))
        .or_else(|| (!backed.is_empty()).then_some(backed_summaries.len() as i64));

    let record = CreatorRow {
        url,
        creator_id,
        date_accessed: ctx.date_accessed(),
        time_accessed: ctx.time_accessed(),
        name,
        join_day,
        join_month,
        join_year,
        location,
        biography,
        num_created,
        num_backed,
        has_website: i64::from(social.website),
        has_facebook: i64::from(social.facebook),
        has_twitter: i64::from(social.twitter),
        has_instagram: i64::from(social.instagram),
        has_youtube: i64::from(social.youtube),
        comments: comments_json,
    };

    Ok(ExtractedCreator {
        record,
        projects,
        flags,
    })
}

fn summary_row(
    creator_url: &str,
    list: &'static str,
    position: i64,
    summary: &blob::ProjectSummaryJson,
    flags: &mut Vec<QualityFlagRow>,
) -> CreatorProjectRow {
    let mut goal = summary.goal;
    let mut pledged = summary.pledged;
    let mut currency = summary.currency.clone();

    // Listing payloads carry native amounts plus the rate that was frozen
    // when the project closed; apply it once and file the row in USD.
    if let (Some(code), Some(rate)) = (currency.as_deref(), summary.static_usd_rate) {
        if code != "USD" && rate > 0.0 {
            goal = goal.map(|g| g * rate);
            pledged = pledged.map(|p| p * rate);
            currency = Some("USD".to_string());
        }
    }

    let (category, subcategory) = match summary.category.as_ref().and_then(|c| c.name.clone()) {
        None => (None, None),
        Some(raw) => match taxonomy::resolve(&raw) {
            Ok((parent, sub)) => (Some(parent.to_string()), sub.map(str::to_string)),
            Err(_) => {
                flags.push(QualityFlagRow {
                    url: creator_url.to_string(),
                    field: "project_category".to_string(),
                    value: raw,
                });
                (None, None)
            }
        },
    };

    CreatorProjectRow {
        creator_url: creator_url.to_string(),
        list: list.to_string(),
        position,
        name: summary.name.clone(),
        url: summary.web_url(),
        project_creator_id: summary.creator.as_ref().and_then(|c| c.id),
        blurb: summary.blurb.clone(),
        currency,
        goal,
        pledged,
        backers: summary.backers_count,
        state: summary.state.clone(),
        staff_pick: summary.staff_pick.map(i64::from),
        location: summary.location.as_ref().and_then(|l| {
            l.displayable_name.clone().or_else(|| l.name.clone())
        }),
        category,
        subcategory,
        created_at_ts: summary.created_at,
        launched_at_ts: summary.launched_at,
        deadline_ts: summary.deadline,
    }
}

#[derive(Debug, Default)]
struct SocialFlags {
    website: bool,
    facebook: bool,
    twitter: bool,
    instagram: bool,
    youtube: bool,
}

/// Classify every external link on the profile by host. Anything that is
/// neither the site itself nor a known social network counts as a
/// personal website.
fn social_flags(doc: &Html) -> SocialFlags {
    let mut flags = SocialFlags::default();
    for href in select::all_attrs(doc, "a[href]", "href") {
        let lower = href.to_lowercase();
        let host = match link_host(&lower) {
            Some(host) => host,
            None => continue,
        };
        if host == "kickstarter.com" || host.ends_with(".kickstarter.com") {
            continue;
        }
        if host == "facebook.com" || host.ends_with(".facebook.com") {
            flags.facebook = true;
        } else if host == "twitter.com" || host.ends_with(".twitter.com") || host == "x.com" {
            flags.twitter = true;
        } else if host == "instagram.com" || host.ends_with(".instagram.com") {
            flags.instagram = true;
        } else if host == "youtube.com" || host.ends_with(".youtube.com") || host == "youtu.be" {
            flags.youtube = true;
        } else {
            flags.website = true;
        }
    }
    flags
}

fn link_host(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))?;
    let host = rest.split(['/', '?', '#']).next()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

fn comments(doc: &Html) -> Vec<String> {
    for sel in COMMENTS {
        let found: Vec<String> = select::all_texts(doc, sel)
            .iter()
            .map(|t| text::clean_text(t))
            .filter(|t| !t.is_empty())
            .collect();
        if !found.is_empty() {
            return found;
        }
    }
    Vec::new()
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
        PageContext::new(
            "tests/fixtures/creator_about.html",
            Some("20190315-143000".to_string()),
        )
    }

    #[test]
    fn profile_end_to_end() {
        let about = fixture("creator_about.html");
        let created = vec![fixture("creator_created_p1.html")];
        let out = extract(&about, &created, &[], &ctx()).unwrap();
        let c = &out.record;

        assert_eq!(c.url, "https://www.kickstarter.com/profile/janemaker");
        assert_eq!(c.creator_id.as_deref(), Some("janemaker"));
        assert_eq!(c.name.as_deref(), Some("Jane Maker"));
        assert_eq!((c.join_day, c.join_month, c.join_year), (Some(16), Some(4), Some(2013)));
        assert_eq!(c.location.as_deref(), Some("Portland, OR"));
        assert!(c.biography.as_deref().unwrap_or("").contains("builds lanterns"));
        assert_eq!(c.num_created, Some(3));
        assert_eq!(c.num_backed, Some(12));

        assert_eq!(c.has_website, 1);
        assert_eq!(c.has_facebook, 1);
        assert_eq!(c.has_twitter, 1);
        assert_eq!(c.has_instagram, 0);
        assert_eq!(c.has_youtube, 0);

        let comments: Vec<String> = serde_json::from_str(c.comments.as_deref().unwrap()).unwrap();
        assert_eq!(comments.len(), 2);
    }

    #[test]
    fn listing_rows_keep_order_and_convert_to_usd() {
        let about = fixture("creator_about.html");
        let created = vec![fixture("creator_created_p1.html")];
        let out = extract(&about, &created, &[], &ctx()).unwrap();

        assert_eq!(out.projects.len(), 3);
        assert!(out.projects.iter().all(|p| p.list == "created"));
        assert_eq!(
            out.projects.iter().map(|p| p.position).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        // USD project passes through untouched.
        let usd = &out.projects[0];
        assert_eq!(usd.currency.as_deref(), Some("USD"));
        assert_eq!(usd.goal, Some(500.0));
        assert_eq!(usd.pledged, Some(812.0));

        // EUR project is filed in USD at its frozen rate.
        let eur = &out.projects[1];
        assert_eq!(eur.currency.as_deref(), Some("USD"));
        assert!((eur.goal.unwrap() - 1100.0).abs() < 1e-6);
        assert!((eur.pledged.unwrap() - 2200.0).abs() < 1e-6);
        assert_eq!(eur.state.as_deref(), Some("successful"));

        // Category labels resolve through the same taxonomy as campaigns.
        assert_eq!(usd.category.as_deref(), Some("Games"));
        assert_eq!(usd.subcategory.as_deref(), Some("Tabletop Games"));
    }

    #[test]
    fn profile_without_canonical_url_is_unusable() {
        let about = Html::parse_document("<html><body><div class=\"center\">Account deleted</div></body></html>");
        assert!(extract(&about, &[], &[], &ctx()).is_err());
    }

    #[test]
    fn social_hosts_do_not_match_on_substrings() {
        let doc = Html::parse_document(
            r#"<html><body>
                <a href="https://max.com/show">watch</a>
                <a href="https://x.com/janemaker">posts</a>
            </body></html>"#,
        );
        let flags = social_flags(&doc);
        assert!(flags.twitter);
        assert!(flags.website);
        assert!(!flags.facebook);
    }
}
