//! Reward tier extraction from the `/rewards` page.

use scraper::{ElementRef, Html};

use super::{select, text};
use crate::db::RewardRow;

/// Tier container variants, newest markup first. The first selector that
/// matches anything wins, so tiers never mix across layout generations.
const TIER_CONTAINERS: &[&str] = &[
    "article[data-test-id]",
    "li.pledge--available, li.pledge--all-gone, li.pledge--inactive",
    "li.pledge-selectable-sidebar",
];

const TITLE: &[&str] = &[
    r#"h3[class="support-700 semibold type-18 m0 mr1 text-wrap-balance break-word"]"#,
    "h3.pledge__title",
    "h2.pledge__title",
];
const PRICE: &[&str] = &[
    "span.pledge__currency-conversion > span",
    "span.pledge__amount span.money",
    "span.pledge__amount",
];
const DESCRIPTION: &[&str] = &[
    r#"p[class="type-14 lh20px mb0 support-700 text-prewrap"]"#,
    "div.pledge__reward-description p",
    "div.pledge__reward-description",
];
const BACKERS: &[&str] = &["span.pledge__backer-count"];
const LIMIT: &[&str] = &["span.pledge__limit"];
const ALL_GONE: &[&str] = &["span.pledge__limit--all-gone"];

/// Extract every reward tier, in document order. Sold-out tiers keep their
/// rendered position even when the page groups them separately.
pub fn extract(campaign_url: &str, doc: &Html) -> Vec<RewardRow> {
    select::elements(doc, TIER_CONTAINERS)
        .into_iter()
        .enumerate()
        .map(|(position, el)| tier(campaign_url, position as i64, el))
        .collect()
}

fn tier(campaign_url: &str, position: i64, el: ElementRef<'_>) -> RewardRow {
    let tier_id = el
        .value()
        .attr("id")
        .or_else(|| el.value().attr("data-test-id"))
        .map(str::to_string);

    let title = select::first_text_in(el, TITLE).map(|t| text::clean_text(&t));
    let price = select::first_text_in(el, PRICE).and_then(|t| text::digits_f64(&t));
    let description = select::first_text_in(el, DESCRIPTION).map(|t| text::clean_text(&t));

    let included: Vec<String> = select::all_in(el, "li.list-disc")
        .iter()
        .map(|item| text::clean_text(&item.text().collect::<String>()))
        .filter(|item| !item.is_empty())
        .collect();
    let items = if included.is_empty() {
        None
    } else {
        serde_json::to_string(&included).ok()
    };

    let delivery_date = select::first_attr_in(el, &["time[datetime]"], "datetime");

    // Detail rows render as [delivery, shipping]; a single row is just
    // the delivery restated, so shipping stays missing.
    let details = select::all_in(el, "span.pledge__detail-info");
    let shipping_location = if details.len() > 1 {
        let loc = text::clean_text(&details[1].text().collect::<String>());
        (!loc.is_empty()).then_some(loc)
    } else {
        None
    };

    let backers = select::first_text_in(el, BACKERS).and_then(|t| text::digits_i64(&t));

    // The limit badge ends with the cap ("Limited (45 left of 100)"), so
    // only the last token is parsed.
    let mut backer_limit = select::first_text_in(el, LIMIT)
        .and_then(|t| t.split_whitespace().last().map(str::to_string))
        .and_then(|last| text::digits_i64(&last));

    // An exhausted tier's badge carries no figure; the backer count is the
    // effective cap.
    let gone = if select::first_element_in(el, ALL_GONE).is_some() {
        backer_limit = backers;
        1
    } else {
        0
    };

    RewardRow {
        campaign_url: campaign_url.to_string(),
        position,
        tier_id,
        title,
        price,
        description,
        items,
        delivery_date,
        shipping_location,
        backers,
        backer_limit,
        gone,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REWARDS_PAGE: &str = r#"<html><body><ol>
        <li class="pledge--available" id="pledge_101">
            <h3 class="pledge__title">Early Bird</h3>
            <span class="pledge__amount"><span class="money">$10</span></span>
            <div class="pledge__reward-description"><p>A sticker pack.</p></div>
            <ul><li class="list-disc">Sticker sheet</li><li class="list-disc">Thank you card</li></ul>
            <span class="pledge__detail-info"><time datetime="2019-06-01">Jun 2019</time></span>
            <span class="pledge__detail-info">Ships worldwide</span>
            <span class="pledge__backer-count">10 backers</span>
        </li>
        <li class="pledge--all-gone" id="pledge_102">
            <h3 class="pledge__title">Signed Edition</h3>
            <span class="pledge__amount"><span class="money">$45</span></span>
            <div class="pledge__reward-description"><p>A signed print.</p></div>
            <span class="pledge__backer-count">5 backers</span>
            <span class="pledge__limit pledge__limit--all-gone mr2">Reward no longer available</span>
        </li>
        <li class="pledge--available" id="pledge_103">
            <h3 class="pledge__title">Collector Box</h3>
            <span class="pledge__amount"><span class="money">$120</span></span>
            <span class="pledge__backer-count">3 backers</span>
            <span class="pledge__limit">Limited (17 left of 20)</span>
        </li>
    </ol></body></html>"#;

    #[test]
    fn tiers_come_back_in_document_order() {
        let doc = Html::parse_document(REWARDS_PAGE);
        let tiers = extract("https://example.com/p/1", &doc);
        assert_eq!(tiers.len(), 3);
        assert_eq!(tiers[0].position, 0);
        assert_eq!(tiers[0].title.as_deref(), Some("Early Bird"));
        assert_eq!(tiers[1].position, 1);
        assert_eq!(tiers[1].title.as_deref(), Some("Signed Edition"));
        assert_eq!(tiers[2].position, 2);
    }

    #[test]
    fn open_tier_fields() {
        let doc = Html::parse_document(REWARDS_PAGE);
        let tiers = extract("https://example.com/p/1", &doc);
        let first = &tiers[0];
        assert_eq!(first.tier_id.as_deref(), Some("pledge_101"));
        assert_eq!(first.price, Some(10.0));
        assert_eq!(first.description.as_deref(), Some("A sticker pack."));
        assert_eq!(
            first.items.as_deref(),
            Some(r#"["Sticker sheet","Thank you card"]"#)
        );
        assert_eq!(first.delivery_date.as_deref(), Some("2019-06-01"));
        assert_eq!(first.shipping_location.as_deref(), Some("Ships worldwide"));
        assert_eq!(first.backers, Some(10));
        assert_eq!(first.backer_limit, None);
        assert_eq!(first.gone, 0);
    }

    #[test]
    fn all_gone_tier_backfills_limit_from_backers() {
        let doc = Html::parse_document(REWARDS_PAGE);
        let tiers = extract("https://example.com/p/1", &doc);
        let gone = &tiers[1];
        assert_eq!(gone.gone, 1);
        assert_eq!(gone.backers, Some(5));
        assert_eq!(gone.backer_limit, Some(5));
    }

    #[test]
    fn limit_badge_parses_last_token() {
        let doc = Html::parse_document(REWARDS_PAGE);
        let tiers = extract("https://example.com/p/1", &doc);
        assert_eq!(tiers[2].backer_limit, Some(20));
        assert_eq!(tiers[2].gone, 0);
    }

    #[test]
    fn missing_fields_stay_missing() {
        let doc = Html::parse_document(
            "<html><body><li class=\"pledge--available\" id=\"p1\"></li></body></html>",
        );
        let tiers = extract("u", &doc);
        assert_eq!(tiers.len(), 1);
        let tier = &tiers[0];
        assert_eq!(tier.title, None);
        assert_eq!(tier.price, None);
        assert_eq!(tier.backers, None);
        assert_eq!(tier.shipping_location, None);
    }

    #[test]
    fn no_tier_markup_means_no_tiers() {
        let doc = Html::parse_document("<html><body><p>nothing here</p></body></html>");
        assert!(extract("u", &doc).is_empty());
    }
}
