use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use crate::db::{self, CampaignRow, CreatorProjectRow, CreatorRow, RewardRow};

/// Hard cap on flattened reward-tier column groups so the CSV schema
/// stays bounded no matter what a page claims to offer.
const TIER_GROUP_CAP: usize = 127;

/// Per-tier column suffixes, one group per tier position (0-based).
const TIER_FIELDS: [&str; 10] = [
    "rd_id",
    "rd_title",
    "rd_price",
    "rd_desc",
    "rd_list",
    "rd_delivery_date",
    "rd_shipping_location",
    "rd_backers",
    "rd_limit",
    "rd_gone",
];

const CAMPAIGN_HEADER: [&str; 40] = [
    "url", "project_id", "creator_id", "date_accessed", "time_accessed", "title",
    "creator_name", "blurb", "verified_identity", "status", "backers", "collaborators",
    "original_curr_symbol", "converted_curr_symbol", "conversion_rate", "goal",
    "converted_goal", "pledged", "converted_pledged", "startday", "startmonth",
    "startyear", "endday", "endmonth", "endyear", "num_photos", "num_videos", "pwl",
    "make100", "category", "subcategory", "location", "num_projects", "num_backed",
    "num_comments", "num_updates", "num_faq", "description", "risk", "num_rewards",
];

const CREATOR_HEADER: [&str; 18] = [
    "url", "creator_id", "date_accessed", "time_accessed", "name", "join_day",
    "join_month", "join_year", "location", "biography", "num_created", "num_backed",
    "has_website", "has_facebook", "has_twitter", "has_instagram", "has_youtube",
    "comments",
];

const PROJECT_HEADER: [&str; 19] = [
    "creator_url", "list", "position", "name", "url", "project_creator_id", "blurb",
    "currency", "goal", "pledged", "backers", "state", "staff_pick", "location",
    "category", "subcategory", "created_at_ts", "launched_at_ts", "deadline_ts",
];

/// Write every exportable table under `out_dir` as CSV.
pub fn export_csv(conn: &Connection, out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let campaigns = db::fetch_campaigns_with_rewards(conn)?;
    let creators = db::fetch_creators_with_projects(conn)?;
    let missing = db::fetch_missing(conn)?;

    let path = out_dir.join("campaigns.csv");
    write_campaigns_csv(create(&path)?, &campaigns)?;
    info!("Wrote {} campaigns to {}", campaigns.len(), path.display());

    let path = out_dir.join("creators.csv");
    write_creators_csv(create(&path)?, &creators)?;
    info!("Wrote {} creators to {}", creators.len(), path.display());

    let path = out_dir.join("creator_projects.csv");
    let projects = write_projects_csv(create(&path)?, &creators)?;
    info!("Wrote {} creator projects to {}", projects, path.display());

    let path = out_dir.join("missing.csv");
    write_missing_csv(create(&path)?, &missing)?;
    info!("Wrote {} missing pages to {}", missing.len(), path.display());

    Ok(())
}

/// Nested record exports: reward tiers and project lists carried as arrays.
pub fn export_json(conn: &Connection, out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    #[derive(Serialize)]
    struct CampaignDoc<'a> {
        #[serde(flatten)]
        campaign: &'a CampaignRow,
        rewards: &'a [RewardRow],
    }

    #[derive(Serialize)]
    struct CreatorDoc<'a> {
        #[serde(flatten)]
        creator: &'a CreatorRow,
        created: Vec<&'a CreatorProjectRow>,
        backed: Vec<&'a CreatorProjectRow>,
    }

    let campaigns = db::fetch_campaigns_with_rewards(conn)?;
    let docs: Vec<CampaignDoc> = campaigns
        .iter()
        .map(|(c, tiers)| CampaignDoc {
            campaign: c,
            rewards: tiers,
        })
        .collect();
    let path = out_dir.join("campaigns.json");
    serde_json::to_writer_pretty(BufWriter::new(create(&path)?), &docs)?;
    info!("Wrote {} campaigns to {}", docs.len(), path.display());

    let creators = db::fetch_creators_with_projects(conn)?;
    let docs: Vec<CreatorDoc> = creators
        .iter()
        .map(|(c, projects)| CreatorDoc {
            creator: c,
            created: projects.iter().filter(|p| p.list == "created").collect(),
            backed: projects.iter().filter(|p| p.list == "backed").collect(),
        })
        .collect();
    let path = out_dir.join("creators.json");
    serde_json::to_writer_pretty(BufWriter::new(create(&path)?), &docs)?;
    info!("Wrote {} creators to {}", docs.len(), path.display());

    Ok(())
}

fn create(path: &Path) -> Result<fs::File> {
    fs::File::create(path).with_context(|| format!("creating {}", path.display()))
}

/// One row per campaign; tiers flattened into `rd_*_N` column groups padded
/// to the batch-wide maximum tier count.
fn write_campaigns_csv<W: Write>(
    out: W,
    rows: &[(CampaignRow, Vec<RewardRow>)],
) -> Result<()> {
    let groups = rows
        .iter()
        .map(|(_, tiers)| tiers.len())
        .max()
        .unwrap_or(0)
        .min(TIER_GROUP_CAP);

    let mut header: Vec<String> = CAMPAIGN_HEADER.iter().map(|s| s.to_string()).collect();
    for n in 0..groups {
        for field in TIER_FIELDS {
            header.push(format!("{}_{}", field, n));
        }
    }

    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(&header)?;
    for (campaign, tiers) in rows {
        let mut record = campaign_cells(campaign);
        for n in 0..groups {
            match tiers.get(n) {
                Some(tier) => record.extend(tier_cells(tier)),
                None => record.extend(std::iter::repeat(String::new()).take(TIER_FIELDS.len())),
            }
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_creators_csv<W: Write>(
    out: W,
    rows: &[(CreatorRow, Vec<CreatorProjectRow>)],
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(CREATOR_HEADER)?;
    for (creator, _) in rows {
        wtr.write_record(creator_cells(creator))?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_projects_csv<W: Write>(
    out: W,
    rows: &[(CreatorRow, Vec<CreatorProjectRow>)],
) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(PROJECT_HEADER)?;
    let mut count = 0usize;
    for (_, projects) in rows {
        for project in projects {
            wtr.write_record(project_cells(project))?;
            count += 1;
        }
    }
    wtr.flush()?;
    Ok(count)
}

fn write_missing_csv<W: Write>(out: W, rows: &[(String, String, String)]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(["url", "reason", "noted_at"])?;
    for (url, reason, noted_at) in rows {
        wtr.write_record([url, reason, noted_at])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Missing value serializes as the empty string.
fn cell<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

fn campaign_cells(c: &CampaignRow) -> Vec<String> {
    vec![
        c.url.clone(),
        cell(&c.project_id),
        cell(&c.creator_id),
        cell(&c.date_accessed),
        cell(&c.time_accessed),
        cell(&c.title),
        cell(&c.creator_name),
        cell(&c.blurb),
        cell(&c.verified_identity),
        cell(&c.status),
        cell(&c.backers),
        cell(&c.collaborators),
        cell(&c.original_curr_symbol),
        cell(&c.converted_curr_symbol),
        c.conversion_rate.to_string(),
        cell(&c.goal),
        cell(&c.converted_goal),
        cell(&c.pledged),
        cell(&c.converted_pledged),
        cell(&c.startday),
        cell(&c.startmonth),
        cell(&c.startyear),
        cell(&c.endday),
        cell(&c.endmonth),
        cell(&c.endyear),
        c.num_photos.to_string(),
        c.num_videos.to_string(),
        cell(&c.pwl),
        cell(&c.make100),
        cell(&c.category),
        cell(&c.subcategory),
        cell(&c.location),
        cell(&c.num_projects),
        cell(&c.num_backed),
        cell(&c.num_comments),
        cell(&c.num_updates),
        cell(&c.num_faq),
        cell(&c.description),
        cell(&c.risk),
        cell(&c.num_rewards),
    ]
}

fn tier_cells(t: &RewardRow) -> Vec<String> {
    vec![
        cell(&t.tier_id),
        cell(&t.title),
        cell(&t.price),
        cell(&t.description),
        cell(&t.items),
        cell(&t.delivery_date),
        cell(&t.shipping_location),
        cell(&t.backers),
        cell(&t.backer_limit),
        t.gone.to_string(),
    ]
}

fn creator_cells(c: &CreatorRow) -> Vec<String> {
    vec![
        c.url.clone(),
        cell(&c.creator_id),
        cell(&c.date_accessed),
        cell(&c.time_accessed),
        cell(&c.name),
        cell(&c.join_day),
        cell(&c.join_month),
        cell(&c.join_year),
        cell(&c.location),
        cell(&c.biography),
        cell(&c.num_created),
        cell(&c.num_backed),
        c.has_website.to_string(),
        c.has_facebook.to_string(),
        c.has_twitter.to_string(),
        c.has_instagram.to_string(),
        c.has_youtube.to_string(),
        cell(&c.comments),
    ]
}

fn project_cells(p: &CreatorProjectRow) -> Vec<String> {
    vec![
        p.creator_url.clone(),
        p.list.clone(),
        p.position.to_string(),
        cell(&p.name),
        cell(&p.url),
        cell(&p.project_creator_id),
        cell(&p.blurb),
        cell(&p.currency),
        cell(&p.goal),
        cell(&p.pledged),
        cell(&p.backers),
        cell(&p.state),
        cell(&p.staff_pick),
        cell(&p.location),
        cell(&p.category),
        cell(&p.subcategory),
        cell(&p.created_at_ts),
        cell(&p.launched_at_ts),
        cell(&p.deadline_ts),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign(url: &str) -> CampaignRow {
        CampaignRow {
            url: url.to_string(),
            title: Some("Solar Lantern".to_string()),
            goal: Some(1234.0),
            pledged: Some(2500.5),
            conversion_rate: 1.0,
            backers: Some(56),
            ..Default::default()
        }
    }

    fn tier(pos: i64, title: &str) -> RewardRow {
        RewardRow {
            campaign_url: "u".to_string(),
            position: pos,
            title: Some(title.to_string()),
            price: Some(10.0),
            gone: 0,
            ..Default::default()
        }
    }

    fn read_rows(bytes: &[u8]) -> Vec<Vec<String>> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(bytes);
        rdr.records()
            .map(|r| r.unwrap().iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn tier_groups_pad_to_batch_max() {
        let rows = vec![
            (campaign("a"), vec![tier(0, "One"), tier(1, "Two")]),
            (campaign("b"), vec![tier(0, "Solo")]),
            (campaign("c"), vec![]),
        ];
        let mut buf = Vec::new();
        write_campaigns_csv(&mut buf, &rows).unwrap();

        let parsed = read_rows(&buf);
        let width = CAMPAIGN_HEADER.len() + 2 * TIER_FIELDS.len();
        assert!(parsed.iter().all(|r| r.len() == width));

        let header = &parsed[0];
        assert_eq!(header[CAMPAIGN_HEADER.len()], "rd_id_0");
        assert_eq!(header[CAMPAIGN_HEADER.len() + TIER_FIELDS.len()], "rd_id_1");

        // Zero-tier row pads every group with the empty sentinel.
        let last = &parsed[3];
        assert!(last[CAMPAIGN_HEADER.len()..].iter().all(|c| c.is_empty()));
    }

    #[test]
    fn empty_batch_keeps_base_header() {
        let mut buf = Vec::new();
        write_campaigns_csv(&mut buf, &[]).unwrap();
        let parsed = read_rows(&buf);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].len(), CAMPAIGN_HEADER.len());
    }

    #[test]
    fn campaign_fields_survive_round_trip() {
        let rows = vec![(campaign("https://example.com/p"), vec![tier(0, "One")])];
        let mut buf = Vec::new();
        write_campaigns_csv(&mut buf, &rows).unwrap();

        let parsed = read_rows(&buf);
        let header = &parsed[0];
        let record = &parsed[1];
        let find = |name: &str| header.iter().position(|h| h == name).unwrap();

        assert_eq!(record[find("url")], "https://example.com/p");
        assert_eq!(record[find("title")], "Solar Lantern");
        assert_eq!(record[find("goal")], "1234");
        assert_eq!(record[find("pledged")], "2500.5");
        assert_eq!(record[find("conversion_rate")], "1");
        assert_eq!(record[find("startday")], "");
        assert_eq!(record[find("rd_title_0")], "One");
        assert_eq!(record[find("rd_gone_0")], "0");
    }

    #[test]
    fn group_count_respects_cap() {
        let tiers: Vec<RewardRow> = (0..200).map(|n| tier(n, "Bulk")).collect();
        let rows = vec![(campaign("a"), tiers)];
        let mut buf = Vec::new();
        write_campaigns_csv(&mut buf, &rows).unwrap();

        let parsed = read_rows(&buf);
        let expected = CAMPAIGN_HEADER.len() + TIER_GROUP_CAP * TIER_FIELDS.len();
        assert_eq!(parsed[0].len(), expected);
        assert_eq!(
            parsed[0].last().map(String::as_str),
            Some("rd_gone_126")
        );
    }

    #[test]
    fn creators_csv_shape() {
        let creator = CreatorRow {
            url: "https://example.com/profile/jane".to_string(),
            name: Some("Jane Maker".to_string()),
            has_website: 1,
            ..Default::default()
        };
        let project = CreatorProjectRow {
            creator_url: creator.url.clone(),
            list: "created".to_string(),
            position: 0,
            name: Some("Solar Lantern".to_string()),
            ..Default::default()
        };
        let rows = vec![(creator, vec![project])];

        let mut buf = Vec::new();
        write_creators_csv(&mut buf, &rows).unwrap();
        let parsed = read_rows(&buf);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1][4], "Jane Maker");
        assert_eq!(parsed[1][12], "1");

        let mut buf = Vec::new();
        let count = write_projects_csv(&mut buf, &rows).unwrap();
        assert_eq!(count, 1);
        let parsed = read_rows(&buf);
        assert_eq!(parsed[1][1], "created");
        assert_eq!(parsed[1][3], "Solar Lantern");
    }

    #[test]
    fn missing_csv_shape() {
        let rows = vec![(
            "https://example.com/p".to_string(),
            "anti-bot interstitial".to_string(),
            "2019-03-12 01:06:22".to_string(),
        )];
        let mut buf = Vec::new();
        write_missing_csv(&mut buf, &rows).unwrap();
        let parsed = read_rows(&buf);
        assert_eq!(parsed[0], ["url", "reason", "noted_at"]);
        assert_eq!(parsed[1][1], "anti-bot interstitial");
    }
}
