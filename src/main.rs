mod db;
mod export;
mod extractor;
mod fetcher;
mod ingest;

use std::path::PathBuf;
use std::time::Instant;

use chrono::Datelike;
use clap::{Parser, Subcommand};
use scraper::Html;

#[derive(Parser)]
#[command(name = "ks_scraper", about = "Kickstarter campaign and creator record extractor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a URL list into the page queue
    Init {
        /// File with one campaign or profile URL per line
        file: PathBuf,
    },
    /// Fetch unvisited pages and their companion documents
    Fetch {
        /// Max pages to fetch (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Load saved .html page archives into the document store
    Ingest {
        /// Directory tree of unzipped page archives
        dir: PathBuf,
    },
    /// Extract records from stored documents
    Process {
        /// Max pages to process (default: all unprocessed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Fetch + process in one pipeline
    Run {
        /// Max pages to fetch+process
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Backfill campaign start dates from updates-tab documents
    MergeStarts,
    /// Write extracted records to CSV or JSON
    Export {
        /// Output format: csv or json
        #[arg(short, long, default_value = "csv")]
        format: String,
        /// Output directory
        #[arg(short, long, default_value = "data/export")]
        out_dir: PathBuf,
    },
    /// Show pipeline statistics
    Stats,
    /// Campaigns overview table
    Overview {
        /// Filter by status (live, successful, failed, canceled, suspended)
        #[arg(short, long)]
        status: Option<String>,
        /// Filter by category (e.g. "Games")
        #[arg(short, long)]
        category: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { file } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let text = std::fs::read_to_string(&file)?;
            let pages = queue_entries(&text);
            let inserted = db::insert_pages(&conn, &pages)?;
            println!("Inserted {} new page URLs ({} listed)", inserted, pages.len());
            Ok(())
        }
        Commands::Fetch { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let pages = db::fetch_unvisited(&conn, limit)?;
            if pages.is_empty() {
                println!("No unvisited pages. Run 'init' first or all pages are fetched.");
                return Ok(());
            }
            println!("Fetching {} pages (streaming to DB)...", pages.len());
            let stats = fetcher::fetch_pages_streaming(&conn, pages).await?;
            println!(
                "Done: {} fetched ({} ok, {} unusable, {} errors).",
                stats.total, stats.ok, stats.unusable, stats.errors
            );
            Ok(())
        }
        Commands::Ingest { dir } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let stats = ingest::ingest_archive(&conn, &dir)?;
            println!(
                "Ingested {} files into {} pages ({} skipped).",
                stats.files, stats.pages, stats.skipped
            );
            Ok(())
        }
        Commands::Process { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let pages = db::fetch_unprocessed(&conn, limit)?;
            if pages.is_empty() {
                println!("No unprocessed pages. Run 'fetch' or 'ingest' first.");
                return Ok(());
            }
            println!("Processing {} pages...", pages.len());
            let counts = process_pages(&conn, &pages)?;
            counts.print();
            Ok(())
        }
        Commands::Run { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let pages = db::fetch_unvisited(&conn, limit)?;
            if pages.is_empty() {
                println!("No unvisited pages. Run 'init' first.");
                return Ok(());
            }

            // Phase 1: Fetch (streaming to DB)
            let t_fetch = Instant::now();
            println!("Pipeline: fetching {} pages (streaming to DB)...", pages.len());
            let stats = fetcher::fetch_pages_streaming(&conn, pages).await?;
            println!(
                "Fetched {} pages ({} ok, {} unusable, {} errors) in {:.1}s",
                stats.total,
                stats.ok,
                stats.unusable,
                stats.errors,
                t_fetch.elapsed().as_secs_f64()
            );

            // Phase 2: Process
            let t_process = Instant::now();
            let unprocessed = db::fetch_unprocessed(&conn, None)?;
            if unprocessed.is_empty() {
                println!("Nothing to process (all fetched pages had errors).");
                return Ok(());
            }
            println!("Processing {} pages...", unprocessed.len());
            let counts = process_pages(&conn, &unprocessed)?;
            println!("Processed in {:.1}s", t_process.elapsed().as_secs_f64());
            counts.print();
            Ok(())
        }
        Commands::MergeStarts => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let docs = db::fetch_updates_docs(&conn)?;
            if docs.is_empty() {
                println!("No updates documents stored. Run 'fetch' or 'ingest' first.");
                return Ok(());
            }
            let mut merged = 0usize;
            for (page_id, page_url, html) in &docs {
                let launched = {
                    let doc = Html::parse_document(html);
                    extractor::updates::launch_date(&doc)
                };
                let Some(date) = launched else { continue };
                let target = match db::fetch_doc_html(&conn, *page_id, "campaign")? {
                    Some(lead) => extractor::page_url(&Html::parse_document(&lead)),
                    None => None,
                }
                .unwrap_or_else(|| extractor::canonical_url(page_url));
                merged += db::set_start_date(
                    &conn,
                    &target,
                    date.day() as i64,
                    date.month() as i64,
                    date.year() as i64,
                )?;
            }
            println!(
                "Merged start dates into {} campaigns ({} updates documents).",
                merged,
                docs.len()
            );
            Ok(())
        }
        Commands::Export { format, out_dir } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            match format.as_str() {
                "csv" => export::export_csv(&conn, &out_dir)?,
                "json" => export::export_json(&conn, &out_dir)?,
                other => anyhow::bail!("unknown export format '{}' (expected csv or json)", other),
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Pages:     {}", s.total);
            println!("Visited:   {}", s.visited);
            println!("Unvisited: {}", s.unvisited);
            println!("Documents: {}", s.docs);
            println!("Errors:    {}", s.errors);
            println!("Campaigns: {}", s.campaigns);
            println!("Rewards:   {}", s.rewards);
            println!("Creators:  {}", s.creators);
            println!("Flagged:   {}", s.flagged);
            println!("Missing:   {}", s.missing);
            Ok(())
        }
        Commands::Overview {
            status,
            category,
            limit,
        } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let rows = db::fetch_overview(&conn, status.as_deref(), category.as_deref(), limit)?;
            if rows.is_empty() {
                println!("No campaigns found.");
                return Ok(());
            }

            // Compact, readable table
            println!(
                "{:>3} | {:<28} | {:<10} | {:<14} | {:>10} | {:>10} | {:>7} | {:>5}",
                "#", "Campaign", "Status", "Category", "Goal", "Pledged", "Backers", "Tiers"
            );
            println!("{}", "-".repeat(105));

            for (i, r) in rows.iter().enumerate() {
                let title = truncate(&r.title, 28);
                let category = truncate(&r.category, 14);
                let goal = r.goal.map(|v| format!("{:.0}", v)).unwrap_or_else(|| "-".into());
                let pledged = r
                    .pledged
                    .map(|v| format!("{:.0}", v))
                    .unwrap_or_else(|| "-".into());
                let backers = r.backers.map(|v| v.to_string()).unwrap_or_else(|| "-".into());
                let tiers = r
                    .num_rewards
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "-".into());

                println!(
                    "{:>3} | {:<28} | {:<10} | {:<14} | {:>10} | {:>10} | {:>7} | {:>5}",
                    i + 1,
                    title,
                    r.status,
                    category,
                    goal,
                    pledged,
                    backers,
                    tiers
                );
            }

            println!("\n{} campaigns | url is the record key", rows.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn queue_entries(text: &str) -> Vec<(String, String, String)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let url = extractor::canonical_url(line);
            let kind = detect_kind(&url).to_string();
            let slug = url.rsplit('/').next().unwrap_or_default().to_string();
            (url, kind, slug)
        })
        .collect()
}

fn detect_kind(url: &str) -> &'static str {
    if url.contains("/profile/") {
        "creator"
    } else {
        "campaign"
    }
}

struct ProcessCounts {
    campaigns: usize,
    rewards: usize,
    creators: usize,
    projects: usize,
    flags: usize,
    unusable: usize,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Saved {} campaigns ({} reward tiers), {} creators ({} listed projects), {} quality flags, {} unusable.",
            self.campaigns, self.rewards, self.creators, self.projects, self.flags, self.unusable,
        );
    }
}

enum PageOutcome {
    Campaign(extractor::ExtractedCampaign),
    Creator(extractor::ExtractedCreator),
    Unusable { url: String, reason: String },
}

fn process_pages(
    conn: &rusqlite::Connection,
    pages: &[db::StoredPage],
) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts {
        campaigns: 0,
        rewards: 0,
        creators: 0,
        projects: 0,
        flags: 0,
        unusable: 0,
    };

    for chunk in pages.chunks(500) {
        let results: Vec<PageOutcome> = chunk.par_iter().map(process_page).collect();

        let mut campaigns = Vec::new();
        let mut rewards = Vec::new();
        let mut creators = Vec::new();
        let mut projects = Vec::new();
        let mut flags = Vec::new();
        let mut unusable = Vec::new();

        for outcome in results {
            match outcome {
                PageOutcome::Campaign(ex) => {
                    counts.rewards += ex.rewards.len();
                    counts.flags += ex.flags.len();
                    campaigns.push(ex.record);
                    rewards.extend(ex.rewards);
                    flags.extend(ex.flags);
                }
                PageOutcome::Creator(ex) => {
                    counts.projects += ex.projects.len();
                    counts.flags += ex.flags.len();
                    creators.push(ex.record);
                    projects.extend(ex.projects);
                    flags.extend(ex.flags);
                }
                PageOutcome::Unusable { url, reason } => unusable.push((url, reason)),
            }
        }

        counts.campaigns += campaigns.len();
        counts.creators += creators.len();
        counts.unusable += unusable.len();

        db::save_extracted(conn, &campaigns, &rewards, &creators, &projects, &flags)?;
        for (url, reason) in &unusable {
            tracing::warn!("Unusable page {}: {}", url, reason);
            db::ledger_append(conn, url, reason)?;
        }
        for page in chunk {
            db::mark_processed(conn, page.page_id)?;
        }
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn process_page(page: &db::StoredPage) -> PageOutcome {
    let ctx = extractor::PageContext::new(&page.url, lead_accessed(page));
    match page.kind.as_str() {
        "creator" => {
            let Some(about) = doc_for(page, "about") else {
                return PageOutcome::Unusable {
                    url: page.url.clone(),
                    reason: "missing about document".to_string(),
                };
            };
            let created = docs_for(page, "created");
            let backed = docs_for(page, "backed");
            match extractor::extract_creator(&about, &created, &backed, &ctx) {
                Ok(ex) => PageOutcome::Creator(ex),
                Err(e) => PageOutcome::Unusable {
                    url: page.url.clone(),
                    reason: e.reason.to_string(),
                },
            }
        }
        _ => {
            let Some(doc) = doc_for(page, "campaign") else {
                return PageOutcome::Unusable {
                    url: page.url.clone(),
                    reason: "missing lead document".to_string(),
                };
            };
            let rewards = doc_for(page, "rewards");
            match extractor::extract_campaign(&doc, rewards.as_ref(), &ctx) {
                Ok(ex) => PageOutcome::Campaign(ex),
                Err(e) => PageOutcome::Unusable {
                    url: page.url.clone(),
                    reason: e.reason.to_string(),
                },
            }
        }
    }
}

fn lead_accessed(page: &db::StoredPage) -> Option<String> {
    let lead = match page.kind.as_str() {
        "creator" => "about",
        _ => "campaign",
    };
    page.docs
        .iter()
        .find(|d| d.role == lead)
        .and_then(|d| d.accessed_at.clone())
}

fn doc_for(page: &db::StoredPage, role: &str) -> Option<Html> {
    page.docs
        .iter()
        .find(|d| d.role == role)
        .map(|d| Html::parse_document(&d.html))
}

fn docs_for(page: &db::StoredPage, role: &str) -> Vec<Html> {
    page.docs
        .iter()
        .filter(|d| d.role == role)
        .map(|d| Html::parse_document(&d.html))
        .collect()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_entries_classify_and_slug() {
        let text = "\
https://www.kickstarter.com/projects/janemaker/solar-lantern?ref=discovery

# comment line
https://www.kickstarter.com/profile/janemaker/
";
        let entries = queue_entries(text);
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0],
            (
                "https://www.kickstarter.com/projects/janemaker/solar-lantern".to_string(),
                "campaign".to_string(),
                "solar-lantern".to_string()
            )
        );
        assert_eq!(
            entries[1],
            (
                "https://www.kickstarter.com/profile/janemaker".to_string(),
                "creator".to_string(),
                "janemaker".to_string()
            )
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long campaign title", 6), "a very...");
    }

    #[test]
    fn duration_formatting() {
        use std::time::Duration;
        assert_eq!(format_duration(Duration::from_secs(5)), "5.0s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }
}
