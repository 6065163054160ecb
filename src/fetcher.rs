use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use rusqlite::Connection;
use scraper::Html;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::db::{PageDataRow, QueuedPage};
use crate::extractor::{blob, select};

const CONCURRENCY: usize = 8;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Created/backed listings paginate; stop after this many pages per list.
const LISTING_PAGE_CAP: i64 = 10;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Fetch stats returned after completion.
pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub unusable: usize,
    pub errors: usize,
}

/// Everything captured for one queued page: the document set plus the
/// unusable verdict from the lead document.
struct FetchedPage {
    page_id: i64,
    url: String,
    unusable: Option<&'static str>,
    docs: Vec<PageDataRow>,
}

/// One HTTP capture before it is tied to a page row.
struct FetchedDoc {
    html: Option<String>,
    status: Option<i32>,
    error: Option<String>,
    latency_ms: Option<i64>,
}

/// Fetch pages concurrently, saving each page's document set to DB as it
/// arrives. Campaign pages also pull `/rewards` and `/updates`; creator
/// pages pull `/about` plus the paginated created/backed listings.
pub async fn fetch_pages_streaming(conn: &Connection, pages: Vec<QueuedPage>) -> Result<FetchStats> {
    let client = Arc::new(
        Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?,
    );
    let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
    let total = pages.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Channel: workers send page bundles, main loop saves to DB
    let (tx, mut rx) = tokio::sync::mpsc::channel::<FetchedPage>(CONCURRENCY * 2);

    for page in pages {
        let client = Arc::clone(&client);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let _permit = sem.acquire().await.unwrap();
            let bundle = fetch_page(&client, &page).await;
            let _ = tx.send(bundle).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut ok = 0usize;
    let mut unusable = 0usize;
    let mut errors = 0usize;

    // Prepare statements once, reuse for each page
    let mut insert_stmt = conn.prepare(
        "INSERT INTO page_data (page_id, url, slug, role, seq, html, status, error, latency_ms, accessed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    let mut visit_stmt = conn.prepare(
        "UPDATE pages SET visited = 1, visited_at = datetime('now') WHERE id = ?1",
    )?;
    let mut ledger_stmt = conn.prepare(
        "INSERT OR REPLACE INTO missing_pages (url, reason) VALUES (?1, ?2)",
    )?;

    while let Some(page) = rx.recv().await {
        if let Some(reason) = page.unusable {
            unusable += 1;
            ledger_stmt.execute(rusqlite::params![page.url, reason])?;
        } else if page.docs.iter().any(|d| d.error.is_some()) {
            errors += 1;
        } else {
            ok += 1;
        }

        for doc in &page.docs {
            insert_stmt.execute(rusqlite::params![
                doc.page_id, doc.url, doc.slug, doc.role, doc.seq, doc.html,
                doc.status, doc.error, doc.latency_ms, doc.accessed_at,
            ])?;
        }
        visit_stmt.execute(rusqlite::params![page.page_id])?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Fetched {} pages ({} ok, {} unusable, {} errors)",
        total, ok, unusable, errors
    );

    Ok(FetchStats {
        total,
        ok,
        unusable,
        errors,
    })
}

async fn fetch_page(client: &Client, page: &QueuedPage) -> FetchedPage {
    match page.kind.as_str() {
        "creator" => fetch_creator_page(client, page).await,
        _ => fetch_campaign_page(client, page).await,
    }
}

async fn fetch_campaign_page(client: &Client, page: &QueuedPage) -> FetchedPage {
    let stamp = capture_stamp();
    let mut docs = Vec::new();

    let lead = fetch_with_retry(client, &page.url).await;
    let unusable = lead.html.as_deref().and_then(classify_unusable);
    let lead_ok = unusable.is_none() && lead.html.is_some();
    docs.push(to_row(page, "campaign", 0, page.url.clone(), lead, &stamp));

    // Companion documents only make sense under a usable lead page.
    if lead_ok {
        for role in ["rewards", "updates"] {
            let url = format!("{}/{}", page.url, role);
            let doc = fetch_with_retry(client, &url).await;
            docs.push(to_row(page, role, 0, url, doc, &stamp));
        }
    }

    FetchedPage {
        page_id: page.page_id,
        url: page.url.clone(),
        unusable,
        docs,
    }
}

async fn fetch_creator_page(client: &Client, page: &QueuedPage) -> FetchedPage {
    let stamp = capture_stamp();
    let mut docs = Vec::new();

    let about_url = format!("{}/about", page.url);
    let lead = fetch_with_retry(client, &about_url).await;
    let unusable = lead.html.as_deref().and_then(classify_unusable);
    let lead_ok = unusable.is_none() && lead.html.is_some();
    docs.push(to_row(page, "about", 0, about_url, lead, &stamp));

    if lead_ok {
        for list in ["created", "backed"] {
            for seq in 1..=LISTING_PAGE_CAP {
                let url = format!("{}/{}?page={}", page.url, list, seq);
                let doc = fetch_with_retry(client, &url).await;
                let done = doc
                    .html
                    .as_deref()
                    .map(listing_is_empty)
                    .unwrap_or(true);
                docs.push(to_row(page, list, seq, url, doc, &stamp));
                if done {
                    break;
                }
            }
        }
    }

    FetchedPage {
        page_id: page.page_id,
        url: page.url.clone(),
        unusable,
        docs,
    }
}

fn to_row(
    page: &QueuedPage,
    role: &str,
    seq: i64,
    url: String,
    doc: FetchedDoc,
    stamp: &str,
) -> PageDataRow {
    PageDataRow {
        page_id: page.page_id,
        url,
        slug: page.slug.clone(),
        role: role.to_string(),
        seq,
        html: doc.html,
        status: doc.status,
        error: doc.error,
        latency_ms: doc.latency_ms,
        accessed_at: Some(stamp.to_string()),
    }
}

async fn fetch_with_retry(client: &Client, url: &str) -> FetchedDoc {
    for attempt in 0..=MAX_RETRIES {
        let doc = fetch_one(client, url).await;

        let should_retry = matches!(doc.status, Some(429 | 500..=599));
        if !should_retry || attempt == MAX_RETRIES {
            return doc;
        }

        let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
        warn!(
            "HTTP {:?} on {} (attempt {}/{}), backing off {:.1}s",
            doc.status,
            url,
            attempt + 1,
            MAX_RETRIES,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
    }

    fetch_one(client, url).await
}

async fn fetch_one(client: &Client, url: &str) -> FetchedDoc {
    let start = Instant::now();
    let response = client.get(url).send().await;
    let elapsed = start.elapsed().as_millis() as i64;

    match response {
        Ok(resp) => {
            let status = resp.status().as_u16() as i32;
            let success = (200..300).contains(&status);
            match resp.text().await {
                Ok(body) => FetchedDoc {
                    html: success.then_some(body),
                    status: Some(status),
                    error: (!success).then(|| format!("HTTP {}", status)),
                    latency_ms: Some(elapsed),
                },
                Err(e) => FetchedDoc {
                    html: None,
                    status: Some(status),
                    error: Some(e.to_string()),
                    latency_ms: Some(elapsed),
                },
            }
        }
        Err(e) => FetchedDoc {
            html: None,
            status: None,
            error: Some(e.to_string()),
            latency_ms: Some(elapsed),
        },
    }
}

/// Interstitial markers checked before a capture is handed to extraction.
pub fn classify_unusable(html: &str) -> Option<&'static str> {
    let doc = Html::parse_document(html);
    if select::first_element(&doc, &["div#px-captcha"]).is_some() {
        return Some("anti-bot interstitial");
    }
    if select::first_element(&doc, &[r#"a[href="/?ref=404-ksr10"]"#]).is_some() {
        return Some("page not found");
    }
    if select::first_element(&doc, &["div.center"]).is_some() {
        return Some("account or project deleted");
    }
    None
}

/// A listing page past the end of pagination carries no project payload.
fn listing_is_empty(html: &str) -> bool {
    let doc = Html::parse_document(html);
    blob::project_summaries(std::slice::from_ref(&doc)).is_empty()
}

/// Capture stamp in the `YYYYMMDD-HHMMSS` form the records carry.
fn capture_stamp() -> String {
    Utc::now().format("%Y%m%d-%H%M%S").to_string()
}
