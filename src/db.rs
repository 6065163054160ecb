use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

const DB_PATH: &str = "data/ks.sqlite";

pub fn connect() -> Result<Connection> {
    if let Some(dir) = std::path::Path::new(DB_PATH).parent() {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS pages (
            id         INTEGER PRIMARY KEY,
            url        TEXT UNIQUE NOT NULL,
            kind       TEXT NOT NULL CHECK(kind IN ('campaign','creator')),
            slug       TEXT NOT NULL,
            visited    BOOLEAN NOT NULL DEFAULT 0,
            processed  BOOLEAN NOT NULL DEFAULT 0,
            visited_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_pages_visited ON pages(visited);
        CREATE INDEX IF NOT EXISTS idx_pages_processed ON pages(processed);

        CREATE TABLE IF NOT EXISTS page_data (
            id          INTEGER PRIMARY KEY,
            page_id     INTEGER NOT NULL REFERENCES pages(id),
            url         TEXT NOT NULL,
            slug        TEXT NOT NULL,
            role        TEXT NOT NULL CHECK(role IN ('campaign','rewards','updates','about','created','backed')),
            seq         INTEGER NOT NULL DEFAULT 0,
            html        TEXT,
            status      INTEGER,
            error       TEXT,
            latency_ms  INTEGER,
            accessed_at TEXT,
            scraped_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_page_data_page ON page_data(page_id);
        CREATE INDEX IF NOT EXISTS idx_page_data_role ON page_data(role);

        -- Extracted records
        CREATE TABLE IF NOT EXISTS campaigns (
            url                   TEXT PRIMARY KEY,
            project_id            TEXT,
            creator_id            TEXT,
            date_accessed         TEXT,
            time_accessed         TEXT,
            title                 TEXT,
            creator_name          TEXT,
            blurb                 TEXT,
            verified_identity     TEXT,
            status                TEXT CHECK(status IN ('Live','Successful','Failed','Canceled','Suspended')),
            backers               INTEGER,
            collaborators         TEXT,
            original_curr_symbol  TEXT,
            converted_curr_symbol TEXT,
            conversion_rate       REAL NOT NULL DEFAULT 1.0,
            goal                  REAL,
            converted_goal        REAL,
            pledged               REAL,
            converted_pledged     REAL,
            startday              INTEGER,
            startmonth            INTEGER,
            startyear             INTEGER,
            endday                INTEGER,
            endmonth              INTEGER,
            endyear               INTEGER,
            num_photos            INTEGER NOT NULL DEFAULT 0,
            num_videos            INTEGER NOT NULL DEFAULT 0,
            pwl                   INTEGER,
            make100               INTEGER,
            category              TEXT,
            subcategory           TEXT,
            location              TEXT,
            num_projects          INTEGER,
            num_backed            INTEGER,
            num_comments          INTEGER,
            num_updates           INTEGER,
            num_faq               INTEGER,
            description           TEXT,
            risk                  TEXT,
            num_rewards           INTEGER,
            created_at            TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_campaigns_status ON campaigns(status);
        CREATE INDEX IF NOT EXISTS idx_campaigns_category ON campaigns(category);

        CREATE TABLE IF NOT EXISTS rewards (
            id                INTEGER PRIMARY KEY,
            campaign_url      TEXT NOT NULL REFERENCES campaigns(url),
            position          INTEGER NOT NULL,
            tier_id           TEXT,
            title             TEXT,
            price             REAL,
            description       TEXT,
            items             TEXT,
            delivery_date     TEXT,
            shipping_location TEXT,
            backers           INTEGER,
            backer_limit      INTEGER,
            gone              INTEGER NOT NULL DEFAULT 0,
            UNIQUE(campaign_url, position)
        );
        CREATE INDEX IF NOT EXISTS idx_rewards_campaign ON rewards(campaign_url);

        CREATE TABLE IF NOT EXISTS creators (
            url           TEXT PRIMARY KEY,
            creator_id    TEXT,
            date_accessed TEXT,
            time_accessed TEXT,
            name          TEXT,
            join_day      INTEGER,
            join_month    INTEGER,
            join_year     INTEGER,
            location      TEXT,
            biography     TEXT,
            num_created   INTEGER,
            num_backed    INTEGER,
            has_website   INTEGER NOT NULL DEFAULT 0,
            has_facebook  INTEGER NOT NULL DEFAULT 0,
            has_twitter   INTEGER NOT NULL DEFAULT 0,
            has_instagram INTEGER NOT NULL DEFAULT 0,
            has_youtube   INTEGER NOT NULL DEFAULT 0,
            comments      TEXT,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS creator_projects (
            id                 INTEGER PRIMARY KEY,
            creator_url        TEXT NOT NULL REFERENCES creators(url),
            list               TEXT NOT NULL CHECK(list IN ('created','backed')),
            position           INTEGER NOT NULL,
            name               TEXT,
            url                TEXT,
            project_creator_id INTEGER,
            blurb              TEXT,
            currency           TEXT,
            goal               REAL,
            pledged            REAL,
            backers            INTEGER,
            state              TEXT,
            staff_pick         INTEGER,
            location           TEXT,
            category           TEXT,
            subcategory        TEXT,
            created_at_ts      INTEGER,
            launched_at_ts     INTEGER,
            deadline_ts        INTEGER,
            UNIQUE(creator_url, list, position)
        );
        CREATE INDEX IF NOT EXISTS idx_projects_creator ON creator_projects(creator_url);

        CREATE TABLE IF NOT EXISTS quality_flags (
            id       INTEGER PRIMARY KEY,
            url      TEXT NOT NULL,
            field    TEXT NOT NULL,
            value    TEXT NOT NULL,
            noted_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_flags_url ON quality_flags(url);

        CREATE TABLE IF NOT EXISTS missing_pages (
            id       INTEGER PRIMARY KEY,
            url      TEXT UNIQUE NOT NULL,
            reason   TEXT NOT NULL,
            noted_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

// ── Queue ──

pub struct QueuedPage {
    pub page_id: i64,
    pub url: String,
    pub kind: String,
    pub slug: String,
}

pub fn insert_pages(conn: &Connection, pages: &[(String, String, String)]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt =
            tx.prepare("INSERT OR IGNORE INTO pages (url, kind, slug) VALUES (?1, ?2, ?3)")?;
        for (url, kind, slug) in pages {
            count += stmt.execute(rusqlite::params![url, kind, slug])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_unvisited(conn: &Connection, limit: Option<usize>) -> Result<Vec<QueuedPage>> {
    let sql = format!(
        "SELECT id, url, kind, slug FROM pages WHERE visited = 0 ORDER BY id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(QueuedPage {
                page_id: row.get(0)?,
                url: row.get(1)?,
                kind: row.get(2)?,
                slug: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert-or-find a page row; archive ingest discovers pages outside the
/// normal queue flow.
pub fn upsert_page(conn: &Connection, url: &str, kind: &str, slug: &str) -> Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO pages (url, kind, slug) VALUES (?1, ?2, ?3)",
        rusqlite::params![url, kind, slug],
    )?;
    let id = conn.query_row(
        "SELECT id FROM pages WHERE url = ?1",
        rusqlite::params![url],
        |r| r.get(0),
    )?;
    Ok(id)
}

pub fn mark_visited(conn: &Connection, page_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE pages SET visited = 1, visited_at = datetime('now') WHERE id = ?1",
        rusqlite::params![page_id],
    )?;
    Ok(())
}

pub fn mark_processed(conn: &Connection, page_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE pages SET processed = 1 WHERE id = ?1",
        rusqlite::params![page_id],
    )?;
    Ok(())
}

// ── Captured documents ──

pub struct PageDataRow {
    pub page_id: i64,
    pub url: String,
    pub slug: String,
    pub role: String,
    pub seq: i64,
    pub html: Option<String>,
    pub status: Option<i32>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
    pub accessed_at: Option<String>,
}

pub fn save_page_data(conn: &Connection, row: &PageDataRow) -> Result<()> {
    conn.execute(
        "INSERT INTO page_data (page_id, url, slug, role, seq, html, status, error, latency_ms, accessed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            row.page_id, row.url, row.slug, row.role, row.seq, row.html,
            row.status, row.error, row.latency_ms, row.accessed_at,
        ],
    )?;
    Ok(())
}

// ── Processing ──

pub struct StoredDoc {
    pub role: String,
    pub seq: i64,
    pub html: String,
    pub accessed_at: Option<String>,
}

pub struct StoredPage {
    pub page_id: i64,
    pub url: String,
    pub kind: String,
    pub slug: String,
    pub docs: Vec<StoredDoc>,
}

pub fn fetch_unprocessed(conn: &Connection, limit: Option<usize>) -> Result<Vec<StoredPage>> {
    let mut stmt = conn.prepare(
        "SELECT pd.page_id, pg.url, pg.kind, pg.slug, pd.role, pd.seq, pd.html, pd.accessed_at
         FROM page_data pd
         JOIN pages pg ON pg.id = pd.page_id
         WHERE pd.html IS NOT NULL AND pg.processed = 0
         ORDER BY pd.page_id, pd.role, pd.seq",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut pages: Vec<StoredPage> = Vec::new();
    for (page_id, url, kind, slug, role, seq, html, accessed_at) in rows {
        let doc = StoredDoc {
            role,
            seq,
            html,
            accessed_at,
        };
        match pages.last_mut() {
            Some(last) if last.page_id == page_id => last.docs.push(doc),
            _ => pages.push(StoredPage {
                page_id,
                url,
                kind,
                slug,
                docs: vec![doc],
            }),
        }
    }
    if let Some(n) = limit {
        pages.truncate(n);
    }
    Ok(pages)
}

// ── Extracted records ──

#[derive(Debug, Clone, Default, Serialize)]
pub struct CampaignRow {
    pub url: String,
    pub project_id: Option<String>,
    pub creator_id: Option<String>,
    pub date_accessed: Option<String>,
    pub time_accessed: Option<String>,
    pub title: Option<String>,
    pub creator_name: Option<String>,
    pub blurb: Option<String>,
    pub verified_identity: Option<String>,
    pub status: Option<String>,
    pub backers: Option<i64>,
    pub collaborators: Option<String>,
    pub original_curr_symbol: Option<String>,
    pub converted_curr_symbol: Option<String>,
    pub conversion_rate: f64,
    pub goal: Option<f64>,
    pub converted_goal: Option<f64>,
    pub pledged: Option<f64>,
    pub converted_pledged: Option<f64>,
    pub startday: Option<i64>,
    pub startmonth: Option<i64>,
    pub startyear: Option<i64>,
    pub endday: Option<i64>,
    pub endmonth: Option<i64>,
    pub endyear: Option<i64>,
    pub num_photos: i64,
    pub num_videos: i64,
    pub pwl: Option<i64>,
    pub make100: Option<i64>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub location: Option<String>,
    pub num_projects: Option<i64>,
    pub num_backed: Option<i64>,
    pub num_comments: Option<i64>,
    pub num_updates: Option<i64>,
    pub num_faq: Option<i64>,
    pub description: Option<String>,
    pub risk: Option<String>,
    pub num_rewards: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RewardRow {
    pub campaign_url: String,
    pub position: i64,
    pub tier_id: Option<String>,
    pub title: Option<String>,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub items: Option<String>,
    pub delivery_date: Option<String>,
    pub shipping_location: Option<String>,
    pub backers: Option<i64>,
    pub backer_limit: Option<i64>,
    pub gone: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreatorRow {
    pub url: String,
    pub creator_id: Option<String>,
    pub date_accessed: Option<String>,
    pub time_accessed: Option<String>,
    pub name: Option<String>,
    pub join_day: Option<i64>,
    pub join_month: Option<i64>,
    pub join_year: Option<i64>,
    pub location: Option<String>,
    pub biography: Option<String>,
    pub num_created: Option<i64>,
    pub num_backed: Option<i64>,
    pub has_website: i64,
    pub has_facebook: i64,
    pub has_twitter: i64,
    pub has_instagram: i64,
    pub has_youtube: i64,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreatorProjectRow {
    pub creator_url: String,
    pub list: String,
    pub position: i64,
    pub name: Option<String>,
    pub url: Option<String>,
    pub project_creator_id: Option<i64>,
    pub blurb: Option<String>,
    pub currency: Option<String>,
    pub goal: Option<f64>,
    pub pledged: Option<f64>,
    pub backers: Option<i64>,
    pub state: Option<String>,
    pub staff_pick: Option<i64>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub created_at_ts: Option<i64>,
    pub launched_at_ts: Option<i64>,
    pub deadline_ts: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct QualityFlagRow {
    pub url: String,
    pub field: String,
    pub value: String,
}

const CAMPAIGN_COLS: &str = "url, project_id, creator_id, date_accessed, time_accessed, title, \
    creator_name, blurb, verified_identity, status, backers, collaborators, \
    original_curr_symbol, converted_curr_symbol, conversion_rate, goal, converted_goal, \
    pledged, converted_pledged, startday, startmonth, startyear, endday, endmonth, endyear, \
    num_photos, num_videos, pwl, make100, category, subcategory, location, num_projects, \
    num_backed, num_comments, num_updates, num_faq, description, risk, num_rewards";

pub fn save_extracted(
    conn: &Connection,
    campaigns: &[CampaignRow],
    rewards: &[RewardRow],
    creators: &[CreatorRow],
    creator_projects: &[CreatorProjectRow],
    flags: &[QualityFlagRow],
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let sql = format!(
            "INSERT OR REPLACE INTO campaigns ({CAMPAIGN_COLS})
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,
                     ?21,?22,?23,?24,?25,?26,?27,?28,?29,?30,?31,?32,?33,?34,?35,?36,?37,?38,?39,?40)"
        );
        let mut c_stmt = tx.prepare(&sql)?;
        for c in campaigns {
            c_stmt.execute(rusqlite::params![
                c.url, c.project_id, c.creator_id, c.date_accessed, c.time_accessed,
                c.title, c.creator_name, c.blurb, c.verified_identity, c.status,
                c.backers, c.collaborators, c.original_curr_symbol, c.converted_curr_symbol,
                c.conversion_rate, c.goal, c.converted_goal, c.pledged, c.converted_pledged,
                c.startday, c.startmonth, c.startyear, c.endday, c.endmonth, c.endyear,
                c.num_photos, c.num_videos, c.pwl, c.make100, c.category, c.subcategory,
                c.location, c.num_projects, c.num_backed, c.num_comments, c.num_updates,
                c.num_faq, c.description, c.risk, c.num_rewards,
            ])?;
        }

        let mut r_stmt = tx.prepare(
            "INSERT OR REPLACE INTO rewards
             (campaign_url, position, tier_id, title, price, description, items,
              delivery_date, shipping_location, backers, backer_limit, gone)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
        )?;
        for r in rewards {
            r_stmt.execute(rusqlite::params![
                r.campaign_url, r.position, r.tier_id, r.title, r.price, r.description,
                r.items, r.delivery_date, r.shipping_location, r.backers, r.backer_limit,
                r.gone,
            ])?;
        }

        let mut cr_stmt = tx.prepare(
            "INSERT OR REPLACE INTO creators
             (url, creator_id, date_accessed, time_accessed, name, join_day, join_month,
              join_year, location, biography, num_created, num_backed, has_website,
              has_facebook, has_twitter, has_instagram, has_youtube, comments)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)",
        )?;
        for c in creators {
            cr_stmt.execute(rusqlite::params![
                c.url, c.creator_id, c.date_accessed, c.time_accessed, c.name,
                c.join_day, c.join_month, c.join_year, c.location, c.biography,
                c.num_created, c.num_backed, c.has_website, c.has_facebook,
                c.has_twitter, c.has_instagram, c.has_youtube, c.comments,
            ])?;
        }

        let mut p_stmt = tx.prepare(
            "INSERT OR REPLACE INTO creator_projects
             (creator_url, list, position, name, url, project_creator_id, blurb, currency,
              goal, pledged, backers, state, staff_pick, location, category, subcategory,
              created_at_ts, launched_at_ts, deadline_ts)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)",
        )?;
        for p in creator_projects {
            p_stmt.execute(rusqlite::params![
                p.creator_url, p.list, p.position, p.name, p.url, p.project_creator_id,
                p.blurb, p.currency, p.goal, p.pledged, p.backers, p.state, p.staff_pick,
                p.location, p.category, p.subcategory, p.created_at_ts, p.launched_at_ts,
                p.deadline_ts,
            ])?;
        }

        let mut q_stmt = tx.prepare(
            "INSERT INTO quality_flags (url, field, value) VALUES (?1, ?2, ?3)",
        )?;
        for q in flags {
            q_stmt.execute(rusqlite::params![q.url, q.field, q.value])?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn campaign_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CampaignRow> {
    Ok(CampaignRow {
        url: row.get(0)?,
        project_id: row.get(1)?,
        creator_id: row.get(2)?,
        date_accessed: row.get(3)?,
        time_accessed: row.get(4)?,
        title: row.get(5)?,
        creator_name: row.get(6)?,
        blurb: row.get(7)?,
        verified_identity: row.get(8)?,
        status: row.get(9)?,
        backers: row.get(10)?,
        collaborators: row.get(11)?,
        original_curr_symbol: row.get(12)?,
        converted_curr_symbol: row.get(13)?,
        conversion_rate: row.get(14)?,
        goal: row.get(15)?,
        converted_goal: row.get(16)?,
        pledged: row.get(17)?,
        converted_pledged: row.get(18)?,
        startday: row.get(19)?,
        startmonth: row.get(20)?,
        startyear: row.get(21)?,
        endday: row.get(22)?,
        endmonth: row.get(23)?,
        endyear: row.get(24)?,
        num_photos: row.get(25)?,
        num_videos: row.get(26)?,
        pwl: row.get(27)?,
        make100: row.get(28)?,
        category: row.get(29)?,
        subcategory: row.get(30)?,
        location: row.get(31)?,
        num_projects: row.get(32)?,
        num_backed: row.get(33)?,
        num_comments: row.get(34)?,
        num_updates: row.get(35)?,
        num_faq: row.get(36)?,
        description: row.get(37)?,
        risk: row.get(38)?,
        num_rewards: row.get(39)?,
    })
}

pub fn fetch_campaigns_with_rewards(
    conn: &Connection,
) -> Result<Vec<(CampaignRow, Vec<RewardRow>)>> {
    let sql = format!("SELECT {CAMPAIGN_COLS} FROM campaigns ORDER BY url");
    let mut stmt = conn.prepare(&sql)?;
    let campaigns = stmt
        .query_map([], campaign_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut r_stmt = conn.prepare(
        "SELECT campaign_url, position, tier_id, title, price, description, items,
                delivery_date, shipping_location, backers, backer_limit, gone
         FROM rewards ORDER BY campaign_url, position",
    )?;
    let rewards = r_stmt
        .query_map([], |row| {
            Ok(RewardRow {
                campaign_url: row.get(0)?,
                position: row.get(1)?,
                tier_id: row.get(2)?,
                title: row.get(3)?,
                price: row.get(4)?,
                description: row.get(5)?,
                items: row.get(6)?,
                delivery_date: row.get(7)?,
                shipping_location: row.get(8)?,
                backers: row.get(9)?,
                backer_limit: row.get(10)?,
                gone: row.get(11)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut by_campaign: HashMap<String, Vec<RewardRow>> = HashMap::new();
    for r in rewards {
        by_campaign.entry(r.campaign_url.clone()).or_default().push(r);
    }
    Ok(campaigns
        .into_iter()
        .map(|c| {
            let tiers = by_campaign.remove(&c.url).unwrap_or_default();
            (c, tiers)
        })
        .collect())
}

pub fn fetch_creators_with_projects(
    conn: &Connection,
) -> Result<Vec<(CreatorRow, Vec<CreatorProjectRow>)>> {
    let mut stmt = conn.prepare(
        "SELECT url, creator_id, date_accessed, time_accessed, name, join_day, join_month,
                join_year, location, biography, num_created, num_backed, has_website,
                has_facebook, has_twitter, has_instagram, has_youtube, comments
         FROM creators ORDER BY url",
    )?;
    let creators = stmt
        .query_map([], |row| {
            Ok(CreatorRow {
                url: row.get(0)?,
                creator_id: row.get(1)?,
                date_accessed: row.get(2)?,
                time_accessed: row.get(3)?,
                name: row.get(4)?,
                join_day: row.get(5)?,
                join_month: row.get(6)?,
                join_year: row.get(7)?,
                location: row.get(8)?,
                biography: row.get(9)?,
                num_created: row.get(10)?,
                num_backed: row.get(11)?,
                has_website: row.get(12)?,
                has_facebook: row.get(13)?,
                has_twitter: row.get(14)?,
                has_instagram: row.get(15)?,
                has_youtube: row.get(16)?,
                comments: row.get(17)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut p_stmt = conn.prepare(
        "SELECT creator_url, list, position, name, url, project_creator_id, blurb, currency,
                goal, pledged, backers, state, staff_pick, location, category, subcategory,
                created_at_ts, launched_at_ts, deadline_ts
         FROM creator_projects ORDER BY creator_url, list, position",
    )?;
    let projects = p_stmt
        .query_map([], |row| {
            Ok(CreatorProjectRow {
                creator_url: row.get(0)?,
                list: row.get(1)?,
                position: row.get(2)?,
                name: row.get(3)?,
                url: row.get(4)?,
                project_creator_id: row.get(5)?,
                blurb: row.get(6)?,
                currency: row.get(7)?,
                goal: row.get(8)?,
                pledged: row.get(9)?,
                backers: row.get(10)?,
                state: row.get(11)?,
                staff_pick: row.get(12)?,
                location: row.get(13)?,
                category: row.get(14)?,
                subcategory: row.get(15)?,
                created_at_ts: row.get(16)?,
                launched_at_ts: row.get(17)?,
                deadline_ts: row.get(18)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut by_creator: HashMap<String, Vec<CreatorProjectRow>> = HashMap::new();
    for p in projects {
        by_creator.entry(p.creator_url.clone()).or_default().push(p);
    }
    Ok(creators
        .into_iter()
        .map(|c| {
            let list = by_creator.remove(&c.url).unwrap_or_default();
            (c, list)
        })
        .collect())
}

// ── Start date merge ──

/// Updates-tab documents as (page_id, page url, html).
pub fn fetch_updates_docs(conn: &Connection) -> Result<Vec<(i64, String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT pd.page_id, pg.url, pd.html
         FROM page_data pd
         JOIN pages pg ON pg.id = pd.page_id
         WHERE pd.role = 'updates' AND pd.html IS NOT NULL
         ORDER BY pd.page_id",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// First stored document of the given role for a page, if any.
pub fn fetch_doc_html(conn: &Connection, page_id: i64, role: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare(
        "SELECT html FROM page_data
         WHERE page_id = ?1 AND role = ?2 AND html IS NOT NULL
         ORDER BY seq LIMIT 1",
    )?;
    let mut rows = stmt.query_map(rusqlite::params![page_id, role], |row| row.get(0))?;
    match rows.next() {
        Some(html) => Ok(Some(html?)),
        None => Ok(None),
    }
}

pub fn set_start_date(
    conn: &Connection,
    url: &str,
    day: i64,
    month: i64,
    year: i64,
) -> Result<usize> {
    let n = conn.execute(
        "UPDATE campaigns SET startday = ?1, startmonth = ?2, startyear = ?3 WHERE url = ?4",
        rusqlite::params![day, month, year, url],
    )?;
    Ok(n)
}

// ── Missing-page ledger ──

pub fn ledger_append(conn: &Connection, url: &str, reason: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO missing_pages (url, reason) VALUES (?1, ?2)",
        rusqlite::params![url, reason],
    )?;
    Ok(())
}

pub fn fetch_missing(conn: &Connection) -> Result<Vec<(String, String, String)>> {
    let mut stmt =
        conn.prepare("SELECT url, reason, noted_at FROM missing_pages ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Overview ──

pub struct OverviewRow {
    pub url: String,
    pub title: String,
    pub status: String,
    pub category: String,
    pub goal: Option<f64>,
    pub pledged: Option<f64>,
    pub backers: Option<i64>,
    pub num_rewards: Option<i64>,
}

pub fn fetch_overview(
    conn: &Connection,
    status: Option<&str>,
    category: Option<&str>,
    limit: usize,
) -> Result<Vec<OverviewRow>> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(s) = status {
        conditions.push(format!("status = ?{}", params.len() + 1));
        params.push(Box::new(s.to_string()));
    }
    if let Some(c) = category {
        conditions.push(format!("category = ?{}", params.len() + 1));
        params.push(Box::new(c.to_string()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT url, COALESCE(title,''), COALESCE(status,''), COALESCE(category,''),
                goal, pledged, backers, num_rewards
         FROM campaigns{}
         ORDER BY pledged DESC, url
         LIMIT {}",
        where_clause, limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(OverviewRow {
                url: row.get(0)?,
                title: row.get(1)?,
                status: row.get(2)?,
                category: row.get(3)?,
                goal: row.get(4)?,
                pledged: row.get(5)?,
                backers: row.get(6)?,
                num_rewards: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub visited: usize,
    pub unvisited: usize,
    pub docs: usize,
    pub errors: usize,
    pub campaigns: usize,
    pub rewards: usize,
    pub creators: usize,
    pub flagged: usize,
    pub missing: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM pages", [], |r| r.get(0))?;
    let visited: usize =
        conn.query_row("SELECT COUNT(*) FROM pages WHERE visited = 1", [], |r| r.get(0))?;
    let docs: usize = conn.query_row("SELECT COUNT(*) FROM page_data", [], |r| r.get(0))?;
    let errors: usize = conn.query_row(
        "SELECT COUNT(*) FROM page_data WHERE error IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let campaigns: usize =
        conn.query_row("SELECT COUNT(*) FROM campaigns", [], |r| r.get(0))?;
    let rewards: usize = conn.query_row("SELECT COUNT(*) FROM rewards", [], |r| r.get(0))?;
    let creators: usize = conn.query_row("SELECT COUNT(*) FROM creators", [], |r| r.get(0))?;
    let flagged: usize =
        conn.query_row("SELECT COUNT(*) FROM quality_flags", [], |r| r.get(0))?;
    let missing: usize =
        conn.query_row("SELECT COUNT(*) FROM missing_pages", [], |r| r.get(0))?;
    Ok(Stats {
        total,
        visited,
        unvisited: total - visited,
        docs,
        errors,
        campaigns,
        rewards,
        creators,
        flagged,
        missing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn campaign_save_and_fetch_round_trip() {
        let conn = test_conn();
        let campaign = CampaignRow {
            url: "https://www.kickstarter.com/projects/a/b".to_string(),
            title: Some("Solar Lantern".to_string()),
            status: Some("Live".to_string()),
            conversion_rate: 1.0,
            goal: Some(1234.0),
            pledged: Some(2500.0),
            backers: Some(56),
            num_rewards: Some(2),
            ..Default::default()
        };
        let tiers = vec![
            RewardRow {
                campaign_url: campaign.url.clone(),
                position: 0,
                title: Some("Early Bird".to_string()),
                price: Some(10.0),
                backers: Some(10),
                ..Default::default()
            },
            RewardRow {
                campaign_url: campaign.url.clone(),
                position: 1,
                title: Some("Signed Edition".to_string()),
                price: Some(45.0),
                backers: Some(5),
                backer_limit: Some(5),
                gone: 1,
                ..Default::default()
            },
        ];
        save_extracted(&conn, &[campaign], &tiers, &[], &[], &[]).unwrap();

        let rows = fetch_campaigns_with_rewards(&conn).unwrap();
        assert_eq!(rows.len(), 1);
        let (c, r) = &rows[0];
        assert_eq!(c.title.as_deref(), Some("Solar Lantern"));
        assert_eq!(c.goal, Some(1234.0));
        assert_eq!(c.startday, None);
        assert_eq!(r.len(), 2);
        assert_eq!(r[0].position, 0);
        assert_eq!(r[1].gone, 1);

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.campaigns, 1);
        assert_eq!(stats.rewards, 2);
    }

    #[test]
    fn reprocessing_replaces_instead_of_duplicating() {
        let conn = test_conn();
        let mut campaign = CampaignRow {
            url: "https://example.com/p".to_string(),
            backers: Some(1),
            conversion_rate: 1.0,
            ..Default::default()
        };
        save_extracted(&conn, &[campaign.clone()], &[], &[], &[], &[]).unwrap();
        campaign.backers = Some(9);
        save_extracted(&conn, &[campaign], &[], &[], &[], &[]).unwrap();

        let rows = fetch_campaigns_with_rewards(&conn).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.backers, Some(9));
    }

    #[test]
    fn unprocessed_pages_group_their_documents() {
        let conn = test_conn();
        let page_id = upsert_page(&conn, "https://example.com/p", "campaign", "p").unwrap();
        for (role, html) in [("campaign", "<html>main</html>"), ("rewards", "<html>tiers</html>")] {
            save_page_data(
                &conn,
                &PageDataRow {
                    page_id,
                    url: format!("https://example.com/p/{role}"),
                    slug: "p".to_string(),
                    role: role.to_string(),
                    seq: 0,
                    html: Some(html.to_string()),
                    status: Some(200),
                    error: None,
                    latency_ms: Some(12),
                    accessed_at: Some("20190312-010622".to_string()),
                },
            )
            .unwrap();
        }
        mark_visited(&conn, page_id).unwrap();

        let pages = fetch_unprocessed(&conn, None).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].docs.len(), 2);
        assert_eq!(pages[0].kind, "campaign");

        mark_processed(&conn, page_id).unwrap();
        assert!(fetch_unprocessed(&conn, None).unwrap().is_empty());
    }

    #[test]
    fn start_date_merge_targets_one_campaign() {
        let conn = test_conn();
        let campaign = CampaignRow {
            url: "https://example.com/p".to_string(),
            conversion_rate: 1.0,
            ..Default::default()
        };
        save_extracted(&conn, &[campaign], &[], &[], &[], &[]).unwrap();

        assert_eq!(set_start_date(&conn, "https://example.com/p", 12, 2, 2019).unwrap(), 1);
        assert_eq!(set_start_date(&conn, "https://example.com/other", 1, 1, 2019).unwrap(), 0);

        let rows = fetch_campaigns_with_rewards(&conn).unwrap();
        assert_eq!(
            (rows[0].0.startday, rows[0].0.startmonth, rows[0].0.startyear),
            (Some(12), Some(2), Some(2019))
        );
    }

    #[test]
    fn ledger_keeps_one_row_per_url() {
        let conn = test_conn();
        ledger_append(&conn, "https://example.com/x", "captcha interstitial").unwrap();
        ledger_append(&conn, "https://example.com/x", "deleted account").unwrap();
        let missing = fetch_missing(&conn).unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].1, "deleted account");
    }
}
