use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::db::{self, PageDataRow};

/// Sub-pages that carry nothing the records need.
const SKIP_ROLES: &[&str] = &["community", "faqs", "comments"];

/// Filename tokens recognized as companion-document roles.
const ROLE_TOKENS: &[&str] = &["community", "faqs", "comments", "rewards", "updates"];

pub struct IngestStats {
    pub files: usize,
    pub pages: usize,
    pub skipped: usize,
}

/// One archive file after its stem is parsed. Stems follow
/// `<slug>[_<role>]_<YYYYMMDD-HHMMSS>`; the lead document has no role token.
struct ArchiveDoc {
    path: PathBuf,
    slug: String,
    role: String,
    stamp: String,
}

/// Walk a directory tree of unzipped page archives and load every usable
/// capture into `page_data`, grouped into pages by directory and slug.
/// Ingested pages come in pre-visited so `process` picks them up directly.
pub fn ingest_archive(conn: &Connection, dir: &Path) -> Result<IngestStats> {
    let mut paths = Vec::new();
    walk_html(dir, &mut paths)
        .with_context(|| format!("walking archive dir {}", dir.display()))?;

    let mut skipped = 0usize;
    let mut groups: BTreeMap<(PathBuf, String), Vec<ArchiveDoc>> = BTreeMap::new();

    for path in paths {
        let Some(doc) = parse_archive_name(&path) else {
            warn!("Skipping unrecognized archive file {}", path.display());
            skipped += 1;
            continue;
        };
        if SKIP_ROLES.contains(&doc.role.as_str()) {
            skipped += 1;
            continue;
        }
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        groups
            .entry((parent, doc.slug.clone()))
            .or_default()
            .push(doc);
    }

    let mut files = 0usize;
    let mut pages = 0usize;

    for ((parent, slug), mut docs) in groups {
        // Latest capture wins when the same role was archived more than once.
        docs.sort_by(|a, b| a.stamp.cmp(&b.stamp));
        let mut by_role: BTreeMap<String, ArchiveDoc> = BTreeMap::new();
        for doc in docs {
            by_role.insert(doc.role.clone(), doc);
        }

        let page_url = parent.join(&slug).to_string_lossy().into_owned();
        let page_id = db::upsert_page(conn, &page_url, "campaign", &slug)?;

        for doc in by_role.values() {
            let bytes = fs::read(&doc.path)
                .with_context(|| format!("reading {}", doc.path.display()))?;
            let html = String::from_utf8_lossy(&bytes).into_owned();
            db::save_page_data(
                conn,
                &PageDataRow {
                    page_id,
                    url: doc.path.to_string_lossy().into_owned(),
                    slug: slug.clone(),
                    role: doc.role.clone(),
                    seq: 0,
                    html: Some(html),
                    status: None,
                    error: None,
                    latency_ms: None,
                    accessed_at: Some(doc.stamp.clone()),
                },
            )?;
            files += 1;
        }
        db::mark_visited(conn, page_id)?;
        pages += 1;
    }

    info!(
        "Ingested {} files into {} pages ({} skipped)",
        files, pages, skipped
    );

    Ok(IngestStats {
        files,
        pages,
        skipped,
    })
}

fn walk_html(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk_html(&path, out)?;
            continue;
        }
        if path.extension().and_then(|s| s.to_str()) != Some("html") {
            continue;
        }
        out.push(path);
    }
    Ok(())
}

fn parse_archive_name(path: &Path) -> Option<ArchiveDoc> {
    let stem = path.file_stem()?.to_str()?;
    let mut parts: Vec<&str> = stem.split('_').collect();
    if parts.len() < 2 {
        return None;
    }

    let stamp = parts.pop()?;
    let (date, time) = stamp.split_once('-')?;
    if date.len() != 8
        || time.len() != 6
        || !date.bytes().all(|b| b.is_ascii_digit())
        || !time.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let role = match parts.last() {
        Some(tok) if ROLE_TOKENS.contains(tok) => {
            let role = *tok;
            parts.pop();
            role
        }
        _ => "campaign",
    };
    let slug = parts.join("_");
    if slug.is_empty() {
        return None;
    }

    Some(ArchiveDoc {
        path: path.to_path_buf(),
        slug,
        role: role.to_string(),
        stamp: stamp.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn parse(name: &str) -> Option<(String, String, String)> {
        parse_archive_name(Path::new(name)).map(|d| (d.slug, d.role, d.stamp))
    }

    #[test]
    fn lead_document_name() {
        assert_eq!(
            parse("solar-lantern_20190312-010622.html"),
            Some((
                "solar-lantern".into(),
                "campaign".into(),
                "20190312-010622".into()
            ))
        );
    }

    #[test]
    fn companion_document_names() {
        assert_eq!(
            parse("solar-lantern_rewards_20190312-010640.html").unwrap().1,
            "rewards"
        );
        assert_eq!(
            parse("solar-lantern_updates_20190312-010655.html").unwrap().1,
            "updates"
        );
    }

    #[test]
    fn underscored_slug_stays_whole() {
        let (slug, role, _) = parse("solar_lantern_20190312-010622.html").unwrap();
        assert_eq!(slug, "solar_lantern");
        assert_eq!(role, "campaign");
    }

    #[test]
    fn malformed_names_are_rejected() {
        assert!(parse("solar-lantern.html").is_none());
        assert!(parse("solar-lantern_2019-01.html").is_none());
        assert!(parse("_20190312-010622.html").is_none());
    }

    #[test]
    fn archive_tree_round_trip() {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let root = std::env::temp_dir().join(format!("ks-archive-{}", stamp));
        let project_dir = root.join("batch-1").join("solar-lantern");
        fs::create_dir_all(&project_dir).unwrap();

        let write = |name: &str, body: &str| {
            fs::write(project_dir.join(name), body).unwrap();
        };
        write("solar-lantern_20190312-010622.html", "<html>lead</html>");
        write("solar-lantern_rewards_20190312-010640.html", "<html>rewards</html>");
        write("solar-lantern_updates_20190312-010655.html", "<html>updates</html>");
        write("solar-lantern_comments_20190312-010700.html", "<html>noise</html>");
        // Older lead capture; the newer one above should win.
        write("solar-lantern_20190301-000000.html", "<html>stale</html>");

        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let stats = ingest_archive(&conn, &root).unwrap();
        assert_eq!(stats.pages, 1);
        assert_eq!(stats.files, 3);
        assert_eq!(stats.skipped, 1);

        let pages = db::fetch_unprocessed(&conn, None).unwrap();
        assert_eq!(pages.len(), 1);
        let roles: Vec<&str> = pages[0].docs.iter().map(|d| d.role.as_str()).collect();
        assert_eq!(roles, ["campaign", "rewards", "updates"]);
        assert_eq!(pages[0].docs[0].html, "<html>lead</html>");
        assert_eq!(
            pages[0].docs[0].accessed_at.as_deref(),
            Some("20190312-010622")
        );

        fs::remove_dir_all(&root).unwrap();
    }
}
