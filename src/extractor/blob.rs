//! Embedded JSON payloads.
//!
//! Campaign pages ship a `div[data-initial]` attribute holding the project
//! object the React app boots from; creator profile listings ship
//! `data-projects` arrays. Both are best-effort: a malformed or absent
//! payload just means the HTML fallbacks carry the load.

use scraper::Html;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::select;

/// `project` object from `div[data-initial]` on campaign pages.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectInitial {
    pub name: Option<String>,
    pub blurb: Option<String>,
    pub state: Option<String>,
    pub verified_identity: Option<String>,
    pub backers_count: Option<i64>,
    pub deadline_at: Option<i64>,
    pub is_project_we_love: Option<bool>,
    pub collaborators: Option<Collaborators>,
    pub creator: Option<CreatorInitial>,
    pub category: Option<CategoryInitial>,
    pub location: Option<LocationInitial>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Collaborators {
    pub edges: Vec<CollaboratorEdge>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CollaboratorEdge {
    pub node: CollaboratorNode,
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CollaboratorNode {
    pub name: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreatorInitial {
    pub name: Option<String>,
    pub created_projects: Option<TotalCount>,
    pub launched_projects: Option<TotalCount>,
    pub backed_projects: Option<TotalCount>,
    pub backings_count: Option<i64>,
}

impl CreatorInitial {
    /// Created-project count; older payloads call it `launchedProjects`.
    pub fn created_count(&self) -> Option<i64> {
        self.created_projects
            .as_ref()
            .or(self.launched_projects.as_ref())
            .map(|t| t.total_count)
    }

    /// Backed-project count; older payloads carry a flat `backingsCount`.
    pub fn backed_count(&self) -> Option<i64> {
        self.backed_projects
            .as_ref()
            .map(|t| t.total_count)
            .or(self.backings_count)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TotalCount {
    pub total_count: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CategoryInitial {
    pub name: Option<String>,
    pub parent_category: Option<Box<CategoryInitial>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LocationInitial {
    pub displayable_name: Option<String>,
}

/// Parse the `data-initial` payload of a campaign page. Returns `None`
/// when the attribute is absent, the JSON is malformed, or it has no
/// `project` object.
pub fn project_initial(doc: &Html) -> Option<ProjectInitial> {
    let raw = select::first_attr(doc, &["div[data-initial]"], "data-initial")?;
    let value: Value = serde_json::from_str(&raw).ok()?;
    let project = value.get("project")?.clone();
    serde_json::from_value(project).ok()
}

/// One project summary from a `data-projects` listing payload.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectSummaryJson {
    pub name: Option<String>,
    pub blurb: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub goal: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub pledged: Option<f64>,
    pub backers_count: Option<i64>,
    pub state: Option<String>,
    pub staff_pick: Option<bool>,
    pub currency: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub static_usd_rate: Option<f64>,
    pub created_at: Option<i64>,
    pub launched_at: Option<i64>,
    pub deadline: Option<i64>,
    pub creator: Option<SummaryCreator>,
    pub location: Option<SummaryLocation>,
    pub category: Option<SummaryCategory>,
    pub urls: Option<SummaryUrls>,
}

impl ProjectSummaryJson {
    pub fn web_url(&self) -> Option<String> {
        self.urls
            .as_ref()
            .and_then(|u| u.web.as_ref())
            .and_then(|w| w.project.clone())
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct SummaryCreator {
    pub id: Option<i64>,
    pub name: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct SummaryLocation {
    pub displayable_name: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct SummaryCategory {
    pub name: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct SummaryUrls {
    pub web: Option<SummaryWeb>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct SummaryWeb {
    pub project: Option<String>,
}

/// Every `data-projects` payload across the given pagination documents,
/// concatenated in document order. Malformed payloads are skipped.
pub fn project_summaries(docs: &[Html]) -> Vec<ProjectSummaryJson> {
    let mut out = Vec::new();
    for doc in docs {
        for raw in select::all_attrs(doc, "[data-projects]", "data-projects") {
            if let Ok(batch) = serde_json::from_str::<Vec<ProjectSummaryJson>>(&raw) {
                out.extend(batch);
            }
        }
    }
    out
}

/// Some captures carry numeric fields as JSON strings ("5731.0"), others
/// as numbers. Accept both.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_project_initial_from_attribute() {
        let html = r#"<html><body><div data-initial='{"project":{
            "name":"Solar Lantern",
            "state":"live",
            "verifiedIdentity":"Jane Maker",
            "backersCount":42,
            "deadlineAt":1552532340,
            "isProjectWeLove":true,
            "collaborators":{"edges":[{"node":{"name":"Sam","url":"https://example.com/sam"},"title":"Editor"}]},
            "creator":{"name":"Jane Maker","launchedProjects":{"totalCount":3},"backingsCount":7},
            "category":{"name":"Gadgets","parentCategory":{"name":"Technology"}},
            "location":{"displayableName":"Portland, OR"}
        }}'></div></body></html>"#;
        let doc = Html::parse_document(html);
        let project = project_initial(&doc).unwrap();
        assert_eq!(project.name.as_deref(), Some("Solar Lantern"));
        assert_eq!(project.verified_identity.as_deref(), Some("Jane Maker"));
        assert_eq!(project.backers_count, Some(42));
        assert_eq!(project.is_project_we_love, Some(true));
        let creator = project.creator.unwrap();
        assert_eq!(creator.created_count(), Some(3));
        assert_eq!(creator.backed_count(), Some(7));
        let collabs = project.collaborators.unwrap();
        assert_eq!(collabs.edges.len(), 1);
        assert_eq!(collabs.edges[0].node.name.as_deref(), Some("Sam"));
    }

    #[test]
    fn malformed_payload_is_none() {
        let doc = Html::parse_document(
            "<html><body><div data-initial='{not json'></div></body></html>",
        );
        assert!(project_initial(&doc).is_none());

        let doc = Html::parse_document(
            "<html><body><div data-initial='{\"other\":1}'></div></body></html>",
        );
        assert!(project_initial(&doc).is_none());
    }

    #[test]
    fn summaries_concatenate_across_documents() {
        let page1 = Html::parse_document(
            r#"<div data-projects='[{"name":"A","goal":"100.0","pledged":250.5,"state":"successful"}]'></div>"#,
        );
        let page2 = Html::parse_document(
            r#"<div data-projects='[{"name":"B","goal":50,"currency":"EUR","static_usd_rate":"1.1"}]'></div>"#,
        );
        let all = project_summaries(&[page1, page2]);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name.as_deref(), Some("A"));
        assert_eq!(all[0].goal, Some(100.0));
        assert_eq!(all[0].pledged, Some(250.5));
        assert_eq!(all[1].goal, Some(50.0));
        assert_eq!(all[1].static_usd_rate, Some(1.1));
    }

    #[test]
    fn empty_listing_page_yields_nothing() {
        let page = Html::parse_document("<html><body><div class=\"grid\"></div></body></html>");
        assert!(project_summaries(&[page]).is_empty());
    }
}
