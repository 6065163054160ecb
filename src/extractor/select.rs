//! Find-first-match helpers over `scraper` documents.
//!
//! Page field lookups take an ordered list of CSS selectors and return the
//! first hit, so a layout change shows up as a missing value instead of a
//! crash. Selectors that fail to parse are skipped.

use scraper::{ElementRef, Html, Selector};

/// First element matched by any selector in the chain, in chain order.
pub fn first_element<'a>(doc: &'a Html, selectors: &[&str]) -> Option<ElementRef<'a>> {
    first_element_in(doc.root_element(), selectors)
}

pub fn first_element_in<'a>(root: ElementRef<'a>, selectors: &[&str]) -> Option<ElementRef<'a>> {
    for raw in selectors {
        let sel = match Selector::parse(raw) {
            Ok(sel) => sel,
            Err(_) => continue,
        };
        if let Some(el) = root.select(&sel).next() {
            return Some(el);
        }
    }
    None
}

/// First non-empty text content found by the chain, trimmed.
/// Elements that match but carry no text fall through to later matches.
pub fn first_text(doc: &Html, selectors: &[&str]) -> Option<String> {
    first_text_in(doc.root_element(), selectors)
}

pub fn first_text_in(root: ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    for raw in selectors {
        let sel = match Selector::parse(raw) {
            Ok(sel) => sel,
            Err(_) => continue,
        };
        for el in root.select(&sel) {
            let text = el.text().collect::<String>();
            let text = text.trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

/// First non-empty value of `attr` found by the chain.
pub fn first_attr(doc: &Html, selectors: &[&str], attr: &str) -> Option<String> {
    first_attr_in(doc.root_element(), selectors, attr)
}

pub fn first_attr_in(root: ElementRef<'_>, selectors: &[&str], attr: &str) -> Option<String> {
    for raw in selectors {
        let sel = match Selector::parse(raw) {
            Ok(sel) => sel,
            Err(_) => continue,
        };
        for el in root.select(&sel) {
            if let Some(value) = el.value().attr(attr) {
                if !value.trim().is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// All elements matched by the first selector in the chain that matches
/// anything. Used where page variants render the same list under
/// different markup (reward tiers, category pills).
pub fn elements<'a>(doc: &'a Html, selectors: &[&str]) -> Vec<ElementRef<'a>> {
    for raw in selectors {
        let sel = match Selector::parse(raw) {
            Ok(sel) => sel,
            Err(_) => continue,
        };
        let found: Vec<ElementRef<'a>> = doc.select(&sel).collect();
        if !found.is_empty() {
            return found;
        }
    }
    Vec::new()
}

/// All elements under `root` matched by a single selector.
pub fn all_in<'a>(root: ElementRef<'a>, selector: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(selector) {
        Ok(sel) => root.select(&sel).collect(),
        Err(_) => Vec::new(),
    }
}

/// Trimmed text of every element matched by a single selector.
pub fn all_texts(doc: &Html, selector: &str) -> Vec<String> {
    let sel = match Selector::parse(selector) {
        Ok(sel) => sel,
        Err(_) => return Vec::new(),
    };
    doc.select(&sel)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .collect()
}

/// `attr` value of every element matched by a single selector.
pub fn all_attrs(doc: &Html, selector: &str, attr: &str) -> Vec<String> {
    let sel = match Selector::parse(selector) {
        Ok(sel) => sel,
        Err(_) => return Vec::new(),
    };
    doc.select(&sel)
        .filter_map(|el| el.value().attr(attr).map(str::to_string))
        .collect()
}

pub fn count_in(root: ElementRef<'_>, selector: &str) -> usize {
    match Selector::parse(selector) {
        Ok(sel) => root.select(&sel).count(),
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
            <div class="new-layout"><span class="figure">1,234</span></div>
            <span class="empty"></span>
            <a class="link" href="/next">next</a>
            <ul><li class="row">a</li><li class="row">b</li></ul>
        </body></html>
    "#;

    #[test]
    fn chain_returns_first_hit() {
        let doc = Html::parse_document(PAGE);
        let text = first_text(&doc, &["div.old-layout span", "div.new-layout span.figure"]);
        assert_eq!(text.as_deref(), Some("1,234"));
    }

    #[test]
    fn exhausted_chain_is_none() {
        let doc = Html::parse_document(PAGE);
        assert_eq!(first_text(&doc, &["div.gone", "span.also-gone"]), None);
    }

    #[test]
    fn empty_elements_fall_through() {
        let doc = Html::parse_document(PAGE);
        let text = first_text(&doc, &["span.empty", "span.figure"]);
        assert_eq!(text.as_deref(), Some("1,234"));
    }

    #[test]
    fn invalid_selector_is_skipped() {
        let doc = Html::parse_document(PAGE);
        let text = first_text(&doc, &["div..broken[", "span.figure"]);
        assert_eq!(text.as_deref(), Some("1,234"));
    }

    #[test]
    fn attr_lookup() {
        let doc = Html::parse_document(PAGE);
        assert_eq!(
            first_attr(&doc, &["a.link"], "href").as_deref(),
            Some("/next")
        );
        assert_eq!(first_attr(&doc, &["a.link"], "title"), None);
    }

    #[test]
    fn element_lists_keep_document_order() {
        let doc = Html::parse_document(PAGE);
        let rows = elements(&doc, &["li.missing", "li.row"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(all_texts(&doc, "li.row"), vec!["a", "b"]);
    }
}
