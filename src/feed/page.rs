use scraper::{Html, Node, Selector};

use crate::models::NewSourceItem;
use crate::text::{compute_content_hash, normalize_text, truncate_chars};

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

#[derive(Debug, Clone, PartialEq)]
pub struct PageContent {
    pub title: String,
    pub text: String,
}

/// Title and visible text of an HTML page, with script and style content removed
/// and the text capped at `max_chars`.
pub fn extract_page(html: &str, max_chars: usize) -> PageContent {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|el| normalize_text(&el.text().collect::<String>()))
        .unwrap_or_default();

    let root = Selector::parse("body")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .unwrap_or_else(|| document.root_element());

    let mut text = String::new();
    for node in root.descendants() {
        let Node::Text(chunk) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
        });
        if !hidden {
            text.push_str(chunk);
            text.push(' ');
        }
    }

    let text = normalize_text(&text);
    PageContent {
        title,
        text: truncate_chars(&text, max_chars).to_string(),
    }
}

/// A `url` source yields one item per page, keyed by the page URL.
pub fn page_item(source_id: i64, url: &str, page: PageContent) -> NewSourceItem {
    let title = if page.title.is_empty() {
        url.to_string()
    } else {
        page.title
    };
    let content_hash = compute_content_hash(&[url, &title, &page.text]);
    NewSourceItem {
        source_id,
        external_id: url.to_string(),
        link: url.to_string(),
        title,
        published_at: None,
        raw_text: page.text,
        content_hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html>
<head><title> Launch  day </title><style>body { color: red }</style></head>
<body>
  <script>var secret = "do not include";</script>
  <h1>Big news</h1>
  <p>The product   ships today.</p>
  <noscript>Enable JS</noscript>
</body>
</html>"#;

    #[test]
    fn strips_scripts_and_styles() {
        let page = extract_page(PAGE, 1000);
        assert_eq!(page.title, "Launch day");
        assert!(page.text.contains("Big news"));
        assert!(page.text.contains("The product ships today."));
        assert!(!page.text.contains("secret"));
        assert!(!page.text.contains("color"));
        assert!(!page.text.contains("Enable JS"));
    }

    #[test]
    fn text_is_truncated() {
        let page = extract_page(PAGE, 8);
        assert_eq!(page.text.chars().count(), 8);
    }

    #[test]
    fn item_falls_back_to_url_title() {
        let item = page_item(
            3,
            "https://example.com/a",
            PageContent {
                title: String::new(),
                text: "body".to_string(),
            },
        );
        assert_eq!(item.title, "https://example.com/a");
        assert_eq!(item.external_id, item.link);
    }
}
