use feed_rs::parser;

use crate::error::Result;
use crate::models::NewSourceItem;
use crate::text::{compute_content_hash, normalize_text};

/// Parse RSS/Atom bytes into candidate items in document order.
pub fn parse_feed(source_id: i64, bytes: &[u8]) -> Result<Vec<NewSourceItem>> {
    let feed = parser::parse(bytes)?;

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            // Try content first, then fall back to summary
            let content_html = entry
                .content
                .as_ref()
                .and_then(|c| c.body.as_ref())
                .or_else(|| entry.summary.as_ref().map(|s| &s.content));

            let body = content_html
                .and_then(|html| html2text::from_read(html.as_bytes(), 80).ok())
                .map(|text| normalize_text(&text))
                .unwrap_or_default();

            let title = entry
                .title
                .map(|t| normalize_text(&t.content))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Untitled".to_string());

            // Entries without a link fall back to their id so (source, link) stays unique
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_else(|| entry.id.clone());

            let content_hash = compute_content_hash(&[&link, &title, &body]);

            NewSourceItem {
                source_id,
                external_id: entry.id,
                link,
                title,
                published_at: entry.published.or(entry.updated),
                raw_text: body,
                content_hash,
            }
        })
        .collect();

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Example</title>
    <link>https://example.com</link>
    <description>Example feed</description>
    <item>
      <guid>item-1</guid>
      <title>First   story</title>
      <link>https://example.com/1</link>
      <description>&lt;p&gt;Hello &lt;b&gt;world&lt;/b&gt;&lt;/p&gt;</description>
      <pubDate>Mon, 02 Mar 2026 09:00:00 GMT</pubDate>
    </item>
    <item>
      <guid>item-2</guid>
      <title>Second story</title>
      <link>https://example.com/2</link>
      <description>Plain body</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_entries_in_order() {
        let items = parse_feed(7, RSS.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source_id, 7);
        assert_eq!(items[0].external_id, "item-1");
        assert_eq!(items[0].link, "https://example.com/1");
        assert_eq!(items[0].title, "First story");
        assert!(items[0].raw_text.contains("Hello"));
        assert!(items[0].raw_text.contains("world"));
        assert!(items[0].published_at.is_some());
        assert_ne!(items[0].content_hash, items[1].content_hash);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(parse_feed(1, b"definitely not xml").is_err());
    }
}
