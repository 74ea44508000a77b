//! Atom entry construction and response parsing for the Blogger feed API.
//!
//! Entries are posted to feed URLs as `application/atom+xml` documents and
//! come back as Atom entries whose `<link>` elements carry the URLs for
//! follow-up operations: `rel="replies"` is the feed comments are posted
//! to, `rel="edit"` is the address a post is deleted through.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

/// Category scheme Blogger expects on post labels.
pub const CATEGORY_SCHEME: &str = "http://www.blogger.com/atom/ns#";

/// Timestamp layout for Atom `<published>` elements, always UTC.
const ATOM_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// An existing post on the destination blog, as listed by its posts feed.
#[derive(Debug, Clone)]
pub struct RemotePost {
    /// Atom entry id.
    pub id: String,
    pub title: String,
    /// `rel="edit"` link, the address the post is deleted through. Blogger
    /// emits one on every entry; a feed that omits it is malformed.
    pub edit_url: Option<String>,
}

/// Format a timestamp for the wire (`YYYY-MM-DDTHH:MM:SSZ`).
#[must_use]
pub fn format_published(published: DateTime<Utc>) -> String {
    published.format(ATOM_TIME_FORMAT).to_string()
}

/// Build the Atom entry for a new blog post.
#[must_use]
pub fn post_entry(
    author: &str,
    title: &str,
    content: &str,
    published: DateTime<Utc>,
    categories: &[String],
) -> String {
    let mut entry = String::new();
    entry.push_str(r#"<entry xmlns="http://www.w3.org/2005/Atom">"#);
    let _ = write!(
        entry,
        "<author><name>{}</name></author>",
        escape(author)
    );
    let _ = write!(entry, r#"<title type="xhtml">{}</title>"#, escape(title));
    let _ = write!(
        entry,
        r#"<content type="html">{}</content>"#,
        escape(content)
    );
    let _ = write!(
        entry,
        "<published>{}</published>",
        format_published(published)
    );
    for category in categories {
        let _ = write!(
            entry,
            r#"<category term="{}" scheme="{CATEGORY_SCHEME}"/>"#,
            escape(category)
        );
    }
    entry.push_str("</entry>");
    entry
}

/// Build the Atom entry for a comment.
///
/// The structured author is included for completeness, but Blogger ignores
/// it on comment entries; callers that care about attribution must bake it
/// into `content` beforehand.
#[must_use]
pub fn comment_entry(author: &str, content: &str, published: DateTime<Utc>) -> String {
    let mut entry = String::new();
    entry.push_str(r#"<entry xmlns="http://www.w3.org/2005/Atom">"#);
    let _ = write!(
        entry,
        "<author><name>{}</name></author>",
        escape(author)
    );
    let _ = write!(
        entry,
        r#"<content type="xhtml">{}</content>"#,
        escape(content)
    );
    let _ = write!(
        entry,
        "<published>{}</published>",
        format_published(published)
    );
    entry.push_str("</entry>");
    entry
}

/// Find the href of the first `<link>` matching `rel` (and `type`, when
/// given) in an Atom document. Returns `None` on malformed input.
#[must_use]
pub fn find_link(xml: &str, rel: &str, link_type: Option<&str>) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e) | Event::Empty(ref e))
                if e.local_name().as_ref() == b"link" =>
            {
                if attribute(e, "rel").as_deref() == Some(rel)
                    && link_type.is_none_or(|t| attribute(e, "type").as_deref() == Some(t))
                {
                    if let Some(href) = attribute(e, "href") {
                        return Some(href);
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

/// Parse the entries of a posts feed into [`RemotePost`] records, in feed
/// order.
#[must_use]
pub fn parse_feed_entries(xml: &str) -> Vec<RemotePost> {
    let mut reader = Reader::from_str(xml);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.trim_text(true);

    let mut posts = Vec::new();
    let mut current: Option<RemotePost> = None;
    let mut capture: Option<&'static str> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"entry" => {
                    current = Some(RemotePost {
                        id: String::new(),
                        title: String::new(),
                        edit_url: None,
                    });
                }
                b"id" if current.is_some() => {
                    capture = Some("id");
                    text.clear();
                }
                b"title" if current.is_some() => {
                    capture = Some("title");
                    text.clear();
                }
                b"link" => entry_link(&mut current, e),
                _ => capture = None,
            },
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"link" => {
                entry_link(&mut current, e);
            }
            Ok(Event::Text(ref t)) => {
                if capture.is_some() {
                    if let Ok(chunk) = t.unescape() {
                        text.push_str(&chunk);
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"entry" => {
                    if let Some(post) = current.take() {
                        posts.push(post);
                    }
                }
                b"id" | b"title" => {
                    if let (Some(field), Some(post)) = (capture.take(), current.as_mut()) {
                        let value = std::mem::take(&mut text);
                        match field {
                            "id" => post.id = value,
                            _ => post.title = value,
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => return posts,
            Ok(_) => {}
        }
    }
}

fn entry_link(current: &mut Option<RemotePost>, e: &BytesStart<'_>) {
    let Some(post) = current.as_mut() else {
        return;
    };
    if attribute(e, "rel").as_deref() == Some("edit") && post.edit_url.is_none() {
        post.edit_url = attribute(e, "href");
    }
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok())
        .map(std::borrow::Cow::into_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2007, 3, 14, 9, 30, 0).unwrap()
    }

    #[test]
    fn post_entry_carries_all_fields() {
        let entry = post_entry(
            "Michael",
            "Hello & welcome",
            "<p>Body</p>",
            noon(),
            &["Code".to_string(), "Life".to_string()],
        );
        assert!(entry.contains("<name>Michael</name>"));
        assert!(entry.contains(r#"<title type="xhtml">Hello &amp; welcome</title>"#));
        assert!(entry.contains("&lt;p&gt;Body&lt;/p&gt;"));
        assert!(entry.contains("<published>2007-03-14T09:30:00Z</published>"));
        assert!(entry.contains(r#"<category term="Code" scheme="http://www.blogger.com/atom/ns#"/>"#));
        assert!(entry.contains(r#"<category term="Life""#));
    }

    #[test]
    fn comment_entry_is_xhtml() {
        let entry = comment_entry("alice", "Nice one", noon());
        assert!(entry.contains(r#"<content type="xhtml">Nice one</content>"#));
        assert!(entry.contains("<published>2007-03-14T09:30:00Z</published>"));
    }

    #[test]
    fn finds_replies_link_by_rel_and_type() {
        let xml = r#"<entry xmlns="http://www.w3.org/2005/Atom">
            <link rel="replies" type="text/html" href="https://b.example/wrong"/>
            <link rel="replies" type="application/atom+xml" href="https://b.example/feeds/1/100/comments/default"/>
            <link rel="edit" href="https://b.example/feeds/1/posts/default/100"/>
        </entry>"#;
        assert_eq!(
            find_link(xml, "replies", Some("application/atom+xml")).as_deref(),
            Some("https://b.example/feeds/1/100/comments/default")
        );
        assert_eq!(
            find_link(xml, "edit", None).as_deref(),
            Some("https://b.example/feeds/1/posts/default/100")
        );
        assert_eq!(find_link(xml, "self", None), None);
    }

    #[test]
    fn parses_feed_entries_with_edit_links() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
            <title>My Blog</title>
            <link rel="self" href="https://b.example/feeds/1/posts/default"/>
            <entry>
                <id>tag:blogger.com,1999:post-100</id>
                <title>First</title>
                <link rel="edit" href="https://b.example/feeds/1/posts/default/100"/>
            </entry>
            <entry>
                <id>tag:blogger.com,1999:post-101</id>
                <title>Second</title>
            </entry>
        </feed>"#;
        let posts = parse_feed_entries(xml);
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].title, "First");
        assert_eq!(
            posts[0].edit_url.as_deref(),
            Some("https://b.example/feeds/1/posts/default/100")
        );
        assert_eq!(posts[1].id, "tag:blogger.com,1999:post-101");
        assert!(posts[1].edit_url.is_none());
    }
}
