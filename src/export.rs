//! WordPress export (WXR) parsing.
//!
//! A WordPress export is an RSS document with one `<item>` per post, page,
//! attachment, or revision, carrying WordPress-namespaced fields for post
//! type, status, and nested comments. [`ExportReader`] streams that document
//! into [`Post`] records in a single forward pass, in document order.
//!
//! Only items with post type `post` and status `publish` are materialized,
//! and only comments whose approval flag is literally `"1"`. Everything else
//! is skipped silently. Real-world exports often carry broken encodings, so
//! the whole input is normalized to UTF-8 (invalid sequences become the
//! replacement character) before parsing, and unmatched closing tags are
//! tolerated.

use std::io::{Cursor, Read};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

/// Timestamp layout used by WordPress export date fields, always UTC.
const WP_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One published post from the export, with its approved comments attached.
#[derive(Debug, Clone)]
pub struct Post {
    /// Source-system post id.
    pub id: String,
    pub title: String,
    /// HTML body.
    pub content: String,
    /// Display name of the original author.
    pub author: String,
    pub published: DateTime<Utc>,
    /// Category labels, in document order.
    pub categories: Vec<String>,
    /// Approved comments, in document order.
    pub comments: Vec<Comment>,
}

/// One approved comment on a post.
#[derive(Debug, Clone)]
pub struct Comment {
    /// HTML or plain text body.
    pub content: String,
    /// Display name of the commenter.
    pub author: String,
    /// Commenter's website, when they gave one. Absent and empty both map
    /// to `None` so downstream rendering never emits a placeholder link.
    pub author_url: Option<String>,
    pub published: DateTime<Utc>,
}

/// Parse a WordPress export date (`YYYY-MM-DD HH:MM:SS`, UTC).
///
/// # Errors
///
/// Returns an error if `raw` does not match the export layout.
pub fn parse_wp_date(raw: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), WP_DATE_FORMAT)
        .with_context(|| format!("invalid export date {raw:?}"))?;
    Ok(naive.and_utc())
}

/// Element content currently being captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    PostId,
    Title,
    Content,
    Creator,
    PostType,
    Status,
    PostDate,
    Category,
    CommentContent,
    CommentAuthor,
    CommentAuthorUrl,
    CommentApproved,
    CommentDate,
}

/// Item fields accumulated while its element is open.
#[derive(Debug, Default)]
struct PartialItem {
    id: Option<String>,
    title: Option<String>,
    content: Option<String>,
    creator: Option<String>,
    post_type: Option<String>,
    status: Option<String>,
    date: Option<String>,
    categories: Vec<String>,
    comments: Vec<Comment>,
}

#[derive(Debug, Default)]
struct PartialComment {
    content: Option<String>,
    author: Option<String>,
    author_url: Option<String>,
    approved: Option<String>,
    date: Option<String>,
}

/// Streaming reader over a WordPress export document.
///
/// Implements `Iterator<Item = Result<Post>>`: lazy, finite, not restartable.
pub struct ExportReader {
    reader: Reader<Cursor<Vec<u8>>>,
    item: Option<PartialItem>,
    comment: Option<PartialComment>,
    capture: Option<Field>,
    text: String,
}

impl ExportReader {
    /// Read the whole input and prepare a tolerant parser over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be read.
    pub fn new(mut input: impl Read) -> Result<Self> {
        let mut raw = Vec::new();
        input
            .read_to_end(&mut raw)
            .context("Failed to read export document")?;

        // Round-trip through a lossy decode so mixed or broken encodings
        // become replacement characters instead of aborting the parse.
        let doc = String::from_utf8_lossy(&raw).into_owned();

        let mut reader = Reader::from_reader(Cursor::new(doc.into_bytes()));
        let config = reader.config_mut();
        config.check_end_names = false;
        config.trim_text(true);

        Ok(Self {
            reader,
            item: None,
            comment: None,
            capture: None,
            text: String::new(),
        })
    }

    /// Map an element name onto a capture target, honoring where we are in
    /// the document: comment fields only bind inside `<wp:comment>`, item
    /// fields only bind inside `<item>` (the channel has a `<title>` too).
    fn classify(&self, name: &[u8]) -> Option<Field> {
        if self.comment.is_some() {
            return match name {
                b"wp:comment_content" => Some(Field::CommentContent),
                b"wp:comment_author" => Some(Field::CommentAuthor),
                b"wp:comment_author_url" => Some(Field::CommentAuthorUrl),
                b"wp:comment_approved" => Some(Field::CommentApproved),
                b"wp:comment_date_gmt" => Some(Field::CommentDate),
                _ => None,
            };
        }
        if self.item.is_some() {
            return match name {
                b"wp:post_id" => Some(Field::PostId),
                b"title" => Some(Field::Title),
                b"content:encoded" => Some(Field::Content),
                b"dc:creator" => Some(Field::Creator),
                b"wp:post_type" => Some(Field::PostType),
                b"wp:status" => Some(Field::Status),
                b"wp:post_date_gmt" => Some(Field::PostDate),
                b"category" => Some(Field::Category),
                _ => None,
            };
        }
        None
    }

    fn store(&mut self, field: Field, text: String) {
        if let Some(comment) = self.comment.as_mut() {
            match field {
                Field::CommentContent => comment.content = Some(text),
                Field::CommentAuthor => comment.author = Some(text),
                Field::CommentAuthorUrl => comment.author_url = Some(text),
                Field::CommentApproved => comment.approved = Some(text),
                Field::CommentDate => comment.date = Some(text),
                _ => {}
            }
            return;
        }
        if let Some(item) = self.item.as_mut() {
            match field {
                Field::PostId => item.id = Some(text),
                Field::Title => item.title = Some(text),
                Field::Content => item.content = Some(text),
                Field::Creator => item.creator = Some(text),
                Field::PostType => item.post_type = Some(text),
                Field::Status => item.status = Some(text),
                Field::PostDate => item.date = Some(text),
                Field::Category => {
                    if !text.is_empty() {
                        item.categories.push(text);
                    }
                }
                _ => {}
            }
        }
    }

    /// Close the open comment, keeping it only when the approval flag is
    /// present and literally `"1"`.
    fn finish_comment(&mut self) -> Result<()> {
        let Some(partial) = self.comment.take() else {
            return Ok(());
        };
        if partial.approved.as_deref() != Some("1") {
            return Ok(());
        }
        let date = partial
            .date
            .ok_or_else(|| anyhow!("approved comment missing wp:comment_date_gmt"))?;
        let published = parse_wp_date(&date)?;
        if let Some(item) = self.item.as_mut() {
            item.comments.push(Comment {
                content: partial.content.unwrap_or_default(),
                author: partial.author.unwrap_or_default(),
                author_url: partial.author_url.filter(|url| !url.is_empty()),
                published,
            });
        }
        Ok(())
    }

    /// Close the open item. Yields a [`Post`] only for published posts; the
    /// filter is a pure predicate over (type, status), so items missing
    /// either marker simply fail it.
    fn finish_item(&mut self) -> Option<Result<Post>> {
        let partial = self.item.take()?;
        if partial.post_type.as_deref() != Some("post")
            || partial.status.as_deref() != Some("publish")
        {
            return None;
        }
        let id = partial.id.unwrap_or_default();
        let Some(date) = partial.date else {
            return Some(Err(anyhow!(
                "published item {id:?} missing wp:post_date_gmt"
            )));
        };
        let published = match parse_wp_date(&date) {
            Ok(published) => published,
            Err(e) => return Some(Err(e)),
        };
        Some(Ok(Post {
            id,
            title: partial.title.unwrap_or_default(),
            content: partial.content.unwrap_or_default(),
            author: partial.creator.unwrap_or_default(),
            published,
            categories: partial.categories,
            comments: partial.comments,
        }))
    }
}

impl Iterator for ExportReader {
    type Item = Result<Post>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match self.reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => match e.name().as_ref() {
                    b"item" => {
                        self.item = Some(PartialItem::default());
                        self.capture = None;
                    }
                    b"wp:comment" if self.item.is_some() => {
                        self.comment = Some(PartialComment::default());
                        self.capture = None;
                    }
                    name => {
                        if let Some(field) = self.classify(name) {
                            self.capture = Some(field);
                            self.text.clear();
                        }
                    }
                },
                Ok(Event::Text(ref t)) => {
                    if self.capture.is_some() {
                        match t.unescape() {
                            Ok(text) => self.text.push_str(&text),
                            // Broken entity references degrade to raw text.
                            Err(_) => self.text.push_str(&String::from_utf8_lossy(t)),
                        }
                    }
                }
                Ok(Event::CData(ref t)) => {
                    if self.capture.is_some() {
                        self.text.push_str(&String::from_utf8_lossy(t));
                    }
                }
                Ok(Event::End(ref e)) => match e.name().as_ref() {
                    b"wp:comment" => {
                        self.capture = None;
                        if let Err(e) = self.finish_comment() {
                            return Some(Err(e));
                        }
                    }
                    b"item" => {
                        self.capture = None;
                        self.comment = None;
                        if let Some(post) = self.finish_item() {
                            return Some(post);
                        }
                    }
                    name => {
                        if let Some(field) = self.capture {
                            if self.classify(name) == Some(field) {
                                let text = std::mem::take(&mut self.text);
                                self.capture = None;
                                self.store(field, text);
                            }
                        }
                    }
                },
                Ok(Event::Eof) => return None,
                Ok(_) => {}
                Err(e) => {
                    return Some(Err(
                        anyhow::Error::new(e).context("Failed to parse export document")
                    ))
                }
            }
        }
    }
}
