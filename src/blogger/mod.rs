//! Thin client for the Blogger feed API.
//!
//! Wraps the handful of remote operations a migration needs: authenticate
//! (credential login or AuthSub token exchange), create a post, create a
//! comment on a post's replies feed, list existing posts, delete a post.
//! Post and comment creation share one post-with-retry primitive; every
//! other call fails fast.

pub mod atom;

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info};

pub use atom::RemotePost;

/// Client identifier sent as both User-Agent and the login `source` field.
pub const CLIENT_SOURCE: &str = "wp-blog-migrator/0.1";

/// Production feed endpoint.
pub const DEFAULT_FEED_BASE: &str = "https://www.blogger.com";

/// Production account endpoint.
pub const DEFAULT_AUTH_BASE: &str = "https://www.google.com";

/// Feed scope an AuthSub token must be issued for.
const FEEDS_SCOPE: &str = "http://www.blogger.com/feeds";

const ATOM_CONTENT_TYPE: &str = "application/atom+xml";

/// Attempts per creation call, including the first.
const MAX_ATTEMPTS: u32 = 5;

/// Pause between attempts.
const RETRY_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("authentication rejected: {reason}")]
    Authentication { reason: String },
    #[error("request to {url} failed")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered {status}")]
    Status { url: String, status: StatusCode },
    #[error("posting to {url} failed after {attempts} attempts")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: Box<PublishError>,
    },
    #[error("failed to delete {url}")]
    Delete {
        url: String,
        #[source]
        source: Box<PublishError>,
    },
    #[error("entry {entry} has no {rel} link")]
    MissingLink { entry: String, rel: &'static str },
}

/// Authenticated handle to the service. Created once per run, immutable
/// afterwards; there is no refresh.
#[derive(Debug, Clone)]
pub struct Session {
    authorization: String,
}

impl Session {
    fn client_login(token: &str) -> Self {
        Self {
            authorization: format!("GoogleLogin auth={token}"),
        }
    }

    fn authsub(token: &str) -> Self {
        Self {
            authorization: format!(r#"AuthSub token="{token}""#),
        }
    }

    fn header_value(&self) -> &str {
        &self.authorization
    }
}

/// Handle to a just-created post. Comments for the post are submitted to
/// its replies feed, which only exists once the post does.
#[derive(Debug, Clone)]
pub struct PublishedPost {
    pub replies_url: String,
}

/// The URL an operator visits to authorize an AuthSub token for the feed
/// scope; the token is then handed to this tool instead of a password.
#[must_use]
pub fn authsub_request_url(next_url: &str) -> String {
    format!(
        "{DEFAULT_AUTH_BASE}/accounts/AuthSubRequest?scope={}&session=1&secure=0&next={}",
        urlencoding::encode(FEEDS_SCOPE),
        urlencoding::encode(next_url)
    )
}

pub struct BloggerClient {
    http: reqwest::Client,
    feed_base: String,
    auth_base: String,
}

impl Default for BloggerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BloggerClient {
    #[must_use]
    pub fn new() -> Self {
        Self::with_bases(DEFAULT_FEED_BASE, DEFAULT_AUTH_BASE)
    }

    /// Client against alternative endpoints.
    #[must_use]
    pub fn with_bases(feed_base: impl Into<String>, auth_base: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(CLIENT_SOURCE)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            http,
            feed_base: feed_base.into(),
            auth_base: auth_base.into(),
        }
    }

    /// Authenticate with username and password.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Authentication`] if the service rejects the
    /// credentials.
    pub async fn login(&self, user: &str, password: &str) -> Result<Session, PublishError> {
        let url = format!("{}/accounts/ClientLogin", self.auth_base);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("accountType", "GOOGLE"),
                ("Email", user),
                ("Passwd", password),
                ("service", "blogger"),
                ("source", CLIENT_SOURCE),
            ])
            .send()
            .await
            .map_err(|source| PublishError::Network {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        let body = response.text().await.map_err(|source| PublishError::Network {
            url: url.clone(),
            source,
        })?;
        if !status.is_success() {
            return Err(PublishError::Authentication {
                reason: auth_failure_reason(status, &body),
            });
        }
        let token = token_line(&body, "Auth=").ok_or_else(|| PublishError::Authentication {
            reason: "login response carried no Auth token".to_string(),
        })?;
        info!(user = %user, "Authenticated via credential login");
        Ok(Session::client_login(token))
    }

    /// Exchange a single-use AuthSub token for a session token.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Authentication`] if the service rejects the
    /// token.
    pub async fn session_from_token(&self, authsub_token: &str) -> Result<Session, PublishError> {
        let url = format!("{}/accounts/AuthSubSessionToken", self.auth_base);
        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, format!(r#"AuthSub token="{authsub_token}""#))
            .send()
            .await
            .map_err(|source| PublishError::Network {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        let body = response.text().await.map_err(|source| PublishError::Network {
            url: url.clone(),
            source,
        })?;
        if !status.is_success() {
            return Err(PublishError::Authentication {
                reason: auth_failure_reason(status, &body),
            });
        }
        let token = token_line(&body, "Token=").ok_or_else(|| PublishError::Authentication {
            reason: "token exchange carried no session token".to_string(),
        })?;
        info!("Authenticated via AuthSub token");
        Ok(Session::authsub(token))
    }

    /// Create a post on the blog and return the handle its comments are
    /// published through.
    ///
    /// A success response here does not prove the post persisted: Blogger
    /// applies an undocumented per-day quota and may drop the entry while
    /// still answering 2xx. Not detected.
    ///
    /// # Errors
    ///
    /// Returns an error once the retry budget is exhausted, or if the
    /// response entry has no replies link.
    pub async fn create_post(
        &self,
        session: &Session,
        blog_id: &str,
        author: &str,
        title: &str,
        content: &str,
        published: DateTime<Utc>,
        categories: &[String],
    ) -> Result<PublishedPost, PublishError> {
        let url = format!("{}/feeds/{blog_id}/posts/default", self.feed_base);
        let entry = atom::post_entry(author, title, content, published, categories);
        let body = self.post_entry_with_retry(session, &url, &entry).await?;
        let replies_url = atom::find_link(&body, "replies", Some(ATOM_CONTENT_TYPE)).ok_or(
            PublishError::MissingLink {
                entry: url,
                rel: "replies",
            },
        )?;
        debug!(replies_url = %replies_url, "Created post");
        Ok(PublishedPost { replies_url })
    }

    /// Create a comment on a post's replies feed.
    ///
    /// Blogger ignores the structured author on comment entries, so when
    /// `attribute_author` is set the body gets an attribution prefix naming
    /// the author, hyperlinked when an author URL is known.
    ///
    /// # Errors
    ///
    /// Returns an error once the retry budget is exhausted.
    pub async fn create_comment(
        &self,
        session: &Session,
        replies_url: &str,
        author: &str,
        author_url: Option<&str>,
        content: &str,
        published: DateTime<Utc>,
        attribute_author: bool,
    ) -> Result<(), PublishError> {
        let body = if attribute_author {
            attributed_body(author, author_url, content)
        } else {
            content.to_string()
        };
        let entry = atom::comment_entry(author, &body, published);
        self.post_entry_with_retry(session, replies_url, &entry)
            .await?;
        debug!(replies_url = %replies_url, author = %author, "Created comment");
        Ok(())
    }

    /// List the existing posts of a blog, in feed order.
    ///
    /// # Errors
    ///
    /// Returns an error if the feed cannot be fetched.
    pub async fn list_posts(
        &self,
        session: &Session,
        blog_id: &str,
    ) -> Result<Vec<RemotePost>, PublishError> {
        let url = format!("{}/feeds/{blog_id}/posts/default", self.feed_base);
        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, session.header_value())
            .send()
            .await
            .map_err(|source| PublishError::Network {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Status { url, status });
        }
        let body = response.text().await.map_err(|source| PublishError::Network {
            url: url.clone(),
            source,
        })?;
        Ok(atom::parse_feed_entries(&body))
    }

    /// Delete one post through its edit link. Not retried: a failure here
    /// aborts the caller.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Delete`] on any failure, or
    /// [`PublishError::MissingLink`] if the listed entry had no edit link.
    pub async fn delete_post(
        &self,
        session: &Session,
        post: &RemotePost,
    ) -> Result<(), PublishError> {
        let url = post
            .edit_url
            .as_deref()
            .ok_or_else(|| PublishError::MissingLink {
                entry: post.id.clone(),
                rel: "edit",
            })?;
        let response = self
            .http
            .delete(url)
            .header(AUTHORIZATION, session.header_value())
            .send()
            .await
            .map_err(|source| PublishError::Delete {
                url: url.to_string(),
                source: Box::new(PublishError::Network {
                    url: url.to_string(),
                    source,
                }),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Delete {
                url: url.to_string(),
                source: Box::new(PublishError::Status {
                    url: url.to_string(),
                    status,
                }),
            });
        }
        debug!(url = %url, title = %post.title, "Deleted post");
        Ok(())
    }

    /// The shared post-and-retry primitive both creation calls go through.
    async fn post_entry_with_retry(
        &self,
        session: &Session,
        url: &str,
        entry: &str,
    ) -> Result<String, PublishError> {
        with_retry(url, MAX_ATTEMPTS, RETRY_PAUSE, || {
            self.post_entry(session, url, entry)
        })
        .await
    }

    /// One POST of an Atom entry; success returns the response body.
    async fn post_entry(
        &self,
        session: &Session,
        url: &str,
        entry: &str,
    ) -> Result<String, PublishError> {
        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, session.header_value())
            .header(CONTENT_TYPE, ATOM_CONTENT_TYPE)
            .body(entry.to_string())
            .send()
            .await
            .map_err(|source| PublishError::Network {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Status {
                url: url.to_string(),
                status,
            });
        }
        response.text().await.map_err(|source| PublishError::Network {
            url: url.to_string(),
            source,
        })
    }
}

/// Retry-with-budget combinator: run `operation` up to `max_attempts`
/// times, pausing between attempts. Failure kinds are not classified; the
/// same budget applies uniformly, and the last failure is surfaced wrapped
/// in [`PublishError::RetriesExhausted`].
async fn with_retry<T, F, Fut>(
    url: &str,
    max_attempts: u32,
    pause: Duration,
    mut operation: F,
) -> Result<T, PublishError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PublishError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(source) => {
                let remaining = max_attempts.saturating_sub(attempt);
                error!(url = %url, remaining, error = %source, "Failed to post, will retry");
                if remaining == 0 {
                    return Err(PublishError::RetriesExhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        source: Box::new(source),
                    });
                }
                sleep(pause).await;
            }
        }
    }
}

/// Body prefix naming the comment author, hyperlinked when their URL is
/// known.
fn attributed_body(author: &str, author_url: Option<&str>, content: &str) -> String {
    let author_html = match author_url {
        Some(url) => format!(r#"<a href="{url}">{author}</a>"#),
        None => author.to_string(),
    };
    format!("<em>Comment from {author_html}:</em>\r\n\r\n{content}")
}

fn token_line<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    body.lines()
        .find_map(|line| line.strip_prefix(key))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn auth_failure_reason(status: StatusCode, body: &str) -> String {
    token_line(body, "Error=").map_or_else(|| format!("status {status}"), ToString::to_string)
}
