//! Sequential migration driver.
//!
//! Composes the export reader and the publishing client: authenticate once,
//! optionally clear the destination blog, then publish each parsed post and
//! its comments strictly in document order. One post is fully published
//! (post, then all its comments) before the next begins, because each
//! comment needs the replies URL of its freshly created parent.
//!
//! There is no checkpointing: the first unrecovered failure aborts the run,
//! and a rerun republishes everything from the start, duplicating posts
//! already sent.

use std::io::Read;

use anyhow::{Context, Result};
use tracing::info;

use crate::blogger::{BloggerClient, PublishError, Session};
use crate::config::{Credentials, MigrationOptions};
use crate::export::{ExportReader, Post};

/// Run one migration over `export`.
///
/// # Errors
///
/// Returns an error on authentication failure, on any delete failure while
/// clearing, on a parse anomaly, or once a creation call exhausts its retry
/// budget.
pub async fn run(
    client: &BloggerClient,
    options: &MigrationOptions,
    export: impl Read,
) -> Result<()> {
    let session = authenticate(client, &options.credentials).await?;

    if options.delete_first {
        info!(blog_id = %options.blog_id, "Removing existing posts from blog");
        clear_blog(client, &session, &options.blog_id).await?;
    }

    let posts = ExportReader::new(export)?;
    for post in posts {
        let post = post.context("Failed to parse export item")?;
        info!(
            title = %post.title,
            source_author = %post.author,
            comments = post.comments.len(),
            "Processing post"
        );
        publish_post(client, &session, options, &post).await?;
    }
    Ok(())
}

async fn authenticate(
    client: &BloggerClient,
    credentials: &Credentials,
) -> Result<Session, PublishError> {
    match credentials {
        Credentials::Token(token) => client.session_from_token(token).await,
        Credentials::Login { user, password } => client.login(user, password).await,
    }
}

/// Delete every existing post on the blog, sequentially, without retry.
///
/// # Errors
///
/// The first failing delete propagates immediately.
pub async fn clear_blog(
    client: &BloggerClient,
    session: &Session,
    blog_id: &str,
) -> Result<(), PublishError> {
    for post in client.list_posts(session, blog_id).await? {
        client.delete_post(session, &post).await?;
    }
    Ok(())
}

/// Publish one post, then its comments in order against the fresh replies
/// URL. Comments by the configured run author carry no attribution prefix.
async fn publish_post(
    client: &BloggerClient,
    session: &Session,
    options: &MigrationOptions,
    post: &Post,
) -> Result<(), PublishError> {
    let created = client
        .create_post(
            session,
            &options.blog_id,
            &options.post_author,
            &post.title,
            &post.content,
            post.published,
            &post.categories,
        )
        .await?;

    for comment in &post.comments {
        let attribute_author = comment.author != options.post_author;
        client
            .create_comment(
                session,
                &created.replies_url,
                &comment.author,
                comment.author_url.as_deref(),
                &comment.content,
                comment.published,
                attribute_author,
            )
            .await?;
    }
    Ok(())
}
