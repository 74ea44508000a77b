//! Resolved options for one migration run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("must specify blogger user/password or token")]
    MissingCredentials,
}

/// How the run authenticates. Exactly one variant per run; a token wins
/// over username/password when both are given.
#[derive(Debug, Clone)]
pub enum Credentials {
    Login { user: String, password: String },
    Token(String),
}

/// Everything a migration run needs besides the export stream.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub credentials: Credentials,
    /// Destination blog id.
    pub blog_id: String,
    /// Author every migrated post is attributed to, regardless of who
    /// wrote it in the source blog.
    pub post_author: String,
    /// Delete all existing posts on the destination before publishing.
    pub delete_first: bool,
}

impl MigrationOptions {
    /// Resolve CLI inputs into run options.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredentials`] when neither a token nor
    /// a complete user/password pair was given.
    pub fn resolve(
        user: Option<String>,
        password: Option<String>,
        token: Option<String>,
        blog_id: String,
        post_author: String,
        delete_first: bool,
    ) -> Result<Self, ConfigError> {
        let credentials = match (token, user, password) {
            (Some(token), _, _) => Credentials::Token(token),
            (None, Some(user), Some(password)) => Credentials::Login { user, password },
            _ => return Err(ConfigError::MissingCredentials),
        };
        Ok(Self {
            credentials,
            blog_id,
            post_author,
            delete_first,
        })
    }
}
