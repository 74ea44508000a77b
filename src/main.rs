use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use dialoguer::Password;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wp_blog_migrator::blogger::{self, BloggerClient};
use wp_blog_migrator::config::MigrationOptions;
use wp_blog_migrator::migrate;

/// Extract posts from a WordPress XML export file FILE and post them, with
/// their approved comments, to the specified Blogger blog.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// WordPress XML export file (standard input when omitted)
    file: Option<PathBuf>,

    /// Blogger username
    #[arg(short, long, value_name = "USERNAME")]
    user: Option<String>,

    /// Blogger password (omit to get prompted)
    #[arg(short, long, value_name = "PASSWORD")]
    password: Option<String>,

    /// Blogger AuthSub token (instead of username/password)
    #[arg(short, long, value_name = "TOKEN")]
    token: Option<String>,

    /// Blogger blog ID
    #[arg(short, long = "blog", value_name = "ID")]
    blog: Option<String>,

    /// Author for migrated posts
    #[arg(short, long, value_name = "NAME")]
    author: Option<String>,

    /// Delete all entries from the existing blog first
    #[arg(short, long)]
    delete: bool,

    /// Print the AuthSub authorization URL for NEXT_URL and exit
    #[arg(long, value_name = "NEXT_URL", conflicts_with_all = ["user", "password", "token", "blog", "author", "delete"])]
    authsub_url: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    if let Some(next_url) = args.authsub_url.as_deref() {
        println!("{}", blogger::authsub_request_url(next_url));
        return Ok(());
    }

    init_tracing()?;

    let (options, file) = resolve_options(args)?;

    let input = open_input(file.as_deref())?;
    let client = BloggerClient::new();
    migrate::run(&client, &options, input).await
}

/// Turn parsed arguments into run options, prompting for the password when
/// neither a password nor a token was given. Usage errors exit through the
/// clap parser before any network activity.
fn resolve_options(args: Args) -> Result<(MigrationOptions, Option<PathBuf>)> {
    let password = if args.password.is_none() && args.token.is_none() {
        Some(
            Password::new()
                .with_prompt("Blogger password")
                .interact()
                .context("Failed to read password")?,
        )
    } else {
        args.password
    };

    let mut cmd = Args::command();
    let (Some(blog_id), Some(post_author)) = (args.blog, args.author) else {
        cmd.error(
            ErrorKind::MissingRequiredArgument,
            "must specify blogger user/password or token and blog ID and post author",
        )
        .exit();
    };

    match MigrationOptions::resolve(
        args.user,
        password,
        args.token,
        blog_id,
        post_author,
        args.delete,
    ) {
        Ok(options) => Ok((options, args.file)),
        Err(e) => cmd.error(ErrorKind::MissingRequiredArgument, e.to_string()).exit(),
    }
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn Read>> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open export file {}", path.display()))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(std::io::stdin())),
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wp_blog_migrator=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    Ok(())
}
