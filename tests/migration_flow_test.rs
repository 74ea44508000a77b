//! End-to-end migration tests against a mock Blogger server.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use wp_blog_migrator::blogger::BloggerClient;
use wp_blog_migrator::config::{Credentials, MigrationOptions};
use wp_blog_migrator::migrate;

/// One published post titled "Hello" (two categories, one approved comment
/// by alice, one unapproved), plus a draft that must never be published.
const SAMPLE_EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"
    xmlns:content="http://purl.org/rss/1.0/modules/content/"
    xmlns:dc="http://purl.org/dc/elements/1.1/"
    xmlns:wp="http://wordpress.org/export/1.0/">
  <channel>
    <title>Example Blog</title>
    <item>
      <title>Hello</title>
      <dc:creator><![CDATA[michael]]></dc:creator>
      <category><![CDATA[Code]]></category>
      <category><![CDATA[Life]]></category>
      <content:encoded><![CDATA[<p>First post body</p>]]></content:encoded>
      <wp:post_id>12</wp:post_id>
      <wp:post_date_gmt>2007-03-14 09:30:00</wp:post_date_gmt>
      <wp:post_type>post</wp:post_type>
      <wp:status>publish</wp:status>
      <wp:comment>
        <wp:comment_author><![CDATA[alice]]></wp:comment_author>
        <wp:comment_author_url>http://alice.example.com</wp:comment_author_url>
        <wp:comment_date_gmt>2007-03-15 10:00:00</wp:comment_date_gmt>
        <wp:comment_content><![CDATA[Nice one]]></wp:comment_content>
        <wp:comment_approved>1</wp:comment_approved>
      </wp:comment>
      <wp:comment>
        <wp:comment_author><![CDATA[spammer]]></wp:comment_author>
        <wp:comment_date_gmt>2007-03-16 10:00:00</wp:comment_date_gmt>
        <wp:comment_content><![CDATA[Buy pills]]></wp:comment_content>
        <wp:comment_approved>0</wp:comment_approved>
      </wp:comment>
    </item>
    <item>
      <title>Unfinished thoughts</title>
      <wp:post_id>13</wp:post_id>
      <wp:post_date_gmt>2007-04-01 00:00:00</wp:post_date_gmt>
      <wp:post_type>post</wp:post_type>
      <wp:status>draft</wp:status>
    </item>
  </channel>
</rss>"#;

fn options(delete_first: bool) -> MigrationOptions {
    MigrationOptions {
        credentials: Credentials::Login {
            user: "user@example.com".to_string(),
            password: "secret".to_string(),
        },
        blog_id: "1".to_string(),
        post_author: "Michael".to_string(),
        delete_first,
    }
}

fn created_entry(base: &str) -> String {
    format!(
        r#"<entry xmlns="http://www.w3.org/2005/Atom">
            <id>tag:blogger.com,1999:post-100</id>
            <title>Hello</title>
            <link rel="replies" type="application/atom+xml" href="{base}/feeds/1/100/comments/default"/>
            <link rel="edit" href="{base}/feeds/1/posts/default/100"/>
        </entry>"#
    )
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/accounts/ClientLogin"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Auth=token123\n"))
        .mount(server)
        .await;
}

async fn mount_publishing(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/feeds/1/posts/default"))
        .respond_with(ResponseTemplate::new(201).set_body_string(created_entry(&server.uri())))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/feeds/1/100/comments/default"))
        .respond_with(ResponseTemplate::new(201).set_body_string("<entry/>"))
        .mount(server)
        .await;
}

/// (method, path) pairs of every request the server saw, in order.
async fn request_log(server: &MockServer) -> Vec<(String, String)> {
    server
        .received_requests()
        .await
        .expect("requests recorded")
        .iter()
        .map(|r| (r.method.to_string(), r.url.path().to_string()))
        .collect()
}

#[tokio::test]
async fn publishes_the_post_then_its_comment_at_the_replies_url() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_publishing(&server).await;

    let client = BloggerClient::with_bases(server.uri(), server.uri());
    migrate::run(&client, &options(false), SAMPLE_EXPORT.as_bytes())
        .await
        .expect("migration should succeed");

    let log = request_log(&server).await;
    assert_eq!(
        log,
        vec![
            ("POST".to_string(), "/accounts/ClientLogin".to_string()),
            ("POST".to_string(), "/feeds/1/posts/default".to_string()),
            ("POST".to_string(), "/feeds/1/100/comments/default".to_string()),
        ]
    );

    // The draft stayed home and the unapproved comment with it: exactly one
    // create-post and one create-comment.
    let requests = server.received_requests().await.expect("requests recorded");
    let comment_body = requests
        .iter()
        .find(|r| r.url.path() == "/feeds/1/100/comments/default")
        .map(|r| String::from_utf8_lossy(&r.body).into_owned())
        .expect("comment request present");
    // alice is not the configured run author, so her comment is attributed.
    assert!(comment_body.contains("Comment from"));
    assert!(comment_body.contains("alice"));
}

#[tokio::test]
async fn post_author_comments_carry_no_attribution() {
    let export = SAMPLE_EXPORT.replace(
        "<wp:comment_author><![CDATA[alice]]></wp:comment_author>",
        "<wp:comment_author><![CDATA[Michael]]></wp:comment_author>",
    );

    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_publishing(&server).await;

    let client = BloggerClient::with_bases(server.uri(), server.uri());
    migrate::run(&client, &options(false), export.as_bytes())
        .await
        .expect("migration should succeed");

    let requests = server.received_requests().await.expect("requests recorded");
    let comment_body = requests
        .iter()
        .find(|r| r.url.path() == "/feeds/1/100/comments/default")
        .map(|r| String::from_utf8_lossy(&r.body).into_owned())
        .expect("comment request present");
    assert!(!comment_body.contains("Comment from"));
}

#[tokio::test]
async fn rerunning_the_same_migration_duplicates_posts() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_publishing(&server).await;

    let client = BloggerClient::with_bases(server.uri(), server.uri());
    for _ in 0..2 {
        migrate::run(&client, &options(false), SAMPLE_EXPORT.as_bytes())
            .await
            .expect("migration should succeed");
    }

    // No dedup: the second run re-creates the same post.
    let creates = request_log(&server)
        .await
        .iter()
        .filter(|(m, p)| m == "POST" && p == "/feeds/1/posts/default")
        .count();
    assert_eq!(creates, 2);
}

#[tokio::test]
async fn delete_first_clears_the_blog_before_publishing() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_publishing(&server).await;

    let feed = format!(
        r#"<feed><entry><id>post-90</id><title>Old</title>
           <link rel="edit" href="{}/feeds/1/posts/default/90"/></entry></feed>"#,
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/feeds/1/posts/default"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/feeds/1/posts/default/90"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = BloggerClient::with_bases(server.uri(), server.uri());
    migrate::run(&client, &options(true), SAMPLE_EXPORT.as_bytes())
        .await
        .expect("migration should succeed");

    let log = request_log(&server).await;
    assert_eq!(
        log,
        vec![
            ("POST".to_string(), "/accounts/ClientLogin".to_string()),
            ("GET".to_string(), "/feeds/1/posts/default".to_string()),
            ("DELETE".to_string(), "/feeds/1/posts/default/90".to_string()),
            ("POST".to_string(), "/feeds/1/posts/default".to_string()),
            ("POST".to_string(), "/feeds/1/100/comments/default".to_string()),
        ]
    );
}

#[tokio::test]
async fn a_failing_delete_aborts_before_anything_is_published() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_publishing(&server).await;

    let feed = format!(
        r#"<feed><entry><id>post-90</id><title>Old</title>
           <link rel="edit" href="{}/feeds/1/posts/default/90"/></entry></feed>"#,
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/feeds/1/posts/default"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/feeds/1/posts/default/90"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = BloggerClient::with_bases(server.uri(), server.uri());
    let result = migrate::run(&client, &options(true), SAMPLE_EXPORT.as_bytes()).await;
    assert!(result.is_err());

    let creates = request_log(&server)
        .await
        .iter()
        .filter(|(m, p)| m == "POST" && p == "/feeds/1/posts/default")
        .count();
    assert_eq!(creates, 0);
}

#[tokio::test]
async fn a_failing_login_aborts_before_any_other_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/accounts/ClientLogin"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Error=BadAuthentication\n"))
        .mount(&server)
        .await;

    let client = BloggerClient::with_bases(server.uri(), server.uri());
    let result = migrate::run(&client, &options(false), SAMPLE_EXPORT.as_bytes()).await;
    assert!(result.is_err());

    assert_eq!(request_log(&server).await.len(), 1);
}

#[tokio::test]
async fn token_credentials_skip_the_login_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accounts/AuthSubSessionToken"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Token=sess456\n"))
        .expect(1)
        .mount(&server)
        .await;
    mount_publishing(&server).await;

    let client = BloggerClient::with_bases(server.uri(), server.uri());
    let mut opts = options(false);
    opts.credentials = Credentials::Token("single-use".to_string());
    migrate::run(&client, &opts, SAMPLE_EXPORT.as_bytes())
        .await
        .expect("migration should succeed");

    let logins = request_log(&server)
        .await
        .iter()
        .filter(|(_, p)| p == "/accounts/ClientLogin")
        .count();
    assert_eq!(logins, 0);
}
