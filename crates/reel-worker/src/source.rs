//! WordPress content source and photo download.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::{Captures, Regex};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use reel_models::{ContentItem, ItemId, DEFAULT_CATEGORY};

use crate::error::{SourceError, SourceResult};

/// Fields requested from the posts endpoint.
const POST_FIELDS: &str = "id,title,content,link";

/// Browser-like headers; some hosts refuse hotlinking from bots.
const PHOTO_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";
const PHOTO_ACCEPT: &str = "image/avif,image/webp,image/apng,image/*,*/*;q=0.8";
const PHOTO_REFERER: &str = "https://google.com";

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,31});")
        .expect("valid entity regex")
});
static IMG_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("valid img regex")
});

/// Content source configuration.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Site root, without trailing slash
    pub base_url: String,
    /// Posts fetched per cycle
    pub fetch_limit: u32,
    pub timeout: Duration,
}

impl SourceConfig {
    /// Create config from environment variables.
    pub fn from_env() -> SourceResult<Self> {
        let base_url = std::env::var("WP_URL")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SourceError::config("WP_URL not set"))?;
        Url::parse(&base_url)
            .map_err(|e| SourceError::config(format!("WP_URL is not a URL: {e}")))?;

        Ok(Self {
            base_url,
            fetch_limit: std::env::var("WP_FETCH_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(5),
            timeout: Duration::from_secs(
                std::env::var("WP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        })
    }
}

/// Where content items come from.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Most recent items, newest first.
    async fn latest(&self) -> SourceResult<Vec<ContentItem>>;
}

/// Downloads source photos.
#[async_trait]
pub trait PhotoFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> SourceResult<Vec<u8>>;
}

/// Keyword rule mapping title markers to a category label.
#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub markers: Vec<String>,
    pub label: String,
}

/// Ordered category rules; the first rule with a marker in the title wins.
#[derive(Debug, Clone)]
pub struct CategoryRules {
    pub rules: Vec<CategoryRule>,
    pub fallback: String,
}

impl Default for CategoryRules {
    fn default() -> Self {
        let rule = |markers: &[&str], label: &str| CategoryRule {
            markers: markers.iter().map(|m| m.to_string()).collect(),
            label: label.to_string(),
        };
        Self {
            rules: vec![
                rule(&["Polícia", "\u{1F694}", "\u{1F6A8}"], "POLÍCIA"),
                rule(&["Pronto Falei", "\u{203C}\u{FE0F}"], "PRONTO FALEI"),
            ],
            fallback: DEFAULT_CATEGORY.to_string(),
        }
    }
}

impl CategoryRules {
    pub fn categorize(&self, title: &str) -> &str {
        self.rules
            .iter()
            .find(|rule| rule.markers.iter().any(|m| title.contains(m.as_str())))
            .map(|rule| rule.label.as_str())
            .unwrap_or(&self.fallback)
    }
}

#[derive(Debug, Default, Deserialize)]
struct Rendered {
    #[serde(default)]
    rendered: String,
}

#[derive(Debug, Deserialize)]
struct WpPost {
    id: serde_json::Value,
    #[serde(default)]
    title: Rendered,
    #[serde(default)]
    content: Rendered,
    #[serde(default)]
    link: String,
}

/// WordPress REST API source.
pub struct WordPressSource {
    http: Client,
    config: SourceConfig,
    categories: CategoryRules,
}

impl WordPressSource {
    pub fn new(config: SourceConfig) -> SourceResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("reel-worker/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            config,
            categories: CategoryRules::default(),
        })
    }

    pub fn with_categories(mut self, categories: CategoryRules) -> Self {
        self.categories = categories;
        self
    }

    /// Pretty-permalink route first, then the `rest_route` query fallback.
    fn endpoints(&self) -> [String; 2] {
        let base = &self.config.base_url;
        let query = format!(
            "per_page={}&orderby=date&_fields={}",
            self.config.fetch_limit, POST_FIELDS
        );
        [
            format!("{base}/wp-json/wp/v2/posts?{query}"),
            format!("{base}/?rest_route=/wp/v2/posts&{query}"),
        ]
    }

    async fn fetch_posts(&self, url: &str) -> SourceResult<Vec<WpPost>> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = response.text().await?;
        serde_json::from_str::<Vec<WpPost>>(&body)
            .map_err(|e| SourceError::invalid_body(format!("{url}: {e}")))
    }

    fn to_item(&self, post: WpPost) -> Option<ContentItem> {
        let id = match &post.id {
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) => s.trim().to_string(),
            _ => String::new(),
        };
        let headline = html_to_text(&post.title.rendered);
        let category = self.categories.categorize(&headline).to_string();
        let image_url = first_image_src(&post.content.rendered)
            .and_then(|src| resolve_image_url(&self.config.base_url, &src));

        let mut item = ContentItem::new(ItemId::new(id), headline)
            .with_category(category)
            .with_link(post.link);
        item.image_url = image_url;

        match item.validate() {
            Ok(()) => Some(item),
            Err(e) => {
                warn!("Skipping malformed post: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl ContentSource for WordPressSource {
    async fn latest(&self) -> SourceResult<Vec<ContentItem>> {
        let [primary, fallback] = self.endpoints();

        let posts = match self.fetch_posts(&primary).await {
            Ok(posts) => posts,
            Err(e) => {
                warn!("Primary posts route failed, trying rest_route: {}", e);
                self.fetch_posts(&fallback).await?
            }
        };

        debug!(count = posts.len(), "Fetched posts");
        Ok(posts.into_iter().filter_map(|p| self.to_item(p)).collect())
    }
}

/// Photo downloader with browser-like headers.
pub struct HttpPhotoFetcher {
    http: Client,
}

impl HttpPhotoFetcher {
    pub fn new(timeout: Duration) -> SourceResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(PHOTO_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static(PHOTO_ACCEPT));
        headers.insert(REFERER, HeaderValue::from_static(PHOTO_REFERER));

        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl PhotoFetcher for HttpPhotoFetcher {
    async fn fetch(&self, url: &str) -> SourceResult<Vec<u8>> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

fn decode_entity(caps: &Captures<'_>) -> String {
    let name = &caps[1];
    let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
    } else if let Some(dec) = name.strip_prefix('#') {
        dec.parse::<u32>().ok().and_then(char::from_u32)
    } else {
        match name {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            "hellip" => Some('\u{2026}'),
            "ndash" => Some('\u{2013}'),
            "mdash" => Some('\u{2014}'),
            "lsquo" => Some('\u{2018}'),
            "rsquo" => Some('\u{2019}'),
            "ldquo" => Some('\u{201C}'),
            "rdquo" => Some('\u{201D}'),
            "laquo" => Some('\u{00AB}'),
            "raquo" => Some('\u{00BB}'),
            _ => latin1_letter(name),
        }
    };
    match decoded {
        Some(c) => c.to_string(),
        None => caps[0].to_string(),
    }
}

/// Accented letters by entity name, e.g. `iacute`, `Ccedil`, `atilde`.
fn latin1_letter(name: &str) -> Option<char> {
    let mut chars = name.chars();
    let base = chars.next()?;
    let mark = chars.as_str();
    let upper = base.is_ascii_uppercase();
    let letter = match (base.to_ascii_lowercase(), mark) {
        ('a', "acute") => 'á',
        ('e', "acute") => 'é',
        ('i', "acute") => 'í',
        ('o', "acute") => 'ó',
        ('u', "acute") => 'ú',
        ('a', "grave") => 'à',
        ('a', "circ") => 'â',
        ('e', "circ") => 'ê',
        ('o', "circ") => 'ô',
        ('a', "tilde") => 'ã',
        ('o', "tilde") => 'õ',
        ('n', "tilde") => 'ñ',
        ('c', "cedil") => 'ç',
        ('u', "uml") => 'ü',
        _ => return None,
    };
    if upper {
        letter.to_uppercase().next()
    } else {
        Some(letter)
    }
}

/// Decode HTML character references; unknown names are left as written.
pub fn decode_entities(text: &str) -> String {
    ENTITY_RE.replace_all(text, decode_entity).into_owned()
}

/// Strip markup, decode entities and collapse whitespace.
pub fn html_to_text(html: &str) -> String {
    let stripped = TAG_RE.replace_all(html, " ");
    let decoded = decode_entities(&stripped);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `src` of the first `<img>` in `html`, entity-decoded.
pub fn first_image_src(html: &str) -> Option<String> {
    let caps = IMG_SRC_RE.captures(html)?;
    let raw = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
    let src = decode_entities(raw.as_str().trim());
    if src.is_empty() {
        None
    } else {
        Some(src)
    }
}

/// Make an image `src` absolute against the site root.
pub fn resolve_image_url(base_url: &str, src: &str) -> Option<String> {
    let src = src.trim();
    if let Some(rest) = src.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    if src.to_lowercase().starts_with("http") {
        return Some(src.to_string());
    }

    let base = if src.starts_with('/') {
        Url::parse(base_url).ok()?
    } else {
        Url::parse(&format!("{}/", base_url.trim_end_matches('/'))).ok()?
    };
    base.join(src).ok().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer) -> WordPressSource {
        WordPressSource::new(SourceConfig {
            base_url: server.uri(),
            fetch_limit: 5,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn posts() -> serde_json::Value {
        json!([
            {
                "id": 42,
                "title": {"rendered": "Pol&iacute;cia prende suspeito &#8211; <em>Centro</em>"},
                "content": {"rendered": "<p>x</p><img class=\"a\" src=\"/wp-content/uploads/p.jpg\">"},
                "link": "https://site.example/42"
            },
            {
                "id": 43,
                "title": {"rendered": "   "},
                "content": {"rendered": ""},
                "link": "https://site.example/43"
            }
        ])
    }

    #[test]
    fn test_html_to_text() {
        assert_eq!(
            html_to_text("<b>Chuva</b>&nbsp;forte &amp; ventos\n em <i>Ilhabela</i>&#8230;"),
            "Chuva forte & ventos em Ilhabela \u{2026}"
        );
        assert_eq!(html_to_text("A &unknown; B"), "A &unknown; B");
        assert_eq!(html_to_text("S&atilde;o Sebasti&Atilde;O &ccedil;"), "São SebastiÃO ç");
        assert_eq!(html_to_text("&#x1F6A8; Alerta"), "\u{1F6A8} Alerta");
    }

    #[test]
    fn test_first_image_src() {
        let html = r#"<p>a</p><IMG alt='x' SRC='https://cdn.example/a.jpg?w=1&amp;h=2'><img src="b.jpg">"#;
        assert_eq!(
            first_image_src(html).as_deref(),
            Some("https://cdn.example/a.jpg?w=1&h=2")
        );
        assert_eq!(first_image_src("<p>no image</p>"), None);
    }

    #[test]
    fn test_resolve_image_url() {
        let base = "https://site.example/blog";
        assert_eq!(
            resolve_image_url(base, "//cdn.example/a.jpg").as_deref(),
            Some("https://cdn.example/a.jpg")
        );
        assert_eq!(
            resolve_image_url(base, "/wp-content/a.jpg").as_deref(),
            Some("https://site.example/wp-content/a.jpg")
        );
        assert_eq!(
            resolve_image_url(base, "http://other.example/a.jpg").as_deref(),
            Some("http://other.example/a.jpg")
        );
        assert_eq!(
            resolve_image_url(base, "uploads/a.jpg").as_deref(),
            Some("https://site.example/blog/uploads/a.jpg")
        );
    }

    #[test]
    fn test_category_rules() {
        let rules = CategoryRules::default();
        assert_eq!(rules.categorize("Polícia apreende drogas"), "POLÍCIA");
        assert_eq!(rules.categorize("\u{1F6A8} Acidente na SP-131"), "POLÍCIA");
        assert_eq!(rules.categorize("Pronto Falei: a balsa"), "PRONTO FALEI");
        assert_eq!(rules.categorize("Festival de inverno"), DEFAULT_CATEGORY);
    }

    #[tokio::test]
    async fn test_latest_from_primary_route() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wp/v2/posts"))
            .and(query_param("per_page", "5"))
            .and(query_param("orderby", "date"))
            .respond_with(ResponseTemplate::new(200).set_body_json(posts()))
            .mount(&server)
            .await;

        let items = source(&server).latest().await.unwrap();

        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.id.as_str(), "42");
        assert_eq!(item.headline, "Polícia prende suspeito \u{2013} Centro");
        assert_eq!(item.category, "POLÍCIA");
        assert_eq!(item.link, "https://site.example/42");
        assert_eq!(
            item.image_url.as_deref(),
            Some(format!("{}/wp-content/uploads/p.jpg", server.uri()).as_str())
        );
    }

    #[tokio::test]
    async fn test_falls_back_to_rest_route() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wp/v2/posts"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("rest_route", "/wp/v2/posts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(posts()))
            .expect(1)
            .mount(&server)
            .await;

        let items = source(&server).latest().await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn test_non_list_body_on_both_routes_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": "rest_no_route"})))
            .mount(&server)
            .await;

        let err = source(&server).latest().await.unwrap_err();
        assert!(matches!(err, SourceError::InvalidBody(_)));
    }

    #[tokio::test]
    async fn test_photo_fetch_sends_browser_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p.jpg"))
            .and(wiremock::matchers::header("referer", PHOTO_REFERER))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.jpg"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let fetcher = HttpPhotoFetcher::new(Duration::from_secs(5)).unwrap();
        let bytes = fetcher.fetch(&format!("{}/p.jpg", server.uri())).await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);

        let err = fetcher
            .fetch(&format!("{}/missing.jpg", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 403, .. }));
    }
}
