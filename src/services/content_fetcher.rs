use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::error::{AppError, Result};

const USER_AGENT_STRING: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Elements that never carry article text.
const NOISE_SELECTOR: &str = "script, style, noscript, template, nav, footer, header, aside, iframe, \
     .ad, .ads, .advert, .advertisement, .sponsored, \
     .comments, .comment, #comments, #disqus_thread, \
     .social, .social-share, .share, .sharing, .share-buttons";

/// Main-content containers, most specific first.
const MAIN_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=main]",
    ".article",
    ".post",
    ".entry-content",
    ".post-content",
    ".content",
    "#content",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub body: String,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Fetches `url` and returns its title and readable body text.
    async fn extract(&self, url: &str) -> Result<ExtractedContent>;
}

struct Selectors {
    title: Selector,
    body: Selector,
    noise: Selector,
    main: Vec<Selector>,
}

impl Selectors {
    fn new() -> Self {
        let parse = |s: &str| Selector::parse(s).expect("static selector");
        Self {
            title: parse("title"),
            body: parse("body"),
            noise: parse(NOISE_SELECTOR),
            main: MAIN_SELECTORS.iter().map(|s| parse(s)).collect(),
        }
    }
}

pub struct ContentExtractor {
    client: Client,
    selectors: Selectors,
}

impl ContentExtractor {
    pub fn new(timeout: Duration) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            selectors: Selectors::new(),
        }
    }

    async fn fetch_html(&self, article_url: &str) -> Result<String> {
        let url = Url::parse(article_url)
            .map_err(|e| AppError::Extraction(format!("invalid URL '{}': {}", article_url, e)))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Extraction(format!("failed to fetch {}: {}", article_url, e)))?;

        if !response.status().is_success() {
            return Err(AppError::Extraction(format!(
                "failed to fetch {}: HTTP {}",
                article_url,
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::Extraction(format!("failed to read {}: {}", article_url, e)))
    }

    /// Extracts the title and main text of an HTML document.
    pub fn extract_from_html(&self, html: &str) -> ExtractedContent {
        let document = Html::parse_document(html);

        let title = document
            .select(&self.selectors.title)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty());

        let noise = &self.selectors.noise;

        let main = self
            .selectors
            .main
            .iter()
            .flat_map(|selector| document.select(selector))
            .map(|el| visible_text(el, noise))
            .find(|text| !text.is_empty());

        let body = main.unwrap_or_else(|| {
            let root = document
                .select(&self.selectors.body)
                .next()
                .unwrap_or_else(|| document.root_element());
            visible_text(root, noise)
        });

        ExtractedContent { title, body }
    }
}

#[async_trait]
impl Extractor for ContentExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedContent> {
        let html = self.fetch_html(url).await?;
        let content = self.extract_from_html(&html);
        tracing::debug!(
            url,
            chars = content.body.len(),
            "Extracted article content"
        );
        Ok(content)
    }
}

/// Text under `element`, skipping anything inside a noise element.
fn visible_text(element: ElementRef<'_>, noise: &Selector) -> String {
    let inside_noise = |el: ElementRef<'_>| {
        noise.matches(&el)
            || el
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| noise.matches(&a))
    };

    if inside_noise(element) {
        return String::new();
    }

    let mut text = String::new();
    for node in element.descendants() {
        if let Node::Text(chunk) = node.value() {
            let hidden = node
                .parent()
                .and_then(ElementRef::wrap)
                .is_some_and(|parent| inside_noise(parent));
            if hidden {
                continue;
            }
            text.push_str(chunk);
            text.push(' ');
        }
    }
    collapse_whitespace(&text)
}

/// Collapses every whitespace run to a single space and trims the ends.
pub fn collapse_whitespace(text: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let re = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    re.replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> ContentExtractor {
        ContentExtractor::new(Duration::from_secs(5))
    }

    #[test]
    fn prefers_article_container_and_strips_noise() {
        let html = r#"<html><head><title> Big
            News </title><style>.x{}</style></head>
            <body>
              <header>Site header</header>
              <nav><a href="/">Home</a></nav>
              <article>
                <h1>Headline</h1>
                <p>First   paragraph.</p>
                <script>track();</script>
                <div class="social-share">Share this</div>
                <p>Second
                   paragraph.</p>
                <div class="ads">Buy things</div>
              </article>
              <div id="comments">Nice post!</div>
              <footer>Copyright</footer>
            </body></html>"#;

        let content = extractor().extract_from_html(html);

        assert_eq!(content.title.as_deref(), Some("Big News"));
        assert_eq!(content.body, "Headline First paragraph. Second paragraph.");
    }

    #[test]
    fn falls_back_to_body_text() {
        let html = r#"<html><head><title>Plain</title></head>
            <body><nav>Menu</nav><div><p>Only   text</p><p>here</p></div>
            <footer>Foot</footer></body></html>"#;

        let content = extractor().extract_from_html(html);

        assert_eq!(content.body, "Only text here");
    }

    #[test]
    fn empty_main_container_is_skipped() {
        let html = r#"<html><body>
            <main><script>var a;</script></main>
            <div class="post">Real content</div>
            </body></html>"#;

        let content = extractor().extract_from_html(html);

        assert_eq!(content.title, None);
        assert_eq!(content.body, "Real content");
    }

    #[test]
    fn page_wrapped_in_a_form_keeps_its_article() {
        let html = r#"<html><body><form id="aspnetForm" method="post">
            <nav>Menu</nav>
            <article><p>The actual news story text.</p></article>
            </form></body></html>"#;

        let content = extractor().extract_from_html(html);

        assert_eq!(content.body, "The actual news story text.");
    }

    #[test]
    fn whitespace_runs_collapse() {
        assert_eq!(collapse_whitespace("  a \n\t b   c "), "a b c");
        assert_eq!(collapse_whitespace(""), "");
    }

    #[tokio::test]
    async fn unreachable_url_is_an_extraction_error() {
        let result = extractor().extract("http://127.0.0.1:1/article").await;
        assert!(matches!(result, Err(AppError::Extraction(_))));
    }

    #[tokio::test]
    async fn invalid_url_is_an_extraction_error() {
        let result = extractor().extract("not a url").await;
        assert!(matches!(result, Err(AppError::Extraction(_))));
    }
}
