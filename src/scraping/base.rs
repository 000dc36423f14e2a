use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::AppConfig;
use crate::normalize;
use crate::retry::RetryPolicy;

static LD_JSON_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("ld+json selector")
});

const BLOCK_TAGS: [&str; 16] = [
    "address", "article", "br", "dd", "div", "dt", "footer", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "li", "p",
];

pub fn clean_text(input: &str) -> String {
    normalize::clean_text(input)
}

pub fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(inner_text)
        .filter(|text| !text.is_empty())
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

/// Rendered-looking lines: block elements and `<br>` start a new line, and
/// blank lines are dropped.
pub fn text_lines(element: ElementRef<'_>) -> Vec<String> {
    let mut raw = String::new();
    push_text(element, &mut raw);
    raw.lines()
        .map(clean_text)
        .filter(|line| !line.is_empty())
        .collect()
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            let block = BLOCK_TAGS.contains(&child_el.value().name());
            if block {
                out.push('\n');
            }
            push_text(child_el, out);
            if block {
                out.push('\n');
            }
        }
    }
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(href).ok().map(|u| u.to_string())
}

/// Nearest ancestor whose tag is one of `tags`.
pub fn closest<'a>(element: &ElementRef<'a>, tags: &[&str]) -> Option<ElementRef<'a>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| tags.contains(&ancestor.value().name()))
}

pub fn is_denied(title: &str, denylist: &[&str]) -> bool {
    let title = title.trim();
    denylist.iter().any(|entry| entry.eq_ignore_ascii_case(title))
}

/// The JSON value assigned to `name` in an inline script, e.g.
/// `window.__tt_preload = {...};`.
pub fn script_assignment(html: &str, name: &str) -> Option<Value> {
    let pattern = Regex::new(&format!(r"{}\s*=\s*", regex::escape(name))).ok()?;
    let found = pattern.find(html)?;
    serde_json::Deserializer::from_str(&html[found.end()..])
        .into_iter::<Value>()
        .next()?
        .ok()
}

/// Every parseable Schema.org JSON-LD block in the document.
pub fn ld_json_blocks(document: &Html) -> Vec<Value> {
    document
        .select(&LD_JSON_SELECTOR)
        .filter_map(|script| {
            let body = script.text().collect::<String>();
            match serde_json::from_str(&body) {
                Ok(value) => Some(value),
                Err(err) => {
                    debug!(%err, "ignoring malformed ld+json block");
                    None
                }
            }
        })
        .collect()
}

/// An ordered fallback list of selectors: the first one that matches wins,
/// and running off the end means the field is absent.
pub struct SelectorChain {
    selectors: Vec<Selector>,
}

impl SelectorChain {
    pub fn new(patterns: &[&str]) -> Self {
        let selectors = patterns
            .iter()
            .map(|pattern| {
                Selector::parse(pattern)
                    .unwrap_or_else(|err| panic!("invalid selector {pattern:?}: {err:?}"))
            })
            .collect();
        Self { selectors }
    }

    pub fn first_element<'a>(&self, scope: &ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.selectors
            .iter()
            .find_map(|selector| scope.select(selector).next())
    }

    /// Elements matched by the first selector that matches anything.
    pub fn all_elements<'a>(&self, scope: &ElementRef<'a>) -> Vec<ElementRef<'a>> {
        for selector in &self.selectors {
            let found: Vec<_> = scope.select(selector).collect();
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// First element, walking the chain, whose text is not blank.
    pub fn first_with_text<'a>(&self, scope: &ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.first_element_where(scope, |element| !inner_text(element).is_empty())
    }

    /// Each selector's first match is offered to `accept`; a rejection moves
    /// on to the next selector.
    pub fn first_element_where<'a, F>(&self, scope: &ElementRef<'a>, accept: F) -> Option<ElementRef<'a>>
    where
        F: Fn(ElementRef<'a>) -> bool,
    {
        self.selectors
            .iter()
            .find_map(|selector| scope.select(selector).next().filter(|element| accept(*element)))
    }

    pub fn first_text(&self, scope: &ElementRef<'_>) -> Option<String> {
        self.first_text_where(scope, |_| true)
    }

    /// Like [`first_text`](Self::first_text) but a rejected text moves on to
    /// the next selector instead of ending the search.
    pub fn first_text_where<F>(&self, scope: &ElementRef<'_>, accept: F) -> Option<String>
    where
        F: Fn(&str) -> bool,
    {
        self.selectors.iter().find_map(|selector| {
            scope
                .select(selector)
                .next()
                .map(inner_text)
                .filter(|text| !text.is_empty() && accept(text))
        })
    }

    /// First non-empty value among `attrs` on the first matching element of
    /// each selector in turn.
    pub fn first_attr(&self, scope: &ElementRef<'_>, attrs: &[&str]) -> Option<String> {
        self.selectors.iter().find_map(|selector| {
            let element = scope.select(selector).next()?;
            attrs
                .iter()
                .filter_map(|attr| element.value().attr(attr))
                .map(str::trim)
                .find(|value| !value.is_empty())
                .map(str::to_string)
        })
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed for {url}: {source}")]
    Transport { url: String, source: reqwest::Error },
    #[error("non-success status {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("unable to read response body for {url}: {source}")]
    Body { url: String, source: reqwest::Error },
}

/// Page fetcher: one navigation at a time, each retried with linear backoff.
pub struct Fetcher {
    client: Client,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            retry: config.retry_policy(),
        })
    }

    pub fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        self.retry.run(url, |_| self.fetch_once(url))
    }

    fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }
        response.text().map_err(|source| FetchError::Body {
            url: url.to_string(),
            source,
        })
    }
}
