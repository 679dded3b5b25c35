//! HTTP fetch for `fetch_url`.
//!
//! Redirects are followed by hand so every hop goes back through the URL
//! check. HTML is reduced to its visible text.

use std::time::Duration;

use reqwest::{header, redirect, Client};
use scraper::{Html, Node, Selector};
use tracing::{debug, info, warn};
use url::Url;

const MAX_REDIRECTS: usize = 5;
const USER_AGENT: &str = concat!("warden/", env!("CARGO_PKG_VERSION"));
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "svg", "head"];

pub struct Fetcher {
    client: Client,
    max_bytes: usize,
}

impl Fetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))?;
        Ok(Self { client, max_bytes })
    }

    /// Fetch `url`, passing each redirect target through `check` first.
    pub async fn fetch<F>(&self, url: Url, check: F) -> Result<String, String>
    where
        F: Fn(&str) -> Result<Url, String>,
    {
        let mut current = url;
        for _ in 0..=MAX_REDIRECTS {
            debug!(url = %current, "fetching");
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| format!("Request to {current} failed: {e}"))?;

            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| format!("Redirect from {current} without a Location header"))?;
                let next = current
                    .join(location)
                    .map_err(|e| format!("Invalid redirect target '{location}': {e}"))?;
                current = check(next.as_str()).map_err(|reason| {
                    warn!(target = %next, "redirect refused");
                    format!("Redirect to {next} refused: {reason}")
                })?;
                continue;
            }
            if !status.is_success() {
                return Err(format!("{current} returned HTTP {status}"));
            }

            let is_html = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ct| ct.contains("html"));
            let body = response
                .text()
                .await
                .map_err(|e| format!("Failed to read body of {current}: {e}"))?;

            let text = if is_html { html_to_text(&body) } else { body };
            info!(url = %current, chars = text.len(), "fetched");
            return Ok(self.cap(text));
        }
        Err(format!("Too many redirects (more than {MAX_REDIRECTS})"))
    }

    fn cap(&self, text: String) -> String {
        if text.len() <= self.max_bytes {
            return text;
        }
        let mut end = self.max_bytes;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}\n[page truncated at {} bytes]", &text[..end], self.max_bytes)
    }
}

/// Visible text of an HTML document, one block per line, with the title on
/// top when there is one.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut blocks: Vec<String> = Vec::new();

    if let Ok(title) = Selector::parse("title") {
        if let Some(t) = document.select(&title).next() {
            let text = collapse(&t.text().collect::<String>());
            if !text.is_empty() {
                blocks.push(format!("# {text}"));
            }
        }
    }

    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| SKIPPED_ELEMENTS.contains(&e.name()))
        });
        if hidden {
            continue;
        }
        let line = collapse(text);
        if !line.is_empty() {
            blocks.push(line);
        }
    }
    blocks.join("\n")
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
