//! Discord template fetching.
//!
//! Templates are public, unauthenticated objects, but Discord's edge rejects
//! requests with obviously non-browser user agents, so the client dresses up
//! as one.

pub mod template;

pub use template::{ChannelKind, Overwrite, SourceChannel, SourceRole, Template};

use template::TemplateResponse;

use anyhow::{anyhow, Error};

use std::fs::File;
use std::path::Path;
use std::time::Duration;

/// The Discord API root used for template lookups.
pub const API_URL: &str = "https://discord.com/api/v9";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Read access to Discord's guild template endpoint.
#[derive(Clone)]
pub struct Templates {
    http: reqwest::Client,
    api_url: String,
}

impl Templates {
    /// Creates a template client.
    pub fn new() -> Result<Templates, Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Templates {
            http,
            api_url: String::from(API_URL),
        })
    }

    /// Fetches a template by code or share URL.
    pub async fn fetch(&self, code_or_url: &str) -> Result<Template, Error> {
        let code = template_code(code_or_url);

        let response = self
            .http
            .get(format!("{}/guilds/templates/{}", self.api_url, code))
            .header("Accept", "application/json")
            .header("Referer", "https://discord.com/")
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();

            return Err(anyhow!(
                "template lookup for {:?} failed: {} {}",
                code,
                status,
                truncate(&body, 200),
            ));
        }

        let response: TemplateResponse = response.json().await?;

        Ok(response.serialized_source_guild)
    }
}

/// Loads a template from a local JSON file instead of the network.
///
/// The file holds the same payload the API returns, so saved lookups can be
/// replayed offline.
pub fn load_file(path: &Path) -> Result<Template, Error> {
    let file = File::open(path)?;
    let response: TemplateResponse = serde_json::from_reader(file)?;

    Ok(response.serialized_source_guild)
}

/// Extracts the template code from a share URL.
///
/// Bare codes pass through untouched; `https://discord.new/{code}` and
/// friends lose everything up to the last path segment.
pub fn template_code(code_or_url: &str) -> &str {
    code_or_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(code_or_url)
}

fn truncate(s: &str, len: usize) -> &str {
    match s.char_indices().nth(len) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_code_from_url() {
        assert_eq!(template_code("https://discord.new/AbC123"), "AbC123");
        assert_eq!(
            template_code("https://discord.com/template/AbC123/"),
            "AbC123"
        );
        assert_eq!(template_code("AbC123"), "AbC123");
    }
}
