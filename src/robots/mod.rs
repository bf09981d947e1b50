//! Robots.txt handling module
//!
//! When `respect-robots` is on, each source fetches its host's robots.txt
//! once per run. Disallowed listing pages are skipped and a `Crawl-delay`
//! may raise the source's politeness delay.

mod parser;

pub use parser::ParsedRobots;

use crate::crawler::Fetcher;
use url::Url;

/// Fetches robots.txt for the host of `page_url`
///
/// Any failure (missing file, error status, network trouble) yields
/// allow-all rules.
///
/// # Arguments
///
/// * `fetcher` - The source's fetcher, so the request is throttled like any other
/// * `page_url` - Any url on the host
pub async fn fetch_robots(fetcher: &mut Fetcher, page_url: &Url) -> ParsedRobots {
    let Ok(robots_url) = page_url.join("/robots.txt") else {
        return ParsedRobots::allow_all();
    };

    match fetcher.fetch_without_retry(&robots_url).await {
        Ok(page) => {
            tracing::debug!("Loaded {} ({} bytes)", robots_url, page.body.len());
            ParsedRobots::from_content(&page.body)
        }
        Err(e) => {
            tracing::debug!("No usable robots.txt at {}: {}", robots_url, e);
            ParsedRobots::allow_all()
        }
    }
}
