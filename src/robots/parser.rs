//! Robots.txt parser implementation
//!
//! Matching is delegated to the robotstxt crate; `Crawl-delay`, which that
//! crate ignores, is read here.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Parsed robots.txt of one host
#[derive(Debug, Clone, Default)]
pub struct ParsedRobots {
    /// Raw robots.txt content; empty means allow all
    content: String,
}

impl ParsedRobots {
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Permissive rules, used when robots.txt is missing or unreachable
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Checks if a full url is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute url of the listing page
    /// * `user_agent` - Product token of the collector (e.g. "CivicCollector")
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// `Crawl-delay` for the user agent, falling back to the `*` group
    ///
    /// Consecutive `User-agent` lines form one group; the first other
    /// directive closes the list of agents for that group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        let agent = user_agent.to_lowercase();

        let mut group: Vec<String> = Vec::new();
        let mut in_agent_lines = false;
        let mut specific: Option<f64> = None;
        let mut wildcard: Option<f64> = None;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            if key == "user-agent" {
                if !in_agent_lines {
                    group.clear();
                    in_agent_lines = true;
                }
                group.push(value.to_lowercase());
                continue;
            }
            in_agent_lines = false;

            if key != "crawl-delay" {
                continue;
            }
            let Ok(delay) = value.parse::<f64>() else {
                continue;
            };
            if !delay.is_finite() || delay < 0.0 {
                continue;
            }

            if group.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                specific = Some(delay);
            } else if group.iter().any(|ua| ua == "*") {
                wildcard = Some(delay);
            }
        }

        specific.or(wildcard).map(Duration::from_secs_f64)
    }
}
