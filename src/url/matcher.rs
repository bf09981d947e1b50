use crate::config::Predicate;
use crate::url::query_param;
use regex::{Regex, RegexBuilder};
use url::Url;

/// A [`Predicate`] with any regular expression compiled up front
///
/// Text comparisons are case-insensitive. `QueryParam` matches the parameter
/// name case-insensitively and its value exactly.
#[derive(Debug, Clone)]
pub struct CompiledPredicate {
    predicate: Predicate,
    regex: RegexState,
}

#[derive(Debug, Clone)]
enum RegexState {
    /// Plain text comparison
    Unused,
    Ready(Regex),
    /// An explicit regular expression that does not compile; never matches
    Invalid,
}

impl Predicate {
    pub fn compile(&self) -> CompiledPredicate {
        let regex = match self {
            Self::Regex { value } => match case_insensitive(value) {
                Some(rx) => RegexState::Ready(rx),
                None => RegexState::Invalid,
            },
            Self::Pattern { value } => compile_loose(value),
            _ => RegexState::Unused,
        };

        CompiledPredicate {
            predicate: self.clone(),
            regex,
        }
    }
}

impl CompiledPredicate {
    /// Checks whether a link with this url and title satisfies the predicate
    pub fn matches(&self, url: &Url, title: &str) -> bool {
        match &self.regex {
            RegexState::Invalid => return false,
            RegexState::Ready(rx) => return rx.is_match(&haystack(url.as_str(), title)),
            RegexState::Unused => {}
        }

        match &self.predicate {
            Predicate::TextContains { value } => {
                let needle = value.to_lowercase();
                title.to_lowercase().contains(&needle)
                    || url.as_str().to_lowercase().contains(&needle)
            }
            Predicate::TitleContains { value } => title.to_lowercase().contains(&value.to_lowercase()),
            Predicate::UrlContains { value } => url
                .as_str()
                .to_lowercase()
                .contains(&value.to_lowercase()),
            Predicate::UrlSuffix { value } => url.path().to_lowercase().ends_with(&value.to_lowercase()),
            Predicate::QueryParam { name, value } => query_param(url, name)
                .map(|v| v == *value)
                .unwrap_or(false),
            // Loose pattern without a usable regex
            Predicate::Pattern { value } => {
                !value.is_empty() && haystack(url.as_str(), title).contains(&value.to_lowercase())
            }
            Predicate::Regex { .. } => false,
            Predicate::Always => true,
        }
    }
}

/// Compiles a loosely written pattern matched against "title url"
///
/// - `/expr/` is always a regular expression (an invalid one never matches)
/// - text containing regex metacharacters (`\ ^ $ [ ( |`) is tried as a
///   regular expression first and falls back to a substring test if it does
///   not compile
/// - anything else is a case-insensitive substring test
fn compile_loose(pattern: &str) -> RegexState {
    if pattern.len() >= 2 && pattern.starts_with('/') && pattern.ends_with('/') {
        return match case_insensitive(&pattern[1..pattern.len() - 1]) {
            Some(rx) => RegexState::Ready(rx),
            None => RegexState::Invalid,
        };
    }

    let regex_like = ['\\', '^', '$', '[', '(', '|']
        .iter()
        .any(|tok| pattern.contains(*tok));
    if regex_like {
        if let Some(rx) = case_insensitive(pattern) {
            return RegexState::Ready(rx);
        }
    }

    RegexState::Unused
}

fn haystack(url: &str, title: &str) -> String {
    format!("{} {}", title, url).to_lowercase()
}

fn case_insensitive(expr: &str) -> Option<Regex> {
    RegexBuilder::new(expr).case_insensitive(true).build().ok()
}
