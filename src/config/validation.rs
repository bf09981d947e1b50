use crate::config::types::{
    ClassificationRule, CollectorConfig, Config, OutputConfig, Predicate, Source, SourceKind,
    UserAgentConfig,
};
use crate::url::parse_http_url;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_collector_config(&config.collector)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_sources(&config.sources)?;
    Ok(())
}

/// Validates collector configuration
fn validate_collector_config(config: &CollectorConfig) -> Result<(), ConfigError> {
    if config.request_timeout_secs < 1 || config.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_secs must be between 1 and 300, got {}",
            config.request_timeout_secs
        )));
    }

    if config.connect_timeout_secs < 1 || config.connect_timeout_secs > config.request_timeout_secs
    {
        return Err(ConfigError::Validation(format!(
            "connect_timeout_secs must be between 1 and request_timeout_secs, got {}",
            config.connect_timeout_secs
        )));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    if config.max_backoff_ms < config.initial_backoff_ms {
        return Err(ConfigError::Validation(format!(
            "max_backoff_ms ({}) must be >= initial_backoff_ms ({})",
            config.max_backoff_ms, config.initial_backoff_ms
        )));
    }

    if config.max_concurrent_sources < 1 || config.max_concurrent_sources > 64 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_sources must be between 1 and 64, got {}",
            config.max_concurrent_sources
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.root.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output root cannot be empty".to_string(),
        ));
    }

    if config.manifest_retention_days == Some(0) {
        return Err(ConfigError::Validation(
            "manifest_retention_days must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates every source and their ids' uniqueness
fn validate_sources(sources: &[Source]) -> Result<(), ConfigError> {
    let mut ids = HashSet::new();

    for source in sources {
        validate_source_id(&source.id)?;

        if !ids.insert(source.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate source id '{}'",
                source.id
            )));
        }

        if source.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "source '{}' must have a name",
                source.id
            )));
        }

        if let Some(delay) = source.politeness_delay_ms {
            if delay > 60_000 {
                return Err(ConfigError::Validation(format!(
                    "source '{}' politeness_delay_ms must be <= 60000, got {}",
                    source.id, delay
                )));
            }
        }

        validate_source_kind(source)?;

        for url in source.entry_urls() {
            validate_http_url(&source.id, url)?;
        }

        for rule in &source.classify {
            validate_classification_rule(&source.id, rule)?;
        }
    }

    Ok(())
}

/// Source ids become directory and file names, so they must be slug-safe
fn validate_source_id(id: &str) -> Result<(), ConfigError> {
    if id.is_empty() {
        return Err(ConfigError::Validation(
            "source id cannot be empty (set `id` or a name with letters or digits)".to_string(),
        ));
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "source id '{}' may only contain ASCII letters, digits, '_' and '-'",
            id
        )));
    }

    Ok(())
}

fn validate_source_kind(source: &Source) -> Result<(), ConfigError> {
    match &source.kind {
        SourceKind::Generic { discover } | SourceKind::Legistar { discover } => {
            require_listing_urls(source)?;
            for predicate in discover {
                validate_predicate(&source.id, predicate)?;
            }
        }
        SourceKind::DetailPages {
            detail_host,
            keywords,
            ..
        } => {
            require_listing_urls(source)?;
            if detail_host.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "source '{}' needs a detail-host",
                    source.id
                )));
            }
            if keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "source '{}' has an empty keyword",
                    source.id
                )));
            }
        }
        SourceKind::ArcgisLayers { layers } => {
            if layers.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "source '{}' must list at least one layer",
                    source.id
                )));
            }
        }
    }

    Ok(())
}

fn require_listing_urls(source: &Source) -> Result<(), ConfigError> {
    if source.urls.is_empty() {
        return Err(ConfigError::Validation(format!(
            "source '{}' must have at least one listing url",
            source.id
        )));
    }
    Ok(())
}

fn validate_http_url(source_id: &str, raw: &str) -> Result<(), ConfigError> {
    parse_http_url(raw)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidUrl(format!("source '{}': {}", source_id, e)))
}

fn validate_classification_rule(
    source_id: &str,
    rule: &ClassificationRule,
) -> Result<(), ConfigError> {
    if rule.label.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "source '{}' has a classification rule with an empty label",
            source_id
        )));
    }
    validate_predicate(source_id, &rule.predicate)
}

fn validate_predicate(source_id: &str, predicate: &Predicate) -> Result<(), ConfigError> {
    match predicate {
        Predicate::Regex { value } => {
            regex::Regex::new(value).map_err(|e| {
                ConfigError::InvalidPattern(format!(
                    "source '{}': regex '{}': {}",
                    source_id, value, e
                ))
            })?;
        }
        Predicate::QueryParam { name, .. } if name.is_empty() => {
            return Err(ConfigError::InvalidPattern(format!(
                "source '{}': query-param predicate needs a name",
                source_id
            )));
        }
        Predicate::TextContains { value }
        | Predicate::TitleContains { value }
        | Predicate::UrlContains { value }
        | Predicate::UrlSuffix { value }
        | Predicate::Pattern { value }
            if value.is_empty() =>
        {
            return Err(ConfigError::InvalidPattern(format!(
                "source '{}': predicate value cannot be empty",
                source_id
            )));
        }
        _ => {}
    }
    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
