use crate::config::{ClassificationRule, Predicate, Source, SourceKind};
use crate::crawler::CandidateLink;
use crate::url::CompiledPredicate;

/// Label used when no rule matches
pub const DEFAULT_DOC_TYPE: &str = "other";

/// Ordered (predicate, label) table for one source; first match wins
///
/// The table is the source's configured rules followed by the built-in rules
/// of its kind. Classification is pure: the same link always gets the same
/// label from the same table.
#[derive(Debug, Clone)]
pub struct DocTypeClassifier {
    rules: Vec<(CompiledPredicate, String)>,
}

impl DocTypeClassifier {
    pub fn for_source(source: &Source) -> Self {
        let rules = source
            .classify
            .iter()
            .cloned()
            .chain(builtin_rules(&source.kind))
            .map(|rule| (rule.predicate.compile(), rule.label))
            .collect();
        Self { rules }
    }

    pub fn classify(&self, link: &CandidateLink) -> String {
        self.rules
            .iter()
            .find(|(predicate, _)| predicate.matches(&link.url, &link.title))
            .map(|(_, label)| label.clone())
            .unwrap_or_else(|| DEFAULT_DOC_TYPE.to_string())
    }
}

/// Built-in rules per source kind
pub fn builtin_rules(kind: &SourceKind) -> Vec<ClassificationRule> {
    match kind {
        SourceKind::Legistar { .. } => legistar_rules(),
        SourceKind::DetailPages { .. } | SourceKind::Generic { .. } => keyword_rules(),
        SourceKind::ArcgisLayers { .. } => vec![ClassificationRule::new(Predicate::Always, "gis_layer")],
    }
}

// Legistar encodes the attachment type in the `M` query parameter
fn legistar_rules() -> Vec<ClassificationRule> {
    [("A", "agenda"), ("M", "minutes"), ("E2", "addendum"), ("E3", "packet")]
        .into_iter()
        .map(|(code, label)| {
            ClassificationRule::new(
                Predicate::QueryParam {
                    name: "M".to_string(),
                    value: code.to_string(),
                },
                label,
            )
        })
        .collect()
}

fn keyword_rules() -> Vec<ClassificationRule> {
    [
        ("agenda", "agenda"),
        ("minutes", "minutes"),
        ("packet", "packet"),
        ("board book", "packet"),
        ("meeting materials", "packet"),
        ("resolution", "resolution"),
        ("presentation", "presentation"),
        ("staff report", "staff_report"),
        ("staff_report", "staff_report"),
        ("exhibit", "exhibit"),
        ("addendum", "addendum"),
    ]
    .into_iter()
    .map(|(needle, label)| {
        ClassificationRule::new(
            Predicate::TextContains {
                value: needle.to_string(),
            },
            label,
        )
    })
    .collect()
}
