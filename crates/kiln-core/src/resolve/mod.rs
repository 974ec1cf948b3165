//! Mapping of blocked-queue reasons to node types of the catalog.
//!
//! The CI system explains why a queue entry cannot run in free text. Five shapes of that
//! text are understood; [`ReasonKind::classify`] picks the shape once and [`resolve_kind`]
//! runs the matching resolver against the catalog.
//!
//! Resolution is pure. When the only remaining strategy is to ask the CI system for the
//! labels of an agent, the resolver returns [`Resolution::LookupLabels`] and leaves the call
//! to the caller (see [`crate::classify`]).

mod expr;
pub use expr::{LabelExpr, match_expression};

use kiln_model::Catalog;
use kiln_model::naming::strip_suffix;

/// Substring marking a "node doesn't have label" clause (note the curly apostrophe).
pub const MISSING_LABEL_MARKER: &str = "doesn\u{2019}t have label";

/// Shape of a blocked-reason string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonKind {
    /// `Waiting for next available executor on <node-or-label>`
    Busy,
    /// `All nodes of label <label> are offline`
    OfflineLabel,
    /// `<node> is offline`
    OfflineNode,
    /// `There are no nodes with the label <label>`
    NoNodesWithLabel,
    /// `<node> doesn't have label <label>`, possibly several clauses joined by `;`
    MissingLabel,
    Unrecognized,
}

impl ReasonKind {
    /// First matching shape wins.
    pub fn classify(reason: &str) -> Self {
        if reason.starts_with("Waiting for") {
            ReasonKind::Busy
        } else if reason.starts_with("All nodes of label") {
            ReasonKind::OfflineLabel
        } else if reason.ends_with("is offline") {
            ReasonKind::OfflineNode
        } else if reason.starts_with("There are no nodes") {
            ReasonKind::NoNodesWithLabel
        } else if reason.contains(MISSING_LABEL_MARKER) {
            ReasonKind::MissingLabel
        } else {
            ReasonKind::Unrecognized
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonKind::Busy => "busy",
            ReasonKind::OfflineLabel => "offline-label",
            ReasonKind::OfflineNode => "offline-node",
            ReasonKind::NoNodesWithLabel => "no-nodes-with-label",
            ReasonKind::MissingLabel => "missing-label",
            ReasonKind::Unrecognized => "unrecognized",
        }
    }
}

/// True when the reason describes a queue entry waiting on capacity.
pub fn is_stuck(reason: &str) -> bool {
    ReasonKind::classify(reason) != ReasonKind::Unrecognized
}

/// Remove the curly quotes the CI system wraps names in; optionally trim whitespace.
pub fn sanitize(s: &str, strip: bool) -> String {
    let cleaned: String = s.chars().filter(|c| !matches!(c, '\u{2018}' | '\u{2019}')).collect();
    if strip {
        cleaned.trim().to_string()
    } else {
        cleaned
    }
}

fn unquote(token: &str) -> &str {
    token.trim_matches(|c| c == '\'' || c == '"')
}

/// Outcome of resolving a blocked reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A catalog key.
    Matched(String),
    /// No direct match; the named agents may be dynamically labelled. Fetch their labels,
    /// in order, and match each label set against the catalog.
    LookupLabels(Vec<String>),
    Unmatched,
}

impl Resolution {
    pub fn matched(&self) -> Option<&str> {
        match self {
            Resolution::Matched(key) => Some(key),
            _ => None,
        }
    }

    fn from_key(key: Option<&str>) -> Self {
        key.map_or(Resolution::Unmatched, |k| Resolution::Matched(k.to_string()))
    }
}

/// Resolve a blocked reason against the catalog.
pub fn resolve(reason: &str, catalog: &Catalog) -> Resolution {
    resolve_kind(ReasonKind::classify(reason), reason, catalog)
}

/// Resolve a reason whose shape is already known.
pub fn resolve_kind(kind: ReasonKind, reason: &str, catalog: &Catalog) -> Resolution {
    match kind {
        ReasonKind::Busy => resolve_busy(reason, catalog),
        ReasonKind::OfflineLabel => Resolution::from_key(resolve_offline_label(reason, catalog)),
        ReasonKind::OfflineNode => Resolution::from_key(resolve_offline_node(reason, catalog)),
        ReasonKind::NoNodesWithLabel => {
            Resolution::from_key(resolve_no_nodes_with_label(reason, catalog))
        }
        ReasonKind::MissingLabel => resolve_missing_label(reason, catalog),
        ReasonKind::Unrecognized => Resolution::Unmatched,
    }
}

/// The trailing token is either a node name or a label (expression).
pub fn resolve_busy(reason: &str, catalog: &Catalog) -> Resolution {
    let Some(last) = reason.split_whitespace().last() else {
        return Resolution::Unmatched;
    };
    let sanitized = sanitize(last, false);
    let token = unquote(&sanitized);
    if token.is_empty() {
        return Resolution::Unmatched;
    }

    let direct = catalog
        .get_key(token, true)
        .or_else(|| catalog.match_label(token).and_then(|k| catalog.get_key(k, true)))
        .or_else(|| catalog.get_key(strip_suffix(token), true))
        .or_else(|| match_expression(token, catalog));

    match direct {
        Some(key) => Resolution::Matched(key.to_string()),
        None => Resolution::LookupLabels(vec![token.to_string()]),
    }
}

/// The label sits third from the end: `All nodes of label <label> are offline`.
pub fn resolve_offline_label<'a>(reason: &str, catalog: &'a Catalog) -> Option<&'a str> {
    let sanitized = sanitize(reason, false);
    let tokens: Vec<&str> = sanitized.split_whitespace().collect();
    let label = unquote(tokens.len().checked_sub(3).map(|i| tokens[i])?);
    catalog
        .match_label(label)
        .or_else(|| resolve_no_nodes_with_label(label, catalog))
}

/// The node name is the first token: `<node> is offline`.
pub fn resolve_offline_node<'a>(reason: &str, catalog: &'a Catalog) -> Option<&'a str> {
    let sanitized = sanitize(reason, false);
    let node = unquote(sanitized.split_whitespace().next()?);
    catalog.get_key(node, true).or_else(|| {
        let stripped = strip_suffix(node);
        catalog.names().find(|name| *name == stripped)
    })
}

/// Single label first, then the label as an expression.
pub fn resolve_no_nodes_with_label<'a>(reason: &str, catalog: &'a Catalog) -> Option<&'a str> {
    let sanitized = sanitize(reason, false);
    let label = unquote(sanitized.split_whitespace().last()?);
    catalog
        .match_label(label)
        .or_else(|| match_expression(label, catalog))
}

/// Each `;`-separated clause carrying the marker is resolved like a busy reason.
///
/// A direct catalog match in any clause wins, so a match in a later clause takes precedence
/// over an agent label lookup for an earlier clause. Without one, the agents of every clause
/// are returned for a label lookup, in clause order.
pub fn resolve_missing_label(reason: &str, catalog: &Catalog) -> Resolution {
    let mut lookups = Vec::new();
    for clause in reason.split(';').filter(|c| c.contains(MISSING_LABEL_MARKER)) {
        match resolve_busy(clause, catalog) {
            Resolution::Matched(key) => return Resolution::Matched(key),
            Resolution::LookupLabels(names) => lookups.extend(names),
            Resolution::Unmatched => {}
        }
    }
    if lookups.is_empty() {
        Resolution::Unmatched
    } else {
        Resolution::LookupLabels(lookups)
    }
}
