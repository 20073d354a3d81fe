//! Search and replace over text nodes.
//!
//! Only text nodes are considered; groups and references are never touched.
//! A scope, when given, limits the search to the listed identifiers. A search
//! that matches nothing yields an empty result and a replace that matches
//! nothing returns an unchanged copy.

use std::collections::HashSet;

use regex::Regex;
use tracing::debug;

use crate::domain::Identifier;

use super::tree::Tree;

/// Optional set of identifiers a search is limited to
pub type Scope<'a> = Option<&'a HashSet<Identifier>>;

fn in_scope(scope: Scope<'_>, id: &Identifier) -> bool {
    scope.map_or(true, |ids| ids.contains(id))
}

/// Text nodes whose value contains `needle`. An empty needle matches nothing.
pub fn search_literal(tree: &Tree, needle: &str, scope: Scope<'_>) -> Vec<Identifier> {
    if needle.is_empty() {
        return Vec::new();
    }
    matching(tree, scope, |value| value.contains(needle))
}

/// Text nodes whose value matches `pattern`
pub fn search_pattern(tree: &Tree, pattern: &Regex, scope: Scope<'_>) -> Vec<Identifier> {
    matching(tree, scope, |value| pattern.is_match(value))
}

/// Copy of `tree` with every occurrence of `needle` replaced in matching text nodes
pub fn replace_literal(tree: &Tree, needle: &str, replacement: &str, scope: Scope<'_>) -> Tree {
    let hits = search_literal(tree, needle, scope);
    rewrite(tree, &hits, |value| value.replace(needle, replacement))
}

/// Copy of `tree` with every match of `pattern` replaced in matching text nodes.
///
/// `replacement` may use `$1`/`${name}` capture references.
pub fn replace_pattern(tree: &Tree, pattern: &Regex, replacement: &str, scope: Scope<'_>) -> Tree {
    let hits = search_pattern(tree, pattern, scope);
    rewrite(tree, &hits, |value| {
        pattern.replace_all(value, replacement).into_owned()
    })
}

fn matching<F>(tree: &Tree, scope: Scope<'_>, predicate: F) -> Vec<Identifier>
where
    F: Fn(&str) -> bool,
{
    tree.texts()
        .into_iter()
        .filter(|(id, text)| in_scope(scope, id) && predicate(text.value()))
        .map(|(id, _)| id)
        .collect()
}

fn rewrite<F>(tree: &Tree, hits: &[Identifier], substitute: F) -> Tree
where
    F: Fn(&str) -> String,
{
    let mut rewritten = tree.clone();
    for id in hits {
        if let Ok(node) = rewritten.get_mut(id) {
            if let Some(text) = node.as_text_mut() {
                text.value = Some(substitute(text.value()));
            }
        }
    }
    debug!(replaced = hits.len(), "Rewrote text nodes");
    rewritten
}
