//! Xpath keys
//!
//! A field's key is a `/`-joined path relative to its table's root node.
//! Steps are tag local names (optionally suffixed `[0]`, first match
//! only), `@attr`, `text()` and `geometry()`. A tag step is written
//! `label:local` when siblings share a local name across namespaces; the
//! label comes from [`namespace_label`]. Keys double as the source of
//! column names.
//!
//! Resolution follows the builder's placement decisions: intermediate tag
//! steps only pass through inlined (or empty) nodes, a link's final step
//! only matches nodes that root a table row, and `geometry()` only matches
//! geometry nodes. That keeps row emission on the same shape the tables
//! were derived from.

use super::builder::{Placement, PlacementMap};
use crate::documents::Element;
use crate::namespaces::namespace_label;

/// Text content step
pub const TEXT: &str = "text()";

/// Geometry subtree step
pub const GEOMETRY: &str = "geometry()";

/// One step of an xpath key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<'a> {
    /// Child elements with this local name
    Tag {
        /// Local name
        name: &'a str,
        /// `[0]`: first match only
        first: bool,
    },
    /// Attribute by local name
    Attribute(&'a str),
    /// Text content
    Text,
    /// Geometry child
    Geometry,
}

/// Split a key into steps
pub fn steps(key: &str) -> Vec<Step<'_>> {
    key.split('/')
        .filter(|s| !s.is_empty())
        .map(|step| match step {
            TEXT => Step::Text,
            GEOMETRY => Step::Geometry,
            _ => match step.strip_prefix('@') {
                Some(attr) => Step::Attribute(attr),
                None => match step.strip_suffix("[0]") {
                    Some(name) => Step::Tag { name, first: true },
                    None => Step::Tag { name: step, first: false },
                },
            },
        })
        .collect()
}

/// Column name generated from a key
///
/// `text()` alone becomes `v`; trailing `text()` / `geometry()` steps are
/// dropped and the remaining steps joined with `_`, as are namespace
/// labels.
pub fn column_name(key: &str) -> String {
    if key == TEXT {
        return "v".to_string();
    }
    if key == GEOMETRY {
        return "geometry".to_string();
    }
    let stem = key
        .strip_suffix("/text()")
        .or_else(|| key.strip_suffix("/geometry()"))
        .unwrap_or(key);
    stem.replace("[0]", "").replace(|c| c == '/' || c == ':', "_")
}

/// Tag steps from `start`, honouring placements
fn descend<'e>(start: &'e Element, tags: &[Step<'_>], placements: &PlacementMap, link_target: bool) -> Vec<&'e Element> {
    let mut current = vec![start];
    for (i, step) in tags.iter().enumerate() {
        let (name, first) = match step {
            Step::Tag { name, first } => (*name, *first),
            _ => return Vec::new(),
        };
        let last = i + 1 == tags.len();
        let mut next = Vec::new();
        for node in current {
            let matching = node.children.iter().filter(|c| matches_tag(c, name)).filter(|c| {
                match placements.get(&c.id) {
                    Some(Placement::Table(_)) => last && link_target,
                    Some(Placement::Inline) | Some(Placement::Empty) => !(last && link_target),
                    _ => false,
                }
            });
            if first {
                next.extend(matching.take(1));
            } else {
                next.extend(matching);
            }
        }
        current = next;
    }
    current
}

/// Whether `elem` is selected by a tag step
fn matches_tag(elem: &Element, name: &str) -> bool {
    match name.split_once(':') {
        Some((label, local)) => {
            elem.local_name() == local && elem.qname.namespace.as_deref().and_then(namespace_label) == Some(label)
        }
        None => elem.local_name() == name,
    }
}

/// Nodes rooting rows of a link's target table
pub fn select_nodes<'e>(node: &'e Element, key: &str, placements: &PlacementMap) -> Vec<&'e Element> {
    let steps = steps(key);
    if steps.iter().any(|s| !matches!(s, Step::Tag { .. })) {
        return Vec::new();
    }
    descend(node, &steps, placements, true)
}

/// Text or attribute value of a column key
///
/// A `text()` key on an existing node without text yields an empty string.
pub fn select_text(node: &Element, key: &str, placements: &PlacementMap) -> Option<String> {
    let steps = steps(key);
    let (last, tags) = steps.split_last()?;
    let nodes = descend(node, tags, placements, false);
    match last {
        Step::Text => nodes
            .first()
            .map(|n| n.text().unwrap_or_default().to_string()),
        Step::Attribute(name) => nodes
            .iter()
            .find_map(|n| n.get_attribute(name))
            .map(str::to_string),
        _ => None,
    }
}

/// Geometry subtree of a geometry key
pub fn select_geometry<'e>(node: &'e Element, key: &str, placements: &PlacementMap) -> Option<&'e Element> {
    let steps = steps(key);
    match steps.split_last()? {
        (Step::Geometry, tags) => descend(node, tags, placements, false)
            .into_iter()
            .flat_map(|n| n.children.iter())
            .find(|c| matches!(placements.get(&c.id), Some(Placement::Geometry))),
        _ => None,
    }
}
