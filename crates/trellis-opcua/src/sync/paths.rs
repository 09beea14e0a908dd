// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Graph paths.
//!
//! A path names a property by walking structural properties from the root:
//!
//! ```text
//! Children[2].FirstName        collection entry, then a value property
//! Lead.Tags[blue].Label        reference, dictionary entry, value
//! ```
//!
//! Node ids of path-derived nodes are the root folder name followed by the
//! same segments, so `ns=2;s=Root.Children[2].FirstName` mirrors the path
//! above.

use std::collections::HashSet;
use std::sync::Arc;

use trellis_core::{PropertyKind, PropertyRef, Subject, SubjectId};

use super::registry::{SlotKey, SubjectNodeRegistry};

/// Path of a property's node below its subject.
pub(crate) fn member_path(subject_path: &str, property: &str) -> String {
    format!("{subject_path}.{property}")
}

/// Path of a collection entry.
pub(crate) fn index_path(base: &str, index: usize) -> String {
    format!("{base}[{index}]")
}

/// Path of a dictionary entry.
pub(crate) fn key_path(base: &str, key: &str) -> String {
    format!("{base}[{key}]")
}

/// Browse name of a collection entry.
pub(crate) fn index_browse_name(browse_base: &str, index: usize) -> String {
    format!("{browse_base}[{index}]")
}

/// Replaces the path prefix `old` of `value` with `new`.
///
/// Only whole segments match: `Root.People` is a prefix of
/// `Root.People[1].Name` but not of `Root.PeopleCount`.
pub(crate) fn replace_prefix(value: &str, old: &str, new: &str) -> Option<String> {
    let rest = value.strip_prefix(old)?;
    match rest.chars().next() {
        None => Some(new.to_string()),
        Some('.') | Some('[') => Some(format!("{new}{rest}")),
        Some(_) => None,
    }
}

/// Returns the path of `subject.property` relative to the root, following
/// each subject's primary slot.
///
/// Returns `None` if the subject is not bound below the root.
pub fn property_path(registry: &SubjectNodeRegistry, subject: SubjectId, property: &str) -> Option<String> {
    let mut segments = vec![property.to_string()];
    let mut visited = HashSet::new();
    let mut current = subject;
    loop {
        if !visited.insert(current) {
            return None;
        }
        let slot = registry.get(current)?.edges.first()?.slot.clone();
        let Some(parent) = slot.parent else {
            break;
        };
        segments.push(match slot.key {
            SlotKey::Root | SlotKey::Single => slot.property,
            SlotKey::Index(index) => index_path(&slot.property, index),
            SlotKey::Key(key) => key_path(&slot.property, &key),
        });
        current = parent;
    }
    segments.reverse();
    Some(segments.join("."))
}

/// Resolves a path produced by [`property_path`] against `root`.
///
/// Returns `None` when a segment names no property, an index or key has no
/// entry, or the path ends at a subject instead of a property.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use trellis_core::{PropertyDescriptor, SubjectContext, SubjectType};
/// use trellis_opcua::resolve_property_path;
///
/// let person = Arc::new(
///     SubjectType::new("Person")
///         .with_property(PropertyDescriptor::value("FirstName"))
///         .with_property(PropertyDescriptor::collection("Children").of_type("Person")),
/// );
/// let ctx = SubjectContext::new();
/// let root = ctx.create_subject(person.clone());
/// ctx.append(&root, "Children", ctx.create_subject(person)).unwrap();
///
/// let property = resolve_property_path(&root, "Children[0].FirstName").unwrap();
/// assert_eq!(property.name(), "FirstName");
/// assert!(resolve_property_path(&root, "Children[1].FirstName").is_none());
/// ```
pub fn resolve_property_path(root: &Arc<Subject>, path: &str) -> Option<PropertyRef> {
    let segments = split_segments(path)?;
    let (last, walk) = segments.split_last()?;
    let mut subject = root.clone();
    for segment in walk {
        subject = step(&subject, segment)?;
    }
    if last.selector.is_some() {
        return None;
    }
    subject.descriptor(last.name).ok()?;
    Some(PropertyRef::new(subject, last.name))
}

struct Segment<'a> {
    name: &'a str,
    selector: Option<&'a str>,
}

fn split_segments(path: &str) -> Option<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    for (i, c) in path.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.checked_sub(1)?,
            '.' if depth == 0 => {
                segments.push(parse_segment(&path[start..i])?);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    segments.push(parse_segment(&path[start..])?);
    Some(segments)
}

fn parse_segment(segment: &str) -> Option<Segment<'_>> {
    match segment.find('[') {
        None if !segment.is_empty() => Some(Segment {
            name: segment,
            selector: None,
        }),
        None => None,
        Some(open) => {
            let selector = segment[open + 1..].strip_suffix(']')?;
            (open > 0).then(|| Segment {
                name: &segment[..open],
                selector: Some(selector),
            })
        }
    }
}

fn step(subject: &Arc<Subject>, segment: &Segment<'_>) -> Option<Arc<Subject>> {
    let descriptor = subject.descriptor(segment.name).ok()?;
    match (descriptor.kind(), segment.selector) {
        (PropertyKind::Reference, None) => subject.reference(segment.name).ok()?,
        (PropertyKind::Collection, Some(selector)) => {
            let index: usize = selector.parse().ok()?;
            subject.collection(segment.name).ok()?.into_iter().nth(index)
        }
        (PropertyKind::Dictionary, Some(key)) => subject
            .dictionary(segment.name)
            .ok()?
            .into_iter()
            .find_map(|(k, child)| (k == key).then_some(child)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{PropertyDescriptor, SubjectContext, SubjectType};

    fn person() -> Arc<SubjectType> {
        Arc::new(
            SubjectType::new("Person")
                .with_property(PropertyDescriptor::value("FirstName").writable())
                .with_property(PropertyDescriptor::reference("Mother").of_type("Person"))
                .with_property(PropertyDescriptor::collection("Children").of_type("Person"))
                .with_property(PropertyDescriptor::dictionary("Pets").of_type("Person")),
        )
    }

    #[test]
    fn test_replace_prefix_matches_whole_segments() {
        assert_eq!(
            replace_prefix("Root.People[1].Name", "Root.People[1]", "Root.People[0]").as_deref(),
            Some("Root.People[0].Name")
        );
        assert_eq!(
            replace_prefix("Root.People[1]", "Root.People[1]", "Root.People[0]").as_deref(),
            Some("Root.People[0]")
        );
        assert!(replace_prefix("Root.People[10]", "Root.People[1", "X").is_none());
        assert!(replace_prefix("Root.PeopleCount", "Root.People", "X").is_none());
    }

    #[test]
    fn test_split_segments_respects_brackets() {
        let segments = split_segments("Pets[a.b].FirstName").unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].name, "Pets");
        assert_eq!(segments[0].selector, Some("a.b"));
        assert!(split_segments("Pets[a").is_none());
        assert!(split_segments("Children..FirstName").is_none());
        assert!(split_segments("[0]").is_none());
    }

    #[test]
    fn test_resolve_nested_path() {
        let ctx = SubjectContext::new();
        let ty = person();
        let root = ctx.create_subject(ty.clone());
        let children: Vec<_> = (0..3).map(|_| ctx.create_subject(ty.clone())).collect();
        for child in &children {
            ctx.append(&root, "Children", child.clone()).unwrap();
        }
        let pet = ctx.create_subject(ty.clone());
        ctx.insert_key(&children[2], "Pets", "rex", pet.clone()).unwrap();
        ctx.set_reference(&pet, "Mother", Some(children[0].clone())).unwrap();

        let property = resolve_property_path(&root, "Children[2].FirstName").unwrap();
        assert_eq!(property.subject().id(), children[2].id());

        let property = resolve_property_path(&root, "Children[2].Pets[rex].Mother.FirstName").unwrap();
        assert_eq!(property.subject().id(), children[0].id());

        assert!(resolve_property_path(&root, "Children[2]").is_none());
        assert!(resolve_property_path(&root, "Children[x].FirstName").is_none());
        assert!(resolve_property_path(&root, "Unknown").is_none());
    }
}
