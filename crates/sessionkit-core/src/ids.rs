//! The document's ID space: allocation and the cross-reference index

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::track::TrackKind;
use crate::xml::Element;

/// Identifier of a node in the document's cross-reference graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub u64);

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out fresh IDs; owned by a single document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new(next: u64) -> Self {
        Self { next }
    }

    /// The value that will be returned by the next `allocate`
    pub fn peek(&self) -> u64 {
        self.next
    }

    pub fn allocate(&mut self) -> Id {
        let id = Id(self.next);
        self.next += 1;
        id
    }
}

/// What kind of element owns an ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Track(TrackKind),
    Device,
    Clip,
    Loop,
    TimeSignature,
    KeyTrack,
    Locator,
    /// An element inside a sub-tree the model does not interpret
    Opaque(String),
}

/// Which node kinds a reference may legally point at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Any,
    ReturnTrack,
}

impl RefKind {
    pub fn accepts(self, kind: &NodeKind) -> bool {
        match self {
            Self::Any => true,
            Self::ReturnTrack => *kind == NodeKind::Track(TrackKind::Return),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdNode {
    pub id: Id,
    pub kind: NodeKind,
    /// Human-readable location, e.g. `track "Bass" > device #2`
    pub owner: String,
}

#[derive(Debug, Clone)]
pub struct Reference {
    pub target: Id,
    pub expected: RefKind,
    pub owner: String,
}

/// Flat arena of every ID-carrying node plus every reference, built in one
/// pass over a document.
#[derive(Debug, Default)]
pub struct IdIndex {
    nodes: Vec<IdNode>,
    by_id: HashMap<Id, Vec<usize>>,
    references: Vec<Reference>,
}

impl IdIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: Id, kind: NodeKind, owner: impl Into<String>) {
        let idx = self.nodes.len();
        self.nodes.push(IdNode {
            id,
            kind,
            owner: owner.into(),
        });
        self.by_id.entry(id).or_default().push(idx);
    }

    pub fn reference(&mut self, target: Id, expected: RefKind, owner: impl Into<String>) {
        self.references.push(Reference {
            target,
            expected,
            owner: owner.into(),
        });
    }

    /// Record every `Id` and `PointeeId` attribute inside an opaque sub-tree
    pub fn scan_opaque(&mut self, element: &Element, owner: &str) {
        element.visit(&mut |el| {
            if let Some(id) = el.attr("Id").and_then(|v| v.parse().ok()) {
                self.insert(Id(id), NodeKind::Opaque(el.name.clone()), format!("{owner} > <{}>", el.name));
            }
            if let Some(target) = el.attr("PointeeId").and_then(|v| v.parse().ok()) {
                self.reference(Id(target), RefKind::Any, format!("{owner} > <{}>", el.name));
            }
        });
    }

    pub fn nodes(&self) -> &[IdNode] {
        &self.nodes
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: Id) -> bool {
        self.by_id.contains_key(&id)
    }

    /// First node registered under this ID
    pub fn get(&self, id: Id) -> Option<&IdNode> {
        self.by_id.get(&id).and_then(|idxs| idxs.first()).map(|&i| &self.nodes[i])
    }

    /// IDs claimed by more than one node, ascending
    pub fn duplicates(&self) -> Vec<(Id, Vec<&IdNode>)> {
        let mut dups: Vec<(Id, Vec<&IdNode>)> = self
            .by_id
            .iter()
            .filter(|(_, idxs)| idxs.len() > 1)
            .map(|(&id, idxs)| (id, idxs.iter().map(|&i| &self.nodes[i]).collect()))
            .collect();
        dups.sort_by_key(|(id, _)| *id);
        dups
    }

    pub fn max_id(&self) -> Option<Id> {
        self.by_id.keys().copied().max()
    }

    /// Sorted, deduplicated set of every ID in use
    pub fn id_set(&self) -> Vec<Id> {
        let mut ids: Vec<Id> = self.by_id.keys().copied().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_is_monotonic() {
        let mut alloc = IdAllocator::new(10);
        assert_eq!(alloc.allocate(), Id(10));
        assert_eq!(alloc.allocate(), Id(11));
        assert_eq!(alloc.peek(), 12);
    }

    #[test]
    fn test_duplicates_are_reported_once_per_id() {
        let mut index = IdIndex::new();
        index.insert(Id(3), NodeKind::Device, "a");
        index.insert(Id(3), NodeKind::Clip, "b");
        index.insert(Id(4), NodeKind::Clip, "c");
        let dups = index.duplicates();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].0, Id(3));
        assert_eq!(dups[0].1.len(), 2);
        assert_eq!(index.max_id(), Some(Id(4)));
    }

    #[test]
    fn test_scan_opaque_collects_ids_and_pointees() {
        let blob = Element::new("Envelope")
            .with_child(Element::new("AutomationTarget").with_attr("Id", 77))
            .with_child(Element::new("Target").with_attr("PointeeId", 5));
        let mut index = IdIndex::new();
        index.scan_opaque(&blob, "track");
        assert!(index.contains(Id(77)));
        assert_eq!(index.references().len(), 1);
        assert_eq!(index.references()[0].target, Id(5));
    }

    #[test]
    fn test_ref_kind_accepts() {
        assert!(RefKind::Any.accepts(&NodeKind::Clip));
        assert!(RefKind::ReturnTrack.accepts(&NodeKind::Track(TrackKind::Return)));
        assert!(!RefKind::ReturnTrack.accepts(&NodeKind::Track(TrackKind::Midi)));
    }
}
