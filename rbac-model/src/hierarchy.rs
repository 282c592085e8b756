//! In-memory view of the link graph.
//!
//! Nodes are records keyed by asset id; edges are `link` references from a
//! child to its parent. The graph is what a validating node consults before
//! it accepts a CREATE that names a parent: the signer must be allowed by the
//! parent's `can_link`.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::entities::EntityKind;
use crate::keys::PublicKey;
use crate::payload::{AssetPayload, CanLink, MetadataPayload};
use crate::refs::AssetId;

/// One record in the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub id: AssetId,
    pub kind: EntityKind,
    pub name: Option<String>,
    pub link: Option<AssetId>,
    pub can_link: Option<CanLink>,
    pub owners: Vec<PublicKey>,
    pub namespace: Option<String>,
}

impl HierarchyNode {
    /// Build a node from a committed CREATE.
    pub fn from_payload(
        id: AssetId,
        asset: &AssetPayload,
        metadata: Option<&MetadataPayload>,
        owners: Vec<PublicKey>,
    ) -> Self {
        let data = asset.data();
        Self {
            id,
            kind: EntityKind::infer(asset, metadata),
            name: data.name().map(str::to_string),
            link: data.link().cloned(),
            can_link: metadata.and_then(|m| m.can_link()).cloned(),
            owners,
            namespace: data.identifier().map(|i| i.value().to_string()),
        }
    }
}

/// Outcome of checking a signer against a parent's `can_link`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkDecision {
    /// The parent restricts nothing.
    Unrestricted,
    /// The parent is unknown; the child becomes an orphan.
    Dangling,
    /// The signer satisfies the parent's `can_link`.
    Allowed,
    /// The signer does not satisfy the parent's `can_link`.
    Denied,
}

impl LinkDecision {
    /// Whether a CREATE with this decision may be committed.
    pub fn is_permitted(&self) -> bool {
        !matches!(self, LinkDecision::Denied)
    }
}

/// The link graph.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    nodes: HashMap<AssetId, HierarchyNode>,
}

impl Hierarchy {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a node.
    pub fn insert(&mut self, node: HierarchyNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Look up a node.
    pub fn get(&self, id: &AssetId) -> Option<&HierarchyNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Record a change of ownership; returns false for unknown ids.
    pub fn set_owners(&mut self, id: &AssetId, owners: Vec<PublicKey>) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.owners = owners;
                true
            }
            None => false,
        }
    }

    /// The node a record links to, when it is known.
    pub fn parent(&self, id: &AssetId) -> Option<&HierarchyNode> {
        self.get(id)
            .and_then(|node| node.link.as_ref())
            .and_then(|link| self.get(link))
    }

    /// Known ancestors, nearest first. Stops at unknown parents and cycles.
    pub fn ancestors(&self, id: &AssetId) -> Vec<&HierarchyNode> {
        let mut seen = HashSet::new();
        seen.insert(id.clone());

        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(node) = current {
            if !seen.insert(node.id.clone()) {
                break;
            }
            out.push(node);
            current = self.parent(&node.id);
        }
        out
    }

    /// Ids from `id` up to its highest known ancestor.
    pub fn link_path(&self, id: &AssetId) -> Vec<AssetId> {
        let mut path = vec![id.clone()];
        path.extend(self.ancestors(id).into_iter().map(|n| n.id.clone()));
        path
    }

    /// Nodes linking directly to `id`.
    pub fn children(&self, id: &AssetId) -> Vec<&HierarchyNode> {
        self.nodes
            .values()
            .filter(|node| node.link.as_ref() == Some(id))
            .collect()
    }

    /// Nodes whose parent is not in the graph.
    pub fn orphans(&self) -> Vec<&HierarchyNode> {
        self.nodes
            .values()
            .filter(|node| matches!(&node.link, Some(link) if !self.nodes.contains_key(link)))
            .collect()
    }

    /// Check whether `key` belongs to the record `group`.
    ///
    /// A key is a member when the record's `can_link` lists it, or when it
    /// owns a user record linked to the record.
    pub fn is_member(&self, group: &AssetId, key: &PublicKey) -> bool {
        let listed = self
            .get(group)
            .and_then(|node| node.can_link.as_ref())
            .map(|can_link| can_link.lists_key(key))
            .unwrap_or(false);

        listed
            || self.nodes.values().any(|node| {
                node.kind == EntityKind::User
                    && node.link.as_ref() == Some(group)
                    && node.owners.contains(key)
            })
    }

    /// Decide whether `signer` may create a record linked to `link`.
    pub fn check_link(&self, link: &AssetId, signer: &PublicKey) -> LinkDecision {
        let parent = match self.get(link) {
            Some(parent) => parent,
            None => return LinkDecision::Dangling,
        };

        let allowed = match &parent.can_link {
            None => return LinkDecision::Unrestricted,
            Some(CanLink::Keys(keys)) => keys.contains(signer),
            Some(CanLink::Reference(target)) => self.is_member(target, signer),
        };

        if allowed {
            LinkDecision::Allowed
        } else {
            LinkDecision::Denied
        }
    }
}
