//! Rule hierarchy: a prefix-subsumption tree over templates.
//!
//! Nodes live in an arena addressed by [`NodeId`]; node 0 is the synthetic
//! root, whose children are the length-1 templates. A template of length L
//! hangs under the first length-(L-1) template whose body is a positional
//! prefix of its own. Same-length templates are visited in lexicographic
//! order of their rule text, so parent choice does not depend on input order.
//!
//! Traversal is lazy: a template's children can only be requested once the
//! template itself was handed out, either as a root child
//! ([`RuleHierarchy::init_query_map`]) or as a child of a discovered template.

use crate::error::HierarchyError;
use crate::rule::{Template, TemplateId};
use dashmap::DashSet;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
}

#[derive(Debug)]
struct HierarchyNode {
    template: Option<TemplateId>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug)]
pub struct RuleHierarchy {
    nodes: Vec<HierarchyNode>,
    /// template id -> node
    node_of: Vec<NodeId>,
    /// Nodes whose children may be queried.
    discovered: DashSet<NodeId>,
}

/// Does `left`'s body form the first `left.len()` atoms of `right`'s?
///
/// Calling this with the longer rule on the left is a contract violation.
pub fn subsumes(left: &Template, right: &Template) -> Result<bool, HierarchyError> {
    if left.len() > right.len() {
        return Err(HierarchyError::SubsumptionOrder {
            left: left.len(),
            right: right.len(),
        });
    }
    Ok(left.is_prefix_of(right))
}

impl RuleHierarchy {
    pub fn build(templates: &[Template]) -> Result<Self, HierarchyError> {
        let mut nodes = Vec::with_capacity(templates.len() + 1);
        nodes.push(HierarchyNode {
            template: None,
            parent: None,
            children: Vec::new(),
        });
        let node_of: Vec<NodeId> = (0..templates.len())
            .map(|id| {
                nodes.push(HierarchyNode {
                    template: Some(id),
                    parent: None,
                    children: Vec::new(),
                });
                NodeId(id + 1)
            })
            .collect();

        let mut buckets: BTreeMap<usize, Vec<TemplateId>> = BTreeMap::new();
        for (id, template) in templates.iter().enumerate() {
            buckets.entry(template.len()).or_default().push(id);
        }
        let texts: Vec<String> = templates.iter().map(Template::index_string).collect();
        for bucket in buckets.values_mut() {
            bucket.sort_by(|a, b| texts[*a].cmp(&texts[*b]));
        }

        for (&len, bucket) in &buckets {
            for &child in bucket {
                let parent = if len == 1 {
                    Some(NodeId::ROOT)
                } else {
                    let mut found = None;
                    for &candidate in buckets.get(&(len - 1)).into_iter().flatten() {
                        if subsumes(&templates[candidate], &templates[child])? {
                            found = Some(node_of[candidate]);
                            break;
                        }
                    }
                    found
                };
                if let Some(parent) = parent {
                    let node = node_of[child];
                    nodes[parent.0].children.push(node);
                    nodes[node.0].parent = Some(parent);
                }
            }
        }

        let orphans = nodes[1..].iter().filter(|n| n.parent.is_none()).count();
        if orphans > 0 {
            tracing::debug!(orphans, "templates without a hierarchy parent");
        }

        Ok(Self {
            nodes,
            node_of,
            discovered: DashSet::new(),
        })
    }

    fn node(&self, template: TemplateId) -> Result<NodeId, HierarchyError> {
        self.node_of
            .get(template)
            .copied()
            .ok_or(HierarchyError::UnknownTemplate { template })
    }

    fn templates_of(&self, node: NodeId) -> Vec<TemplateId> {
        self.nodes[node.0]
            .children
            .iter()
            .filter_map(|child| self.nodes[child.0].template)
            .collect()
    }

    /// The root's children, registered as discovered.
    pub fn init_query_map(&self) -> Vec<TemplateId> {
        for child in &self.nodes[NodeId::ROOT.0].children {
            self.discovered.insert(*child);
        }
        self.templates_of(NodeId::ROOT)
    }

    /// Children of a discovered template; registers each child in turn.
    ///
    /// Safe to call concurrently and repeatedly for the same template.
    pub fn children(&self, template: TemplateId) -> Result<Vec<TemplateId>, HierarchyError> {
        let node = self.node(template)?;
        if !self.discovered.contains(&node) {
            return Err(HierarchyError::NotDiscovered { template });
        }
        for child in &self.nodes[node.0].children {
            self.discovered.insert(*child);
        }
        Ok(self.templates_of(node))
    }

    pub fn is_discovered(&self, template: TemplateId) -> bool {
        self.node_of
            .get(template)
            .is_some_and(|node| self.discovered.contains(node))
    }

    /// Number of descendants of a template, excluding itself.
    pub fn size(&self, template: TemplateId) -> Result<usize, HierarchyError> {
        Ok(self.descendants(self.node(template)?))
    }

    /// Number of templates attached below the root.
    pub fn size_root(&self) -> usize {
        self.descendants(NodeId::ROOT)
    }

    fn descendants(&self, node: NodeId) -> usize {
        self.nodes[node.0]
            .children
            .iter()
            .map(|child| 1 + self.descendants(*child))
            .sum()
    }

    pub fn parent(&self, template: TemplateId) -> Option<TemplateId> {
        let node = *self.node_of.get(template)?;
        let parent = self.nodes[node.0].parent?;
        self.nodes[parent.0].template
    }

    /// Templates that found no parent; they and their subtrees are never
    /// reached from the root.
    pub fn orphans(&self) -> Vec<TemplateId> {
        self.node_of
            .iter()
            .enumerate()
            .filter(|(_, node)| self.nodes[node.0].parent.is_none())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.node_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_of.is_empty()
    }
}
