use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque key-value payload carried by every node.
pub type NodeData = Map<String, Value>;

/// A single node: its payload plus the ids it links to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub data: NodeData,
    pub links: Vec<String>,
}

/// Directed graph keyed by node id.
///
/// Node ids keep their first-insertion order. Every id referenced by a link is
/// itself a node: linking to an unknown id creates an empty node for it. A
/// node's link list never holds the same id twice.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: IndexMap<String, Node>,
    source: Option<String>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node or updates an existing one.
    ///
    /// On an existing node, `data` replaces the stored payload when given and
    /// `links` replaces the stored links when given (an empty list clears
    /// them). Passing `None` for `links` leaves existing links untouched.
    pub fn add_node(&mut self, id: &str, data: Option<NodeData>, links: Option<Vec<String>>) {
        let links = links.map(dedup);

        let node = self.nodes.entry(id.to_string()).or_default();
        if let Some(data) = data {
            node.data = data;
        }
        if let Some(links) = links {
            node.links = links.clone();
            self.ensure_nodes(&links);
        }
    }

    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Node ids in first-insertion order.
    pub fn get_nodes(&self) -> Vec<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }

    pub fn get_links(&self, id: &str) -> Option<&[String]> {
        self.nodes.get(id).map(|node| node.links.as_slice())
    }

    /// Appends the links not already present on `id`, creating empty nodes for
    /// unknown targets. Does nothing when `id` is not in the graph.
    pub fn add_links(&mut self, id: &str, new_links: &[String]) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };

        let mut added = Vec::new();
        for link in new_links {
            if !node.links.contains(link) {
                node.links.push(link.clone());
                added.push(link.clone());
            }
        }

        self.ensure_nodes(&added);
    }

    /// Removes `id` and strips it from every remaining node's links.
    pub fn remove_node(&mut self, id: &str) {
        if self.nodes.shift_remove(id).is_none() {
            return;
        }

        for node in self.nodes.values_mut() {
            node.links.retain(|link| link != id);
        }

        if self.source.as_deref() == Some(id) {
            self.source = None;
        }
    }

    /// Merges `patch` into the node's data, keeping its links.
    pub fn add_data(&mut self, id: &str, patch: NodeData) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.data.extend(patch);
        }
    }

    /// Adds (or updates) `id` and marks it as the graph's root.
    pub fn designate_source(&mut self, id: &str, data: NodeData, links: Vec<String>) {
        self.add_node(id, Some(data), Some(links));
        self.source = Some(id.to_string());
    }

    pub fn get_source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Ids reachable from `start` (inclusive) in breadth-first order.
    ///
    /// Each node's links are expanded in lexicographic order regardless of the
    /// order they were declared in. Returns an empty list for an unknown id.
    pub fn breadth_first_search(&self, start: &str) -> Vec<String> {
        if !self.nodes.contains_key(start) {
            return Vec::new();
        }

        let mut visited: HashSet<&str> = HashSet::from([start]);
        let mut queue: VecDeque<&str> = VecDeque::from([start]);
        let mut order = Vec::new();

        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());

            let Some(node) = self.nodes.get(id) else {
                continue;
            };

            let mut links: Vec<&str> = node.links.iter().map(String::as_str).collect();
            links.sort_unstable();

            for link in links {
                if visited.insert(link) {
                    queue.push_back(link);
                }
            }
        }

        order
    }

    /// Transport-ready copy of every node in insertion order.
    pub fn snapshot(&self) -> IndexMap<String, Node> {
        self.nodes.clone()
    }

    fn ensure_nodes(&mut self, ids: &[String]) {
        for id in ids {
            if !self.nodes.contains_key(id) {
                self.nodes.insert(id.clone(), Node::default());
            }
        }
    }
}

fn dedup(links: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    links
        .into_iter()
        .filter(|link| seen.insert(link.clone()))
        .collect()
}
