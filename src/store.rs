use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::{Mutex, RwLock};

use crate::graph::{Graph, Node};

/// Handle to one graph in the store. Status refreshes lock it per merge.
pub type SharedGraph = Arc<Mutex<Graph>>;

/// group -> repository URL -> serialized graph
pub type Snapshot = IndexMap<String, IndexMap<String, IndexMap<String, Node>>>;

/// Every graph built so far, keyed by group and then by source repository.
///
/// Created once at startup and shared by the refresh loop and the viewer
/// connections for the life of the process. Graphs are created on first use and
/// never dropped, so node data accumulated by earlier refreshes stays visible.
#[derive(Debug, Default)]
pub struct GraphStore {
    groups: RwLock<IndexMap<String, IndexMap<String, SharedGraph>>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the graph for `(group, root_key)`, creating an empty one the
    /// first time the pair is seen.
    pub async fn get_or_create(&self, group: &str, root_key: &str) -> SharedGraph {
        if let Some(graph) = self.get(group, root_key).await {
            return graph;
        }

        let mut groups = self.groups.write().await;
        groups
            .entry(group.to_string())
            .or_default()
            .entry(root_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Graph::new())))
            .clone()
    }

    pub async fn get(&self, group: &str, root_key: &str) -> Option<SharedGraph> {
        let groups = self.groups.read().await;
        groups
            .get(group)
            .and_then(|graphs| graphs.get(root_key))
            .cloned()
    }

    /// Number of graphs across all groups.
    pub async fn len(&self) -> usize {
        self.groups.read().await.values().map(IndexMap::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Handles to every graph as `(group, root_key, graph)`, in creation order.
    pub async fn graphs(&self) -> Vec<(String, String, SharedGraph)> {
        let groups = self.groups.read().await;
        groups
            .iter()
            .flat_map(|(group, graphs)| {
                graphs
                    .iter()
                    .map(move |(root_key, graph)| (group.clone(), root_key.clone(), Arc::clone(graph)))
            })
            .collect()
    }

    /// Serialized form of every graph, as pushed to viewers.
    ///
    /// Graphs are locked one at a time, so a snapshot taken during a status
    /// refresh may mix old and new statuses.
    pub async fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        for (group, root_key, graph) in self.graphs().await {
            let nodes = graph.lock().await.snapshot();
            snapshot.entry(group).or_default().insert(root_key, nodes);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeData;

    #[tokio::test]
    async fn test_get_or_create_reuses_graph() {
        let store = GraphStore::new();

        let first = store.get_or_create("team", "git@host:app").await;
        first.lock().await.add_node("build", Some(NodeData::new()), None);

        let second = store.get_or_create("team", "git@host:app").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().await.get_nodes(), vec!["build"]);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_graphs_are_keyed_by_group_and_root() {
        let store = GraphStore::new();

        let a = store.get_or_create("team-a", "git@host:app").await;
        let b = store.get_or_create("team-b", "git@host:app").await;
        let c = store.get_or_create("team-a", "git@host:lib").await;

        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = GraphStore::new();
        assert!(store.is_empty().await);
        assert!(store.get("team", "nope").await.is_none());

        store.get_or_create("team", "git@host:app").await;
        assert!(store.get("team", "nope").await.is_none());
        assert!(store.get("other", "git@host:app").await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_shape() {
        let store = GraphStore::new();
        let graph = store.get_or_create("team", "git@host:app").await;
        graph
            .lock()
            .await
            .add_node("build", Some(NodeData::new()), Some(vec!["deploy".to_string()]));
        store.get_or_create("ops", "git@host:infra").await;

        let json = serde_json::to_value(store.snapshot().await).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "team": {
                    "git@host:app": {
                        "build": {"data": {}, "links": ["deploy"]},
                        "deploy": {"data": {}, "links": []}
                    }
                },
                "ops": {"git@host:infra": {}}
            })
        );
    }
}
