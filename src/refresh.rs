use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::pipeline::{Pipeline, PipelineSource};
use crate::server::{Hub, LastRefresh, UPDATE_EVENT};
use crate::store::{GraphStore, SharedGraph};
use crate::topology::Topology;

/// Keeps the store in step with the CI server and pushes it to viewers.
///
/// Every tick broadcasts what the store holds, then rebuilds it from fresh
/// collector data. Rebuilds run on their own task: a slow or hanging collector
/// delays the next rebuild but never the next broadcast.
pub struct Refresher<S> {
    source: Arc<S>,
    store: Arc<GraphStore>,
    hub: Hub,
    interval: Duration,
    promotion_suffix: String,
    last_refresh: LastRefresh,
    rebuilding: Arc<Mutex<()>>,
}

impl<S> Clone for Refresher<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            store: Arc::clone(&self.store),
            hub: self.hub.clone(),
            interval: self.interval,
            promotion_suffix: self.promotion_suffix.clone(),
            last_refresh: Arc::clone(&self.last_refresh),
            rebuilding: Arc::clone(&self.rebuilding),
        }
    }
}

impl<S: PipelineSource + 'static> Refresher<S> {
    pub fn new(
        source: Arc<S>,
        store: Arc<GraphStore>,
        hub: Hub,
        interval: Duration,
        promotion_suffix: impl Into<String>,
        last_refresh: LastRefresh,
    ) -> Self {
        Self {
            source,
            store,
            hub,
            interval,
            promotion_suffix: promotion_suffix.into(),
            last_refresh,
            rebuilding: Arc::new(Mutex::new(())),
        }
    }

    /// Runs forever: wait one interval, broadcast, start a rebuild.
    pub async fn run(self) {
        info!(
            "Refreshing pipelines every {}s",
            self.interval.as_secs_f64()
        );

        loop {
            tokio::time::sleep(self.interval).await;
            self.tick().await;
        }
    }

    /// One refresh tick: push the current snapshot, then start a rebuild in the
    /// background unless the previous one is still running.
    pub async fn tick(&self) {
        self.broadcast().await;

        let Ok(guard) = Arc::clone(&self.rebuilding).try_lock_owned() else {
            warn!("Previous rebuild still running, skipping this one");
            return;
        };

        let refresher = self.clone();
        tokio::spawn(async move {
            refresher.rebuild().await;
            drop(guard);
        });
    }

    /// Sends the whole store to every viewer.
    pub async fn broadcast(&self) {
        let snapshot = self.store.snapshot().await;
        match self.hub.broadcast(UPDATE_EVENT, &snapshot) {
            Ok(viewers) => debug!("Broadcast snapshot to {viewers} viewers"),
            Err(e) => warn!("Failed to serialize snapshot: {e}"),
        }
    }

    /// Pulls fresh topology and statuses into the store.
    ///
    /// A failed topology fetch leaves the store as it was. Groups are rebuilt
    /// independently and a failed status fetch only skips that node.
    pub async fn rebuild(&self) {
        let groups = match self.source.list_pipelines().await {
            Ok(groups) => groups,
            Err(e) => {
                warn!("Failed to fetch pipelines, keeping previous graphs: {e}");
                return;
            }
        };

        info!("Rebuilding {} pipeline groups", groups.len());

        for (group, pipelines) in &groups {
            let graphs = self.rebuild_group(group, pipelines).await;
            join_all(graphs.iter().map(|graph| self.refresh_statuses(graph))).await;
        }

        *self.last_refresh.write().await = Some(Utc::now());
    }

    async fn rebuild_group(&self, group: &str, pipelines: &[Pipeline]) -> Vec<SharedGraph> {
        let topology = Topology::build(pipelines, &self.promotion_suffix);
        debug!(
            "Group {group}: {} sources, {} edges",
            topology.sources.len(),
            topology.edges.len()
        );
        topology.apply(&self.store, group, pipelines).await
    }

    /// Fetches every non-root node's status concurrently and merges each one as
    /// it arrives.
    async fn refresh_statuses(&self, graph: &SharedGraph) {
        let nodes: Vec<String> = {
            let graph = graph.lock().await;
            let source = graph.get_source();
            graph
                .get_nodes()
                .into_iter()
                .filter(|id| Some(*id) != source)
                .map(ToString::to_string)
                .collect()
        };

        join_all(nodes.iter().map(|node| async move {
            match self.source.get_status(node).await {
                Ok(status) => graph.lock().await.add_data(node, status),
                Err(e) => warn!("Failed to fetch status of {node}: {e}"),
            }
        }))
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PipegraphError, Result};
    use crate::graph::NodeData;
    use crate::pipeline::{Dependency, PipelineGroups};
    use crate::topology::{DEFAULT_PROMOTION_SUFFIX, SOURCE_NODE_ID};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;

    const REPO: &str = "https://git.example.com/app.git";

    /// In-memory collector with switchable failures.
    #[derive(Default)]
    struct FakeSource {
        groups: std::sync::Mutex<PipelineGroups>,
        statuses: std::sync::Mutex<HashMap<String, Value>>,
        fail_list: std::sync::atomic::AtomicBool,
        status_calls: AtomicUsize,
    }

    impl FakeSource {
        fn set_groups(&self, groups: PipelineGroups) {
            *self.groups.lock().unwrap() = groups;
        }

        fn set_status(&self, pipeline: &str, status: &str) {
            self.statuses
                .lock()
                .unwrap()
                .insert(pipeline.to_string(), json!(status));
        }
    }

    #[async_trait]
    impl PipelineSource for FakeSource {
        async fn list_pipelines(&self) -> Result<PipelineGroups> {
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(PipegraphError::Api {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(self.groups.lock().unwrap().clone())
        }

        async fn get_status(&self, pipeline: &str) -> Result<NodeData> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            let status = self.statuses.lock().unwrap().get(pipeline).cloned();
            match status {
                Some(status) => {
                    let mut data = NodeData::new();
                    data.insert("status".to_string(), status);
                    Ok(data)
                }
                None => Err(PipegraphError::Api {
                    status: 404,
                    message: format!("{pipeline} not found"),
                }),
            }
        }
    }

    fn pipeline(name: &str, upstream: Vec<Dependency>, status: &str) -> Pipeline {
        Pipeline {
            name: name.to_string(),
            upstream,
            build_number: Some(1),
            status: json!(status),
        }
    }

    fn sample_groups() -> PipelineGroups {
        let mut groups = PipelineGroups::new();
        groups.insert(
            "app".to_string(),
            vec![
                pipeline("build", vec![Dependency::source(REPO)], "Building"),
                pipeline("deploy", vec![Dependency::pipeline("build")], "Unknown"),
            ],
        );
        groups
    }

    fn refresher(source: Arc<FakeSource>) -> Refresher<FakeSource> {
        Refresher::new(
            source,
            Arc::new(GraphStore::new()),
            Hub::new(16),
            Duration::from_secs(30),
            DEFAULT_PROMOTION_SUFFIX,
            Arc::new(RwLock::new(None)),
        )
    }

    async fn node_status(refresher: &Refresher<FakeSource>, node: &str) -> Option<Value> {
        let graph = refresher.store.get("app", REPO).await?;
        let graph = graph.lock().await;
        graph.get_node(node)?.data.get("status").cloned()
    }

    #[tokio::test]
    async fn test_rebuild_builds_graphs_and_merges_statuses() {
        let source = Arc::new(FakeSource::default());
        source.set_groups(sample_groups());
        source.set_status("build", "Passed");
        source.set_status("deploy", "Failed");

        let refresher = refresher(Arc::clone(&source));
        refresher.rebuild().await;

        assert_eq!(node_status(&refresher, "build").await, Some(json!("Passed")));
        assert_eq!(node_status(&refresher, "deploy").await, Some(json!("Failed")));
        assert_eq!(source.status_calls.load(Ordering::SeqCst), 2);
        assert!(refresher.last_refresh.read().await.is_some());

        let graph = refresher.store.get("app", REPO).await.unwrap();
        let graph = graph.lock().await;
        assert_eq!(graph.get_links("build"), Some(["deploy".to_string()].as_slice()));
        assert_eq!(
            graph.get_node(SOURCE_NODE_ID).unwrap().data.get("url"),
            Some(&json!(REPO))
        );
    }

    #[tokio::test]
    async fn test_status_failure_keeps_record_status() {
        let source = Arc::new(FakeSource::default());
        source.set_groups(sample_groups());
        source.set_status("build", "Passed");

        let refresher = refresher(Arc::clone(&source));
        refresher.rebuild().await;

        assert_eq!(node_status(&refresher, "build").await, Some(json!("Passed")));
        assert_eq!(node_status(&refresher, "deploy").await, Some(json!("Unknown")));
    }

    #[tokio::test]
    async fn test_failing_group_does_not_block_other_groups() {
        const LIB_REPO: &str = "https://git.example.com/lib.git";

        let mut groups = PipelineGroups::new();
        groups.insert(
            "lib".to_string(),
            vec![
                pipeline("lib-build", vec![Dependency::source(LIB_REPO)], "Unknown"),
                pipeline("lib-publish", vec![Dependency::pipeline("lib-build")], "Unknown"),
            ],
        );
        groups.extend(sample_groups());

        let source = Arc::new(FakeSource::default());
        source.set_groups(groups);
        source.set_status("build", "Passed");
        source.set_status("deploy", "Failed");

        let refresher = refresher(Arc::clone(&source));
        refresher.rebuild().await;

        assert_eq!(node_status(&refresher, "build").await, Some(json!("Passed")));
        assert_eq!(node_status(&refresher, "deploy").await, Some(json!("Failed")));
        assert_eq!(source.status_calls.load(Ordering::SeqCst), 4);
        assert_eq!(refresher.store.len().await, 2);
        assert!(refresher.last_refresh.read().await.is_some());

        let lib = refresher.store.get("lib", LIB_REPO).await.unwrap();
        let lib = lib.lock().await;
        assert_eq!(
            lib.get_node("lib-publish").unwrap().data.get("status"),
            Some(&json!("Unknown"))
        );
    }

    #[tokio::test]
    async fn test_list_failure_keeps_previous_graphs() {
        let source = Arc::new(FakeSource::default());
        source.set_groups(sample_groups());
        source.set_status("build", "Passed");
        source.set_status("deploy", "Passed");

        let refresher = refresher(Arc::clone(&source));
        refresher.rebuild().await;
        let first_refresh = *refresher.last_refresh.read().await;

        source.fail_list.store(true, Ordering::SeqCst);
        refresher.rebuild().await;

        assert_eq!(node_status(&refresher, "deploy").await, Some(json!("Passed")));
        assert_eq!(*refresher.last_refresh.read().await, first_refresh);
        assert_eq!(refresher.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_rebuild_accumulates_nodes_across_refreshes() {
        let source = Arc::new(FakeSource::default());
        source.set_groups(sample_groups());

        let refresher = refresher(Arc::clone(&source));
        refresher.rebuild().await;
        let graph = refresher.store.get("app", REPO).await.unwrap();

        let mut groups = PipelineGroups::new();
        groups.insert(
            "app".to_string(),
            vec![pipeline("build", vec![Dependency::source(REPO)], "Passed")],
        );
        source.set_groups(groups);
        refresher.rebuild().await;

        let same = refresher.store.get("app", REPO).await.unwrap();
        assert!(Arc::ptr_eq(&graph, &same));
        assert_eq!(
            same.lock().await.get_nodes(),
            vec![SOURCE_NODE_ID, "build", "deploy"]
        );
    }

    #[tokio::test]
    async fn test_broadcast_sends_store_snapshot() {
        let source = Arc::new(FakeSource::default());
        source.set_groups(sample_groups());
        source.set_status("build", "Passed");
        source.set_status("deploy", "Passed");

        let refresher = refresher(Arc::clone(&source));
        let mut viewer = refresher.hub.subscribe();

        refresher.broadcast().await;
        let empty: Value = serde_json::from_str(&viewer.recv().await.unwrap()).unwrap();
        assert_eq!(empty, json!({"event": "update", "payload": {}}));

        refresher.rebuild().await;
        refresher.broadcast().await;
        let message: Value = serde_json::from_str(&viewer.recv().await.unwrap()).unwrap();
        assert_eq!(message["event"], json!("update"));
        assert_eq!(
            message["payload"]["app"][REPO]["build"]["data"]["status"],
            json!("Passed")
        );
        assert_eq!(
            message["payload"]["app"][REPO]["GIT"]["links"],
            json!(["build"])
        );
    }

    #[tokio::test]
    async fn test_tick_skips_rebuild_while_one_is_running() {
        let source = Arc::new(FakeSource::default());
        source.set_groups(sample_groups());

        let refresher = refresher(Arc::clone(&source));
        let held = Arc::clone(&refresher.rebuilding).try_lock_owned().unwrap();

        let mut viewer = refresher.hub.subscribe();
        refresher.tick().await;

        assert!(viewer.recv().await.is_ok());
        tokio::task::yield_now().await;
        assert!(refresher.store.is_empty().await);

        drop(held);
        refresher.tick().await;
        for _ in 0..50 {
            if !refresher.store.is_empty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(refresher.store.len().await, 1);
    }
}
