use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use log::{debug, warn};
use serde_json::json;

use crate::graph::{Graph, NodeData};
use crate::pipeline::{Dependency, DependencyKind, Pipeline};
use crate::store::{GraphStore, SharedGraph};

/// Id of the root node of every graph.
pub const SOURCE_NODE_ID: &str = "GIT";

/// Name suffix marking the pipeline that stands in for package dependencies.
pub const DEFAULT_PROMOTION_SUFFIX: &str = "-promote-rpm";

/// A source repository and the pipelines built straight from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRoot {
    pub url: String,
    pub links: Vec<String>,
}

/// Downstream edge: `to` runs after `from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// Edges and roots of one group, turning its flat pipeline list into one rooted
/// graph per source repository.
///
/// Pipelines declare their *upstream* dependencies. Viewers want the opposite
/// direction: a repository at the root, fanning out to the pipelines it feeds.
/// `build` finds the repositories and inverts the dependencies into edges;
/// `populate` walks those edges into a repository's graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    pub sources: Vec<SourceRoot>,
    pub edges: Vec<Edge>,
}

impl Topology {
    pub fn build(pipelines: &[Pipeline], promotion_suffix: &str) -> Self {
        Self {
            sources: discover_sources(pipelines),
            edges: invert_edges(pipelines, promotion_suffix),
        }
    }

    /// Targets of every edge leaving `node`, in edge order.
    pub fn links_from(&self, node: &str) -> Vec<String> {
        self.edges
            .iter()
            .filter(|edge| edge.from == node)
            .map(|edge| edge.to.clone())
            .collect()
    }

    /// Writes `source` and everything downstream of it into `graph`.
    ///
    /// Each pipeline node gets a fresh `{build-number, name, status}` payload
    /// and its outgoing links. A pipeline is expanded at most once, so shared
    /// descendants and cycles are walked a single time. Links to pipelines with
    /// no record are dropped.
    pub fn populate(&self, graph: &mut Graph, source: &SourceRoot, pipelines: &[Pipeline]) {
        let mut records: HashMap<&str, &Pipeline> = HashMap::new();
        for pipeline in pipelines {
            records.entry(pipeline.name.as_str()).or_insert(pipeline);
        }

        let mut root_data = NodeData::new();
        root_data.insert("url".to_string(), json!(source.url));
        graph.designate_source(SOURCE_NODE_ID, root_data, source.links.clone());

        let mut visited: HashSet<String> = HashSet::new();
        let mut stack: Vec<String> = source.links.iter().rev().cloned().collect();

        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }

            let Some(pipeline) = records.get(name.as_str()) else {
                warn!("No pipeline record for '{name}', skipping it");
                continue;
            };

            let links: Vec<String> = self
                .links_from(&name)
                .into_iter()
                .filter(|link| {
                    let known = records.contains_key(link.as_str());
                    if !known {
                        warn!("Pipeline '{name}' links to unknown pipeline '{link}', dropping link");
                    }
                    known
                })
                .collect();

            graph.add_node(&name, Some(pipeline.node_data()), Some(links.clone()));

            stack.extend(links.into_iter().rev().filter(|link| !visited.contains(link)));
        }
    }

    /// Builds one graph per source repository inside `store`.
    ///
    /// Existing graphs are updated in place; returns the graphs touched.
    pub async fn apply(
        &self,
        store: &GraphStore,
        group: &str,
        pipelines: &[Pipeline],
    ) -> Vec<SharedGraph> {
        let mut touched = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let graph = store.get_or_create(group, &source.url).await;
            {
                let mut graph = graph.lock().await;
                self.populate(&mut graph, source, pipelines);
                debug!(
                    "Graph {group}/{} now holds {} nodes",
                    source.url,
                    graph.size()
                );
            }
            touched.push(graph);
        }

        touched
    }
}

/// A pipeline counts as built straight from a repository only when every
/// upstream dependency it has is a repository. One that also waits on another
/// pipeline or a package hangs below that stage instead.
fn is_built_from_source(pipeline: &Pipeline) -> bool {
    pipeline.upstream.iter().all(Dependency::is_source)
}

fn discover_sources(pipelines: &[Pipeline]) -> Vec<SourceRoot> {
    let mut sources: IndexMap<&str, Vec<String>> = IndexMap::new();

    for pipeline in pipelines {
        let direct = is_built_from_source(pipeline);
        for dependency in pipeline.upstream.iter().filter(|d| d.is_source()) {
            let links = sources.entry(dependency.name.as_str()).or_default();
            if direct && !links.contains(&pipeline.name) {
                links.push(pipeline.name.clone());
            }
        }
    }

    sources
        .into_iter()
        .map(|(url, links)| SourceRoot {
            url: url.to_string(),
            links,
        })
        .collect()
}

/// An empty suffix marks no pipeline.
fn promotion_pipeline<'a>(pipelines: &'a [Pipeline], suffix: &str) -> Option<&'a str> {
    if suffix.is_empty() {
        return None;
    }

    pipelines
        .iter()
        .map(|pipeline| pipeline.name.as_str())
        .find(|name| name.ends_with(suffix))
}

fn invert_edges(pipelines: &[Pipeline], promotion_suffix: &str) -> Vec<Edge> {
    let promotion = promotion_pipeline(pipelines, promotion_suffix);
    let mut edges = Vec::new();

    for pipeline in pipelines {
        let skip_sources = pipeline.upstream.len() > 1 && !is_built_from_source(pipeline);

        for dependency in &pipeline.upstream {
            if skip_sources && dependency.is_source() {
                continue;
            }

            let from = match dependency.kind {
                DependencyKind::Package => match promotion {
                    Some(promotion) => promotion,
                    None => {
                        warn!(
                            "Pipeline '{}' depends on package '{}' but no '*{promotion_suffix}' pipeline exists, skipping edge",
                            pipeline.name, dependency.name
                        );
                        continue;
                    }
                },
                DependencyKind::Source | DependencyKind::Pipeline => dependency.name.as_str(),
            };

            edges.push(Edge {
                from: from.to_string(),
                to: pipeline.name.clone(),
            });
        }
    }

    edges
}
