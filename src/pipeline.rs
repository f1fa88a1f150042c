use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::graph::NodeData;

/// What an upstream dependency of a pipeline points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// A source-control repository; the dependency name is its URL
    #[serde(alias = "git")]
    Source,
    /// A published artifact
    Package,
    /// Another CI pipeline
    Pipeline,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Dependency {
    #[serde(rename = "type")]
    pub kind: DependencyKind,
    pub name: String,
}

impl Dependency {
    pub fn source(url: &str) -> Self {
        Self {
            kind: DependencyKind::Source,
            name: url.to_string(),
        }
    }

    pub fn package(name: &str) -> Self {
        Self {
            kind: DependencyKind::Package,
            name: name.to_string(),
        }
    }

    pub fn pipeline(name: &str) -> Self {
        Self {
            kind: DependencyKind::Pipeline,
            name: name.to_string(),
        }
    }

    pub fn is_source(&self) -> bool {
        self.kind == DependencyKind::Source
    }
}

/// A CI pipeline as reported by the collector.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Pipeline {
    pub name: String,
    #[serde(default)]
    pub upstream: Vec<Dependency>,
    #[serde(default)]
    pub build_number: Option<u64>,
    #[serde(default)]
    pub status: Value,
}

impl Pipeline {
    /// The payload stored on this pipeline's graph node.
    pub fn node_data(&self) -> NodeData {
        let mut data = NodeData::new();
        data.insert("build-number".to_string(), json!(self.build_number));
        data.insert("name".to_string(), json!(self.name));
        data.insert("status".to_string(), self.status.clone());
        data
    }
}

/// Pipelines per group, in the order the CI server lists them.
pub type PipelineGroups = IndexMap<String, Vec<Pipeline>>;

/// Where pipeline topology and status come from.
#[async_trait]
pub trait PipelineSource: Send + Sync {
    /// Every pipeline the server knows about, grouped.
    async fn list_pipelines(&self) -> Result<PipelineGroups>;

    /// Latest status of one pipeline, merged as-is into its node data.
    async fn get_status(&self, pipeline: &str) -> Result<NodeData>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_pipeline_record() {
        let raw = r#"{
            "name": "app-build",
            "upstream": [
                {"type": "git", "name": "https://git.example.com/app.git"},
                {"type": "pipeline", "name": "base-image"},
                {"type": "package", "name": "libfoo"}
            ],
            "build-number": 42,
            "status": "Passed"
        }"#;

        let pipeline: Pipeline = serde_json::from_str(raw).unwrap();
        assert_eq!(pipeline.name, "app-build");
        assert_eq!(
            pipeline.upstream,
            vec![
                Dependency::source("https://git.example.com/app.git"),
                Dependency::pipeline("base-image"),
                Dependency::package("libfoo"),
            ]
        );
        assert_eq!(pipeline.build_number, Some(42));
        assert_eq!(pipeline.status, json!("Passed"));
    }

    #[test]
    fn test_missing_fields_default() {
        let pipeline: Pipeline = serde_json::from_str(r#"{"name": "lonely"}"#).unwrap();
        assert!(pipeline.upstream.is_empty());
        assert_eq!(pipeline.build_number, None);
        assert_eq!(pipeline.status, Value::Null);
    }

    #[test]
    fn test_node_data() {
        let pipeline = Pipeline {
            name: "deploy".to_string(),
            upstream: vec![],
            build_number: Some(3),
            status: json!("Failed"),
        };

        let data = pipeline.node_data();
        assert_eq!(data.get("build-number"), Some(&json!(3)));
        assert_eq!(data.get("name"), Some(&json!("deploy")));
        assert_eq!(data.get("status"), Some(&json!("Failed")));
    }
}
