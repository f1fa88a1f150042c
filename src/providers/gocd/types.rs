use std::fmt;

use serde::Deserialize;

use crate::pipeline::Dependency;

/// One entry of `GET /go/api/config/pipeline_groups`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigGroup {
    pub name: String,
    #[serde(default)]
    pub pipelines: Vec<ConfigPipeline>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigPipeline {
    pub name: String,
    #[serde(default)]
    pub materials: Vec<Material>,
}

/// A pipeline material: what triggers it.
#[derive(Debug, Clone, Deserialize)]
pub struct Material {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

impl Material {
    /// Maps the material onto an upstream dependency. Material types with no
    /// place in the topology (plugins, unknown types) yield `None`.
    pub fn to_dependency(&self) -> Option<Dependency> {
        match self.kind.as_str() {
            "Git" | "Mercurial" | "Svn" | "Perforce" | "Tfs" => {
                Some(Dependency::source(repository_url(&self.description)))
            }
            "Dependency" => Some(Dependency::pipeline(upstream_pipeline(&self.description))),
            "Package" => Some(Dependency::package(self.description.trim())),
            _ => None,
        }
    }
}

/// Extracts the URL from an SCM description such as
/// `URL: https://git.example.com/app.git, Branch: main`.
fn repository_url(description: &str) -> &str {
    let description = description.trim();
    description
        .strip_prefix("URL: ")
        .and_then(|rest| rest.split(", ").next())
        .unwrap_or(description)
}

/// Dependency descriptions are `pipeline` or `pipeline [stage]`.
fn upstream_pipeline(description: &str) -> &str {
    description
        .split(" [")
        .next()
        .unwrap_or(description)
        .trim()
}

/// `GET /go/api/dashboard`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dashboard {
    #[serde(rename = "_embedded", default)]
    pub embedded: DashboardEmbedded,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardEmbedded {
    #[serde(default)]
    pub pipelines: Vec<DashboardPipeline>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardPipeline {
    pub name: String,
    #[serde(rename = "_embedded", default)]
    pub embedded: InstancesEmbedded,
}

impl DashboardPipeline {
    pub fn latest_instance(&self) -> Option<&Instance> {
        self.embedded
            .instances
            .iter()
            .max_by_key(|instance| instance.counter)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstancesEmbedded {
    #[serde(default)]
    pub instances: Vec<Instance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Instance {
    pub counter: u64,
    #[serde(rename = "_embedded", default)]
    pub embedded: StagesEmbedded,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StagesEmbedded {
    #[serde(default)]
    pub stages: Vec<Stage>,
}

/// `GET /go/api/pipelines/{name}/history`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct History {
    #[serde(default)]
    pub pipelines: Vec<HistoryInstance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryInstance {
    pub counter: u64,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Stage {
    #[serde(default)]
    pub status: String,
}

/// Overall state of one pipeline run, folded from its stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum BuildStatus {
    Passed,
    Failed,
    Building,
    Cancelled,
    Unknown,
}

impl BuildStatus {
    pub fn from_stages(stages: &[Stage]) -> Self {
        let any = |wanted: &[&str]| {
            stages
                .iter()
                .any(|stage| wanted.iter().any(|w| *w == stage.status))
        };

        if stages.is_empty() {
            Self::Unknown
        } else if any(&["Failed", "Failing"]) {
            Self::Failed
        } else if any(&["Building", "Scheduled", "Assigned", "Preparing"]) {
            Self::Building
        } else if any(&["Cancelled"]) {
            Self::Cancelled
        } else if stages.iter().all(|s| s.status == "Passed") {
            Self::Passed
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "Passed",
            Self::Failed => "Failed",
            Self::Building => "Building",
            Self::Cancelled => "Cancelled",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
