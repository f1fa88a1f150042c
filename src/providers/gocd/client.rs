use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::Semaphore;
use url::Url;

use crate::auth::Credentials;
use crate::error::{PipegraphError, Result};
use crate::graph::NodeData;
use crate::pipeline::{Pipeline, PipelineGroups, PipelineSource};

use super::types::{BuildStatus, ConfigGroup, Dashboard, History, Instance};

const ACCEPT_V1: &str = "application/vnd.go.cd.v1+json";
const ACCEPT_DASHBOARD: &str = "application/vnd.go.cd.v4+json";

/// GoCD REST client used as the pipeline collector.
///
/// Requests are never retried: a failed call is reported to the caller and the
/// next refresh tries again. Every request is bounded by the client timeout and
/// the number of requests in flight is capped.
pub struct GoCdClient {
    client: Client,
    base_url: Url,
    credentials: Option<Credentials>,
    semaphore: Arc<Semaphore>,
}

impl GoCdClient {
    pub fn new(
        base_url: &str,
        credentials: Option<Credentials>,
        timeout: Duration,
        max_concurrent_requests: usize,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("pipegraph/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| PipegraphError::Config(format!("Failed to create HTTP client: {e}")))?;

        let mut base_url = Url::parse(base_url)
            .map_err(|e| PipegraphError::Config(format!("Invalid GoCD URL: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            credentials,
            semaphore: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn get_json<T>(&self, url: Url, accept: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        // The semaphore is never closed, so a failed acquire cannot happen.
        let _permit = self.semaphore.acquire().await.ok();

        debug!("GET {url}");
        let mut request = self.client.get(url).header(ACCEPT, accept);
        if let Some(credentials) = &self.credentials {
            request = credentials.apply(request);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(PipegraphError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    pub async fn fetch_pipeline_groups(&self) -> Result<Vec<ConfigGroup>> {
        let url = self.endpoint("go/api/config/pipeline_groups")?;
        self.get_json(url, "application/json").await
    }

    pub async fn fetch_dashboard(&self) -> Result<Dashboard> {
        let url = self.endpoint("go/api/dashboard")?;
        self.get_json(url, ACCEPT_DASHBOARD).await
    }

    pub async fn fetch_history(&self, pipeline: &str) -> Result<History> {
        let mut url = self.endpoint("go/api/pipelines/")?;
        url.path_segments_mut()
            .map_err(|()| PipegraphError::Config("GoCD URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push(pipeline)
            .push("history");
        url.query_pairs_mut().append_pair("page_size", "1");

        self.get_json(url, ACCEPT_V1).await
    }
}

#[async_trait]
impl PipelineSource for GoCdClient {
    async fn list_pipelines(&self) -> Result<PipelineGroups> {
        let (groups, dashboard) =
            tokio::try_join!(self.fetch_pipeline_groups(), self.fetch_dashboard())?;

        let latest: HashMap<&str, &Instance> = dashboard
            .embedded
            .pipelines
            .iter()
            .filter_map(|p| p.latest_instance().map(|i| (p.name.as_str(), i)))
            .collect();

        let mut result = PipelineGroups::new();
        for group in groups {
            let pipelines = group
                .pipelines
                .into_iter()
                .map(|config| {
                    let instance = latest.get(config.name.as_str());
                    let status = instance.map_or(BuildStatus::Unknown, |i| {
                        BuildStatus::from_stages(&i.embedded.stages)
                    });

                    Pipeline {
                        upstream: config
                            .materials
                            .iter()
                            .filter_map(|material| material.to_dependency())
                            .collect(),
                        build_number: instance.map(|i| i.counter),
                        status: json!(status.as_str()),
                        name: config.name,
                    }
                })
                .collect();

            result.insert(group.name, pipelines);
        }

        Ok(result)
    }

    async fn get_status(&self, pipeline: &str) -> Result<NodeData> {
        let history = self.fetch_history(pipeline).await?;

        let mut data = NodeData::new();
        match history.pipelines.iter().max_by_key(|run| run.counter) {
            Some(run) => {
                data.insert("build-number".to_string(), json!(run.counter));
                data.insert(
                    "status".to_string(),
                    json!(BuildStatus::from_stages(&run.stages).as_str()),
                );
            }
            None => {
                data.insert("status".to_string(), json!(BuildStatus::Unknown.as_str()));
            }
        }

        Ok(data)
    }
}
