use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info};

use kiln_core::resolve::sanitize;
use kiln_core::{CiError, CiGateway};
use kiln_model::BlockedTask;

use crate::config::JenkinsConfig;
use crate::errors::JenkinsError;
use crate::xml::child_text;

const QUEUE_TREE: &str = "tree=items[id,why,task[name,url]]";
const COMPUTERS_TREE: &str = "tree=computer[displayName]";

#[derive(Deserialize)]
struct Queue {
    #[serde(default)]
    items: Vec<QueueItem>,
}

#[derive(Deserialize)]
struct QueueItem {
    id: u64,
    #[serde(default)]
    why: Option<String>,
    #[serde(default)]
    task: Option<QueueTask>,
}

#[derive(Deserialize, Default)]
struct QueueTask {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
}

#[derive(Deserialize)]
struct Computers {
    #[serde(default)]
    computer: Vec<Computer>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Computer {
    display_name: String,
}

#[derive(Deserialize)]
struct ComputerIdle {
    idle: bool,
}

/// Client for the Jenkins remote access API.
#[derive(Clone)]
pub struct JenkinsClient {
    http: reqwest::Client,
    base: Url,
    user: String,
    token: String,
}

impl JenkinsClient {
    pub fn new(config: JenkinsConfig) -> Result<Self, JenkinsError> {
        let base = Url::parse(&config.url).map_err(|e| JenkinsError::InvalidUrl(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(JenkinsError::InvalidUrl(config.url));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base,
            user: config.user,
            token: config.token,
        })
    }

    fn endpoint(&self, segments: &[&str], query: Option<&str>) -> Result<Url, JenkinsError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| JenkinsError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        url.set_query(query);
        Ok(url)
    }

    /// Authenticated request; `None` on 404.
    async fn send(&self, method: Method, url: Url) -> Result<Option<Response>, JenkinsError> {
        debug!(%method, %url, "jenkins: request");
        let response = self
            .http
            .request(method, url.clone())
            .basic_auth(&self.user, Some(&self.token))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response)),
            status => Err(JenkinsError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    async fn get(&self, url: Url) -> Result<Option<Response>, JenkinsError> {
        self.send(Method::GET, url).await
    }

    pub async fn queue(&self) -> Result<Vec<BlockedTask>, JenkinsError> {
        let url = self.endpoint(&["queue", "api", "json"], Some(QUEUE_TREE))?;
        let response = self
            .get(url)
            .await?
            .ok_or_else(|| JenkinsError::NotFound("queue".into()))?;
        let queue: Queue = response.json().await?;

        Ok(queue
            .items
            .into_iter()
            .map(|item| {
                let task = item.task.unwrap_or_default();
                BlockedTask {
                    id: item.id,
                    why: item.why,
                    job_name: task.name,
                    job_url: task.url,
                }
            })
            .collect())
    }

    pub async fn computers(&self) -> Result<Vec<String>, JenkinsError> {
        let url = self.endpoint(&["computer", "api", "json"], Some(COMPUTERS_TREE))?;
        let response = self
            .get(url)
            .await?
            .ok_or_else(|| JenkinsError::NotFound("computer".into()))?;
        let computers: Computers = response.json().await?;
        Ok(computers.computer.into_iter().map(|c| c.display_name).collect())
    }

    pub async fn computer_idle(&self, name: &str) -> Result<bool, JenkinsError> {
        let url = self.endpoint(&["computer", name, "api", "json"], Some("tree=idle"))?;
        let response = self
            .get(url)
            .await?
            .ok_or_else(|| JenkinsError::NotFound(name.to_string()))?;
        let state: ComputerIdle = response.json().await?;
        Ok(state.idle)
    }

    pub async fn computer_exists(&self, name: &str) -> Result<bool, JenkinsError> {
        let url = self.endpoint(&["computer", name, "api", "json"], Some("tree=displayName"))?;
        Ok(self.get(url).await?.is_some())
    }

    /// Labels of an agent as configured in its `config.xml`.
    pub async fn computer_labels(&self, name: &str) -> Result<Vec<String>, JenkinsError> {
        let name = sanitize(name, true);
        let url = self.endpoint(&["computer", &name, "config.xml"], None)?;
        let Some(response) = self.get(url).await? else {
            debug!(node = %name, "jenkins: agent not found, no labels");
            return Ok(Vec::new());
        };
        let body = response.text().await?;
        Ok(child_text(&body, "label")?
            .map(|text| text.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default())
    }

    /// The `assignedNode` label expression of a job.
    pub async fn job_label_expression(&self, job: &str) -> Result<Option<String>, JenkinsError> {
        let url = self.endpoint(&["job", job, "config.xml"], None)?;
        let response = self
            .get(url)
            .await?
            .ok_or_else(|| JenkinsError::NotFound(job.to_string()))?;
        let body = response.text().await?;
        Ok(child_text(&body, "assignedNode")?.filter(|expr| !expr.trim().is_empty()))
    }

    /// Remove an agent; returns whether it existed.
    pub async fn delete_computer(&self, name: &str) -> Result<bool, JenkinsError> {
        if !self.computer_exists(name).await? {
            info!(node = name, "jenkins: agent does not exist, nothing to delete");
            return Ok(false);
        }
        let url = self.endpoint(&["computer", name, "doDelete"], None)?;
        info!(node = name, "jenkins: deleting agent");
        Ok(self.send(Method::POST, url).await?.is_some())
    }
}

#[async_trait]
impl CiGateway for JenkinsClient {
    async fn list_blocked_tasks(&self) -> Result<Vec<BlockedTask>, CiError> {
        Ok(self.queue().await?)
    }

    async fn list_agent_names(&self) -> Result<Vec<String>, CiError> {
        Ok(self.computers().await?)
    }

    async fn get_node_idle(&self, name: &str) -> Result<bool, CiError> {
        Ok(self.computer_idle(name).await?)
    }

    async fn node_exists(&self, name: &str) -> Result<bool, CiError> {
        Ok(self.computer_exists(name).await?)
    }

    async fn get_node_labels(&self, name: &str) -> Result<Vec<String>, CiError> {
        Ok(self.computer_labels(name).await?)
    }

    async fn get_job_label_expression(&self, job_name: &str) -> Result<Option<String>, CiError> {
        Ok(self.job_label_expression(job_name).await?)
    }

    async fn delete_node(&self, name: &str) -> Result<(), CiError> {
        self.delete_computer(name).await?;
        Ok(())
    }
}
