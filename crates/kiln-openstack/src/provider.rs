use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Method, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use kiln_core::{ProviderError, ProviderGateway};
use kiln_model::{LaunchedNode, NodeType, agent_name};

use crate::auth::{Authenticator, Session, join};
use crate::config::OpenStackConfig;
use crate::errors::OpenStackError;

/// Device the extra volume of a node is attached as.
const VOLUME_DEVICE: &str = "/dev/vdb";

#[derive(Debug, Clone, Deserialize)]
struct Server {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct Servers {
    #[serde(default)]
    servers: Vec<Server>,
}

#[derive(Deserialize)]
struct ServerEnvelope {
    server: Server,
}

#[derive(Deserialize)]
struct CreatedServer {
    server: CreatedServerId,
}

#[derive(Deserialize)]
struct CreatedServerId {
    id: String,
}

#[derive(Deserialize)]
struct Named {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct Flavors {
    #[serde(default)]
    flavors: Vec<Named>,
}

#[derive(Deserialize)]
struct Images {
    #[serde(default)]
    images: Vec<Named>,
}

#[derive(Debug, Clone, Deserialize)]
struct Volume {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct Volumes {
    #[serde(default)]
    volumes: Vec<Volume>,
}

#[derive(Deserialize)]
struct VolumeEnvelope {
    volume: Volume,
}

/// Launches and destroys build nodes in an OpenStack project.
pub struct OpenStackProvider {
    name: String,
    http: reqwest::Client,
    auth: Authenticator,
    config: OpenStackConfig,
}

impl OpenStackProvider {
    pub fn new(config: OpenStackConfig) -> Result<Self, OpenStackError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let auth = Authenticator::new(http.clone(), config.clone())?;
        Ok(Self {
            name: config.name.clone(),
            http,
            auth,
            config,
        })
    }

    /// Authenticated request; `None` on 404.
    async fn call(
        &self,
        session: &Session,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Option<Response>, OpenStackError> {
        debug!(%method, %url, "openstack: request");
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header("X-Auth-Token", &session.token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.auth.invalidate();
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OpenStackError::Status {
                method: method.to_string(),
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(Some(response))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        session: &Session,
        url: Url,
    ) -> Result<Option<T>, OpenStackError> {
        match self.call(session, Method::GET, url, None).await? {
            Some(response) => Ok(Some(response.json().await?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, session: &Session, url: Url) -> Result<bool, OpenStackError> {
        Ok(self.call(session, Method::DELETE, url, None).await?.is_some())
    }

    async fn list_servers(
        &self,
        session: &Session,
        query: Option<&str>,
    ) -> Result<Vec<Server>, OpenStackError> {
        let mut url = join(&session.compute, &["servers", "detail"])?;
        url.set_query(query);
        let servers: Option<Servers> = self.get(session, url).await?;
        Ok(servers.map(|s| s.servers).unwrap_or_default())
    }

    async fn find_server(&self, session: &Session, name: &str) -> Result<Option<Server>, OpenStackError> {
        let mut url = join(&session.compute, &["servers", "detail"])?;
        url.query_pairs_mut().append_pair("name", &format!("^{name}$"));
        let servers: Option<Servers> = self.get(session, url).await?;
        Ok(servers
            .map(|s| s.servers)
            .unwrap_or_default()
            .into_iter()
            .find(|s| s.name == name))
    }

    async fn flavor_id(&self, session: &Session, size: &str) -> Result<String, OpenStackError> {
        let url = join(&session.compute, &["flavors"])?;
        let flavors: Option<Flavors> = self.get(session, url).await?;
        flavors
            .map(|f| f.flavors)
            .unwrap_or_default()
            .into_iter()
            .find(|f| f.name == size)
            .map(|f| f.id)
            .ok_or_else(|| {
                OpenStackError::ConfigMismatch(format!("provider has no size named '{size}'"))
            })
    }

    async fn image_id(&self, session: &Session, image: &str) -> Result<String, OpenStackError> {
        let mut url = join(session.image()?, &["v2", "images"])?;
        url.query_pairs_mut().append_pair("name", image);
        let images: Option<Images> = self.get(session, url).await?;
        images
            .map(|i| i.images)
            .unwrap_or_default()
            .into_iter()
            .find(|i| i.name == image)
            .map(|i| i.id)
            .ok_or_else(|| {
                OpenStackError::ConfigMismatch(format!("provider has no image named '{image}'"))
            })
    }

    async fn find_volume(&self, session: &Session, name: &str) -> Result<Option<Volume>, OpenStackError> {
        let mut url = join(session.volume()?, &["volumes", "detail"])?;
        url.query_pairs_mut().append_pair("name", name);
        let volumes: Option<Volumes> = self.get(session, url).await?;
        Ok(volumes
            .map(|v| v.volumes)
            .unwrap_or_default()
            .into_iter()
            .find(|v| v.name.as_deref() == Some(name)))
    }

    async fn launch(
        &self,
        session: &Session,
        node_type: &NodeType,
        image_id: &str,
        flavor_id: &str,
    ) -> Result<LaunchedNode, OpenStackError> {
        let identifier = Uuid::new_v4().to_string();
        let name = agent_name(&node_type.name, &identifier);
        let user_data = STANDARD.encode(node_type.render_script(&identifier));

        let mut server = json!({
            "name": name,
            "imageRef": image_id,
            "flavorRef": flavor_id,
            "user_data": user_data,
        });
        if !node_type.keyname.is_empty() {
            server["key_name"] = json!(node_type.keyname);
        }

        let url = join(&session.compute, &["servers"])?;
        let response = self
            .call(session, Method::POST, url, Some(&json!({ "server": server })))
            .await?
            .ok_or_else(|| OpenStackError::NotFound("servers endpoint".into()))?;
        let created: CreatedServer = response.json().await?;
        info!(node = %name, server = %created.server.id, "openstack: server created");

        if let Some(size) = node_type.storage {
            if let Err(e) = self.add_storage(session, &name, &created.server.id, size).await {
                error!(node = %name, error = %e, "openstack: failed to attach storage");
            }
        }

        Ok(LaunchedNode {
            identifier,
            cloud_name: name,
            provider_id: Some(created.server.id),
        })
    }

    /// Create a volume named after the node and attach it once both are ready.
    async fn add_storage(
        &self,
        session: &Session,
        name: &str,
        server_id: &str,
        size: u32,
    ) -> Result<(), OpenStackError> {
        info!(node = name, size_gb = size, "openstack: creating volume");
        let url = join(session.volume()?, &["volumes"])?;
        let body = json!({ "volume": { "size": size, "name": name } });
        let response = self
            .call(session, Method::POST, url, Some(&body))
            .await?
            .ok_or_else(|| OpenStackError::NotFound("volumes endpoint".into()))?;
        let created: VolumeEnvelope = response.json().await?;

        self.wait_for_volume(session, &created.volume).await?;
        self.wait_for_server(session, name, server_id).await?;

        let url = join(&session.compute, &["servers", server_id, "os-volume_attachments"])?;
        let body = json!({
            "volumeAttachment": { "volumeId": created.volume.id, "device": VOLUME_DEVICE }
        });
        self.call(session, Method::POST, url, Some(&body))
            .await?
            .ok_or_else(|| OpenStackError::NotFound(format!("server {server_id}")))?;
        info!(node = name, device = VOLUME_DEVICE, "openstack: volume attached");
        Ok(())
    }

    /// Poll while the volume is still being created; give up quietly after the
    /// configured number of attempts.
    async fn wait_for_volume(&self, session: &Session, volume: &Volume) -> Result<(), OpenStackError> {
        let interval = Duration::from_secs(self.config.volume_wait_interval_secs);
        let url = join(session.volume()?, &["volumes", &volume.id])?;
        let mut status = volume.status.clone();
        let mut attempts = 0;

        while status == "creating" && attempts < self.config.volume_wait_attempts {
            tokio::time::sleep(interval).await;
            attempts += 1;
            match self.get::<VolumeEnvelope>(session, url.clone()).await? {
                Some(current) => status = current.volume.status,
                None => {
                    warn!(volume = %volume.id, "openstack: volume disappeared while waiting");
                    return Ok(());
                }
            }
            debug!(volume = %volume.id, %status, attempts, "openstack: waiting for volume");
        }
        if status != "available" {
            info!(volume = %volume.id, %status, "openstack: volume not available, continuing anyway");
        }
        Ok(())
    }

    async fn wait_for_server(&self, session: &Session, name: &str, server_id: &str) -> Result<(), OpenStackError> {
        let interval = Duration::from_secs(self.config.active_wait_interval_secs);
        let url = join(&session.compute, &["servers", server_id])?;
        for _ in 0..self.config.active_wait_attempts {
            let server = self
                .get::<ServerEnvelope>(session, url.clone())
                .await?
                .ok_or_else(|| OpenStackError::NotFound(name.to_string()))?
                .server;
            match server.status.as_str() {
                "ACTIVE" => return Ok(()),
                "ERROR" => {
                    return Err(OpenStackError::Status {
                        method: "GET".into(),
                        url: url.to_string(),
                        status: 500,
                        body: format!("server {name} entered ERROR"),
                    });
                }
                _ => tokio::time::sleep(interval).await,
            }
        }
        warn!(node = name, "openstack: server not active yet, continuing anyway");
        Ok(())
    }

    async fn remove_volume(&self, session: &Session, name: &str) {
        let volume = match self.find_volume(session, name).await {
            Ok(Some(volume)) => volume,
            Ok(None) => return,
            Err(e) => {
                warn!(node = name, error = %e, "openstack: failed to look up volume");
                return;
            }
        };
        info!(node = name, volume = %volume.id, "openstack: destroying volume");
        let deleted = match session.volume().and_then(|base| join(base, &["volumes", &volume.id])) {
            Ok(url) => self.delete(session, url).await,
            Err(e) => Err(e),
        };
        if let Err(e) = deleted {
            warn!(node = name, error = %e, "openstack: failed to destroy volume");
        }
    }

    pub async fn create(&self, node_type: &NodeType, count: u32) -> Result<Vec<LaunchedNode>, OpenStackError> {
        let session = self.auth.session().await?;
        let flavor_id = self.flavor_id(&session, &node_type.size).await?;
        let image_id = self.image_id(&session, &node_type.image_name).await?;

        let mut launched = Vec::new();
        let mut last_error = None;
        for _ in 0..count {
            match self.launch(&session, node_type, &image_id, &flavor_id).await {
                Ok(node) => launched.push(node),
                Err(e) => {
                    error!(node_type = %node_type.name, error = %e, "openstack: failed to create server");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if launched.is_empty() => Err(e),
            _ => Ok(launched),
        }
    }

    pub async fn destroy(&self, name: &str) -> Result<(), OpenStackError> {
        let session = self.auth.session().await?;
        let server = self
            .find_server(&session, name)
            .await?
            .ok_or_else(|| OpenStackError::NotFound(name.to_string()))?;

        info!(node = name, server = %server.id, "openstack: destroying server");
        let url = join(&session.compute, &["servers", &server.id])?;
        if !self.delete(&session, url).await? {
            return Err(OpenStackError::NotFound(name.to_string()));
        }
        if session.volume.is_some() {
            self.remove_volume(&session, name).await;
        }
        Ok(())
    }

    pub async fn purge(&self) -> Result<usize, OpenStackError> {
        let session = self.auth.session().await?;
        debug!("openstack: looking for servers in error state");
        let errored: Vec<Server> = self
            .list_servers(&session, Some("status=ERROR"))
            .await?
            .into_iter()
            .filter(|s| s.status.eq_ignore_ascii_case("error"))
            .collect();

        let mut destroyed = 0;
        for server in errored {
            info!(node = %server.name, server = %server.id, "openstack: destroying server in error state");
            let url = join(&session.compute, &["servers", &server.id])?;
            match self.delete(&session, url).await {
                Ok(_) => destroyed += 1,
                Err(e) => warn!(server = %server.id, error = %e, "openstack: failed to destroy server"),
            }
        }
        if destroyed > 0 {
            warn!(destroyed, "openstack: servers in error state destroyed");
        }
        Ok(destroyed)
    }
}

#[async_trait]
impl ProviderGateway for OpenStackProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_node(&self, node_type: &NodeType, count: u32) -> Result<Vec<LaunchedNode>, ProviderError> {
        Ok(self.create(node_type, count).await?)
    }

    async fn destroy_node(&self, name: &str) -> Result<(), ProviderError> {
        Ok(self.destroy(name).await?)
    }

    async fn purge_error_state_nodes(&self) -> Result<usize, ProviderError> {
        Ok(self.purge().await?)
    }
}
