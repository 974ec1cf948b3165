use serde::Deserialize;

fn default_name() -> String {
    "openstack".to_string()
}

fn default_domain() -> String {
    "Default".to_string()
}

fn default_interface() -> String {
    "public".to_string()
}

fn default_volume_wait_attempts() -> u32 {
    10
}

fn default_volume_wait_interval_secs() -> u64 {
    3
}

fn default_active_wait_attempts() -> u32 {
    60
}

fn default_active_wait_interval_secs() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    280
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenStackConfig {
    /// Provider name node types refer to.
    #[serde(default = "default_name")]
    pub name: String,
    /// Keystone v3 endpoint, e.g. `https://keystone.example.com:5000/v3`.
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub project_name: String,
    #[serde(default = "default_domain")]
    pub user_domain_name: String,
    #[serde(default = "default_domain")]
    pub project_domain_name: String,
    /// Region to pick endpoints from; any region when unset.
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_interface")]
    pub interface: String,

    #[serde(default = "default_volume_wait_attempts")]
    pub volume_wait_attempts: u32,
    #[serde(default = "default_volume_wait_interval_secs")]
    pub volume_wait_interval_secs: u64,
    #[serde(default = "default_active_wait_attempts")]
    pub active_wait_attempts: u32,
    #[serde(default = "default_active_wait_interval_secs")]
    pub active_wait_interval_secs: u64,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl OpenStackConfig {
    pub fn new(
        auth_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        project_name: impl Into<String>,
    ) -> Self {
        Self {
            name: default_name(),
            auth_url: auth_url.into(),
            username: username.into(),
            password: password.into(),
            project_name: project_name.into(),
            user_domain_name: default_domain(),
            project_domain_name: default_domain(),
            region: None,
            interface: default_interface(),
            volume_wait_attempts: default_volume_wait_attempts(),
            volume_wait_interval_secs: default_volume_wait_interval_secs(),
            active_wait_attempts: default_active_wait_attempts(),
            active_wait_interval_secs: default_active_wait_interval_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}
