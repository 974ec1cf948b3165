use serde::Deserialize;

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct JenkinsConfig {
    /// Base URL of the Jenkins controller, e.g. `https://jenkins.example.com`.
    pub url: String,
    pub user: String,
    /// API token of `user`.
    pub token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl JenkinsConfig {
    pub fn new(url: impl Into<String>, user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: user.into(),
            token: token.into(),
            timeout_secs: default_timeout_secs(),
        }
    }
}
