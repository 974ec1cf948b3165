use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail, ensure};
use serde::Deserialize;

use kiln_core::{CreationPolicy, ReconcileConfig, Schedule};
use kiln_jenkins::JenkinsConfig;
use kiln_model::Catalog;
use kiln_observe::LoggerConfig;
use kiln_openstack::OpenStackConfig;

/// Contents of the daemon's TOML configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    #[serde(default)]
    pub logging: LoggerConfig,
    pub jenkins: JenkinsConfig,
    #[serde(default)]
    pub schedule: ScheduleSection,
    #[serde(default)]
    pub reconcile: ReconcileSection,
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default)]
    pub metrics: MetricsSection,
    #[serde(default)]
    pub providers: ProvidersSection,
    /// The node type catalog, in declaration order.
    #[serde(default)]
    pub nodes: Catalog,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleSection {
    pub queue_interval_secs: u64,
    pub idle_interval_secs: u64,
    pub orphan_interval_secs: u64,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        let schedule = Schedule::default();
        Self {
            queue_interval_secs: schedule.queue_interval.as_secs(),
            idle_interval_secs: schedule.idle_interval.as_secs(),
            orphan_interval_secs: schedule.orphan_interval.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileSection {
    pub orphan_grace_secs: u64,
    /// `0` disables idle retirement.
    pub idle_timeout_secs: u64,
}

impl Default for ReconcileSection {
    fn default() -> Self {
        let config = ReconcileConfig::default();
        Self {
            orphan_grace_secs: config.orphan_grace.as_secs(),
            idle_timeout_secs: config.idle_timeout.map_or(0, |t| t.as_secs()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrySection {
    pub buffer_ratio: f64,
    pub recent_window_secs: u64,
}

impl Default for RegistrySection {
    fn default() -> Self {
        let policy = CreationPolicy::default();
        Self {
            buffer_ratio: policy.buffer_ratio,
            recent_window_secs: policy.recent_window.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsSection {
    /// Address of the `/metrics` endpoint; not served when unset.
    pub listen: Option<SocketAddr>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvidersSection {
    pub openstack: Option<OpenStackConfig>,
}

impl ProvidersSection {
    pub fn names(&self) -> Vec<&str> {
        self.openstack.iter().map(|o| o.name.as_str()).collect()
    }
}

impl DaemonConfig {
    /// Read, parse and validate the file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("config: failed to read {}", path.display()))?;
        let config = Self::parse(&raw).with_context(|| format!("config: {}", path.display()))?;
        Ok(config)
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw).context("invalid TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.nodes.is_empty(), "no [[nodes]] declared");
        self.nodes.validate()?;

        let providers = self.providers.names();
        if providers.is_empty() {
            bail!("no provider configured under [providers]");
        }
        let mut seen = HashSet::new();
        for name in &providers {
            ensure!(seen.insert(*name), "provider {name} configured twice");
        }
        for node in self.nodes.iter() {
            ensure!(
                seen.contains(node.provider.as_str()),
                "node type {} uses unknown provider {}",
                node.name,
                node.provider
            );
        }

        let ratio = self.registry.buffer_ratio;
        ensure!(
            ratio.is_finite() && ratio > 0.0,
            "registry.buffer_ratio must be a positive number, got {ratio}"
        );
        let s = &self.schedule;
        ensure!(
            s.queue_interval_secs > 0 && s.idle_interval_secs > 0 && s.orphan_interval_secs > 0,
            "schedule intervals must be at least one second"
        );
        Ok(())
    }

    pub fn schedule(&self) -> Schedule {
        Schedule {
            queue_interval: Duration::from_secs(self.schedule.queue_interval_secs),
            idle_interval: Duration::from_secs(self.schedule.idle_interval_secs),
            orphan_interval: Duration::from_secs(self.schedule.orphan_interval_secs),
        }
    }

    pub fn reconcile(&self) -> ReconcileConfig {
        let idle = self.reconcile.idle_timeout_secs;
        ReconcileConfig::default()
            .with_orphan_grace(Duration::from_secs(self.reconcile.orphan_grace_secs))
            .with_idle_timeout((idle > 0).then(|| Duration::from_secs(idle)))
    }

    pub fn creation_policy(&self) -> CreationPolicy {
        CreationPolicy {
            buffer_ratio: self.registry.buffer_ratio,
            recent_window: Duration::from_secs(self.registry.recent_window_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = include_str!("../kiln.example.toml");

    const MINIMAL: &str = r#"
        [jenkins]
        url = "https://ci"
        user = "kiln"
        token = "t"

        [providers.openstack]
        auth_url = "https://keystone/v3"
        username = "kiln"
        password = "p"
        project_name = "ci"

        [[nodes]]
        name = "trusty"
        provider = "openstack"
        labels = ["trusty"]
        script = "register {uuid}"
    "#;

    #[test]
    fn example_config_is_valid() {
        let config = DaemonConfig::parse(EXAMPLE).unwrap();
        assert_eq!(config.nodes.names().collect::<Vec<_>>(), ["centos7", "xenial-huge"]);
        assert_eq!(config.nodes.get("xenial-huge").unwrap().storage, Some(100));
        assert_eq!(config.metrics.listen, Some("127.0.0.1:9184".parse().unwrap()));
        assert_eq!(
            config.providers.openstack.as_ref().unwrap().region.as_deref(),
            Some("RegionOne")
        );
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = DaemonConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.schedule(), Schedule::default());
        assert_eq!(config.reconcile(), ReconcileConfig::default());
        assert_eq!(config.creation_policy(), CreationPolicy::default());
        assert_eq!(config.jenkins.timeout_secs, 30);
        assert!(config.metrics.listen.is_none());
    }

    #[test]
    fn zero_idle_timeout_disables_retirement() {
        let raw = format!("{MINIMAL}\n[reconcile]\nidle_timeout_secs = 0\n");
        let config = DaemonConfig::parse(&raw).unwrap();
        assert_eq!(config.reconcile().idle_timeout, None);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let raw = MINIMAL.replace(r#"provider = "openstack""#, r#"provider = "aws""#);
        let err = DaemonConfig::parse(&raw).unwrap_err();
        assert!(err.to_string().contains("unknown provider aws"));
    }

    #[test]
    fn script_without_placeholder_is_rejected() {
        let raw = MINIMAL.replace("register {uuid}", "register");
        assert!(DaemonConfig::parse(&raw).is_err());
    }

    #[test]
    fn missing_catalog_is_rejected() {
        let end = MINIMAL.find("[[nodes]]").unwrap();
        assert!(DaemonConfig::parse(&MINIMAL[..end]).is_err());
    }

    #[test]
    fn misspelled_section_is_rejected() {
        let raw = format!("{MINIMAL}\n[schedul]\nqueue_interval_secs = 5\n");
        assert!(DaemonConfig::parse(&raw).is_err());
    }
}
