use serde::{Deserialize, Serialize};

/// Token in a boot script that is replaced with the node identifier at launch.
pub const SCRIPT_UUID_PLACEHOLDER: &str = "{uuid}";

/// Operator-defined template for a kind of build node.
///
/// Loaded once from configuration and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeType {
    /// Unique catalog key, also the prefix of every launched node's name.
    pub name: String,
    /// Provider that launches nodes of this type.
    pub provider: String,
    /// Capabilities advertised by nodes of this type.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Provider image to boot from.
    #[serde(default)]
    pub image_name: String,
    /// Provider size (flavor) name.
    #[serde(default)]
    pub size: String,
    /// SSH key pair registered at the provider.
    #[serde(default)]
    pub keyname: String,
    /// Extra block storage in GB, attached after boot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<u32>,
    /// Boot script passed as user data; must contain [`SCRIPT_UUID_PLACEHOLDER`].
    #[serde(default)]
    pub script: String,
}

impl NodeType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: String::new(),
            labels: Vec::new(),
            image_name: String::new(),
            size: String::new(),
            keyname: String::new(),
            storage: None,
            script: String::new(),
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = script.into();
        self
    }

    #[inline]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Returns `true` if every given label is advertised by this type.
    pub fn has_labels<S: AsRef<str>>(&self, labels: &[S]) -> bool {
        labels.iter().all(|l| self.has_label(l.as_ref()))
    }

    /// Boot script with the node identifier filled in.
    pub fn render_script(&self, id: &str) -> String {
        self.script.replace(SCRIPT_UUID_PLACEHOLDER, id)
    }
}
