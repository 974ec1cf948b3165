//! Turning blocked queue entries into node-type demand.

use std::sync::Arc;

use tracing::{debug, warn};

use kiln_model::{BlockedTask, Catalog};

use crate::error::CiError;
use crate::gateway::CiGateway;
use crate::resolve::{ReasonKind, Resolution, match_expression, resolve_kind};

/// Verdict for one queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// No reason yet, or a reason that does not describe missing capacity.
    NotStuck,
    /// Waiting on capacity of this node type.
    Needs(String),
    /// Waiting on capacity, but nothing in the catalog fits.
    Unresolved,
}

/// Resolves queue entries against the catalog, consulting the CI system where the
/// reason text alone is not enough.
#[derive(Clone)]
pub struct QueueClassifier {
    catalog: Arc<Catalog>,
    ci: Arc<dyn CiGateway>,
}

impl QueueClassifier {
    pub fn new(catalog: Arc<Catalog>, ci: Arc<dyn CiGateway>) -> Self {
        Self { catalog, ci }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Classify one queue entry.
    ///
    /// Order of strategies: the reason text, labels of the agents it names, the job's
    /// declared label expression, the job's matrix name.
    pub async fn classify(&self, task: &BlockedTask) -> Classification {
        let Some(why) = task.why.as_deref() else {
            return Classification::NotStuck;
        };
        let kind = ReasonKind::classify(why);
        if kind == ReasonKind::Unrecognized {
            return Classification::NotStuck;
        }

        if let Some(key) = self.from_reason(kind, why).await {
            return Classification::Needs(key);
        }
        if let Some(key) = self.from_job(task.job()).await {
            return Classification::Needs(key);
        }

        warn!(task = task.id, kind = kind.as_str(), why, "unable to match a node type");
        Classification::Unresolved
    }

    async fn from_reason(&self, kind: ReasonKind, why: &str) -> Option<String> {
        match resolve_kind(kind, why, &self.catalog) {
            Resolution::Matched(key) => Some(key),
            Resolution::Unmatched => None,
            Resolution::LookupLabels(names) => {
                for name in names {
                    debug!(agent = %name, "matching by agent labels");
                    match self.ci.get_node_labels(&name).await {
                        Ok(labels) => {
                            if let Some(key) = self.catalog.match_labels(&labels) {
                                return Some(key.to_string());
                            }
                        }
                        Err(e) => warn!(agent = %name, error = %e, "failed to fetch agent labels"),
                    }
                }
                None
            }
        }
    }

    async fn from_job(&self, job: &str) -> Option<String> {
        if job.is_empty() {
            return None;
        }
        match self.ci.get_job_label_expression(job).await {
            Ok(Some(expr)) => match_expression(&expr, &self.catalog).map(str::to_string),
            Ok(None) => None,
            Err(CiError::NotFound(_)) => {
                debug!(job, "job configuration unavailable, matching by matrix name");
                match_matrix_job_name(job, &self.catalog).map(str::to_string)
            }
            Err(e) => {
                warn!(job, error = %e, "failed to fetch job configuration");
                None
            }
        }
    }
}

/// Label values of a matrix job name (`KEY=VALUE,KEY=VALUE`), deduplicated in order.
///
/// Segments without `=` are ignored.
pub fn matrix_labels(job_name: &str) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for pair in job_name.split(',') {
        let Some((_, value)) = pair.split_once('=') else {
            continue;
        };
        let value = value.trim();
        if !value.is_empty() && !labels.iter().any(|l| l == value) {
            labels.push(value.to_string());
        }
    }
    labels
}

/// Node type carrying every label of a matrix job name.
pub fn match_matrix_job_name<'a>(job_name: &str, catalog: &'a Catalog) -> Option<&'a str> {
    catalog.match_labels(&matrix_labels(job_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCi;
    use kiln_model::NodeType;

    fn wheezy() -> Arc<Catalog> {
        Arc::new(Catalog::new(vec![
            NodeType::new("wheezy").with_labels(["amd64", "debian"]),
        ]))
    }

    fn task(why: Option<&str>, url: &str) -> BlockedTask {
        BlockedTask::new(1, why, url)
    }

    #[test]
    fn matrix_names() {
        let cat = wheezy();
        assert_eq!(match_matrix_job_name("ARCH=amd64,DIST=debian", &cat), Some("wheezy"));
        assert_eq!(match_matrix_job_name("DIST=xenial", &cat), None);
        assert_eq!(match_matrix_job_name("DIST=debian", &cat), Some("wheezy"));
        assert_eq!(
            matrix_labels("DIST=debian,AVAILABLE_DIST=debian"),
            vec!["debian".to_string()]
        );
        assert_eq!(match_matrix_job_name("DIST=debian,AVAILABLE_DIST=debian", &cat), Some("wheezy"));
        assert_eq!(match_matrix_job_name("plain-job", &cat), None);
    }

    #[tokio::test]
    async fn missing_reason_is_not_stuck() {
        let ci = Arc::new(FakeCi::default());
        let classifier = QueueClassifier::new(wheezy(), ci.clone());
        let verdict = classifier.classify(&task(None, "https://ci/job/build/")).await;
        assert_eq!(verdict, Classification::NotStuck);
        assert_eq!(
            classifier.classify(&task(Some("Running test"), "https://ci/job/build/")).await,
            Classification::NotStuck
        );
        assert!(ci.calls().is_empty());
    }

    #[tokio::test]
    async fn resolves_from_reason() {
        let classifier = QueueClassifier::new(wheezy(), Arc::new(FakeCi::default()));
        let t = task(
            Some("Waiting for next available executor on \u{2018}amd64\u{2019}"),
            "https://ci/job/build/",
        );
        assert_eq!(classifier.classify(&t).await, Classification::Needs("wheezy".into()));
    }

    #[tokio::test]
    async fn resolves_dynamically_labelled_agent() {
        let ci = FakeCi::default();
        ci.set_labels("custom-box", &["debian", "amd64"]);
        let classifier = QueueClassifier::new(wheezy(), Arc::new(ci));
        let t = task(
            Some("Waiting for next available executor on custom-box"),
            "https://ci/job/build/",
        );
        assert_eq!(classifier.classify(&t).await, Classification::Needs("wheezy".into()));
    }

    #[tokio::test]
    async fn agent_label_missing_from_catalog_is_unresolved() {
        let ci = FakeCi::default();
        ci.set_labels("custom-box", &["debian", "amd64", "extra"]);
        let classifier = QueueClassifier::new(wheezy(), Arc::new(ci));
        let t = task(
            Some("Waiting for next available executor on custom-box"),
            "https://ci/job/build/",
        );
        assert_eq!(classifier.classify(&t).await, Classification::Unresolved);
    }

    #[tokio::test]
    async fn falls_back_to_job_expression() {
        let ci = FakeCi::default();
        ci.set_job_expression("ceph-pull-requests", Some("amd64 && debian"));
        let classifier = QueueClassifier::new(wheezy(), Arc::new(ci));
        let t = task(
            Some("Waiting for next available executor on solaris"),
            "https://ci/job/ceph-pull-requests/",
        );
        assert_eq!(classifier.classify(&t).await, Classification::Needs("wheezy".into()));
    }

    #[tokio::test]
    async fn job_without_expression_is_unresolved() {
        let ci = FakeCi::default();
        ci.set_job_expression("ceph-pull-requests", None);
        let classifier = QueueClassifier::new(wheezy(), Arc::new(ci));
        let t = task(
            Some("Waiting for next available executor on solaris"),
            "https://ci/job/ceph-pull-requests/",
        );
        assert_eq!(classifier.classify(&t).await, Classification::Unresolved);
    }

    #[tokio::test]
    async fn missing_job_config_falls_back_to_matrix_name() {
        let classifier = QueueClassifier::new(wheezy(), Arc::new(FakeCi::default()));
        let t = task(
            Some("Waiting for next available executor on solaris"),
            "https://ci/job/ceph-dev-build/ARCH=amd64,DIST=debian/",
        );
        assert_eq!(classifier.classify(&t).await, Classification::Needs("wheezy".into()));
    }

    #[tokio::test]
    async fn job_config_transport_error_does_not_use_matrix_name() {
        let ci = FakeCi::default();
        ci.fail_job_expression(CiError::Transport("timeout".into()));
        let classifier = QueueClassifier::new(wheezy(), Arc::new(ci));
        let t = task(
            Some("Waiting for next available executor on solaris"),
            "https://ci/job/ceph-dev-build/ARCH=amd64,DIST=debian/",
        );
        assert_eq!(classifier.classify(&t).await, Classification::Unresolved);
    }
}
