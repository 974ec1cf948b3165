use serde::{Deserialize, Serialize};

/// A queue entry observed during a single provisioning pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedTask {
    /// Queue item identifier.
    pub id: u64,
    /// Human readable blockage reason; absent while the queue is still settling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why: Option<String>,
    /// Display name of the originating job.
    #[serde(default)]
    pub job_name: String,
    /// URL of the originating job.
    #[serde(default)]
    pub job_url: String,
}

impl BlockedTask {
    pub fn new(id: u64, why: Option<&str>, job_url: impl Into<String>) -> Self {
        let job_url = job_url.into();
        Self {
            id,
            why: why.map(str::to_string),
            job_name: job_from_url(&job_url).to_string(),
            job_url,
        }
    }

    /// Job name as addressed in the CI system, derived from the job URL.
    pub fn job(&self) -> &str {
        match job_from_url(&self.job_url) {
            "" => self.job_name.as_str(),
            job => job,
        }
    }
}

/// Last path segment of a job URL, ignoring a trailing slash.
pub fn job_from_url(url: &str) -> &str {
    url.trim_matches('/').rsplit('/').next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_name_from_plain_url() {
        assert_eq!(
            job_from_url("https://ci.example.com/job/jenkins-job-builder"),
            "jenkins-job-builder"
        );
        assert_eq!(
            job_from_url("https://ci.example.com/job/jenkins-job-builder/"),
            "jenkins-job-builder"
        );
    }

    #[test]
    fn job_name_from_matrix_url() {
        let url = "https://ci.example.com/job/ceph-dev-build/ARCH=x86_64,DIST=xenial,MACHINE_SIZE=huge/";
        assert_eq!(job_from_url(url), "ARCH=x86_64,DIST=xenial,MACHINE_SIZE=huge");
    }

    #[test]
    fn job_falls_back_to_display_name() {
        let task = BlockedTask {
            id: 7,
            why: None,
            job_name: "ceph-pull-requests".into(),
            job_url: String::new(),
        };
        assert_eq!(task.job(), "ceph-pull-requests");
    }
}
