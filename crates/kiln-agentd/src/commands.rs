use kiln_core::{ReasonKind, Resolution, is_stuck, resolve};
use kiln_model::Catalog;

/// Human readable account of what a blocked reason resolves to.
pub fn describe_resolution(reason: &str, catalog: &Catalog) -> String {
    if !is_stuck(reason) {
        return "not stuck: the task waits for something other than an agent".to_string();
    }
    let kind = ReasonKind::classify(reason);
    match resolve(reason, catalog) {
        Resolution::Matched(key) => format!("{key} ({})", kind.as_str()),
        Resolution::LookupLabels(agents) => format!(
            "needs the labels of agent(s) {} from Jenkins ({})",
            agents.join(", "),
            kind.as_str()
        ),
        Resolution::Unmatched => format!("unresolved ({})", kind.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_model::NodeType;

    fn catalog() -> Catalog {
        Catalog::new(vec![
            NodeType::new("centos7").with_labels(["centos7", "amd64"]),
            NodeType::new("xenial").with_labels(["xenial", "amd64"]),
        ])
    }

    #[test]
    fn describes_each_outcome() {
        let catalog = catalog();
        assert!(
            describe_resolution("Waiting for next available executor on xenial", &catalog)
                .starts_with("xenial (")
        );
        assert_eq!(
            describe_resolution("Waiting for next available executor on builder-7", &catalog),
            "needs the labels of agent(s) builder-7 from Jenkins (busy)"
        );
        assert_eq!(
            describe_resolution("There are no nodes with the label arm64", &catalog),
            "unresolved (no-nodes-with-label)"
        );
        assert!(describe_resolution("Build #12 is already in progress", &catalog).starts_with("not stuck"));
    }
}
