//! Naming convention for agents launched by this controller.
//!
//! A launched node is called `<node-type>__<uuid>` both at the provider and in the CI system.
//! CI agents without the separator were added by hand and are never touched.

/// Separator between the node type and the node identifier.
pub const NAME_SEPARATOR: &str = "__";

/// Compose the agent name for a freshly launched node.
pub fn agent_name(node_type: &str, id: &str) -> String {
    format!("{node_type}{NAME_SEPARATOR}{id}")
}

/// Returns `true` if the name follows the controller's multi-part convention.
#[inline]
pub fn is_managed_name(name: &str) -> bool {
    name.contains(NAME_SEPARATOR)
}

/// Extract the node identifier (last segment) from a managed agent name.
pub fn id_from_name(name: &str) -> Option<&str> {
    if !is_managed_name(name) {
        return None;
    }
    name.rsplit(NAME_SEPARATOR).next().filter(|id| !id.is_empty())
}

/// Drop every `__`-delimited suffix, e.g. `host__10.0.0.1__huge` -> `host`.
#[inline]
pub fn strip_suffix(name: &str) -> &str {
    name.split(NAME_SEPARATOR).next().unwrap_or(name)
}
