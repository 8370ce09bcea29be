const GUARDIA_NODE: &str = "GUARDIA_NODE";

/// Node id taken from the environment, overriding the configuration
pub fn get_node_override() -> Option<String> {
    let node_from_env = std::env::var(GUARDIA_NODE);
    node_from_env.ok().filter(|node| !node.trim().is_empty())
}

const HOSTNAME: &str = "HOSTNAME";

/// Node id used when neither configuration nor environment name one
pub fn get_default_node_id(resource: &str) -> String {
    let host_from_env = std::env::var(HOSTNAME);
    host_from_env.map_or_else(
        |_| format!("{resource}-{}", std::process::id()),
        |host| format!("{resource}@{host}"),
    )
}
