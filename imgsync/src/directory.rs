//! File-backed host directory: an ordered list of host records stored as
//! JSON. The core never persists credentials; this is the CLI's concern.

use anyhow::Context;
use endpoint::Host;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HostRecord {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    endpoint::DOCKER_CLI.to_string()
}

impl HostRecord {
    pub fn into_host(self) -> Host {
        Host::new(
            self.name,
            self.address,
            self.username,
            self.password,
            self.kind,
        )
    }
}

/// Default directory location under the user's config directory.
pub fn default_path() -> std::path::PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("imgsync")
        .join("hosts.json")
}

/// Load the ordered host list from a JSON file.
pub fn load_hosts(path: &std::path::Path) -> anyhow::Result<Vec<HostRecord>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading host directory {:?}", &path))?;
    serde_json::from_str(&data)
        .with_context(|| format!("host directory {:?} is not valid JSON", &path))
}

/// Write the host list back, creating parent directories as needed.
pub fn save_hosts(path: &std::path::Path, hosts: &[HostRecord]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {:?}", &parent))?;
    }
    let data = serde_json::to_string_pretty(hosts).context("failed encoding host directory")?;
    std::fs::write(path, data)
        .with_context(|| format!("failed writing host directory {:?}", &path))
}

/// Resolve a selector to a list position: either a `#index`, or a host name
/// where duplicate names resolve to the first match.
pub fn host_index(hosts: &[HostRecord], selector: &str) -> anyhow::Result<usize> {
    if let Some(index) = selector.strip_prefix('#') {
        let index: usize = index
            .parse()
            .with_context(|| format!("invalid host index {selector:?}"))?;
        anyhow::ensure!(index < hosts.len(), "no host at index {index}");
        return Ok(index);
    }
    hosts
        .iter()
        .position(|host| host.name == selector)
        .with_context(|| format!("no host named {selector:?}"))
}

/// Find a host by name or `#index` selector.
pub fn find_host<'a>(hosts: &'a [HostRecord], selector: &str) -> anyhow::Result<&'a HostRecord> {
    Ok(&hosts[host_index(hosts, selector)?])
}
