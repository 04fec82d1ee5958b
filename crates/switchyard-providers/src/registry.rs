//! Provider configuration discovery and lifecycle bookkeeping.

use directories::BaseDirs;
use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use switchyard_config::{DEFAULT_CONFIG_DIR, ProvidersConfig, user_config_dir};
use switchyard_protocol::{ProviderDescriptor, ProviderState};

const PROVIDER_CONFIG_FILE: &str = "mcp.json";

/// Where `discover` looks for provider definitions.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// Checked before anything else.
    pub override_path: Option<PathBuf>,
    pub search_paths: Vec<PathBuf>,
    /// Directory used for `./mcp.json` and `./.switchyard/mcp.json`.
    pub cwd: PathBuf,
    /// Also consider the per-user locations.
    pub include_user_paths: bool,
}

impl DiscoveryOptions {
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            override_path: None,
            search_paths: Vec::new(),
            cwd: cwd.as_ref().to_path_buf(),
            include_user_paths: true,
        }
    }

    pub fn from_config(config: &ProvidersConfig, cwd: impl AsRef<Path>) -> Self {
        let cwd = cwd.as_ref();
        let resolve = |raw: &str| {
            let path = PathBuf::from(raw);
            if path.is_absolute() { path } else { cwd.join(path) }
        };
        Self {
            override_path: config.config_path.as_deref().map(resolve),
            search_paths: config.search_paths.iter().map(|raw| resolve(raw.as_str())).collect(),
            ..Self::new(cwd)
        }
    }

    pub fn with_override(mut self, path: impl AsRef<Path>) -> Self {
        self.override_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Ordered candidate files.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        candidates.extend(self.override_path.clone());
        candidates.extend(self.search_paths.iter().cloned());
        candidates.push(self.cwd.join(PROVIDER_CONFIG_FILE));
        candidates.push(self.cwd.join(DEFAULT_CONFIG_DIR).join(PROVIDER_CONFIG_FILE));
        if self.include_user_paths {
            if let Some(dir) = user_config_dir() {
                candidates.push(dir.join(PROVIDER_CONFIG_FILE));
            }
            if let Some(dirs) = BaseDirs::new() {
                candidates.push(dirs.config_dir().join("switchyard").join(PROVIDER_CONFIG_FILE));
            }
        }
        candidates
    }
}

enum Source {
    Files(DiscoveryOptions),
    Fixed(Vec<ProviderDescriptor>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderConfigFile {
    mcp_servers: BTreeMap<String, ProviderEntry>,
}

#[derive(Debug, Deserialize)]
struct ProviderEntry {
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    disabled: bool,
}

/// Parse a provider config document. `None` when the contents are not a
/// provider config at all; disabled or command-less entries are skipped.
pub fn parse_provider_config(contents: &str) -> Option<Vec<ProviderDescriptor>> {
    let value: Value = json5::from_str(contents).ok()?;
    let file: ProviderConfigFile = serde_json::from_value(value).ok()?;
    let mut descriptors = Vec::new();
    for (name, entry) in file.mcp_servers {
        if entry.disabled {
            debug!("provider disabled in config (name={})", name);
            continue;
        }
        let Some(command) = entry.command.filter(|command| !command.trim().is_empty()) else {
            warn!("provider entry without command skipped (name={})", name);
            continue;
        };
        descriptors.push(ProviderDescriptor {
            name,
            command,
            args: entry.args,
            env: entry.env,
        });
    }
    descriptors.sort_by(|a, b| a.name.cmp(&b.name));
    Some(descriptors)
}

/// Counts of tracked providers per lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RegistryStatus {
    pub discovered: usize,
    pub connecting: usize,
    pub connected: usize,
    pub errored: usize,
}

#[derive(Debug, Clone)]
struct Tracked {
    state: ProviderState,
    last_error: Option<String>,
}

/// Known providers and their last reported state.
pub struct ProviderRegistry {
    source: Source,
    tracked: RwLock<HashMap<String, Tracked>>,
}

impl ProviderRegistry {
    pub fn new(options: DiscoveryOptions) -> Self {
        Self {
            source: Source::Files(options),
            tracked: RwLock::new(HashMap::new()),
        }
    }

    /// Registry over a fixed descriptor list; no files are read.
    pub fn from_descriptors(mut descriptors: Vec<ProviderDescriptor>) -> Self {
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors.dedup_by(|a, b| a.name == b.name);
        Self {
            source: Source::Fixed(descriptors),
            tracked: RwLock::new(HashMap::new()),
        }
    }

    /// Read descriptors from the first existing, parseable candidate.
    /// Never fails; no usable configuration means no providers.
    pub fn discover(&self) -> Vec<ProviderDescriptor> {
        let descriptors = match &self.source {
            Source::Fixed(descriptors) => descriptors.clone(),
            Source::Files(options) => discover_files(options),
        };
        let mut tracked = self.tracked.write();
        for descriptor in &descriptors {
            tracked
                .entry(descriptor.name.clone())
                .or_insert_with(|| Tracked {
                    state: ProviderState::Discovered,
                    last_error: None,
                });
        }
        descriptors
    }

    /// Record a state change. Unknown names are ignored.
    pub fn update_status(&self, name: &str, state: ProviderState, error: Option<String>) {
        let mut tracked = self.tracked.write();
        let Some(entry) = tracked.get_mut(name) else {
            debug!("status update for unknown provider ignored (name={})", name);
            return;
        };
        entry.state = state;
        if error.is_some() || state != ProviderState::Errored {
            entry.last_error = error;
        }
    }

    pub fn state(&self, name: &str) -> Option<ProviderState> {
        self.tracked.read().get(name).map(|entry| entry.state)
    }

    pub fn last_error(&self, name: &str) -> Option<String> {
        self.tracked
            .read()
            .get(name)
            .and_then(|entry| entry.last_error.clone())
    }

    pub fn status(&self) -> RegistryStatus {
        let mut status = RegistryStatus::default();
        for entry in self.tracked.read().values() {
            match entry.state {
                ProviderState::Discovered => status.discovered += 1,
                ProviderState::Connecting => status.connecting += 1,
                ProviderState::Connected => status.connected += 1,
                ProviderState::Errored => status.errored += 1,
            }
        }
        status
    }
}

fn discover_files(options: &DiscoveryOptions) -> Vec<ProviderDescriptor> {
    for candidate in options.candidates() {
        if !candidate.is_file() {
            continue;
        }
        let contents = match fs::read_to_string(&candidate) {
            Ok(contents) => contents,
            Err(err) => {
                warn!(
                    "provider config unreadable (path={}, err={})",
                    candidate.display(),
                    err
                );
                continue;
            }
        };
        match parse_provider_config(&contents) {
            Some(descriptors) => {
                info!(
                    "provider config loaded (path={}, providers={})",
                    candidate.display(),
                    descriptors.len()
                );
                return descriptors;
            }
            None => warn!("provider config malformed (path={})", candidate.display()),
        }
    }
    info!("no provider config found");
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn isolated(cwd: &Path) -> DiscoveryOptions {
        DiscoveryOptions {
            include_user_paths: false,
            ..DiscoveryOptions::new(cwd)
        }
    }

    #[test]
    fn parses_sorted_descriptors_and_skips_disabled() {
        let descriptors = parse_provider_config(
            r#"{
                "mcpServers": {
                    "zeta": { "command": "zeta-server", "args": ["--stdio"] },
                    "alpha": { "command": "alpha", "env": { "TOKEN": "x" } },
                    "off": { "command": "off", "disabled": true },
                    "broken": { "args": [] }
                }
            }"#,
        )
        .expect("parse");
        let names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(descriptors[0].env.get("TOKEN").map(String::as_str), Some("x"));
        assert_eq!(descriptors[1].args, vec!["--stdio".to_string()]);
    }

    #[test]
    fn malformed_contents_are_not_a_config() {
        assert_eq!(parse_provider_config("{ nope").is_none(), true);
        assert_eq!(parse_provider_config(r#"{ "servers": {} }"#).is_none(), true);
    }

    #[test]
    fn missing_configuration_yields_no_providers() {
        let temp = TempDir::new().expect("tmp");
        let registry = ProviderRegistry::new(isolated(temp.path()));
        assert_eq!(registry.discover().is_empty(), true);
        assert_eq!(registry.status(), RegistryStatus::default());
    }

    #[test]
    fn first_parseable_candidate_wins() {
        let temp = TempDir::new().expect("tmp");
        let broken = temp.path().join("broken.json");
        fs::write(&broken, "not json").expect("write");
        fs::create_dir_all(temp.path().join(".switchyard")).expect("dir");
        fs::write(
            temp.path().join(".switchyard").join("mcp.json"),
            r#"{ "mcpServers": { "nested": { "command": "n" } } }"#,
        )
        .expect("write");
        fs::write(
            temp.path().join("mcp.json"),
            r#"{ "mcpServers": { "local": { "command": "l" } } }"#,
        )
        .expect("write");

        let registry = ProviderRegistry::new(isolated(temp.path()).with_override(&broken));
        let names: Vec<String> = registry.discover().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["local".to_string()]);
    }

    #[test]
    fn discovery_is_idempotent() {
        let temp = TempDir::new().expect("tmp");
        fs::write(
            temp.path().join("mcp.json"),
            r#"{ mcpServers: { b: { command: "b" }, a: { command: "a" } } }"#,
        )
        .expect("write");
        let registry = ProviderRegistry::new(isolated(temp.path()));
        let first = registry.discover();
        let second = registry.discover();
        assert_eq!(first, second);
        assert_eq!(registry.status().discovered, 2);
    }

    #[test]
    fn update_status_ignores_unknown_providers() {
        let registry = ProviderRegistry::from_descriptors(vec![ProviderDescriptor::new("a", "a")]);
        registry.discover();
        registry.update_status("ghost", ProviderState::Connected, None);
        registry.update_status("a", ProviderState::Errored, Some("boom".to_string()));
        assert_eq!(registry.state("ghost"), None);
        assert_eq!(registry.state("a"), Some(ProviderState::Errored));
        assert_eq!(registry.last_error("a").as_deref(), Some("boom"));
        assert_eq!(
            registry.status(),
            RegistryStatus {
                errored: 1,
                ..RegistryStatus::default()
            }
        );
    }

    #[test]
    fn relative_config_paths_resolve_against_cwd() {
        let config = ProvidersConfig {
            config_path: Some("conf/mcp.json".to_string()),
            ..ProvidersConfig::default()
        };
        let options = DiscoveryOptions::from_config(&config, "/work");
        assert_eq!(
            options.candidates().first().cloned(),
            Some(PathBuf::from("/work/conf/mcp.json"))
        );
    }
}
