//! Provider descriptors and the connection lifecycle states.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Immutable launch description for a single tool provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Unique provider name (the key in the provider config file).
    pub name: String,
    /// Executable used to launch the provider.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the provider process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ProviderDescriptor {
    /// Build a descriptor with no arguments or environment.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Append launch arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set a single environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Lifecycle state of a provider connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    /// Known from configuration, not connected.
    Discovered,
    /// Spawn/handshake/enumeration in progress.
    Connecting,
    /// Handshake done and operations enumerated.
    Connected,
    /// Connection attempt or a later call failed.
    Errored,
}

impl ProviderState {
    /// Whether `self -> next` is a legal lifecycle transition.
    ///
    /// `Errored -> Connecting` is only exercised by a fresh `connect_all`
    /// during initialization; nothing retries automatically.
    pub fn can_transition_to(self, next: ProviderState) -> bool {
        use ProviderState::*;
        matches!(
            (self, next),
            (Discovered, Connecting)
                | (Connecting, Connected)
                | (Connecting, Errored)
                | (Connected, Errored)
                | (Connected, Discovered)
                | (Errored, Connecting)
                | (Errored, Discovered)
        )
    }

    /// Stable lowercase label used in logs and metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderState::Discovered => "discovered",
            ProviderState::Connecting => "connecting",
            ProviderState::Connected => "connected",
            ProviderState::Errored => "errored",
        }
    }
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{ProviderDescriptor, ProviderState};
    use pretty_assertions::assert_eq;

    #[test]
    fn lifecycle_transitions_follow_state_machine() {
        use ProviderState::*;
        assert_eq!(Discovered.can_transition_to(Connecting), true);
        assert_eq!(Connecting.can_transition_to(Connected), true);
        assert_eq!(Connecting.can_transition_to(Errored), true);
        assert_eq!(Connected.can_transition_to(Errored), true);
        assert_eq!(Connected.can_transition_to(Discovered), true);

        assert_eq!(Discovered.can_transition_to(Connected), false);
        assert_eq!(Errored.can_transition_to(Connected), false);
        assert_eq!(Connected.can_transition_to(Connecting), false);
        assert_eq!(Connected.can_transition_to(Connected), false);
    }

    #[test]
    fn descriptor_builder_collects_args_and_env() {
        let descriptor = ProviderDescriptor::new("math", "math-server")
            .with_args(["--stdio"])
            .with_env("LOG", "debug");
        assert_eq!(descriptor.args, vec!["--stdio".to_string()]);
        assert_eq!(descriptor.env.get("LOG").map(String::as_str), Some("debug"));
    }
}
