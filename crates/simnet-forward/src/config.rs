//! TOML-based configuration for the forwarding engine.

use std::path::Path;

use serde::Deserialize;

use simnet_core::{Address, InterfaceId, Label};

use crate::error::ConfigError;
use crate::vif::VifEntry;

/// Top-level forwarding engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Simulated header size stamped on locally originated packets.
    pub header_len: usize,
    /// Default MTU applied when an interface has no override.
    pub mtu: usize,
    /// `[[interface_mtu]]` per-interface MTU overrides.
    pub interface_mtu: Vec<InterfaceMtuRule>,
    /// Number of physical interfaces; indices at or above this are
    /// virtual and tunneled when `vif_enabled` is set.
    pub interfaces: u32,
    /// Seconds an incomplete reassembly record may linger.
    pub fragment_ttl: f64,
    /// Whether the route cache shortcut is consulted at all.
    pub route_cache: bool,
    /// Route cache capacity.
    pub route_cache_capacity: usize,
    /// Seed for the cache's pseudo-random eviction.
    pub route_cache_seed: u64,
    /// Whether the hop budget is enforced.
    pub ttl_check: bool,
    /// Whether packets may be forwarded back out their arrival interface.
    pub route_back: bool,
    /// Whether out-of-range interface indices are tunneled over vifs.
    pub vif_enabled: bool,
    /// Whether this node forwards at all; a single-interface non-routing
    /// node just sends local traffic out its sole interface.
    pub routing: bool,
    /// Cap on nested reassemble/unwrap/re-forward recursion. Exceeding it
    /// is reported as a routing loop, never allowed to run away.
    pub max_forward_depth: usize,
    /// `[[switch]]` cut-through entries.
    pub switch: Vec<SwitchRule>,
    /// `[[label_switch]]` cut-through entries.
    pub label_switch: Vec<LabelSwitchRule>,
    /// `[[vifs]]` contiguous virtual-interface packs.
    pub vifs: Vec<VifPack>,
}

/// An `[[interface_mtu]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceMtuRule {
    pub interface: InterfaceId,
    pub mtu: usize,
}

/// A `[[switch]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SwitchRule {
    pub incoming: InterfaceId,
    pub outgoing: InterfaceId,
}

/// A `[[label_switch]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelSwitchRule {
    pub incoming: InterfaceId,
    pub in_label: Label,
    pub outgoing: InterfaceId,
    pub out_label: Label,
}

/// A `[[vifs]]` entry: a contiguous vif range from `start`.
#[derive(Debug, Clone, Deserialize)]
pub struct VifPack {
    pub start: u32,
    #[serde(default)]
    pub entries: Vec<VifPackEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VifPackEntry {
    #[serde(default)]
    pub local: Option<Address>,
    #[serde(default)]
    pub peer: Option<Address>,
}

impl From<VifPackEntry> for VifEntry {
    fn from(e: VifPackEntry) -> Self {
        VifEntry {
            local: e.local,
            peer: e.peer,
        }
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            header_len: default_header_len(),
            mtu: default_mtu(),
            interface_mtu: Vec::new(),
            interfaces: default_interfaces(),
            fragment_ttl: default_fragment_ttl(),
            route_cache: true,
            route_cache_capacity: crate::cache::DEFAULT_CAPACITY,
            route_cache_seed: 0,
            ttl_check: true,
            route_back: false,
            vif_enabled: false,
            routing: true,
            max_forward_depth: default_max_forward_depth(),
            switch: Vec::new(),
            label_switch: Vec::new(),
            vifs: Vec::new(),
        }
    }
}

fn default_header_len() -> usize {
    20
}

fn default_mtu() -> usize {
    1500
}

fn default_interfaces() -> u32 {
    1
}

fn default_fragment_ttl() -> f64 {
    60.0
}

fn default_max_forward_depth() -> usize {
    32
}

impl ForwardConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid(format!("failed to read config file: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: ForwardConfig = toml::from_str(s)
            .map_err(|e| ConfigError::Invalid(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.header_len >= self.mtu {
            return Err(ConfigError::Invalid(format!(
                "header_len {} does not fit mtu {}",
                self.header_len, self.mtu
            )));
        }
        if self.interfaces == 0 {
            return Err(ConfigError::Invalid("need at least one interface".into()));
        }
        Ok(())
    }

    /// Effective MTU for one interface.
    #[must_use]
    pub fn mtu_for(&self, iface: InterfaceId) -> usize {
        self.interface_mtu
            .iter()
            .find(|r| r.interface == iface)
            .map_or(self.mtu, |r| r.mtu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ForwardConfig::default();
        assert_eq!(config.header_len, 20);
        assert_eq!(config.mtu, 1500);
        assert!(config.route_cache);
        assert!(config.ttl_check);
        assert!(!config.route_back);
        assert!(config.routing);
    }

    #[test]
    fn test_parse_full() {
        let config = ForwardConfig::parse(
            r#"
            header_len = 28
            mtu = 1000
            interfaces = 3
            fragment_ttl = 30.0
            route_cache_capacity = 16
            vif_enabled = true

            [[interface_mtu]]
            interface = 2
            mtu = 576

            [[switch]]
            incoming = 0
            outgoing = 2

            [[label_switch]]
            incoming = 1
            in_label = 10
            outgoing = 2
            out_label = 20

            [[vifs]]
            start = 10
            entries = [{ peer = 170 }, { local = 7, peer = 171 }]
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.header_len, 28);
        assert_eq!(config.mtu_for(InterfaceId(2)), 576);
        assert_eq!(config.mtu_for(InterfaceId(0)), 1000);
        assert_eq!(config.switch.len(), 1);
        assert_eq!(config.label_switch[0].out_label, Label(20));
        assert_eq!(config.vifs[0].start, 10);
        assert_eq!(config.vifs[0].entries[1].local, Some(Address(7)));
    }

    #[test]
    fn test_header_must_fit_mtu() {
        let err = ForwardConfig::parse("header_len = 1500").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_interfaces_rejected() {
        let err = ForwardConfig::parse("interfaces = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
