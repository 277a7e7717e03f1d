//! Configuration file management.
//!
//! `config.toml` lives in the data directory (`$DATAUNION_DATA_DIR`, or a
//! platform default). Every section and field has a default, so a missing
//! file or a partial one both load.

use std::path::PathBuf;

use anyhow::Context;
use dataunion_ledger::fees::Fraction;
use dataunion_ledger::modules::rate_limit::RateLimits;
use dataunion_types::Address;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "DATAUNION_DATA_DIR";

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub ledger: LedgerSection,
    #[serde(default)]
    pub protocol: ProtocolSection,
    #[serde(default)]
    pub modules: ModulesSection,
    #[serde(default)]
    pub token: TokenSection,
    #[serde(default)]
    pub join_server: JoinServerSection,
    #[serde(default)]
    pub advanced: AdvancedSection,
}

/// The ledger this daemon operates. Addresses are hex.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSection {
    /// Account holding the ledger's funds.
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub join_part_agents: Vec<String>,
    /// Admin fee in basis points (900 = 9%).
    #[serde(default)]
    pub admin_fee_bps: u32,
    #[serde(default)]
    pub metadata: String,
}

/// Protocol fee, as reported by the built-in oracle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolSection {
    #[serde(default)]
    pub fee_bps: u32,
    #[serde(default)]
    pub beneficiary: String,
}

/// Built-in extension modules. Each module acts under its own agent address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModulesSection {
    #[serde(default)]
    pub ban_enabled: bool,
    #[serde(default)]
    pub ban_agent: String,
    #[serde(default)]
    pub weights_enabled: bool,
    #[serde(default)]
    pub weight_agent: String,
    #[serde(default)]
    pub rate_limit_enabled: bool,
    #[serde(default)]
    pub rate_limits: RateLimits,
    #[serde(default)]
    pub routing_enabled: bool,
    /// Lock module slots right after startup registration.
    #[serde(default)]
    pub lock_after_setup: bool,
}

/// Genesis balances of the in-memory token, hex address to amount.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenSection {
    #[serde(default)]
    pub balances: std::collections::BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinServerSection {
    #[serde(default)]
    pub enabled: bool,
    /// Agent address the join server adds members as.
    #[serde(default)]
    pub agent: String,
    /// Accepted clock skew for request timestamps.
    #[serde(default = "default_tolerance")]
    pub tolerance_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedSection {
    /// Log level or full `EnvFilter` directive.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
    /// Actor mailbox capacity.
    #[serde(default = "default_mailbox")]
    pub mailbox_capacity: usize,
}

fn default_tolerance() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_mailbox() -> usize {
    1024
}

impl Default for JoinServerSection {
    fn default() -> Self {
        Self {
            enabled: false,
            agent: String::new(),
            tolerance_seconds: default_tolerance(),
        }
    }
}

impl Default for AdvancedSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: String::new(),
            mailbox_capacity: default_mailbox(),
        }
    }
}

/// Parse a hex address field. Empty means "not set".
pub fn parse_address(field: &str, value: &str) -> anyhow::Result<Option<Address>> {
    if value.is_empty() {
        return Ok(None);
    }
    let address = value
        .parse::<Address>()
        .with_context(|| format!("invalid address in `{field}`"))?;
    Ok(Some(address))
}

/// Parse a hex address field that must be set.
pub fn require_address(field: &str, value: &str) -> anyhow::Result<Address> {
    parse_address(field, value)?.with_context(|| format!("`{field}` must be set"))
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig =
                toml::from_str(&content).with_context(|| format!("parsing {}", config_path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        if self.advanced.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.advanced.data_dir)
        }
    }

    pub fn admin_fee(&self) -> Fraction {
        Fraction::from_bps(self.ledger.admin_fee_bps)
    }

    pub fn protocol_fee(&self) -> Fraction {
        Fraction::from_bps(self.protocol.fee_bps)
    }

    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/DataUnion")
        }
        #[cfg(not(target_os = "macos"))]
        {
            dirs_fallback(".dataunion")
        }
    }
}

fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/dataunion"))
}
