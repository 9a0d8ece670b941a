//! Node configuration loading.
//!
//! TOML is the sole config source (ground: `forwarder/src/config.rs`).
//! Every key enumerated in spec.md §6 is represented; `general.name` and
//! `general.address` are validated eagerly, matching the original
//! `Server.validity_check` (ground: `mimix/server.py::validity_check`).

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Public config types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub general: GeneralConfig,
    pub pool: PoolConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct GeneralConfig {
    pub name: String,
    pub address: String,
    pub smtp: bool,
    pub hopspy: bool,
    pub keylen: u32,
    pub piddir: String,
    pub pidfile: String,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub indir: String,
    pub outdir: String,
    /// Parsed from a duration string like `2h` (ground: `timing.dhms_secs`).
    pub interval_secs: u64,
    /// Percentage [1,100] of the outbound pool released per trigger.
    pub rate: u8,
    /// Outbound pool must exceed this size for `trigger()` to fire.
    pub size: u32,
    /// Percent chance [0,100] of dummy injection before the inbound sweep.
    pub indummy: u8,
    /// Percent chance [0,100] of dummy injection before the outbound sweep.
    pub outdummy: u8,
    /// Chain specifier used when building dummy/randhop envelopes, e.g. `*,*`.
    pub dummychain: String,
    /// How long an incomplete multipart chunk is kept before `chunks.expire`
    /// drops it, parsed the same way as `interval`. The original source
    /// never parameterizes this; defaulted to `7d`.
    pub chunk_retention_secs: u64,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
    pub directory: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub dir: String,
    pub file: String,
    pub level: String,
    pub format: String,
    pub datefmt: String,
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    general: Option<RawGeneral>,
    pool: Option<RawPool>,
    database: Option<RawDatabase>,
    logging: Option<RawLogging>,
}

#[derive(Debug, Deserialize, Default)]
struct RawGeneral {
    name: Option<String>,
    address: Option<String>,
    smtp: Option<bool>,
    hopspy: Option<bool>,
    keylen: Option<u32>,
    piddir: Option<String>,
    pidfile: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawPool {
    indir: Option<String>,
    outdir: Option<String>,
    interval: Option<String>,
    rate: Option<u8>,
    size: Option<u32>,
    indummy: Option<u8>,
    outdummy: Option<u8>,
    dummychain: Option<String>,
    chunk_retention: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawDatabase {
    path: Option<String>,
    directory: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawLogging {
    dir: Option<String>,
    file: Option<String>,
    level: Option<String>,
    format: Option<String>,
    datefmt: Option<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Parse(String),
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn load_config_from_path(path: &Path) -> Result<NodeConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_config_from_str(&toml_str)
}

pub fn load_config_from_str(toml_str: &str) -> Result<NodeConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let raw_general = raw.general.unwrap_or_default();
    let name = raw_general
        .name
        .ok_or_else(|| ConfigError::MissingField("general.name".to_owned()))?;
    let address = raw_general
        .address
        .ok_or_else(|| ConfigError::MissingField("general.address".to_owned()))?;

    let general = GeneralConfig {
        name,
        address,
        smtp: raw_general.smtp.unwrap_or(false),
        hopspy: raw_general.hopspy.unwrap_or(false),
        keylen: raw_general.keylen.unwrap_or(2048),
        piddir: raw_general.piddir.unwrap_or_else(|| "/var/run".to_owned()),
        pidfile: raw_general.pidfile.unwrap_or_else(|| "mixnode.pid".to_owned()),
    };

    let raw_pool = raw.pool.unwrap_or_default();
    let interval_str = raw_pool.interval.unwrap_or_else(|| "2h".to_owned());
    let interval_secs = parse_duration_secs(&interval_str)?;
    let rate = raw_pool.rate.unwrap_or(50);
    if rate == 0 || rate > 100 {
        return Err(ConfigError::InvalidValue(format!(
            "pool.rate must be in 1..=100, got {}",
            rate
        )));
    }
    let indummy = raw_pool.indummy.unwrap_or(0);
    let outdummy = raw_pool.outdummy.unwrap_or(0);
    for (field, val) in [("pool.indummy", indummy), ("pool.outdummy", outdummy)] {
        if val > 100 {
            return Err(ConfigError::InvalidValue(format!(
                "{} must be 0..=100, got {}",
                field, val
            )));
        }
    }

    let chunk_retention_str = raw_pool.chunk_retention.unwrap_or_else(|| "7d".to_owned());
    let chunk_retention_secs = parse_duration_secs(&chunk_retention_str)?;

    let pool = PoolConfig {
        indir: raw_pool.indir.unwrap_or_else(|| "pool/in".to_owned()),
        outdir: raw_pool.outdir.unwrap_or_else(|| "pool/out".to_owned()),
        interval_secs,
        rate,
        size: raw_pool.size.unwrap_or(10),
        indummy,
        outdummy,
        dummychain: raw_pool.dummychain.unwrap_or_else(|| "*,*".to_owned()),
        chunk_retention_secs,
    };

    let raw_db = raw.database.unwrap_or_default();
    let database = DatabaseConfig {
        path: raw_db.path.unwrap_or_else(|| "/var/lib/mixnode".to_owned()),
        directory: raw_db.directory.unwrap_or_else(|| "mixnode.sqlite3".to_owned()),
    };

    let raw_log = raw.logging.unwrap_or_default();
    let level = raw_log.level.unwrap_or_else(|| "info".to_owned());
    if !matches!(level.as_str(), "debug" | "info" | "warn" | "error") {
        return Err(ConfigError::InvalidValue(format!(
            "logging.level must be one of debug|info|warn|error, got '{}'",
            level
        )));
    }
    let logging = LoggingConfig {
        dir: raw_log.dir.unwrap_or_else(|| "/var/log/mixnode".to_owned()),
        file: raw_log.file.unwrap_or_else(|| "mixnode.log".to_owned()),
        level,
        format: raw_log.format.unwrap_or_else(|| "%(asctime)s %(message)s".to_owned()),
        datefmt: raw_log.datefmt.unwrap_or_else(|| "%Y-%m-%d %H:%M:%S".to_owned()),
    };

    Ok(NodeConfig {
        general,
        pool,
        database,
        logging,
    })
}

/// Parse a duration string like `2h`, `30m`, `90s`, `1d` (ground:
/// `timing.dhms_secs`).
fn parse_duration_secs(s: &str) -> Result<u64, ConfigError> {
    if s.len() < 2 {
        return Err(ConfigError::InvalidValue(format!(
            "invalid duration '{}': expected e.g. '2h'",
            s
        )));
    }
    let (period_str, unit) = s.split_at(s.len() - 1);
    let period: u64 = period_str
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("invalid duration '{}'", s)))?;
    let secs = match unit.to_lowercase().as_str() {
        "d" => period * 86_400,
        "h" => period * 3_600,
        "m" => period * 60,
        "s" => period,
        other => {
            return Err(ConfigError::InvalidValue(format!(
                "unknown duration unit '{}' in '{}'",
                other, s
            )));
        }
    };
    Ok(secs)
}
