//! Work manager configuration.
//!
//! Thread-pool properties arrive as strings, exactly as they are written in
//! deployment configuration. Parsing never fails: a missing value resolves
//! to the documented default and a bad value resolves to the default with a
//! WARNING naming the property and the value chosen.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::ConnectorError;

/// Property: threads kept alive even when idle.
pub const CORE_POOL_SIZE: &str = "core-pool-size";
/// Property: upper bound on worker threads.
pub const MAX_POOL_SIZE: &str = "max-pool-size";
/// Property: idle time before a thread above the core size retires.
pub const KEEP_ALIVE_SECONDS: &str = "keep-alive-seconds";
/// Property: bound on queued work units.
pub const QUEUE_CAPACITY: &str = "queue-capacity";
/// Property: `block` or `reject` when the queue is full.
pub const ADMISSION_POLICY: &str = "admission-policy";
/// Property: how long a blocked submitter waits for queue space.
pub const ADMISSION_TIMEOUT_MILLIS: &str = "admission-timeout-millis";

/// Default `core-pool-size`.
pub const DEFAULT_CORE_POOL_SIZE: usize = 16;
/// Default `max-pool-size`.
pub const DEFAULT_MAX_POOL_SIZE: usize = 32;
/// Default `keep-alive-seconds`.
pub const DEFAULT_KEEP_ALIVE_SECONDS: u64 = 60;
/// Default `admission-timeout-millis`.
pub const DEFAULT_ADMISSION_TIMEOUT_MILLIS: u64 = 30_000;
/// Id of the pool used when a resource adapter names none.
pub const DEFAULT_THREAD_POOL_ID: &str = "thread-pool-1";
/// Name of the JMS resource adapter.
pub const DEFAULT_JMS_ADAPTER: &str = "jmsra";

const KNOWN_PROPERTIES: [&str; 6] = [
    CORE_POOL_SIZE,
    MAX_POOL_SIZE,
    KEEP_ALIVE_SECONDS,
    QUEUE_CAPACITY,
    ADMISSION_POLICY,
    ADMISSION_TIMEOUT_MILLIS,
];

/// Why a numeric property fell back to its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback {
    Missing,
    Negative,
    NotPositive,
    NotANumber,
}

/// Smallest value a numeric property accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Floor {
    Zero,
    One,
}

fn parse_number(val: Option<&str>, floor: Floor) -> Result<u64, Fallback> {
    let Some(val) = val else {
        return Err(Fallback::Missing);
    };

    let parsed: i64 = val.trim().parse().map_err(|_| Fallback::NotANumber)?;
    match floor {
        Floor::Zero if parsed < 0 => Err(Fallback::Negative),
        Floor::One if parsed <= 0 => Err(Fallback::NotPositive),
        _ => u64::try_from(parsed).map_err(|_| Fallback::NotANumber),
    }
}

fn warn_fallback(property: &str, fallback: Fallback, default: impl fmt::Display) {
    match fallback {
        Fallback::Missing => {}
        Fallback::Negative => warn!("{} < 0 using default value {}", property, default),
        Fallback::NotPositive => warn!("{} <= 0 using default value {}", property, default),
        Fallback::NotANumber => {
            warn!("{} is not a number, using default value {}", property, default)
        }
    }
}

fn to_usize(value: u64, default: usize) -> usize {
    usize::try_from(value).unwrap_or(default)
}

/// Resolve `core-pool-size`. Negative or unparsable values use the default.
pub fn init_core_pool_size(val: Option<&str>) -> usize {
    match parse_number(val, Floor::Zero) {
        Ok(v) => to_usize(v, DEFAULT_CORE_POOL_SIZE),
        Err(fallback) => {
            warn_fallback(CORE_POOL_SIZE, fallback, DEFAULT_CORE_POOL_SIZE);
            DEFAULT_CORE_POOL_SIZE
        }
    }
}

/// Resolve `max-pool-size`. Values `<= 0` or unparsable use the default;
/// the result is raised to `core_pool_size` when it would be smaller.
pub fn init_max_pool_size(val: Option<&str>, core_pool_size: usize) -> usize {
    let max = match parse_number(val, Floor::One) {
        Ok(v) => to_usize(v, DEFAULT_MAX_POOL_SIZE),
        Err(fallback) => {
            warn_fallback(MAX_POOL_SIZE, fallback, DEFAULT_MAX_POOL_SIZE);
            DEFAULT_MAX_POOL_SIZE
        }
    };

    if max < core_pool_size {
        warn!(
            "{} {} < {} {}, using {} value {}",
            MAX_POOL_SIZE, max, CORE_POOL_SIZE, core_pool_size, CORE_POOL_SIZE, core_pool_size
        );
        return core_pool_size;
    }
    max
}

/// Resolve `keep-alive-seconds`. Negative or unparsable values use the default.
pub fn init_keep_alive_seconds(val: Option<&str>) -> u64 {
    parse_number(val, Floor::Zero).unwrap_or_else(|fallback| {
        warn_fallback(KEEP_ALIVE_SECONDS, fallback, DEFAULT_KEEP_ALIVE_SECONDS);
        DEFAULT_KEEP_ALIVE_SECONDS
    })
}

/// Resolve `queue-capacity`. `None` means unbounded.
pub fn init_queue_capacity(val: Option<&str>) -> Option<usize> {
    match parse_number(val, Floor::One) {
        Ok(v) => usize::try_from(v).ok(),
        Err(fallback) => {
            warn_fallback(QUEUE_CAPACITY, fallback, "unbounded");
            None
        }
    }
}

/// Resolve `admission-timeout-millis`.
pub fn init_admission_timeout_millis(val: Option<&str>) -> u64 {
    parse_number(val, Floor::One).unwrap_or_else(|fallback| {
        warn_fallback(ADMISSION_TIMEOUT_MILLIS, fallback, DEFAULT_ADMISSION_TIMEOUT_MILLIS);
        DEFAULT_ADMISSION_TIMEOUT_MILLIS
    })
}

/// Resolve `admission-policy`.
pub fn init_admission_policy(val: Option<&str>) -> AdmissionPolicy {
    let Some(val) = val else {
        return AdmissionPolicy::default();
    };

    match val.trim().to_lowercase().as_str() {
        "block" => AdmissionPolicy::Block,
        "reject" => AdmissionPolicy::Reject,
        _ => {
            warn!(
                "{} is not one of block, reject, using default value {}",
                ADMISSION_POLICY,
                AdmissionPolicy::default()
            );
            AdmissionPolicy::default()
        }
    }
}

/// What happens to a submission when the work queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdmissionPolicy {
    /// Wait for space, up to the admission timeout
    #[default]
    Block,
    /// Fail immediately
    Reject,
}

impl fmt::Display for AdmissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionPolicy::Block => write!(f, "block"),
            AdmissionPolicy::Reject => write!(f, "reject"),
        }
    }
}

/// Resolved settings of one dispatch pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PoolSettings {
    /// Workers kept alive while idle
    pub core_pool_size: usize,
    /// Upper bound on workers
    pub max_pool_size: usize,
    /// Idle time before a worker above the core size retires
    pub keep_alive_seconds: u64,
    /// Bound on queued units, `None` when unbounded
    pub queue_capacity: Option<usize>,
    /// Behavior on a full queue
    pub admission_policy: AdmissionPolicy,
    /// Wait bound for blocked submitters
    pub admission_timeout_millis: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            core_pool_size: DEFAULT_CORE_POOL_SIZE,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            keep_alive_seconds: DEFAULT_KEEP_ALIVE_SECONDS,
            queue_capacity: None,
            admission_policy: AdmissionPolicy::default(),
            admission_timeout_millis: DEFAULT_ADMISSION_TIMEOUT_MILLIS,
        }
    }
}

impl PoolSettings {
    /// Resolve settings from string properties.
    pub fn from_properties(properties: &BTreeMap<String, String>) -> Self {
        for key in properties.keys() {
            if !KNOWN_PROPERTIES.contains(&key.as_str()) {
                warn!("ignoring unknown thread-pool property {}", key);
            }
        }

        let get = |name: &str| properties.get(name).map(String::as_str);
        let core_pool_size = init_core_pool_size(get(CORE_POOL_SIZE));

        Self {
            core_pool_size,
            max_pool_size: init_max_pool_size(get(MAX_POOL_SIZE), core_pool_size),
            keep_alive_seconds: init_keep_alive_seconds(get(KEEP_ALIVE_SECONDS)),
            queue_capacity: init_queue_capacity(get(QUEUE_CAPACITY)),
            admission_policy: init_admission_policy(get(ADMISSION_POLICY)),
            admission_timeout_millis: init_admission_timeout_millis(get(ADMISSION_TIMEOUT_MILLIS)),
        }
    }

    /// Set the core and max pool sizes. `max` is raised to `core` when smaller.
    pub fn with_pool_size(mut self, core: usize, max: usize) -> Self {
        self.core_pool_size = core;
        self.max_pool_size = max.max(core).max(1);
        self
    }

    /// Set the keep-alive.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive_seconds = keep_alive.as_secs();
        self
    }

    /// Bound the queue.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity.max(1));
        self
    }

    /// Set the admission policy and blocking timeout.
    pub fn with_admission(mut self, policy: AdmissionPolicy, timeout: Duration) -> Self {
        self.admission_policy = policy;
        self.admission_timeout_millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Keep-alive as a duration.
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_seconds)
    }

    /// Admission timeout as a duration.
    pub fn admission_timeout(&self) -> Duration {
        Duration::from_millis(self.admission_timeout_millis)
    }
}

/// One thread pool as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadPoolConfig {
    /// Pool id referenced by resource adapters
    pub id: String,

    /// String-typed pool properties
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl ThreadPoolConfig {
    /// Create a pool entry without properties.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Add a property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Resolve the pool settings.
    pub fn settings(&self) -> PoolSettings {
        PoolSettings::from_properties(&self.properties)
    }
}

/// Which resource adapters are monitored and under which names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MonitoringConfig {
    /// Adapters shipped with the server
    #[serde(default = "default_system_adapters")]
    pub system_adapters: Vec<String>,

    /// The JMS adapter, the only monitored system adapter
    #[serde(default = "default_jms_adapter")]
    pub jms_adapter: String,
}

fn default_system_adapters() -> Vec<String> {
    ["__cp_jdbc_ra", "__ds_jdbc_ra", "__xa_jdbc_ra", "__dm_jdbc_ra", DEFAULT_JMS_ADAPTER]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_jms_adapter() -> String {
    DEFAULT_JMS_ADAPTER.to_string()
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            system_adapters: default_system_adapters(),
            jms_adapter: default_jms_adapter(),
        }
    }
}

impl MonitoringConfig {
    /// Whether `ra_name` is the JMS adapter.
    pub fn is_jms_adapter(&self, ra_name: &str) -> bool {
        self.jms_adapter == ra_name
    }

    /// Whether `ra_name` is a system adapter.
    pub fn is_system_adapter(&self, ra_name: &str) -> bool {
        self.system_adapters.iter().any(|name| name == ra_name)
    }

    /// Dotted monitoring name for the adapter's work statistics, or `None`
    /// if the adapter is not monitored.
    pub fn dotted_name(&self, ra_name: &str) -> Option<String> {
        if self.is_jms_adapter(ra_name) {
            return Some("jms-service/work-management".to_string());
        }
        if self.is_system_adapter(ra_name) {
            return None;
        }
        Some(format!("connector-service/{}/work-management", ra_name))
    }
}

fn default_pool_id() -> String {
    DEFAULT_THREAD_POOL_ID.to_string()
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkManagerConfig {
    /// Pool used by adapters that name none
    #[serde(default = "default_pool_id")]
    pub default_thread_pool: String,

    /// Configured pools
    #[serde(default)]
    pub thread_pools: Vec<ThreadPoolConfig>,

    /// Monitoring registration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Default for WorkManagerConfig {
    fn default() -> Self {
        Self {
            default_thread_pool: default_pool_id(),
            thread_pools: Vec::new(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl WorkManagerConfig {
    /// Parse a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConnectorError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConnectorError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Add a pool.
    pub fn with_pool(mut self, pool: ThreadPoolConfig) -> Self {
        self.thread_pools.push(pool);
        self
    }

    /// Configured pools plus the default pool when it is not listed.
    pub fn pools(&self) -> Vec<ThreadPoolConfig> {
        let mut pools = self.thread_pools.clone();
        if !pools.iter().any(|p| p.id == self.default_thread_pool) {
            pools.push(ThreadPoolConfig::new(self.default_thread_pool.clone()));
        }
        pools
    }
}
