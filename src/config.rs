use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Days, Local};
use serde::Deserialize;

/// Top-level configuration for connwatch.
///
/// Constructed once at startup (YAML file merged with CLI overrides) and
/// validated eagerly, then passed by reference into the scheduler — every
/// tick is a function of (config, wall-clock time) with no hidden state.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Logging verbosity (trace, debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Report pipeline configuration.
    #[serde(default)]
    pub report: ReportConfig,

    /// Synthetic log generator configuration.
    #[serde(default)]
    pub generate: GenerateConfig,
}

/// Report pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// Glob pattern locating the input logs. May contain date tokens
    /// (`$TodayYear`, `$YesterdayMonth`, `$Now`, ...) expanded at tick start.
    #[serde(default)]
    pub location: String,

    /// Source host pinned for the reached-destinations report.
    #[serde(default)]
    pub pinned_source: String,

    /// Destination host pinned for the connected-sources report.
    #[serde(default)]
    pub pinned_destination: String,

    /// Run forever, re-reporting every `interval`. Default: false (one shot).
    #[serde(default)]
    pub tail: bool,

    /// How far back from now each report looks. Default: 1h.
    #[serde(default = "default_window", with = "humantime_serde")]
    pub window: Duration,

    /// Width of the trailing aggregation buckets. Default: 20m.
    #[serde(default = "default_granularity", with = "humantime_serde")]
    pub granularity: Duration,

    /// Pause between tail-mode ticks. Default: 1h.
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Parallel aggregation workers. Default: available CPUs.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum partition size in bytes; larger files are split. Default: 64MiB.
    #[serde(default = "default_partition_bytes")]
    pub partition_bytes: u64,

    /// Optional deadline per partition read; a slower partition is dropped
    /// from the tick with a warning. Default: none.
    #[serde(default, with = "humantime_serde")]
    pub partition_timeout: Option<Duration>,
}

/// Synthetic log generator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateConfig {
    /// Output file to append to.
    #[serde(default)]
    pub location: String,

    /// How far back the generated timestamps reach. Default: 2h.
    #[serde(default = "default_span", with = "humantime_serde")]
    pub span: Duration,

    /// Width of each generation burst. Default: 5m.
    #[serde(default = "default_burst_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Lines appended per burst. Default: 500000.
    #[serde(default = "default_lines_per_interval")]
    pub lines_per_interval: u64,

    /// Source host pool.
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,

    /// Destination host pool.
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_window() -> Duration {
    Duration::from_secs(3600)
}

fn default_granularity() -> Duration {
    Duration::from_secs(1200)
}

fn default_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_partition_bytes() -> u64 {
    64 * 1024 * 1024 // 64MiB
}

fn default_span() -> Duration {
    Duration::from_secs(7200)
}

fn default_burst_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_lines_per_interval() -> u64 {
    500_000
}

fn default_hosts() -> Vec<String> {
    [
        "alfa", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india",
        "juliett", "kilo", "lima", "mike", "november", "oscar", "papa", "quebec", "romeo",
        "sierra", "tango", "uniform", "victor", "whiskey", "xray", "yankee", "zulu",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

fn default_servers() -> Vec<String> {
    [
        "Alfa", "Bravo", "Charlie", "Delta", "Echo", "Foxtrot", "Golf", "Hotel",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

// --- Default trait impls ---

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            location: String::new(),
            pinned_source: String::new(),
            pinned_destination: String::new(),
            tail: false,
            window: default_window(),
            granularity: default_granularity(),
            interval: default_interval(),
            workers: default_workers(),
            partition_bytes: default_partition_bytes(),
            partition_timeout: None,
        }
    }
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            location: String::new(),
            span: default_span(),
            interval: default_burst_interval(),
            lines_per_interval: default_lines_per_interval(),
            hosts: default_hosts(),
            servers: default_servers(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file. Section validation happens per
    /// command: a report run does not need generator settings and vice versa.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        Ok(cfg)
    }
}

impl ReportConfig {
    /// Validate required fields and consistency. Fatal at startup; nothing
    /// here is re-checked lazily per tick.
    pub fn validate(&self) -> Result<()> {
        if self.location.is_empty() {
            bail!("report.location is required");
        }

        glob::Pattern::new(&self.location).with_context(|| {
            format!("report.location is not a valid pattern: {:?}", self.location)
        })?;

        if self.pinned_source.is_empty() {
            bail!("report.pinned_source is required");
        }

        if self.pinned_destination.is_empty() {
            bail!("report.pinned_destination is required");
        }

        if self.window.as_secs() == 0 {
            bail!("report.window must be at least one second");
        }

        if self.granularity.as_secs() == 0 {
            bail!("report.granularity must be a positive number of seconds");
        }

        if self.interval.as_secs() == 0 {
            bail!("report.interval must be at least one second");
        }

        if self.workers == 0 {
            bail!("report.workers must be positive");
        }

        if self.partition_bytes == 0 {
            bail!("report.partition_bytes must be positive");
        }

        if let Some(timeout) = self.partition_timeout {
            if timeout.is_zero() {
                bail!("report.partition_timeout must be positive when set");
            }
        }

        Ok(())
    }

    /// Window length in whole seconds.
    pub fn window_seconds(&self) -> i64 {
        self.window.as_secs() as i64
    }

    /// Bucket width in whole seconds.
    pub fn granularity_seconds(&self) -> i64 {
        self.granularity.as_secs() as i64
    }

    /// The location pattern with date tokens expanded for `now`.
    pub fn expanded_location(&self, now: DateTime<Local>) -> String {
        expand_location(&self.location, now)
    }
}

impl GenerateConfig {
    /// Validate required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.location.is_empty() {
            bail!("generate.location is required");
        }

        if self.span.as_secs() == 0 {
            bail!("generate.span must be at least one second");
        }

        if self.interval.as_secs() == 0 {
            bail!("generate.interval must be at least one second");
        }

        if self.interval > self.span {
            bail!("generate.interval must not exceed generate.span");
        }

        if self.lines_per_interval == 0 {
            bail!("generate.lines_per_interval must be positive");
        }

        if self.hosts.is_empty() {
            bail!("generate.hosts must not be empty");
        }

        if self.servers.is_empty() {
            bail!("generate.servers must not be empty");
        }

        Ok(())
    }
}

/// Expand date-derived tokens inside a location pattern.
///
/// Tokens follow `$Name` or `${Name}` form: `TodayYear`, `TodayMonth`,
/// `TodayDay`, the same three for `Yesterday` and `TwoDaysAgo`, and `Now`
/// (compact `%Y%m%d%H%M%S`). Unknown `$` sequences pass through untouched.
pub fn expand_location(pattern: &str, now: DateTime<Local>) -> String {
    if !pattern.contains('$') {
        return pattern.to_string();
    }

    let yesterday = now.checked_sub_days(Days::new(1)).unwrap_or(now);
    let two_days_ago = now.checked_sub_days(Days::new(2)).unwrap_or(now);

    let tags = [
        ("TodayYear", now.format("%Y").to_string()),
        ("TodayMonth", now.format("%m").to_string()),
        ("TodayDay", now.format("%d").to_string()),
        ("YesterdayYear", yesterday.format("%Y").to_string()),
        ("YesterdayMonth", yesterday.format("%m").to_string()),
        ("YesterdayDay", yesterday.format("%d").to_string()),
        ("TwoDaysAgoYear", two_days_ago.format("%Y").to_string()),
        ("TwoDaysAgoMonth", two_days_ago.format("%m").to_string()),
        ("TwoDaysAgoDay", two_days_ago.format("%d").to_string()),
        ("Now", now.format("%Y%m%d%H%M%S").to_string()),
    ];

    let mut expanded = pattern.to_string();
    for (name, value) in &tags {
        expanded = expanded.replace(&format!("${{{name}}}"), value);
        expanded = expanded.replace(&format!("${name}"), value);
    }

    expanded
}
