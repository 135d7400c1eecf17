use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub const CONFIG_FILE: &str = "linkerx.toml";

/// Service settings. Read from `linkerx.toml` in the data directory, then
/// overridden by environment variables. Delays are whole seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bot_token: String,
    pub operator_api_url: Option<String>,
    pub helper_api_url: String,
    pub helper_token: String,
    /// Gate for owner-only commands; 0 disables them.
    pub owner_id: i64,
    pub bots_to_add: Vec<String>,

    pub max_user_channels: usize,
    pub max_evictions_per_call: usize,
    pub eviction_pause: u64,

    pub sync_channel_delay: u64,
    pub sync_action_delay: u64,
    pub sync_poll_interval: u64,
    pub helper_settle_delay: u64,
    pub rejoin_settle_delay: u64,

    pub queue_cooldown: u64,
    pub queue_notify_interval: u64,
    pub eta_task_overhead: u64,
    pub eta_per_agent: u64,

    pub rate_limit_margin: u64,
    pub grant_retry_attempts: u32,
    pub grant_retry_delay: u64,

    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            operator_api_url: None,
            helper_api_url: String::new(),
            helper_token: String::new(),
            owner_id: 0,
            bots_to_add: Vec::new(),
            max_user_channels: 300,
            max_evictions_per_call: 5,
            eviction_pause: 2,
            sync_channel_delay: 15,
            sync_action_delay: 4,
            sync_poll_interval: 5,
            helper_settle_delay: 10,
            rejoin_settle_delay: 10,
            queue_cooldown: 2,
            queue_notify_interval: 30,
            eta_task_overhead: 20,
            eta_per_agent: 5,
            rate_limit_margin: 1,
            grant_retry_attempts: 3,
            grant_retry_delay: 5,
            log_level: "info".to_string(),
        }
    }
}

/// `@`-prefixed, trimmed, de-duplicated (first occurrence wins).
pub fn normalize_agents<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for entry in raw {
        let name = entry.as_ref().trim();
        if name.is_empty() {
            continue;
        }
        let name = if name.starts_with('@') || name.parse::<i64>().is_ok() {
            name.to_string()
        } else {
            format!("@{}", name)
        };
        if !out.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
            out.push(name);
        }
    }
    out
}

fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

impl Config {
    pub async fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let path = data_dir.as_ref().join(CONFIG_FILE);
        let mut config = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("invalid {}", path.display()))?
        } else {
            info!("No {} found, using environment only.", CONFIG_FILE);
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.bots_to_add = normalize_agents(&config.bots_to_add);
        Ok(config)
    }

    /// Overlay values from `lookup` (normally the process environment).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: String) -> Result<T> {
            raw.trim()
                .parse::<T>()
                .map_err(|_| anyhow::anyhow!("{} has an invalid value: {:?}", key, raw))
        }

        if let Some(v) = lookup("BOT_TOKEN") {
            self.bot_token = v;
        }
        if let Some(v) = lookup("OPERATOR_API_URL") {
            self.operator_api_url = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = lookup("HELPER_API_URL") {
            self.helper_api_url = v;
        }
        if let Some(v) = lookup("HELPER_TOKEN") {
            self.helper_token = v;
        }
        if let Some(v) = lookup("OWNER_ID") {
            self.owner_id = parse("OWNER_ID", v)?;
        }
        if let Some(v) = lookup("BOTS_TO_ADD") {
            self.bots_to_add = v.split(',').map(str::to_string).collect();
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v;
        }

        let numeric: [(&str, &mut u64); 12] = [
            ("EVICTION_PAUSE", &mut self.eviction_pause),
            ("SYNC_CHANNEL_DELAY", &mut self.sync_channel_delay),
            ("SYNC_ACTION_DELAY", &mut self.sync_action_delay),
            ("SYNC_POLL_INTERVAL", &mut self.sync_poll_interval),
            ("HELPER_SETTLE_DELAY", &mut self.helper_settle_delay),
            ("REJOIN_SETTLE_DELAY", &mut self.rejoin_settle_delay),
            ("QUEUE_COOLDOWN", &mut self.queue_cooldown),
            ("QUEUE_NOTIFY_INTERVAL", &mut self.queue_notify_interval),
            ("ETA_TASK_OVERHEAD", &mut self.eta_task_overhead),
            ("ETA_PER_AGENT", &mut self.eta_per_agent),
            ("RATE_LIMIT_MARGIN", &mut self.rate_limit_margin),
            ("GRANT_RETRY_DELAY", &mut self.grant_retry_delay),
        ];
        for (key, slot) in numeric {
            if let Some(v) = lookup(key) {
                *slot = parse(key, v)?;
            }
        }
        if let Some(v) = lookup("MAX_USER_CHANNELS") {
            self.max_user_channels = parse("MAX_USER_CHANNELS", v)?;
        }
        if let Some(v) = lookup("MAX_EVICTIONS_PER_CALL") {
            self.max_evictions_per_call = parse("MAX_EVICTIONS_PER_CALL", v)?;
        }
        if let Some(v) = lookup("GRANT_RETRY_ATTEMPTS") {
            self.grant_retry_attempts = parse("GRANT_RETRY_ATTEMPTS", v)?;
        }
        Ok(())
    }

    /// Hard errors fail; soft problems come back as warnings.
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut missing = Vec::new();
        if self.bot_token.trim().is_empty() {
            missing.push("BOT_TOKEN");
        }
        if self.helper_api_url.trim().is_empty() {
            missing.push("HELPER_API_URL");
        }
        if self.helper_token.trim().is_empty() {
            missing.push("HELPER_TOKEN");
        }
        if !missing.is_empty() {
            bail!("Missing settings: {}", missing.join(", "));
        }
        url::Url::parse(&self.helper_api_url)
            .with_context(|| format!("HELPER_API_URL is not a URL: {}", self.helper_api_url))?;
        if let Some(ref op) = self.operator_api_url {
            url::Url::parse(op).with_context(|| format!("OPERATOR_API_URL is not a URL: {}", op))?;
        }
        if self.max_user_channels == 0 {
            bail!("MAX_USER_CHANNELS must be at least 1");
        }

        let mut warnings = Vec::new();
        if self.owner_id == 0 {
            warnings.push(
                "OWNER_ID not set - /sync, /stats and the archive commands are disabled".to_string(),
            );
        }
        if self.bots_to_add.is_empty() {
            warnings.push("No bots configured in BOTS_TO_ADD".to_string());
        }
        if self.grant_retry_attempts == 0 {
            warnings.push("GRANT_RETRY_ATTEMPTS is 0; grants will be tried once".to_string());
        }
        for w in &warnings {
            warn!("{}", w);
        }
        Ok(warnings)
    }

    pub fn owner_commands_enabled(&self) -> bool {
        self.owner_id != 0
    }

    pub fn is_owner(&self, user_id: i64) -> bool {
        self.owner_commands_enabled() && self.owner_id == user_id
    }

    pub fn action_delay(&self) -> Duration {
        secs(self.sync_action_delay)
    }

    pub fn channel_delay(&self) -> Duration {
        secs(self.sync_channel_delay)
    }

    pub fn sync_poll_interval(&self) -> Duration {
        secs(self.sync_poll_interval)
    }

    pub fn settle_delay(&self) -> Duration {
        secs(self.helper_settle_delay)
    }

    pub fn rejoin_settle_delay(&self) -> Duration {
        secs(self.rejoin_settle_delay)
    }

    pub fn eviction_pause(&self) -> Duration {
        secs(self.eviction_pause)
    }

    pub fn queue_cooldown(&self) -> Duration {
        secs(self.queue_cooldown)
    }

    pub fn queue_notify_interval(&self) -> Duration {
        secs(self.queue_notify_interval)
    }

    pub fn rate_limit_margin(&self) -> Duration {
        secs(self.rate_limit_margin)
    }

    pub fn grant_retry_delay(&self) -> Duration {
        secs(self.grant_retry_delay)
    }

    /// Estimated wait for a task at 1-based `position`.
    pub fn eta(&self, position: usize) -> Duration {
        let per_task =
            self.eta_task_overhead + self.eta_per_agent * self.bots_to_add.len() as u64;
        secs(per_task * position as u64)
    }
}
