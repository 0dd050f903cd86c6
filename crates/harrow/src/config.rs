//! Configuration: a YAML file merged with CLI overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Path patterns excluded from crawling by default: editor droppings,
/// media, and binary formats the parsers cannot read anyway.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "*/~*",
    "*/.idea/*",
    "*/.svn/*",
    "*/.pyenv/*",
    "*/*.svg",
    "*/*.jpeg",
    "*/*.jpg",
    "*/*.png",
    "*/*.gif",
    "*/*.ico",
    "*/*.css",
    "*/*.html",
    "*/*.htm",
    "*/*.ttf",
    "*/*.woff",
    "*/*.wof2",
    "*/*.pyc",
    "*/*.exe",
    "*/*.dll",
    "*/*.msi",
    "*/*.emf",
    "*/*.bdb",
    "*/*.vox",
    "*/*.bin",
    "*/*.dat",
    "*/*.pkl",
    "*/*.parquet",
    "*/*.parq",
    "*/*.rsc",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub elasticsearch: ElasticConfig,
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Logical crawl name; doubles as the search index name.
    pub crawl_name: String,
    /// Ledger location. Defaults to `~/.harrow/<crawl_name>/ledger.sqlite3`.
    pub db_file: Option<PathBuf>,
    /// Files larger than this many bytes are skipped. None = unlimited.
    pub max_size: Option<u64>,
    /// Content is truncated to this many characters before delivery.
    pub indexed_chars: usize,
    /// Glob patterns excluded from the crawl (matched case-insensitively).
    pub excludes: Vec<String>,
    pub continue_on_error: bool,
    pub index_empty_files: bool,
    /// Mine `.git` directories for historical blobs.
    pub git_support: bool,
    /// Total worker budget; split 80/20 between processing and delivery.
    /// 0 = one per CPU.
    pub tasks: usize,
    /// Credentials on these domains are suppressed as internal/test noise.
    pub exclude_domains: Vec<String>,
    /// Free-mail domains; leaks there score lower.
    pub public_domains: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            crawl_name: "harrow".to_string(),
            db_file: None,
            max_size: None,
            indexed_chars: 1_000_000,
            excludes: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            continue_on_error: true,
            index_empty_files: false,
            git_support: true,
            tasks: 0,
            exclude_domains: Vec::new(),
            public_domains: harrow_rules::rules::DEFAULT_PUBLIC_DOMAINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl GeneralConfig {
    /// Processing/delivery pool sizes: roughly 80/20, at least one each.
    pub fn pool_sizes(&self) -> (usize, usize) {
        let total = if self.tasks == 0 {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
        } else {
            self.tasks
        };
        let total = total.clamp(2, 100);
        let processing = ((total as f64) * 0.8) as usize;
        let processing = processing.clamp(1, total - 1);
        (processing, total - processing)
    }

    pub fn db_path(&self) -> PathBuf {
        match &self.db_file {
            Some(path) => path.clone(),
            None => harrow_logging::harrow_home()
                .join(&self.crawl_name)
                .join("ledger.sqlite3"),
        }
    }

    pub fn leak_context(&self) -> harrow_rules::LeakContext {
        harrow_rules::LeakContext {
            exclude_domains: self.exclude_domains.clone(),
            public_domains: self.public_domains.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticConfig {
    /// Node base URLs; the first reachable one is used.
    pub nodes: Vec<String>,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            nodes: vec!["http://127.0.0.1:9200".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Findings below this severity never alert.
    pub min_severity: u8,
    pub telegram: Option<TelegramConfig>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            min_severity: 70,
            telegram: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl Config {
    /// Load a YAML config file; a missing `path` yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// A commented sample config for `harrow config init`.
    pub fn sample_yaml() -> String {
        let body = serde_yaml::to_string(&Self::default()).unwrap_or_default();
        format!(
            "# Harrow configuration.\n\
             # Every key is optional; the values below are the defaults.\n\
             {body}"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_yaml() {
        let parsed: Config = serde_yaml::from_str(&Config::sample_yaml()).unwrap();
        assert_eq!(parsed.general.crawl_name, "harrow");
        assert_eq!(parsed.general.indexed_chars, 1_000_000);
        assert!(parsed.general.continue_on_error);
        assert_eq!(parsed.alerts.min_severity, 70);
    }

    #[test]
    fn pool_sizes_split_and_stay_positive() {
        let mut general = GeneralConfig {
            tasks: 10,
            ..Default::default()
        };
        assert_eq!(general.pool_sizes(), (8, 2));

        general.tasks = 2;
        let (processing, delivery) = general.pool_sizes();
        assert!(processing >= 1 && delivery >= 1);
        assert_eq!(processing + delivery, 2);
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let cfg: Config =
            serde_yaml::from_str("general:\n  crawl_name: audit-2026\n  tasks: 4\n").unwrap();
        assert_eq!(cfg.general.crawl_name, "audit-2026");
        assert_eq!(cfg.general.tasks, 4);
        assert!(cfg.general.git_support, "untouched fields keep defaults");
    }
}
