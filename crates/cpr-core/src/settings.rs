//! Runtime settings resolved from the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::query::guards::{DEFAULT_MAX_PAGE_SIZE, DEFAULT_PAGE_SIZE, MIN_ANALYZER_TIMEOUT_SECS};

const DEFAULT_WORKERS: usize = 8;
const DEFAULT_ANALYZER_TIMEOUT_SECS: u64 = 60;
const DEFAULT_PROLEAP_MAIN: &str = "com.renova.proleap.CLI";

/// Backend used for run bookkeeping (source index + manifest documents).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStoreBackend {
    Fs,
    Sqlite,
}

/// Classpath + entry point of one Java bridge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BridgeSettings {
    pub jar: Option<PathBuf>,
    pub classpath: Option<String>,
    pub main_class: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub page_size: usize,
    pub max_page_size: usize,
    pub workers: usize,
    pub cache_dir: PathBuf,
    pub run_store: RunStoreBackend,
    pub java_bin: String,
    pub proleap: BridgeSettings,
    pub cb2xml: BridgeSettings,
    pub source_format: String,
    pub analyzer_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            workers: DEFAULT_WORKERS,
            cache_dir: PathBuf::from(".cache"),
            run_store: RunStoreBackend::Fs,
            java_bin: "java".to_string(),
            proleap: BridgeSettings {
                main_class: Some(DEFAULT_PROLEAP_MAIN.to_string()),
                ..BridgeSettings::default()
            },
            cb2xml: BridgeSettings::default(),
            source_format: "FIXED".to_string(),
            analyzer_timeout: Duration::from_secs(DEFAULT_ANALYZER_TIMEOUT_SECS),
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(val) if !val.trim().is_empty() => Some(val.trim().to_string()),
        _ => None,
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    env_string(name)
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn analyzer_timeout_from_env() -> Duration {
    let secs = env_string("COBOL_JAVA_TIMEOUT_SEC")
        .or_else(|| env_string("PROLEAP_JAVA_TIMEOUT_SEC"))
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_ANALYZER_TIMEOUT_SECS);
    Duration::from_secs(secs.max(MIN_ANALYZER_TIMEOUT_SECS))
}

impl Settings {
    /// Read settings from environment variables, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Settings::default();
        let run_store = match env_string("RUN_STORE") {
            Some(v) if v.eq_ignore_ascii_case("sqlite") => RunStoreBackend::Sqlite,
            _ => RunStoreBackend::Fs,
        };
        let settings = Self {
            page_size: env_usize("PAGE_SIZE", defaults.page_size).max(1),
            max_page_size: env_usize("MAX_PAGE_SIZE", defaults.max_page_size).max(1),
            workers: env_usize("WORKERS", defaults.workers).max(1),
            cache_dir: env_string("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            run_store,
            java_bin: env_string("JAVA_BIN").unwrap_or(defaults.java_bin),
            proleap: BridgeSettings {
                jar: env_string("PROLEAP_JAR").map(PathBuf::from),
                classpath: env_string("PROLEAP_CP"),
                main_class: env_string("PROLEAP_MAIN").or(defaults.proleap.main_class),
            },
            cb2xml: BridgeSettings {
                jar: env_string("CB2XML_JAR").map(PathBuf::from),
                classpath: env_string("CB2XML_CP"),
                main_class: env_string("CB2XML_MAIN"),
            },
            source_format: env_string("COBOL_SOURCE_FORMAT").unwrap_or(defaults.source_format),
            analyzer_timeout: analyzer_timeout_from_env(),
        };
        tracing::info!(
            cache_dir = %settings.cache_dir.display(),
            workers = settings.workers,
            page_size = settings.page_size,
            max_page_size = settings.max_page_size,
            "settings loaded"
        );
        tracing::info!(
            proleap_jar = ?settings.proleap.jar,
            proleap_main = ?settings.proleap.main_class,
            cb2xml_jar = ?settings.cb2xml.jar,
            cb2xml_main = ?settings.cb2xml.main_class,
            "analyzer bridges"
        );
        settings
    }
}
