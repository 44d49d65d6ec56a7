use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use directories::BaseDirs;

use crate::{
    process::{default_python, Interpreter},
    segment::{MarkerSet, Mode},
};

const ENV_PREFIX: &str = "PYLIVE_";

const KEYS: &[&str] = &[
    "EVALUATION_MODE",
    "EVALUATION_MARKERS",
    "EVALUATION_DELAY",
    "DEBOUNCE_DELAY",
    "EVALUATION_TIMEOUT",
    "PYTHON_PATH",
    "SHOW_WAITING_INDICATOR",
    "SHOW_TIMINGS",
    "DEBUG",
];

/// Layered key/value configuration: defaults, then `.pyliverc`, then `PYLIVE_*` env vars.
#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    unknown: Vec<String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        Self::from_path(&default_config_path())
    }

    pub fn from_path(config_path: &Path) -> Self {
        let mut map = default_map();
        let mut unknown = Vec::new();

        // Read .pyliverc if exists
        if config_path.exists() {
            if let Ok(file) = fs::File::open(config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(std::io::Result::ok) {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=') {
                        let key = k.trim();
                        if !Self::is_known_key(key) {
                            unknown.push(key.to_string());
                            continue;
                        }
                        map.insert(key.to_string(), v.trim().to_string());
                    }
                }
            }
        }

        Self { inner: map, unknown, config_path: config_path.to_path_buf() }
    }

    /// Keys in the file that were ignored, in file order.
    pub fn unknown_keys(&self) -> &[String] {
        &self.unknown
    }

    pub fn get(&self, key: &str) -> Option<String> {
        // ENV first
        if let Ok(v) = env::var(format!("{}{}", ENV_PREFIX, key)) {
            return Some(v);
        }
        self.inner.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        self.get(key)
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .with_context(|| format!("{} must be a non-negative integer, got '{}'", key, v))
            })
            .transpose()
    }

    pub fn is_known_key(key: &str) -> bool {
        KEYS.contains(&key)
    }
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("pylive").join(".pyliverc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    // Strings
    m.insert("EVALUATION_MODE".into(), "explicit".into());
    m.insert("EVALUATION_MARKERS".into(), "# ?,# /".into());
    m.insert("PYTHON_PATH".into(), default_python().into());

    // Milliseconds
    m.insert("EVALUATION_DELAY".into(), "0".into());
    m.insert("DEBOUNCE_DELAY".into(), "300".into());
    m.insert("EVALUATION_TIMEOUT".into(), "5000".into());

    // Bools as strings
    m.insert("SHOW_WAITING_INDICATOR".into(), "true".into());
    m.insert("SHOW_TIMINGS".into(), "false".into());
    m.insert("DEBUG".into(), "false".into());

    m
}

/// Immutable settings snapshot handed to each evaluation cycle.
#[derive(Debug, Clone)]
pub struct EvalSettings {
    pub mode: Mode,
    pub markers: MarkerSet,
    /// Pause between units, skipped before the first one.
    pub unit_delay: Duration,
    pub debounce: Duration,
    pub timeout: Duration,
    pub python: Interpreter,
    pub show_waiting: bool,
    pub show_timings: bool,
    pub debug: bool,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            markers: MarkerSet::default(),
            unit_delay: Duration::ZERO,
            debounce: Duration::from_millis(300),
            timeout: Duration::from_millis(5000),
            python: Interpreter::default(),
            show_waiting: true,
            show_timings: false,
            debug: false,
        }
    }
}

impl EvalSettings {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let defaults = Self::default();
        let millis = |key: &str, fallback: Duration| -> Result<Duration> {
            Ok(cfg.get_u64(key)?.map(Duration::from_millis).unwrap_or(fallback))
        };

        let mode = match cfg.get("EVALUATION_MODE") {
            Some(v) => v.parse::<Mode>()?,
            None => defaults.mode,
        };

        Ok(Self {
            mode,
            markers: cfg
                .get("EVALUATION_MARKERS")
                .map(|v| MarkerSet::parse(&v))
                .unwrap_or(defaults.markers),
            unit_delay: millis("EVALUATION_DELAY", defaults.unit_delay)?,
            debounce: millis("DEBOUNCE_DELAY", defaults.debounce)?,
            timeout: millis("EVALUATION_TIMEOUT", defaults.timeout)?,
            python: cfg.get("PYTHON_PATH").map(Interpreter::new).unwrap_or(defaults.python),
            show_waiting: cfg.get_bool("SHOW_WAITING_INDICATOR"),
            show_timings: cfg.get_bool("SHOW_TIMINGS"),
            debug: cfg.get_bool("DEBUG"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_with(contents: &str) -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".pyliverc");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        let cfg = Config::from_path(&path);
        (dir, cfg)
    }

    #[test]
    fn test_defaults_without_file() {
        let cfg = Config::from_path(Path::new("/nonexistent/pylive/.pyliverc"));
        let settings = EvalSettings::from_config(&cfg).unwrap();
        assert_eq!(settings.mode, Mode::Explicit);
        assert_eq!(settings.markers, MarkerSet::default());
        assert_eq!(settings.timeout, Duration::from_millis(5000));
        assert_eq!(settings.debounce, Duration::from_millis(300));
        assert_eq!(settings.unit_delay, Duration::ZERO);
        assert!(settings.show_waiting);
        assert!(!settings.show_timings);
    }

    #[test]
    fn test_file_values_override_defaults() {
        let (_dir, cfg) = config_with(
            "# pylive settings\nEVALUATION_MODE = auto\nEVALUATION_MARKERS=# =>, # ?\nEVALUATION_DELAY=250\nPYTHON_PATH=/opt/py/bin/python\n\nSHOW_TIMINGS=TRUE\n",
        );
        let settings = EvalSettings::from_config(&cfg).unwrap();
        assert_eq!(settings.mode, Mode::Auto);
        assert_eq!(settings.markers, MarkerSet::new(["# =>", "# ?"]));
        assert_eq!(settings.unit_delay, Duration::from_millis(250));
        assert_eq!(settings.python.path(), "/opt/py/bin/python");
        assert!(settings.show_timings);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let (_dir, cfg) = config_with("EVALUATION_MODE=sometimes\n");
        assert!(EvalSettings::from_config(&cfg).is_err());

        let (_dir, cfg) = config_with("EVALUATION_TIMEOUT=-5\n");
        let err = EvalSettings::from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("EVALUATION_TIMEOUT"));
    }

    #[test]
    fn test_unknown_keys_are_collected_not_applied() {
        let (_dir, cfg) = config_with("OPENAI_API_KEY=sk-test\nSHOW_TIMINGS=true\nTHEME=dark\n");
        assert_eq!(cfg.unknown_keys(), ["OPENAI_API_KEY".to_string(), "THEME".to_string()]);
        assert_eq!(cfg.get("THEME"), None);
        assert!(cfg.get_bool("SHOW_TIMINGS"));
    }

    #[test]
    fn test_known_keys() {
        assert!(Config::is_known_key("DEBOUNCE_DELAY"));
        assert!(!Config::is_known_key("OPENAI_API_KEY"));
    }
}
