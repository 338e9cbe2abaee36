use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::PathBuf,
    time::Duration,
};

use directories::BaseDirs;

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let mut map = default_map();
        let config_path = default_config_path();

        // Read .codecanvasrc if exists
        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(Result::ok) {
                    if let Some((k, v)) = parse_line(&line) {
                        map.insert(k, v);
                    }
                }
            }
        }

        // Overlay environment variables (take precedence)
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path }
    }

    /// Build a config from defaults plus explicit overrides, ignoring the rc
    /// file and the environment.
    #[cfg(test)]
    pub fn with_overrides(pairs: &[(&str, &str)]) -> Self {
        let mut inner = default_map();
        for (k, v) in pairs {
            inner.insert((*k).to_string(), (*v).to_string());
        }
        Self { inner, config_path: PathBuf::new() }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_f32(&self, key: &str) -> Option<f32> {
        self.get(key).and_then(|v| v.trim().parse::<f32>().ok())
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from)
    }

    pub fn api_key(&self) -> Option<String> {
        self.get("CODECANVAS_API_KEY")
            .or_else(|| self.get("OPENAI_API_KEY"))
            .filter(|k| !k.trim().is_empty())
    }

    /// Capability packages loaded into the interpreter, in load order.
    pub fn capabilities(&self) -> Vec<String> {
        self.get("CAPABILITIES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.get_u64("EXECUTION_TIMEOUT").unwrap_or(30))
    }

    pub fn generation_delay(&self) -> Duration {
        Duration::from_millis(self.get_u64("GENERATION_DELAY_MS").unwrap_or(1000))
    }

    pub fn export_grace(&self) -> Duration {
        Duration::from_millis(self.get_u64("EXPORT_GRACE_MS").unwrap_or(2000))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.get_u64("REQUEST_TIMEOUT").unwrap_or(60))
    }
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (k, v) = line.split_once('=')?;
    Some((k.trim().to_string(), v.trim().to_string()))
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &[
        "OPENAI_API_KEY",
        "API_BASE_URL",
        "DEFAULT_MODEL",
        "REQUEST_TIMEOUT",
        "TEMPERATURE",
        "MAX_TOKENS",
        "GENERATION_ENDPOINT",
        "GENERATION_DELAY_MS",
        "PYTHON_BIN",
        "CAPABILITIES",
        "EXECUTION_TIMEOUT",
        "ARTIFACT_DIR",
        "EXPORT_GRACE_MS",
        "ROLE_PATH",
    ];

    KEYS.contains(&k) || k.starts_with("CODECANVAS_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("codecanvas").join(".codecanvasrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    // Generation
    m.insert(
        "API_BASE_URL".into(),
        "https://api.intelligence.io.solutions/api/v1".into(),
    );
    m.insert("DEFAULT_MODEL".into(), "Qwen/Qwen3-235B-A22B-Thinking-2507".into());
    m.insert("REQUEST_TIMEOUT".into(), "60".into());
    m.insert("TEMPERATURE".into(), "0.3".into());
    m.insert("MAX_TOKENS".into(), "2000".into());
    m.insert("GENERATION_DELAY_MS".into(), "1000".into());

    // Runtime
    m.insert("PYTHON_BIN".into(), "python3".into());
    m.insert("CAPABILITIES".into(), "numpy,pandas,matplotlib,scipy,sympy".into());
    m.insert("EXECUTION_TIMEOUT".into(), "30".into());

    // Rendering
    m.insert("EXPORT_GRACE_MS".into(), "2000".into());

    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rc_lines_skip_comments_and_blanks() {
        assert_eq!(parse_line("# comment"), None);
        assert_eq!(parse_line("   "), None);
        assert_eq!(
            parse_line(" PYTHON_BIN = /usr/bin/python3 "),
            Some(("PYTHON_BIN".into(), "/usr/bin/python3".into()))
        );
    }

    #[test]
    fn capabilities_are_split_and_trimmed() {
        let cfg = Config::with_overrides(&[("CAPABILITIES", " numpy, ,sympy ")]);
        assert_eq!(cfg.capabilities(), vec!["numpy", "sympy"]);

        let none = Config::with_overrides(&[("CAPABILITIES", "")]);
        assert!(none.capabilities().is_empty());
    }

    #[test]
    fn durations_fall_back_to_defaults() {
        let cfg = Config::with_overrides(&[("EXECUTION_TIMEOUT", "nope")]);
        assert_eq!(cfg.execution_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.generation_delay(), Duration::from_millis(1000));
        assert_eq!(cfg.export_grace(), Duration::from_millis(2000));
    }

    #[test]
    fn api_key_prefers_codecanvas_key() {
        let cfg = Config::with_overrides(&[
            ("OPENAI_API_KEY", "openai"),
            ("CODECANVAS_API_KEY", "canvas"),
        ]);
        assert_eq!(cfg.api_key().as_deref(), Some("canvas"));

        let fallback = Config::with_overrides(&[("OPENAI_API_KEY", "openai")]);
        assert_eq!(fallback.api_key().as_deref(), Some("openai"));
    }

    #[test]
    fn only_known_keys_come_from_environment() {
        assert!(is_config_key("PYTHON_BIN"));
        assert!(is_config_key("CODECANVAS_API_KEY"));
        assert!(!is_config_key("HOME"));
    }
}
