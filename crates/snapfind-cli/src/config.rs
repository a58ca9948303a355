use serde::Deserialize;
use snapfind_core::{ApiBase, Facing, ParseError, WorkflowConfig};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error(transparent)]
    Invalid(#[from] ParseError),
}

/// Client configuration: optional TOML file, overridden by `SNAPFIND_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API base URL, including the `/api` context path.
    pub api_base_url: String,
    /// V4L2 device for the front lens.
    pub front_camera: String,
    /// V4L2 device for the back lens, if any.
    pub back_camera: Option<String>,
    /// JPEG quality for captured faces (1–100).
    pub jpeg_quality: u8,
    /// Frames discarded when a camera session starts (AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Root under which the `EventPhotos` album is created.
    pub album_dir: PathBuf,
    pub auto_start_camera: bool,
    pub restart_camera_on_reset: bool,
    pub request_timeout_secs: u64,
    /// Allow camera use against a plain-HTTP, non-loopback API.
    pub allow_insecure_origin: bool,
    /// Bearer token for the admin/photographer commands.
    pub auth_token: Option<String>,
    /// Grabs attempted while the camera is still warming up.
    pub capture_attempts: usize,
}

impl Default for Config {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            front_camera: "/dev/video0".to_string(),
            back_camera: None,
            jpeg_quality: snapfind_core::DEFAULT_JPEG_QUALITY,
            warmup_frames: 4,
            album_dir: PathBuf::from(home).join("Pictures"),
            auto_start_camera: true,
            restart_camera_on_reset: false,
            request_timeout_secs: 30,
            allow_insecure_origin: false,
            auth_token: None,
            capture_attempts: 5,
        }
    }
}

impl Config {
    /// Load from `path` (or `SNAPFIND_CONFIG`), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("SNAPFIND_CONFIG").ok().map(PathBuf::from));

        let mut config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    /// Override fields from `SNAPFIND_*` variables. Unparseable values are ignored.
    fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, var: F) {
        if let Some(v) = var("SNAPFIND_API_BASE_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = var("SNAPFIND_FRONT_CAMERA") {
            self.front_camera = v;
        }
        if let Some(v) = var("SNAPFIND_BACK_CAMERA") {
            self.back_camera = Some(v).filter(|v| !v.is_empty());
        }
        if let Some(v) = var("SNAPFIND_ALBUM_DIR") {
            self.album_dir = PathBuf::from(v);
        }
        if let Some(v) = var("SNAPFIND_AUTH_TOKEN") {
            self.auth_token = Some(v).filter(|v| !v.is_empty());
        }
        env_parse(&var, "SNAPFIND_JPEG_QUALITY", &mut self.jpeg_quality);
        env_parse(&var, "SNAPFIND_WARMUP_FRAMES", &mut self.warmup_frames);
        env_parse(&var, "SNAPFIND_REQUEST_TIMEOUT_SECS", &mut self.request_timeout_secs);
        env_parse(&var, "SNAPFIND_CAPTURE_ATTEMPTS", &mut self.capture_attempts);
        env_bool(&var, "SNAPFIND_AUTO_START_CAMERA", &mut self.auto_start_camera);
        env_bool(&var, "SNAPFIND_RESTART_CAMERA_ON_RESET", &mut self.restart_camera_on_reset);
        env_bool(&var, "SNAPFIND_ALLOW_INSECURE_ORIGIN", &mut self.allow_insecure_origin);
    }

    pub fn api_base(&self) -> Result<ApiBase, ConfigError> {
        Ok(ApiBase::parse(&self.api_base_url)?)
    }

    /// Whether camera access is allowed against `base`.
    pub fn secure_context(&self, base: &ApiBase) -> bool {
        base.is_secure() || self.allow_insecure_origin
    }

    pub fn workflow(&self, facing: Facing) -> WorkflowConfig {
        WorkflowConfig {
            auto_start_camera: self.auto_start_camera,
            restart_camera_on_reset: self.restart_camera_on_reset,
            facing,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn env_parse<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    if let Some(v) = var(key).and_then(|v| v.trim().parse().ok()) {
        *slot = v;
    }
}

fn env_bool(var: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut bool) {
    if let Some(v) = var(key) {
        *slot = !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:8080/api");
        assert_eq!(config.jpeg_quality, 95);
        assert!(config.auto_start_camera);
        assert!(!config.allow_insecure_origin);
        assert!(config.secure_context(&config.api_base().unwrap()));
    }

    #[test]
    fn test_toml_partial_file() {
        let config: Config = toml::from_str(
            r#"
            api_base_url = "https://photos.example.com/api"
            back_camera = "/dev/video2"
            auto_start_camera = false
            "#,
        )
        .unwrap();
        assert_eq!(config.back_camera.as_deref(), Some("/dev/video2"));
        assert!(!config.auto_start_camera);
        assert_eq!(config.warmup_frames, 4);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("SNAPFIND_API_BASE_URL", "http://10.0.0.5:8080/api"),
            ("SNAPFIND_JPEG_QUALITY", "70"),
            ("SNAPFIND_ALLOW_INSECURE_ORIGIN", "1"),
            ("SNAPFIND_AUTO_START_CAMERA", "false"),
        ]));
        assert_eq!(config.jpeg_quality, 70);
        assert!(!config.auto_start_camera);

        let base = config.api_base().unwrap();
        assert!(!base.is_secure());
        assert!(config.secure_context(&base));
    }

    #[test]
    fn test_unparseable_env_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("SNAPFIND_WARMUP_FRAMES", "many"),
            ("SNAPFIND_BACK_CAMERA", ""),
        ]));
        assert_eq!(config.warmup_frames, 4);
        assert_eq!(config.back_camera, None);
    }

    #[test]
    fn test_insecure_remote_origin() {
        let mut config = Config::default();
        config.apply_env(env(&[("SNAPFIND_API_BASE_URL", "http://photos.example.com/api")]));
        let base = config.api_base().unwrap();
        assert!(!config.secure_context(&base));
    }

    #[test]
    fn test_invalid_base_url() {
        let config = Config {
            api_base_url: "ftp://host".into(),
            ..Config::default()
        };
        assert!(matches!(config.api_base(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/snapfind.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
