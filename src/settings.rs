use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use dirs_next::config_dir;
use serde::{Deserialize, Serialize};

use crate::session::SessionSettings;

pub const ENV_PREFIX: &str = "DRAMAIN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base: String,
    /// Origin of the server-side relay used as the last resolution step.
    pub relay_base: String,
    pub lang: String,
    pub rate_limit_ms: u64,
    pub request_timeout_secs: u64,
    pub resume_threshold_secs: f64,
    pub seek_step_secs: f64,
    /// Full player command line; split like a shell would.
    pub player: String,
    pub preferred_subtitle: String,
    pub progress_file: Option<PathBuf>,
    pub progress_flush_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: String::from("https://dramabos.asia/api/radreel/api/v1"),
            relay_base: String::from("https://dramain-aja.web.app"),
            lang: String::from("id"),
            rate_limit_ms: 500,
            request_timeout_secs: 10,
            resume_threshold_secs: 10.0,
            seek_step_secs: 10.0,
            player: String::from("mpv"),
            preferred_subtitle: String::from("id"),
            progress_file: None,
            progress_flush_secs: 5,
        }
    }
}

impl Settings {
    /// Defaults, then the config file (if present), then `DRAMAIN_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => config_path()?,
        };
        let settings: Settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::new(&path.to_string_lossy(), FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .with_context(|| format!("failed to read config {}", path.display()))?
            .try_deserialize()
            .context("invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.lang.trim().is_empty() {
            return Err(anyhow!("`lang` must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("`request_timeout_secs` must be at least 1"));
        }
        Ok(())
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn progress_flush(&self) -> Duration {
        Duration::from_secs(self.progress_flush_secs)
    }

    pub fn session(&self) -> SessionSettings {
        SessionSettings {
            resume_threshold_secs: self.resume_threshold_secs,
            seek_step_secs: self.seek_step_secs,
            preferred_subtitle: self.preferred_subtitle.clone(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
    Ok(base.join("dramain").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = Settings::load(Some(&dir.path().join("absent.toml"))).expect("load");
        assert_eq!(settings.rate_limit(), Duration::from_millis(500));
        assert_eq!(settings.request_timeout(), Duration::from_secs(10));
        assert_eq!(settings.player, "mpv");
        assert!(settings.progress_file.is_none());
    }

    #[test]
    fn file_overrides_only_what_it_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "player = \"mpv --hwdec=auto\"\nseek_step_secs = 5.0\nprogress_file = \"/tmp/p.json\"\n",
        )
        .expect("write");

        let settings = Settings::load(Some(&path)).expect("load");
        assert_eq!(settings.player, "mpv --hwdec=auto");
        assert_eq!(settings.session().seek_step_secs, 5.0);
        assert_eq!(settings.progress_file, Some(PathBuf::from("/tmp/p.json")));
        assert_eq!(settings.lang, "id");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "request_timeout_secs = 0\n").expect("write");
        assert!(Settings::load(Some(&path)).is_err());
    }
}
