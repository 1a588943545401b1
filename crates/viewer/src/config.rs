//! Viewer configuration
//!
//! Cache bound, prefetch window, debounce interval and zoom limits. A
//! configuration can be loaded from a TOML file, from `FOLIO_*` environment
//! variables, or built programmatically.

use folio_cache::{WindowError, WindowPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Settings for one [`ViewerController`](crate::ViewerController)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Maximum number of resident pages
    pub capacity: u32,
    /// Pages prefetched behind the reading position
    pub look_behind: u32,
    /// Pages prefetched ahead of the reading position
    pub look_ahead: u32,
    /// Pages decoded eagerly when a document opens
    pub initial_burst: u32,
    /// Quiet interval before a navigation burst settles
    pub debounce_ms: u64,
    /// Raster scale at zoom 1.0
    pub render_scale: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub zoom_step: f32,
    /// JPEG quality used when exporting pages for display
    pub jpeg_quality: u8,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            capacity: 15,
            look_behind: 2,
            look_ahead: 3,
            initial_burst: 10,
            debounce_ms: 100,
            render_scale: 1.5,
            min_zoom: 0.5,
            max_zoom: 1.2,
            zoom_step: 0.1,
            jpeg_quality: 85,
        }
    }
}

impl ViewerConfig {
    pub fn with_capacity(mut self, pages: u32) -> Self {
        self.capacity = pages;
        self
    }

    pub fn with_look_behind(mut self, pages: u32) -> Self {
        self.look_behind = pages;
        self
    }

    pub fn with_look_ahead(mut self, pages: u32) -> Self {
        self.look_ahead = pages;
        self
    }

    pub fn with_initial_burst(mut self, pages: u32) -> Self {
        self.initial_burst = pages;
        self
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    pub fn with_render_scale(mut self, scale: f32) -> Self {
        self.render_scale = scale;
        self
    }

    pub fn with_zoom_limits(mut self, min: f32, max: f32, step: f32) -> Self {
        self.min_zoom = min;
        self.max_zoom = max;
        self.zoom_step = step;
        self
    }

    /// Returns the default config file location.
    ///
    /// - macOS: ~/Library/Application Support/folio/viewer.toml
    /// - Linux: ~/.config/folio/viewer.toml
    /// - Windows: %APPDATA%\folio\viewer.toml
    pub fn default_path() -> PathBuf {
        match dirs::config_dir() {
            Some(dir) => dir.join("folio").join("viewer.toml"),
            None => PathBuf::from("folio.toml"),
        }
    }

    /// Load a configuration from a TOML file. Missing keys keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Defaults overridden by environment variables.
    ///
    /// Environment variables:
    /// - `FOLIO_CACHE_CAPACITY`: resident page bound (default: 15)
    /// - `FOLIO_LOOK_BEHIND`: pages prefetched behind (default: 2)
    /// - `FOLIO_LOOK_AHEAD`: pages prefetched ahead (default: 3)
    /// - `FOLIO_INITIAL_BURST`: pages decoded on open (default: 10)
    /// - `FOLIO_DEBOUNCE_MS`: navigation quiet interval (default: 100)
    /// - `FOLIO_RENDER_SCALE`: raster scale at zoom 1.0 (default: 1.5)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Apply any `FOLIO_*` environment variables on top of `self`
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        override_from_env("FOLIO_CACHE_CAPACITY", &mut self.capacity)?;
        override_from_env("FOLIO_LOOK_BEHIND", &mut self.look_behind)?;
        override_from_env("FOLIO_LOOK_AHEAD", &mut self.look_ahead)?;
        override_from_env("FOLIO_INITIAL_BURST", &mut self.initial_burst)?;
        override_from_env("FOLIO_DEBOUNCE_MS", &mut self.debounce_ms)?;
        override_from_env("FOLIO_RENDER_SCALE", &mut self.render_scale)?;
        Ok(self)
    }

    /// File (if it exists), then environment, then validation
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Self::default_path();
                if default.is_file() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };

        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window_policy()?;

        if self.initial_burst > self.capacity {
            return Err(ConfigError::BurstExceedsCapacity {
                burst: self.initial_burst,
                capacity: self.capacity,
            });
        }

        for (field, value) in [
            ("render_scale", self.render_scale),
            ("min_zoom", self.min_zoom),
            ("max_zoom", self.max_zoom),
            ("zoom_step", self.zoom_step),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositive { field, value });
            }
        }

        if self.min_zoom > self.max_zoom {
            return Err(ConfigError::InvertedZoom { min: self.min_zoom, max: self.max_zoom });
        }

        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::InvalidValue {
                key: "jpeg_quality".to_string(),
                value: self.jpeg_quality.to_string(),
            });
        }

        Ok(())
    }

    pub fn window_policy(&self) -> Result<WindowPolicy, ConfigError> {
        Ok(WindowPolicy::new(self.capacity, self.look_behind, self.look_ahead)?)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Clamp a zoom factor into `[min_zoom, max_zoom]`, rounded to hundredths
    pub fn clamp_zoom(&self, zoom: f32) -> f32 {
        let rounded = (zoom * 100.0).round() / 100.0;
        rounded.clamp(self.min_zoom, self.max_zoom)
    }
}

fn override_from_env<T: FromStr>(key: &str, target: &mut T) -> Result<(), ConfigError> {
    let Ok(value) = std::env::var(key) else {
        return Ok(());
    };

    *target = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key: key.to_string(), value })?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("initial burst of {burst} pages exceeds cache capacity {capacity}")]
    BurstExceedsCapacity { burst: u32, capacity: u32 },
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f32 },
    #[error("min_zoom {min} is greater than max_zoom {max}")]
    InvertedZoom { min: f32, max: f32 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ENV_KEYS: [&str; 6] = [
        "FOLIO_CACHE_CAPACITY",
        "FOLIO_LOOK_BEHIND",
        "FOLIO_LOOK_AHEAD",
        "FOLIO_INITIAL_BURST",
        "FOLIO_DEBOUNCE_MS",
        "FOLIO_RENDER_SCALE",
    ];

    // Saves and restores environment variables around a test
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in var_names {
                env::remove_var(name);
            }
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ViewerConfig::default();
        assert_eq!(config.capacity, 15);
        assert_eq!(config.look_ahead, 3);
        assert_eq!(config.initial_burst, 10);
        assert_eq!(config.debounce(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_small_capacity() {
        let config = ViewerConfig::default().with_capacity(5).with_initial_burst(5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Window(WindowError::CapacityBelowWindow { capacity: 5, window: 6 }))
        ));

        let zero = ViewerConfig::default().with_capacity(0).with_initial_burst(0);
        assert!(matches!(zero.validate(), Err(ConfigError::Window(WindowError::ZeroCapacity))));
    }

    #[test]
    fn test_validate_rejects_oversized_burst() {
        let config = ViewerConfig::default().with_capacity(8).with_initial_burst(9);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BurstExceedsCapacity { burst: 9, capacity: 8 })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_scales() {
        let config = ViewerConfig::default().with_render_scale(0.0);
        assert!(matches!(config.validate(), Err(ConfigError::NonPositive { field: "render_scale", .. })));

        let inverted = ViewerConfig::default().with_zoom_limits(1.5, 1.0, 0.1);
        assert!(matches!(inverted.validate(), Err(ConfigError::InvertedZoom { .. })));
    }

    #[test]
    fn test_clamp_zoom() {
        let config = ViewerConfig::default();
        assert_eq!(config.clamp_zoom(3.0), 1.2);
        assert_eq!(config.clamp_zoom(0.1), 0.5);
        assert_eq!(config.clamp_zoom(1.0 + 0.1), 1.1);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(&ENV_KEYS);

        env::set_var("FOLIO_CACHE_CAPACITY", "20");
        env::set_var("FOLIO_LOOK_AHEAD", "5");
        env::set_var("FOLIO_DEBOUNCE_MS", "250");
        env::set_var("FOLIO_RENDER_SCALE", "2.0");

        let config = ViewerConfig::from_env().unwrap();
        assert_eq!(config.capacity, 20);
        assert_eq!(config.look_ahead, 5);
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.render_scale, 2.0);
        assert_eq!(config.look_behind, 2); // default
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(&ENV_KEYS);

        env::set_var("FOLIO_LOOK_AHEAD", "many");
        let result = ViewerConfig::from_env();
        assert!(matches!(result, Err(ConfigError::InvalidValue { ref key, .. }) if key == "FOLIO_LOOK_AHEAD"));
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ViewerConfig::from_toml(
            r#"
            # smaller cache
            capacity = 12
            look_ahead = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.capacity, 12);
        assert_eq!(config.look_ahead, 4);
        assert_eq!(config.initial_burst, 10); // default
    }

    #[test]
    fn test_from_toml_rejects_wrong_types() {
        assert!(matches!(ViewerConfig::from_toml("capacity = \"lots\""), Err(ConfigError::Parse(_))));
    }

    #[test]
    #[serial]
    fn test_file_save_and_load() {
        let _guard = EnvGuard::new(&ENV_KEYS);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("viewer.toml");

        let config = ViewerConfig::default().with_capacity(20).with_look_ahead(6);
        config.save_to_file(&path).unwrap();

        assert_eq!(ViewerConfig::from_file(&path).unwrap(), config);
        assert_eq!(ViewerConfig::load(Some(&path)).unwrap(), config);
    }

    #[test]
    #[serial]
    fn test_load_applies_env_over_file_and_validates() {
        let _guard = EnvGuard::new(&ENV_KEYS);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewer.toml");
        fs::write(&path, "capacity = 12\n").unwrap();

        env::set_var("FOLIO_INITIAL_BURST", "12");
        let config = ViewerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.capacity, 12);
        assert_eq!(config.initial_burst, 12);

        env::set_var("FOLIO_INITIAL_BURST", "13");
        assert!(matches!(
            ViewerConfig::load(Some(&path)),
            Err(ConfigError::BurstExceedsCapacity { .. })
        ));
    }
}
