use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const SETTINGS_DIRECTORY_NAME: &str = "parley";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Tunables for one conversation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SessionSettings {
    /// Loads settings from defaults merged with the user settings file, when
    /// a config directory exists.
    pub fn load() -> SettingsResult<Self> {
        Self::load_from(default_settings_path())
    }

    pub fn load_from(path: Option<PathBuf>) -> SettingsResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Json::file(path));
        }

        let settings: Self = figment.extract().context(ExtractSettingsSnafu {
            stage: "extract-settings",
        })?;
        Ok(settings.normalized())
    }

    /// A page size of zero would stall pagination forever; fall back to the
    /// default instead.
    pub fn normalized(mut self) -> Self {
        if self.page_size == 0 {
            self.page_size = DEFAULT_PAGE_SIZE;
        }
        self
    }
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|directory| {
        directory
            .join(SETTINGS_DIRECTORY_NAME)
            .join(SETTINGS_FILE_NAME)
    })
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to load session settings"))]
    ExtractSettings {
        stage: &'static str,
        source: figment::Error,
    },
}

pub type SettingsResult<T> = Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_settings_file_falls_back_to_defaults() {
        let settings = SessionSettings::load_from(Some(PathBuf::from(
            "/nonexistent/parley/settings.json",
        )))
        .expect("defaults apply");

        assert_eq!(settings.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn zero_page_size_normalizes_to_the_default() {
        let settings = SessionSettings { page_size: 0 }.normalized();

        assert_eq!(settings.page_size, DEFAULT_PAGE_SIZE);
    }
}
