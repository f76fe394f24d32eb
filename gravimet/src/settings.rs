//! Persisted source settings.
//!
//! Remembers how the worksheet source was last used (credentials path,
//! loaded collection, lookup column) so a new session can pick up where
//! the previous one left off (see [`crate::sheet::SheetSource::restore`]).
//! Stored as a small JSON file next to whatever the host application
//! considers its config directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SettingsError};

/// Persisted worksheet-source settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSettings {
    /// File path for persistence.
    #[serde(skip)]
    path: PathBuf,
    /// Path to the transport's credentials file, when one is configured.
    pub credentials: Option<PathBuf>,
    /// The last loaded collection name.
    pub collection: Option<String>,
    /// The last configured lookup column.
    pub lookup_column: Option<String>,
}

impl SourceSettings {
    /// Creates empty, unpersisted settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads settings from a file, or creates fresh ones bound to that
    /// path if the file doesn't exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if path.exists() {
            let data = std::fs::read_to_string(&path).map_err(|e| SettingsError::Load {
                path: path.clone(),
                source: e,
            })?;
            let mut settings: Self =
                serde_json::from_str(&data).map_err(|e| SettingsError::Parse {
                    path: path.clone(),
                    source: e,
                })?;
            settings.path = path;
            Ok(settings)
        } else {
            Ok(Self {
                path,
                ..Self::default()
            })
        }
    }

    /// Saves the settings to their file path.
    ///
    /// A no-op for settings created with [`new`](Self::new) (no path).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    pub fn save(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| SettingsError::Serialize { source: e })?;
        std::fs::write(&self.path, data).map_err(|e| SettingsError::Save {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(())
    }
}
