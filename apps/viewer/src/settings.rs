use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use wave2notes_audio::BackendKind;
use wave2notes_domain::PitchRange;
use wave2notes_player::WindowConfig;
use wave2notes_roll::{LayoutTuning, PaletteMode};

/// Viewer preferences persisted between runs.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewerSettings {
    pub backend: Option<BackendKind>,
    /// Output device name; the host default when unset.
    pub output_device: Option<String>,
    pub volume: f32,
    pub palette: PaletteMode,
    pub window: WindowConfig,
    pub range: PitchRange,
    pub tuning: LayoutTuning,
    pub service_url: Option<String>,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            backend: None,
            output_device: None,
            volume: 0.8,
            palette: PaletteMode::Dark,
            window: WindowConfig::default(),
            range: PitchRange::PIANO,
            tuning: LayoutTuning::default(),
            service_url: None,
        }
    }
}

pub fn settings_path() -> Option<PathBuf> {
    let base = dirs::config_dir()?;
    Some(base.join("wave2notes").join("settings.json"))
}

impl ViewerSettings {
    /// Reads the saved settings, falling back to defaults when none exist.
    pub fn load() -> anyhow::Result<Self> {
        match settings_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = settings_path().context("no config directory on this platform")?;
        self.save_to(&path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
