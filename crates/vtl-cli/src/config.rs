//! Engine configuration loading and validation.

use anyhow::{Context, Result};
use lib_types::engine::{EngineConfig, WavBitDepth};
use lib_vtl_ffi::LibraryFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Contents of a `--config` file. Every field can be overridden on the
/// command line.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Path to the VocalTractLab API shared library.
    #[serde(default)]
    pub library: Option<PathBuf>,

    /// Speaker file.
    #[serde(default)]
    pub speaker_file: Option<PathBuf>,

    /// Bit depth of WAV output.
    #[serde(default)]
    pub wav_bits: Option<WavBitDepth>,
}

/// Command-line overrides.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub library: Option<PathBuf>,
    pub speaker_file: Option<PathBuf>,
}

/// Load configuration from a file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: FileConfig = if path.extension().map_or(false, |e| e == "json") {
        serde_json::from_str(&content)
            .with_context(|| "Failed to parse config as JSON")?
    } else {
        // Assume TOML
        toml::from_str(&content)
            .with_context(|| "Failed to parse config as TOML")?
    };

    Ok(config)
}

/// Merge file config and overrides into an [`EngineConfig`].
///
/// Precedence: command line, then file, then the platform default
/// library name.
pub fn resolve_config(file: Option<FileConfig>, overrides: Overrides) -> Result<EngineConfig> {
    let file = file.unwrap_or_default();

    let library = overrides
        .library
        .or(file.library)
        .unwrap_or_else(|| PathBuf::from(LibraryFormat::native().api_file_name()));

    let speaker_file = overrides
        .speaker_file
        .or(file.speaker_file)
        .context("No speaker file given (use --speaker or 'speaker_file' in the config)")?;

    let mut config = EngineConfig::new(library, speaker_file);
    if let Some(bits) = file.wav_bits {
        config.wav_bits = bits;
    }

    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration.
fn validate_config(config: &EngineConfig) -> Result<()> {
    if !config.speaker_file.is_file() {
        anyhow::bail!("Speaker file not found: {:?}", config.speaker_file);
    }

    // A bare file name is resolved by the platform loader's search path.
    let bare_name = config.library.components().count() == 1;
    if !bare_name && !config.library.is_file() {
        anyhow::bail!("Library file not found: {:?}", config.library);
    }

    if LibraryFormat::from_path(&config.library) == LibraryFormat::Unknown {
        tracing::warn!(
            "Library {:?} has no recognized shared-library extension",
            config.library
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vtl.toml");
        std::fs::write(
            &path,
            "library = \"lib/libVocalTractLabApi.so\"\nspeaker_file = \"JD3.speaker\"\nwav_bits = \"24\"\n",
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.library, Some(PathBuf::from("lib/libVocalTractLabApi.so")));
        assert_eq!(cfg.wav_bits, Some(WavBitDepth::Pcm24));
    }

    #[test]
    fn test_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vtl.json");
        std::fs::write(&path, r#"{"speaker_file": "JD3.speaker"}"#).unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.speaker_file, Some(PathBuf::from("JD3.speaker")));
        assert!(cfg.library.is_none());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vtl.toml");
        std::fs::write(&path, "speaker = \"JD3.speaker\"\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_overrides_win_and_default_library() {
        let dir = tempfile::tempdir().unwrap();
        let speaker = dir.path().join("JD3.speaker");
        std::fs::write(&speaker, "<speaker/>").unwrap();

        let file = FileConfig {
            library: None,
            speaker_file: Some(dir.path().join("ignored.speaker")),
            wav_bits: Some(WavBitDepth::Pcm32),
        };
        let overrides = Overrides {
            library: None,
            speaker_file: Some(speaker.clone()),
        };

        let cfg = resolve_config(Some(file), overrides).unwrap();
        assert_eq!(cfg.speaker_file, speaker);
        assert_eq!(cfg.library, PathBuf::from(LibraryFormat::native().api_file_name()));
        assert_eq!(cfg.wav_bits, WavBitDepth::Pcm32);
    }

    #[test]
    fn test_missing_speaker_rejected() {
        assert!(resolve_config(None, Overrides::default()).is_err());

        let overrides = Overrides {
            library: None,
            speaker_file: Some(PathBuf::from("/nonexistent/JD3.speaker")),
        };
        assert!(resolve_config(None, overrides).is_err());
    }

    #[test]
    fn test_missing_library_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let speaker = dir.path().join("JD3.speaker");
        std::fs::write(&speaker, "<speaker/>").unwrap();

        let overrides = Overrides {
            library: Some(dir.path().join("lib").join("libVocalTractLabApi.so")),
            speaker_file: Some(speaker),
        };
        assert!(resolve_config(None, overrides).is_err());
    }
}
