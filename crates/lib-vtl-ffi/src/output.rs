//! Output files that only appear once complete.
//!
//! Native calls and the WAV encoder write into a staging file created in
//! the destination directory. The staging file replaces the target only on
//! [`StagedOutput::commit`]; dropping it uncommitted deletes it, so a
//! failed operation never leaves the target path behind.

use crate::error::{VtlError, VtlResult};
use crate::status::Operation;
use hound::{SampleFormat, WavSpec, WavWriter};
use lib_types::audio::Audio;
use lib_types::engine::WavBitDepth;
use std::ffi::CString;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// Directory an output path will be written into.
fn destination_dir(target: &Path) -> &Path {
    match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Check that `target` can be written before any native call is made.
pub fn validate_output_path(target: &Path) -> VtlResult<()> {
    if target.file_name().is_none() {
        return Err(VtlError::input(target, "output path has no file name"));
    }
    if target.is_dir() {
        return Err(VtlError::input(target, "output path is a directory"));
    }
    let dir = destination_dir(target);
    if !dir.is_dir() {
        return Err(VtlError::input(
            target,
            format!("output directory '{}' does not exist", dir.display()),
        ));
    }
    Ok(())
}

/// Convert a path into the C string the native API expects.
pub fn path_to_cstring(path: &Path) -> VtlResult<CString> {
    let s = path
        .to_str()
        .ok_or_else(|| VtlError::input(path, "path is not valid UTF-8"))?;
    CString::new(s).map_err(|_| VtlError::input(path, "path contains a NUL byte"))
}

/// A staging file destined for `target`.
#[derive(Debug)]
pub struct StagedOutput {
    target: PathBuf,
    staging: TempPath,
    c_path: CString,
}

impl StagedOutput {
    /// Create an empty staging file next to `target`.
    pub fn new(target: &Path) -> VtlResult<Self> {
        validate_output_path(target)?;
        let dir = destination_dir(target);

        let mut builder = tempfile::Builder::new();
        builder.prefix(".vtl-").suffix(".partial");
        // Create with the mode a plain file create gets (0666 less umask);
        // persist keeps it.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(std::fs::Permissions::from_mode(0o666));
        }

        let staging = builder
            .tempfile_in(dir)
            .map_err(|e| VtlError::io(dir, e))?
            .into_temp_path();
        let c_path = path_to_cstring(&staging)?;

        Ok(Self {
            target: target.to_path_buf(),
            staging,
            c_path,
        })
    }

    /// Path the writer should write to.
    pub fn path(&self) -> &Path {
        &self.staging
    }

    /// Staging path as a C string, for native writers.
    pub fn c_path(&self) -> &CString {
        &self.c_path
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Move the staging file onto the target.
    ///
    /// An empty staging file means the writer reported success without
    /// producing anything; that is rejected and the file discarded.
    pub fn commit(self, operation: Operation) -> VtlResult<()> {
        let len = std::fs::metadata(&self.staging)
            .map_err(|e| VtlError::io(self.staging.to_path_buf(), e))?
            .len();
        if len == 0 {
            return Err(VtlError::invalid_output(
                operation,
                format!("no data written for '{}'", self.target.display()),
            ));
        }

        let target = self.target;
        self.staging
            .persist(&target)
            .map_err(|e| VtlError::io(&target, e.error))?;

        tracing::debug!(operation = operation.as_str(), path = %target.display(), bytes = len, "Output committed");
        Ok(())
    }
}

/// Encode `audio` as mono integer PCM into `path`.
///
/// Samples are clamped to `[-1, 1]` before quantization.
pub fn write_wav(path: &Path, audio: &Audio, bits: WavBitDepth) -> VtlResult<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate.as_u32(),
        bits_per_sample: bits.bits(),
        sample_format: SampleFormat::Int,
    };
    let full_scale = ((1i64 << (bits.bits() - 1)) - 1) as f64;

    let mut writer = WavWriter::create(path, spec)?;
    match bits {
        WavBitDepth::Pcm16 => {
            for &s in &audio.samples {
                writer.write_sample((s.clamp(-1.0, 1.0) * full_scale).round() as i16)?;
            }
        }
        WavBitDepth::Pcm24 | WavBitDepth::Pcm32 => {
            for &s in &audio.samples {
                writer.write_sample((s.clamp(-1.0, 1.0) * full_scale).round() as i32)?;
            }
        }
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_types::units::Hertz;

    #[test]
    fn test_uncommitted_staging_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.ges");
        {
            let staged = StagedOutput::new(&target).unwrap();
            std::fs::write(staged.path(), b"partial").unwrap();
        }
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_commit_moves_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.ges");
        let staged = StagedOutput::new(&target).unwrap();
        std::fs::write(staged.path(), b"<gestural_score/>").unwrap();
        staged.commit(Operation::PhonemesToGesture).unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"<gestural_score/>");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_committed_file_has_default_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain.ges");
        std::fs::write(&plain, b"x").unwrap();
        let expected = std::fs::metadata(&plain).unwrap().permissions().mode() & 0o777;

        let target = dir.path().join("out.ges");
        let staged = StagedOutput::new(&target).unwrap();
        std::fs::write(staged.path(), b"<gestural_score/>").unwrap();
        staged.commit(Operation::PhonemesToGesture).unwrap();

        let mode = std::fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, expected);
    }

    #[test]
    fn test_empty_commit_rejected_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.ges");
        let staged = StagedOutput::new(&target).unwrap();
        let err = staged.commit(Operation::PhonemesToGesture).unwrap_err();
        assert!(matches!(err, VtlError::InvalidOutput { .. }));
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_output_directory_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing").join("out.wav");
        let err = validate_output_path(&target).unwrap_err();
        assert!(matches!(err, VtlError::Input { .. }));
        assert!(validate_output_path(dir.path()).is_err());
    }

    #[test]
    fn test_nul_in_path_rejected() {
        assert!(path_to_cstring(Path::new("bad\0name.ges")).is_err());
        assert_eq!(
            path_to_cstring(Path::new("score.ges")).unwrap().as_bytes(),
            b"score.ges"
        );
    }

    #[test]
    fn test_wav_round_trip_sample_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f64> = (0..441).map(|i| (i as f64 * 0.05).sin() * 0.8).collect();
        let audio = Audio::new(samples, Hertz(44_100.0));

        write_wav(&path, &audio, WavBitDepth::Pcm16).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 44_100);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 441);
    }

    #[test]
    fn test_wav_clamps_out_of_range_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        let audio = Audio::new(vec![2.0, -3.0, 0.0], Hertz(8_000.0));

        write_wav(&path, &audio, WavBitDepth::Pcm24).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let values: Vec<i32> = reader.samples::<i32>().map(|s| s.unwrap()).collect();
        assert_eq!(values, vec![8_388_607, -8_388_607, 0]);
    }
}
