//! Runs one CLI task against the engine.

use anyhow::{Context, Result};
use lib_types::engine::{DurationInfo, EngineConstants};
use lib_vtl_ffi::{NativeEngine, Synthesizer};
use serde::Serialize;
use std::path::PathBuf;

/// A pipeline operation requested on the command line.
#[derive(Clone, Debug)]
pub enum Task {
    PhonemesToGestures {
        phonemes: PathBuf,
        gestures: PathBuf,
        verbose_api: bool,
    },
    Duration {
        gestures: PathBuf,
    },
    GesturesToMotor {
        gestures: PathBuf,
        motor: PathBuf,
    },
    GesturesToAudio {
        gestures: PathBuf,
        output: Option<PathBuf>,
        verbose_api: bool,
    },
    Info,
}

/// Outcome of a task, printable as text or JSON.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Report {
    GestureFile {
        phonemes: PathBuf,
        gestures: PathBuf,
    },
    Duration {
        gestures: PathBuf,
        #[serde(flatten)]
        info: DurationInfo,
    },
    MotorFile {
        gestures: PathBuf,
        motor: PathBuf,
    },
    Audio {
        gestures: PathBuf,
        output: Option<PathBuf>,
        n_samples: usize,
        sample_rate: f64,
        duration: f64,
        peak: f64,
        rms: f64,
    },
    Info {
        version: String,
        constants: EngineConstants,
    },
}

/// Task orchestrator.
pub struct Orchestrator<E: NativeEngine> {
    synth: Synthesizer<E>,
}

impl<E: NativeEngine> Orchestrator<E> {
    pub fn new(synth: Synthesizer<E>) -> Self {
        Self { synth }
    }

    /// Initialize, run `task`, and shut the engine down.
    ///
    /// Shutdown happens on failure too; a shutdown error only surfaces
    /// when the task itself succeeded.
    pub fn run(&self, task: Task) -> Result<Report> {
        let result = self
            .synth
            .initialize()
            .context("Failed to initialize VocalTractLab")
            .and_then(|_| self.run_task(task));

        let shutdown = self.synth.shutdown().context("Failed to close VocalTractLab");
        match (result, shutdown) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                tracing::warn!(error = %close_err, "Shutdown after failed task also failed");
                Err(e)
            }
        }
    }

    fn run_task(&self, task: Task) -> Result<Report> {
        match task {
            Task::PhonemesToGestures { phonemes, gestures, verbose_api } => {
                tracing::info!("Converting {:?} to gestural score {:?}", phonemes, gestures);
                self.synth
                    .phoneme_file_to_gesture_file(&phonemes, &gestures, verbose_api)
                    .with_context(|| format!("Failed to convert {:?}", phonemes))?;
                Ok(Report::GestureFile { phonemes, gestures })
            }
            Task::Duration { gestures } => {
                let info = self
                    .synth
                    .get_gesture_duration(&gestures)
                    .with_context(|| format!("Failed to query duration of {:?}", gestures))?;
                Ok(Report::Duration { gestures, info })
            }
            Task::GesturesToMotor { gestures, motor } => {
                tracing::info!("Writing motor trajectory of {:?} to {:?}", gestures, motor);
                self.synth
                    .gesture_file_to_motor_file(&gestures, &motor)
                    .with_context(|| format!("Failed to compute motor trajectory of {:?}", gestures))?;
                Ok(Report::MotorFile { gestures, motor })
            }
            Task::GesturesToAudio { gestures, output, verbose_api } => {
                tracing::info!("Synthesizing {:?}", gestures);
                let audio = self
                    .synth
                    .gesture_file_to_audio(&gestures, output.as_deref(), verbose_api)
                    .with_context(|| format!("Failed to synthesize {:?}", gestures))?;
                Ok(Report::Audio {
                    gestures,
                    output,
                    n_samples: audio.len(),
                    sample_rate: audio.sample_rate.0,
                    duration: audio.duration().0,
                    peak: audio.peak(),
                    rms: audio.rms(),
                })
            }
            Task::Info => Ok(Report::Info {
                version: self.synth.get_version()?,
                constants: self.synth.get_constants()?,
            }),
        }
    }
}
