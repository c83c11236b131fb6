//! Report formatting.

use crate::orchestrator::Report;
use crate::OutputFormat;
use anyhow::Result;
use std::fmt::Write;

/// Render a task report in the requested format.
pub fn render(report: &Report, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => render_text(report),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

fn render_text(report: &Report) -> Result<String> {
    let mut out = String::new();
    match report {
        Report::GestureFile { phonemes, gestures } => {
            writeln!(out, "Gestural score written")?;
            writeln!(out, "  Segments: {}", phonemes.display())?;
            writeln!(out, "  Score:    {}", gestures.display())?;
        }
        Report::Duration { gestures, info } => {
            writeln!(out, "Gestural score: {}", gestures.display())?;
            writeln!(out, "  Audio samples:  {}", info.n_audio_samples)?;
            writeln!(out, "  Tract states:   {}", info.n_gesture_samples)?;
            writeln!(out, "  Duration:       {:.3} s", info.duration.0)?;
        }
        Report::MotorFile { gestures, motor } => {
            writeln!(out, "Motor trajectory written")?;
            writeln!(out, "  Score:      {}", gestures.display())?;
            writeln!(out, "  Trajectory: {}", motor.display())?;
        }
        Report::Audio {
            gestures,
            output,
            n_samples,
            sample_rate,
            duration,
            peak,
            rms,
        } => {
            writeln!(out, "Synthesized: {}", gestures.display())?;
            writeln!(out, "  Samples:     {}", n_samples)?;
            writeln!(out, "  Sample rate: {} Hz", sample_rate)?;
            writeln!(out, "  Duration:    {:.3} s", duration)?;
            writeln!(out, "  Peak:        {:.4}", peak)?;
            writeln!(out, "  RMS:         {:.4}", rms)?;
            if let Some(path) = output {
                writeln!(out, "  WAV:         {}", path.display())?;
            }
        }
        Report::Info { version, constants } => {
            writeln!(out, "{}", version)?;
            writeln!(out, "  Audio sample rate:     {} Hz", constants.audio_sample_rate.0)?;
            writeln!(out, "  Internal sample rate:  {} Hz", constants.internal_sample_rate.0)?;
            writeln!(out, "  Tube sections:         {}", constants.n_tube_sections)?;
            writeln!(out, "  Vocal tract params:    {}", constants.n_vocal_tract_params)?;
            writeln!(out, "  Glottis params:        {}", constants.n_glottis_params)?;
            writeln!(
                out,
                "  Samples per frame:     {}",
                constants.n_audio_samples_per_tract_state
            )?;
        }
    }
    Ok(out)
}
