//! Scripted in-process engine for tests.
//!
//! [`MockEngine`] behaves like the VocalTractLab API on a tiny text
//! format instead of real gestural scores:
//!
//! ```text
//! # segment sequence: one "<name> <seconds>" per line
//! a 0.25
//! m 0.10
//!
//! # gestural score
//! duration 0.35
//! gesture a 0.25
//! fault out_of_range      (optional: makes every score call return 3)
//! ```
//!
//! Output is a pure function of the input, so repeated runs produce
//! byte-identical files.

use crate::engine::{NativeEngine, RawConstants};
use crate::loader::VERSION_BUFFER_LEN;
use std::ffi::{c_int, CStr};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Version string reported by the mock.
pub const MOCK_VERSION: &str = "VocalTractLab mock 2.3";

/// Deliberate misbehavior of `gestural_score_to_audio`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioFault {
    /// Report this many samples more than the score holds.
    OverReport(usize),
    /// Write this many samples past the score's length, reporting it correctly.
    Overrun(usize),
}

#[derive(Debug, Default)]
struct Counters {
    initialize: AtomicUsize,
    close: AtomicUsize,
    phonemes: AtomicUsize,
    duration: AtomicUsize,
    motor: AtomicUsize,
    audio: AtomicUsize,
    constants: AtomicUsize,
    version: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Shared view of the calls a [`MockEngine`] received.
#[derive(Clone, Debug, Default)]
pub struct MockCounters(Arc<Counters>);

impl MockCounters {
    pub fn initialize_calls(&self) -> usize {
        self.0.initialize.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.0.close.load(Ordering::SeqCst)
    }

    pub fn duration_calls(&self) -> usize {
        self.0.duration.load(Ordering::SeqCst)
    }

    pub fn audio_calls(&self) -> usize {
        self.0.audio.load(Ordering::SeqCst)
    }

    pub fn version_calls(&self) -> usize {
        self.0.version.load(Ordering::SeqCst)
    }

    /// Every native call of any kind.
    pub fn total_calls(&self) -> usize {
        let c = &self.0;
        [
            &c.initialize,
            &c.close,
            &c.phonemes,
            &c.duration,
            &c.motor,
            &c.audio,
            &c.constants,
            &c.version,
        ]
        .iter()
        .map(|a| a.load(Ordering::SeqCst))
        .sum()
    }

    /// Highest number of calls observed executing at once.
    pub fn max_concurrent_calls(&self) -> usize {
        self.0.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self, which: fn(&Counters) -> &AtomicUsize) -> CallScope<'_> {
        which(&self.0).fetch_add(1, Ordering::SeqCst);
        let now = self.0.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.max_in_flight.fetch_max(now, Ordering::SeqCst);
        CallScope(&self.0)
    }
}

struct CallScope<'a>(&'a Counters);

impl Drop for CallScope<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Parsed mock gestural score.
struct Score {
    duration: f64,
}

/// Scripted stand-in for the VocalTractLab library.
#[derive(Debug)]
pub struct MockEngine {
    initialized: bool,
    sample_rate: c_int,
    samples_per_tract_state: c_int,
    initialize_code: c_int,
    audio_fault: Option<AudioFault>,
    fail_motor_midway: bool,
    counters: MockCounters,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// A well-behaved engine at 44.1 kHz.
    pub fn new() -> Self {
        Self {
            initialized: false,
            sample_rate: 44_100,
            samples_per_tract_state: 110,
            initialize_code: 0,
            audio_fault: None,
            fail_motor_midway: false,
            counters: MockCounters::default(),
        }
    }

    pub fn with_sample_rate(mut self, rate: c_int) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Make `vtlInitialize` return `code`.
    pub fn with_initialize_code(mut self, code: c_int) -> Self {
        self.initialize_code = code;
        self
    }

    pub fn with_audio_fault(mut self, fault: AudioFault) -> Self {
        self.audio_fault = Some(fault);
        self
    }

    /// Write half a tract file, then report a save failure.
    pub fn with_motor_failure(mut self) -> Self {
        self.fail_motor_midway = true;
        self
    }

    pub fn counters(&self) -> MockCounters {
        self.counters.clone()
    }

    fn read_text(path: &CStr) -> Option<String> {
        let path = path.to_str().ok()?;
        std::fs::read_to_string(Path::new(path)).ok()
    }

    fn write_text(path: &CStr, text: &str) -> bool {
        match path.to_str() {
            Ok(p) => std::fs::write(Path::new(p), text).is_ok(),
            Err(_) => false,
        }
    }

    /// Load a score; `Err` carries the native status code.
    fn load_score(path: &CStr) -> Result<Score, c_int> {
        let text = Self::read_text(path).ok_or(2)?;
        let mut duration = None;
        for line in text.lines().map(str::trim) {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some("duration"), Some(v)) => duration = Some(v.parse::<f64>().map_err(|_| 2)?),
                (Some("fault"), Some("out_of_range")) => return Err(3),
                _ => {}
            }
        }
        let duration = duration.ok_or(2)?;
        if !(duration.is_finite() && duration >= 0.0) {
            return Err(3);
        }
        Ok(Score { duration })
    }

    fn counts(&self, score: &Score) -> (c_int, c_int) {
        let n_audio = (score.duration * self.sample_rate as f64).round() as c_int;
        let spt = self.samples_per_tract_state.max(1);
        let n_gesture = (n_audio + spt - 1) / spt;
        (n_audio, n_gesture)
    }
}

impl NativeEngine for MockEngine {
    fn initialize(&mut self, speaker_file: &CStr) -> c_int {
        let _call = self.counters.enter(|c| &c.initialize);
        if self.initialize_code != 0 {
            return self.initialize_code;
        }
        if Self::read_text(speaker_file).is_none() {
            return 1;
        }
        self.initialized = true;
        0
    }

    fn close(&mut self) -> c_int {
        let _call = self.counters.enter(|c| &c.close);
        self.initialized = false;
        0
    }

    fn segment_sequence_to_gestural_score(
        &mut self,
        segment_file: &CStr,
        gesture_file: &CStr,
        _console_output: bool,
    ) -> c_int {
        let _call = self.counters.enter(|c| &c.phonemes);
        if !self.initialized {
            return 1;
        }
        let Some(text) = Self::read_text(segment_file) else {
            return 2;
        };

        let mut segments = Vec::new();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next().map(str::parse::<f64>)) {
                (Some(name), Some(Ok(d))) if d >= 0.0 => segments.push((name.to_string(), d)),
                _ => return 2,
            }
        }
        if segments.is_empty() {
            return 2;
        }

        let total: f64 = segments.iter().map(|(_, d)| d).sum();
        let mut out = format!("duration {total}\n");
        for (name, d) in &segments {
            let _ = writeln!(out, "gesture {name} {d}");
        }
        if Self::write_text(gesture_file, &out) { 0 } else { 3 }
    }

    fn gestural_score_duration(
        &mut self,
        gesture_file: &CStr,
        n_audio_samples: &mut c_int,
        n_gesture_samples: &mut c_int,
    ) -> c_int {
        let _call = self.counters.enter(|c| &c.duration);
        if !self.initialized {
            return 1;
        }
        match Self::load_score(gesture_file) {
            Ok(score) => {
                let (a, g) = self.counts(&score);
                *n_audio_samples = a;
                *n_gesture_samples = g;
                0
            }
            Err(code) => code,
        }
    }

    fn gestural_score_to_tract_sequence(
        &mut self,
        gesture_file: &CStr,
        tract_file: &CStr,
    ) -> c_int {
        let _call = self.counters.enter(|c| &c.motor);
        if !self.initialized {
            return 1;
        }
        let score = match Self::load_score(gesture_file) {
            Ok(s) => s,
            Err(code) => return code,
        };
        let (_, n_frames) = self.counts(&score);

        let mut out = String::from("# tract sequence\n");
        let _ = writeln!(out, "{n_frames}");
        let frames = if self.fail_motor_midway { n_frames / 2 } else { n_frames };
        for i in 0..frames {
            let t = i as f64 / n_frames.max(1) as f64;
            let _ = writeln!(out, "{:.6} {:.6} {:.6}", t, 1.0 - t, (t * 6.0).sin());
        }

        if !Self::write_text(tract_file, &out) || self.fail_motor_midway {
            return 4;
        }
        0
    }

    fn gestural_score_to_audio(
        &mut self,
        gesture_file: &CStr,
        _wav_file: &CStr,
        audio: &mut [f64],
        n_samples: &mut c_int,
        _console_output: bool,
    ) -> c_int {
        let _call = self.counters.enter(|c| &c.audio);
        if !self.initialized {
            return 1;
        }
        let score = match Self::load_score(gesture_file) {
            Ok(s) => s,
            Err(code) => return code,
        };
        let (n_audio, _) = self.counts(&score);
        let n_audio = n_audio.max(0) as usize;

        let (written, reported) = match self.audio_fault {
            None => (n_audio, n_audio),
            Some(AudioFault::OverReport(extra)) => (n_audio, n_audio + extra),
            Some(AudioFault::Overrun(extra)) => (n_audio + extra, n_audio),
        };

        let omega = 2.0 * std::f64::consts::PI * 110.0 / self.sample_rate as f64;
        for (i, s) in audio.iter_mut().take(written).enumerate() {
            *s = 0.5 * (omega * i as f64).sin();
        }
        *n_samples = reported as c_int;
        0
    }

    fn constants(&mut self, out: &mut RawConstants) -> c_int {
        let _call = self.counters.enter(|c| &c.constants);
        if !self.initialized {
            return 1;
        }
        *out = RawConstants {
            audio_sampling_rate: self.sample_rate,
            num_tube_sections: 40,
            num_vocal_tract_params: 19,
            num_glottis_params: 11,
            num_audio_samples_per_tract_state: self.samples_per_tract_state,
            internal_sampling_rate: self.sample_rate as f64 * 4.0,
        };
        0
    }

    fn version(&mut self, out: &mut [u8; VERSION_BUFFER_LEN]) {
        let _call = self.counters.enter(|c| &c.version);
        let bytes = MOCK_VERSION.as_bytes();
        out.fill(0);
        out[..bytes.len()].copy_from_slice(bytes);
    }
}
