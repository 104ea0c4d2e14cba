use serde::{Deserialize, Serialize};

use crate::filters::{FilterChain, SAMPLING_FREQUENCY};
use crate::qualifier::{PeakClass, PeakQualifier};
use crate::rr::RrTracker;

/// Samples discarded at startup while the filter transient settles and the
/// thresholds initialise near zero.
pub const WARMUP_SAMPLES: i64 = 600;

/// Build-time switches for the detector.
#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    /// Rescan recent history with the half thresholds when no beat has been
    /// seen for longer than the miss timeout. Off in the current tuning.
    pub back_search: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self { back_search: false }
    }
}

/// Everything a consumer learns from one processed sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatRecord {
    /// Index of the sample this record describes.
    pub sample_index: i64,
    /// Latest integrator peak candidate.
    pub peak_i: f32,
    /// Running signal-peak estimate on the integrator stream.
    pub signal_peak_i: f32,
    /// Running noise-peak estimate on the integrator stream.
    pub noise_peak_i: f32,
    /// Primary integrator threshold.
    pub threshold_i1: f32,
    /// High-pass output at this index, for the rendering trace.
    pub filtered: f32,
    /// Whether this sample closed a QRS detection.
    pub is_qrs: bool,
    /// Latest raw RR average in samples; 0 until enough beats arrived.
    pub rr_average: f32,
    /// Current rhythm-regularity flag.
    pub is_regular: bool,
    /// 0 = no RR data yet, 1 = regular rhythm, 2 = irregular rhythm.
    pub evaluation: u8,
}

impl BeatRecord {
    /// Display heart rate in beats per minute; 0 until an RR average exists.
    pub fn heart_rate_bpm(&self) -> f32 {
        if self.rr_average > 0.0 {
            60.0 * SAMPLING_FREQUENCY / self.rr_average
        } else {
            0.0
        }
    }
}

/// The streaming QRS detector: filter chain, peak qualifier and RR tracker
/// behind a single per-sample entry point.
///
/// One instance owns all signal history and decision state. It performs no
/// I/O; feeding the same sample stream into a fresh instance reproduces the
/// same records.
#[derive(Debug, Clone)]
pub struct Detector {
    config: DetectorConfig,
    chain: FilterChain,
    qualifier: PeakQualifier,
    rr: RrTracker,
    sample_count: i64,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            chain: FilterChain::new(),
            qualifier: PeakQualifier::new(),
            rr: RrTracker::new(),
            sample_count: 0,
        }
    }

    /// Read-only view of the signal history, for rendering and diagnostics.
    pub fn filters(&self) -> &FilterChain {
        &self.chain
    }

    /// How many samples have been processed.
    pub fn sample_count(&self) -> i64 {
        self.sample_count
    }

    /// Feed the next sample using the internal counter.
    pub fn push(&mut self, sample: u16) -> BeatRecord {
        self.process(self.sample_count, sample)
    }

    /// Process the sample at `index`. Samples must arrive exactly once each,
    /// in strictly increasing index order; anything else is a wiring bug.
    pub fn process(&mut self, index: i64, sample: u16) -> BeatRecord {
        debug_assert_eq!(index, self.sample_count, "samples must arrive in index order");

        self.chain.advance(index, sample);
        self.sample_count = index + 1;

        let mut is_qrs = false;
        if index >= WARMUP_SAMPLES {
            let mut beat_at = index;
            if self.qualifier.classify(index, &self.chain) == PeakClass::Qrs {
                is_qrs = true;
            } else if self.config.back_search
                && self.rr.rr_miss() > 0.0
                && (index - self.qualifier.last_qrs_sample()) as f32 > self.rr.rr_miss()
            {
                if let Some(found) = self.qualifier.back_search(index, &self.chain) {
                    is_qrs = true;
                    beat_at = found;
                }
            }

            if is_qrs {
                let interval = (beat_at - self.qualifier.last_qrs_sample()) as f32;
                if self.rr.observe(interval) {
                    self.qualifier.relax_thresholds();
                }
                self.qualifier.mark_qrs(beat_at);
            }
        }

        BeatRecord {
            sample_index: index,
            peak_i: self.qualifier.peak_i(),
            signal_peak_i: self.qualifier.signal_peak_i(),
            noise_peak_i: self.qualifier.noise_peak_i(),
            threshold_i1: self.qualifier.threshold_i1(),
            filtered: self.chain.filtered_at(index),
            is_qrs,
            rr_average: self.rr.rr_average(),
            is_regular: self.rr.is_regular(),
            evaluation: self.rr.evaluation(),
        }
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}
