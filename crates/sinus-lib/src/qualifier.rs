use crate::filters::FilterChain;
use crate::ring::BUFFER_SIZE;

/// Hard refractory: a candidate within 200 ms (40 samples) of the last beat
/// is necessarily the same beat or a T-wave.
pub const REFRACTORY_200MS: i64 = 40;

/// Soft refractory: a candidate within 360 ms (72 samples) needs a slope
/// comparable to the last beat's to count.
pub const REFRACTORY_360MS: i64 = 72;

/// How one integrator/filtered sample pair was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeakClass {
    /// Accepted as a QRS complex.
    Qrs,
    /// Joint candidate inside the hard refractory window, folded into the
    /// noise estimates.
    Refractory,
    /// Soft-refractory candidate with a weak slope; dropped without touching
    /// any estimate.
    TWave,
    /// Above at least one threshold but not accepted; demoted to noise.
    Noise,
    /// Below both thresholds.
    Quiet,
}

/// Adaptive dual-stream threshold engine.
///
/// Keeps running signal-peak and noise-peak estimates for both the
/// integrator stream and the filtered stream, smoothed 0.125/0.875, and the
/// thresholds derived from them. A sample pair counts as a beat only when
/// both streams agree and the refractory timing allows it.
#[derive(Debug, Clone)]
pub struct PeakQualifier {
    peak_i: f32,
    peak_f: f32,
    signal_peak_i: f32,
    signal_peak_f: f32,
    noise_peak_i: f32,
    noise_peak_f: f32,
    threshold_i1: f32,
    threshold_i2: f32,
    threshold_f1: f32,
    threshold_f2: f32,
    last_qrs_sample: i64,
    last_slope: f32,
}

impl PeakQualifier {
    pub fn new() -> Self {
        Self {
            peak_i: 0.0,
            peak_f: 0.0,
            signal_peak_i: 0.0,
            signal_peak_f: 0.0,
            noise_peak_i: 0.0,
            noise_peak_f: 0.0,
            threshold_i1: 0.0,
            threshold_i2: 0.0,
            threshold_f1: 0.0,
            threshold_f2: 0.0,
            last_qrs_sample: 0,
            last_slope: 0.0,
        }
    }

    /// Classify the sample at `index` from the chain's integrator and
    /// filtered outputs.
    pub fn classify(&mut self, index: i64, chain: &FilterChain) -> PeakClass {
        self.decide(
            index,
            chain.integral_at(index),
            chain.filtered_at(index),
            || chain.peak_slope(index),
        )
    }

    fn decide(
        &mut self,
        index: i64,
        v_i: f32,
        v_f: f32,
        slope: impl FnOnce() -> f32,
    ) -> PeakClass {
        let candidate = v_i >= self.threshold_i1 || v_f >= self.threshold_f1;
        if candidate {
            self.peak_i = v_i;
            self.peak_f = v_f;
        }

        // A window with no slope activity (integrator at zero) can never hold
        // a beat, however low the thresholds currently sit.
        let joint = v_i >= self.threshold_i1 && v_f >= self.threshold_f1 && v_i > 0.0;

        let mut class = if candidate {
            PeakClass::Noise
        } else {
            PeakClass::Quiet
        };

        if joint {
            if index <= self.last_qrs_sample + REFRACTORY_200MS {
                self.update_noise();
                class = PeakClass::Refractory;
            } else if index <= self.last_qrs_sample + REFRACTORY_360MS {
                let current = slope();
                if current <= self.last_slope / 2.0 {
                    return PeakClass::TWave;
                }
                self.accept(current);
                return PeakClass::Qrs;
            } else {
                self.accept(slope());
                return PeakClass::Qrs;
            }
        }

        if candidate {
            self.update_noise();
        }
        class
    }

    /// Rescan recent history for a beat the running thresholds missed,
    /// using the half integrator threshold. The same refractory timing and
    /// slope rules apply; on success the signal estimates are updated as for
    /// a normal beat and the found index is returned.
    pub fn back_search(&mut self, index: i64, chain: &FilterChain) -> Option<i64> {
        let start = (self.last_qrs_sample + REFRACTORY_200MS + 1)
            .max(index - (BUFFER_SIZE as i64 - 1));
        for k in start..index {
            if chain.integral_at(k) > self.threshold_i2 && chain.filtered_at(k) > self.threshold_f1
            {
                let slope = chain.peak_slope(k);
                if k <= self.last_qrs_sample + REFRACTORY_360MS
                    && slope <= self.last_slope / 2.0
                {
                    continue;
                }
                self.peak_i = chain.integral_at(k);
                self.peak_f = chain.filtered_at(k);
                self.accept(slope);
                return Some(k);
            }
        }
        None
    }

    fn accept(&mut self, slope: f32) {
        self.signal_peak_i = 0.125 * self.peak_i + 0.875 * self.signal_peak_i;
        self.signal_peak_f = 0.125 * self.peak_f + 0.875 * self.signal_peak_f;
        self.refresh_thresholds();
        self.last_slope = slope;
    }

    fn update_noise(&mut self) {
        self.noise_peak_i = 0.125 * self.peak_i + 0.875 * self.noise_peak_i;
        self.noise_peak_f = 0.125 * self.peak_f + 0.875 * self.noise_peak_f;
        self.refresh_thresholds();
    }

    fn refresh_thresholds(&mut self) {
        self.threshold_i1 = self.noise_peak_i + 0.25 * (self.signal_peak_i - self.noise_peak_i);
        self.threshold_f1 = self.noise_peak_f + 0.25 * (self.signal_peak_f - self.noise_peak_f);
        self.threshold_i2 = 0.5 * self.threshold_i1;
        self.threshold_f2 = 0.5 * self.threshold_f1;
    }

    /// Halve the primary thresholds so weaker peaks can surface; called when
    /// the rhythm turns irregular.
    pub fn relax_thresholds(&mut self) {
        self.threshold_i1 *= 0.5;
        self.threshold_f1 *= 0.5;
        self.threshold_i2 = 0.5 * self.threshold_i1;
        self.threshold_f2 = 0.5 * self.threshold_f1;
    }

    /// Record the index of an accepted beat.
    pub fn mark_qrs(&mut self, index: i64) {
        self.last_qrs_sample = index;
    }

    pub fn last_qrs_sample(&self) -> i64 {
        self.last_qrs_sample
    }

    pub fn peak_i(&self) -> f32 {
        self.peak_i
    }

    pub fn signal_peak_i(&self) -> f32 {
        self.signal_peak_i
    }

    pub fn noise_peak_i(&self) -> f32 {
        self.noise_peak_i
    }

    pub fn threshold_i1(&self) -> f32 {
        self.threshold_i1
    }

    pub fn threshold_i2(&self) -> f32 {
        self.threshold_i2
    }

    pub fn threshold_f1(&self) -> f32 {
        self.threshold_f1
    }

    pub fn threshold_f2(&self) -> f32 {
        self.threshold_f2
    }
}

impl Default for PeakQualifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primed() -> PeakQualifier {
        let mut q = PeakQualifier::new();
        q.signal_peak_i = 800.0;
        q.signal_peak_f = 400.0;
        q.noise_peak_i = 80.0;
        q.noise_peak_f = 40.0;
        q.refresh_thresholds();
        q.last_qrs_sample = 1000;
        q.last_slope = 600.0;
        q
    }

    #[test]
    fn below_both_thresholds_is_quiet() {
        let mut q = primed();
        let before = q.clone();
        let class = q.decide(1200, 1.0, 1.0, || unreachable!());
        assert_eq!(class, PeakClass::Quiet);
        assert_eq!(q.threshold_i1, before.threshold_i1);
        assert_eq!(q.noise_peak_i, before.noise_peak_i);
    }

    #[test]
    fn single_stream_candidate_feeds_the_noise_estimates_once() {
        let mut q = primed();
        let npk_i = q.noise_peak_i;
        let class = q.decide(1200, 500.0, 1.0, || unreachable!());
        assert_eq!(class, PeakClass::Noise);
        assert_eq!(q.noise_peak_i, 0.125 * 500.0 + 0.875 * npk_i);
        assert_eq!(
            q.threshold_i1,
            q.noise_peak_i + 0.25 * (q.signal_peak_i - q.noise_peak_i)
        );
        assert_eq!(q.threshold_i2, 0.5 * q.threshold_i1);
        assert_eq!(q.threshold_f2, 0.5 * q.threshold_f1);
    }

    #[test]
    fn joint_candidate_past_both_refractories_is_a_beat() {
        let mut q = primed();
        let spk_i = q.signal_peak_i;
        let class = q.decide(1100, 900.0, 500.0, || 700.0);
        assert_eq!(class, PeakClass::Qrs);
        assert_eq!(q.signal_peak_i, 0.125 * 900.0 + 0.875 * spk_i);
        assert_eq!(
            q.threshold_i1,
            q.noise_peak_i + 0.25 * (q.signal_peak_i - q.noise_peak_i)
        );
        assert_eq!(q.threshold_i2, 0.5 * q.threshold_i1);
        assert_eq!(q.last_slope, 700.0);
    }

    #[test]
    fn hard_refractory_demotes_to_noise_twice() {
        let mut q = primed();
        let npk_i = q.noise_peak_i;
        // Exactly on the 200 ms boundary still counts as refractory.
        let class = q.decide(q.last_qrs_sample + REFRACTORY_200MS, 900.0, 500.0, || {
            unreachable!()
        });
        assert_eq!(class, PeakClass::Refractory);
        let once = 0.125 * 900.0 + 0.875 * npk_i;
        let twice = 0.125 * 900.0 + 0.875 * once;
        assert_eq!(q.noise_peak_i, twice);
        assert_eq!(q.threshold_i2, 0.5 * q.threshold_i1);
    }

    #[test]
    fn weak_slope_in_the_soft_window_is_a_t_wave_and_changes_nothing() {
        let mut q = primed();
        let before = q.clone();
        let index = q.last_qrs_sample + REFRACTORY_200MS + 10;
        let class = q.decide(index, 900.0, 500.0, || before.last_slope / 2.0);
        assert_eq!(class, PeakClass::TWave);
        assert_eq!(q.threshold_i1, before.threshold_i1);
        assert_eq!(q.threshold_f1, before.threshold_f1);
        assert_eq!(q.noise_peak_i, before.noise_peak_i);
        assert_eq!(q.signal_peak_i, before.signal_peak_i);
        assert_eq!(q.last_slope, before.last_slope);
    }

    #[test]
    fn strong_slope_in_the_soft_window_is_a_beat() {
        let mut q = primed();
        let index = q.last_qrs_sample + REFRACTORY_360MS;
        let class = q.decide(index, 900.0, 500.0, || 301.0);
        assert_eq!(class, PeakClass::Qrs);
        assert_eq!(q.last_slope, 301.0);
    }

    #[test]
    fn first_sample_past_the_soft_window_needs_no_slope_margin() {
        let mut q = primed();
        let index = q.last_qrs_sample + REFRACTORY_360MS + 1;
        let class = q.decide(index, 900.0, 500.0, || 1.0);
        assert_eq!(class, PeakClass::Qrs);
    }

    #[test]
    fn flat_input_on_zeroed_thresholds_never_fires() {
        let mut q = PeakQualifier::new();
        for index in 600..700 {
            let class = q.decide(index, 0.0, 0.0, || 0.0);
            assert_ne!(class, PeakClass::Qrs);
        }
        assert_eq!(q.threshold_i1, 0.0);
        assert_eq!(q.threshold_f1, 0.0);
    }

    #[test]
    fn relaxing_halves_the_primaries_and_keeps_the_halves_consistent() {
        let mut q = primed();
        let th_i1 = q.threshold_i1;
        let th_f1 = q.threshold_f1;
        q.relax_thresholds();
        assert_eq!(q.threshold_i1, 0.5 * th_i1);
        assert_eq!(q.threshold_f1, 0.5 * th_f1);
        assert_eq!(q.threshold_i2, 0.5 * q.threshold_i1);
        assert_eq!(q.threshold_f2, 0.5 * q.threshold_f1);
    }

    #[test]
    fn back_search_recovers_a_half_threshold_peak() {
        let mut chain = FilterChain::new();
        for i in 0..780 {
            let sample = if i == 700 { 2948 } else { 2048 };
            chain.advance(i, sample);
        }
        // Find the integrator crest of the response to aim the thresholds at.
        let mut crest = 0.0f32;
        for k in 700..770 {
            crest = crest.max(chain.integral_at(k));
        }
        assert!(crest > 0.0);

        let mut q = PeakQualifier::new();
        q.last_qrs_sample = 600;
        q.signal_peak_i = crest;
        q.noise_peak_i = 0.0;
        q.threshold_i1 = 0.8 * crest;
        q.threshold_i2 = 0.4 * crest;
        q.threshold_f1 = 1.0;
        q.threshold_f2 = 0.5;

        let found = q.back_search(779, &chain).expect("missed peak recovered");
        assert!((700..770).contains(&found), "found {found}");
        assert!(q.signal_peak_i > crest * 0.1);
        assert_eq!(q.threshold_i2, 0.5 * q.threshold_i1);
        assert!(q.last_slope > 0.0);
    }

    #[test]
    fn back_search_finds_nothing_in_a_quiet_stretch() {
        let mut chain = FilterChain::new();
        for i in 0..780 {
            chain.advance(i, 2048);
        }
        let mut q = primed();
        q.last_qrs_sample = 600;
        assert_eq!(q.back_search(779, &chain), None);
    }
}
