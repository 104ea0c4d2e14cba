use crate::ring::Ring;

/// Sampling rate the filter coefficients are tuned for. Changing it means
/// re-deriving every tap below.
pub const SAMPLING_FREQUENCY: f32 = 200.0;

/// Moving-window integration length in samples, roughly 150 ms at 200 Hz.
pub const WINDOW_SIZE: usize = 30;

/// The per-sample filter cascade: DC block, 15 Hz low pass, 5 Hz high pass,
/// backward derivative, square, moving-window integral.
///
/// Every stage keeps its own ring so the decision logic and the renderer can
/// reach back into recent history. Expected dynamic range on 12-bit input:
/// squared derivative below ~1e8 and integral below ~1e7, well inside `f32`.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    raw: Ring<u16>,
    dc_block: Ring<f32>,
    low_pass: Ring<f32>,
    high_pass: Ring<f32>,
    derivative: Ring<f32>,
    squared: Ring<f32>,
    integral: Ring<f32>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every stage for the sample at `index`. Must be called once per
    /// sample, in index order.
    pub fn advance(&mut self, index: i64, sample: u16) {
        self.raw.store(index, sample);

        // DC block: y[n] = x[n] - x[n-1] + 0.995 y[n-1]
        let dc = if index >= 1 {
            f32::from(sample) - f32::from(self.raw.at(index - 1))
                + 0.995 * self.dc_block.at(index - 1)
        } else {
            0.0
        };
        self.dc_block.store(index, dc);

        // 15 Hz low pass: y[n] = 2y[n-1] - y[n-2] + x[n] - 2x[n-6] + x[n-12]
        let lp = 2.0 * self.low_pass.at(index - 1) - self.low_pass.at(index - 2) + dc
            - 2.0 * self.dc_block.at(index - 6)
            + self.dc_block.at(index - 12);
        self.low_pass.store(index, lp);

        // 5 Hz high pass: y[n] = 32x[n-16] - (y[n-1] + x[n] - x[n-32])
        let hp = -lp - self.high_pass.at(index - 1) + 32.0 * self.low_pass.at(index - 16)
            + self.low_pass.at(index - 32);
        self.high_pass.store(index, hp);

        // Backward difference; close enough to the five-point derivative at
        // this rate and one tap cheaper.
        let d = hp - self.high_pass.at(index - 1);
        self.derivative.store(index, d);

        let sq = d * d;
        self.squared.store(index, sq);

        let mut acc = 0.0;
        for k in 0..WINDOW_SIZE as i64 {
            acc += self.squared.at(index - k);
        }
        self.integral.store(index, acc / WINDOW_SIZE as f32);
    }

    pub fn raw_at(&self, index: i64) -> u16 {
        self.raw.at(index)
    }

    pub fn dc_block_at(&self, index: i64) -> f32 {
        self.dc_block.at(index)
    }

    pub fn low_pass_at(&self, index: i64) -> f32 {
        self.low_pass.at(index)
    }

    /// The band-passed signal exposed to consumers; this is the high-pass
    /// output, which is also what the trace renderer draws.
    pub fn filtered_at(&self, index: i64) -> f32 {
        self.high_pass.at(index)
    }

    pub fn derivative_at(&self, index: i64) -> f32 {
        self.derivative.at(index)
    }

    pub fn squared_at(&self, index: i64) -> f32 {
        self.squared.at(index)
    }

    pub fn integral_at(&self, index: i64) -> f32 {
        self.integral.at(index)
    }

    /// Largest squared-derivative value in the 11-sample window ending at
    /// `index`. The squared slope is M-shaped around a peak, so nearby
    /// samples must be scanned to find its true height.
    pub fn peak_slope(&self, index: i64) -> f32 {
        let mut best = 0.0f32;
        for k in (index - 10)..=index {
            best = best.max(self.squared.at(k));
        }
        best
    }
}
