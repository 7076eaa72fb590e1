//! Spectral Feature Extractor
//!
//! Provides band power extraction from the one-sided power spectrum of a
//! single channel's epoch.

use log::warn;
use rustfft::{num_complex::Complex, FftPlanner};

use crate::config::DegeneratePolicy;
use crate::error::{Error, Result};
use crate::framer::Epoch;
use crate::loader::Recording;
use crate::types::{Band, PowerBandFeatures};

/// One-sided power spectrum: `power[k]` is `|X_k|^2` at
/// `frequencies[k] = k * sampling_rate / N` for `k = 0..=N/2`.
#[derive(Debug, Clone)]
pub struct Spectrum {
    pub frequencies: Vec<f64>,
    pub power: Vec<f64>,
}

impl Spectrum {
    pub fn total_power(&self) -> f64 {
        self.power.iter().sum()
    }

    /// Sum of bin powers whose frequency falls in `band`.
    pub fn band_power(&self, band: Band) -> f64 {
        self.frequencies
            .iter()
            .zip(&self.power)
            .filter(|&(&f, _)| band.contains(f))
            .map(|(_, &p)| p)
            .sum()
    }

    /// Band powers and their share of the total power. Every bin belongs to
    /// exactly one band, so the ratios sum to 1. When the total power is
    /// exactly zero all ratios are 0.
    pub fn band_features(&self) -> PowerBandFeatures {
        let mut powers = [0.0; 6];
        for (&f, &p) in self.frequencies.iter().zip(&self.power) {
            powers[Band::for_frequency(f) as usize] += p;
        }

        let total: f64 = powers.iter().sum();
        let ratios = if total > 0.0 {
            powers.map(|p| p / total)
        } else {
            [0.0; 6]
        };

        PowerBandFeatures::new(powers, ratios)
    }
}

/// FFT-based spectral analyzer
pub struct SpectralAnalyzer {
    sampling_rate: f64,
    planner: FftPlanner<f64>,
    buffer: Vec<Complex<f64>>,
}

impl SpectralAnalyzer {
    pub fn new(sampling_rate: f64) -> Self {
        Self {
            sampling_rate,
            planner: FftPlanner::new(),
            buffer: Vec::new(),
        }
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    /// Compute the one-sided power spectrum of `samples` (no window, no
    /// normalisation). Any length is accepted; trailing partial epochs are
    /// analysed at their own resolution.
    pub fn power_spectrum(&mut self, samples: &[f64]) -> Spectrum {
        let n = samples.len();
        if n == 0 {
            return Spectrum {
                frequencies: Vec::new(),
                power: Vec::new(),
            };
        }

        self.buffer.clear();
        self.buffer.extend(samples.iter().map(|&s| Complex::new(s, 0.0)));

        let fft = self.planner.plan_fft_forward(n);
        fft.process(&mut self.buffer);

        let n_freqs = n / 2 + 1;
        let resolution = self.sampling_rate / n as f64;

        Spectrum {
            frequencies: (0..n_freqs).map(|k| k as f64 * resolution).collect(),
            power: self.buffer[..n_freqs].iter().map(|c| c.norm_sqr()).collect(),
        }
    }

    pub fn band_features(&mut self, samples: &[f64]) -> PowerBandFeatures {
        self.power_spectrum(samples).band_features()
    }

    /// Features of every channel of `epoch`, in channel order. Zero-power
    /// channels are handled according to `policy`.
    pub fn epoch_features(
        &mut self,
        epoch: &Epoch<'_>,
        recording: &Recording,
        policy: DegeneratePolicy,
    ) -> Result<Vec<PowerBandFeatures>> {
        epoch
            .channels
            .iter()
            .zip(&recording.channels)
            .map(|(samples, channel)| {
                let features = self.band_features(samples);
                if features.is_degenerate() {
                    match policy {
                        DegeneratePolicy::Zero => {
                            warn!("{} {}: zero spectral power, ratios set to 0", epoch.id, channel.label);
                        }
                        DegeneratePolicy::Reject => {
                            return Err(Error::DegenerateSignal {
                                epoch: epoch.id.to_string(),
                                channel: channel.label.clone(),
                            });
                        }
                    }
                }
                Ok(features)
            })
            .collect()
    }
}
