use crate::adc::Waveform;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// White-noise amplitude for one channel, as an RMS in the same scale as the
/// samples it is added to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoiseModel {
    rms: f64,
}

impl NoiseModel {
    pub fn new(rms: f64) -> Self {
        Self { rms }
    }

    pub fn rms(&self) -> f64 {
        self.rms
    }
}

/// Adds an independent Gaussian draw of the given RMS to every sample.
/// Non-positive and non-finite amplitudes leave the waveform untouched.
pub fn add_white_noise<R: Rng + ?Sized>(waveform: &mut Waveform<f64>, rms: f64, rng: &mut R) {
    if !(rms > 0.0) {
        return;
    }
    let Ok(normal) = Normal::new(0.0, rms) else {
        return;
    };
    for sample in waveform.as_mut_slice() {
        *sample += normal.sample(rng);
    }
}
