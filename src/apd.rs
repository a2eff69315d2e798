use crate::adc::{decimate, quantize, DigitizedWaveform, Waveform, WaveformSet};
use crate::channel::ChannelId;
use crate::deposit::{in_us, ApdHit};
use crate::electronics::CalibrationProvider;
use crate::geometry::{
    ADC_COUNTS, APD_BASELINE_COUNTS, APD_FULL_SCALE_ELECTRONS, APD_GAIN, APD_GROUPS, OVERSAMPLING,
    SAMPLE_PERIOD_US, TRIGGER_OFFSET_US,
};
use crate::shaping::TransferFunction;
use crate::{DigitizeError, SkipCounters};
use bon::bon;
use log::{error, warn};
use rand::Rng;
use std::collections::BTreeSet;
use uom::si::f64::Time;
use uom::si::time::microsecond;

/// Prompt-light pathway for the sensor groups.
///
/// Hits deposit a persisting step directly into a group's high-bandwidth
/// buffer; there is no drift tracing. [`ApdDigitizer::emit`] then shapes,
/// samples, and quantizes every group of the bank.
pub struct ApdDigitizer {
    samples: usize,
    oversampling: usize,
    trigger_offset_us: f64,
    apd_gain: f64,
    yield_factor: f64,
    apd_baseline: f64,
    apd_noise: Option<f64>,
    apply_empirical_scaling: bool,
    high: Vec<Waveform<f64>>,
    sampled: Vec<Waveform<f64>>,
    touched: BTreeSet<usize>,
}

#[bon]
impl ApdDigitizer {
    #[builder]
    pub fn new(
        /// Length of every output trace.
        samples: usize,
        /// High-bandwidth steps per output sample.
        #[builder(default = OVERSAMPLING)]
        oversampling: usize,
        /// Trace time assigned to a hit clock of zero.
        #[builder(default = Time::new::<microsecond>(TRIGGER_OFFSET_US))]
        trigger_offset: Time,
        /// Avalanche gain applied between the sensor and the ADC scale.
        #[builder(default = APD_GAIN)]
        apd_gain: f64,
        /// Overall light-collection multiplier.
        #[builder(default = 1.0)]
        yield_factor: f64,
        #[builder(default = APD_BASELINE_COUNTS)]
        apd_baseline: f64,
        /// Channel-independent white noise RMS in electrons at the sensor
        /// input, overriding the calibration's per-channel noise models.
        apd_noise: Option<f64>,
        #[builder(default = true)]
        apply_empirical_scaling: bool,
    ) -> Self {
        Self {
            samples,
            oversampling,
            trigger_offset_us: in_us(trigger_offset),
            apd_gain,
            yield_factor,
            apd_baseline,
            apd_noise,
            apply_empirical_scaling,
            high: vec![Waveform::zeros(samples * oversampling); APD_GROUPS],
            sampled: vec![Waveform::zeros(samples); APD_GROUPS],
            touched: BTreeSet::new(),
        }
    }
}

impl ApdDigitizer {
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn oversampling(&self) -> usize {
        self.oversampling
    }

    pub fn trigger_offset(&self) -> Time {
        Time::new::<microsecond>(self.trigger_offset_us)
    }

    pub(crate) fn trigger_offset_us(&self) -> f64 {
        self.trigger_offset_us
    }

    fn high_bandwidth_period_us(&self) -> f64 {
        SAMPLE_PERIOD_US / self.oversampling as f64
    }

    /// Zeroes every internal buffer for the next event.
    pub fn reset(&mut self) {
        for buffer in &mut self.high {
            buffer.reset();
        }
        for buffer in &mut self.sampled {
            buffer.reset();
        }
        self.touched.clear();
    }

    /// The accumulated high-bandwidth trace of a sensor group, before
    /// shaping.
    pub fn unshaped(&self, group: usize) -> Option<&Waveform<f64>> {
        self.high.get(group)
    }

    /// Adds one hit as a step that persists to the end of the trace. Hits on
    /// unknown groups or outside the trace window are counted and skipped.
    pub fn accumulate(&mut self, hit: &ApdHit, counters: &mut SkipCounters) {
        let group = usize::from(hit.group);
        if group >= APD_GROUPS {
            error!("hit on unknown sensor group {group}");
            counters.bad_group += 1;
            return;
        }

        let n_high = self.samples * self.oversampling;
        let start = self.trigger_offset_us + in_us(hit.time);
        if start < 0.0 {
            warn!("hit at {start:.1} us is before the trace window");
            counters.out_of_time += 1;
            return;
        }
        let time_index = (start / self.high_bandwidth_period_us()) as usize;
        if time_index >= n_high {
            warn!("hit at {start:.1} us is after the trace window");
            counters.out_of_time += 1;
            return;
        }

        let buffer = &mut self.high[group];
        for j in time_index..n_high {
            buffer[j] += hit.magnitude;
        }
        self.touched.insert(group);
    }

    /// Shapes, samples, and quantizes every sensor group into `out`.
    pub fn emit<P: CalibrationProvider + ?Sized, R: Rng + ?Sized>(
        &mut self,
        electronics: &P,
        rng: &mut R,
        out: &mut WaveformSet,
    ) -> Result<(), DigitizeError> {
        let period = self.high_bandwidth_period_us();
        let touched: Vec<usize> = self.touched.iter().copied().collect();

        let mut last: Option<&TransferFunction> = None;
        let mut gain = 1.0;
        for &group in &touched {
            let Some(channel) = ChannelId::apd(group) else {
                continue;
            };
            match electronics.transfer_function_for(channel) {
                Some(tf) => {
                    if last != Some(tf) {
                        gain = tf.gain_us(period);
                        last = Some(tf);
                    }
                    tf.transform_us(self.high[group].as_mut_slice(), period);
                    self.high[group].scale(1.0 / gain);
                }
                // Dead group: calibration knows no front end for it.
                None => self.high[group].reset(),
            }
        }

        let conversion = self.apd_gain * ADC_COUNTS / APD_FULL_SCALE_ELECTRONS;
        for group in 0..APD_GROUPS {
            let Some(channel) = ChannelId::apd(group) else {
                continue;
            };
            decimate(&self.high[group], &mut self.sampled[group], self.oversampling);

            let rms = match self.apd_noise {
                Some(electrons) => Some(electrons / self.apd_gain),
                None => electronics.noise_model_for(channel).map(|m| m.rms()),
            };
            if let Some(rms) = rms {
                crate::noise::add_white_noise(&mut self.sampled[group], rms, rng);
            }

            let scaling = if self.apply_empirical_scaling {
                electronics
                    .scaling_for(channel)
                    .ok_or(DigitizeError::MissingCalibration {
                        channel,
                        what: "scaling",
                    })?
            } else {
                1.0
            };

            let baseline = self.apd_baseline;
            let yield_factor = self.yield_factor;
            let samples: Vec<i32> = self.sampled[group]
                .iter()
                .map(|&v| quantize(v * conversion * scaling * yield_factor + baseline))
                .collect();
            out.push(DigitizedWaveform {
                channel,
                samples: Waveform::from(samples),
            });
        }
        Ok(())
    }
}
