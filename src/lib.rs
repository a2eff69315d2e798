use crate::apd::ApdDigitizer;
use crate::channel::ChannelId;
use crate::deposit::{ApdHit, ChargeDeposit, DepositOutcome};
use crate::electronics::CalibrationProvider;
use crate::field::FieldTable;
use crate::geometry::SAMPLE_PERIOD_US;
use crate::wire::WireDigitizer;
use bon::bon;
use rand::Rng;
use std::fmt;
use uom::si::f64::{Energy, Length, Time, Velocity};

/// Waveform containers, sampling, and quantization.
pub mod adc;
/// Prompt-light pathway for the sensor groups.
pub mod apd;
/// Readout channel numbering.
pub mod channel;
/// Input records and per-deposit outcomes.
pub mod deposit;
/// Per-channel calibration database and its text format.
pub mod electronics;
/// Drift and weighting potential tables.
pub mod field;
/// Hardware constants of the readout stack.
pub mod geometry;
/// White-noise injection.
pub mod noise;
/// Analog front-end shaping chains.
pub mod shaping;
/// Drift-and-induction pathway for the wire planes.
pub mod wire;

/// The error type returned when digitizing an event fails.
///
/// Any error leaves the output set exactly as it was before the call.
#[derive(Clone, Debug, PartialEq)]
pub enum DigitizeError {
    /// The digitizer is configured with unusable trace dimensions.
    Config(&'static str),
    /// A channel lacks a calibration entry the configuration requires.
    MissingCalibration {
        channel: ChannelId,
        what: &'static str,
    },
    /// Both pathways are enabled but disagree on the trigger offset.
    TriggerMismatch { wires: Time, apds: Time },
    /// A pathway produced a trace of the wrong length.
    LengthMismatch {
        channel: ChannelId,
        expected: usize,
        found: usize,
    },
}

impl fmt::Display for DigitizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigitizeError::Config(message) => write!(f, "{message}"),
            DigitizeError::MissingCalibration { channel, what } => {
                write!(f, "no {what} calibration for channel {channel}")
            }
            DigitizeError::TriggerMismatch { wires, apds } => {
                write!(
                    f,
                    "trigger offsets disagree: wires at {} us, sensors at {} us",
                    wires.get::<uom::si::time::microsecond>(),
                    apds.get::<uom::si::time::microsecond>()
                )
            }
            DigitizeError::LengthMismatch {
                channel,
                expected,
                found,
            } => {
                write!(
                    f,
                    "channel {channel} produced {found} samples, expected {expected}"
                )
            }
        }
    }
}

impl std::error::Error for DigitizeError {}

/// Tallies of inputs that were skipped rather than digitized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SkipCounters {
    /// Deposits or hits outside the trace window.
    pub out_of_time: u32,
    /// Deposits too small to show above one ADC count.
    pub sub_threshold: u32,
    /// Deposits outside the instrumented lateral span.
    pub out_of_region: u32,
    /// Traces frozen where the drift field vanished.
    pub truncated: u32,
    /// Traces still drifting at the end of the window.
    pub exhausted: u32,
    /// Hits addressed to sensor groups that do not exist.
    pub bad_group: u32,
}

/// What one call to [`Digitizer::digitize`] did with its inputs.
#[derive(Clone, Debug, PartialEq)]
pub struct DigitizeSummary {
    /// One outcome per deposit, in input order.
    pub outcomes: Vec<DepositOutcome>,
    /// Output sample index corresponding to a deposit clock of zero.
    pub trigger_sample: usize,
    pub skipped: SkipCounters,
}

/// Full-readout digitizer driving both pathways over one event.
pub struct Digitizer {
    wires: WireDigitizer,
    apds: ApdDigitizer,
    digitize_wires: bool,
    digitize_apds: bool,
}

#[bon]
impl Digitizer {
    /// Builds both pathways from one shared set of knobs. Anything not set
    /// here keeps its pathway default.
    #[builder]
    pub fn new(
        samples: usize,
        field: FieldTable,
        oversampling: Option<usize>,
        trigger_offset: Option<Time>,
        drift_velocity: Option<Velocity>,
        collection_velocity: Option<Velocity>,
        electron_lifetime: Option<Time>,
        transverse_diffusion: Option<f64>,
        longitudinal_diffusion: Option<f64>,
        induction: Option<bool>,
        induction_neighbors: Option<usize>,
        v_shift: Option<Length>,
        w_value: Option<Energy>,
        energy_resolution: Option<f64>,
        u_baseline: Option<f64>,
        v_baseline: Option<f64>,
        apd_baseline: Option<f64>,
        wire_noise: Option<f64>,
        apd_noise: Option<f64>,
        yield_factor: Option<f64>,
        #[builder(default = true)] apply_empirical_scaling: bool,
        #[builder(default = false)] apply_gain_correction: bool,
        #[builder(default = true)] digitize_wires: bool,
        #[builder(default = true)] digitize_apds: bool,
    ) -> Self {
        let wires = WireDigitizer::builder()
            .samples(samples)
            .field(field)
            .maybe_oversampling(oversampling)
            .maybe_trigger_offset(trigger_offset)
            .maybe_drift_velocity(drift_velocity)
            .maybe_collection_velocity(collection_velocity)
            .maybe_electron_lifetime(electron_lifetime)
            .maybe_transverse_diffusion(transverse_diffusion)
            .maybe_longitudinal_diffusion(longitudinal_diffusion)
            .maybe_induction(induction)
            .maybe_induction_neighbors(induction_neighbors)
            .maybe_v_shift(v_shift)
            .maybe_w_value(w_value)
            .maybe_energy_resolution(energy_resolution)
            .maybe_u_baseline(u_baseline)
            .maybe_v_baseline(v_baseline)
            .maybe_wire_noise(wire_noise)
            .apply_empirical_scaling(apply_empirical_scaling)
            .apply_gain_correction(apply_gain_correction)
            .build();
        let apds = ApdDigitizer::builder()
            .samples(samples)
            .maybe_oversampling(oversampling)
            .maybe_trigger_offset(trigger_offset)
            .maybe_yield_factor(yield_factor)
            .maybe_apd_baseline(apd_baseline)
            .maybe_apd_noise(apd_noise)
            .apply_empirical_scaling(apply_empirical_scaling)
            .build();

        Self {
            wires,
            apds,
            digitize_wires,
            digitize_apds,
        }
    }
}

impl Digitizer {
    /// Composes independently configured pathways, with both enabled.
    pub fn from_parts(wires: WireDigitizer, apds: ApdDigitizer) -> Self {
        Self {
            wires,
            apds,
            digitize_wires: true,
            digitize_apds: true,
        }
    }

    pub fn wires(&self) -> &WireDigitizer {
        &self.wires
    }

    pub fn apds(&self) -> &ApdDigitizer {
        &self.apds
    }

    /// Digitizes one event into `out`, appending one trace per readout
    /// channel of each enabled pathway.
    ///
    /// On error nothing is appended.
    pub fn digitize<P, R>(
        &mut self,
        deposits: &[ChargeDeposit],
        hits: &[ApdHit],
        electronics: &P,
        rng: &mut R,
        out: &mut adc::WaveformSet,
    ) -> Result<DigitizeSummary, DigitizeError>
    where
        P: CalibrationProvider + ?Sized,
        R: Rng + ?Sized,
    {
        if self.digitize_wires && (self.wires.samples() == 0 || self.wires.oversampling() == 0) {
            return Err(DigitizeError::Config(
                "wire traces need nonzero samples and oversampling",
            ));
        }
        if self.digitize_apds && (self.apds.samples() == 0 || self.apds.oversampling() == 0) {
            return Err(DigitizeError::Config(
                "sensor traces need nonzero samples and oversampling",
            ));
        }
        if self.digitize_wires
            && self.digitize_apds
            && self.wires.trigger_offset_us() != self.apds.trigger_offset_us()
        {
            return Err(DigitizeError::TriggerMismatch {
                wires: self.wires.trigger_offset(),
                apds: self.apds.trigger_offset(),
            });
        }

        let start = out.len();
        let result = self.run(deposits, hits, electronics, rng, out, start);
        if result.is_err() {
            out.truncate(start);
        }
        result
    }

    fn run<P, R>(
        &mut self,
        deposits: &[ChargeDeposit],
        hits: &[ApdHit],
        electronics: &P,
        rng: &mut R,
        out: &mut adc::WaveformSet,
        start: usize,
    ) -> Result<DigitizeSummary, DigitizeError>
    where
        P: CalibrationProvider + ?Sized,
        R: Rng + ?Sized,
    {
        let mut skipped = SkipCounters::default();
        let mut outcomes = Vec::with_capacity(deposits.len());

        if self.digitize_apds {
            self.apds.reset();
            for hit in hits {
                self.apds.accumulate(hit, &mut skipped);
            }
            self.apds.emit(electronics, rng, out)?;
        }
        if self.digitize_wires {
            self.wires.reset();
            for deposit in deposits {
                outcomes.push(self.wires.accumulate(deposit, rng, &mut skipped));
            }
            self.wires.emit(electronics, rng, out)?;
        }

        let expected = if self.digitize_wires {
            self.wires.samples()
        } else {
            self.apds.samples()
        };
        for waveform in out.iter().skip(start) {
            if waveform.samples.len() != expected {
                return Err(DigitizeError::LengthMismatch {
                    channel: waveform.channel,
                    expected,
                    found: waveform.samples.len(),
                });
            }
        }

        let trigger_us = if self.digitize_wires {
            self.wires.trigger_offset_us()
        } else {
            self.apds.trigger_offset_us()
        };
        Ok(DigitizeSummary {
            outcomes,
            trigger_sample: (trigger_us / SAMPLE_PERIOD_US) as usize,
            skipped,
        })
    }
}
