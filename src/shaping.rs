use uom::si::f64::Time;
use uom::si::time::microsecond;

/// Role of a single shaping stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageKind {
    /// CR high-pass (differentiating) stage.
    Differentiator,
    /// RC low-pass (integrating) stage.
    Integrator,
}

/// One first-order analog shaping stage with a fixed time constant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stage {
    kind: StageKind,
    tau_us: f64,
}

impl Stage {
    /// A CR high-pass stage with the given time constant.
    pub fn differentiator(tau: Time) -> Self {
        Self::differentiator_us(tau.get::<microsecond>())
    }

    /// An RC low-pass stage with the given time constant.
    pub fn integrator(tau: Time) -> Self {
        Self::integrator_us(tau.get::<microsecond>())
    }

    pub(crate) fn differentiator_us(tau_us: f64) -> Self {
        Self {
            kind: StageKind::Differentiator,
            tau_us,
        }
    }

    pub(crate) fn integrator_us(tau_us: f64) -> Self {
        Self {
            kind: StageKind::Integrator,
            tau_us,
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn tau(&self) -> Time {
        Time::new::<microsecond>(self.tau_us)
    }

    pub(crate) fn tau_us(&self) -> f64 {
        self.tau_us
    }

    /// Applies this stage in place over uniformly spaced samples.
    fn apply(&self, samples: &mut [f64], period_us: f64) {
        if samples.len() <= 1 {
            return;
        }
        let w = (-period_us / self.tau_us).exp();
        match self.kind {
            StageKind::Differentiator => {
                // Trapezoidal bilinear form; the first output equals the
                // first input.
                let b = (1.0 + w) / 2.0;
                let mut prev_in = samples[0];
                let mut prev_out = samples[0];
                for sample in samples.iter_mut().skip(1) {
                    let input = *sample;
                    *sample = (input - prev_in) * b + prev_out * w;
                    prev_in = input;
                    prev_out = *sample;
                }
            }
            StageKind::Integrator => {
                let mut prev_out = 0.0;
                for sample in samples.iter_mut() {
                    *sample = *sample * (1.0 - w) + prev_out * w;
                    prev_out = *sample;
                }
            }
        }
    }
}

/// An ordered chain of shaping stages modeling one channel's analog front end.
///
/// Stages are applied in list order. The empty chain is the identity and has
/// unit gain.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransferFunction {
    stages: Vec<Stage>,
}

impl TransferFunction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    pub fn with(mut self, stage: Stage) -> Self {
        self.push(stage);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage over the samples in place.
    pub fn transform(&self, samples: &mut [f64], period: Time) {
        self.transform_us(samples, period.get::<microsecond>());
    }

    pub(crate) fn transform_us(&self, samples: &mut [f64], period_us: f64) {
        for stage in &self.stages {
            stage.apply(samples, period_us);
        }
    }

    /// Peak response to a unit step at the given sampling period. Dividing a
    /// shaped waveform by this restores the input amplitude scale.
    pub fn gain(&self, period: Time) -> f64 {
        self.gain_us(period.get::<microsecond>())
    }

    pub(crate) fn gain_us(&self, period_us: f64) -> f64 {
        if self.stages.is_empty() {
            return 1.0;
        }
        let mut probe = vec![1.0; 4096];
        self.transform_us(&mut probe, period_us);
        probe.iter().fold(f64::MIN, |max, &v| max.max(v))
    }
}

impl FromIterator<Stage> for TransferFunction {
    fn from_iter<I: IntoIterator<Item = Stage>>(iter: I) -> Self {
        Self {
            stages: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<Stage>> for TransferFunction {
    fn from(stages: Vec<Stage>) -> Self {
        Self { stages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(len: usize) -> Vec<f64> {
        vec![1.0; len]
    }

    #[test]
    fn empty_chain_is_the_identity() {
        let tf = TransferFunction::new();
        let mut samples = vec![0.0, 1.0, 2.0, 3.0];
        tf.transform_us(&mut samples, 1.0);
        assert_eq!(samples, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(tf.gain_us(1.0), 1.0);
    }

    #[test]
    fn differentiator_decays_a_step_toward_zero() {
        let tf = TransferFunction::from(vec![Stage::differentiator_us(10.0)]);
        let mut samples = step(256);
        tf.transform_us(&mut samples, 1.0);
        assert_eq!(samples[0], 1.0);
        for pair in samples.windows(2) {
            assert!(pair[1] < pair[0]);
        }
        assert!(samples[255].abs() < 1e-9);
    }

    #[test]
    fn integrator_charges_a_step_toward_one() {
        let tf = TransferFunction::from(vec![Stage::integrator_us(3.0)]);
        let mut samples = step(256);
        tf.transform_us(&mut samples, 1.0);
        for pair in samples.windows(2) {
            assert!(pair[1] > pair[0]);
            assert!(pair[1] <= 1.0 + 1e-12);
        }
        assert!((samples[255] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn gain_normalizes_the_step_peak_to_one() {
        let tf = TransferFunction::new()
            .with(Stage::differentiator_us(10.0))
            .with(Stage::integrator_us(3.0))
            .with(Stage::integrator_us(3.0));
        let gain = tf.gain_us(1.0);
        assert!(gain > 0.0 && gain < 1.0);
        let mut samples = step(4096);
        tf.transform_us(&mut samples, 1.0);
        let peak = samples.iter().fold(f64::MIN, |max, &v| max.max(v));
        assert!((peak / gain - 1.0).abs() < 1e-12);
    }

    #[test]
    fn stages_apply_in_list_order() {
        let cr_then_rc = TransferFunction::new()
            .with(Stage::differentiator_us(5.0))
            .with(Stage::integrator_us(2.0));
        let rc_then_cr = TransferFunction::new()
            .with(Stage::integrator_us(2.0))
            .with(Stage::differentiator_us(5.0));
        let mut a = step(64);
        let mut b = step(64);
        cr_then_rc.transform_us(&mut a, 1.0);
        rc_then_cr.transform_us(&mut b, 1.0);
        assert_ne!(a, b);
    }

    #[test]
    fn shaping_is_linear_in_the_input() {
        let tf = TransferFunction::new()
            .with(Stage::differentiator_us(10.0))
            .with(Stage::integrator_us(3.0));
        let mut small: Vec<f64> = (0..64).map(|i| (i as f64 * 0.3).sin()).collect();
        let mut large: Vec<f64> = small.iter().map(|v| v * 7.5).collect();
        tf.transform_us(&mut small, 1.0);
        tf.transform_us(&mut large, 1.0);
        for (s, l) in small.iter().zip(&large) {
            assert!((l - s * 7.5).abs() < 1e-12);
        }
    }

    #[test]
    fn single_sample_input_is_left_alone() {
        let tf = TransferFunction::from(vec![Stage::differentiator_us(10.0)]);
        let mut samples = vec![3.5];
        tf.transform_us(&mut samples, 1.0);
        assert_eq!(samples, vec![3.5]);
    }
}
