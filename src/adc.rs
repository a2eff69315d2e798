use crate::channel::ChannelId;
use num_traits::{NumAssign, Zero};
use std::ops::{Index, IndexMut};

/// A fixed-length trace of uniformly spaced samples.
#[derive(Clone, Debug, PartialEq)]
pub struct Waveform<T> {
    samples: Vec<T>,
}

impl<T> Waveform<T> {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.samples
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.samples.iter()
    }
}

impl<T: Zero + Copy> Waveform<T> {
    /// An all-zero trace of the given length.
    pub fn zeros(len: usize) -> Self {
        Self {
            samples: vec![T::zero(); len],
        }
    }

    /// Zeroes every sample, keeping the length.
    pub fn reset(&mut self) {
        self.samples.fill(T::zero());
    }
}

impl<T: NumAssign + Copy> Waveform<T> {
    pub fn scale(&mut self, factor: T) {
        for sample in &mut self.samples {
            *sample *= factor;
        }
    }
}

impl<T> Index<usize> for Waveform<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.samples[index]
    }
}

impl<T> IndexMut<usize> for Waveform<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.samples[index]
    }
}

impl<T> From<Vec<T>> for Waveform<T> {
    fn from(samples: Vec<T>) -> Self {
        Self { samples }
    }
}

/// One finished readout trace tagged with its channel.
#[derive(Clone, Debug, PartialEq)]
pub struct DigitizedWaveform {
    pub channel: ChannelId,
    pub samples: Waveform<i32>,
}

/// An ordered collection of finished traces, one entry per digitized channel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WaveformSet {
    waveforms: Vec<DigitizedWaveform>,
}

impl WaveformSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, waveform: DigitizedWaveform) {
        self.waveforms.push(waveform);
    }

    pub fn len(&self) -> usize {
        self.waveforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waveforms.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DigitizedWaveform> {
        self.waveforms.iter()
    }

    /// The trace for a channel, if one was digitized.
    pub fn get(&self, channel: ChannelId) -> Option<&DigitizedWaveform> {
        self.waveforms.iter().find(|w| w.channel == channel)
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.waveforms.truncate(len);
    }
}

/// Picks every `factor`-th source sample into `dst`, starting at index zero.
pub fn decimate(src: &Waveform<f64>, dst: &mut Waveform<f64>, factor: usize) {
    for (m, sample) in dst.as_mut_slice().iter_mut().enumerate() {
        *sample = src[m * factor];
    }
}

/// Rounds to the nearest count, with exact halves rounding away from zero.
///
/// ```
/// use digi::adc::quantize;
///
/// assert_eq!(quantize(1.5), 2);
/// assert_eq!(quantize(-1.5), -2);
/// assert_eq!(quantize(0.4), 0);
/// ```
pub fn quantize(value: f64) -> i32 {
    (value + if value > 0.0 { 0.5 } else { -0.5 }) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeros_reset_and_scale() {
        let mut wf = Waveform::<f64>::zeros(4);
        assert_eq!(wf.len(), 4);
        wf[2] = 3.0;
        wf.scale(2.0);
        assert_eq!(wf.as_slice(), &[0.0, 0.0, 6.0, 0.0]);
        wf.reset();
        assert_eq!(wf.as_slice(), &[0.0; 4]);
    }

    #[test]
    fn decimate_picks_leading_samples_of_each_group() {
        let src = Waveform::from((0..20).map(f64::from).collect::<Vec<_>>());
        let mut dst = Waveform::zeros(4);
        decimate(&src, &mut dst, 5);
        assert_eq!(dst.as_slice(), &[0.0, 5.0, 10.0, 15.0]);
    }

    #[test]
    fn quantize_rounds_half_away_from_zero() {
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(0.5), 1);
        assert_eq!(quantize(-0.5), -1);
        assert_eq!(quantize(2.49), 2);
        assert_eq!(quantize(2.5), 3);
        assert_eq!(quantize(-2.5), -3);
        assert_eq!(quantize(1663.5), 1664);
    }

    #[test]
    fn waveform_set_lookup_by_channel() {
        let mut set = WaveformSet::new();
        let channel = ChannelId::new(5).unwrap();
        set.push(DigitizedWaveform {
            channel,
            samples: Waveform::zeros(2),
        });
        assert_eq!(set.len(), 1);
        assert!(set.get(channel).is_some());
        assert!(set.get(ChannelId::new(6).unwrap()).is_none());
        set.truncate(0);
        assert!(set.is_empty());
    }
}
