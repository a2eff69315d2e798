use crate::adc::{decimate, quantize, DigitizedWaveform, Waveform, WaveformSet};
use crate::channel::{cell_origin_mm, ChannelId, ChannelKind};
use crate::deposit::{in_kev, in_mm, in_mm_per_us, in_us, ChargeDeposit, DepositOutcome, HitChannel};
use crate::electronics::CalibrationProvider;
use crate::field::FieldTable;
use crate::geometry::{
    ADC_COUNTS, CHANNELS_PER_PLANE, CHANNEL_PITCH_MM, DRIFT_VELOCITY_MM_PER_US, FIELD_FLOOR,
    HALF_SPAN_MM, OVERSAMPLING, PLANE_GAP_MM, RESOLUTION_REF_KEV, SAMPLE_PERIOD_US,
    TRIGGER_OFFSET_US, U_BASELINE_COUNTS, V_BASELINE_COUNTS, WIRE_FULL_SCALE_ELECTRONS,
    WIRE_PITCH_MM, WIRE_RADIUS_MM, W_VALUE_EV,
};
use crate::shaping::TransferFunction;
use crate::{DigitizeError, SkipCounters};
use bon::bon;
use log::{debug, error, warn};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeSet;
use uom::si::energy::electronvolt;
use uom::si::f64::{Energy, Length, Time, Velocity};
use uom::si::time::microsecond;
use uom::si::velocity::millimeter_per_second;

/// Wire channel a drifting charge is induced on during one trace, addressed
/// by its weighting-grid frame position.
struct TracedChannel {
    channel: ChannelId,
    position: f64,
}

/// Drift-and-induction pathway for the two wire planes.
///
/// Deposits are traced step by step through the drift field; each traced
/// channel accumulates a Shockley-Ramo signal from the weighting-potential
/// difference along the path. [`WireDigitizer::emit`] then shapes, samples,
/// and quantizes every wire channel of the readout.
pub struct WireDigitizer {
    samples: usize,
    oversampling: usize,
    trigger_offset_us: f64,
    field: FieldTable,
    drift_velocity_mm_per_us: f64,
    collection_velocity_mm_per_us: Option<f64>,
    electron_lifetime_us: Option<f64>,
    transverse_diffusion_mm2_per_us: Option<f64>,
    longitudinal_diffusion_mm2_per_us: Option<f64>,
    induction: bool,
    induction_neighbors: usize,
    v_shift_mm: f64,
    w_value_kev: f64,
    u_baseline: f64,
    v_baseline: f64,
    energy_resolution: f64,
    apply_empirical_scaling: bool,
    apply_gain_correction: bool,
    wire_noise_electrons: Option<f64>,
    high: Vec<Waveform<f64>>,
    sampled: Vec<Waveform<f64>>,
    touched: BTreeSet<ChannelId>,
}

#[bon]
impl WireDigitizer {
    #[builder]
    pub fn new(
        /// Length of every output trace.
        samples: usize,
        /// High-bandwidth steps per output sample.
        #[builder(default = OVERSAMPLING)]
        oversampling: usize,
        /// Trace time assigned to a deposit clock of zero.
        #[builder(default = Time::new::<microsecond>(TRIGGER_OFFSET_US))]
        trigger_offset: Time,
        field: FieldTable,
        /// Bulk drift speed in the open volume.
        #[builder(default = Velocity::new::<millimeter_per_second>(DRIFT_VELOCITY_MM_PER_US * 1.0e6))]
        drift_velocity: Velocity,
        /// Speed below the induction plane, where the field concentrates on
        /// the collection wires. Defaults to the bulk speed.
        collection_velocity: Option<Velocity>,
        /// Free-electron lifetime; `None` disables attachment losses.
        electron_lifetime: Option<Time>,
        /// Transverse diffusion coefficient, in mm²/µs.
        transverse_diffusion: Option<f64>,
        /// Longitudinal diffusion coefficient, in mm²/µs.
        longitudinal_diffusion: Option<f64>,
        /// Trace induction-plane channels and collection-plane neighbors.
        #[builder(default = true)]
        induction: bool,
        /// Neighbor channels traced on each side of the reference.
        #[builder(default = 1)]
        induction_neighbors: usize,
        /// Lateral offset of the induction plane relative to the collection
        /// plane.
        #[builder(default = Length::new::<uom::si::length::millimeter>(0.0))]
        v_shift: Length,
        #[builder(default = Energy::new::<electronvolt>(W_VALUE_EV))]
        w_value: Energy,
        #[builder(default = U_BASELINE_COUNTS)]
        u_baseline: f64,
        #[builder(default = V_BASELINE_COUNTS)]
        v_baseline: f64,
        /// Fractional ionization resolution at the reference energy; zero
        /// disables smearing.
        #[builder(default = 0.02)]
        energy_resolution: f64,
        #[builder(default = true)]
        apply_empirical_scaling: bool,
        #[builder(default = false)]
        apply_gain_correction: bool,
        /// Channel-independent white noise RMS in electrons, overriding the
        /// calibration's per-channel noise models.
        wire_noise: Option<f64>,
    ) -> Self {
        let wire_buffers = 2 * CHANNELS_PER_PLANE;
        Self {
            samples,
            oversampling,
            trigger_offset_us: in_us(trigger_offset),
            field,
            drift_velocity_mm_per_us: in_mm_per_us(drift_velocity),
            collection_velocity_mm_per_us: collection_velocity.map(in_mm_per_us),
            electron_lifetime_us: electron_lifetime.map(in_us),
            transverse_diffusion_mm2_per_us: transverse_diffusion,
            longitudinal_diffusion_mm2_per_us: longitudinal_diffusion,
            induction,
            induction_neighbors,
            v_shift_mm: in_mm(v_shift),
            w_value_kev: in_kev(w_value),
            u_baseline,
            v_baseline,
            energy_resolution,
            apply_empirical_scaling,
            apply_gain_correction,
            wire_noise_electrons: wire_noise,
            high: vec![Waveform::zeros(samples * oversampling); wire_buffers],
            sampled: vec![Waveform::zeros(samples); wire_buffers],
            touched: BTreeSet::new(),
        }
    }
}

impl WireDigitizer {
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

    /// The accumulated high-bandwidth trace of a wire channel, before
    /// shaping. `None` for light-sensor channels.
    pub fn unshaped(&self, channel: ChannelId) -> Option<&Waveform<f64>> {
        match channel.kind() {
            ChannelKind::Apd => None,
            _ => Some(&self.high[channel.number()]),
        }
    }

    /// Drifts one deposit through the field and accumulates its induced
    /// signals, reporting where the charge ended up. Deposits outside the
    /// instrumented region or the trace window are counted and skipped.
    pub fn accumulate<R: Rng + ?Sized>(
        &mut self,
        deposit: &ChargeDeposit,
        rng: &mut R,
        counters: &mut SkipCounters,
    ) -> DepositOutcome {
        let mut outcome = DepositOutcome::unresolved();
        let lateral = in_mm(deposit.lateral);
        let depth = in_mm(deposit.depth);
        let mut ionization = in_kev(deposit.ionization);

        if self.energy_resolution > 0.0 && ionization > 0.0 {
            let sigma = self.energy_resolution * (RESOLUTION_REF_KEV * ionization).sqrt();
            if let Ok(normal) = Normal::new(0.0, sigma) {
                ionization += normal.sample(rng);
            }
        }

        // Deposits below one ADC count can never show above the baseline.
        let adc_limit = WIRE_FULL_SCALE_ELECTRONS * self.w_value_kev / ADC_COUNTS;
        if ionization <= adc_limit {
            debug!("skipping {ionization:.3} keV deposit below one count");
            counters.sub_threshold += 1;
            return outcome;
        }

        if lateral.abs() > HALF_SPAN_MM {
            debug!("skipping deposit at {lateral:.1} mm, outside the wire planes");
            counters.out_of_region += 1;
            return outcome;
        }

        let n_high = self.samples * self.oversampling;
        let period = self.high_bandwidth_period_us();
        let start = self.trigger_offset_us + in_us(deposit.time);
        if start < 0.0 {
            warn!("deposit at {start:.1} us is before the trace window");
            counters.out_of_time += 1;
            return outcome;
        }
        let time_index = (start / period) as usize;
        if time_index >= n_high {
            warn!("deposit at {start:.1} us is after the trace window");
            counters.out_of_time += 1;
            return outcome;
        }

        let reference = closest_channel(lateral);
        let relative = lateral - cell_origin_mm(reference);

        let u_channels = self.traced_channels(ChannelKind::UWire, reference);
        let v_channels = if self.induction {
            self.traced_channels(ChannelKind::VWire, reference)
        } else {
            Vec::new()
        };
        if self.induction {
            self.trace(
                ChannelKind::VWire,
                &v_channels,
                reference,
                relative,
                depth,
                time_index,
                ionization,
                rng,
                counters,
                None,
            );
        }
        self.trace(
            ChannelKind::UWire,
            &u_channels,
            reference,
            relative,
            depth,
            time_index,
            ionization,
            rng,
            counters,
            Some(&mut outcome),
        );

        let mut affected: Vec<ChannelId> = u_channels
            .iter()
            .chain(v_channels.iter())
            .map(|c| c.channel)
            .collect();
        affected.sort();
        for &channel in &affected {
            self.touched.insert(channel);
        }
        outcome.channels_affected = affected;
        outcome
    }

    /// Channels induced on for a trace referenced to one collection channel,
    /// reference first.
    fn traced_channels(&self, plane: ChannelKind, reference: usize) -> Vec<TracedChannel> {
        let neighbors = if self.induction {
            self.induction_neighbors as i64
        } else {
            0
        };
        let shift = match plane {
            ChannelKind::VWire => self.v_shift_mm,
            _ => 0.0,
        };
        let mut channels = Vec::new();
        for gap in std::iter::once(0).chain((1..=neighbors).flat_map(|g| [-g, g])) {
            let index = reference as i64 + gap;
            if !(0..CHANNELS_PER_PLANE as i64).contains(&index) {
                continue;
            }
            let channel = match plane {
                ChannelKind::VWire => ChannelId::v_wire(index as usize),
                _ => ChannelId::u_wire(index as usize),
            };
            let Some(channel) = channel else { continue };
            channels.push(TracedChannel {
                channel,
                position: (0.5 + gap as f64) * CHANNEL_PITCH_MM + shift,
            });
        }
        channels
    }

    /// Steps one charge through the drift field, accumulating the weighting
    /// signal of every traced channel at each high-bandwidth sample.
    #[allow(clippy::too_many_arguments)]
    fn trace<R: Rng + ?Sized>(
        &mut self,
        plane: ChannelKind,
        channels: &[TracedChannel],
        reference: usize,
        start_x: f64,
        start_z: f64,
        time_index: usize,
        energy_kev: f64,
        rng: &mut R,
        counters: &mut SkipCounters,
        mut outcome: Option<&mut DepositOutcome>,
    ) {
        if plane == ChannelKind::Apd {
            error!("light-sensor channels have no drift trace");
            return;
        }
        let n_high = self.samples * self.oversampling;
        let dt = self.high_bandwidth_period_us();
        let half_pitch = CHANNEL_PITCH_MM / 2.0;
        let mut x = start_x;
        let mut z = start_z;
        let mut accumulated = vec![0.0; channels.len()];

        for i in time_index..n_high {
            let (ex, ez) = self.field.e_field(x, z);
            let magnitude = (ex * ex + ez * ez).sqrt();
            if magnitude < FIELD_FLOOR {
                warn!("drift field vanished at ({x:.2}, {z:.2}) mm, freezing signal");
                counters.truncated += 1;
                for (slot, channel) in channels.iter().enumerate() {
                    let buffer = &mut self.high[channel.channel.number()];
                    for j in i..n_high {
                        buffer[j] += accumulated[slot];
                    }
                }
                return;
            }

            let speed = match self.collection_velocity_mm_per_us {
                Some(v) if z <= PLANE_GAP_MM => v,
                _ => self.drift_velocity_mm_per_us,
            };
            // Electrons drift against the field.
            let mut dx = -ex / magnitude * speed * dt;
            let mut dz = -ez / magnitude * speed * dt;
            if let Some(d) = self.transverse_diffusion_mm2_per_us {
                if let Ok(normal) = Normal::new(0.0, (d * dt).sqrt()) {
                    dx += normal.sample(rng);
                }
            }
            if let Some(d) = self.longitudinal_diffusion_mm2_per_us {
                if let Ok(normal) = Normal::new(0.0, (2.0 * d * dt).sqrt()) {
                    dz += normal.sample(rng);
                }
            }

            let free = match self.electron_lifetime_us {
                Some(tau) => energy_kev * (-((i - time_index) as f64 * dt) / tau).exp(),
                None => energy_kev,
            };

            let landing_x = x + dx;
            let landing_z = z + dz;
            let hit = if landing_z <= 0.0 || wire_hit(landing_x, landing_z, 0.0) {
                Some(ChannelKind::UWire)
            } else if wire_hit(landing_x - self.v_shift_mm, landing_z, PLANE_GAP_MM) {
                Some(ChannelKind::VWire)
            } else {
                None
            };

            if let Some(hit_plane) = hit {
                if let Some(out) = outcome.as_deref_mut() {
                    out.hit_time = Some(Time::new::<microsecond>(i as f64 * dt));
                    out.hit_channel = if hit_plane == plane {
                        let landed =
                            (landing_x / CHANNEL_PITCH_MM).floor() as i64 + reference as i64;
                        match usize::try_from(landed).ok().and_then(ChannelId::u_wire) {
                            Some(channel) => HitChannel::Collected(channel),
                            None => HitChannel::OtherGrid,
                        }
                    } else {
                        HitChannel::OtherGrid
                    };
                }
                // The absorbing channel jumps to full weight; every other
                // electrode ends with zero net induced charge.
                let mut found = false;
                for (slot, channel) in channels.iter().enumerate() {
                    let current =
                        self.field
                            .weight_potential(plane, x - channel.position + half_pitch, z);
                    let next = if !found
                        && hit_plane == plane
                        && (landing_x - channel.position).abs() <= half_pitch
                    {
                        found = true;
                        1.0
                    } else {
                        0.0
                    };
                    accumulated[slot] += free * (next - current);
                    let buffer = &mut self.high[channel.channel.number()];
                    for j in i..n_high {
                        buffer[j] += accumulated[slot];
                    }
                }
                return;
            }

            for (slot, channel) in channels.iter().enumerate() {
                let current =
                    self.field
                        .weight_potential(plane, x - channel.position + half_pitch, z);
                let next = self.field.weight_potential(
                    plane,
                    landing_x - channel.position + half_pitch,
                    landing_z,
                );
                accumulated[slot] += free * (next - current);
                self.high[channel.channel.number()][i] += accumulated[slot];
            }
            x = landing_x;
            z = landing_z;
        }

        warn!("charge still drifting at ({x:.2}, {z:.2}) mm at the end of the trace");
        counters.exhausted += 1;
    }

    /// Shapes, samples, and quantizes every wire channel into `out`.
    pub fn emit<P: CalibrationProvider + ?Sized, R: Rng + ?Sized>(
        &mut self,
        electronics: &P,
        rng: &mut R,
        out: &mut WaveformSet,
    ) -> Result<(), DigitizeError> {
        let period = self.high_bandwidth_period_us();
        let touched: Vec<ChannelId> = self.touched.iter().copied().collect();

        let mut last: Option<&TransferFunction> = None;
        let mut gain = 1.0;
        for &channel in &touched {
            let buffer = channel.number();
            match electronics.transfer_function_for(channel) {
                Some(tf) => {
                    if last != Some(tf) {
                        gain = tf.gain_us(period);
                        last = Some(tf);
                    }
                    tf.transform_us(self.high[buffer].as_mut_slice(), period);
                    self.high[buffer].scale(1.0 / gain);
                }
                // Dead channel: calibration knows no front end for it.
                None => self.high[buffer].reset(),
            }
        }

        let counts_per_kev = ADC_COUNTS / (WIRE_FULL_SCALE_ELECTRONS * self.w_value_kev);
        for channel in ChannelId::all().filter(|c| c.kind() != ChannelKind::Apd) {
            let buffer = channel.number();
            decimate(&self.high[buffer], &mut self.sampled[buffer], self.oversampling);

            let rms = match self.wire_noise_electrons {
                Some(electrons) => Some(electrons * self.w_value_kev),
                None => electronics.noise_model_for(channel).map(|m| m.rms()),
            };
            if let Some(rms) = rms {
                crate::noise::add_white_noise(&mut self.sampled[buffer], rms, rng);
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
            let gain_correction = if self.apply_gain_correction {
                electronics
                    .gain_for(channel)
                    .ok_or(DigitizeError::MissingCalibration {
                        channel,
                        what: "gain",
                    })?
            } else {
                1.0
            };
            let baseline = match channel.kind() {
                ChannelKind::VWire => self.v_baseline,
                _ => self.u_baseline,
            };

            let samples: Vec<i32> = self.sampled[buffer]
                .iter()
                .map(|&v| quantize(v * counts_per_kev * scaling * gain_correction + baseline))
                .collect();
            out.push(DigitizedWaveform {
                channel,
                samples: Waveform::from(samples),
            });
        }
        Ok(())
    }
}

/// Collection channel whose cell contains the given lateral position,
/// clamped onto the plane.
fn closest_channel(lateral_mm: f64) -> usize {
    let mut index = (lateral_mm / CHANNEL_PITCH_MM) as i64 + (CHANNELS_PER_PLANE / 2) as i64;
    if lateral_mm < 0.0 {
        index -= 1;
    }
    index.clamp(0, CHANNELS_PER_PLANE as i64 - 1) as usize
}

/// Whether a point lies inside a sense wire of a plane at height `plane_z`,
/// with wires repeating every pitch and centered half a pitch in.
fn wire_hit(x: f64, z: f64, plane_z: f64) -> bool {
    let dx = x.rem_euclid(WIRE_PITCH_MM) - WIRE_PITCH_MM / 2.0;
    let dz = z - plane_z;
    dx * dx + dz * dz <= WIRE_RADIUS_MM * WIRE_RADIUS_MM
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::GridSpec;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uom::si::energy::kiloelectronvolt;
    use uom::si::length::millimeter;

    fn grid_from(spec: GridSpec, f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
        let mut values = Vec::with_capacity(spec.nx * spec.nz);
        for ix in 0..spec.nx {
            for iz in 0..spec.nz {
                values.push(f(
                    spec.x_min + ix as f64 * spec.dx,
                    spec.z_min + iz as f64 * spec.dz,
                ));
            }
        }
        values
    }

    fn weight_spec() -> GridSpec {
        GridSpec {
            x_min: -15.0,
            z_min: 0.0,
            dx: 1.0,
            dz: 1.0,
            nx: 31,
            nz: 301,
        }
    }

    /// Tent profile peaking over the reference wire at x = 4.5.
    fn tent(x: f64) -> f64 {
        (1.0 - (x - 4.5).abs() / 9.0).max(0.0)
    }

    fn tent_u(x: f64, z: f64) -> f64 {
        tent(x) * (1.0 - z / 300.0).max(0.0)
    }

    /// Induction-plane profile peaking at the plane height and fading over
    /// four millimeters on either side.
    fn tent_v(x: f64, z: f64) -> f64 {
        tent(x) * (1.0 - (z - PLANE_GAP_MM).abs() / 4.0).max(0.0)
    }

    fn vertical_drift_spec() -> GridSpec {
        GridSpec {
            x_min: 0.0,
            z_min: -50.0,
            dx: WIRE_PITCH_MM,
            dz: 350.0,
            nx: 2,
            nz: 2,
        }
    }

    fn field_table() -> FieldTable {
        let ws = weight_spec();
        FieldTable::from_values(
            vertical_drift_spec(),
            vec![50.0, -300.0, 50.0, -300.0],
            ws,
            grid_from(ws, tent_u),
            grid_from(ws, tent_v),
        )
        .unwrap()
    }

    fn deposit(lateral_mm: f64, depth_mm: f64, kev: f64) -> ChargeDeposit {
        ChargeDeposit {
            lateral: Length::new::<millimeter>(lateral_mm),
            depth: Length::new::<millimeter>(depth_mm),
            time: Time::new::<microsecond>(0.0),
            energy: Energy::new::<kiloelectronvolt>(kev),
            ionization: Energy::new::<kiloelectronvolt>(kev),
        }
    }

    fn digitizer(samples: usize, induction: bool) -> WireDigitizer {
        WireDigitizer::builder()
            .samples(samples)
            .field(field_table())
            .trigger_offset(Time::new::<microsecond>(0.0))
            .induction(induction)
            .energy_resolution(0.0)
            .build()
    }

    fn flat_scaling() -> crate::electronics::Electronics {
        let mut electronics = crate::electronics::Electronics::new();
        for channel in ChannelId::all() {
            electronics.set_scaling(channel, 1.0);
        }
        electronics
    }

    #[test]
    fn closest_channel_maps_cells() {
        assert_eq!(closest_channel(0.0), 19);
        assert_eq!(closest_channel(4.5), 19);
        assert_eq!(closest_channel(8.9), 19);
        assert_eq!(closest_channel(9.1), 20);
        assert_eq!(closest_channel(-4.5), 18);
        assert_eq!(closest_channel(500.0), 37);
        assert_eq!(closest_channel(-500.0), 0);
    }

    #[test]
    fn sub_threshold_deposit_is_skipped() {
        let mut wd = digitizer(4, false);
        let mut counters = SkipCounters::default();
        let mut rng = StdRng::seed_from_u64(0);
        let outcome = wd.accumulate(&deposit(4.5, 5.0, 1.0), &mut rng, &mut counters);
        assert_eq!(counters.sub_threshold, 1);
        assert_eq!(outcome.hit_channel, HitChannel::Unresolved);
        assert!(outcome.channels_affected.is_empty());
        let u19 = ChannelId::u_wire(19).unwrap();
        assert!(wd.unshaped(u19).unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn the_one_count_threshold_is_inclusive() {
        // A deposit of exactly one ADC count of ionization is skipped, not
        // traced. A zero pair-creation energy pins the limit at exactly zero.
        let mut wd = WireDigitizer::builder()
            .samples(4)
            .field(field_table())
            .trigger_offset(Time::new::<microsecond>(0.0))
            .induction(false)
            .energy_resolution(0.0)
            .w_value(Energy::new::<electronvolt>(0.0))
            .build();
        let mut counters = SkipCounters::default();
        let mut rng = StdRng::seed_from_u64(0);
        let outcome = wd.accumulate(&deposit(4.5, 5.0, 0.0), &mut rng, &mut counters);
        assert_eq!(counters.sub_threshold, 1);
        assert_eq!(outcome.hit_channel, HitChannel::Unresolved);
        assert!(outcome.channels_affected.is_empty());
    }

    #[test]
    fn out_of_region_and_out_of_time_deposits_are_skipped() {
        let mut wd = digitizer(4, false);
        let mut counters = SkipCounters::default();
        let mut rng = StdRng::seed_from_u64(0);

        wd.accumulate(&deposit(200.0, 5.0, 1000.0), &mut rng, &mut counters);
        assert_eq!(counters.out_of_region, 1);

        let mut early = deposit(4.5, 5.0, 1000.0);
        early.time = Time::new::<microsecond>(-1.0);
        wd.accumulate(&early, &mut rng, &mut counters);
        assert_eq!(counters.out_of_time, 1);

        let mut late = deposit(4.5, 5.0, 1000.0);
        late.time = Time::new::<microsecond>(1.0e6);
        wd.accumulate(&late, &mut rng, &mut counters);
        assert_eq!(counters.out_of_time, 2);
    }

    #[test]
    fn charge_over_a_wire_rises_and_collects() {
        let mut wd = digitizer(4, false);
        let mut counters = SkipCounters::default();
        let mut rng = StdRng::seed_from_u64(0);
        let outcome = wd.accumulate(&deposit(4.5, 5.0, 1000.0), &mut rng, &mut counters);

        let u19 = ChannelId::u_wire(19).unwrap();
        assert_eq!(outcome.hit_channel, HitChannel::Collected(u19));
        let hit_us = outcome.hit_time.unwrap().get::<microsecond>();
        assert!((hit_us - 1.75).abs() < 1e-9);
        assert_eq!(outcome.channels_affected, vec![u19]);

        // 2.8 mm/us at a 0.05 us step crosses 5 mm on the 36th step.
        let trace = wd.unshaped(u19).unwrap();
        assert!(trace[0] > 0.0);
        for i in 1..=35 {
            assert!(trace[i] > trace[i - 1], "sample {i} did not rise");
        }
        for i in 36..trace.len() {
            assert_eq!(trace[i], trace[35]);
        }
        // The per-step differences telescope: the plateau is the deposit
        // energy times one minus the starting weight potential.
        let w0 = field_table().weight_potential(ChannelKind::UWire, 4.5, 5.0);
        let expected = 1000.0 * (1.0 - w0);
        assert!((trace[35] - expected).abs() < 1e-6 * expected);
    }

    #[test]
    fn collection_transfers_the_full_deposit_energy() {
        // With a vanishing weighting potential along the whole path, the
        // only contribution is the jump to full weight at collection.
        let ws = weight_spec();
        let table = FieldTable::from_values(
            vertical_drift_spec(),
            vec![50.0, -300.0, 50.0, -300.0],
            ws,
            vec![0.0; ws.nx * ws.nz],
            vec![0.0; ws.nx * ws.nz],
        )
        .unwrap();
        let mut wd = WireDigitizer::builder()
            .samples(4)
            .field(table)
            .trigger_offset(Time::new::<microsecond>(0.0))
            .induction(false)
            .energy_resolution(0.0)
            .build();
        let mut counters = SkipCounters::default();
        let mut rng = StdRng::seed_from_u64(0);
        let outcome = wd.accumulate(&deposit(4.5, 5.0, 1000.0), &mut rng, &mut counters);

        let u19 = ChannelId::u_wire(19).unwrap();
        assert_eq!(outcome.hit_channel, HitChannel::Collected(u19));
        let trace = wd.unshaped(u19).unwrap();
        assert_eq!(trace[34], 0.0);
        assert_eq!(trace[35], 1000.0);
        assert_eq!(trace[trace.len() - 1], 1000.0);
        let far = wd.unshaped(ChannelId::u_wire(17).unwrap()).unwrap();
        assert!(far.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn absorption_on_the_other_grid_returns_the_traced_weight() {
        let mut wd = digitizer(8, false);
        let mut counters = SkipCounters::default();
        let mut rng = StdRng::seed_from_u64(0);
        // Directly above a wire center, so the charge lands on the induction
        // grid on its way down instead of reaching the collection plane.
        let outcome = wd.accumulate(&deposit(4.5, 15.0, 1000.0), &mut rng, &mut counters);

        assert_eq!(outcome.hit_channel, HitChannel::OtherGrid);
        let trace = wd.unshaped(ChannelId::u_wire(19).unwrap()).unwrap();
        // The collecting electrode of the other grid takes the full image
        // charge; this one ends at zero weight, so the trace settles at
        // minus the starting weight potential times the deposit energy.
        let w0 = field_table().weight_potential(ChannelKind::UWire, 4.5, 15.0);
        let expected = -1000.0 * w0;
        let last = trace[trace.len() - 1];
        assert!(last < 0.0);
        assert!((last - expected).abs() < 1e-6 * expected.abs());
        // Frozen from the absorption step onwards.
        assert_eq!(trace[63], last);
        assert!(trace[62] > 0.0);
    }

    #[test]
    fn deposits_superpose_linearly() {
        let mut counters = SkipCounters::default();
        let mut rng = StdRng::seed_from_u64(0);
        let u19 = ChannelId::u_wire(19).unwrap();

        let mut only_a = digitizer(4, false);
        only_a.accumulate(&deposit(4.5, 5.0, 1000.0), &mut rng, &mut counters);
        let mut only_b = digitizer(4, false);
        only_b.accumulate(&deposit(3.0, 8.0, 500.0), &mut rng, &mut counters);
        let mut both = digitizer(4, false);
        both.accumulate(&deposit(4.5, 5.0, 1000.0), &mut rng, &mut counters);
        both.accumulate(&deposit(3.0, 8.0, 500.0), &mut rng, &mut counters);

        let a = only_a.unshaped(u19).unwrap();
        let b = only_b.unshaped(u19).unwrap();
        let sum = both.unshaped(u19).unwrap();
        for i in 0..sum.len() {
            assert!((sum[i] - (a[i] + b[i])).abs() < 1e-9);
        }
    }

    #[test]
    fn vanishing_field_freezes_the_signal() {
        // Flat potential above 150 mm: charge starting there never moves.
        let drift_spec = GridSpec {
            x_min: 0.0,
            z_min: 0.0,
            dx: WIRE_PITCH_MM,
            dz: 150.0,
            nx: 2,
            nz: 3,
        };
        let ws = weight_spec();
        let table = FieldTable::from_values(
            drift_spec,
            vec![0.0, 0.0, -150.0, 0.0, 0.0, -150.0],
            ws,
            grid_from(ws, tent_u),
            grid_from(ws, tent_v),
        )
        .unwrap();
        let mut wd = WireDigitizer::builder()
            .samples(4)
            .field(table)
            .trigger_offset(Time::new::<microsecond>(0.0))
            .induction(false)
            .energy_resolution(0.0)
            .build();
        let mut counters = SkipCounters::default();
        let mut rng = StdRng::seed_from_u64(0);
        let outcome = wd.accumulate(&deposit(4.5, 200.0, 1000.0), &mut rng, &mut counters);

        assert_eq!(counters.truncated, 1);
        assert_eq!(outcome.hit_channel, HitChannel::Unresolved);
        let trace = wd.unshaped(ChannelId::u_wire(19).unwrap()).unwrap();
        // Accumulated before the field vanished, frozen afterwards.
        let frozen = trace[trace.len() - 1];
        assert!(frozen > 0.0);
        let tail = trace.iter().rev().take_while(|&&v| v == frozen).count();
        assert!(tail > 1);
    }

    #[test]
    fn boundary_deposit_induces_mirror_signals() {
        let mut wd = digitizer(16, true);
        let mut counters = SkipCounters::default();
        let mut rng = StdRng::seed_from_u64(0);
        let outcome = wd.accumulate(&deposit(0.0, 50.0, 1000.0), &mut rng, &mut counters);

        // 50 mm at 2.8 mm/us outlasts sixteen samples.
        assert_eq!(counters.exhausted, 2);
        assert_eq!(outcome.hit_channel, HitChannel::Unresolved);
        let u18 = wd.unshaped(ChannelId::u_wire(18).unwrap()).unwrap();
        let u19 = wd.unshaped(ChannelId::u_wire(19).unwrap()).unwrap();
        for i in 0..u19.len() {
            assert!((u18[i] - u19[i]).abs() < 1e-9);
        }
        assert!(u19.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn induction_signal_flips_sign_at_the_plane() {
        let mut wd = digitizer(4, true);
        let mut counters = SkipCounters::default();
        let mut rng = StdRng::seed_from_u64(0);
        // Crosses the induction plane between the 70th and 71st steps.
        let outcome = wd.accumulate(&deposit(4.4, 15.8, 1000.0), &mut rng, &mut counters);

        let v19 = ChannelId::v_wire(19).unwrap();
        assert!(outcome.channels_affected.contains(&v19));
        let trace = wd.unshaped(v19).unwrap();
        let before = trace[69] - trace[68];
        let after = trace[70] - trace[69];
        assert!(before > 0.0);
        assert!(after < 0.0);
        assert!((before + after).abs() < 1e-9);
    }

    #[test]
    fn emit_requires_scaling_for_every_channel() {
        let mut wd = digitizer(4, false);
        let mut rng = StdRng::seed_from_u64(0);
        let mut out = WaveformSet::new();
        let err = wd
            .emit(&crate::electronics::Electronics::new(), &mut rng, &mut out)
            .unwrap_err();
        assert!(matches!(
            err,
            DigitizeError::MissingCalibration { what: "scaling", .. }
        ));
    }

    #[test]
    fn quiet_channels_sit_at_the_baseline() {
        let mut wd = digitizer(4, false);
        let mut rng = StdRng::seed_from_u64(0);
        let mut out = WaveformSet::new();
        wd.emit(&flat_scaling(), &mut rng, &mut out).unwrap();
        assert_eq!(out.len(), 2 * CHANNELS_PER_PLANE);
        for wf in out.iter() {
            assert!(wf.samples.iter().all(|&v| v == 1664));
        }
    }

    #[test]
    fn noise_override_beats_the_calibration_models() {
        let mut wd = WireDigitizer::builder()
            .samples(64)
            .field(field_table())
            .trigger_offset(Time::new::<microsecond>(0.0))
            .induction(false)
            .energy_resolution(0.0)
            .wire_noise(300.0)
            .build();
        let mut rng = StdRng::seed_from_u64(3);
        let mut out = WaveformSet::new();
        // The calibration models say noise-free; the override wins.
        let mut electronics = flat_scaling();
        for channel in ChannelId::all() {
            electronics.set_noise_model(channel, crate::noise::NoiseModel::new(0.0));
        }
        wd.emit(&electronics, &mut rng, &mut out).unwrap();
        let noisy = out
            .iter()
            .flat_map(|wf| wf.samples.iter())
            .filter(|&&v| v != 1664)
            .count();
        assert!(noisy > 0);
    }
}
