//! Hardware constants of the reference readout stack.
//!
//! Lengths are in millimeters, times in microseconds and energies in
//! kiloelectronvolts unless a name says otherwise. The stack is a single
//! anode: a collection (U) wire plane at depth zero, an induction (V) wire
//! plane above it, and the drift volume extending up to the cathode.

/// Lateral spacing between neighboring sense wires.
pub const WIRE_PITCH_MM: f64 = 3.0;
/// Number of wires ganged onto one readout channel.
pub const WIRES_PER_CHANNEL: usize = 3;
/// Lateral width covered by one readout channel.
pub const CHANNEL_PITCH_MM: f64 = WIRE_PITCH_MM * WIRES_PER_CHANNEL as f64;
/// Radius of a sense wire.
pub const WIRE_RADIUS_MM: f64 = 0.127 / 2.0;
/// Height of the induction plane above the collection plane.
pub const PLANE_GAP_MM: f64 = 6.0;
/// Height of the cathode above the collection plane.
pub const CATHODE_HEIGHT_MM: f64 = 198.4;

/// Readout channels per wire plane.
pub const CHANNELS_PER_PLANE: usize = 38;
/// Light-sensor groups read out alongside the wire planes.
pub const APD_GROUPS: usize = 37;
/// Half of the instrumented lateral span of one wire plane.
pub const HALF_SPAN_MM: f64 = CHANNELS_PER_PLANE as f64 * CHANNEL_PITCH_MM / 2.0;

/// Nominal ADC sampling period.
pub const SAMPLE_PERIOD_US: f64 = 1.0;
/// Default ratio between the nominal period and the internal trace step.
pub const OVERSAMPLING: usize = 20;
/// Default offset between a deposit clock of zero and the waveform start.
pub const TRIGGER_OFFSET_US: f64 = 256.0;

/// ADC counts at full scale.
pub const ADC_COUNTS: f64 = 4096.0;
/// Electrons at wire-channel full scale.
pub const WIRE_FULL_SCALE_ELECTRONS: f64 = 300.0 * 4096.0;
/// Electrons at light-sensor full scale, referred to the sensor input.
pub const APD_FULL_SCALE_ELECTRONS: f64 = 3_481_600.0;
/// Avalanche gain of the light sensors.
pub const APD_GAIN: f64 = 200.0;
/// Rest-level ADC counts of a collection-wire channel.
pub const U_BASELINE_COUNTS: f64 = 1664.0;
/// Rest-level ADC counts of an induction-wire channel.
pub const V_BASELINE_COUNTS: f64 = 1664.0;
/// Rest-level ADC counts of a light-sensor channel.
pub const APD_BASELINE_COUNTS: f64 = 1664.0;

/// Energy to create one electron-ion pair in liquid xenon, in eV.
pub const W_VALUE_EV: f64 = 18.7;
/// Bulk electron drift speed at nominal field, in mm/µs.
pub const DRIFT_VELOCITY_MM_PER_US: f64 = 2.8;
/// Drift-field magnitude below which a trace cannot continue, in table
/// potential units per millimeter.
pub const FIELD_FLOOR: f64 = 1e-4;
/// Reference energy at which the fractional ionization resolution is
/// quoted (the ¹³⁶Xe double-beta Q value); the smear RMS scales as √E.
pub const RESOLUTION_REF_KEV: f64 = 2457.8;
