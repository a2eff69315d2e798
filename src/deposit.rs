use crate::channel::ChannelId;
use uom::si::energy::kiloelectronvolt;
use uom::si::f64::{Energy, Length, Time, Velocity};
use uom::si::length::millimeter;
use uom::si::time::microsecond;
use uom::si::velocity::millimeter_per_second;

/// A point-like ionization deposit produced by the upstream particle
/// transport stage.
///
/// Deposits are pure inputs: the digitizer reads them for the duration of one
/// call and reports what happened to each one through a [`DepositOutcome`].
#[derive(Clone, Copy, Debug)]
pub struct ChargeDeposit {
    /// Lateral position across the wire planes, relative to the detector
    /// midline.
    pub lateral: Length,
    /// Height above the collection plane.
    pub depth: Length,
    /// Arrival time relative to the event clock; the trigger offset shifts it
    /// into the waveform window.
    pub time: Time,
    /// Total deposited energy. Carried for downstream consumers; the wire
    /// pathway only drifts the ionization fraction.
    pub energy: Energy,
    /// Energy that went into free ionization charge.
    pub ionization: Energy,
}

/// A prompt hit on one light-sensor group.
#[derive(Clone, Copy, Debug)]
pub struct ApdHit {
    /// Sensor group number within the bank.
    pub group: u16,
    /// Arrival time relative to the event clock.
    pub time: Time,
    /// Count or charge-equivalent magnitude, added to the group's buffer as a
    /// step that persists from the hit sample onward.
    pub magnitude: f64,
}

/// Where one deposit's charge ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitChannel {
    /// Absorbed by this collection channel.
    Collected(ChannelId),
    /// Absorbed by a sense element outside the plane under study.
    OtherGrid,
    /// Never collected within the trace window.
    Unresolved,
}

/// Per-deposit digitization result, returned instead of being written back
/// onto the caller's deposit record.
#[derive(Clone, Debug, PartialEq)]
pub struct DepositOutcome {
    /// Absolute trace time of collection, if the charge was collected.
    pub hit_time: Option<Time>,
    /// The absorbing channel, if any.
    pub hit_channel: HitChannel,
    /// Every channel whose buffer this deposit touched, in number order.
    pub channels_affected: Vec<ChannelId>,
}

impl DepositOutcome {
    pub(crate) fn unresolved() -> Self {
        Self {
            hit_time: None,
            hit_channel: HitChannel::Unresolved,
            channels_affected: Vec::new(),
        }
    }
}

// Unit helpers for the numeric core, which works in mm / µs / keV throughout.

pub(crate) fn in_mm(length: Length) -> f64 {
    length.get::<millimeter>()
}

pub(crate) fn in_us(time: Time) -> f64 {
    time.get::<microsecond>()
}

pub(crate) fn in_kev(energy: Energy) -> f64 {
    energy.get::<kiloelectronvolt>()
}

pub(crate) fn in_mm_per_us(velocity: Velocity) -> f64 {
    velocity.get::<millimeter_per_second>() * 1.0e-6
}
