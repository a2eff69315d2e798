use crate::geometry::{APD_GROUPS, CHANNELS_PER_PLANE, CHANNEL_PITCH_MM};
use std::fmt;

/// Total number of readout channels: two wire planes plus the light-sensor
/// groups.
pub const NUM_CHANNELS: usize = 2 * CHANNELS_PER_PLANE + APD_GROUPS;

/// Identifier of one readout channel.
///
/// Channels are numbered contiguously: collection (U) wires first, induction
/// (V) wires second, light-sensor groups last.
///
/// # Examples
///
/// ```
/// use digi::channel::{ChannelId, ChannelKind};
///
/// let channel = ChannelId::new(40).unwrap();
/// assert_eq!(channel.kind(), ChannelKind::VWire);
/// assert_eq!(channel.plane_index(), 2);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(usize);

impl ChannelId {
    /// Creates a channel identifier from its readout number. Returns `None`
    /// if the number does not belong to any channel.
    pub fn new(number: usize) -> Option<Self> {
        (number < NUM_CHANNELS).then_some(Self(number))
    }
    /// Collection-plane wire channel from its index within the plane.
    pub fn u_wire(index: usize) -> Option<Self> {
        (index < CHANNELS_PER_PLANE).then_some(Self(index))
    }
    /// Induction-plane wire channel from its index within the plane.
    pub fn v_wire(index: usize) -> Option<Self> {
        (index < CHANNELS_PER_PLANE).then_some(Self(CHANNELS_PER_PLANE + index))
    }
    /// Light-sensor channel from its group number.
    pub fn apd(group: usize) -> Option<Self> {
        (group < APD_GROUPS).then_some(Self(2 * CHANNELS_PER_PLANE + group))
    }
    /// The readout number of this channel.
    pub fn number(self) -> usize {
        self.0
    }
    /// The role of this channel, derived from where its number falls in the
    /// readout map.
    pub fn kind(self) -> ChannelKind {
        if self.0 < CHANNELS_PER_PLANE {
            ChannelKind::UWire
        } else if self.0 < 2 * CHANNELS_PER_PLANE {
            ChannelKind::VWire
        } else {
            ChannelKind::Apd
        }
    }
    /// Index within the channel's own plane (for wires) or sensor bank (for
    /// light sensors).
    pub fn plane_index(self) -> usize {
        match self.kind() {
            ChannelKind::UWire => self.0,
            ChannelKind::VWire => self.0 - CHANNELS_PER_PLANE,
            ChannelKind::Apd => self.0 - 2 * CHANNELS_PER_PLANE,
        }
    }
    /// Iterates over every channel of the readout, in number order.
    pub fn all() -> impl Iterator<Item = ChannelId> {
        (0..NUM_CHANNELS).map(ChannelId)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a readout channel. Pathway-specific behavior matches on this
/// exhaustively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Collection wire: ultimately absorbs the drifting charge.
    UWire,
    /// Induction wire: sees only a transient signal as charge passes nearby.
    VWire,
    /// Light-sensor group: no drift tracing, direct deposit of counts.
    Apd,
}

/// Lateral origin of a wire channel's cell, relative to the detector midline.
pub(crate) fn cell_origin_mm(index: usize) -> f64 {
    (index as f64 - (CHANNELS_PER_PLANE / 2) as f64) * CHANNEL_PITCH_MM
}
