use crate::channel::ChannelKind;
use crate::geometry::WIRE_PITCH_MM;
use std::fmt;

/// Dimensions of one regularly spaced potential grid. Coordinates are in
/// millimeters; values are stored x-major (all depths of the first column,
/// then the next column).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridSpec {
    /// Lateral coordinate of the first column.
    pub x_min: f64,
    /// Depth of the first row.
    pub z_min: f64,
    /// Column spacing.
    pub dx: f64,
    /// Row spacing.
    pub dz: f64,
    /// Number of columns.
    pub nx: usize,
    /// Number of rows.
    pub nz: usize,
}

impl GridSpec {
    fn len(&self) -> usize {
        self.nx * self.nz
    }

    fn validate(&self) -> Result<(), FieldError> {
        if self.nx < 2 || self.nz < 2 || !(self.dx > 0.0) || !(self.dz > 0.0) {
            return Err(FieldError::DegenerateGrid);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Grid {
    spec: GridSpec,
    values: Vec<f64>,
}

impl Grid {
    fn new(spec: GridSpec, values: Vec<f64>) -> Result<Self, FieldError> {
        spec.validate()?;
        if values.len() != spec.len() {
            return Err(FieldError::LengthMismatch {
                expected: spec.len(),
                found: values.len(),
            });
        }
        Ok(Self { spec, values })
    }

    fn at(&self, ix: usize, iz: usize) -> f64 {
        self.values[ix * self.spec.nz + iz]
    }

    /// Cell indices and fractional offsets for a query clamped onto the grid.
    fn locate(&self, x: f64, z: f64) -> (usize, usize, f64, f64) {
        let fx = (x - self.spec.x_min) / self.spec.dx;
        let fz = (z - self.spec.z_min) / self.spec.dz;
        let ix = (fx.floor().max(0.0) as usize).min(self.spec.nx - 2);
        let iz = (fz.floor().max(0.0) as usize).min(self.spec.nz - 2);
        let tx = (fx - ix as f64).clamp(0.0, 1.0);
        let tz = (fz - iz as f64).clamp(0.0, 1.0);
        (ix, iz, tx, tz)
    }

    fn bilinear(&self, x: f64, z: f64) -> f64 {
        let (ix, iz, tx, tz) = self.locate(x, z);
        let v00 = self.at(ix, iz);
        let v01 = self.at(ix, iz + 1);
        let v10 = self.at(ix + 1, iz);
        let v11 = self.at(ix + 1, iz + 1);
        (v00 * (1.0 - tx) + v10 * tx) * (1.0 - tz) + (v01 * (1.0 - tx) + v11 * tx) * tz
    }

    /// Partial derivatives of the bilinear patch containing the query point.
    fn gradient(&self, x: f64, z: f64) -> (f64, f64) {
        let (ix, iz, tx, tz) = self.locate(x, z);
        let v00 = self.at(ix, iz);
        let v01 = self.at(ix, iz + 1);
        let v10 = self.at(ix + 1, iz);
        let v11 = self.at(ix + 1, iz + 1);
        let ddx = ((v10 - v00) * (1.0 - tz) + (v11 - v01) * tz) / self.spec.dx;
        let ddz = ((v01 - v00) * (1.0 - tx) + (v11 - v10) * tx) / self.spec.dz;
        (ddx, ddz)
    }

    fn x_span(&self) -> (f64, f64) {
        (
            self.spec.x_min,
            self.spec.x_min + (self.spec.nx - 1) as f64 * self.spec.dx,
        )
    }
}

/// Static field data for the wire planes: one drift-potential grid covering a
/// single wire-pitch cell, and one weighting-potential grid per wire role.
///
/// The table is an opaque value built once from in-memory buffers; locating
/// and parsing field files is the caller's concern.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldTable {
    drift: Grid,
    weight_u: Grid,
    weight_v: Grid,
}

impl FieldTable {
    /// Builds a table from grids of already-decoded values. The two weighting
    /// grids share one spec.
    pub fn from_values(
        drift_spec: GridSpec,
        drift: Vec<f64>,
        weight_spec: GridSpec,
        weight_u: Vec<f64>,
        weight_v: Vec<f64>,
    ) -> Result<Self, FieldError> {
        Ok(Self {
            drift: Grid::new(drift_spec, drift)?,
            weight_u: Grid::new(weight_spec, weight_u)?,
            weight_v: Grid::new(weight_spec, weight_v)?,
        })
    }

    /// Builds a table from raw byte buffers of little-endian `f64` values,
    /// x-major, exactly `nx * nz` values per grid.
    pub fn from_bytes(
        drift_spec: GridSpec,
        drift: &[u8],
        weight_spec: GridSpec,
        weight_u: &[u8],
        weight_v: &[u8],
    ) -> Result<Self, FieldError> {
        Self::from_values(
            drift_spec,
            decode(drift)?,
            weight_spec,
            decode(weight_u)?,
            decode(weight_v)?,
        )
    }

    /// Drift field vector at `(x, z)`, as the negative gradient of the drift
    /// potential. The lateral coordinate is folded into the grid's pitch
    /// cell; the depth is clamped onto the grid.
    pub fn e_field(&self, x: f64, z: f64) -> (f64, f64) {
        let folded = self.drift.spec.x_min + (x - self.drift.spec.x_min).rem_euclid(WIRE_PITCH_MM);
        let (ddx, ddz) = self.drift.gradient(folded, z);
        (-ddx, -ddz)
    }

    /// Weighting potential of the given plane role at `(x, z)`, where `x` is
    /// relative to the grid's own frame (the reference wire sits at half a
    /// channel pitch). Reads zero outside the lateral span; the depth is
    /// clamped onto the grid. Light-sensor queries always read zero.
    pub fn weight_potential(&self, kind: ChannelKind, x: f64, z: f64) -> f64 {
        let grid = match kind {
            ChannelKind::UWire => &self.weight_u,
            ChannelKind::VWire => &self.weight_v,
            ChannelKind::Apd => return 0.0,
        };
        let (lo, hi) = grid.x_span();
        if x < lo || x > hi {
            return 0.0;
        }
        grid.bilinear(x, z)
    }
}

fn decode(bytes: &[u8]) -> Result<Vec<f64>, FieldError> {
    if bytes.len() % 8 != 0 {
        return Err(FieldError::TruncatedBuffer { len: bytes.len() });
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect())
}

/// The error type returned when constructing a [`FieldTable`] fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldError {
    /// A grid needs at least two columns and rows and positive spacings.
    DegenerateGrid,
    /// The number of decoded values does not match the grid dimensions.
    LengthMismatch { expected: usize, found: usize },
    /// The byte buffer is not a whole number of `f64` values.
    TruncatedBuffer { len: usize },
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::DegenerateGrid => {
                write!(f, "grid needs at least 2x2 nodes and positive spacings")
            }
            FieldError::LengthMismatch { expected, found } => {
                write!(f, "expected {expected} grid values, found {found}")
            }
            FieldError::TruncatedBuffer { len } => {
                write!(f, "buffer of {len} bytes is not a whole number of f64 values")
            }
        }
    }
}

impl std::error::Error for FieldError {}
