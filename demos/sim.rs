/// This is a general example of how you would typically set up a full-event
/// digitization.
use anyhow::Result;
use digi::adc::WaveformSet;
use digi::channel::ChannelId;
use digi::deposit::{ApdHit, ChargeDeposit};
use digi::electronics::Electronics;
use digi::field::{FieldTable, GridSpec};
use digi::geometry::{PLANE_GAP_MM, WIRE_PITCH_MM};
use digi::Digitizer;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::str::FromStr;
use uom::si::energy::kiloelectronvolt;
use uom::si::f64::{Energy, Length, Time};
use uom::si::length::millimeter;
use uom::si::time::microsecond;

fn main() -> Result<()> {
    // ===========================================
    // These are most likely your free parameters:
    let deposits = [ChargeDeposit {
        lateral: Length::new::<millimeter>(13.2),
        depth: Length::new::<millimeter>(25.0),
        time: Time::new::<microsecond>(0.0),
        energy: Energy::new::<kiloelectronvolt>(2457.8),
        ionization: Energy::new::<kiloelectronvolt>(2457.8),
    }];
    let hits = [ApdHit {
        group: 12,
        time: Time::new::<microsecond>(0.0),
        magnitude: 5.0e4,
    }];
    // ===========================================

    // ===========================================
    // Then, your field tables. In a real setup you read these from the field
    // solver's output files; here they are built in memory: a uniform
    // vertical drift field and a triangular weighting profile per plane.
    let drift_spec = GridSpec {
        x_min: 0.0,
        z_min: -10.0,
        dx: WIRE_PITCH_MM,
        dz: 220.0,
        nx: 2,
        nz: 2,
    };
    let drift: Vec<u8> = [10.0f64, -210.0, 10.0, -210.0]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    let weight_spec = GridSpec {
        x_min: -15.0,
        z_min: 0.0,
        dx: 1.0,
        dz: 1.0,
        nx: 31,
        nz: 211,
    };
    let tent = |x: f64| (1.0 - (x - 4.5).abs() / 9.0).max(0.0);
    let weight_u: Vec<u8> = grid_values(weight_spec, |x, z| tent(x) * (1.0 - z / 210.0))
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    let weight_v: Vec<u8> = grid_values(weight_spec, |x, z| {
        tent(x) * (1.0 - (z - PLANE_GAP_MM).abs() / 4.0).max(0.0)
    })
    .iter()
    .flat_map(|v| v.to_le_bytes())
    .collect();
    let field = FieldTable::from_bytes(drift_spec, &drift, weight_spec, &weight_u, &weight_v)?;
    // ===========================================

    // ===========================================
    // Then, this is your electronics calibration. You get it from the
    // conditions database; every channel here runs the same shaper.
    let calibration = ChannelId::all()
        .map(|channel| format!("chan {channel} shaper=[CR(10) RC(3) RC(3)] scaling=1"))
        .collect::<Vec<_>>()
        .join("\n");
    let electronics = Electronics::from_str(&calibration)?;
    // ===========================================

    let mut digitizer = Digitizer::builder()
        .samples(512)
        .field(field)
        .trigger_offset(Time::new::<microsecond>(64.0))
        .build();

    let mut rng = StdRng::seed_from_u64(0);
    let mut waveforms = WaveformSet::new();
    let summary = digitizer.digitize(&deposits, &hits, &electronics, &mut rng, &mut waveforms)?;

    println!(
        "digitized {} channels, trigger at sample {}",
        waveforms.len(),
        summary.trigger_sample
    );
    for (deposit, outcome) in deposits.iter().zip(&summary.outcomes) {
        println!(
            "deposit at ({:.1}, {:.1}) mm: {:?}, {} channels touched",
            deposit.lateral.get::<millimeter>(),
            deposit.depth.get::<millimeter>(),
            outcome.hit_channel,
            outcome.channels_affected.len()
        );
    }
    println!("skipped: {:?}", summary.skipped);

    Ok(())
}

fn grid_values(spec: GridSpec, f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
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
