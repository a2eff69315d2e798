use crate::channel::ChannelId;
use crate::noise::NoiseModel;
use crate::shaping::{Stage, StageKind, TransferFunction};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use winnow::ascii::{dec_uint, float, newline};
use winnow::combinator::{alt, delimited, opt, preceded, separated, terminated};
use winnow::error::ContextError;
use winnow::Parser;

/// Per-channel calibration lookups consumed during digitization.
///
/// Every query is optional so a provider can describe a partially
/// instrumented detector; a channel with no transfer function is treated as
/// dead and a channel with no noise model stays noise-free.
pub trait CalibrationProvider {
    fn transfer_function_for(&self, channel: ChannelId) -> Option<&TransferFunction>;
    fn noise_model_for(&self, channel: ChannelId) -> Option<NoiseModel>;
    fn scaling_for(&self, channel: ChannelId) -> Option<f64>;
    fn gain_for(&self, channel: ChannelId) -> Option<f64>;
}

/// In-memory calibration database keyed by channel.
///
/// Serializes to and from a line-oriented text format, one channel per line:
///
/// ```text
/// chan 3 shaper=[CR(10) RC(3) RC(3)] noise=4.5 scaling=0.98 gain=1.02
/// ```
///
/// The `noise`, `scaling`, and `gain` fields are optional. An empty stage
/// list is written as `shaper=[]` and records no transfer function.
///
/// # Examples
///
/// ```
/// use digi::electronics::Electronics;
/// use std::str::FromStr;
///
/// let line = "chan 0 shaper=[CR(10) RC(3)] scaling=0.98";
/// let electronics = Electronics::from_str(line)?;
/// assert_eq!(electronics.to_string(), line);
/// # Ok::<(), digi::electronics::ParseError>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Electronics {
    shapers: BTreeMap<ChannelId, TransferFunction>,
    noise: BTreeMap<ChannelId, NoiseModel>,
    scalings: BTreeMap<ChannelId, f64>,
    gains: BTreeMap<ChannelId, f64>,
}

impl Electronics {
    /// Creates an empty database. Every channel reads as uncalibrated.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_transfer_function(&mut self, channel: ChannelId, tf: TransferFunction) {
        self.shapers.insert(channel, tf);
    }

    pub fn set_noise_model(&mut self, channel: ChannelId, model: NoiseModel) {
        self.noise.insert(channel, model);
    }

    pub fn set_scaling(&mut self, channel: ChannelId, scaling: f64) {
        self.scalings.insert(channel, scaling);
    }

    pub fn set_gain(&mut self, channel: ChannelId, gain: f64) {
        self.gains.insert(channel, gain);
    }
}

impl CalibrationProvider for Electronics {
    fn transfer_function_for(&self, channel: ChannelId) -> Option<&TransferFunction> {
        self.shapers.get(&channel)
    }

    fn noise_model_for(&self, channel: ChannelId) -> Option<NoiseModel> {
        self.noise.get(&channel).copied()
    }

    fn scaling_for(&self, channel: ChannelId) -> Option<f64> {
        self.scalings.get(&channel).copied()
    }

    fn gain_for(&self, channel: ChannelId) -> Option<f64> {
        self.gains.get(&channel).copied()
    }
}

fn stage_string(stage: &Stage) -> String {
    match stage.kind() {
        StageKind::Differentiator => format!("CR({})", stage.tau_us()),
        StageKind::Integrator => format!("RC({})", stage.tau_us()),
    }
}

impl fmt::Display for Electronics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels: BTreeSet<ChannelId> = self
            .shapers
            .keys()
            .chain(self.noise.keys())
            .chain(self.scalings.keys())
            .chain(self.gains.keys())
            .copied()
            .collect();

        let text = channels
            .into_iter()
            .map(|channel| {
                let stages = self
                    .shapers
                    .get(&channel)
                    .map(|tf| {
                        tf.stages()
                            .iter()
                            .map(stage_string)
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .unwrap_or_default();
                let mut line = format!("chan {channel} shaper=[{stages}]");
                if let Some(model) = self.noise.get(&channel) {
                    line.push_str(&format!(" noise={}", model.rms()));
                }
                if let Some(scaling) = self.scalings.get(&channel) {
                    line.push_str(&format!(" scaling={scaling}"));
                }
                if let Some(gain) = self.gains.get(&channel) {
                    line.push_str(&format!(" gain={gain}"));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n");

        write!(f, "{text}")
    }
}

struct Line {
    channel: ChannelId,
    stages: Vec<Stage>,
    noise: Option<f64>,
    scaling: Option<f64>,
    gain: Option<f64>,
}

fn parse_stage(input: &mut &str) -> winnow::Result<Stage> {
    alt((
        delimited("CR(", float, ")").map(Stage::differentiator_us),
        delimited("RC(", float, ")").map(Stage::integrator_us),
    ))
    .parse_next(input)
}

fn parse_line(input: &mut &str) -> winnow::Result<Line> {
    let channel = preceded("chan ", dec_uint)
        .verify_map(|n: u32| ChannelId::new(n as usize))
        .parse_next(input)?;
    let stages = delimited(" shaper=[", separated(0.., parse_stage, ' '), ']').parse_next(input)?;
    let noise = opt(preceded(" noise=", float)).parse_next(input)?;
    let scaling = opt(preceded(" scaling=", float)).parse_next(input)?;
    let gain = opt(preceded(" gain=", float)).parse_next(input)?;

    Ok(Line {
        channel,
        stages,
        noise,
        scaling,
        gain,
    })
}

/// The error type returned when parsing an [`Electronics`] database fails.
#[derive(Debug)]
pub struct ParseError {
    input: String,
    span: std::ops::Range<usize>,
}

impl ParseError {
    fn from_parse(error: winnow::error::ParseError<&str, ContextError>) -> Self {
        let input = error.input().to_string();
        let span = error.char_span();
        Self { input, span }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = annotate_snippets::Level::Error
            .title("invalid line starting here")
            .snippet(
                annotate_snippets::Snippet::source(&self.input)
                    .fold(true)
                    .annotation(annotate_snippets::Level::Error.span(self.span.clone())),
            );
        let renderer = annotate_snippets::Renderer::plain();
        let rendered = renderer.render(message);
        rendered.fmt(f)
    }
}

impl std::error::Error for ParseError {}

impl std::str::FromStr for Electronics {
    type Err = ParseError;

    /// Parse an [`Electronics`] database from its text format.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use digi::electronics::Electronics;
    /// # use std::str::FromStr;
    /// let string = std::fs::read_to_string("electronics.txt")?;
    /// let electronics = Electronics::from_str(&string)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut electronics = Self::new();

        let () = terminated(
            separated(
                0..,
                parse_line.map(|line| {
                    if !line.stages.is_empty() {
                        electronics
                            .shapers
                            .insert(line.channel, TransferFunction::from(line.stages));
                    }
                    if let Some(rms) = line.noise {
                        electronics.noise.insert(line.channel, NoiseModel::new(rms));
                    }
                    if let Some(scaling) = line.scaling {
                        electronics.scalings.insert(line.channel, scaling);
                    }
                    if let Some(gain) = line.gain {
                        electronics.gains.insert(line.channel, gain);
                    }
                }),
                newline,
            ),
            opt(newline),
        )
        .parse(input)
        .map_err(ParseError::from_parse)?;

        Ok(electronics)
    }
}
