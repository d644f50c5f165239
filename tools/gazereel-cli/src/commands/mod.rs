pub mod batch;
pub mod check;
pub mod inspect;
pub mod render;

use clap::ValueEnum;

use gazereel_common::error::GazereelResult;
use gazereel_recording_model::event_log::{FrameRange, SchemaHint};

/// Event log layout selection on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SchemaArg {
    /// Detect from the first row
    #[default]
    Auto,
    /// Header row with named columns
    Named,
    /// Nine unnamed columns
    Positional,
}

impl From<SchemaArg> for SchemaHint {
    fn from(arg: SchemaArg) -> Self {
        match arg {
            SchemaArg::Auto => SchemaHint::Auto,
            SchemaArg::Named => SchemaHint::Named,
            SchemaArg::Positional => SchemaHint::Positional,
        }
    }
}

/// `--frame-range LO HI` as a validated range.
pub fn frame_range(values: Option<&[u64]>) -> GazereelResult<Option<FrameRange>> {
    match values {
        Some([lo, hi]) => FrameRange::new(*lo, *hi).map(Some),
        _ => Ok(None),
    }
}
