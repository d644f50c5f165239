//! Gazereel Recording Model
//!
//! Defines the two independently produced inputs of an eye tracker recording:
//! - **Frames:** scene camera images named `frame_<n>.<ext>`, indexed by frame key
//! - **Event log:** `;`-separated gaze/timing rows keyed by the same frame number
//! - **Layout:** where both live inside a recording folder, and glob discovery
//!
//! Gaze coordinates are kept as recorded (ratio of the frame size); conversion
//! to pixels happens at draw time once the frame size is known.

pub mod event_log;
pub mod frame_index;
pub mod recording;

pub use event_log::*;
pub use frame_index::*;
pub use recording::*;
