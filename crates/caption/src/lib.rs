pub mod formatter;
pub mod stabilizer;
pub mod wrap;

pub use formatter::{CaptionFormatter, DisplayFrame, MAX_FINAL_CAPTIONS};
pub use stabilizer::{ConfidenceStabilizer, Heuristic, DEFAULT_ACCEPT_THRESHOLD};
pub use wrap::{LineWidth, wrap_text};
