//! Presentation side of the loop.
//!
//! The loop talks to the host UI through `PresentationSink`: three text
//! fields, a drawing surface that receives a fresh `Overlay` every cycle, and
//! an error channel for failures the user has to see.

mod memory;
mod overlay;
mod terminal;

pub use memory::{MemorySink, SinkEvent};
pub use overlay::{BoxShape, Overlay, LABEL_COLOR, LINE_WIDTH};
pub use terminal::TerminalSink;

/// The three text outputs. All empty means cleared.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DisplayFields {
    pub person_info: String,
    pub distance_info: String,
    pub alert: String,
}

impl DisplayFields {
    pub fn cleared() -> Self {
        Self::default()
    }

    pub fn is_cleared(&self) -> bool {
        self.person_info.is_empty() && self.distance_info.is_empty() && self.alert.is_empty()
    }
}

/// Capability contract for the host UI.
pub trait PresentationSink {
    /// Replace the three text fields.
    fn update_fields(&mut self, fields: &DisplayFields);

    /// Clear the drawing surface and draw `overlay`.
    fn draw(&mut self, overlay: &Overlay);

    /// Surface a failure to the user (camera refused, detector unavailable).
    fn report_error(&mut self, message: &str);
}
