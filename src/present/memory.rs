use super::{DisplayFields, Overlay, PresentationSink};

/// Everything a sink was asked to do, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum SinkEvent {
    Fields(DisplayFields),
    Draw(Overlay),
    Error(String),
}

/// In-memory sink. Keeps the current surface state and the full call log.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub fields: DisplayFields,
    pub overlay: Overlay,
    pub errors: Vec<String>,
    pub events: Vec<SinkEvent>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay captions drawn last, in order.
    pub fn captions(&self) -> Vec<&str> {
        self.overlay
            .shapes
            .iter()
            .map(|shape| shape.caption.as_str())
            .collect()
    }

    pub fn draw_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, SinkEvent::Draw(_)))
            .count()
    }
}

impl PresentationSink for MemorySink {
    fn update_fields(&mut self, fields: &DisplayFields) {
        self.fields = fields.clone();
        self.events.push(SinkEvent::Fields(fields.clone()));
    }

    fn draw(&mut self, overlay: &Overlay) {
        self.overlay = overlay.clone();
        self.events.push(SinkEvent::Draw(overlay.clone()));
    }

    fn report_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
        self.events.push(SinkEvent::Error(message.to_string()));
    }
}
