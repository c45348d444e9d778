use super::{DisplayFields, Overlay, PresentationSink};
use crate::ui::{StatusLine, Ui};

/// Renders the text fields onto a stderr status line.
///
/// Field changes are also logged at info level, and the alert is echoed
/// above the status line the first time it appears.
pub struct TerminalSink {
    status: StatusLine,
    fields: DisplayFields,
    boxes: usize,
}

impl TerminalSink {
    pub fn new(ui: &Ui) -> Self {
        Self {
            status: ui.status_line(),
            fields: DisplayFields::cleared(),
            boxes: 0,
        }
    }

    fn render(&mut self) {
        let line = if self.fields.is_cleared() {
            format!("no person ({} boxes)", self.boxes)
        } else {
            format!(
                "{} | {} ({} boxes)",
                self.fields.person_info, self.fields.distance_info, self.boxes
            )
        };
        self.status.set(&line);
    }
}

impl PresentationSink for TerminalSink {
    fn update_fields(&mut self, fields: &DisplayFields) {
        if *fields == self.fields {
            return;
        }
        if !fields.alert.is_empty() && self.fields.alert.is_empty() {
            self.status.println(&fields.alert);
        }
        if fields.is_cleared() {
            log::info!("fields cleared");
        } else {
            log::info!("{} | {}", fields.person_info, fields.distance_info);
        }
        self.fields = fields.clone();
        self.render();
    }

    fn draw(&mut self, overlay: &Overlay) {
        for shape in &overlay.shapes {
            log::debug!(
                "box {} at ({:.0}, {:.0}) {:.0}x{:.0}",
                shape.caption,
                shape.rect.x,
                shape.rect.y,
                shape.rect.width,
                shape.rect.height
            );
        }
        self.boxes = overlay.shapes.len();
        self.render();
    }

    fn report_error(&mut self, message: &str) {
        log::error!("{}", message);
        self.status.println(&format!("error: {message}"));
    }
}
