use crate::detect::{BoundingBox, Detection};

pub const LINE_WIDTH: f32 = 2.0;
pub const LABEL_COLOR: [u8; 3] = [255, 0, 0];
/// Labels sit this far above their box.
const LABEL_LIFT: f32 = 5.0;
/// Labels never go above this baseline.
const LABEL_MIN_Y: f32 = 10.0;

/// One stroked rectangle with its caption.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxShape {
    pub rect: BoundingBox,
    pub caption: String,
    /// Caption baseline anchor.
    pub caption_at: (f32, f32),
    /// Stroke and caption color.
    pub color: [u8; 3],
    pub line_width: f32,
}

/// Display list for the drawing surface. Rebuilt from scratch every cycle,
/// one box per detection regardless of class.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Overlay {
    pub width: u32,
    pub height: u32,
    pub shapes: Vec<BoxShape>,
}

impl Overlay {
    /// An empty surface of the given size.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            shapes: Vec::new(),
        }
    }

    pub fn from_detections(width: u32, height: u32, detections: &[Detection]) -> Self {
        Self {
            width,
            height,
            shapes: detections.iter().map(box_shape).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

/// `"<label> <percent>%"` with the score rounded to a whole percent.
pub fn caption(detection: &Detection) -> String {
    format!(
        "{} {}%",
        detection.label,
        (detection.confidence * 100.0).round() as i32
    )
}

fn box_shape(detection: &Detection) -> BoxShape {
    let rect = detection.bbox;
    let caption_y = if rect.y > LABEL_MIN_Y {
        rect.y - LABEL_LIFT
    } else {
        LABEL_MIN_Y
    };
    BoxShape {
        rect,
        caption: caption(detection),
        caption_at: (rect.x, caption_y),
        color: LABEL_COLOR,
        line_width: LINE_WIDTH,
    }
}
