//! One detection cycle.
//!
//! `Pipeline::cycle` runs a single pass of the loop against the session and
//! the presentation sink and tells the scheduler what to do next. The pure
//! decision step lives in `evaluate` so it can be checked without a camera.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::detect::{Detection, PERSON_LABEL};
use crate::estimate::{ApparentDimension, EstimatorSettings};
use crate::ingest::SourceError;
use crate::present::{DisplayFields, Overlay, PresentationSink};
use crate::session::{ModelStatus, Session, SessionState};

pub const DEFAULT_MODEL_RETRY: Duration = Duration::from_millis(1000);
/// Consecutive capture failures before the user is told.
pub const CAPTURE_FAILURE_LIMIT: u32 = 5;
pub const ALERT_TEXT: &str = "Alert: You are too close! Maintain a safe distance.";

/// What the scheduler should do after a cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Next {
    /// Run the next cycle as soon as the next frame is due.
    Frame,
    /// Not ready yet; wait at least this long.
    RetryAfter(Duration),
    /// No stream attached; wait for a command.
    Idle,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoopOptions {
    pub target_label: String,
    pub dimension: ApparentDimension,
    pub estimator: EstimatorSettings,
    pub model_retry: Duration,
    /// Pause between processed frames. Zero runs uncapped.
    pub frame_interval: Duration,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            target_label: PERSON_LABEL.to_string(),
            dimension: ApparentDimension::Width,
            estimator: EstimatorSettings::default(),
            model_retry: DEFAULT_MODEL_RETRY,
            frame_interval: Duration::ZERO,
        }
    }
}

/// Outcome of evaluating one detection list.
#[derive(Clone, Debug, PartialEq)]
pub struct Readout {
    pub fields: DisplayFields,
    /// First detection of the target class.
    pub target: Option<Detection>,
    pub distance: Option<f64>,
    pub safe_distance: u32,
    pub alert: bool,
}

/// Decide the three text fields for one cycle.
///
/// Only the first detection of the target class counts. Without one every
/// field is cleared. The alert is raised iff the estimate is known and below
/// the safe distance.
pub fn evaluate(detections: &[Detection], reference_size: f64, options: &LoopOptions) -> Readout {
    let Some(target) = detections.iter().find(|d| d.is(&options.target_label)) else {
        return Readout {
            fields: DisplayFields::cleared(),
            target: None,
            distance: None,
            safe_distance: options.estimator.calculate_safe_distance(reference_size),
            alert: false,
        };
    };

    let apparent = f64::from(match options.dimension {
        ApparentDimension::Width => target.bbox.width,
        ApparentDimension::Height => target.bbox.height,
    });
    let distance = options.estimator.estimate_distance(apparent, reference_size);
    let safe_distance = options.estimator.calculate_safe_distance(reference_size);
    let alert = matches!(distance, Some(d) if d < f64::from(safe_distance));

    let fields = DisplayFields {
        person_info: format!(
            "{} Detected with confidence: {}",
            title_case(&options.target_label),
            target.confidence
        ),
        distance_info: match distance {
            Some(d) => format!("Estimated Distance: {} inches", d.round()),
            None => "Estimated Distance: unknown".to_string(),
        },
        alert: if alert {
            ALERT_TEXT.to_string()
        } else {
            String::new()
        },
    };

    Readout {
        fields,
        target: Some(target.clone()),
        distance,
        safe_distance,
        alert,
    }
}

fn title_case(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Counters over the life of a pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub model_waits: u64,
    /// Detection results dropped because the camera closed meanwhile.
    pub results_discarded: u64,
    /// Cycles where the alert went from inactive to active.
    pub alerts_raised: u64,
}

pub struct Pipeline<P: PresentationSink> {
    session: Session,
    sink: P,
    options: LoopOptions,
    close_requested: Arc<AtomicBool>,
    stats: LoopStats,
}

impl<P: PresentationSink> Pipeline<P> {
    pub fn new(session: Session, sink: P, options: LoopOptions) -> Self {
        Self {
            session,
            sink,
            options,
            close_requested: Arc::new(AtomicBool::new(false)),
            stats: LoopStats::default(),
        }
    }

    /// Flag that closes the camera at the next check inside a cycle.
    pub fn close_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.close_requested)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn sink(&self) -> &P {
        &self.sink
    }

    pub fn options(&self) -> &LoopOptions {
        &self.options
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Open the camera. Acquisition failures go to the sink.
    pub fn open_camera(&mut self) -> Result<(), SourceError> {
        self.close_requested.store(false, Ordering::SeqCst);
        if let Err(err) = self.session.open_camera() {
            log::error!("failed to open camera: {}", err);
            self.sink.report_error(&err.to_string());
            return Err(err);
        }
        Ok(())
    }

    /// Close the camera and clear every output.
    pub fn close_camera(&mut self) {
        self.close_requested.store(false, Ordering::SeqCst);
        self.session.close_camera();
        self.sink.update_fields(&DisplayFields::cleared());
        self.sink.draw(&Overlay::default());
    }

    /// Run one cycle.
    pub fn cycle(&mut self) -> Next {
        self.stats.cycles += 1;
        if self.close_requested.load(Ordering::SeqCst) {
            self.close_camera();
            return Next::Idle;
        }
        if !self.session.is_open() {
            return Next::Idle;
        }

        match self.session.poll_model() {
            ModelStatus::Ready => {}
            ModelStatus::NotReady => {
                log::warn!("model not loaded yet, retrying in {:?}", self.options.model_retry);
                self.stats.model_waits += 1;
                return Next::RetryAfter(self.options.model_retry);
            }
            ModelStatus::GaveUp(message) => {
                log::error!("{}", message);
                self.sink.report_error(&message);
                self.stats.model_waits += 1;
                return Next::RetryAfter(self.options.model_retry);
            }
        }

        let frame = match self.session.capture() {
            Ok(frame) => frame,
            Err(err) => {
                let failures = self.session.capture_failures();
                log::warn!("capture failed ({} in a row): {:#}", failures, err);
                self.stats.frames_skipped += 1;
                if failures == CAPTURE_FAILURE_LIMIT {
                    let message = format!("camera stopped delivering frames: {:#}", err);
                    log::error!("{}", message);
                    self.sink.report_error(&message);
                }
                return Next::RetryAfter(self.options.model_retry);
            }
        };
        let detections = match self.session.detect(&frame) {
            Ok(detections) => detections,
            Err(err) => {
                log::warn!("skipping frame {}: detection failed: {:#}", frame.sequence, err);
                self.stats.frames_skipped += 1;
                return Next::Frame;
            }
        };

        if self.close_requested.load(Ordering::SeqCst) {
            log::debug!(
                "discarding {} detection(s) for frame {}: camera closing",
                detections.len(),
                frame.sequence
            );
            self.stats.results_discarded += 1;
            self.close_camera();
            return Next::Idle;
        }

        let readout = evaluate(&detections, self.session.reference().get(), &self.options);
        log::debug!(
            "frame {} ({}ms old): {} detection(s), distance={:?} safe={} alert={}",
            frame.sequence,
            frame.age_ms(),
            detections.len(),
            readout.distance,
            readout.safe_distance,
            readout.alert
        );
        self.sink.update_fields(&readout.fields);
        self.sink
            .draw(&Overlay::from_detections(frame.width, frame.height, &detections));

        if readout.alert && !self.session.last_alert() {
            self.stats.alerts_raised += 1;
        }
        self.session.set_last_alert(readout.alert);
        self.stats.frames_processed += 1;
        Next::Frame
    }

    /// Close the camera and hand back the sink.
    pub fn teardown(mut self) -> P {
        self.close_camera();
        self.session.teardown();
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn person(width: f32, score: f32) -> Detection {
        Detection::new("person", score, BoundingBox::new(10.0, 40.0, width, width * 2.0))
    }

    #[test]
    fn evaluates_the_first_person_only() {
        let dets = vec![
            Detection::new("chair", 0.8, BoundingBox::new(0.0, 0.0, 5.0, 5.0)),
            person(300.0, 0.75),
            person(10.0, 0.9),
        ];
        let readout = evaluate(&dets, 72.0, &LoopOptions::default());
        assert_eq!(readout.target, Some(person(300.0, 0.75)));
        assert_eq!(readout.fields.person_info, "Person Detected with confidence: 0.75");
        assert_eq!(readout.fields.distance_info, "Estimated Distance: 300 inches");
        assert_eq!(readout.distance, Some(300.0));
        assert!(!readout.alert);
        assert!(readout.fields.alert.is_empty());
    }

    #[test]
    fn alert_fires_below_the_safe_distance() {
        let readout = evaluate(&[person(20.0, 0.6)], 40.0, &LoopOptions::default());
        assert_eq!(readout.safe_distance, 52);
        assert_eq!(readout.distance, Some(36.0));
        assert!(readout.alert);
        assert_eq!(readout.fields.alert, ALERT_TEXT);
    }

    #[test]
    fn invalid_reference_reads_unknown_without_alert() {
        let readout = evaluate(&[person(20.0, 0.6)], f64::NAN, &LoopOptions::default());
        assert_eq!(readout.fields.distance_info, "Estimated Distance: unknown");
        assert_eq!(readout.safe_distance, 0);
        assert!(!readout.alert);
    }

    #[test]
    fn no_target_clears_all_fields() {
        let dets = vec![Detection::new("cup", 0.8, BoundingBox::new(0.0, 0.0, 5.0, 5.0))];
        let readout = evaluate(&dets, 40.0, &LoopOptions::default());
        assert!(readout.fields.is_cleared());
        assert!(readout.target.is_none());
    }

    #[test]
    fn height_can_be_the_apparent_size() {
        let options = LoopOptions {
            dimension: ApparentDimension::Height,
            ..LoopOptions::default()
        };
        let readout = evaluate(&[person(50.0, 0.6)], 72.0, &options);
        assert_eq!(readout.distance, Some(100.0));
    }

    #[test]
    fn other_target_labels_are_titled() {
        let options = LoopOptions {
            target_label: "cat".to_string(),
            ..LoopOptions::default()
        };
        let dets = vec![Detection::new("cat", 0.5, BoundingBox::new(0.0, 0.0, 72.0, 5.0))];
        let readout = evaluate(&dets, 72.0, &options);
        assert_eq!(readout.fields.person_info, "Cat Detected with confidence: 0.5");
    }
}
