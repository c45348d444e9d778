use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use proximity_watch::detect::{BoundingBox, Detection, ScriptedBackend};
use proximity_watch::frame::Frame;
use proximity_watch::ingest::{FrameSource, SourceError, SourceSettings, StreamHandle, SyntheticCamera};
use proximity_watch::loader::ModelSource;
use proximity_watch::pipeline::{LoopOptions, Next, Pipeline, ALERT_TEXT, CAPTURE_FAILURE_LIMIT};
use proximity_watch::present::{MemorySink, SinkEvent};
use proximity_watch::reference::ReferenceSize;
use proximity_watch::session::{Session, SessionState};

const REFERENCE_IN: f64 = 40.0;

fn person(width: f32, score: f32) -> Detection {
    Detection::new("person", score, BoundingBox::new(100.0, 60.0, width, width * 2.0))
}

fn chair() -> Detection {
    Detection::new("chair", 0.8, BoundingBox::new(20.0, 300.0, 60.0, 60.0))
}

fn cup() -> Detection {
    Detection::new("cup", 0.554, BoundingBox::new(400.0, 4.0, 10.0, 12.0))
}

fn camera(url: &str) -> Box<SyntheticCamera> {
    Box::new(SyntheticCamera::new(SourceSettings {
        url: url.to_string(),
        target_fps: 0,
        ..SourceSettings::default()
    }))
}

/// Opens like a webcam, then every read fails as if the device was pulled.
struct UnpluggedCamera {
    inner: SyntheticCamera,
}

impl FrameSource for UnpluggedCamera {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn open(&mut self) -> Result<StreamHandle, SourceError> {
        self.inner.open()
    }

    fn next_frame(&mut self, _stream: &StreamHandle) -> anyhow::Result<Frame> {
        Err(SourceError::Capture("No such device".to_string()).into())
    }

    fn close(&mut self, stream: &mut StreamHandle) {
        self.inner.close(stream)
    }

    fn active_tracks(&self) -> usize {
        self.inner.active_tracks()
    }
}

fn build(models: ModelSource, options: LoopOptions) -> Pipeline<MemorySink> {
    let session = Session::new(camera("stub://webcam"), models, ReferenceSize::new(REFERENCE_IN));
    Pipeline::new(session, MemorySink::new(), options)
}

fn fast_retry() -> LoopOptions {
    LoopOptions {
        model_retry: Duration::from_millis(5),
        ..LoopOptions::default()
    }
}

/// Cycle until the model is ready and a cycle gets past the model check.
/// That cycle consumes one scripted step.
fn cycle_until_detecting(pipeline: &mut Pipeline<MemorySink>) -> Next {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match pipeline.cycle() {
            Next::RetryAfter(_) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(2));
            }
            other => return other,
        }
    }
}

#[test]
fn person_readout_and_boxes_for_every_detection() {
    let backend = ScriptedBackend::new().then_detect(vec![chair(), person(20.0, 0.9), cup()]);
    let mut pipeline = build(ModelSource::once(backend), fast_retry());
    pipeline.open_camera().unwrap();

    assert_eq!(cycle_until_detecting(&mut pipeline), Next::Frame);
    let sink = pipeline.sink();
    assert_eq!(sink.fields.person_info, "Person Detected with confidence: 0.9");
    assert_eq!(sink.fields.distance_info, "Estimated Distance: 36 inches");
    assert_eq!(sink.fields.alert, ALERT_TEXT);
    assert_eq!(sink.captions(), vec!["chair 80%", "person 90%", "cup 55%"]);
    assert_eq!(sink.overlay.shapes[0].caption_at, (20.0, 295.0));
    assert_eq!(sink.overlay.shapes[2].caption_at, (400.0, 10.0));
    assert_eq!(pipeline.state(), SessionState::Running);
    assert_eq!(pipeline.stats().alerts_raised, 1);
}

#[test]
fn no_person_clears_fields_and_draws_only_other_boxes() {
    let backend = ScriptedBackend::new()
        .then_detect(vec![person(20.0, 0.9)])
        .then_detect(vec![chair(), cup()]);
    let mut pipeline = build(ModelSource::once(backend), fast_retry());
    pipeline.open_camera().unwrap();

    assert_eq!(cycle_until_detecting(&mut pipeline), Next::Frame);
    assert!(!pipeline.sink().fields.is_cleared());

    assert_eq!(pipeline.cycle(), Next::Frame);
    let sink = pipeline.sink();
    assert!(sink.fields.person_info.is_empty());
    assert!(sink.fields.distance_info.is_empty());
    assert!(sink.fields.alert.is_empty());
    assert_eq!(sink.captions(), vec!["chair 80%", "cup 55%"]);
}

#[test]
fn model_not_ready_defers_without_detecting() {
    let (gate_tx, gate_rx) = std::sync::mpsc::channel();
    let backend = ScriptedBackend::new()
        .with_load_gate(gate_rx)
        .then_detect(vec![person(100.0, 0.7)]);
    let calls = backend.call_counter();
    let mut pipeline = build(ModelSource::once(backend), LoopOptions::default());
    pipeline.open_camera().unwrap();

    for _ in 0..2 {
        match pipeline.cycle() {
            Next::RetryAfter(delay) => assert!(delay >= Duration::from_millis(1000)),
            other => panic!("expected a retry, got {:?}", other),
        }
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(pipeline.state(), SessionState::Initializing);
    assert_eq!(pipeline.sink().draw_count(), 0);

    gate_tx.send(()).unwrap();
    assert_eq!(cycle_until_detecting(&mut pipeline), Next::Frame);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        pipeline.sink().fields.distance_info,
        "Estimated Distance: 180 inches"
    );
    assert!(pipeline.sink().fields.alert.is_empty());
}

#[test]
fn close_releases_tracks_and_clears_fields() {
    let backend = ScriptedBackend::new().then_detect(vec![person(20.0, 0.9), chair()]);
    let calls = backend.call_counter();
    let mut pipeline = build(ModelSource::once(backend), fast_retry());
    pipeline.open_camera().unwrap();
    assert_eq!(cycle_until_detecting(&mut pipeline), Next::Frame);
    assert_eq!(pipeline.session().active_tracks(), 1);
    assert_eq!(pipeline.sink().fields.alert, ALERT_TEXT);

    pipeline.close_camera();
    assert_eq!(pipeline.session().active_tracks(), 0);
    assert!(pipeline.sink().fields.is_cleared());
    assert!(pipeline.sink().overlay.is_empty());
    assert_eq!(pipeline.state(), SessionState::Idle);

    let before = calls.load(Ordering::SeqCst);
    assert_eq!(pipeline.cycle(), Next::Idle);
    assert_eq!(calls.load(Ordering::SeqCst), before);

    pipeline.close_camera();
    assert_eq!(pipeline.session().active_tracks(), 0);
}

#[test]
fn close_while_detecting_discards_the_result() {
    let close_flag: Arc<OnceLock<Arc<AtomicBool>>> = Arc::new(OnceLock::new());
    let hook_flag = Arc::clone(&close_flag);
    let mut detect_calls = 0;
    let backend = ScriptedBackend::new()
        .then_detect(vec![person(100.0, 0.7)])
        .then_detect(vec![person(20.0, 0.9), chair()])
        .on_detect(move || {
            detect_calls += 1;
            if detect_calls == 2 {
                if let Some(flag) = hook_flag.get() {
                    flag.store(true, Ordering::SeqCst);
                }
            }
        });
    let mut pipeline = build(ModelSource::once(backend), fast_retry());
    close_flag.set(pipeline.close_flag()).unwrap();
    pipeline.open_camera().unwrap();

    assert_eq!(cycle_until_detecting(&mut pipeline), Next::Frame);
    assert_eq!(pipeline.cycle(), Next::Idle);

    let sink = pipeline.sink();
    assert!(sink.fields.is_cleared());
    assert!(sink.overlay.is_empty());
    assert!(!sink.captions().contains(&"chair 80%"));
    assert_eq!(pipeline.session().active_tracks(), 0);
    assert_eq!(pipeline.stats().results_discarded, 1);
    assert_eq!(pipeline.stats().alerts_raised, 0);
    assert_eq!(pipeline.cycle(), Next::Idle);
}

#[test]
fn model_persists_across_reopen() {
    let backend = ScriptedBackend::new().then_detect(vec![person(100.0, 0.7)]);
    let mut pipeline = build(ModelSource::once(backend), fast_retry());
    pipeline.open_camera().unwrap();
    assert_eq!(cycle_until_detecting(&mut pipeline), Next::Frame);

    pipeline.close_camera();
    pipeline.open_camera().unwrap();
    assert_eq!(pipeline.state(), SessionState::Running);
    assert_eq!(pipeline.cycle(), Next::Frame);
    assert_eq!(pipeline.session().load_attempts(), 1);
    assert_eq!(pipeline.stats().frames_processed, 2);
}

#[test]
fn exhausted_load_attempts_surface_one_error() {
    let models = ModelSource::each(|| ScriptedBackend::new().failing_load());
    let session = Session::new(camera("stub://webcam"), models, ReferenceSize::new(REFERENCE_IN))
        .with_max_load_attempts(2);
    let mut pipeline = Pipeline::new(session, MemorySink::new(), fast_retry());
    pipeline.open_camera().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while pipeline.sink().errors.is_empty() && Instant::now() < deadline {
        assert!(matches!(pipeline.cycle(), Next::RetryAfter(_)));
        std::thread::sleep(Duration::from_millis(2));
    }
    let errors = &pipeline.sink().errors;
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("after 2 attempt(s)"));

    for _ in 0..3 {
        assert!(matches!(pipeline.cycle(), Next::RetryAfter(_)));
    }
    assert_eq!(pipeline.sink().errors.len(), 1);
    assert_eq!(pipeline.state(), SessionState::Initializing);
    assert_eq!(pipeline.session().load_attempts(), 2);
}

#[test]
fn detection_failure_skips_the_frame() {
    let backend = ScriptedBackend::new()
        .then_fail("inference crashed")
        .then_detect(vec![person(100.0, 0.7)]);
    let mut pipeline = build(ModelSource::once(backend), fast_retry());
    pipeline.open_camera().unwrap();

    assert_eq!(cycle_until_detecting(&mut pipeline), Next::Frame);
    assert_eq!(pipeline.stats().frames_skipped, 1);
    assert_eq!(pipeline.sink().draw_count(), 0);
    assert!(pipeline.sink().errors.is_empty());

    assert_eq!(pipeline.cycle(), Next::Frame);
    assert_eq!(pipeline.stats().frames_processed, 1);
    assert!(!pipeline.sink().fields.is_cleared());
}

#[test]
fn failing_camera_backs_off_and_reports_once() {
    let source = UnpluggedCamera {
        inner: *camera("stub://webcam"),
    };
    let session = Session::new(
        Box::new(source),
        ModelSource::once(ScriptedBackend::new()),
        ReferenceSize::new(REFERENCE_IN),
    );
    let options = fast_retry();
    let retry = options.model_retry;
    let mut pipeline = Pipeline::new(session, MemorySink::new(), options);
    pipeline.open_camera().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while pipeline.stats().frames_skipped == 0 && Instant::now() < deadline {
        assert_eq!(pipeline.cycle(), Next::RetryAfter(retry));
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(pipeline.session().model_ready());
    assert_eq!(pipeline.session().capture_failures(), 1);
    assert!(pipeline.sink().errors.is_empty());

    for _ in 0..CAPTURE_FAILURE_LIMIT * 2 {
        assert_eq!(pipeline.cycle(), Next::RetryAfter(retry));
    }
    let errors = &pipeline.sink().errors;
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("camera stopped delivering frames"));
    assert!(errors[0].contains("No such device"));
    assert_eq!(pipeline.sink().draw_count(), 0);
    assert_eq!(pipeline.stats().frames_processed, 0);
    assert_eq!(pipeline.state(), SessionState::Running);

    pipeline.close_camera();
    pipeline.open_camera().unwrap();
    assert_eq!(pipeline.session().capture_failures(), 0);
}

#[test]
fn fields_update_before_the_overlay_redraw() {
    let backend = ScriptedBackend::new().then_detect(vec![person(20.0, 0.9)]);
    let mut pipeline = build(ModelSource::once(backend), fast_retry());
    pipeline.open_camera().unwrap();
    assert_eq!(cycle_until_detecting(&mut pipeline), Next::Frame);
    assert_eq!(pipeline.cycle(), Next::Frame);

    let events = &pipeline.sink().events;
    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], SinkEvent::Fields(_)));
    assert!(matches!(events[1], SinkEvent::Draw(_)));
    assert!(matches!(events[2], SinkEvent::Fields(_)));
    assert!(matches!(events[3], SinkEvent::Draw(_)));
    // The alert only counts when it turns on.
    assert_eq!(pipeline.stats().alerts_raised, 1);
}

#[test]
fn reference_changes_apply_on_the_next_cycle() {
    let backend = ScriptedBackend::new().then_detect(vec![person(20.0, 0.9)]);
    let mut pipeline = build(ModelSource::once(backend), fast_retry());
    let reference = pipeline.session().reference().clone();
    pipeline.open_camera().unwrap();
    assert_eq!(cycle_until_detecting(&mut pipeline), Next::Frame);
    assert_eq!(pipeline.sink().fields.alert, ALERT_TEXT);

    assert_eq!(reference.set_from_input("not a number"), None);
    assert_eq!(pipeline.cycle(), Next::Frame);
    assert_eq!(
        pipeline.sink().fields.distance_info,
        "Estimated Distance: unknown"
    );
    assert!(pipeline.sink().fields.alert.is_empty());

    reference.set(72.0);
    assert_eq!(pipeline.cycle(), Next::Frame);
    assert_eq!(
        pipeline.sink().fields.distance_info,
        "Estimated Distance: 20 inches"
    );
    assert_eq!(pipeline.sink().fields.alert, ALERT_TEXT);
}

#[test]
fn camera_refusal_is_reported() {
    let session = Session::new(
        camera("stub://denied"),
        ModelSource::once(ScriptedBackend::new()),
        ReferenceSize::new(REFERENCE_IN),
    );
    let mut pipeline = Pipeline::new(session, MemorySink::new(), fast_retry());
    assert!(pipeline.open_camera().is_err());
    assert_eq!(pipeline.sink().errors.len(), 1);
    assert!(pipeline.sink().errors[0].contains("permission denied"));
    assert_eq!(pipeline.state(), SessionState::Idle);
    assert_eq!(pipeline.cycle(), Next::Idle);
}
