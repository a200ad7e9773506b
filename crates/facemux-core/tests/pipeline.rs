//! End-to-end pipeline tests against the in-memory sim backend.

use anyhow::Result;

use facemux_core::backend::ElementType;
use facemux_core::classifiers::{
    AgeGenderClassifier, AgeGenderDecoder, AntispoofClassifier, AntispoofDecoder,
    EmotionsClassifier, EmotionsDecoder, HeadPoseClassifier, HeadPoseDecoder,
    LandmarksClassifier, LandmarksDecoder,
};
use facemux_core::{
    load, Detection, Detector, DetectorConfig, DetectorError, FaceDetector, FaceDetectorConfig,
    FaceRect, Frame,
};
use facemux_sim::{Event, SimBackend, SimModelSpec};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn frame_640x480() -> Frame {
    Frame::new(vec![0; 640 * 480 * 3], 640, 480, 3).expect("valid frame")
}

/// Face model with a single SSD-style detection output.
///
/// Row 0 is confident, row 1 is below threshold, row 2 is the negative
/// image-id sentinel, row 3 must never be decoded.
fn ssd_face_spec() -> SimModelSpec {
    #[rustfmt::skip]
    let rows = vec![
        0.0,  1.0, 0.9,  0.1, 0.1, 0.3, 0.5,
        0.0,  1.0, 0.3,  0.5, 0.5, 0.6, 0.6,
        -1.0, 0.0, 0.0,  0.0, 0.0, 0.0, 0.0,
        0.0,  1.0, 0.99, 0.2, 0.2, 0.4, 0.4,
    ];
    SimModelSpec::new()
        .input("data", &[1, 3, 384, 672], ElementType::U8)
        .output_f32("detection_out", &[1, 1, 4, 7], rows)
}

fn loaded_face(backend: &mut SimBackend, config: FaceDetectorConfig) -> FaceDetector<SimBackend> {
    backend.register("face.xml", ssd_face_spec());
    let mut face = FaceDetector::new(config);
    load(&mut face, backend, "CPU", false).expect("load face model");
    face
}

#[test]
fn ssd_decode_filters_and_stops_at_sentinel() -> Result<()> {
    init_tracing();
    let mut backend = SimBackend::new();
    let mut face = loaded_face(&mut backend, FaceDetectorConfig::new("face.xml"));

    face.enqueue(&frame_640x480())?;
    face.submit()?;
    face.wait()?;
    let results = face.fetch_results()?;

    // Only row 0 survives: row 1 is under threshold, the sentinel stops
    // decoding before row 3.
    assert_eq!(
        results,
        &[Detection {
            label: 1,
            confidence: 0.9,
            rect: FaceRect::new(13, 29, 230, 230),
        }]
    );
    Ok(())
}

#[test]
fn raw_output_diagnostics_do_not_change_results() -> Result<()> {
    init_tracing();
    let mut backend = SimBackend::new();
    let config = FaceDetectorConfig {
        detector: DetectorConfig::new("face.xml").with_raw_output(true),
        ..FaceDetectorConfig::default()
    };
    let mut face = loaded_face(&mut backend, config);

    face.enqueue(&frame_640x480())?;
    face.submit()?;
    face.wait()?;
    assert_eq!(face.fetch_results()?.len(), 1);
    Ok(())
}

#[test]
fn boxes_labels_decode_denormalizes_through_network_input() -> Result<()> {
    let mut backend = SimBackend::new();
    #[rustfmt::skip]
    let boxes = vec![
        67.2, 38.4, 201.6, 192.0, 0.8,
        0.0,  0.0,  67.2,  96.0,  0.4,
    ];
    backend.register(
        "face.xml",
        SimModelSpec::new()
            .input("data", &[1, 3, 384, 672], ElementType::U8)
            .output_f32("boxes", &[2, 5], boxes)
            .output_i32("labels", &[2], vec![1, 2]),
    );
    let mut face = FaceDetector::new(FaceDetectorConfig::new("face.xml"));
    load(&mut face, &mut backend, "CPU", false)?;

    face.enqueue(&frame_640x480())?;
    face.submit()?;
    let results = face.fetch_results()?;

    // Box coordinates are in network-input pixels (672x384) and map to
    // the same frame-space raw box as the SSD test, so the refined
    // region matches; the low-confidence row is dropped.
    assert_eq!(
        results,
        &[Detection {
            label: 1,
            confidence: 0.8,
            rect: FaceRect::new(13, 29, 230, 230),
        }]
    );
    Ok(())
}

#[test]
fn fetch_results_is_idempotent_between_submits() -> Result<()> {
    let mut backend = SimBackend::new();
    let journal = backend.journal();
    let mut face = loaded_face(&mut backend, FaceDetectorConfig::new("face.xml"));

    face.enqueue(&frame_640x480())?;
    face.submit()?;
    let first = face.fetch_results()?.to_vec();
    let second = face.fetch_results()?.to_vec();
    assert_eq!(first, second);
    assert_eq!(journal.count(|e| matches!(e, Event::Ran { .. })), 1);

    // A fresh enqueue/submit decodes anew from the next run.
    face.enqueue(&frame_640x480())?;
    face.submit()?;
    assert_eq!(face.fetch_results()?, &first[..]);
    assert_eq!(journal.count(|e| matches!(e, Event::Ran { .. })), 2);
    Ok(())
}

#[test]
fn disabled_detector_is_inert_and_stays_disabled() -> Result<()> {
    let mut backend = SimBackend::new();
    let mut face = FaceDetector::new(FaceDetectorConfig::default());
    assert!(!face.enabled());

    // Every operation is a no-op, including load against a backend that
    // has no model registered.
    load(&mut face, &mut backend, "CPU", false)?;
    face.enqueue(&frame_640x480())?;
    face.submit()?;
    face.wait()?;
    assert!(face.fetch_results()?.is_empty());

    // The enabled decision is made once; a late path change cannot
    // revive the detector.
    face.core_mut().config_mut().model_path = "face.xml".into();
    assert!(!face.enabled());
    Ok(())
}

#[test]
fn async_flow_dispatches_and_waits() -> Result<()> {
    let mut backend = SimBackend::new();
    let journal = backend.journal();
    let config = FaceDetectorConfig {
        detector: DetectorConfig::new("face.xml").with_async(true),
        ..FaceDetectorConfig::default()
    };
    let mut face = loaded_face(&mut backend, config);

    face.enqueue(&frame_640x480())?;
    face.submit()?;
    assert_eq!(journal.count(|e| matches!(e, Event::Started { .. })), 1);

    // Results are unavailable until the in-flight run is waited on, and
    // staging or resubmitting during the flight is a protocol error.
    assert!(matches!(
        face.fetch_results(),
        Err(DetectorError::NotReady { .. })
    ));
    assert!(matches!(
        face.enqueue(&frame_640x480()),
        Err(DetectorError::RequestInFlight { .. })
    ));
    assert!(matches!(
        face.submit(),
        Err(DetectorError::RequestInFlight { .. })
    ));

    face.wait()?;
    assert_eq!(journal.count(|e| matches!(e, Event::Waited { .. })), 1);
    assert_eq!(face.fetch_results()?.len(), 1);
    Ok(())
}

#[test]
fn rejected_enqueue_keeps_cached_results_and_frame_size() -> Result<()> {
    let mut backend = SimBackend::new();
    let config = FaceDetectorConfig {
        detector: DetectorConfig::new("face.xml").with_async(true),
        ..FaceDetectorConfig::default()
    };
    let mut face = loaded_face(&mut backend, config);

    face.enqueue(&frame_640x480())?;
    face.submit()?;
    face.wait()?;
    let first = face.fetch_results()?.to_vec();

    // Redispatch the staged input, then try to stage a differently
    // sized frame while the run is in flight.
    face.submit()?;
    let small = Frame::new(vec![0; 320 * 240 * 3], 320, 240, 3)?;
    assert!(matches!(
        face.enqueue(&small),
        Err(DetectorError::RequestInFlight { .. })
    ));

    // The rejection left the cached results (decoded against the
    // original 640x480 geometry) intact.
    face.wait()?;
    assert_eq!(face.fetch_results()?, &first[..]);
    Ok(())
}

#[test]
fn face_load_fixes_the_model_batch_size() {
    let mut backend = SimBackend::new();
    let journal = backend.journal();
    let _face = loaded_face(&mut backend, FaceDetectorConfig::new("face.xml"));
    assert!(journal.events().contains(&Event::BatchSize {
        model: "face.xml".to_string(),
        batch: 1,
    }));
}

fn age_gender_spec(batch: usize) -> SimModelSpec {
    // Slot 0: age 30, male. Slot 1: age 45, female.
    SimModelSpec::new()
        .input("data", &[batch, 3, 62, 62], ElementType::U8)
        .output_f32("age_conv3", &[batch, 1], vec![0.30, 0.45])
        .output_f32("prob", &[batch, 2], vec![0.2, 0.8, 0.9, 0.1])
}

fn crop_64() -> Frame {
    Frame::new(vec![0; 64 * 64 * 3], 64, 64, 3).expect("valid crop")
}

#[test]
fn age_gender_batch_decodes_per_slot() -> Result<()> {
    let mut backend = SimBackend::new();
    backend.register("ag.xml", age_gender_spec(2));
    let mut clf: AgeGenderClassifier<SimBackend> = AgeGenderClassifier::new(
        DetectorConfig::new("ag.xml").with_max_batch(2),
        AgeGenderDecoder::new(),
    );
    load(&mut clf, &mut backend, "CPU", false)?;

    clf.enqueue(&crop_64())?;
    clf.enqueue(&crop_64())?;
    clf.submit()?;
    clf.wait()?;

    let first = clf.result(0)?;
    assert!((first.age - 30.0).abs() < 1e-3);
    assert!((first.male_prob - 0.8).abs() < 1e-6);
    let second = clf.result(1)?;
    assert!((second.age - 45.0).abs() < 1e-3);
    assert!((second.male_prob - 0.1).abs() < 1e-6);
    Ok(())
}

#[test]
fn classifier_raw_output_does_not_change_results() -> Result<()> {
    init_tracing();
    let mut backend = SimBackend::new();
    backend.register("ag.xml", age_gender_spec(2));
    let mut clf: AgeGenderClassifier<SimBackend> = AgeGenderClassifier::new(
        DetectorConfig::new("ag.xml")
            .with_max_batch(2)
            .with_raw_output(true),
        AgeGenderDecoder::new(),
    );
    load(&mut clf, &mut backend, "CPU", false)?;

    clf.enqueue(&crop_64())?;
    clf.enqueue(&crop_64())?;
    clf.submit()?;

    // Diagnostics are log-only; the decoded values are identical to a
    // silent run.
    let first = clf.result(0)?;
    assert!((first.age - 30.0).abs() < 1e-3);
    assert!((first.male_prob - 0.8).abs() < 1e-6);
    let second = clf.result(1)?;
    assert!((second.age - 45.0).abs() < 1e-3);
    Ok(())
}

#[test]
fn batch_overflow_drops_extra_crops() -> Result<()> {
    init_tracing();
    let mut backend = SimBackend::new();
    backend.register("ag.xml", age_gender_spec(2));
    let mut clf: AgeGenderClassifier<SimBackend> = AgeGenderClassifier::new(
        DetectorConfig::new("ag.xml").with_max_batch(2),
        AgeGenderDecoder::new(),
    );
    load(&mut clf, &mut backend, "CPU", false)?;

    for _ in 0..5 {
        clf.enqueue(&crop_64())?;
    }
    assert_eq!(clf.enqueued(), 2);
    clf.submit()?;

    clf.result(1)?;
    assert!(matches!(
        clf.result(2),
        Err(DetectorError::BadIndex {
            index: 2,
            count: 2,
            ..
        })
    ));
    Ok(())
}

#[test]
fn empty_batch_submit_is_a_noop() -> Result<()> {
    let mut backend = SimBackend::new();
    let journal = backend.journal();
    backend.register("ag.xml", age_gender_spec(2));
    let mut clf: AgeGenderClassifier<SimBackend> = AgeGenderClassifier::new(
        DetectorConfig::new("ag.xml").with_max_batch(2),
        AgeGenderDecoder::new(),
    );
    load(&mut clf, &mut backend, "CPU", false)?;

    clf.submit()?;
    assert_eq!(journal.count(|e| matches!(e, Event::Ran { .. })), 0);
    Ok(())
}

#[test]
fn dynamic_batch_notifies_effective_size_on_eligible_devices() -> Result<()> {
    let mut backend = SimBackend::new();
    let journal = backend.journal();
    backend.register("ag.xml", age_gender_spec(4));
    let mut clf: AgeGenderClassifier<SimBackend> = AgeGenderClassifier::new(
        DetectorConfig::new("ag.xml").with_max_batch(4),
        AgeGenderDecoder::new(),
    );
    load(&mut clf, &mut backend, "CPU", true)?;
    assert!(journal
        .events()
        .contains(&Event::Compiled {
            model: "ag.xml".to_string(),
            device: "CPU".to_string(),
            dynamic_batch: true,
        }));

    clf.enqueue(&crop_64())?;
    clf.enqueue(&crop_64())?;
    clf.submit()?;
    assert!(journal.events().contains(&Event::EffectiveBatch {
        model: "ag.xml".to_string(),
        batch: 2,
    }));
    Ok(())
}

#[test]
fn dynamic_batch_is_ignored_on_ineligible_devices() -> Result<()> {
    let mut backend = SimBackend::new();
    let journal = backend.journal();
    backend.register("ag.xml", age_gender_spec(4));
    let mut clf: AgeGenderClassifier<SimBackend> = AgeGenderClassifier::new(
        DetectorConfig::new("ag.xml").with_max_batch(4),
        AgeGenderDecoder::new(),
    );
    load(&mut clf, &mut backend, "MYRIAD", true)?;

    clf.enqueue(&crop_64())?;
    clf.submit()?;
    assert!(journal.events().contains(&Event::Compiled {
        model: "ag.xml".to_string(),
        device: "MYRIAD".to_string(),
        dynamic_batch: false,
    }));
    assert_eq!(
        journal.count(|e| matches!(e, Event::EffectiveBatch { .. })),
        0
    );
    Ok(())
}

#[test]
fn head_pose_reads_fixed_angle_outputs() -> Result<()> {
    let mut backend = SimBackend::new();
    backend.register(
        "hp.xml",
        SimModelSpec::new()
            .input("data", &[2, 3, 60, 60], ElementType::U8)
            .output_f32("angle_r_fc", &[2, 1], vec![1.0, 2.0])
            .output_f32("angle_p_fc", &[2, 1], vec![3.0, 4.0])
            .output_f32("angle_y_fc", &[2, 1], vec![5.0, 6.0]),
    );
    let mut clf: HeadPoseClassifier<SimBackend> = HeadPoseClassifier::new(
        DetectorConfig::new("hp.xml").with_max_batch(2),
        HeadPoseDecoder::new(),
    );
    load(&mut clf, &mut backend, "CPU", false)?;

    clf.enqueue(&crop_64())?;
    clf.enqueue(&crop_64())?;
    clf.submit()?;
    let pose = clf.result(1)?;
    assert_eq!((pose.roll, pose.pitch, pose.yaw), (2.0, 4.0, 6.0));
    Ok(())
}

#[test]
fn head_pose_missing_angle_output_is_fatal() {
    let mut backend = SimBackend::new();
    backend.register(
        "hp.xml",
        SimModelSpec::new()
            .input("data", &[1, 3, 60, 60], ElementType::U8)
            .output_f32("angle_r_fc", &[1, 1], vec![1.0])
            .output_f32("angle_p_fc", &[1, 1], vec![3.0]),
    );
    let mut clf: HeadPoseClassifier<SimBackend> =
        HeadPoseClassifier::new(DetectorConfig::new("hp.xml"), HeadPoseDecoder::new());
    assert!(matches!(
        load(&mut clf, &mut backend, "CPU", false),
        Err(DetectorError::InvalidTopology { .. })
    ));
}

#[test]
fn emotions_decode_maps_vocabulary() -> Result<()> {
    let mut backend = SimBackend::new();
    #[rustfmt::skip]
    let probs = vec![
        0.1, 0.6, 0.1, 0.1, 0.1,
        0.1, 0.1, 0.1, 0.1, 0.6,
    ];
    backend.register(
        "em.xml",
        SimModelSpec::new()
            .input("data", &[2, 3, 64, 64], ElementType::U8)
            .output_f32("prob_emotion", &[2, 5], probs),
    );
    let mut clf: EmotionsClassifier<SimBackend> = EmotionsClassifier::new(
        DetectorConfig::new("em.xml").with_max_batch(2),
        EmotionsDecoder::new(),
    );
    load(&mut clf, &mut backend, "CPU", false)?;

    clf.enqueue(&crop_64())?;
    clf.enqueue(&crop_64())?;
    clf.submit()?;
    assert_eq!(clf.result(0)?.top(), Some(("happy", 0.6)));
    assert_eq!(clf.result(1)?.top(), Some(("anger", 0.6)));
    Ok(())
}

#[test]
fn emotions_vocabulary_size_mismatch_is_fatal() -> Result<()> {
    let mut backend = SimBackend::new();
    backend.register(
        "em.xml",
        SimModelSpec::new()
            .input("data", &[1, 3, 64, 64], ElementType::U8)
            .output_f32("prob_emotion", &[1, 4], vec![0.25; 4]),
    );
    let mut clf: EmotionsClassifier<SimBackend> =
        EmotionsClassifier::new(DetectorConfig::new("em.xml"), EmotionsDecoder::new());
    load(&mut clf, &mut backend, "CPU", false)?;

    clf.enqueue(&crop_64())?;
    clf.submit()?;
    assert!(matches!(
        clf.result(0),
        Err(DetectorError::InvalidTopology { .. })
    ));
    Ok(())
}

#[test]
fn landmarks_decode_pairs_per_slot() -> Result<()> {
    let mut backend = SimBackend::new();
    #[rustfmt::skip]
    let coords = vec![
        0.1, 0.2, 0.3, 0.4, 0.5, 0.6,
        0.7, 0.8, 0.9, 1.0, 1.1, 1.2,
    ];
    backend.register(
        "lm.xml",
        SimModelSpec::new()
            .input("data", &[2, 3, 48, 48], ElementType::U8)
            .output_f32("align_fc3", &[2, 6], coords),
    );
    let mut clf: LandmarksClassifier<SimBackend> = LandmarksClassifier::new(
        DetectorConfig::new("lm.xml").with_max_batch(2),
        LandmarksDecoder::new(),
    );
    load(&mut clf, &mut backend, "CPU", false)?;

    clf.enqueue(&crop_64())?;
    clf.enqueue(&crop_64())?;
    clf.submit()?;
    assert_eq!(clf.result(0)?, vec![(0.1, 0.2), (0.3, 0.4), (0.5, 0.6)]);
    assert_eq!(clf.result(1)?, vec![(0.7, 0.8), (0.9, 1.0), (1.1, 1.2)]);
    Ok(())
}

#[test]
fn landmarks_odd_channel_count_is_fatal() {
    let mut backend = SimBackend::new();
    backend.register(
        "lm.xml",
        SimModelSpec::new()
            .input("data", &[1, 3, 48, 48], ElementType::U8)
            .output_f32("align_fc3", &[1, 7], vec![0.0; 7]),
    );
    let mut clf: LandmarksClassifier<SimBackend> =
        LandmarksClassifier::new(DetectorConfig::new("lm.xml"), LandmarksDecoder::new());
    assert!(matches!(
        load(&mut clf, &mut backend, "CPU", false),
        Err(DetectorError::InvalidTopology { .. })
    ));
}

#[test]
fn antispoof_scales_real_probability_to_percent() -> Result<()> {
    let mut backend = SimBackend::new();
    backend.register(
        "as.xml",
        SimModelSpec::new()
            .input("data", &[2, 3, 128, 128], ElementType::U8)
            .output_f32("prob", &[2, 2], vec![0.9, 0.1, 0.2, 0.8]),
    );
    let mut clf: AntispoofClassifier<SimBackend> = AntispoofClassifier::new(
        DetectorConfig::new("as.xml").with_max_batch(2),
        AntispoofDecoder::new(),
    );
    load(&mut clf, &mut backend, "CPU", false)?;

    clf.enqueue(&crop_64())?;
    clf.enqueue(&crop_64())?;
    clf.submit()?;
    assert!((clf.result(0)? - 90.0).abs() < 1e-4);
    assert!((clf.result(1)? - 20.0).abs() < 1e-4);
    Ok(())
}

#[test]
fn face_detection_rejects_unexpected_output_count() {
    let mut backend = SimBackend::new();
    backend.register(
        "face.xml",
        SimModelSpec::new()
            .input("data", &[1, 3, 384, 672], ElementType::U8)
            .output_f32("a", &[1, 1, 4, 7], vec![0.0; 28])
            .output_f32("b", &[1, 1, 4, 7], vec![0.0; 28])
            .output_f32("c", &[1, 5], vec![0.0; 5]),
    );
    let mut face = FaceDetector::new(FaceDetectorConfig::new("face.xml"));
    assert!(matches!(
        load(&mut face, &mut backend, "CPU", false),
        Err(DetectorError::InvalidTopology { .. })
    ));
}

#[test]
fn full_frame_pipeline_detect_crop_classify() -> Result<()> {
    init_tracing();
    let mut backend = SimBackend::new();
    backend.register("ag.xml", age_gender_spec(2));
    let mut face = loaded_face(&mut backend, FaceDetectorConfig::new("face.xml"));
    let mut ages: AgeGenderClassifier<SimBackend> = AgeGenderClassifier::new(
        DetectorConfig::new("ag.xml").with_max_batch(2),
        AgeGenderDecoder::new(),
    );
    load(&mut ages, &mut backend, "CPU", false)?;

    let frame = frame_640x480();
    face.enqueue(&frame)?;
    face.submit()?;
    face.wait()?;
    let detections = face.fetch_results()?.to_vec();
    assert_eq!(detections.len(), 1);

    for det in &detections {
        let crop = frame.crop(&det.rect);
        assert!(crop.width() > 0 && crop.height() > 0);
        ages.enqueue(&crop)?;
    }
    ages.submit()?;
    ages.wait()?;
    let estimate = ages.result(0)?;
    assert!((estimate.age - 30.0).abs() < 1e-3);
    Ok(())
}

#[test]
fn detection_serializes_to_json() -> Result<()> {
    let det = Detection {
        label: 1,
        confidence: 0.9,
        rect: FaceRect::new(13, 29, 230, 230),
    };
    let value = serde_json::to_value(&det)?;
    assert_eq!(value["label"], 1);
    assert_eq!(value["rect"]["width"], 230);
    let back: Detection = serde_json::from_value(value)?;
    assert_eq!(back, det);
    Ok(())
}
