mod common;

use std::time::Duration;

use smokewatch::ingest::{HttpCameraConfig, HttpCameraSource};
use smokewatch::{open_source, CameraSpec, FrameSource, SourceError, SourceSettings};
use url::Url;

fn source_for(base: &str) -> HttpCameraSource {
    HttpCameraSource::new(HttpCameraConfig {
        base_url: Url::parse(base).expect("url"),
        timeout: Duration::from_secs(2),
    })
}

#[test]
fn fetches_and_decodes_capture_jpeg() {
    let (base, server) = common::serve_once(200, "image/jpeg", common::sample_jpeg(32, 24));
    let mut source = source_for(&base);

    let frame = source.next_frame().expect("frame");
    assert_eq!((frame.width, frame.height), (32, 24));
    assert_eq!(frame.byte_len(), 32 * 24 * 3);

    let request = server.join().expect("server");
    assert!(request.request_line.starts_with("GET /capture "));
    assert_eq!(source.stats().frames_captured, 1);
    assert!(source.is_healthy());
}

#[test]
fn error_status_is_transient() {
    let (base, server) = common::serve_once(503, "text/plain", b"busy".to_vec());
    let mut source = source_for(&base);

    let err = source.next_frame().unwrap_err();
    assert!(matches!(err, SourceError::TransientFetch(_)));
    assert!(!err.is_fatal());
    assert!(err.to_string().contains("503"));
    server.join().expect("server");
    assert_eq!(source.stats().failures, 1);
}

#[test]
fn undecodable_body_is_transient() {
    let (base, server) = common::serve_once(200, "image/jpeg", b"not a jpeg".to_vec());
    let mut source = source_for(&base);

    let err = source.next_frame().unwrap_err();
    assert!(matches!(err, SourceError::TransientFetch(_)));
    server.join().expect("server");
}

#[test]
fn empty_body_is_transient() {
    let (base, server) = common::serve_once(200, "image/jpeg", Vec::new());
    let mut source = source_for(&base);

    assert!(matches!(
        source.next_frame(),
        Err(SourceError::TransientFetch(_))
    ));
    server.join().expect("server");
}

#[test]
fn open_source_builds_network_camera_from_settings() {
    let (base, server) = common::serve_once(200, "image/jpeg", common::sample_jpeg(16, 16));
    let settings = SourceSettings {
        camera: CameraSpec::parse(&base).expect("camera spec"),
        fetch_timeout: Duration::from_secs(2),
        width: 640,
        height: 480,
    };

    let mut source = open_source(&settings).expect("open");
    assert!(source.describe().contains("/capture"));
    let frame = source.next_frame().expect("frame");
    assert_eq!((frame.width, frame.height), (16, 16));
    server.join().expect("server");
}
