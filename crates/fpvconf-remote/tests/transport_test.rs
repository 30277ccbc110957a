//! RemoteTransport against the mock connector

use std::sync::Arc;
use std::time::Duration;

use fpvconf_core::{DeviceKind, DeviceTarget, ProgressEvent};
use fpvconf_remote::{CommandOutput, MockConnector, RemoteTransport, TransportError, UPLOAD};
use tokio_test::{assert_err, assert_ok};

fn target() -> DeviceTarget {
    DeviceTarget::new("192.168.1.10", 22, "root", "12345", DeviceKind::Camera)
}

fn setup() -> (MockConnector, RemoteTransport) {
    let mock = MockConnector::new();
    let transport = RemoteTransport::new(Arc::new(mock.clone()));
    (mock, transport)
}

fn quiet(_: &ProgressEvent) {}

#[tokio::test]
async fn test_nonzero_exit_is_not_an_error() {
    let (mock, transport) = setup();
    mock.on_command("false", CommandOutput::new(1, ""));
    let output = assert_ok!(transport.run_command(&target(), "false", None).await);
    assert_eq!(output.exit_status, Some(1));
    assert!(!output.success());
    assert_eq!(mock.open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_command_timeout_closes_session() {
    let (mock, transport) = setup();
    mock.set_exec_delay(Duration::from_secs(10));
    let err = assert_err!(
        transport
            .run_command(&target(), "sleep 10", Some(Duration::from_millis(200)))
            .await
    );
    assert!(matches!(err, TransportError::Timeout(_)));
    assert_eq!(mock.total_connects(), 1);
    assert_eq!(mock.open_sessions(), 0);
}

#[tokio::test]
async fn test_unreachable_device() {
    let (mock, transport) = setup();
    mock.set_unreachable(true);
    let err = assert_err!(transport.run_command(&target(), "true", None).await);
    assert!(err.is_connection_error());
}

#[tokio::test]
async fn test_wrong_password() {
    let mock = MockConnector::new().with_password("openipc");
    let transport = RemoteTransport::new(Arc::new(mock.clone()));
    let err = assert_err!(transport.download_file(&target(), "/etc/wfb.conf", &mut quiet).await);
    assert!(matches!(err, TransportError::AuthenticationFailed { .. }));
}

#[tokio::test]
async fn test_upload_missing_local_file() {
    let (mock, transport) = setup();
    let err = assert_err!(
        transport
            .upload_file(&target(), std::path::Path::new("/no/such/uImage"), "/tmp/uImage", &mut quiet)
            .await
    );
    assert!(matches!(err, TransportError::NotFound(_)));
    assert_eq!(mock.total_connects(), 0);
}

#[tokio::test]
async fn test_upload_text_and_download() {
    let (mock, transport) = setup();
    assert_ok!(
        transport
            .upload_text(&target(), "unit=drone\nchannel=36\n", "/etc/wfb.conf")
            .await
    );
    assert_eq!(
        mock.file_text("/etc/wfb.conf").as_deref(),
        Some("unit=drone\nchannel=36\n")
    );
    let data = assert_ok!(transport.download_file(&target(), "/etc/wfb.conf", &mut quiet).await);
    assert_eq!(data, b"unit=drone\nchannel=36\n");
}

#[tokio::test]
async fn test_download_missing_remote_file() {
    let (_mock, transport) = setup();
    let err = assert_err!(transport.download_file(&target(), "/etc/nope.conf", &mut quiet).await);
    assert!(matches!(err, TransportError::NotFound(_)));
}

#[tokio::test]
async fn test_directory_mirror_roundtrip() {
    let (mock, transport) = setup();
    let source = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(source.path().join("fonts/osd")).unwrap();
    std::fs::write(source.path().join("vtx_info.yaml"), "vtx_id: 1\n").unwrap();
    std::fs::write(source.path().join("fonts/osd/font.png"), [0x89, b'P', b'N', b'G']).unwrap();

    let uploaded = assert_ok!(
        transport
            .upload_directory(&target(), source.path(), "/usr/share/openipc/", &mut quiet)
            .await
    );
    assert_eq!(uploaded, 2);
    assert_eq!(
        mock.file("/usr/share/openipc/fonts/osd/font.png").unwrap(),
        vec![0x89, b'P', b'N', b'G']
    );

    let dest = tempfile::tempdir().unwrap();
    let downloaded = assert_ok!(
        transport
            .download_directory(&target(), "/usr/share/openipc", dest.path(), &mut quiet)
            .await
    );
    assert_eq!(downloaded, 2);
    assert_eq!(
        std::fs::read_to_string(dest.path().join("vtx_info.yaml")).unwrap(),
        "vtx_id: 1\n"
    );
    assert_eq!(
        std::fs::read(dest.path().join("fonts/osd/font.png")).unwrap(),
        vec![0x89, b'P', b'N', b'G']
    );
    assert_eq!(mock.open_sessions(), 0);
}

#[tokio::test]
async fn test_download_directory_missing() {
    let (_mock, transport) = setup();
    let dest = tempfile::tempdir().unwrap();
    let err = assert_err!(
        transport
            .download_directory(&target(), "/no/such/dir", dest.path(), &mut quiet)
            .await
    );
    assert!(matches!(err, TransportError::NotFound(_)));
}

#[tokio::test]
async fn test_concurrent_calls_use_separate_sessions() {
    let (mock, transport) = setup();
    mock.on_command("hostname -s", CommandOutput::new(0, "cam\n"));
    let t = target();
    let (a, b) = tokio::join!(
        transport.run_command(&t, "hostname -s", None),
        transport.run_command(&t, "hostname -s", None),
    );
    assert_eq!(assert_ok!(a).output, "cam\n");
    assert_eq!(assert_ok!(b).output, "cam\n");
    assert_eq!(mock.total_connects(), 2);
    assert_eq!(mock.open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_command_timeout_covers_connect() {
    let (mock, transport) = setup();
    mock.set_connect_delay(Duration::from_secs(5));
    let err = assert_err!(
        transport
            .run_command(&target(), "true", Some(Duration::from_secs(1)))
            .await
    );
    assert!(matches!(err, TransportError::Timeout(_)));
    assert_eq!(mock.total_connects(), 0);
    assert!(mock.executed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connect_and_command_share_one_budget() {
    let (mock, transport) = setup();
    mock.set_connect_delay(Duration::from_millis(600));
    mock.set_exec_delay(Duration::from_millis(600));
    let started = tokio::time::Instant::now();
    let err = assert_err!(
        transport
            .run_command(&target(), "sleep 1", Some(Duration::from_secs(1)))
            .await
    );
    assert!(matches!(err, TransportError::Timeout(_)));
    assert!(started.elapsed() < Duration::from_millis(1100));
    assert_eq!(mock.total_connects(), 1);
    assert_eq!(mock.open_sessions(), 0);
}

#[tokio::test]
async fn test_transfers_report_progress() {
    let (mock, transport) = setup();
    let mut events = Vec::new();
    let mut sink = |e: &ProgressEvent| events.push((e.stage.clone(), e.percent));
    assert_ok!(
        transport
            .upload_bytes(&target(), b"rootfs", "/tmp/rootfs.squashfs", &mut sink)
            .await
    );
    assert_ok!(
        transport
            .download_file(&target(), "/tmp/rootfs.squashfs", &mut sink)
            .await
    );
    assert_eq!(
        events,
        vec![
            (UPLOAD.to_string(), 0),
            (UPLOAD.to_string(), 100),
            ("download".to_string(), 0),
            ("download".to_string(), 100),
        ]
    );
    assert_eq!(mock.file("/tmp/rootfs.squashfs").unwrap(), b"rootfs");
}

#[tokio::test]
async fn test_directory_upload_reports_each_file() {
    let (_mock, transport) = setup();
    let source = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(source.path().join("osd")).unwrap();
    for name in ["a.png", "b.png", "osd/c.png", "osd/d.png"] {
        std::fs::write(source.path().join(name), name).unwrap();
    }

    let mut percents = Vec::new();
    let mut sink = |e: &ProgressEvent| percents.push(e.percent);
    let copied = assert_ok!(
        transport
            .upload_directory(&target(), source.path(), "/usr/share/fonts", &mut sink)
            .await
    );
    assert_eq!(copied, 4);
    assert_eq!(percents, vec![0, 25, 50, 75, 100]);
}

#[tokio::test]
async fn test_directory_mirror_at_root() {
    let (mock, transport) = setup();
    let source = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(source.path().join("sub")).unwrap();
    std::fs::write(source.path().join("a.txt"), "a\n").unwrap();
    std::fs::write(source.path().join("sub/b.txt"), "b\n").unwrap();

    let uploaded = assert_ok!(
        transport
            .upload_directory(&target(), source.path(), "/", &mut quiet)
            .await
    );
    assert_eq!(uploaded, 2);
    assert_eq!(mock.file_text("/a.txt").as_deref(), Some("a\n"));
    assert_eq!(mock.file_text("/sub/b.txt").as_deref(), Some("b\n"));
    assert!(mock.executed().iter().all(|c| !c.contains("''")));

    let dest = tempfile::tempdir().unwrap();
    let downloaded = assert_ok!(
        transport
            .download_directory(&target(), "/", dest.path(), &mut quiet)
            .await
    );
    assert_eq!(downloaded, 2);
    assert_eq!(
        std::fs::read_to_string(dest.path().join("sub/b.txt")).unwrap(),
        "b\n"
    );
    assert!(mock.executed().contains(&"ls -1p '/'".to_string()));
    assert!(!mock.files().iter().any(|f| f.starts_with("//")));
}
