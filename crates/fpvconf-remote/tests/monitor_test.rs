//! UpgradeMonitor and FirmwareUpgrade against scripted shells

use std::sync::Arc;
use std::time::Duration;

use fpvconf_core::{DeviceKind, DeviceTarget, ProgressEvent};
use fpvconf_remote::{
    CancellationToken, FirmwareImages, FirmwareUpgrade, Milestone, MilestoneTable, MockConnector,
    MonitorError, MonitorState, RemoteTransport, ScriptStep, UpgradeConfig, UpgradeMonitor,
};

const SYSUPGRADE: &str = "sysupgrade --kernel=/tmp/uImage --rootfs=/tmp/rootfs.squashfs -n";

fn target() -> DeviceTarget {
    DeviceTarget::new("192.168.1.10", 22, "root", "12345", DeviceKind::Camera)
}

fn upgrade_script() -> Vec<ScriptStep> {
    vec![
        ScriptStep::line(100, "Update kernel from /tmp/uImage"),
        ScriptStep::line(300, "Kernel updated to 4.9.84"),
        ScriptStep::line(100, "Update rootfs from /tmp/rootfs.squashfs"),
        ScriptStep::line(500, "RootFS updated to 2.4.08"),
        ScriptStep::line(100, "Erasing overlay partition"),
        ScriptStep::line(100, "Unconditional reboot"),
    ]
}

fn monitor(mock: &MockConnector, deadline: Duration) -> UpgradeMonitor {
    UpgradeMonitor::new(Arc::new(mock.clone()), &UpgradeConfig::default()).with_deadline(deadline)
}

#[tokio::test(start_paused = true)]
async fn test_completes_with_monotonic_progress() {
    let mock = MockConnector::new();
    mock.script_shell(upgrade_script());
    let cancel = CancellationToken::new();
    let mut events: Vec<ProgressEvent> = Vec::new();

    let mut sink = |e: &ProgressEvent| events.push(e.clone());
    let report = monitor(&mock, Duration::from_secs(60))
        .run(&target(), SYSUPGRADE, &cancel, &mut sink)
        .await;

    assert_eq!(report.state, MonitorState::Completed);
    assert_eq!(
        report.history,
        vec![
            MonitorState::Idle,
            MonitorState::Connecting,
            MonitorState::Streaming,
            MonitorState::Completed
        ]
    );
    assert_eq!(report.percent, 100);
    assert_eq!(report.lines, 6);

    let percents: Vec<u8> = events.iter().map(|e| e.percent).collect();
    assert_eq!(percents, vec![20, 40, 50, 80, 90, 100]);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(events[0].line, "Update kernel from /tmp/uImage");
    assert_eq!(events[3].stage, "rootfs");

    assert_eq!(mock.shell_input(), format!("{}\n", SYSUPGRADE));
    assert_eq!(mock.open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_kernel_rootfs_reboot_sequence() {
    let mock = MockConnector::new();
    mock.script_shell(vec![
        ScriptStep::line(50, "Update kernel"),
        ScriptStep::line(50, "Update rootfs"),
        ScriptStep::line(50, "Unconditional reboot"),
    ]);
    let mut percents = Vec::new();
    let mut sink = |e: &ProgressEvent| percents.push(e.percent);
    let report = monitor(&mock, Duration::from_secs(5))
        .run(&target(), SYSUPGRADE, &CancellationToken::new(), &mut sink)
        .await;

    assert_eq!(report.state, MonitorState::Completed);
    assert_eq!(percents, vec![20, 50, 100]);
}

#[tokio::test(start_paused = true)]
async fn test_no_terminal_marker_times_out() {
    let mock = MockConnector::new();
    mock.script_shell(vec![
        ScriptStep::line(100, "Update kernel from /tmp/uImage"),
        ScriptStep::line(200, "Kernel updated to 4.9.84"),
    ]);
    let mut sink = |_: &ProgressEvent| {};
    let report = monitor(&mock, Duration::from_secs(2))
        .run(&target(), SYSUPGRADE, &CancellationToken::new(), &mut sink)
        .await;

    assert_eq!(report.state, MonitorState::TimedOut);
    assert_eq!(report.percent, 40);
    assert_eq!(mock.open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_stream() {
    let mock = MockConnector::new();
    mock.script_shell(upgrade_script());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(450)).await;
        trigger.cancel();
    });

    let mut sink = |_: &ProgressEvent| {};
    let report = monitor(&mock, Duration::from_secs(60))
        .run(&target(), SYSUPGRADE, &cancel, &mut sink)
        .await;

    assert_eq!(report.state, MonitorState::Cancelled);
    assert!(report.percent < 100);
    assert_eq!(mock.open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_wins_over_terminal_marker_in_same_tick() {
    let mock = MockConnector::new();
    mock.script_shell(vec![ScriptStep::Raw {
        delay: Duration::from_millis(100),
        data: b"RootFS updated to 2.4.08\r\nUnconditional reboot\r\n".to_vec(),
    }]);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    // Cancel as soon as the first line of the batch is reported
    let mut sink = move |e: &ProgressEvent| {
        if e.line.starts_with("RootFS") {
            trigger.cancel();
        }
    };
    let report = monitor(&mock, Duration::from_secs(60))
        .run(&target(), SYSUPGRADE, &cancel, &mut sink)
        .await;

    assert_eq!(report.state, MonitorState::Cancelled);
    assert_eq!(mock.open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_connect() {
    let mock = MockConnector::new();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut sink = |_: &ProgressEvent| {};
    let report = monitor(&mock, Duration::from_secs(60))
        .run(&target(), SYSUPGRADE, &cancel, &mut sink)
        .await;

    assert_eq!(
        report.history,
        vec![MonitorState::Idle, MonitorState::Connecting, MonitorState::Cancelled]
    );
    assert_eq!(mock.total_connects(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_connection_lost() {
    let mock = MockConnector::new();
    mock.script_shell(vec![
        ScriptStep::line(100, "Update kernel from /tmp/uImage"),
        ScriptStep::Disconnect {
            delay: Duration::from_millis(200),
        },
    ]);
    let mut sink = |_: &ProgressEvent| {};
    let report = monitor(&mock, Duration::from_secs(60))
        .run(&target(), SYSUPGRADE, &CancellationToken::new(), &mut sink)
        .await;

    assert_eq!(report.state, MonitorState::ConnectionLost);
    assert_eq!(mock.open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shell_refused_is_failed() {
    let mock = MockConnector::new();
    mock.refuse_shell(true);
    let mut sink = |_: &ProgressEvent| {};
    let report = monitor(&mock, Duration::from_secs(60))
        .run(&target(), SYSUPGRADE, &CancellationToken::new(), &mut sink)
        .await;

    assert!(matches!(report.state, MonitorState::Failed(_)));
    assert!(!report.history.contains(&MonitorState::Streaming));
}

#[tokio::test(start_paused = true)]
async fn test_output_ends_without_marker() {
    let mock = MockConnector::new();
    mock.script_shell(vec![
        ScriptStep::line(100, "sysupgrade: rootfs image is too large"),
        ScriptStep::Close {
            delay: Duration::from_millis(50),
        },
    ]);
    let mut sink = |_: &ProgressEvent| {};
    let report = monitor(&mock, Duration::from_secs(60))
        .run(&target(), SYSUPGRADE, &CancellationToken::new(), &mut sink)
        .await;

    assert_eq!(report.state, MonitorState::Failed("did not complete".into()));
    assert_eq!(mock.open_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_custom_terminal_marker() {
    let mock = MockConnector::new();
    mock.script_shell(vec![ScriptStep::line(100, "Flash done, restarting")]);
    let config = UpgradeConfig {
        milestones: MilestoneTable::new(vec![
            Milestone::new("flash done", 100, "done").terminal()
        ]),
        ..UpgradeConfig::default()
    };
    let mut sink = |_: &ProgressEvent| {};
    let report = UpgradeMonitor::new(Arc::new(mock.clone()), &config)
        .run(&target(), SYSUPGRADE, &CancellationToken::new(), &mut sink)
        .await;

    assert_eq!(report.state, MonitorState::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_firmware_upgrade_stages_images() {
    let mock = MockConnector::new();
    mock.script_shell(upgrade_script());
    let dir = tempfile::tempdir().unwrap();
    let images = FirmwareImages {
        kernel: dir.path().join("uImage.ssc338q"),
        rootfs: dir.path().join("rootfs.squashfs.ssc338q"),
    };
    std::fs::write(&images.kernel, b"kernel").unwrap();
    std::fs::write(&images.rootfs, b"rootfs").unwrap();

    let upgrade = FirmwareUpgrade::new(
        RemoteTransport::new(Arc::new(mock.clone())),
        UpgradeConfig::default(),
    );
    let mut stages = Vec::new();
    let mut sink = |e: &ProgressEvent| stages.push(e.stage.clone());
    let report = upgrade
        .run(&target(), &images, None, &CancellationToken::new(), &mut sink)
        .await
        .unwrap();

    assert_eq!(report.state, MonitorState::Completed);
    assert_eq!(mock.file("/tmp/uImage.ssc338q").unwrap(), b"kernel");
    assert_eq!(mock.file("/tmp/rootfs.squashfs.ssc338q").unwrap(), b"rootfs");
    assert_eq!(
        mock.shell_input(),
        "sysupgrade --kernel=/tmp/uImage.ssc338q --rootfs=/tmp/rootfs.squashfs.ssc338q -n\n"
    );
    assert_eq!(stages[..2], ["upload", "upload"]);
    assert_eq!(stages.last().map(String::as_str), Some("reboot"));
}

#[tokio::test]
async fn test_firmware_upgrade_missing_image() {
    let mock = MockConnector::new();
    let upgrade = FirmwareUpgrade::new(
        RemoteTransport::new(Arc::new(mock.clone())),
        UpgradeConfig::default(),
    );
    let images = FirmwareImages {
        kernel: "/no/such/uImage".into(),
        rootfs: "/no/such/rootfs".into(),
    };
    let mut sink = |_: &ProgressEvent| {};
    let err = upgrade
        .run(&target(), &images, None, &CancellationToken::new(), &mut sink)
        .await
        .unwrap_err();
    assert!(matches!(err, MonitorError::Staging { .. }));
    assert!(mock.shell_input().is_empty());
}
