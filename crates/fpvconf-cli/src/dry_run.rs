//! In-memory device for `--mock` runs

use fpvconf_core::commands;
use fpvconf_core::RemoteFile;
use fpvconf_remote::{CommandOutput, MockConnector, ScriptStep};

const WFB_CONF: &str = "\
### unit: drone or gs
unit=drone
wlan=wlan0
region=00
channel=161
txpower=1
driver_txpower_override=1
bandwidth=20
stbc=0
ldpc=0
mcs_index=1
stream=0
link_id=7669206
udp_port=5600
rcv_buf=456000
frame_type=data
fec_k=8
fec_n=12
pool_timeout=0
guard_interval=long
";

const TELEMETRY_CONF: &str = "\
### unit: drone or gs
unit=drone
serial=/dev/ttyS0
baud=115200
router=1
wlan=wlan0
channel=161
bandwidth=20
mcs_index=1
";

const MAJESTIC_YAML: &str = "\
system:
  webAdmin: enabled
isp:
  exposure: 7
image:
  mirror: false
  flip: false
  contrast: 50
video0:
  enabled: true
  codec: h265
  fps: 60
  bitrate: 4096
  size: 1280x720
fpv:
  enabled: true
records:
  enabled: false
";

const WIFIBROADCAST_CFG: &str = "\
[common]
wifi_channel = 161     # radio channel
wifi_region = 'BO'

[gs_mavlink]
peer = 'connect://127.0.0.1:14550'

[gs_video]
peer = 'connect://127.0.0.1:5600'
";

const MODPROBE_CONF: &str = "options 88XXau_wfb rtw_tx_pwr_idx_override=1\n";

/// A camera with stock config files, a canned hostname and a scripted upgrade
pub fn demo_device() -> MockConnector {
    let mock = MockConnector::new();
    mock.put_file(RemoteFile::WfbConf.remote_path(), WFB_CONF);
    mock.put_file(RemoteFile::Telemetry.remote_path(), TELEMETRY_CONF);
    mock.put_file(RemoteFile::Majestic.remote_path(), MAJESTIC_YAML);
    mock.put_file(RemoteFile::Wifibroadcast.remote_path(), WIFIBROADCAST_CFG);
    mock.put_file(RemoteFile::WfbModprobe.remote_path(), MODPROBE_CONF);
    mock.put_file(commands::INITTAB, "console::respawn:/sbin/getty -L console 0 vt100\n");

    mock.on_command(commands::HOSTNAME, CommandOutput::new(0, "openipc-ssc338q\n"));
    mock.on_command(
        commands::FIRMWARE_VERSION,
        CommandOutput::new(0, "NAME=\"OpenIPC\"\nOPENIPC_VERSION=2.4\nBUILD_OPTION=fpv\n"),
    );
    mock.script_shell(vec![
        ScriptStep::line(200, "Update kernel from /tmp/uImage"),
        ScriptStep::line(800, "Kernel updated to 4.9.84"),
        ScriptStep::line(200, "Update rootfs from /tmp/rootfs.squashfs"),
        ScriptStep::line(1500, "RootFS updated to 2.4.08"),
        ScriptStep::line(300, "Erasing overlay partition"),
        ScriptStep::line(200, "Unconditional reboot"),
    ]);
    mock
}
