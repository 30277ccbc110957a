//! Typed views over parsed configuration maps
//!
//! Each view reads its fields out of a [`ConfigMap`] and records a
//! [`ParseWarning`](crate::ParseWarning) for every number that had to fall
//! back to `0`. Writing a view back only emits fields that carry real
//! values, so a defaulted number never overwrites what is on the device.

use serde::{Deserialize, Serialize};

use crate::driver::TX_POWER_OVERRIDE;
use crate::map::{ConfigMap, Field, FieldReader, FieldWriter, Parsed};

/// `/etc/wfb.conf` radio link settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WfbSettings {
    pub unit: Option<String>,
    pub wlan: Option<String>,
    pub region: Option<String>,
    pub channel: Field<u16>,
    pub frequency: Field<u32>,
    pub txpower: Field<u8>,
    pub driver_txpower_override: Field<u8>,
    pub bandwidth: Field<u8>,
    pub stbc: Field<u8>,
    pub ldpc: Field<u8>,
    pub mcs_index: Field<u8>,
    pub stream: Field<u8>,
    pub link_id: Field<u32>,
    pub udp_port: Field<u16>,
    pub rcv_buf: Field<u32>,
    pub frame_type: Option<String>,
    pub fec_k: Field<u8>,
    pub fec_n: Field<u8>,
    pub pool_timeout: Field<u32>,
    pub guard_interval: Option<String>,
}

impl WfbSettings {
    pub fn from_map(map: &ConfigMap) -> Parsed<Self> {
        let mut r = FieldReader::new(map);
        let settings = Self {
            unit: r.text("unit"),
            wlan: r.text("wlan"),
            region: r.text("region"),
            channel: r.number("channel"),
            frequency: r.number("frequency"),
            txpower: r.number("txpower"),
            driver_txpower_override: r.number("driver_txpower_override"),
            bandwidth: r.number("bandwidth"),
            stbc: r.number("stbc"),
            ldpc: r.number("ldpc"),
            mcs_index: r.number("mcs_index"),
            stream: r.number("stream"),
            link_id: r.number("link_id"),
            udp_port: r.number("udp_port"),
            rcv_buf: r.number("rcv_buf"),
            frame_type: r.text("frame_type"),
            fec_k: r.number("fec_k"),
            fec_n: r.number("fec_n"),
            pool_timeout: r.number("pool_timeout"),
            guard_interval: r.text("guard_interval"),
        };
        r.finish(settings)
    }

    pub fn write_to(&self, map: &mut ConfigMap) {
        let mut w = FieldWriter::new(map);
        w.text("unit", &self.unit);
        w.text("wlan", &self.wlan);
        w.text("region", &self.region);
        w.number("channel", &self.channel);
        w.number("frequency", &self.frequency);
        w.number("txpower", &self.txpower);
        w.number("driver_txpower_override", &self.driver_txpower_override);
        w.number("bandwidth", &self.bandwidth);
        w.number("stbc", &self.stbc);
        w.number("ldpc", &self.ldpc);
        w.number("mcs_index", &self.mcs_index);
        w.number("stream", &self.stream);
        w.number("link_id", &self.link_id);
        w.number("udp_port", &self.udp_port);
        w.number("rcv_buf", &self.rcv_buf);
        w.text("frame_type", &self.frame_type);
        w.number("fec_k", &self.fec_k);
        w.number("fec_n", &self.fec_n);
        w.number("pool_timeout", &self.pool_timeout);
        w.text("guard_interval", &self.guard_interval);
    }
}

/// `/etc/telemetry.conf` MAVLink settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySettings {
    pub unit: Option<String>,
    pub serial: Option<String>,
    pub baud: Field<u32>,
    pub router: Option<String>,
    pub port_rx: Field<u16>,
    pub port_tx: Field<u16>,
    pub one_way: Option<String>,
    pub mcs_index: Field<u8>,
    pub aggregate: Field<u8>,
    pub channels: Field<u8>,
}

impl TelemetrySettings {
    pub fn from_map(map: &ConfigMap) -> Parsed<Self> {
        let mut r = FieldReader::new(map);
        let settings = Self {
            unit: r.text("unit"),
            serial: r.text("serial"),
            baud: r.number("baud"),
            router: r.text("router"),
            port_rx: r.number("port_rx"),
            port_tx: r.number("port_tx"),
            one_way: r.text("one_way"),
            mcs_index: r.number("mcs_index"),
            aggregate: r.number("aggregate"),
            channels: r.number("channels"),
        };
        r.finish(settings)
    }

    pub fn write_to(&self, map: &mut ConfigMap) {
        let mut w = FieldWriter::new(map);
        w.text("unit", &self.unit);
        w.text("serial", &self.serial);
        w.number("baud", &self.baud);
        w.text("router", &self.router);
        w.number("port_rx", &self.port_rx);
        w.number("port_tx", &self.port_tx);
        w.text("one_way", &self.one_way);
        w.number("mcs_index", &self.mcs_index);
        w.number("aggregate", &self.aggregate);
        w.number("channels", &self.channels);
    }
}

/// `/etc/wifibroadcast.cfg` ground station settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WifibroadcastSettings {
    pub wifi_channel: Field<u16>,
    pub wifi_region: Option<String>,
    pub mavlink_peer: Option<String>,
    pub video_peer: Option<String>,
}

impl WifibroadcastSettings {
    pub fn from_map(map: &ConfigMap) -> Parsed<Self> {
        let mut r = FieldReader::new(map);
        let settings = Self {
            wifi_channel: r.number("common.wifi_channel"),
            wifi_region: r.text("common.wifi_region"),
            mavlink_peer: r.text("gs_mavlink.peer"),
            video_peer: r.text("gs_video.peer"),
        };
        r.finish(settings)
    }

    pub fn write_to(&self, map: &mut ConfigMap) {
        let mut w = FieldWriter::new(map);
        w.number("common.wifi_channel", &self.wifi_channel);
        w.text("common.wifi_region", &self.wifi_region);
        w.text("gs_mavlink.peer", &self.mavlink_peer);
        w.text("gs_video.peer", &self.video_peer);
    }
}

/// `/etc/modprobe.d/wfb.conf` driver options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverSettings {
    pub tx_power_override: Field<u8>,
}

impl DriverSettings {
    pub fn from_map(map: &ConfigMap) -> Parsed<Self> {
        let mut r = FieldReader::new(map);
        let settings = Self {
            tx_power_override: r.number(TX_POWER_OVERRIDE),
        };
        r.finish(settings)
    }

    pub fn write_to(&self, map: &mut ConfigMap) {
        FieldWriter::new(map).number(TX_POWER_OVERRIDE, &self.tx_power_override);
    }
}

/// The subset of `/etc/majestic.yaml` edited from the configurator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MajesticSettings {
    pub codec: Option<String>,
    pub size: Option<String>,
    pub fps: Field<u16>,
    pub bitrate: Field<u32>,
    pub rc_mode: Option<String>,
    pub gop_size: Option<String>,
    pub exposure: Field<u16>,
    pub anti_flicker: Option<String>,
    pub mirror: Option<String>,
    pub flip: Option<String>,
    pub fpv_enabled: Option<String>,
    pub roi_rect: Option<String>,
    pub noise_level: Field<i8>,
    pub records_enabled: Option<String>,
}

impl MajesticSettings {
    pub fn from_map(map: &ConfigMap) -> Parsed<Self> {
        let mut r = FieldReader::new(map);
        let settings = Self {
            codec: r.text("video0.codec"),
            size: r.text("video0.size"),
            fps: r.number("video0.fps"),
            bitrate: r.number("video0.bitrate"),
            rc_mode: r.text("video0.rcMode"),
            gop_size: r.text("video0.gopSize"),
            exposure: r.number("isp.exposure"),
            anti_flicker: r.text("isp.antiFlicker"),
            mirror: r.text("image.mirror"),
            flip: r.text("image.flip"),
            fpv_enabled: r.text("fpv.enabled"),
            roi_rect: r.text("fpv.roiRect"),
            noise_level: r.number("fpv.noiseLevel"),
            records_enabled: r.text("records.enabled"),
        };
        r.finish(settings)
    }

    pub fn write_to(&self, map: &mut ConfigMap) {
        let mut w = FieldWriter::new(map);
        w.text("video0.codec", &self.codec);
        w.text("video0.size", &self.size);
        w.number("video0.fps", &self.fps);
        w.number("video0.bitrate", &self.bitrate);
        w.text("video0.rcMode", &self.rc_mode);
        w.text("video0.gopSize", &self.gop_size);
        w.number("isp.exposure", &self.exposure);
        w.text("isp.antiFlicker", &self.anti_flicker);
        w.text("image.mirror", &self.mirror);
        w.text("image.flip", &self.flip);
        w.text("fpv.enabled", &self.fpv_enabled);
        w.text("fpv.roiRect", &self.roi_rect);
        w.number("fpv.noiseLevel", &self.noise_level);
        w.text("records.enabled", &self.records_enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WarningReason;
    use crate::{ConfigCodec, FlatCodec, NestedCodec, SectionedCodec};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wfb_settings_flag_bad_numbers() {
        let text = "unit=drone\nchannel=16l\ntxpower=1\nudp_port=\n";
        let (map, _) = FlatCodec::new().parse(text).unwrap();
        let parsed = WfbSettings::from_map(&map);

        assert_eq!(parsed.settings.unit.as_deref(), Some("drone"));
        assert_eq!(parsed.settings.txpower, Field::parsed(1));
        assert_eq!(parsed.settings.channel.value, 0);
        assert!(parsed.settings.channel.defaulted);
        assert!(parsed.settings.udp_port.defaulted);

        let channel = parsed.warnings.iter().find(|w| w.key == "channel").unwrap();
        assert_eq!(channel.reason, WarningReason::Invalid);
        assert_eq!(channel.raw, "16l");
        let missing = parsed.warnings.iter().find(|w| w.key == "fec_k").unwrap();
        assert_eq!(missing.reason, WarningReason::Missing);
    }

    #[test]
    fn test_defaulted_fields_not_written_back() {
        let codec = FlatCodec::new();
        let text = "channel=bogus\ntxpower=1\n";
        let (map, doc) = codec.parse(text).unwrap();
        let mut parsed = WfbSettings::from_map(&map).settings;
        parsed.txpower.set(5);

        let mut updates = ConfigMap::new();
        parsed.write_to(&mut updates);
        assert_eq!(updates.get("channel"), None);
        assert_eq!(
            codec.serialize(&doc, &updates).unwrap(),
            "channel=bogus\ntxpower=5\n"
        );
    }

    #[test]
    fn test_wifibroadcast_settings() {
        let text = "[common]\nwifi_channel = 36\n[gs_mavlink]\npeer = 'connect://10.0.0.2:14550'\n";
        let (map, _) = SectionedCodec::new().parse(text).unwrap();
        let parsed = WifibroadcastSettings::from_map(&map);
        assert_eq!(parsed.settings.wifi_channel, Field::parsed(36));
        assert_eq!(
            parsed.settings.mavlink_peer.as_deref(),
            Some("connect://10.0.0.2:14550")
        );
        assert_eq!(parsed.settings.video_peer, None);
    }

    #[test]
    fn test_majestic_settings_roundtrip_edit() {
        let codec = NestedCodec::new();
        let text = "video0:\n  size: 1280x720\n  fps: 60\nfpv:\n  noiseLevel: -1\n";
        let (map, doc) = codec.parse(text).unwrap();
        let parsed = MajesticSettings::from_map(&map);
        assert_eq!(parsed.settings.noise_level, Field::parsed(-1));
        assert!(parsed.settings.bitrate.defaulted);

        let mut settings = parsed.settings;
        settings.fps.set(90);
        let mut updates = ConfigMap::new();
        settings.write_to(&mut updates);
        assert_eq!(
            codec.serialize(&doc, &updates).unwrap(),
            "video0:\n  size: 1280x720\n  fps: 90\nfpv:\n  noiseLevel: -1\n"
        );
    }

    #[test]
    fn test_driver_settings() {
        let map: ConfigMap = [(TX_POWER_OVERRIDE, "30")].into_iter().collect();
        let parsed = DriverSettings::from_map(&map);
        assert!(!parsed.has_warnings());
        assert_eq!(parsed.settings.tx_power_override.value, 30);
    }

    #[test]
    fn test_telemetry_settings() {
        let map: ConfigMap = [("serial", "/dev/ttyS2"), ("baud", "115200")]
            .into_iter()
            .collect();
        let parsed = TelemetrySettings::from_map(&map);
        assert_eq!(parsed.settings.baud.value, 115200);
        assert_eq!(parsed.settings.serial.as_deref(), Some("/dev/ttyS2"));
    }
}
