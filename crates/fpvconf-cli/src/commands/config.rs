//! Get/set commands - read and edit device config files

use anyhow::{bail, Context, Result};
use fpvconf_codec::{
    ConfigMap, DriverSettings, MajesticSettings, ParseWarning, TelemetrySettings, WfbSettings,
    WifibroadcastSettings,
};
use fpvconf_core::{DeviceTarget, RemoteFile, Service};
use fpvconf_remote::RemoteTransport;

use crate::output::{OutputContext, SettingRow, WarningRow};

/// Show every key of a config file, plus fields the typed view had to default
pub async fn get(
    transport: &RemoteTransport,
    target: &DeviceTarget,
    file: RemoteFile,
    ctx: &OutputContext,
) -> Result<()> {
    let loaded = transport
        .read_config(target, file)
        .await
        .with_context(|| format!("Failed to read {}", file))?;

    let rows: Vec<SettingRow> = loaded
        .map
        .iter()
        .map(|(key, value)| SettingRow {
            key: key.to_string(),
            value: value.to_string(),
        })
        .collect();
    ctx.print(&rows);

    let warnings = typed_warnings(file, &loaded.map);
    if !warnings.is_empty() && !ctx.is_json() {
        ctx.warn(&format!("\n{} field(s) fell back to defaults:", warnings.len()));
        let rows: Vec<WarningRow> = warnings
            .into_iter()
            .map(|w| WarningRow {
                reason: w.to_string(),
                key: w.key,
                raw: w.raw,
            })
            .collect();
        ctx.print(&rows);
    }
    Ok(())
}

/// Apply `key=value` assignments and optionally restart the owning service
pub async fn set(
    transport: &RemoteTransport,
    target: &DeviceTarget,
    file: RemoteFile,
    assignments: &[String],
    restart: bool,
    ctx: &OutputContext,
) -> Result<()> {
    let updates = parse_assignments(assignments)?;
    let before = transport
        .read_config(target, file)
        .await
        .with_context(|| format!("Failed to read {}", file))?;
    let after = transport
        .apply_config(target, &before, &updates)
        .await
        .with_context(|| format!("Failed to update {}", file))?;

    if after.text == before.text {
        ctx.info(&format!("{} already up to date", file));
        return Ok(());
    }
    ctx.success(&format!("Updated {} ({} key(s))", file, updates.len()));

    if restart {
        match service_for(file) {
            Some(service) => {
                transport
                    .restart_service(target, service)
                    .await
                    .with_context(|| format!("Failed to restart {:?}", service))?;
                ctx.success(&format!("Restarted {:?}", service));
            }
            None => ctx.warn(&format!("{} takes effect after a reboot", file)),
        }
    }
    Ok(())
}

/// Turn `key=value` arguments into an update set
pub fn parse_assignments(assignments: &[String]) -> Result<ConfigMap> {
    let mut updates = ConfigMap::new();
    for assignment in assignments {
        let Some((key, value)) = assignment.split_once('=') else {
            bail!("Expected key=value, got '{}'", assignment);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Empty key in '{}'", assignment);
        }
        updates.insert(key, value.trim());
    }
    Ok(updates)
}

/// Service that re-reads `file` on restart
fn service_for(file: RemoteFile) -> Option<Service> {
    match file {
        RemoteFile::WfbConf => Some(Service::Wfb),
        RemoteFile::Majestic => Some(Service::Majestic),
        RemoteFile::Telemetry => Some(Service::Telemetry),
        RemoteFile::Wifibroadcast => Some(Service::GroundStationWfb),
        RemoteFile::WfbModprobe => None,
    }
}

fn typed_warnings(file: RemoteFile, map: &ConfigMap) -> Vec<ParseWarning> {
    match file {
        RemoteFile::WfbConf => WfbSettings::from_map(map).warnings,
        RemoteFile::Majestic => MajesticSettings::from_map(map).warnings,
        RemoteFile::Telemetry => TelemetrySettings::from_map(map).warnings,
        RemoteFile::Wifibroadcast => WifibroadcastSettings::from_map(map).warnings,
        RemoteFile::WfbModprobe => DriverSettings::from_map(map).warnings,
    }
}
