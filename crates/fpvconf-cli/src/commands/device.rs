//! Device maintenance commands

use anyhow::{bail, Context, Result};
use fpvconf_core::{DeviceTarget, Service};
use fpvconf_remote::RemoteTransport;

use crate::output::OutputContext;

/// Run a shell command and echo its output
pub async fn exec(
    transport: &RemoteTransport,
    target: &DeviceTarget,
    command: &str,
    ctx: &OutputContext,
) -> Result<()> {
    let output = transport
        .run_command(target, command, Some(transport.timeouts().command()))
        .await
        .context("Failed to run command")?;

    if ctx.is_json() {
        ctx.print_value(&output, || {});
    } else {
        print!("{}", output.output);
    }
    match output.exit_status {
        Some(0) => Ok(()),
        Some(status) => bail!("Command exited with status {}", status),
        None => bail!("Command ended without an exit status"),
    }
}

pub async fn hostname(
    transport: &RemoteTransport,
    target: &DeviceTarget,
    ctx: &OutputContext,
) -> Result<()> {
    let name = transport
        .hostname(target)
        .await
        .context("Failed to read hostname")?;
    let version = transport
        .firmware_version(target)
        .await
        .context("Failed to read firmware version")?;
    let mut pairs = vec![
        ("Host", target.address()),
        ("Hostname", name),
        ("Kind", target.kind.to_string()),
    ];
    pairs.extend(os_release_field(&version, "BUILD_OPTION").map(|v| ("Build", v)));
    pairs.extend(os_release_field(&version, "OPENIPC_VERSION").map(|v| ("Firmware", v)));
    ctx.print_kv(&pairs);
    Ok(())
}

pub async fn reboot(
    transport: &RemoteTransport,
    target: &DeviceTarget,
    ctx: &OutputContext,
) -> Result<()> {
    transport.reboot(target).await.context("Failed to reboot")?;
    ctx.success(&format!("{} is rebooting", target.host));
    Ok(())
}

/// Free or reclaim UART0 from the serial console
pub async fn uart(
    transport: &RemoteTransport,
    target: &DeviceTarget,
    enable: bool,
    ctx: &OutputContext,
) -> Result<()> {
    transport
        .set_console_on_uart(target, !enable)
        .await
        .context("Failed to update /etc/inittab")?;
    if enable {
        ctx.success("UART0 released for telemetry (reboot to apply)");
    } else {
        ctx.success("Serial console restored on UART0 (reboot to apply)");
    }
    Ok(())
}

pub async fn keygen(
    transport: &RemoteTransport,
    target: &DeviceTarget,
    ctx: &OutputContext,
) -> Result<()> {
    transport
        .generate_keys(target)
        .await
        .context("Failed to generate keys")?;
    ctx.success("Generated /etc/drone.key");
    Ok(())
}

pub async fn restart(
    transport: &RemoteTransport,
    target: &DeviceTarget,
    service: Service,
    ctx: &OutputContext,
) -> Result<()> {
    transport
        .restart_service(target, service)
        .await
        .with_context(|| format!("Failed to restart {:?}", service))?;
    ctx.success(&format!("Restarted {:?}", service));
    Ok(())
}

/// Value of `KEY=value` or `KEY="value"` in os-release text
fn os_release_field(text: &str, key: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let (k, v) = line.split_once('=')?;
        (k.trim() == key).then(|| v.trim().trim_matches('"').to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_release_field() {
        let text = "NAME=\"OpenIPC\"\nOPENIPC_VERSION=2.4\nBUILD_OPTION=fpv\n";
        assert_eq!(os_release_field(text, "OPENIPC_VERSION").as_deref(), Some("2.4"));
        assert_eq!(os_release_field(text, "NAME").as_deref(), Some("OpenIPC"));
        assert_eq!(os_release_field(text, "HOME_URL"), None);
    }
}
