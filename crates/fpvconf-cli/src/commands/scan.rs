//! Scan command - find devices on the local network

use anyhow::Result;
use fpvconf_remote::{scan, ScanConfig};

use crate::output::{HostRow, OutputContext};

pub async fn scan(prefix: &str, config: &ScanConfig, ctx: &OutputContext) -> Result<()> {
    if !ctx.is_json() {
        ctx.info(&format!(
            "Scanning {}.1-254 for port {}...",
            prefix.trim_end_matches('.'),
            config.port
        ));
    }
    let found = scan::sweep(prefix, config).await?;
    let rows: Vec<HostRow> = found
        .into_iter()
        .map(|ip| HostRow {
            address: ip.to_string(),
            port: config.port,
        })
        .collect();
    ctx.print(&rows);
    Ok(())
}
