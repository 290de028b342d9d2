//! Hardware inventory query sequence shared by all Kramer families.

use std::net::IpAddr;
use std::time::Duration;

use tracing::debug;

use avctl_core::error::Result;
use avctl_core::types::{HardwareInfo, NetworkInfo};

use crate::commands::{self, BUILD_DATE, MODEL, NET_GATE, NET_IP, NET_MAC, PROT_VER, SN, VERSION};
use crate::connection::KramerConnection;

/// Query every inventory field in a fixed order.
///
/// The first failing query aborts the sequence with
/// [`Error::HardwareInfo`](avctl_core::Error::HardwareInfo) naming the
/// field; nothing partial is returned. The hostname comes from a reverse
/// lookup of the configured address.
pub(crate) async fn query_hardware_info(conn: &KramerConnection) -> Result<HardwareInfo> {
    let address = conn.endpoint().address();
    debug!(addr = %address, "querying hardware info");

    let build_date = query_field(conn, BUILD_DATE, "build date").await?;
    let model = query_field(conn, MODEL, "model number").await?;
    let protocol = query_field(conn, PROT_VER, "protocol version").await?;
    let firmware_version = query_field(conn, VERSION, "firmware version").await?;
    let serial_number = query_field(conn, SN, "serial number").await?;
    let ip_address = query_field(conn, NET_IP, "IP address").await?;
    let gateway = query_field(conn, NET_GATE, "gateway address").await?;
    let mac_address = query_field(conn, NET_MAC, "MAC address").await?;
    let hostname = resolve_hostname(address).await;

    Ok(HardwareInfo {
        hostname,
        model,
        serial_number,
        build_date,
        firmware_version,
        protocol_version: commands::normalize_protocol_version(&protocol).to_string(),
        network: NetworkInfo {
            ip_address,
            mac_address,
            gateway,
            dns: Vec::new(),
        },
    })
}

/// Upper bound on the reverse lookup; a slow resolver falls back to the
/// address.
const REVERSE_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Reverse-resolve `address` to a host name without the trailing dot.
///
/// Anything that is not an IP literal, has no PTR record, or does not
/// answer in time comes back unchanged.
pub(crate) async fn resolve_hostname(address: &str) -> String {
    let Ok(ip) = address.parse::<IpAddr>() else {
        return address.to_string();
    };
    let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip));
    match tokio::time::timeout(REVERSE_LOOKUP_TIMEOUT, lookup).await {
        Ok(Ok(Ok(name))) => {
            let name = name.trim_end_matches('.');
            if name.is_empty() {
                address.to_string()
            } else {
                name.to_string()
            }
        }
        Ok(Ok(Err(e))) => {
            debug!(addr = %address, error = %e, "no reverse DNS name");
            address.to_string()
        }
        Ok(Err(e)) => {
            debug!(addr = %address, error = %e, "reverse DNS task failed");
            address.to_string()
        }
        Err(_) => {
            debug!(addr = %address, "reverse DNS timed out");
            address.to_string()
        }
    }
}

async fn query_field(conn: &KramerConnection, verb: &str, field: &'static str) -> Result<String> {
    let address = conn.endpoint().address();
    let cmd = commands::cmd_hardware_query(verb);
    let reply = conn
        .command(&cmd)
        .await
        .map_err(|e| e.in_field(field, address))?;
    commands::parse_hardware_field(&cmd, &reply, verb)
        .map(str::to_string)
        .map_err(|e| e.in_field(field, address))
}
