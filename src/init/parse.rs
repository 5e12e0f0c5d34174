// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::net::SocketAddr;
use std::time::Duration;
use tower::BoxError;

/// Idle delays as accepted on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringDelays(pub Vec<Duration>);

/// Bytes given as a hex string on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

/// Parse an endpoint
pub fn parse_endpoint(s: &str) -> Result<SocketAddr, Box<dyn Error + Send + Sync + 'static>> {
    // Use actual localhost address instead of localhost name
    let s = match s.strip_prefix("localhost:") {
        Some(port) => format!("127.0.0.1:{}", port),
        None => s.to_string(),
    };
    let sa: SocketAddr = s.parse()?;
    Ok(sa)
}

/// Parse a comma separated list of delays. Each entry is `hh:mm:ss[.fff]`,
/// `<n>ms` or `<n>s`; blank entries are skipped.
pub fn parse_delays(s: &str) -> Result<MonitoringDelays, BoxError> {
    let delays = s
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_delay)
        .collect::<Result<Vec<_>, _>>()?;

    if delays.is_empty() {
        return Err("at least one delay is required".into());
    }
    Ok(MonitoringDelays(delays))
}

pub fn parse_delay(s: &str) -> Result<Duration, BoxError> {
    if let Some(ms) = s.strip_suffix("ms") {
        return Ok(Duration::from_millis(ms.trim().parse()?));
    }
    if let Some(secs) = s.strip_suffix('s') {
        return Ok(Duration::from_secs(secs.trim().parse()?));
    }

    let parts: Vec<&str> = s.split(':').collect();
    let [hours, minutes, seconds] = parts.as_slice() else {
        return Err(format!("invalid delay `{s}`: expected hh:mm:ss, <n>ms or <n>s").into());
    };

    let hours: u64 = hours.parse()?;
    let minutes: u64 = minutes.parse()?;
    let (seconds, fraction) = seconds.split_once('.').unwrap_or((*seconds, ""));
    let seconds: u64 = seconds.parse()?;
    if minutes >= 60 || seconds >= 60 {
        return Err(format!("invalid delay `{s}`: minutes and seconds must be below 60").into());
    }

    let nanos = match fraction.len() {
        0 => 0,
        1..=9 if fraction.bytes().all(|b| b.is_ascii_digit()) => {
            fraction.parse::<u32>()? * 10u32.pow(9 - fraction.len() as u32)
        }
        _ => return Err(format!("invalid fractional seconds in delay `{s}`").into()),
    };

    let total = hours
        .checked_mul(3600)
        .and_then(|h| h.checked_add(minutes * 60 + seconds))
        .ok_or_else(|| format!("invalid delay `{s}`: too large"))?;

    Ok(Duration::new(total, nanos))
}

pub fn parse_hex_bytes(s: &str) -> Result<HexBytes, BoxError> {
    Ok(HexBytes(hex::decode(s.trim())?))
}
