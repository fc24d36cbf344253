// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Show/store handlers for per-register text endpoints.
// Author: Lukas Bower

//! Text endpoints.
//!
//! Reads render `0x<hex>\n`. Writes accept `0x`-prefixed hex or a plain
//! decimal integer and always report `strlen(input) + 1` once the input
//! parses, even when the register write itself fails; the failure is only
//! logged.

use log::{error, warn};

use crate::endpoint::Endpoint;
use crate::error::{MsrError, Result};
use crate::unit::UnitHandle;

/// Render the current value of `endpoint` on the unit's CPU.
pub fn show(unit: &UnitHandle, endpoint: &Endpoint) -> Result<String> {
    match unit.read(endpoint.address) {
        Ok(value) => Ok(format!("{value:#x}\n")),
        Err(fault) => {
            warn!(
                "show: reading MSR {:#x} on cpu {} failed: {}",
                endpoint.address,
                unit.cpu(),
                fault.code
            );
            Err(MsrError::DeviceUnavailable {
                cpu: unit.cpu(),
                addr: endpoint.address,
                fault,
            })
        }
    }
}

/// Parse `text` and write it to `endpoint` on the unit's CPU.
pub fn store(unit: &UnitHandle, endpoint: &Endpoint, text: &str) -> Result<usize> {
    if !endpoint.is_writable() {
        error!(
            "store: endpoint {} on cpu {} is read-only but received a write",
            endpoint.name,
            unit.cpu()
        );
        return Err(MsrError::PermissionDenied {
            index: unit
                .table()
                .endpoints()
                .iter()
                .position(|e| e == endpoint)
                .unwrap_or(usize::MAX),
        });
    }
    let value = parse_value(text)
        .ok_or_else(|| MsrError::InvalidArgument(format!("cannot parse {text:?}")))?;
    if let Err(fault) = unit.write(endpoint.address, value) {
        warn!(
            "store: writing {:#x} to MSR {:#x} on cpu {} failed: {}",
            value,
            endpoint.address,
            unit.cpu(),
            fault.code
        );
    }
    Ok(text.find('\0').unwrap_or(text.len()) + 1)
}

/// Parse hex with a literal `0x` prefix, falling back to signed decimal.
///
/// Follows `sscanf` conventions: trailing input after the digits is ignored,
/// out of range values saturate, and negative decimals wrap.
pub fn parse_value(text: &str) -> Option<u64> {
    text.strip_prefix("0x")
        .and_then(scan_hex)
        .or_else(|| scan_decimal(text))
}

fn split_sign(text: &str) -> (bool, &str) {
    let text = text.trim_start();
    match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    }
}

fn scan_hex(text: &str) -> Option<u64> {
    let (negative, body) = split_sign(text);
    let digits: &str = &body[..body
        .find(|c: char| !c.is_ascii_hexdigit())
        .unwrap_or(body.len())];
    if digits.is_empty() {
        return None;
    }
    let value = u64::from_str_radix(digits, 16).unwrap_or(u64::MAX);
    Some(if negative { value.wrapping_neg() } else { value })
}

fn scan_decimal(text: &str) -> Option<u64> {
    let (negative, body) = split_sign(text);
    let digits: &str = &body[..body
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(body.len())];
    if digits.is_empty() {
        return None;
    }
    let value: i64 = match format!("{}{digits}", if negative { "-" } else { "" }).parse() {
        Ok(v) => v,
        Err(_) if negative => i64::MIN,
        Err(_) => i64::MAX,
    };
    Some(value as u64)
}
