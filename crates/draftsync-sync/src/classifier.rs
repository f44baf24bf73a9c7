//! Error classifier
//!
//! Maps any fault raised by a port into a [`SyncError`]. Classification is
//! deterministic and total: the rules below are tried in order and the first
//! rule that matches anywhere in the error chain wins.
//!
//! 1. SDK-wrapped faults ([`RemoteFault::Sdk`])
//! 2. `tokio::time::error::Elapsed`
//! 3. socket timeouts
//! 4. connection abort / reset
//! 5. DNS failure / unreachable host
//! 6. HTTP 401
//! 7. HTTP 5xx
//! 8. HTTP 400 / 404
//! 9. everything else
//!
//! Typed faults are found by downcasting each link of the chain; message
//! text is only consulted when no typed fault is present.

use std::io;

use draftsync_core::ports::RemoteFault;

use crate::error::SyncError;

/// Words that mark a nested SDK cause as a connectivity problem
const CONNECTIVITY_MARKERS: &[&str] = &[
    "network",
    "connection",
    "connect",
    "unreachable",
    "dns",
    "offline",
    "socket",
    "timed out",
    "timeout",
];

const TIMEOUT_MARKERS: &[&str] = &["timed out", "timeout"];

const RESET_MARKERS: &[&str] = &[
    "connection reset",
    "connection aborted",
    "reset by peer",
    "broken pipe",
];

const UNREACHABLE_MARKERS: &[&str] = &[
    "dns",
    "lookup",
    "unreachable",
    "connection refused",
    "no route to host",
];

/// Facts gathered from one walk over the error chain
struct Evidence<'a> {
    sdk: Option<(&'a str, Option<&'a str>)>,
    fault: Option<&'a RemoteFault>,
    elapsed: bool,
    io_kinds: Vec<io::ErrorKind>,
    text: String,
}

impl<'a> Evidence<'a> {
    fn gather(err: &'a anyhow::Error) -> Self {
        let mut evidence = Evidence {
            sdk: None,
            fault: None,
            elapsed: false,
            io_kinds: Vec::new(),
            text: format!("{err:#}").to_lowercase(),
        };

        for cause in err.chain() {
            if let Some(fault) = cause.downcast_ref::<RemoteFault>() {
                match fault {
                    RemoteFault::Sdk { message, cause } if evidence.sdk.is_none() => {
                        evidence.sdk = Some((message.as_str(), cause.as_deref()));
                    }
                    RemoteFault::Sdk { .. } => {}
                    other if evidence.fault.is_none() => evidence.fault = Some(other),
                    _ => {}
                }
            }
            if cause.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
                evidence.elapsed = true;
            }
            if let Some(io_err) = cause.downcast_ref::<io::Error>() {
                evidence.io_kinds.push(io_err.kind());
            }
        }

        evidence
    }

    fn has_io(&self, kinds: &[io::ErrorKind]) -> bool {
        self.io_kinds.iter().any(|k| kinds.contains(k))
    }

    fn text_has(&self, markers: &[&str]) -> bool {
        markers.iter().any(|m| self.text.contains(m))
    }

    /// HTTP status carried by a typed fault, or mentioned in the text
    fn status(&self) -> Option<u16> {
        match self.fault {
            Some(fault) => fault.status(),
            None => extract_status(&self.text),
        }
    }
}

/// Classifies a fault into a [`SyncError`]
pub fn classify(err: &anyhow::Error) -> SyncError {
    let evidence = Evidence::gather(err);
    let message = format!("{err:#}");

    // 1. SDK-wrapped faults
    if let Some((sdk_message, cause)) = evidence.sdk {
        let nested = cause.unwrap_or(sdk_message).to_lowercase();
        if CONNECTIVITY_MARKERS.iter().any(|m| nested.contains(m)) {
            return SyncError::network(message);
        }
        let status_code = extract_status(&nested)
            .or_else(|| extract_status(&sdk_message.to_lowercase()))
            .unwrap_or(500);
        return SyncError::Server {
            status_code,
            message,
        };
    }

    // 2. async timeout
    if evidence.elapsed {
        return SyncError::timeout(message);
    }

    // 3. socket timeout
    if evidence.has_io(&[io::ErrorKind::TimedOut])
        || matches!(evidence.fault, Some(RemoteFault::Timeout(_)))
        || (evidence.fault.is_none() && evidence.text_has(TIMEOUT_MARKERS))
    {
        return SyncError::timeout(message);
    }

    // 4. connection abort / reset
    if evidence.has_io(&[
        io::ErrorKind::ConnectionAborted,
        io::ErrorKind::ConnectionReset,
        io::ErrorKind::BrokenPipe,
    ]) || matches!(evidence.fault, Some(RemoteFault::Connection(_)))
        || (evidence.fault.is_none() && evidence.text_has(RESET_MARKERS))
    {
        return SyncError::network(message);
    }

    // 5. DNS / unreachable
    if evidence.has_io(&[
        io::ErrorKind::ConnectionRefused,
        io::ErrorKind::NotConnected,
        io::ErrorKind::AddrNotAvailable,
    ]) || matches!(evidence.fault, Some(RemoteFault::Unreachable(_)))
        || (evidence.fault.is_none() && evidence.text_has(UNREACHABLE_MARKERS))
    {
        return SyncError::network(message);
    }

    let status = evidence.status();

    // 6. authentication
    if status == Some(401)
        || matches!(evidence.fault, Some(RemoteFault::NotAuthenticated))
        || (evidence.fault.is_none() && evidence.text.contains("unauthorized"))
    {
        return SyncError::Authentication { message };
    }

    match status {
        // 7. server side
        Some(code @ 500..=599) => SyncError::Server {
            status_code: code,
            message,
        },
        // 8. malformed or unknown target
        Some(400) | Some(404) => SyncError::Validation { message },
        // 9. fallthrough
        _ => SyncError::Unknown { message },
    }
}

/// Finds an HTTP status code mentioned in lowercased message text
///
/// Only numbers that directly follow `http`, `status` or `code` count, so
/// that counts and identifiers in messages are not mistaken for statuses.
fn extract_status(text: &str) -> Option<u16> {
    let tokens: Vec<&str> = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    tokens.windows(2).find_map(|pair| {
        let [prefix, candidate] = pair else {
            return None;
        };
        if !matches!(*prefix, "http" | "status" | "code") || candidate.len() != 3 {
            return None;
        }
        candidate
            .parse::<u16>()
            .ok()
            .filter(|code| (100..=599).contains(code))
    })
}
