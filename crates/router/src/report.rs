//! The one-shot readiness report the router process writes to stdout.
//!
//! The report is a single JSON line. The router writes nothing else to stdout;
//! its logs go to stderr.

use std::io::Write;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Details of a router that is ready to accept sessions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterReady {
    /// Address the transport is bound to.
    pub address: SocketAddr,

    /// Hex-encoded ed25519 public key of the router node.
    pub pubkey: String,

    /// Realm served.
    pub realm: String,

    /// Websocket URL of the bound transport.
    pub url: String,
}

/// Outcome of router startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RouterReport {
    /// The router is listening.
    Ready(RouterReady),

    /// Startup failed.
    Failed {
        /// Rendered error.
        error: String,
    },
}

impl RouterReport {
    /// Parses a report line, returning `None` for anything that is not a report.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }

    /// Writes the report as a single line and flushes.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be written.
    pub fn write_to(&self, mut writer: impl Write) -> Result<()> {
        let line = serde_json::to_string(self)?;
        writeln!(writer, "{line}").map_err(|e| Error::Io("failed to write report", e))?;
        writer
            .flush()
            .map_err(|e| Error::Io("failed to flush report", e))
    }
}

impl From<&Error> for RouterReport {
    fn from(error: &Error) -> Self {
        Self::Failed {
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_line_format() {
        let report = RouterReport::Ready(RouterReady {
            address: "127.0.0.1:61000".parse().unwrap(),
            pubkey: "ab".repeat(32),
            realm: "keel".to_string(),
            url: "ws://127.0.0.1:61000".to_string(),
        });

        let mut out = Vec::new();
        report.write_to(&mut out).unwrap();
        let line = String::from_utf8(out).unwrap();

        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.starts_with(r#"{"status":"ready""#));
        assert_eq!(RouterReport::parse(&line), Some(report));
    }

    #[test]
    fn test_failed_report_carries_error() {
        let report = RouterReport::from(&Error::Configuration("no serializers".into()));
        let parsed = RouterReport::parse(&serde_json::to_string(&report).unwrap()).unwrap();

        match parsed {
            RouterReport::Failed { error } => assert!(error.contains("no serializers")),
            RouterReport::Ready(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn test_non_report_lines_are_ignored() {
        assert_eq!(RouterReport::parse("starting router"), None);
        assert_eq!(RouterReport::parse(r#"{"status":"unknown"}"#), None);
        assert_eq!(RouterReport::parse(""), None);
    }
}
