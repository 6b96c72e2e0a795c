//! Output formatting for CLI results
//!
//! This module provides consistent output formatting across all CLI commands.
//! It supports three output formats:
//! - Table: Human-readable tables (default)
//! - JSON: Structured JSON for scripting and automation
//! - Quiet: Minimal output, exit codes only

use std::str::FromStr;

use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;

use crate::ExitCode;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for scripting
    Json,
    /// Minimal output - exit codes only
    Quiet,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Quiet => write!(f, "quiet"),
        }
    }
}

/// Standard JSON response wrapper for consistent schema
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    /// Whether the operation was successful
    pub success: bool,
    /// The response data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// ISO 8601 timestamp
    pub timestamp: String,
    /// Command that was executed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Exit code name (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<&'static str>,
}

impl<T: Serialize> JsonResponse<T> {
    /// Create a successful response with command context
    pub fn success_with_command(data: T, command: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: Some(command.to_string()),
            exit_code: None,
        }
    }
}

impl JsonResponse<()> {
    /// Create an error response carrying its exit code
    pub fn error_with_code(message: &str, code: ExitCode) -> JsonResponse<()> {
        JsonResponse {
            success: false,
            data: None,
            error: Some(message.to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: None,
            exit_code: Some(code.name()),
        }
    }
}

// ============================================================================
// Output payloads
// ============================================================================

/// State of the persisted channel for one wallet scope
#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    pub wallet: String,
    pub own_public_key: String,
    pub peer_public_key: Option<String>,
    pub secret_derivable: bool,
}

/// An outbound request ready to be opened
#[derive(Debug, Clone, Serialize)]
pub struct RequestUrl {
    pub request_id: String,
    pub method: String,
    pub url: String,
}

/// A decoded return deep link
#[derive(Debug, Clone, Serialize)]
pub struct DecodedReturn {
    pub id: String,
    pub request_id: String,
    pub sender: String,
    pub timestamp: String,
    /// "encrypted" or "failure"
    pub content: String,
    /// Decrypted payload, when the channel could open it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Wallet-reported error, for failure content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

/// Simple success message for JSON output
#[derive(Serialize)]
pub struct SuccessMessage {
    pub message: String,
}

impl SuccessMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============================================================================
// Formatter
// ============================================================================

/// Formats output for different modes
pub struct OutputFormatter {
    format: OutputFormat,
    verbose: bool,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    /// Get the current output format
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.format == OutputFormat::Quiet
    }

    /// Format channel state
    pub fn format_channel(&self, info: &ChannelInfo) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = property_table();
                table.add_row(vec!["Wallet", &info.wallet]);
                table.add_row(vec!["Own Public Key", &info.own_public_key]);
                table.add_row(vec![
                    "Peer Public Key",
                    info.peer_public_key.as_deref().unwrap_or("-"),
                ]);
                table.add_row(vec![
                    "Shared Secret",
                    if info.secret_derivable { "derivable" } else { "absent" },
                ]);
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(info, "channel show"),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format an outbound request URL
    pub fn format_request(&self, request: &RequestUrl, command: &str) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = property_table();
                table.add_row(vec!["Request ID", &request.request_id]);
                table.add_row(vec!["Method", &request.method]);
                table.add_row(vec!["URL", &request.url]);
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(request, command),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format a decoded return deep link
    pub fn format_return(&self, decoded: &DecodedReturn) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = property_table();
                table.add_row(vec!["ID", &decoded.id]);
                table.add_row(vec!["Request ID", &decoded.request_id]);
                table.add_row(vec!["Sender", &decoded.sender]);
                table.add_row(vec!["Timestamp", &decoded.timestamp]);
                table.add_row(vec!["Content", &decoded.content]);
                if let Some(payload) = &decoded.payload {
                    table.add_row(vec!["Payload".to_string(), pretty(payload)]);
                }
                if let Some(error) = &decoded.error {
                    table.add_row(vec!["Error".to_string(), pretty(error)]);
                }
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(decoded, "response decode"),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format a generic success result
    pub fn format_success<T: Serialize>(&self, data: &T, command: &str) -> String {
        match self.format {
            OutputFormat::Json => self.to_json_response(data, command),
            OutputFormat::Table | OutputFormat::Quiet => String::new(),
        }
    }

    /// Format error with exit code context
    pub fn format_error_with_code(&self, error: &str, code: ExitCode) -> String {
        match self.format {
            OutputFormat::Table => format!("Error: {error}"),
            OutputFormat::Json => to_json(&JsonResponse::error_with_code(error, code)),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format progress message (only shown in verbose mode)
    pub fn progress(&self, message: &str) {
        if self.verbose && self.format == OutputFormat::Table {
            eprintln!("... {message}");
        }
    }

    /// Format success message
    pub fn success(&self, message: &str) {
        if self.format == OutputFormat::Table {
            println!("✓ {message}");
        }
    }

    /// Format warning message
    pub fn warning(&self, message: &str) {
        if self.format == OutputFormat::Table {
            eprintln!("⚠ {message}");
        }
    }

    fn to_json_response<T: Serialize>(&self, value: &T, command: &str) -> String {
        to_json(&JsonResponse::success_with_command(value, command))
    }
}

fn property_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Property", "Value"]);
    table
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> ChannelInfo {
        ChannelInfo {
            wallet: "default".into(),
            own_public_key: "ab".repeat(32),
            peer_public_key: None,
            secret_derivable: false,
        }
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("table".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("quiet".parse::<OutputFormat>().unwrap(), OutputFormat::Quiet);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_channel_table() {
        let out = OutputFormatter::new(OutputFormat::Table, false).format_channel(&channel());
        assert!(out.contains("Own Public Key"));
        assert!(out.contains("absent"));
    }

    #[test]
    fn test_channel_json_schema() {
        let out = OutputFormatter::new(OutputFormat::Json, false).format_channel(&channel());
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["command"], "channel show");
        assert_eq!(value["data"]["wallet"], "default");
        assert!(value["data"]["peer_public_key"].is_null());
        assert!(value.get("exit_code").is_none());
    }

    #[test]
    fn test_quiet_prints_nothing() {
        let formatter = OutputFormatter::new(OutputFormat::Quiet, true);
        assert!(formatter.is_quiet());
        assert!(formatter.format_channel(&channel()).is_empty());
        assert!(formatter
            .format_error_with_code("boom", ExitCode::GeneralError)
            .is_empty());
    }

    #[test]
    fn test_error_json_carries_code() {
        let out = OutputFormatter::new(OutputFormat::Json, false)
            .format_error_with_code("no peer", ExitCode::NotConnected);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "no peer");
        assert_eq!(value["exit_code"], "NOT_CONNECTED");
    }

    #[test]
    fn test_return_table_includes_payload() {
        let decoded = DecodedReturn {
            id: "1".into(),
            request_id: "2".into(),
            sender: "cd".repeat(32),
            timestamp: "2024-01-01T00:00:00Z".into(),
            content: "encrypted".into(),
            payload: Some(serde_json::json!({ "result": { "value": "0x1" } })),
            error: None,
        };
        let out = OutputFormatter::new(OutputFormat::Table, false).format_return(&decoded);
        assert!(out.contains("Payload"));
        assert!(out.contains("0x1"));
    }
}
