//! wlink CLI - operator tool for a dapp-to-wallet channel
//!
//! This crate provides a command-line interface for:
//! - Inspecting, seeding and resetting the persisted channel keys
//! - Building outbound handshake and sealed request URLs
//! - Decoding (and decrypting) return deep links

pub mod cli;
pub mod config;
pub mod output;

pub use cli::Cli;
pub use config::{CliOverrides, Config};
pub use output::{JsonResponse, OutputFormat, OutputFormatter, SuccessMessage};

/// Exit codes for CLI operations
///
/// Exit codes provide machine-readable status for scripting and automation:
/// - 0: Success - operation completed successfully
/// - 1: General error - unspecified error occurred
/// - 5: Invalid input - bad arguments or data provided
/// - 6: Not connected - no peer key, so nothing can be sealed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Operation completed successfully (exit code 0)
    Success = 0,
    /// General error (exit code 1)
    GeneralError = 1,
    /// Invalid input provided (exit code 5)
    InvalidInput = 5,
    /// Channel has no peer (exit code 6)
    NotConnected = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    /// Get the exit code name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::InvalidInput => "INVALID_INPUT",
            ExitCode::NotConnected => "NOT_CONNECTED",
        }
    }

    /// Get a human-readable description of the exit code
    pub fn description(&self) -> &'static str {
        match self {
            ExitCode::Success => "Operation completed successfully",
            ExitCode::GeneralError => "An unspecified error occurred",
            ExitCode::InvalidInput => "Invalid arguments or data provided",
            ExitCode::NotConnected => "No peer key stored for this wallet",
        }
    }
}

#[cfg(test)]
mod exit_code_tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success as i32, 0);
        assert_eq!(ExitCode::GeneralError as i32, 1);
        assert_eq!(ExitCode::InvalidInput as i32, 5);
        assert_eq!(ExitCode::NotConnected as i32, 6);
        assert_eq!(i32::from(ExitCode::NotConnected), 6);
    }

    #[test]
    fn test_exit_code_names() {
        assert_eq!(ExitCode::Success.name(), "SUCCESS");
        assert_eq!(ExitCode::GeneralError.name(), "GENERAL_ERROR");
        assert_eq!(ExitCode::InvalidInput.name(), "INVALID_INPUT");
        assert_eq!(ExitCode::NotConnected.name(), "NOT_CONNECTED");
    }

    #[test]
    fn test_exit_code_descriptions() {
        for code in [
            ExitCode::Success,
            ExitCode::GeneralError,
            ExitCode::InvalidInput,
            ExitCode::NotConnected,
        ] {
            assert!(!code.description().is_empty());
            let _ = code.to_exit_code();
        }
    }
}
