//! Integration tests for CLI argument handling
//!
//! Tests the --bind, --config and --log-level flags from the command line.

use std::process::Command;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_readings-proxy"))
        .args(args)
        .output()
        .expect("Failed to execute readings-proxy")
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(
        output.status.success(),
        "Expected --help to exit successfully"
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("readings-proxy"), "Help should mention readings-proxy");
    assert!(stdout.contains("--bind"), "Help should mention --bind flag");
    assert!(stdout.contains("--config"), "Help should mention --config flag");
}

#[test]
fn test_invalid_bind_prints_error_and_exits() {
    let output = run_cli(&["--bind", "not-an-address"]);
    assert!(!output.status.success(), "Expected invalid bind to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Invalid bind address"),
        "Should print error message about invalid bind: {}",
        stderr
    );
}

#[test]
fn test_missing_config_file_exits_with_error() {
    let temp_dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let missing = temp_dir.path().join("absent.toml");
    let output = run_cli(&["--config", missing.to_str().unwrap(), "--bind", "127.0.0.1:0"]);
    assert!(!output.status.success(), "Expected missing config to fail");
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use clap::Parser;
    use readings_proxy::cli::{parse_bind_arg, Cli, StartupConfig};

    #[test]
    fn test_cli_no_args_has_no_overrides() {
        let cli = Cli::parse_from(["readings-proxy"]);
        assert!(cli.bind.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(["readings-proxy", "-c", "proxy.toml", "-b", "127.0.0.1:8081"]);
        assert_eq!(cli.config.unwrap().to_str(), Some("proxy.toml"));
        assert_eq!(cli.bind.as_deref(), Some("127.0.0.1:8081"));
    }

    #[test]
    fn test_parse_bind_arg_accepts_ipv6() {
        let addr = parse_bind_arg("[::1]:8080").unwrap();
        assert!(addr.is_ipv6());
    }

    #[test]
    fn test_startup_config_from_cli_log_level() {
        let cli = Cli::parse_from(["readings-proxy", "--log-level", "debug"]);
        let config = StartupConfig::from_cli(&cli).unwrap();
        assert_eq!(config.log_level, "debug");
        assert!(config.bind.is_none());
    }

    #[test]
    fn test_startup_config_from_cli_invalid_bind() {
        let cli = Cli::parse_from(["readings-proxy", "--bind", "8080"]);
        assert!(StartupConfig::from_cli(&cli).is_err());
    }
}
