//! # CLI Interface
//!
//! Command-line structure for `trust-ledger` using `clap` derive. Every
//! subcommand works against the sled database in `--data-dir`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Drive and inspect a multi-asset trust ledger stored on disk.
#[derive(Parser, Debug)]
#[command(
    name = "trust-ledger",
    about = "Multi-asset, peer-gated balance ledger",
    version,
    propagate_version = true
)]
pub struct TrustLedgerCli {
    /// Directory holding the ledger database. Created by `init`.
    #[arg(
        long,
        short = 'd',
        global = true,
        env = "TRUST_LEDGER_DATA_DIR",
        default_value = "./trust-ledger-data"
    )]
    pub data_dir: PathBuf,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, global = true, env = "TRUST_LEDGER_LOG", default_value = "info")]
    pub log_level: String,

    /// Log output format. Logs go to stderr.
    #[arg(long, global = true, env = "TRUST_LEDGER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an empty ledger admitting the given peers.
    Init(InitArgs),
    /// Replay a JSON script of operations against the stored ledger.
    Apply(ApplyArgs),
    /// Print a key's registered assets with their balances.
    Balances(BalancesArgs),
    /// Check the stored snapshot against every ledger invariant.
    Verify,
    /// Write the current snapshot to a file.
    Export(ExportArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Hex address of a peer (repeatable).
    #[arg(long = "peer", required = true, num_args = 1..)]
    pub peers: Vec<String>,

    /// Overwrite an existing ledger.
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct ApplyArgs {
    /// JSON file containing an array of operations.
    #[arg(long, short = 's')]
    pub script: PathBuf,

    /// Treat a move from a key to itself as a validated no-op.
    #[arg(long, env = "TRUST_LEDGER_ALLOW_SAME_KEY_MOVES")]
    pub allow_same_key_moves: bool,

    /// Print Prometheus metrics for the run to stdout afterwards.
    #[arg(long)]
    pub metrics: bool,
}

#[derive(Parser, Debug)]
pub struct BalancesArgs {
    /// Key to inspect.
    #[arg(long, short = 'k')]
    pub key: u64,
}

#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Output encoding.
    #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
    pub format: ExportFormat,

    /// Destination file.
    #[arg(long, short = 'o')]
    pub out: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    /// Pretty-printed JSON.
    Json,
    /// Version-prefixed bincode, as stored on disk.
    Bin,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        TrustLedgerCli::command().debug_assert();
    }

    #[test]
    fn init_accepts_repeated_peers() {
        let cli = TrustLedgerCli::try_parse_from([
            "trust-ledger",
            "init",
            "--peer",
            "0x0101010101010101010101010101010101010101",
            "--peer",
            "0x0202020202020202020202020202020202020202",
        ])
        .unwrap();
        match cli.command {
            Commands::Init(args) => assert_eq!(args.peers.len(), 2),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn export_format_parses() {
        let cli = TrustLedgerCli::try_parse_from([
            "trust-ledger",
            "--data-dir",
            "/tmp/x",
            "export",
            "--format",
            "bin",
            "--out",
            "state.bin",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/x"));
        match cli.command {
            Commands::Export(args) => assert_eq!(args.format, ExportFormat::Bin),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
