//! # Trust Ledger CLI
//!
//! Entry point for the `trust-ledger` binary. Parses arguments, sets up
//! logging, and runs one subcommand against the sled database in the data
//! directory:
//!
//! - `init`: create an empty ledger with its peers
//! - `apply`: replay a JSON operation script, printing one event per line
//! - `balances`: show a key's registered assets and balances
//! - `verify`: check the stored snapshot's invariants and digest
//! - `export`: write the snapshot as JSON or bincode
//! - `version`: print build and layout versions

mod cli;
mod logging;
mod script;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use trust_ledger::config::LAYOUT_VERSION;
use trust_ledger::{
    Address, Amount, AssetId, KeyId, Ledger, LedgerConfig, LedgerDb, LedgerMetrics, RecordingSink,
    SameKeyMoves,
};

use cli::{Commands, ExportFormat, TrustLedgerCli};

fn main() -> Result<()> {
    let cli = TrustLedgerCli::parse();
    logging::init_logging(&cli.log_level, cli.log_format);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let data_dir = cli.data_dir.as_path();

    match cli.command {
        Commands::Init(args) => init_ledger(data_dir, args, &mut out),
        Commands::Apply(args) => apply_script(data_dir, args, &mut out),
        Commands::Balances(args) => print_balances(data_dir, args, &mut out),
        Commands::Verify => verify_ledger(data_dir, &mut out),
        Commands::Export(args) => export_snapshot(data_dir, args),
        Commands::Version => print_version(&mut out),
    }
}

fn open_db(data_dir: &Path) -> Result<LedgerDb> {
    LedgerDb::open(data_dir)
        .with_context(|| format!("failed to open ledger database at {}", data_dir.display()))
}

/// Opens the database and rebuilds the ledger from its latest snapshot.
fn load_ledger(data_dir: &Path, config: LedgerConfig) -> Result<(LedgerDb, Ledger)> {
    let db = open_db(data_dir)?;
    let snapshot = db
        .load_required()
        .with_context(|| format!("no ledger in {}; run `init` first", data_dir.display()))?;
    let ledger = Ledger::restore(snapshot, config).context("stored snapshot failed verification")?;
    Ok((db, ledger))
}

/// Creates a fresh ledger admitting `args.peers`.
fn init_ledger(data_dir: &Path, args: cli::InitArgs, out: &mut impl Write) -> Result<()> {
    let peers = args
        .peers
        .iter()
        .map(|p| p.parse::<Address>().with_context(|| format!("invalid peer address {p:?}")))
        .collect::<Result<Vec<_>>>()?;

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
    let db = open_db(data_dir)?;
    if db.is_initialized()? && !args.force {
        bail!(
            "a ledger already exists in {}; pass --force to replace it",
            data_dir.display()
        );
    }

    let ledger = Ledger::with_peers(peers.iter().copied());
    let revision = db.save(&ledger.snapshot())?;
    tracing::info!(data_dir = %data_dir.display(), peers = peers.len(), revision, "ledger initialized");

    writeln!(out, "initialized ledger with {} peer(s)", peers.len())?;
    Ok(())
}

/// Replays a script. Everything before the first failing operation is
/// persisted; the failure is returned after saving.
fn apply_script(data_dir: &Path, args: cli::ApplyArgs, out: &mut impl Write) -> Result<()> {
    let json = std::fs::read_to_string(&args.script)
        .with_context(|| format!("failed to read script {}", args.script.display()))?;
    let ops = script::parse_script(&json)?;

    let same_key_moves = if args.allow_same_key_moves {
        SameKeyMoves::AllowNoop
    } else {
        SameKeyMoves::Reject
    };
    let config = LedgerConfig::default().with_same_key_moves(same_key_moves);
    let (db, ledger) = load_ledger(data_dir, config)?;

    let metrics = LedgerMetrics::new().context("failed to register metrics")?;
    let sink = Arc::new(RecordingSink::new());
    let ledger = ledger.with_sink(sink.clone()).with_metrics(metrics.clone());

    let mut failure = None;
    for (index, op) in ops.iter().enumerate() {
        if let Err(err) = op.apply(&ledger) {
            failure = Some(err.context(format!("operation #{index} failed")));
            break;
        }
    }

    // Events come from the sink so the output reflects exactly what committed.
    let events = sink.drain();
    for event in &events {
        writeln!(out, "{}", serde_json::to_string(event)?)?;
    }

    let revision = db.save(&ledger.snapshot())?;
    tracing::info!(applied = events.len(), total = ops.len(), revision, "script applied");

    if args.metrics {
        write!(out, "{}", metrics.encode()?)?;
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[derive(Serialize)]
struct BalanceRow {
    asset: String,
    balance: String,
}

#[derive(Serialize)]
struct KeyReport {
    key: KeyId,
    assets: Vec<BalanceRow>,
}

fn print_balances(data_dir: &Path, args: cli::BalancesArgs, out: &mut impl Write) -> Result<()> {
    let (_, ledger) = load_ledger(data_dir, LedgerConfig::default())?;
    let key = KeyId(args.key);

    let assets: Vec<AssetId> = ledger.assets_of(key);
    let balances: Vec<Amount> = ledger.balances_of(key, &assets);
    let report = KeyReport {
        key,
        assets: assets
            .iter()
            .zip(balances)
            .map(|(asset, balance)| BalanceRow {
                asset: asset.to_string(),
                balance: balance.to_string(),
            })
            .collect(),
    };

    writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
    Ok(())
}

fn verify_ledger(data_dir: &Path, out: &mut impl Write) -> Result<()> {
    let db = open_db(data_dir)?;
    let snapshot = db.load_required()?;
    snapshot.verify().context("snapshot invariants violated")?;

    let digest = snapshot.digest()?;
    match db.stored_digest()? {
        Some(stored) if stored == digest => {}
        Some(stored) => bail!(
            "digest mismatch: stored {}, computed {}",
            hex::encode(stored),
            hex::encode(digest)
        ),
        None => bail!("no digest recorded for the stored snapshot"),
    }

    writeln!(
        out,
        "ok: revision {}, {} balance(s), {} asset(s), digest {}",
        db.revision()?,
        snapshot.entries.len(),
        snapshot.global_registry.len(),
        hex::encode(digest)
    )?;
    Ok(())
}

fn export_snapshot(data_dir: &Path, args: cli::ExportArgs) -> Result<()> {
    let snapshot = open_db(data_dir)?.load_required()?;
    let bytes = match args.format {
        ExportFormat::Json => snapshot.to_json()?.into_bytes(),
        ExportFormat::Bin => snapshot.to_bytes()?,
    };
    std::fs::write(&args.out, &bytes)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    tracing::info!(out = %args.out.display(), bytes = bytes.len(), "snapshot exported");
    Ok(())
}

fn print_version(out: &mut impl Write) -> Result<()> {
    writeln!(out, "trust-ledger {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "snapshot layout: v{LAYOUT_VERSION}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trust_ledger::LedgerSnapshot;

    const PEER: &str = "0x0101010101010101010101010101010101010101";

    fn init(dir: &Path) {
        let args = cli::InitArgs {
            peers: vec![PEER.to_string()],
            force: false,
        };
        init_ledger(dir, args, &mut Vec::new()).unwrap();
    }

    fn write_script(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("script.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn apply(dir: &Path, script: std::path::PathBuf, metrics: bool) -> (Result<()>, String) {
        let args = cli::ApplyArgs {
            script,
            allow_same_key_moves: false,
            metrics,
        };
        let mut out = Vec::new();
        let result = apply_script(&dir.join("db"), args, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn init_refuses_to_clobber() {
        let dir = tempfile::tempdir().unwrap();
        let db_dir = dir.path().join("db");
        init(&db_dir);

        let again = cli::InitArgs {
            peers: vec![PEER.to_string()],
            force: false,
        };
        assert!(init_ledger(&db_dir, again, &mut Vec::new()).is_err());
    }

    #[test]
    fn apply_prints_events_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        init(&dir.path().join("db"));
        let script = write_script(
            dir.path(),
            &format!(
                r#"[
                    {{"op":"deposit","initiator":"{PEER}","key":0,"asset":"ether","amount":"3"}},
                    {{"op":"move","initiator":"{PEER}","source_key":0,"dest_key":1,"asset":"ether","amount":"1"}}
                ]"#
            ),
        );

        let (result, output) = apply(dir.path(), script, true);
        result.unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert!(lines[0].contains("\"type\":\"deposited\""));
        assert!(lines[1].contains("\"type\":\"moved\""));
        assert!(output.contains("trust_ledger_operations_total"));

        let mut report = Vec::new();
        print_balances(&dir.path().join("db"), cli::BalancesArgs { key: 1 }, &mut report).unwrap();
        let report: serde_json::Value = serde_json::from_slice(&report).unwrap();
        assert_eq!(report["assets"][0]["asset"], "ether");
        assert_eq!(report["assets"][0]["balance"], "1");
    }

    #[test]
    fn apply_keeps_work_before_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        init(&dir.path().join("db"));
        let script = write_script(
            dir.path(),
            &format!(
                r#"[
                    {{"op":"deposit","initiator":"{PEER}","key":0,"asset":"ether","amount":"3"}},
                    {{"op":"withdrawal","initiator":"{PEER}","key":0,"asset":"ether","amount":"9"}},
                    {{"op":"deposit","initiator":"{PEER}","key":0,"asset":"ether","amount":"100"}}
                ]"#
            ),
        );

        let (result, output) = apply(dir.path(), script, false);
        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("operation #1 failed"));
        assert_eq!(output.lines().count(), 1);

        let snapshot: LedgerSnapshot = LedgerDb::open(dir.path().join("db"))
            .unwrap()
            .load_required()
            .unwrap();
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].amount, Amount::from(3u64));
    }

    #[test]
    fn verify_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let db_dir = dir.path().join("db");
        init(&db_dir);

        let mut out = Vec::new();
        verify_ledger(&db_dir, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("ok: revision 1"));

        let json_path = dir.path().join("state.json");
        export_snapshot(
            &db_dir,
            cli::ExportArgs {
                format: ExportFormat::Json,
                out: json_path.clone(),
            },
        )
        .unwrap();
        let exported =
            LedgerSnapshot::from_json(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(exported.peers, vec![PEER.parse::<Address>().unwrap()]);

        let bin_path = dir.path().join("state.bin");
        export_snapshot(
            &db_dir,
            cli::ExportArgs {
                format: ExportFormat::Bin,
                out: bin_path.clone(),
            },
        )
        .unwrap();
        let bytes = std::fs::read(&bin_path).unwrap();
        assert_eq!(LedgerSnapshot::from_bytes(&bytes).unwrap(), exported);
    }

    #[test]
    fn commands_need_an_initialized_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let err = print_balances(dir.path(), cli::BalancesArgs { key: 0 }, &mut Vec::new())
            .unwrap_err();
        assert!(format!("{err:#}").contains("run `init` first"));
    }
}
