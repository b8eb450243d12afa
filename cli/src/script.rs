//! # Operation Scripts
//!
//! `apply` reads a JSON array of operations, each naming its initiator:
//!
//! ```json
//! [
//!   { "op": "deposit",    "initiator": "0x01..01", "key": 0, "asset": "ether", "amount": "5" },
//!   { "op": "withdrawal", "initiator": "0x01..01", "key": 0, "asset": "ether", "amount": "2",
//!     "beneficiary": "0xbb..bb" },
//!   { "op": "move",       "initiator": "0x01..01", "source_key": 0, "dest_key": 1,
//!     "asset": "ether", "amount": "0x1" }
//! ]
//! ```
//!
//! Assets are short labels or 64 hex digits. Amounts are decimal strings, or
//! hex with a `0x` prefix, so values beyond `u64` stay exact.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use trust_ledger::{Address, Amount, AssetId, KeyId, Ledger, LedgerEvent};

/// One scripted ledger call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum ScriptOp {
    Deposit {
        initiator: Address,
        key: KeyId,
        asset: String,
        amount: String,
        #[serde(default)]
        beneficiary: Option<Address>,
    },
    Withdrawal {
        initiator: Address,
        key: KeyId,
        asset: String,
        amount: String,
        #[serde(default)]
        beneficiary: Option<Address>,
    },
    Move {
        initiator: Address,
        source_key: KeyId,
        dest_key: KeyId,
        asset: String,
        amount: String,
    },
}

impl ScriptOp {
    /// Runs the operation and returns the event it emitted.
    pub fn apply(&self, ledger: &Ledger) -> Result<LedgerEvent> {
        let event: LedgerEvent = match self {
            ScriptOp::Deposit {
                initiator,
                key,
                asset,
                amount,
                beneficiary,
            } => ledger
                .deposit_for(
                    initiator,
                    beneficiary.as_ref().unwrap_or(initiator),
                    *key,
                    parse_asset(asset)?,
                    parse_amount(amount)?,
                )?
                .into(),
            ScriptOp::Withdrawal {
                initiator,
                key,
                asset,
                amount,
                beneficiary,
            } => ledger
                .withdrawal_to(
                    initiator,
                    beneficiary.as_ref().unwrap_or(initiator),
                    *key,
                    parse_asset(asset)?,
                    parse_amount(amount)?,
                )?
                .into(),
            ScriptOp::Move {
                initiator,
                source_key,
                dest_key,
                asset,
                amount,
            } => ledger
                .move_between(
                    initiator,
                    *source_key,
                    *dest_key,
                    parse_asset(asset)?,
                    parse_amount(amount)?,
                )?
                .into(),
        };
        Ok(event)
    }
}

/// Parses a script document.
pub fn parse_script(json: &str) -> Result<Vec<ScriptOp>> {
    serde_json::from_str(json).context("script must be a JSON array of operations")
}

fn parse_asset(s: &str) -> Result<AssetId> {
    s.parse::<AssetId>()
        .with_context(|| format!("invalid asset identifier {s:?}"))
}

fn parse_amount(s: &str) -> Result<Amount> {
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => Amount::from_str_radix(hex, 16).map_err(|e| anyhow!("{e:?}")),
        None => Amount::from_dec_str(s).map_err(|e| anyhow!("{e:?}")),
    };
    parsed.with_context(|| format!("invalid amount {s:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use trust_ledger::PeerSet;

    const PEER: &str = "0x0101010101010101010101010101010101010101";

    #[test]
    fn parses_all_operation_kinds() {
        let json = format!(
            r#"[
                {{"op":"deposit","initiator":"{PEER}","key":0,"asset":"ether","amount":"5"}},
                {{"op":"withdrawal","initiator":"{PEER}","key":0,"asset":"ether","amount":"2"}},
                {{"op":"move","initiator":"{PEER}","source_key":0,"dest_key":1,"asset":"ether","amount":"0x1"}}
            ]"#
        );
        let ops = parse_script(&json).unwrap();
        assert_eq!(ops.len(), 3);
        assert!(matches!(ops[2], ScriptOp::Move { dest_key: KeyId(1), .. }));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let json = format!(
            r#"[{{"op":"deposit","initiator":"{PEER}","key":0,"asset":"ether","amount":"5","memo":"x"}}]"#
        );
        assert!(parse_script(&json).is_err());
    }

    #[test]
    fn amounts_beyond_u64_are_exact() {
        let big = parse_amount("340282366920938463463374607431768211456").unwrap();
        assert_eq!(big, Amount::from(u128::MAX) + Amount::one());
        assert_eq!(parse_amount("0xff").unwrap(), Amount::from(255u64));
        assert!(parse_amount("-1").is_err());
        assert!(parse_amount("0xzz").is_err());
    }

    #[test]
    fn applies_against_a_ledger() {
        let peer: Address = PEER.parse().unwrap();
        let ledger = Ledger::with_peers([peer]);
        let json = format!(
            r#"[
                {{"op":"deposit","initiator":"{PEER}","key":0,"asset":"ether","amount":"5"}},
                {{"op":"move","initiator":"{PEER}","source_key":0,"dest_key":1,"asset":"ether","amount":"2"}}
            ]"#
        );
        let events: Vec<LedgerEvent> = parse_script(&json)
            .unwrap()
            .iter()
            .map(|op| op.apply(&ledger).unwrap())
            .collect();

        assert_eq!(events[0].kind(), "deposit");
        assert_eq!(events[1].kind(), "move");
        let ether = AssetId::from_label("ether").unwrap();
        assert_eq!(ledger.balance_of(KeyId(1), &ether), Amount::from(2u64));
    }

    #[test]
    fn ledger_errors_surface() {
        let ledger = Ledger::new(Arc::new(PeerSet::new()));
        let op = ScriptOp::Deposit {
            initiator: PEER.parse().unwrap(),
            key: KeyId(0),
            asset: "ether".into(),
            amount: "1".into(),
            beneficiary: None,
        };
        let err = op.apply(&ledger).unwrap_err();
        assert!(err.to_string().contains("not an authorized peer"));
    }
}
