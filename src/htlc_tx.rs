use bitcoin::locktime::absolute::LockTime;
use bitcoin::script::ScriptBuf;
use bitcoin::secp256k1::PublicKey;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, Sequence, Transaction, TxIn, TxOut, Witness};

use crate::error::Error;
use crate::keys::tweak::{derive_blinded_pubkey, derive_pubkey};
use crate::scripts::{offered_htlc_script, received_htlc_script};
use crate::types::{HtlcDirection, InFlightHtlc};

const HTLC_SUCCESS_WEIGHT: u64 = 703;
const HTLC_TIMEOUT_WEIGHT: u64 = 663;

pub fn htlc_tx_fee_msat(weight: u64, feerate_msat_per_kw: u64) -> u64 {
    ((weight * feerate_msat_per_kw) / 1000) * 1000
}

/// Basepoints of both channel sides, needed to re-derive the per-commitment
/// keys used inside a single second-stage HTLC transaction.
pub struct Bolt3Basepoints {
    pub this_side_delayed_basepoint: PublicKey,
    pub this_side_htlc_basepoint: PublicKey,
    pub other_side_revocation_basepoint: PublicKey,
    pub other_side_htlc_basepoint: PublicKey,
}

/// Keys derived from `pcp` (the per-commitment point of the commitment
/// being spent) for one second-stage HTLC transaction.
pub struct HtlcTxKeys {
    pub revocation_pubkey: PublicKey,
    pub delayed_pubkey: PublicKey,
    pub local_htlc_pubkey: PublicKey,
    pub remote_htlc_pubkey: PublicKey,
}

pub fn derive_htlc_tx_keys<C: bitcoin::secp256k1::Verification>(
    secp: &bitcoin::secp256k1::Secp256k1<C>,
    basepoints: &Bolt3Basepoints,
    pcp: &PublicKey,
) -> Result<HtlcTxKeys, Error> {
    Ok(HtlcTxKeys {
        revocation_pubkey: derive_blinded_pubkey(secp, &basepoints.other_side_revocation_basepoint, pcp)?,
        delayed_pubkey: derive_pubkey(secp, &basepoints.this_side_delayed_basepoint, pcp)?,
        local_htlc_pubkey: derive_pubkey(secp, &basepoints.this_side_htlc_basepoint, pcp)?,
        remote_htlc_pubkey: derive_pubkey(secp, &basepoints.other_side_htlc_basepoint, pcp)?,
    })
}

/// Whether spending this HTLC from the commitment being built follows the
/// preimage (success) or timeout path, given which side the output belongs
/// to (`for_us`) and whether the HTLC is incoming to that side
/// (`we_receive`): `is_success = (for_us == we_receive)`.
pub fn htlc_direction(for_us: bool, we_receive: bool) -> HtlcDirection {
    if for_us == we_receive {
        HtlcDirection::Received
    } else {
        HtlcDirection::Offered
    }
}

/// Build the second-stage HTLC transaction spending one commitment HTLC
/// output, per BOLT-03 `make_htlc_tx_with_open_channel`.
pub fn build_htlc_tx(
    htlc_outpoint: OutPoint,
    htlc: &InFlightHtlc,
    direction: HtlcDirection,
    keys: &HtlcTxKeys,
    to_self_delay: u16,
    feerate_msat_per_kw: u64,
) -> Result<(Transaction, ScriptBuf), Error> {
    let (weight, lock_time) = match direction {
        HtlcDirection::Received => (HTLC_SUCCESS_WEIGHT, LockTime::ZERO),
        HtlcDirection::Offered => (
            HTLC_TIMEOUT_WEIGHT,
            LockTime::from_consensus(htlc.cltv_expiry),
        ),
    };

    let fee_msat = htlc_tx_fee_msat(weight, feerate_msat_per_kw);
    let final_msat = htlc
        .amount_msat
        .checked_sub(fee_msat)
        .ok_or(Error::HtlcValueTooSmallForFee)?;
    let final_sat = final_msat / 1000;
    if final_sat == 0 {
        return Err(Error::HtlcValueTooSmallForFee);
    }

    // The script the HTLC-claiming transaction itself is spent by: the
    // spender must reveal the preimage on the success path, so the
    // received-HTLC script gates this output; the offered-HTLC script
    // gates the timeout-reclaim path.
    let witness_script = match direction {
        HtlcDirection::Received => received_htlc_script(
            &keys.revocation_pubkey,
            &keys.local_htlc_pubkey,
            &keys.remote_htlc_pubkey,
            &htlc.payment_hash,
            htlc.cltv_expiry,
        ),
        HtlcDirection::Offered => offered_htlc_script(
            &keys.revocation_pubkey,
            &keys.local_htlc_pubkey,
            &keys.remote_htlc_pubkey,
            &htlc.payment_hash,
        ),
    };

    let to_local_output_script =
        crate::scripts::to_local_script(&keys.revocation_pubkey, &keys.delayed_pubkey, to_self_delay);

    let tx = Transaction {
        version: Version::TWO,
        lock_time,
        input: vec![TxIn {
            previous_output: htlc_outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ZERO,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(final_sat),
            script_pubkey: to_local_output_script.to_p2wsh(),
        }],
    };

    Ok((tx, witness_script))
}

/// `[0, remote_sig, local_sig, payment_preimage, witness_script]`; the
/// leading `0` is the CHECKMULTISIG dummy-element workaround. `preimage`
/// is empty on the timeout path.
pub fn htlc_tx_witness(
    remote_sig: &[u8],
    local_sig: &[u8],
    preimage: &[u8],
    witness_script: &ScriptBuf,
) -> Witness {
    Witness::from_slice(&[&[][..], remote_sig, local_sig, preimage, witness_script.as_bytes()])
}

/// Mutual-close transaction: one input spending the funding outpoint at
/// max sequence, the caller-provided (already sorted/trimmed) outputs, no
/// fee math performed here.
pub fn build_closing_tx(funding_outpoint: OutPoint, outputs: Vec<TxOut>) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: funding_outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: outputs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::secp256k1::{Secp256k1, SecretKey};

    fn pubkey(byte: u8) -> PublicKey {
        let secp = Secp256k1::new();
        PublicKey::from_secret_key(&secp, &SecretKey::from_slice(&[byte; 32]).unwrap())
    }

    fn keys() -> HtlcTxKeys {
        HtlcTxKeys {
            revocation_pubkey: pubkey(1),
            delayed_pubkey: pubkey(2),
            local_htlc_pubkey: pubkey(3),
            remote_htlc_pubkey: pubkey(4),
        }
    }

    #[test]
    fn build_htlc_tx_success_path_has_zero_locktime() {
        let htlc = InFlightHtlc {
            amount_msat: 1_000_000,
            cltv_expiry: 500_000,
            payment_hash: [0x42; 32],
        };
        let (tx, _script) = build_htlc_tx(
            OutPoint::null(),
            &htlc,
            HtlcDirection::Received,
            &keys(),
            144,
            253,
        )
        .unwrap();
        assert_eq!(tx.lock_time, LockTime::ZERO);
        assert_eq!(tx.output.len(), 1);
        assert!(tx.output[0].value.to_sat() > 0);
    }

    #[test]
    fn build_htlc_tx_timeout_path_uses_cltv_expiry() {
        let htlc = InFlightHtlc {
            amount_msat: 1_000_000,
            cltv_expiry: 500_000,
            payment_hash: [0x42; 32],
        };
        let (tx, _script) = build_htlc_tx(
            OutPoint::null(),
            &htlc,
            HtlcDirection::Offered,
            &keys(),
            144,
            253,
        )
        .unwrap();
        assert_eq!(tx.lock_time, LockTime::from_consensus(500_000));
    }

    #[test]
    fn direction_selection_matches_for_us_we_receive_table() {
        assert_eq!(htlc_direction(true, true), HtlcDirection::Received);
        assert_eq!(htlc_direction(false, false), HtlcDirection::Received);
        assert_eq!(htlc_direction(true, false), HtlcDirection::Offered);
        assert_eq!(htlc_direction(false, true), HtlcDirection::Offered);
    }

    #[test]
    fn closing_tx_has_no_fee_math_and_max_sequence() {
        let outputs = vec![TxOut {
            value: Amount::from_sat(10_000),
            script_pubkey: ScriptBuf::new(),
        }];
        let tx = build_closing_tx(OutPoint::null(), outputs.clone());
        assert_eq!(tx.input[0].sequence, Sequence::MAX);
        assert_eq!(tx.output, outputs);
        assert_eq!(tx.lock_time, LockTime::ZERO);
    }
}
