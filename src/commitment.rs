use bitcoin::hashes::sha256::Hash as Sha256;
use bitcoin::hashes::{Hash, HashEngine};
use bitcoin::locktime::absolute::LockTime;
use bitcoin::script::ScriptBuf;
use bitcoin::secp256k1::PublicKey;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, Sequence, Transaction, TxIn, TxOut};
use std::collections::BTreeMap;

use crate::error::Error;
use crate::scripts::{offered_htlc_script, received_htlc_script, to_local_script, to_remote_script};
use crate::types::HTLCOwner;

/// `CTN XOR mask`, `mask` being the low 48 bits of
/// `SHA256(funder_payment_basepoint || fundee_payment_basepoint)`. XOR is
/// its own inverse, so this function both obscures and un-obscures.
pub fn get_obscured_ctn(ctn: u64, funder_payment_basepoint: &PublicKey, fundee_payment_basepoint: &PublicKey) -> u64 {
    let mut engine = Sha256::engine();
    engine.input(&funder_payment_basepoint.serialize());
    engine.input(&fundee_payment_basepoint.serialize());
    let digest = Sha256::from_engine(engine).to_byte_array();
    let mut mask = [0u8; 8];
    mask[2..].copy_from_slice(&digest[26..32]);
    ctn ^ u64::from_be_bytes(mask)
}

/// Split an obscured commitment number across `locktime`/`sequence` per
/// BOLT-03, applied to the single funding input.
pub fn set_obscured_commitment_number(
    tx: &mut Transaction,
    ctn: u64,
    funder_payment_basepoint: &PublicKey,
    fundee_payment_basepoint: &PublicKey,
) {
    let obs = get_obscured_ctn(ctn, funder_payment_basepoint, fundee_payment_basepoint);
    tx.lock_time = LockTime::from_consensus(0x2000_0000 | (obs as u32 & 0x00FF_FFFF));
    tx.input[0].sequence = Sequence(0x8000_0000 | ((obs >> 24) as u32));
}

/// Inverse of [`set_obscured_commitment_number`]: recover the commitment
/// number from a confirmed (or locally built) transaction.
pub fn extract_ctn_from_tx(
    tx: &Transaction,
    input_index: usize,
    funder_payment_basepoint: &PublicKey,
    fundee_payment_basepoint: &PublicKey,
) -> u64 {
    let locktime: u32 = tx.lock_time.to_consensus_u32();
    let sequence: u32 = tx.input[input_index].sequence.0;
    let obs = (((sequence & 0x00FF_FFFF) as u64) << 24) | ((locktime & 0x00FF_FFFF) as u64);
    get_obscured_ctn(obs, funder_payment_basepoint, fundee_payment_basepoint)
}

/// `⌊(500 + 172*num_htlcs + 224) * feerate / 1000⌋ * 1000`, in msat.
pub fn onchain_fee_msat(num_htlcs: usize, feerate_msat_per_kw: u64) -> u64 {
    let weight = 500 + 172 * num_htlcs as u64 + 224;
    ((weight * feerate_msat_per_kw) / 1000) * 1000
}

/// A not-yet-sorted commitment output together with the metadata needed
/// to place it in the HTLC output-index map.
#[derive(Clone, Debug)]
pub struct PendingOutput {
    pub value_sat: u64,
    pub script_pubkey: ScriptBuf,
    pub payment_hash: Option<[u8; 32]>,
    pub cltv_expiry: Option<u32>,
}

/// Parameters for one HTLC destined for the commitment transaction.
#[derive(Clone, Debug)]
pub struct CommitmentHtlc {
    pub owner: HTLCOwner,
    pub amount_msat: u64,
    pub payment_hash: [u8; 32],
    pub cltv_expiry: u32,
}

/// Drop any output below the dust limit, preserving the relative order of
/// the remaining outputs (to_local/to_remote first, then HTLCs in the
/// caller-provided order). Commitment-transaction bytes are consensus-
/// observable and must match between peers byte-for-byte, so this list is
/// never reordered after assembly — no BIP69-style sort.
fn trim_dust(outputs: Vec<PendingOutput>, dust_limit_sat: u64) -> Vec<PendingOutput> {
    outputs
        .into_iter()
        .filter(|o| o.value_sat >= dust_limit_sat)
        .collect()
}

/// The set of public keys needed to build one side's commitment
/// transaction, already tweaked for the specific per-commitment point.
#[derive(Clone, Debug)]
pub struct CommitmentKeys {
    pub per_commitment_point: PublicKey,
    pub revocation_pubkey: PublicKey,
    pub local_delayed_pubkey: PublicKey,
    pub local_htlc_pubkey: PublicKey,
    pub remote_htlc_pubkey: PublicKey,
}

/// Fully assembled commitment transaction together with the output-index
/// map the channel state machine needs to sign/rebuild HTLC transactions.
#[derive(Clone, Debug)]
pub struct BuiltCommitment {
    pub tx: Transaction,
    pub htlc_output_index: BTreeMap<[u8; 32], usize>,
}

/// Assemble the full commitment transaction: to_local/to_remote outputs,
/// HTLC outputs (caller order preserved), dust trimming, and obscured-CTN
/// locktime.
#[allow(clippy::too_many_arguments)]
pub fn build_commitment_transaction(
    funding_outpoint: OutPoint,
    funding_sat: u64,
    is_initiator: bool,
    to_local_value_msat: u64,
    to_remote_value_msat: u64,
    keys: &CommitmentKeys,
    remote_payment_pubkey: &PublicKey,
    to_self_delay: u16,
    dust_limit_sat: u64,
    feerate_msat_per_kw: u64,
    htlcs: &[CommitmentHtlc],
    ctn: u64,
    funder_payment_basepoint: &PublicKey,
    fundee_payment_basepoint: &PublicKey,
) -> Result<BuiltCommitment, Error> {
    let mut seen_hashes = std::collections::HashSet::new();
    for htlc in htlcs {
        if !seen_hashes.insert(htlc.payment_hash) {
            return Err(Error::DuplicatePaymentHash);
        }
    }

    let fee_msat = onchain_fee_msat(htlcs.len(), feerate_msat_per_kw);
    let (local_fee_msat, remote_fee_msat) = if is_initiator {
        (fee_msat, 0)
    } else {
        (0, fee_msat)
    };

    let mut outputs = Vec::new();

    let to_local_sat = to_local_value_msat.saturating_sub(local_fee_msat) / 1000;
    if to_local_sat > 0 {
        outputs.push(PendingOutput {
            value_sat: to_local_sat,
            script_pubkey: to_local_script(&keys.revocation_pubkey, &keys.local_delayed_pubkey, to_self_delay)
                .to_p2wsh(),
            payment_hash: None,
            cltv_expiry: None,
        });
    }

    let to_remote_sat = to_remote_value_msat.saturating_sub(remote_fee_msat) / 1000;
    if to_remote_sat > 0 {
        outputs.push(PendingOutput {
            value_sat: to_remote_sat,
            script_pubkey: to_remote_script(remote_payment_pubkey),
            payment_hash: None,
            cltv_expiry: None,
        });
    }

    for htlc in htlcs {
        let script = match htlc.owner {
            HTLCOwner::Local => offered_htlc_script(
                &keys.revocation_pubkey,
                &keys.local_htlc_pubkey,
                &keys.remote_htlc_pubkey,
                &htlc.payment_hash,
            ),
            HTLCOwner::Remote => received_htlc_script(
                &keys.revocation_pubkey,
                &keys.local_htlc_pubkey,
                &keys.remote_htlc_pubkey,
                &htlc.payment_hash,
                htlc.cltv_expiry,
            ),
        };
        outputs.push(PendingOutput {
            value_sat: htlc.amount_msat / 1000,
            script_pubkey: script.to_p2wsh(),
            payment_hash: Some(htlc.payment_hash),
            cltv_expiry: Some(htlc.cltv_expiry),
        });
    }

    let outputs = trim_dust(outputs, dust_limit_sat);

    // Invariant: sum(outputs.value) <= funding_sat. Guaranteed by the fee
    // and dust arithmetic above, not reachable from peer-supplied input.
    let total_value: u64 = outputs.iter().map(|o| o.value_sat).sum();
    debug_assert!(total_value <= funding_sat);

    let mut htlc_output_index = BTreeMap::new();
    let tx_outputs: Vec<TxOut> = outputs
        .iter()
        .enumerate()
        .map(|(idx, o)| {
            if let Some(hash) = o.payment_hash {
                htlc_output_index.insert(hash, idx);
            }
            TxOut {
                value: Amount::from_sat(o.value_sat),
                script_pubkey: o.script_pubkey.clone(),
            }
        })
        .collect();

    let mut tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: funding_outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: bitcoin::Witness::new(),
        }],
        output: tx_outputs,
    };

    set_obscured_commitment_number(&mut tx, ctn, funder_payment_basepoint, fundee_payment_basepoint);

    Ok(BuiltCommitment { tx, htlc_output_index })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pubkey(byte: u8) -> PublicKey {
        use bitcoin::secp256k1::{Secp256k1, SecretKey};
        let secp = Secp256k1::new();
        PublicKey::from_secret_key(&secp, &SecretKey::from_slice(&[byte; 32]).unwrap())
    }

    // P2: obscured-CTN roundtrip.
    #[test]
    fn obscured_ctn_roundtrip() {
        let f = test_pubkey(2);
        let g = test_pubkey(3);
        let ctn = 1234u64;
        let obs = get_obscured_ctn(ctn, &f, &g);
        assert_eq!(get_obscured_ctn(obs, &f, &g), ctn);
    }

    // Scenario 3: ctn=42; locktime/sequence high bytes are fixed by the
    // 0x20000000 / 0x80000000 masks regardless of which basepoints are
    // hashed in, since only the low 3 bytes of each carry the obscured
    // value.
    #[test]
    fn obscured_ctn_locktime_sequence_bytes() {
        let funder_pb = test_pubkey(2);
        let fundee_pb = test_pubkey(3);

        let mut tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: bitcoin::Witness::new(),
            }],
            output: vec![],
        };

        set_obscured_commitment_number(&mut tx, 42, &funder_pb, &fundee_pb);

        let locktime_bytes = tx.lock_time.to_consensus_u32().to_be_bytes();
        assert_eq!(locktime_bytes[0], 0x20);
        let sequence_bytes = tx.input[0].sequence.0.to_be_bytes();
        assert_eq!(sequence_bytes[0], 0x80);

        let recovered = extract_ctn_from_tx(&tx, 0, &funder_pb, &fundee_pb);
        assert_eq!(recovered, 42);
    }

    #[test]
    fn duplicate_payment_hash_rejected() {
        let keys = CommitmentKeys {
            per_commitment_point: test_pubkey(10),
            revocation_pubkey: test_pubkey(11),
            local_delayed_pubkey: test_pubkey(12),
            local_htlc_pubkey: test_pubkey(13),
            remote_htlc_pubkey: test_pubkey(14),
        };
        let htlc = CommitmentHtlc {
            owner: HTLCOwner::Local,
            amount_msat: 100_000,
            payment_hash: [0x55; 32],
            cltv_expiry: 500,
        };
        let result = build_commitment_transaction(
            OutPoint::null(),
            2_000_000,
            true,
            500_000_000,
            500_000_000,
            &keys,
            &test_pubkey(15),
            144,
            546,
            253,
            &[htlc.clone(), htlc],
            42,
            &test_pubkey(20),
            &test_pubkey(21),
        );
        assert_eq!(result.unwrap_err(), Error::DuplicatePaymentHash);
    }

    // P8/P9: dust trim and conservation.
    #[test]
    fn dust_trim_and_conservation() {
        let keys = CommitmentKeys {
            per_commitment_point: test_pubkey(10),
            revocation_pubkey: test_pubkey(11),
            local_delayed_pubkey: test_pubkey(12),
            local_htlc_pubkey: test_pubkey(13),
            remote_htlc_pubkey: test_pubkey(14),
        };
        let dust_htlc = CommitmentHtlc {
            owner: HTLCOwner::Local,
            amount_msat: 100_000,
            payment_hash: [0x11; 32],
            cltv_expiry: 500,
        };
        let built = build_commitment_transaction(
            OutPoint::null(),
            300_000,
            true,
            100_000_000,
            100_000_000,
            &keys,
            &test_pubkey(15),
            144,
            5_000,
            253,
            &[dust_htlc],
            42,
            &test_pubkey(20),
            &test_pubkey(21),
        )
        .unwrap();

        for out in &built.tx.output {
            assert!(out.value.to_sat() >= 5_000);
        }
        let total: u64 = built.tx.output.iter().map(|o| o.value.to_sat()).sum();
        assert!(total <= 200_000);
    }
}
