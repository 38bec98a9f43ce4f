//! Transaction signing glue: p2wsh sighash, 64-byte compact signatures, and
//! witness assembly for the commitment and second-stage HTLC transactions.

use bitcoin::hashes::Hash;
use bitcoin::script::ScriptBuf;
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, SecretKey, Signing, Verification};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Amount, Transaction, Witness};

use crate::error::Error;

/// Sign input `input_index` of `tx` against `script` (the p2wsh witness
/// script being satisfied) and return the signature's 64-byte compact
/// (r || s) form, stripped of DER framing and the sighash-type byte: the
/// wire form BOLT-03 signatures take.
pub fn sign_and_get_sig_string<C: Signing>(
    secp: &Secp256k1<C>,
    tx: &Transaction,
    input_index: usize,
    script: &ScriptBuf,
    amount_sat: u64,
    secret_key: &SecretKey,
) -> Result<[u8; 64], Error> {
    let mut cache = SighashCache::new(tx);
    let sighash = cache
        .p2wsh_signature_hash(input_index, script, Amount::from_sat(amount_sat), EcdsaSighashType::All)
        .map_err(|_| Error::InvalidTweak)?;
    let msg = Message::from_digest(sighash.to_byte_array());
    let sig = secp.sign_ecdsa(&msg, secret_key);
    Ok(sig.serialize_compact())
}

/// Verify a 64-byte compact signature against a p2wsh input.
pub fn verify_sig_string<C: Verification>(
    secp: &Secp256k1<C>,
    tx: &Transaction,
    input_index: usize,
    script: &ScriptBuf,
    amount_sat: u64,
    sig: &[u8; 64],
    pubkey: &PublicKey,
) -> Result<bool, Error> {
    let mut cache = SighashCache::new(tx);
    let sighash = cache
        .p2wsh_signature_hash(input_index, script, Amount::from_sat(amount_sat), EcdsaSighashType::All)
        .map_err(|_| Error::InvalidTweak)?;
    let msg = Message::from_digest(sighash.to_byte_array());
    let ecdsa_sig =
        bitcoin::secp256k1::ecdsa::Signature::from_compact(sig).map_err(|_| Error::InvalidTweak)?;
    Ok(secp.verify_ecdsa(&msg, &ecdsa_sig, pubkey).is_ok())
}

fn der_with_sighash_all(sig: &[u8; 64]) -> Result<Vec<u8>, Error> {
    let ecdsa_sig =
        bitcoin::secp256k1::ecdsa::Signature::from_compact(sig).map_err(|_| Error::InvalidTweak)?;
    let mut der = ecdsa_sig.serialize_der().to_vec();
    der.push(EcdsaSighashType::All as u8);
    Ok(der)
}

/// `[0, local_sig, remote_sig, funding_script]` — the funding-output
/// 2-of-2 CHECKMULTISIG witness, signatures ordered to match the funding
/// script's own pubkey ordering.
pub fn funding_witness(
    local_sig: &[u8; 64],
    remote_sig: &[u8; 64],
    local_pubkey_is_lesser: bool,
    funding_script: &ScriptBuf,
) -> Result<Witness, Error> {
    let local_der = der_with_sighash_all(local_sig)?;
    let remote_der = der_with_sighash_all(remote_sig)?;
    let (first, second) = if local_pubkey_is_lesser {
        (local_der, remote_der)
    } else {
        (remote_der, local_der)
    };
    Ok(Witness::from_slice(&[&[][..], &first, &second, funding_script.as_bytes()]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::locktime::absolute::LockTime;
    use bitcoin::script::Builder;
    use bitcoin::transaction::Version;
    use bitcoin::{OutPoint, Sequence, TxIn, TxOut};

    fn secp() -> Secp256k1<bitcoin::secp256k1::All> {
        Secp256k1::new()
    }

    fn key(byte: u8) -> SecretKey {
        SecretKey::from_slice(&[byte; 32]).unwrap()
    }

    fn dummy_tx() -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(100_000),
                script_pubkey: ScriptBuf::new(),
            }],
        }
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let secp = secp();
        let sk = key(5);
        let pk = PublicKey::from_secret_key(&secp, &sk);
        let script = Builder::new().push_opcode(bitcoin::blockdata::opcodes::all::OP_TRUE).into_script();
        let tx = dummy_tx();

        let sig = sign_and_get_sig_string(&secp, &tx, 0, &script, 200_000, &sk).unwrap();
        assert!(verify_sig_string(&secp, &tx, 0, &script, 200_000, &sig, &pk).unwrap());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let secp = secp();
        let sk = key(5);
        let other_pk = PublicKey::from_secret_key(&secp, &key(6));
        let script = Builder::new().push_opcode(bitcoin::blockdata::opcodes::all::OP_TRUE).into_script();
        let tx = dummy_tx();

        let sig = sign_and_get_sig_string(&secp, &tx, 0, &script, 200_000, &sk).unwrap();
        assert!(!verify_sig_string(&secp, &tx, 0, &script, 200_000, &sig, &other_pk).unwrap());
    }
}
