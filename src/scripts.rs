use bitcoin::blockdata::opcodes::all as opcodes;
use bitcoin::hashes::hash160::Hash as Hash160;
use bitcoin::hashes::ripemd160::Hash as Ripemd160;
use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, ScriptBuf};
use bitcoin::secp256k1::PublicKey;

/// 2-of-2 multisig funding script, pubkeys sorted lexicographically on
/// their compressed serialization per BOLT-03.
pub fn funding_script(pubkey_a: &PublicKey, pubkey_b: &PublicKey) -> ScriptBuf {
    let (lesser, larger) = if pubkey_a.serialize() < pubkey_b.serialize() {
        (pubkey_a, pubkey_b)
    } else {
        (pubkey_b, pubkey_a)
    };
    Builder::new()
        .push_int(2)
        .push_slice(lesser.serialize())
        .push_slice(larger.serialize())
        .push_int(2)
        .push_opcode(opcodes::OP_CHECKMULTISIG)
        .into_script()
}

/// Revocable-with-delay `to_local` witness script.
pub fn to_local_script(
    revocation_pubkey: &PublicKey,
    delayed_pubkey: &PublicKey,
    to_self_delay: u16,
) -> ScriptBuf {
    Builder::new()
        .push_opcode(opcodes::OP_IF)
        .push_slice(revocation_pubkey.serialize())
        .push_opcode(opcodes::OP_ELSE)
        .push_int(to_self_delay as i64)
        .push_opcode(opcodes::OP_CSV)
        .push_opcode(opcodes::OP_DROP)
        .push_slice(delayed_pubkey.serialize())
        .push_opcode(opcodes::OP_ENDIF)
        .push_opcode(opcodes::OP_CHECKSIG)
        .into_script()
}

/// `to_remote` output: plain P2WPKH, immediately spendable by the
/// counterparty.
pub fn to_remote_script(remote_payment_pubkey: &PublicKey) -> ScriptBuf {
    let pubkey_hash = Hash160::hash(&remote_payment_pubkey.serialize());
    Builder::new()
        .push_int(0)
        .push_slice(pubkey_hash.as_byte_array())
        .into_script()
}

/// Offered-HTLC witness script: revocation path, remote claims with
/// preimage, local reclaims after timeout.
///
/// `payment_hash` is hashed with a single RIPEMD-160 (not HASH160): it is
/// already a SHA-256 digest, so BOLT-03 only applies the second half of
/// the HASH160 construction here.
pub fn offered_htlc_script(
    revocation_pubkey: &PublicKey,
    local_htlc_pubkey: &PublicKey,
    remote_htlc_pubkey: &PublicKey,
    payment_hash: &[u8; 32],
) -> ScriptBuf {
    let payment_hash160 = Ripemd160::hash(payment_hash).to_byte_array();
    let revocation_pubkey_hash = Hash160::hash(&revocation_pubkey.serialize());

    Builder::new()
        .push_opcode(opcodes::OP_DUP)
        .push_opcode(opcodes::OP_HASH160)
        .push_slice(revocation_pubkey_hash.as_byte_array())
        .push_opcode(opcodes::OP_EQUAL)
        .push_opcode(opcodes::OP_IF)
        .push_opcode(opcodes::OP_CHECKSIG)
        .push_opcode(opcodes::OP_ELSE)
        .push_slice(remote_htlc_pubkey.serialize())
        .push_opcode(opcodes::OP_SWAP)
        .push_opcode(opcodes::OP_SIZE)
        .push_int(32)
        .push_opcode(opcodes::OP_EQUAL)
        .push_opcode(opcodes::OP_NOTIF)
        .push_opcode(opcodes::OP_DROP)
        .push_int(2)
        .push_opcode(opcodes::OP_SWAP)
        .push_slice(local_htlc_pubkey.serialize())
        .push_int(2)
        .push_opcode(opcodes::OP_CHECKMULTISIG)
        .push_opcode(opcodes::OP_ELSE)
        .push_opcode(opcodes::OP_HASH160)
        .push_slice(payment_hash160)
        .push_opcode(opcodes::OP_EQUALVERIFY)
        .push_opcode(opcodes::OP_CHECKSIG)
        .push_opcode(opcodes::OP_ENDIF)
        .push_opcode(opcodes::OP_ENDIF)
        .into_script()
}

/// Received-HTLC witness script: revocation path, local claims with
/// preimage, remote reclaims after a CLTV timeout.
pub fn received_htlc_script(
    revocation_pubkey: &PublicKey,
    local_htlc_pubkey: &PublicKey,
    remote_htlc_pubkey: &PublicKey,
    payment_hash: &[u8; 32],
    cltv_expiry: u32,
) -> ScriptBuf {
    let payment_hash160 = Ripemd160::hash(payment_hash).to_byte_array();
    let revocation_pubkey_hash = Hash160::hash(&revocation_pubkey.serialize());

    Builder::new()
        .push_opcode(opcodes::OP_DUP)
        .push_opcode(opcodes::OP_HASH160)
        .push_slice(revocation_pubkey_hash.as_byte_array())
        .push_opcode(opcodes::OP_EQUAL)
        .push_opcode(opcodes::OP_IF)
        .push_opcode(opcodes::OP_CHECKSIG)
        .push_opcode(opcodes::OP_ELSE)
        .push_slice(remote_htlc_pubkey.serialize())
        .push_opcode(opcodes::OP_SWAP)
        .push_opcode(opcodes::OP_SIZE)
        .push_int(32)
        .push_opcode(opcodes::OP_EQUAL)
        .push_opcode(opcodes::OP_IF)
        .push_opcode(opcodes::OP_HASH160)
        .push_slice(payment_hash160)
        .push_opcode(opcodes::OP_EQUALVERIFY)
        .push_int(2)
        .push_opcode(opcodes::OP_SWAP)
        .push_slice(local_htlc_pubkey.serialize())
        .push_int(2)
        .push_opcode(opcodes::OP_CHECKMULTISIG)
        .push_opcode(opcodes::OP_ELSE)
        .push_opcode(opcodes::OP_DROP)
        .push_int(cltv_expiry as i64)
        .push_opcode(opcodes::OP_CLTV)
        .push_opcode(opcodes::OP_DROP)
        .push_opcode(opcodes::OP_CHECKSIG)
        .push_opcode(opcodes::OP_ENDIF)
        .push_opcode(opcodes::OP_ENDIF)
        .into_script()
}
