use bitcoin::secp256k1::{PublicKey, SecretKey};
use bitcoin::Transaction;

use crate::error::Error;

/// A public key paired with its private half when the caller holds it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keypair {
    pub pubkey: PublicKey,
    pub privkey: Option<SecretKey>,
}

impl Keypair {
    pub fn new_public(pubkey: PublicKey) -> Self {
        Self { pubkey, privkey: None }
    }

    pub fn new_pair(pubkey: PublicKey, privkey: SecretKey) -> Self {
        Self { pubkey, privkey: Some(privkey) }
    }
}

/// Fields shared by both sides of a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    pub ctn: u64,
    pub amount_msat: u64,
    pub next_htlc_id: u64,
    pub payment_basepoint: Keypair,
    pub multisig_basepoint: Keypair,
    pub htlc_basepoint: Keypair,
    pub delayed_basepoint: Keypair,
    pub revocation_basepoint: Keypair,
    pub to_self_delay: u16,
    pub dust_limit_sat: u64,
    pub max_htlc_value_in_flight_msat: u64,
    pub max_accepted_htlcs: u16,
    pub initial_msat: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalConfig {
    pub config: ChannelConfig,
    pub per_commitment_secret_seed: [u8; 32],
    pub funding_locked_received: bool,
    pub was_announced: bool,
    pub current_commitment_signature: [u8; 64],
    pub current_htlc_signatures: Vec<[u8; 64]>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteConfig {
    pub config: ChannelConfig,
    pub next_per_commitment_point: PublicKey,
    pub current_per_commitment_point: PublicKey,
    pub revocation_store: crate::revocation::RevocationStore,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelConstraints {
    pub capacity: u64,
    pub is_initiator: bool,
    pub funding_txn_minimum_depth: u32,
    pub feerate: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outpoint {
    pub txid: String,
    pub output_index: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InFlightHtlc {
    pub amount_msat: u64,
    pub cltv_expiry: u32,
    pub payment_hash: [u8; 32],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptHtlc {
    pub redeem_script: Vec<u8>,
    pub htlc: InFlightHtlc,
}

/// Which side of the channel an HTLC output / signature belongs to.
///
/// `Local` carries the `+1` sign, `Remote` the `-1` sign used by the
/// obscuring and fee-allocation arithmetic; `Sent`/`Received` are the
/// aliases used when talking about HTLC direction from the local side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HTLCOwner {
    Local,
    Remote,
}

impl HTLCOwner {
    pub const SENT: HTLCOwner = HTLCOwner::Local;
    pub const RECEIVED: HTLCOwner = HTLCOwner::Remote;

    pub fn sign(self) -> i8 {
        match self {
            HTLCOwner::Local => 1,
            HTLCOwner::Remote => -1,
        }
    }

    pub fn other(self) -> HTLCOwner {
        match self {
            HTLCOwner::Local => HTLCOwner::Remote,
            HTLCOwner::Remote => HTLCOwner::Local,
        }
    }
}

/// Which BOLT-03 witness path an HTLC commitment output takes, derived
/// once from `(for_us, we_receive)` rather than threaded as two bools.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HtlcDirection {
    Offered,
    Received,
}

/// A signed transaction paired with the relative-lock delay (if any) a
/// watch-tower must wait out before broadcasting it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncumberedTransaction {
    pub tx: Transaction,
    pub csv_delay: Option<u32>,
}

impl EncumberedTransaction {
    pub fn new(tx: Transaction, csv_delay: Option<u32>) -> Self {
        Self { tx, csv_delay }
    }

    /// Stable `{ "tx": hex, "csv_delay": int|null }` form used for
    /// watch-tower handoff persistence.
    pub fn to_json(&self) -> String {
        use bitcoin::consensus::encode::serialize_hex;
        let tx_hex = serialize_hex(&self.tx);
        match self.csv_delay {
            Some(delay) => format!("{{\"tx\":\"{tx_hex}\",\"csv_delay\":{delay}}}"),
            None => format!("{{\"tx\":\"{tx_hex}\",\"csv_delay\":null}}"),
        }
    }

    /// Inverse of [`to_json`](Self::to_json).
    pub fn from_json(s: &str) -> Result<Self, Error> {
        let malformed = || Error::PersistedFormError(s.to_string());

        let tx_key = "\"tx\":\"";
        let tx_start = s.find(tx_key).ok_or_else(malformed)? + tx_key.len();
        let tx_end = tx_start + s[tx_start..].find('"').ok_or_else(malformed)?;
        let tx_bytes = hex::decode(&s[tx_start..tx_end]).map_err(|_| malformed())?;
        let tx: Transaction =
            bitcoin::consensus::encode::deserialize(&tx_bytes).map_err(|_| malformed())?;

        let delay_key = "\"csv_delay\":";
        let delay_start = s.find(delay_key).ok_or_else(malformed)? + delay_key.len();
        let delay_str = s[delay_start..].trim_end_matches('}').trim();
        let csv_delay = if delay_str == "null" {
            None
        } else {
            Some(delay_str.parse::<u32>().map_err(|_| malformed())?)
        };

        Ok(EncumberedTransaction { tx, csv_delay })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::locktime::absolute::LockTime;
    use bitcoin::script::ScriptBuf;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, OutPoint, Sequence, TxIn, TxOut, Witness};

    fn sample_tx() -> Transaction {
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
                value: Amount::from_sat(54_321),
                script_pubkey: ScriptBuf::new(),
            }],
        }
    }

    #[test]
    fn encumbered_transaction_json_roundtrips_with_delay() {
        let original = EncumberedTransaction::new(sample_tx(), Some(144));
        let json = original.to_json();
        let parsed = EncumberedTransaction::from_json(&json).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn encumbered_transaction_json_roundtrips_without_delay() {
        let original = EncumberedTransaction::new(sample_tx(), None);
        let json = original.to_json();
        assert!(json.contains("\"csv_delay\":null"));
        let parsed = EncumberedTransaction::from_json(&json).unwrap();
        assert_eq!(parsed, original);
    }
}
