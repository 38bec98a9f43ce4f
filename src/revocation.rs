use bitcoin::hashes::sha256::Hash as Sha256;
use bitcoin::hashes::Hash;

use crate::error::Error;

/// Number of bits in a per-commitment index (2^48 revocations per channel).
const INDEX_BITS: u32 = 48;

/// Derive the per-commitment secret for `index` from `seed`, flipping one
/// bit and re-hashing for each set bit of `index`, from the high end down.
pub fn per_commitment_secret_from_seed(seed: [u8; 32], index: u64, bits: u32) -> [u8; 32] {
    let mut s = seed;
    for b in (0..bits).rev() {
        if index & (1u64 << b) != 0 {
            s[(b / 8) as usize] ^= 1 << (b % 8);
            s = Sha256::hash(&s).to_byte_array();
        }
    }
    s
}

/// Number of consecutive zero bits at the low end of `index`, or 48 if
/// `index == 0`.
pub fn count_trailing_zeros(index: u64) -> u32 {
    if index == 0 {
        return INDEX_BITS;
    }
    index.trailing_zeros().min(INDEX_BITS)
}

/// One stored (secret, index) pair in the shachain tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShachainElement {
    pub secret: [u8; 32],
    pub index: u64,
}

impl ShachainElement {
    /// Re-derive the secret for `to_index` from this element, provided
    /// `to_index` agrees with this element's index in every bit at or
    /// above the element's trailing-zero count.
    pub fn derive_towards(&self, to_index: u64) -> Result<ShachainElement, Error> {
        let z = count_trailing_zeros(self.index);
        let mask = if z >= 64 { u64::MAX } else { !((1u64 << z) - 1) };
        if self.index & mask != to_index & mask {
            return Err(Error::UnableToDeriveSecret);
        }
        Ok(ShachainElement {
            secret: per_commitment_secret_from_seed(self.secret, to_index, z),
            index: to_index,
        })
    }
}

/// Compact store of up to 2^48 per-commitment revocation secrets in 49
/// trailing-zero-bucketed slots, per BOLT-03.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevocationStore {
    buckets: [Option<ShachainElement>; 49],
    index: u64,
}

impl Default for RevocationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RevocationStore {
    pub fn new() -> Self {
        Self {
            buckets: [None; 49],
            index: (1u64 << INDEX_BITS) - 1,
        }
    }

    /// The next index this store expects a secret for.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn bucket(&self, b: usize) -> Option<&ShachainElement> {
        self.buckets.get(b).and_then(|slot| slot.as_ref())
    }

    /// Insert the secret for `self.index()`, cross-checking it against
    /// every lower bucket before committing it. A mismatch is fatal: the
    /// counterparty is serving a secret inconsistent with one already
    /// accepted, and the channel must be torn down.
    pub fn add_next_entry(&mut self, secret: [u8; 32]) -> Result<(), Error> {
        let index = self.index;
        let element = ShachainElement { secret, index };
        let b = count_trailing_zeros(index) as usize;

        for i in 0..b {
            if let Some(existing) = self.buckets[i] {
                let derived = element
                    .derive_towards(existing.index)
                    .map_err(|_| Error::ShachainInsertionMismatch { bucket: i })?;
                if derived.secret != existing.secret {
                    return Err(Error::ShachainInsertionMismatch { bucket: i });
                }
            }
        }

        self.buckets[b] = Some(element);
        self.index = self.index.saturating_sub(1);
        Ok(())
    }

    /// Scan buckets in ascending order and return the first secret that
    /// can derive `index`.
    pub fn retrieve_secret(&self, index: u64) -> Result<[u8; 32], Error> {
        for slot in self.buckets.iter() {
            let Some(element) = slot else {
                continue;
            };
            if let Ok(derived) = element.derive_towards(index) {
                return Ok(derived.secret);
            }
        }
        Err(Error::UnableToDeriveSecret)
    }

    /// Stable `{"index":N,"buckets":[[hex,idx]|null, ...]}` persisted form.
    pub fn to_json(&self) -> String {
        let mut buckets = String::from("[");
        for (i, slot) in self.buckets.iter().enumerate() {
            if i > 0 {
                buckets.push(',');
            }
            match slot {
                Some(elem) => buckets.push_str(&format!("[\"{}\",{}]", hex::encode(elem.secret), elem.index)),
                None => buckets.push_str("null"),
            }
        }
        buckets.push(']');
        format!("{{\"index\":{},\"buckets\":{}}}", self.index, buckets)
    }

    /// Inverse of [`to_json`](Self::to_json).
    pub fn from_json(s: &str) -> Result<Self, Error> {
        let malformed = || Error::PersistedFormError(s.to_string());

        let index_key = "\"index\":";
        let index_start = s.find(index_key).ok_or_else(malformed)? + index_key.len();
        let index_end = index_start + s[index_start..].find(',').ok_or_else(malformed)?;
        let index: u64 = s[index_start..index_end].trim().parse().map_err(|_| malformed())?;

        let buckets_key = "\"buckets\":[";
        let buckets_start = s.find(buckets_key).ok_or_else(malformed)? + buckets_key.len();
        let buckets_end = s.rfind(']').ok_or_else(malformed)?;
        let body = &s[buckets_start..buckets_end];

        let mut items = Vec::new();
        let mut depth = 0i32;
        let mut item_start = 0usize;
        for (pos, c) in body.char_indices() {
            match c {
                '[' => depth += 1,
                ']' => depth -= 1,
                ',' if depth == 0 => {
                    items.push(&body[item_start..pos]);
                    item_start = pos + 1;
                }
                _ => {}
            }
        }
        items.push(&body[item_start..]);

        if items.len() != 49 {
            return Err(malformed());
        }

        let mut buckets: [Option<ShachainElement>; 49] = [None; 49];
        for (i, item) in items.iter().enumerate() {
            let item = item.trim();
            if item == "null" {
                continue;
            }
            let inner = item
                .strip_prefix('[')
                .and_then(|s| s.strip_suffix(']'))
                .ok_or_else(malformed)?;
            let (hex_part, idx_part) = inner.split_once(',').ok_or_else(malformed)?;
            let hex_part = hex_part.trim().trim_matches('"');
            let secret_bytes = hex::decode(hex_part).map_err(|_| malformed())?;
            if secret_bytes.len() != 32 {
                return Err(malformed());
            }
            let mut secret = [0u8; 32];
            secret.copy_from_slice(&secret_bytes);
            let elem_index: u64 = idx_part.trim().parse().map_err(|_| malformed())?;
            buckets[i] = Some(ShachainElement { secret, index: elem_index });
        }

        Ok(RevocationStore { buckets, index })
    }
}
