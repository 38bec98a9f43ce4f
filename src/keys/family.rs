use bitcoin::secp256k1::{PublicKey, SecretKey};

use crate::error::Error;

/// Lightning key families, mapped to BIP32 derivation paths of the form
/// `[family, 0, index]` by the external keystore (see [`KeyDerivation`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LnKeyFamily {
    MultiSig = 0,
    RevocationBase = 1,
    HtlcBase = 2,
    PaymentBase = 3,
    DelayBase = 4,
    RevocationRoot = 5,
    NodeKey = 6,
}

impl LnKeyFamily {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// A narrow capability over an external BIP32 keystore. The core never
/// stores or sees the root seed; it only ever asks for a keypair at a
/// given `(family, index)` coordinate.
pub trait KeyDerivation {
    fn get_keypair(&self, family: LnKeyFamily, index: u32) -> Result<(PublicKey, SecretKey), Error>;
}
