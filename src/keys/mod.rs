pub mod family;
pub mod tweak;

pub use family::{KeyDerivation, LnKeyFamily};
pub use tweak::{derive_blinded_privkey, derive_blinded_pubkey, derive_privkey, derive_pubkey, ecdh};
