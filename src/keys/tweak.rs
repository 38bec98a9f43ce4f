use bitcoin::hashes::sha256::Hash as Sha256;
use bitcoin::hashes::{Hash, HashEngine};
use bitcoin::secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey, Signing, Verification};

use crate::error::Error;

fn tagged_scalar(a: &[u8], b: &[u8]) -> Result<Scalar, Error> {
    let mut engine = Sha256::engine();
    engine.input(a);
    engine.input(b);
    let digest = Sha256::from_engine(engine).to_byte_array();
    Scalar::from_be_bytes(digest).map_err(|_| Error::InvalidTweak)
}

/// `basepoint + G*H` where `H = SHA256(per_commitment_point || basepoint)`.
pub fn derive_pubkey<C: Verification>(
    secp: &Secp256k1<C>,
    basepoint: &PublicKey,
    per_commitment_point: &PublicKey,
) -> Result<PublicKey, Error> {
    let scalar = tagged_scalar(&per_commitment_point.serialize(), &basepoint.serialize())?;
    let hashkey = PublicKey::from_secret_key(
        secp,
        &SecretKey::from_slice(&scalar.to_be_bytes()).map_err(|_| Error::InvalidTweak)?,
    );
    basepoint.combine(&hashkey).map_err(|_| Error::InvalidTweak)
}

/// `(secret + SHA256(per_commitment_point || basepoint)) mod n`.
pub fn derive_privkey<C: Signing>(
    secp: &Secp256k1<C>,
    secret: &SecretKey,
    per_commitment_point: &PublicKey,
) -> Result<SecretKey, Error> {
    let basepoint = PublicKey::from_secret_key(secp, secret);
    let scalar = tagged_scalar(&per_commitment_point.serialize(), &basepoint.serialize())?;
    secret.add_tweak(&scalar).map_err(|_| Error::InvalidTweak)
}

/// `basepoint*H1 + per_commitment_point*H2`, the revocation-key formula.
pub fn derive_blinded_pubkey<C: Verification>(
    secp: &Secp256k1<C>,
    basepoint: &PublicKey,
    per_commitment_point: &PublicKey,
) -> Result<PublicKey, Error> {
    let h1 = tagged_scalar(&basepoint.serialize(), &per_commitment_point.serialize())?;
    let h2 = tagged_scalar(&per_commitment_point.serialize(), &basepoint.serialize())?;
    let component1 = basepoint.mul_tweak(secp, &h1).map_err(|_| Error::InvalidTweak)?;
    let component2 = per_commitment_point
        .mul_tweak(secp, &h2)
        .map_err(|_| Error::InvalidTweak)?;
    component1.combine(&component2).map_err(|_| Error::InvalidTweak)
}

/// Private-key counterpart of [`derive_blinded_pubkey`].
pub fn derive_blinded_privkey<C: Signing>(
    secp: &Secp256k1<C>,
    basepoint_secret: &SecretKey,
    per_commitment_secret: &SecretKey,
) -> Result<SecretKey, Error> {
    let basepoint = PublicKey::from_secret_key(secp, basepoint_secret);
    let per_commitment_point = PublicKey::from_secret_key(secp, per_commitment_secret);

    let h1 = tagged_scalar(&basepoint.serialize(), &per_commitment_point.serialize())?;
    let h2 = tagged_scalar(&per_commitment_point.serialize(), &basepoint.serialize())?;

    let key1 = basepoint_secret.mul_tweak(&h1).map_err(|_| Error::InvalidTweak)?;
    let key2 = per_commitment_secret.mul_tweak(&h2).map_err(|_| Error::InvalidTweak)?;
    let key2_scalar = Scalar::from_be_bytes(key2.secret_bytes()).map_err(|_| Error::InvalidTweak)?;

    key1.add_tweak(&key2_scalar).map_err(|_| Error::InvalidTweak)
}

/// `SHA256(serialize_compressed(priv * pub))`.
pub fn ecdh<C: Signing>(
    secp: &Secp256k1<C>,
    privkey: &SecretKey,
    pubkey: &PublicKey,
) -> Result<[u8; 32], Error> {
    let scalar = Scalar::from_be_bytes(privkey.secret_bytes()).map_err(|_| Error::InvalidTweak)?;
    let shared_point = pubkey.mul_tweak(secp, &scalar).map_err(|_| Error::InvalidTweak)?;
    Ok(Sha256::hash(&shared_point.serialize()).to_byte_array())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secp() -> Secp256k1<bitcoin::secp256k1::All> {
        Secp256k1::new()
    }

    fn key(byte: u8) -> SecretKey {
        SecretKey::from_slice(&[byte; 32]).unwrap()
    }

    // P5: derive_pubkey(b*G, P) == derive_privkey(b, P)*G
    #[test]
    fn per_commit_key_duality() {
        let secp = secp();
        let b = key(7);
        let p = key(9);
        let basepoint = PublicKey::from_secret_key(&secp, &b);
        let per_commitment_point = PublicKey::from_secret_key(&secp, &p);

        let pubkey = derive_pubkey(&secp, &basepoint, &per_commitment_point).unwrap();
        let privkey = derive_privkey(&secp, &b, &per_commitment_point).unwrap();
        assert_eq!(pubkey, PublicKey::from_secret_key(&secp, &privkey));
    }

    // P4: derive_blinded_pubkey(B*G, P*G) == derive_blinded_privkey(B, P)*G
    #[test]
    fn blinded_key_ecdh_duality() {
        let secp = secp();
        let b = key(3);
        let p = key(11);
        let basepoint = PublicKey::from_secret_key(&secp, &b);
        let per_commitment_point = PublicKey::from_secret_key(&secp, &p);

        let pubkey = derive_blinded_pubkey(&secp, &basepoint, &per_commitment_point).unwrap();
        let privkey = derive_blinded_privkey(&secp, &b, &p).unwrap();
        assert_eq!(pubkey, PublicKey::from_secret_key(&secp, &privkey));
    }

    #[test]
    fn bolt3_appendix_e_vectors() {
        // Inputs from BOLT-3 Appendix E (basepoint_secret / per_commitment_secret).
        let secp = secp();
        let basepoint_secret = SecretKey::from_slice(
            &hex::decode("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f")
                .unwrap(),
        )
        .unwrap();
        let per_commitment_secret = SecretKey::from_slice(
            &hex::decode("1f1e1d1c1b1a191817161514131211100f0e0d0c0b0a09080706050403020100")
                .unwrap(),
        )
        .unwrap();
        let per_commitment_point = PublicKey::from_secret_key(&secp, &per_commitment_secret);
        let basepoint = PublicKey::from_secret_key(&secp, &basepoint_secret);

        let localpubkey = derive_pubkey(&secp, &basepoint, &per_commitment_point).unwrap();
        let localprivkey = derive_privkey(&secp, &basepoint_secret, &per_commitment_point).unwrap();
        assert_eq!(localpubkey, PublicKey::from_secret_key(&secp, &localprivkey));

        let revocation_pubkey =
            derive_blinded_pubkey(&secp, &basepoint, &per_commitment_point).unwrap();
        let revocation_privkey =
            derive_blinded_privkey(&secp, &basepoint_secret, &per_commitment_secret).unwrap();
        assert_eq!(
            revocation_pubkey,
            PublicKey::from_secret_key(&secp, &revocation_privkey)
        );
    }
}
