//! RSA-2048 key wrapping for the asymmetric path.
//!
//! RSA never touches the note itself: a random AES-256 data key is wrapped
//! with RSA-OAEP (SHA-256) and the note is sealed under that data key. The
//! per-note private key, exported as PKCS#8 DER, is the bearer secret.

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::aead::KEY_LEN;
use crate::error::{Error, Result};

pub const RSA_BITS: usize = 2048;

/// Generate a fresh keypair for one note.
pub fn generate() -> Result<RsaPrivateKey> {
    RsaPrivateKey::new(&mut OsRng, RSA_BITS)
        .map_err(|e| Error::EncryptionFailure(format!("rsa keygen: {e}")))
}

pub fn wrap(public: &RsaPublicKey, data_key: &[u8; KEY_LEN]) -> Result<Vec<u8>> {
    public
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), data_key)
        .map_err(|e| Error::EncryptionFailure(format!("rsa-oaep: {e}")))
}

/// Recover the data key using the DER-encoded private key from the link.
pub fn unwrap(private_der: &[u8], wrapped: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let private = RsaPrivateKey::from_pkcs8_der(private_der).map_err(|_| Error::DecryptionFailure)?;
    let plain = Zeroizing::new(
        private
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|_| Error::DecryptionFailure)?,
    );
    if plain.len() != KEY_LEN {
        return Err(Error::DecryptionFailure);
    }
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    key.copy_from_slice(&plain);
    Ok(key)
}

pub fn export_private(private: &RsaPrivateKey) -> Result<Zeroizing<Vec<u8>>> {
    let doc = private
        .to_pkcs8_der()
        .map_err(|e| Error::EncryptionFailure(format!("pkcs8 export: {e}")))?;
    Ok(Zeroizing::new(doc.as_bytes().to_vec()))
}

#[cfg(test)]
mod tests {
    use super::super::aead::random_key;
    use super::*;

    #[test]
    fn wrap_unwrap_round_trip() {
        let private = generate().unwrap();
        let data_key = random_key();
        let wrapped = wrap(&private.to_public_key(), &data_key).unwrap();
        assert_eq!(wrapped.len(), RSA_BITS / 8);

        let der = export_private(&private).unwrap();
        let recovered = unwrap(&der, &wrapped).unwrap();
        assert_eq!(*recovered, *data_key);
    }

    #[test]
    fn foreign_private_key_fails() {
        let private = generate().unwrap();
        let other = generate().unwrap();
        let wrapped = wrap(&private.to_public_key(), &random_key()).unwrap();

        let der = export_private(&other).unwrap();
        assert!(matches!(unwrap(&der, &wrapped), Err(Error::DecryptionFailure)));
    }

    #[test]
    fn garbage_der_fails() {
        assert!(matches!(
            unwrap(b"not a key", &[0u8; 256]),
            Err(Error::DecryptionFailure)
        ));
    }
}
