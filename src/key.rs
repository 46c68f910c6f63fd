//! Symmetric content keys.

use openssl::rand::rand_bytes;

use crate::{Error, Result};

/// A 128-bit symmetric key, as used to encrypt essence and carried inside KDMs.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Key {
    value: [u8; 16],
}

impl Key {
    /// A fresh random key.
    pub fn random() -> Result<Key> {
        let mut value = [0u8; 16];
        rand_bytes(&mut value)?;
        Ok(Key { value })
    }

    pub fn from_bytes(value: [u8; 16]) -> Key {
        Key { value }
    }

    pub fn from_hex(hex_str: &str) -> Result<Key> {
        let bytes = hex::decode(hex_str)
            .map_err(|_| Error::MiscError(format!("bad key hex {hex_str}")))?;
        let value: [u8; 16] = bytes
            .try_into()
            .map_err(|_| Error::MiscError("key is not 16 bytes".to_string()))?;
        Ok(Key { value })
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.value
    }

    pub fn hex(&self) -> String {
        hex::encode(self.value)
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // keys should not leak into logs
        write!(f, "Key(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let k = Key::from_hex("8a2729c3e5b65c45d78305462104c3fb").unwrap();
        assert_eq!(k.hex(), "8a2729c3e5b65c45d78305462104c3fb");
        assert!(Key::from_hex("8a27").is_err());
        assert!(Key::from_hex("not hex at all").is_err());
    }

    #[test]
    fn random_keys_differ() {
        assert_ne!(Key::random().unwrap(), Key::random().unwrap());
    }
}
