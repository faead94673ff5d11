//! Thin wrapper over the ML-KEM-768 primitive used by the hybrid
//! recipient (spec.md §4.7). Key generation, encapsulation and
//! decapsulation are delegated entirely to `pqcrypto-mlkem`; this module
//! only narrows the import surface to the one parameter set the format
//! uses.
pub mod mlkem {
    pub use pqcrypto_mlkem::mlkem768::*;

    pub fn keypair() -> (PublicKey, SecretKey) {
        pqcrypto_mlkem::mlkem768::keypair()
    }

    pub fn encapsulate(pk: &PublicKey) -> (SharedSecret, Ciphertext) {
        pqcrypto_mlkem::mlkem768::encapsulate(pk)
    }

    pub fn decapsulate(ct: &Ciphertext, sk: &SecretKey) -> SharedSecret {
        pqcrypto_mlkem::mlkem768::decapsulate(ct, sk)
    }
}
