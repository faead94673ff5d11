//! Negative-path coverage of spec.md §7/§8: tampering, malformed input,
//! and recipient-mixing rules must surface the right `Error` variant
//! rather than silently decrypting or panicking.

use std::io::Cursor;

use age_core::recipient::scrypt::ScryptRecipient;
use age_core::recipient::x25519::{X25519Identity, X25519Recipient};
use age_core::{decrypt, encrypt, Error, Identity, Recipient};
use rand_core::OsRng;
use tokio::io::AsyncWriteExt;
use x25519_dalek::{PublicKey, StaticSecret};

async fn encrypted(recipients: &[&dyn Recipient], plaintext: &[u8]) -> Vec<u8> {
    let mut ciphertext = Vec::new();
    let mut writer = encrypt(&mut ciphertext, recipients).await.unwrap();
    writer.write_all(plaintext).await.unwrap();
    writer.close().await.unwrap();
    ciphertext
}

#[tokio::test]
async fn tampered_header_mac_is_rejected() {
    let secret = StaticSecret::random_from_rng(OsRng);
    let recipient = X25519Recipient::new(PublicKey::from(&secret));
    let identity = X25519Identity::new(secret);

    let mut ciphertext = encrypted(&[&recipient], b"tamper me").await;
    // The MAC's own base64 sits on the line starting with "--- "; flip a
    // byte inside it so the MAC no longer matches the header it covers.
    let mac_line = ciphertext
        .windows(4)
        .position(|w| w == b"--- ")
        .expect("header always has a MAC line");
    ciphertext[mac_line + 4] ^= 0x01;

    let err = decrypt(Cursor::new(ciphertext), &[&identity as &dyn Identity])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::HeaderMacMismatch));
}

#[tokio::test]
async fn tampered_ciphertext_chunk_is_rejected() {
    let secret = StaticSecret::random_from_rng(OsRng);
    let recipient = X25519Recipient::new(PublicKey::from(&secret));
    let identity = X25519Identity::new(secret);

    let mut ciphertext = encrypted(&[&recipient], b"authenticated payload").await;
    let last = ciphertext.len() - 1;
    ciphertext[last] ^= 0x01;

    let mut reader = decrypt(Cursor::new(ciphertext), &[&identity as &dyn Identity])
        .await
        .unwrap();
    let err = reader.next_chunk().await.unwrap_err();
    assert!(matches!(err, age_stream::Error::CiphertextTampered));
}

#[tokio::test]
async fn truncated_ciphertext_is_unexpected_eof() {
    let secret = StaticSecret::random_from_rng(OsRng);
    let recipient = X25519Recipient::new(PublicKey::from(&secret));
    let identity = X25519Identity::new(secret);

    let mut ciphertext = encrypted(&[&recipient], b"this payload gets cut off").await;
    ciphertext.truncate(ciphertext.len() - 5);

    let mut reader = decrypt(Cursor::new(ciphertext), &[&identity as &dyn Identity])
        .await
        .unwrap();
    let err = reader.next_chunk().await.unwrap_err();
    assert!(matches!(err, age_stream::Error::UnexpectedEof));
}

#[tokio::test]
async fn malformed_version_line_is_rejected_before_any_identity_is_tried() {
    let secret = StaticSecret::random_from_rng(OsRng);
    let identity = X25519Identity::new(secret);

    let garbage = b"age-encryption.org/v2\nsome garbage\n".to_vec();
    let err = decrypt(Cursor::new(garbage), &[&identity as &dyn Identity])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MalformedHeader(_)));
}

#[tokio::test]
async fn scrypt_cannot_be_mixed_with_another_recipient() {
    let secret = StaticSecret::random_from_rng(OsRng);
    let x25519 = X25519Recipient::new(PublicKey::from(&secret));
    let scrypt = ScryptRecipient::new("a passphrase");

    let mut ciphertext = Vec::new();
    let err = encrypt(
        &mut ciphertext,
        &[&x25519 as &dyn Recipient, &scrypt as &dyn Recipient],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::ScryptMustBeSole));
}

#[tokio::test]
async fn decrypting_with_no_identities_fails_fast() {
    let secret = StaticSecret::random_from_rng(OsRng);
    let recipient = X25519Recipient::new(PublicKey::from(&secret));
    let ciphertext = encrypted(&[&recipient], b"anything").await;

    let err = decrypt(Cursor::new(ciphertext), &[]).await.unwrap_err();
    assert!(matches!(err, Error::NoMatchingIdentity));
}
