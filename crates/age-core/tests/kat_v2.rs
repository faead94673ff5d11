//! Integration coverage of spec.md §8's Testable Properties: round-trips
//! through every recipient family via the public `encrypt`/`decrypt`
//! dispatch, plus the random-access chunk-boundary scenario.

use std::io::Cursor;

use age_core::recipient::scrypt::{ScryptIdentity, ScryptRecipient};
use age_core::recipient::ssh_ed25519::{SshEd25519Identity, SshEd25519Recipient};
use age_core::recipient::ssh_rsa::{SshRsaIdentity, SshRsaRecipient};
use age_core::recipient::tagged::{TaggedIdentity, TaggedRecipient};
use age_core::recipient::x25519::{X25519Identity, X25519Recipient};
use age_core::{decrypt, decrypt_seekable, encrypt, Identity, Recipient};
use ed25519_dalek::SigningKey;
use hpke::kem::DhP256HkdfSha256;
use hpke::{Kem as KemTrait, Serializable};
use rand_core::OsRng;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tokio::io::AsyncWriteExt;
use x25519_dalek::{PublicKey, StaticSecret};

async fn round_trip(recipient: &dyn Recipient, identity: &dyn Identity, plaintext: &[u8]) {
    let mut ciphertext = Vec::new();
    let mut writer = encrypt(&mut ciphertext, &[recipient]).await.unwrap();
    writer.write_all(plaintext).await.unwrap();
    writer.close().await.unwrap();

    let mut reader = decrypt(Cursor::new(ciphertext), &[identity]).await.unwrap();
    let mut recovered = Vec::new();
    while let Some(chunk) = reader.next_chunk().await.unwrap() {
        recovered.extend_from_slice(&chunk);
    }
    assert_eq!(recovered, plaintext);
}

#[tokio::test]
async fn x25519_round_trip() {
    let secret = StaticSecret::random_from_rng(OsRng);
    let recipient = X25519Recipient::new(PublicKey::from(&secret));
    let identity = X25519Identity::new(secret);
    round_trip(&recipient, &identity, b"a short secret message").await;
}

#[tokio::test]
async fn scrypt_round_trip() {
    let recipient = ScryptRecipient::with_work_factor("correct horse battery staple", 12);
    let identity = ScryptIdentity::with_max_work_factor("correct horse battery staple", 15);
    round_trip(&recipient, &identity, b"passphrase protected payload").await;
}

#[tokio::test]
async fn scrypt_wrong_password_is_rejected() {
    let recipient = ScryptRecipient::with_work_factor("hunter2", 12);
    let identity = ScryptIdentity::new("not hunter2");

    let mut ciphertext = Vec::new();
    let mut writer = encrypt(&mut ciphertext, &[&recipient as &dyn Recipient])
        .await
        .unwrap();
    writer.write_all(b"payload").await.unwrap();
    writer.close().await.unwrap();

    let err = decrypt(Cursor::new(ciphertext), &[&identity as &dyn Identity])
        .await
        .unwrap_err();
    assert!(matches!(err, age_core::Error::NoMatchingIdentity));
}

#[tokio::test]
async fn ssh_rsa_round_trip() {
    let secret = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
    let public = RsaPublicKey::from(&secret);
    let recipient = SshRsaRecipient::new(public);
    let identity = SshRsaIdentity::new(secret);
    round_trip(&recipient, &identity, b"ssh-rsa wrapped file key").await;
}

#[tokio::test]
async fn ssh_ed25519_round_trip() {
    let signing = SigningKey::generate(&mut rand::thread_rng());
    let verifying_bytes = signing.verifying_key().to_bytes();
    let seed = signing.to_bytes();

    let recipient = SshEd25519Recipient::new(&verifying_bytes).unwrap();
    let identity = SshEd25519Identity::new(&seed, &verifying_bytes);
    round_trip(&recipient, &identity, b"ssh-ed25519 wrapped file key").await;
}

#[tokio::test]
async fn tagged_p256_round_trip() {
    let (secret, public) = DhP256HkdfSha256::gen_keypair(&mut hpke::rand_core::UnwrapErr(
        hpke::rand_core::OsRng,
    ));
    let recipient = TaggedRecipient::from_sec1_bytes(&public.to_bytes()).unwrap();
    let identity = TaggedIdentity::new(secret, public);
    round_trip(&recipient, &identity, b"hardware tagged recipient").await;
}

#[tokio::test]
async fn empty_plaintext_round_trips() {
    let secret = StaticSecret::random_from_rng(OsRng);
    let recipient = X25519Recipient::new(PublicKey::from(&secret));
    let identity = X25519Identity::new(secret);
    round_trip(&recipient, &identity, b"").await;
}

#[tokio::test]
async fn random_access_recovers_an_interior_chunk() {
    let identity = ScryptIdentity::new("chunk boundary test");
    let recipient = ScryptRecipient::with_work_factor("chunk boundary test", 12);

    // Three full 65536-byte chunks plus a short tail, so a read landing
    // exactly on a chunk boundary exercises the boundary math.
    let plaintext: Vec<u8> = (0..3 * 65_536 + 10).map(|i| (i % 256) as u8).collect();
    let mut ciphertext = Vec::new();
    let mut writer = encrypt(&mut ciphertext, &[&recipient as &dyn Recipient])
        .await
        .unwrap();
    writer.write_all(&plaintext).await.unwrap();
    writer.close().await.unwrap();

    let total_len = ciphertext.len() as u64;
    let reader = decrypt_seekable(
        Cursor::new(ciphertext),
        &[&identity as &dyn Identity],
        total_len,
    )
    .await
    .unwrap();

    let mut buf = [0u8; 200];
    let (n, eof) = reader.read_at(&mut buf, 65_536).await.unwrap();
    assert_eq!(n, 200);
    assert!(!eof);
    assert_eq!(&buf[..n], &plaintext[65_536..65_736]);
}
