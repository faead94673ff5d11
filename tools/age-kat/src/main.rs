//! Known-answer verifier for age-core: walks a directory of vector
//! folders, each holding an `identity` bech32 secret key, a `ciphertext`
//! file, and an `expected` plaintext file, and confirms
//! `age_core::decrypt` recovers `expected` byte-for-byte.
//!
//! Mirrors the `testdata/` layout the upstream age project ships
//! alongside its own implementation, adapted to this crate's X25519-only
//! identity format (the other five recipient kinds are exercised by
//! their own in-crate round-trip tests, since they have no equivalent
//! published vector corpus).

use std::path::{Path, PathBuf};

use age_core::keys::decode_secret_key;
use age_core::recipient::x25519::X25519Identity;
use age_core::Identity;
use anyhow::{bail, Context, Result};
use x25519_dalek::StaticSecret;

struct Vector {
    name: String,
    identity: PathBuf,
    ciphertext: PathBuf,
    expected: PathBuf,
}

fn discover(dir: &Path) -> Result<Vec<Vector>> {
    let mut vectors = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let root = entry.path();
        let identity = root.join("identity");
        let ciphertext = root.join("ciphertext.age");
        let expected = root.join("expected.txt");
        if identity.exists() && ciphertext.exists() && expected.exists() {
            vectors.push(Vector {
                name: entry.file_name().to_string_lossy().into_owned(),
                identity,
                ciphertext,
                expected,
            });
        }
    }
    vectors.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(vectors)
}

async fn verify(vector: &Vector) -> Result<()> {
    let identity_line = std::fs::read_to_string(&vector.identity)?;
    let identity_line = identity_line.trim();
    let secret_bytes = decode_secret_key(identity_line)
        .map_err(|e| anyhow::anyhow!("{}: malformed identity: {e}", vector.name))?;
    let identity = X25519Identity::new(StaticSecret::from(secret_bytes));

    let ciphertext = std::fs::read(&vector.ciphertext)?;
    let expected = std::fs::read(&vector.expected)?;

    let mut reader = age_core::decrypt(
        std::io::Cursor::new(ciphertext),
        &[&identity as &dyn Identity],
    )
    .await
    .with_context(|| format!("{}: decrypt failed", vector.name))?;

    let mut plaintext = Vec::new();
    while let Some(chunk) = reader.next_chunk().await? {
        plaintext.extend_from_slice(&chunk);
    }

    if plaintext != expected {
        bail!(
            "{}: plaintext mismatch ({} bytes vs {} expected)",
            vector.name,
            plaintext.len(),
            expected.len()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tools/age-kat/vectors"));

    let vectors = discover(&dir)?;
    if vectors.is_empty() {
        bail!("no vectors found under {}", dir.display());
    }

    let mut failures = 0;
    for vector in &vectors {
        match verify(vector).await {
            Ok(()) => println!("ok   {}", vector.name),
            Err(e) => {
                println!("FAIL {}: {e}", vector.name);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} vector(s) failed");
    }
    println!("{} vector(s) passed", vectors.len());
    Ok(())
}
