//! Persistent node identity.
//!
//! The key file holds the 32-byte Ed25519 secret of the node as lowercase hex, so the node keeps
//! the same [PeerId](libp2p::PeerId) across restarts.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use libp2p::identity::{ed25519, Keypair};
use log::info;

use crate::error::{Error, Result};

/// Load the keypair stored at `path`, or generate one and save it there if the file does not exist.
pub fn load_or_generate(path: impl AsRef<Path>) -> Result<Keypair> {
    let path = path.as_ref();
    if path.exists() {
        return load(path);
    }

    let keypair = Keypair::generate_ed25519();
    save(path, &keypair)?;
    info!("Generated new node key at {}", path.display());
    Ok(keypair)
}

/// Read a hex encoded Ed25519 secret from `path`.
pub fn load(path: impl AsRef<Path>) -> Result<Keypair> {
    let contents = fs::read_to_string(path)?;
    let mut secret =
        hex::decode(contents.trim()).map_err(|e| Error::KeyFile(e.to_string()))?;
    if secret.len() != 32 {
        return Err(Error::KeyFile(format!(
            "expected 32 byte secret, found {} bytes",
            secret.len()
        )));
    }
    let secret = ed25519::SecretKey::try_from_bytes(&mut secret)
        .map_err(|e| Error::KeyFile(e.to_string()))?;
    Ok(ed25519::Keypair::from(secret).into())
}

/// Write the Ed25519 secret of `keypair` to a new file at `path` as hex. Only the owner may read
/// the file. An existing file is never overwritten.
pub fn save(path: impl AsRef<Path>, keypair: &Keypair) -> Result<()> {
    let keypair = keypair
        .clone()
        .try_into_ed25519()
        .map_err(|e| Error::KeyFile(e.to_string()))?;

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(hex::encode(keypair.secret().as_ref()).as_bytes())?;
    Ok(())
}
