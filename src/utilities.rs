use libp2p::{
    identity::{ed25519, PublicKey},
    Multiaddr, PeerId,
};
use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{error::Error, PublicAddress};

/// Convert PublicKey in libp2p to PublicAddress. The PublicKey must be an
/// Ed25519 key, otherwise the method returns None.
pub fn public_address(public_key: &PublicKey) -> Option<PublicAddress> {
    match public_key.clone().try_into_ed25519() {
        Ok(kp) => Some(kp.to_bytes()),
        _ => None,
    }
}

/// Derive the PeerId of the peer owning the PublicAddress.
pub fn peer_id(address: &PublicAddress) -> Result<PeerId, Error> {
    let public_key: PublicKey = ed25519::PublicKey::try_from_bytes(address)
        .map_err(|e| Error::InvalidPeer(e.to_string()))?
        .into();
    Ok(public_key.to_peer_id())
}

/// Parse a hex encoded Ed25519 public key into a PublicAddress.
pub fn parse_public_address(hex_str: &str) -> Result<PublicAddress, Error> {
    let bytes = hex::decode(hex_str.trim()).map_err(|e| Error::InvalidPeer(e.to_string()))?;
    let address: PublicAddress = bytes.try_into().map_err(|b: Vec<u8>| {
        Error::InvalidPeer(format!("public key must be 32 bytes, got {}", b.len()))
    })?;
    // reject byte strings that are not a point on the curve
    peer_id(&address)?;
    Ok(address)
}

/// Create Multiaddr from IP address and port number.
pub fn multiaddr(ip_address: Ipv4Addr, port: u16) -> Multiaddr {
    Multiaddr::from(ip_address).with(libp2p::multiaddr::Protocol::Tcp(port))
}

/// Seconds since the unix epoch, saturating into u32 like the envelope fields.
pub fn now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().min(u32::MAX as u64) as u32)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

    #[test]
    fn parses_valid_public_address() {
        let address = parse_public_address(TEST_KEY).unwrap();
        assert_eq!(hex::encode(address), TEST_KEY);
        assert!(peer_id(&address).is_ok());
    }

    #[test]
    fn rejects_short_public_address() {
        assert!(matches!(
            parse_public_address("d75a98"),
            Err(Error::InvalidPeer(_))
        ));
        assert!(parse_public_address("not hex").is_err());
    }

    #[test]
    fn public_address_round_trips_through_keypair() {
        let keypair = libp2p::identity::Keypair::generate_ed25519();
        let address = public_address(&keypair.public()).unwrap();
        assert_eq!(peer_id(&address).unwrap(), keypair.public().to_peer_id());
    }

    #[test]
    fn builds_tcp_multiaddr() {
        let addr = multiaddr(Ipv4Addr::new(127, 0, 0, 1), 8000);
        assert_eq!(addr.to_string(), "/ip4/127.0.0.1/tcp/8000");
    }
}
