use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::{error::Error, utilities, PublicAddress};
use libp2p::{Multiaddr, PeerId};

/// Peer consists of required information to identify an entity in the network, such as
/// Peer Id, IPv4 Address and port number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Peer {
    /// Peer id in the p2p network
    pub peer_id: PeerId,

    /// IP address (v4) of connection
    pub ip_address: Ipv4Addr,

    /// port number of connection
    pub port: u16,
}

impl Peer {
    /// Instantiation of Peer. It is used in bootstrap nodes in [crate::config::Config].
    ///
    /// Fails if address is not a valid Ed25519 public key.
    pub fn new(address: PublicAddress, ip_address: Ipv4Addr, port: u16) -> Result<Self, Error> {
        Ok(Self {
            peer_id: utilities::peer_id(&address)?,
            ip_address,
            port,
        })
    }

    /// Dialable address of the peer, including its `/p2p` component.
    pub fn multiaddr(&self) -> Multiaddr {
        utilities::multiaddr(self.ip_address, self.port)
            .with(libp2p::multiaddr::Protocol::P2p(self.peer_id))
    }
}

/// Parses `<hex public key>@<ipv4>:<port>`.
impl FromStr for Peer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, socket) = s
            .split_once('@')
            .ok_or_else(|| Error::InvalidPeer(format!("missing '@' in {s}")))?;
        let (ip, port) = socket
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidPeer(format!("missing port in {s}")))?;
        let ip_address = ip
            .parse::<Ipv4Addr>()
            .map_err(|e| Error::InvalidPeer(format!("{ip}: {e}")))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| Error::InvalidPeer(format!("{port}: {e}")))?;

        Peer::new(utilities::parse_public_address(key)?, ip_address, port)
    }
}

/// Snapshot of a peer currently connected to this node.
#[derive(Clone, Debug)]
pub struct PeerInfo {
    pub peer_id: PeerId,

    /// Remote address of the first established connection
    pub address: Multiaddr,

    /// Agent version reported through identify, once known
    pub agent: Option<String>,
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer {} {}", self.peer_id, self.address)
    }
}

/// Identity and listening addresses of the local node.
#[derive(Clone, Debug)]
pub struct NodeInfo {
    pub peer_id: PeerId,
    pub public_address: PublicAddress,
    pub listen_addrs: Vec<Multiaddr>,
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.listen_addrs.is_empty() {
            return write!(f, "/p2p/{}", self.peer_id);
        }
        for (i, addr) in self.listen_addrs.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}/p2p/{}", addr, self.peer_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

    #[test]
    fn parses_boot_node() {
        let peer: Peer = format!("{TEST_KEY}@10.0.0.7:8001").parse().unwrap();
        assert_eq!(peer.ip_address, Ipv4Addr::new(10, 0, 0, 7));
        assert_eq!(peer.port, 8001);
        let address = utilities::parse_public_address(TEST_KEY).unwrap();
        assert_eq!(peer.peer_id, utilities::peer_id(&address).unwrap());
        assert_eq!(
            peer.multiaddr().to_string(),
            format!("/ip4/10.0.0.7/tcp/8001/p2p/{}", peer.peer_id)
        );
    }

    #[test]
    fn rejects_malformed_boot_node() {
        assert!("10.0.0.7:8001".parse::<Peer>().is_err());
        assert!(format!("{TEST_KEY}@10.0.0.7").parse::<Peer>().is_err());
        assert!(format!("{TEST_KEY}@localhost:8001").parse::<Peer>().is_err());
        assert!(format!("{TEST_KEY}@10.0.0.7:99999").parse::<Peer>().is_err());
    }

    #[test]
    fn node_info_display_lists_dialable_addresses() {
        let peer_id = PeerId::random();
        let mut info = NodeInfo {
            peer_id,
            public_address: [0u8; 32],
            listen_addrs: Vec::new(),
        };
        assert_eq!(info.to_string(), format!("/p2p/{peer_id}"));

        info.listen_addrs = vec![
            "/ip4/127.0.0.1/tcp/8000".parse().unwrap(),
            "/ip4/10.0.0.7/tcp/8000".parse().unwrap(),
        ];
        assert_eq!(
            info.to_string(),
            format!("/ip4/127.0.0.1/tcp/8000/p2p/{peer_id} /ip4/10.0.0.7/tcp/8000/p2p/{peer_id}")
        );
    }

    #[test]
    fn peer_info_display() {
        let peer_id = PeerId::random();
        let info = PeerInfo {
            peer_id,
            address: "/ip4/127.0.0.1/tcp/8000".parse().unwrap(),
            agent: None,
        };
        assert_eq!(info.to_string(), format!("Peer {peer_id} /ip4/127.0.0.1/tcp/8000"));
    }
}
