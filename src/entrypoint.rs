use futures::StreamExt;
use libp2p::dns::TokioDnsConfig;
use libp2p::swarm::SwarmBuilder;
use libp2p::Transport;
use libp2p::{identify::Event as IdentifyEvent, PeerId};
use libp2p::{
    core::{muxing::StreamMuxerBox, transport::Boxed},
    gossipsub::Event,
    identity, noise,
    swarm::SwarmEvent,
    tcp::Config as TcpConfig,
    yamux,
};
use log::{debug, error, info, trace, warn};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::messages::NetworkTopic;
use crate::network::Network;
use crate::peer::{NodeInfo, PeerInfo};
use crate::{
    behaviour::{PeerNetworkBehaviour, PeerNetworkEvent},
    config::Config,
    messages::{Inbound, MessageGateChain},
    network::Command,
    utilities,
};

/// start p2p networking and return the handle [Network] of this process.
///
/// Every gate in `message_gates` gets the topics it asks for subscribed before the network
/// thread starts, so no message published on them after this call returns is missed.
pub async fn start(config: Config, message_gates: MessageGateChain) -> Result<Network> {
    let local_public_address = utilities::public_address(&config.keypair.public())
        .ok_or_else(|| Error::InvalidKey("node key must be an Ed25519 key".to_string()))?;
    let local_peer_id = config.keypair.public().to_peer_id();

    // 1. Instantiate Swarm
    let transport = build_transport(config.keypair.clone())?;
    let behaviour = PeerNetworkBehaviour::new(local_public_address, &config)?;
    let mut swarm = SwarmBuilder::with_tokio_executor(transport, behaviour, local_peer_id).build();

    swarm
        .listen_on(utilities::multiaddr(Ipv4Addr::UNSPECIFIED, config.port))
        .map_err(|e| Error::Transport(e.to_string()))?;

    // 2. Peer Discovery - connection to bootstrap nodes
    for peer_info in &config.boot_nodes {
        swarm.behaviour_mut().add_address(
            &peer_info.peer_id,
            utilities::multiaddr(peer_info.ip_address, peer_info.port),
        );
        if let Err(e) = swarm.dial(peer_info.multiaddr()) {
            warn!("Failed to dial boot node {}: {}", peer_info.peer_id, e);
        }
    }

    // 3. Prepare Messaging Protocols
    swarm.behaviour_mut().subscribe(message_gates.topics())?;

    // 4. Start p2p networking
    let (sender, mut receiver) =
        tokio::sync::mpsc::channel::<Command>(config.send_command_buffer_size);
    let mut discover_tick =
        tokio::time::interval(Duration::from_secs(config.peer_discovery_interval));
    let max_peers = config.max_peers;

    let network_thread_handle = tokio::task::spawn(async move {
        let mut connected: HashMap<PeerId, PeerInfo> = HashMap::new();

        loop {
            // 4.1 Wait until an Event comes
            let (command, event) = tokio::select! {
                biased;
                // Receive a Libp2p event
                event = swarm.select_next_some() => {
                    (None, Some(event))
                },
                // Receive a command from application
                command = receiver.recv() => match command {
                    Some(command) => (Some(command), None),
                    // every handle is gone, nobody can talk to this peer anymore
                    None => break,
                },
                // Time for network discovery
                _ = discover_tick.tick() => {
                    // Perform a random walk on DHT
                    swarm.behaviour_mut().random_walk();
                    (None, None)
                },
            };

            // 4.2 Deliver messages when received a Command from application
            if let Some(command) = command {
                match command {
                    Command::SendTo(address, raw_message) => {
                        if address == local_public_address {
                            let inbound = Inbound {
                                source: local_peer_id,
                                topic: NetworkTopic::from(local_public_address).hash(),
                                message: raw_message,
                            };
                            message_gates.message_in(inbound).await;
                        } else if let Err(e) = swarm.behaviour_mut().send_to(address, raw_message) {
                            error!("{:?}", e);
                        }
                    }
                    Command::Broadcast(topic, msg) => {
                        trace!("Broadcast (Topic: {:?})", topic);
                        if let Err(e) = swarm.behaviour_mut().broadcast(topic.into(), msg) {
                            debug!("{:?}", e);
                        }
                    }
                    Command::Dial(address) => {
                        if let Err(e) = swarm.dial(address.clone()) {
                            warn!("Failed to dial {}: {}", address, e);
                        }
                    }
                    Command::Peers(reply) => {
                        let _ = reply.send(connected.values().cloned().collect());
                    }
                    Command::NodeInfo(reply) => {
                        let _ = reply.send(NodeInfo {
                            peer_id: local_peer_id,
                            public_address: local_public_address,
                            listen_addrs: swarm.listeners().cloned().collect(),
                        });
                    }
                }
            }

            // 4.3 Deliver messages when received a Libp2p Event
            if let Some(event) = event {
                match event {
                    SwarmEvent::Behaviour(PeerNetworkEvent::Gossip(Event::Message {
                        propagation_source,
                        message,
                        ..
                    })) => {
                        if swarm.behaviour().is_subscribed(&message) {
                            let inbound = Inbound {
                                source: propagation_source,
                                topic: message.topic,
                                message: message.data,
                            };
                            message_gates.message_in(inbound).await;
                        } else {
                            debug!("Receive unknown gossip message");
                        }
                    }
                    SwarmEvent::Behaviour(PeerNetworkEvent::Gossip(Event::Subscribed {
                        peer_id,
                        topic,
                    })) => {
                        trace!("{} subscribed to {}", peer_id, topic);
                    }
                    SwarmEvent::Behaviour(PeerNetworkEvent::Identify(
                        IdentifyEvent::Received { peer_id, info },
                    )) => {
                        info.listen_addrs.iter().for_each(|a| {
                            swarm.behaviour_mut().add_address(&peer_id, a.clone());
                        });
                        if let Some(peer) = connected.get_mut(&peer_id) {
                            peer.agent = Some(info.agent_version);
                        }
                    }
                    SwarmEvent::NewListenAddr { address, .. } => {
                        info!("Listening on {}/p2p/{}", address, local_peer_id);
                    }
                    SwarmEvent::ConnectionEstablished {
                        peer_id,
                        endpoint,
                        num_established,
                        ..
                    } => {
                        if num_established.get() == 1 {
                            if connected.len() >= max_peers {
                                warn!("Too many peers, dropping {}", peer_id);
                                let _ = swarm.disconnect_peer_id(peer_id);
                            } else {
                                let info = PeerInfo {
                                    peer_id,
                                    address: endpoint.get_remote_address().clone(),
                                    agent: None,
                                };
                                info!("Peer connected: {}", info);
                                connected.insert(peer_id, info);
                            }
                        }
                    }
                    SwarmEvent::ConnectionClosed {
                        peer_id,
                        num_established,
                        ..
                    } => {
                        debug!("ConnectionClosed {}", peer_id);
                        if num_established == 0 {
                            swarm.behaviour_mut().remove_peer(&peer_id);
                            if connected.remove(&peer_id).is_some() {
                                info!("Peer disconnected: {}", peer_id);
                            }
                        }
                    }
                    SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                        debug!("Outgoing connection to {:?} failed: {}", peer_id, error);
                    }
                    _ => {}
                }
            }
        }
        debug!("Network thread of {} exits", local_peer_id);
    });

    Ok(Network {
        network_thread: network_thread_handle,
        sender,
    })
}

fn build_transport(keypair: identity::Keypair) -> Result<Boxed<(PeerId, StreamMuxerBox)>> {
    let transport = {
        let tcp = libp2p::tcp::tokio::Transport::new(TcpConfig::new().nodelay(true));
        TokioDnsConfig::system(tcp)?
    };

    Ok(transport
        .upgrade(libp2p::core::upgrade::Version::V1)
        .authenticate(noise::Config::new(&keypair).map_err(|e| Error::Transport(e.to_string()))?)
        .multiplex(yamux::Config::default())
        .timeout(Duration::from_secs(20))
        .boxed())
}
