//! [Network], the handle type you use to send messages and query the peer.
//!
//! Network is returned from [start](crate::entrypoint::start). It keeps the thread operating the
//! peer alive--awaiting it waits for that thread, and [stop](Network::stop) aborts it.
//!
//! To send a message using Network, call its [sender](Network::sender) method to get a sender, then
//! call `.send()` on the sender passing in a [Command].

use crate::error::{Error, Result};
use crate::messages::{Message, NetworkTopic};
use crate::peer::{NodeInfo, PeerInfo};
use crate::PublicAddress;

use futures::{Future, FutureExt};
use libp2p::Multiaddr;
use tokio::{
    sync::{mpsc, oneshot},
    task::{JoinError, JoinHandle},
};

/// Network is the handle returned by [crate::entrypoint::start]. It provides
/// Inter-process messaging between application and p2p network.
pub struct Network {
    /// Network handle for the [tokio::task] which is the main thread for
    /// the p2p network (see [crate::entrypoint]).
    pub(crate) network_thread: JoinHandle<()>,

    /// mpsc sender for delivering message to p2p network
    pub(crate) sender: mpsc::Sender<Command>,
}

impl Network {
    /// sender is the channel for intake of Command so that message can be sent to network by the Engine.
    pub fn sender(&self) -> mpsc::Sender<Command> {
        self.sender.clone()
    }

    /// Peers currently connected to this node.
    pub async fn peers(&self) -> Result<Vec<PeerInfo>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Peers(tx)).await?;
        rx.await.map_err(|_| Error::NetworkClosed)
    }

    /// Identity and listen addresses of this node.
    pub async fn node_info(&self) -> Result<NodeInfo> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::NodeInfo(tx)).await?;
        rx.await.map_err(|_| Error::NetworkClosed)
    }

    /// Open a connection to the given address.
    pub async fn dial(&self, address: Multiaddr) -> Result<()> {
        self.send(Command::Dial(address)).await
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.sender
            .send(command)
            .await
            .map_err(|_| Error::NetworkClosed)
    }

    /// abort the networking process
    pub async fn stop(self) {
        self.network_thread.abort();
        log::debug!("whisper-node network stop!");
    }
}

impl Future for Network {
    type Output = std::result::Result<(), JoinError>;
    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        let mut s = self;
        s.network_thread.poll_unpin(cx)
    }
}

/// A command to the network thread: send a message either to a specific peer ([SendTo](Command::SendTo)),
/// or to all subscribers of a network topic ([Broadcast](Command::Broadcast)), or query its state.
pub enum Command {
    /// expects a peer with specific PublicAddress would be interested in
    SendTo(PublicAddress, Message),

    /// does not care which peer would be interested in
    Broadcast(NetworkTopic, Message),

    /// connect to a remote address
    Dial(Multiaddr),

    /// reply with the currently connected peers
    Peers(oneshot::Sender<Vec<PeerInfo>>),

    /// reply with the local node information
    NodeInfo(oneshot::Sender<NodeInfo>),
}
