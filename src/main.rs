use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use env_logger::{Env, Target};
use log::{error, info, trace, warn};
use tokio::time::sleep;

use whisper_node::{
    keyfile,
    messages::MessageGateChain,
    utilities,
    whisper::{Filter, MessageParams, SymKey, TopicType, Whisper, WhisperConfig},
    Config, Network, Peer, PeerInfo,
};

/// Public key of the second demo node, trusted for direct messages.
const NODE2_PUBLIC_KEY: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

const DEMO_SYM_KEY: &str = "whisperv6 message test..........";

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "whisper-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File holding the node identity, created when missing
    #[arg(long, default_value = "node1.key")]
    key_file: PathBuf,

    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    #[arg(long, default_value_t = 10)]
    max_peers: usize,

    /// Boot node as <hex public key>@<ipv4>:<port>
    #[arg(short = 'B', long = "boot-node", value_name = "PEER")]
    boot_nodes: Vec<Peer>,

    /// Hex public key of the peer allowed to send direct messages
    #[arg(long, default_value = NODE2_PUBLIC_KEY)]
    trusted_peer: String,

    /// 32 byte symmetric key of the filter
    #[arg(long, default_value = DEMO_SYM_KEY)]
    sym_key: String,

    /// Broadcast this text every second
    #[arg(long)]
    post: Option<String>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("trace"))
        .target(Target::Stdout)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let keypair = keyfile::load_or_generate(&args.key_file)?;
    let sym_key = SymKey::try_from(args.sym_key.as_bytes())?;

    let whisper = Whisper::new(WhisperConfig::default());
    let config = Config::from_keypair(keypair)
        .set_port(args.port)
        .set_max_peers(args.max_peers)
        .set_boot_nodes(args.boot_nodes);

    let network =
        match whisper_node::start(config, MessageGateChain::new().chain(whisper.gate())).await {
            Ok(network) => network,
            Err(e) => {
                println!("could not start server: {e}");
                process::exit(1);
            }
        };
    whisper.start(&network).await?;
    info!("Node info: {}", network.node_info().await?);

    let filter_id = whisper
        .subscribe(Filter::new(sym_key.clone()).allow_p2p(true))
        .await;
    tokio::spawn(log_received(whisper.clone(), filter_id));

    if let Some(text) = args.post {
        tokio::spawn(post_periodically(whisper.clone(), sym_key, text));
    }

    trust_peer_once_connected(&network, &whisper, &args.trusted_peer).await?;

    network.await?;
    warn!("Network stopped");
    Ok(())
}

/// Log connected peers every second. As soon as there is one, trust `trusted_peer` for direct
/// messages and return.
async fn trust_peer_once_connected(
    network: &Network,
    whisper: &Whisper,
    trusted_peer: &str,
) -> whisper_node::Result<()> {
    loop {
        sleep(POLL_INTERVAL).await;
        let peers = network.peers().await?;
        if trust_peer_if_connected(&peers, whisper, trusted_peer).await {
            return Ok(());
        }
    }
}

/// One round of [trust_peer_once_connected]. Returns true once the round with a connected peer
/// has run; failures to parse or trust `trusted_peer` are logged and still end the polling.
async fn trust_peer_if_connected(peers: &[PeerInfo], whisper: &Whisper, trusted_peer: &str) -> bool {
    for peer in peers {
        info!("print peer info id={} name={}", peer.peer_id, peer);
    }
    if peers.is_empty() {
        return false;
    }

    match utilities::parse_public_address(trusted_peer) {
        Ok(address) => {
            if let Err(e) = whisper.allow_p2p_messages_from_peer(&address).await {
                error!("AllowP2PMessagesFromPeer failed: {e}");
            }
        }
        Err(e) => error!("Failed to parse trusted peer: {e}"),
    }
    true
}

async fn log_received(whisper: Whisper, filter_id: String) {
    loop {
        sleep(POLL_INTERVAL).await;
        trace!("filter.Retrieve");
        match whisper.retrieve(&filter_id).await {
            Ok(messages) => {
                for message in messages {
                    info!(
                        "recvd msg topic={} payload={}",
                        message.topic,
                        String::from_utf8_lossy(&message.payload)
                    );
                }
            }
            Err(e) => {
                error!("{e}");
                return;
            }
        }
    }
}

async fn post_periodically(whisper: Whisper, key: SymKey, text: String) {
    let topic = TopicType::from_bytes(b"demo");
    loop {
        sleep(POLL_INTERVAL).await;
        if let Err(e) = whisper
            .post(MessageParams::new(topic, key.clone(), text.as_bytes()))
            .await
        {
            warn!("Post failed: {e}");
        }
    }
}
