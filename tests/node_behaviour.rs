use std::net::Ipv4Addr;
use std::time::Duration;

use libp2p::identity::Keypair;
use tokio::time::{sleep, Instant};
use whisper_node::{
    messages::MessageGateChain,
    utilities,
    whisper::{Filter, MessageParams, SymKey, TopicType, Whisper, WhisperConfig},
    Config, Network, Peer,
};

async fn spawn_node(config: Config) -> (Network, Whisper) {
    let whisper = Whisper::new(WhisperConfig::default());
    let network = whisper_node::start(config, MessageGateChain::new().chain(whisper.gate()))
        .await
        .unwrap();
    whisper.start(&network).await.unwrap();
    (network, whisper)
}

fn key() -> SymKey {
    SymKey::try_from(&b"whisperv6 message test.........."[..]).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn peer_cap_limits_connected_peers() {
    let keypair_a = Keypair::generate_ed25519();
    let address_a = utilities::public_address(&keypair_a.public()).unwrap();
    let (network_a, _whisper_a) =
        spawn_node(Config::from_keypair(keypair_a).set_port(47321).set_max_peers(1)).await;

    let boot = Peer::new(address_a, Ipv4Addr::LOCALHOST, 47321).unwrap();
    let (network_b, _whisper_b) =
        spawn_node(Config::new().set_port(47322).set_boot_nodes(vec![boot.clone()])).await;
    let (network_c, _whisper_c) =
        spawn_node(Config::new().set_port(47323).set_boot_nodes(vec![boot])).await;

    let mut max_connected = 0;
    let deadline = Instant::now() + Duration::from_secs(8);
    while Instant::now() < deadline {
        let connected = network_a.peers().await.unwrap().len();
        assert!(connected <= 1, "{connected} peers connected with a cap of 1");
        max_connected = max_connected.max(connected);
        sleep(Duration::from_millis(200)).await;
    }
    assert_eq!(max_connected, 1);

    network_a.stop().await;
    network_b.stop().await;
    network_c.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn direct_message_to_own_address_reaches_local_filter() {
    let keypair = Keypair::generate_ed25519();
    let address = utilities::public_address(&keypair.public()).unwrap();
    let (network, whisper) = spawn_node(Config::from_keypair(keypair).set_port(47331)).await;
    let filter = whisper.subscribe(Filter::new(key()).allow_p2p(true)).await;

    whisper
        .send_p2p(
            address,
            MessageParams::new(TopicType::from_bytes(b"self"), key(), "to myself"),
        )
        .await
        .unwrap();

    let mut received = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while received.is_empty() && Instant::now() < deadline {
        sleep(Duration::from_millis(100)).await;
        received = whisper.retrieve(&filter).await.unwrap();
    }
    assert_eq!(received.len(), 1);
    assert!(received[0].p2p);
    assert_eq!(received[0].payload, b"to myself");

    network.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn post_without_peers_is_best_effort() {
    let (network, whisper) = spawn_node(Config::new().set_port(47341)).await;
    let filter = whisper.subscribe(Filter::new(key())).await;

    // nobody is subscribed to the broadcast topic, the network thread only logs the publish failure
    whisper
        .post(MessageParams::new(TopicType::from_bytes(b"lone"), key(), "anyone?"))
        .await
        .unwrap();

    let received = whisper.retrieve(&filter).await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(network.peers().await.unwrap().is_empty());

    network.stop().await;
}
