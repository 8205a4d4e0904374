use std::time::{Duration, Instant};

use clap::Parser;
use tracing::Level;

use kadnode::{Dht, FindValueResult, Id, SignedRequest, SignedValue, SigningKey, Testnet};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Value to store on the testnet
    value: String,
    /// Number of nodes
    #[arg(short, long, default_value_t = 20)]
    nodes: usize,
    /// Replication factor and bucket size
    #[arg(short, default_value_t = 4)]
    k: usize,
    /// Log every message
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            Level::TRACE
        } else {
            Level::INFO
        })
        .with_thread_names(true)
        .init();

    let start = Instant::now();

    let mut builder = Dht::builder();
    builder.k(cli.k);

    let testnet = Testnet::with_builder(cli.nodes, &builder).expect("testnet");

    println!(
        "\nStarted a testnet of {} nodes in {:?} seconds\n",
        testnet.nodes.len(),
        start.elapsed().as_secs_f32()
    );

    let signer = SigningKey::from_bytes(&rand::random());
    let key = Id::hash(cli.value.as_bytes());

    let value = SignedValue::new(&signer, cli.value.as_bytes());
    let request = SignedRequest::new(&signer, &key);

    let start = Instant::now();

    let summary = testnet.nodes[0]
        .store(key, value.clone(), request, Duration::from_secs(3600))
        .expect("store failed");

    println!(
        "Stored {:?} at {}/{} nodes in {:?} seconds",
        key,
        summary.accepted,
        summary.contacted,
        start.elapsed().as_secs_f32()
    );

    for (i, node) in testnet.nodes.iter().enumerate() {
        let start = Instant::now();

        match node.find_value(key).expect("find_value failed") {
            FindValueResult::Found(values) => println!(
                "node {i:>3}: found {} value(s) in {:?} seconds, original: {}",
                values.len(),
                start.elapsed().as_secs_f32(),
                values.contains(&value)
            ),
            FindValueResult::NotFound { closest } => println!(
                "node {i:>3}: not found, {} closest nodes responded",
                closest.len()
            ),
        }
    }

    for mut node in testnet.nodes {
        node.shutdown();
    }
}
