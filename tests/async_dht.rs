#![cfg(feature = "async")]

use std::time::Duration;

use futures::executor::block_on;

use kadnode::{
    actor::NodeState, Dht, FindValueResult, Id, SignedRequest, SignedValue, SigningKey, Testnet,
};

#[test]
fn join_alone() {
    let network = kadnode::actor::MemoryNetwork::new();
    let dht = Dht::builder()
        .build_with_transport(network.bind(None).unwrap())
        .as_async();

    block_on(async {
        dht.join(&[]).await.unwrap();

        assert_eq!(dht.info().await.unwrap().state(), NodeState::Joined);
    });
}

#[test]
fn store_and_find() {
    let mut builder = Dht::builder();
    builder.k(4);

    let testnet = Testnet::with_builder(10, &builder).unwrap();

    let writer = testnet.nodes[0].clone().as_async();
    let reader = testnet.nodes[9].clone().as_async();

    let signer = SigningKey::from_bytes(&[7; 32]);
    let key = Id::hash(b"async");
    let value = SignedValue::new(&signer, b"Hello World!");

    block_on(async {
        let summary = writer
            .store(
                key,
                value.clone(),
                SignedRequest::new(&signer, &key),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        assert!(summary.accepted >= 3);

        match reader.find_value(key).await.unwrap() {
            FindValueResult::Found(values) => assert_eq!(values, vec![value]),
            FindValueResult::NotFound { .. } => panic!("value not found"),
        }
    });
}

#[test]
fn get_contact() {
    let testnet = Testnet::new(5).unwrap();

    let target = testnet.nodes[4].local_contact().unwrap();
    let dht = testnet.nodes[1].clone().as_async();

    let contact = block_on(dht.get_contact(*target.id())).unwrap();

    assert_eq!(contact.address(), target.address());
}
