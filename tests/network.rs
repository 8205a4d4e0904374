//! Joining, leaving and node lookups over an in-memory network.

use std::time::Duration;

use kadnode::{
    actor::{JoinError, NodeState, RpcError},
    Contact, Dht, DhtError, Id, Testnet,
};

#[test]
fn join_with_empty_bootstrap() {
    let testnet = Testnet::new(1).unwrap();
    let node = &testnet.nodes[0];

    let info = node.info().unwrap();

    assert_eq!(info.state(), NodeState::Joined);
    assert_eq!(info.routing_table_size(), 0);
    assert_eq!(testnet.bootstrap, vec![node.local_contact().unwrap()]);
}

#[test]
fn joined_nodes_know_each_other() {
    let testnet = Testnet::new(10).unwrap();

    for node in &testnet.nodes {
        let info = node.info().unwrap();

        assert_eq!(info.state(), NodeState::Joined);
        assert!(info.routing_table_size() > 0);
    }

    // The bootstrapping node heard from everyone.
    let bootstrap = &testnet.nodes[0];
    assert_eq!(
        bootstrap.info().unwrap().routing_table_size(),
        testnet.nodes.len() - 1
    );
}

#[test]
fn join_twice() {
    let testnet = Testnet::new(2).unwrap();

    assert_eq!(
        testnet.nodes[1].join(&testnet.bootstrap),
        Err(DhtError::Join(JoinError::AlreadyJoined))
    );
}

#[test]
fn bootstrap_failure_then_retry() {
    let testnet = Testnet::new(2).unwrap();

    let mut builder = Dht::builder();
    builder.request_timeout(Duration::from_millis(100));

    let node = testnet.spawn(&builder).unwrap();

    // Nothing listens on this port.
    let unreachable = Contact::new(Id::random(), ([127, 0, 0, 1], 1).into());

    assert_eq!(
        node.join(&[unreachable]),
        Err(DhtError::Join(JoinError::BootstrapFailed))
    );

    let info = node.info().unwrap();
    assert_eq!(info.state(), NodeState::NotJoined);
    assert_eq!(info.routing_table_size(), 0);

    node.join(&testnet.bootstrap).unwrap();

    assert_eq!(node.info().unwrap().state(), NodeState::Joined);
    assert!(node.info().unwrap().routing_table_size() > 0);
}

#[test]
fn join_with_callback() {
    let testnet = Testnet::new(3).unwrap();
    let node = testnet.spawn(&Dht::builder()).unwrap();

    let (sender, receiver) = flume::bounded(1);

    node.join_with_callback(&testnet.bootstrap, move |result| {
        let _ = sender.send(result);
    })
    .unwrap();

    assert_eq!(receiver.recv_timeout(Duration::from_secs(5)), Ok(Ok(())));
    assert_eq!(node.info().unwrap().state(), NodeState::Joined);
}

#[test]
fn leave_and_rejoin() {
    let testnet = Testnet::new(5).unwrap();
    let node = &testnet.nodes[4];

    node.leave().unwrap();

    let info = node.info().unwrap();
    assert_eq!(info.state(), NodeState::NotJoined);
    assert_eq!(info.routing_table_size(), 0);

    assert_eq!(node.find_node(Id::random()), Err(DhtError::NotJoined));

    node.join(&testnet.bootstrap).unwrap();

    assert_eq!(node.info().unwrap().state(), NodeState::Joined);
}

#[test]
fn find_node_returns_closest_first() {
    let testnet = Testnet::new(10).unwrap();

    let target = Id::random();
    let closest = testnet.nodes[3].find_node(target).unwrap();

    assert!(!closest.is_empty());

    for pair in closest.windows(2) {
        assert!(pair[0].id().distance(&target) <= pair[1].id().distance(&target));
    }
}

#[test]
fn get_contact() {
    let testnet = Testnet::new(10).unwrap();

    let target = testnet.nodes[9].local_contact().unwrap();
    let contact = testnet.nodes[5].get_contact(*target.id()).unwrap();

    assert_eq!(contact.id(), target.id());
    assert_eq!(contact.address(), target.address());
}

#[test]
fn get_contact_of_unknown_id() {
    let testnet = Testnet::new(5).unwrap();

    assert_eq!(
        testnet.nodes[2].get_contact(Id::random()),
        Err(DhtError::Rpc(RpcError::NotFound))
    );
}

#[test]
fn to_bootstrap() {
    let testnet = Testnet::new(5).unwrap();

    let contacts = testnet.nodes[0].to_bootstrap().unwrap();
    assert_eq!(contacts.len(), 4);

    let node = testnet.spawn(&Dht::builder()).unwrap();
    node.join(&contacts).unwrap();

    assert_eq!(node.info().unwrap().state(), NodeState::Joined);
}
