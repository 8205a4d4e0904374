//! Pings, timeouts and downlist eviction of dead contacts.

use std::time::{Duration, Instant};

use kadnode::{actor::RpcError, Dht, DhtBuilder, DhtError, Id, Testnet};

fn builder() -> DhtBuilder {
    let mut builder = Dht::builder();
    builder
        .request_timeout(Duration::from_millis(200))
        .downlist_interval(Duration::from_millis(100))
        .failed_rpc_tolerance(2);

    builder
}

/// Poll `condition` until it holds or `timeout` elapsed.
fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    condition()
}

#[test]
fn ping() {
    let testnet = Testnet::with_builder(3, &builder()).unwrap();

    let contact = testnet.nodes[2].local_contact().unwrap();

    testnet.nodes[1].ping(&contact).unwrap();
    testnet.nodes[1].ping_id(*contact.id()).unwrap();
}

#[test]
fn ping_unknown_id() {
    let testnet = Testnet::with_builder(2, &builder()).unwrap();

    assert_eq!(
        testnet.nodes[1].ping_id(Id::random()),
        Err(DhtError::Rpc(RpcError::NotFound))
    );
}

#[test]
fn ping_node_that_left() {
    let testnet = Testnet::with_builder(3, &builder()).unwrap();

    let contact = testnet.nodes[2].local_contact().unwrap();
    testnet.nodes[2].leave().unwrap();

    assert_eq!(
        testnet.nodes[1].ping(&contact),
        Err(DhtError::Rpc(RpcError::Timeout))
    );
}

#[test]
fn ping_node_that_shutdown() {
    let mut testnet = Testnet::with_builder(3, &builder()).unwrap();

    let mut node = testnet.nodes.remove(2);
    let contact = node.local_contact().unwrap();
    node.shutdown();

    assert_eq!(
        testnet.nodes[1].ping(&contact),
        Err(DhtError::Rpc(RpcError::Timeout))
    );
}

#[test]
fn downlisted_contact_is_evicted() {
    let testnet = Testnet::with_builder(3, &builder()).unwrap();

    let bootstrap = &testnet.nodes[0];
    let reporter = &testnet.nodes[1];
    let dead = &testnet.nodes[2];

    let contact = dead.local_contact().unwrap();
    let id = *contact.id();

    // Make sure both nodes know the soon to be dead contact.
    reporter.ping(&contact).unwrap();
    assert!(bootstrap.contact(id).unwrap().is_some());

    dead.leave().unwrap();

    for _ in 0..2 {
        assert_eq!(reporter.ping(&contact), Err(DhtError::Rpc(RpcError::Timeout)));
    }

    // The reporter gossips its suspicion, and the bootstrap node removes
    // the contact once its own probe times out.
    assert!(eventually(Duration::from_secs(5), || bootstrap
        .contact(id)
        .unwrap()
        .is_none()));
}

#[test]
fn responsive_contact_survives_downlist() {
    let testnet = Testnet::with_builder(4, &builder()).unwrap();

    let bootstrap = &testnet.nodes[0];
    let reporter = &testnet.nodes[1];
    let target = testnet.nodes[2].local_contact().unwrap();
    let id = *target.id();

    assert!(bootstrap.contact(id).unwrap().is_some());

    // The reporter can't reach the target through a wrong address, but
    // the bootstrap node still can.
    let unreachable = target.clone().with_address(([127, 0, 0, 1], 1).into());
    for _ in 0..2 {
        assert_eq!(
            reporter.ping(&unreachable),
            Err(DhtError::Rpc(RpcError::Timeout))
        );
    }

    std::thread::sleep(Duration::from_secs(1));

    assert!(bootstrap.contact(id).unwrap().is_some());
}
