//! Micro-benchmarks for RoutingTable operations: add, closest, and remove
//! at varying table sizes. Reports nanoseconds-per-operation.
//!
//! Run: `cargo bench --bench routing_table`

use std::net::SocketAddr;
use std::time::Instant;

use kadnode::{Contact, Id, RoutingTable};

fn main() {
    println!("routing_table\n");

    bench_add();
    bench_closest();
    bench_remove();
}

fn contact(port: u16) -> Contact {
    Contact::new(Id::random(), SocketAddr::from(([127, 0, 0, 1], port)))
}

fn bench_add() {
    println!("add");

    // Pre-generate random contacts outside the timed section
    let contacts: Vec<_> = (0..1000).map(contact).collect();

    // Empty table
    {
        let mut table = RoutingTable::new(Id::random());
        let start = Instant::now();
        for contact in contacts.iter().cloned() {
            table.add(contact);
        }
        let per_op = start.elapsed().as_nanos() / contacts.len() as u128;
        println!(
            "empty table:     {per_op}ns/op (final size: {})",
            table.size()
        );
    }

    // Pre-filled table (100 contacts)
    {
        let mut table = RoutingTable::new(Id::random());
        for contact in contacts[..100].iter().cloned() {
            table.add(contact);
        }

        let fresh: Vec<_> = (0..1000).map(contact).collect();
        let start = Instant::now();
        for contact in fresh {
            table.add(contact);
        }
        let per_op = start.elapsed().as_nanos() / 1000;
        println!("half-full table: {per_op}ns/op");
    }

    // Small buckets fill up quickly and answer with `Full`
    {
        let mut table = RoutingTable::with_params(Id::random(), 4, 2);
        for port in 0..400 {
            table.add(contact(port));
        }

        let fresh: Vec<_> = (0..1000).map(contact).collect();
        let start = Instant::now();
        for contact in fresh {
            table.add(contact);
        }
        let per_op = start.elapsed().as_nanos() / 1000;
        println!("full table (k=4): {per_op}ns/op");
    }

    println!();
}

fn bench_closest() {
    println!("closest");

    let targets: Vec<_> = (0..1000).map(|_| Id::random()).collect();

    for size in [50, 100, 200, 400] {
        let mut table = RoutingTable::new(Id::random());
        for port in 0..size {
            table.add(contact(port));
        }

        let start = Instant::now();
        for target in &targets {
            let _ = table.closest(target, table.k(), &[]);
        }
        let per_op = start.elapsed().as_nanos() / targets.len() as u128;
        println!("{size:>3} contacts: {per_op}ns/op");
    }

    println!();
}

fn bench_remove() {
    println!("remove");

    let mut table = RoutingTable::new(Id::random());

    let mut ids = Vec::new();
    for port in 0..200 {
        let contact = contact(port);
        ids.push(*contact.id());
        table.add(contact);
    }

    let n = ids.len();
    let start = Instant::now();
    for id in &ids {
        table.remove(id);
    }
    let per_op = start.elapsed().as_nanos() / n as u128;
    println!("{per_op}ns/op ({n} removals)");
    println!();
}
