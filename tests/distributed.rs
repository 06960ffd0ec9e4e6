use std::{io::Write, net::SocketAddr, sync::mpsc, thread, time::Duration};

use online_gd::{
    Example, GdConfig, GdErr,
    config::DistributedSpec,
    synchronization::{AllReduce, LocalGroup, SpanServer, TcpAllReduce},
    training::Driver,
};
use tokio::runtime::Runtime;

fn example(label: f32, features: &[(f32, u32)]) -> Example {
    let mut ec = Example::new(Some(label));
    for &(x, index) in features {
        ec.push_feature(b'a', x, index);
    }
    ec.add_constant();
    ec
}

/// Trains one pass on each node's own shard and returns the resulting table.
fn train_shards(config: &'static str) -> Vec<Vec<f32>> {
    let shards = [
        vec![example(1., &[(1., 3), (0.5, 7)]), example(0., &[(2., 5)])],
        vec![example(0.5, &[(1., 3)]), example(1., &[(1., 9), (1., 5)])],
    ];

    let handles: Vec<_> = LocalGroup::new_group(2)
        .into_iter()
        .zip(shards)
        .map(|(member, mut shard)| {
            thread::spawn(move || {
                let cfg = GdConfig::from_json(config).unwrap();
                let mut driver = Driver::from_config(cfg).unwrap();
                driver.context_mut().all_reduce = Some(Box::new(member));

                for ec in shard.iter_mut() {
                    driver.learn(ec);
                }
                driver.end_pass().unwrap();

                driver.context().weights.as_slice().to_vec()
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn adaptive_nodes_agree_after_a_pass() {
    let tables = train_shards(r#"{ "num_bits": 6 }"#);

    assert_eq!(tables[0], tables[1]);
    assert!(tables[0].iter().any(|w| *w != 0.));
}

#[test]
fn plain_nodes_agree_after_a_pass() {
    let tables = train_shards(r#"{ "num_bits": 6, "update_rule": { "invariant": true } }"#);

    assert_eq!(tables[0], tables[1]);

    // Feature 7 is only seen by the first node, so its weight is halved.
    assert!(tables[0][7] != 0.);
}

fn spawn_span_server() -> SocketAddr {
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let runtime = Runtime::new().unwrap();
        runtime.block_on(async {
            let server = SpanServer::bind("127.0.0.1:0".parse().unwrap())
                .await
                .unwrap();
            tx.send(server.local_addr().unwrap()).unwrap();
            let _ = server.run().await;
        });
    });

    rx.recv().unwrap()
}

fn spec(span_server: SocketAddr, unique_id: u64, node: usize, total: usize) -> DistributedSpec {
    DistributedSpec {
        span_server,
        unique_id,
        total,
        node,
        timeout_ms: 5_000,
    }
}

#[test]
fn span_server_sums_every_node() {
    const NODES: usize = 3;
    let addr = spawn_span_server();

    let handles: Vec<_> = (0..NODES)
        .map(|node| {
            thread::spawn(move || {
                let mut member = TcpAllReduce::connect(&spec(addr, 11, node, NODES)).unwrap();
                assert_eq!(member.node(), node);
                assert_eq!(member.total(), NODES);

                let mut first = [node as f32, 1.];
                member.all_reduce_sum(&mut first).unwrap();

                let mut second = [2. * node as f32; 4];
                member.all_reduce_sum(&mut second).unwrap();
                (first, second)
            })
        })
        .collect();

    for handle in handles {
        let (first, second) = handle.join().unwrap();
        assert_eq!(first, [3., 3.]);
        assert_eq!(second, [6.; 4]);
    }
}

#[test]
fn stray_connections_do_not_pin_the_group() {
    let addr = spawn_span_server();

    let mut stray = std::net::TcpStream::connect(addr).unwrap();
    let hello = [1u64, 7, 2].map(u64::to_be_bytes).concat();
    stray.write_all(&hello).unwrap();

    let mut truncated = std::net::TcpStream::connect(addr).unwrap();
    truncated.write_all(&3u64.to_be_bytes()).unwrap();
    drop(truncated);

    let handles: Vec<_> = (0..2)
        .map(|node| {
            thread::spawn(move || {
                let mut member = TcpAllReduce::connect(&spec(addr, 3, node, 2)).unwrap();
                let mut buf = [node as f32 + 1.];
                member.all_reduce_sum(&mut buf).unwrap();
                buf
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), [3.]);
    }
    drop(stray);
}

#[test]
fn drivers_synchronize_through_the_span_server() {
    let addr = spawn_span_server();

    let handles: Vec<_> = (0..2)
        .map(|node| {
            thread::spawn(move || {
                let json = format!(
                    r#"{{ "num_bits": 5, "update_rule": {{ "invariant": true }},
                         "distributed": {{ "span_server": "{addr}", "unique_id": 4, "total": 2, "node": {node} }} }}"#
                );
                let mut driver = Driver::from_config(GdConfig::from_json(&json).unwrap()).unwrap();

                let mut ec = example(1., &[(1., 2 + node as u32)]);
                driver.learn(&mut ec);
                driver.end_pass().unwrap();

                driver.context().weights.as_slice().to_vec()
            })
        })
        .collect();

    let tables: Vec<Vec<f32>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(tables[0], tables[1]);
    assert!(tables[0][2] > 0. && tables[0][3] > 0.);
}

#[test]
fn lone_node_times_out() {
    let addr = spawn_span_server();
    let mut spec = spec(addr, 5, 0, 2);
    spec.timeout_ms = 200;

    let mut member = TcpAllReduce::connect(&spec).unwrap();
    let mut buf = [1.];
    let err = member.all_reduce_sum(&mut buf).unwrap_err();

    assert!(matches!(
        err,
        GdErr::SyncTimeout { node: 0, after } if after == Duration::from_millis(200)
    ));
}
