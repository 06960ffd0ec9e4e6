use std::{io, net::SocketAddr, time::Duration};

use log::{debug, info, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    runtime::{Builder, Runtime},
    time,
};

use super::{
    AllReduce,
    frame::{read_floats_into, read_len, write_frame},
};
use crate::{GdErr, Result, config::DistributedSpec};

const HELLO_LEN: usize = 3;
const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

/// The rendezvous point of a training group. It accepts one connection per node
/// and then serves all-reduce rounds until the nodes disconnect.
pub struct SpanServer {
    listener: TcpListener,
}

impl SpanServer {
    /// Binds a new `SpanServer`.
    ///
    /// # Arguments
    /// * `addr` - The address to listen on, port `0` picks a free one.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    async fn accept_group(&self) -> Result<Vec<TcpStream>> {
        let mut slots: Vec<Option<TcpStream>> = Vec::new();
        let mut group: Option<(u64, usize)> = None;

        loop {
            let (mut stream, peer) = self.listener.accept().await?;
            stream.set_nodelay(true)?;

            let hello = time::timeout(HELLO_TIMEOUT, read_hello(&mut stream)).await;
            let Ok(Ok([unique_id, node, total])) = hello else {
                warn!(peer:? = peer; "dropping connection without a valid hello");
                continue;
            };
            let (node, total) = (node as usize, total as usize);

            let (expected_id, expected_total) = group.unwrap_or((unique_id, total));
            if unique_id != expected_id || total != expected_total || node >= total {
                warn!(peer:? = peer, node = node; "rejecting node from another group");
                continue;
            }
            group = Some((unique_id, total));

            slots.resize_with(total, || None);
            if slots[node].is_some() {
                warn!(peer:? = peer, node = node; "rejecting duplicate node");
                continue;
            }

            debug!(peer:? = peer, node = node; "node joined");
            slots[node] = Some(stream);

            if slots.iter().all(Option::is_some) {
                info!(unique_id = unique_id, total = total; "training group complete");
                return Ok(slots.into_iter().flatten().collect());
            }
        }
    }

    /// Accepts a full group and serves all-reduce rounds until any node closes
    /// its connection.
    pub async fn run(self) -> Result<()> {
        let mut streams = self.accept_group().await?;
        let mut rounds = 0usize;

        loop {
            let mut sum: Vec<f32> = Vec::new();

            for (node, stream) in streams.iter_mut().enumerate() {
                let Some(len) = read_len(stream).await? else {
                    info!(rounds = rounds; "node {node} left, closing the group");
                    return Ok(());
                };

                if len % size_of::<f32>() != 0 {
                    return Err(GdErr::SyncFailed {
                        node,
                        detail: format!("frame of {len} bytes is not a whole number of floats"),
                    });
                }

                let mut contribution = vec![0f32; len / size_of::<f32>()];
                stream
                    .read_exact(bytemuck::cast_slice_mut(&mut contribution))
                    .await?;

                if node == 0 {
                    sum = contribution;
                } else if contribution.len() != sum.len() {
                    return Err(GdErr::SizeMismatch {
                        what: "all-reduce contribution",
                        got: contribution.len(),
                        expected: sum.len(),
                    });
                } else {
                    sum.iter_mut()
                        .zip(&contribution)
                        .for_each(|(s, c)| *s += c);
                }
            }

            for stream in streams.iter_mut() {
                write_frame(stream, bytemuck::cast_slice(&sum)).await?;
            }

            rounds += 1;
        }
    }
}

async fn read_hello(stream: &mut TcpStream) -> io::Result<[u64; HELLO_LEN]> {
    let mut hello = [0u64; HELLO_LEN];
    stream
        .read_exact(bytemuck::cast_slice_mut(&mut hello))
        .await?;
    Ok(hello.map(u64::from_be))
}

/// A node's connection to a `SpanServer`, exposed through the blocking
/// `AllReduce` interface.
pub struct TcpAllReduce {
    runtime: Runtime,
    stream: TcpStream,
    node: usize,
    total: usize,
    timeout: Duration,
}

impl TcpAllReduce {
    /// Connects to the span server and announces this node.
    ///
    /// # Arguments
    /// * `spec` - Where the server is and which node this is.
    pub fn connect(spec: &DistributedSpec) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let node = spec.node;
        let timeout = spec.timeout();

        let stream = runtime.block_on(async {
            let mut stream = time::timeout(timeout, TcpStream::connect(spec.span_server))
                .await
                .map_err(|_| GdErr::SyncTimeout {
                    node,
                    after: timeout,
                })??;
            stream.set_nodelay(true)?;

            let hello = [spec.unique_id, node as u64, spec.total as u64].map(u64::to_be);
            stream.write_all(bytemuck::cast_slice(&hello)).await?;
            Ok::<_, GdErr>(stream)
        })?;

        info!(node = node, total = spec.total; "connected to span server {}", spec.span_server);

        Ok(Self {
            runtime,
            stream,
            node,
            total: spec.total,
            timeout,
        })
    }
}

impl AllReduce for TcpAllReduce {
    fn all_reduce_sum(&mut self, buf: &mut [f32]) -> Result<()> {
        let Self {
            runtime,
            stream,
            node,
            timeout,
            ..
        } = self;

        let exchange = async {
            write_frame(&mut *stream, bytemuck::cast_slice(buf)).await?;
            read_floats_into(&mut *stream, buf).await
        };

        match runtime.block_on(time::timeout(*timeout, exchange)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(GdErr::SyncFailed {
                node: *node,
                detail: e.to_string(),
            }),
            Err(_) => Err(GdErr::SyncTimeout {
                node: *node,
                after: *timeout,
            }),
        }
    }

    fn total(&self) -> usize {
        self.total
    }

    fn node(&self) -> usize {
        self.node
    }
}
