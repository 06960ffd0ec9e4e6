use std::{env, fs::File, io::BufReader, net::SocketAddr};

use anyhow::{Context, Result, bail};
use log::info;
use tokio::{runtime::Runtime, signal};

use online_gd::{GdConfig, data, synchronization::SpanServer, training::Driver};

fn train(config: &str, data_path: &str) -> Result<()> {
    let cfg = GdConfig::from_file(config).with_context(|| format!("loading {config}"))?;
    let file = File::open(data_path).with_context(|| format!("opening {data_path}"))?;
    let mut examples = data::read_examples(BufReader::new(file))?;
    info!("read {} examples from {data_path}", examples.len());

    let mut driver = Driver::from_config(cfg)?;
    driver.run(&mut examples)?;

    let sd = &driver.context().sd;
    info!(
        examples = sd.example_number,
        weighted_examples = sd.weighted_examples,
        passes = driver.context().current_pass;
        "average loss {:.6}",
        sd.average_loss()
    );

    Ok(())
}

fn span_server(addr: &str) -> Result<()> {
    let addr: SocketAddr = addr.parse().with_context(|| format!("bad address {addr}"))?;

    Runtime::new()?.block_on(async {
        let server = SpanServer::bind(addr).await?;
        info!("span server listening at {}", server.local_addr()?);

        tokio::select! {
            ret = server.run() => ret?,
            _ = signal::ctrl_c() => info!("interrupted, shutting down"),
        }

        Ok::<_, anyhow::Error>(())
    })
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    match args.as_slice() {
        [_, mode, config, data_path] if mode == "train" => train(config, data_path),
        [_, mode, addr] if mode == "span-server" => span_server(addr),
        _ => bail!(
            "usage: {} train <config.json> <data> | span-server <address>",
            args.first().map(String::as_str).unwrap_or("online_gd")
        ),
    }
}
