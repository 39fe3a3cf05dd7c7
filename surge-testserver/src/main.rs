use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use surge_testserver::{TestServerOptions, TestServerStats};
use tokio::net::TcpListener;

/// Local fraud-scoring API for trying out `surge` scenarios.
#[derive(Debug, Parser)]
#[command(name = "surge-testserver", version)]
struct Args {
    #[arg(long, default_value = "127.0.0.1:0")]
    bind: SocketAddr,

    /// Extra delay added to every `/predict` response, e.g. `15ms`.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "0s")]
    inference_latency: Duration,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let listener = TcpListener::bind(args.bind).await?;
    println!("HTTP_URL=http://{}", listener.local_addr()?);

    let opts = TestServerOptions {
        inference_latency: args.inference_latency,
    };
    surge_testserver::serve(listener, TestServerStats::default(), opts, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    Ok(())
}
