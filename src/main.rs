//! fairsched-server: runs the scheduler simulator behind a Unix domain
//! socket until the driver disconnects or the process receives ctrl-c.

use fairsched::{SchedulerConfig, Server};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    let config = match SchedulerConfig::from_args(std::env::args().skip(1)) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("fairsched-server: {msg}");
            eprintln!(
                "usage: fairsched-server [--socket PATH] [--cpus N] [--quanta US] [--metadata]"
            );
            std::process::exit(2);
        }
    };

    tracing::info!(
        socket = %config.socket_path.display(),
        cpus = config.cpu_count,
        quanta = config.quanta,
        metadata = config.metadata,
        "starting fairsched"
    );

    let server = Server::new(config);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                tracing::error!("server exited with error: {e}");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }
}
