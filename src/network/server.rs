//! Unix-domain-socket driver loop. Unlike the teacher's TCP server, the
//! simulator has exactly one driver talking to one scheduler at a time
//! (spec §5: "no shared-memory threads... no locking is required"), so
//! there is no connection pool, no `Arc`, and the `Scheduler` moves by
//! unique ownership into the accept loop rather than being cloned per task.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

use crate::codec;
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedError};
use crate::scheduler::Scheduler;

/// Initial per-connection read buffer. Grows as needed up to
/// `codec::MAX_MESSAGE_BYTES`.
const READ_CHUNK: usize = 8 * 1024;

pub struct Server {
    config: SchedulerConfig,
}

impl Server {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        if self.config.socket_path.exists() {
            std::fs::remove_file(&self.config.socket_path)?;
        }

        let listener = UnixListener::bind(&self.config.socket_path)?;
        tracing::info!(
            path = %self.config.socket_path.display(),
            cpus = self.config.cpu_count,
            quanta = self.config.quanta,
            "fairsched listening"
        );

        let mut scheduler = Scheduler::new(self.config.cpu_count, self.config.quanta)?;

        loop {
            let (socket, _) = listener.accept().await?;
            tracing::info!("driver connected");

            let handler = ConnectionHandler { config: &self.config };
            match handler.handle(&mut scheduler, socket).await {
                Ok(()) => tracing::info!("driver disconnected"),
                Err(e) => tracing::warn!("connection ended: {e}"),
            }
        }
    }
}

struct ConnectionHandler<'a> {
    config: &'a SchedulerConfig,
}

impl ConnectionHandler<'_> {
    async fn handle(&self, scheduler: &mut Scheduler, mut socket: UnixStream) -> Result<()> {
        let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            while let Some(end) = codec::find_frame(&buf) {
                let frame: Vec<u8> = buf.drain(..end).collect();
                self.process_frame(scheduler, &frame, &mut socket).await?;
            }

            if buf.len() > codec::MAX_MESSAGE_BYTES {
                return Err(SchedError::Protocol(format!(
                    "no complete frame within {} buffered bytes (max {})",
                    buf.len(),
                    codec::MAX_MESSAGE_BYTES
                )));
            }

            let n = socket.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn process_frame(
        &self,
        scheduler: &mut Scheduler,
        frame: &[u8],
        socket: &mut UnixStream,
    ) -> Result<()> {
        let batch = codec::decode_batch(frame)?;

        for (i, event) in batch.events.into_iter().enumerate() {
            if let Err(e) = scheduler.apply_event(event) {
                tracing::warn!(vtime = batch.vtime, event = i, "event rejected: {e}");
            }
        }

        match scheduler.tick(batch.vtime) {
            Some(result) => {
                let bytes = codec::encode_tick(&result, self.config.metadata);
                socket.write_all(&bytes).await?;
            }
            None => tracing::error!(vtime = batch.vtime, "tick produced no result"),
        }

        Ok(())
    }
}
