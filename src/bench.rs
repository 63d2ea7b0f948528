//! Round-trip benchmark driver.
//!
//! Opens a number of client connections against a running echo server and
//! has each perform a fixed count of sequential echoes. Every connection
//! uses its own fill byte, so an echo carrying another connection's bytes
//! shows up as a mismatch.

use crate::client::{filled_payload, EchoClient};
use crate::error::{BenchError, EchoError};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Benchmark shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    /// Concurrent client connections.
    pub connections: usize,
    /// Sequential round trips per connection.
    pub round_trips: usize,
    pub payload_len: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            connections: 1,
            round_trips: 1000,
            payload_len: crate::DEFAULT_PAYLOAD_LENGTH,
        }
    }
}

/// Result of a benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchReport {
    pub connections: usize,
    pub round_trips: u64,
    pub bytes_echoed: u64,
    pub elapsed: Duration,
}

impl BenchReport {
    /// Wall-clock time per round trip across all connections.
    pub fn mean_round_trip(&self) -> Duration {
        if self.round_trips == 0 {
            return Duration::ZERO;
        }
        let nanos = self.elapsed.as_nanos() / u128::from(self.round_trips);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Fill byte for connection `index`: 'a', 'b', ... wrapping after 'z'.
fn fill_for(index: usize) -> u8 {
    b'a' + (index % 26) as u8
}

/// Run the benchmark against the server at `addr`.
pub async fn run(addr: SocketAddr, config: &BenchConfig) -> Result<BenchReport, BenchError> {
    let started = Instant::now();
    let mut tasks = JoinSet::new();

    for index in 0..config.connections {
        let payload = filled_payload(fill_for(index), config.payload_len);
        let payload_len = config.payload_len;
        let round_trips = config.round_trips;

        tasks.spawn(async move {
            let mut client = EchoClient::connect(addr, payload_len).await?;
            for _ in 0..round_trips {
                client.round_trip(&payload).await?;
            }
            client.close().await.map_err(EchoError::from)?;
            debug!(connection = index, round_trips, "Connection finished");
            Ok::<u64, BenchError>(round_trips as u64)
        });
    }

    let mut round_trips = 0u64;
    while let Some(res) = tasks.join_next().await {
        round_trips += res??;
    }

    let report = BenchReport {
        connections: config.connections,
        round_trips,
        bytes_echoed: round_trips * config.payload_len as u64,
        elapsed: started.elapsed(),
    };

    info!(
        connections = report.connections,
        round_trips = report.round_trips,
        bytes = report.bytes_echoed,
        elapsed_ms = report.elapsed.as_millis() as u64,
        mean_us = report.mean_round_trip().as_micros() as u64,
        "Benchmark complete"
    );

    Ok(report)
}
