//! Byte-level network statistics.
//!
//! Shared counters wrapped around a socket; all connections of one role
//! report into the same [`NetStats`] handle.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Shared send/receive byte counters.
#[derive(Debug, Clone, Default)]
pub struct NetStats {
    sent: Arc<AtomicU64>,
    recv: Arc<AtomicU64>,
}

impl NetStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sent(&self, bytes: u64) {
        self.sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_recv(&self, bytes: u64) {
        self.recv.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            data_sent: self.sent.load(Ordering::Relaxed),
            data_recv: self.recv.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time view of the counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatsSnapshot {
    pub data_sent: u64,
    pub data_recv: u64,
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Sent: {}, Received: {}",
            byte_count_si(self.data_sent),
            byte_count_si(self.data_recv)
        )
    }
}

/// SI-formatted byte count.
fn byte_count_si(bytes: u64) -> String {
    const UNIT: u64 = 1000;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0usize;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let prefixes = ['k', 'M', 'G', 'T', 'P', 'E'];
    format!("{:.1} {}B", bytes as f64 / div as f64, prefixes[exp])
}

/// Stream wrapper that reports transferred bytes into a [`NetStats`].
pub struct CountingStream<S> {
    inner: S,
    stats: NetStats,
}

impl<S> CountingStream<S> {
    pub fn new(inner: S, stats: NetStats) -> Self {
        Self { inner, stats }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S: Read> Read for CountingStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.stats.add_recv(n as u64);
        Ok(n)
    }
}

impl<S: Write> Write for CountingStream<S> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.stats.add_sent(n as u64);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_reads_and_writes() {
        let stats = NetStats::new();
        let mut stream = CountingStream::new(std::io::Cursor::new(vec![0u8; 64]), stats.clone());

        let mut buf = [0u8; 16];
        stream.read_exact(&mut buf).unwrap();
        stream.write_all(&[1u8; 8]).unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.data_recv, 16);
        assert_eq!(snapshot.data_sent, 8);
    }

    #[test]
    fn si_formatting() {
        assert_eq!(byte_count_si(17), "17 B");
        assert_eq!(byte_count_si(1500), "1.5 kB");
        assert_eq!(byte_count_si(2_000_000), "2.0 MB");
    }
}
