use std::sync::atomic::{AtomicU64, Ordering};

/// Counter sharded per thread; readers sum all shards
#[derive(Debug, Default)]
pub struct TlsCounter {
    shards: thread_local::ThreadLocal<AtomicU64>,
}

impl TlsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, value: u64) {
        self.shards
            .get_or_default()
            .fetch_add(value, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn get(&self) -> u64 {
        self.shards
            .iter()
            .map(|shard| shard.load(Ordering::Relaxed))
            .sum()
    }
}

/// Tracks file operations that have started but not yet finished
#[derive(Debug, Default)]
pub struct InFlight {
    started: TlsCounter,
    finished: TlsCounter,
}

/// Marks one operation as in flight until dropped
pub struct InFlightGuard<'a> {
    ops: &'a InFlight,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.ops.finished.inc();
    }
}

impl InFlight {
    pub fn enter(&self) -> InFlightGuard<'_> {
        self.started.inc();
        InFlightGuard { ops: self }
    }

    pub fn finished(&self) -> u64 {
        self.finished.get()
    }

    /// Shards are summed one by one, so a concurrent reader may see more finished than started
    pub fn pending(&self) -> u64 {
        let finished = self.finished.get();
        self.started.get().saturating_sub(finished)
    }
}

/// Counters shared by all workers of one invocation
#[derive(Debug)]
pub struct Progress {
    pub ops: InFlight,
    pub files_transferred: TlsCounter,
    pub bytes_transferred: TlsCounter,
    pub files_generated: TlsCounter,
    pub bytes_generated: TlsCounter,
    pub files_failed: TlsCounter,
    start_time: std::time::Instant,
}

impl Progress {
    pub fn new() -> Self {
        Self {
            ops: Default::default(),
            files_transferred: Default::default(),
            bytes_transferred: Default::default(),
            files_generated: Default::default(),
            bytes_generated: Default::default(),
            files_failed: Default::default(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn get_duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let elapsed = self.get_duration().as_secs_f64();
        let bytes = self.bytes_transferred.get() + self.bytes_generated.get();
        let rate = if elapsed > 0.0 {
            bytes as f64 / elapsed
        } else {
            0.0
        };
        write!(
            f,
            "-----------------------\n\
            OPS:\n\
            pending:     {:>10}\n\
            finished:    {:>10}\n\
            failed:      {:>10}\n\
            -----------------------\n\
            TRANSFERRED:\n\
            files:       {:>10}\n\
            bytes:       {:>10}\n\
            -----------------------\n\
            GENERATED:\n\
            files:       {:>10}\n\
            bytes:       {:>10}\n\
            -----------------------\n\
            elapsed:     {:>10.2?}\n\
            average:     {:>10}/s",
            self.ops.pending(),
            self.ops.finished(),
            self.files_failed.get(),
            self.files_transferred.get(),
            bytesize::ByteSize(self.bytes_transferred.get()),
            self.files_generated.get(),
            bytesize::ByteSize(self.bytes_generated.get()),
            self.get_duration(),
            bytesize::ByteSize(rate as u64),
        )
    }
}
