use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(20);

/// Progress counters plus a reporter thread that logs them on a fixed
/// interval. Hashing loops only touch the atomics; the reporter never waits on
/// them.
#[derive(Clone)]
pub struct Progress {
    enabled: bool,
    interval: Duration,
    pub stage: Arc<Mutex<String>>,
    pub items_done: Arc<AtomicUsize>,
    pub items_total: Arc<AtomicUsize>,
    pub bad_items: Arc<AtomicUsize>,
    pub bytes_done: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    epoch: Arc<AtomicUsize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub stage: String,
    pub items_done: usize,
    pub items_total: usize,
    pub bad_items: usize,
    pub bytes_done: u64,
}

impl Progress {
    pub fn new(enabled: bool) -> Self {
        Self::with_interval(enabled, DEFAULT_INTERVAL)
    }

    pub fn with_interval(enabled: bool, interval: Duration) -> Self {
        Self {
            enabled,
            interval,
            stage: Arc::new(Mutex::new(String::new())),
            items_done: Arc::new(AtomicUsize::new(0)),
            items_total: Arc::new(AtomicUsize::new(0)),
            bad_items: Arc::new(AtomicUsize::new(0)),
            bytes_done: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            epoch: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A reporter that never starts a thread; counters still work.
    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn set_stage(&self, s: &str) {
        if let Ok(mut g) = self.stage.lock() {
            *g = s.to_string();
        }
    }

    pub fn set_total(&self, n: usize) {
        self.items_total.store(n, Ordering::Relaxed);
        self.items_done.store(0, Ordering::Relaxed);
        self.bad_items.store(0, Ordering::Relaxed);
        self.bytes_done.store(0, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.items_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_bad(&self) {
        self.bad_items.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes_done.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            stage: self.stage.lock().map(|s| s.clone()).unwrap_or_default(),
            items_done: self.items_done.load(Ordering::Relaxed),
            items_total: self.items_total.load(Ordering::Relaxed),
            bad_items: self.bad_items.load(Ordering::Relaxed),
            bytes_done: self.bytes_done.load(Ordering::Relaxed),
        }
    }

    pub fn start(&self) {
        if !self.enabled || self.running.swap(true, Ordering::Relaxed) {
            return;
        }
        // A reporter left over from an earlier start/stop exits once it sees
        // a newer epoch.
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed) + 1;
        let this = self.clone();
        let live = move || {
            this.running.load(Ordering::Relaxed) && this.epoch.load(Ordering::Relaxed) == epoch
        };
        let this = self.clone();
        thread::spawn(move || {
            let t0 = Instant::now();
            // Sleep in short steps so stop() is honoured promptly.
            let step = this.interval.min(Duration::from_millis(250));
            let mut next = this.interval;
            while live() {
                thread::sleep(step);
                if !live() {
                    break;
                }
                if t0.elapsed() < next {
                    continue;
                }
                next += this.interval;
                let s = this.snapshot();
                let pct = if s.items_total > 0 {
                    (s.items_done as f64 / s.items_total as f64) * 100.0
                } else {
                    0.0
                };
                tracing::info!(
                    stage = %s.stage,
                    progress = %format!("{}/{}", s.items_done, s.items_total),
                    percent = pct as i32,
                    bad = s.bad_items,
                    mib = s.bytes_done >> 20,
                    elapsed_s = t0.elapsed().as_secs(),
                    "progress"
                );
            }
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}
