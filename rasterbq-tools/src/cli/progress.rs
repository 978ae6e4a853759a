//! Progress reporting for long uploads.

use indicatif::ProgressBar;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const PROGRESS_UPDATE_MILLIS: u64 = 500;

/// A wrapper for a progress bar with a displayable
/// information. The value type `T` is typically a counter.
pub struct Progress<T> {
    pub bar: ProgressBar,
    pub value: T,
    done: Flag,
}
impl<T> Progress<T> {
    pub fn new(value: T) -> Self {
        let bar = {
            use indicatif::*;
            let progress = ProgressBar::new_spinner();
            progress.set_style(
                ProgressStyle::default_spinner().template("{spinner} [{elapsed_precise}] {msg}"),
            );
            progress
        };
        Progress {
            bar,
            value,
            done: Default::default(),
        }
    }

    pub fn done(&self) -> bool {
        self.done.load()
    }

    pub fn finish(&self) {
        self.done.store(true);
    }
}
impl<T: fmt::Display> Progress<T> {
    pub fn update_progress(&self) {
        self.bar.set_message(&format!("{}", self.value));
    }

    /// Auto update progress in the current-thread.
    ///
    /// Blocks the current thread, and updates at the
    /// interval provided. This method only exits when
    /// `finish` is called in another thread.
    pub fn update_until_done(&self, timeout: Duration) {
        use std::thread;
        while !self.done() {
            self.update_progress();
            thread::park_timeout(timeout);
        }
    }
}
impl<T: Send + Sync + fmt::Display + 'static> Progress<T> {
    pub fn spawn_auto_update_thread(self: Arc<Self>, timeout: Duration) -> JoinHandle<()> {
        std::thread::spawn(move || self.update_until_done(timeout))
    }
}

#[derive(Debug, Default)]
pub struct Flag {
    val: AtomicBool,
}
impl Flag {
    pub fn load(&self) -> bool {
        self.val.load(Ordering::Acquire)
    }

    pub fn store(&self, val: bool) {
        self.val.store(val, Ordering::Release);
    }
}

#[derive(Debug, Default)]
pub struct Counter {
    val: AtomicUsize,
}
impl Counter {
    pub fn load(&self) -> usize {
        self.val.load(Ordering::Acquire)
    }

    pub fn store(&self, val: usize) {
        self.val.store(val, Ordering::Release);
    }

    pub fn fetch_add(&self, inc: usize) -> usize {
        self.val.fetch_add(inc, Ordering::AcqRel)
    }
}
impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.load())
    }
}

#[derive(Debug)]
pub struct DetailCounter {
    pub total: Counter,
    pub processed: Counter,
    name: &'static str,
}
impl DetailCounter {
    pub fn new(name: &'static str) -> Self {
        DetailCounter {
            total: Default::default(),
            processed: Default::default(),
            name,
        }
    }
}
impl fmt::Display for DetailCounter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: completed {} of {}.",
            self.name,
            self.processed.load(),
            self.total.load()
        )
    }
}

/// Spinner tracking completed units against a known total.
/// The update thread is joined on drop.
pub struct Tracker {
    progress: Arc<Progress<DetailCounter>>,
    handle: Option<JoinHandle<()>>,
}

impl Tracker {
    pub fn new(units: &'static str, len: usize) -> Self {
        let progress = Arc::new(Progress::new(DetailCounter::new(units)));
        progress.value.total.store(len);
        let handle = progress
            .clone()
            .spawn_auto_update_thread(Duration::from_millis(PROGRESS_UPDATE_MILLIS));
        Tracker {
            progress,
            handle: Some(handle),
        }
    }
    pub fn increment_by(&self, count: usize) {
        self.progress.value.processed.fetch_add(count);
    }
}
impl Drop for Tracker {
    fn drop(&mut self) {
        self.progress.finish();
        if let Err(_) = self.handle.take().unwrap().join() {
            eprintln!("Warning: progress thread panicked!");
        }
    }
}
