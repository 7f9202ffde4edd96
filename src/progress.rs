use log::info;

use crate::providers::travis::PAGE_SIZE;

/// How often the CLI reports fetch progress, in builds.
pub const REPORT_INTERVAL: usize = 250;

/// Counts builds flowing past and fires `callback` every `interval` of them.
///
/// It only observes the stream; builds are never touched.
pub struct ProgressReporter<F> {
    interval: usize,
    processed: usize,
    callback: F,
}

impl<F> ProgressReporter<F>
where
    F: FnMut(usize),
{
    pub fn new(interval: usize, callback: F) -> Self {
        Self {
            interval,
            processed: 0,
            callback,
        }
    }

    pub fn record(&mut self) {
        self.processed += 1;
        if self.interval > 0 && self.processed % self.interval == 0 {
            (self.callback)(self.processed);
        }
    }

    pub fn processed(&self) -> usize {
        self.processed
    }
}

pub fn log_progress(processed: usize) {
    info!(
        "Processed {processed} builds ({} pages)",
        processed / PAGE_SIZE
    );
}
