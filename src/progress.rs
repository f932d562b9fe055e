use crossbeam_channel::Sender;

/// Receives progress and log notifications from a running batch.
///
/// All methods are called synchronously from whichever thread executes the
/// run, and every one defaults to doing nothing. There is no `Send + Sync`
/// bound: [`CallbackReporter`] borrows plain closures. Implementations that
/// feed an interactive thread do their own marshalling (see [`ChannelReporter`]).
pub trait ProgressReporter {
    /// Set the total number of files to be processed
    fn set_total_files(&self, _total: usize) {}

    /// Called once after every attempted file, successful or not
    fn update_progress(&self, _current: usize, _total: usize) {}

    /// One human-readable log line
    fn log_message(&self, _message: &str) {}

    /// Report that the batch has finished
    fn finish_conversion(&self) {}
}

/// A no-op progress reporter for when progress reporting is not needed
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {}

/// Adapts two optional closures to [`ProgressReporter`]
pub struct CallbackReporter<'a> {
    on_progress: Option<&'a dyn Fn(usize, usize)>,
    on_log: Option<&'a dyn Fn(&str)>,
}

impl<'a> CallbackReporter<'a> {
    pub fn new(on_progress: Option<&'a dyn Fn(usize, usize)>, on_log: Option<&'a dyn Fn(&str)>) -> Self {
        Self { on_progress, on_log }
    }
}

impl ProgressReporter for CallbackReporter<'_> {
    fn update_progress(&self, current: usize, total: usize) {
        if let Some(on_progress) = self.on_progress {
            on_progress(current, total);
        }
    }

    fn log_message(&self, message: &str) {
        if let Some(on_log) = self.on_log {
            on_log(message);
        }
    }
}

/// Notification forwarded by [`ChannelReporter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Total(usize),
    Progress { current: usize, total: usize },
    Log(String),
    Finished,
}

/// Forwards notifications over a channel so a batch can run on a worker
/// thread while another thread renders them
pub struct ChannelReporter {
    sender: Sender<ProgressEvent>,
}

impl ChannelReporter {
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        Self { sender }
    }

    fn send(&self, event: ProgressEvent) {
        // A dropped receiver only means nobody is watching any more.
        if self.sender.send(event).is_err() {
            log::trace!("Progress receiver disconnected");
        }
    }
}

impl ProgressReporter for ChannelReporter {
    fn set_total_files(&self, total: usize) {
        self.send(ProgressEvent::Total(total));
    }

    fn update_progress(&self, current: usize, total: usize) {
        self.send(ProgressEvent::Progress { current, total });
    }

    fn log_message(&self, message: &str) {
        self.send(ProgressEvent::Log(message.to_string()));
    }

    fn finish_conversion(&self) {
        self.send(ProgressEvent::Finished);
    }
}

/// Console-based progress reporter using indicatif
#[cfg(feature = "cli")]
pub struct ConsoleProgressReporter {
    progress_bar: indicatif::ProgressBar,
}

#[cfg(feature = "cli")]
impl Default for ConsoleProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "cli")]
impl ConsoleProgressReporter {
    pub fn new() -> Self {
        let progress_bar = indicatif::ProgressBar::new(0);
        let style = indicatif::ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
            .progress_chars("#>-");
        progress_bar.set_style(style);
        Self { progress_bar }
    }

    /// Render an event received from a [`ChannelReporter`]
    pub fn apply(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Total(total) => self.set_total_files(total),
            ProgressEvent::Progress { current, total } => self.update_progress(current, total),
            ProgressEvent::Log(message) => self.log_message(&message),
            ProgressEvent::Finished => self.finish_conversion(),
        }
    }
}

#[cfg(feature = "cli")]
impl ProgressReporter for ConsoleProgressReporter {
    fn set_total_files(&self, total: usize) {
        self.progress_bar.set_length(total as u64);
    }

    fn update_progress(&self, current: usize, _total: usize) {
        self.progress_bar.set_position(current as u64);
    }

    fn log_message(&self, message: &str) {
        self.progress_bar.println(message);
    }

    fn finish_conversion(&self) {
        self.progress_bar.finish_and_clear();
    }
}
