use divelink_core::{DeviceEvent, DeviceObserver, TracingObserver};
use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = "{prefix:12} [{elapsed_precise}] [{bar:40.cyan/black}] \
     {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}";

/// Drives a progress bar from transfer events and logs everything else.
pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_prefix("Download");
        if let Ok(style) = ProgressStyle::default_bar().template(TEMPLATE) {
            bar.set_style(style.progress_chars("■ "));
        }
        Self { bar }
    }

    pub fn finish(&self, message: &'static str) {
        self.bar.finish_with_message(message);
    }

    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

impl DeviceObserver for ProgressObserver {
    fn on_event(&self, event: &DeviceEvent<'_>) {
        match event {
            DeviceEvent::Progress(progress) => {
                self.bar.set_length(u64::from(progress.maximum));
                self.bar.set_position(u64::from(progress.current));
            }
            other => self.bar.suspend(|| TracingObserver.on_event(other)),
        }
    }
}
