use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use indicatif::{
    HumanBytes, HumanDuration, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle,
};

/// Terminal mirror of what the page shows while the driver runs.
pub struct Progress {
    enabled: bool,
    start: Instant,

    // UI
    mp: Option<MultiProgress>,
    stage: ProgressBar,
    upload: ProgressBar,

    // Counters
    uploads_started: AtomicU64,
    bytes_sent: AtomicU64,
    last_upload_label: Mutex<String>,
}

impl Progress {
    pub fn new(enabled: bool) -> Arc<Self> {
        let start = Instant::now();

        if !enabled {
            return Arc::new(Self {
                enabled: false,
                start,
                mp: None,
                stage: ProgressBar::hidden(),
                upload: ProgressBar::hidden(),
                uploads_started: AtomicU64::new(0),
                bytes_sent: AtomicU64::new(0),
                last_upload_label: Mutex::new(String::new()),
            });
        }

        let mp = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());

        let stage = mp.add(ProgressBar::new_spinner());
        stage.set_style(
            ProgressStyle::with_template("{spinner} {msg}  [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        stage.enable_steady_tick(Duration::from_millis(80));
        stage.set_message("starting");

        let upload = mp.add(ProgressBar::new(0));
        upload.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {percent:>3}% {bytes}/{total_bytes} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );

        Arc::new(Self {
            enabled: true,
            start,
            mp: Some(mp),
            stage,
            upload,
            uploads_started: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            last_upload_label: Mutex::new(String::new()),
        })
    }

    pub fn set_stage(&self, msg: impl Into<String>) {
        if !self.enabled {
            return;
        }
        self.stage.set_message(msg.into());
    }

    pub fn upload_started(&self, file_name: &str, total: u64) {
        self.uploads_started.fetch_add(1, Ordering::Relaxed);
        if !self.enabled {
            return;
        }
        if let Ok(mut last) = self.last_upload_label.lock() {
            *last = file_name.to_string();
        }
        self.set_stage(format!("uploading {file_name}"));
        self.upload.reset();
        self.upload.set_length(total);
        self.upload.set_message(file_name.to_string());
    }

    pub fn upload_advanced(&self, loaded: u64) {
        self.bytes_sent.fetch_max(loaded, Ordering::Relaxed);
        if self.enabled {
            self.upload.set_position(loaded);
        }
    }

    pub fn upload_finished(&self, result: &str) {
        if !self.enabled {
            return;
        }
        let name = self
            .last_upload_label
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        self.upload.set_message(format!("{name} {result}"));
        self.set_stage(format!("upload {result}"));
    }

    pub fn finish(&self) {
        if !self.enabled {
            return;
        }
        self.stage.finish_with_message("done");
        self.upload.finish_and_clear();
        if let Some(mp) = &self.mp {
            let _ = mp.println(format!(
                "Done in {} ({} uploads, {} sent)",
                HumanDuration(self.start.elapsed()),
                self.uploads_started.load(Ordering::Relaxed),
                HumanBytes(self.bytes_sent.load(Ordering::Relaxed)),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_progress_still_counts() {
        let p = Progress::new(false);
        p.upload_started("a.bin", 10);
        p.upload_advanced(4);
        p.upload_advanced(10);
        p.upload_finished("status 200");
        p.finish();
        assert_eq!(p.uploads_started.load(Ordering::Relaxed), 1);
        assert_eq!(p.bytes_sent.load(Ordering::Relaxed), 10);
    }
}
