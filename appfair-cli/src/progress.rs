//! Terminal progress for downloads and cancellation on Ctrl-C

use appfair_core::install::{CancellationToken, Progress};
use indicatif::{ProgressBar, ProgressStyle};

/// A byte-count progress bar fed by a core [`Progress`]
pub struct DownloadBar {
    bar: ProgressBar,
    progress: Progress,
}

impl DownloadBar {
    pub fn new(label: &str) -> Self {
        let style = ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");

        let bar = ProgressBar::new(0);
        bar.set_style(style);
        bar.set_message(label.to_string());

        let listener = bar.clone();
        let progress = Progress::with_listener(move |completed, total| {
            if let Some(total) = total {
                listener.set_length(total);
            }
            listener.set_position(completed);
        });

        Self { bar, progress }
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

/// Token that is cancelled when the user presses Ctrl-C
///
/// The listener task lives until the process exits.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted; cancelling");
            handle.cancel();
        }
    });
    token
}
