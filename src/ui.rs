//! Terminal progress for the offline `annotate` tool.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    /// Progress over `total` images. Plain mode prints one line per image.
    pub fn batch(&self, total: u64) -> BatchProgress {
        let bar = if self.use_pretty() {
            let bar = ProgressBar::new(total);
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template(
                "{spinner} [{elapsed_precise}] {bar:30} {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            eprintln!("==> annotating {} image(s)", total);
            None
        };
        BatchProgress {
            total,
            done: 0,
            degraded: 0,
            start: Instant::now(),
            bar,
        }
    }
}

pub struct BatchProgress {
    total: u64,
    done: u64,
    degraded: u64,
    start: Instant,
    bar: Option<ProgressBar>,
}

impl BatchProgress {
    /// Record one finished image.
    pub fn image_done(&mut self, name: &str, detections: usize, degraded: bool) {
        self.done += 1;
        if degraded {
            self.degraded += 1;
        }
        let message = if degraded {
            format!("{name}: diagnostic frame")
        } else {
            format!("{name}: {detections} detection(s)")
        };
        match &self.bar {
            Some(bar) => {
                bar.set_message(message);
                bar.inc(1);
            }
            None => eprintln!("[{}/{}] {}", self.done, self.total, message),
        }
    }

    pub fn done(&self) -> u64 {
        self.done
    }

    pub fn degraded(&self) -> u64 {
        self.degraded
    }

    pub fn finish(self) {
        let message = format!(
            "✔ {} image(s), {} degraded ({})",
            self.done,
            self.degraded,
            format_duration(self.start.elapsed())
        );
        match &self.bar {
            Some(bar) => bar.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
