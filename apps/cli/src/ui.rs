use std::time::{Duration, Instant};

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use glimpse_core::PullProgress;

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .expect("spinner template is valid"),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// A spinner for one pipeline step, timed from creation.
pub struct Step {
    pb: ProgressBar,
    started: Instant,
}

impl Step {
    pub fn start(msg: &str) -> Self {
        Self {
            pb: create_spinner(msg),
            started: Instant::now(),
        }
    }

    /// Forwards model pull progress into the spinner text.
    pub fn pull_reporter(&self, model: &str) -> impl Fn(PullProgress) + Send + Sync + use<> {
        let pb = self.pb.clone();
        let model = model.to_string();
        move |progress: PullProgress| {
            let detail = match (progress.completed, progress.total) {
                (Some(done), Some(total)) if total > 0 => {
                    format!("{} {:.0}%", progress.status, done as f64 * 100.0 / total as f64)
                }
                _ => progress.status,
            };
            pb.set_message(format!("Pulling {model}: {detail}"));
        }
    }

    fn elapsed(&self) -> String {
        style(format!("[{}]", format_duration(self.started.elapsed())))
            .dim()
            .to_string()
    }

    pub fn done(self, msg: impl std::fmt::Display) {
        let elapsed = self.elapsed();
        self.pb.finish_with_message(format!(
            "{} {} {}",
            style("✓").green().bold(),
            msg,
            elapsed
        ));
    }

    /// Finish the step but flag that it degraded.
    pub fn degraded(self, msg: impl std::fmt::Display) {
        let elapsed = self.elapsed();
        self.pb.finish_with_message(format!(
            "{} {} {}",
            style("!").yellow().bold(),
            msg,
            elapsed
        ));
    }

    /// Await `fut`, marking the spinner failed if it errors.
    pub async fn watch<T, E>(&self, fut: impl Future<Output = Result<T, E>>) -> Result<T, E> {
        let result = fut.await;
        if result.is_err() {
            self.pb.abandon_with_message(format!(
                "{} {}",
                style("✗").red().bold(),
                self.pb.message()
            ));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_switch_to_minutes_past_a_minute() {
        assert_eq!(format_duration(Duration::from_millis(4200)), "4.2s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }

    #[test]
    fn pull_progress_updates_the_spinner_text() {
        let step = Step::start("Checking model llava...");
        let report = step.pull_reporter("llava");

        report(PullProgress {
            status: "pulling manifest".into(),
            completed: None,
            total: None,
        });
        assert_eq!(step.pb.message(), "Pulling llava: pulling manifest");

        report(PullProgress {
            status: "downloading".into(),
            completed: Some(25),
            total: Some(100),
        });
        assert_eq!(step.pb.message(), "Pulling llava: downloading 25%");
        step.done("Model ready");
    }

    #[tokio::test]
    async fn watched_failure_keeps_the_step_message() {
        let step = Step::start("Extracting audio...");
        let result: Result<(), &str> = step.watch(async { Err("ffmpeg missing") }).await;

        assert_eq!(result, Err("ffmpeg missing"));
        assert!(step.pb.is_finished());
        assert!(step.pb.message().ends_with("Extracting audio..."));
    }
}
