//! Stage timing.

use std::time::{Duration, Instant};

/// Prints how long a build stage took.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Print `[DONE] <label> (<elapsed>)` and return the elapsed time.
    pub fn finish(self) -> Duration {
        let elapsed = self.elapsed();
        println!("  [DONE] {} ({})", self.label, format_duration(elapsed));
        elapsed
    }
}

/// `Xh Ym Zs`, `Ym Zs` or `Z.Ns` for short stages.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs >= 10 {
        format!("{}s", secs)
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(9)), "9.0s");
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_timer_finish_returns_elapsed() {
        let timer = Timer::start("noop");
        assert!(timer.finish() < Duration::from_secs(5));
    }
}
