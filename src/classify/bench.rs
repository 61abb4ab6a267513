use core::{fmt, time::Duration};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Durations of the timed runs, in the order they were measured.
#[derive(new, Debug, Default, Clone, Serialize, Deserialize)]
pub struct BenchmarkDurations {
    pub durations: Vec<Duration>,
}

impl BenchmarkDurations {
    pub fn mean(&self) -> Duration {
        match self.durations.len() {
            0 => Duration::ZERO,
            len => self.durations.iter().sum::<Duration>() / len as u32,
        }
    }

    pub fn min(&self) -> Duration {
        self.durations.iter().min().copied().unwrap_or_default()
    }

    pub fn max(&self) -> Duration {
        self.durations.iter().max().copied().unwrap_or_default()
    }

    /// Inferences per second at the mean latency.
    pub fn throughput(&self) -> f64 {
        let mean = self.mean().as_secs_f64();
        if mean > 0.0 { 1.0 / mean } else { 0.0 }
    }
}

impl fmt::Display for BenchmarkDurations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = |duration: Duration| duration.as_secs_f64() * 1000.0;

        write!(
            f,
            "―――――――― Inference ――――――――
  Runs        {}
  Average     {:.3} ms
  Min         {:.3} ms
  Max         {:.3} ms
  Throughput  {:.2} FPS
―――――――――――――――――――――――――――",
            self.durations.len(),
            millis(self.mean()),
            millis(self.min()),
            millis(self.max()),
            self.throughput(),
        )
    }
}

/// Run `execute` `warmup` times untimed, then `runs` times timed.
///
/// Returns the durations and the output of the last timed run (or of the last
/// warmup run when `runs` is zero).
pub fn run_benchmark<T, F: FnMut() -> T>(
    warmup: usize,
    runs: usize,
    mut execute: F,
) -> (BenchmarkDurations, Option<T>) {
    let mut output = None;

    for _ in 0..warmup {
        output = Some(execute());
    }

    let mut durations = Vec::with_capacity(runs);
    for _ in 0..runs {
        let start = Instant::now();
        output = Some(execute());
        durations.push(start.elapsed());
    }

    (BenchmarkDurations::new(durations), output)
}
