use std::time::Duration;

pub const PHASE_COUNT: usize = 5;

/// Worker-loop phases that are timed individually.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    RayGen = 0,
    Intersect = 1,
    Scatter = 2,
    Background = 3,
    PixelSetup = 4,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::RayGen => "ray generation",
            Phase::Intersect => "intersection",
            Phase::Scatter => "scatter",
            Phase::Background => "background",
            Phase::PixelSetup => "pixel setup",
        }
    }
}

/// Per-worker counters. Each worker owns its instance; nothing here is
/// shared until `finish` aggregates them.
///
/// Phase timing costs two clock reads per scope and disappears entirely
/// without the `profile` feature. Ray counting stays on either way.
#[derive(Clone, Debug, Default)]
pub struct ProfileCounters {
    phase_ns: [u64; PHASE_COUNT],
    total_rays: u64,
}

impl ProfileCounters {
    #[cfg(feature = "profile")]
    pub fn timed<T>(
        &mut self,
        phase: Phase,
        f: impl FnOnce() -> T,
    ) -> T {
        let start = std::time::Instant::now();
        let out = f();
        self.phase_ns[phase as usize] += start.elapsed().as_nanos() as u64;
        out
    }

    #[cfg(not(feature = "profile"))]
    #[inline(always)]
    pub fn timed<T>(
        &mut self,
        _phase: Phase,
        f: impl FnOnce() -> T,
    ) -> T {
        f()
    }

    #[inline]
    pub fn count_ray(&mut self) {
        self.total_rays += 1;
    }

    pub fn phase_ns(
        &self,
        phase: Phase,
    ) -> u64 {
        self.phase_ns[phase as usize]
    }

    pub fn total_rays(&self) -> u64 {
        self.total_rays
    }
}

/// Sum of every worker's counters plus session wall-clock time, produced by
/// `RenderSession::finish`.
#[derive(Clone, Debug, Default)]
pub struct ProfileSummary {
    phase_ns: [u64; PHASE_COUNT],
    total_rays: u64,
    pub elapsed: Duration,
    pub workers: usize,
}

impl ProfileSummary {
    pub fn aggregate(
        counters: &[ProfileCounters],
        elapsed: Duration,
    ) -> Self {
        let mut summary = ProfileSummary {
            elapsed,
            workers: counters.len(),
            ..Default::default()
        };
        for worker in counters {
            for i in 0..PHASE_COUNT {
                summary.phase_ns[i] += worker.phase_ns[i];
            }
            summary.total_rays += worker.total_rays;
        }
        summary
    }

    pub fn phase_ns(
        &self,
        phase: Phase,
    ) -> u64 {
        self.phase_ns[phase as usize]
    }

    pub fn total_rays(&self) -> u64 {
        self.total_rays
    }

    pub fn rays_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_rays as f64 / secs
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ray_counting_accumulates() {
        let mut counters = ProfileCounters::default();
        for _ in 0..10 {
            counters.count_ray();
        }
        assert_eq!(counters.total_rays(), 10);
    }

    #[test]
    fn timed_returns_the_closure_value() {
        let mut counters = ProfileCounters::default();
        let out = counters.timed(Phase::Intersect, || 41 + 1);
        assert_eq!(out, 42);
    }

    #[cfg(feature = "profile")]
    #[test]
    fn timed_records_elapsed_time() {
        let mut counters = ProfileCounters::default();
        counters.timed(Phase::Scatter, || {
            std::thread::sleep(std::time::Duration::from_millis(2))
        });
        assert!(counters.phase_ns(Phase::Scatter) >= 1_000_000);
        assert_eq!(counters.phase_ns(Phase::Intersect), 0);
    }

    #[test]
    fn aggregate_sums_workers() {
        let mut a = ProfileCounters::default();
        let mut b = ProfileCounters::default();
        for _ in 0..3 {
            a.count_ray();
        }
        for _ in 0..4 {
            b.count_ray();
        }
        let summary = ProfileSummary::aggregate(&[a, b], Duration::from_secs(1));
        assert_eq!(summary.total_rays(), 7);
        assert_eq!(summary.workers, 2);
        assert_eq!(summary.rays_per_second() as u64, 7);
    }
}
