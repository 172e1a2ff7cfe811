use std::time::{Duration, Instant};

/// High-level behaviour requested by the caller.
///
/// The render policy decides whether frames should animate continuously or
/// be evaluated once at a fixed timestamp.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderPolicy {
    /// Render on every display refresh, optionally clamped to a frame rate.
    Animate {
        /// Optional requested frames-per-second cap.
        target_fps: Option<f32>,
    },
    /// Render a single frozen frame at the given timestamp (seconds).
    Still { time: f64 },
}

impl Default for RenderPolicy {
    fn default() -> Self {
        Self::Animate { target_fps: None }
    }
}

/// Snapshot of the clock handed to the shader uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Shader time in seconds.
    pub seconds: f64,
    /// Monotonic frame counter for the running session.
    pub frame_index: u64,
}

impl TimeSample {
    pub fn new(seconds: f64, frame_index: u64) -> Self {
        Self {
            seconds,
            frame_index,
        }
    }
}

/// Abstraction over where time values originate from.
pub trait TimeSource: Send {
    /// Resets the source to its initial state.
    fn reset(&mut self);
    /// Produces a time sample for the next frame.
    fn sample(&mut self) -> TimeSample;
}

/// Time source backed by the system monotonic clock.
///
/// The origin is the first sample, so host setup before the first frame does
/// not count as elapsed time. Elapsed time is kept as a `Duration` and only
/// converted to seconds per sample.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Option<Instant>,
    frame: u64,
    time_scale: f64,
    time_offset: Duration,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scale(time_scale: f64, time_offset: Duration) -> Self {
        Self {
            time_scale,
            time_offset,
            ..Self::default()
        }
    }

    fn seconds_since(&self, origin: Instant, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(origin);
        self.time_offset.as_secs_f64() + elapsed.as_secs_f64() * self.time_scale
    }

    fn sample_at(&mut self, now: Instant) -> TimeSample {
        let origin = *self.origin.get_or_insert(now);
        let sample = TimeSample::new(self.seconds_since(origin, now), self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: None,
            frame: 0,
            time_scale: 1.0,
            time_offset: Duration::ZERO,
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn reset(&mut self) {
        self.origin = None;
        self.frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        self.sample_at(Instant::now())
    }
}

/// Time source that always reports a fixed timestamp.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource {
    time: f64,
}

impl FixedTimeSource {
    pub fn new(time: f64) -> Self {
        Self { time }
    }
}

impl TimeSource for FixedTimeSource {
    fn reset(&mut self) {}

    fn sample(&mut self) -> TimeSample {
        TimeSample::new(self.time, 0)
    }
}

pub type BoxedTimeSource = Box<dyn TimeSource + Send>;

/// Builds a time source suited to the requested render policy.
pub fn time_source_for_policy(
    policy: &RenderPolicy,
    time_scale: f64,
    time_offset: Duration,
) -> BoxedTimeSource {
    match policy {
        RenderPolicy::Animate { .. } => {
            Box::new(SystemTimeSource::with_scale(time_scale, time_offset))
        }
        RenderPolicy::Still { time } => Box::new(FixedTimeSource::new(*time)),
    }
}

/// Decides when the next frame may be drawn.
///
/// Without a frame cap every refresh is a frame. With a cap, deadlines advance
/// by whole intervals; a late frame pushes the next deadline out from "now"
/// so missed frames are dropped rather than drawn in a burst. Still policies
/// draw a single frame until reset.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    interval: Option<Duration>,
    single_frame: bool,
    next_due: Option<Instant>,
    rendered_once: bool,
}

impl FrameScheduler {
    pub fn new(policy: &RenderPolicy) -> Self {
        let (interval, single_frame) = match policy {
            RenderPolicy::Animate { target_fps } => (
                target_fps
                    .filter(|fps| fps.is_finite() && *fps > 0.0)
                    .map(|fps| Duration::from_secs_f64(1.0 / f64::from(fps))),
                false,
            ),
            RenderPolicy::Still { .. } => (None, true),
        };
        Self {
            interval,
            single_frame,
            next_due: None,
            rendered_once: false,
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// True once a single-frame policy has produced its frame.
    pub fn is_finished(&self) -> bool {
        self.single_frame && self.rendered_once
    }

    pub fn ready_for_frame(&self, now: Instant) -> bool {
        if self.is_finished() {
            return false;
        }
        match self.next_due {
            Some(due) => now >= due,
            None => true,
        }
    }

    /// Instant the event loop should wake up for, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.is_finished() {
            None
        } else {
            self.next_due
        }
    }

    pub fn mark_rendered(&mut self) {
        self.mark_rendered_at(Instant::now());
    }

    pub fn mark_rendered_at(&mut self, now: Instant) {
        self.rendered_once = true;
        let Some(interval) = self.interval else {
            self.next_due = None;
            return;
        };
        let next = self
            .next_due
            .map(|due| due + interval)
            .unwrap_or(now + interval);
        self.next_due = Some(if next <= now { now + interval } else { next });
    }

    pub fn reset(&mut self) {
        self.next_due = None;
        self.rendered_once = false;
    }
}

/// Pairs the scheduler with the clock so hosts have a single thing to poke.
pub(crate) struct RenderPolicyDriver {
    scheduler: FrameScheduler,
    time_source: BoxedTimeSource,
}

impl RenderPolicyDriver {
    pub(crate) fn new(policy: &RenderPolicy, time_scale: f64, time_offset: Duration) -> Self {
        Self {
            scheduler: FrameScheduler::new(policy),
            time_source: time_source_for_policy(policy, time_scale, time_offset),
        }
    }

    pub(crate) fn sample(&mut self) -> TimeSample {
        self.time_source.sample()
    }

    pub(crate) fn mark_rendered(&mut self) {
        self.scheduler.mark_rendered();
    }

    pub(crate) fn ready_for_frame(&self, now: Instant) -> bool {
        self.scheduler.ready_for_frame(now)
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    /// Forces the next frame to render without restarting the clock, e.g.
    /// after a resize invalidated a still frame.
    pub(crate) fn invalidate(&mut self) {
        self.scheduler.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capped(fps: f32) -> FrameScheduler {
        FrameScheduler::new(&RenderPolicy::Animate {
            target_fps: Some(fps),
        })
    }

    #[test]
    fn uncapped_scheduler_renders_every_refresh() {
        let mut scheduler = FrameScheduler::new(&RenderPolicy::default());
        let now = Instant::now();
        for step in 0..5 {
            let at = now + Duration::from_micros(step);
            assert!(scheduler.ready_for_frame(at));
            scheduler.mark_rendered_at(at);
        }
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn capped_scheduler_waits_for_interval() {
        let mut scheduler = capped(10.0);
        let start = Instant::now();
        assert!(scheduler.ready_for_frame(start));
        scheduler.mark_rendered_at(start);

        assert!(!scheduler.ready_for_frame(start + Duration::from_millis(50)));
        assert_eq!(
            scheduler.next_deadline(),
            Some(start + Duration::from_millis(100))
        );
        assert!(scheduler.ready_for_frame(start + Duration::from_millis(100)));
    }

    #[test]
    fn late_frames_are_coalesced() {
        let mut scheduler = capped(10.0);
        let start = Instant::now();
        scheduler.mark_rendered_at(start);

        // Half a second late: one frame now, the next a full interval later.
        let late = start + Duration::from_millis(600);
        assert!(scheduler.ready_for_frame(late));
        scheduler.mark_rendered_at(late);
        assert!(!scheduler.ready_for_frame(late + Duration::from_millis(1)));
        assert_eq!(
            scheduler.next_deadline(),
            Some(late + Duration::from_millis(100))
        );
    }

    #[test]
    fn zero_fps_means_uncapped() {
        assert_eq!(capped(0.0).interval(), None);
        assert_eq!(capped(f32::NAN).interval(), None);
    }

    #[test]
    fn still_policy_renders_once_until_reset() {
        let mut scheduler = FrameScheduler::new(&RenderPolicy::Still { time: 2.0 });
        let now = Instant::now();
        assert!(scheduler.ready_for_frame(now));
        scheduler.mark_rendered_at(now);
        assert!(scheduler.is_finished());
        assert!(!scheduler.ready_for_frame(now + Duration::from_secs(5)));
        assert_eq!(scheduler.next_deadline(), None);

        scheduler.reset();
        assert!(scheduler.ready_for_frame(now));
    }

    #[test]
    fn fixed_source_reports_requested_time() {
        let mut source =
            time_source_for_policy(&RenderPolicy::Still { time: 12.5 }, 3.0, Duration::ZERO);
        assert_eq!(source.sample(), TimeSample::new(12.5, 0));
        assert_eq!(source.sample().seconds, 12.5);
    }

    #[test]
    fn system_source_applies_offset_and_scale() {
        let mut source = SystemTimeSource::with_scale(0.5, Duration::from_secs(90));
        let start = Instant::now();
        assert_eq!(source.sample_at(start).seconds, 90.0);
        let later = source.sample_at(start + Duration::from_secs(10));
        assert!((later.seconds - 95.0).abs() < 1e-9);
    }

    #[test]
    fn clock_starts_at_first_sample() {
        let mut source = SystemTimeSource::new();
        let built = Instant::now();
        // Setup latency between construction and the first frame is not elapsed time.
        let first_frame = built + Duration::from_millis(300);
        let first = source.sample_at(first_frame);
        assert_eq!(first, TimeSample::new(0.0, 0));
        let second = source.sample_at(first_frame + Duration::from_millis(16));
        assert!((second.seconds - 0.016).abs() < 1e-9);
    }

    #[test]
    fn driver_first_tick_reports_time_zero() {
        let mut driver = RenderPolicyDriver::new(&RenderPolicy::default(), 1.0, Duration::ZERO);
        std::thread::sleep(Duration::from_millis(50));
        let first = driver.sample();
        assert_eq!(first.seconds, 0.0);
        assert_eq!(first.frame_index, 0);
    }

    #[test]
    fn system_source_counts_frames_and_resets() {
        let mut source = SystemTimeSource::new();
        assert_eq!(source.sample().frame_index, 0);
        assert_eq!(source.sample().frame_index, 1);
        source.reset();
        let sample = source.sample();
        assert_eq!(sample, TimeSample::new(0.0, 0));
    }
}
