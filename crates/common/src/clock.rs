//! Display pacing and playback position utilities.
//!
//! Preview playback presents decoded frames against a chain of display
//! deadlines spaced one frame interval apart. This module provides:
//! - The deadline chain (`DisplayPacer`)
//! - Position formatting for the position indicator
//! - Conversions between timestamps and scrub-bar slider values

use std::time::{Duration, Instant};

/// Deadline chain for presenting frames at the source frame rate.
///
/// Each scheduled frame is shown at `previous_deadline + 1/frame_rate`.
/// A frame that arrives after its deadline is shown immediately and the
/// chain restarts from that moment; frames are never skipped.
#[derive(Debug, Clone)]
pub struct DisplayPacer {
    interval: Duration,
    next_deadline: Option<Instant>,
}

impl DisplayPacer {
    /// Create a pacer for the given frame rate (frames per second).
    ///
    /// A non-positive or non-finite rate disables pacing.
    pub fn new(frame_rate: f64) -> Self {
        let interval = if frame_rate.is_finite() && frame_rate > 0.0 {
            Duration::from_secs_f64(1.0 / frame_rate)
        } else {
            Duration::ZERO
        };
        Self {
            interval,
            next_deadline: None,
        }
    }

    /// Decide when a frame that arrived at `now` should be presented,
    /// and advance the chain by one interval.
    pub fn schedule(&mut self, now: Instant) -> Instant {
        let present_at = match self.next_deadline {
            Some(deadline) if deadline > now => deadline,
            _ => now,
        };
        self.next_deadline = Some(present_at + self.interval);
        present_at
    }

    /// Forget the deadline chain (after a seek or when playback stops).
    pub fn reset(&mut self) {
        self.next_deadline = None;
    }

    /// Deadline for the next presented frame, if a chain is running.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_deadline
    }

    /// One frame interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Format a position as `mm:ss.mmm`, or `h:mm:ss.mmm` when `total_secs`
/// (or the position itself, if no total is given) is an hour or more.
pub fn format_position(secs: f64, total_secs: Option<f64>) -> String {
    let to_ms = |s: f64| (s.max(0.0) * 1000.0).floor() as i64;
    let position = chrono::Duration::milliseconds(to_ms(secs));
    let formatting = chrono::Duration::milliseconds(to_ms(total_secs.unwrap_or(secs)));

    let hours = position.num_hours();
    let minutes = position.num_minutes() % 60;
    let seconds = position.num_seconds() % 60;
    let millis = position.num_milliseconds() % 1000;

    if formatting >= chrono::Duration::hours(1) {
        format!("{hours}:{minutes:02}:{seconds:02}.{millis:03}")
    } else {
        let minutes = position.num_minutes();
        format!("{minutes:02}:{seconds:02}.{millis:03}")
    }
}

/// Scrub-bar slider value for a timestamp.
pub fn slider_value_for(time_secs: f64, duration_secs: f64, frame_count: u64) -> u64 {
    if duration_secs <= 0.0 {
        return 0;
    }
    let ratio = (time_secs / duration_secs).clamp(0.0, 1.0);
    (ratio * frame_count as f64).round() as u64
}

/// Seek target in seconds for a scrub-bar slider value.
pub fn seek_time_for(slider_value: u64, frame_rate: f64) -> f64 {
    if frame_rate <= 0.0 {
        return 0.0;
    }
    slider_value as f64 / frame_rate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacer_spaces_early_frames_one_interval_apart() {
        let mut pacer = DisplayPacer::new(25.0);
        let start = Instant::now();

        let first = pacer.schedule(start);
        assert_eq!(first, start);

        // Next frame arrives 5ms later, well before its deadline.
        let second = pacer.schedule(start + Duration::from_millis(5));
        assert_eq!(second, start + Duration::from_millis(40));

        let third = pacer.schedule(start + Duration::from_millis(10));
        assert_eq!(third, start + Duration::from_millis(80));
    }

    #[test]
    fn test_pacer_presents_late_frames_immediately() {
        let mut pacer = DisplayPacer::new(50.0);
        let start = Instant::now();
        pacer.schedule(start);

        let late = start + Duration::from_millis(100);
        assert_eq!(pacer.schedule(late), late);
        assert_eq!(pacer.next_deadline(), Some(late + Duration::from_millis(20)));
    }

    #[test]
    fn test_pacer_reset_restarts_chain() {
        let mut pacer = DisplayPacer::new(30.0);
        let start = Instant::now();
        pacer.schedule(start);
        pacer.reset();
        assert!(pacer.next_deadline().is_none());
        let now = start + Duration::from_millis(1);
        assert_eq!(pacer.schedule(now), now);
    }

    #[test]
    fn test_zero_rate_disables_pacing() {
        let pacer = DisplayPacer::new(0.0);
        assert_eq!(pacer.interval(), Duration::ZERO);
    }

    #[test]
    fn test_format_position_short_video() {
        assert_eq!(format_position(65.25, Some(120.0)), "01:05.250");
        assert_eq!(format_position(0.0, None), "00:00.000");
    }

    #[test]
    fn test_format_position_uses_total_for_hour_field() {
        assert_eq!(format_position(65.25, Some(3700.0)), "0:01:05.250");
        assert_eq!(format_position(3725.5, None), "1:02:05.500");
    }

    #[test]
    fn test_slider_conversions() {
        assert_eq!(slider_value_for(5.0, 10.0, 300), 150);
        assert_eq!(slider_value_for(12.0, 10.0, 300), 300);
        assert_eq!(slider_value_for(1.0, 0.0, 300), 0);
        assert!((seek_time_for(150, 30.0) - 5.0).abs() < 1e-9);
    }
}
