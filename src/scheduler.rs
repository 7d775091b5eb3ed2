/// # scheduler
///
/// Frame pacing. The frame length is carried in 1/1024ths of a millisecond so
/// that rates which don't divide 1000 evenly (60Hz, 59.94Hz) don't drift:
/// whole milliseconds are taken off the accumulator each frame and the
/// fraction is kept for the next one.
///
/// `FrameScheduler` never reads a clock itself; the caller passes the time
/// in and acts on the returned `FramePlan`.
use crate::emulator::FrameInterval;
use std::thread;
use std::time::{Duration, Instant};

/// don't bother sleeping for less than this; we'd likely overshoot
pub const MIN_SLEEP_MS: u64 = 10;

/// cadence of the main loop while the menu is up or the machine is held
pub const IDLE_FRAME_MS: u64 = 32;

/// what to do with the frame that was just emulated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePlan {
    pub render: bool,
    /// wall-clock time (us) the next frame is due, when it's in the future
    pub wait_until_us: Option<u64>,
}

impl FramePlan {
    pub const IDLE: FramePlan = FramePlan {
        render: false,
        wait_until_us: None,
    };
}

#[derive(Debug, Default)]
pub struct FrameScheduler {
    next_time_us: u64,
    accum: u64,
    skip_frames: u32,
    prev_skip: bool,
}

impl FrameScheduler {
    pub fn new() -> Self {
        FrameScheduler::default()
    }

    pub fn next_time_us(&self) -> u64 {
        self.next_time_us
    }

    pub fn skip_frames(&self) -> u32 {
        self.skip_frames
    }

    /// forget the schedule; the next frame starts a fresh one
    pub fn resync(&mut self) {
        self.next_time_us = 0;
        self.skip_frames = 0;
    }

    /// Book one emulated frame and decide whether to draw it.
    ///
    /// `skip` is this frame's skip decision (running flat out, or the
    /// machine doesn't need it drawn). While skipping, time doesn't advance,
    /// so the schedule falls behind and frames go undrawn; after `frame_rate`
    /// of those in a row one is drawn anyway and the schedule restarts.
    pub fn plan(&mut self, now_us: u64, interval: FrameInterval, skip: bool, frame_rate: u32) -> FramePlan {
        let ticks = match interval {
            FrameInterval::Ticks(ticks) => ticks as u64,
            FrameInterval::NoMachine => return FramePlan::IDLE,
        };

        if (self.prev_skip && !skip) || self.next_time_us == 0 {
            self.next_time_us = now_us;
        }
        if !skip {
            self.accum += ticks;
            let ms = self.accum >> 10;
            self.accum -= ms << 10;
            self.next_time_us += ms * 1000;
        }
        self.prev_skip = skip;

        if self.next_time_us > now_us {
            self.skip_frames = 0;
            return FramePlan {
                render: !skip,
                wait_until_us: Some(self.next_time_us),
            };
        }
        self.skip_frames += 1;
        if self.skip_frames > frame_rate {
            // a second of machine time without a picture
            self.skip_frames = 0;
            self.next_time_us = now_us;
            return FramePlan {
                render: true,
                wait_until_us: None,
            };
        }
        FramePlan::IDLE
    }
}

/// whole ms to sleep until `deadline_us`, if it's worth sleeping at all
pub fn sleep_ms(deadline_us: u64, now_us: u64) -> Option<u64> {
    let remaining = (deadline_us / 1000).saturating_sub(now_us / 1000);
    if remaining >= MIN_SLEEP_MS {
        Some(remaining)
    } else {
        None
    }
}

/// the loop's view of time
pub trait Timer {
    /// monotonic microseconds
    fn now_us(&self) -> u64;
    fn sleep_ms(&mut self, ms: u64);
    /// let other work run; called exactly once per tick
    fn yield_now(&mut self);
}

/// real time, with spin-assisted sleeps for accuracy
pub struct SpinTimer {
    start: Instant,
    sleeper: spin_sleep::SpinSleeper,
}

impl SpinTimer {
    pub fn new() -> Self {
        SpinTimer {
            start: Instant::now(),
            sleeper: spin_sleep::SpinSleeper::default(),
        }
    }
}

impl Default for SpinTimer {
    fn default() -> Self {
        SpinTimer::new()
    }
}

impl Timer for SpinTimer {
    fn now_us(&self) -> u64 {
        // +1 so the first reading is never the "unscheduled" zero
        self.start.elapsed().as_micros() as u64 + 1
    }

    fn sleep_ms(&mut self, ms: u64) {
        self.sleeper.sleep(Duration::from_millis(ms));
    }

    fn yield_now(&mut self) {
        thread::yield_now();
    }
}
