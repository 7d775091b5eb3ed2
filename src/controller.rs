/// # controller
///
/// The main loop, one `tick` at a time. Everything the loop touches is owned
/// here and handed down by reference, so the pieces never reach for each
/// other through globals.
///
/// Each tick:
///
/// * samples the reset line and resets the machine on its rising edge
/// * drains the key queue, routing keys to the menu while it's up, and to
///   the machine otherwise (F12 opens the menu)
/// * then exactly one of: redraw while reset is held, draw the menu, run a
///   frame of the machine, or idle when there's no machine
/// * yields once
use crate::browser::Filesystem;
use crate::display::Display;
use crate::emulator::{Emulator, FrameInterval};
use crate::input::{ResetLine, VK_F12};
use crate::keyqueue::{KeyEventKind, KeyQueue};
use crate::navigator::Navigator;
use crate::scheduler::{sleep_ms, FrameScheduler, Timer, IDLE_FRAME_MS};
use log::{debug, info};
use std::io;
use std::sync::Arc;

pub struct Controller {
    emu: Emulator,
    nav: Navigator,
    keys: Arc<KeyQueue>,
    reset: Box<dyn ResetLine>,
    fs: Box<dyn Filesystem>,
    display: Box<dyn Display>,
    timer: Box<dyn Timer>,
    scheduler: FrameScheduler,
    reset_held: bool,
}

impl Controller {
    pub fn new(
        emu: Emulator,
        nav: Navigator,
        keys: Arc<KeyQueue>,
        reset: Box<dyn ResetLine>,
        fs: Box<dyn Filesystem>,
        display: Box<dyn Display>,
        timer: Box<dyn Timer>,
    ) -> Self {
        Controller {
            emu,
            nav,
            keys,
            reset,
            fs,
            display,
            timer,
            scheduler: FrameScheduler::new(),
            reset_held: false,
        }
    }

    pub fn emulator(&self) -> &Emulator {
        &self.emu
    }

    pub fn navigator(&self) -> &Navigator {
        &self.nav
    }

    /// one pass of the main loop
    pub fn tick(&mut self) -> Result<(), io::Error> {
        let result = self.step();
        self.timer.yield_now();
        result
    }

    fn step(&mut self) -> Result<(), io::Error> {
        let reset = self.reset.sample();
        if reset && !self.reset_held {
            info!("reset line raised");
            self.emu.pulse_reset();
        }
        self.reset_held = reset;

        self.drain_keys();

        if self.reset_held {
            self.emu.draw_screen();
            self.present()?;
            self.timer.sleep_ms(IDLE_FRAME_MS);
        } else if self.nav.is_visible() {
            self.menu_frame()?;
        } else {
            self.machine_frame()?;
        }

        if self.emu.take_geometry_update() {
            self.display.refresh_geometry()?;
        }
        Ok(())
    }

    fn now_ms(&self) -> u64 {
        self.timer.now_us() / 1000
    }

    fn drain_keys(&mut self) {
        while let Some(event) = self.keys.pop() {
            let down = event.kind == KeyEventKind::Down;
            if self.nav.is_visible() {
                let now_ms = self.now_ms();
                self.nav
                    .process_key(&mut self.emu, self.fs.as_ref(), event.code, down, now_ms);
            } else if down && event.code == VK_F12 {
                self.nav.toggle(&mut self.emu);
            } else if down {
                self.emu.key_down(event.code, event.extended, event.repeat);
            } else {
                self.emu.key_up(event.code, event.extended);
            }
        }
    }

    fn menu_frame(&mut self) -> Result<(), io::Error> {
        let now_ms = self.now_ms();
        self.nav.update(&mut self.emu, self.fs.as_ref(), now_ms);
        if self.nav.is_visible() {
            let geo = self.display.geometry();
            self.nav.set_files_per_page(geo.files_per_page());
            self.nav.prepare_overlay(self.fs.as_ref());
            let ops = self.nav.overlay(&self.emu, geo);
            self.display.draw_overlay(&ops)?;
        }
        // pacing starts over once the menu goes away
        self.scheduler.resync();
        self.timer.sleep_ms(IDLE_FRAME_MS);
        Ok(())
    }

    fn machine_frame(&mut self) -> Result<(), io::Error> {
        let interval = self.emu.frame_interval();
        if interval == FrameInterval::NoMachine {
            self.timer.sleep_ms(IDLE_FRAME_MS);
            return Ok(());
        }

        self.emu.run();
        let skip = self.emu.should_skip();
        let plan = self
            .scheduler
            .plan(self.timer.now_us(), interval, skip, self.emu.frame_rate());
        if plan.render {
            self.emu.draw_screen();
            self.present()?;
        } else {
            debug!("frame skipped ({} behind)", self.scheduler.skip_frames());
        }
        if let Some(deadline) = plan.wait_until_us {
            if let Some(ms) = sleep_ms(deadline, self.timer.now_us()) {
                self.timer.sleep_ms(ms);
            }
        }
        Ok(())
    }

    fn present(&mut self) -> Result<(), io::Error> {
        if let Some(frame) = self.emu.screen() {
            self.display.draw_frame(&frame)?;
        }
        Ok(())
    }
}
