/// # machine
///
/// the emulated machine as the front end sees it: something that runs a
/// batch of frames, has removable media in numbered slots and can draw its
/// screen. everything behind this trait (cpu, video, audio) is someone
/// else's problem.
use crate::config::{Settings, FLOPPY_DRIVES, TAPE_DECKS};
use log::{debug, info};

/// one monochrome screen; a non-zero byte is a lit pixel
pub struct Frame<'a> {
    pub width: usize,
    pub height: usize,
    pub pixels: &'a [u8],
}

pub trait Machine {
    /// run one batch of emulation; returns how many frames it covered
    fn run(&mut self) -> usize;

    /// nominal frames per second
    fn frame_rate(&self) -> f64;

    fn is_frame_skippable(&self) -> bool;
    fn is_video_recording(&self) -> bool;
    fn is_sound_recording(&self) -> bool;

    /// render the current frame into the screen buffer
    fn draw_screen(&mut self);
    fn screen(&self) -> Frame<'_>;

    fn reset(&mut self);
    fn special_reset(&mut self);

    fn key_down(&mut self, code: u8, extended: bool, repeat: bool);
    fn key_up(&mut self, code: u8, extended: bool);

    fn open_floppy_disk(&mut self, drive: usize, path: &str);
    fn close_floppy_disk(&mut self, drive: usize);
    fn is_floppy_disk_inserted(&self, drive: usize) -> bool;

    fn play_tape(&mut self, deck: usize, path: &str);
    fn rec_tape(&mut self, deck: usize, path: &str);
    fn close_tape(&mut self, deck: usize);
    fn is_tape_inserted(&self, deck: usize) -> bool;

    fn push_play(&mut self, deck: usize);
    fn push_stop(&mut self, deck: usize);
    fn push_fast_forward(&mut self, deck: usize);
    fn push_fast_rewind(&mut self, deck: usize);
    fn push_apss_forward(&mut self, deck: usize);
    fn push_apss_rewind(&mut self, deck: usize);

    /// pick up settings changed from the menu
    fn update_config(&mut self, settings: &Settings);
}

const DEMO_WIDTH: usize = 64;
const DEMO_HEIGHT: usize = 32;

/// A stand-in machine that draws a moving test card. It keeps track of
/// media and keys so the menu has something real to talk to.
pub struct DemoMachine {
    rate: f64,
    frame_count: u64,
    screen: Vec<u8>,
    floppies: [Option<String>; FLOPPY_DRIVES],
    tapes: [Option<String>; TAPE_DECKS],
    last_key: Option<u8>,
    full_speed: bool,
}

impl DemoMachine {
    pub fn new(rate: f64) -> Self {
        DemoMachine {
            rate,
            frame_count: 0,
            screen: vec![0; DEMO_WIDTH * DEMO_HEIGHT],
            floppies: Default::default(),
            tapes: Default::default(),
            last_key: None,
            full_speed: false,
        }
    }

    fn plot(&mut self, x: usize, y: usize) {
        if x < DEMO_WIDTH && y < DEMO_HEIGHT {
            self.screen[y * DEMO_WIDTH + x] = 1;
        }
    }
}

impl Machine for DemoMachine {
    fn run(&mut self) -> usize {
        self.frame_count += 1;
        1
    }

    fn frame_rate(&self) -> f64 {
        self.rate
    }

    fn is_frame_skippable(&self) -> bool {
        false
    }

    fn is_video_recording(&self) -> bool {
        false
    }

    fn is_sound_recording(&self) -> bool {
        false
    }

    fn draw_screen(&mut self) {
        self.screen.iter_mut().for_each(|p| *p = 0);
        for x in 0..DEMO_WIDTH {
            self.plot(x, 0);
            self.plot(x, DEMO_HEIGHT - 1);
        }
        for y in 0..DEMO_HEIGHT {
            self.plot(0, y);
            self.plot(DEMO_WIDTH - 1, y);
        }
        // a bar sweeping once a second
        let sweep = (self.frame_count as f64 / self.rate.max(1.0)).fract();
        let bar = 1 + (sweep * (DEMO_WIDTH - 2) as f64) as usize;
        for y in 2..DEMO_HEIGHT - 2 {
            self.plot(bar, y);
        }
        // media lamps along the top
        let floppies: Vec<usize> = (0..FLOPPY_DRIVES).filter(|&d| self.floppies[d].is_some()).collect();
        let tapes: Vec<usize> = (0..TAPE_DECKS).filter(|&d| self.tapes[d].is_some()).collect();
        for drive in floppies {
            self.plot(2 + drive * 2, 2);
        }
        for deck in tapes {
            self.plot(DEMO_WIDTH - 3 - deck * 2, 2);
        }
        if self.full_speed {
            self.plot(DEMO_WIDTH / 2, 2);
        }
        if let Some(code) = self.last_key {
            for bit in 0..8 {
                if code & (0x80 >> bit) != 0 {
                    self.plot(2 + bit, DEMO_HEIGHT - 3);
                }
            }
        }
    }

    fn screen(&self) -> Frame<'_> {
        Frame {
            width: DEMO_WIDTH,
            height: DEMO_HEIGHT,
            pixels: &self.screen,
        }
    }

    fn reset(&mut self) {
        info!("demo machine reset");
        self.frame_count = 0;
    }

    fn special_reset(&mut self) {
        info!("demo machine nmi");
    }

    fn key_down(&mut self, code: u8, _extended: bool, _repeat: bool) {
        self.last_key = Some(code);
    }

    fn key_up(&mut self, code: u8, _extended: bool) {
        if self.last_key == Some(code) {
            self.last_key = None;
        }
    }

    fn open_floppy_disk(&mut self, drive: usize, path: &str) {
        if let Some(slot) = self.floppies.get_mut(drive) {
            debug!("fd{} <- {}", drive, path);
            *slot = Some(path.to_string());
        }
    }

    fn close_floppy_disk(&mut self, drive: usize) {
        if let Some(slot) = self.floppies.get_mut(drive) {
            *slot = None;
        }
    }

    fn is_floppy_disk_inserted(&self, drive: usize) -> bool {
        matches!(self.floppies.get(drive), Some(Some(_)))
    }

    fn play_tape(&mut self, deck: usize, path: &str) {
        if let Some(slot) = self.tapes.get_mut(deck) {
            debug!("cmt{} play {}", deck, path);
            *slot = Some(path.to_string());
        }
    }

    fn rec_tape(&mut self, deck: usize, path: &str) {
        if let Some(slot) = self.tapes.get_mut(deck) {
            debug!("cmt{} rec {}", deck, path);
            *slot = Some(path.to_string());
        }
    }

    fn close_tape(&mut self, deck: usize) {
        if let Some(slot) = self.tapes.get_mut(deck) {
            *slot = None;
        }
    }

    fn is_tape_inserted(&self, deck: usize) -> bool {
        matches!(self.tapes.get(deck), Some(Some(_)))
    }

    fn push_play(&mut self, _deck: usize) {}
    fn push_stop(&mut self, _deck: usize) {}
    fn push_fast_forward(&mut self, _deck: usize) {}
    fn push_fast_rewind(&mut self, _deck: usize) {}
    fn push_apss_forward(&mut self, _deck: usize) {}
    fn push_apss_rewind(&mut self, _deck: usize) {}

    fn update_config(&mut self, settings: &Settings) {
        self.full_speed = settings.full_speed;
    }
}
