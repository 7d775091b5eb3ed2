use crate::keyqueue::{KeyEvent, KeyQueue};
use crossterm::event::{poll, read, Event, KeyCode, KeyModifiers};
use crossterm::terminal;
use log::{debug, warn};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

// virtual-key codes, as the machine and the menu understand them
pub const VK_BACK: u8 = 0x08;
pub const VK_TAB: u8 = 0x09;
pub const VK_ENTER: u8 = 0x0D;
pub const VK_ESCAPE: u8 = 0x1B;
pub const VK_SPACE: u8 = 0x20;
pub const VK_PRIOR: u8 = 0x21;
pub const VK_NEXT: u8 = 0x22;
pub const VK_END: u8 = 0x23;
pub const VK_HOME: u8 = 0x24;
pub const VK_LEFT: u8 = 0x25;
pub const VK_UP: u8 = 0x26;
pub const VK_RIGHT: u8 = 0x27;
pub const VK_DOWN: u8 = 0x28;
pub const VK_INSERT: u8 = 0x2D;
pub const VK_DELETE: u8 = 0x2E;
pub const VK_F1: u8 = 0x70;
pub const VK_F11: u8 = 0x7A;
pub const VK_F12: u8 = 0x7B;

/// printable keys that aren't letters or digits, US layout
const PUNCTUATION_KEYMAP: [(char, u8); 11] = [
    (';', 0xBA),
    ('=', 0xBB),
    (',', 0xBC),
    ('-', 0xBD),
    ('.', 0xBE),
    ('/', 0xBF),
    ('`', 0xC0),
    ('[', 0xDB),
    ('\\', 0xDC),
    (']', 0xDD),
    ('\'', 0xDE),
];

/// turns terminal key codes into virtual-key codes
pub struct Keymap {
    punctuation: HashMap<char, u8>,
}

impl Default for Keymap {
    fn default() -> Self {
        Keymap::new()
    }
}

impl Keymap {
    pub fn new() -> Self {
        Keymap {
            punctuation: HashMap::from(PUNCTUATION_KEYMAP),
        }
    }

    /// (code, extended) for a key, if it has one
    pub fn translate(&self, key: KeyCode) -> Option<(u8, bool)> {
        let mapped = match key {
            KeyCode::Char(' ') => (VK_SPACE, false),
            KeyCode::Char(c) if c.is_ascii_alphabetic() => (c.to_ascii_uppercase() as u8, false),
            KeyCode::Char(c) if c.is_ascii_digit() => (c as u8, false),
            KeyCode::Char(c) => (*self.punctuation.get(&c)?, false),
            KeyCode::Enter => (VK_ENTER, false),
            KeyCode::Esc => (VK_ESCAPE, false),
            KeyCode::Backspace => (VK_BACK, false),
            KeyCode::Tab => (VK_TAB, false),
            KeyCode::Left => (VK_LEFT, true),
            KeyCode::Up => (VK_UP, true),
            KeyCode::Right => (VK_RIGHT, true),
            KeyCode::Down => (VK_DOWN, true),
            KeyCode::Home => (VK_HOME, true),
            KeyCode::End => (VK_END, true),
            KeyCode::PageUp => (VK_PRIOR, true),
            KeyCode::PageDown => (VK_NEXT, true),
            KeyCode::Insert => (VK_INSERT, true),
            KeyCode::Delete => (VK_DELETE, true),
            KeyCode::F(n @ 1..=12) => (VK_F1 + n - 1, false),
            _ => return None,
        };
        Some(mapped)
    }
}

/// the hardware reset line, as something the loop can sample
pub trait ResetLine {
    fn sample(&self) -> bool;
}

impl<T: ResetLine + ?Sized> ResetLine for Arc<T> {
    fn sample(&self) -> bool {
        (**self).sample()
    }
}

/// how many samples one press keeps the line high
const RESET_HOLD_SAMPLES: u32 = 3;

/// a reset button that reads high for a few samples after each press
#[derive(Default)]
pub struct ResetButton {
    held: AtomicU32,
}

impl ResetButton {
    pub fn new() -> Self {
        ResetButton::default()
    }

    pub fn press(&self) {
        self.held.store(RESET_HOLD_SAMPLES, Ordering::Release);
    }
}

impl ResetLine for ResetButton {
    fn sample(&self) -> bool {
        self.held
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// a reset line nobody ever pulls
pub struct NoReset;

impl ResetLine for NoReset {
    fn sample(&self) -> bool {
        false
    }
}

/// Reads the terminal on its own thread and feeds the key queue. Terminals
/// only report presses, so each one goes in as a down followed by an up.
/// F11 is the reset button; ctrl-c asks the loop to quit.
pub struct TermInput {
    quit: Arc<AtomicBool>,
    reader: Option<JoinHandle<io::Result<()>>>,
}

impl TermInput {
    pub fn new(queue: Arc<KeyQueue>, reset: Arc<ResetButton>) -> Result<Self, io::Error> {
        terminal::enable_raw_mode()?;
        let quit = Arc::new(AtomicBool::new(false));
        let reader = {
            let quit = Arc::clone(&quit);
            thread::Builder::new()
                .name("input".into())
                .spawn(move || read_keys(&queue, &reset, &quit))?
        };
        Ok(TermInput {
            quit,
            reader: Some(reader),
        })
    }

    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }
}

impl Drop for TermInput {
    fn drop(&mut self) {
        self.quit.store(true, Ordering::Release);
        if let Some(reader) = self.reader.take() {
            match reader.join() {
                Ok(Err(e)) => warn!("input thread failed: {}", e),
                Err(_) => warn!("input thread panicked"),
                Ok(Ok(())) => (),
            }
        }
        if let Err(e) = terminal::disable_raw_mode() {
            warn!("could not restore terminal: {}", e);
        }
    }
}

fn read_keys(queue: &KeyQueue, reset: &ResetButton, quit: &AtomicBool) -> io::Result<()> {
    let keymap = Keymap::new();
    while !quit.load(Ordering::Acquire) {
        if !poll(Duration::from_millis(50))? {
            continue;
        }
        let key = match read()? {
            Event::Key(key) => key,
            _ => continue,
        };
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            quit.store(true, Ordering::Release);
            break;
        }
        if key.code == KeyCode::F(11) {
            reset.press();
            continue;
        }
        match keymap.translate(key.code) {
            Some((code, extended)) => {
                let mut down = KeyEvent::down(code);
                let mut up = KeyEvent::up(code);
                down.extended = extended;
                up.extended = extended;
                if !queue.push_pair(down, up) {
                    debug!("key queue full, dropped {:02x}", code);
                }
            }
            None => debug!("no key code for {:?}", key.code),
        }
    }
    Ok(())
}
