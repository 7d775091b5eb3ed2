use heapless::Deque;
use std::sync::Mutex;

/// how many events the queue holds before it starts dropping new ones
pub const KEY_QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    Down,
    Up,
}

/// one raw key transition, copied into and out of the queue by value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    pub code: u8,
    pub extended: bool,
    pub repeat: bool,
}

impl KeyEvent {
    pub fn down(code: u8) -> Self {
        KeyEvent {
            kind: KeyEventKind::Down,
            code,
            extended: false,
            repeat: false,
        }
    }

    pub fn up(code: u8) -> Self {
        KeyEvent {
            kind: KeyEventKind::Up,
            code,
            extended: false,
            repeat: false,
        }
    }
}

/// Bounded mailbox between the input thread and the main loop.
///
/// Producers may call `push` from any thread; the loop is the only caller of
/// `pop`. The lock covers the index update and one slot copy, nothing more.
/// When full, the *new* event is dropped so older unconsumed events survive:
/// 33 pushes into an empty queue keep events 1..=32 and lose the 33rd.
pub struct KeyQueue {
    events: Mutex<Deque<KeyEvent, KEY_QUEUE_CAPACITY>>,
}

impl KeyQueue {
    pub fn new() -> Self {
        KeyQueue {
            events: Mutex::new(Deque::new()),
        }
    }

    /// enqueue an event; returns false if it was dropped
    pub fn push(&self, event: KeyEvent) -> bool {
        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push_back(event).is_ok()
    }

    /// enqueue both events or neither; returns false if they were dropped
    pub fn push_pair(&self, first: KeyEvent, second: KeyEvent) -> bool {
        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if KEY_QUEUE_CAPACITY - events.len() < 2 {
            return false;
        }
        events.push_back(first).is_ok() && events.push_back(second).is_ok()
    }

    /// take the oldest event, if any
    pub fn pop(&self) -> Option<KeyEvent> {
        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.pop_front()
    }

    pub fn len(&self) -> usize {
        match self.events.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for KeyQueue {
    fn default() -> Self {
        KeyQueue::new()
    }
}
