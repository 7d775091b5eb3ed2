/// # emulator
///
/// the context object that everything else talks to: an optional machine
/// (there may not be one yet) and the settings store. menu actions, media
/// paths written from the file browser and the reset line all end up here.
use crate::config::{ConfigStore, IntSelect, Settings, FLOPPY_DRIVES, TAPE_DECKS};
use crate::machine::{Frame, Machine};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt;
use std::str::FromStr;

/// Wall-clock length of one frame in 1/1024ths of a millisecond, or no
/// answer at all when there is no machine to ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameInterval {
    Ticks(u32),
    NoMachine,
}

impl FrameInterval {
    /// round(1024 * 1000 / fps)
    pub fn from_rate(fps: f64) -> FrameInterval {
        if !fps.is_finite() || fps <= 0.0 {
            return FrameInterval::NoMachine;
        }
        FrameInterval::Ticks((1024.0 * 1000.0 / fps + 0.5) as u32)
    }
}

/// a parsed `Command[:Parameter]` action token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    FdClose(usize),
    /// no blank-disk support; behaves like FdClose
    FdCreate(usize),
    CmtEject(usize),
    CmtPlay(usize),
    CmtStop(usize),
    CmtForward(usize),
    CmtRewind(usize),
    CmtApssForward(usize),
    CmtApssRewind(usize),
    Reset,
    Nmi,
    About,
    License,
    SaveDiskChanges,
    SaveTapeChanges,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    Unknown(String),
    MissingParameter(String),
    BadParameter(String),
    NoMachine,
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionError::Unknown(cmd) => write!(f, "unknown action '{}'", cmd),
            ActionError::MissingParameter(cmd) => write!(f, "action '{}' needs a drive number", cmd),
            ActionError::BadParameter(token) => write!(f, "bad drive number in '{}'", token),
            ActionError::NoMachine => write!(f, "no machine to act on"),
        }
    }
}

impl Error for ActionError {}

impl FromStr for Action {
    type Err = ActionError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let (command, param) = match token.split_once(':') {
            Some((command, param)) => (command.trim(), Some(param.trim())),
            None => (token.trim(), None),
        };
        let drive = || -> Result<usize, ActionError> {
            match param {
                None | Some("") => Err(ActionError::MissingParameter(command.to_string())),
                Some(p) => p
                    .parse::<usize>()
                    .map_err(|_| ActionError::BadParameter(token.to_string())),
            }
        };
        let action = match command {
            "FDClose" => Action::FdClose(drive()?),
            "FDCreate" => Action::FdCreate(drive()?),
            "CMTEject" => Action::CmtEject(drive()?),
            "CMTPlay" => Action::CmtPlay(drive()?),
            "CMTStop" => Action::CmtStop(drive()?),
            "CMTForward" => Action::CmtForward(drive()?),
            "CMTRewind" => Action::CmtRewind(drive()?),
            "CMTAPSSForward" => Action::CmtApssForward(drive()?),
            "CMTAPSSRewind" => Action::CmtApssRewind(drive()?),
            "Reset" => Action::Reset,
            "NMI" => Action::Nmi,
            "About" => Action::About,
            "License" => Action::License,
            "SaveDiskChanges" => Action::SaveDiskChanges,
            "SaveTapeChanges" => Action::SaveTapeChanges,
            _ => return Err(ActionError::Unknown(command.to_string())),
        };
        if !action.has_valid_slot() {
            return Err(ActionError::BadParameter(token.to_string()));
        }
        Ok(action)
    }
}

impl Action {
    /// drive actions name a floppy drive, tape actions a deck
    fn has_valid_slot(&self) -> bool {
        match *self {
            Action::FdClose(d) | Action::FdCreate(d) => d < FLOPPY_DRIVES,
            Action::CmtEject(d)
            | Action::CmtPlay(d)
            | Action::CmtStop(d)
            | Action::CmtForward(d)
            | Action::CmtRewind(d)
            | Action::CmtApssForward(d)
            | Action::CmtApssRewind(d) => d < TAPE_DECKS,
            _ => true,
        }
    }
}

pub struct Emulator {
    machine: Option<Box<dyn Machine>>,
    config: Box<dyn ConfigStore>,
    geometry_changed: bool,
}

impl Emulator {
    pub fn new(machine: Option<Box<dyn Machine>>, config: Box<dyn ConfigStore>) -> Self {
        Emulator {
            machine,
            config,
            geometry_changed: false,
        }
    }

    pub fn has_machine(&self) -> bool {
        self.machine.is_some()
    }

    pub fn settings(&self) -> &Settings {
        self.config.settings()
    }

    pub fn get_bool(&self, name: &str) -> bool {
        self.config.settings().get_bool(name)
    }

    pub fn set_bool(&mut self, name: &str, value: bool) -> bool {
        self.config.settings_mut().set_bool(name, value)
    }

    pub fn get_int(&self, name: &str) -> i32 {
        self.config.settings().get_int(name)
    }

    pub fn set_int(&mut self, name: &str, value: i32) -> bool {
        self.config.settings_mut().set_int(name, value)
    }

    pub fn int_select(&self, name: &str) -> Option<IntSelect> {
        self.config.settings().int_select(name)
    }

    pub fn get_string(&self, name: &str) -> &str {
        self.config.settings().get_string(name)
    }

    /// store a string setting; media path keys also load the medium
    pub fn set_string(&mut self, name: &str, value: &str) -> bool {
        if !self.config.settings_mut().set_string(name, value) {
            return false;
        }
        match crate::config::split_key(name) {
            ("current_floppy_disk_path", Some(drive)) => self.open_floppy_disk(drive, value),
            ("current_tape_path", Some(deck)) => self.play_tape(deck, value),
            ("record_tape_path", Some(deck)) => {
                if let Some(m) = self.machine.as_mut() {
                    m.rec_tape(deck, value);
                }
            }
            _ => (),
        }
        true
    }

    /// ask the host display to work out its geometry again
    pub fn request_geometry_update(&mut self) {
        self.geometry_changed = true;
    }

    /// true once after each geometry request
    pub fn take_geometry_update(&mut self) -> bool {
        std::mem::replace(&mut self.geometry_changed, false)
    }

    pub fn reload_config(&mut self) {
        if let Err(e) = self.config.load() {
            warn!("could not reload settings: {}", e);
        }
    }

    /// push settings into the machine and persist them
    pub fn apply_config(&mut self) {
        if let Some(m) = self.machine.as_mut() {
            m.update_config(self.config.settings());
        }
        if let Err(e) = self.config.save() {
            warn!("could not save settings: {}", e);
        }
    }

    /// load every medium named in the settings
    pub fn insert_configured_media(&mut self) {
        for drive in 0..FLOPPY_DRIVES {
            let path = self.config.settings().current_floppy_disk_path[drive].clone();
            if !path.is_empty() {
                self.open_floppy_disk(drive, &path);
            }
        }
        for deck in 0..TAPE_DECKS {
            let path = self.config.settings().current_tape_path[deck].clone();
            if !path.is_empty() {
                self.play_tape(deck, &path);
            }
        }
    }

    fn open_floppy_disk(&mut self, drive: usize, path: &str) {
        if drive >= FLOPPY_DRIVES {
            return;
        }
        if let Some(m) = self.machine.as_mut() {
            info!("fd{}: {}", drive, path);
            m.open_floppy_disk(drive, path);
        }
    }

    fn play_tape(&mut self, deck: usize, path: &str) {
        if deck >= TAPE_DECKS {
            return;
        }
        if let Some(m) = self.machine.as_mut() {
            info!("cmt{}: {}", deck, path);
            m.play_tape(deck, path);
        }
    }

    /// Reset triggered from the reset line. Whatever floppies were in before
    /// the reset are closed (flushing writes) and reopened from their
    /// configured paths.
    pub fn pulse_reset(&mut self) {
        let machine = match self.machine.as_mut() {
            Some(m) => m,
            None => return,
        };
        let inserted: Vec<usize> = (0..FLOPPY_DRIVES)
            .filter(|&d| machine.is_floppy_disk_inserted(d))
            .collect();
        machine.reset();
        for &drive in &inserted {
            machine.close_floppy_disk(drive);
        }
        for &drive in &inserted {
            let path = &self.config.settings().current_floppy_disk_path[drive];
            machine.open_floppy_disk(drive, path);
        }
        info!("reset line: machine reset, {} floppies reopened", inserted.len());
    }

    /// parse and run an action token
    pub fn run_action(&mut self, token: &str) -> Result<Action, ActionError> {
        let action: Action = token.parse()?;
        self.perform(action)?;
        Ok(action)
    }

    pub fn perform(&mut self, action: Action) -> Result<(), ActionError> {
        if !action.has_valid_slot() {
            return Err(ActionError::BadParameter(format!("{:?}", action)));
        }
        let machine = self.machine.as_mut().ok_or(ActionError::NoMachine)?;
        debug!("action {:?}", action);
        match action {
            // an ejected medium must not come back at the next start
            Action::FdClose(d) | Action::FdCreate(d) => {
                self.config.settings_mut().current_floppy_disk_path[d].clear();
                machine.close_floppy_disk(d);
            }
            Action::CmtEject(d) => {
                self.config.settings_mut().current_tape_path[d].clear();
                machine.close_tape(d);
            }
            Action::CmtPlay(d) => machine.push_play(d),
            Action::CmtStop(d) => machine.push_stop(d),
            Action::CmtForward(d) => machine.push_fast_forward(d),
            Action::CmtRewind(d) => machine.push_fast_rewind(d),
            Action::CmtApssForward(d) => machine.push_apss_forward(d),
            Action::CmtApssRewind(d) => machine.push_apss_rewind(d),
            Action::Reset => machine.reset(),
            Action::Nmi => machine.special_reset(),
            Action::About | Action::License => (),
            Action::SaveDiskChanges => {
                for drive in 0..FLOPPY_DRIVES {
                    if machine.is_floppy_disk_inserted(drive) {
                        machine.close_floppy_disk(drive);
                        let path = &self.config.settings().current_floppy_disk_path[drive];
                        machine.open_floppy_disk(drive, path);
                    }
                }
            }
            Action::SaveTapeChanges => {
                for deck in 0..TAPE_DECKS {
                    if machine.is_tape_inserted(deck) {
                        machine.close_tape(deck);
                        let path = &self.config.settings().current_tape_path[deck];
                        machine.play_tape(deck, path);
                        machine.push_stop(deck);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> FrameInterval {
        match self.machine.as_ref() {
            Some(m) => FrameInterval::from_rate(m.frame_rate()),
            None => FrameInterval::NoMachine,
        }
    }

    /// whole frames per second, 0 without a machine
    pub fn frame_rate(&self) -> u32 {
        self.machine
            .as_ref()
            .map(|m| m.frame_rate().max(0.0) as u32)
            .unwrap_or(0)
    }

    /// frames may be skipped when running flat out or when the machine says
    /// so, but never while recording
    pub fn should_skip(&self) -> bool {
        match self.machine.as_ref() {
            Some(m) => {
                (self.config.settings().full_speed || m.is_frame_skippable())
                    && !m.is_video_recording()
                    && !m.is_sound_recording()
            }
            None => false,
        }
    }

    pub fn run(&mut self) -> usize {
        self.machine.as_mut().map(|m| m.run()).unwrap_or(0)
    }

    pub fn draw_screen(&mut self) {
        if let Some(m) = self.machine.as_mut() {
            m.draw_screen();
        }
    }

    pub fn screen(&self) -> Option<Frame<'_>> {
        self.machine.as_ref().map(|m| m.screen())
    }

    pub fn key_down(&mut self, code: u8, extended: bool, repeat: bool) {
        if let Some(m) = self.machine.as_mut() {
            m.key_down(code, extended, repeat);
        }
    }

    pub fn key_up(&mut self, code: u8, extended: bool) {
        if let Some(m) = self.machine.as_mut() {
            m.key_up(code, extended);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::machine::recording::{CallLog, RecordingMachine};

    fn emulator(settings: Settings) -> (Emulator, CallLog) {
        let (machine, calls) = RecordingMachine::new();
        let emu = Emulator::new(Some(Box::new(machine)), Box::new(MemoryConfig::new(settings)));
        (emu, calls)
    }

    #[test]
    fn test_parse_actions() {
        assert_eq!("FDClose:0".parse::<Action>(), Ok(Action::FdClose(0)));
        assert_eq!("CMTAPSSRewind:0".parse::<Action>(), Ok(Action::CmtApssRewind(0)));
        assert_eq!("Reset".parse::<Action>(), Ok(Action::Reset));
        assert_eq!("NMI:".parse::<Action>(), Ok(Action::Nmi));
        assert_eq!(
            "FDClose".parse::<Action>(),
            Err(ActionError::MissingParameter("FDClose".into()))
        );
        assert_eq!(
            "FDClose:-1".parse::<Action>(),
            Err(ActionError::BadParameter("FDClose:-1".into()))
        );
        assert_eq!(
            "Launch:1".parse::<Action>(),
            Err(ActionError::Unknown("Launch".into()))
        );
    }

    #[test]
    fn test_frame_interval() {
        assert_eq!(FrameInterval::from_rate(60.0), FrameInterval::Ticks(17067));
        assert_eq!(FrameInterval::from_rate(50.0), FrameInterval::Ticks(20480));
        assert_eq!(FrameInterval::from_rate(0.0), FrameInterval::NoMachine);
        let emu = Emulator::new(None, Box::new(MemoryConfig::default()));
        assert_eq!(emu.frame_interval(), FrameInterval::NoMachine);
        assert_eq!(emu.frame_rate(), 0);
    }

    #[test]
    fn test_no_machine_actions_fail() {
        let mut emu = Emulator::new(None, Box::new(MemoryConfig::default()));
        assert_eq!(emu.run_action("Reset"), Err(ActionError::NoMachine));
        // settings still work
        assert!(emu.set_bool("full_speed", true));
        assert!(!emu.should_skip());
    }

    #[test]
    fn test_floppy_path_inserts() {
        let (mut emu, calls) = emulator(Settings::default());
        assert!(emu.set_string("current_floppy_disk_path[1]", "/disks/game.d88"));
        assert_eq!(emu.get_string("current_floppy_disk_path[1]"), "/disks/game.d88");
        assert_eq!(*calls.borrow(), vec!["open_floppy 1 /disks/game.d88"]);
    }

    #[test]
    fn test_record_tape_path() {
        let (mut emu, calls) = emulator(Settings::default());
        assert!(emu.set_string("record_tape_path[0]", "/tapes/new.cas"));
        assert_eq!(emu.get_string("current_tape_path[0]"), "/tapes/new.cas");
        assert_eq!(*calls.borrow(), vec!["rec_tape 0 /tapes/new.cas"]);
    }

    #[test]
    fn test_pulse_reset_reopens_inserted() {
        let mut settings = Settings::default();
        settings.current_floppy_disk_path[0] = "/disks/a.d88".into();
        settings.current_floppy_disk_path[2] = "/disks/c.d88".into();
        let (mut emu, calls) = emulator(settings);
        emu.insert_configured_media();
        calls.borrow_mut().clear();

        emu.pulse_reset();
        assert_eq!(
            *calls.borrow(),
            vec![
                "reset",
                "close_floppy 0",
                "close_floppy 2",
                "open_floppy 0 /disks/a.d88",
                "open_floppy 2 /disks/c.d88",
            ]
        );
    }

    #[test]
    fn test_save_tape_changes() -> Result<(), ActionError> {
        let mut settings = Settings::default();
        settings.current_tape_path[0] = "/tapes/a.cas".into();
        let (mut emu, calls) = emulator(settings);
        emu.insert_configured_media();
        calls.borrow_mut().clear();

        emu.run_action("SaveTapeChanges")?;
        assert_eq!(
            *calls.borrow(),
            vec!["close_tape 0", "play_tape 0 /tapes/a.cas", "push_stop 0"]
        );
        Ok(())
    }

    #[test]
    fn test_eject_forgets_path() -> Result<(), ActionError> {
        let mut settings = Settings::default();
        settings.current_floppy_disk_path[0] = "/disks/a.d88".into();
        settings.current_floppy_disk_path[1] = "/disks/b.d88".into();
        settings.current_tape_path[0] = "/tapes/a.cas".into();
        let (mut emu, calls) = emulator(settings);
        emu.insert_configured_media();
        calls.borrow_mut().clear();

        emu.run_action("FDClose:0")?;
        emu.run_action("CMTEject:0")?;
        assert_eq!(emu.get_string("current_floppy_disk_path[0]"), "");
        assert_eq!(emu.get_string("current_tape_path[0]"), "");
        assert_eq!(emu.get_string("current_floppy_disk_path[1]"), "/disks/b.d88");
        assert_eq!(*calls.borrow(), vec!["close_floppy 0", "close_tape 0"]);

        // a restart only brings back what is still inserted
        calls.borrow_mut().clear();
        emu.insert_configured_media();
        assert_eq!(*calls.borrow(), vec!["open_floppy 1 /disks/b.d88"]);
        Ok(())
    }

    #[test]
    fn test_drive_out_of_range() {
        let (mut emu, calls) = emulator(Settings::default());
        assert_eq!(
            emu.run_action("FDClose:4"),
            Err(ActionError::BadParameter("FDClose:4".into()))
        );
        assert_eq!(
            emu.run_action("CMTPlay:1"),
            Err(ActionError::BadParameter("CMTPlay:1".into()))
        );
        assert!(matches!(
            emu.perform(Action::CmtEject(TAPE_DECKS)),
            Err(ActionError::BadParameter(_))
        ));
        assert!(matches!(
            emu.perform(Action::FdCreate(FLOPPY_DRIVES)),
            Err(ActionError::BadParameter(_))
        ));
        assert!(calls.borrow().is_empty());
        assert_eq!(emu.run_action("FDClose:3"), Ok(Action::FdClose(3)));
    }

    #[test]
    fn test_skip_decision() {
        let (machine, _calls) = RecordingMachine::new();
        let mut settings = Settings::default();
        settings.full_speed = true;
        let mut emu = Emulator::new(Some(Box::new(machine)), Box::new(MemoryConfig::new(settings)));
        assert!(emu.should_skip());

        let (mut machine, _calls) = RecordingMachine::new();
        machine.skippable = true;
        machine.recording = true;
        emu = Emulator::new(Some(Box::new(machine)), Box::new(MemoryConfig::default()));
        assert!(!emu.should_skip());
    }

    #[test]
    fn test_geometry_request_is_one_shot() {
        let (mut emu, _calls) = emulator(Settings::default());
        emu.request_geometry_update();
        assert!(emu.take_geometry_update());
        assert!(!emu.take_geometry_update());
    }
}
