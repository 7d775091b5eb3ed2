/// # config
///
/// persisted machine settings, addressed by name the same way the menu
/// definition addresses them: `sound_noise_fdd`, `ignore_disk_crc[1]`,
/// `monitor_type[2]` and so on. the bracket is an array slot for per-drive
/// keys and a candidate value for int-select keys.
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const FLOPPY_DRIVES: usize = 4;
pub const TAPE_DECKS: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub sound_noise_fdd: bool,
    pub sound_noise_cmt: bool,
    pub sound_tape_signal: bool,
    pub sound_tape_voice: bool,
    pub full_speed: bool,
    pub sound_frequency: i32,
    pub sound_latency: i32,
    pub monitor_type: i32,
    pub keyboard_type: i32,
    /// fullscreen stretch mode of the host window
    pub display_stretch: i32,
    pub correct_disk_timing: [bool; FLOPPY_DRIVES],
    pub ignore_disk_crc: [bool; FLOPPY_DRIVES],
    pub current_floppy_disk_path: [String; FLOPPY_DRIVES],
    pub wave_shaper: [bool; TAPE_DECKS],
    pub baud_high: [bool; TAPE_DECKS],
    pub current_tape_path: [String; TAPE_DECKS],
}

/// result of asking about one candidate of an int-select key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntSelect {
    pub candidate: i32,
    pub current: i32,
    pub selected: bool,
}

/// split `name[i]` into `("name", Some(i))`; a bad index reads as no index
pub fn split_key(name: &str) -> (&str, Option<usize>) {
    match name.find('[') {
        Some(open) => {
            let digits = name[open + 1..].trim_end_matches(']');
            (&name[..open], digits.parse().ok())
        }
        None => (name, None),
    }
}

impl Settings {
    fn bool_value(&self, name: &str) -> Option<bool> {
        match split_key(name) {
            ("sound_noise_fdd", None) => Some(self.sound_noise_fdd),
            ("sound_noise_cmt", None) => Some(self.sound_noise_cmt),
            ("sound_tape_signal", None) => Some(self.sound_tape_signal),
            ("sound_tape_voice", None) => Some(self.sound_tape_voice),
            ("full_speed", None) => Some(self.full_speed),
            ("correct_disk_timing", Some(i)) => self.correct_disk_timing.get(i).copied(),
            ("ignore_disk_crc", Some(i)) => self.ignore_disk_crc.get(i).copied(),
            ("wave_shaper", Some(i)) => self.wave_shaper.get(i).copied(),
            ("baud_high", Some(i)) => self.baud_high.get(i).copied(),
            _ => None,
        }
    }

    fn bool_slot(&mut self, name: &str) -> Option<&mut bool> {
        match split_key(name) {
            ("sound_noise_fdd", None) => Some(&mut self.sound_noise_fdd),
            ("sound_noise_cmt", None) => Some(&mut self.sound_noise_cmt),
            ("sound_tape_signal", None) => Some(&mut self.sound_tape_signal),
            ("sound_tape_voice", None) => Some(&mut self.sound_tape_voice),
            ("full_speed", None) => Some(&mut self.full_speed),
            ("correct_disk_timing", Some(i)) => self.correct_disk_timing.get_mut(i),
            ("ignore_disk_crc", Some(i)) => self.ignore_disk_crc.get_mut(i),
            ("wave_shaper", Some(i)) => self.wave_shaper.get_mut(i),
            ("baud_high", Some(i)) => self.baud_high.get_mut(i),
            _ => None,
        }
    }

    // int keys ignore the bracket; it is the int-select candidate
    fn int_value(&self, name: &str) -> Option<i32> {
        match split_key(name).0 {
            "sound_frequency" => Some(self.sound_frequency),
            "sound_latency" => Some(self.sound_latency),
            "monitor_type" => Some(self.monitor_type),
            "keyboard_type" => Some(self.keyboard_type),
            "display_stretch" => Some(self.display_stretch),
            _ => None,
        }
    }

    fn int_slot(&mut self, name: &str) -> Option<&mut i32> {
        match split_key(name).0 {
            "sound_frequency" => Some(&mut self.sound_frequency),
            "sound_latency" => Some(&mut self.sound_latency),
            "monitor_type" => Some(&mut self.monitor_type),
            "keyboard_type" => Some(&mut self.keyboard_type),
            "display_stretch" => Some(&mut self.display_stretch),
            _ => None,
        }
    }

    fn string_slot(&mut self, name: &str) -> Option<&mut String> {
        match split_key(name) {
            ("current_floppy_disk_path", Some(i)) => self.current_floppy_disk_path.get_mut(i),
            // a recording target is remembered as the deck's tape
            ("current_tape_path", Some(i)) | ("record_tape_path", Some(i)) => {
                self.current_tape_path.get_mut(i)
            }
            _ => None,
        }
    }

    /// unknown names read as false
    pub fn get_bool(&self, name: &str) -> bool {
        self.bool_value(name).unwrap_or(false)
    }

    /// returns false for names that are not settings
    pub fn set_bool(&mut self, name: &str, value: bool) -> bool {
        match self.bool_slot(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => {
                debug!("no bool setting called {}", name);
                false
            }
        }
    }

    pub fn get_int(&self, name: &str) -> i32 {
        if split_key(name).0 == "full_speed" {
            return self.full_speed as i32;
        }
        self.int_value(name).unwrap_or(0)
    }

    pub fn set_int(&mut self, name: &str, value: i32) -> bool {
        match self.int_slot(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => {
                debug!("no int setting called {}", name);
                false
            }
        }
    }

    /// unknown names read as an empty string
    pub fn get_string(&self, name: &str) -> &str {
        let (key, index) = split_key(name);
        let slot = match (key, index) {
            ("current_floppy_disk_path", Some(i)) => self.current_floppy_disk_path.get(i),
            ("current_tape_path", Some(i)) | ("record_tape_path", Some(i)) => {
                self.current_tape_path.get(i)
            }
            _ => None,
        };
        slot.map(|s| s.as_str()).unwrap_or("")
    }

    pub fn set_string(&mut self, name: &str, value: &str) -> bool {
        match self.string_slot(name) {
            Some(slot) => {
                *slot = value.to_string();
                true
            }
            None => {
                debug!("no string setting called {}", name);
                false
            }
        }
    }

    /// `monitor_type[2]` -> candidate 2, selected if the monitor type is 2
    pub fn int_select(&self, name: &str) -> Option<IntSelect> {
        let candidate = split_key(name).1? as i32;
        let current = self.int_value(name)?;
        Some(IntSelect {
            candidate,
            current,
            selected: candidate == current,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(toml::de::Error),
    Write(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "settings i/o failed: {}", e),
            ConfigError::Parse(e) => write!(f, "settings file is not valid: {}", e),
            ConfigError::Write(e) => write!(f, "settings could not be written: {}", e),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Write(e) => Some(e),
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(e: toml::ser::Error) -> Self {
        ConfigError::Write(e)
    }
}

/// Where settings live between runs. The menu and the main loop only see
/// `Settings`; a store decides how (and whether) they are persisted.
pub trait ConfigStore {
    fn settings(&self) -> &Settings;

    fn settings_mut(&mut self) -> &mut Settings;

    /// replace the in-memory settings with the persisted ones
    fn load(&mut self) -> Result<(), ConfigError>;

    /// persist the in-memory settings
    fn save(&self) -> Result<(), ConfigError>;
}

/// settings kept in a toml file
pub struct TomlConfig {
    path: PathBuf,
    settings: Settings,
}

impl TomlConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TomlConfig {
            path: path.into(),
            settings: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl ConfigStore for TomlConfig {
    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    fn load(&mut self) -> Result<(), ConfigError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("no settings at {}, using defaults", self.path.display());
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        self.settings = toml::from_str(&text)?;
        debug!("loaded settings from {}", self.path.display());
        Ok(())
    }

    // write beside the target then rename over it, so a crash mid-write
    // leaves the old file intact
    fn save(&self) -> Result<(), ConfigError> {
        let text = toml::to_string(&self.settings)?;
        let tmp = self.temp_path();
        fs::write(&tmp, text)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            warn!("could not replace {}: {}", self.path.display(), e);
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!("saved settings to {}", self.path.display());
        Ok(())
    }
}

/// settings that are never persisted; useful for testing and for running
/// without a settings file
#[derive(Default)]
pub struct MemoryConfig {
    settings: Settings,
}

impl MemoryConfig {
    pub fn new(settings: Settings) -> Self {
        MemoryConfig { settings }
    }
}

impl ConfigStore for MemoryConfig {
    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    fn load(&mut self) -> Result<(), ConfigError> {
        Ok(())
    }

    fn save(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_split_key() {
        assert_eq!(split_key("sound_noise_fdd"), ("sound_noise_fdd", None));
        assert_eq!(split_key("ignore_disk_crc[3]"), ("ignore_disk_crc", Some(3)));
        assert_eq!(split_key("monitor_type[x]"), ("monitor_type", None));
    }

    #[test]
    fn test_bool_toggle_round_trip() {
        let mut s = Settings::default();
        assert!(!s.get_bool("sound_noise_fdd"));
        s.set_bool("sound_noise_fdd", !s.get_bool("sound_noise_fdd"));
        assert!(s.get_bool("sound_noise_fdd"));
        s.set_bool("sound_noise_fdd", !s.get_bool("sound_noise_fdd"));
        assert!(!s.get_bool("sound_noise_fdd"));
    }

    #[test]
    fn test_indexed_bools() {
        let mut s = Settings::default();
        assert!(s.set_bool("ignore_disk_crc[2]", true));
        assert!(s.get_bool("ignore_disk_crc[2]"));
        assert!(!s.get_bool("ignore_disk_crc[1]"));
        // out of range and unknown are ignored
        assert!(!s.set_bool("ignore_disk_crc[9]", true));
        assert!(!s.set_bool("warp_drive", true));
        assert!(!s.get_bool("warp_drive"));
    }

    #[test]
    fn test_int_select() {
        let mut s = Settings::default();
        s.set_int("monitor_type", 2);
        let q = s.int_select("monitor_type[2]").unwrap();
        assert_eq!(q, IntSelect { candidate: 2, current: 2, selected: true });
        assert!(!s.int_select("monitor_type[1]").unwrap().selected);
        assert_eq!(s.int_select("monitor_type"), None);
        assert_eq!(s.int_select("warp_factor[1]"), None);

        // committing a candidate writes the base key
        assert!(s.set_int("monitor_type[1]", 1));
        assert_eq!(s.monitor_type, 1);
    }

    #[test]
    fn test_tape_path_alias() {
        let mut s = Settings::default();
        assert!(s.set_string("record_tape_path[0]", "/tapes/out.cas"));
        assert_eq!(s.get_string("current_tape_path[0]"), "/tapes/out.cas");
        assert_eq!(s.get_string("current_floppy_disk_path[7]"), "");
        assert!(!s.set_string("current_tape_path[1]", "/tapes/x.cas"));
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<(), ConfigError> {
        let s: Settings = toml::from_str("full_speed = true\nmonitor_type = 3\n")?;
        assert!(s.full_speed);
        assert_eq!(s.monitor_type, 3);
        assert_eq!(s.current_floppy_disk_path, Settings::default().current_floppy_disk_path);
        Ok(())
    }

    #[test]
    fn test_toml_save_and_load() -> Result<(), ConfigError> {
        let path = env::temp_dir().join(format!("emufront-settings-{}.toml", std::process::id()));
        let mut store = TomlConfig::new(&path);
        store.settings_mut().set_bool("baud_high[0]", true);
        store.settings_mut().set_string("current_floppy_disk_path[1]", "/disks/game.d88");
        store.save()?;

        let mut reloaded = TomlConfig::new(&path);
        reloaded.load()?;
        assert_eq!(reloaded.settings(), store.settings());
        assert!(!store.temp_path().exists());
        fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn test_missing_file_keeps_defaults() -> Result<(), ConfigError> {
        let mut store = TomlConfig::new(env::temp_dir().join("emufront-does-not-exist.toml"));
        store.load()?;
        assert_eq!(store.settings(), &Settings::default());
        Ok(())
    }
}
