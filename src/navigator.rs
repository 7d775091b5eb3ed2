/// # navigator
///
/// The menu's state machine. Keys arrive here only while the menu is up;
/// they move the highlight, walk into submenus, flip settings, run actions
/// and drive the file browser.
///
/// Invariant: once a key has been handled the highlight is never on a
/// separator, as long as the current level has anything else to land on.
use crate::browser::{FileBrowser, Filesystem, Selection};
use crate::emulator::{Action, Emulator};
use crate::input::{VK_DOWN, VK_ENTER, VK_ESCAPE, VK_F12, VK_LEFT, VK_RIGHT, VK_UP};
use crate::menu::{ItemHandle, ItemKind, MenuTree, MAX_MENU_DEPTH};
use crate::overlay::{self, DrawOp, Geometry};
use heapless::Vec as HVec;
use log::{debug, info, warn};

/// ms a key must be held before it starts repeating
pub const KEY_REPEAT_DELAY_MS: u64 = 500;
/// ms between repeats after that
pub const KEY_REPEAT_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Hidden,
    MenuVisible,
    BrowserVisible,
}

/// only the last key pressed repeats
#[derive(Debug, Default)]
struct KeyRepeat {
    key: Option<u8>,
    since_ms: u64,
    repeating: bool,
}

impl KeyRepeat {
    fn press(&mut self, key: u8, now_ms: u64) {
        self.key = Some(key);
        self.since_ms = now_ms;
        self.repeating = false;
    }

    fn release(&mut self, key: u8) {
        if self.key == Some(key) {
            self.key = None;
        }
    }

    /// the key to fire again at `now_ms`, if one is due
    fn due(&mut self, now_ms: u64) -> Option<u8> {
        let key = self.key?;
        let wait = if self.repeating {
            KEY_REPEAT_INTERVAL_MS
        } else {
            KEY_REPEAT_DELAY_MS
        };
        if now_ms.saturating_sub(self.since_ms) > wait {
            self.repeating = true;
            self.since_ms = now_ms;
            Some(key)
        } else {
            None
        }
    }
}

pub struct Navigator {
    tree: MenuTree,
    device: String,
    visible: bool,
    /// submenus entered, outermost first
    breadcrumb: HVec<ItemHandle, MAX_MENU_DEPTH>,
    /// highlighted row among the current level's children
    selected: usize,
    browser: FileBrowser,
    repeat: KeyRepeat,
}

impl Navigator {
    pub fn new(tree: MenuTree, device: &str) -> Self {
        Navigator {
            tree,
            device: device.to_string(),
            visible: false,
            breadcrumb: HVec::new(),
            selected: 0,
            browser: FileBrowser::new(),
            repeat: KeyRepeat::default(),
        }
    }

    pub fn tree(&self) -> &MenuTree {
        &self.tree
    }

    pub fn browser(&self) -> &FileBrowser {
        &self.browser
    }

    pub fn mode(&self) -> Mode {
        match (self.visible, self.browser.is_active()) {
            (false, _) => Mode::Hidden,
            (true, false) => Mode::MenuVisible,
            (true, true) => Mode::BrowserVisible,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn depth(&self) -> usize {
        self.breadcrumb.len()
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    fn current_parent(&self) -> Option<ItemHandle> {
        self.breadcrumb.last().copied()
    }

    fn level_len(&self) -> usize {
        self.tree.child_count(self.current_parent())
    }

    fn item_at(&self, row: usize) -> Option<ItemHandle> {
        self.tree.child_at(self.current_parent(), row)
    }

    fn is_separator(&self, row: usize) -> bool {
        self.item_at(row)
            .and_then(|h| self.tree.get(h))
            .map(|item| item.kind == ItemKind::Separator)
            .unwrap_or(false)
    }

    pub fn selected_item(&self) -> Option<ItemHandle> {
        self.item_at(self.selected)
    }

    /// open or close the menu
    pub fn toggle(&mut self, emu: &mut Emulator) {
        if self.visible {
            self.browser.close();
            self.visible = false;
            emu.apply_config();
            info!("menu closed");
        } else {
            emu.reload_config();
            self.visible = true;
            self.breadcrumb.clear();
            self.selected = 0;
            self.adjust_cursor();
            self.repeat = KeyRepeat::default();
            info!("menu opened");
        }
    }

    /// if the highlight sits on a separator, find the nearest other row:
    /// downwards first, then upwards
    fn adjust_cursor(&mut self) {
        let len = self.level_len();
        if len == 0 {
            self.selected = 0;
            return;
        }
        if self.selected >= len {
            self.selected = len - 1;
        }
        if !self.is_separator(self.selected) {
            return;
        }
        let below = (self.selected + 1..len).find(|&row| !self.is_separator(row));
        let above = (0..self.selected).rev().find(|&row| !self.is_separator(row));
        if let Some(row) = below.or(above) {
            self.selected = row;
        }
    }

    /// step once, carry on past separators, and stay put if that runs out
    fn step(&mut self, down: bool) {
        let len = self.level_len();
        let start = self.selected;
        let mut row = start;
        loop {
            let next = if down {
                if row + 1 >= len {
                    break;
                }
                row + 1
            } else {
                if row == 0 {
                    break;
                }
                row - 1
            };
            row = next;
            if !self.is_separator(row) {
                self.selected = row;
                return;
            }
        }
        self.selected = start;
        self.adjust_cursor();
    }

    pub fn process_key(
        &mut self,
        emu: &mut Emulator,
        fs: &dyn Filesystem,
        code: u8,
        down: bool,
        now_ms: u64,
    ) {
        if !self.visible {
            return;
        }
        if down {
            self.repeat.press(code, now_ms);
            self.dispatch(emu, fs, code);
        } else {
            self.repeat.release(code);
        }
    }

    /// fire key repeat; call once per tick while the menu is up
    pub fn update(&mut self, emu: &mut Emulator, fs: &dyn Filesystem, now_ms: u64) {
        if !self.visible {
            return;
        }
        if let Some(code) = self.repeat.due(now_ms) {
            self.dispatch(emu, fs, code);
        }
    }

    fn dispatch(&mut self, emu: &mut Emulator, fs: &dyn Filesystem, code: u8) {
        if self.browser.is_active() {
            self.browser_key(emu, fs, code);
        } else {
            self.menu_key(emu, fs, code);
        }
    }

    fn menu_key(&mut self, emu: &mut Emulator, fs: &dyn Filesystem, code: u8) {
        match code {
            VK_UP => self.step(false),
            VK_DOWN => self.step(true),
            VK_ENTER => self.enter(emu, fs),
            VK_ESCAPE => {
                // the top level stays open; only F12 closes the menu
                if self.breadcrumb.pop().is_some() {
                    self.selected = 0;
                    self.adjust_cursor();
                }
            }
            VK_F12 => self.toggle(emu),
            _ => (),
        }
    }

    fn browser_key(&mut self, emu: &mut Emulator, fs: &dyn Filesystem, code: u8) {
        match code {
            VK_UP => self.browser.move_up(fs),
            VK_DOWN => self.browser.move_down(fs),
            VK_LEFT => self.browser.page_up(fs),
            VK_RIGHT => self.browser.page_down(fs),
            VK_ENTER => match self.browser.select_current(fs) {
                Selection::Chosen { target, path } => self.bind_file(emu, target, &path),
                Selection::Entered(dir) => debug!("browser in {}", dir),
                Selection::Rejected => debug!("browser refused to move"),
                Selection::Invalid => (),
            },
            VK_ESCAPE => self.browser.close(),
            VK_F12 => self.toggle(emu),
            _ => (),
        }
    }

    fn bind_file(&mut self, emu: &mut Emulator, target: ItemHandle, path: &str) {
        let key = match self.tree.get(target) {
            Some(item) => item.payload().to_string(),
            None => {
                warn!("file chosen for missing menu item {}", target);
                return;
            }
        };
        info!("{} = {}", key, path);
        if !emu.set_string(&key, path) {
            warn!("{} is not a path setting", key);
        }
    }

    fn enter(&mut self, emu: &mut Emulator, fs: &dyn Filesystem) {
        let handle = match self.selected_item() {
            Some(handle) => handle,
            None => return,
        };
        let item = match self.tree.get(handle) {
            Some(item) => item.clone(),
            None => {
                warn!("menu item {} out of range ({} items)", handle, self.tree.len());
                return;
            }
        };
        let key = item.payload();
        match item.kind {
            ItemKind::Submenu => {
                if self.breadcrumb.push(handle).is_ok() {
                    self.selected = 0;
                    self.adjust_cursor();
                } else {
                    debug!("menu nesting deeper than {}", MAX_MENU_DEPTH);
                }
            }
            ItemKind::Bool => {
                let value = emu.get_bool(key);
                emu.set_bool(key, !value);
            }
            ItemKind::IntSelect => {
                if let Some(choice) = emu.int_select(key) {
                    emu.set_int(key, choice.candidate);
                }
                if key.starts_with("display_stretch") {
                    emu.request_geometry_update();
                }
            }
            ItemKind::File => {
                let root = if item.path.contains("CMT") { "/tapes" } else { "/disks" };
                if !self.browser.open(fs, root, handle) && !self.browser.open(fs, "/", handle) {
                    warn!("nothing to browse for {}", item.label);
                }
            }
            ItemKind::Action => match emu.run_action(key) {
                Ok(Action::Reset) => self.toggle(emu),
                Ok(_) => (),
                Err(e) => warn!("{}", e),
            },
            ItemKind::Int | ItemKind::Separator => (),
        }
    }

    /// browser pages follow the display height
    pub fn set_files_per_page(&mut self, n: usize) {
        self.browser.set_files_per_page(n);
    }

    /// load whatever the next overlay needs from storage
    pub fn prepare_overlay(&mut self, fs: &dyn Filesystem) {
        if self.browser.is_active() {
            self.browser.prepare_page(fs);
        }
    }

    pub fn overlay(&self, emu: &Emulator, geo: Geometry) -> Vec<DrawOp> {
        match self.mode() {
            Mode::Hidden => Vec::new(),
            Mode::MenuVisible => {
                overlay::menu(&self.tree, &self.breadcrumb, self.selected, emu, &self.device, geo)
            }
            Mode::BrowserVisible => overlay::browser(&self.browser, &self.tree, geo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::memfs::MemFs;
    use crate::config::{MemoryConfig, Settings};
    use crate::machine::recording::{CallLog, RecordingMachine};

    const MENU: &str = r#"
"", separator
"Drive/FD0/Insert", file, "current_floppy_disk_path[0]"
"Drive/FD0/Eject", action, "FDClose:0"
"Drive/", separator
"Drive/Timing", bool, "correct_disk_timing[0]"
"CMT/Play", file, "current_tape_path[0]"
"Screen/Stretch 1", int_select, "display_stretch[1]"
"Screen/Stretch 2", int_select, "display_stretch[2]"
"FDD noise", bool, "sound_noise_fdd"
"", separator
"", separator
"Reset", action, "Reset"
"Launch", action, "Launch:1"
"", separator
"#;

    fn setup() -> (Navigator, Emulator, CallLog) {
        let (machine, calls) = RecordingMachine::new();
        let emu = Emulator::new(Some(Box::new(machine)), Box::new(MemoryConfig::default()));
        (Navigator::new(MenuTree::parse(MENU), "EMU"), emu, calls)
    }

    fn press(nav: &mut Navigator, emu: &mut Emulator, fs: &MemFs, code: u8) {
        nav.process_key(emu, fs, code, true, 0);
        nav.process_key(emu, fs, code, false, 0);
    }

    fn label(nav: &Navigator) -> String {
        let h = nav.selected_item().unwrap();
        nav.tree().get(h).unwrap().label.to_string()
    }

    #[test]
    fn test_open_skips_leading_separator() {
        let (mut nav, mut emu, _) = setup();
        assert_eq!(nav.mode(), Mode::Hidden);
        nav.toggle(&mut emu);
        assert_eq!(nav.mode(), Mode::MenuVisible);
        assert_eq!(nav.selected(), 1);
        assert_eq!(label(&nav), "Drive");
    }

    #[test]
    fn test_separator_never_highlighted() {
        let (mut nav, mut emu, _) = setup();
        let fs = MemFs::new();
        nav.toggle(&mut emu);
        // a fixed but irregular walk over the top level
        let walk = [
            VK_DOWN, VK_DOWN, VK_DOWN, VK_DOWN, VK_DOWN, VK_DOWN, VK_DOWN, VK_UP, VK_UP, VK_DOWN,
            VK_UP, VK_UP, VK_UP, VK_UP, VK_UP, VK_UP, VK_UP, VK_DOWN, VK_DOWN, VK_DOWN, VK_DOWN,
        ];
        for code in walk {
            press(&mut nav, &mut emu, &fs, code);
            let h = nav.selected_item().unwrap();
            assert_ne!(nav.tree().get(h).unwrap().kind, ItemKind::Separator);
        }
    }

    #[test]
    fn test_step_never_lands_on_separator() {
        let tree = MenuTree::parse(
            "\"\", separator\n\
             \"\", separator\n\
             \"A\", bool, \"full_speed\"\n\
             \"\", separator\n\
             \"\", separator\n\
             \"B\", bool, \"sound_noise_fdd\"\n\
             \"C\", bool, \"sound_noise_cmt\"\n\
             \"\", separator\n\
             \"Blank/line\", separator\n\
             \"Blank/\", separator\n\
             \"\", separator\n",
        );
        let mut nav = Navigator::new(tree, "EMU");
        let len = nav.level_len();
        assert_eq!(len, 10);
        for start in 0..len {
            for &down in &[true, false] {
                nav.selected = start;
                for n in 0..len {
                    nav.step(down);
                    assert!(
                        !nav.is_separator(nav.selected),
                        "row {} after {} steps {} from {}",
                        nav.selected,
                        n + 1,
                        if down { "down" } else { "up" },
                        start
                    );
                }
            }
        }

        // a level with nothing but separators has nowhere to go
        let blank = nav.item_at(8).unwrap();
        assert!(nav.breadcrumb.push(blank).is_ok());
        assert_eq!(nav.level_len(), 2);
        for start in 0..2 {
            for &down in &[true, false] {
                nav.selected = start;
                nav.step(down);
                assert!(nav.selected < 2);
            }
        }
    }

    #[test]
    fn test_down_over_double_separator() {
        let (mut nav, mut emu, _) = setup();
        let fs = MemFs::new();
        nav.toggle(&mut emu);
        for _ in 0..3 {
            press(&mut nav, &mut emu, &fs, VK_DOWN);
        }
        assert_eq!(label(&nav), "FDD noise");
        press(&mut nav, &mut emu, &fs, VK_DOWN);
        assert_eq!(label(&nav), "Reset");
        press(&mut nav, &mut emu, &fs, VK_DOWN);
        assert_eq!(label(&nav), "Launch");
        // trailing separator: stay on the last real item
        press(&mut nav, &mut emu, &fs, VK_DOWN);
        assert_eq!(label(&nav), "Launch");
    }

    #[test]
    fn test_up_at_top_stays() {
        let (mut nav, mut emu, _) = setup();
        let fs = MemFs::new();
        nav.toggle(&mut emu);
        press(&mut nav, &mut emu, &fs, VK_UP);
        assert_eq!(label(&nav), "Drive");
    }

    #[test]
    fn test_submenu_and_escape() {
        let (mut nav, mut emu, _) = setup();
        let fs = MemFs::new();
        nav.toggle(&mut emu);
        press(&mut nav, &mut emu, &fs, VK_ENTER);
        assert_eq!(nav.depth(), 1);
        assert_eq!(label(&nav), "FD0");
        press(&mut nav, &mut emu, &fs, VK_ENTER);
        assert_eq!(nav.depth(), 2);
        assert_eq!(label(&nav), "Insert");

        press(&mut nav, &mut emu, &fs, VK_ESCAPE);
        press(&mut nav, &mut emu, &fs, VK_ESCAPE);
        assert_eq!(nav.depth(), 0);
        assert_eq!(label(&nav), "Drive");
        // escape at the top level does not close
        press(&mut nav, &mut emu, &fs, VK_ESCAPE);
        assert_eq!(nav.mode(), Mode::MenuVisible);
    }

    #[test]
    fn test_bool_toggles_twice() {
        let (mut nav, mut emu, _) = setup();
        let fs = MemFs::new();
        nav.toggle(&mut emu);
        for _ in 0..3 {
            press(&mut nav, &mut emu, &fs, VK_DOWN);
        }
        assert_eq!(label(&nav), "FDD noise");
        assert!(!emu.get_bool("sound_noise_fdd"));
        press(&mut nav, &mut emu, &fs, VK_ENTER);
        assert!(emu.get_bool("sound_noise_fdd"));
        press(&mut nav, &mut emu, &fs, VK_ENTER);
        assert!(!emu.get_bool("sound_noise_fdd"));
    }

    #[test]
    fn test_int_select_commits_candidate() {
        let (mut nav, mut emu, _) = setup();
        let fs = MemFs::new();
        nav.toggle(&mut emu);
        for _ in 0..2 {
            press(&mut nav, &mut emu, &fs, VK_DOWN);
        }
        assert_eq!(label(&nav), "Screen");
        press(&mut nav, &mut emu, &fs, VK_ENTER);
        press(&mut nav, &mut emu, &fs, VK_DOWN);
        press(&mut nav, &mut emu, &fs, VK_ENTER);
        assert_eq!(emu.get_int("display_stretch"), 2);
        assert!(emu.take_geometry_update());
        // selecting it again is a commit, not a cycle
        press(&mut nav, &mut emu, &fs, VK_ENTER);
        assert_eq!(emu.get_int("display_stretch"), 2);
    }

    #[test]
    fn test_insert_floppy_through_browser() {
        let (mut nav, mut emu, calls) = setup();
        let fs = MemFs::new().file("/disks/games/rpg.d88").file("/disks/boot.d88");
        nav.toggle(&mut emu);
        press(&mut nav, &mut emu, &fs, VK_ENTER); // Drive
        press(&mut nav, &mut emu, &fs, VK_ENTER); // FD0
        press(&mut nav, &mut emu, &fs, VK_ENTER); // Insert
        assert_eq!(nav.mode(), Mode::BrowserVisible);
        assert_eq!(nav.browser().root(), "/disks");

        press(&mut nav, &mut emu, &fs, VK_ENTER); // games
        assert_eq!(nav.browser().current_dir(), "/disks/games");
        press(&mut nav, &mut emu, &fs, VK_DOWN);
        press(&mut nav, &mut emu, &fs, VK_ENTER); // rpg.d88
        assert_eq!(nav.mode(), Mode::MenuVisible);
        assert_eq!(emu.get_string("current_floppy_disk_path[0]"), "/disks/games/rpg.d88");
        assert!(calls.borrow().contains(&"open_floppy 0 /disks/games/rpg.d88".to_string()));
    }

    #[test]
    fn test_tape_browser_falls_back_to_root() {
        let (mut nav, mut emu, _) = setup();
        let fs = MemFs::new().file("/song.cas");
        nav.toggle(&mut emu);
        press(&mut nav, &mut emu, &fs, VK_DOWN);
        assert_eq!(label(&nav), "CMT");
        press(&mut nav, &mut emu, &fs, VK_ENTER);
        press(&mut nav, &mut emu, &fs, VK_ENTER);
        assert_eq!(nav.mode(), Mode::BrowserVisible);
        assert_eq!(nav.browser().root(), "/");

        // escape leaves the browser without writing anything
        press(&mut nav, &mut emu, &fs, VK_ESCAPE);
        assert_eq!(nav.mode(), Mode::MenuVisible);
        assert_eq!(emu.get_string("current_tape_path[0]"), "");
    }

    #[test]
    fn test_reset_action_closes_menu() {
        let (mut nav, mut emu, calls) = setup();
        let fs = MemFs::new();
        nav.toggle(&mut emu);
        for _ in 0..4 {
            press(&mut nav, &mut emu, &fs, VK_DOWN);
        }
        assert_eq!(label(&nav), "Reset");
        press(&mut nav, &mut emu, &fs, VK_ENTER);
        assert_eq!(nav.mode(), Mode::Hidden);
        assert_eq!(*calls.borrow(), vec!["reset", "update_config"]);
    }

    #[test]
    fn test_unknown_action_is_ignored() {
        let (mut nav, mut emu, calls) = setup();
        let fs = MemFs::new();
        nav.toggle(&mut emu);
        for _ in 0..5 {
            press(&mut nav, &mut emu, &fs, VK_DOWN);
        }
        assert_eq!(label(&nav), "Launch");
        press(&mut nav, &mut emu, &fs, VK_ENTER);
        assert_eq!(nav.mode(), Mode::MenuVisible);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_f12_closes_from_browser() {
        let (mut nav, mut emu, calls) = setup();
        let fs = MemFs::new().dir("/disks");
        nav.toggle(&mut emu);
        press(&mut nav, &mut emu, &fs, VK_ENTER);
        press(&mut nav, &mut emu, &fs, VK_ENTER);
        press(&mut nav, &mut emu, &fs, VK_ENTER);
        assert_eq!(nav.mode(), Mode::BrowserVisible);
        press(&mut nav, &mut emu, &fs, VK_F12);
        assert_eq!(nav.mode(), Mode::Hidden);
        assert_eq!(*calls.borrow(), vec!["update_config"]);
        // reopening starts at the top again
        nav.toggle(&mut emu);
        assert_eq!(nav.depth(), 0);
        assert_eq!(nav.mode(), Mode::MenuVisible);
    }

    #[test]
    fn test_key_repeat() {
        let (mut nav, mut emu, _) = setup();
        let fs = MemFs::new();
        nav.toggle(&mut emu);
        nav.process_key(&mut emu, &fs, VK_DOWN, true, 1000);
        assert_eq!(label(&nav), "CMT");
        nav.update(&mut emu, &fs, 1400);
        assert_eq!(label(&nav), "CMT");
        nav.update(&mut emu, &fs, 1501);
        assert_eq!(label(&nav), "Screen");
        nav.update(&mut emu, &fs, 1560);
        assert_eq!(label(&nav), "Screen");
        nav.update(&mut emu, &fs, 1602);
        assert_eq!(label(&nav), "FDD noise");
        nav.process_key(&mut emu, &fs, VK_DOWN, false, 1610);
        nav.update(&mut emu, &fs, 2500);
        assert_eq!(label(&nav), "FDD noise");
    }

    #[test]
    fn test_empty_menu_opens_and_closes() {
        let (machine, _) = RecordingMachine::new();
        let mut emu = Emulator::new(Some(Box::new(machine)), Box::new(MemoryConfig::new(Settings::default())));
        let mut nav = Navigator::new(MenuTree::new(), "EMU");
        let fs = MemFs::new();
        nav.toggle(&mut emu);
        for code in [VK_DOWN, VK_UP, VK_ENTER, VK_ESCAPE] {
            press(&mut nav, &mut emu, &fs, code);
        }
        assert_eq!(nav.selected_item(), None);
        press(&mut nav, &mut emu, &fs, VK_F12);
        assert_eq!(nav.mode(), Mode::Hidden);
    }
}
