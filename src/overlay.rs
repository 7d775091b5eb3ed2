/// # overlay
///
/// the menu and file browser drawn as a list of positioned text runs and
/// rules on a character grid. the display decides what the roles look like;
/// all the layout decisions live here.
use crate::browser::FileBrowser;
use crate::emulator::Emulator;
use crate::menu::{ItemHandle, ItemKind, MenuTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Text,
    Selected,
    Header,
    /// placeholder values, e.g. an empty drive
    Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawOp {
    Text {
        x: u16,
        y: u16,
        text: String,
        role: Role,
    },
    HLine {
        x0: u16,
        x1: u16,
        y: u16,
        role: Role,
    },
}

/// size of the drawable area in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub cols: u16,
    pub rows: u16,
}

pub const ITEMS_TOP: u16 = 3;
const FOOTER_ROWS: u16 = 2;

pub const MENU_HELP: &str = "Use arrows to navigate, Enter to select, ESC to go back";
pub const BROWSER_HELP: &str = "Up/Down: item  Left/Right: page  Enter: select  ESC: back";
pub const NOT_INSERTED: &str = "< Not Inserted >";

impl Geometry {
    /// how many browser entries fit between the header and the footer
    pub fn files_per_page(&self) -> usize {
        self.rows.saturating_sub(ITEMS_TOP + FOOTER_ROWS).max(1) as usize
    }

    fn last_item_row(&self) -> u16 {
        self.rows.saturating_sub(FOOTER_ROWS)
    }

    fn centred(&self, text: &str) -> u16 {
        (self.cols / 2).saturating_sub(text.chars().count() as u16 / 2)
    }
}

/// clip to `width` characters, ending in "..." when anything was cut
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    if width <= 3 {
        return text.chars().take(width).collect();
    }
    let mut out: String = text.chars().take(width - 3).collect();
    out.push_str("...");
    out
}

fn text(x: u16, y: u16, s: impl Into<String>, role: Role) -> DrawOp {
    DrawOp::Text {
        x,
        y,
        text: s.into(),
        role,
    }
}

/// label of one menu row, with its value decoration
pub fn item_label(tree: &MenuTree, handle: ItemHandle, emu: &Emulator) -> String {
    let item = match tree.get(handle) {
        Some(item) => item,
        None => return String::new(),
    };
    match item.kind {
        ItemKind::Submenu => format!("{} >", item.label),
        ItemKind::Bool => {
            let on = emu.get_bool(item.payload());
            format!("{}: {}", item.label, if on { "ON" } else { "OFF" })
        }
        ItemKind::IntSelect => {
            let selected = emu
                .int_select(item.payload())
                .map(|q| q.selected)
                .unwrap_or(false);
            format!("{}{}", if selected { "[X] " } else { "[ ] " }, item.label)
        }
        ItemKind::Int => format!("{}: {}", item.label, emu.get_int(item.payload())),
        ItemKind::Separator => String::new(),
        ItemKind::File | ItemKind::Action => item.label.to_string(),
    }
}

/// screen rows one menu item takes; file items show their path underneath
fn rows_used(tree: &MenuTree, handle: ItemHandle) -> u16 {
    match tree.get(handle).map(|item| item.kind) {
        Some(ItemKind::File) => 2,
        _ => 1,
    }
}

/// first row to draw so that everything from there down to `selected` fits
/// in `space` screen rows
fn first_visible(tree: &MenuTree, items: &[ItemHandle], selected: usize, space: u16) -> usize {
    let selected = selected.min(items.len().saturating_sub(1));
    let mut used: u16 = items
        .iter()
        .take(selected + 1)
        .map(|&h| rows_used(tree, h))
        .sum();
    let mut first = 0;
    while first < selected && used > space {
        used -= rows_used(tree, items[first]);
        first += 1;
    }
    first
}

pub fn menu(
    tree: &MenuTree,
    breadcrumb: &[ItemHandle],
    selected: usize,
    emu: &Emulator,
    device: &str,
    geo: Geometry,
) -> Vec<DrawOp> {
    let mut ops = Vec::new();
    let header = format!("{} Settings - F12 to close", device);
    ops.push(text(geo.centred(&header), 0, header, Role::Header));

    if !breadcrumb.is_empty() {
        let trail: Vec<&str> = breadcrumb
            .iter()
            .filter_map(|&h| tree.get(h))
            .map(|item| item.label.as_str())
            .collect();
        let trail = truncate(&trail.join(" > "), geo.cols.saturating_sub(2) as usize);
        ops.push(text(1, 1, trail, Role::Text));
    }

    let items: Vec<ItemHandle> = tree.children(breadcrumb.last().copied()).collect();
    let space = geo.last_item_row().saturating_sub(ITEMS_TOP);
    let first = first_visible(tree, &items, selected, space);

    let mut y = ITEMS_TOP;
    for (row, &handle) in items.iter().enumerate().skip(first) {
        if y >= geo.last_item_row() {
            break;
        }
        let item = match tree.get(handle) {
            Some(item) => item,
            None => continue,
        };
        if item.kind == ItemKind::Separator {
            ops.push(DrawOp::HLine {
                x0: 1,
                x1: geo.cols.saturating_sub(2),
                y,
                role: Role::Text,
            });
            y += 1;
            continue;
        }

        let role = if row == selected { Role::Selected } else { Role::Text };
        let label = truncate(&item_label(tree, handle, emu), geo.cols.saturating_sub(3) as usize);
        ops.push(text(2, y, label, role));
        y += 1;

        if item.kind == ItemKind::File {
            let width = geo.cols.saturating_sub(6) as usize;
            let bound = emu.get_string(item.payload());
            if bound.is_empty() {
                ops.push(text(4, y, NOT_INSERTED, Role::Value));
            } else {
                ops.push(text(4, y, truncate(bound, width), Role::Text));
            }
            y += 1;
        }
    }

    let footer_y = geo.rows.saturating_sub(1);
    ops.push(text(geo.centred(MENU_HELP), footer_y, MENU_HELP, Role::Text));
    ops
}

pub fn browser(b: &FileBrowser, tree: &MenuTree, geo: Geometry) -> Vec<DrawOp> {
    let mut ops = Vec::new();
    let header = match b.target().and_then(|t| tree.get(t)) {
        Some(item) => format!("file select - {}", item.label),
        None => "file select".to_string(),
    };
    ops.push(text(1, 0, header, Role::Header));

    let page_info = format!(
        "page: {}/{} ({} items)",
        b.page() + 1,
        b.page_count(),
        b.total_entries()
    );
    let info_x = geo.cols.saturating_sub(page_info.len() as u16 + 1);
    let dir_width = info_x.saturating_sub(2) as usize;
    ops.push(text(1, 1, truncate(b.current_dir(), dir_width), Role::Text));
    ops.push(text(info_x, 1, page_info, Role::Text));

    let width = geo.cols.saturating_sub(3) as usize;
    let first = b.page() * b.files_per_page();
    for (index, entry) in b.page_entries() {
        let y = ITEMS_TOP + (index - first) as u16;
        if y >= geo.last_item_row() {
            break;
        }
        let label = if entry.is_dir {
            format!("[DIR] {}", entry.name)
        } else {
            entry.name.to_string()
        };
        let role = if index == b.selected() { Role::Selected } else { Role::Text };
        ops.push(text(2, y, truncate(&label, width), role));
    }

    let footer_y = geo.rows.saturating_sub(1);
    ops.push(text(1, footer_y, BROWSER_HELP, Role::Text));
    ops
}
