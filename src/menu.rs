/// # menu
///
/// The menu is declared in a text file, one item per line:
///
///   "Drive/FD0/Insert", file, "current_floppy_disk_path[0]"
///   "Drive/FD0/Eject", action, "FDClose:0"
///   "", separator
///   "Drive/", separator
///
/// every path segment but the last names a submenu (shared between lines by
/// its full path); the last segment is the leaf. Items live in a fixed arena
/// and refer to each other by index, never by pointer.
use heapless::String as HString;
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::Path;

/// arena capacity; lines past this are ignored
pub const MAX_MENU_ITEMS: usize = 256;

/// deepest submenu nesting the navigator will follow
pub const MAX_MENU_DEPTH: usize = 8;

pub type Label = HString<64>;
pub type Name = HString<128>;

/// index of an item in the arena; stable for the lifetime of one tree
pub type ItemHandle = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Separator,
    Submenu,
    Bool,
    Int,
    IntSelect,
    File,
    Action,
}

impl ItemKind {
    fn from_token(token: &str) -> Option<ItemKind> {
        match token {
            "separator" => Some(ItemKind::Separator),
            "bool" => Some(ItemKind::Bool),
            "int" => Some(ItemKind::Int),
            "int_select" => Some(ItemKind::IntSelect),
            "file" => Some(ItemKind::File),
            "action" => Some(ItemKind::Action),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub label: Label,
    /// full declared path, used to find shared submenus
    pub path: Name,
    pub kind: ItemKind,
    /// config key for Bool/Int/IntSelect/File, action token for Action
    pub payload: Option<Name>,
    /// None for top-level items
    pub parent: Option<ItemHandle>,
    pub first_child: Option<ItemHandle>,
    pub child_count: usize,
    /// set when a duplicate submenu was folded into another one; the item
    /// stays in the arena but is no longer reachable
    pub merged_into: Option<ItemHandle>,
}

impl MenuItem {
    fn new(label: Label, path: Name, kind: ItemKind, parent: Option<ItemHandle>) -> Self {
        MenuItem {
            label,
            path,
            kind,
            payload: None,
            parent,
            first_child: None,
            child_count: 0,
            merged_into: None,
        }
    }

    pub fn payload(&self) -> &str {
        self.payload.as_ref().map(|p| p.as_str()).unwrap_or("")
    }
}

/// copy into a bounded string, refusing anything that does not fit whole
fn bounded<const N: usize>(s: &str) -> Option<HString<N>> {
    let mut out = HString::new();
    out.push_str(s).ok()?;
    Some(out)
}

/// one parsed definition line, before it is placed in the tree
struct Declaration<'a> {
    path: &'a str,
    kind: ItemKind,
    param: Option<&'a str>,
}

fn skip_separators(s: &str) -> &str {
    s.trim_start_matches(|c: char| c == ' ' || c == '\t' || c == ',')
}

/// `"<path>", <type>[, "<param>"]`; None for comments, blanks and junk
fn parse_line(line: &str) -> Option<Declaration<'_>> {
    let line = line.trim_start_matches([' ', '\t']);
    let rest = line.strip_prefix('"')?;
    let close = rest.find('"')?;
    let path = &rest[..close];

    let rest = skip_separators(&rest[close + 1..]);
    let token_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let kind = ItemKind::from_token(&rest[..token_len])?;

    let rest = skip_separators(&rest[token_len..]);
    let param = match rest.strip_prefix('"') {
        Some(quoted) => {
            let close = quoted.find('"')?;
            Some(&quoted[..close])
        }
        None => None,
    };
    Some(Declaration { path, kind, param })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MenuTree {
    items: Vec<MenuItem>,
}

impl MenuTree {
    pub fn new() -> Self {
        MenuTree {
            items: Vec::with_capacity(MAX_MENU_ITEMS),
        }
    }

    /// build a tree from definition text; bad lines are skipped
    pub fn parse(text: &str) -> Self {
        let mut tree = MenuTree::new();
        for line in text.lines() {
            if tree.is_full() {
                warn!("menu arena full ({} items), ignoring the rest", MAX_MENU_ITEMS);
                break;
            }
            let line = line.trim_end_matches(['\r', '\n']);
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match parse_line(line) {
                Some(decl) => tree.declare(&decl),
                None => debug!("skipping malformed menu line: {}", line),
            }
        }
        tree.merge_duplicate_submenus();
        tree
    }

    /// read and parse a definition file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, io::Error> {
        let text = fs::read_to_string(path.as_ref())?;
        let tree = MenuTree::parse(&text);
        debug!(
            "loaded menu {} ({} items)",
            path.as_ref().display(),
            tree.len()
        );
        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn is_full(&self) -> bool {
        self.items.len() >= MAX_MENU_ITEMS
    }

    pub fn get(&self, handle: ItemHandle) -> Option<&MenuItem> {
        self.items.get(handle)
    }

    /// reachable children of `parent` (None = top level), in declaration order
    pub fn children(&self, parent: Option<ItemHandle>) -> impl Iterator<Item = ItemHandle> + '_ {
        self.items
            .iter()
            .enumerate()
            .filter(move |(_, item)| item.parent == parent && item.merged_into.is_none())
            .map(|(handle, _)| handle)
    }

    pub fn child_at(&self, parent: Option<ItemHandle>, index: usize) -> Option<ItemHandle> {
        self.children(parent).nth(index)
    }

    pub fn child_count(&self, parent: Option<ItemHandle>) -> usize {
        self.children(parent).count()
    }

    fn push(&mut self, item: MenuItem) -> Option<ItemHandle> {
        if self.is_full() {
            return None;
        }
        let handle = self.items.len();
        if let Some(parent) = item.parent {
            let p = &mut self.items[parent];
            if p.child_count == 0 {
                p.first_child = Some(handle);
            }
            p.child_count += 1;
        }
        self.items.push(item);
        Some(handle)
    }

    /// existing submenu with this full path, or a new one
    pub(crate) fn find_or_add_submenu(
        &mut self,
        path: &str,
        label: &str,
        parent: Option<ItemHandle>,
    ) -> Option<ItemHandle> {
        if let Some(handle) = self
            .items
            .iter()
            .position(|i| i.kind == ItemKind::Submenu && i.path.as_str() == path)
        {
            return Some(handle);
        }
        let item = MenuItem::new(bounded(label)?, bounded(path)?, ItemKind::Submenu, parent);
        self.push(item)
    }

    fn add_separator(&mut self, parent: Option<ItemHandle>) -> Option<ItemHandle> {
        let item = MenuItem::new(
            bounded("separator")?,
            bounded("separator")?,
            ItemKind::Separator,
            parent,
        );
        self.push(item)
    }

    fn declare(&mut self, decl: &Declaration<'_>) {
        if decl.kind == ItemKind::Separator {
            if decl.path.is_empty() {
                self.add_separator(None);
                return;
            }
            if let Some(submenu) = decl.path.strip_suffix('/') {
                // unknown submenu falls back to the top level
                let parent = self
                    .items
                    .iter()
                    .position(|i| i.kind == ItemKind::Submenu && i.path.as_str() == submenu);
                self.add_separator(parent);
                return;
            }
        }

        let mut parent = None;
        let mut segments = decl.path.split('/').peekable();
        let mut end = 0;
        while let Some(segment) = segments.next() {
            if segment.is_empty() {
                // "a//b" and trailing slashes stop the walk
                return;
            }
            end += if end == 0 { segment.len() } else { segment.len() + 1 };
            let path_so_far = &decl.path[..end];
            if segments.peek().is_some() {
                parent = match self.find_or_add_submenu(path_so_far, segment, parent) {
                    Some(handle) => Some(handle),
                    None => return,
                };
                continue;
            }

            let (label, path) = match (bounded(segment), bounded(decl.path)) {
                (Some(label), Some(path)) => (label, path),
                _ => {
                    debug!("menu path too long: {}", decl.path);
                    return;
                }
            };
            let mut item = MenuItem::new(label, path, decl.kind, parent);
            if decl.kind != ItemKind::Separator {
                item.payload = decl.param.and_then(bounded);
            }
            if let Some(handle) = self.push(item) {
                debug!(
                    "registered menu item {} {:?} {} ({})",
                    handle,
                    decl.kind,
                    decl.path,
                    decl.param.unwrap_or("")
                );
            }
        }
    }

    /// Fold sibling submenus that share a label into the first of them.
    ///
    /// This compares labels only, so two unrelated submenus that happen to be
    /// called the same thing under one parent end up merged.
    pub fn merge_duplicate_submenus(&mut self) {
        for keep in 0..self.items.len() {
            if self.items[keep].kind != ItemKind::Submenu || self.items[keep].merged_into.is_some() {
                continue;
            }
            for dup in (keep + 1)..self.items.len() {
                let same = {
                    let (a, b) = (&self.items[keep], &self.items[dup]);
                    b.kind == ItemKind::Submenu
                        && b.merged_into.is_none()
                        && a.parent == b.parent
                        && a.label == b.label
                };
                if same {
                    self.reparent_children(dup, keep);
                    self.items[dup].merged_into = Some(keep);
                    debug!("merged duplicate submenu {} into {}", dup, keep);
                }
            }
        }
    }

    fn reparent_children(&mut self, from: ItemHandle, to: ItemHandle) {
        let mut moved = 0;
        let mut first = None;
        for (handle, item) in self.items.iter_mut().enumerate() {
            if item.parent == Some(from) {
                item.parent = Some(to);
                moved += 1;
                first.get_or_insert(handle);
            }
        }
        let target = &mut self.items[to];
        target.child_count += moved;
        target.first_child = match (target.first_child, first) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let source = &mut self.items[from];
        source.child_count = 0;
        source.first_child = None;
    }
}
