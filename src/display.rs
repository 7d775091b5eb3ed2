use crate::machine::Frame;
use crate::overlay::{DrawOp, Geometry, Role};
use log::debug;
use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use tui::backend::CrosstermBackend;
use tui::layout::Rect;
use tui::style::{Color, Modifier, Style};
use tui::symbols::{line, Marker};
use tui::text::Span;
use tui::widgets::canvas::{Canvas, Points};
use tui::widgets::{Block, Borders, Clear, Paragraph};
use tui::Terminal;

/// Display is what the main loop draws on: either the machine's screen or
/// the menu overlay, never both. It should abstract the implementation
/// details, so a variety of kinds of screen would work.
pub trait Display {
    /// size of the drawable area in character cells
    fn geometry(&self) -> Geometry;

    /// re-read the size of the output, e.g. after the stretch setting changed
    fn refresh_geometry(&mut self) -> Result<(), io::Error>;

    fn draw_frame(&mut self, frame: &Frame) -> Result<(), io::Error>;

    fn draw_overlay(&mut self, ops: &[DrawOp]) -> Result<(), io::Error>;
}

// machine screen size, in pixels
struct Resolution(usize, usize);

impl Resolution {
    fn of(frame: &Frame) -> Resolution {
        Resolution(frame.width, frame.height)
    }

    fn pixel_count(&self) -> usize {
        self.0 * self.1
    }

    fn x_bounds(&self) -> [f64; 2] {
        [0.0, self.0.saturating_sub(1) as f64]
    }

    fn y_bounds(&self) -> [f64; 2] {
        [-1.0 * self.1.saturating_sub(1) as f64, 0.0]
    }

    /// canvas coords of each lit pixel
    fn lit_points<'a>(&self, pixels: &'a [u8]) -> impl std::iter::Iterator<Item = (f64, f64)> + 'a {
        let w = self.0.max(1);
        pixels
            .iter()
            .take(self.pixel_count())
            .enumerate()
            .filter(|(_, p)| **p != 0)
            .map(move |(i, _)| ((i % w) as f64, -1.0 * (i / w) as f64))
    }
}

fn style_for(role: Role) -> Style {
    match role {
        Role::Text => Style::default().fg(Color::White),
        Role::Selected => Style::default().fg(Color::Black).bg(Color::Blue),
        Role::Header => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        Role::Value => Style::default().fg(Color::Green),
    }
}

/// one-row rect for text starting at (x, y), clipped to `area`
fn cell_rect(area: Rect, x: u16, y: u16, len: usize) -> Option<Rect> {
    if x >= area.width || y >= area.height || len == 0 {
        return None;
    }
    let width = (len as u16).min(area.width - x);
    Some(Rect::new(area.x + x, area.y + y, width, 1))
}

/// monochrome display in a terminal, rendered using TUI and crossterm
pub struct MonoTermDisplay {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    title: String,
    geometry: Geometry,
}

impl MonoTermDisplay {
    pub fn new(title: &str) -> Result<MonoTermDisplay, io::Error> {
        let backend = CrosstermBackend::new(io::stdout());
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;
        let size = terminal.size()?;
        Ok(MonoTermDisplay {
            terminal,
            title: title.to_string(),
            geometry: Geometry {
                cols: size.width,
                rows: size.height,
            },
        })
    }
}

impl Display for MonoTermDisplay {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn refresh_geometry(&mut self) -> Result<(), io::Error> {
        let size = self.terminal.size()?;
        self.geometry = Geometry {
            cols: size.width,
            rows: size.height,
        };
        self.terminal.clear()?;
        debug!("display now {}x{}", size.width, size.height);
        Ok(())
    }

    fn draw_frame(&mut self, frame: &Frame) -> Result<(), io::Error> {
        let resolution = Resolution::of(frame);
        let title = self.title.as_str();
        // one terminal cell per machine pixel, plus the border
        self.terminal.draw(|f| {
            let size = Rect::new(0, 0, 2 + frame.width as u16, 2 + frame.height as u16)
                .intersection(f.size());
            let coords: Vec<(f64, f64)> = resolution.lit_points(frame.pixels).collect();
            let canvas = Canvas::default()
                .block(
                    Block::default()
                        .title(title)
                        .borders(Borders::ALL)
                        .style(Style::default().bg(Color::Black)),
                )
                .x_bounds(resolution.x_bounds())
                .y_bounds(resolution.y_bounds())
                .marker(Marker::Block)
                .paint(|ctx| {
                    ctx.draw(&Points {
                        coords: &coords,
                        color: Color::White,
                    });
                });
            f.render_widget(canvas, size);
        })?;
        Ok(())
    }

    fn draw_overlay(&mut self, ops: &[DrawOp]) -> Result<(), io::Error> {
        self.terminal.draw(|f| {
            let area = f.size();
            f.render_widget(Clear, area);
            f.render_widget(Block::default().style(Style::default().bg(Color::Black)), area);
            for op in ops {
                match op {
                    DrawOp::Text { x, y, text, role } => {
                        if let Some(rect) = cell_rect(area, *x, *y, text.chars().count()) {
                            let span = Span::styled(text.as_str(), style_for(*role));
                            f.render_widget(Paragraph::new(span), rect);
                        }
                    }
                    DrawOp::HLine { x0, x1, y, role } => {
                        let len = x1.saturating_sub(*x0) as usize + 1;
                        if let Some(rect) = cell_rect(area, *x0, *y, len) {
                            let rule = line::HORIZONTAL.repeat(rect.width as usize);
                            f.render_widget(Paragraph::new(Span::styled(rule, style_for(*role))), rect);
                        }
                    }
                }
            }
        })?;
        Ok(())
    }
}

/// what a `DummyDisplay` has been asked to do
#[derive(Debug, Default)]
pub struct DisplayLog {
    pub frames: usize,
    pub overlays: Vec<Vec<DrawOp>>,
    pub refreshes: usize,
}

/// useful for testing non-display routines
pub struct DummyDisplay {
    geometry: Geometry,
    log: Rc<RefCell<DisplayLog>>,
}

impl DummyDisplay {
    pub fn new(geometry: Geometry) -> (DummyDisplay, Rc<RefCell<DisplayLog>>) {
        let log = Rc::new(RefCell::new(DisplayLog::default()));
        let display = DummyDisplay {
            geometry,
            log: Rc::clone(&log),
        };
        (display, log)
    }
}

impl Display for DummyDisplay {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn refresh_geometry(&mut self) -> Result<(), io::Error> {
        self.log.borrow_mut().refreshes += 1;
        Ok(())
    }

    fn draw_frame(&mut self, _frame: &Frame) -> Result<(), io::Error> {
        self.log.borrow_mut().frames += 1;
        Ok(())
    }

    fn draw_overlay(&mut self, ops: &[DrawOp]) -> Result<(), io::Error> {
        self.log.borrow_mut().overlays.push(ops.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Resolution tests
    #[test]
    fn test_pixel_count() {
        let r = Resolution(64, 32);
        assert_eq!(r.pixel_count(), 2048)
    }

    #[test]
    fn test_x_bounds() {
        let r = Resolution(64, 32);
        assert_eq!(r.x_bounds(), [0.0, 63.0]);
    }

    #[test]
    fn test_y_bounds() {
        let r = Resolution(64, 32);
        assert_eq!(r.y_bounds(), [-31.0, 0.0]);
    }

    #[test]
    fn test_lit_points() {
        let r = Resolution(3, 2);
        let pixels = [1, 0, 0, 0, 0, 1];
        let points: Vec<_> = r.lit_points(&pixels).collect();
        assert_eq!(points, vec![(0.0, 0.0), (2.0, -1.0)]);
    }

    #[test]
    fn test_lit_points_ignores_overhang() {
        let r = Resolution(2, 1);
        let points: Vec<_> = r.lit_points(&[0, 0, 1, 1]).collect();
        assert!(points.is_empty());
    }

    #[test]
    fn test_cell_rect_clips() {
        let area = Rect::new(0, 0, 20, 5);
        assert_eq!(cell_rect(area, 2, 1, 5), Some(Rect::new(2, 1, 5, 1)));
        assert_eq!(cell_rect(area, 15, 1, 10), Some(Rect::new(15, 1, 5, 1)));
        assert_eq!(cell_rect(area, 20, 1, 3), None);
        assert_eq!(cell_rect(area, 0, 5, 3), None);
        assert_eq!(cell_rect(area, 0, 0, 0), None);
    }

    // DummyDisplay tests
    #[test]
    fn test_dummy_display_records() -> Result<(), io::Error> {
        let geo = Geometry { cols: 40, rows: 12 };
        let (mut d, log) = DummyDisplay::new(geo);
        let pixels = [0u8; 4];
        d.draw_frame(&Frame {
            width: 2,
            height: 2,
            pixels: &pixels,
        })?;
        d.draw_overlay(&[DrawOp::HLine {
            x0: 0,
            x1: 3,
            y: 1,
            role: Role::Text,
        }])?;
        d.refresh_geometry()?;
        assert_eq!(d.geometry(), geo);
        let log = log.borrow();
        assert_eq!(log.frames, 1);
        assert_eq!(log.overlays.len(), 1);
        assert_eq!(log.refreshes, 1);
        Ok(())
    }

    #[test]
    #[ignore]
    // NB. needs a real terminal to draw on
    fn test_draw_on_terminal() -> Result<(), io::Error> {
        let mut d = MonoTermDisplay::new("EMU")?;
        let pixels = [1u8; 64 * 32];
        d.draw_frame(&Frame {
            width: 64,
            height: 32,
            pixels: &pixels,
        })
    }
}
