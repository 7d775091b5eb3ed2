/// # emufront
///
/// the bit of an emulator that isn't the emulated machine: a settings menu
/// drawn over the screen, a file browser for picking disk and tape images,
/// and the loop that keeps frames coming at the right rate.
///
/// ## Design
///
/// * nothing but the loop owns state; collaborators are passed in, so every
///   piece can be driven from a test with fakes
/// * fixed capacities for everything that would be static on small hardware
///   (key queue, menu items, menu depth, file name lengths)
///    - full means "refuse and log", never "panic"
/// * the menu is a flat arena; items refer to each other by index
/// * the file browser never holds a whole directory, just a window of
///   entries around the page being looked at
/// * frame timing carried in 1/1024ths of a millisecond so 60Hz doesn't drift
/// * the machine, display, storage, settings and clock are all traits
///
/// Model
///
/// Controller
///  |-- key queue <-- input thread (crossterm)
///  |-- emulator(machine, settings)
///  |-- navigator
///  |    |-- menu tree
///  |    `-- file browser(filesystem)
///  |-- display (tui)
///  `-- tick()
///       |-- reset line rising edge? pulse_reset
///       |-- drain keys: menu if it's up, F12 opens it, otherwise the machine
///       |-- reset held? redraw and wait 32ms
///       |-- menu up? draw the overlay and wait 32ms
///       |-- otherwise run a frame, draw it unless it's skipped, sleep to
///       |   the next frame time
///       `-- yield
pub mod browser;
pub mod config;
pub mod controller;
pub mod display;
pub mod emulator;
pub mod input;
pub mod keyqueue;
pub mod machine;
pub mod menu;
pub mod navigator;
pub mod overlay;
pub mod scheduler;
