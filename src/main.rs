use std::error::Error;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{info, warn};

use emufront::browser::StdFs;
use emufront::config::{ConfigStore, TomlConfig};
use emufront::controller::Controller;
use emufront::display::MonoTermDisplay;
use emufront::emulator::Emulator;
use emufront::input::{ResetButton, TermInput};
use emufront::keyqueue::KeyQueue;
use emufront::machine::DemoMachine;
use emufront::menu::MenuTree;
use emufront::navigator::Navigator;
use emufront::scheduler::SpinTimer;

const DEVICE_NAME: &str = "EMU";

/// settings menu, file browser and frame pacing around a demo machine
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// menu definition, one item per line
    #[arg(long, default_value = "menu.cfg")]
    menu: PathBuf,

    /// where settings are loaded from and saved to
    #[arg(long, default_value = "emuconf.toml")]
    config: PathBuf,

    /// directory the file browser sees as "/"
    #[arg(long, default_value = ".")]
    media_root: PathBuf,

    /// the terminal is taken, so log lines go here
    #[arg(long, default_value = "emufront.log")]
    log_file: PathBuf,

    /// frames per second of the demo machine
    #[arg(long, default_value_t = 60.0)]
    rate: f64,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let log_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&args.log_file)?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();
    info!("starting; {:?}", args);

    let tree = match MenuTree::load(&args.menu) {
        Ok(tree) => tree,
        Err(e) => {
            warn!("no menu from {}: {}", args.menu.display(), e);
            MenuTree::new()
        }
    };
    info!("{} menu items", tree.len());

    let mut config = TomlConfig::new(&args.config);
    if let Err(e) = config.load() {
        warn!("using default settings: {}", e);
    }
    let mut emu = Emulator::new(Some(Box::new(DemoMachine::new(args.rate))), Box::new(config));
    emu.insert_configured_media();

    // initialise
    let keys = Arc::new(KeyQueue::new());
    let reset = Arc::new(ResetButton::new());
    let display = MonoTermDisplay::new(DEVICE_NAME)?;
    let input = TermInput::new(Arc::clone(&keys), Arc::clone(&reset))?;

    let mut controller = Controller::new(
        emu,
        Navigator::new(tree, DEVICE_NAME),
        keys,
        Box::new(reset),
        Box::new(StdFs::new(&args.media_root)),
        Box::new(display),
        Box::new(SpinTimer::new()),
    );

    while !input.quit_requested() {
        controller.tick()?;
    }
    info!("quit requested");
    drop(input);

    // shove some junk on stdout to stop the cli messing up the last frame
    println!();
    Ok(())
}
