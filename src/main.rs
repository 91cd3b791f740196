use anyhow::{bail, Context, Result};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::backend::CrosstermBackend;
use std::io::stdout;
use std::path::PathBuf;

mod apps;
mod chat_api;
mod config;
mod core;
mod desktop;
mod logging;
mod provider;
mod sound;
mod storage;
mod timer;
mod ui;

use config::{get_settings, persist_settings, reload_settings, settings_file, update_settings};
use ui::Term;

// ── Arguments ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    no_sound: bool,
    data_dir: Option<PathBuf>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--no-sound" => parsed.no_sound = true,
            "--data-dir" => match iter.next() {
                Some(dir) => parsed.data_dir = Some(PathBuf::from(dir)),
                None => bail!("--data-dir needs a path"),
            },
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(parsed)
}

// ── Terminal setup / teardown ─────────────────────────────────────────────────

fn init_terminal() -> Result<Term> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen).context("entering alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    Ok(ratatui::Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Term) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    if let Some(dir) = args.data_dir {
        config::set_data_dir(dir);
    }

    // First run writes the defaults out so they can be edited by hand.
    if !settings_file().exists() {
        persist_settings();
    }
    reload_settings();
    if args.no_sound {
        update_settings(|s| s.sound = false);
    }

    if let Err(err) = logging::init(&config::log_file(), &get_settings().log_level) {
        eprintln!("logging disabled: {err:#}");
    }

    let mut terminal = init_terminal()?;

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        desktop::desktop_mode(&mut terminal)
    }));

    // Always restore terminal
    restore_terminal(&mut terminal).ok();

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::error!("desktop failed: {e:#}");
            Err(e)
        }
        Err(_) => {
            tracing::error!("desktop panicked");
            eprintln!("andalus crashed. See {}", config::log_file().display());
            Ok(())
        }
    }
}
