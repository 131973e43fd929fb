// UI module - interactive console shell
//
// This module contains:
// - Menu parsing and rendering for profile selection
// - ConsoleRenderer: turns StateManager events into progress lines
// - run_with_console: runs a pipeline with live progress and a final banner

pub mod console;

pub use console::{
    ConsoleRenderer, MenuChoice, menu_text, outcome_banner, parse_choice, run_with_console,
    spawn_renderer,
};
