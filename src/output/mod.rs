//! Styled diagnostic output for tgrun.
//!
//! Every function here writes to stderr: stdout belongs to the engine, and
//! commands like `output` or `show -json` are commonly piped.

use owo_colors::OwoColorize;

const PREFIX: &str = "[tgrun]";

/// Print a success message with a green checkmark
pub fn success(message: &str) {
    // Pastel mint green: RGB(152, 225, 152)
    eprintln!(
        "{} {} {}",
        PREFIX.truecolor(160, 160, 160),
        "✓".truecolor(152, 225, 152).bold(),
        message
    );
}

/// Print an error message with a red X
pub fn error(message: &str) {
    // Pastel coral/salmon: RGB(255, 160, 160)
    eprintln!(
        "{} {} {}",
        PREFIX.truecolor(160, 160, 160),
        "✗".truecolor(255, 160, 160).bold(),
        message.bright_white()
    );
}

/// Print a warning message with a yellow warning symbol
pub fn warning(message: &str) {
    // Pastel cream/yellow: RGB(255, 230, 160)
    eprintln!(
        "{} {} {}",
        PREFIX.truecolor(160, 160, 160),
        "⚠".truecolor(255, 230, 160).bold(),
        message
    );
}

/// Print an info message
pub fn info(message: &str) {
    eprintln!("{} {}", PREFIX.truecolor(160, 160, 160), message);
}

/// Print a dimmed message (engine command lines, cache hits)
pub fn dimmed(message: &str) {
    eprintln!(
        "{} {}",
        PREFIX.truecolor(160, 160, 160),
        message.truecolor(160, 160, 160)
    );
}
