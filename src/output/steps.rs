//! Step lines with dot leaders, hints, and dry-run plans.
//!
//! All of these write to stderr so a `-o json` run keeps stdout clean.

use teapot::style::Color;

/// Total width of a dot-leader line, status included.
pub const STEP_LINE_WIDTH: usize = 72;

const RESET: &str = "\x1b[0m";

/// Visible length of a string, ignoring ANSI escape sequences.
pub fn visible_len(s: &str) -> usize {
    let mut len = 0;
    let mut in_escape = false;
    for c in s.chars() {
        if in_escape {
            if c == 'm' {
                in_escape = false;
            }
        } else if c == '\x1b' {
            in_escape = true;
        } else {
            len += 1;
        }
    }
    len
}

/// Format `{text} {dots} {status}` padded to [`STEP_LINE_WIDTH`].
///
/// `status` may already contain ANSI codes.
pub fn format_dot_leader(text: &str, status: &str) -> String {
    let dim = Color::BrightBlack.to_ansi_fg();
    let green = Color::Green.to_ansi_fg();
    let red = Color::Red.to_ansi_fg();

    let status_colored = match status.to_uppercase().as_str() {
        "OK" | "CREATED" | "READY" | "RUNNING" | "DELETED" => format!("{green}{status}{RESET}"),
        "SKIPPED" | "UNCHANGED" | "STOPPED" => format!("{dim}{status}{RESET}"),
        "FAILED" => format!("{red}{status}{RESET}"),
        _ => status.to_string(),
    };

    // Two separating spaces plus one guaranteed dot.
    let dots_len = STEP_LINE_WIDTH
        .saturating_sub(visible_len(text))
        .saturating_sub(visible_len(status))
        .saturating_sub(2)
        .max(1);
    let dots = ".".repeat(dots_len);

    format!("{text} {dim}{dots}{RESET} {status_colored}")
}

/// Print a hint line with a dimmed circle prefix.
pub fn print_hint(text: &str) {
    let dim = Color::BrightBlack.to_ansi_fg();
    eprintln!("{dim}○{RESET} {text}");
}

/// Print the numbered steps a command would run, without running them.
pub fn print_plan(title: &str, steps: &[String]) {
    eprint!("{}", render_plan(title, steps));
}

fn render_plan(title: &str, steps: &[String]) -> String {
    let mut out = format!("Dry run: {title}\n");
    let width = steps.len().to_string().len();
    for (i, step) in steps.iter().enumerate() {
        out.push_str(&format!("  {:>width$}. {step}\n", i + 1));
    }
    out
}
