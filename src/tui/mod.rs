//! Terminal UI helpers built on teapot.

mod progress;
mod spinner;

pub use progress::SpinnerProgress;
pub use spinner::{SpinnerHandle, spin, spin_result};

/// Whether spinners should animate on stderr.
pub fn is_interactive(quiet: bool) -> bool {
    !quiet && teapot::output::is_tty() && !teapot::output::is_ci()
}
