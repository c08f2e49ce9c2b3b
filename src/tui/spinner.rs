//! Spinners for long-running cluster and GitOps operations.
//!
//! # Example
//!
//! ```rust,ignore
//! use kubeseed_cli::tui;
//!
//! let report = tui::spin_result("Creating cluster", "Cluster ready", async {
//!     orchestrator.provision(&spec).await
//! }, false).await?;
//! ```

use std::future::Future;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use teapot::Model;
use teapot::components::{Spinner, SpinnerStyle};
use teapot::output::{is_ci, is_tty};
use teapot::style::{CLEAR_LINE, Color};

use super::is_interactive;

/// Handle to control a running spinner.
pub struct SpinnerHandle {
    running: Arc<AtomicBool>,
    message: Arc<Mutex<String>>,
    join_handle: Option<std::thread::JoinHandle<()>>,
    quiet: bool,
}

impl SpinnerHandle {
    /// Stop the spinner.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }

    /// Replace the text next to the spinner.
    pub fn set_message(&self, message: impl Into<String>) {
        *self.message.lock().unwrap_or_else(PoisonError::into_inner) = message.into();
    }

    /// Whether a spinner is actually animating.
    pub const fn is_animated(&self) -> bool {
        self.join_handle.is_some()
    }

    /// Stop with a success message.
    pub fn success(mut self, message: &str) {
        self.stop();
        clear_line();
        if !self.quiet {
            teapot::output::success(message);
        }
    }

    /// Stop with an error message. Shown even when quiet.
    pub fn error(mut self, message: &str) {
        self.stop();
        clear_line();
        teapot::output::error(message);
    }

    /// Stop with a warning message.
    pub fn warning(mut self, message: &str) {
        self.stop();
        clear_line();
        if !self.quiet {
            teapot::output::warning(message);
        }
    }

    /// Stop with an info message.
    pub fn info(mut self, message: &str) {
        self.stop();
        clear_line();
        if !self.quiet {
            teapot::output::info(message);
        }
    }

    /// Stop without any message (clears the line).
    pub fn clear(mut self) {
        self.stop();
        clear_line();
    }
}

impl Drop for SpinnerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start a spinner that can be manually controlled.
///
/// Without a terminal the message is printed once (unless `quiet`) and
/// nothing animates.
pub fn start(message: impl Into<String>, quiet: bool) -> SpinnerHandle {
    let message = Arc::new(Mutex::new(message.into()));
    let running = Arc::new(AtomicBool::new(true));

    if !is_interactive(quiet) {
        if !quiet {
            teapot::output::info(&message.lock().unwrap_or_else(PoisonError::into_inner));
        }
        return SpinnerHandle { running, message, join_handle: None, quiet };
    }

    let running_clone = running.clone();
    let message_clone = message.clone();
    let join_handle = std::thread::spawn(move || {
        let build = |text: &str| {
            Spinner::new().style(SpinnerStyle::Dots).color(Color::Cyan).message(text)
        };
        let mut shown = message_clone.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let mut spinner = build(&shown);
        let sleep_duration = SpinnerStyle::Dots.interval();

        while running_clone.load(Ordering::SeqCst) {
            let current = message_clone.lock().unwrap_or_else(PoisonError::into_inner).clone();
            if current != shown {
                spinner = build(&current);
                shown = current;
            }

            eprint!("\r{}{}", CLEAR_LINE, spinner.view());
            let _ = io::stderr().flush();

            spinner.tick();
            std::thread::sleep(sleep_duration);
        }

        eprint!("\r{CLEAR_LINE}");
        let _ = io::stderr().flush();
    });

    SpinnerHandle { running, message, join_handle: Some(join_handle), quiet }
}

/// Run an async operation with a spinner, clearing it afterwards.
pub async fn spin<F, T>(message: impl Into<String>, future: F, quiet: bool) -> T
where
    F: Future<Output = T>,
{
    let handle = start(message, quiet);
    let result = future.await;
    handle.clear();
    result
}

/// Run an async operation with a spinner, showing success or the error on completion.
pub async fn spin_result<F, T, E>(
    in_progress_message: impl Into<String>,
    success_message: impl Into<String>,
    future: F,
    quiet: bool,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let success_msg = success_message.into();
    let handle = start(in_progress_message, quiet);

    match future.await {
        Ok(value) => {
            handle.success(&success_msg);
            Ok(value)
        },
        Err(e) => {
            handle.error(&e.to_string());
            Err(e)
        },
    }
}

fn clear_line() {
    if is_tty() && !is_ci() {
        eprint!("\r{CLEAR_LINE}");
        let _ = io::stderr().flush();
    }
}
