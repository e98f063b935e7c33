//! Progress display for the item being processed.
//!
//! A single line that shows a spinner while validating and switches to a
//! byte bar while an entry is hashed or written.

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use nsp_canon_core::ValidationProgress;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("  {spinner:.cyan} {msg}")
        .expect("static pattern")
        .tick_chars("/-\\|")
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "  {spinner:.cyan} {msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes}",
    )
    .expect("static pattern")
    .tick_chars("/-\\|")
    .progress_chars("=> ")
}

pub(crate) struct ItemSpinner {
    pb: ProgressBar,
    /// `[current/total] file name` of the item in progress.
    label: RefCell<String>,
    in_bar: Cell<bool>,
}

impl ItemSpinner {
    /// When `quiet` is true nothing is drawn.
    pub(crate) fn new(quiet: bool) -> Self {
        let pb = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        pb.set_style(spinner_style());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self {
            pb,
            label: RefCell::new(String::new()),
            in_bar: Cell::new(false),
        }
    }

    fn to_spinner(&self) {
        if self.in_bar.replace(false) {
            self.pb.set_style(spinner_style());
        }
    }

    fn to_bar(&self, total: u64) {
        if !self.in_bar.replace(true) {
            self.pb.set_style(bar_style());
        }
        self.pb.set_length(total);
    }

    pub(crate) fn update(&self, event: &ValidationProgress) {
        match event {
            ValidationProgress::Package {
                path,
                current,
                total,
            } => {
                let name = Path::new(path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.clone());
                let label = format!("[{}/{}] {}", current, total, name);
                self.to_spinner();
                self.pb.set_message(label.clone());
                *self.label.borrow_mut() = label;
            }
            ValidationProgress::Phase { name } => {
                self.to_spinner();
                self.pb.set_message(format!("{}: {}", self.label.borrow(), name));
            }
            ValidationProgress::Subcontainer {
                name,
                current,
                total,
            } => {
                self.pb.set_message(format!(
                    "{}: {} ({}/{})",
                    self.label.borrow(),
                    name,
                    current,
                    total
                ));
            }
            ValidationProgress::HashStarted { name, total_bytes } => {
                self.to_bar(*total_bytes);
                self.pb.set_position(0);
                self.pb.set_message(format!("hashing {}", name));
            }
            ValidationProgress::Hashing { bytes_done, .. } => {
                self.pb.set_position(*bytes_done);
            }
            ValidationProgress::HashFinished { .. } => {
                self.to_spinner();
            }
            ValidationProgress::Writing {
                bytes_done,
                total_bytes,
            } => {
                if !self.in_bar.get() {
                    self.pb.set_message(format!("{}: writing", self.label.borrow()));
                }
                self.to_bar(*total_bytes);
                self.pb.set_position(*bytes_done);
            }
        }
    }

    /// Stop ticking and clear the line.
    pub(crate) fn finish(&self) {
        self.pb.disable_steady_tick();
        self.pb.finish_and_clear();
    }
}
