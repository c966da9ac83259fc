//! Opening the destination folder in the host's file browser.

use std::io;
use std::path::Path;
use std::process::Command;

/// Shows a directory to the user.
pub trait RevealDestination: Send + Sync {
    /// Asks the host to open `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be made.
    fn reveal(&self, dir: &Path) -> io::Result<()>;
}

/// Uses the platform's "open" command (`explorer`, `open` or `xdg-open`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFileBrowser;

impl SystemFileBrowser {
    fn program() -> &'static str {
        if cfg!(target_os = "windows") {
            "explorer"
        } else if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        }
    }
}

impl RevealDestination for SystemFileBrowser {
    fn reveal(&self, dir: &Path) -> io::Result<()> {
        // The browser outlives us; don't wait for it.
        Command::new(Self::program()).arg(dir).spawn().map(drop)
    }
}
