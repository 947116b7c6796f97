// SPDX-License-Identifier: MIT
//
// Terminal control — raw mode, protocol opt-ins, and RAII cleanup.
//
// Safety: this module necessarily uses `unsafe` for termios (tcgetattr,
// tcsetattr), isatty, and raw fd writes. These are the standard POSIX
// interfaces for terminal control — there is no safe alternative. Each
// unsafe block is minimal.
#![allow(unsafe_code)]
//
// This module owns the terminal's raw state. It enters raw mode via
// termios and asks the terminal to speak the protocols the decoder
// understands: Win32 Input Mode, the Kitty keyboard protocol, SGR
// any-event mouse reporting, focus reporting, and bracketed paste.
// Releasing the handle retracts everything in reverse order and
// restores the saved terminal attributes.
//
// The panic hook bypasses Rust's stdout lock entirely, writing a
// pre-built restore string directly to fd 1. This prevents deadlock if
// the panic happened while the lock was held; the original panic
// handler then prints its message to a working terminal.

use std::io::{self, Write};
use std::sync::{Mutex, Once};

use tracing::debug;

// ─── Protocol Sequences ──────────────────────────────────────────────────────

/// Win32 Input Mode (`CSI ? 9001 h/l`).
pub const ENABLE_WIN32_INPUT: &[u8] = b"\x1b[?9001h";
pub const DISABLE_WIN32_INPUT: &[u8] = b"\x1b[?9001l";

/// Kitty keyboard protocol, progressive enhancement level 15
/// (disambiguate + event types + alternate keys + all-as-escapes).
pub const ENABLE_KITTY_KEYBOARD: &[u8] = b"\x1b[>15u";
pub const DISABLE_KITTY_KEYBOARD: &[u8] = b"\x1b[<1u";

/// SGR mouse: 1003 reports any motion, 1006 selects the SGR encoding.
pub const ENABLE_MOUSE: &[u8] = b"\x1b[?1003h\x1b[?1006h";
pub const DISABLE_MOUSE: &[u8] = b"\x1b[?1006l\x1b[?1003l";

/// Focus reporting (1004) and bracketed paste (2004).
pub const ENABLE_FOCUS_PASTE: &[u8] = b"\x1b[?1004h\x1b[?2004h";
pub const DISABLE_FOCUS_PASTE: &[u8] = b"\x1b[?2004l\x1b[?1004l";

/// Complete retraction string for emergency use: every disable
/// sequence, in reverse order of the enables.
#[rustfmt::skip]
const EMERGENCY_RESTORE: &[u8] = b"\
    \x1b[?2004l\x1b[?1004l\
    \x1b[?1006l\x1b[?1003l\
    \x1b[?9001l\
    \x1b[<1u";

// ─── Terminal Queries ───────────────────────────────────────────────────────

/// Check whether stdin is connected to a terminal (TTY).
#[cfg(unix)]
#[must_use]
pub fn is_tty() -> bool {
    unsafe { libc::isatty(libc::STDIN_FILENO) != 0 }
}

#[cfg(not(unix))]
#[must_use]
pub fn is_tty() -> bool {
    false
}

// ─── Panic-Safe Restore ─────────────────────────────────────────────────────

/// Global backup of original termios for panic recovery.
///
/// The [`Terminal`] struct owns its own copy, but the panic hook can't
/// access it. This global backup — behind a [`Mutex`], not `static mut`
/// — lets the hook restore cooked mode without the struct.
#[cfg(unix)]
static TERMIOS_BACKUP: Mutex<Option<libc::termios>> = Mutex::new(None);

#[cfg(unix)]
fn restore_termios_from_backup() {
    if let Ok(guard) = TERMIOS_BACKUP.lock() {
        if let Some(ref original) = *guard {
            unsafe {
                let _ = libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, original);
            }
        }
    }
}

/// Panic hook guard — the hook is installed at most once per process.
static PANIC_HOOK_INSTALLED: Once = Once::new();

/// Install a panic hook that retracts the protocols before the error
/// prints. Without this, a panic in raw mode leaves the user's shell
/// with no echo and a terminal still streaming Win32/Kitty sequences.
fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.call_once(|| {
        let original = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            emergency_restore();

            #[cfg(unix)]
            restore_termios_from_backup();

            original(info);
        }));
    });
}

/// Write the retraction string directly to stdout's file descriptor,
/// bypassing Rust's `io::stdout()` lock to avoid deadlock when the
/// panic occurred while the lock was held.
fn emergency_restore() {
    #[cfg(unix)]
    unsafe {
        let _ = libc::write(
            libc::STDOUT_FILENO,
            EMERGENCY_RESTORE.as_ptr().cast::<libc::c_void>(),
            EMERGENCY_RESTORE.len(),
        );
    }

    #[cfg(not(unix))]
    {
        let _ = io::stdout().write_all(EMERGENCY_RESTORE);
        let _ = io::stdout().flush();
    }
}

// ─── Terminal ───────────────────────────────────────────────────────────────

/// Terminal handle with RAII cleanup.
///
/// Call [`enter`](Self::enter) to switch to raw mode and opt in to the
/// input protocols. The terminal is restored when the handle is dropped
/// — even on panic. When stdin is not a TTY, raw-mode configuration is
/// skipped and the protocol sequences are still written, so the decoder
/// stays usable over pipes and in tests.
///
/// # Example
///
/// ```no_run
/// use vtinput::terminal::Terminal;
///
/// let mut term = Terminal::new();
/// term.enter()?;
/// // ... read events ...
/// // Terminal is restored automatically on drop.
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct Terminal {
    /// Original termios saved before entering raw mode.
    #[cfg(unix)]
    original_termios: Option<libc::termios>,

    /// Whether raw mode + protocols are currently active.
    active: bool,
}

impl Default for Terminal {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminal {
    /// Create an inactive handle. Call [`enter`](Self::enter) to
    /// configure the terminal.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            #[cfg(unix)]
            original_termios: None,
            active: false,
        }
    }

    /// Whether the protocols are currently enabled.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Enter raw mode and enable the input protocols.
    ///
    /// Enables, in order: Kitty keyboard, Win32 Input Mode, SGR
    /// any-event mouse, focus reporting + bracketed paste. Idempotent:
    /// entering while active is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if raw mode cannot be configured or the
    /// sequences cannot be written.
    pub fn enter(&mut self) -> io::Result<()> {
        if self.active {
            return Ok(());
        }

        // Install the panic hook (once per process).
        install_panic_hook();

        self.enable_raw_mode()?;

        let stdout = io::stdout();
        let mut lock = stdout.lock();
        lock.write_all(ENABLE_KITTY_KEYBOARD)?;
        lock.write_all(ENABLE_WIN32_INPUT)?;
        lock.write_all(ENABLE_MOUSE)?;
        lock.write_all(ENABLE_FOCUS_PASTE)?;
        lock.flush()?;

        self.active = true;
        debug!("terminal input protocols enabled");
        Ok(())
    }

    /// Retract the protocols (in reverse order of the enables) and
    /// restore the saved terminal attributes. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequences cannot be written or the
    /// original attributes cannot be restored.
    pub fn leave(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }

        let stdout = io::stdout();
        let mut lock = stdout.lock();
        lock.write_all(DISABLE_FOCUS_PASTE)?;
        lock.write_all(DISABLE_MOUSE)?;
        lock.write_all(DISABLE_WIN32_INPUT)?;
        lock.write_all(DISABLE_KITTY_KEYBOARD)?;
        lock.flush()?;
        drop(lock);

        self.disable_raw_mode()?;
        self.active = false;
        debug!("terminal input protocols disabled");
        Ok(())
    }

    // ── Raw Mode (termios) ──────────────────────────────────────────

    #[cfg(unix)]
    fn enable_raw_mode(&mut self) -> io::Result<()> {
        use std::os::unix::io::AsRawFd;

        if !is_tty() {
            return Ok(());
        }

        let fd = io::stdin().as_raw_fd();

        unsafe {
            let mut termios: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(fd, &raw mut termios) != 0 {
                return Err(io::Error::last_os_error());
            }

            // Save original for restore.
            self.original_termios = Some(termios);

            // Also save to the global backup for the panic hook.
            if let Ok(mut guard) = TERMIOS_BACKUP.lock() {
                *guard = Some(termios);
            }

            // cfmakeraw equivalent: disable all line processing.
            termios.c_iflag &= !(libc::IGNBRK
                | libc::BRKINT
                | libc::PARMRK
                | libc::ISTRIP
                | libc::INLCR
                | libc::IGNCR
                | libc::ICRNL
                | libc::IXON);
            termios.c_oflag &= !libc::OPOST;
            termios.c_lflag &=
                !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
            termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
            termios.c_cflag |= libc::CS8;

            // VMIN=1, VTIME=0: read() blocks until at least 1 byte.
            termios.c_cc[libc::VMIN] = 1;
            termios.c_cc[libc::VTIME] = 0;

            if libc::tcsetattr(fd, libc::TCSAFLUSH, &raw const termios) != 0 {
                return Err(io::Error::last_os_error());
            }
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn enable_raw_mode(&mut self) -> io::Result<()> {
        Ok(())
    }

    #[cfg(unix)]
    fn disable_raw_mode(&mut self) -> io::Result<()> {
        if let Some(ref original) = self.original_termios {
            use std::os::unix::io::AsRawFd;
            let fd = io::stdin().as_raw_fd();

            unsafe {
                if libc::tcsetattr(fd, libc::TCSAFLUSH, original) != 0 {
                    return Err(io::Error::last_os_error());
                }
            }

            // Clear the global backup — restored successfully.
            if let Ok(mut guard) = TERMIOS_BACKUP.lock() {
                *guard = None;
            }

            self.original_termios = None;
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn disable_raw_mode(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if self.active {
            let _ = self.leave();
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
