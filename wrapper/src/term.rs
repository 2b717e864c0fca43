//! User-terminal handling: raw mode while the proxy runs, and the
//! current window size for the PTY.

use portable_pty::PtySize;

/// Puts the controlling terminal into raw mode on construction and
/// restores the saved settings on drop, so a crash mid-session does
/// not leave the user's shell unusable.
pub struct RawModeGuard {
    saved: Option<libc::termios>,
}

impl RawModeGuard {
    /// No-op when stdin is not a terminal (e.g. under tests or pipes).
    pub fn new() -> Self {
        // SAFETY: isatty/tcgetattr/tcsetattr on fd 0 with a valid
        // termios out-pointer.
        unsafe {
            if libc::isatty(libc::STDIN_FILENO) == 0 {
                return Self { saved: None };
            }
            let mut termios = std::mem::zeroed::<libc::termios>();
            if libc::tcgetattr(libc::STDIN_FILENO, &mut termios) != 0 {
                return Self { saved: None };
            }
            let saved = termios;
            libc::cfmakeraw(&mut termios);
            if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &termios) != 0 {
                return Self { saved: None };
            }
            Self { saved: Some(saved) }
        }
    }
}

impl Default for RawModeGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            // SAFETY: restoring the termios captured in new().
            unsafe {
                libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &saved);
            }
        }
    }
}

/// Current window size of the controlling terminal, or 80x24 when
/// stdin is not a terminal.
pub fn terminal_size() -> PtySize {
    // SAFETY: TIOCGWINSZ with a valid winsize out-pointer.
    unsafe {
        let mut ws = std::mem::zeroed::<libc::winsize>();
        if libc::ioctl(libc::STDIN_FILENO, libc::TIOCGWINSZ, &mut ws) == 0
            && ws.ws_row > 0
            && ws.ws_col > 0
        {
            return PtySize {
                rows: ws.ws_row,
                cols: ws.ws_col,
                pixel_width: ws.ws_xpixel,
                pixel_height: ws.ws_ypixel,
            };
        }
    }
    PtySize {
        rows: 24,
        cols: 80,
        pixel_width: 0,
        pixel_height: 0,
    }
}
