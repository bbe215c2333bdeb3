use nix::fcntl::{fcntl, FcntlArg, OFlag};
use std::{fmt::Write, os::fd::AsRawFd};

/// Puts a driver-owned descriptor into non-blocking mode so a read never
/// stalls the dispatch loop.
pub fn set_fd_nonblocking<Fd: AsRawFd + ?Sized>(fd: &Fd) -> nix::Result<()> {
    let raw = fd.as_raw_fd();
    let bits = fcntl(raw, FcntlArg::F_GETFL)?;
    let prev_flags = OFlag::from_bits_truncate(bits);
    fcntl(raw, FcntlArg::F_SETFL(prev_flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

/// Space-separated hex of at most `max` bytes, with `..` when truncated.
pub fn hex_preview(bytes: &[u8], max: usize) -> String {
    let mut out = String::with_capacity(bytes.len().min(max) * 3 + 2);
    for (idx, byte) in bytes.iter().take(max).enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02x}", byte);
    }
    if bytes.len() > max {
        out.push_str(" ..");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates() {
        assert_eq!(hex_preview(&[0x47, 0x59, 0x52], 8), "47 59 52");
        assert_eq!(hex_preview(&[1, 2, 3, 4], 2), "01 02 ..");
        assert_eq!(hex_preview(&[], 4), "");
    }
}
