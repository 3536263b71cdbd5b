//! Pseudo-terminal support (Unix)

use blocking::Unblock;
use futures::io::{AsyncRead, AsyncWrite};
use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use nix::pty::{OpenptyResult, Winsize, openpty};
use nix::sys::termios::Termios;
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use crate::error::Result;
use crate::options::PtyOptions;

/// The terminal end-of-file character (Ctrl+D)
const EOT: u8 = 0x04;

/// Open a terminal pair sized per `options`.
///
/// Both descriptors are close-on-exec; the slave only reaches the child
/// through its standard streams.
pub(crate) fn open(options: &PtyOptions) -> Result<(PtyMaster, OwnedFd)> {
    let size = Winsize {
        ws_row: options.rows,
        ws_col: options.columns,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let OpenptyResult { master, slave } = openpty(&size, None::<&Termios>)?;
    for fd in [&master, &slave] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((PtyMaster { fd: master }, slave))
}

/// Parent side of a terminal
pub(crate) struct PtyMaster {
    fd: OwnedFd,
}

impl PtyMaster {
    pub(crate) fn writer(&self, eof_on_close: bool) -> Result<PtyWriter> {
        Ok(PtyWriter {
            inner: Unblock::new(File::from(self.fd.try_clone()?)),
            last_byte: None,
            eof_on_close,
            pending_eof: None,
        })
    }

    pub(crate) fn reader(self) -> PtyReader {
        PtyReader {
            inner: Unblock::new(File::from(self.fd)),
        }
    }
}

/// Combined output of a terminal.
///
/// Linux reports `EIO` once every slave descriptor is closed; that is the
/// terminal's end of stream.
pub(crate) struct PtyReader {
    inner: Unblock<File>,
}

impl AsyncRead for PtyReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        match ready!(Pin::new(&mut self.inner).poll_read(cx, buf)) {
            Err(e) if e.raw_os_error() == Some(libc::EIO) => Poll::Ready(Ok(0)),
            other => Poll::Ready(other),
        }
    }
}

/// Input side of a terminal.
///
/// A terminal has no half-close, so closing the writer types the EOF
/// character instead. A partial line needs one extra EOF to be flushed first.
pub(crate) struct PtyWriter {
    inner: Unblock<File>,
    last_byte: Option<u8>,
    eof_on_close: bool,
    pending_eof: Option<usize>,
}

impl AsyncWrite for PtyWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let written = ready!(Pin::new(&mut self.inner).poll_write(cx, buf))?;
        if written > 0 {
            self.last_byte = Some(buf[written - 1]);
        }
        Poll::Ready(Ok(written))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.pending_eof.is_none() {
            let count = match (self.eof_on_close, self.last_byte) {
                (false, _) => 0,
                (true, None | Some(b'\n')) => 1,
                (true, Some(_)) => 2,
            };
            self.pending_eof = Some(count);
        }
        while let Some(remaining @ 1..) = self.pending_eof {
            match ready!(Pin::new(&mut self.inner).poll_write(cx, &[EOT]))? {
                0 => return Poll::Ready(Err(io::ErrorKind::WriteZero.into())),
                _ => self.pending_eof = Some(remaining - 1),
            }
        }
        Pin::new(&mut self.inner).poll_close(cx)
    }
}
