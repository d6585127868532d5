use core::cell::RefCell;

use embassy_sync::{
    blocking_mutex::{raw::CriticalSectionRawMutex, Mutex},
    signal::Signal,
};
use embedded_io_async::{Read, Write};

use crate::at::response;

/// Bytes read from the UART per ingest iteration
pub const INGEST_CHUNK_SIZE: usize = 64;

struct Inner<const N: usize> {
    buf: [u8; N],
    len: usize,
    dropped: usize,
    overflowed: bool,
}

impl<const N: usize> Inner<N> {
    /// Last usable slot is reserved for the terminator
    const LIMIT: usize = N.saturating_sub(1);

    fn terminate(&mut self) {
        if let Some(slot) = self.buf.get_mut(self.len) {
            *slot = 0;
        }
    }
}

/// Text received from the modem since the last [`RxBuffer::clear`].
///
/// Filled by the ingest task, read and cleared by the sequencer. The
/// contents are kept NUL terminated so a raw dump of the buffer always
/// ends where the valid data ends.
pub struct RxBuffer<const N: usize> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Inner<N>>>,
    appended: Signal<CriticalSectionRawMutex, ()>,
}

impl<const N: usize> Default for RxBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RxBuffer<N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                buf: [0; N],
                len: 0,
                dropped: 0,
                overflowed: false,
            })),
            appended: Signal::new(),
        }
    }

    /// Usable capacity, one less than `N`
    pub const fn capacity(&self) -> usize {
        Inner::<N>::LIMIT
    }

    /// Append as many bytes as fit, returns how many were stored.
    ///
    /// Never blocks; bytes past the capacity are counted and dropped.
    pub fn ingest(&self, bytes: &[u8]) -> usize {
        let (accepted, first_overflow) = self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            let accepted = bytes.len().min(Inner::<N>::LIMIT - inner.len);
            let start = inner.len;
            inner.buf[start..start + accepted].copy_from_slice(&bytes[..accepted]);
            inner.len += accepted;
            inner.terminate();

            let dropped = bytes.len() - accepted;
            inner.dropped += dropped;
            let first_overflow = dropped > 0 && !inner.overflowed;
            if dropped > 0 {
                inner.overflowed = true;
            }
            (accepted, first_overflow)
        });

        if first_overflow {
            log::warn!("Receive buffer full ({} bytes), dropping data", N);
        }
        if accepted > 0 {
            self.appended.signal(());
        }
        accepted
    }

    /// Truncate to empty so stale text cannot satisfy the next match
    pub fn clear(&self) {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            inner.len = 0;
            inner.overflowed = false;
            inner.terminate();
        });
        self.appended.reset();
    }

    pub fn len(&self) -> usize {
        self.inner.lock(|inner| inner.borrow().len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes dropped because the buffer was full
    pub fn dropped(&self) -> usize {
        self.inner.lock(|inner| inner.borrow().dropped)
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.with_contents(|buf| response::contains(buf, needle))
    }

    /// Run `f` on the current contents while holding the buffer lock
    pub fn with_contents<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        self.inner.lock(|inner| {
            let inner = inner.borrow();
            f(&inner.buf[..inner.len])
        })
    }

    /// Like [`Self::with_contents`], including the terminating NUL
    #[cfg(test)]
    pub fn with_terminated<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        self.inner.lock(|inner| {
            let inner = inner.borrow();
            let end = (inner.len + 1).min(N);
            f(&inner.buf[..end])
        })
    }

    /// Resolves after the next successful [`Self::ingest`]
    pub async fn appended(&self) {
        self.appended.wait().await
    }
}

/// Feed bytes from the modem UART into `rx`, echoing them to `echo`.
///
/// Returns when the reader reports end of stream. Echo failures are ignored.
pub async fn run_ingestor<R, E, const N: usize>(reader: &mut R, rx: &RxBuffer<N>, echo: &mut E)
where
    R: Read,
    E: Write,
{
    loop {
        let mut buf = [0u8; INGEST_CHUNK_SIZE];
        let len = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(len) => len,
            Err(e) => {
                log::error!("UART read error: {:?}", e);
                continue;
            }
        };
        rx.ingest(&buf[..len]);
        echo.write_all(&buf[..len]).await.ok();
    }
    log::info!("Modem receive stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_keeps_terminator_slot() {
        let rx = RxBuffer::<8>::new();
        assert_eq!(rx.capacity(), 7);

        assert_eq!(rx.ingest(b"0123456789"), 7);
        assert_eq!(rx.len(), 7);
        assert_eq!(rx.dropped(), 3);
        rx.with_contents(|buf| assert_eq!(buf, b"0123456"));
        rx.with_terminated(|buf| assert_eq!(buf, b"0123456\0"));

        assert_eq!(rx.ingest(b"x"), 0);
        assert_eq!(rx.dropped(), 4);
    }

    #[test]
    fn byte_by_byte_overflow() {
        let rx = RxBuffer::<4>::new();
        for b in b"abcdefgh" {
            rx.ingest(&[*b]);
            rx.with_terminated(|buf| assert_eq!(buf.last(), Some(&0)));
        }
        rx.with_contents(|buf| assert_eq!(buf, b"abc"));
        assert_eq!(rx.dropped(), 5);
    }

    #[test]
    fn clear_is_idempotent() {
        let rx = RxBuffer::<16>::new();
        rx.clear();
        assert!(rx.is_empty());
        rx.with_terminated(|buf| assert_eq!(buf, b"\0"));

        rx.ingest(b"\r\nOK\r\n");
        assert!(rx.contains("OK"));
        rx.clear();
        assert_eq!(rx.len(), 0);
        assert!(!rx.contains("OK"));
        rx.with_terminated(|buf| assert_eq!(buf, b"\0"));

        rx.clear();
        assert!(rx.is_empty());
    }

    #[test]
    fn clear_allows_new_data_after_overflow() {
        let rx = RxBuffer::<4>::new();
        rx.ingest(b"abcdef");
        rx.clear();
        assert_eq!(rx.ingest(b"OK"), 2);
        assert!(rx.contains("OK"));
    }

    #[test]
    fn ingest_raises_append_signal() {
        let rx = RxBuffer::<16>::new();
        rx.ingest(b"A");
        embassy_futures::block_on(rx.appended());
    }

    #[test]
    fn ingestor_copies_stream_and_echo() {
        let rx = RxBuffer::<32>::new();
        let mut reader: &[u8] = b"\r\nSMS Ready\r\n";
        let mut echo = alloc::vec::Vec::<u8>::new();
        embassy_futures::block_on(run_ingestor(&mut reader, &rx, &mut echo));

        assert!(rx.contains("SMS Ready"));
        assert_eq!(echo, b"\r\nSMS Ready\r\n");
    }
}
