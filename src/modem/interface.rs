use alloc::string::String;
use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Instant, Timer};
use embedded_io_async::Write;

use crate::at::{self, response};
use crate::error::{Error, Result};

use super::rx::RxBuffer;

/// Outcome of a single bounded wait
enum Watch {
    Found,
    WindowElapsed,
}

/// Command side of the modem link: transmits commands and matches the text
/// collected by the ingest task against expected responses.
pub struct ModemInterface<'a, W, const N: usize> {
    tx: W,
    rx: &'a RxBuffer<N>,
    sent: usize,
}

impl<'a, W: Write, const N: usize> ModemInterface<'a, W, N> {
    pub fn new(tx: W, rx: &'a RxBuffer<N>) -> Self {
        Self { tx, rx, sent: 0 }
    }

    pub fn rx(&self) -> &'a RxBuffer<N> {
        self.rx
    }

    /// Number of commands transmitted so far
    pub fn commands_sent(&self) -> usize {
        self.sent
    }

    pub fn into_inner(self) -> W {
        self.tx
    }

    /// Check that the transport accepts writes
    pub async fn ready(&mut self) -> Result<()> {
        self.tx.flush().await.map_err(|e| {
            log::error!("Modem UART not ready: {:?}", e);
            Error::DeviceNotReady
        })
    }

    /// Write `cmd` framed by line terminators. Transport errors are logged
    /// and otherwise ignored, the matcher notices a missing response.
    pub async fn send(&mut self, cmd: &str) {
        log::debug!(">>> {}", cmd);
        self.sent += 1;
        for part in [at::LINE_TERMINATOR, cmd.as_bytes(), at::LINE_TERMINATOR] {
            if let Err(e) = self.tx.write_all(part).await {
                log::error!("UART write error: {:?}", e);
                return;
            }
        }
        self.tx
            .flush()
            .await
            .map_err(|e| log::error!("UART flush error: {:?}", e))
            .ok();
    }

    pub fn clear(&self) {
        self.rx.clear();
    }

    pub async fn sleep(&self, duration: Duration) {
        Timer::after(duration).await;
    }

    /// Wait until `found` accepts the buffer contents, for at most `window`.
    ///
    /// Wakes on every append and at the end of the window. Fails with
    /// [`Error::Timeout`] once `deadline` has passed.
    async fn watch(
        &self,
        target: &str,
        found: impl Fn(&[u8]) -> bool,
        window: Duration,
        deadline: Option<Instant>,
    ) -> Result<Watch> {
        let window_end = Instant::now() + window;
        loop {
            if self.rx.with_contents(&found) {
                return Ok(Watch::Found);
            }

            let now = Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                log::warn!("Timed out waiting for {:?}", target);
                return Err(Error::Timeout {
                    target: target.into(),
                });
            }
            if now >= window_end {
                return Ok(Watch::WindowElapsed);
            }

            let wake_at = match deadline {
                Some(deadline) => deadline.min(window_end),
                None => window_end,
            };
            if let Either::Second(()) = select(self.rx.appended(), Timer::at(wake_at)).await {
                log::trace!("Receive buffer: {} bytes", self.rx.len());
            }
        }
    }

    /// Block until `target` appears in the receive buffer.
    ///
    /// Does not clear the buffer first, callers clear before sending the
    /// command whose response they are waiting for.
    pub async fn expect(
        &mut self,
        target: &str,
        poll: Duration,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let found = |buf: &[u8]| response::contains(buf, target);
        loop {
            if let Watch::Found = self.watch(target, found, poll, deadline).await? {
                return Ok(());
            }
        }
    }

    /// Block until a complete line starting with `prefix` has arrived
    pub async fn expect_line(
        &mut self,
        prefix: &str,
        poll: Duration,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let complete = |buf: &[u8]| response::line_after(buf, prefix).is_some();
        loop {
            if let Watch::Found = self.watch(prefix, complete, poll, deadline).await? {
                return Ok(());
            }
        }
    }

    /// Send `probe` every `poll` until `target` shows up
    pub async fn expect_probing(
        &mut self,
        probe: &str,
        target: &str,
        poll: Duration,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let found = |buf: &[u8]| response::contains(buf, target);
        self.clear();
        loop {
            self.send(probe).await;
            if let Watch::Found = self.watch(target, found, poll, deadline).await? {
                return Ok(());
            }
        }
    }

    /// Probe until field `index` of the line after `prefix` differs from
    /// `sentinel`, then return that field.
    ///
    /// The buffer is cleared before every probe, so the returned value and
    /// the buffer contents afterwards belong to the same response.
    pub async fn expect_field(
        &mut self,
        probe: &str,
        prefix: &str,
        index: usize,
        sentinel: &str,
        poll: Duration,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let complete = |buf: &[u8]| response::line_after(buf, prefix).is_some();
        loop {
            let started = Instant::now();
            self.clear();
            self.send(probe).await;

            if let Watch::Found = self.watch(prefix, complete, poll, deadline).await? {
                let value = self.rx.with_contents(|buf| {
                    response::field(buf, prefix, index).map(|f| f.map(String::from))
                })?;
                match value {
                    Some(value) if value != sentinel => return Ok(value),
                    Some(value) => log::info!("{} reported {}, probing again", prefix, value),
                    None => {}
                }
                // keep the probe rate at one per interval
                self.wait_until(started + poll, prefix, deadline).await?;
            }
        }
    }

    async fn wait_until(&self, at: Instant, target: &str, deadline: Option<Instant>) -> Result<()> {
        match deadline {
            Some(deadline) if deadline <= at => {
                Timer::at(deadline).await;
                Err(Error::Timeout {
                    target: target.into(),
                })
            }
            _ => {
                Timer::at(at).await;
                Ok(())
            }
        }
    }

    /// Copy of the buffer contents, invalid UTF-8 replaced
    pub fn contents(&self) -> String {
        self.rx
            .with_contents(|buf| String::from_utf8_lossy(buf).into_owned())
    }
}
