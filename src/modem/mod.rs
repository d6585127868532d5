use alloc::{boxed::Box, string::String, vec::Vec};
use embassy_time::Duration;
use embedded_io_async::Write;
use log::info;
use modem_config::{SequenceConfig, TimeoutAction};

use crate::at::{
    self,
    response::{self, HttpStatus, SignalQuality},
};
use crate::error::{Error, Result};

pub mod interface;
pub mod rx;

pub use interface::ModemInterface;
pub use rx::{run_ingestor, RxBuffer};

/// Bring-up lifecycle, in transition order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    #[default]
    Init,
    AwaitingDevice,
    RadioDisabled,
    Configuring,
    RadioEnabled,
    AwaitingReady,
    AwaitingSignal,
    Connecting,
    HttpSetup,
    HttpRequesting,
    Done,
}

impl Phase {
    pub const fn next(self) -> Self {
        match self {
            Phase::Init => Phase::AwaitingDevice,
            Phase::AwaitingDevice => Phase::RadioDisabled,
            Phase::RadioDisabled => Phase::Configuring,
            Phase::Configuring => Phase::RadioEnabled,
            Phase::RadioEnabled => Phase::AwaitingReady,
            Phase::AwaitingReady => Phase::AwaitingSignal,
            Phase::AwaitingSignal => Phase::Connecting,
            Phase::Connecting => Phase::HttpSetup,
            Phase::HttpSetup => Phase::HttpRequesting,
            Phase::HttpRequesting => Phase::Done,
            Phase::Done => Phase::Done,
        }
    }

    /// Phase to re-enter when this one is retried. A wait that only watches
    /// for an unsolicited message goes back to the command that causes it,
    /// a failed request reconnects since it always closes the session.
    pub const fn retry_from(self) -> Self {
        match self {
            Phase::AwaitingReady => Phase::RadioEnabled,
            Phase::HttpRequesting => Phase::HttpSetup,
            phase => phase,
        }
    }

    pub const fn is_done(self) -> bool {
        matches!(self, Phase::Done)
    }
}

/// What a finished run learned from the modem
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub signal: Option<SignalQuality>,
    pub http: Option<HttpStatus>,
    /// Body slice returned by `AT+SHREAD`
    pub body: String,
    /// Phases given up on under [`TimeoutAction::Skip`]
    pub skipped: Vec<Phase>,
    pub commands_sent: usize,
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Drives the modem through every [`Phase`] once.
pub struct Sequencer<'a, W, const N: usize> {
    int: ModemInterface<'a, W, N>,
    config: &'a SequenceConfig,
    phase: Phase,
    retries: u8,
    /// Phase the current retry count belongs to
    retrying: Phase,
    report: Report,
}

impl<'a, W: Write, const N: usize> Sequencer<'a, W, N> {
    pub fn new(int: ModemInterface<'a, W, N>, config: &'a SequenceConfig) -> Self {
        Self {
            int,
            config,
            phase: Phase::default(),
            retries: 0,
            retrying: Phase::default(),
            report: Report::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn interface(&self) -> &ModemInterface<'a, W, N> {
        &self.int
    }

    /// Run until [`Phase::Done`] or until the failure policy aborts
    pub async fn run(mut self) -> Result<Report> {
        while !self.phase.is_done() {
            self.step().await?;
        }
        self.report.commands_sent = self.int.commands_sent();
        info!("Modem sequence finished");
        Ok(self.report)
    }

    /// Execute the current phase and move to the phase chosen by the outcome.
    /// Returns the new current phase.
    pub async fn step(&mut self) -> Result<Phase> {
        let phase = self.phase;
        match self.enter(phase).await {
            Ok(()) => self.advance(),
            Err(e) if e.is_recoverable() => {
                log::debug!("Receive buffer: {:?}", self.int.contents());
                let config = self.config;
                let recovery = &config.recovery;
                match recovery.on_timeout {
                    TimeoutAction::Retry if self.retries < recovery.max_retries => {
                        self.retries += 1;
                        self.retrying = phase;
                        self.phase = phase.retry_from();
                        log::warn!(
                            "{:?} failed: {}, retry {}/{}",
                            phase,
                            e,
                            self.retries,
                            recovery.max_retries
                        );
                    }
                    TimeoutAction::Skip => {
                        log::warn!("{:?} failed: {}, skipping", phase, e);
                        self.report.skipped.push(phase);
                        self.advance();
                    }
                    _ => {
                        log::error!("{:?} failed: {}, aborting", phase, e);
                        return Err(Error::Aborted {
                            phase,
                            cause: Box::new(e),
                        });
                    }
                }
            }
            Err(e) => {
                log::error!("{:?} failed: {}", phase, e);
                return Err(e);
            }
        }
        Ok(self.phase)
    }

    fn advance(&mut self) {
        // phases re-entered on the way back to a retried one keep its count
        if self.phase >= self.retrying {
            self.retries = 0;
        }
        self.phase = self.phase.next();
        info!("Modem phase: {:?}", self.phase);
    }

    async fn enter(&mut self, phase: Phase) -> Result<()> {
        let config = self.config;
        let timings = &config.timings;
        let timeouts = &config.timeouts;

        match phase {
            Phase::Init => {
                self.int.ready().await?;
                self.int.clear();
            }
            Phase::AwaitingDevice => {
                self.int
                    .expect_probing(
                        at::AT,
                        at::OK,
                        ms(timings.probe_interval_ms),
                        timeouts.device_ms.map(ms),
                    )
                    .await?;
                self.int.sleep(ms(timings.after_probe_ms)).await;
            }
            Phase::RadioDisabled => {
                self.int.send(at::RADIO_OFF).await;
                self.int.sleep(ms(timings.radio_off_ms)).await;
            }
            Phase::Configuring => {
                self.send_all(&config.commands.bring_up, ms(timings.bring_up_step_ms))
                    .await;
            }
            Phase::RadioEnabled => {
                self.int.clear();
                self.int.send(at::RADIO_ON).await;
            }
            Phase::AwaitingReady => {
                self.int
                    .expect(
                        at::SMS_READY,
                        ms(timings.ready_poll_ms),
                        timeouts.ready_ms.map(ms),
                    )
                    .await?;
                self.int.sleep(ms(timings.after_ready_ms)).await;
            }
            Phase::AwaitingSignal => {
                let rssi = self
                    .int
                    .expect_field(
                        at::SIGNAL_QUALITY,
                        at::SIGNAL_QUALITY_PREFIX,
                        0,
                        at::UNKNOWN_SIGNAL,
                        ms(timings.signal_poll_ms),
                        timeouts.signal_ms.map(ms),
                    )
                    .await?;
                let signal = self.int.rx().with_contents(SignalQuality::parse)?;
                match signal.and_then(|s| s.dbm()) {
                    Some(dbm) => info!("Signal acquired: rssi {} ({} dBm)", rssi, dbm),
                    None => info!("Signal acquired: rssi {}", rssi),
                }
                self.report.signal = signal;
            }
            Phase::Connecting => {
                self.send_all(&config.commands.connect, ms(timings.connect_step_ms))
                    .await;
            }
            Phase::HttpSetup => {
                self.send_all(&config.commands.http_setup, ms(timings.connect_step_ms))
                    .await;
                self.int.clear();
                self.int.send(at::HTTP_CONNECT).await;
                self.int
                    .expect(at::OK, ms(timings.ok_poll_ms), timeouts.connect_ms.map(ms))
                    .await?;
            }
            Phase::HttpRequesting => self.request().await?,
            Phase::Done => {}
        }
        Ok(())
    }

    /// Each command followed by a fixed delay, responses are not checked
    async fn send_all(&mut self, commands: &[String], step: Duration) {
        for cmd in commands {
            self.int.send(cmd).await;
            self.int.sleep(step).await;
        }
    }

    /// Request and read back, then close the session whatever the outcome
    async fn request(&mut self) -> Result<()> {
        let result = self.exchange().await;
        self.int.send(at::HTTP_DISCONNECT).await;
        result
    }

    async fn exchange(&mut self) -> Result<()> {
        let config = self.config;
        let http = &config.http;
        let timings = &config.timings;
        let max_read = usize::try_from(http.read_len).unwrap_or(usize::MAX);

        self.int.clear();
        self.int.send(&at::http_request(&http.path, http.method)).await;
        self.int
            .expect_line(
                at::HTTP_REQUEST_PREFIX,
                ms(timings.request_poll_ms),
                config.timeouts.request_ms.map(ms),
            )
            .await?;
        info!("HTTP request finished");

        let status = self.int.rx().with_contents(HttpStatus::parse)?;
        let read_len = match &status {
            Some(status) => {
                if status.is_success() {
                    info!(
                        "HTTP {} {}, {} bytes",
                        status.method, status.status, status.length
                    );
                } else {
                    log::warn!("HTTP {} returned status {}", status.method, status.status);
                }
                status.length.min(max_read)
            }
            None => max_read,
        };
        self.report.http = status;

        if read_len > 0 {
            self.int.clear();
            self.int.send(&at::http_read(0, read_len)).await;
            self.int.sleep(ms(timings.read_settle_ms)).await;
            let body = self.int.rx().with_contents(|buf| {
                response::read_payload(buf)
                    .map(|payload| payload.map(|p| String::from_utf8_lossy(p).into_owned()))
            })?;
            match body {
                Some(body) => self.report.body = body,
                None => log::warn!("No {} payload received", at::HTTP_READ_PREFIX),
            }
        }
        Ok(())
    }
}
