//! Simulated modem shared by the integration tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use embassy_time::{Duration, Timer};
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use simhttp::config::{
    CommandTable, HttpRequest, Recovery, SequenceConfig, TimeoutAction, Timeouts, Timings,
};
use simhttp::modem::RxBuffer;

pub const RX_SIZE: usize = 256;

pub const OK: &str = "\r\nOK\r\n";

/// Answers command lines by injecting scripted text into the receive
/// buffer, the way the UART ingest task would.
pub struct ModemSim<'a> {
    rx: &'a RxBuffer<RX_SIZE>,
    line: Vec<u8>,
    sent: Rc<RefCell<Vec<String>>>,
    script: HashMap<String, VecDeque<&'static str>>,
    broken: bool,
}

impl<'a> ModemSim<'a> {
    pub fn new(rx: &'a RxBuffer<RX_SIZE>) -> Self {
        Self {
            rx,
            line: Vec::new(),
            sent: Default::default(),
            script: HashMap::new(),
            broken: false,
        }
    }

    /// Modem that answers the whole bring-up sequence successfully
    pub fn cooperative(rx: &'a RxBuffer<RX_SIZE>) -> Self {
        Self::new(rx)
            .reply("AT+CFUN=1", &["\r\nOK\r\n\r\n+CPIN: READY\r\n\r\nSMS Ready\r\n"])
            .reply(
                "AT+CSQ",
                &["\r\n+CSQ: 99,99\r\n\r\nOK\r\n", "\r\n+CSQ: 15,99\r\n\r\nOK\r\n"],
            )
            .reply(
                "AT+SHREQ=\"/\",1",
                &["\r\nOK\r\n\r\n+SHREQ: \"GET\",200,387\r\n"],
            )
            .reply("AT+SHREAD=0,7", &["\r\nOK\r\n\r\n+SHREAD: 7\r\n<html>\n"])
    }

    /// Transport that rejects every write
    pub fn broken(rx: &'a RxBuffer<RX_SIZE>) -> Self {
        Self {
            broken: true,
            ..Self::new(rx)
        }
    }

    /// Answers for `cmd`, used in order. The last one repeats. Commands
    /// without a script are answered with `OK`.
    pub fn reply(mut self, cmd: &str, replies: &[&'static str]) -> Self {
        self.script
            .insert(cmd.to_string(), replies.iter().copied().collect());
        self
    }

    /// Handle to the commands received so far
    pub fn sent(&self) -> Rc<RefCell<Vec<String>>> {
        self.sent.clone()
    }

    fn finish_line(&mut self) {
        if self.line.is_empty() {
            return;
        }
        let cmd = String::from_utf8(std::mem::take(&mut self.line)).unwrap();
        let reply = match self.script.get_mut(&cmd) {
            Some(replies) if replies.len() > 1 => replies.pop_front().unwrap(),
            Some(replies) => replies.front().copied().unwrap_or(""),
            None => OK,
        };
        self.sent.borrow_mut().push(cmd);
        self.rx.ingest(reply.as_bytes());
    }
}

impl ErrorType for ModemSim<'_> {
    type Error = ErrorKind;
}

impl Write for ModemSim<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.broken {
            return Err(ErrorKind::NotConnected);
        }
        for &b in buf {
            match b {
                b'\n' => self.finish_line(),
                b'\r' => {}
                b => self.line.push(b),
            }
        }
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        if self.broken {
            return Err(ErrorKind::NotConnected);
        }
        Ok(())
    }
}

/// UART stand-in delivering chunks after a delay each
pub struct DelayedReader {
    chunks: VecDeque<(Duration, &'static [u8])>,
}

impl DelayedReader {
    pub fn new(chunks: &[(u64, &'static [u8])]) -> Self {
        Self {
            chunks: chunks
                .iter()
                .map(|&(delay, chunk)| (Duration::from_millis(delay), chunk))
                .collect(),
        }
    }
}

impl ErrorType for DelayedReader {
    type Error = ErrorKind;
}

impl Read for DelayedReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let Some((delay, chunk)) = self.chunks.pop_front() else {
            return Ok(0);
        };
        Timer::after(delay).await;
        let len = chunk.len().min(buf.len());
        buf[..len].copy_from_slice(&chunk[..len]);
        Ok(len)
    }
}

/// Small command lists and millisecond timings
pub fn fast_config() -> SequenceConfig {
    SequenceConfig {
        commands: CommandTable {
            bring_up: vec![
                "ATE0".into(),
                "AT+CMEE=2".into(),
                "AT+CGDCONT=1,\"IP\",\"iot\"".into(),
            ],
            connect: vec![
                "AT+CNACT=0,1".into(),
                "AT+CNACT?".into(),
                "AT+CNACT?".into(),
            ],
            http_setup: vec!["AT+SHCONF=\"URL\",https://example.com".into()],
        },
        timings: Timings {
            probe_interval_ms: 10,
            after_probe_ms: 1,
            radio_off_ms: 1,
            bring_up_step_ms: 1,
            ready_poll_ms: 5,
            after_ready_ms: 1,
            signal_poll_ms: 20,
            connect_step_ms: 1,
            ok_poll_ms: 5,
            request_poll_ms: 5,
            read_settle_ms: 5,
        },
        timeouts: Timeouts {
            device_ms: Some(2_000),
            ready_ms: Some(2_000),
            signal_ms: Some(2_000),
            connect_ms: Some(2_000),
            request_ms: Some(2_000),
        },
        recovery: Recovery {
            on_timeout: TimeoutAction::Abort,
            max_retries: 0,
        },
        http: HttpRequest {
            path: "/".into(),
            method: 1,
            read_len: 7,
        },
    }
}
