#![no_std]
#![no_main]
#![feature(type_alias_impl_trait)]
#![feature(impl_trait_in_assoc_type)]
#![feature(const_int_from_str)]

use anyhow::anyhow;
use embassy_executor::{task, Spawner};
use embassy_time::{Duration, Timer};
use esp_backtrace as _;
use esp_hal::{
    gpio::{Io, Level, Output},
    peripherals::{UART0, UART2},
    uart::{self, UartRx, UartTx},
    Async,
};
use esp_hal_embassy::main;
use log::info;
pub use simhttp as lib;

use lib::modem::{ModemInterface, RxBuffer, Sequencer};

extern crate alloc;

const MODEM_BAUD: u32 = match u32::from_str_radix(env!("MODEM_BAUD"), 10) {
    Ok(b) => b,
    Err(_) => panic!("Invalid MODEM_BAUD"),
};
const RX_BUFFER_SIZE: usize = match usize::from_str_radix(env!("RX_BUFFER_SIZE"), 10) {
    Ok(s) => s,
    Err(_) => panic!("Invalid RX_BUFFER_SIZE"),
};
const HEAP_SIZE: usize = 32 * 1024;
const IDLE_INTERVAL: Duration = Duration::from_secs(60);

static RX_BUFFER: RxBuffer<RX_BUFFER_SIZE> = RxBuffer::new();

type ModemTx = UartTx<'static, UART2, Async>;

#[export_name = "custom_halt"]
pub fn custom_halt() -> ! {
    loop {
        esp_hal::reset::software_reset();
    }
}

#[main]
async fn main_task(spawner: Spawner) {
    let peripherals = esp_hal::init(esp_hal::Config::default());
    let timg0 = esp_hal::timer::timg::TimerGroup::new(peripherals.TIMG0);
    esp_hal_embassy::init(timg0.timer0);

    esp_alloc::heap_allocator!(HEAP_SIZE);

    esp_println::logger::init_logger(log::LevelFilter::Debug);
    info!("--- SIM7070G HTTP ---");

    let io = Io::new(peripherals.GPIO, peripherals.IO_MUX);

    let mut modem_pwrkey = Output::new(io.pins.gpio4, Level::Low);
    let mut modem_power_on = Output::new(io.pins.gpio25, Level::Low);

    let modem_uart = esp_hal::uart::Uart::new_async_with_config(
        peripherals.UART2,
        uart::config::Config {
            baudrate: MODEM_BAUD,
            data_bits: uart::config::DataBits::DataBits8,
            parity: uart::config::Parity::ParityNone,
            stop_bits: uart::config::StopBits::STOP1,
            ..Default::default()
        },
        io.pins.gpio26,
        io.pins.gpio27,
    );
    let (modem_rx, modem_tx) = match modem_uart {
        Ok(uart) => uart.split(),
        Err(e) => {
            log::error!("{}: {:?}", lib::Error::DeviceNotReady, e);
            return;
        }
    };

    let usb_uart = esp_hal::uart::Uart::new_async_with_config(
        peripherals.UART0,
        uart::config::Config {
            baudrate: 115200,
            data_bits: uart::config::DataBits::DataBits8,
            parity: uart::config::Parity::ParityNone,
            stop_bits: uart::config::StopBits::STOP1,
            ..Default::default()
        },
        io.pins.gpio3,
        io.pins.gpio1,
    );
    let (_usb_rx, usb_tx) = match usb_uart {
        Ok(uart) => uart.split(),
        Err(e) => {
            log::error!("Failed to initialize USB UART: {:?}", e);
            return;
        }
    };

    info!("Powering on modem...");
    modem_power_on.set_low();
    Timer::after(Duration::from_millis(100)).await;

    modem_power_on.set_high();
    modem_pwrkey.set_high();
    Timer::after(Duration::from_millis(100)).await;
    modem_pwrkey.set_low();
    Timer::after(Duration::from_millis(1_000)).await;
    modem_pwrkey.set_high();

    if let Err(e) = start(&spawner, modem_rx, usb_tx, modem_tx).await {
        log::error!("Modem sequence failed: {:?}", e);
    }

    loop {
        Timer::after(IDLE_INTERVAL).await;
    }
}

async fn start(
    spawner: &Spawner,
    modem_rx: UartRx<'static, UART2, Async>,
    usb_tx: UartTx<'static, UART0, Async>,
    modem_tx: ModemTx,
) -> anyhow::Result<()> {
    spawner
        .spawn(modem_ingest_task(modem_rx, usb_tx))
        .map_err(|e| anyhow!("Failed to spawn ingest task: {e:?}"))?;

    let interface = ModemInterface::new(modem_tx, &RX_BUFFER);
    let report = Sequencer::new(interface, lib::config::sequence())
        .run()
        .await
        .map_err(|e| anyhow!("{e}"))?;

    if let Some(signal) = report.signal {
        info!("Signal: rssi {}, ber {}", signal.rssi, signal.ber);
    }
    match report.http {
        Some(status) => info!("HTTP status {}, {} bytes", status.status, status.length),
        None => log::warn!("No HTTP status received"),
    }
    info!("Response: {:?}", report.body);
    info!(
        "{} commands sent, {} bytes dropped",
        report.commands_sent,
        RX_BUFFER.dropped()
    );
    Ok(())
}

#[task]
async fn modem_ingest_task(
    mut modem_rx: UartRx<'static, UART2, Async>,
    mut usb_tx: UartTx<'static, UART0, Async>,
) {
    lib::modem::run_ingestor(&mut modem_rx, &RX_BUFFER, &mut usb_tx).await;
}
