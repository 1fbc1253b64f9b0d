#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_time::{Delay, Duration, Timer};
use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::spi::master::{Config, Spi};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use log::{error, info, warn};
use static_cell::StaticCell;

use hygro_core::app_state::SharedState;
use hygro_core::clock::SyncedClock;
use hygro_core::config::MonitorConfig;
use hygro_core::monitor::Monitor;
use hygro_core::sensors::Dht11;
use hygro_firmware::data_line::{Dht11Line, dht11_line};
use hygro_firmware::sd_store::SdBlobStore;
use hygro_firmware::wall_clock::{CardTimeSource, EmbassyTimer, WALL_CLOCK};

/// SD cards must be initialized at 400 kHz or below
const SD_SPI_KHZ: u32 = 400;

/// How often the main task logs the published snapshot
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(60);

type SdSpiDevice = ExclusiveDevice<Spi<'static, esp_hal::Blocking>, Output<'static>, NoDelay>;

type FirmwareMonitor = Monitor<
    'static,
    Dht11<Dht11Line<'static>, EmbassyTimer, Delay>,
    &'static SyncedClock<EmbassyTimer>,
    SdBlobStore<SdSpiDevice, Delay, CardTimeSource>,
>;

/// Latest reading, today's extremes and the history, for any reader on the device
pub static SHARED_STATE: SharedState = SharedState::new();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[embassy_executor::task]
async fn sensor_task(monitor: &'static mut FirmwareMonitor) -> ! {
    monitor.run(Delay).await
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    let monitor_config = MonitorConfig::default();

    // 1. SD card on SPI2, chip select on GPIO4
    let spi_bus = Spi::new(
        peripherals.SPI2,
        Config::default().with_frequency(Rate::from_khz(SD_SPI_KHZ)),
    )
    .expect("Failed to configure SPI2")
    .with_sck(peripherals.GPIO36)
    .with_mosi(peripherals.GPIO37)
    .with_miso(peripherals.GPIO35);
    let cs = Output::new(peripherals.GPIO4, Level::High, OutputConfig::default());
    let sd_spi =
        ExclusiveDevice::new_no_delay(spi_bus, cs).expect("Failed to claim SD chip select");
    let sd_card = embedded_sdmmc::SdCard::new(sd_spi, Delay);
    let store = SdBlobStore::new(sd_card, CardTimeSource::new(monitor_config.utc_offset_secs));

    // 2. DHT11 on GPIO7
    let sensor = Dht11::new(dht11_line(peripherals.GPIO7), EmbassyTimer, Delay);

    // 3. Pipeline, loaded from the card before the first cycle
    static MONITOR: StaticCell<FirmwareMonitor> = StaticCell::new();
    let monitor = MONITOR.init(Monitor::new(
        monitor_config,
        sensor,
        &WALL_CLOCK,
        store,
        &SHARED_STATE,
    ));
    info!("Persistence: {:?}", monitor.history_store().mode());

    match sensor_task(monitor) {
        Ok(token) => spawner.spawn(token),
        Err(e) => error!("Failed to spawn sensor task: {:?}", e),
    }

    loop {
        Timer::after(STATUS_LOG_INTERVAL).await;

        let snapshot = SHARED_STATE.snapshot();
        if !snapshot.status.clock_valid {
            warn!("Wall clock not synchronized, day rollover paused");
        }
        if let Some(reading) = snapshot.latest {
            info!("{}", reading);
        }
        if let Some(today) = snapshot.today {
            info!("{}", today);
        }
        info!("{}", snapshot.status);
    }
}
