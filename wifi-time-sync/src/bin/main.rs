// Joins a Wi-Fi network, sets the clock from NTP and serves the local time
// (Central European Time) on port 80. The onboard LED blinks a heartbeat.
//
// Build with the credentials in the environment:
//   SSID=my-network PASSWORD=secret cargo run --release -p wifi-time-sync
//
// Pin map:
//   GPIO8 -> onboard LED (active low)

#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use core::cell::Cell;
use core::fmt::Write as _;

use defmt::{error, info, warn};
use embassy_executor::Spawner;
use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{DhcpConfig, Runner, Stack, StackResources};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{with_timeout, Duration, Instant, Timer};
use embedded_io_async::Write as _;
use esp32_peripherals::clock::WallClock;
use esp32_peripherals::gpio::Led;
use esp32_peripherals::http::{self, IndexPage, Route, HTTP_PORT};
use esp32_peripherals::ntp::{self, NtpTime, MAX_ATTEMPTS, NTP_PORT, NTP_SERVER, PACKET_LEN, RETRY_DELAY_MS};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use esp_println::println;
use esp_wifi::wifi::{self, WifiController, WifiDevice, WifiEvent, WifiState};
use esp_wifi::EspWifiController;
use heapless::String;
use {esp_backtrace as _, esp_println as _};

extern crate alloc;

macro_rules! mk_static {
    ($t:ty,$val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write(($val));
        x
    }};
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

const SSID: &str = match option_env!("SSID") {
    Some(ssid) => ssid,
    None => "your-ssid",
};
const PASSWORD: &str = match option_env!("PASSWORD") {
    Some(password) => password,
    None => "your-password",
};

const NTP_LOCAL_PORT: u16 = 50_123;
const NTP_REPLY_TIMEOUT: Duration = Duration::from_secs(2);
const LOG_PERIOD: Duration = Duration::from_secs(5);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

const HEARTBEAT_ON: Duration = Duration::from_millis(100);
const HEARTBEAT_OFF: Duration = Duration::from_millis(900);

const HTTP_BUFFER: usize = 1024;

static CONTROLLER: Mutex<CriticalSectionRawMutex, Option<WifiController<'static>>> =
    Mutex::new(None);
static CLOCK: BlockingMutex<CriticalSectionRawMutex, Cell<WallClock>> =
    BlockingMutex::new(Cell::new(WallClock::new()));

fn uptime_ms() -> u64 {
    Instant::now().as_millis()
}

/// Current local time as `Monday, January 01, 2024 13:05:09`.
fn local_time_text() -> String<48> {
    let clock = CLOCK.lock(|c| c.get());
    let mut text = String::new();
    match clock.local_time(uptime_ms()) {
        Some(local) => {
            let _ = write!(text, "{}", local.long());
        }
        None => {
            let _ = text.push_str("unknown");
        }
    }
    text
}

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(size: 72 * 1024);

    let timer0 = TimerGroup::new(peripherals.TIMG1);
    esp_hal_embassy::init(timer0.timer0);
    info!("Embassy initialized!");

    let led = Led::active_low(Output::new(peripherals.GPIO8, Level::High, OutputConfig::default()));
    spawner.spawn(heartbeat(led)).unwrap();

    let timer1 = TimerGroup::new(peripherals.TIMG0);
    let mut rng = Rng::new(peripherals.RNG);
    let esp_wifi_ctrl = &*mk_static!(
        EspWifiController<'static>,
        esp_wifi::init(timer1.timer0, rng).expect("radio initialization")
    );

    let (controller, interfaces) =
        esp_wifi::wifi::new(esp_wifi_ctrl, peripherals.WIFI).expect("Wi-Fi driver");
    CONTROLLER.lock().await.replace(controller);

    let net_seed = u64::from(rng.random()) | (u64::from(rng.random()) << 32);
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(DhcpConfig::default()),
        mk_static!(StackResources<5>, StackResources::<5>::new()),
        net_seed,
    );

    spawner.spawn(connection()).unwrap();
    spawner.spawn(net_task(runner)).unwrap();

    wait_for_connection(stack).await;

    match sync_time(stack).await {
        Some(time) => {
            CLOCK.lock(|c| {
                let mut clock = c.get();
                clock.sync(time.unix_millis(), uptime_ms());
                c.set(clock);
            });
            info!("Clock set from NTP: {} s since epoch", time.unix_secs);
        }
        None => error!("NTP sync failed after {} attempts, clock not set", MAX_ATTEMPTS),
    }

    spawner.spawn(http_server(stack)).unwrap();
    info!("Web server listening on port {}", HTTP_PORT);

    loop {
        let clock = CLOCK.lock(|c| c.get());
        match clock.local_time(uptime_ms()) {
            Some(local) => println!("Current time: {} {}", local.ctime(), local.zone()),
            None => warn!("Clock out of range"),
        }
        Timer::after(LOG_PERIOD).await;
    }
}

async fn wait_for_connection(stack: Stack<'_>) {
    info!("Waiting for link to be up");
    loop {
        if stack.is_link_up() {
            break;
        }
        Timer::after(Duration::from_millis(500)).await;
    }

    info!("Waiting to get IP address...");
    loop {
        if let Some(config) = stack.config_v4() {
            println!("Got IP: {}", config.address);
            break;
        }
        Timer::after(Duration::from_millis(500)).await;
    }
}

/// Queries the NTP pool, retrying a fixed number of times.
async fn sync_time(stack: Stack<'_>) -> Option<NtpTime> {
    let mut rx_meta = [PacketMetadata::EMPTY; 2];
    let mut rx_buffer = [0u8; 128];
    let mut tx_meta = [PacketMetadata::EMPTY; 2];
    let mut tx_buffer = [0u8; 128];
    let mut socket = UdpSocket::new(stack, &mut rx_meta, &mut rx_buffer, &mut tx_meta, &mut tx_buffer);
    if let Err(e) = socket.bind(NTP_LOCAL_PORT) {
        error!("NTP socket bind failed: {}", e);
        return None;
    }

    for attempt in 1..=MAX_ATTEMPTS {
        info!("Waiting for system time to be set... ({}/{})", attempt, MAX_ATTEMPTS);
        match query_ntp(stack, &mut socket).await {
            Ok(time) => return Some(time),
            Err(reason) => warn!("NTP attempt {} failed: {}", attempt, reason),
        }
        Timer::after(Duration::from_millis(RETRY_DELAY_MS)).await;
    }
    None
}

async fn query_ntp(stack: Stack<'_>, socket: &mut UdpSocket<'_>) -> Result<NtpTime, &'static str> {
    let addrs = stack
        .dns_query(NTP_SERVER, DnsQueryType::A)
        .await
        .map_err(|_| "DNS lookup failed")?;
    let server = *addrs.first().ok_or("no address for NTP server")?;

    socket
        .send_to(&ntp::request(), (server, NTP_PORT))
        .await
        .map_err(|_| "send failed")?;

    let mut reply = [0u8; PACKET_LEN];
    let (len, _) = with_timeout(NTP_REPLY_TIMEOUT, socket.recv_from(&mut reply))
        .await
        .map_err(|_| "no reply")?
        .map_err(|_| "receive failed")?;

    ntp::parse_response(&reply[..len]).map_err(|e| match e {
        ntp::NtpError::KissOfDeath => "server sent kiss-of-death",
        ntp::NtpError::Unsynchronized => "server unsynchronized",
        _ => "malformed reply",
    })
}

#[embassy_executor::task]
async fn heartbeat(mut led: Led<Output<'static>>) {
    loop {
        let Ok(()) = led.on();
        Timer::after(HEARTBEAT_ON).await;
        let Ok(()) = led.off();
        Timer::after(HEARTBEAT_OFF).await;
    }
}

#[embassy_executor::task]
async fn http_server(stack: Stack<'static>) {
    let mut rx_buffer = [0u8; HTTP_BUFFER];
    let mut tx_buffer = [0u8; HTTP_BUFFER];
    let mut request = [0u8; 512];

    loop {
        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(10)));

        if let Err(e) = socket.accept(HTTP_PORT).await {
            warn!("Accept failed: {}", e);
            continue;
        }

        let mut len = 0;
        // Read until the end of the request head or until the buffer is full.
        while len < request.len() {
            match socket.read(&mut request[len..]).await {
                Ok(0) => break,
                Ok(n) => {
                    len += n;
                    if request[..len].windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Read failed: {}", e);
                    break;
                }
            }
        }

        let route = http::route(&request[..len]);
        let page = IndexPage {
            time: local_time_text(),
            wifi_connected: stack.is_config_up(),
        };
        let mut response: String<HTTP_BUFFER> = String::new();
        if http::write_response(&mut response, route, &page).is_err() {
            error!("Response does not fit in {} bytes", HTTP_BUFFER);
            response.clear();
            let _ = http::write_response(&mut response, Route::NotFound, &"");
        }
        info!("HTTP {} -> {}", route, route.status().0);

        if let Err(e) = socket.write_all(response.as_bytes()).await {
            warn!("Write failed: {}", e);
        }
        let _ = socket.flush().await;
        socket.close();
        Timer::after(Duration::from_millis(100)).await;
        socket.abort();
    }
}

#[embassy_executor::task]
async fn connection() {
    info!("start connection task");
    let mut controller_guard = CONTROLLER.lock().await;
    let Some(controller) = controller_guard.as_mut() else {
        error!("Wi-Fi controller missing");
        return;
    };

    loop {
        if matches!(esp_wifi::wifi::wifi_state(), WifiState::StaConnected) {
            controller.wait_for_event(WifiEvent::StaDisconnected).await;
            warn!("Wi-Fi disconnected");
            Timer::after(RECONNECT_DELAY).await;
        }

        if !matches!(controller.is_started(), Ok(true)) {
            let client_config = wifi::Configuration::Client(wifi::ClientConfiguration {
                ssid: SSID.into(),
                password: PASSWORD.into(),
                ..Default::default()
            });
            if let Err(e) = controller.set_configuration(&client_config) {
                error!("Invalid Wi-Fi configuration: {}", e);
                Timer::after(RECONNECT_DELAY).await;
                continue;
            }
            info!("Starting wifi");
            if let Err(e) = controller.start_async().await {
                warn!("Failed to start wifi: {}", e);
                Timer::after(RECONNECT_DELAY).await;
                continue;
            }
            info!("Wifi started!");
        }

        info!("About to connect to {}...", SSID);
        match controller.connect_async().await {
            Ok(()) => info!("Wifi connected!"),
            Err(e) => {
                warn!("Failed to connect to wifi: {}", e);
                Timer::after(RECONNECT_DELAY).await;
            }
        }
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}
