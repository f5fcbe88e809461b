#![no_std]
#![no_main]

use core::cell::RefCell;

use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use embassy_time::{Duration, Instant, Timer};
use esp_backtrace as _;
use esp_hal::{
    analog::adc::{Adc, AdcConfig, AdcPin, Attenuation},
    gpio::{Event, GpioPin, Input, Io, Pull},
    macros::handler,
    peripherals::ADC1,
    timer::timg::TimerGroup,
};
use log::{error, info, warn};
use static_cell::StaticCell;

use vzero::sensors::analog::{AnalogDriver, AnalogInput};
use vzero::sensors::s0::{PulseDriver, PulseLine};
use vzero::storage::MemoryStore;
use vzero::upload::{HttpTransport, TransportError, WifiMode};
use vzero::{Driver, DriverRegistry, GatewayConfig, LinkStatus, SensorError, UploadClient};

/// Run-loop period
const TICK: Duration = Duration::from_millis(10);

/// 12-bit ADC
const ADC_FULL_SCALE: u16 = 4095;

const S0_PIN: u8 = 4;

type Store = MemoryStore<8, 512>;
type Analog = AnalogDriver<AdcInput>;

static S0_LINE: PulseLine = PulseLine::new();
static S0_INPUT: Mutex<CriticalSectionRawMutex, RefCell<Option<Input<'static>>>> =
    Mutex::new(RefCell::new(None));

static STORE: StaticCell<Store> = StaticCell::new();
static CONFIG: StaticCell<GatewayConfig> = StaticCell::new();
static ANALOG: StaticCell<Analog> = StaticCell::new();
static S0: StaticCell<PulseDriver> = StaticCell::new();
static TRANSPORT: StaticCell<Offline> = StaticCell::new();

#[handler]
fn gpio_handler() {
    S0_INPUT.lock(|input| {
        if let Some(input) = input.borrow_mut().as_mut() {
            if input.is_interrupt_set() {
                S0_LINE.on_edge(Instant::now().as_millis() as u32);
                input.clear_interrupt();
            }
        }
    });
}

struct AdcInput {
    adc: Adc<'static, ADC1>,
    pin: AdcPin<GpioPin<2>, ADC1>,
}

impl AnalogInput for AdcInput {
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        nb::block!(self.adc.read_oneshot(&mut self.pin)).map_err(|_| SensorError::CommunicationError)
    }
}

/// Link and transport while no station interface is attached: the gateway
/// only runs its access point, so uploads stay pending.
struct Offline;

impl LinkStatus for Offline {
    fn mode(&self) -> WifiMode {
        WifiMode::AccessPoint
    }

    fn is_associated(&self) -> bool {
        false
    }

    fn free_heap(&self) -> usize {
        usize::MAX
    }
}

impl HttpTransport for Offline {
    fn post(&mut self, _uri: &str) -> Result<u16, TransportError> {
        Err(TransportError::ConnectionFailed)
    }
}

#[esp_hal_embassy::main]
async fn main(_spawner: Spawner) {
    esp_println::logger::init_logger(log::LevelFilter::Info);
    info!("[main] vzero starting");

    let peripherals = esp_hal::init(esp_hal::Config::default());

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_hal_embassy::init(timg0.timer0);

    let mut io = Io::new(peripherals.GPIO, peripherals.IO_MUX);
    io.set_interrupt_handler(gpio_handler);

    let store = STORE.init(Store::new());
    let config = CONFIG.init(GatewayConfig::load(store));
    info!("[main] hostname {}", config.hostname());

    // analog input on GPIO2
    let mut adc_config = AdcConfig::new();
    let pin = adc_config.enable_pin(io.pins.gpio2, Attenuation::Attenuation11dB);
    let adc = Adc::new(peripherals.ADC1, adc_config);
    let analog = ANALOG.init(AnalogDriver::analog(AdcInput { adc, pin }, ADC_FULL_SCALE));
    if let Err(e) = analog.restore_bindings(store) {
        warn!("[main] analog bindings: {}", e);
    }

    // S0 pulse input on GPIO4, active low
    let mut s0_input = Input::new(io.pins.gpio4, Pull::Up);
    s0_input.listen(Event::FallingEdge);
    S0_INPUT.lock(|input| input.replace(Some(s0_input)));

    let s0 = S0.init(PulseDriver::new());
    if let Err(e) = s0.attach(S0_PIN, &S0_LINE) {
        error!("[main] {}", e);
        panic!("pulse input setup failed");
    }
    if let Err(e) = s0.restore_bindings(store) {
        warn!("[main] s0 bindings: {}", e);
    }

    let mut registry = DriverRegistry::new();
    for driver in [analog as &mut dyn Driver, s0 as &mut dyn Driver] {
        if let Err(e) = registry.register(driver) {
            error!("[main] {}", e);
            panic!("driver registration failed");
        }
    }

    let link = Offline;
    let transport = TRANSPORT.init(Offline);
    let mut uploader = UploadClient::new(config.middleware(), transport);

    info!("[main] {} drivers, entering run loop", registry.len());
    loop {
        registry.tick_all(Instant::now(), &link, &mut uploader);
        Timer::after(TICK).await;
    }
}
