use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use weather_sensors::cli::{self, CommonArgs};
use weather_sensors::ds18b20::{self, Ds18b20, DEFAULT_W1_ROOT};
use weather_sensors::line_protocol::{Point, Precision, HOST_TAG, PIN_TAG, SENSOR_TAG};
use weather_sensors::linux::Delay;
use weather_sensors::retry::ExhaustionPolicy;

const SENSOR_NAME: &str = "ds18b20";

const MODULE_HELP: &str = "\
Make sure the following modules are loaded:
  sudo modprobe w1-gpio
  sudo modprobe w1-therm
For Raspberry Pi you can add dtoverlay=w1-gpio,gpiopin=<gpio_pin> in config.txt";

/// Reads a DS18B20 through the kernel's w1-therm driver and prints the result as InfluxDB line
/// protocol.
#[derive(Parser, Debug)]
#[command(version, about, after_help = MODULE_HELP)]
struct Args {
    /// GPIO pin the w1 bus is on, written to the pinnum tag
    #[arg(long)]
    pin: u8,

    /// Specific sensor to read, e.g. 28-0123456789ab [default: first sensor found]
    #[arg(long)]
    serial: Option<String>,

    /// Directory the kernel lists w1 devices in
    #[arg(long, default_value = DEFAULT_W1_ROOT)]
    w1_root: PathBuf,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> ExitCode {
    let args: Args = cli::parse_args();
    cli::init_logging();

    let sensor = match Ds18b20::locate(&args.w1_root, args.serial.as_deref()) {
        Ok(sensor) => sensor,
        Err(err @ ds18b20::Error::BusUnavailable { .. }) => {
            return cli::fail(format_args!(
                "{}. Load the w1 modules: sudo modprobe w1-gpio && sudo modprobe w1-therm",
                err
            ))
        }
        Err(err) => {
            return cli::fail(format_args!(
                "{}. Make sure the sensor is connected and kernel modules are loaded.",
                err
            ))
        }
    };

    match sensor.read(&mut Delay, &args.common.retry_policy()) {
        Ok(temperature) => {
            let point = Point::new(&args.common.measurement)
                .tag(HOST_TAG, cli::hostname())
                .tag(PIN_TAG, args.pin)
                .tag(SENSOR_TAG, SENSOR_NAME)
                .reading(&temperature, Precision::Decimals(1));
            cli::emit(&point);
            ExitCode::SUCCESS
        }
        Err(exhausted) => cli::exhausted(SENSOR_NAME, &exhausted, ExhaustionPolicy::Report),
    }
}
