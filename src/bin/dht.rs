use clap::Parser;
use std::process::ExitCode;
use weather_sensors::cli::{self, CommonArgs};
use weather_sensors::dhtxx::{Dht, Options, Variant, DEFAULT_BIT_THRESHOLD};
use weather_sensors::line_protocol::{Point, Precision, HOST_TAG, PIN_TAG, SENSOR_TAG};
use weather_sensors::linux::{RpiPin, SpinDelay};
use weather_sensors::retry::ExhaustionPolicy;

/// Reads a DHT11 or DHT22 once and prints the result as InfluxDB line protocol.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// BCM GPIO number of the data line
    #[arg(long)]
    dhtpin: u8,

    /// Sensor model: dht11 or dht22
    #[arg(long)]
    sensor: Variant,

    /// Print the reading even if it is outside the sensor's rated range
    #[arg(long)]
    no_range_check: bool,

    /// Report a failed read on stderr and exit with status 1 instead of printing nothing
    #[arg(long)]
    fail_on_exhaustion: bool,

    /// High pulse length in polling ticks above which a bit reads as 1
    #[arg(long, default_value_t = DEFAULT_BIT_THRESHOLD)]
    bit_threshold: u8,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> ExitCode {
    let args: Args = cli::parse_args();
    cli::init_logging();

    let pin = match RpiPin::new(args.dhtpin) {
        Ok(pin) => pin,
        Err(err) => return cli::fail(format_args!("cannot open GPIO {}: {}", args.dhtpin, err)),
    };
    let options = Options {
        bit_threshold: args.bit_threshold,
        validate_range: !args.no_range_check,
    };
    let mut dht = match Dht::new(pin, args.sensor, Some(options)) {
        Ok(dht) => dht,
        Err(err) => return cli::fail(format_args!("cannot drive GPIO {}: {}", args.dhtpin, err)),
    };

    let exhaustion = ExhaustionPolicy::from_fail_flag(args.fail_on_exhaustion);
    match dht.read(&mut SpinDelay, &args.common.retry_policy()) {
        Ok(response) => {
            let point = Point::new(&args.common.measurement)
                .tag(HOST_TAG, cli::hostname())
                .tag(PIN_TAG, args.dhtpin)
                .tag(SENSOR_TAG, args.sensor)
                .reading(&response, Precision::Decimals(1));
            cli::emit(&point);
            ExitCode::SUCCESS
        }
        Err(exhausted) => cli::exhausted(args.sensor.name(), &exhausted, exhaustion),
    }
}
