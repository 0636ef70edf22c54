use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use weather_sensors::aht20::{self, Aht20, CalibrationCheck};
use weather_sensors::bmp280::{self, Bmp280};
use weather_sensors::cli::{self, CommonArgs};
use weather_sensors::line_protocol::{Point, Precision, HOST_TAG, SENSOR_TAG};
use weather_sensors::linux::{Delay, I2cdev};
use weather_sensors::reading::Measurement;
use weather_sensors::retry::{ExhaustionPolicy, RetryPolicy};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Sensor {
    Bmp280,
    Aht20,
}

impl Sensor {
    fn name(self) -> &'static str {
        match self {
            Sensor::Bmp280 => "bmp280",
            Sensor::Aht20 => "aht20",
        }
    }
}

/// Reads an AHT20 or BMP280 once over I2C and prints the result as InfluxDB line protocol.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[arg(long, value_enum)]
    sensor: Sensor,

    /// I2C bus device
    #[arg(long, default_value = "/dev/i2c-1")]
    bus: PathBuf,

    /// Device address, hex or decimal [default: 0x38 for aht20, 0x77 for bmp280]
    #[arg(long, value_parser = cli::parse_address)]
    address: Option<u8>,

    /// Fail the read if the AHT20 reports it is not calibrated
    #[arg(long)]
    require_calibration: bool,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> ExitCode {
    let args: Args = cli::parse_args();
    cli::init_logging();

    let i2c = match I2cdev::new(&args.bus) {
        Ok(i2c) => i2c,
        Err(err) => return cli::fail(format_args!("cannot open {}: {}", args.bus.display(), err)),
    };
    let policy = args.common.retry_policy();
    match args.sensor {
        Sensor::Aht20 => read_aht20(&args, i2c, &policy),
        Sensor::Bmp280 => read_bmp280(&args, i2c, &policy),
    }
}

fn read_aht20(args: &Args, i2c: I2cdev, policy: &RetryPolicy) -> ExitCode {
    let options = aht20::Options {
        address: args.address.unwrap_or(aht20::DEFAULT_ADDRESS),
        calibration_check: if args.require_calibration {
            CalibrationCheck::Require
        } else {
            CalibrationCheck::Warn
        },
    };
    let mut sensor = Aht20::new(i2c, Some(options));
    let mut delay = Delay;
    if let Err(err) = sensor.reinit(&mut delay) {
        return cli::fail(format_args!("AHT20 initialization failed: {}", err));
    }

    match sensor.read(&mut delay, policy) {
        Ok(response) => {
            let point = Point::new(&args.common.measurement)
                .tag(HOST_TAG, cli::hostname())
                .tag(SENSOR_TAG, Sensor::Aht20.name())
                .reading(&response, Precision::Decimals(2));
            cli::emit(&point);
            ExitCode::SUCCESS
        }
        Err(exhausted) => {
            cli::exhausted(Sensor::Aht20.name(), &exhausted, ExhaustionPolicy::Report)
        }
    }
}

fn read_bmp280(args: &Args, i2c: I2cdev, policy: &RetryPolicy) -> ExitCode {
    let mut sensor = Bmp280::new(i2c, args.address.unwrap_or(bmp280::DEFAULT_ADDRESS));
    let mut delay = Delay;
    let calibration = match sensor.init(&mut delay) {
        Ok(calibration) => calibration,
        Err(err) => return cli::fail(format_args!("BMP280 initialization failed: {}", err)),
    };

    match sensor.read(&mut delay, policy, calibration) {
        Ok(response) => {
            let point = Point::new(&args.common.measurement)
                .tag(HOST_TAG, cli::hostname())
                .tag(SENSOR_TAG, Sensor::Bmp280.name())
                .measurement(&Measurement::Pressure(response.pressure()), Precision::Integer)
                .measurement(
                    &Measurement::Temperature(response.temperature()),
                    Precision::Decimals(1),
                );
            cli::emit(&point);
            ExitCode::SUCCESS
        }
        Err(exhausted) => {
            cli::exhausted(Sensor::Bmp280.name(), &exhausted, ExhaustionPolicy::Report)
        }
    }
}
