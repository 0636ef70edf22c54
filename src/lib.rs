/// Decoder for the AHT20 humidity and temperature sensor on I2C.
pub mod aht20;
/// Decoder for the BMP280 pressure and temperature sensor on I2C, including Bosch's fixed-point
/// compensation.
pub mod bmp280;
/// Argument handling, logging setup and output helpers shared by the binaries.
pub mod cli;
/// Universal drivers for reading from DHT11 or DHT22 sensors over a single GPIO line.
pub mod dhtxx;
/// Reader for DS18B20 sensors exposed by the Linux w1-therm driver.
pub mod ds18b20;
/// InfluxDB line-protocol output.
pub mod line_protocol;
/// Raspberry Pi implementations of the hardware traits.
#[cfg(feature = "rpi")]
pub mod linux;
pub mod pin;
pub mod reading;
/// Bounded retries shared by every reader.
pub mod retry;
