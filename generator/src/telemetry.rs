use crate::model::{EventType, SensorReading, Status};
use chrono::Utc;
use rand::Rng;

/// Number of synthetic devices readings are spread over
pub const DEVICE_POOL_SIZE: u32 = 100;

pub const TEMPERATURE_RANGE: (f64, f64) = (10.0, 35.0);
pub const HUMIDITY_RANGE: (f64, f64) = (30.0, 80.0);
pub const PRESSURE_RANGE: (f64, f64) = (980.0, 1020.0);

// Rough bounding box of the Iberian Peninsula. No land mask, so points can
// land in the sea.
pub const LATITUDE_RANGE: (f64, f64) = (36.0, 43.8);
pub const LONGITUDE_RANGE: (f64, f64) = (-9.5, 3.3);

const LOCATIONS: [&str; 10] = [
    "Madrid",
    "Barcelona",
    "Valencia",
    "Sevilla",
    "Zaragoza",
    "Malaga",
    "Bilbao",
    "Lisboa",
    "Porto",
    "Valladolid",
];

pub fn device_id(n: u32) -> String {
    format!("DEVICE_{}", n)
}

/// Number encoded in a `DEVICE_<n>` identifier
pub fn device_number(device_id: &str) -> Option<u32> {
    device_id.strip_prefix("DEVICE_")?.parse().ok()
}

/// Location name registered alongside a device. Identifiers outside the
/// pool fall back to a generic label.
pub fn location_for(device_id: &str) -> String {
    match device_number(device_id) {
        Some(n) if n >= 1 => {
            let city = LOCATIONS[(n as usize - 1) % LOCATIONS.len()];
            format!("{} site {}", city, n)
        }
        _ => "Unknown location".to_string(),
    }
}

pub fn generate_sensor_data() -> SensorReading {
    generate_sensor_data_with(&mut rand::thread_rng())
}

pub fn generate_sensor_data_with(rng: &mut impl Rng) -> SensorReading {
    let device = rng.gen_range(1..=DEVICE_POOL_SIZE);

    SensorReading {
        time: Utc::now(),
        device_id: device_id(device),
        temperature: rng.gen_range(TEMPERATURE_RANGE.0..=TEMPERATURE_RANGE.1),
        humidity: rng.gen_range(HUMIDITY_RANGE.0..=HUMIDITY_RANGE.1),
        pressure: rng.gen_range(PRESSURE_RANGE.0..=PRESSURE_RANGE.1),
        latitude: rng.gen_range(LATITUDE_RANGE.0..=LATITUDE_RANGE.1),
        longitude: rng.gen_range(LONGITUDE_RANGE.0..=LONGITUDE_RANGE.1),
        status: Status::ALL[rng.gen_range(0..Status::ALL.len())],
        event_type: EventType::ALL[rng.gen_range(0..EventType::ALL.len())],
    }
}
