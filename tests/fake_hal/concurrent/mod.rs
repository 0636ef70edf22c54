use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Mutex;

lazy_static! {
    // Fake clocks in nanoseconds, shared between a pin and the delay driving it.
    static ref CLOCKS_MAP: Mutex<HashMap<&'static str, u64>> = Mutex::new(HashMap::new());
}

pub fn set_named_value(name: &'static str, value: u64) {
    let mut map = CLOCKS_MAP.lock().unwrap();
    map.insert(name, value);
}

pub fn get_named_value(name: &str) -> u64 {
    let map = CLOCKS_MAP.lock().unwrap();
    map.get(name).copied().unwrap_or(0)
}

pub fn add_to_named_value(name: &'static str, delta: u64) {
    let mut map = CLOCKS_MAP.lock().unwrap();
    *map.entry(name).or_insert(0) += delta;
}
