#![allow(dead_code)]

mod concurrent;
pub mod delay;
pub mod digital;
pub mod i2c;
