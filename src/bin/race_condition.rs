//! Race Condition and Thread Safety
//!
//! Run with: cargo run --bin race_condition [config.toml]

use multithreading_unit::{demo, logging};

fn main() {
    logging::init();
    demo::report(demo::config_from_args().and_then(|config| demo::race_condition(&config)));
}
