//! Deadlock and Ordered Locking
//!
//! Run with: cargo run --bin deadlock [config.toml]

use multithreading_unit::{demo, logging};

fn main() {
    logging::init();
    demo::report(demo::config_from_args().and_then(|config| demo::deadlock(&config)));
}
