//! Synchronized Bank Account
//!
//! Run with: cargo run --bin bank_account [config.toml]

use multithreading_unit::{demo, logging};

fn main() {
    logging::init();
    demo::report(demo::config_from_args().and_then(|config| demo::bank_account(&config)));
}
