//! Producer-Consumer with a Bounded Queue
//!
//! Run with: cargo run --bin producer_consumer [config.toml]

use multithreading_unit::{demo, logging};

fn main() {
    logging::init();
    demo::report(demo::config_from_args().and_then(|config| demo::producer_consumer(&config)));
}
