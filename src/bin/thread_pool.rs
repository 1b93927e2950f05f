//! Fixed-Size Thread Pool
//!
//! Run with: cargo run --bin thread_pool [config.toml]

use multithreading_unit::{demo, logging};

fn main() {
    logging::init();
    demo::report(demo::config_from_args().and_then(|config| demo::thread_pool(&config)));
}
