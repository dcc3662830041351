//! Print the HAL call trace of a mock boot followed by N sleep cycles

use duty_core::default_config;
use duty_tests::trace::{max_cycles, trace};

fn main() {
    println!("🔋 Stop 2 duty-cycle trace (duty-core v{})", duty_core::VERSION);

    let config = default_config();
    let cycles = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse::<usize>().ok())
        .unwrap_or(2)
        .min(max_cycles(&config));

    println!(
        "⏱️ Wakeup interval: {} ms",
        config.wakeup.interval().as_millis()
    );
    println!();

    match trace(config, cycles) {
        Ok(calls) => {
            for (i, call) in calls.iter().enumerate() {
                println!("{:4}  {:?}", i, call);
            }
            println!();
            println!("✅ Boot plus {} cycles: {} HAL calls", cycles, calls.len());
        }
        Err(err) => {
            eprintln!("❌ {}", err);
            std::process::exit(1);
        }
    }
}
