//! Expected mock-HAL call sequences for boot, sleep cycles and the error handler

use heapless::Vec;

use crate::clock::RunClockProfile;
use crate::hal::mock::{HalCall, LedAction, LedId};
use crate::quiesce::plan;
use crate::types::{PowerConfig, WakeSource};

/// Room for the longest sequence built here
pub const SEQUENCE_CAPACITY: usize = 64;

/// Ordered list of expected calls
pub type CallSequence = Vec<HalCall, SEQUENCE_CAPACITY>;

fn push(seq: &mut CallSequence, call: HalCall) {
    assert!(seq.push(call).is_ok(), "expected call sequence too long");
}

/// Calls made by one `configure_run_clock`
pub fn run_clock_sequence(profile: &RunClockProfile) -> CallSequence {
    let mut seq = CallSequence::new();
    push(&mut seq, HalCall::VoltageScaling(profile.voltage_scale));
    push(&mut seq, HalCall::BackupAccess);
    push(&mut seq, HalCall::LseDrive(profile.oscillators.lse_drive));
    push(
        &mut seq,
        HalCall::Oscillators {
            hse: profile.oscillators.hse,
            lse: profile.oscillators.lse,
        },
    );
    push(
        &mut seq,
        HalCall::BusClocks {
            sysclk: profile.bus.sysclk,
            latency: profile.flash_latency,
        },
    );
    seq
}

/// Calls made by `PowerController::boot`
pub fn boot_sequence(config: &PowerConfig) -> CallSequence {
    let mut seq = CallSequence::new();
    push(&mut seq, HalCall::Led(LedId::Run, LedAction::Init));
    push(&mut seq, HalCall::Led(LedId::Fault, LedAction::Init));
    for call in run_clock_sequence(&config.run_clock) {
        push(&mut seq, call);
    }
    push(&mut seq, HalCall::StopWakeupClock(config.stop_wakeup_clock));

    push(
        &mut seq,
        HalCall::UartInit {
            baud_rate: config.uart.baud_rate,
        },
    );
    push(&mut seq, HalCall::UartTxThreshold(config.uart.tx_threshold));
    push(&mut seq, HalCall::UartRxThreshold(config.uart.rx_threshold));
    push(&mut seq, HalCall::UartFifoMode(config.uart.fifo_mode));

    push(&mut seq, HalCall::RtcInit);
    push(&mut seq, HalCall::RtcSetTime);
    push(&mut seq, HalCall::RtcSetDate);
    push(&mut seq, HalCall::RtcSetAlarm(config.alarm.alarm));
    push(&mut seq, HalCall::RtcSetTamper(config.tamper.tamper));
    seq
}

/// Calls made by one `PowerController::run_cycle` woken by `source`
pub fn cycle_sequence(config: &PowerConfig, source: WakeSource) -> CallSequence {
    let mut seq = CallSequence::new();
    let ports = plan(&config.quiesce);
    for entry in &ports {
        push(&mut seq, HalCall::GpioClockEnable(entry.port));
    }
    for entry in ports.iter().filter(|entry| entry.pins != 0) {
        push(
            &mut seq,
            HalCall::GpioAnalog {
                port: entry.port,
                pins: entry.pins,
            },
        );
    }
    for entry in &ports {
        push(&mut seq, HalCall::GpioClockDisable(entry.port));
    }
    push(&mut seq, HalCall::WakeupDisarm);
    push(
        &mut seq,
        HalCall::WakeupArm {
            counter: config.wakeup.counter,
            clock: config.wakeup.clock,
        },
    );
    push(&mut seq, HalCall::EnterStop2);
    push(&mut seq, HalCall::Woke(source));
    for call in run_clock_sequence(&config.run_clock) {
        push(&mut seq, call);
    }
    push(&mut seq, HalCall::Led(LedId::Run, LedAction::Init));
    push(&mut seq, HalCall::Led(LedId::Run, LedAction::On));
    seq
}

/// Calls made by `PowerController::error_handler`
pub fn fault_sequence() -> CallSequence {
    let mut seq = CallSequence::new();
    push(&mut seq, HalCall::Led(LedId::Fault, LedAction::Init));
    push(&mut seq, HalCall::Led(LedId::Fault, LedAction::On));
    push(&mut seq, HalCall::DisableInterrupts);
    push(&mut seq, HalCall::Halt);
    seq
}

/// Returns true if `expected` occurs in `calls` as a contiguous run
pub fn contains_sequence(calls: &[HalCall], expected: &[HalCall]) -> bool {
    expected.is_empty() || calls.windows(expected.len()).any(|window| window == expected)
}
