//! Exception and interrupt vectors
//!
//! Each vector forwards to the trap table; a `Halt` result parks the core.

use cortex_m_rt::{exception, ExceptionFrame};
use duty_core::interrupt::{
    standard_table, RtcEventTrap, TickCounter, Trap, TrapAction, TrapTable, WakeFlags,
};
use duty_core::types::WakeSource;
use stop2_firmware::{RtcIrq, Stm32RtcAck};

pub static TICKS: TickCounter = TickCounter::new();
pub static WAKE: WakeFlags = WakeFlags::new();

static RTC_ACK: Stm32RtcAck = Stm32RtcAck;
static ALARM_TRAP: RtcEventTrap<'static> = RtcEventTrap::new(WakeSource::Alarm, &RTC_ACK, &WAKE);
static WAKEUP_TRAP: RtcEventTrap<'static> =
    RtcEventTrap::new(WakeSource::WakeupTimer, &RTC_ACK, &WAKE);
static TAMPER_TRAP: RtcEventTrap<'static> = RtcEventTrap::new(WakeSource::Tamper, &RTC_ACK, &WAKE);

static TRAPS: TrapTable<'static> = standard_table(&TICKS, &ALARM_TRAP, &WAKEUP_TRAP, &TAMPER_TRAP);

fn trap(source: Trap) {
    if TRAPS.dispatch(source) == TrapAction::Halt {
        loop {
            cortex_m::asm::nop();
        }
    }
}

#[exception]
unsafe fn NonMaskableInt() {
    trap(Trap::Nmi);
}

#[exception]
unsafe fn HardFault(_frame: &ExceptionFrame) -> ! {
    trap(Trap::HardFault);
    loop {
        cortex_m::asm::nop();
    }
}

#[exception]
fn MemoryManagement() {
    trap(Trap::MemManage);
}

#[exception]
fn BusFault() {
    trap(Trap::BusFault);
}

#[exception]
fn UsageFault() {
    trap(Trap::UsageFault);
}

#[exception]
fn SVCall() {
    trap(Trap::SvCall);
}

#[exception]
fn DebugMonitor() {
    trap(Trap::DebugMonitor);
}

#[exception]
fn PendSV() {
    trap(Trap::PendSv);
}

#[exception]
fn SysTick() {
    trap(Trap::SysTick);
}

#[exception]
unsafe fn DefaultHandler(irqn: i16) {
    match RtcIrq::from_irqn(irqn) {
        Some(RtcIrq::TampStamp) => trap(Trap::RtcTamper),
        Some(RtcIrq::Wakeup) => trap(Trap::RtcWakeup),
        Some(RtcIrq::Alarm) => trap(Trap::RtcAlarm),
        None => {}
    }
}
