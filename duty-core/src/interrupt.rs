//! Interrupt Dispatch
//!
//! Every trap or interrupt source the firmware wires up gets one entry in a
//! [`TrapTable`]. The vector stubs only call [`TrapTable::dispatch`] and act
//! on the returned [`TrapAction`].

use portable_atomic::{AtomicU32, AtomicU8, Ordering};

use crate::hal::{Duration, Instant};
use crate::types::WakeSource;

/// Trap and interrupt sources
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Trap {
    Nmi,
    HardFault,
    MemManage,
    BusFault,
    UsageFault,
    SvCall,
    DebugMonitor,
    PendSv,
    SysTick,
    RtcAlarm,
    RtcWakeup,
    RtcTamper,
}

impl Trap {
    pub const COUNT: usize = 12;

    pub const ALL: [Trap; Trap::COUNT] = [
        Trap::Nmi,
        Trap::HardFault,
        Trap::MemManage,
        Trap::BusFault,
        Trap::UsageFault,
        Trap::SvCall,
        Trap::DebugMonitor,
        Trap::PendSv,
        Trap::SysTick,
        Trap::RtcAlarm,
        Trap::RtcWakeup,
        Trap::RtcTamper,
    ];

    /// Processor fault: execution cannot safely continue
    pub const fn is_fault(&self) -> bool {
        matches!(
            self,
            Trap::Nmi | Trap::HardFault | Trap::MemManage | Trap::BusFault | Trap::UsageFault
        )
    }

    const fn index(&self) -> usize {
        *self as usize
    }
}

/// What the vector stub does after the handler ran
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TrapAction {
    /// Return from the exception
    Return,
    /// Spin forever
    Halt,
}

/// Handler capability shared by every table entry
pub trait TrapHandler: Sync {
    fn handle(&self) -> TrapAction;
}

/// Fail-fast handler for processor faults
pub struct FaultTrap;

impl TrapHandler for FaultTrap {
    fn handle(&self) -> TrapAction {
        TrapAction::Halt
    }
}

/// Placeholder for vectors nothing uses
pub struct UnusedTrap;

impl TrapHandler for UnusedTrap {
    fn handle(&self) -> TrapAction {
        TrapAction::Return
    }
}

/// Monotonic millisecond counter advanced by SysTick
pub struct TickCounter {
    ticks: AtomicU32,
}

impl TickCounter {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU32::new(0),
        }
    }

    pub fn now_ms(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Milliseconds elapsed since `start_ms`, wrap-safe
    pub fn elapsed_since(&self, start_ms: u32) -> Duration {
        Duration::from_millis(self.now_ms().wrapping_sub(start_ms) as u64)
    }

    /// Current tick as an [`Instant`]
    pub fn instant(&self) -> Instant {
        Instant::from_millis(self.now_ms() as u64)
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TrapHandler for TickCounter {
    fn handle(&self) -> TrapAction {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        TrapAction::Return
    }
}

/// Latched RTC wake sources, set from interrupt context and drained by the
/// controller after each wake
pub struct WakeFlags {
    bits: AtomicU8,
}

impl WakeFlags {
    const WAKEUP_TIMER: u8 = 1 << 0;
    const ALARM: u8 = 1 << 1;
    const TAMPER: u8 = 1 << 2;

    pub const fn new() -> Self {
        Self {
            bits: AtomicU8::new(0),
        }
    }

    const fn bit(source: WakeSource) -> u8 {
        match source {
            WakeSource::WakeupTimer => Self::WAKEUP_TIMER,
            WakeSource::Alarm => Self::ALARM,
            WakeSource::Tamper => Self::TAMPER,
            WakeSource::Other => 0,
        }
    }

    fn decode(bits: u8) -> Option<WakeSource> {
        if bits & Self::WAKEUP_TIMER != 0 {
            Some(WakeSource::WakeupTimer)
        } else if bits & Self::ALARM != 0 {
            Some(WakeSource::Alarm)
        } else if bits & Self::TAMPER != 0 {
            Some(WakeSource::Tamper)
        } else {
            None
        }
    }

    pub fn raise(&self, source: WakeSource) {
        self.bits.fetch_or(Self::bit(source), Ordering::AcqRel);
    }

    /// Clear all latched sources and return the highest-priority one
    /// (wakeup timer, then alarm, then tamper)
    pub fn take(&self) -> Option<WakeSource> {
        Self::decode(self.bits.swap(0, Ordering::AcqRel))
    }

    pub fn peek(&self) -> Option<WakeSource> {
        Self::decode(self.bits.load(Ordering::Acquire))
    }
}

impl Default for WakeFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the RTC and EXTI pending flags of one event
pub trait RtcEventAck: Sync {
    fn acknowledge(&self, source: WakeSource);
}

/// RTC alarm, wakeup or tamper interrupt: acknowledge, latch, return
pub struct RtcEventTrap<'a> {
    source: WakeSource,
    ack: &'a dyn RtcEventAck,
    flags: &'a WakeFlags,
}

impl<'a> RtcEventTrap<'a> {
    pub const fn new(source: WakeSource, ack: &'a dyn RtcEventAck, flags: &'a WakeFlags) -> Self {
        Self { source, ack, flags }
    }
}

impl TrapHandler for RtcEventTrap<'_> {
    fn handle(&self) -> TrapAction {
        self.ack.acknowledge(self.source);
        self.flags.raise(self.source);
        TrapAction::Return
    }
}

/// Handler per trap source
pub struct TrapTable<'a> {
    handlers: [&'a dyn TrapHandler; Trap::COUNT],
}

impl<'a> TrapTable<'a> {
    /// Table routing every source to `default`
    pub const fn new(default: &'a dyn TrapHandler) -> Self {
        Self {
            handlers: [default; Trap::COUNT],
        }
    }

    /// Route `trap` to `handler`
    pub const fn with(mut self, trap: Trap, handler: &'a dyn TrapHandler) -> Self {
        self.handlers[trap.index()] = handler;
        self
    }

    pub fn dispatch(&self, trap: Trap) -> TrapAction {
        let action = self.handlers[trap.index()].handle();
        if action == TrapAction::Halt {
            error!("trap {:?}: halting", trap);
        }
        action
    }
}

/// Table with the fixed policy: faults halt, SysTick advances `ticks`, the
/// RTC events latch into `flags`, everything else returns
pub const fn standard_table<'a>(
    ticks: &'a TickCounter,
    alarm: &'a RtcEventTrap<'a>,
    wakeup: &'a RtcEventTrap<'a>,
    tamper: &'a RtcEventTrap<'a>,
) -> TrapTable<'a> {
    TrapTable::new(&UnusedTrap)
        .with(Trap::Nmi, &FaultTrap)
        .with(Trap::HardFault, &FaultTrap)
        .with(Trap::MemManage, &FaultTrap)
        .with(Trap::BusFault, &FaultTrap)
        .with(Trap::UsageFault, &FaultTrap)
        .with(Trap::SysTick, ticks)
        .with(Trap::RtcAlarm, alarm)
        .with(Trap::RtcWakeup, wakeup)
        .with(Trap::RtcTamper, tamper)
}
