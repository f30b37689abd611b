use super::StackTrace;
use crate::arch::Registers;
use crate::elf::PrStatus;
use std::cell::OnceCell;
use std::collections::BTreeMap;

/// One thread from a PRSTATUS note.
#[derive(Debug)]
pub struct OsThread {
    pub tid: u64,
    pub registers: Registers,
    pub status: PrStatus,
    pub properties: BTreeMap<String, String>,

    /// Walked on first use, see [`CoreDump::stack_trace`](super::CoreDump::stack_trace).
    pub(super) trace: OnceCell<StackTrace>,
}

impl OsThread {
    pub fn new(status: PrStatus, registers: Registers) -> Self {
        let mut properties = BTreeMap::new();
        let times = [
            ("Thread user time secs", status.user_time.0),
            ("Thread user time usecs", status.user_time.1),
            ("Thread sys time secs", status.system_time.0),
            ("Thread sys time usecs", status.system_time.1),
        ];
        for (key, value) in times {
            properties.insert(key.to_string(), value.to_string());
        }
        OsThread {
            tid: status.pid as u32 as u64,
            registers,
            status,
            properties,
            trace: OnceCell::new(),
        }
    }

    pub fn signal(&self) -> i32 {
        self.status.signal_num
    }

    /// The stack trace if it has already been walked.
    pub fn cached_trace(&self) -> Option<&StackTrace> {
        self.trace.get()
    }

    /// Forgets the cached stack trace, e.g. after the registers were edited.
    pub fn invalidate(&mut self) {
        self.trace = OnceCell::new();
    }
}
