//! Host event codes and the sequencing classifier
//!
//! The host delivers events as opaque numeric codes. A fixed subset of them,
//! keyboard and IME text input, must be handled strictly in arrival order even
//! when the host re-enters its message pump mid-dispatch. Everything else is
//! passed straight through to the handler.

use std::fmt;

/// Opaque host event code
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EventCode(pub u32);

impl EventCode {
    #[inline]
    pub const fn new(code: u32) -> Self {
        EventCode(code)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Does this code belong to the sequenced allow-list?
    #[inline]
    pub fn is_sequenced(self) -> bool {
        is_sequenced(self)
    }
}

impl fmt::Debug for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}(0x{:04x})", name, self.0),
            None => write!(f, "Event(0x{:04x})", self.0),
        }
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

impl From<u32> for EventCode {
    fn from(code: u32) -> Self {
        EventCode(code)
    }
}

/// Well-known host event codes
pub mod codes {
    use super::EventCode;

    pub const SIZE: EventCode = EventCode(0x0005);
    pub const SET_FOCUS: EventCode = EventCode(0x0007);
    pub const KILL_FOCUS: EventCode = EventCode(0x0008);
    pub const PAINT: EventCode = EventCode(0x000F);

    // Keyboard
    pub const KEY_DOWN: EventCode = EventCode(0x0100);
    pub const KEY_UP: EventCode = EventCode(0x0101);
    pub const CHAR: EventCode = EventCode(0x0102);
    pub const DEAD_CHAR: EventCode = EventCode(0x0103);
    pub const SYS_KEY_DOWN: EventCode = EventCode(0x0104);
    pub const SYS_KEY_UP: EventCode = EventCode(0x0105);
    pub const SYS_CHAR: EventCode = EventCode(0x0106);
    pub const SYS_DEAD_CHAR: EventCode = EventCode(0x0107);
    pub const UNICODE_CHAR: EventCode = EventCode(0x0109);

    // IME composition
    pub const IME_START_COMPOSITION: EventCode = EventCode(0x010D);
    pub const IME_END_COMPOSITION: EventCode = EventCode(0x010E);
    pub const IME_COMPOSITION: EventCode = EventCode(0x010F);
    pub const IME_CHAR: EventCode = EventCode(0x0286);

    pub const TIMER: EventCode = EventCode(0x0113);

    // Pointer
    pub const MOUSE_MOVE: EventCode = EventCode(0x0200);
    pub const LBUTTON_DOWN: EventCode = EventCode(0x0201);
    pub const LBUTTON_UP: EventCode = EventCode(0x0202);
    pub const MOUSE_WHEEL: EventCode = EventCode(0x020A);
}

/// Codes that must be processed in strict arrival order.
///
/// Read-only for the lifetime of the process.
pub const SEQUENCED_CODES: [EventCode; 13] = [
    codes::KEY_DOWN,
    codes::KEY_UP,
    codes::CHAR,
    codes::DEAD_CHAR,
    codes::SYS_KEY_DOWN,
    codes::SYS_KEY_UP,
    codes::SYS_CHAR,
    codes::SYS_DEAD_CHAR,
    codes::UNICODE_CHAR,
    codes::IME_START_COMPOSITION,
    codes::IME_END_COMPOSITION,
    codes::IME_COMPOSITION,
    codes::IME_CHAR,
];

/// Classify a host event code.
///
/// Returns true when the event belongs to the sequenced set and must go
/// through the sequencer's ordering machinery.
pub fn is_sequenced(code: EventCode) -> bool {
    SEQUENCED_CODES.contains(&code)
}

impl EventCode {
    /// Human-readable name for well-known codes
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            codes::SIZE => "Size",
            codes::SET_FOCUS => "SetFocus",
            codes::KILL_FOCUS => "KillFocus",
            codes::PAINT => "Paint",
            codes::KEY_DOWN => "KeyDown",
            codes::KEY_UP => "KeyUp",
            codes::CHAR => "Char",
            codes::DEAD_CHAR => "DeadChar",
            codes::SYS_KEY_DOWN => "SysKeyDown",
            codes::SYS_KEY_UP => "SysKeyUp",
            codes::SYS_CHAR => "SysChar",
            codes::SYS_DEAD_CHAR => "SysDeadChar",
            codes::UNICODE_CHAR => "UnicodeChar",
            codes::IME_START_COMPOSITION => "ImeStartComposition",
            codes::IME_END_COMPOSITION => "ImeEndComposition",
            codes::IME_COMPOSITION => "ImeComposition",
            codes::IME_CHAR => "ImeChar",
            codes::TIMER => "Timer",
            codes::MOUSE_MOVE => "MouseMove",
            codes::LBUTTON_DOWN => "LButtonDown",
            codes::LBUTTON_UP => "LButtonUp",
            codes::MOUSE_WHEEL => "MouseWheel",
            _ => return None,
        };
        Some(name)
    }
}
