// SPDX-License-Identifier: MIT
//
// Event model — the unified input record and its bitmasks.
//
// One flat struct carries every event kind the decoder produces. Fields
// that do not apply to a kind stay zero. The modifier, button and flag
// bit values are not arbitrary: they are the Windows Console values and
// appear verbatim in Win32 Input Mode payloads, so they are part of the
// wire contract and must never be renumbered.

use std::fmt;

use bitflags::bitflags;

// ─── Event Kind ──────────────────────────────────────────────────────────────

/// Which of the four semantic kinds an [`InputEvent`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Keyboard press or release.
    Key,
    /// Mouse button, motion, or wheel.
    Mouse,
    /// Terminal window focus gained or lost.
    Focus,
    /// Bracketed paste boundary marker.
    Paste,
}

// ─── Bitmasks ────────────────────────────────────────────────────────────────

bitflags! {
    /// Modifier and lock state, Windows `dwControlKeyState` layout.
    ///
    /// Bit positions are fixed by the Win32 Input Mode payload format
    /// (the `Cs` field carries this mask as a decimal integer).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct ControlKeyState: u16 {
        const RIGHT_ALT   = 0x0001;
        const LEFT_ALT    = 0x0002;
        const RIGHT_CTRL  = 0x0004;
        const LEFT_CTRL   = 0x0008;
        const SHIFT       = 0x0010;
        const NUM_LOCK    = 0x0020;
        const SCROLL_LOCK = 0x0040;
        const CAPS_LOCK   = 0x0080;
        /// Extended-key marker (arrow cluster, numpad navigation).
        const ENHANCED    = 0x0100;
    }
}

bitflags! {
    /// Mouse button state, Windows `dwButtonState` layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct ButtonState: u16 {
        const LEFT   = 0x0001;
        const RIGHT  = 0x0002;
        const MIDDLE = 0x0004;
        const X1     = 0x0008;
        const X2     = 0x0010;
    }
}

bitflags! {
    /// Mouse event classification, Windows `dwEventFlags` layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct MouseEventFlags: u16 {
        const MOVED        = 0x0001;
        const DOUBLE_CLICK = 0x0002;
        const WHEELED      = 0x0004;
        const HWHEELED     = 0x0008;
    }
}

// ─── Virtual Key Codes ───────────────────────────────────────────────────────

/// Windows virtual-key identifiers, reused here as a portable key identity.
///
/// Only the codes the decoder can actually produce are listed. Letter and
/// digit keys are their ASCII uppercase values (`A` = 0x41, `N0` = 0x30),
/// so ranges are derived arithmetically from the anchors below.
pub mod vk {
    /// Sentinel for "character known, key identity unknown".
    pub const UNASSIGNED: u16 = 0xFF;

    pub const BACK: u16 = 0x08;
    pub const TAB: u16 = 0x09;
    pub const CLEAR: u16 = 0x0C;
    pub const RETURN: u16 = 0x0D;
    pub const SHIFT: u16 = 0x10;
    pub const CONTROL: u16 = 0x11;
    pub const MENU: u16 = 0x12;
    pub const CAPITAL: u16 = 0x14;
    pub const ESCAPE: u16 = 0x1B;
    pub const SPACE: u16 = 0x20;
    pub const PRIOR: u16 = 0x21;
    pub const NEXT: u16 = 0x22;
    pub const END: u16 = 0x23;
    pub const HOME: u16 = 0x24;
    pub const LEFT: u16 = 0x25;
    pub const UP: u16 = 0x26;
    pub const RIGHT: u16 = 0x27;
    pub const DOWN: u16 = 0x28;
    pub const INSERT: u16 = 0x2D;
    pub const DELETE: u16 = 0x2E;

    /// Digit row anchor: `N0` through `N9` are `0x30..=0x39`.
    pub const N0: u16 = 0x30;
    pub const N6: u16 = 0x36;
    /// Letter anchor: `A` through `Z` are `0x41..=0x5A`.
    pub const A: u16 = 0x41;
    pub const C: u16 = 0x43;

    pub const LWIN: u16 = 0x5B;
    pub const RWIN: u16 = 0x5C;
    pub const APPS: u16 = 0x5D;

    /// Numpad anchor: `NUMPAD0` through `NUMPAD9` are `0x60..=0x69`.
    pub const NUMPAD0: u16 = 0x60;
    pub const MULTIPLY: u16 = 0x6A;
    pub const ADD: u16 = 0x6B;
    pub const SUBTRACT: u16 = 0x6D;
    pub const DECIMAL: u16 = 0x6E;
    pub const DIVIDE: u16 = 0x6F;

    /// Function key anchor: `F1` through `F12` are `0x70..=0x7B`.
    pub const F1: u16 = 0x70;
    pub const F2: u16 = 0x71;
    pub const F3: u16 = 0x72;
    pub const F4: u16 = 0x73;
    pub const F5: u16 = 0x74;
    pub const F6: u16 = 0x75;
    pub const F11: u16 = 0x7A;

    pub const NUMLOCK: u16 = 0x90;

    // OEM punctuation keys (US layout positions).
    pub const OEM_1: u16 = 0xBA; // ;:
    pub const OEM_PLUS: u16 = 0xBB; // =+
    pub const OEM_COMMA: u16 = 0xBC; // ,<
    pub const OEM_MINUS: u16 = 0xBD; // -_
    pub const OEM_PERIOD: u16 = 0xBE; // .>
    pub const OEM_2: u16 = 0xBF; // /?
    pub const OEM_3: u16 = 0xC0; // `~
    pub const OEM_4: u16 = 0xDB; // [{
    pub const OEM_5: u16 = 0xDC; // \|
    pub const OEM_6: u16 = 0xDD; // ]}
    pub const OEM_7: u16 = 0xDE; // '"
}

/// Hardware scan codes where the decoder can disambiguate key position.
pub mod scan {
    /// Left Shift (set 1 make code).
    pub const LEFT_SHIFT: u16 = 0x2A;
    /// Right Shift (set 1 make code).
    pub const RIGHT_SHIFT: u16 = 0x36;
}

// ─── InputEvent ──────────────────────────────────────────────────────────────

/// A single decoded input event.
///
/// Flat by design: one record for all four kinds, mirroring the Windows
/// `INPUT_RECORD` shape so callers can forward it to console-style APIs
/// without reshaping. Fields that do not apply to the active
/// [`kind`](Self::kind) are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub kind: EventKind,

    // Key data.
    /// Windows virtual-key identifier; 0 when unassigned.
    pub virtual_key_code: u16,
    /// Hardware scan code; distinguishes left/right Shift where known.
    pub virtual_scan_code: u16,
    /// Unicode scalar the key produced; `'\0'` if none.
    pub ch: char,
    /// Scalar the same physical key produces without Shift (Kitty only).
    pub unshifted_ch: char,
    /// `true` = press, `false` = release. Releases are only reported by
    /// protocols that can express them (Win32, Kitty).
    pub key_down: bool,
    /// Always at least 1 for key events.
    pub repeat_count: u16,

    // Mouse data.
    /// 1-based terminal cell column.
    pub mouse_x: u16,
    /// 1-based terminal cell row.
    pub mouse_y: u16,
    pub button_state: ButtonState,
    pub mouse_event_flags: MouseEventFlags,
    /// +1 wheel forward, -1 wheel backward, 0 for non-wheel events.
    pub wheel_direction: i8,

    // Focus data.
    /// `true` = focus gained, `false` = focus lost.
    pub set_focus: bool,

    // Paste data.
    /// `true` = opening bracket, `false` = closing bracket.
    pub paste_start: bool,

    // Shared.
    pub control_key_state: ControlKeyState,

    /// Set when the source protocol cannot report key releases (legacy
    /// CSI/SS3, C0 translation, bare UTF-8, ESC/Alt fallbacks). Callers
    /// that need release semantics may synthesize them after a timeout.
    pub is_legacy: bool,
}

impl InputEvent {
    /// A zeroed key event (`repeat_count` already 1).
    #[must_use]
    pub const fn key() -> Self {
        Self::blank(EventKind::Key)
    }

    /// A zeroed mouse event.
    #[must_use]
    pub const fn mouse() -> Self {
        Self::blank(EventKind::Mouse)
    }

    /// A focus event.
    #[must_use]
    pub const fn focus(gained: bool) -> Self {
        let mut e = Self::blank(EventKind::Focus);
        e.set_focus = gained;
        e
    }

    /// A paste boundary event.
    #[must_use]
    pub const fn paste(start: bool) -> Self {
        let mut e = Self::blank(EventKind::Paste);
        e.paste_start = start;
        e
    }

    const fn blank(kind: EventKind) -> Self {
        Self {
            kind,
            virtual_key_code: 0,
            virtual_scan_code: 0,
            ch: '\0',
            unshifted_ch: '\0',
            key_down: false,
            repeat_count: 1,
            mouse_x: 0,
            mouse_y: 0,
            button_state: ButtonState::empty(),
            mouse_event_flags: MouseEventFlags::empty(),
            wheel_direction: 0,
            set_focus: false,
            paste_start: false,
            control_key_state: ControlKeyState::empty(),
            is_legacy: false,
        }
    }
}

// ─── Display ─────────────────────────────────────────────────────────────────

/// Write a character as `Char:'x'`, or `Char:\x1F` for control codes.
fn write_char(f: &mut fmt::Formatter<'_>, label: &str, ch: char) -> fmt::Result {
    if (ch as u32) < 32 {
        write!(f, " {label}:\\x{:02X}", ch as u32)
    } else {
        write!(f, " {label}:'{ch}'")
    }
}

impl fmt::Display for InputEvent {
    /// Compact single-line rendering for logs and debugging.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let legacy = if self.is_legacy { " [Legacy]" } else { "" };

        match self.kind {
            EventKind::Key => {
                write!(
                    f,
                    "Key{{VK:0x{:X} Scan:0x{:X}",
                    self.virtual_key_code, self.virtual_scan_code
                )?;
                if self.ch != '\0' {
                    write_char(f, "Char", self.ch)?;
                }
                if self.unshifted_ch != '\0' {
                    write_char(f, "Base", self.unshifted_ch)?;
                }
                let state = if self.key_down { "DOWN" } else { "UP" };
                write!(
                    f,
                    " {state} Mods:0x{:X}}}{legacy}",
                    self.control_key_state.bits()
                )
            }
            EventKind::Mouse => {
                let btn = if self.button_state == ButtonState::LEFT {
                    "Left"
                } else if self.button_state == ButtonState::MIDDLE {
                    "Middle"
                } else if self.button_state == ButtonState::RIGHT {
                    "Right"
                } else {
                    "None"
                };
                let action = if self.mouse_event_flags.contains(MouseEventFlags::MOVED) {
                    "MOVE"
                } else if self.key_down {
                    "DOWN"
                } else {
                    "UP"
                };
                let wheel = match self.wheel_direction {
                    d if d > 0 => " WHEEL_UP",
                    d if d < 0 => " WHEEL_DOWN",
                    _ => "",
                };
                write!(
                    f,
                    "Mouse{{Pos:{},{} Btn:{btn} {action}{wheel} Mods:0x{:X}}}{legacy}",
                    self.mouse_x,
                    self.mouse_y,
                    self.control_key_state.bits()
                )
            }
            EventKind::Focus => {
                write!(f, "Focus{{{}}}", if self.set_focus { "IN" } else { "OUT" })
            }
            EventKind::Paste => {
                write!(f, "Paste{{{}}}", if self.paste_start { "START" } else { "END" })
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Contract bit values ─────────────────────────────────────────────

    #[test]
    fn control_key_state_bits_are_windows_values() {
        assert_eq!(ControlKeyState::RIGHT_ALT.bits(), 0x0001);
        assert_eq!(ControlKeyState::LEFT_ALT.bits(), 0x0002);
        assert_eq!(ControlKeyState::RIGHT_CTRL.bits(), 0x0004);
        assert_eq!(ControlKeyState::LEFT_CTRL.bits(), 0x0008);
        assert_eq!(ControlKeyState::SHIFT.bits(), 0x0010);
        assert_eq!(ControlKeyState::NUM_LOCK.bits(), 0x0020);
        assert_eq!(ControlKeyState::SCROLL_LOCK.bits(), 0x0040);
        assert_eq!(ControlKeyState::CAPS_LOCK.bits(), 0x0080);
        assert_eq!(ControlKeyState::ENHANCED.bits(), 0x0100);
    }

    #[test]
    fn button_state_bits() {
        assert_eq!(ButtonState::LEFT.bits(), 0x1);
        assert_eq!(ButtonState::RIGHT.bits(), 0x2);
        assert_eq!(ButtonState::MIDDLE.bits(), 0x4);
        assert_eq!(ButtonState::X1.bits(), 0x8);
        assert_eq!(ButtonState::X2.bits(), 0x10);
    }

    #[test]
    fn mouse_event_flag_bits() {
        assert_eq!(MouseEventFlags::MOVED.bits(), 0x1);
        assert_eq!(MouseEventFlags::DOUBLE_CLICK.bits(), 0x2);
        assert_eq!(MouseEventFlags::WHEELED.bits(), 0x4);
        assert_eq!(MouseEventFlags::HWHEELED.bits(), 0x8);
    }

    #[test]
    fn raw_mask_roundtrip() {
        // Win32 payloads deliver the mask as an integer; it must survive
        // the trip through the typed wrapper unchanged.
        let mask = ControlKeyState::from_bits_truncate(0x0118);
        assert!(mask.contains(ControlKeyState::LEFT_CTRL));
        assert!(mask.contains(ControlKeyState::SHIFT));
        assert!(mask.contains(ControlKeyState::ENHANCED));
        assert_eq!(mask.bits(), 0x0118);
    }

    // ── Constructors ────────────────────────────────────────────────────

    #[test]
    fn key_constructor_defaults() {
        let e = InputEvent::key();
        assert_eq!(e.kind, EventKind::Key);
        assert_eq!(e.repeat_count, 1);
        assert_eq!(e.virtual_key_code, 0);
        assert_eq!(e.ch, '\0');
        assert!(!e.key_down);
        assert!(!e.is_legacy);
    }

    #[test]
    fn focus_constructor() {
        assert!(InputEvent::focus(true).set_focus);
        assert!(!InputEvent::focus(false).set_focus);
        assert_eq!(InputEvent::focus(true).kind, EventKind::Focus);
    }

    #[test]
    fn paste_constructor() {
        assert!(InputEvent::paste(true).paste_start);
        assert!(!InputEvent::paste(false).paste_start);
        assert_eq!(InputEvent::paste(false).kind, EventKind::Paste);
    }

    // ── VK anchors ──────────────────────────────────────────────────────

    #[test]
    fn vk_letter_range_is_ascii() {
        assert_eq!(vk::A, u16::from(b'A'));
        assert_eq!(vk::A + 25, u16::from(b'Z'));
        assert_eq!(vk::N0, u16::from(b'0'));
        assert_eq!(vk::N0 + 9, u16::from(b'9'));
    }

    #[test]
    fn vk_function_keys_contiguous() {
        assert_eq!(vk::F1 + 1, vk::F2);
        assert_eq!(vk::F1 + 4, vk::F5);
        assert_eq!(vk::F6 + 5, vk::F11);
    }

    // ── Display ─────────────────────────────────────────────────────────

    #[test]
    fn display_key_down() {
        let mut e = InputEvent::key();
        e.virtual_key_code = vk::UP;
        e.key_down = true;
        e.is_legacy = true;
        let s = e.to_string();
        assert!(s.contains("VK:0x26"), "{s}");
        assert!(s.contains("DOWN"), "{s}");
        assert!(s.ends_with("[Legacy]"), "{s}");
    }

    #[test]
    fn display_control_char_as_hex() {
        let mut e = InputEvent::key();
        e.ch = '\t';
        e.key_down = true;
        let s = e.to_string();
        assert!(s.contains("Char:\\x09"), "{s}");
    }

    #[test]
    fn display_mouse_wheel() {
        let mut e = InputEvent::mouse();
        e.mouse_x = 10;
        e.mouse_y = 20;
        e.wheel_direction = 1;
        e.key_down = true;
        let s = e.to_string();
        assert!(s.contains("Pos:10,20"), "{s}");
        assert!(s.contains("WHEEL_UP"), "{s}");
    }

    #[test]
    fn display_focus_and_paste() {
        assert_eq!(InputEvent::focus(true).to_string(), "Focus{IN}");
        assert_eq!(InputEvent::focus(false).to_string(), "Focus{OUT}");
        assert_eq!(InputEvent::paste(true).to_string(), "Paste{START}");
        assert_eq!(InputEvent::paste(false).to_string(), "Paste{END}");
    }
}
