// SPDX-License-Identifier: MIT
//
// Sequence parsers — pure functions from bytes to events.
//
// Every parser here takes a byte slice positioned at the start of a
// candidate sequence and either produces `(event, bytes_consumed)` or
// reports why it can't: `Incomplete` (more bytes may complete it) or
// `InvalidSequence` (these bytes are not this dialect). The stateful
// reader owns dispatch and recovery; nothing in this module advances
// a buffer or blocks.
//
// Number parsing is done directly on `&[u8]` — no intermediate `String`
// allocation for CSI parameter decoding.

use thiserror::Error;

use crate::event::{scan, vk, ButtonState, ControlKeyState, InputEvent, MouseEventFlags};

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Why a byte slice failed to parse as a given dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The bytes may yet become a valid sequence; wait for more input.
    #[error("incomplete sequence")]
    Incomplete,
    /// The bytes cannot be this dialect; try another or fall through.
    #[error("invalid sequence")]
    InvalidSequence,
}

// ─── CSI Framer ──────────────────────────────────────────────────────────────

/// Locate a complete CSI frame (`ESC [ … terminator`) in `data`.
///
/// Returns the terminator's index and value. ECMA-48 subset: bytes in
/// `0x20..=0x3F` are legal parameter/intermediate bytes, the first byte
/// in `0x40..=0x7E` terminates the sequence, anything else is invalid.
/// Performs no payload interpretation.
pub fn scan_csi(data: &[u8]) -> Result<(usize, u8), ParseError> {
    if data.len() < 2 {
        return Err(ParseError::Incomplete);
    }
    if data[0] != 0x1B || data[1] != b'[' {
        return Err(ParseError::InvalidSequence);
    }

    for (i, &b) in data.iter().enumerate().skip(2) {
        if (0x40..=0x7E).contains(&b) {
            return Ok((i, b));
        }
        if !(0x20..=0x3F).contains(&b) {
            return Err(ParseError::InvalidSequence);
        }
    }

    Err(ParseError::Incomplete)
}

// ─── Parameter Helpers ───────────────────────────────────────────────────────

/// Decimal value of a parameter field. Empty and non-numeric fields are 0.
fn field_u32(field: &[u8]) -> u32 {
    let mut val: u32 = 0;
    for &b in field {
        if !b.is_ascii_digit() {
            return 0;
        }
        val = val.saturating_mul(10).saturating_add(u32::from(b - b'0'));
    }
    val
}

/// The `idx`-th semicolon-separated parameter, or `default` when the
/// field is missing or empty.
fn nth_param(payload: &[u8], idx: usize, default: u32) -> u32 {
    match payload.split(|&b| b == b';').nth(idx) {
        None => default,
        Some([]) => default,
        Some(field) => field_u32(field),
    }
}

/// Decode an ANSI modifier parameter (`1 + bitmask`, as sent by xterm
/// and Kitty) into console modifier flags.
fn decode_ansi_modifiers(mod_code: u32) -> ControlKeyState {
    let bits = mod_code.saturating_sub(1);
    let mut state = ControlKeyState::empty();
    if bits & 0x01 != 0 {
        state |= ControlKeyState::SHIFT;
    }
    if bits & 0x02 != 0 {
        state |= ControlKeyState::LEFT_ALT;
    }
    if bits & 0x04 != 0 {
        state |= ControlKeyState::LEFT_CTRL;
    }
    if bits & 0x08 != 0 {
        // Super/Win position in the xterm encoding.
        state |= ControlKeyState::ENHANCED;
    }
    state
}

/// Single-scalar uppercase, non-ASCII aware.
fn to_upper(ch: char) -> char {
    ch.to_uppercase().next().unwrap_or(ch)
}

// ─── VK Mapping Tables ───────────────────────────────────────────────────────

/// CSI terminator letters to virtual keys (legacy arrow/function forms).
const fn map_csi_final_to_vk(final_byte: u8) -> u16 {
    match final_byte {
        b'A' => vk::UP,
        b'B' => vk::DOWN,
        b'C' => vk::RIGHT,
        b'D' => vk::LEFT,
        b'H' => vk::HOME,
        b'F' => vk::END,
        b'P' => vk::F1,
        b'Q' => vk::F2,
        b'R' => vk::F3,
        b'S' => vk::F4,
        b'Z' => vk::TAB,
        _ => 0,
    }
}

/// `CSI <code> ~` editing/function key codes to virtual keys.
#[allow(clippy::cast_possible_truncation)] // Codes are bounded by the match arms.
const fn map_tilde_to_vk(code: u32) -> u16 {
    match code {
        1 | 7 => vk::HOME,
        2 => vk::INSERT,
        3 => vk::DELETE,
        4 | 8 => vk::END,
        5 => vk::PRIOR,
        6 => vk::NEXT,
        11..=15 => vk::F1 + (code - 11) as u16,
        17..=21 => vk::F6 + (code - 17) as u16,
        23 | 24 => vk::F11 + (code - 23) as u16,
        _ => 0,
    }
}

// ─── Win32 Input Mode ────────────────────────────────────────────────────────

/// Parse a Win32 Input Mode sequence: `CSI Vk ; Sc ; Uc ; Kd ; Cs ; Rc _`.
///
/// Missing fields default to 0; a missing or zero repeat count becomes 1.
/// `Kd` is boolean: exactly 1 means press. Fields are carried verbatim
/// into the event; this dialect can express key release, so the result
/// is never legacy.
#[allow(clippy::cast_possible_truncation)] // Wire fields are 16-bit by contract.
pub fn parse_win32(data: &[u8]) -> Result<(InputEvent, usize), ParseError> {
    let (term, final_byte) = scan_csi(data)?;
    if final_byte != b'_' {
        return Err(ParseError::InvalidSequence);
    }

    let payload = &data[2..term];

    let mut event = InputEvent::key();
    event.virtual_key_code = nth_param(payload, 0, 0) as u16;
    event.virtual_scan_code = nth_param(payload, 1, 0) as u16;
    event.ch = char::from_u32(nth_param(payload, 2, 0)).unwrap_or('\0');
    event.key_down = nth_param(payload, 3, 0) == 1;
    event.control_key_state =
        ControlKeyState::from_bits_truncate(nth_param(payload, 4, 0) as u16);

    let rc = nth_param(payload, 5, 0);
    event.repeat_count = if rc == 0 { 1 } else { rc as u16 };

    Ok((event, term + 1))
}

// ─── Legacy CSI ──────────────────────────────────────────────────────────────

/// Parse a legacy CSI key sequence (arrows, Home/End, F1–F12, editing
/// keys, back-tab). At most two parameters: an optional key selector
/// (for `~` forms) and an optional modifier code.
pub fn parse_legacy_csi(data: &[u8]) -> Result<(InputEvent, usize), ParseError> {
    let (term, final_byte) = scan_csi(data)?;
    let payload = &data[2..term];

    let mut event = InputEvent::key();
    event.key_down = true;
    event.is_legacy = true;
    event.control_key_state = decode_ansi_modifiers(nth_param(payload, 1, 1));

    if final_byte == b'~' {
        event.virtual_key_code = map_tilde_to_vk(nth_param(payload, 0, 0));
    } else {
        event.virtual_key_code = map_csi_final_to_vk(final_byte);
        if final_byte == b'Z' {
            // Back-tab is Shift+Tab even when no modifier parameter came.
            event.control_key_state |= ControlKeyState::SHIFT;
        }
    }

    if event.virtual_key_code == 0 {
        return Err(ParseError::InvalidSequence);
    }

    Ok((event, term + 1))
}

// ─── Legacy SS3 ──────────────────────────────────────────────────────────────

/// Parse an SS3 sequence (`ESC O <letter>`): F1–F4 and Home/End on
/// terminals that use the application-keypad encoding.
pub fn parse_legacy_ss3(data: &[u8]) -> Result<(InputEvent, usize), ParseError> {
    if data.len() < 2 {
        return Err(ParseError::Incomplete);
    }
    if data[0] != 0x1B || data[1] != b'O' {
        return Err(ParseError::InvalidSequence);
    }
    if data.len() < 3 {
        return Err(ParseError::Incomplete);
    }

    let mut event = InputEvent::key();
    event.key_down = true;
    event.is_legacy = true;
    event.virtual_key_code = match data[2] {
        b'P' => vk::F1,
        b'Q' => vk::F2,
        b'R' => vk::F3,
        b'S' => vk::F4,
        b'H' => vk::HOME,
        b'F' => vk::END,
        _ => return Err(ParseError::InvalidSequence),
    };

    Ok((event, 3))
}

// ─── SGR Mouse ───────────────────────────────────────────────────────────────

/// Parse an SGR mouse report: `CSI < Pb ; X ; Y M|m`.
///
/// `M` is press/motion, `m` is release. Coordinates pass through
/// unchanged (1-based). `Pb` packs button index, motion and wheel bits,
/// and Shift/Alt/Ctrl modifiers.
#[allow(clippy::cast_possible_truncation)] // Terminal coordinates fit u16.
pub fn parse_sgr_mouse(data: &[u8]) -> Result<(InputEvent, usize), ParseError> {
    let (term, final_byte) = scan_csi(data)?;
    if final_byte != b'M' && final_byte != b'm' {
        return Err(ParseError::InvalidSequence);
    }
    if data.len() < 3 || data[2] != b'<' {
        return Err(ParseError::InvalidSequence);
    }

    let payload = &data[3..term];
    if payload.split(|&b| b == b';').count() < 3 {
        return Err(ParseError::InvalidSequence);
    }

    let pb = nth_param(payload, 0, 0);
    let px = nth_param(payload, 1, 0);
    let py = nth_param(payload, 2, 0);

    let mut event = InputEvent::mouse();
    event.mouse_x = px as u16;
    event.mouse_y = py as u16;
    event.key_down = final_byte == b'M';

    let button = pb & 0x03;
    if pb & 64 != 0 {
        // Wheel: button index selects direction.
        if button == 0 {
            event.wheel_direction = 1;
        } else if button == 1 {
            event.wheel_direction = -1;
        }
    } else {
        event.button_state = match button {
            0 => ButtonState::LEFT,
            1 => ButtonState::MIDDLE,
            2 => ButtonState::RIGHT,
            _ => ButtonState::empty(), // 3 = motion/release without a button
        };
    }

    if pb & 32 != 0 {
        event.mouse_event_flags |= MouseEventFlags::MOVED;
    }

    if pb & 4 != 0 {
        event.control_key_state |= ControlKeyState::SHIFT;
    }
    if pb & 8 != 0 {
        event.control_key_state |= ControlKeyState::LEFT_ALT;
    }
    if pb & 16 != 0 {
        event.control_key_state |= ControlKeyState::LEFT_CTRL;
    }

    Ok((event, term + 1))
}

// ─── Kitty Keyboard Protocol ─────────────────────────────────────────────────

/// Terminators the Kitty keyboard protocol uses.
const fn is_kitty_terminator(b: u8) -> bool {
    matches!(
        b,
        b'u' | b'~' | b'A' | b'B' | b'C' | b'D' | b'E' | b'F' | b'H' | b'P' | b'Q' | b'R' | b'S'
    )
}

/// Parse a Kitty keyboard sequence:
/// `CSI code[:alt_code[:base_code]] [; modifiers[:event_type]] term`.
///
/// Accepts a frame only when it is distinguishable from the legacy CSI
/// grammar: terminator `u`, or a `:` sub-parameter in the payload.
/// Byte-identical forms such as `CSI 1;5A` belong to the legacy parser.
///
/// Includes the field workarounds real terminals need: xterm
/// modifyOtherKeys reporting shifted letters as the base code, wezterm
/// sending F3 as `CSI 13~` and Backspace as code 8 with `u`.
#[allow(clippy::cast_possible_truncation)] // Letter/digit codes are ASCII-sized.
pub fn parse_kitty(data: &[u8]) -> Result<(InputEvent, usize), ParseError> {
    let (term, final_byte) = scan_csi(data)?;
    if !is_kitty_terminator(final_byte) {
        return Err(ParseError::InvalidSequence);
    }

    let payload = &data[2..term];
    if final_byte != b'u' && !payload.contains(&b':') {
        return Err(ParseError::InvalidSequence);
    }

    // Up to two `;` groups of up to three `:` sub-parameters each:
    // code:alt_code:base_code ; modifiers:event_type
    let mut params = [[0u32; 3]; 2];
    let mut group = 0;
    let mut sub = 0;
    let mut i = 0;
    while i < payload.len() {
        match payload[i] {
            b';' => {
                group += 1;
                sub = 0;
                if group >= 2 {
                    return Err(ParseError::InvalidSequence);
                }
                i += 1;
            }
            b':' => {
                sub += 1;
                if sub >= 3 {
                    return Err(ParseError::InvalidSequence);
                }
                i += 1;
            }
            b'0'..=b'9' => {
                let mut val: u32 = 0;
                while i < payload.len() && payload[i].is_ascii_digit() {
                    val = val
                        .saturating_mul(10)
                        .saturating_add(u32::from(payload[i] - b'0'));
                    i += 1;
                }
                params[group][sub] = val;
            }
            _ => return Err(ParseError::InvalidSequence),
        }
    }

    let event_type = params[1][1];
    let mod_state = params[1][0];

    let mut event = InputEvent::key();

    if params[0][0] > 0 {
        event.unshifted_ch = char::from_u32(params[0][0]).unwrap_or('\0');
    }

    if mod_state > 0 {
        let bits = mod_state - 1;
        if bits & 1 != 0 {
            event.control_key_state |= ControlKeyState::SHIFT;
        }
        if bits & 2 != 0 {
            event.control_key_state |= ControlKeyState::LEFT_ALT;
        }
        if bits & 4 != 0 {
            event.control_key_state |= ControlKeyState::LEFT_CTRL;
        }
        if bits & 8 != 0 {
            // Super reported as Ctrl (macOS terminals map Cmd here).
            event.control_key_state |= ControlKeyState::LEFT_CTRL;
        }
        if bits & 64 != 0 {
            event.control_key_state |= ControlKeyState::CAPS_LOCK;
        }
        if bits & 128 != 0 {
            event.control_key_state |= ControlKeyState::NUM_LOCK;
        }
    }

    let mut base = params[0][2];
    if base == 0 {
        base = params[0][0];
    }

    // xterm in modifyOtherKeys=2 formatOtherKeys=1 mode reports the
    // shifted letter as the base code.
    if (u32::from(b'A')..=u32::from(b'Z')).contains(&base) {
        base += 32;
    }

    if (u32::from(b'a')..=u32::from(b'z')).contains(&base) {
        event.virtual_key_code = (base - u32::from(b'a')) as u16 + vk::A;
    }
    if (u32::from(b'0')..=u32::from(b'9')).contains(&base) {
        event.virtual_key_code = base as u16;
    }

    match char::from_u32(base) {
        Some('`') => event.virtual_key_code = vk::OEM_3,
        Some('-') => event.virtual_key_code = vk::OEM_MINUS,
        Some('=') => event.virtual_key_code = vk::OEM_PLUS,
        Some('[') => event.virtual_key_code = vk::OEM_4,
        Some(']') => event.virtual_key_code = vk::OEM_6,
        Some('\\') => event.virtual_key_code = vk::OEM_5,
        Some(';') => event.virtual_key_code = vk::OEM_1,
        Some('\'') => event.virtual_key_code = vk::OEM_7,
        Some(',') => event.virtual_key_code = vk::OEM_COMMA,
        Some('.') => event.virtual_key_code = vk::OEM_PERIOD,
        Some('/') => event.virtual_key_code = vk::OEM_2,
        _ => {}
    }

    match base {
        9 => event.virtual_key_code = vk::TAB,
        27 => event.virtual_key_code = vk::ESCAPE,
        13 => {
            // wezterm #3473: F3 arrives as CSI 13~, colliding with Return.
            event.virtual_key_code = if final_byte == b'~' { vk::F3 } else { vk::RETURN };
        }
        127 => event.virtual_key_code = vk::BACK,
        32 => event.virtual_key_code = vk::SPACE,
        2 if final_byte == b'~' => event.virtual_key_code = vk::INSERT,
        3 if final_byte == b'~' => event.virtual_key_code = vk::DELETE,
        5 if final_byte == b'~' => {
            event.virtual_key_code = vk::PRIOR;
            event.control_key_state |= ControlKeyState::ENHANCED;
        }
        6 if final_byte == b'~' => {
            event.virtual_key_code = vk::NEXT;
            event.control_key_state |= ControlKeyState::ENHANCED;
        }
        // wezterm #3594: Backspace arrives as code 8 with `u`.
        8 if final_byte == b'u' => event.virtual_key_code = vk::BACK,
        11..=15 if final_byte == b'~' => event.virtual_key_code = map_tilde_to_vk(base),
        17..=21 if final_byte == b'~' => event.virtual_key_code = map_tilde_to_vk(base),
        23 | 24 if final_byte == b'~' => event.virtual_key_code = map_tilde_to_vk(base),

        // Kitty functional-key encoding: numpad digits (the second code
        // in each pair is the base-layout alias).
        57399 | 57425 => event.virtual_key_code = vk::NUMPAD0,
        57400 | 57424 => event.virtual_key_code = vk::NUMPAD0 + 1,
        57401 | 57420 => event.virtual_key_code = vk::NUMPAD0 + 2,
        57402 | 57422 => event.virtual_key_code = vk::NUMPAD0 + 3,
        57403 | 57417 => event.virtual_key_code = vk::NUMPAD0 + 4,
        57404 | 57427 => event.virtual_key_code = vk::NUMPAD0 + 5,
        57405 | 57418 => event.virtual_key_code = vk::NUMPAD0 + 6,
        57406 | 57423 => event.virtual_key_code = vk::NUMPAD0 + 7,
        57407 | 57419 => event.virtual_key_code = vk::NUMPAD0 + 8,
        57408 | 57421 => event.virtual_key_code = vk::NUMPAD0 + 9,
        57409 | 57426 => event.virtual_key_code = vk::DECIMAL,
        57410 => event.virtual_key_code = vk::DIVIDE,
        57411 => event.virtual_key_code = vk::MULTIPLY,
        57412 => event.virtual_key_code = vk::SUBTRACT,
        57413 => event.virtual_key_code = vk::ADD,
        57414 => event.virtual_key_code = vk::RETURN,

        57444 => event.virtual_key_code = vk::LWIN,
        57450 => event.virtual_key_code = vk::RWIN,
        57363 => event.virtual_key_code = vk::APPS,

        // Modifier keys report themselves; fold the matching state bit
        // in on press/repeat so the event carries its own modifier.
        57442 => {
            event.virtual_key_code = vk::CONTROL;
            if event_type != 3 {
                event.control_key_state |= ControlKeyState::LEFT_CTRL;
            }
        }
        57448 => {
            event.virtual_key_code = vk::CONTROL;
            if event_type != 3 {
                event.control_key_state |=
                    ControlKeyState::RIGHT_CTRL | ControlKeyState::ENHANCED;
            }
        }
        57443 => {
            event.virtual_key_code = vk::MENU;
            if event_type != 3 {
                event.control_key_state |= ControlKeyState::LEFT_ALT;
            }
        }
        57449 => {
            event.virtual_key_code = vk::MENU;
            if event_type != 3 {
                event.control_key_state |=
                    ControlKeyState::RIGHT_ALT | ControlKeyState::ENHANCED;
            }
        }
        57441 => {
            event.virtual_key_code = vk::SHIFT;
            event.virtual_scan_code = scan::LEFT_SHIFT;
            if event_type != 3 {
                event.control_key_state |= ControlKeyState::SHIFT;
            }
        }
        57447 => {
            event.virtual_key_code = vk::SHIFT;
            event.virtual_scan_code = scan::RIGHT_SHIFT;
            if event_type != 3 {
                event.control_key_state |= ControlKeyState::SHIFT;
            }
        }
        57360 => event.virtual_key_code = vk::NUMLOCK,
        57358 => event.virtual_key_code = vk::CAPITAL,
        _ => {}
    }

    // The terminator wins for arrow/nav/function forms.
    match final_byte {
        b'A' => {
            event.virtual_key_code = vk::UP;
            event.control_key_state |= ControlKeyState::ENHANCED;
        }
        b'B' => {
            event.virtual_key_code = vk::DOWN;
            event.control_key_state |= ControlKeyState::ENHANCED;
        }
        b'C' => {
            event.virtual_key_code = vk::RIGHT;
            event.control_key_state |= ControlKeyState::ENHANCED;
        }
        b'D' => {
            event.virtual_key_code = vk::LEFT;
            event.control_key_state |= ControlKeyState::ENHANCED;
        }
        b'E' => event.virtual_key_code = vk::CLEAR, // numpad center (5)
        b'H' => {
            event.virtual_key_code = vk::HOME;
            event.control_key_state |= ControlKeyState::ENHANCED;
        }
        b'F' => {
            event.virtual_key_code = vk::END;
            event.control_key_state |= ControlKeyState::ENHANCED;
        }
        b'P' => event.virtual_key_code = vk::F1,
        b'Q' => event.virtual_key_code = vk::F2,
        b'R' => event.virtual_key_code = vk::F3,
        b'S' => event.virtual_key_code = vk::F4,
        _ => {}
    }

    // Carrier character: the shifted/alternate code when present,
    // otherwise the primary code. Control codes, DEL, and the Kitty
    // functional range carry no character.
    let mut uc = params[0][1];
    if uc == 0 {
        uc = params[0][0];
    }
    if uc < 32 || uc == 127 || (57358..=57454).contains(&uc) {
        uc = 0;
    }
    if uc > 0 {
        event.ch = char::from_u32(uc).unwrap_or('\0');
    }

    if event.ch != '\0' && event.virtual_key_code == 0 {
        event.virtual_key_code = vk::UNASSIGNED;
    }

    if event.control_key_state.contains(ControlKeyState::CAPS_LOCK)
        && !event.control_key_state.contains(ControlKeyState::SHIFT)
    {
        event.ch = to_upper(event.ch);
    }

    event.key_down = event_type != 3;

    // Some terminals emit the shifted form under Alt; mirror that for
    // everything except the editing/whitespace keys.
    if event
        .control_key_state
        .intersects(ControlKeyState::LEFT_ALT | ControlKeyState::RIGHT_ALT)
    {
        match event.virtual_key_code {
            vk::ESCAPE | vk::DELETE | vk::BACK | vk::TAB | vk::RETURN | vk::SPACE => {}
            _ => {
                if event.ch != '\0' {
                    event.ch = to_upper(event.ch);
                }
            }
        }
    }

    Ok((event, term + 1))
}

// ─── C0 Translator ───────────────────────────────────────────────────────────

/// Translate a C0 control scalar (0x00–0x1F, 0x7F) into the key event
/// the terminal encoded it from. Returns `None` for non-control input.
///
/// Ctrl+letter arrives as the letter's position in the alphabet
/// (Ctrl+A = 0x01 … Ctrl+Z = 0x1A); the handful of punctuation control
/// codes and the editing keys get their own rows.
pub fn translate_control_key(ch: char) -> Option<InputEvent> {
    let mut event = InputEvent::key();
    event.key_down = true;
    event.is_legacy = true;

    match ch {
        '\0' => {
            // Ctrl+Space
            event.virtual_key_code = vk::SPACE;
            event.ch = ' ';
            event.control_key_state |= ControlKeyState::LEFT_CTRL;
        }
        '\u{08}' => event.virtual_key_code = vk::BACK,
        '\t' => {
            event.virtual_key_code = vk::TAB;
            event.ch = '\t';
        }
        '\r' => {
            event.virtual_key_code = vk::RETURN;
            event.ch = '\r';
        }
        '\u{1B}' => event.virtual_key_code = vk::ESCAPE,
        '\u{1C}' => {
            // Ctrl+\
            event.virtual_key_code = vk::OEM_5;
            event.control_key_state |= ControlKeyState::LEFT_CTRL;
        }
        '\u{1D}' => {
            // Ctrl+]
            event.virtual_key_code = vk::OEM_6;
            event.control_key_state |= ControlKeyState::LEFT_CTRL;
        }
        '\u{1E}' => {
            // Ctrl+^
            event.virtual_key_code = vk::N6;
            event.control_key_state |= ControlKeyState::LEFT_CTRL;
        }
        '\u{1F}' => {
            // Ctrl+_
            event.virtual_key_code = vk::OEM_MINUS;
            event.control_key_state |= ControlKeyState::LEFT_CTRL;
        }
        '\u{7F}' => event.virtual_key_code = vk::BACK,
        c @ '\u{01}'..='\u{1A}' => {
            event.virtual_key_code = vk::A + (c as u16 - 1);
            event.control_key_state |= ControlKeyState::LEFT_CTRL;
        }
        _ => return None,
    }

    Some(event)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
