// SPDX-License-Identifier: MIT
//
// vtinput — Terminal input decoder.
//
// Converts the raw byte stream a terminal emits in raw mode into
// Windows-Console-style input events: key press/release with virtual
// key codes, scan codes and modifier masks; mouse buttons, motion and
// wheel; focus changes; bracketed-paste boundaries.
//
// Four escape-sequence dialects coexist on the wire (Win32 Input Mode,
// legacy CSI/SS3, SGR mouse, and the Kitty keyboard protocol), and they
// share leading bytes. The decoder frames control sequences, dispatches
// by terminator character, reassembles multi-byte UTF-8, and resolves
// the lone-ESC ambiguity with a 100 ms timeout against a background
// producer task. No byte is ever lost; incomplete sequences wait for
// more input instead of failing.
//
// This crate intentionally avoids terminal frameworks (ratatui,
// crossterm) in favor of direct byte-level decoding and raw termios.
// Every escape sequence we accept is one we can name.

pub mod event;
pub mod parser;
pub mod reader;
pub mod terminal;
