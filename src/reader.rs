// SPDX-License-Identifier: MIT
//
// Stateful reader — turns a blocking byte source into one event per call.
//
// A dedicated producer thread reads the source in blocking mode and
// feeds individual bytes through a bounded channel. The consumer side
// (`read_event`) buffers bytes, disambiguates between the escape
// dialects, and blocks until exactly one event can be produced or the
// source is exhausted.
//
// Why a producer thread? Because the lone-ESC ambiguity needs a
// bounded-time answer: an ESC byte followed by silence is the Escape
// key, an ESC byte followed by more bytes is (probably) a sequence.
// `recv_timeout` on the channel races the next byte against the 100 ms
// escape timeout; a plain blocking `read()` could not time out.
//
// Ordering: the channel is FIFO and the producer drops its sender only
// after the final byte, so every byte queued before EOF/error is seen
// by the consumer before the terminal condition is. The buffer drains
// completely before `read_event` reports the end.

use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::Duration;

use tracing::trace;

use crate::event::{vk, ControlKeyState, InputEvent};
use crate::parser::{
    parse_kitty, parse_legacy_csi, parse_legacy_ss3, parse_sgr_mouse, parse_win32, scan_csi,
    translate_control_key, ParseError,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// The canonical escape timeout: how long a lone ESC waits for a
/// follow-up byte before it is reported as the Escape key. Fixed by
/// design; tests may shim it, the default holds.
pub const ESC_TIMEOUT: Duration = Duration::from_millis(100);

/// Bounded byte queue between producer and consumer. The producer
/// blocks when it is full: back-pressure, not loss.
const QUEUE_CAPACITY: usize = 1024;

/// Producer-side read chunk. A keypress is 1–6 bytes, a paste can be
/// kilobytes; the producer re-reads in a loop either way.
const READ_CHUNK: usize = 256;

// ─── Producer ────────────────────────────────────────────────────────────────

/// Pump loop: blocking reads from the source, one byte at a time into
/// the queue. Exits when the source ends, the source fails, or the
/// consumer goes away. An error is parked in the single-slot terminal
/// channel; either way the data sender is dropped last, which is what
/// the consumer observes as end-of-stream.
fn pump<R: Read>(mut source: R, data_tx: &SyncSender<u8>, err_tx: &SyncSender<io::Error>) {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match source.read(&mut chunk) {
            Ok(0) => return, // EOF
            Ok(n) => {
                for &b in &chunk[..n] {
                    if data_tx.send(b).is_err() {
                        // Consumer dropped; nobody is listening.
                        return;
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                let _ = err_tx.send(e);
                return;
            }
        }
    }
}

// ─── Decode Step Results ─────────────────────────────────────────────────────

/// Outcome of one decode attempt against the buffer head.
enum Decoded {
    /// An event is ready; consume this many buffer bytes.
    Event(InputEvent, usize),
    /// The buffer is a strict prefix of something valid; wait.
    NeedMore,
}

/// Outcome of the wait-for-more race.
enum Wait {
    /// A byte arrived; re-run the decode.
    GotByte,
    /// The escape timeout elapsed (or the source is finished and can
    /// never complete the sequence).
    TimedOut,
}

// ─── InputReader ─────────────────────────────────────────────────────────────

/// Decodes a raw terminal byte stream into [`InputEvent`]s, one per
/// call.
///
/// Owns an internal buffer and a background producer thread. Bytes are
/// never lost: each call consumes exactly the bytes of the event it
/// returns, and incomplete sequences stay buffered until more input
/// arrives.
///
/// # Example
///
/// ```no_run
/// use vtinput::reader::InputReader;
///
/// let mut reader = InputReader::new(std::io::stdin());
/// while let Some(event) = reader.read_event()? {
///     println!("{event}");
/// }
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct InputReader {
    /// Bytes received but not yet consumed by an event.
    buf: Vec<u8>,
    data_rx: Receiver<u8>,
    err_rx: Receiver<io::Error>,
    /// Set once the producer has dropped its sender.
    source_done: bool,
    /// Source error parked until the buffer is fully drained.
    pending_err: Option<io::Error>,
    esc_timeout: Duration,
}

impl InputReader {
    /// Start decoding `source` with the default [`ESC_TIMEOUT`].
    ///
    /// Spawns the producer thread immediately. The thread exits when
    /// the source reports EOF or an error, or when the reader is
    /// dropped and the source produces its next byte.
    ///
    /// # Panics
    ///
    /// Panics if the OS cannot spawn a thread (extremely rare).
    #[must_use]
    pub fn new<R: Read + Send + 'static>(source: R) -> Self {
        Self::with_esc_timeout(source, ESC_TIMEOUT)
    }

    /// Start decoding with a custom escape timeout. Intended for tests
    /// that shim the clock; production callers want [`new`](Self::new).
    #[must_use]
    pub fn with_esc_timeout<R: Read + Send + 'static>(source: R, esc_timeout: Duration) -> Self {
        let (data_tx, data_rx) = mpsc::sync_channel(QUEUE_CAPACITY);
        let (err_tx, err_rx) = mpsc::sync_channel(1);

        thread::Builder::new()
            .name("vtinput-pump".into())
            .spawn(move || pump(source, &data_tx, &err_tx))
            .expect("failed to spawn input pump thread");

        Self {
            buf: Vec::with_capacity(128),
            data_rx,
            err_rx,
            source_done: false,
            pending_err: None,
            esc_timeout,
        }
    }

    /// Read the next input event.
    ///
    /// Blocks until one event is available. Returns `Ok(None)` on clean
    /// end-of-stream and `Err` with the source's error, in both cases
    /// only after every byte received beforehand has been decoded.
    pub fn read_event(&mut self) -> io::Result<Option<InputEvent>> {
        loop {
            if self.buf.is_empty() {
                if self.source_done {
                    return self.terminal_condition();
                }
                match self.data_rx.recv() {
                    Ok(b) => self.buf.push(b),
                    Err(mpsc::RecvError) => {
                        self.note_source_done();
                        continue;
                    }
                }
            }

            if self.buf[0] == 0x1B {
                match self.try_decode_escape() {
                    Decoded::Event(event, consumed) => {
                        self.buf.drain(..consumed);
                        return Ok(Some(event));
                    }
                    Decoded::NeedMore => match self.wait_for_more() {
                        Wait::GotByte => {}
                        Wait::TimedOut => {
                            // The race is settled: that ESC was a keypress.
                            trace!("escape timeout elapsed, emitting bare Esc");
                            self.buf.drain(..1);
                            return Ok(Some(esc_key()));
                        }
                    },
                }
                continue;
            }

            match self.try_decode_plain() {
                Decoded::Event(event, consumed) => {
                    self.buf.drain(..consumed);
                    return Ok(Some(event));
                }
                Decoded::NeedMore => {
                    // Partial UTF-8 scalar: block without a timeout. If
                    // the source ends mid-scalar the tail is dropped.
                    if self.source_done {
                        self.buf.clear();
                        return self.terminal_condition();
                    }
                    match self.data_rx.recv() {
                        Ok(b) => self.buf.push(b),
                        Err(mpsc::RecvError) => {
                            self.note_source_done();
                            self.buf.clear();
                            return self.terminal_condition();
                        }
                    }
                }
            }
        }
    }

    // ── Escape-prefixed decoding ────────────────────────────────────

    /// Try to decode the buffer as an escape-initiated construct:
    /// SS3, a complete CSI frame, double-ESC, or legacy Alt+key.
    fn try_decode_escape(&self) -> Decoded {
        // SS3 first: `ESC O letter` has no CSI frame to scan.
        match parse_legacy_ss3(&self.buf) {
            Ok((event, n)) => return Decoded::Event(event, n),
            Err(ParseError::Incomplete) => return Decoded::NeedMore,
            Err(ParseError::InvalidSequence) => {}
        }

        match scan_csi(&self.buf) {
            Ok((term_idx, final_byte)) => {
                match dispatch_csi(&self.buf, term_idx, final_byte) {
                    Ok((event, n)) => return Decoded::Event(event, n),
                    Err(ParseError::Incomplete) => return Decoded::NeedMore,
                    // Not any dialect we speak: fall through to the
                    // double-ESC / Alt+key recovery below.
                    Err(ParseError::InvalidSequence) => {}
                }
            }
            Err(ParseError::Incomplete) => return Decoded::NeedMore,
            Err(ParseError::InvalidSequence) => {}
        }

        // Double ESC: one Escape keypress, both bytes consumed.
        if self.buf.len() >= 2 && self.buf[1] == 0x1B {
            return Decoded::Event(esc_key(), 2);
        }

        // Legacy Alt+key: ESC immediately followed by a UTF-8 scalar.
        if self.buf.len() >= 2 {
            return match decode_utf8(&self.buf[1..]) {
                Utf8::Scalar(ch, n) => Decoded::Event(alt_char_key(ch), 1 + n),
                // Garbage after ESC decodes as one replacement scalar.
                Utf8::Invalid => Decoded::Event(alt_char_key(char::REPLACEMENT_CHARACTER), 2),
                Utf8::Incomplete => Decoded::NeedMore,
            };
        }

        // Bare ESC: only the timeout can answer this one.
        Decoded::NeedMore
    }

    // ── Plain (non-escape) decoding ─────────────────────────────────

    /// Decode the buffer head as DEL, a C0 control, or a UTF-8 scalar.
    fn try_decode_plain(&self) -> Decoded {
        if self.buf[0] == 0x7F {
            return Decoded::Event(backspace_key(), 1);
        }

        match decode_utf8(&self.buf) {
            Utf8::Scalar(ch, n) => match translate_control_key(ch) {
                Some(event) => Decoded::Event(event, n),
                None => Decoded::Event(char_key(ch), n),
            },
            Utf8::Invalid => Decoded::Event(char_key(char::REPLACEMENT_CHARACTER), 1),
            Utf8::Incomplete => Decoded::NeedMore,
        }
    }

    // ── Waiting ─────────────────────────────────────────────────────

    /// Race the next byte against the escape timeout.
    ///
    /// The timer starts fresh on every entry; it is a race against the
    /// queue's receive, not a countdown held across calls. Once the
    /// source is done no byte can ever arrive, so the answer is
    /// immediate.
    fn wait_for_more(&mut self) -> Wait {
        if self.source_done {
            return Wait::TimedOut;
        }
        match self.data_rx.recv_timeout(self.esc_timeout) {
            Ok(b) => {
                self.buf.push(b);
                Wait::GotByte
            }
            Err(RecvTimeoutError::Timeout) => Wait::TimedOut,
            Err(RecvTimeoutError::Disconnected) => {
                self.note_source_done();
                // The pending sequence can never complete.
                Wait::TimedOut
            }
        }
    }

    // ── Terminal condition ──────────────────────────────────────────

    /// Record that the producer is gone and park its error, if any.
    fn note_source_done(&mut self) {
        self.source_done = true;
        if self.pending_err.is_none() {
            self.pending_err = self.err_rx.try_recv().ok();
        }
        trace!(had_error = self.pending_err.is_some(), "input source finished");
    }

    /// Report the end of the stream: the parked source error once, then
    /// clean EOF.
    fn terminal_condition(&mut self) -> io::Result<Option<InputEvent>> {
        match self.pending_err.take() {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

// ─── CSI Dispatch ────────────────────────────────────────────────────────────

/// Route a complete CSI frame to its dialect by terminator.
fn dispatch_csi(
    buf: &[u8],
    term_idx: usize,
    final_byte: u8,
) -> Result<(InputEvent, usize), ParseError> {
    let payload = &buf[2..term_idx];
    match final_byte {
        b'_' => parse_win32(buf),
        b'M' | b'm' => parse_sgr_mouse(buf),
        b'I' if term_idx == 2 => Ok((InputEvent::focus(true), 3)),
        b'O' if term_idx == 2 => Ok((InputEvent::focus(false), 3)),
        b'~' if payload == b"200" => Ok((InputEvent::paste(true), term_idx + 1)),
        b'~' if payload == b"201" => Ok((InputEvent::paste(false), term_idx + 1)),
        _ => parse_kitty(buf).or_else(|err| match err {
            ParseError::InvalidSequence => parse_legacy_csi(buf),
            ParseError::Incomplete => Err(err),
        }),
    }
}

// ─── Event Constructors ──────────────────────────────────────────────────────

const fn esc_key() -> InputEvent {
    let mut e = InputEvent::key();
    e.virtual_key_code = vk::ESCAPE;
    e.key_down = true;
    e.is_legacy = true;
    e
}

const fn backspace_key() -> InputEvent {
    let mut e = InputEvent::key();
    e.virtual_key_code = vk::BACK;
    e.key_down = true;
    e.is_legacy = true;
    e
}

/// A bare character keypress: no key identity, just the scalar.
const fn char_key(ch: char) -> InputEvent {
    let mut e = InputEvent::key();
    e.ch = ch;
    e.key_down = true;
    e.is_legacy = true;
    e
}

const fn alt_char_key(ch: char) -> InputEvent {
    let mut e = char_key(ch);
    e.control_key_state = ControlKeyState::LEFT_ALT;
    e
}

// ─── UTF-8 ───────────────────────────────────────────────────────────────────

enum Utf8 {
    Scalar(char, usize),
    Incomplete,
    Invalid,
}

/// Expected byte length of a UTF-8 character from its lead byte.
/// Returns 0 for invalid lead bytes (continuation bytes, 0xF8..=0xFF).
const fn utf8_char_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 0,
    }
}

/// Decode one scalar from the front of `buf`.
fn decode_utf8(buf: &[u8]) -> Utf8 {
    debug_assert!(!buf.is_empty());

    let len = utf8_char_len(buf[0]);
    if len == 0 {
        return Utf8::Invalid;
    }
    if buf.len() < len {
        return Utf8::Incomplete;
    }
    for &b in &buf[1..len] {
        if b & 0xC0 != 0x80 {
            return Utf8::Invalid;
        }
    }

    // Overlong encodings and surrogates still fail here.
    match std::str::from_utf8(&buf[..len]) {
        Ok(s) => s.chars().next().map_or(Utf8::Invalid, |ch| Utf8::Scalar(ch, len)),
        Err(_) => Utf8::Invalid,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ButtonState, EventKind};
    use std::time::Instant;

    /// A blocking byte source fed by a channel, for tests that control
    /// delivery timing. Chunks must fit the read buffer.
    struct ChannelSource(mpsc::Receiver<Vec<u8>>);

    impl Read for ChannelSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.recv() {
                Ok(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Err(_) => Ok(0),
            }
        }
    }

    fn channel_reader() -> (mpsc::Sender<Vec<u8>>, InputReader) {
        let (tx, rx) = mpsc::channel();
        (tx, InputReader::new(ChannelSource(rx)))
    }

    /// A source that yields some bytes and then an I/O error.
    struct FailingSource {
        data: Vec<u8>,
        served: bool,
    }

    impl Read for FailingSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "tty gone"));
            }
            self.served = true;
            buf[..self.data.len()].copy_from_slice(&self.data);
            Ok(self.data.len())
        }
    }

    /// Decode a fixed byte stream to completion.
    fn read_all(bytes: &[u8]) -> Vec<InputEvent> {
        let mut reader = InputReader::new(io::Cursor::new(bytes.to_vec()));
        let mut events = Vec::new();
        while let Some(event) = reader.read_event().expect("read_event failed") {
            events.push(event);
        }
        events
    }

    /// Decode a stream expected to produce exactly one event.
    fn read_one(bytes: &[u8]) -> InputEvent {
        let events = read_all(bytes);
        assert_eq!(events.len(), 1, "expected 1 event, got {events:?}");
        events[0]
    }

    // ── Literal end-to-end scenarios ────────────────────────────────────

    #[test]
    fn scenario_arrow_up() {
        let e = read_one(b"\x1b[A");
        assert_eq!(e.virtual_key_code, vk::UP);
        assert!(e.key_down);
        assert_eq!(e.control_key_state, ControlKeyState::empty());
        assert!(e.is_legacy);
    }

    #[test]
    fn scenario_ctrl_up() {
        let e = read_one(b"\x1b[1;5A");
        assert_eq!(e.virtual_key_code, vk::UP);
        assert_eq!(e.control_key_state, ControlKeyState::LEFT_CTRL);
        assert!(e.is_legacy);
    }

    #[test]
    fn scenario_back_tab() {
        let e = read_one(b"\x1b[Z");
        assert_eq!(e.virtual_key_code, vk::TAB);
        assert!(e.control_key_state.contains(ControlKeyState::SHIFT));
        assert!(e.is_legacy);
    }

    #[test]
    fn scenario_win32_f1_ctrl() {
        let e = read_one(b"\x1b[112;59;0;1;8;1_");
        assert_eq!(e.virtual_key_code, 0x70);
        assert_eq!(e.virtual_scan_code, 0x3B);
        assert!(e.key_down);
        assert_eq!(e.control_key_state, ControlKeyState::LEFT_CTRL);
        assert_eq!(e.repeat_count, 1);
        assert!(!e.is_legacy);
    }

    #[test]
    fn scenario_ss3_f3() {
        let e = read_one(b"\x1bOR");
        assert_eq!(e.virtual_key_code, vk::F3);
        assert!(e.key_down);
        assert!(e.is_legacy);
    }

    #[test]
    fn scenario_mouse_left_press() {
        let e = read_one(b"\x1b[<0;10;20M");
        assert_eq!(e.kind, EventKind::Mouse);
        assert_eq!((e.mouse_x, e.mouse_y), (10, 20));
        assert_eq!(e.button_state, ButtonState::LEFT);
        assert!(e.key_down);
        assert!(!e.is_legacy);
    }

    #[test]
    fn scenario_mouse_wheel_up() {
        let e = read_one(b"\x1b[<64;10;20M");
        assert_eq!((e.mouse_x, e.mouse_y), (10, 20));
        assert_eq!(e.wheel_direction, 1);
    }

    #[test]
    fn scenario_focus_gained() {
        let e = read_one(b"\x1b[I");
        assert_eq!(e.kind, EventKind::Focus);
        assert!(e.set_focus);
        assert!(!e.is_legacy);
    }

    #[test]
    fn scenario_focus_lost() {
        let e = read_one(b"\x1b[O");
        assert_eq!(e.kind, EventKind::Focus);
        assert!(!e.set_focus);
    }

    #[test]
    fn scenario_paste_start() {
        let e = read_one(b"\x1b[200~");
        assert_eq!(e.kind, EventKind::Paste);
        assert!(e.paste_start);
        assert!(!e.is_legacy);
    }

    #[test]
    fn scenario_paste_end() {
        let e = read_one(b"\x1b[201~");
        assert_eq!(e.kind, EventKind::Paste);
        assert!(!e.paste_start);
    }

    #[test]
    fn scenario_ctrl_c() {
        let e = read_one(b"\x03");
        assert_eq!(e.virtual_key_code, vk::C);
        assert_eq!(e.control_key_state, ControlKeyState::LEFT_CTRL);
        assert!(e.is_legacy);
    }

    #[test]
    fn scenario_double_esc_is_one_escape() {
        // Both bytes consumed, one event.
        let events = read_all(b"\x1b\x1b");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].virtual_key_code, vk::ESCAPE);
        assert!(events[0].is_legacy);
    }

    #[test]
    fn scenario_lone_esc_times_out() {
        let (tx, mut reader) = channel_reader();
        tx.send(vec![0x1B]).unwrap();

        let start = Instant::now();
        let e = reader.read_event().unwrap().unwrap();
        let elapsed = start.elapsed();

        assert_eq!(e.virtual_key_code, vk::ESCAPE);
        assert!(e.is_legacy);
        // The default escape timeout must actually hold (90ms guards
        // against scheduler jitter).
        assert!(elapsed >= Duration::from_millis(90), "returned after {elapsed:?}");

        drop(tx);
        assert!(reader.read_event().unwrap().is_none());
    }

    #[test]
    fn scenario_alt_cyrillic() {
        let e = read_one(b"\x1b\xD0\xB0");
        assert_eq!(e.ch, 'а');
        assert_eq!(e.control_key_state, ControlKeyState::LEFT_ALT);
        assert_eq!(e.virtual_key_code, 0);
        assert!(e.is_legacy);
    }

    #[test]
    fn scenario_win32_all_defaults() {
        let e = read_one(b"\x1b[;;;;;_");
        assert_eq!(e.virtual_key_code, 0);
        assert_eq!(e.repeat_count, 1);
        assert!(!e.key_down);
        assert!(!e.is_legacy);
    }

    #[test]
    fn scenario_backspace_byte() {
        let e = read_one(b"\x08");
        assert_eq!(e.virtual_key_code, vk::BACK);
        assert!(e.is_legacy);
    }

    // ── Plain input ─────────────────────────────────────────────────────

    #[test]
    fn ascii_run_in_order() {
        let events = read_all(b"abc");
        let chars: Vec<char> = events.iter().map(|e| e.ch).collect();
        assert_eq!(chars, vec!['a', 'b', 'c']);
        for e in &events {
            assert_eq!(e.virtual_key_code, 0);
            assert!(e.key_down);
            assert!(e.is_legacy);
            assert_eq!(e.repeat_count, 1);
        }
    }

    #[test]
    fn utf8_multibyte_char() {
        let e = read_one("€".as_bytes());
        assert_eq!(e.ch, '€');
        assert!(e.is_legacy);
    }

    #[test]
    fn utf8_four_byte_char() {
        let e = read_one("𝄞".as_bytes());
        assert_eq!(e.ch, '𝄞');
    }

    #[test]
    fn del_byte_is_backspace() {
        let e = read_one(b"\x7f");
        assert_eq!(e.virtual_key_code, vk::BACK);
    }

    #[test]
    fn stray_continuation_byte_is_replacement() {
        let e = read_one(b"\x80");
        assert_eq!(e.ch, char::REPLACEMENT_CHARACTER);
    }

    #[test]
    fn mixed_control_stream() {
        // Ctrl+C, Shift+Tab, double ESC, Ctrl+Space, Ctrl+\, Ctrl+H,
        // Ctrl+^, Ctrl+_: the classic control gauntlet.
        let events = read_all(&[0x03, 0x1B, b'[', b'Z', 0x1B, 0x1B, 0x00, 0x1C, 0x08, 0x1E, 0x1F]);
        let vks: Vec<u16> = events.iter().map(|e| e.virtual_key_code).collect();
        assert_eq!(
            vks,
            vec![vk::C, vk::TAB, vk::ESCAPE, vk::SPACE, vk::OEM_5, vk::BACK, vk::N6, vk::OEM_MINUS]
        );
    }

    // ── Split delivery ──────────────────────────────────────────────────

    #[test]
    fn sequence_split_across_reads() {
        let (tx, mut reader) = channel_reader();
        tx.send(vec![0x1B]).unwrap();
        tx.send(vec![b'[']).unwrap();
        tx.send(vec![b'A']).unwrap();

        let e = reader.read_event().unwrap().unwrap();
        assert_eq!(e.virtual_key_code, vk::UP);
    }

    #[test]
    fn win32_split_mid_parameters() {
        let (tx, mut reader) = channel_reader();
        tx.send(b"\x1b[112;5".to_vec()).unwrap();
        tx.send(b"9;0;1;8;1_".to_vec()).unwrap();

        let e = reader.read_event().unwrap().unwrap();
        assert_eq!(e.virtual_key_code, 0x70);
        assert_eq!(e.virtual_scan_code, 0x3B);
    }

    #[test]
    fn shimmed_timeout_is_fast() {
        let (tx, mut reader) = {
            let (tx, rx) = mpsc::channel();
            (
                tx,
                InputReader::with_esc_timeout(ChannelSource(rx), Duration::from_millis(5)),
            )
        };
        tx.send(vec![0x1B]).unwrap();

        let start = Instant::now();
        let e = reader.read_event().unwrap().unwrap();
        assert_eq!(e.virtual_key_code, vk::ESCAPE);
        assert!(start.elapsed() < Duration::from_millis(90));
    }

    // ── Recovery and fallthrough ────────────────────────────────────────

    #[test]
    fn unknown_csi_falls_back_to_alt_bracket() {
        // CSI 99~ is no dialect; recovery treats it as Alt+[ then text.
        let events = read_all(b"\x1b[99~");
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].ch, '[');
        assert_eq!(events[0].control_key_state, ControlKeyState::LEFT_ALT);
        assert_eq!(events[1].ch, '9');
        assert_eq!(events[2].ch, '9');
        assert_eq!(events[3].ch, '~');
    }

    #[test]
    fn paste_markers_bracket_plain_text() {
        let events = read_all(b"\x1b[200~hi\x1b[201~");
        assert_eq!(events.len(), 4);
        assert!(events[0].paste_start);
        assert_eq!(events[1].ch, 'h');
        assert_eq!(events[2].ch, 'i');
        assert!(!events[3].paste_start);
        assert_eq!(events[3].kind, EventKind::Paste);
    }

    #[test]
    fn kitty_u_dispatches_before_legacy() {
        let e = read_one(b"\x1b[97;5u");
        assert_eq!(e.virtual_key_code, vk::A);
        assert_eq!(e.control_key_state, ControlKeyState::LEFT_CTRL);
        assert!(!e.is_legacy);
    }

    #[test]
    fn kitty_release_event_reaches_caller() {
        let e = read_one(b"\x1b[97;1:3u");
        assert!(!e.key_down);
        assert!(!e.is_legacy);
    }

    // ── End-of-stream behavior ──────────────────────────────────────────

    #[test]
    fn eof_resolves_pending_esc_immediately() {
        // Source closes right after a lone ESC: no data can arrive, so
        // the Escape verdict needs no 100ms wait.
        let start = Instant::now();
        let events = read_all(b"\x1b");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].virtual_key_code, vk::ESCAPE);
        assert!(start.elapsed() < Duration::from_millis(90));
    }

    #[test]
    fn eof_drains_unfinished_csi_as_text() {
        // `ESC [ 1` can never complete once the stream ends.
        let events = read_all(b"\x1b[1");
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].virtual_key_code, vk::ESCAPE);
        assert_eq!(events[1].ch, '[');
        assert_eq!(events[2].ch, '1');
    }

    #[test]
    fn eof_drops_partial_utf8_tail() {
        // 0xD0 starts a two-byte scalar that never finishes.
        let events = read_all(b"ab\xD0");
        let chars: Vec<char> = events.iter().map(|e| e.ch).collect();
        assert_eq!(chars, vec!['a', 'b']);
    }

    #[test]
    fn eof_after_drain_is_sticky() {
        let mut reader = InputReader::new(io::Cursor::new(b"a".to_vec()));
        assert_eq!(reader.read_event().unwrap().unwrap().ch, 'a');
        assert!(reader.read_event().unwrap().is_none());
        assert!(reader.read_event().unwrap().is_none());
    }

    #[test]
    fn source_error_surfaces_after_buffer_drains() {
        let source = FailingSource {
            data: b"ab".to_vec(),
            served: false,
        };
        let mut reader = InputReader::new(source);

        assert_eq!(reader.read_event().unwrap().unwrap().ch, 'a');
        assert_eq!(reader.read_event().unwrap().unwrap().ch, 'b');

        let err = reader.read_event().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

        // After the error is taken, the stream reads as ended.
        assert!(reader.read_event().unwrap().is_none());
    }

    #[test]
    fn drop_reader_does_not_hang() {
        let (tx, reader) = channel_reader();
        drop(reader);
        // Producer exits on its next failed send; this must not block.
        let _ = tx.send(vec![b'x']);
    }

    // ── Event accounting ────────────────────────────────────────────────

    #[test]
    fn every_key_event_has_identity_or_char() {
        let events = read_all(b"a\x03\x1b[A\x1bOR\x1b\xC3\xA9\x7f");
        for e in &events {
            assert!(
                e.virtual_key_code != 0 || e.ch != '\0',
                "key event with neither identity nor char: {e:?}"
            );
        }
    }

    #[test]
    fn repeat_count_never_zero() {
        let events = read_all(b"a\x1b[A\x1b[<0;1;1M\x1b[97u\x1b[1;2;3;1;0;5_");
        for e in &events {
            assert!(e.repeat_count >= 1, "{e:?}");
        }
    }

    #[test]
    fn legacy_flag_per_source_protocol() {
        assert!(read_one(b"\x1b[A").is_legacy); // legacy CSI
        assert!(read_one(b"\x1bOR").is_legacy); // SS3
        assert!(read_one(b"\x03").is_legacy); // C0
        assert!(read_one(b"x").is_legacy); // bare UTF-8
        assert!(!read_one(b"\x1b[97u").is_legacy); // Kitty
        assert!(!read_one(b"\x1b[;;;;;_").is_legacy); // Win32
        assert!(!read_one(b"\x1b[I").is_legacy); // focus
        assert!(!read_one(b"\x1b[200~").is_legacy); // paste
        assert!(!read_one(b"\x1b[<0;1;1M").is_legacy); // SGR mouse
    }

    #[test]
    fn legacy_events_are_never_releases() {
        let events = read_all(b"a\x03\x1b[A\x1bOR\x7f\x1b\x1b");
        for e in &events {
            assert!(e.key_down, "legacy event reported a release: {e:?}");
        }
    }
}
