#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! Byte-stuffed API frames, as spoken by serial radio modules in
//! "escaped API" mode.
//!
//! ```text
//! 0x7E | len hi | len lo | data[len] | checksum
//! ```
//!
//! After the leading delimiter, any of the four reserved bytes
//! (`0x7E`, `0x7D`, `0x11`, `0x13`) is sent as `0x7D, byte ^ 0x20`. The
//! checksum is chosen so that the sum of `data` and the checksum byte is
//! `0xFF` modulo 256.

/// Frame delimiter. Never escaped, always restarts accumulation.
pub const START: u8 = 0x7E;
/// Escape marker, the following byte is XORed with [`ESCAPE_MASK`].
pub const ESCAPE: u8 = 0x7D;
/// Software flow control: resume.
pub const XON: u8 = 0x11;
/// Software flow control: pause.
pub const XOFF: u8 = 0x13;
pub const ESCAPE_MASK: u8 = 0x20;

/// Delimiter plus the two length bytes.
pub const HEADER_LEN: usize = 3;

/// Is `byte` one of the values that must be escaped on the wire?
#[inline]
pub const fn is_reserved(byte: u8) -> bool {
    matches!(byte, START | ESCAPE | XON | XOFF)
}

#[inline]
fn sum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// The checksum byte to append after `data`.
#[inline]
pub fn checksum(data: &[u8]) -> u8 {
    0xFF_u8.wrapping_sub(sum(data))
}

/// Check `data`, which must include the trailing checksum byte.
#[inline]
pub fn checksum_ok(data: &[u8]) -> bool {
    sum(data) == 0xFF
}

/// The output buffer was too small
#[derive(Debug, PartialEq, Eq)]
pub struct Overflow;

/// Worst case size of [`encode`]'s output for an unescaped frame of `len` bytes.
pub const fn max_encoded_len(len: usize) -> usize {
    if len == 0 {
        0
    } else {
        1 + (len - 1) * 2
    }
}

/// Escape an unescaped frame into `out`, returning the used length.
///
/// The first byte is the delimiter slot and is copied verbatim, so callers
/// may place a different leading byte there if their link expects one.
pub fn encode(frame: &[u8], out: &mut [u8]) -> Result<usize, Overflow> {
    let Some((first, rest)) = frame.split_first() else {
        return Ok(0);
    };

    let mut used = 0;
    let mut put = |byte: u8| -> Result<(), Overflow> {
        let slot = out.get_mut(used).ok_or(Overflow)?;
        *slot = byte;
        used += 1;
        Ok(())
    };

    put(*first)?;
    for &byte in rest {
        if is_reserved(byte) {
            put(ESCAPE)?;
            put(byte ^ ESCAPE_MASK)?;
        } else {
            put(byte)?;
        }
    }
    Ok(used)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for a delimiter, everything else is line noise
    Idle,
    Processing,
    /// Processing, and the next byte must be unescaped
    Escaping,
}

/// Decodes escaped frames one byte at a time, without allocating.
///
/// Storage is anything that can lend a mutable byte slice: an inline
/// array for `static` use, or a boxed slice on hosts.
///
/// This is cheap enough to run from a receive interrupt: every call does a
/// bounded amount of work, and a completed frame is handed back as a view
/// into the storage buffer.
pub struct Accumulator<B: AsMut<[u8]>> {
    buf: B,
    idx: usize,
    expected: Option<usize>,
    state: State,
}

/// The result of feeding a single byte.
#[derive(Debug, PartialEq)]
pub enum FeedResult<'buf> {
    /// Consumed the byte, no frame yet.
    Consumed,

    /// The frame did not fit in the storage buffer and was dropped.
    OverFull,

    /// The declared length cannot hold a checksum, frame dropped.
    Malformed,

    /// All declared bytes arrived, but the checksum did not add up.
    ChecksumError,

    /// A complete, verified frame. Contains the unescaped bytes from the
    /// delimiter through the checksum.
    Success(&'buf [u8]),
}

/// The result of feeding a chunk with [`Accumulator::feed_raw`].
#[derive(Debug, PartialEq)]
pub enum FeedRawResult<'input, 'buf> {
    /// Consumed all data, still pending.
    Consumed,

    /// A frame was dropped for overflow. Contains remaining input.
    OverFull(&'input [u8]),

    /// A frame was dropped for a bad length. Contains remaining input.
    Malformed(&'input [u8]),

    /// A frame was dropped for a bad checksum. Contains remaining input.
    ChecksumError(&'input [u8]),

    /// We decoded a frame successfully.
    Success {
        /// Decoded frame, stored in the accumulator buffer.
        data: &'buf [u8],

        /// Remaining data left in the input after this frame.
        remaining: &'input [u8],
    },
}

enum Step {
    Pending,
    OverFull,
    Malformed,
    ChecksumError,
    Complete(usize),
}

#[cfg(any(feature = "std", test))]
impl Accumulator<Box<[u8]>> {
    pub fn new_boxslice(len: usize) -> Self {
        Self::new(vec![0u8; len].into_boxed_slice())
    }
}

impl<B: AsMut<[u8]>> Accumulator<B> {
    /// Create a new accumulator. The largest frame it can hold, escapes
    /// removed, is the length of `buf`.
    pub const fn new(buf: B) -> Self {
        Accumulator {
            buf,
            idx: 0,
            expected: None,
            state: State::Idle,
        }
    }

    /// Drop any partial frame and wait for the next delimiter.
    pub fn reset(&mut self) {
        self.idx = 0;
        self.expected = None;
        self.state = State::Idle;
    }

    /// Is the accumulator between frames?
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Feed one byte from the line.
    pub fn feed(&mut self, byte: u8) -> FeedResult<'_> {
        match self.step(byte) {
            Step::Pending => FeedResult::Consumed,
            Step::OverFull => FeedResult::OverFull,
            Step::Malformed => FeedResult::Malformed,
            Step::ChecksumError => FeedResult::ChecksumError,
            Step::Complete(len) => FeedResult::Success(&self.buf.as_mut()[..len]),
        }
    }

    /// Feed a chunk of bytes, stopping at the first frame event.
    ///
    /// Callers should keep feeding the `remaining` part of the input until
    /// they get [`FeedRawResult::Consumed`].
    pub fn feed_raw<'me, 'input>(&'me mut self, input: &'input [u8]) -> FeedRawResult<'input, 'me> {
        for (i, &byte) in input.iter().enumerate() {
            let remaining = &input[i + 1..];
            match self.step(byte) {
                Step::Pending => {}
                Step::OverFull => return FeedRawResult::OverFull(remaining),
                Step::Malformed => return FeedRawResult::Malformed(remaining),
                Step::ChecksumError => return FeedRawResult::ChecksumError(remaining),
                Step::Complete(len) => {
                    return FeedRawResult::Success {
                        data: &self.buf.as_mut()[..len],
                        remaining,
                    };
                }
            }
        }
        FeedRawResult::Consumed
    }

    fn step(&mut self, byte: u8) -> Step {
        if byte == START {
            self.reset();
            self.state = State::Processing;
            return self.store(byte);
        }

        match self.state {
            State::Idle => Step::Pending,
            State::Processing | State::Escaping if byte == ESCAPE => {
                self.state = State::Escaping;
                Step::Pending
            }
            State::Escaping => {
                self.state = State::Processing;
                self.store(byte ^ ESCAPE_MASK)
            }
            State::Processing => self.store(byte),
        }
    }

    fn store(&mut self, byte: u8) -> Step {
        let buf = self.buf.as_mut();
        let Some(slot) = buf.get_mut(self.idx) else {
            self.reset();
            return Step::OverFull;
        };
        *slot = byte;
        self.idx += 1;

        // The length is known once the first data byte is in
        if self.idx == HEADER_LEN + 1 {
            let declared = u16::from_be_bytes([buf[1], buf[2]]) as usize;
            let total = declared + HEADER_LEN + 1;
            if declared == 0 {
                self.reset();
                return Step::Malformed;
            }
            if total > buf.len() {
                self.reset();
                return Step::OverFull;
            }
            self.expected = Some(total);
        }

        match self.expected {
            Some(total) if self.idx == total => {
                let ok = checksum_ok(&buf[HEADER_LEN..total]);
                self.reset();
                if ok {
                    Step::Complete(total)
                } else {
                    Step::ChecksumError
                }
            }
            _ => Step::Pending,
        }
    }

    #[doc(hidden)]
    #[cfg(test)]
    pub fn contents(&mut self) -> Option<&[u8]> {
        if self.is_idle() {
            None
        } else {
            Some(&self.buf.as_mut()[..self.idx])
        }
    }
}
