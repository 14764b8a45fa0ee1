//! Key codes, key events and status byte decoding.

/// Bits of status byte 0 carrying the 1-based key index.
pub const KEYCODE_MASK: u8 = 0x07;
/// Set in status byte 0 when the key was released.
pub const RELEASE_BIT: u8 = 0x08;

/// The keys a touch-key panel can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    /// Menu / recent apps key.
    Menu,
    /// Back key.
    Back,
    /// Home key.
    Home,
    /// Search key.
    Search,
    /// Enter key (some 4-key carrier layouts).
    Enter,
    /// End / hang-up key (some 4-key carrier layouts).
    End,
}

impl KeyCode {
    /// The Linux input subsystem code of the key, for sinks forwarding to evdev.
    pub const fn input_code(self) -> u16 {
        match self {
            Self::Menu => 139,
            Self::Back => 158,
            Self::Home => 102,
            Self::Search => 217,
            Self::Enter => 28,
            Self::End => 107,
        }
    }
}

/// A single press or release edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// The 1-based index reported by the controller.
    pub index: u8,
    /// The key that index maps to on this panel.
    pub key: KeyCode,
    /// `true` for a press, `false` for a release.
    pub pressed: bool,
}

/// Decodes status byte 0 against the panel's key map.
///
/// Returns `None` when the index is 0 or beyond the number of keys.
pub fn decode(status: u8, keys: &[KeyCode]) -> Option<KeyEvent> {
    let index = status & KEYCODE_MASK;
    if index == 0 || usize::from(index) > keys.len() {
        return None;
    }
    Some(KeyEvent {
        index,
        key: keys[usize::from(index) - 1],
        pressed: status & RELEASE_BIT == 0,
    })
}

const TRACE_LEN: usize = 100;

/// Ring buffer of trace bytes kept for post-mortem debugging.
///
/// Markers: `a` interrupt entry, the raw status byte, `P` press,
/// `A` interrupt handled, `S` suspend, `R` resume, `K` probed.
pub struct DebugTrace {
    buf: [u8; TRACE_LEN],
    next: usize,
    filled: bool,
}

impl DebugTrace {
    /// An empty trace.
    pub const fn new() -> Self {
        Self {
            buf: [0; TRACE_LEN],
            next: 0,
            filled: false,
        }
    }

    /// Appends a byte, overwriting the oldest one when full.
    pub fn push(&mut self, value: u8) {
        self.buf[self.next] = value;
        self.next += 1;
        if self.next == TRACE_LEN {
            self.next = 0;
            self.filled = true;
        }
    }

    /// The recorded bytes, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        let (older, newer) = if self.filled {
            (&self.buf[self.next..], &self.buf[..self.next])
        } else {
            (&self.buf[..0], &self.buf[..self.next])
        };
        older.iter().chain(newer.iter()).copied()
    }
}

impl Default for DebugTrace {
    fn default() -> Self {
        Self::new()
    }
}
