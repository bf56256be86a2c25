use super::Marker;

/// Where the decoder sits in the capture protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Capturing,
    Terminated,
}

/// Output of one decoded byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    /// A response byte that belongs in the capture.
    Data(u8),
    /// A marker completed on this byte.
    Marker(Marker),
}

/// What one [`FrameDecoder::push`] produced: at most one released capture byte,
/// then at most one marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decoded {
    pub data: Option<u8>,
    pub marker: Option<Marker>,
}

impl Decoded {
    /// Data before marker, the order the bytes arrived in.
    pub fn events(self) -> impl Iterator<Item = FrameEvent> {
        self.data
            .map(FrameEvent::Data)
            .into_iter()
            .chain(self.marker.map(FrameEvent::Marker))
    }
}

/// Splits a live byte stream into response bytes and markers.
///
/// While capturing, each byte is held back by one position: it is only known to
/// be data once the following byte proves it is not the first half of a
/// closing marker. Only END, FINISHED and PANIC swallow their bytes. START,
/// LOADED and ASK_INPUT inside a capture are still reported, but their bytes
/// stay in the capture, since a raw response may contain them by chance. A
/// byte that completed a marker can not also open the next one.
#[derive(Debug)]
pub struct FrameDecoder {
    state: FrameState,
    last: Option<u8>,
    held: Option<u8>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: FrameState::Idle,
            last: None,
            held: None,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.state == FrameState::Capturing
    }

    /// Back to `Idle` with no byte history, ready for the next session.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Feed one byte. Bytes arriving after termination are ignored.
    pub fn push(&mut self, byte: u8) -> Decoded {
        if self.state == FrameState::Terminated {
            return Decoded::default();
        }

        if let Some(marker) = self.last.and_then(|prev| Marker::detect(prev, byte)) {
            self.last = None;
            if self.is_capturing() && !marker.closes_capture() {
                // Payload that happens to look like a marker: the held first
                // half is released and the second half is held in turn.
                return Decoded {
                    data: self.held.replace(byte),
                    marker: Some(marker),
                };
            }
            // The held byte is the marker's first half.
            self.held = None;
            self.state = match marker {
                Marker::Start => FrameState::Capturing,
                Marker::End => FrameState::Idle,
                Marker::Finished | Marker::Panic => FrameState::Terminated,
                Marker::Loaded | Marker::AskInput => self.state,
            };
            return Decoded {
                data: None,
                marker: Some(marker),
            };
        }

        self.last = Some(byte);
        Decoded {
            data: if self.is_capturing() {
                self.held.replace(byte)
            } else {
                None
            },
            marker: None,
        }
    }
}
