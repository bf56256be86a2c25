use std::fmt;

/// Leading byte shared by every marker.
pub const MARKER_PREFIX: u8 = 0xFE;

/// Protocol events the device signals in-band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// Response data follows.
    Start,
    /// Response data is complete.
    End,
    /// Firmware is loaded and will ask for parameters.
    Loaded,
    /// Device is ready to receive the next parameter.
    AskInput,
    /// Device completed its run.
    Finished,
    /// Device hit a fatal fault; anything captured so far is truncated.
    Panic,
}

impl Marker {
    /// Every marker in match priority order.
    pub const ALL: [Marker; 6] = [
        Marker::Start,
        Marker::End,
        Marker::Loaded,
        Marker::AskInput,
        Marker::Finished,
        Marker::Panic,
    ];

    pub const fn bytes(self) -> [u8; 2] {
        match self {
            Marker::Start => [MARKER_PREFIX, 0x01],
            Marker::End => [MARKER_PREFIX, 0x02],
            Marker::Loaded => [MARKER_PREFIX, 0x03],
            Marker::AskInput => [MARKER_PREFIX, 0x04],
            Marker::Finished => [MARKER_PREFIX, 0x05],
            Marker::Panic => [MARKER_PREFIX, 0x06],
        }
    }

    /// Which marker, if any, ends at `cur` given the byte before it.
    pub fn detect(prev: u8, cur: u8) -> Option<Marker> {
        Self::ALL
            .into_iter()
            .find(|marker| marker.bytes() == [prev, cur])
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Marker::Start => "start",
            Marker::End => "end",
            Marker::Loaded => "loaded",
            Marker::AskInput => "ask_input",
            Marker::Finished => "finished",
            Marker::Panic => "panic",
        }
    }

    /// Markers after which the session loop exits.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Marker::Finished | Marker::Panic)
    }

    /// Markers whose bytes are never part of a capture. The others are only
    /// protocol events when seen outside one.
    pub fn closes_capture(&self) -> bool {
        matches!(self, Marker::End | Marker::Finished | Marker::Panic)
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
