//! Events and paint requests delivered by the host

use bytes::Bytes;

use crate::EventCode;

/// A host event: opaque code plus opaque payload.
///
/// The core only holds an event for the duration of one dispatch cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequencedEvent {
    /// Host event code
    pub code: EventCode,
    /// Opaque payload (key data, IME text, pointer coordinates...)
    pub payload: Bytes,
}

impl SequencedEvent {
    pub fn new(code: EventCode, payload: impl Into<Bytes>) -> Self {
        SequencedEvent {
            code,
            payload: payload.into(),
        }
    }

    /// Event carrying no payload
    pub fn bare(code: EventCode) -> Self {
        SequencedEvent {
            code,
            payload: Bytes::new(),
        }
    }

    /// Must this event go through the ordering machinery?
    #[inline]
    pub fn is_sequenced(&self) -> bool {
        self.code.is_sequenced()
    }
}

/// Rectangle in host client coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A request to paint some or all of the surface
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct PaintRequest {
    /// Damaged region; `None` means the whole surface
    pub region: Option<Rect>,
}

impl PaintRequest {
    pub fn full() -> Self {
        PaintRequest { region: None }
    }

    pub fn region(rect: Rect) -> Self {
        PaintRequest { region: Some(rect) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes;

    #[test]
    fn test_event_classification() {
        let key = SequencedEvent::new(codes::CHAR, &b"a"[..]);
        assert!(key.is_sequenced());
        assert_eq!(key.payload.as_ref(), b"a");

        let paint = SequencedEvent::bare(codes::PAINT);
        assert!(!paint.is_sequenced());
        assert!(paint.payload.is_empty());
    }

    #[test]
    fn test_paint_request_region() {
        assert_eq!(PaintRequest::full().region, None);
        let rect = Rect::new(0, 0, 10, 0);
        assert!(rect.is_empty());
        assert_eq!(PaintRequest::region(rect).region, Some(rect));
    }
}
