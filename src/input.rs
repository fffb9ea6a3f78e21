//! Input events as the engine sees them.
//!
//! The windowing layer translates its native events into [`InputEvent`]s and
//! hands them over through [`EventSource::poll`] once per frame.
//! [`ScriptedEvents`] is a source fed by hand, used when there is no window.

use std::collections::VecDeque;

/// A key, identified by the lowercase Unicode scalar value of the character
/// it produces. Keys without a character use the codes in [`keys`].
pub type KeyCode = u32;

/// Codes of keys that don't produce a character.
pub mod keys {
    use super::KeyCode;

    pub const BACKSPACE: KeyCode = 8;
    pub const TAB: KeyCode = 9;
    pub const ENTER: KeyCode = 13;
    pub const ESCAPE: KeyCode = 27;
    pub const SPACE: KeyCode = 32;
    pub const DELETE: KeyCode = 127;
    pub const ARROW_UP: KeyCode = 0x4000_0052;
    pub const ARROW_DOWN: KeyCode = 0x4000_0051;
    pub const ARROW_LEFT: KeyCode = 0x4000_0050;
    pub const ARROW_RIGHT: KeyCode = 0x4000_004F;
    pub const SHIFT: KeyCode = 0x4000_00E1;
    pub const CONTROL: KeyCode = 0x4000_00E0;
    pub const ALT: KeyCode = 0x4000_00E2;
}

/// Key code of a printable character.
pub fn char_key(c: char) -> KeyCode {
    c.to_lowercase().next().unwrap_or(c) as KeyCode
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    /// The user asked to close the application.
    Quit,
    KeyPress(KeyCode),
    KeyRelease(KeyCode),
}

/// Where the engine gets its input from.
pub trait EventSource {
    /// Appends every event that arrived since the last call to `out`.
    /// Must not block.
    fn poll(&mut self, out: &mut Vec<InputEvent>);
}

/// An event source that replays queued events, one frame at a time.
#[derive(Clone, Debug, Default)]
pub struct ScriptedEvents {
    frames: VecDeque<Vec<InputEvent>>,
}

impl ScriptedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `events` to be delivered together by a later poll. Each call
    /// fills one frame.
    pub fn push_frame(&mut self, events: impl IntoIterator<Item = InputEvent>) {
        self.frames.push_back(events.into_iter().collect());
    }

    pub fn with_frame(mut self, events: impl IntoIterator<Item = InputEvent>) -> Self {
        self.push_frame(events);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl EventSource for ScriptedEvents {
    fn poll(&mut self, out: &mut Vec<InputEvent>) {
        if let Some(frame) = self.frames.pop_front() {
            out.extend(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn characters_map_to_lowercase() {
        assert_eq!(char_key('W'), 'w' as u32);
        assert_eq!(char_key('w'), 119);
    }

    #[test]
    fn scripted_events_come_one_frame_per_poll() {
        let mut source = ScriptedEvents::new()
            .with_frame([InputEvent::KeyPress(char_key('a'))])
            .with_frame([InputEvent::Quit]);
        let mut out = Vec::new();
        source.poll(&mut out);
        assert_eq!(out, vec![InputEvent::KeyPress('a' as u32)]);
        out.clear();
        source.poll(&mut out);
        assert_eq!(out, vec![InputEvent::Quit]);
        out.clear();
        source.poll(&mut out);
        assert!(out.is_empty());
    }
}
