//! Remote-control keys and their HID codes.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::constants::{LONG_PRESS_HOLD_MS, USAGE_PAGE_CONSUMER, USAGE_PAGE_GENERIC_DESKTOP};

/// A symbolic remote-control action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCommand {
    Up,
    Down,
    Left,
    Right,
    Menu,
    Play,
    Pause,
    Next,
    Previous,
    Suspend,
    Select,
    Tv,
    LongTv,
}

/// Protocol code a key press is sent as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCode {
    pub usage_page: u16,
    pub usage: u16,
    /// How long the key stays down before release.
    pub hold: Option<Duration>,
}

impl KeyCode {
    const fn tap(usage_page: u16, usage: u16) -> Self {
        Self {
            usage_page,
            usage,
            hold: None,
        }
    }
}

impl KeyCommand {
    pub const ALL: [KeyCommand; 13] = [
        KeyCommand::Up,
        KeyCommand::Down,
        KeyCommand::Left,
        KeyCommand::Right,
        KeyCommand::Menu,
        KeyCommand::Play,
        KeyCommand::Pause,
        KeyCommand::Next,
        KeyCommand::Previous,
        KeyCommand::Suspend,
        KeyCommand::Select,
        KeyCommand::Tv,
        KeyCommand::LongTv,
    ];

    /// Look up the protocol code.
    pub fn code(self) -> KeyCode {
        match self {
            KeyCommand::Up => KeyCode::tap(USAGE_PAGE_GENERIC_DESKTOP, 0x8C),
            KeyCommand::Down => KeyCode::tap(USAGE_PAGE_GENERIC_DESKTOP, 0x8D),
            KeyCommand::Left => KeyCode::tap(USAGE_PAGE_GENERIC_DESKTOP, 0x8B),
            KeyCommand::Right => KeyCode::tap(USAGE_PAGE_GENERIC_DESKTOP, 0x8A),
            KeyCommand::Menu => KeyCode::tap(USAGE_PAGE_GENERIC_DESKTOP, 0x86),
            KeyCommand::Select => KeyCode::tap(USAGE_PAGE_GENERIC_DESKTOP, 0x89),
            KeyCommand::Suspend => KeyCode::tap(USAGE_PAGE_GENERIC_DESKTOP, 0x82),
            KeyCommand::Play => KeyCode::tap(USAGE_PAGE_CONSUMER, 0xB0),
            KeyCommand::Pause => KeyCode::tap(USAGE_PAGE_CONSUMER, 0xB1),
            KeyCommand::Next => KeyCode::tap(USAGE_PAGE_CONSUMER, 0xB5),
            KeyCommand::Previous => KeyCode::tap(USAGE_PAGE_CONSUMER, 0xB6),
            KeyCommand::Tv => KeyCode::tap(USAGE_PAGE_CONSUMER, 0x60),
            KeyCommand::LongTv => KeyCode {
                usage_page: USAGE_PAGE_CONSUMER,
                usage: 0x60,
                hold: Some(Duration::from_millis(LONG_PRESS_HOLD_MS)),
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            KeyCommand::Up => "up",
            KeyCommand::Down => "down",
            KeyCommand::Left => "left",
            KeyCommand::Right => "right",
            KeyCommand::Menu => "menu",
            KeyCommand::Play => "play",
            KeyCommand::Pause => "pause",
            KeyCommand::Next => "next",
            KeyCommand::Previous => "previous",
            KeyCommand::Suspend => "suspend",
            KeyCommand::Select => "select",
            KeyCommand::Tv => "tv",
            KeyCommand::LongTv => "longtv",
        }
    }
}

impl fmt::Display for KeyCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for KeyCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyCommand::ALL
            .into_iter()
            .find(|key| key.name() == s)
            .ok_or_else(|| format!("unknown key: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for key in KeyCommand::ALL {
            assert_eq!(key.name().parse::<KeyCommand>().unwrap(), key);
        }
        assert!("home".parse::<KeyCommand>().is_err());
    }

    #[test]
    fn test_long_tv_holds() {
        let tv = KeyCommand::Tv.code();
        let long = KeyCommand::LongTv.code();
        assert_eq!((tv.usage_page, tv.usage), (long.usage_page, long.usage));
        assert_eq!(tv.hold, None);
        assert_eq!(long.hold, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_select_code() {
        let code = KeyCommand::Select.code();
        assert_eq!(code.usage_page, 0x01);
        assert_eq!(code.usage, 0x89);
    }
}
