//! Device commands
//!
//! A command addresses one relay (group + channel) and switches it on or off.
//! Users type commands as short strings: group letter, channel digit, then
//! `on` or `off`, e.g. `a4on` or `c8off`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::CommandError;

/// Device bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Group {
    /// Channels at device byte offset 0x00
    A,
    /// Channels at device byte offset 0x08
    B,
    /// Channels at device byte offset 0x10
    C,
}

impl Group {
    /// All groups in wire order
    pub const ALL: [Group; 3] = [Group::A, Group::B, Group::C];

    /// Base offset of this group in the device byte
    pub fn base(&self) -> u8 {
        match self {
            Group::A => 0x00,
            Group::B => 0x08,
            Group::C => 0x10,
        }
    }

    /// Parse a group letter (case-insensitive)
    pub fn from_char(c: char) -> Result<Self, CommandError> {
        match c.to_ascii_lowercase() {
            'a' => Ok(Group::A),
            'b' => Ok(Group::B),
            'c' => Ok(Group::C),
            _ => Err(CommandError::InvalidGroup(c)),
        }
    }

    fn letter(&self) -> char {
        match self {
            Group::A => 'a',
            Group::B => 'b',
            Group::C => 'c',
        }
    }
}

/// Desired relay state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Switch the relay on
    On,
    /// Switch the relay off
    Off,
}

impl Action {
    /// All actions
    pub const ALL: [Action; 2] = [Action::On, Action::Off];

    /// Action flag in the device byte
    pub fn flag(&self) -> u8 {
        match self {
            Action::On => 0x40,
            Action::Off => 0x80,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Action::On => "on",
            Action::Off => "off",
        }
    }
}

/// A single relay command
///
/// Serialized as its command string so that a stored command is validated
/// again when it is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Command {
    group: Group,
    channel: u8,
    action: Action,
}

impl Command {
    /// Lowest channel number
    pub const MIN_CHANNEL: u8 = 1;
    /// Highest channel number (3-bit field)
    pub const MAX_CHANNEL: u8 = 8;

    /// Build a command, rejecting channels outside 1..=8
    pub fn new(group: Group, channel: u8, action: Action) -> Result<Self, CommandError> {
        if !(Self::MIN_CHANNEL..=Self::MAX_CHANNEL).contains(&channel) {
            return Err(CommandError::ChannelOutOfRange(channel));
        }
        Ok(Self {
            group,
            channel,
            action,
        })
    }

    /// Addressed group
    pub fn group(&self) -> Group {
        self.group
    }

    /// Addressed channel, 1 to 8
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Requested relay state
    pub fn action(&self) -> Action {
        self.action
    }

    /// Encode into the device byte: `group_base | (channel - 1) | action_flag`
    pub fn device_byte(&self) -> u8 {
        self.group.base() | (self.channel - 1) | self.action.flag()
    }

    /// Recover a command from a device byte
    ///
    /// Exactly one action flag must be set and no bits outside the group,
    /// channel and action fields.
    pub fn from_device_byte(byte: u8) -> Option<Self> {
        let group = match byte & 0x18 {
            0x00 => Group::A,
            0x08 => Group::B,
            0x10 => Group::C,
            _ => return None,
        };
        let action = match byte & 0xC0 {
            0x40 => Action::On,
            0x80 => Action::Off,
            _ => return None,
        };
        if byte & 0x20 != 0 {
            return None;
        }
        Some(Self {
            group,
            channel: (byte & 0x07) + 1,
            action,
        })
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cmd = s.trim().to_ascii_lowercase();
        if cmd.is_empty() {
            return Err(CommandError::Empty);
        }

        let mut chars = cmd.chars();
        let (Some(group), Some(channel)) = (chars.next(), chars.next()) else {
            return Err(CommandError::TooShort(s.to_string()));
        };
        let rest = chars.as_str();
        if rest.is_empty() {
            return Err(CommandError::TooShort(s.to_string()));
        }

        let group = Group::from_char(group)?;
        let channel = match channel.to_digit(10) {
            Some(d) if (1..=8).contains(&d) => d as u8,
            _ => return Err(CommandError::InvalidChannel(channel)),
        };

        // "on" is tested before "off"; anything else is rejected outright
        let action = if rest == "on" {
            Action::On
        } else if rest == "off" {
            Action::Off
        } else {
            return Err(CommandError::InvalidAction(rest.to_string()));
        };

        Ok(Self {
            group,
            channel,
            action,
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.group.letter(),
            self.channel,
            self.action.as_str()
        )
    }
}

impl TryFrom<String> for Command {
    type Error = CommandError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Command> for String {
    fn from(command: Command) -> Self {
        command.to_string()
    }
}
