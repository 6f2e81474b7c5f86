//! Player commands and their text form.
//!
//! Commands arrive as whitespace-separated tokens:
//!
//! ```text
//! attack <from> <to> <isHalf:0|1>
//! city|wall|school|portal|collect|launcher <tile>
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::TileIndex;
use crate::state::{MatchState, PlayerIndex};

/// Construction kinds, in the order a tick applies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BuildKind {
    /// Raise a wall.
    Wall,
    /// Found a city.
    City,
    /// Found a school.
    School,
    /// Open a portal.
    Portal,
    /// Collect armies from the surrounding region.
    Collect,
    /// Build a launcher.
    Launcher,
}

impl BuildKind {
    /// Every kind, in tick application order.
    pub const DRAIN_ORDER: [BuildKind; 6] = [
        BuildKind::Wall,
        BuildKind::City,
        BuildKind::School,
        BuildKind::Portal,
        BuildKind::Collect,
        BuildKind::Launcher,
    ];

    /// Command keyword.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Wall => "wall",
            Self::City => "city",
            Self::School => "school",
            Self::Portal => "portal",
            Self::Collect => "collect",
            Self::Launcher => "launcher",
        }
    }

    /// Parses a command keyword.
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::DRAIN_ORDER
            .into_iter()
            .find(|kind| kind.keyword() == keyword)
    }
}

/// A single player intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Move or attack between tiles.
    Attack {
        /// Source tile.
        from: TileIndex,
        /// Destination tile.
        to: TileIndex,
        /// Send half the army instead of all but one.
        half: bool,
    },
    /// Construction on a tile.
    Build {
        /// What to build.
        kind: BuildKind,
        /// Target tile.
        tile: TileIndex,
    },
}

/// Why a command line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    /// No tokens.
    #[error("empty command")]
    Empty,

    /// First token is not a command keyword.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Wrong number of arguments.
    #[error("'{command}' takes {expected} arguments, got {found}")]
    WrongArity {
        /// Command keyword.
        command: &'static str,
        /// Arguments expected.
        expected: usize,
        /// Arguments given.
        found: usize,
    },

    /// A tile argument is not a non-negative integer.
    #[error("invalid tile '{0}'")]
    InvalidTile(String),

    /// The half flag is not `0` or `1`.
    #[error("invalid half flag '{0}' (expected 0 or 1)")]
    InvalidFlag(String),
}

impl Command {
    /// Parses pre-split tokens.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self, CommandParseError> {
        let (keyword, args) = tokens.split_first().ok_or(CommandParseError::Empty)?;
        let keyword = keyword.as_ref();

        if keyword == "attack" {
            let [from, to, half] = args else {
                return Err(CommandParseError::WrongArity {
                    command: "attack",
                    expected: 3,
                    found: args.len(),
                });
            };
            let half = match half.as_ref() {
                "0" => false,
                "1" => true,
                other => return Err(CommandParseError::InvalidFlag(other.to_string())),
            };
            return Ok(Self::Attack {
                from: parse_tile(from.as_ref())?,
                to: parse_tile(to.as_ref())?,
                half,
            });
        }

        let kind = BuildKind::from_keyword(keyword)
            .ok_or_else(|| CommandParseError::UnknownCommand(keyword.to_string()))?;
        let [tile] = args else {
            return Err(CommandParseError::WrongArity {
                command: kind.keyword(),
                expected: 1,
                found: args.len(),
            });
        };
        Ok(Self::Build {
            kind,
            tile: parse_tile(tile.as_ref())?,
        })
    }

    /// Whether `keyword` names a game command.
    #[must_use]
    pub fn is_command_keyword(keyword: &str) -> bool {
        keyword == "attack" || BuildKind::from_keyword(keyword).is_some()
    }
}

fn parse_tile(token: &str) -> Result<TileIndex, CommandParseError> {
    token
        .parse()
        .map_err(|_| CommandParseError::InvalidTile(token.to_string()))
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        Self::parse(&tokens)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Attack { from, to, half } => {
                write!(f, "attack {from} {to} {}", u8::from(half))
            }
            Self::Build { kind, tile } => write!(f, "{} {tile}", kind.keyword()),
        }
    }
}

impl MatchState {
    /// Applies a command on behalf of `player`. Returns whether it took
    /// effect; a rejected command leaves the state untouched.
    pub fn apply(&mut self, player: PlayerIndex, command: &Command) -> bool {
        let applied = match *command {
            Command::Attack { from, to, half } => self.attack(player, from, to, half),
            Command::Build { kind, tile } => match kind {
                BuildKind::Wall => self.make_wall(player, tile),
                BuildKind::City => self.make_city(player, tile),
                BuildKind::School => self.make_school(player, tile),
                BuildKind::Portal => self.make_portal(player, tile),
                BuildKind::Collect => self.collect(player, tile),
                BuildKind::Launcher => self.make_launcher(player, tile),
            },
        };

        #[cfg(feature = "debug-validation")]
        crate::invariants::log_violations(self);

        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attack() {
        let cmd: Command = "attack 12 13 1".parse().unwrap();
        assert_eq!(
            cmd,
            Command::Attack {
                from: 12,
                to: 13,
                half: true
            }
        );
        assert_eq!(cmd.to_string(), "attack 12 13 1");
    }

    #[test]
    fn test_parse_builds() {
        for kind in BuildKind::DRAIN_ORDER {
            let line = format!("{} 42", kind.keyword());
            let cmd: Command = line.parse().unwrap();
            assert_eq!(cmd, Command::Build { kind, tile: 42 });
            assert_eq!(cmd.to_string(), line);
        }
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Command>(), Err(CommandParseError::Empty));
        assert_eq!(
            "fly 1".parse::<Command>(),
            Err(CommandParseError::UnknownCommand("fly".into()))
        );
        assert_eq!(
            "attack 1 2".parse::<Command>(),
            Err(CommandParseError::WrongArity {
                command: "attack",
                expected: 3,
                found: 2
            })
        );
        assert_eq!(
            "city".parse::<Command>(),
            Err(CommandParseError::WrongArity {
                command: "city",
                expected: 1,
                found: 0
            })
        );
        assert_eq!(
            "wall -3".parse::<Command>(),
            Err(CommandParseError::InvalidTile("-3".into()))
        );
        assert_eq!(
            "attack 1 2 yes".parse::<Command>(),
            Err(CommandParseError::InvalidFlag("yes".into()))
        );
    }

    #[test]
    fn test_keywords() {
        assert!(Command::is_command_keyword("attack"));
        assert!(Command::is_command_keyword("launcher"));
        assert!(!Command::is_command_keyword("join"));
    }

    #[test]
    fn test_drain_order() {
        let keywords: Vec<_> = BuildKind::DRAIN_ORDER.iter().map(|k| k.keyword()).collect();
        assert_eq!(keywords, ["wall", "city", "school", "portal", "collect", "launcher"]);
    }
}
