//! Table identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The game a table runs.  Decides which decoder and round machine are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Roulette,
    #[serde(rename = "sicbo")]
    SicBo,
    Baccarat,
}

impl GameType {
    /// Lowercase identifier used in configuration files and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            GameType::Roulette => "roulette",
            GameType::SicBo => "sicbo",
            GameType::Baccarat => "baccarat",
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one physical table for the lifetime of the process.
///
/// Created once at startup from configuration; the fields are private so the
/// identity cannot change after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSession {
    table_id: String,
    game_type: GameType,
    device_name: String,
}

impl TableSession {
    pub fn new(
        table_id: impl Into<String>,
        game_type: GameType,
        device_name: impl Into<String>,
    ) -> Self {
        Self {
            table_id: table_id.into(),
            game_type,
            device_name: device_name.into(),
        }
    }

    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    pub fn game_type(&self) -> GameType {
        self.game_type
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_type_deserializes_from_lowercase_names() {
        // Arrange
        let names = [
            ("\"roulette\"", GameType::Roulette),
            ("\"sicbo\"", GameType::SicBo),
            ("\"baccarat\"", GameType::Baccarat),
        ];

        for (json, expected) in names {
            // Act
            let parsed: GameType = serde_json::from_str(json).unwrap();

            // Assert
            assert_eq!(parsed, expected);
            assert_eq!(format!("\"{}\"", parsed.as_str()), json);
        }
    }

    #[test]
    fn test_table_session_exposes_identity() {
        let session = TableSession::new("RL-01", GameType::Roulette, "ARO-001");
        assert_eq!(session.table_id(), "RL-01");
        assert_eq!(session.game_type(), GameType::Roulette);
        assert_eq!(session.device_name(), "ARO-001");
    }
}
