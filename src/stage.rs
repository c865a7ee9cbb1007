//! Dashboard stages and navigation between them

use std::fmt;
use std::str::FromStr;

use crate::error::ChurnError;

/// One of the four dashboard views, in navigation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Stage {
    #[default]
    Overview,
    Dissatisfaction,
    Frequency,
    Importance,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Overview,
        Stage::Dissatisfaction,
        Stage::Frequency,
        Stage::Importance,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn title(self) -> &'static str {
        match self {
            Stage::Overview => "Overview",
            Stage::Dissatisfaction => "Dissatisfaction",
            Stage::Frequency => "Frequency",
            Stage::Importance => "Importance",
        }
    }

    /// The following stage; stays on the last one.
    pub fn next(self) -> Stage {
        Self::ALL
            .get(self.index() + 1)
            .copied()
            .unwrap_or(self)
    }

    /// The preceding stage; stays on the first one.
    pub fn previous(self) -> Stage {
        self.index()
            .checked_sub(1)
            .map(|i| Self::ALL[i])
            .unwrap_or(self)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for Stage {
    type Err = ChurnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.title().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ChurnError::InvalidInput(format!("unknown stage: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_forward_and_back() {
        let mut stage = Stage::default();
        assert_eq!(stage, Stage::Overview);

        stage = stage.next();
        assert_eq!(stage, Stage::Dissatisfaction);
        stage = stage.next().next();
        assert_eq!(stage, Stage::Importance);
        stage = stage.previous();
        assert_eq!(stage, Stage::Frequency);
    }

    #[test]
    fn test_navigation_saturates() {
        assert_eq!(Stage::Importance.next(), Stage::Importance);
        assert_eq!(Stage::Overview.previous(), Stage::Overview);
    }

    #[test]
    fn test_index_matches_order() {
        for (i, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
        }
    }

    #[test]
    fn test_parse_stage() {
        assert_eq!("frequency".parse::<Stage>().unwrap(), Stage::Frequency);
        assert_eq!(" Importance ".parse::<Stage>().unwrap(), Stage::Importance);
        assert!("pricing".parse::<Stage>().is_err());
    }
}
