//! Published round results.
//!
//! A result carries the facts of one finished round, enriched with the
//! derived values the Studio displays (roulette colour, sicbo total, baccarat
//! winner).  No payout or settlement is computed here.

use serde::{Deserialize, Serialize};

use crate::domain::cards::{BaccaratHand, BaccaratWinner, Card};

/// Red pockets on a single-zero wheel.
const RED_NUMBERS: [u8; 18] = [
    1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PocketColour {
    Red,
    Black,
    Green,
}

impl PocketColour {
    pub fn of(pocket: u8) -> Self {
        if pocket == 0 {
            PocketColour::Green
        } else if RED_NUMBERS.contains(&pocket) {
            PocketColour::Red
        } else {
            PocketColour::Black
        }
    }
}

/// Sicbo result classification.  A triple is neither big nor small.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiceClass {
    Small,
    Big,
    Triple,
}

impl DiceClass {
    pub fn of(dice: [u8; 3]) -> Self {
        if dice[0] == dice[1] && dice[1] == dice[2] {
            DiceClass::Triple
        } else if dice.iter().map(|&d| d as u32).sum::<u32>() >= 11 {
            DiceClass::Big
        } else {
            DiceClass::Small
        }
    }
}

/// The outcome of one round, ready to be published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum RoundResult {
    Roulette {
        round: u64,
        number: u8,
        colour: PocketColour,
    },
    #[serde(rename = "sicbo")]
    SicBo {
        round: u64,
        dice: [u8; 3],
        total: u8,
        class: DiceClass,
    },
    Baccarat {
        hand: u64,
        player: Vec<Card>,
        banker: Vec<Card>,
        player_total: u8,
        banker_total: u8,
        winner: BaccaratWinner,
        player_pair: bool,
        banker_pair: bool,
    },
}

impl RoundResult {
    pub fn roulette(round: u64, number: u8) -> Self {
        RoundResult::Roulette {
            round,
            number,
            colour: PocketColour::of(number),
        }
    }

    pub fn sicbo(round: u64, dice: [u8; 3]) -> Self {
        RoundResult::SicBo {
            round,
            dice,
            total: dice.iter().sum(),
            class: DiceClass::of(dice),
        }
    }

    pub fn baccarat(hand_no: u64, hand: &BaccaratHand) -> Self {
        RoundResult::Baccarat {
            hand: hand_no,
            player: hand.player.clone(),
            banker: hand.banker.clone(),
            player_total: hand.player_total(),
            banker_total: hand.banker_total(),
            winner: hand.winner(),
            player_pair: hand.player_pair(),
            banker_pair: hand.banker_pair(),
        }
    }

    /// Round (or hand) number the result belongs to.
    pub fn round(&self) -> u64 {
        match self {
            RoundResult::Roulette { round, .. } | RoundResult::SicBo { round, .. } => *round,
            RoundResult::Baccarat { hand, .. } => *hand,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cards::{Rank, Suit};

    #[test]
    fn test_pocket_colours() {
        assert_eq!(PocketColour::of(0), PocketColour::Green);
        assert_eq!(PocketColour::of(17), PocketColour::Black);
        assert_eq!(PocketColour::of(32), PocketColour::Red);
        assert_eq!(PocketColour::of(10), PocketColour::Black);
    }

    #[test]
    fn test_dice_classification() {
        assert_eq!(DiceClass::of([4, 4, 6]), DiceClass::Big);
        assert_eq!(DiceClass::of([1, 2, 3]), DiceClass::Small);
        assert_eq!(DiceClass::of([5, 5, 5]), DiceClass::Triple);
        // 10 is the highest small total
        assert_eq!(DiceClass::of([2, 3, 5]), DiceClass::Small);
    }

    #[test]
    fn test_sicbo_result_totals_dice() {
        // Act
        let result = RoundResult::sicbo(9, [4, 4, 6]);

        // Assert
        match result {
            RoundResult::SicBo { total, class, .. } => {
                assert_eq!(total, 14);
                assert_eq!(class, DiceClass::Big);
            }
            other => panic!("expected sicbo result, got {other:?}"),
        }
    }

    #[test]
    fn test_baccarat_result_copies_hand_facts() {
        // Arrange – player 9 (4 + 5), banker 0
        let hand = BaccaratHand {
            player: vec![
                Card::new(Rank::Four, Suit::Clubs),
                Card::new(Rank::Five, Suit::Hearts),
            ],
            banker: vec![
                Card::new(Rank::Ten, Suit::Spades),
                Card::new(Rank::King, Suit::Diamonds),
            ],
        };

        // Act
        let result = RoundResult::baccarat(3, &hand);

        // Assert
        assert_eq!(result.round(), 3);
        match result {
            RoundResult::Baccarat {
                player_total,
                banker_total,
                winner,
                ..
            } => {
                assert_eq!(player_total, 9);
                assert_eq!(banker_total, 0);
                assert_eq!(winner, BaccaratWinner::Player);
            }
            other => panic!("expected baccarat result, got {other:?}"),
        }
    }

    #[test]
    fn test_result_json_is_tagged_by_game() {
        let json = serde_json::to_value(RoundResult::roulette(1, 17)).unwrap();
        assert_eq!(json["game"], "roulette");
        assert_eq!(json["colour"], "black");
    }
}
