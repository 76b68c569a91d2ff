//! Playing cards and the punto-banco dealing rules.
//!
//! The baccarat controller uses [`BaccaratHand`] to decide which position the
//! next scanned card belongs to and when a hand is complete.  The drawing
//! rules are the standard tableau:
//!
//! - If either side holds a natural (8 or 9 on two cards), both stand.
//! - The player draws a third card on 0–5 and stands on 6–7.
//! - If the player stood, the banker draws on 0–5 and stands on 6–7.
//! - If the player drew, the banker acts on its own total and the value of
//!   the player's third card (see [`banker_draws`]).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Card rank, ace low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rank {
    Ace,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
}

impl Rank {
    /// Baccarat point value: ace = 1, 2–9 face value, tens and faces = 0.
    pub fn baccarat_value(self) -> u8 {
        match self {
            Rank::Ace => 1,
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten | Rank::Jack | Rank::Queen | Rank::King => 0,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Rank::Ace => "A",
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "T",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Suit {
    Spades,
    Hearts,
    Diamonds,
    Clubs,
}

impl Suit {
    fn symbol(self) -> &'static str {
        match self {
            Suit::Spades => "S",
            Suit::Hearts => "H",
            Suit::Diamonds => "D",
            Suit::Clubs => "C",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub fn new(rank: Rank, suit: Suit) -> Self {
        Self { rank, suit }
    }

    pub fn baccarat_value(self) -> u8 {
        self.rank.baccarat_value()
    }
}

impl fmt::Display for Card {
    /// Formats as the two-character scanner code, e.g. `AS` or `TD`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rank.symbol(), self.suit.symbol())
    }
}

/// Where a dealt card lands on the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardPosition {
    Player1,
    Banker1,
    Player2,
    Banker2,
    Player3,
    Banker3,
}

impl CardPosition {
    pub fn is_player(self) -> bool {
        matches!(
            self,
            CardPosition::Player1 | CardPosition::Player2 | CardPosition::Player3
        )
    }
}

/// Which side won a baccarat hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaccaratWinner {
    Player,
    Banker,
    Tie,
}

/// Total of a hand, modulo 10.
pub fn hand_total(cards: &[Card]) -> u8 {
    cards.iter().map(|c| c.baccarat_value() as u32).sum::<u32>() as u8 % 10
}

/// Player draws a third card on 0–5.
pub fn player_draws(player_total: u8) -> bool {
    player_total <= 5
}

/// Banker third-card rule, given the banker's two-card total and the value of
/// the player's third card (if the player drew).
pub fn banker_draws(banker_total: u8, player_third_value: Option<u8>) -> bool {
    match (banker_total, player_third_value) {
        (0..=2, _) => true,
        (3..=5, None) => true,
        (6, None) => false,
        (3, Some(v)) => v != 8,
        (4, Some(v)) => (2..=7).contains(&v),
        (5, Some(v)) => (4..=7).contains(&v),
        (6, Some(v)) => v == 6 || v == 7,
        _ => false,
    }
}

/// Cards dealt so far in one hand, in dealing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaccaratHand {
    pub player: Vec<Card>,
    pub banker: Vec<Card>,
}

impl BaccaratHand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn card_count(&self) -> usize {
        self.player.len() + self.banker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.card_count() == 0
    }

    /// The position the next card must be dealt to, or `None` when the hand
    /// is complete.
    pub fn next_position(&self) -> Option<CardPosition> {
        match (self.player.len(), self.banker.len()) {
            (0, 0) => Some(CardPosition::Player1),
            (1, 0) => Some(CardPosition::Banker1),
            (1, 1) => Some(CardPosition::Player2),
            (2, 1) => Some(CardPosition::Banker2),
            (2, 2) => {
                let player = hand_total(&self.player);
                let banker = hand_total(&self.banker);
                if player >= 8 || banker >= 8 {
                    None
                } else if player_draws(player) {
                    Some(CardPosition::Player3)
                } else if banker_draws(banker, None) {
                    Some(CardPosition::Banker3)
                } else {
                    None
                }
            }
            (3, 2) => {
                let third = self.player[2].baccarat_value();
                if banker_draws(hand_total(&self.banker), Some(third)) {
                    Some(CardPosition::Banker3)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.card_count() >= 4 && self.next_position().is_none()
    }

    /// Places `card` at `position`, replacing a card already there.
    pub fn place(&mut self, position: CardPosition, card: Card) {
        let (side, index) = match position {
            CardPosition::Player1 => (&mut self.player, 0),
            CardPosition::Player2 => (&mut self.player, 1),
            CardPosition::Player3 => (&mut self.player, 2),
            CardPosition::Banker1 => (&mut self.banker, 0),
            CardPosition::Banker2 => (&mut self.banker, 1),
            CardPosition::Banker3 => (&mut self.banker, 2),
        };
        if index < side.len() {
            side[index] = card;
        } else {
            side.push(card);
        }
    }

    /// The card currently at `position`, if dealt.
    pub fn card_at(&self, position: CardPosition) -> Option<Card> {
        match position {
            CardPosition::Player1 => self.player.first().copied(),
            CardPosition::Player2 => self.player.get(1).copied(),
            CardPosition::Player3 => self.player.get(2).copied(),
            CardPosition::Banker1 => self.banker.first().copied(),
            CardPosition::Banker2 => self.banker.get(1).copied(),
            CardPosition::Banker3 => self.banker.get(2).copied(),
        }
    }

    pub fn player_total(&self) -> u8 {
        hand_total(&self.player)
    }

    pub fn banker_total(&self) -> u8 {
        hand_total(&self.banker)
    }

    pub fn winner(&self) -> BaccaratWinner {
        let (p, b) = (self.player_total(), self.banker_total());
        match p.cmp(&b) {
            std::cmp::Ordering::Greater => BaccaratWinner::Player,
            std::cmp::Ordering::Less => BaccaratWinner::Banker,
            std::cmp::Ordering::Equal => BaccaratWinner::Tie,
        }
    }

    pub fn player_pair(&self) -> bool {
        self.player.len() >= 2 && self.player[0].rank == self.player[1].rank
    }

    pub fn banker_pair(&self) -> bool {
        self.banker.len() >= 2 && self.banker[0].rank == self.banker[1].rank
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(rank: Rank) -> Card {
        Card::new(rank, Suit::Spades)
    }

    fn deal(hand: &mut BaccaratHand, ranks: &[Rank]) {
        for &rank in ranks {
            let position = hand.next_position().expect("hand accepts another card");
            hand.place(position, card(rank));
        }
    }

    #[test]
    fn test_baccarat_values() {
        assert_eq!(Rank::Ace.baccarat_value(), 1);
        assert_eq!(Rank::Nine.baccarat_value(), 9);
        assert_eq!(Rank::Ten.baccarat_value(), 0);
        assert_eq!(Rank::King.baccarat_value(), 0);
    }

    #[test]
    fn test_first_four_positions_alternate_player_and_banker() {
        // Arrange
        let mut hand = BaccaratHand::new();
        let mut seen = Vec::new();

        // Act
        for _ in 0..4 {
            let position = hand.next_position().unwrap();
            seen.push(position);
            hand.place(position, card(Rank::Ten));
        }

        // Assert
        assert_eq!(
            seen,
            vec![
                CardPosition::Player1,
                CardPosition::Banker1,
                CardPosition::Player2,
                CardPosition::Banker2
            ]
        );
    }

    #[test]
    fn test_natural_ends_hand_after_four_cards() {
        // Arrange – player 9 (4 + 5), banker 0
        let mut hand = BaccaratHand::new();

        // Act
        deal(&mut hand, &[Rank::Four, Rank::Ten, Rank::Five, Rank::King]);

        // Assert
        assert!(hand.is_complete());
        assert_eq!(hand.winner(), BaccaratWinner::Player);
    }

    #[test]
    fn test_player_stands_banker_draws_on_five() {
        // Arrange – player 7 (3 + 4), banker 5 (2 + 3)
        let mut hand = BaccaratHand::new();
        deal(&mut hand, &[Rank::Three, Rank::Two, Rank::Four, Rank::Three]);

        // Act / Assert
        assert_eq!(hand.next_position(), Some(CardPosition::Banker3));
    }

    #[test]
    fn test_player_draws_then_banker_rule_uses_third_card_value() {
        // Arrange – player 2 (A + A), banker 3 (2 + A)
        let mut hand = BaccaratHand::new();
        deal(&mut hand, &[Rank::Ace, Rank::Two, Rank::Ace, Rank::Ace]);
        assert_eq!(hand.next_position(), Some(CardPosition::Player3));

        // Act – player's third card is an 8: banker on 3 stands
        hand.place(CardPosition::Player3, card(Rank::Eight));

        // Assert
        assert_eq!(hand.next_position(), None);
        assert!(hand.is_complete());
        assert_eq!(hand.card_count(), 5);
    }

    #[test]
    fn test_banker_draw_table() {
        assert!(banker_draws(2, Some(8)));
        assert!(banker_draws(3, Some(7)));
        assert!(!banker_draws(3, Some(8)));
        assert!(banker_draws(4, Some(2)));
        assert!(!banker_draws(4, Some(1)));
        assert!(banker_draws(5, Some(4)));
        assert!(!banker_draws(5, Some(3)));
        assert!(banker_draws(6, Some(6)));
        assert!(!banker_draws(6, None));
        assert!(!banker_draws(7, Some(6)));
    }

    #[test]
    fn test_pairs_and_tie() {
        // Arrange – player 8 8 → 6, banker 6 K → 6
        let hand = BaccaratHand {
            player: vec![card(Rank::Eight), card(Rank::Eight)],
            banker: vec![card(Rank::Six), card(Rank::King)],
        };

        // Assert
        assert!(hand.player_pair());
        assert!(!hand.banker_pair());
        assert_eq!(hand.winner(), BaccaratWinner::Tie);
    }

    #[test]
    fn test_card_display_uses_scanner_code() {
        assert_eq!(Card::new(Rank::Ten, Suit::Diamonds).to_string(), "TD");
        assert_eq!(Card::new(Rank::Ace, Suit::Spades).to_string(), "AS");
    }
}
