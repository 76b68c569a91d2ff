//! Baccarat card scanner codes.
//!
//! Each barcode on the shoe's cards decodes to `<rank><suit>`: rank is one of
//! `A 2 3 4 5 6 7 8 9 T J Q K` (`10` is accepted for ten), suit one of
//! `S H D C`, case-insensitive.  The dealer scans `#NEW` to reset the layout.

use crate::domain::cards::{Card, Rank, Suit};
use crate::protocol::error::DecodeError;

/// Reset barcode.
pub const NEW_HAND_CODE: &str = "#NEW";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCode {
    Card(Card),
    NewHand,
}

/// Parses one scan string (terminator already removed).
pub fn parse_scan(scan: &str) -> Result<ScanCode, DecodeError> {
    let code = scan.trim();
    if code.is_empty() {
        return Err(DecodeError::Empty);
    }
    if code.eq_ignore_ascii_case(NEW_HAND_CODE) {
        return Ok(ScanCode::NewHand);
    }

    let unknown = || DecodeError::UnknownScan(code.to_string());
    if !code.is_ascii() {
        return Err(unknown());
    }
    let upper = code.to_ascii_uppercase();
    let (rank, suit) = match upper.len() {
        2 => upper.split_at(1),
        3 if upper.starts_with("10") => upper.split_at(2),
        _ => return Err(unknown()),
    };

    let rank = match rank {
        "A" => Rank::Ace,
        "2" => Rank::Two,
        "3" => Rank::Three,
        "4" => Rank::Four,
        "5" => Rank::Five,
        "6" => Rank::Six,
        "7" => Rank::Seven,
        "8" => Rank::Eight,
        "9" => Rank::Nine,
        "T" | "10" => Rank::Ten,
        "J" => Rank::Jack,
        "Q" => Rank::Queen,
        "K" => Rank::King,
        _ => return Err(unknown()),
    };
    let suit = match suit {
        "S" => Suit::Spades,
        "H" => Suit::Hearts,
        "D" => Suit::Diamonds,
        "C" => Suit::Clubs,
        _ => return Err(unknown()),
    };
    Ok(ScanCode::Card(Card::new(rank, suit)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_codes_parse_case_insensitively() {
        assert_eq!(
            parse_scan("as"),
            Ok(ScanCode::Card(Card::new(Rank::Ace, Suit::Spades)))
        );
        assert_eq!(
            parse_scan("KD"),
            Ok(ScanCode::Card(Card::new(Rank::King, Suit::Diamonds)))
        );
    }

    #[test]
    fn test_ten_has_two_spellings() {
        let expected = Ok(ScanCode::Card(Card::new(Rank::Ten, Suit::Clubs)));
        assert_eq!(parse_scan("TC"), expected);
        assert_eq!(parse_scan("10C"), expected);
    }

    #[test]
    fn test_new_hand_code() {
        assert_eq!(parse_scan("#new"), Ok(ScanCode::NewHand));
    }

    #[test]
    fn test_unknown_codes_are_rejected() {
        for code in ["1S", "ZH", "AX", "ACE", "11H"] {
            assert!(
                matches!(parse_scan(code), Err(DecodeError::UnknownScan(_))),
                "{code} should be rejected"
            );
        }
        assert_eq!(parse_scan(""), Err(DecodeError::Empty));
    }
}
