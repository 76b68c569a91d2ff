//! The inner, per-game round machines.
//!
//! A round machine only advances on well-formed observations and only
//! forward: a roulette round cannot jump from IDLE to BALL_LANDED, a sicbo
//! round cannot settle before it shook.  The final observation of a round
//! (ball landed, dice settled, hand complete) is *pending*: it is published
//! only when the caller confirms it with the [`ConfirmKey`] it was armed
//! with.  Until then a corrected observation for the same round replaces the
//! pending one (last writer wins).  After publication a contradicting
//! observation for that round is rejected; an identical one is ignored.
//!
//! Publication walks the remaining states in one step and lands on IDLE, so
//! IDLE is the only resting state between rounds.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::cards::{BaccaratHand, Card, CardPosition};
use crate::domain::event::{BaccaratObservation, Observation, RouletteObservation, SicBoObservation};
use crate::domain::result::RoundResult;
use crate::domain::session::GameType;

// ── Per-game states ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouletteRound {
    Idle,
    SpinStarted,
    BallLanded,
    ResultPublished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SicBoRound {
    Idle,
    Shaking,
    Settled,
    ResultPublished,
    Validated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BaccaratRound {
    Idle,
    Dealing,
    /// Number of cards on the layout so far.
    CardScanned(u8),
    HandComplete,
    ResultPublished,
}

/// The current inner state, tagged by game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "game", content = "state", rename_all = "lowercase")]
pub enum RoundState {
    Roulette(RouletteRound),
    #[serde(rename = "sicbo")]
    SicBo(SicBoRound),
    Baccarat(BaccaratRound),
}

impl RoundState {
    pub fn idle(game: GameType) -> Self {
        match game {
            GameType::Roulette => RoundState::Roulette(RouletteRound::Idle),
            GameType::SicBo => RoundState::SicBo(SicBoRound::Idle),
            GameType::Baccarat => RoundState::Baccarat(BaccaratRound::Idle),
        }
    }

    pub fn is_idle(self) -> bool {
        matches!(
            self,
            RoundState::Roulette(RouletteRound::Idle)
                | RoundState::SicBo(SicBoRound::Idle)
                | RoundState::Baccarat(BaccaratRound::Idle)
        )
    }
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundState::Roulette(s) => write!(f, "{s:?}"),
            RoundState::SicBo(s) => write!(f, "{s:?}"),
            RoundState::Baccarat(BaccaratRound::CardScanned(n)) => write!(f, "CardScanned({n})"),
            RoundState::Baccarat(s) => write!(f, "{s:?}"),
        }
    }
}

/// One state change, `(from, to)`.
pub type Hop = (RoundState, RoundState);

// ── Step results ──────────────────────────────────────────────────────────────

/// Identifies one armed confirmation.  A correction re-arms with a new
/// revision, so a timer armed for the superseded observation confirms nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfirmKey {
    pub round: u64,
    pub revision: u64,
}

/// What an accepted observation did to the round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundStep {
    pub hops: Vec<Hop>,
    /// Set when the observation completed the round (or corrected a
    /// completed round); the caller must confirm with this key.
    pub armed: Option<ConfirmKey>,
    /// The observation replaced an earlier pending result.
    pub corrected: bool,
}

impl RoundStep {
    fn ignored() -> Self {
        Self::default()
    }

    /// `true` when the observation changed nothing (duplicate or replay).
    pub fn is_noop(&self) -> bool {
        self.hops.is_empty() && self.armed.is_none()
    }
}

/// A result leaving the round machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub result: RoundResult,
    pub hops: Vec<Hop>,
}

/// An observation the round machine refused.  The caller reports it as
/// malformed input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct Rejected(pub String);

fn reject<T>(msg: impl Into<String>) -> Result<T, Rejected> {
    Err(Rejected(msg.into()))
}

/// Compares `round` against the last published round.
///
/// Returns `Ok(true)` for a harmless replay of the published round,
/// `Ok(false)` for a newer round, and an error for an older round or a
/// contradicting replay.
fn against_published(
    published: Option<u64>,
    round: u64,
    agrees: impl FnOnce() -> bool,
) -> Result<bool, Rejected> {
    let Some(last) = published else {
        return Ok(false);
    };
    match round.cmp(&last) {
        Ordering::Greater => Ok(false),
        Ordering::Less => reject(format!(
            "round {round} is older than published round {last}"
        )),
        Ordering::Equal if agrees() => Ok(true),
        Ordering::Equal => reject(format!(
            "round {round} was already published with a different result"
        )),
    }
}

// ── Two-step games (roulette, sicbo) ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Started,
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PhaseStep {
    hops: Vec<(Phase, Phase)>,
    armed: Option<ConfirmKey>,
    corrected: bool,
}

impl PhaseStep {
    fn none() -> Self {
        Self {
            hops: Vec::new(),
            armed: None,
            corrected: false,
        }
    }
}

/// Shared bookkeeping for games whose round is "started" followed by one
/// final observation.
#[derive(Debug, Clone)]
struct TwoStepRounds {
    phase: Phase,
    round: Option<u64>,
    pending: Option<(ConfirmKey, RoundResult)>,
    published: Option<RoundResult>,
    revision: u64,
}

impl TwoStepRounds {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            round: None,
            pending: None,
            published: None,
            revision: 0,
        }
    }

    fn published_round(&self) -> Option<u64> {
        self.published.as_ref().map(RoundResult::round)
    }

    fn start(&mut self, round: u64) -> Result<PhaseStep, Rejected> {
        if against_published(self.published_round(), round, || true)? {
            return Ok(PhaseStep::none());
        }
        match (self.phase, self.round) {
            (Phase::Idle, _) => {
                self.phase = Phase::Started;
                self.round = Some(round);
                Ok(PhaseStep {
                    hops: vec![(Phase::Idle, Phase::Started)],
                    ..PhaseStep::none()
                })
            }
            (Phase::Started, Some(current)) if current == round => Ok(PhaseStep::none()),
            (Phase::Started, Some(current)) if round > current => {
                // The previous round never finished; start over with the new one.
                self.round = Some(round);
                Ok(PhaseStep {
                    hops: vec![(Phase::Started, Phase::Idle), (Phase::Idle, Phase::Started)],
                    ..PhaseStep::none()
                })
            }
            (Phase::Started, current) => reject(format!(
                "round {round} started while round {} is in progress",
                current.unwrap_or_default()
            )),
            (Phase::Final, current) => reject(format!(
                "round {round} started while round {} awaits publication",
                current.unwrap_or_default()
            )),
        }
    }

    fn finish(&mut self, round: u64, result: RoundResult) -> Result<PhaseStep, Rejected> {
        let replay = self.published.as_ref() == Some(&result);
        if against_published(self.published_round(), round, || replay)? {
            return Ok(PhaseStep::none());
        }
        match (self.phase, self.round) {
            (Phase::Idle, _) => reject(format!("round {round} finished before it started")),
            (Phase::Started, Some(current)) if current == round => {
                let key = self.arm(round, result);
                self.phase = Phase::Final;
                Ok(PhaseStep {
                    hops: vec![(Phase::Started, Phase::Final)],
                    armed: Some(key),
                    corrected: false,
                })
            }
            (Phase::Final, Some(current)) if current == round => {
                let unchanged = self.pending.as_ref().map(|(_, r)| r) == Some(&result);
                if unchanged {
                    return Ok(PhaseStep::none());
                }
                let key = self.arm(round, result);
                Ok(PhaseStep {
                    hops: Vec::new(),
                    armed: Some(key),
                    corrected: true,
                })
            }
            (_, current) => reject(format!(
                "result for round {round} while round {} is in progress",
                current.unwrap_or_default()
            )),
        }
    }

    fn arm(&mut self, round: u64, result: RoundResult) -> ConfirmKey {
        self.revision += 1;
        let key = ConfirmKey {
            round,
            revision: self.revision,
        };
        self.pending = Some((key, result));
        key
    }

    fn confirm(&mut self, key: ConfirmKey) -> Option<RoundResult> {
        if self.phase != Phase::Final {
            return None;
        }
        match self.pending.take() {
            Some((armed, result)) if armed == key => {
                self.phase = Phase::Idle;
                self.round = None;
                self.published = Some(result.clone());
                Some(result)
            }
            other => {
                self.pending = other;
                None
            }
        }
    }

    fn reset(&mut self) -> Option<Phase> {
        let previous = self.phase;
        self.phase = Phase::Idle;
        self.round = None;
        self.pending = None;
        (previous != Phase::Idle).then_some(previous)
    }
}

fn roulette_state(phase: Phase) -> RoundState {
    RoundState::Roulette(match phase {
        Phase::Idle => RouletteRound::Idle,
        Phase::Started => RouletteRound::SpinStarted,
        Phase::Final => RouletteRound::BallLanded,
    })
}

fn sicbo_state(phase: Phase) -> RoundState {
    RoundState::SicBo(match phase {
        Phase::Idle => SicBoRound::Idle,
        Phase::Started => SicBoRound::Shaking,
        Phase::Final => SicBoRound::Settled,
    })
}

fn lift(step: PhaseStep, map: fn(Phase) -> RoundState) -> RoundStep {
    RoundStep {
        hops: step.hops.into_iter().map(|(a, b)| (map(a), map(b))).collect(),
        armed: step.armed,
        corrected: step.corrected,
    }
}

// ── Baccarat ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BaccaratRounds {
    state: BaccaratRound,
    hand_no: Option<u64>,
    hand: BaccaratHand,
    pending: Option<ConfirmKey>,
    published: Option<(u64, BaccaratHand)>,
    revision: u64,
}

impl BaccaratRounds {
    fn new() -> Self {
        Self {
            state: BaccaratRound::Idle,
            hand_no: None,
            hand: BaccaratHand::new(),
            pending: None,
            published: None,
            revision: 0,
        }
    }

    /// Cards dealt so far in the in-flight hand.
    pub fn hand(&self) -> &BaccaratHand {
        &self.hand
    }

    fn wrap(state: BaccaratRound) -> RoundState {
        RoundState::Baccarat(state)
    }

    fn card_dealt(
        &mut self,
        hand_no: u64,
        position: CardPosition,
        card: Card,
        completes_hand: bool,
    ) -> Result<RoundStep, Rejected> {
        let published = self.published.as_ref();
        let agrees = || published.and_then(|(_, h)| h.card_at(position)) == Some(card);
        if against_published(published.map(|(n, _)| *n), hand_no, agrees)? {
            return Ok(RoundStep::ignored());
        }

        let (fresh, abandoned) = match (self.state, self.hand_no) {
            (BaccaratRound::Idle | BaccaratRound::ResultPublished, _) => (true, None),
            (BaccaratRound::Dealing | BaccaratRound::CardScanned(_), Some(current))
                if current == hand_no =>
            {
                (false, None)
            }
            (BaccaratRound::Dealing | BaccaratRound::CardScanned(_), Some(current))
                if hand_no > current =>
            {
                (true, Some(self.state))
            }
            (BaccaratRound::HandComplete, Some(current)) if current == hand_no => {
                return self.correct(hand_no, position, card);
            }
            (_, current) => {
                return reject(format!(
                    "card for hand {hand_no} while hand {} is on the layout",
                    current.unwrap_or_default()
                ));
            }
        };

        let mut next = if fresh {
            BaccaratHand::new()
        } else {
            self.hand.clone()
        };
        let expected = next.next_position();
        if expected != Some(position) {
            return reject(format!(
                "card {card} dealt to {position:?}, expected {expected:?}"
            ));
        }
        next.place(position, card);
        if next.is_complete() != completes_hand {
            return reject(format!(
                "hand {hand_no} completion flag disagrees with the drawing rules"
            ));
        }

        let mut hops = Vec::new();
        if let Some(previous) = abandoned {
            // The previous hand was never finished.
            hops.push((Self::wrap(previous), Self::wrap(BaccaratRound::Idle)));
        }
        if fresh {
            hops.push((
                Self::wrap(BaccaratRound::Idle),
                Self::wrap(BaccaratRound::Dealing),
            ));
            self.state = BaccaratRound::Dealing;
            self.hand_no = Some(hand_no);
        }
        self.hand = next;

        let scanned = BaccaratRound::CardScanned(self.hand.card_count() as u8);
        hops.push((Self::wrap(self.state), Self::wrap(scanned)));
        self.state = scanned;

        let mut armed = None;
        if completes_hand {
            hops.push((Self::wrap(scanned), Self::wrap(BaccaratRound::HandComplete)));
            self.state = BaccaratRound::HandComplete;
            armed = Some(self.arm(hand_no));
        }
        Ok(RoundStep {
            hops,
            armed,
            corrected: false,
        })
    }

    /// A rescan of a card in a complete, unpublished hand.
    fn correct(
        &mut self,
        hand_no: u64,
        position: CardPosition,
        card: Card,
    ) -> Result<RoundStep, Rejected> {
        match self.hand.card_at(position) {
            Some(existing) if existing == card => Ok(RoundStep::ignored()),
            Some(_) => {
                let mut next = self.hand.clone();
                next.place(position, card);
                if !next.is_complete() {
                    return reject(format!(
                        "correcting {position:?} to {card} reopens hand {hand_no}"
                    ));
                }
                self.hand = next;
                Ok(RoundStep {
                    hops: Vec::new(),
                    armed: Some(self.arm(hand_no)),
                    corrected: true,
                })
            }
            None => reject(format!("hand {hand_no} is complete; {position:?} is not dealt")),
        }
    }

    fn arm(&mut self, hand_no: u64) -> ConfirmKey {
        self.revision += 1;
        let key = ConfirmKey {
            round: hand_no,
            revision: self.revision,
        };
        self.pending = Some(key);
        key
    }

    fn confirm(&mut self, key: ConfirmKey) -> Option<Publication> {
        if self.state != BaccaratRound::HandComplete || self.pending != Some(key) {
            return None;
        }
        let hand = std::mem::take(&mut self.hand);
        let result = RoundResult::baccarat(key.round, &hand);
        self.published = Some((key.round, hand));
        self.pending = None;
        self.hand_no = None;
        self.state = BaccaratRound::Idle;
        Some(Publication {
            result,
            hops: vec![
                (
                    Self::wrap(BaccaratRound::HandComplete),
                    Self::wrap(BaccaratRound::ResultPublished),
                ),
                (
                    Self::wrap(BaccaratRound::ResultPublished),
                    Self::wrap(BaccaratRound::Idle),
                ),
            ],
        })
    }

    fn reset(&mut self) -> Option<BaccaratRound> {
        let previous = self.state;
        self.state = BaccaratRound::Idle;
        self.hand_no = None;
        self.hand = BaccaratHand::new();
        self.pending = None;
        (previous != BaccaratRound::Idle).then_some(previous)
    }
}

// ── The closed set of round machines ──────────────────────────────────────────

/// One round machine per game type.
#[derive(Debug, Clone)]
pub enum RoundMachine {
    Roulette(TwoStepMachine),
    SicBo(TwoStepMachine),
    Baccarat(BaccaratRounds),
}

/// Opaque state for roulette and sicbo rounds.
#[derive(Debug, Clone)]
pub struct TwoStepMachine(TwoStepRounds);

impl RoundMachine {
    pub fn new(game: GameType) -> Self {
        match game {
            GameType::Roulette => RoundMachine::Roulette(TwoStepMachine(TwoStepRounds::new())),
            GameType::SicBo => RoundMachine::SicBo(TwoStepMachine(TwoStepRounds::new())),
            GameType::Baccarat => RoundMachine::Baccarat(BaccaratRounds::new()),
        }
    }

    pub fn game(&self) -> GameType {
        match self {
            RoundMachine::Roulette(_) => GameType::Roulette,
            RoundMachine::SicBo(_) => GameType::SicBo,
            RoundMachine::Baccarat(_) => GameType::Baccarat,
        }
    }

    pub fn state(&self) -> RoundState {
        match self {
            RoundMachine::Roulette(m) => roulette_state(m.0.phase),
            RoundMachine::SicBo(m) => sicbo_state(m.0.phase),
            RoundMachine::Baccarat(m) => RoundState::Baccarat(m.state),
        }
    }

    /// The round currently in flight, if any.
    pub fn current_round(&self) -> Option<u64> {
        match self {
            RoundMachine::Roulette(m) | RoundMachine::SicBo(m) => m.0.round,
            RoundMachine::Baccarat(m) => m.hand_no,
        }
    }

    /// Feeds one decoded observation into the machine.
    pub fn observe(&mut self, observation: &Observation) -> Result<RoundStep, Rejected> {
        match (self, observation) {
            (RoundMachine::Roulette(m), Observation::Roulette(obs)) => {
                let step = match *obs {
                    RouletteObservation::SpinStarted { round } => m.0.start(round)?,
                    RouletteObservation::BallLanded { round, pocket } => {
                        if pocket > 36 {
                            return reject(format!("pocket {pocket} is not on the wheel"));
                        }
                        m.0.finish(round, RoundResult::roulette(round, pocket))?
                    }
                };
                Ok(lift(step, roulette_state))
            }
            (RoundMachine::SicBo(m), Observation::SicBo(obs)) => {
                let step = match *obs {
                    SicBoObservation::ShakeStarted { round } => m.0.start(round)?,
                    SicBoObservation::DiceSettled { round, dice } => {
                        if dice.iter().any(|d| !(1..=6).contains(d)) {
                            return reject(format!("dice {dice:?} out of range"));
                        }
                        m.0.finish(round, RoundResult::sicbo(round, dice))?
                    }
                };
                Ok(lift(step, sicbo_state))
            }
            (RoundMachine::Baccarat(m), Observation::Baccarat(obs)) => match *obs {
                BaccaratObservation::CardDealt {
                    hand,
                    position,
                    card,
                    completes_hand,
                } => m.card_dealt(hand, position, card, completes_hand),
            },
            (machine, _) => reject(format!(
                "observation does not belong to a {} table",
                machine.game()
            )),
        }
    }

    /// Publishes the pending result armed with `key`, if it is still current.
    pub fn confirm(&mut self, key: ConfirmKey) -> Option<Publication> {
        match self {
            RoundMachine::Roulette(m) => m.0.confirm(key).map(|result| Publication {
                result,
                hops: vec![
                    (
                        RoundState::Roulette(RouletteRound::BallLanded),
                        RoundState::Roulette(RouletteRound::ResultPublished),
                    ),
                    (
                        RoundState::Roulette(RouletteRound::ResultPublished),
                        RoundState::Roulette(RouletteRound::Idle),
                    ),
                ],
            }),
            RoundMachine::SicBo(m) => m.0.confirm(key).map(|result| Publication {
                result,
                hops: vec![
                    (
                        RoundState::SicBo(SicBoRound::Settled),
                        RoundState::SicBo(SicBoRound::ResultPublished),
                    ),
                    (
                        RoundState::SicBo(SicBoRound::ResultPublished),
                        RoundState::SicBo(SicBoRound::Validated),
                    ),
                    (
                        RoundState::SicBo(SicBoRound::Validated),
                        RoundState::SicBo(SicBoRound::Idle),
                    ),
                ],
            }),
            RoundMachine::Baccarat(m) => m.confirm(key),
        }
    }

    /// Discards the in-flight round.  Returns the hop back to IDLE when the
    /// machine was not already idle.
    pub fn reset(&mut self) -> Option<Hop> {
        let idle = RoundState::idle(self.game());
        match self {
            RoundMachine::Roulette(m) => m.0.reset().map(|p| (roulette_state(p), idle)),
            RoundMachine::SicBo(m) => m.0.reset().map(|p| (sicbo_state(p), idle)),
            RoundMachine::Baccarat(m) => m.reset().map(|s| (RoundState::Baccarat(s), idle)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cards::{Rank, Suit};

    fn spin(round: u64) -> Observation {
        Observation::Roulette(RouletteObservation::SpinStarted { round })
    }

    fn landed(round: u64, pocket: u8) -> Observation {
        Observation::Roulette(RouletteObservation::BallLanded { round, pocket })
    }

    fn shake(round: u64) -> Observation {
        Observation::SicBo(SicBoObservation::ShakeStarted { round })
    }

    fn settled(round: u64, dice: [u8; 3]) -> Observation {
        Observation::SicBo(SicBoObservation::DiceSettled { round, dice })
    }

    fn dealt(hand: u64, position: CardPosition, rank: Rank, completes_hand: bool) -> Observation {
        Observation::Baccarat(BaccaratObservation::CardDealt {
            hand,
            position,
            card: Card::new(rank, Suit::Hearts),
            completes_hand,
        })
    }

    #[test]
    fn test_roulette_round_publishes_once_and_returns_to_idle() {
        // Arrange
        let mut machine = RoundMachine::new(GameType::Roulette);

        // Act
        machine.observe(&spin(1)).unwrap();
        let step = machine.observe(&landed(1, 17)).unwrap();
        let key = step.armed.unwrap();
        let publication = machine.confirm(key).unwrap();

        // Assert
        assert_eq!(publication.result, RoundResult::roulette(1, 17));
        assert_eq!(publication.hops.len(), 2);
        assert!(machine.state().is_idle());
        assert!(machine.confirm(key).is_none(), "second confirm publishes nothing");
    }

    #[test]
    fn test_roulette_cannot_land_before_spin() {
        let mut machine = RoundMachine::new(GameType::Roulette);
        assert!(machine.observe(&landed(1, 5)).is_err());
        assert!(machine.state().is_idle());
    }

    #[test]
    fn test_correction_before_publish_replaces_pending_result() {
        // Arrange
        let mut machine = RoundMachine::new(GameType::Roulette);
        machine.observe(&spin(4)).unwrap();
        let first = machine.observe(&landed(4, 10)).unwrap().armed.unwrap();

        // Act
        let step = machine.observe(&landed(4, 11)).unwrap();
        let second = step.armed.unwrap();

        // Assert – the superseded key confirms nothing
        assert!(step.corrected);
        assert!(machine.confirm(first).is_none());
        let publication = machine.confirm(second).unwrap();
        assert_eq!(publication.result, RoundResult::roulette(4, 11));
    }

    #[test]
    fn test_contradiction_after_publish_is_rejected() {
        // Arrange
        let mut machine = RoundMachine::new(GameType::Roulette);
        machine.observe(&spin(2)).unwrap();
        let key = machine.observe(&landed(2, 8)).unwrap().armed.unwrap();
        machine.confirm(key).unwrap();

        // Act
        let repeat = machine.observe(&landed(2, 8));
        let contradiction = machine.observe(&landed(2, 9));

        // Assert
        assert!(repeat.unwrap().is_noop());
        assert!(contradiction.is_err());
        assert!(machine.state().is_idle());
    }

    #[test]
    fn test_sicbo_publication_passes_through_validated() {
        // Arrange
        let mut machine = RoundMachine::new(GameType::SicBo);
        machine.observe(&shake(7)).unwrap();
        let step = machine.observe(&settled(7, [4, 4, 6])).unwrap();
        assert_eq!(machine.state(), RoundState::SicBo(SicBoRound::Settled));

        // Act
        let publication = machine.confirm(step.armed.unwrap()).unwrap();

        // Assert
        let targets: Vec<_> = publication.hops.iter().map(|(_, to)| *to).collect();
        assert_eq!(
            targets,
            vec![
                RoundState::SicBo(SicBoRound::ResultPublished),
                RoundState::SicBo(SicBoRound::Validated),
                RoundState::SicBo(SicBoRound::Idle),
            ]
        );
    }

    #[test]
    fn test_new_round_abandons_unfinished_round() {
        let mut machine = RoundMachine::new(GameType::SicBo);
        machine.observe(&shake(1)).unwrap();
        let step = machine.observe(&shake(2)).unwrap();
        assert_eq!(step.hops.len(), 2);
        assert_eq!(machine.current_round(), Some(2));
    }

    #[test]
    fn test_older_round_is_rejected() {
        let mut machine = RoundMachine::new(GameType::SicBo);
        machine.observe(&shake(5)).unwrap();
        assert!(machine.observe(&shake(4)).is_err());
    }

    #[test]
    fn test_observation_for_other_game_is_rejected() {
        let mut machine = RoundMachine::new(GameType::Baccarat);
        assert!(machine.observe(&spin(1)).is_err());
    }

    #[test]
    fn test_baccarat_hand_walks_dealing_to_complete() {
        // Arrange – player 9 (4 + 5), banker 0: natural after four cards
        let mut machine = RoundMachine::new(GameType::Baccarat);

        // Act
        let first = machine
            .observe(&dealt(1, CardPosition::Player1, Rank::Four, false))
            .unwrap();
        machine
            .observe(&dealt(1, CardPosition::Banker1, Rank::Ten, false))
            .unwrap();
        machine
            .observe(&dealt(1, CardPosition::Player2, Rank::Five, false))
            .unwrap();
        let last = machine
            .observe(&dealt(1, CardPosition::Banker2, Rank::King, true))
            .unwrap();

        // Assert
        assert_eq!(
            first.hops[0],
            (
                RoundState::Baccarat(BaccaratRound::Idle),
                RoundState::Baccarat(BaccaratRound::Dealing)
            )
        );
        assert_eq!(
            machine.state(),
            RoundState::Baccarat(BaccaratRound::HandComplete)
        );
        let publication = machine.confirm(last.armed.unwrap()).unwrap();
        assert_eq!(publication.result.round(), 1);
        assert!(machine.state().is_idle());
    }

    #[test]
    fn test_baccarat_rejects_out_of_order_position() {
        let mut machine = RoundMachine::new(GameType::Baccarat);
        let err = machine
            .observe(&dealt(1, CardPosition::Banker1, Rank::Two, false))
            .unwrap_err();
        assert!(err.0.contains("expected"));
        assert!(machine.state().is_idle());
    }

    #[test]
    fn test_baccarat_rejects_wrong_completion_flag() {
        let mut machine = RoundMachine::new(GameType::Baccarat);
        machine
            .observe(&dealt(1, CardPosition::Player1, Rank::Four, false))
            .unwrap();
        machine
            .observe(&dealt(1, CardPosition::Banker1, Rank::Ten, false))
            .unwrap();
        machine
            .observe(&dealt(1, CardPosition::Player2, Rank::Five, false))
            .unwrap();
        // Natural 9 completes the hand, so `false` is wrong.
        assert!(machine
            .observe(&dealt(1, CardPosition::Banker2, Rank::King, false))
            .is_err());
    }

    #[test]
    fn test_reset_reports_hop_to_idle() {
        let mut machine = RoundMachine::new(GameType::Roulette);
        assert!(machine.reset().is_none());
        machine.observe(&spin(1)).unwrap();
        let hop = machine.reset().unwrap();
        assert_eq!(hop.0, RoundState::Roulette(RouletteRound::SpinStarted));
        assert!(hop.1.is_idle());
        assert_eq!(machine.current_round(), None);
    }
}
