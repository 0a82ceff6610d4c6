use serde::{Serialize, Serializer};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// Rank value given to every mate line, above any realistic centipawn score.
pub const MATE_RANK_VALUE: i32 = 100_000;

/// A continuation line: move tokens exactly as the engine printed them.
pub type Line = SmallVec<[String; 8]>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawKind {
   Stalemate,
   InsufficientMaterial,
   FiftyMoveRule,
   ThreefoldRepetition,
}

/// One scored variation of an evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Move {
   /// Score in hundredths of a pawn, from the side to move's perspective.
   Centipawn { centipawns: i32, continuation: Line },
   /// Mate in `mate_in`; negative when the side to move is the one mated.
   Mate { mate_in: i32, continuation: Line },
   Draw { draw: DrawKind, continuation: Option<Line> },
}

impl Move {
   pub fn stalemate() -> Move {
      Move::Draw {
         draw: DrawKind::Stalemate,
         continuation: None,
      }
   }

   pub fn rank_value(&self) -> i32 {
      match self {
         Move::Centipawn { centipawns, .. } => *centipawns,
         Move::Mate { .. } => MATE_RANK_VALUE,
         Move::Draw { .. } => 0,
      }
   }

   pub fn continuation(&self) -> Option<&[String]> {
      match self {
         Move::Centipawn { continuation, .. } | Move::Mate { continuation, .. } => Some(continuation.as_slice()),
         Move::Draw { continuation, .. } => continuation.as_deref(),
      }
   }

   /// The continuation joined with single spaces, if there is one.
   pub fn continuation_string(&self) -> Option<String> {
      self.continuation().map(|moves| moves.join(" "))
   }

   pub fn is_mate(&self) -> bool {
      matches!(self, Move::Mate { .. })
   }
}

/// The engine's multi-variation verdict on a position, ranked 1..K.
///
/// Never empty: when the engine reports no scored variation the evaluation
/// holds a single stalemate draw.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Evaluation {
   score: i32,
   moves: Vec<Move>,
}

impl Evaluation {
   /// `moves` must already be in the engine's rank order.
   pub fn new(mut moves: Vec<Move>) -> Evaluation {
      if moves.is_empty() {
         moves.push(Move::stalemate());
      }
      Evaluation {
         score: moves[0].rank_value(),
         moves,
      }
   }

   /// Rank value of the first variation.
   pub fn score(&self) -> i32 {
      self.score
   }

   pub fn best(&self) -> &Move {
      &self.moves[0]
   }

   pub fn moves(&self) -> &[Move] {
      &self.moves
   }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PromotionTarget {
   Knight,
   Bishop,
   Rook,
   Queen,
}

impl fmt::Display for PromotionTarget {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      let display = match self {
         PromotionTarget::Knight => "n",
         PromotionTarget::Bishop => "b",
         PromotionTarget::Rook => "r",
         PromotionTarget::Queen => "q",
      };
      write!(f, "{}", display)
   }
}

impl FromStr for PromotionTarget {
   type Err = String;

   fn from_str(s: &str) -> Result<PromotionTarget, String> {
      match s {
         "n" => Ok(PromotionTarget::Knight),
         "b" => Ok(PromotionTarget::Bishop),
         "r" => Ok(PromotionTarget::Rook),
         "q" => Ok(PromotionTarget::Queen),
         _ => Err(format!("Expected one of ASCII nbrq for promotion target, got {}", s)),
      }
   }
}

/// A move in coordinate notation, e.g. `e2e4` or `e7e8q`.
///
/// Squares are indexed from a8 = 0 to h1 = 63.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CoordinateMove {
   pub origin: u8,
   pub destination: u8,
   pub promotion: Option<PromotionTarget>,
}

fn algebraic_to_index(square: &str) -> Result<u8, String> {
   let bytes = square.as_bytes();
   if bytes.len() != 2 {
      return Err(format!("Expected a two character square, got {}", square));
   }
   let file = bytes[0];
   let rank = bytes[1];
   if !(b'a'..=b'h').contains(&file) || !(b'1'..=b'8').contains(&rank) {
      return Err(format!("Square {} is off the board", square));
   }
   Ok((b'8' - rank) * 8 + (file - b'a'))
}

fn index_to_algebraic(index: u8, f: &mut fmt::Formatter) -> fmt::Result {
   let file = (b'a' + index % 8) as char;
   let rank = (b'8' - index / 8) as char;
   write!(f, "{}{}", file, rank)
}

impl fmt::Display for CoordinateMove {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      index_to_algebraic(self.origin, f)?;
      index_to_algebraic(self.destination, f)?;
      if let Some(promotion) = self.promotion {
         write!(f, "{}", promotion)?;
      }
      Ok(())
   }
}

impl FromStr for CoordinateMove {
   type Err = String;

   fn from_str(s: &str) -> Result<CoordinateMove, String> {
      if !s.is_ascii() || s.len() < 4 || s.len() > 5 {
         return Err(format!(
            "A coordinate move has to be 4-5 ASCII bytes long, got a move ({}) that was {} bytes long",
            s,
            s.len()
         ));
      }
      let promotion = match s.get(4..5) {
         Some(target) => Some(target.parse()?),
         None => None,
      };
      Ok(CoordinateMove {
         origin: algebraic_to_index(&s[..2])?,
         destination: algebraic_to_index(&s[2..4])?,
         promotion,
      })
   }
}

impl Serialize for CoordinateMove {
   fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
      serializer.collect_str(self)
   }
}

/// Outcome of a best-move search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BestMove {
   Found {
      best: CoordinateMove,
      ponder: Option<CoordinateMove>,
   },
   /// The engine reported that the side to move has no legal move.
   NoMove,
}

impl BestMove {
   pub fn best(&self) -> Option<CoordinateMove> {
      match self {
         BestMove::Found { best, .. } => Some(*best),
         BestMove::NoMove => None,
      }
   }

   pub fn is_no_move(&self) -> bool {
      *self == BestMove::NoMove
   }
}

/// What the engine says about itself in reply to `uci`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EngineInfo {
   pub name: Option<String>,
   pub author: Option<String>,
   pub options: Vec<String>,
}
