//! Pure translations from raw engine output lines into domain values.
//!
//! Nothing in here touches the process; the session feeds lines in and
//! decides what to do with the results.

use crate::model::{BestMove, CoordinateMove, EngineInfo, Line, Move};
use fxhash::FxHashMap;
use noisy_float::prelude::*;
use once_cell::sync::Lazy;
use regex::Regex;

pub const READY_TOKEN: &str = "readyok";
pub const UCI_OK_TOKEN: &str = "uciok";
pub const BEST_MOVE_TOKEN: &str = "bestmove";
pub const NO_MOVE_TOKEN: &str = "(none)";
pub const POSITION_CODE_LABEL: &str = "Fen:";
/// Last line of a `d` dump.
pub const DUMP_END_LABEL: &str = "Checkers:";
pub const STATIC_EVALUATION_LABEL: &str = "Final evaluation";

/// 8 ranks with a border line each, plus the closing border.
pub const BOARD_LINES: usize = 17;

static INFO_LINE: Lazy<Regex> = Lazy::new(|| {
   Regex::new(
      r"^info\s+depth\s+(?P<depth>\d+)(?:\s+seldepth\s+\d+)?(?:\s+multipv\s+(?P<rank>\d+))?\s+score\s+(?P<kind>cp|mate)\s+(?P<value>-?\d+)\b.*?\spv\s+(?P<pv>\S.*?)\s*$",
   )
   .expect("info line pattern should be valid")
});

static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+(\.\d+)?").expect("decimal pattern should be valid"));

pub fn is_ready_ok(line: &str) -> bool {
   line.trim() == READY_TOKEN
}

pub fn is_uci_ok(line: &str) -> bool {
   line.trim() == UCI_OK_TOKEN
}

pub fn is_dump_end(line: &str) -> bool {
   line.split_whitespace().next() == Some(DUMP_END_LABEL)
}

pub fn is_board_line(line: &str) -> bool {
   line.contains('+') || line.contains('|')
}

/// Collects the bordered rows of a board dump in the order they arrive.
#[derive(Debug, Default)]
pub struct BoardDump {
   text: String,
   lines: usize,
}

impl BoardDump {
   pub fn new() -> BoardDump {
      BoardDump::default()
   }

   /// Takes the line if it belongs to the board; returns whether it did.
   pub fn push(&mut self, line: &str) -> bool {
      if self.is_complete() || !is_board_line(line) {
         return false;
      }
      self.text.push_str(line);
      self.text.push('\n');
      self.lines += 1;
      true
   }

   pub fn lines(&self) -> usize {
      self.lines
   }

   pub fn is_complete(&self) -> bool {
      self.lines == BOARD_LINES
   }

   pub fn into_string(self) -> String {
      self.text
   }
}

/// `Fen: <code>` → `<code>`, with the remaining tokens joined by single spaces.
pub fn parse_position_code(line: &str) -> Option<String> {
   let mut tokens = line.split_whitespace();
   if tokens.next()? != POSITION_CODE_LABEL {
      return None;
   }
   Some(tokens.collect::<Vec<_>>().join(" "))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Score {
   Centipawns(i32),
   Mate(i32),
}

/// One scored `info depth ...` progress line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InfoLine {
   pub depth: u32,
   pub rank: u32,
   pub score: Score,
   pub continuation: Line,
}

impl From<InfoLine> for Move {
   fn from(info: InfoLine) -> Move {
      match info.score {
         Score::Centipawns(centipawns) => Move::Centipawn {
            centipawns,
            continuation: info.continuation,
         },
         Score::Mate(mate_in) => Move::Mate {
            mate_in,
            continuation: info.continuation,
         },
      }
   }
}

pub fn parse_info_line(line: &str) -> Option<InfoLine> {
   let caps = INFO_LINE.captures(line.trim_end())?;
   let depth = caps["depth"].parse().ok()?;
   let rank = match caps.name("rank") {
      Some(rank) => rank.as_str().parse().ok()?,
      None => 1,
   };
   if rank == 0 {
      return None;
   }
   let value = caps["value"].parse().ok()?;
   let score = match &caps["kind"] {
      "cp" => Score::Centipawns(value),
      _ => Score::Mate(value),
   };
   let continuation = caps["pv"].split_whitespace().map(str::to_string).collect();
   Some(InfoLine {
      depth,
      rank,
      score,
      continuation,
   })
}

/// Reduces a search's output to one line per variation at exactly `depth`,
/// ordered by rank. Later lines for the same rank replace earlier ones.
pub fn collect_variations<'a, I>(lines: I, depth: u32) -> Vec<InfoLine>
where
   I: IntoIterator<Item = &'a str>,
{
   let mut by_rank: FxHashMap<u32, InfoLine> = FxHashMap::default();
   for info in lines.into_iter().filter_map(parse_info_line) {
      if info.depth == depth {
         by_rank.insert(info.rank, info);
      }
   }
   let mut variations: Vec<InfoLine> = by_rank.into_values().collect();
   variations.sort_by_key(|info| info.rank);
   variations
}

/// `None` if the line is not a completion line at all.
pub fn parse_best_move(line: &str) -> Option<Result<BestMove, String>> {
   let mut tokens = line.split_whitespace();
   if tokens.next()? != BEST_MOVE_TOKEN {
      return None;
   }
   let best = match tokens.next() {
      Some(NO_MOVE_TOKEN) => return Some(Ok(BestMove::NoMove)),
      Some(token) => token,
      None => return Some(Err(format!("completion line without a move: {}", line))),
   };
   let ponder = match (tokens.next(), tokens.next()) {
      (Some("ponder"), Some(token)) => token.parse::<CoordinateMove>().ok(),
      _ => None,
   };
   Some(best.parse().map(|best| BestMove::Found { best, ponder }))
}

pub fn is_static_evaluation_line(line: &str) -> bool {
   line.contains(STATIC_EVALUATION_LABEL)
}

/// First number on a static evaluation line, in pawns. The engine prints no
/// number when it declines to evaluate, e.g. while in check.
pub fn parse_static_evaluation(line: &str) -> Option<N64> {
   let found = DECIMAL.find(line)?;
   found.as_str().parse::<f64>().ok().filter(|value| value.is_finite()).map(n64)
}

/// Folds one line of the reply to `uci` into `info`.
pub fn parse_identification(line: &str, info: &mut EngineInfo) {
   let mut tokens = line.split_whitespace();
   match (tokens.next(), tokens.next()) {
      (Some("id"), Some("name")) => info.name = Some(tokens.collect::<Vec<_>>().join(" ")),
      (Some("id"), Some("author")) => info.author = Some(tokens.collect::<Vec<_>>().join(" ")),
      (Some("option"), Some("name")) => {
         let name: Vec<&str> = tokens.take_while(|token| *token != "type").collect();
         if !name.is_empty() {
            info.options.push(name.join(" "));
         }
      }
      _ => (),
   }
}
