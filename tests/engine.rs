//! End-to-end checks against a real engine binary.
//!
//! The engine is taken from `STOCKFISH_PATH`, falling back to
//! `/usr/games/stockfish`. Without one these tests only log and pass.

use log::warn;
use std::path::{Path, PathBuf};
use stockpipe::{BestMove, DrawKind, Move, SearchMode, Session};

const START_CODE: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

const OPENING_MOVES: [&str; 20] = [
   "a2a3", "a2a4", "b2b3", "b2b4", "c2c3", "c2c4", "d2d3", "d2d4", "e2e3", "e2e4", "f2f3", "f2f4", "g2g3", "g2g4",
   "h2h3", "h2h4", "b1a3", "b1c3", "g1f3", "g1h3",
];

fn engine_path() -> Option<PathBuf> {
   let _ = pretty_env_logger::try_init();
   let path = std::env::var_os("STOCKFISH_PATH")
      .map(PathBuf::from)
      .unwrap_or_else(|| PathBuf::from("/usr/games/stockfish"));
   if Path::new(&path).exists() {
      Some(path)
   } else {
      warn!("no engine at {}, skipping", path.display());
      None
   }
}

fn session() -> Option<Session> {
   engine_path().map(|path| Session::with_defaults(path).unwrap())
}

fn is_coordinate_move(text: &str) -> bool {
   let bytes = text.as_bytes();
   (bytes.len() == 4 || bytes.len() == 5)
      && (b'a'..=b'h').contains(&bytes[0])
      && (b'1'..=b'8').contains(&bytes[1])
      && (b'a'..=b'h').contains(&bytes[2])
      && (b'1'..=b'8').contains(&bytes[3])
      && bytes.get(4).map_or(true, |p| b"qrbn".contains(p))
}

#[test]
fn fresh_session_is_at_the_start_position() {
   let mut session = match session() {
      Some(session) => session,
      None => return,
   };
   assert_eq!(session.get_position_code().unwrap(), START_CODE);
}

#[test]
fn position_code_after_moves() {
   let mut session = match session() {
      Some(session) => session,
      None => return,
   };
   session.set_position_by_moves(&["e2e4", "e7e6"]).unwrap();
   assert_eq!(
      session.get_position_code().unwrap(),
      "rnbqkbnr/pppp1ppp/4p3/8/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2"
   );
}

#[test]
fn board_visual_after_moves() {
   let mut session = match session() {
      Some(session) => session,
      None => return,
   };
   session.set_position_by_moves(&["e2e4", "e7e6", "d2d4", "d7d5"]).unwrap();
   let expected = concat!(
      " +---+---+---+---+---+---+---+---+\n",
      " | r | n | b | q | k | b | n | r | 8\n",
      " +---+---+---+---+---+---+---+---+\n",
      " | p | p | p |   |   | p | p | p | 7\n",
      " +---+---+---+---+---+---+---+---+\n",
      " |   |   |   |   | p |   |   |   | 6\n",
      " +---+---+---+---+---+---+---+---+\n",
      " |   |   |   | p |   |   |   |   | 5\n",
      " +---+---+---+---+---+---+---+---+\n",
      " |   |   |   | P | P |   |   |   | 4\n",
      " +---+---+---+---+---+---+---+---+\n",
      " |   |   |   |   |   |   |   |   | 3\n",
      " +---+---+---+---+---+---+---+---+\n",
      " | P | P | P |   |   | P | P | P | 2\n",
      " +---+---+---+---+---+---+---+---+\n",
      " | R | N | B | Q | K | B | N | R | 1\n",
      " +---+---+---+---+---+---+---+---+\n",
   );
   assert_eq!(session.get_board_visual().unwrap(), expected);
}

#[test]
fn first_move_is_a_legal_opening_move() {
   let mut session = match session() {
      Some(session) => session,
      None => return,
   };
   let best = session.get_next_best_move().unwrap().best().unwrap().to_string();
   assert!(is_coordinate_move(&best));
   assert!(OPENING_MOVES.contains(&best.as_str()), "unexpected opening move {}", best);
}

#[test]
fn timed_search_returns_a_move() {
   let mut session = match session() {
      Some(session) => session,
      None => return,
   };
   session.set_position_by_moves(&["e2e4", "e7e5"]).unwrap();
   let best = session.get_best_move(SearchMode::MoveTime(std::time::Duration::from_millis(200))).unwrap();
   assert!(best.best().map_or(false, |m| is_coordinate_move(&m.to_string())));
}

#[test]
fn fools_mate_has_no_best_move() {
   let mut session = match session() {
      Some(session) => session,
      None => return,
   };
   session.set_position_by_moves(&["f2f3", "e7e5", "g2g4", "d8h4"]).unwrap();
   assert_eq!(session.get_next_best_move().unwrap(), BestMove::NoMove);
}

#[test]
fn legality_of_candidate_moves() {
   let mut session = match session() {
      Some(session) => session,
      None => return,
   };
   assert!(session.is_move_legal("e2e4").unwrap());
   assert!(session.is_move_legal("g1f3").unwrap());
   assert!(!session.is_move_legal("e2e5").unwrap());
   assert!(!session.is_move_legal("e1e2").unwrap());

   session.set_position_by_moves(&["f2f3", "e7e5", "g2g4", "d8h4"]).unwrap();
   assert!(!session.is_move_legal("g4g5").unwrap());
}

#[test]
fn stalemate_evaluates_to_a_single_draw() {
   let mut session = match session() {
      Some(session) => session,
      None => return,
   };
   session.set_position_by_board_code("1nb1kqn1/pppppppp/8/6r1/5b1K/6r1/8/8 w - - 2 2").unwrap();
   let evaluation = session.evaluate(2).unwrap();
   assert_eq!(evaluation.moves().len(), 1);
   assert_eq!(evaluation.score(), 0);
   match evaluation.best() {
      Move::Draw { draw, continuation } => {
         assert_eq!(*draw, DrawKind::Stalemate);
         assert!(continuation.is_none());
      }
      other => panic!("expected a draw, got {:?}", other),
   }
}

#[test]
fn evaluation_ranks_mates_first() {
   let mut session = match session() {
      Some(session) => session,
      None => return,
   };
   session.set_position_by_board_code("6k1/p4p1p/6p1/5r2/3b4/6PP/4qP2/5RK1 b - - 14 36").unwrap();
   let evaluation = session.evaluate(6).unwrap();
   assert!(!evaluation.moves().is_empty());
   let lowest_mate = evaluation.moves().iter().filter(|m| m.is_mate()).map(Move::rank_value).min();
   let highest_other = evaluation.moves().iter().filter(|m| !m.is_mate()).map(Move::rank_value).max();
   if let (Some(mate), Some(other)) = (lowest_mate, highest_other) {
      assert!(mate > other);
   }
   assert_eq!(evaluation.score(), evaluation.best().rank_value());
}

#[test]
fn skill_level_round_trips() {
   let mut session = match session() {
      Some(session) => session,
      None => return,
   };
   session.set_skill_level(3).unwrap();
   assert_eq!(session.skill_level(), 3);
   assert!(session.get_next_best_move().unwrap().best().is_some());
}
