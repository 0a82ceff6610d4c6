//! The protocol session: one engine, one conversation at a time.
//!
//! Every command is written, then its response is drained before the next
//! command goes out. Mutating commands are followed by an `isready` probe so
//! the engine has provably finished with them. Reads are bounded by a line
//! cap and, optionally, a wall-clock deadline.

use crate::error::{Error, Result};
use crate::model::{BestMove, EngineInfo, Evaluation, Move};
use crate::parser::{self, BoardDump, BEST_MOVE_TOKEN};
use crate::process::{EngineProcess, LineRead, SentinelOutcome, Transport};
use crate::settings::{SessionOptions, Settings};
use log::{debug, info, trace, warn};
use noisy_float::prelude::N64;
use std::path::Path;
use std::time::{Duration, Instant};

/// Added to a movetime search's wait hint and deadline.
pub const MOVE_TIME_MARGIN: Duration = Duration::from_millis(100);
pub const DEFAULT_MOVE_TIME: Duration = Duration::from_millis(1000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
   Uninitialized,
   Started,
   Ready,
   Busy,
   Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchMode {
   Depth(u32),
   MoveTime(Duration),
}

impl SearchMode {
   fn command(&self) -> String {
      match self {
         SearchMode::Depth(depth) => format!("go depth {}", depth),
         SearchMode::MoveTime(time) => format!("go movetime {}", time.as_millis()),
      }
   }

   fn allowance(&self) -> Duration {
      match self {
         SearchMode::Depth(_) => Duration::from_millis(0),
         SearchMode::MoveTime(time) => time.checked_add(MOVE_TIME_MARGIN).unwrap_or(Duration::MAX),
      }
   }
}

/// A running engine plus everything needed to talk to it.
///
/// Methods take `&mut self`, so a session can only ever have one command in
/// flight. Any timeout, pipe or exit error closes the session for good and
/// later calls fail with `Error::Poisoned`. The engine is stopped when the
/// session is dropped.
pub struct Session<T: Transport = EngineProcess> {
   transport: T,
   state: SessionState,
   settings: Settings,
   options: SessionOptions,
}

impl Session<EngineProcess> {
   pub fn start<P: AsRef<Path>>(path: P, settings: Settings, options: SessionOptions) -> Result<Session> {
      let process = EngineProcess::start(path)?;
      Session::over(process, settings, options)
   }

   pub fn with_defaults<P: AsRef<Path>>(path: P) -> Result<Session> {
      Session::start(path, Settings::default(), SessionOptions::default())
   }
}

impl<T: Transport> Session<T> {
   /// Runs the startup sequence over an already connected transport: skip
   /// the banner, forward every setting, start a new game.
   pub fn over(transport: T, settings: Settings, options: SessionOptions) -> Result<Session<T>> {
      let mut session = Session {
         transport,
         state: SessionState::Uninitialized,
         settings,
         options,
      };
      session.initialize()?;
      Ok(session)
   }

   fn initialize(&mut self) -> Result<()> {
      let deadline = self.deadline(Duration::from_millis(0));
      match self.transport.read_line_until(deadline) {
         LineRead::Line(banner) => debug!("engine banner: {}", banner),
         LineRead::Closed => return Err(self.poison(Error::EngineExited { command: "startup".into() })),
         LineRead::TimedOut => {
            let err = Error::Deadline {
               command: "startup".into(),
               deadline: self.options.read_deadline.unwrap_or_default(),
            };
            return Err(self.poison(err));
         }
      }
      self.state = SessionState::Started;

      let result = self.settings.options().into_iter().try_for_each(|(name, value)| self.set_option(name, &value));
      if let Err(e) = result.and_then(|_| self.new_game()) {
         return Err(self.poison(e));
      }
      self.state = SessionState::Ready;
      info!("engine session ready");
      Ok(())
   }

   pub fn state(&self) -> SessionState {
      self.state
   }

   pub fn settings(&self) -> &Settings {
      &self.settings
   }

   pub fn depth(&self) -> u32 {
      self.options.depth
   }

   pub fn set_depth(&mut self, depth: u32) {
      self.options.depth = depth;
   }

   pub fn evaluation_depth(&self) -> u32 {
      self.options.evaluation_depth
   }

   pub fn set_evaluation_depth(&mut self, depth: u32) {
      self.options.evaluation_depth = depth;
   }

   pub fn skill_level(&self) -> i32 {
      self.settings.skill_level
   }

   /// Stores the level and forwards it to the engine. The engine decides
   /// which levels are valid.
   pub fn set_skill_level(&mut self, level: i32) -> Result<()> {
      self.run(|s| {
         s.settings.skill_level = level;
         s.set_option("Skill Level", &level.to_string())
      })
   }

   pub fn apply_option(&mut self, name: &str, value: &str) -> Result<()> {
      self.run(|s| s.set_option(name, value))
   }

   pub fn reset_game(&mut self) -> Result<()> {
      self.run(|s| s.new_game())
   }

   /// Replays `moves` (coordinate notation) from the starting position.
   pub fn set_position_by_moves<S: AsRef<str>>(&mut self, moves: &[S]) -> Result<()> {
      let moves: Vec<&str> = moves.iter().map(AsRef::as_ref).collect();
      let command = if moves.is_empty() {
         "position startpos".to_string()
      } else {
         format!("position startpos moves {}", moves.join(" "))
      };
      self.run(|s| {
         s.new_game()?;
         s.send(&command, Duration::from_millis(0))
      })
   }

   pub fn set_position_by_board_code(&mut self, code: &str) -> Result<()> {
      let command = format!("position fen {}", code);
      self.run(|s| {
         s.new_game()?;
         s.send(&command, Duration::from_millis(0))
      })
   }

   /// The engine's ASCII drawing of the board: 17 bordered lines, each
   /// terminated by `\n`.
   pub fn get_board_visual(&mut self) -> Result<String> {
      self.run(|s| {
         let (dump, _) = s.read_dump()?;
         if !dump.is_complete() {
            return Err(Error::Protocol(format!(
               "board dump ended after {} of {} rows",
               dump.lines(),
               parser::BOARD_LINES
            )));
         }
         Ok(dump.into_string())
      })
   }

   pub fn get_position_code(&mut self) -> Result<String> {
      self.run(|s| {
         let (_, code) = s.read_dump()?;
         code.ok_or_else(|| Error::Protocol("board dump has no position code".to_string()))
      })
   }

   pub fn get_best_move(&mut self, mode: SearchMode) -> Result<BestMove> {
      self.run(|s| {
         let command = mode.command();
         s.send(&command, mode.allowance())?;
         let deadline = s.deadline(mode.allowance());
         s.read_bounded(&command, deadline, parser::parse_best_move)?
            .map_err(Error::Protocol)
      })
   }

   /// Best move at the session's search depth.
   pub fn get_next_best_move(&mut self) -> Result<BestMove> {
      let depth = self.options.depth;
      self.get_best_move(SearchMode::Depth(depth))
   }

   pub fn get_best_move_time(&mut self, time: Duration) -> Result<BestMove> {
      self.get_best_move(SearchMode::MoveTime(time))
   }

   /// Asks the engine to search only `candidate`; it is legal exactly when
   /// the engine then names a best move.
   pub fn is_move_legal(&mut self, candidate: &str) -> Result<bool> {
      self.run(|s| {
         let command = format!("go depth 1 searchmoves {}", candidate);
         s.send(&command, Duration::from_millis(0))?;
         let deadline = s.deadline(Duration::from_millis(0));
         let best_move = s.read_bounded(&command, deadline, parser::parse_best_move)?.map_err(Error::Protocol)?;
         Ok(!best_move.is_no_move())
      })
   }

   /// Searches to `depth` and reports every variation the engine scored at
   /// exactly that depth, in the engine's rank order.
   ///
   /// The whole search output is read, however long it is. A search that
   /// scores nothing (no legal move at the root) comes back as a single
   /// stalemate draw.
   pub fn evaluate(&mut self, depth: u32) -> Result<Evaluation> {
      self.run(|s| {
         let command = format!("go depth {}", depth);
         s.send(&command, Duration::from_millis(0))?;
         let deadline = s.deadline(Duration::from_millis(0));

         let mut lines = s.transport.read_until_sentinel(BEST_MOVE_TOKEN, deadline);
         let output: Vec<String> = lines.by_ref().collect();
         match lines.outcome() {
            Some(SentinelOutcome::Seen) => (),
            Some(SentinelOutcome::TimedOut) => return Err(s.deadline_error(&command)),
            Some(SentinelOutcome::Closed) | None => return Err(Error::EngineExited { command }),
         }
         trace!("search at depth {} produced {} lines", depth, output.len());

         let variations = parser::collect_variations(output.iter().map(String::as_str), depth);
         if variations.is_empty() {
            debug!("no scored variation at depth {}, reporting a draw", depth);
         }
         Ok(Evaluation::new(variations.into_iter().map(Move::from).collect()))
      })
   }

   /// `evaluate` at the session's evaluation depth.
   pub fn evaluate_default(&mut self) -> Result<Evaluation> {
      let depth = self.options.evaluation_depth;
      self.evaluate(depth)
   }

   /// The engine's static evaluation of the position in pawns, from white's
   /// side. `None` when the engine declines to give one.
   pub fn static_evaluation(&mut self) -> Result<Option<N64>> {
      self.run(|s| {
         s.send("eval", Duration::from_millis(0))?;
         let deadline = s.deadline(Duration::from_millis(0));
         s.read_bounded("eval", deadline, |line| {
            if parser::is_static_evaluation_line(line) {
               Some(parser::parse_static_evaluation(line))
            } else {
               None
            }
         })
      })
   }

   pub fn engine_info(&mut self) -> Result<EngineInfo> {
      self.run(|s| {
         s.send("uci", Duration::from_millis(0))?;
         let deadline = s.deadline(Duration::from_millis(0));
         let mut info = EngineInfo::default();
         s.read_bounded("uci", deadline, |line| {
            if parser::is_uci_ok(line) {
               return Some(());
            }
            parser::parse_identification(line, &mut info);
            None
         })?;
         Ok(info)
      })
   }

   /// Stops the engine now instead of at drop.
   pub fn close(mut self) {
      self.shut_down();
   }

   fn shut_down(&mut self) {
      if self.state != SessionState::Closed {
         debug!("closing engine session");
      }
      self.state = SessionState::Closed;
      self.transport.stop();
   }

   fn run<R, F>(&mut self, op: F) -> Result<R>
   where
      F: FnOnce(&mut Session<T>) -> Result<R>,
   {
      if self.state == SessionState::Closed {
         return Err(Error::Poisoned);
      }
      self.state = SessionState::Busy;
      match op(self) {
         Ok(value) => {
            self.state = SessionState::Ready;
            Ok(value)
         }
         Err(e) if e.is_fatal() => Err(self.poison(e)),
         Err(e) => {
            self.state = SessionState::Ready;
            Err(e)
         }
      }
   }

   fn poison(&mut self, e: Error) -> Error {
      warn!("engine session closed after error: {}", e);
      self.shut_down();
      e
   }

   /// `None` when no deadline is configured or it lies beyond what `Instant`
   /// can represent.
   fn deadline(&self, allowance: Duration) -> Option<Instant> {
      let limit = self.options.read_deadline?;
      Instant::now().checked_add(limit)?.checked_add(allowance)
   }

   fn deadline_error(&self, command: &str) -> Error {
      Error::Deadline {
         command: command.to_string(),
         deadline: self.options.read_deadline.unwrap_or_default(),
      }
   }

   fn send(&mut self, command: &str, wait_hint: Duration) -> Result<()> {
      self.transport.write_line(command)?;
      let hint = self.options.command_wait.max(wait_hint);
      match self.transport.wait(hint) {
         Some(status) => {
            debug!("engine exited with {} after `{}`", status, command);
            Err(Error::EngineExited {
               command: command.to_string(),
            })
         }
         None => Ok(()),
      }
   }

   /// Reads until `accept` yields a value, for at most `max_tries` lines.
   fn read_bounded<R, F>(&mut self, command: &str, deadline: Option<Instant>, mut accept: F) -> Result<R>
   where
      F: FnMut(&str) -> Option<R>,
   {
      for _ in 0..self.options.max_tries {
         match self.transport.read_line_until(deadline) {
            LineRead::Line(line) => {
               if let Some(value) = accept(&line) {
                  return Ok(value);
               }
            }
            LineRead::Closed => {
               return Err(Error::EngineExited {
                  command: command.to_string(),
               })
            }
            LineRead::TimedOut => return Err(self.deadline_error(command)),
         }
      }
      Err(Error::ReadTimeout {
         command: command.to_string(),
         tries: self.options.max_tries,
      })
   }

   /// Sends `d` and consumes the whole dump through its closing line.
   fn read_dump(&mut self) -> Result<(BoardDump, Option<String>)> {
      self.send("d", Duration::from_millis(0))?;
      let deadline = self.deadline(Duration::from_millis(0));
      let mut dump = BoardDump::new();
      let mut code = None;
      self.read_bounded("d", deadline, |line| {
         if parser::is_dump_end(line) {
            return Some(());
         }
         if !dump.push(line) && code.is_none() {
            code = parser::parse_position_code(line);
         }
         None
      })?;
      Ok((dump, code))
   }

   fn handshake(&mut self) -> Result<()> {
      self.send("isready", Duration::from_millis(0))?;
      let deadline = self.deadline(Duration::from_millis(0));
      match self.read_bounded("isready", deadline, |line| if parser::is_ready_ok(line) { Some(()) } else { None }) {
         Err(Error::ReadTimeout { tries, .. }) => Err(Error::HandshakeTimeout { tries }),
         other => other,
      }
   }

   fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
      self.send(&format!("setoption name {} value {}", name, value), Duration::from_millis(0))?;
      self.handshake().map_err(|e| Error::OptionRejected {
         name: name.to_string(),
         value: value.to_string(),
         source: Box::new(e),
      })
   }

   fn new_game(&mut self) -> Result<()> {
      self.send("ucinewgame", Duration::from_millis(0))?;
      self.handshake()
   }
}

impl<T: Transport> Drop for Session<T> {
   fn drop(&mut self) {
      self.shut_down();
   }
}
