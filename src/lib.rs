//! Drive a UCI chess engine running as a child process.
//!
//! A [`Session`] launches the engine, forwards [`Settings`], and turns the
//! engine's free-text replies into [`BestMove`] and [`Evaluation`] values.
//!
//! ```no_run
//! use stockpipe::{SearchMode, Session};
//!
//! let mut session = Session::with_defaults("/usr/games/stockfish")?;
//! session.set_position_by_moves(&["e2e4", "e7e5"])?;
//! let best = session.get_best_move(SearchMode::Depth(8))?;
//! let evaluation = session.evaluate(8)?;
//! println!("{:?} {}", best, evaluation.score());
//! # Ok::<(), stockpipe::Error>(())
//! ```

pub mod error;
mod messages;
pub mod model;
pub mod parser;
pub mod process;
pub mod session;
pub mod settings;

pub use error::{Error, Result};
pub use model::{BestMove, CoordinateMove, DrawKind, EngineInfo, Evaluation, Move, MATE_RANK_VALUE};
pub use process::{EngineProcess, Transport};
pub use session::{SearchMode, Session, SessionState, DEFAULT_MOVE_TIME};
pub use settings::{SessionOptions, Settings};
