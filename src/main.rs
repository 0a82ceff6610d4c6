use log::error;
use serde_json::json;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use stockpipe::{Evaluation, SearchMode, Session, SessionOptions, Settings};
use structopt::StructOpt;

/// Ask a UCI chess engine about a position
#[derive(StructOpt, Debug)]
#[structopt(name = "stockpipe")]
struct Opt {
   /// Path to the engine executable
   #[structopt(short = "e", long = "engine", parse(from_os_str), default_value = "/usr/games/stockfish")]
   engine: PathBuf,
   /// JSON file with engine settings
   #[structopt(short = "s", long = "settings", parse(from_os_str))]
   settings: Option<PathBuf>,
   /// Search depth
   #[structopt(short = "d", long = "depth", default_value = "2")]
   depth: u32,
   /// Give up on any single response after this many milliseconds
   #[structopt(long = "deadline")]
   deadline: Option<u64>,
   /// Start from this position instead of the initial one
   #[structopt(long = "fen")]
   fen: Option<String>,
   /// Moves to play from the initial position, in coordinate notation
   #[structopt(short = "m", long = "moves")]
   moves: Vec<String>,
   #[structopt(subcommand)]
   query: Query,
}

#[derive(StructOpt, Debug)]
enum Query {
   /// Best move at the configured depth, or within a time budget
   Bestmove {
      #[structopt(long = "movetime")]
      movetime: Option<u64>,
   },
   /// Multi-variation evaluation at the configured depth
   Eval,
   /// The engine's static evaluation
   StaticEval,
   /// ASCII board
   Board,
   /// Position code of the current position
   Fen,
   /// Whether a move is legal in the current position
   Legal { candidate: String },
   /// Engine name, author and options
   Info,
}

fn run(opt: Opt) -> stockpipe::Result<serde_json::Value> {
   let settings = match &opt.settings {
      Some(path) => Settings::load(path)?,
      None => Settings::default(),
   };
   let options = SessionOptions {
      depth: opt.depth,
      evaluation_depth: opt.depth,
      read_deadline: opt.deadline.map(Duration::from_millis),
      ..SessionOptions::default()
   };
   let mut session = Session::start(&opt.engine, settings, options)?;

   match &opt.fen {
      Some(code) => session.set_position_by_board_code(code)?,
      None => session.set_position_by_moves(opt.moves.as_slice())?,
   }

   let value = match opt.query {
      Query::Bestmove { movetime } => {
         let mode = match movetime {
            Some(ms) => SearchMode::MoveTime(Duration::from_millis(ms)),
            None => SearchMode::Depth(opt.depth),
         };
         json!(session.get_best_move(mode)?)
      }
      Query::Eval => {
         let evaluation: Evaluation = session.evaluate_default()?;
         json!(evaluation)
      }
      Query::StaticEval => json!(session.static_evaluation()?.map(|v| v.raw())),
      Query::Board => json!(session.get_board_visual()?),
      Query::Fen => json!(session.get_position_code()?),
      Query::Legal { candidate } => json!(session.is_move_legal(&candidate)?),
      Query::Info => json!(session.engine_info()?),
   };
   session.close();
   Ok(value)
}

fn main() {
   pretty_env_logger::init();
   let opt = Opt::from_args();

   match run(opt) {
      Ok(serde_json::Value::String(text)) => println!("{}", text.trim_end()),
      Ok(value) => println!("{}", value),
      Err(e) => {
         error!("{}", e);
         process::exit(1);
      }
   }
}
