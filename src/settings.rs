use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Engine options forwarded as `setoption` commands when a session starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
   pub threads: u32,
   pub ponder: bool,
   pub multi_pv: u32,
   pub skill_level: i32,
   pub move_overhead: u32,
   pub uci_chess960: bool,
}

impl Default for Settings {
   fn default() -> Settings {
      Settings {
         threads: 1,
         ponder: false,
         multi_pv: 3,
         skill_level: 20,
         move_overhead: 30,
         uci_chess960: false,
      }
   }
}

impl Settings {
   /// Option names and values in the order they are sent to the engine.
   pub fn options(&self) -> Vec<(&'static str, String)> {
      vec![
         ("Threads", self.threads.to_string()),
         ("Ponder", self.ponder.to_string()),
         ("MultiPV", self.multi_pv.to_string()),
         ("Skill Level", self.skill_level.to_string()),
         ("Move Overhead", self.move_overhead.to_string()),
         ("UCI_Chess960", self.uci_chess960.to_string()),
      ]
   }

   /// Reads settings from a JSON file. Missing fields keep their defaults.
   pub fn load<P: AsRef<Path>>(path: P) -> Result<Settings> {
      let path = path.as_ref();
      let settings_err = |reason: String| Error::Settings {
         path: path.to_path_buf(),
         reason,
      };
      let contents = std::fs::read_to_string(path).map_err(|e| settings_err(format!("Failed to read: {}", e)))?;
      serde_json::from_str(&contents).map_err(|e| settings_err(format!("Failed to parse: {}", e)))
   }
}

/// Client-side knobs that never reach the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOptions {
   /// Depth used by `get_next_best_move`.
   pub depth: u32,
   /// Depth used by `evaluate_default`.
   pub evaluation_depth: u32,
   /// Lines read before a bounded wait gives up.
   pub max_tries: usize,
   /// Wall-clock limit for a single operation's reads. `None` keeps only the
   /// line cap, which never fires while the engine stays silent.
   pub read_deadline: Option<Duration>,
   /// Liveness wait after each command.
   pub command_wait: Duration,
}

impl Default for SessionOptions {
   fn default() -> SessionOptions {
      SessionOptions {
         depth: 2,
         evaluation_depth: 2,
         max_tries: 200,
         read_deadline: None,
         command_wait: Duration::from_millis(0),
      }
   }
}
