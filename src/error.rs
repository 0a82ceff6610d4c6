use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while talking to an engine.
///
/// Apart from `Launch`, `Protocol` and `Settings`, every variant leaves the
/// session poisoned: the engine's internal state is unknown afterwards, so the
/// only way forward is to drop the session and start a new one.
#[derive(Error, Debug)]
pub enum Error {
   #[error("failed to launch engine at {}: {source}", .path.display())]
   Launch {
      path: PathBuf,
      #[source]
      source: io::Error,
   },
   #[error("engine input closed while writing `{command}`: {source}")]
   BrokenPipe {
      command: String,
      #[source]
      source: io::Error,
   },
   #[error("engine did not acknowledge readiness within {tries} lines")]
   HandshakeTimeout { tries: usize },
   #[error("no complete response to `{command}` within {tries} lines")]
   ReadTimeout { command: String, tries: usize },
   #[error("no complete response to `{command}` within {deadline:?}")]
   Deadline { command: String, deadline: Duration },
   #[error("engine output closed while waiting for a response to `{command}`")]
   EngineExited { command: String },
   #[error("engine rejected option {name} = {value}")]
   OptionRejected {
      name: String,
      value: String,
      #[source]
      source: Box<Error>,
   },
   #[error("unexpected engine response: {0}")]
   Protocol(String),
   #[error("session is no longer usable after a previous failure or close")]
   Poisoned,
   #[error("failed to load settings from {}: {reason}", .path.display())]
   Settings { path: PathBuf, reason: String },
}

impl Error {
   /// Whether this error leaves the session in an unknown state.
   pub fn is_fatal(&self) -> bool {
      !matches!(self, Error::Launch { .. } | Error::Protocol(_) | Error::Settings { .. })
   }
}
