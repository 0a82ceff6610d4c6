use crate::error::{Error, Result};
use crate::messages::OutputMessage;
use log::{debug, info, trace, warn};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

const LIVENESS_POLL: Duration = Duration::from_millis(5);
const QUIT_GRACE: Duration = Duration::from_millis(250);

/// Result of waiting for a single line of engine output.
#[derive(Debug, PartialEq, Eq)]
pub enum LineRead {
   Line(String),
   Closed,
   TimedOut,
}

/// How a `read_until_sentinel` sequence ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SentinelOutcome {
   Seen,
   Closed,
   TimedOut,
}

/// A line-oriented, bidirectional connection to an engine.
///
/// `EngineProcess` is the real implementation; the session only ever talks
/// through this trait so it can be driven by scripted transports in tests.
pub trait Transport {
   fn write_line(&mut self, command: &str) -> Result<()>;

   /// Blocks until a line arrives, the stream closes or `deadline` passes.
   fn read_line_until(&mut self, deadline: Option<Instant>) -> LineRead;

   /// Best-effort liveness check for up to `hint`. Returns the exit status if
   /// the process exited in that window.
   fn wait(&mut self, hint: Duration) -> Option<ExitStatus>;

   fn stop(&mut self);

   fn read_line(&mut self) -> Option<String> {
      match self.read_line_until(None) {
         LineRead::Line(line) => Some(line),
         LineRead::Closed | LineRead::TimedOut => None,
      }
   }

   fn read_until_sentinel<'a>(&'a mut self, marker: &str, deadline: Option<Instant>) -> UntilSentinel<'a, Self>
   where
      Self: Sized,
   {
      UntilSentinel {
         transport: self,
         marker: marker.to_ascii_lowercase(),
         deadline,
         outcome: None,
      }
   }
}

/// Lazy sequence of lines ending right after the first line containing the
/// marker (ASCII case-insensitive). Once finished it yields nothing more.
pub struct UntilSentinel<'a, T: Transport> {
   transport: &'a mut T,
   marker: String,
   deadline: Option<Instant>,
   outcome: Option<SentinelOutcome>,
}

impl<'a, T: Transport> UntilSentinel<'a, T> {
   /// `None` while the sequence has not ended yet.
   pub fn outcome(&self) -> Option<SentinelOutcome> {
      self.outcome
   }
}

impl<'a, T: Transport> Iterator for UntilSentinel<'a, T> {
   type Item = String;

   fn next(&mut self) -> Option<String> {
      if self.outcome.is_some() {
         return None;
      }
      match self.transport.read_line_until(self.deadline) {
         LineRead::Line(line) => {
            if line.to_ascii_lowercase().contains(&self.marker) {
               self.outcome = Some(SentinelOutcome::Seen);
            }
            Some(line)
         }
         LineRead::Closed => {
            self.outcome = Some(SentinelOutcome::Closed);
            None
         }
         LineRead::TimedOut => {
            self.outcome = Some(SentinelOutcome::TimedOut);
            None
         }
      }
   }
}

/// Owns a running engine executable and its three standard streams.
///
/// Stdout is forwarded line by line from a reader thread so reads can be
/// bounded by a deadline; stderr is forwarded into the log. The process is
/// stopped when this value is dropped.
pub struct EngineProcess {
   path: PathBuf,
   child: Child,
   stdin: Option<ChildStdin>,
   lines: mpsc::Receiver<OutputMessage>,
   stopped: bool,
}

impl EngineProcess {
   pub fn start<P: AsRef<Path>>(path: P) -> Result<EngineProcess> {
      let path = path.as_ref().to_path_buf();
      let launch_err = |source: io::Error| Error::Launch {
         path: path.clone(),
         source,
      };

      let mut child = Command::new(&path)
         .stdin(Stdio::piped())
         .stdout(Stdio::piped())
         .stderr(Stdio::piped())
         .spawn()
         .map_err(launch_err)?;

      let stdin = child.stdin.take();
      let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
         (Some(stdout), Some(stderr)) => (stdout, stderr),
         _ => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(launch_err(io::Error::new(
               io::ErrorKind::Other,
               "engine output streams were not captured",
            )));
         }
      };

      let (sender, lines) = mpsc::channel();
      let spawned = thread::Builder::new()
         .name("engine-stdout".into())
         .spawn(move || forward_stdout(stdout, sender))
         .and_then(|_| {
            thread::Builder::new()
               .name("engine-stderr".into())
               .spawn(move || forward_stderr(stderr))
         });
      if let Err(e) = spawned {
         let _ = child.kill();
         let _ = child.wait();
         return Err(launch_err(e));
      }

      info!("started engine {} (pid {})", path.display(), child.id());
      Ok(EngineProcess {
         path,
         child,
         stdin,
         lines,
         stopped: false,
      })
   }

   pub fn path(&self) -> &Path {
      &self.path
   }

   fn broken_pipe(command: &str, source: io::Error) -> Error {
      Error::BrokenPipe {
         command: command.to_string(),
         source,
      }
   }
}

impl Transport for EngineProcess {
   fn write_line(&mut self, command: &str) -> Result<()> {
      if let Ok(Some(status)) = self.child.try_wait() {
         return Err(EngineProcess::broken_pipe(
            command,
            io::Error::new(io::ErrorKind::BrokenPipe, format!("engine exited with {}", status)),
         ));
      }
      let stdin = match self.stdin.as_mut() {
         Some(stdin) => stdin,
         None => {
            return Err(EngineProcess::broken_pipe(
               command,
               io::Error::new(io::ErrorKind::BrokenPipe, "engine input already closed"),
            ))
         }
      };
      trace!(">> {}", command);
      writeln!(stdin, "{}", command)
         .and_then(|_| stdin.flush())
         .map_err(|e| EngineProcess::broken_pipe(command, e))
   }

   fn read_line_until(&mut self, deadline: Option<Instant>) -> LineRead {
      let message = match deadline {
         None => self.lines.recv().map_err(|_| LineRead::Closed),
         Some(deadline) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            self.lines.recv_timeout(remaining).map_err(|e| match e {
               mpsc::RecvTimeoutError::Timeout => LineRead::TimedOut,
               mpsc::RecvTimeoutError::Disconnected => LineRead::Closed,
            })
         }
      };
      match message {
         Ok(OutputMessage::Line(line)) => {
            trace!("<< {}", line);
            LineRead::Line(line)
         }
         Ok(OutputMessage::Failed(e)) => {
            warn!("reading engine output failed: {}", e);
            LineRead::Closed
         }
         Err(read) => read,
      }
   }

   fn wait(&mut self, hint: Duration) -> Option<ExitStatus> {
      let start = Instant::now();
      loop {
         match self.child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => (),
            Err(e) => {
               warn!("could not poll engine process: {}", e);
               return None;
            }
         }
         let elapsed = start.elapsed();
         if elapsed >= hint {
            return None;
         }
         thread::sleep(LIVENESS_POLL.min(hint - elapsed));
      }
   }

   fn stop(&mut self) {
      if self.stopped {
         return;
      }
      self.stopped = true;

      // ask politely first, then make sure
      if let Some(mut stdin) = self.stdin.take() {
         let _ = writeln!(stdin, "quit").and_then(|_| stdin.flush());
      }
      let status = match self.wait(QUIT_GRACE) {
         Some(status) => Some(status),
         None => {
            if let Err(e) = self.child.kill() {
               warn!("failed to kill engine {}: {}", self.path.display(), e);
            }
            self.child.wait().ok()
         }
      };
      match status {
         Some(status) => info!("engine {} stopped ({})", self.path.display(), status),
         None => warn!("engine {} could not be reaped", self.path.display()),
      }
   }
}

impl Drop for EngineProcess {
   fn drop(&mut self) {
      self.stop();
   }
}

fn forward_stdout<R: Read>(stdout: R, sender: mpsc::Sender<OutputMessage>) {
   let mut reader = BufReader::new(stdout);
   let mut buf = Vec::new();
   loop {
      buf.clear();
      match reader.read_until(b'\n', &mut buf) {
         Ok(0) => break,
         Ok(_) => {
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(&['\r', '\n'][..]).to_string();
            if sender.send(OutputMessage::Line(line)).is_err() {
               break;
            }
         }
         Err(e) => {
            let _ = sender.send(OutputMessage::Failed(e));
            break;
         }
      }
   }
}

fn forward_stderr<R: Read>(stderr: R) {
   let reader = BufReader::new(stderr);
   for line in reader.split(b'\n') {
      match line {
         Ok(bytes) => debug!("engine stderr: {}", String::from_utf8_lossy(&bytes).trim_end()),
         Err(_) => break,
      }
   }
}

#[cfg(all(test, unix))]
mod tests {
   use super::*;

   #[test]
   fn missing_executable_is_a_launch_error() {
      match EngineProcess::start("/definitely/not/an/engine") {
         Err(Error::Launch { path, .. }) => assert_eq!(path, PathBuf::from("/definitely/not/an/engine")),
         Err(e) => panic!("unexpected error {}", e),
         Ok(_) => panic!("launch should have failed"),
      }
   }

   #[test]
   fn lines_round_trip_through_the_process() {
      let mut process = EngineProcess::start("cat").unwrap();
      process.write_line("isready").unwrap();
      process.write_line("uci").unwrap();
      assert_eq!(process.read_line().as_deref(), Some("isready"));
      assert_eq!(process.read_line().as_deref(), Some("uci"));
   }

   #[test]
   fn sentinel_sequence_stops_after_marker() {
      let mut process = EngineProcess::start("cat").unwrap();
      for line in &["info depth 1", "info string noise", "BestMove e2e4", "trailing"] {
         process.write_line(line).unwrap();
      }

      let mut lines = process.read_until_sentinel("bestmove", None);
      let seen: Vec<String> = lines.by_ref().collect();
      assert_eq!(seen, vec!["info depth 1", "info string noise", "BestMove e2e4"]);
      assert_eq!(lines.outcome(), Some(SentinelOutcome::Seen));
      assert_eq!(lines.next(), None);

      assert_eq!(process.read_line().as_deref(), Some("trailing"));
   }

   #[test]
   fn deadline_bounds_a_silent_read() {
      let mut process = EngineProcess::start("cat").unwrap();
      let deadline = Instant::now() + Duration::from_millis(50);
      assert_eq!(process.read_line_until(Some(deadline)), LineRead::TimedOut);

      let mut lines = process.read_until_sentinel("bestmove", Some(Instant::now() + Duration::from_millis(50)));
      assert_eq!(lines.by_ref().count(), 0);
      assert_eq!(lines.outcome(), Some(SentinelOutcome::TimedOut));
   }

   #[test]
   fn exited_process_reports_closed_stream_and_broken_pipe() {
      let mut process = EngineProcess::start("true").unwrap();
      assert!(process.wait(Duration::from_secs(5)).is_some());
      assert_eq!(process.read_line(), None);
      match process.write_line("isready") {
         Err(Error::BrokenPipe { command, .. }) => assert_eq!(command, "isready"),
         other => panic!("expected broken pipe, got {:?}", other),
      }
   }

   #[test]
   fn stop_is_idempotent() {
      let mut process = EngineProcess::start("cat").unwrap();
      assert!(process.wait(Duration::from_millis(10)).is_none());
      process.stop();
      process.stop();
      assert!(process.write_line("isready").is_err());
   }

   #[test]
   fn dropping_the_process_reaps_the_engine() {
      let process = EngineProcess::start("cat").unwrap();
      let pid = process.child.id().to_string();
      drop(process);
      let alive = Command::new("kill")
         .args(&["-0", &pid])
         .stderr(Stdio::null())
         .status()
         .unwrap()
         .success();
      assert!(!alive, "engine {} still running after drop", pid);
   }
}
