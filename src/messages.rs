use std::io;

// Reader thread to Supervisor

pub enum OutputMessage {
   Line(String),    // One line of engine stdout, terminator stripped
   Failed(io::Error), // Reading stdout failed; the reader stops afterwards
}
