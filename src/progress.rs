//! Progress rendering (§1 external collaborator).
//!
//! A narrow seam: commands that scan or transfer a lot of files report
//! one line per notable event through a [`ProgressSink`]. The real thing
//! wants a redrawing progress bar; `StdioProgressSink` is a plain stand-in
//! that prints a line per call.

pub trait ProgressSink {
    fn report(&self, message: &str);
}

pub struct StdioProgressSink;

impl ProgressSink for StdioProgressSink {
    fn report(&self, message: &str) {
        println!("{message}");
    }
}

pub struct SilentProgressSink;

impl ProgressSink for SilentProgressSink {
    fn report(&self, _message: &str) {}
}
