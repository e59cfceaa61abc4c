//! Passphrase acquisition (§1 external collaborator: interactive
//! passphrase input).
//!
//! The real thing wants a TTY-echo-suppressing prompt; that's explicitly
//! out of scope here, so [`StdioPassphraseSource`] is a faithful but
//! minimal stand-in: it reads one line from stdin either way, prompting
//! to stderr first unless `--passphrase-from-stdin` was given.

use std::io::{self, BufRead, Write};

pub trait PassphraseSource {
    /// # Errors
    /// Propagates I/O failures reading the passphrase.
    fn read(&self, from_stdin: bool) -> io::Result<Vec<u8>>;
}

pub struct StdioPassphraseSource;

impl PassphraseSource for StdioPassphraseSource {
    fn read(&self, from_stdin: bool) -> io::Result<Vec<u8>> {
        if !from_stdin {
            eprint!("Passphrase: ");
            io::stderr().flush()?;
        }
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line.into_bytes())
    }
}
