//! Interactive soft limit confirmation

use avolt_core::domain::Confirm;
use std::io::{self, BufRead, Write};
use tracing::warn;

/// Asks on stderr and reads the answer from stdin
///
/// Blocks until a line arrives; there is no timeout.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, question: &str) -> bool {
        let stdin = io::stdin();
        match ask(question, &mut stdin.lock(), &mut io::stderr()) {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "Could not read confirmation");
                false
            }
        }
    }
}

/// Only an answer starting with `y` proceeds; end of input means no
fn ask(question: &str, input: &mut impl BufRead, output: &mut impl Write) -> io::Result<bool> {
    write!(output, "{question} [y/N] ")?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim_start().starts_with(['y', 'Y']))
}
