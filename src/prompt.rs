//! Interactive prompts for credentials and one-time codes

use std::io::{self, BufRead, Write};

/// Source of answers the login flow cannot compute itself
pub trait Prompter {
    fn username(&self) -> io::Result<String>;

    /// Read a secret without echo
    fn password(&self, prompt: &str) -> io::Result<String>;

    /// Read an SMS or token code
    fn one_time_code(&self, prompt: &str) -> io::Result<String>;
}

/// Prompts on the controlling terminal
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn username(&self) -> io::Result<String> {
        eprint!("Username: ");
        io::stderr().flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "no username entered",
            ));
        }
        Ok(line.trim().to_string())
    }

    fn password(&self, prompt: &str) -> io::Result<String> {
        rpassword::prompt_password(prompt)
    }

    fn one_time_code(&self, prompt: &str) -> io::Result<String> {
        Ok(rpassword::prompt_password(prompt)?.trim().to_string())
    }
}
