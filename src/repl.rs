//! The interactive session: prompt, read a line, tokenize, dispatch, repeat.
//!
//! The loop runs against a store that was already unlocked by the password
//! prompt. Persistence happens exactly once, after the loop ends; per-command
//! failures are reported and the loop continues.

use crate::cli::Cli;
use crate::command::Command;
use crate::error::Error;
use crate::store::{SecretStore, SetOutcome};
use crate::token::tokenize;
use std::io::{self, BufRead, IsTerminal};
use std::path::Path;
use zeroize::Zeroizing;

pub fn run(cli: Cli) -> Result<(), Error> {
    eprintln!("Operating on file: {}", cli.archive.display());
    let store = open_store(&cli.archive)?;
    let stdin = io::stdin();
    let mut input = stdin.lock();
    Session::new(store).run(&mut input)
}

/// Read the master password without echo on a terminal; when input is piped,
/// take it as the next line so sessions are scriptable.
fn read_password(prompt: &str) -> Result<Zeroizing<Vec<u8>>, Error> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        let password = rpassword::prompt_password(prompt)?;
        return Ok(Zeroizing::new(password.into_bytes()));
    }
    eprint!("{prompt}");
    let mut line = Zeroizing::new(String::new());
    if stdin.lock().read_line(&mut line)? == 0 {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "end of input while reading the password",
        )));
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Zeroizing::new(line.as_bytes().to_vec()))
}

/// Prompt until a usable password opens (or creates) the archive. A wrong
/// password re-prompts; anything else is fatal to the process.
fn open_store(path: &Path) -> Result<SecretStore, Error> {
    let creating = !path.exists();
    if creating {
        eprintln!("No archive at this path yet; a new one is written on exit.");
    }
    loop {
        let password = read_password("Please enter your password: ")?;
        if password.is_empty() {
            eprintln!("The password must not be empty.");
            continue;
        }
        if creating {
            let confirm = read_password("Confirm password: ")?;
            if password.as_slice() != confirm.as_slice() {
                eprintln!("Passwords did not match.");
                continue;
            }
        }
        match SecretStore::open(path, password) {
            Ok(store) => return Ok(store),
            Err(Error::BadPassword) => eprintln!("Wrong password!"),
            Err(err) => return Err(err),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum State {
    Running,
    Terminated,
}

struct Session {
    store: SecretStore,
    state: State,
    fatal: Option<Error>,
}

impl Session {
    fn new(store: SecretStore) -> Self {
        Self {
            store,
            state: State::Running,
            fatal: None,
        }
    }

    fn run(mut self, input: &mut impl BufRead) -> Result<(), Error> {
        let mut line = Zeroizing::new(String::new());
        while self.state == State::Running {
            eprint!("> ");
            line.clear();
            match input.read_line(&mut line) {
                Ok(0) => {
                    // end of input is an implicit exit
                    eprintln!();
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    eprintln!("Could not read input: {err}");
                    break;
                }
            }
            self.dispatch(&tokenize(&line));
        }

        if let Some(err) = self.fatal {
            // No commit on an unusable archive; the password is still
            // zeroized when the store drops.
            return Err(err);
        }
        if let Err(err) = self.store.commit_and_close() {
            eprintln!("Could not save the archive: {err}");
        }
        Ok(())
    }

    fn dispatch(&mut self, tokens: &[String]) {
        let command = match Command::parse(tokens) {
            Ok(command) => command,
            Err(err) => {
                eprintln!("{err}");
                return;
            }
        };
        match command {
            Command::Help => print_help(),
            Command::Get { section } => self.get(&section),
            Command::Set { section, payload } => self.set(&section, payload),
            Command::List => {
                for name in self.store.names() {
                    eprintln!("{name}");
                }
            }
            Command::Discard => {
                self.store.discard();
                eprintln!("Discarded pending changes.");
            }
            Command::Exit => {
                eprintln!("Bye!");
                self.state = State::Terminated;
            }
        }
    }

    fn get(&mut self, section: &str) {
        match self.store.get(section) {
            Ok(payload) => {
                let text = String::from_utf8_lossy(&payload);
                eprintln!("Section {section}:\t{text}");
            }
            Err(Error::BadPassword) => eprintln!("Wrong password!"),
            Err(_) => eprintln!("Could not open section!"),
        }
    }

    fn set(&mut self, section: &str, payload: String) {
        let payload = Zeroizing::new(payload);
        match self.store.set(section, payload.as_bytes()) {
            Ok(SetOutcome::Sealed) => eprintln!("Stored section {section}."),
            Ok(SetOutcome::DefaultKey) => eprintln!(
                "Warning: could not key section {section} with the session password; kept the archive default."
            ),
            Err(Error::Unusable(reason)) => {
                eprintln!("The archive is no longer usable: {reason}");
                self.state = State::Terminated;
                self.fatal = Some(Error::Unusable(reason));
            }
            Err(err) => eprintln!("Could not store section {section}: {err}"),
        }
    }
}

fn print_help() {
    eprintln!("Available commands:");
    eprintln!("\t- help");
    eprintln!("\t- get name");
    eprintln!("\t- set service entry1 entry2 entry3");
    eprintln!("\t- list");
    eprintln!("\t- discard");
    eprintln!("\t- exit (or quit)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn session_over(dir: &TempDir) -> Session {
        let path = dir.path().join("store.pwk");
        let store = SecretStore::open(&path, Zeroizing::new(b"pw".to_vec())).unwrap();
        Session::new(store)
    }

    #[test]
    fn exit_terminates_without_reading_further_input() {
        let dir = TempDir::new().unwrap();
        let mut input = Cursor::new(b"exit\nset alpha never\n".to_vec());
        session_over(&dir).run(&mut input).unwrap();

        // the second line was never consumed
        let mut rest = String::new();
        input.read_line(&mut rest).unwrap();
        assert_eq!(rest, "set alpha never\n");
    }

    #[test]
    fn end_of_input_is_an_implicit_exit() {
        let dir = TempDir::new().unwrap();
        let mut input = Cursor::new(Vec::new());
        session_over(&dir).run(&mut input).unwrap();
    }

    #[test]
    fn failed_commands_keep_the_session_running() {
        let dir = TempDir::new().unwrap();
        let mut session = session_over(&dir);
        session.dispatch(&tokenize("get ghost"));
        session.dispatch(&tokenize("get"));
        session.dispatch(&tokenize("Get github"));
        session.dispatch(&tokenize("set lonely"));
        session.dispatch(&tokenize(""));
        assert_eq!(session.state, State::Running);
    }

    #[test]
    fn session_writes_survive_to_a_new_session() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.pwk");
        {
            let store = SecretStore::open(&path, Zeroizing::new(b"pw".to_vec())).unwrap();
            let mut input = Cursor::new(b"set alpha one two\nexit\n".to_vec());
            Session::new(store).run(&mut input).unwrap();
        }
        let store = SecretStore::open(&path, Zeroizing::new(b"pw".to_vec())).unwrap();
        assert_eq!(store.get("alpha").unwrap().as_slice(), b"one two");
    }
}
