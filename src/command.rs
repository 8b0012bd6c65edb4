//! Maps a tokenized line onto the closed verb set and validates argument
//! counts before anything touches the store.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Get { section: String },
    Set { section: String, payload: String },
    Exit,
    Discard,
    List,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command. Try \"help\".")]
    Unknown,

    #[error("Please provide a section. Example: get github")]
    MissingSection,

    #[error("Please provide a section and at least one entry. Example: set github user hunter2")]
    MissingEntry,
}

impl Command {
    /// The first token is the verb; matching is exact and case-sensitive.
    /// Verbs that take no arguments ignore any extras. `set` joins all entry
    /// tokens with single spaces, in argument order, into one payload.
    pub fn parse(tokens: &[String]) -> Result<Self, ParseError> {
        let Some(verb) = tokens.first() else {
            return Err(ParseError::Unknown);
        };
        match verb.as_str() {
            "help" => Ok(Command::Help),
            "get" => match tokens.get(1) {
                Some(section) => Ok(Command::Get {
                    section: section.clone(),
                }),
                None => Err(ParseError::MissingSection),
            },
            "set" => {
                if tokens.len() < 3 {
                    Err(ParseError::MissingEntry)
                } else {
                    Ok(Command::Set {
                        section: tokens[1].clone(),
                        payload: tokens[2..].join(" "),
                    })
                }
            }
            "exit" | "quit" => Ok(Command::Exit),
            "discard" => Ok(Command::Discard),
            "list" => Ok(Command::List),
            _ => Err(ParseError::Unknown),
        }
    }
}
