//! Line commands accepted by the `dynamo-node` console.
//!
//! Each command maps onto one host-facing operation of [`crate::DynamoNode`].

use crate::types::{GLOBAL_ALL, LOCAL_ALL};
use std::fmt;

#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    Get { key: String },
    Put { key: String, value: String },
    Delete { key: String },
    Help,
    Exit,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseError {}

impl ConsoleCommand {
    /// Case-insensitive, with one-letter aliases:
    /// `GET/g <key>`, `PUT/p <key> <value>`, `DELETE/d <key>`,
    /// `LOCAL/l` (all records on this node), `ALL/a` (all records in the ring),
    /// `HELP/h`, `EXIT/e`.
    ///
    /// The value of `PUT` is everything after the key, kept verbatim apart
    /// from the separating whitespace.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let (first, rest) = next_word(line.trim_start());
        if first.is_empty() {
            return Err(ParseError("empty command".to_string()));
        }

        let cmd = first.to_uppercase();
        let normalized = match cmd.as_str() {
            "G" => "GET",
            "P" => "PUT",
            "D" => "DELETE",
            "L" => "LOCAL",
            "A" => "ALL",
            "H" => "HELP",
            "E" => "EXIT",
            other => other,
        };
        let (arg, tail) = next_word(rest);

        match normalized {
            "HELP" | "EXIT" | "LOCAL" | "ALL" if !arg.is_empty() => Err(ParseError(format!(
                "{normalized} takes no arguments"
            ))),
            "HELP" => Ok(ConsoleCommand::Help),
            "EXIT" => Ok(ConsoleCommand::Exit),
            "LOCAL" => Ok(ConsoleCommand::Get {
                key: LOCAL_ALL.to_string(),
            }),
            "ALL" => Ok(ConsoleCommand::Get {
                key: GLOBAL_ALL.to_string(),
            }),
            "GET" if !arg.is_empty() && tail.trim().is_empty() => Ok(ConsoleCommand::Get {
                key: arg.to_string(),
            }),
            "DELETE" if !arg.is_empty() && tail.trim().is_empty() => Ok(ConsoleCommand::Delete {
                key: arg.to_string(),
            }),
            "PUT" if !arg.is_empty() && !tail.is_empty() => Ok(ConsoleCommand::Put {
                key: arg.to_string(),
                value: tail.to_string(),
            }),
            "GET" => Err(ParseError("usage: GET <key>".to_string())),
            "DELETE" => Err(ParseError("usage: DELETE <key>".to_string())),
            "PUT" => Err(ParseError("usage: PUT <key> <value>".to_string())),
            _ => Err(ParseError(
                "unknown command, try HELP".to_string(),
            )),
        }
    }

    pub fn help() -> &'static str {
        "commands (case-insensitive):\n\
         \x20 GET <key>          (g)  read from the key's replicas\n\
         \x20 PUT <key> <value>  (p)  write to the key's replicas\n\
         \x20 DELETE <key>       (d)  delete from the key's replicas\n\
         \x20 LOCAL              (l)  every record on this node\n\
         \x20 ALL                (a)  every record in the ring\n\
         \x20 HELP               (h)\n\
         \x20 EXIT               (e)"
    }
}

/// Splits off the first whitespace-delimited word. The remainder has its
/// leading whitespace removed and is otherwise untouched.
fn next_word(input: &str) -> (&str, &str) {
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (input, ""),
    }
}
