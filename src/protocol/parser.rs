// src/protocol/parser.rs
//
// Turns one received line into a state delta. Total and pure: malformed
// lines, unknown keys, and undecodable values all leave the prior snapshot
// as it was.

use super::catalog::{catalog, Effect};
use super::state::DeviceState;
use crate::notice::Notice;

/// What a single line means for the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    /// No `=`, unknown key, action echo, or a value that did not decode.
    Unchanged,
    /// Exactly one field changed relative to the prior snapshot.
    Updated(DeviceState),
    /// A one-shot event; the snapshot is untouched.
    Notice(Notice),
}

/// Split `KEY=VALUE` on the first `=`.
pub fn split_line(line: &str) -> Option<(&str, &str)> {
    line.split_once('=')
}

pub fn interpret(line: &str, prior: &DeviceState) -> Interpretation {
    let Some((key, value)) = split_line(line) else {
        return Interpretation::Unchanged;
    };
    let Some(entry) = catalog().lookup(key) else {
        return Interpretation::Unchanged;
    };

    match entry.effect {
        Effect::Field(update) => {
            let mut next = prior.clone();
            if update(&mut next, value) {
                Interpretation::Updated(next)
            } else {
                Interpretation::Unchanged
            }
        }
        Effect::Notice(make) => Interpretation::Notice(make(value)),
        Effect::Action => Interpretation::Unchanged,
    }
}

/// Apply one line to `prior`, returning the resulting snapshot.
pub fn apply(line: &str, prior: &DeviceState) -> DeviceState {
    match interpret(line, prior) {
        Interpretation::Updated(next) => next,
        Interpretation::Unchanged | Interpretation::Notice(_) => prior.clone(),
    }
}
