mod command;
mod event;

pub use command::{
    Command, DecodeError, APPLY, CANCEL, CLEAR, CONNECT, INSERT, NEWFILE, REPLACE, SEPARATOR,
};
pub use event::{sanitize_message, Event};
