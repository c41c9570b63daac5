//! Non-local exits of interpreted code.

use crate::error::RuntimeError;
use crate::interp::frame::PanicLink;
use crate::value::Value;
use std::fmt;

/// Why a frame stopped executing without returning normally.
///
/// Every variant travels up the frame chain as the error half of a
/// `Result`. Panics and goroutine exits run deferred calls on the way;
/// the others do not.
#[derive(Debug)]
pub enum Unwind {
    /// An interpreted panic.
    Panic(PanicUnwind),
    /// `os.Exit` while the main goroutine is still running.
    Exit(i32),
    /// `runtime.Goexit`.
    Goexit,
    /// The run is shutting down; stop silently.
    Halt,
    Fatal(RuntimeError),
}

#[derive(Debug)]
pub struct PanicUnwind {
    pub chain: PanicLink,
}

impl PanicUnwind {
    /// Value of the newest panic.
    pub fn value(&self) -> &Value {
        &self.chain.value
    }

    /// The `panic: ...` lines printed for an unrecovered panic, oldest
    /// panic first.
    pub fn message(&self) -> String {
        let links: Vec<&PanicLink> = self.chain.iter().collect();
        let mut out = String::new();
        for (i, link) in links.iter().rev().enumerate() {
            if i > 0 {
                out.push('\t');
            }
            out.push_str("panic: ");
            out.push_str(&link.value.to_string());
            out.push('\n');
        }
        out
    }
}

impl Unwind {
    pub fn panic(value: Value) -> Self {
        Unwind::Panic(PanicUnwind {
            chain: PanicLink::new(value),
        })
    }

    /// A recoverable runtime error such as an out-of-range index.
    pub fn runtime_error(message: impl fmt::Display) -> Self {
        Unwind::panic(Value::error(format!("runtime error: {}", message)))
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, Unwind::Panic(_))
    }
}

impl From<RuntimeError> for Unwind {
    fn from(err: RuntimeError) -> Self {
        Unwind::Fatal(err)
    }
}

impl fmt::Display for Unwind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unwind::Panic(p) => write!(f, "panic: {}", p.value()),
            Unwind::Exit(code) => write!(f, "exit {}", code),
            Unwind::Goexit => write!(f, "goexit"),
            Unwind::Halt => write!(f, "halt"),
            Unwind::Fatal(err) => write!(f, "{}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_message_lists_oldest_first() {
        let mut chain = PanicLink::new(Value::string("second"));
        chain.supersede(PanicLink::new(Value::string("first")));
        let unwind = PanicUnwind { chain };
        assert_eq!(unwind.message(), "panic: first\n\tpanic: second\n");
    }

    #[test]
    fn test_runtime_error_value() {
        match Unwind::runtime_error("integer divide by zero") {
            Unwind::Panic(p) => {
                assert_eq!(p.value().to_string(), "runtime error: integer divide by zero")
            }
            other => panic!("unexpected {}", other),
        }
    }
}
