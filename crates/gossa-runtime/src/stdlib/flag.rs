//! `flag` shims over a process-wide command-line flag set.
//!
//! The set lives in the bridged variable `flag.CommandLine` and is replaced
//! before every run, so flags registered by one program never collide with
//! the next one's.

use crate::bridge::{Registry, RegistryBuilder};
use crate::interp::{output, Frame, Unwind};
use crate::marshal::{Kind, NativeSignature};
use crate::stdlib::os;
use crate::value::{new_cell, Cell, NativeObject, SliceRef, Value};
use parking_lot::Mutex;
use std::collections::BTreeMap;

pub const COMMAND_LINE: &str = "flag.CommandLine";
const FLAG_SET_TYPE: &str = "*flag.FlagSet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagKind {
    String,
    Int,
    Bool,
}

#[derive(Debug)]
struct Flag {
    kind: FlagKind,
    usage: String,
    default: Value,
    cell: Cell,
}

#[derive(Debug, Default)]
struct FlagState {
    flags: BTreeMap<String, Flag>,
    parsed: bool,
    args: Vec<String>,
}

/// A named set of flags.
#[derive(Debug)]
pub struct FlagSet {
    name: String,
    state: Mutex<FlagState>,
}

/// How parsing ended when it did not succeed.
#[derive(Debug, PartialEq, Eq)]
enum ParseError {
    Help,
    Invalid(String),
}

impl FlagSet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(FlagState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn define(&self, kind: FlagKind, name: &str, default: Value, usage: &str) -> Result<Cell, String> {
        let mut state = self.state.lock();
        if state.flags.contains_key(name) {
            return Err(format!("{} flag redefined: {}", self.name, name));
        }
        let cell = new_cell(default.clone());
        state.flags.insert(
            name.to_string(),
            Flag {
                kind,
                usage: usage.to_string(),
                default,
                cell: cell.clone(),
            },
        );
        Ok(cell)
    }

    fn set(&self, state: &FlagState, name: &str, value: &str) -> Result<(), ParseError> {
        let flag = state
            .flags
            .get(name)
            .ok_or_else(|| ParseError::Invalid(format!("flag provided but not defined: -{}", name)))?;
        let parsed = match flag.kind {
            FlagKind::String => Value::string(value),
            FlagKind::Int => value.parse::<i64>().map(Value::Int).map_err(|_| {
                ParseError::Invalid(format!(
                    "invalid value \"{}\" for flag -{}: parse error",
                    value, name
                ))
            })?,
            FlagKind::Bool => match value {
                "1" | "t" | "T" | "true" | "TRUE" | "True" => Value::Bool(true),
                "0" | "f" | "F" | "false" | "FALSE" | "False" => Value::Bool(false),
                _ => {
                    return Err(ParseError::Invalid(format!(
                        "invalid boolean value \"{}\" for -{}: parse error",
                        value, name
                    )))
                }
            },
        };
        *flag.cell.write() = parsed;
        Ok(())
    }

    /// Parses `args` (without the program name).
    fn parse(&self, args: &[String]) -> Result<(), ParseError> {
        let mut state = self.state.lock();
        state.parsed = true;
        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            if arg == "--" {
                i += 1;
                break;
            }
            let Some(body) = arg.strip_prefix('-').filter(|b| !b.is_empty()) else {
                break;
            };
            let body = body.strip_prefix('-').unwrap_or(body);
            i += 1;
            let (name, inline) = match body.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (body, None),
            };
            if (name == "h" || name == "help") && !state.flags.contains_key(name) {
                return Err(ParseError::Help);
            }
            let kind = match state.flags.get(name) {
                Some(flag) => flag.kind,
                None => {
                    return Err(ParseError::Invalid(format!(
                        "flag provided but not defined: -{}",
                        name
                    )))
                }
            };
            let value = match (inline, kind) {
                (Some(value), _) => value.to_string(),
                (None, FlagKind::Bool) => "true".to_string(),
                (None, _) => match args.get(i) {
                    Some(value) => {
                        i += 1;
                        value.clone()
                    }
                    None => {
                        return Err(ParseError::Invalid(format!(
                            "flag needs an argument: -{}",
                            name
                        )))
                    }
                },
            };
            self.set(&state, name, &value)?;
        }
        state.args = args[i.min(args.len())..].to_vec();
        Ok(())
    }

    /// `PrintDefaults` text preceded by the usage header.
    fn usage(&self) -> String {
        let state = self.state.lock();
        let mut out = format!("Usage of {}:\n", self.name);
        for (name, flag) in &state.flags {
            let type_name = match flag.kind {
                FlagKind::String => " string",
                FlagKind::Int => " int",
                FlagKind::Bool => "",
            };
            out.push_str(&format!("  -{}{}", name, type_name));
            if name.len() == 1 && flag.kind == FlagKind::Bool {
                out.push('\t');
            } else {
                out.push_str("\n    \t");
            }
            out.push_str(&flag.usage);
            let default = match (&flag.default, flag.kind) {
                (Value::String(s), FlagKind::String) if !s.is_empty() => {
                    Some(format!("{:?}", s.as_ref()))
                }
                (Value::Int(n), FlagKind::Int) if *n != 0 => Some(n.to_string()),
                (Value::Bool(true), FlagKind::Bool) => Some("true".to_string()),
                _ => None,
            };
            if let Some(default) = default {
                out.push_str(&format!(" (default {})", default));
            }
            out.push('\n');
        }
        out
    }
}

/// Installs a fresh `flag.CommandLine` named after the program.
pub fn reset_command_line(registry: &Registry, program: &str) {
    if let Some(cell) = registry.variable(COMMAND_LINE) {
        *cell.write() = Value::Native(NativeObject::new(FLAG_SET_TYPE, FlagSet::new(program)));
    }
}

fn command_line(fr: &Frame<'_>) -> Result<NativeObject, Unwind> {
    let cell = fr
        .interp()
        .registry()
        .variable(COMMAND_LINE)
        .cloned()
        .ok_or_else(|| Unwind::runtime_error("flag.CommandLine is not initialized"))?;
    let value = cell.read().clone();
    match value {
        Value::Native(obj) if obj.downcast::<FlagSet>().is_some() => Ok(obj),
        _ => Err(Unwind::runtime_error("flag.CommandLine is not initialized")),
    }
}

fn with_set<T>(fr: &Frame<'_>, f: impl FnOnce(&FlagSet) -> T) -> Result<T, Unwind> {
    let obj = command_line(fr)?;
    match obj.downcast::<FlagSet>() {
        Some(set) => Ok(f(set)),
        None => Err(Unwind::runtime_error("flag.CommandLine is not initialized")),
    }
}

fn define(fr: &Frame<'_>, kind: FlagKind, args: Vec<Value>) -> Result<Vec<Value>, Unwind> {
    let name = args.first().and_then(Value::as_str).unwrap_or_default().to_string();
    let default = args.get(1).cloned().unwrap_or_default();
    let usage = args.get(2).and_then(Value::as_str).unwrap_or_default().to_string();
    let cell = with_set(fr, |set| set.define(kind, &name, default, &usage))?
        .map_err(|msg| Unwind::panic(Value::string(msg)))?;
    Ok(vec![Value::Pointer(cell)])
}

pub fn register(b: &mut RegistryBuilder) {
    b.variable(
        COMMAND_LINE,
        Value::Native(NativeObject::new(FLAG_SET_TYPE, FlagSet::new("gossa"))),
    )
    .native(
        "flag.String",
        NativeSignature::new(vec![Kind::String, Kind::String, Kind::String], vec![Kind::Any]),
        |fr, args| define(fr, FlagKind::String, args),
    )
    .native(
        "flag.Int",
        NativeSignature::new(vec![Kind::String, Kind::Int, Kind::String], vec![Kind::Any]),
        |fr, args| define(fr, FlagKind::Int, args),
    )
    .native(
        "flag.Bool",
        NativeSignature::new(vec![Kind::String, Kind::Bool, Kind::String], vec![Kind::Any]),
        |fr, args| define(fr, FlagKind::Bool, args),
    )
    .native("flag.Parse", NativeSignature::new(vec![], vec![]), |fr, _| {
        let interp = fr.interp();
        let argv = os::args(interp.registry());
        let rest = argv.get(1..).unwrap_or_default();
        let outcome = with_set(fr, |set| set.parse(rest).map_err(|err| (err, set.usage())))?;
        match outcome {
            Ok(()) => Ok(Vec::new()),
            Err((ParseError::Help, usage)) => {
                output::emit(interp.stderr(), &usage);
                Err(interp.terminate(0))
            }
            Err((ParseError::Invalid(message), usage)) => {
                output::emit(interp.stderr(), &format!("{}\n{}", message, usage));
                Err(interp.terminate(2))
            }
        }
    })
    .native(
        "flag.Args",
        NativeSignature::new(vec![], vec![Kind::Slice]),
        |fr, _| {
            let rest = with_set(fr, |set| set.state.lock().args.clone())?;
            let values = rest.iter().map(Value::string).collect();
            Ok(vec![Value::Slice(SliceRef::new(values))])
        },
    )
    .native("flag.NArg", NativeSignature::new(vec![], vec![Kind::Int]), |fr, _| {
        let n = with_set(fr, |set| set.state.lock().args.len())?;
        Ok(vec![Value::Int(n as i64)])
    })
    .native(
        "flag.Arg",
        NativeSignature::new(vec![Kind::Int], vec![Kind::String]),
        |fr, args| {
            let i = args.first().and_then(Value::as_int).unwrap_or(-1);
            let arg = with_set(fr, |set| {
                usize::try_from(i)
                    .ok()
                    .and_then(|i| set.state.lock().args.get(i).cloned())
                    .unwrap_or_default()
            })?;
            Ok(vec![Value::string(arg)])
        },
    )
    .native("flag.Parsed", NativeSignature::new(vec![], vec![Kind::Bool]), |fr, _| {
        let parsed = with_set(fr, |set| set.state.lock().parsed)?;
        Ok(vec![Value::Bool(parsed)])
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_forms() {
        let set = FlagSet::new("prog");
        let name = set.define(FlagKind::String, "name", Value::string(""), "who").unwrap();
        let n = set.define(FlagKind::Int, "n", Value::Int(1), "count").unwrap();
        let v = set.define(FlagKind::Bool, "v", Value::Bool(false), "verbose").unwrap();

        set.parse(&args(&["-name=gopher", "--n", "3", "-v", "rest", "-x"]))
            .unwrap();
        assert_eq!(name.read().as_str(), Some("gopher"));
        assert_eq!(n.read().as_int(), Some(3));
        assert_eq!(v.read().as_bool(), Some(true));
        assert_eq!(set.state.lock().args, args(&["rest", "-x"]));
    }

    #[test]
    fn test_double_dash_ends_flags() {
        let set = FlagSet::new("prog");
        set.define(FlagKind::Bool, "v", Value::Bool(false), "").unwrap();
        set.parse(&args(&["--", "-v"])).unwrap();
        assert_eq!(set.state.lock().args, args(&["-v"]));
    }

    #[test]
    fn test_redefinition_is_reported() {
        let set = FlagSet::new("prog");
        set.define(FlagKind::Int, "n", Value::Int(0), "").unwrap();
        let err = set.define(FlagKind::Int, "n", Value::Int(0), "").unwrap_err();
        assert_eq!(err, "prog flag redefined: n");
    }

    #[test]
    fn test_unknown_and_malformed_flags() {
        let set = FlagSet::new("prog");
        set.define(FlagKind::Int, "n", Value::Int(0), "").unwrap();
        assert_eq!(
            set.parse(&args(&["-x"])),
            Err(ParseError::Invalid("flag provided but not defined: -x".to_string()))
        );
        assert_eq!(
            set.parse(&args(&["-n=abc"])),
            Err(ParseError::Invalid(
                "invalid value \"abc\" for flag -n: parse error".to_string()
            ))
        );
        assert_eq!(set.parse(&args(&["-h"])), Err(ParseError::Help));
    }

    #[test]
    fn test_usage_lists_defaults() {
        let set = FlagSet::new("prog");
        set.define(FlagKind::String, "name", Value::string("x"), "who to greet").unwrap();
        set.define(FlagKind::Bool, "v", Value::Bool(false), "verbose").unwrap();
        assert_eq!(
            set.usage(),
            "Usage of prog:\n  -name string\n    \twho to greet (default \"x\")\n  -v\tverbose\n"
        );
    }
}
