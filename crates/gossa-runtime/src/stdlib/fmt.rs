//! `fmt` shims and the verb formatter they share with `testing`.

use crate::bridge::RegistryBuilder;
use crate::interp::output;
use crate::marshal::{Kind, NativeSignature};
use crate::value::Value;
use std::fmt::Write;

pub fn register(b: &mut RegistryBuilder) {
    let print_sig = || NativeSignature::variadic(vec![Kind::Any], vec![Kind::Int, Kind::Any]);
    let printf_sig = || {
        NativeSignature::variadic(vec![Kind::String, Kind::Any], vec![Kind::Int, Kind::Any])
    };

    b.native("fmt.Println", print_sig(), |fr, args| {
        Ok(write_out(fr.interp().stdout(), sprintln(&args)))
    })
    .native("fmt.Print", print_sig(), |fr, args| {
        Ok(write_out(fr.interp().stdout(), sprint(&args)))
    })
    .native("fmt.Printf", printf_sig(), |fr, args| {
        let (format, rest) = split_format(&args);
        Ok(write_out(fr.interp().stdout(), sprintf(&format, rest)))
    })
    .native(
        "fmt.Sprintf",
        NativeSignature::variadic(vec![Kind::String, Kind::Any], vec![Kind::String]),
        |_, args| {
            let (format, rest) = split_format(&args);
            Ok(vec![Value::string(sprintf(&format, rest))])
        },
    )
    .native(
        "fmt.Sprint",
        NativeSignature::variadic(vec![Kind::Any], vec![Kind::String]),
        |_, args| Ok(vec![Value::string(sprint(&args))]),
    )
    .native(
        "fmt.Sprintln",
        NativeSignature::variadic(vec![Kind::Any], vec![Kind::String]),
        |_, args| Ok(vec![Value::string(sprintln(&args))]),
    )
    .native(
        "fmt.Errorf",
        NativeSignature::variadic(vec![Kind::String, Kind::Any], vec![Kind::Any]),
        |_, args| {
            let (format, rest) = split_format(&args);
            Ok(vec![Value::error(sprintf(&format, rest))])
        },
    );
}

fn split_format(args: &[Value]) -> (String, &[Value]) {
    match args.split_first() {
        Some((format, rest)) => (format.as_str().unwrap_or_default().to_string(), rest),
        None => (String::new(), &[]),
    }
}

fn write_out(out: &output::OutputWriter, text: String) -> Vec<Value> {
    output::emit(out, &text);
    vec![Value::Int(text.len() as i64), Value::Nil]
}

/// `Sprint`: operands separated by a space when neither side is a string.
pub fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        let is_string = matches!(arg, Value::String(_));
        if i > 0 && !is_string && !matches!(args[i - 1], Value::String(_)) {
            out.push(' ');
        }
        let _ = write!(out, "{}", arg);
    }
    out
}

/// `Sprintln`: operands separated by spaces, newline appended.
pub fn sprintln(args: &[Value]) -> String {
    let mut out = args
        .iter()
        .map(|arg| arg.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    out.push('\n');
    out
}

#[derive(Default)]
struct Spec {
    minus: bool,
    plus: bool,
    zero: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

impl Spec {
    fn pad(&self, body: String, numeric: bool) -> String {
        let width = match self.width {
            Some(width) if width > body.chars().count() => width,
            _ => return body,
        };
        let fill = width - body.chars().count();
        if self.minus {
            format!("{}{}", body, " ".repeat(fill))
        } else if self.zero && numeric {
            match body.strip_prefix('-') {
                Some(digits) => format!("-{}{}", "0".repeat(fill), digits),
                None => format!("{}{}", "0".repeat(fill), body),
            }
        } else {
            format!("{}{}", " ".repeat(fill), body)
        }
    }
}

fn bad_verb(verb: char, arg: &Value) -> String {
    match arg {
        Value::Nil => format!("%!{}(<nil>)", verb),
        other => format!("%!{}({}={})", verb, other.type_name(), other),
    }
}

fn format_one(verb: char, spec: &Spec, arg: &Value) -> String {
    match (verb, arg) {
        ('v', _) => spec.pad(arg.to_string(), false),
        ('T', _) => spec.pad(arg.type_name().to_string(), false),
        ('d', Value::Int(i)) => {
            let body = if spec.plus && *i >= 0 {
                format!("+{}", i)
            } else {
                i.to_string()
            };
            spec.pad(body, true)
        }
        ('d', Value::Uintptr(u)) => spec.pad(u.to_string(), true),
        ('s', Value::String(s)) | ('s', Value::Error(s)) => {
            let body = match spec.precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.to_string(),
            };
            spec.pad(body, false)
        }
        ('q', Value::String(s)) => spec.pad(format!("{:?}", s.as_ref()), false),
        ('x', Value::Int(i)) => spec.pad(format!("{:x}", i), true),
        ('X', Value::Int(i)) => spec.pad(format!("{:X}", i), true),
        ('x', Value::Uintptr(u)) => spec.pad(format!("{:x}", u), true),
        ('X', Value::Uintptr(u)) => spec.pad(format!("{:X}", u), true),
        ('x', Value::String(s)) => spec.pad(
            s.bytes().map(|b| format!("{:02x}", b)).collect(),
            false,
        ),
        ('c', Value::Int(i)) => spec.pad(
            u32::try_from(*i)
                .ok()
                .and_then(char::from_u32)
                .unwrap_or(char::REPLACEMENT_CHARACTER)
                .to_string(),
            false,
        ),
        ('t', Value::Bool(b)) => spec.pad(b.to_string(), false),
        ('f', Value::Float(x)) | ('F', Value::Float(x)) => {
            let precision = spec.precision.unwrap_or(6);
            let body = if spec.plus && *x >= 0.0 {
                format!("+{:.*}", precision, x)
            } else {
                format!("{:.*}", precision, x)
            };
            spec.pad(body, true)
        }
        ('g', Value::Float(_)) => spec.pad(arg.to_string(), true),
        ('e', Value::Float(x)) => {
            let precision = spec.precision.unwrap_or(6);
            let s = format!("{:.*e}", precision, x);
            let body = match s.split_once('e') {
                Some((mantissa, exp)) => match exp.strip_prefix('-') {
                    Some(digits) => format!("{}e-{:0>2}", mantissa, digits),
                    None => format!("{}e+{:0>2}", mantissa, exp),
                },
                None => s,
            };
            spec.pad(body, true)
        }
        ('p', Value::Pointer(_)) | ('p', Value::Func(_)) | ('p', Value::Chan(_)) => {
            spec.pad(arg.to_string(), false)
        }
        _ => bad_verb(verb, arg),
    }
}

/// `Sprintf` over the common verbs: `%v %T %d %s %q %x %X %c %t %f %e %g %p`
/// with flags `-+0`, width and precision.
pub fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    let mut next_arg = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut spec = Spec::default();
        while let Some(flag) = chars.peek().copied() {
            match flag {
                '-' => spec.minus = true,
                '+' => spec.plus = true,
                '0' => spec.zero = true,
                ' ' | '#' => {}
                _ => break,
            }
            chars.next();
        }
        let mut width = String::new();
        while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
            width.push(d);
            chars.next();
        }
        spec.width = width.parse().ok();
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut precision = String::new();
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                precision.push(d);
                chars.next();
            }
            spec.precision = Some(precision.parse().unwrap_or(0));
        }
        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        match args.get(next_arg) {
            Some(arg) => out.push_str(&format_one(verb, &spec, arg)),
            None => {
                let _ = write!(out, "%!{}(MISSING)", verb);
            }
        }
        next_arg += 1;
    }

    if next_arg < args.len() {
        let extra = args[next_arg..]
            .iter()
            .map(|arg| match arg {
                Value::Nil => "<nil>".to_string(),
                other => format!("{}={}", other.type_name(), other),
            })
            .collect::<Vec<_>>()
            .join(", ");
        let _ = write!(out, "%!(EXTRA {})", extra);
    }
    out
}
