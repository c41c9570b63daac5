//! Display names of interpreted functions.
//!
//! SSA names differ from the names a compiled binary reports: closures are
//! `f$1` instead of `f.func1`, methods are `(*pkg.T).M` instead of
//! `pkg.(*T).M`, and method values and interface thunks carry wrapper
//! suffixes. The suffixes depend on the upstream compiler, so they are
//! configuration rather than constants.

use crate::ssa::Function;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperRecognizer {
    /// Suffix of method-value wrappers.
    pub bound_suffix: String,
    /// Suffix of interface and method-expression thunks.
    pub thunk_suffix: String,
    pub bound_is_autogenerated: bool,
    /// File reported for autogenerated functions.
    pub autogenerated_file: String,
}

impl Default for WrapperRecognizer {
    fn default() -> Self {
        Self {
            bound_suffix: "$bound".to_string(),
            thunk_suffix: "$thunk".to_string(),
            bound_is_autogenerated: true,
            autogenerated_file: "<autogenerated>".to_string(),
        }
    }
}

impl WrapperRecognizer {
    /// Whether `name` is a compiler-generated wrapper, hidden from stacks.
    pub fn is_wrapper(&self, name: &str) -> bool {
        name.ends_with(&self.bound_suffix) || name.ends_with(&self.thunk_suffix)
    }

    /// Name as a compiled binary reports it, and whether the function is
    /// autogenerated.
    pub fn display_name(&self, func: &Function) -> (String, bool) {
        let name = rewrite_receiver(&rewrite_closures(&func.name));
        if let Some(base) = name.strip_suffix(&self.bound_suffix) {
            return (format!("{}-fm", base), self.bound_is_autogenerated);
        }
        if let Some(base) = name.strip_suffix(&self.thunk_suffix) {
            let autogenerated = base.starts_with("struct{")
                || func.params.first().is_some_and(|p| p.is_interface());
            return (base.to_string(), autogenerated);
        }
        (name, false)
    }
}

/// `f$1$2` becomes `f.func1.func2`.
fn rewrite_closures(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 8);
    let mut chars = name.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if c == '$' && chars.peek().is_some_and(|(_, d)| d.is_ascii_digit()) {
            out.push_str(".func");
            while let Some((_, d)) = chars.peek().copied() {
                if !d.is_ascii_digit() {
                    break;
                }
                out.push(d);
                chars.next();
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// `(*pkg.T).M` becomes `pkg.(*T).M`; `(pkg.T).M` becomes `pkg.T.M`.
fn rewrite_receiver(name: &str) -> String {
    let Some(inner) = name.strip_prefix('(') else {
        return name.to_string();
    };
    let Some(close) = inner.rfind(')') else {
        return name.to_string();
    };
    let receiver = &inner[..close];
    let rest = &inner[close + 1..];
    let receiver = match receiver.strip_prefix('*') {
        Some(pointee) => match pointee.rfind('.') {
            Some(dot) => format!("{}(*{})", &pointee[..dot + 1], &pointee[dot + 1..]),
            None => receiver.to_string(),
        },
        None => receiver.to_string(),
    };
    format!("{}{}", receiver, rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssa::{FuncId, FunctionBuilder, Program, TypeKind, TypeRef, UnitBuilder};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn function(name: &str, first_param: Option<TypeKind>) -> Function {
        let mut builder = FunctionBuilder::new(name);
        if let Some(kind) = first_param {
            builder = builder.param(TypeRef::new("p", kind));
        }
        let unit = UnitBuilder::new("main", "main", "main.go")
            .function(builder.build())
            .build();
        let program = Program::build(vec![unit]).unwrap();
        program.function(FuncId(0)).unwrap().clone()
    }

    #[rstest]
    #[case::plain("main.main", "main.main", false)]
    #[case::closure("main.main$1", "main.main.func1", false)]
    #[case::nested_closure("main.run$2$1", "main.run.func2.func1", false)]
    #[case::pointer_method("(*main.T).Get", "main.(*T).Get", false)]
    #[case::value_method("(main.T).Get", "main.T.Get", false)]
    #[case::pathed_receiver("(*example.com/m/pkg.T).Get", "example.com/m/pkg.(*T).Get", false)]
    #[case::bound("(*main.T).Get$bound", "main.(*T).Get-fm", true)]
    #[case::closure_in_method("(*main.T).Run$1", "main.(*T).Run.func1", false)]
    #[case::struct_thunk("struct{main.T}.Get$thunk", "struct{main.T}.Get", true)]
    #[case::concrete_thunk("(main.T).Get$thunk", "main.T.Get", false)]
    fn test_display_name(#[case] ssa: &str, #[case] shown: &str, #[case] autogenerated: bool) {
        let recognizer = WrapperRecognizer::default();
        assert_eq!(
            recognizer.display_name(&function(ssa, None)),
            (shown.to_string(), autogenerated)
        );
    }

    #[test]
    fn test_interface_thunk_is_autogenerated() {
        let recognizer = WrapperRecognizer::default();
        let (name, autogenerated) =
            recognizer.display_name(&function("(main.I).Get$thunk", Some(TypeKind::Interface)));
        assert_eq!(name, "main.I.Get");
        assert!(autogenerated);
    }

    #[test]
    fn test_recognizer_follows_configured_suffixes() {
        let recognizer = WrapperRecognizer {
            bound_suffix: "#bound".to_string(),
            bound_is_autogenerated: false,
            ..WrapperRecognizer::default()
        };
        assert!(recognizer.is_wrapper("(*main.T).Get#bound"));
        assert!(!recognizer.is_wrapper("(*main.T).Get$bound"));
        assert_eq!(
            recognizer.display_name(&function("(*main.T).Get#bound", None)),
            ("main.(*T).Get-fm".to_string(), false)
        );
    }

    #[test]
    fn test_dollar_without_digits_is_kept() {
        assert_eq!(rewrite_closures("main.f$x"), "main.f$x");
        assert_eq!(rewrite_closures("main.f$10"), "main.f.func10");
    }
}
