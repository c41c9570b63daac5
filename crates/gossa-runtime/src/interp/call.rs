//! Calls: interpreted, external and builtin.

use crate::error::RuntimeError;
use crate::interp::{output, Frame, Interp, Unwind};
use crate::ssa::{Builtin, CallCommon, Callee, Function, Reg};
use crate::value::{FuncValue, Value};

impl Interp {
    pub(crate) fn call(&self, fr: &Frame<'_>, call: &CallCommon) -> Result<Vec<Value>, Unwind> {
        let args = call
            .args
            .iter()
            .map(|op| self.operand(fr, op))
            .collect::<Result<Vec<_>, _>>()?;
        match &call.callee {
            Callee::Builtin(builtin) => self.builtin(fr, *builtin, args),
            Callee::Static(name) => match self.program.lookup(name).filter(|f| f.has_body()) {
                Some(func) => self.call_function(fr, func, &[], args, false),
                None => self.call_external(fr, name, args),
            },
            Callee::Dynamic(op) => {
                let callee = self.operand(fr, op)?;
                self.call_value(fr, &callee, args)
            }
        }
    }

    /// Calls a function value from `fr`. Natives use this to call back into
    /// interpreted code.
    pub fn call_value(
        &self,
        fr: &Frame<'_>,
        callee: &Value,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, Unwind> {
        match callee {
            Value::Func(func) => self.call_func(fr, func, args, false),
            Value::Nil => Err(super::ops::nil_dereference()),
            other => Err(Unwind::Fatal(RuntimeError::InvalidOperand {
                function: fr.function().map(|f| f.name.clone()).unwrap_or_default(),
                message: format!("call of non-function {}", other.type_name()),
            })),
        }
    }

    pub(crate) fn call_func(
        &self,
        fr: &Frame<'_>,
        callee: &FuncValue,
        args: Vec<Value>,
        deferred: bool,
    ) -> Result<Vec<Value>, Unwind> {
        match callee {
            FuncValue::Interp { func, bindings, name } => {
                let func = self.program.function(*func).ok_or_else(|| {
                    RuntimeError::UnknownFunction {
                        name: name.to_string(),
                    }
                })?;
                self.call_function(fr, func, bindings, args, deferred)
            }
            FuncValue::External(name) => self.call_external(fr, name, args),
        }
    }

    /// Pushes a frame for `func` on top of `caller` and runs it.
    pub(crate) fn call_function(
        &self,
        caller: &Frame<'_>,
        func: &Function,
        bindings: &[Value],
        args: Vec<Value>,
        deferred: bool,
    ) -> Result<Vec<Value>, Unwind> {
        if !func.has_body() {
            return self.call_external(caller, &func.name, args);
        }
        if args.len() != func.params.len() {
            return Err(Unwind::Fatal(RuntimeError::InvalidOperand {
                function: func.name.clone(),
                message: format!(
                    "called with {} arguments, expects {}",
                    args.len(),
                    func.params.len()
                ),
            }));
        }
        let fr = Frame::new(caller, func, deferred);
        let nparams = args.len();
        for (i, arg) in args.into_iter().enumerate() {
            fr.set_reg(Reg(i as u32), arg);
        }
        for (i, binding) in bindings.iter().enumerate() {
            fr.set_reg(Reg((nparams + i) as u32), binding.clone());
        }
        self.run_frame(&fr, func)
    }

    /// Calls a symbol without an interpreted body through the registry.
    pub(crate) fn call_external(
        &self,
        fr: &Frame<'_>,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, Unwind> {
        let external = self.registry.resolve(name)?;
        external.invoke(fr, args)
    }

    pub(crate) fn builtin(
        &self,
        fr: &Frame<'_>,
        builtin: Builtin,
        mut args: Vec<Value>,
    ) -> Result<Vec<Value>, Unwind> {
        match builtin {
            Builtin::Print | Builtin::Println => {
                let sep = if builtin == Builtin::Println { " " } else { "" };
                let mut text = args
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(sep);
                if builtin == Builtin::Println {
                    text.push('\n');
                }
                output::emit(&self.stderr, &text);
                Ok(Vec::new())
            }
            Builtin::Len => {
                let len = match args.first() {
                    Some(Value::String(s)) => s.len(),
                    Some(Value::Slice(s)) => s.len(),
                    Some(Value::Chan(c)) => c.receiver().len(),
                    Some(Value::Nil) | None => 0,
                    Some(other) => {
                        return Err(Unwind::Fatal(RuntimeError::InvalidOperand {
                            function: "len".to_string(),
                            message: format!("len of {}", other.type_name()),
                        }))
                    }
                };
                Ok(vec![Value::Int(len as i64)])
            }
            Builtin::Recover => Ok(vec![self.recover(fr)]),
            Builtin::Append => {
                if args.is_empty() {
                    return Ok(vec![Value::Nil]);
                }
                let rest = args.split_off(1);
                let slice = match args.pop() {
                    Some(Value::Slice(slice)) => slice.append(rest),
                    Some(Value::Nil) | None => crate::value::SliceRef::new(rest),
                    Some(other) => {
                        return Err(Unwind::Fatal(RuntimeError::InvalidOperand {
                            function: "append".to_string(),
                            message: format!("append to {}", other.type_name()),
                        }))
                    }
                };
                Ok(vec![Value::Slice(slice)])
            }
        }
    }

    /// `recover()` called from `fr`: only a function deferred by the
    /// panicking frame stops the panic. Everywhere else it returns nil.
    fn recover(&self, fr: &Frame<'_>) -> Value {
        if !fr.is_deferred() {
            return Value::Nil;
        }
        fr.caller()
            .and_then(|panicking| panicking.recover_panic())
            .unwrap_or_default()
    }
}
