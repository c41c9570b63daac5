//! `runtime` shims.
//!
//! `Goexit` and `GC` are engine intrinsics; the rest answer introspection
//! queries from the interpreter's frame chain. `*runtime.Func` and
//! `*runtime.Frames` are native objects; a `runtime.Frame` is a struct
//! value with fields `PC, Func, Function, File, Line, Entry`.

use crate::bridge::RegistryBuilder;
use crate::interp::Unwind;
use crate::introspect::{self, FuncInfo, Frames, StackFrame};
use crate::marshal::{Kind, NativeSignature};
use crate::value::{NativeObject, Value};
use parking_lot::Mutex;
use std::sync::Arc;

const FUNC_TYPE: &str = "*runtime.Func";
const FRAMES_TYPE: &str = "*runtime.Frames";

pub fn register(b: &mut RegistryBuilder) {
    b.native(
        "runtime.Goexit",
        NativeSignature::new(vec![], vec![]),
        |fr, _| Err(fr.interp().goexit(fr)),
    )
    .native("runtime.GC", NativeSignature::new(vec![], vec![]), |fr, _| {
        fr.interp().collect(fr);
        Ok(Vec::new())
    })
    .native(
        "runtime.Caller",
        NativeSignature::new(
            vec![Kind::Int],
            vec![Kind::Uintptr, Kind::String, Kind::Int, Kind::Bool],
        ),
        |fr, args| {
            let skip = args.first().and_then(Value::as_int).unwrap_or(0);
            let info = if skip < 0 {
                introspect::CallerInfo::default()
            } else {
                introspect::caller(fr, skip as usize)?
            };
            Ok(vec![
                Value::Uintptr(info.pc),
                Value::string(info.file),
                Value::Int(info.line as i64),
                Value::Bool(info.ok),
            ])
        },
    )
    .native(
        "runtime.Callers",
        NativeSignature::new(vec![Kind::Int, Kind::Slice], vec![Kind::Int]),
        |fr, args| {
            let skip = args.first().and_then(Value::as_int).unwrap_or(0).max(0) as usize;
            let out = match args.get(1) {
                Some(Value::Slice(out)) => out.clone(),
                _ => return Ok(vec![Value::Int(0)]),
            };
            let pcs = introspect::callers(fr, skip, out.len())?;
            let values: Vec<Value> = pcs.into_iter().map(Value::Uintptr).collect();
            Ok(vec![Value::Int(out.copy_from(&values) as i64)])
        },
    )
    .native(
        "runtime.CallersFrames",
        NativeSignature::new(vec![Kind::Slice], vec![Kind::Opaque]),
        |_, args| {
            let pcs = match args.first() {
                Some(Value::Slice(pcs)) => pcs
                    .to_vec()
                    .iter()
                    .filter_map(|v| match v {
                        Value::Uintptr(pc) => Some(*pc),
                        Value::Int(pc) => Some(*pc as u64),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            Ok(vec![Value::Native(NativeObject::new(
                FRAMES_TYPE,
                Mutex::new(Frames::new(pcs)),
            ))])
        },
    )
    .native(
        "(*runtime.Frames).Next",
        NativeSignature::new(vec![Kind::Opaque], vec![Kind::Any, Kind::Bool]),
        |fr, args| {
            let frames = opaque(&args, FRAMES_TYPE)?;
            let (frame, more) = match frames.downcast::<Mutex<Frames>>() {
                Some(frames) => frames.lock().next(fr.interp()),
                None => (StackFrame::default(), false),
            };
            Ok(vec![frame_value(frame), Value::Bool(more)])
        },
    )
    .native(
        "runtime.FuncForPC",
        NativeSignature::new(vec![Kind::Uintptr], vec![Kind::Opaque]),
        |fr, args| {
            let pc = pc_arg(&args, 0);
            Ok(vec![match introspect::func_for_pc(fr.interp(), pc) {
                Some(info) => func_value(info),
                None => Value::Nil,
            }])
        },
    )
    .native(
        "(*runtime.Func).Name",
        NativeSignature::new(vec![Kind::Opaque], vec![Kind::String]),
        |_, args| {
            let name = func_info(&args).map(|f| f.name.clone()).unwrap_or_default();
            Ok(vec![Value::string(name)])
        },
    )
    .native(
        "(*runtime.Func).Entry",
        NativeSignature::new(vec![Kind::Opaque], vec![Kind::Uintptr]),
        |_, args| Ok(vec![Value::Uintptr(func_info(&args).map_or(0, |f| f.entry))]),
    )
    .native(
        "(*runtime.Func).FileLine",
        NativeSignature::new(vec![Kind::Opaque, Kind::Uintptr], vec![Kind::String, Kind::Int]),
        |fr, args| {
            let (file, line) = match func_info(&args) {
                Some(info) => info.file_line(fr.interp(), pc_arg(&args, 1)),
                None => (String::new(), 0),
            };
            Ok(vec![Value::string(file), Value::Int(line as i64)])
        },
    )
    .native(
        "runtime.Stack",
        NativeSignature::new(vec![Kind::Slice, Kind::Bool], vec![Kind::Int]),
        |fr, args| {
            let buf = match args.first() {
                Some(Value::Slice(buf)) if !buf.is_empty() => buf.clone(),
                _ => return Ok(vec![Value::Int(0)]),
            };
            let text = introspect::stack(fr)?;
            let bytes: Vec<Value> = text.bytes().map(|b| Value::Int(b as i64)).collect();
            Ok(vec![Value::Int(buf.copy_from(&bytes) as i64)])
        },
    )
    .native(
        "runtime.NumGoroutine",
        NativeSignature::new(vec![], vec![Kind::Int]),
        |fr, _| Ok(vec![Value::Int(fr.interp().num_goroutine() as i64)]),
    )
    .func0("runtime.Gosched", std::thread::yield_now);
}

fn pc_arg(args: &[Value], index: usize) -> u64 {
    match args.get(index) {
        Some(Value::Uintptr(pc)) => *pc,
        Some(Value::Int(pc)) => *pc as u64,
        _ => 0,
    }
}

fn opaque(args: &[Value], type_name: &str) -> Result<NativeObject, Unwind> {
    match args.first() {
        Some(Value::Native(obj)) if obj.type_name() == type_name => Ok(obj.clone()),
        _ => Err(Unwind::runtime_error(
            "invalid memory address or nil pointer dereference",
        )),
    }
}

fn func_value(info: FuncInfo) -> Value {
    Value::Native(NativeObject::new(FUNC_TYPE, info))
}

fn func_info(args: &[Value]) -> Option<FuncInfo> {
    match args.first() {
        Some(Value::Native(obj)) => obj.downcast::<FuncInfo>().cloned(),
        _ => None,
    }
}

fn frame_value(frame: StackFrame) -> Value {
    let func = match frame.info() {
        Some(info) => func_value(info.clone()),
        None => Value::Nil,
    };
    Value::Struct(Arc::from(vec![
        Value::Uintptr(frame.pc),
        func,
        Value::string(&frame.function),
        Value::string(&frame.file),
        Value::Int(frame.line as i64),
        Value::Uintptr(frame.entry),
    ]))
}
