//! The execution context and the embedding surface.
//!
//! A `Thread` is single-owner: it carries the call stack, the host's load
//! and print hooks, and a string-keyed local-storage bag. The functions
//! here wire the pipeline together: parse, resolve with the process dialect
//! options, compile, then run the toplevel and freeze the globals on
//! success.

use std::any::Any;
use std::io::Read;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::ast;
use crate::compile::{self, Program};
use crate::error::{Error, EvalError, FramePos, ParseError};
use crate::resolve;
use crate::token::Position;
use crate::val::{Function, StringDict, Value};
use crate::vm::{self, Frame, Globals, ModuleEnv};

#[cfg(test)]
mod eval_test;

pub type LoadFn = dyn Fn(&mut Thread, &str) -> Result<StringDict, Error> + Send + Sync;
pub type PrintFn = dyn Fn(&Thread, &str) + Send + Sync;

/// An execution context. Not concurrent: one thread of execution owns it
/// for the duration of a call.
pub struct Thread {
    /// Optional name, for debugging and profiles.
    pub name: Option<String>,
    print: Option<Arc<PrintFn>>,
    load: Option<Arc<LoadFn>>,
    locals: FxHashMap<String, Box<dyn Any + Send>>,
    pub(crate) stack: Vec<Frame>,
}

impl Thread {
    pub fn new() -> Thread {
        Thread {
            name: None,
            print: None,
            load: None,
            locals: FxHashMap::default(),
            stack: Vec::new(),
        }
    }

    /// Install the callback behind the `print` builtin.
    pub fn set_print<F>(&mut self, f: F)
    where
        F: Fn(&Thread, &str) + Send + Sync + 'static,
    {
        self.print = Some(Arc::new(f));
    }

    /// Install the callback that resolves `load()` statements. The core
    /// never reads the filesystem; the callback owns that and any caching.
    pub fn set_load<F>(&mut self, f: F)
    where
        F: Fn(&mut Thread, &str) -> Result<StringDict, Error> + Send + Sync + 'static,
    {
        self.load = Some(Arc::new(f));
    }

    pub(crate) fn print_hook(&self) -> Option<Arc<PrintFn>> {
        self.print.clone()
    }

    pub(crate) fn load_hook(&self) -> Option<Arc<LoadFn>> {
        self.load.clone()
    }

    /// Thread-local storage, keyed by string per the host contract.
    pub fn set_local(&mut self, key: &str, value: Box<dyn Any + Send>) {
        self.locals.insert(key.to_string(), value);
    }

    pub fn local(&self, key: &str) -> Option<&(dyn Any + Send)> {
        self.locals.get(key).map(|b| b.as_ref())
    }

    pub fn call_stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// A lightweight view of the frame `depth` levels below the top;
    /// depth 0 is the innermost frame.
    pub fn call_frame(&self, depth: usize) -> Option<FrameRef> {
        let i = self.stack.len().checked_sub(depth + 1)?;
        let fr = &self.stack[i];
        Some(match &fr.callable {
            Value::Function(f) => {
                let pos = f.funcode.pos_for_pc(fr.pc);
                FrameRef {
                    name: f.funcode.name.to_string(),
                    pos: Some(FramePos {
                        filename: f.module.program.filename.clone(),
                        line: pos.line,
                        col: pos.col,
                    }),
                }
            }
            Value::Builtin(b) => FrameRef {
                name: b.name.to_string(),
                pos: None,
            },
            other => FrameRef {
                name: other.type_name().to_string(),
                pos: None,
            },
        })
    }

    /// A debugging view exposing the locals of an active frame.
    pub fn debug_frame(&self, depth: usize) -> Option<DebugFrame<'_>> {
        let i = self.stack.len().checked_sub(depth + 1)?;
        Some(DebugFrame {
            frame: &self.stack[i],
        })
    }
}

impl Default for Thread {
    fn default() -> Thread {
        Thread::new()
    }
}

/// Name and position of an active call frame.
#[derive(Debug, Clone)]
pub struct FrameRef {
    pub name: String,
    /// `None` for host builtins.
    pub pos: Option<FramePos>,
}

impl FrameRef {
    pub fn filename(&self) -> Option<&str> {
        self.pos.as_ref().map(|p| p.filename.as_ref())
    }
}

/// Debugger/profiler access to a live frame.
pub struct DebugFrame<'a> {
    frame: &'a Frame,
}

impl<'a> DebugFrame<'a> {
    pub fn callable(&self) -> &Value {
        &self.frame.callable
    }

    pub fn callable_name(&self) -> String {
        match &self.frame.callable {
            Value::Function(f) => f.name().to_string(),
            Value::Builtin(b) => b.name.to_string(),
            other => other.type_name().to_string(),
        }
    }

    /// The i'th local slot (parameters first), if assigned. Cell slots
    /// read through to their content.
    pub fn local(&self, i: usize) -> Option<Value> {
        match self.frame.locals.get(i)?.clone() {
            Some(Value::Cell(c)) => c.get(),
            other => other,
        }
    }

    pub fn num_locals(&self) -> usize {
        self.frame.locals.len()
    }
}

/// Parse, resolve, compile, and execute a source file, returning its frozen
/// globals. When `src` is `None` the file is read from disk on the host's
/// behalf.
pub fn exec_file(
    thread: &mut Thread,
    filename: &str,
    src: Option<&str>,
    predeclared: &StringDict,
) -> Result<StringDict, Error> {
    let text = match src {
        Some(s) => s.to_string(),
        None => std::fs::read_to_string(filename)?,
    };
    let (_, program) = source_program(filename, &text, |n| predeclared.has(n))?;
    program.init(thread, predeclared)
}

/// Parse, resolve, and compile a file without executing it. The predicate
/// tells the resolver which names the host predeclares.
pub fn source_program(
    filename: &str,
    src: &str,
    is_predeclared: impl Fn(&str) -> bool,
) -> Result<(ast::FileUnit, Program), Error> {
    let unit = ast::parse_file(filename, src)
        .map_err(|e| ParseError::from_syntax(Arc::<str>::from(filename), e))?;
    let options = resolve::default_options();
    let module = resolve::resolve_file(&unit, &options, &|n| is_predeclared(n))?;
    let program = compile::compile_file(&unit, &module);
    Ok((unit, program))
}

/// Decode a previously written program.
pub fn compiled_program(r: &mut dyn Read) -> Result<Program, Error> {
    compile::read_program(r)
}

impl Program {
    /// Execute the toplevel against `predeclared`. On success the module's
    /// globals are deeply frozen and returned; on failure partial state is
    /// discarded.
    pub fn init(&self, thread: &mut Thread, predeclared: &StringDict) -> Result<StringDict, Error> {
        let (globals, _) = self.run_toplevel(thread, predeclared)?;
        Ok(globals)
    }

    pub fn write(&self, w: &mut dyn std::io::Write) -> Result<(), Error> {
        compile::write_program(self, w)
    }

    fn run_toplevel(
        &self,
        thread: &mut Thread,
        predeclared: &StringDict,
    ) -> Result<(StringDict, Value), Error> {
        let env = Arc::new(ModuleEnv {
            program: self.data.clone(),
            predeclared: predeclared.clone(),
            globals: Globals::new(self.data.globals.len()),
        });
        let toplevel = Value::Function(Arc::new(Function {
            funcode: self.data.toplevel.clone(),
            module: env.clone(),
            defaults: Vec::new(),
            freevars: Vec::new(),
        }));
        let value = vm::call_value(thread, &toplevel, Vec::new(), Vec::new())?;
        env.globals.freeze();
        let mut out = StringDict::new();
        for (i, name) in self.data.globals.iter().enumerate() {
            if let Some(v) = env.globals.get(i) {
                out.insert(name.to_string(), v);
            }
        }
        Ok((out, value))
    }
}

/// Evaluate a single expression chunk against an environment that acts as
/// its predeclared names.
pub fn eval(
    thread: &mut Thread,
    label: &str,
    src: &str,
    env: &StringDict,
) -> Result<Value, Error> {
    let unit = ast::parse_expr(label, src)
        .map_err(|e| ParseError::from_syntax(Arc::<str>::from(label), e))?;
    let options = resolve::default_options();
    let info = resolve::resolve_expr_unit(&unit, &options, &|n| env.has(n))?;
    let program = compile::compile_expr_unit(&unit, &info);
    let (_, value) = program.run_toplevel(thread, env)?;
    Ok(value)
}

/// Call a callable value with positional and keyword arguments.
pub fn call(
    thread: &mut Thread,
    f: &Value,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, EvalError> {
    vm::call_value(thread, f, args, kwargs)
}

/// The position of the innermost frame, if any; used by hosts that label
/// diagnostics with the caller's location.
pub fn current_position(thread: &Thread) -> Option<(Arc<str>, Position)> {
    let fr = thread.call_frame(0)?;
    let pos = fr.pos?;
    Some((pos.filename.clone(), Position::new(pos.line, pos.col)))
}
