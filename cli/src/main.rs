//! The basalt command interprets a basalt file.
//! With no arguments, it starts a read-eval-print loop.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;

use basalt_core::error::{Error, EvalError};
use basalt_core::{
    compile, exec_file, profile, set_default_options, Options, StringDict, Thread,
};

mod repl;

#[derive(Debug, Parser)]
#[command(
    name = "basalt",
    author,
    version,
    about = "Interpreter for the basalt configuration language",
    long_about = None
)]
struct CliArgs {
    /// Execute the given program text instead of a file
    #[arg(short = 'c', value_name = "PROGRAM")]
    command: Option<String>,

    /// Write a sampled time profile to this file
    #[arg(long, value_name = "FILE")]
    profile: Option<PathBuf>,

    /// On success, print the final global environment
    #[arg(long)]
    showenv: bool,

    /// Show disassembly during compilation of each function
    #[arg(long)]
    disassemble: bool,

    /// Allow floating-point numbers and real division
    #[arg(long)]
    float: bool,

    /// Allow the set data type and set literals
    #[arg(long)]
    set: bool,

    /// Allow lambda expressions
    #[arg(long)]
    lambda: bool,

    /// Allow nested def statements
    #[arg(long)]
    nesteddef: bool,

    /// Allow while statements and recursive functions
    #[arg(long)]
    recursion: bool,

    /// Allow reassignment of globals and control flow at top level
    #[arg(long)]
    globalreassign: bool,

    /// Make load() bind its names as module globals
    #[arg(long)]
    loadbindsglobally: bool,

    /// Source file to execute; with none, start a REPL
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    set_default_options(Options {
        allow_float: args.float,
        allow_set: args.set,
        allow_lambda: args.lambda,
        allow_nested_def: args.nesteddef,
        allow_recursion: args.recursion,
        allow_global_reassign: args.globalreassign,
        load_binds_globally: args.loadbindsglobally,
    });
    compile::set_disassemble(args.disassemble);

    if let Some(path) = &args.profile {
        let file = match File::create(path) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("basalt: cannot create profile {}: {}", path.display(), e);
                return ExitCode::from(1);
            }
        };
        if let Err(e) = profile::start_profile(Box::new(file)) {
            eprintln!("basalt: {}", e);
            return ExitCode::from(1);
        }
    }

    let code = run(&args);

    if args.profile.is_some() {
        if let Err(e) = profile::stop_profile() {
            eprintln!("basalt: {}", e);
            return ExitCode::from(1);
        }
    }
    code
}

fn run(args: &CliArgs) -> ExitCode {
    let mut thread = Thread::new();
    thread.set_load(make_load());
    thread.set_print(|_, msg| println!("{}", msg));

    let (filename, source): (String, Option<String>) = match (&args.command, args.files.len()) {
        (Some(prog), 0) => ("cmdline".to_string(), Some(prog.clone())),
        (None, 1) => (args.files[0].display().to_string(), None),
        (None, 0) => {
            repl::run(&mut thread);
            return ExitCode::SUCCESS;
        }
        _ => {
            eprintln!("basalt: want at most one file name");
            return ExitCode::from(1);
        }
    };

    thread.name = Some(format!("exec {}", filename));
    match exec_file(&mut thread, &filename, source.as_deref(), &StringDict::new()) {
        Ok(globals) => {
            if args.showenv {
                for (name, value) in globals.iter() {
                    if !name.starts_with('_') {
                        eprintln!("{} = {}", name, value.repr());
                    }
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            print_error(&err);
            ExitCode::from(1)
        }
    }
}

fn print_error(err: &Error) {
    match err {
        Error::Eval(e) => eprintln!("{}", e.backtrace()),
        other => eprintln!("{}", other),
    }
}

/// The load() implementation used by the driver: module paths resolve
/// relative to the file doing the loading, and each module executes at
/// most once per process.
fn make_load() -> impl Fn(&mut Thread, &str) -> Result<StringDict, Error> + Send + Sync {
    enum Entry {
        InProgress,
        Done(StringDict),
    }
    let cache: Mutex<HashMap<String, Entry>> = Mutex::new(HashMap::new());

    move |thread: &mut Thread, module: &str| {
        let path = match thread.call_frame(0).and_then(|fr| {
            fr.filename()
                .map(|f| Path::new(f).parent().map(|d| d.join(module)))
        }) {
            Some(Some(p)) => p,
            _ => PathBuf::from(module),
        };
        let key = path.display().to_string();

        {
            let mut cache = cache.lock().unwrap_or_else(|e| e.into_inner());
            match cache.get(&key) {
                Some(Entry::Done(bindings)) => return Ok(bindings.clone()),
                Some(Entry::InProgress) => {
                    return Err(Error::Eval(EvalError::other(format!(
                        "cycle in load graph: {}",
                        key
                    ))));
                }
                None => {
                    cache.insert(key.clone(), Entry::InProgress);
                }
            }
        }

        let result = exec_file(thread, &key, None, &StringDict::new());
        let mut cache = cache.lock().unwrap_or_else(|e| e.into_inner());
        match result {
            Ok(bindings) => {
                cache.insert(key, Entry::Done(bindings.clone()));
                Ok(bindings)
            }
            Err(e) => {
                cache.remove(&key);
                Err(e)
            }
        }
    }
}
