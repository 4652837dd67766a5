//! Read-eval-print loop.
//!
//! Each submitted chunk executes as its own module against an accumulated
//! environment; new globals are merged back so later chunks see them.
//! A chunk that parses as a single expression prints its value.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use basalt_core::error::Error;
use basalt_core::val::Value;
use basalt_core::{eval, exec_file, StringDict, Thread};

fn print_repl_help() {
    eprintln!("Commands: :quit | :exit | :q, :help");
}

/// Keep reading while brackets are unbalanced or a def/if/for suite is
/// still open.
fn should_continue_multiline(buf: &str) -> bool {
    let mut paren = 0i32;
    let mut brace = 0i32;
    let mut bracket = 0i32;
    for ch in buf.chars() {
        match ch {
            '(' => paren += 1,
            ')' => paren -= 1,
            '{' => brace += 1,
            '}' => brace -= 1,
            '[' => bracket += 1,
            ']' => bracket -= 1,
            _ => {}
        }
    }
    if paren > 0 || brace > 0 || bracket > 0 {
        return true;
    }
    // A line ending in ':' opens a suite; stop at the first blank line.
    let mut open_suite = false;
    for line in buf.lines() {
        if line.trim_end().ends_with(':') {
            open_suite = true;
        }
    }
    open_suite && !buf.ends_with("\n\n")
}

pub fn run(thread: &mut Thread) {
    println!("Welcome to basalt");
    print_repl_help();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("basalt: cannot start line editor: {}", e);
            return;
        }
    };
    let mut env = StringDict::new();

    loop {
        let mut acc = String::new();
        loop {
            let prompt = if acc.is_empty() { ">>> " } else { "... " };
            match rl.readline(prompt) {
                Ok(line) => {
                    let trimmed = line.trim_end();
                    if acc.is_empty() && trimmed.starts_with(':') {
                        match trimmed {
                            ":quit" | ":exit" | ":q" => return,
                            ":help" => {
                                print_repl_help();
                            }
                            _ => eprintln!("Unknown command. Type :help for help."),
                        }
                        continue;
                    }
                    acc.push_str(trimmed);
                    acc.push('\n');
                    if !should_continue_multiline(&acc) {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    acc.clear();
                    eprintln!("^C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    if acc.trim().is_empty() {
                        println!();
                        return;
                    }
                    break;
                }
                Err(e) => {
                    eprintln!("Readline error: {}", e);
                    return;
                }
            }
        }

        let src = acc.trim_end().to_string();
        if src.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(src.as_str());

        // Expression first: values print; anything else runs as a module
        // chunk whose globals accumulate.
        match eval(thread, "<stdin>", &src, &env) {
            Ok(v) => {
                if !matches!(v, Value::None) {
                    println!("{}", v.repr());
                }
                continue;
            }
            Err(Error::Parse(_)) => {}
            Err(err) => {
                print_error(&err);
                continue;
            }
        }
        match exec_file(thread, "<stdin>", Some(&src), &env) {
            Ok(globals) => {
                for (name, value) in globals.iter() {
                    env.insert(name.clone(), value.clone());
                }
            }
            Err(err) => print_error(&err),
        }
    }
}

fn print_error(err: &Error) {
    match err {
        Error::Eval(e) => eprintln!("{}", e.backtrace()),
        other => eprintln!("Error: {}", other),
    }
}
