use std::io::{self, Write};

use ms::{ends_with_line_continuation, Interpreter};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        let path = &args[1];
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error reading {path}: {e}");
                std::process::exit(1);
            }
        };
        let mut interp = Interpreter::new(source);
        if let Err(e) = interp.compile(Box::new(|s| println!("{s}"))) {
            eprintln!("{e}");
            std::process::exit(1);
        }
        if let Err(e) = interp.run_until_done(f64::INFINITY, false) {
            eprintln!("{e}");
            std::process::exit(1);
        }
        return;
    }

    let mut interp = Interpreter::new("");
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() { "> " } else { "... " };
        let Some(line) = read_line(prompt) else {
            println!();
            break;
        };

        if pending.is_empty() && line.trim().is_empty() {
            continue;
        }

        if !pending.is_empty() {
            pending.push('\n');
        }
        pending.push_str(&line);

        if ends_with_line_continuation(&pending) {
            continue;
        }

        match interp.repl(&pending, 1.0) {
            Ok(Some(value)) => println!("{}", value.to_display_string()),
            Ok(None) => {}
            Err(e) => eprintln!("{e}"),
        }
        pending.clear();
    }
}

/// Reads one line from stdin after printing a prompt. `None` on EOF.
fn read_line(prompt: &str) -> Option<String> {
    print!("{prompt}");
    io::stdout().flush().ok()?;
    let mut input = String::new();
    let read = io::stdin().read_line(&mut input).ok()?;
    if read == 0 {
        return None;
    }
    Some(input.trim_end_matches(['\r', '\n']).to_owned())
}
