use rustyline::{DefaultEditor, error::ReadlineError};
use vex_core::Interp;
use vex_core::exec::{block_nesting, command_exists};

fn print_repl_help() {
    eprintln!("Commands: :quit | :exit | :q, :help. Other lines run as Ex commands; a bare expression is echoed.");
}

/// Does `line` start with an Ex command (or a comment) rather than an
/// expression? `len(x)` and `function('F')` are expressions even though
/// their first word abbreviates a command.
pub(crate) fn is_command(line: &str) -> bool {
    let line = line.trim_start_matches(|c: char| c == ':' || c.is_whitespace());
    if line.starts_with('"') {
        return true;
    }
    let word_len = line.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(line.len());
    let word = &line[..word_len];
    !word.is_empty() && command_exists(word) && !line[word_len..].starts_with('(')
}

/// Whether more lines are needed to close the blocks opened in `lines`.
pub(crate) fn needs_more(lines: &[String]) -> bool {
    lines.iter().map(|l| block_nesting(l)).sum::<i32>() > 0
}

fn execute(interp: &mut Interp, src: &str, single_line: bool) {
    if single_line && !is_command(src) {
        match interp.eval_to_value(src) {
            Ok(value) => {
                let text = interp.display(&value);
                interp.heap.release(value);
                println!("{text}");
            }
            Err(e) => eprintln!("Error: {e}"),
        }
        return;
    }
    // Errors are shown by the host as they happen.
    let _ = interp.execute_line(src);
    interp.host_mut().flush();
}

pub fn run(interp: &mut Interp) -> anyhow::Result<()> {
    let mut rl = DefaultEditor::new()?;

    print_repl_help();

    loop {
        let mut acc: Vec<String> = Vec::new();
        // Read one or more lines until every block opened is closed again
        loop {
            let prompt = if acc.is_empty() { "> " } else { "... " };
            match rl.readline(prompt) {
                Ok(line) => {
                    let trimmed = line.trim_end();

                    if acc.is_empty() {
                        match trimmed {
                            ":quit" | ":exit" | ":q" => return Ok(()),
                            ":help" => {
                                print_repl_help();
                                break;
                            }
                            _ => {}
                        }
                    }

                    acc.push(trimmed.to_string());
                    if !needs_more(&acc) {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl-C: drop the pending block
                    acc.clear();
                    eprintln!("^C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    if acc.iter().all(|l| l.trim().is_empty()) {
                        println!();
                        return Ok(());
                    }
                    break;
                }
                Err(e) => {
                    eprintln!("Readline error: {}", e);
                    continue;
                }
            }
        }

        let src = acc.join("\n");
        if src.trim().is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(src.as_str());
        execute(interp, &src, acc.len() == 1);
        interp.collect_garbage();
    }
}
