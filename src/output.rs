//! Colored console output for the build engine.
//!
//! A single [`Context`] is threaded through script evaluation and job
//! execution. It carries the two output sinks actions write into, the echo
//! and quiet switches, and the open-action line protocol used by
//! configuration probes (`checking cc ... [OK]`).
//!
//! Uses owo-colors for terminal colors.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use owo_colors::OwoColorize;
use regex::Regex;

/// Destination of an action's output or error stream. `Grep` filters lines
/// through a regular expression before forwarding; `Buffer` collects lines
/// for command-output capture.
pub enum Sink {
    Stdout,
    Stderr,
    Null,
    Buffer(Rc<RefCell<String>>),
    Grep { re: Regex, inner: Box<Sink> },
}

impl Sink {
    pub fn write_line(&mut self, line: &str) {
        match self {
            Sink::Stdout => println!("{}", line),
            Sink::Stderr => eprintln!("{}", line),
            Sink::Null => {}
            Sink::Buffer(buf) => {
                let mut b = buf.borrow_mut();
                b.push_str(line);
                b.push(' ');
            }
            Sink::Grep { re, inner } => {
                if re.is_match(line) {
                    inner.write_line(line);
                }
            }
        }
    }
}

pub struct Context {
    pub out: Sink,
    pub err: Sink,
    /// Echo commands before running them.
    pub command_ena: bool,
    /// Print informational progress lines.
    pub info_ena: bool,
    /// Suppress informational output.
    pub quiet: bool,
    /// Also suppress warnings and errors.
    pub complete_quiet: bool,
    action: Option<String>,
    flushed: bool,
}

impl Default for Context {
    fn default() -> Self {
        Context {
            out: Sink::Stdout,
            err: Sink::Stderr,
            command_ena: false,
            info_ena: true,
            quiet: false,
            complete_quiet: false,
            action: None,
            flushed: false,
        }
    }
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    /// Close a pending open-action line before an unrelated message.
    fn handle_action(&mut self) {
        if self.action.is_some() && !self.flushed {
            println!();
            self.flushed = true;
        }
    }

    /// Print a command before running it.
    pub fn print_command(&mut self, cmd: &str) {
        if !self.quiet && self.command_ena {
            self.handle_action();
            println!("{} {}", ">".cyan(), cmd.cyan());
        }
    }

    /// Print an information line about a built target.
    pub fn print_info(&mut self, info: &str) {
        if !self.quiet && self.info_ena {
            self.handle_action();
            println!("{}", info.blue().bold());
        }
    }

    /// Print a definition made of a term and its description.
    pub fn print_def(&mut self, term: &str, desc: &str) {
        if !self.quiet && self.info_ena {
            self.handle_action();
            println!("{}{}", term.blue().bold(), desc);
        }
    }

    pub fn print_warning(&mut self, msg: &str) {
        if !self.complete_quiet {
            self.handle_action();
            eprintln!("{} {}", "WARNING:".yellow().bold(), msg.yellow());
        }
    }

    pub fn print_error(&mut self, msg: &str) {
        if !self.complete_quiet {
            self.handle_action();
            eprintln!("{} {}", "ERROR:".red().bold(), msg.red());
        }
    }

    pub fn print_success(&mut self, msg: &str) {
        if !self.complete_quiet {
            self.handle_action();
            eprintln!("{} {}", "[100%]".green().bold(), msg.green());
        }
    }

    /// Start an action line, leaving it open for a same-line completion.
    pub fn print_action(&mut self, msg: &str) {
        if !self.quiet {
            print!("{} ... ", msg);
            let _ = std::io::stdout().flush();
            self.action = Some(msg.to_string());
            self.flushed = false;
        }
    }

    fn print_action_final(&mut self, msg: &str) {
        if !self.quiet {
            if self.flushed {
                // another message intervened; re-display the label
                if let Some(a) = &self.action {
                    print!("{} ... ", a);
                }
            }
            println!("{}", msg);
            self.action = None;
            self.flushed = false;
        }
    }

    /// Complete an open action line with success.
    pub fn print_action_success(&mut self, msg: &str) {
        let prefix = if msg.is_empty() {
            String::new()
        } else {
            format!("({}) ", msg)
        };
        self.print_action_final(&format!("{}{}", prefix, "[OK]".green().bold()));
    }

    /// Complete an open action line with failure.
    pub fn print_action_failure(&mut self, msg: &str) {
        let prefix = if msg.is_empty() {
            String::new()
        } else {
            format!("({}) ", msg)
        };
        self.print_action_final(&format!("{}{}", prefix, "[FAILED]".red().bold()));
    }

    /// Complete an open action line with a plain message (used for timing).
    pub fn finish_action(&mut self, msg: &str) {
        self.print_action_final(msg);
    }

    pub fn write_out(&mut self, line: &str) {
        self.out.write_line(line);
    }

    pub fn write_err(&mut self, line: &str) {
        self.err.write_line(line);
    }
}
