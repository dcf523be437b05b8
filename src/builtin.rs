use crate::command::{Command, CommandTree};

/// Commands every shell understands, regardless of its command tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    /// `help [cmds...]` prints the root listing or the help of one command.
    Help,
    /// `exit` ends the session.
    Exit,
}

impl Builtin {
    pub(crate) fn parse(token: &[u8]) -> Option<Builtin> {
        match token {
            b"help" => Some(Builtin::Help),
            b"exit" => Some(Builtin::Exit),
            _ => None,
        }
    }
}

const ROOT_HEADER: &str = "
root commands:
    - help [cmds...]
        print this help.
    - exit
        end this program";

/// Reply written when `help` is given a path that names no command.
pub const HELP_NOT_FOUND: &str = "cannot find command help was requested for.\n";

fn push_entries(out: &mut String, commands: &[Command]) {
    for command in commands {
        out.push_str(&format!("\n    - {}\n        {}", command.name, command.help));
        if !command.aliases.is_empty() {
            out.push_str("\n      aliases:");
            for alias in &command.aliases {
                out.push_str(&format!("\n        - {alias}"));
            }
        }
    }
}

/// Help text for a single command and its direct children.
pub fn command_help(command: &Command) -> String {
    let mut out = format!("{}\n   {}\n", command.help, command.description);
    if !command.children.is_empty() {
        out.push_str("  subcommands:");
        push_entries(&mut out, &command.children);
    }
    out.push('\n');
    out
}

/// Text printed by `help`.
///
/// Without a query this lists the built-ins and every top-level command.
/// Otherwise the query is resolved like a command line and the help of the
/// deepest command it names is returned.
pub fn render_help<T: AsRef<[u8]>>(commands: &CommandTree, query: &[T]) -> String {
    if query.is_empty() {
        let mut out = ROOT_HEADER.to_string();
        push_entries(&mut out, commands.roots());
        out.push('\n');
        return out;
    }

    match commands.resolve(query) {
        (Some(command), _) => command_help(command),
        (None, _) => HELP_NOT_FOUND.to_string(),
    }
}
