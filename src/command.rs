use crate::builtin::Builtin;
use crate::context::Context;
use futures_util::future::BoxFuture;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Future returned by a command [`Handler`].
pub type HandlerFuture<'c> = BoxFuture<'c, anyhow::Result<()>>;

/// Asynchronous function run when a command is invoked.
///
/// The handler receives the invocation [`Context`] by value and may read
/// further input and write output through it until the future completes.
pub type Handler = Arc<dyn for<'c> Fn(Context<'c>) -> HandlerFuture<'c> + Send + Sync>;

/// A named node of the command tree.
///
/// Commands are assembled with the builder methods and handed over to
/// [`CommandTree::new`], after which they are read only.
///
/// Example
/// ```
/// use ash::{Command, CommandTree};
/// use futures_util::FutureExt;
///
/// let tree = CommandTree::new(vec![
///     Command::new("demo")
///         .help("this is a demo command")
///         .child(Command::new("clear").alias("cls").handler(|mut ctx| {
///             async move { ctx.clear_screen().await.map_err(anyhow::Error::from) }.boxed()
///         })),
/// ])
/// .unwrap();
///
/// let (found, depth) = tree.resolve(&["demo", "cls", "now"]);
/// assert_eq!(found.map(|c| c.name.as_str()), Some("clear"));
/// assert_eq!(depth, 2);
/// ```
#[derive(Clone, Default)]
pub struct Command {
    /// Name the command is invoked by.
    pub name: String,
    /// Alternative names, matched exactly like `name`.
    pub aliases: Vec<String>,
    /// Code to run. A command without a handler only groups its children;
    /// invoking it prints its help.
    pub handler: Option<Handler>,
    /// One-line summary shown in listings.
    pub help: String,
    /// Longer text shown by `help <command>`.
    pub description: String,
    /// Subcommands, searched in order.
    pub children: Vec<Command>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the function run when this command is invoked.
    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: for<'c> Fn(Context<'c>) -> HandlerFuture<'c> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn child(mut self, child: Command) -> Self {
        self.children.push(child);
        self
    }

    /// Whether `token` is the name or one of the aliases of this command.
    pub fn matches(&self, token: &[u8]) -> bool {
        self.name.as_bytes() == token || self.aliases.iter().any(|a| a.as_bytes() == token)
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("handler", &self.handler.as_ref().map(|_| "..."))
            .field("help", &self.help)
            .field("description", &self.description)
            .field("children", &self.children)
            .finish()
    }
}

/// Errors that can occur while building a [`CommandTree`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// Two siblings share a name or an alias.
    #[error("`{name}` is defined more than once under {parent}")]
    Duplicate { parent: String, name: String },
    /// A command or alias is the empty string.
    #[error("a command under {parent} has an empty name or alias")]
    EmptyName { parent: String },
    /// A top-level command would be shadowed by a built-in.
    #[error("`{name}` is reserved for the built-in command")]
    Reserved { name: String },
}

/// Immutable forest of commands.
///
/// Built once and then shared, typically as `Arc<CommandTree>`, by every
/// shell that dispatches to it.
#[derive(Debug, Clone, Default)]
pub struct CommandTree {
    roots: Vec<Command>,
}

impl CommandTree {
    /// Checks the forest and takes ownership of it.
    ///
    /// Siblings must have distinct names and aliases, none of them empty, and
    /// no top-level command may be called like a built-in.
    pub fn new(roots: Vec<Command>) -> Result<Self, TreeError> {
        if let Some(name) = roots
            .iter()
            .flat_map(Command::names)
            .find(|name| Builtin::parse(name.as_bytes()).is_some())
        {
            return Err(TreeError::Reserved {
                name: name.to_string(),
            });
        }
        check_siblings(&roots, "the root")?;
        Ok(Self { roots })
    }

    /// Top-level commands in definition order.
    pub fn roots(&self) -> &[Command] {
        &self.roots
    }

    /// Finds the deepest command named by a prefix of `tokens`.
    ///
    /// Returns the command and the number of tokens naming it, or `(None, 0)`
    /// if the first token is not a top-level command.
    pub fn resolve<T: AsRef<[u8]>>(&self, tokens: &[T]) -> (Option<&Command>, usize) {
        resolve_in(&self.roots, tokens)
    }
}

fn check_siblings(commands: &[Command], parent: &str) -> Result<(), TreeError> {
    let mut seen = HashSet::new();
    for name in commands.iter().flat_map(Command::names) {
        if name.is_empty() {
            return Err(TreeError::EmptyName {
                parent: parent.to_string(),
            });
        }
        if !seen.insert(name) {
            return Err(TreeError::Duplicate {
                parent: parent.to_string(),
                name: name.to_string(),
            });
        }
    }

    for command in commands {
        check_siblings(&command.children, &format!("`{}`", command.name))?;
    }
    Ok(())
}

fn resolve_in<'t, T: AsRef<[u8]>>(commands: &'t [Command], tokens: &[T]) -> (Option<&'t Command>, usize) {
    let Some((first, rest)) = tokens.split_first() else {
        return (None, 0);
    };
    let Some(command) = commands.iter().find(|c| c.matches(first.as_ref())) else {
        return (None, 0);
    };

    match resolve_in(&command.children, rest) {
        (Some(nested), depth) => (Some(nested), depth + 1),
        (None, _) => (Some(command), 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_tree() -> CommandTree {
        CommandTree::new(vec![
            Command::new("demo")
                .help("this is a demo command")
                .child(Command::new("clear").alias("cls"))
                .child(Command::new("nested").child(Command::new("deep"))),
            Command::new("set").alias("let"),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve_longest_path() {
        let tree = demo_tree();

        let (found, depth) = tree.resolve(&["demo", "clear", "extra"]);
        assert_eq!(found.unwrap().name, "clear");
        assert_eq!(depth, 2);

        let (found, depth) = tree.resolve(&["demo", "nested", "deep"]);
        assert_eq!(found.unwrap().name, "deep");
        assert_eq!(depth, 3);

        let (found, depth) = tree.resolve(&["demo", "unknown"]);
        assert_eq!(found.unwrap().name, "demo");
        assert_eq!(depth, 1);
    }

    #[test]
    fn test_resolve_by_alias() {
        let tree = demo_tree();
        let tokens: [&[u8]; 3] = [b"let", b"x", b"1"];
        let (found, depth) = tree.resolve(&tokens);
        assert_eq!(found.unwrap().name, "set");
        assert_eq!(depth, 1);

        let (found, _) = tree.resolve(&["demo", "cls"]);
        assert_eq!(found.unwrap().name, "clear");
    }

    #[test]
    fn test_resolve_not_found() {
        let tree = demo_tree();
        let (found, depth) = tree.resolve(&["clear"]);
        assert!(found.is_none());
        assert_eq!(depth, 0);

        let (found, depth) = tree.resolve::<&str>(&[]);
        assert!(found.is_none());
        assert_eq!(depth, 0);
    }

    #[test]
    fn test_resolve_is_case_sensitive() {
        let tree = demo_tree();
        let (found, depth) = tree.resolve(&["Demo"]);
        assert!(found.is_none());
        assert_eq!(depth, 0);
    }

    #[test]
    fn test_duplicate_siblings_are_rejected() {
        let error = CommandTree::new(vec![Command::new("a"), Command::new("b").alias("a")]).unwrap_err();
        assert_eq!(
            error,
            TreeError::Duplicate {
                parent: "the root".to_string(),
                name: "a".to_string()
            }
        );

        let error = CommandTree::new(vec![
            Command::new("a").child(Command::new("x")).child(Command::new("x")),
        ])
        .unwrap_err();
        assert_eq!(error.to_string(), "`x` is defined more than once under `a`");
    }

    #[test]
    fn test_same_name_at_different_levels_is_fine() {
        let tree = CommandTree::new(vec![Command::new("a").child(Command::new("a"))]).unwrap();
        let (_, depth) = tree.resolve(&["a", "a", "a"]);
        assert_eq!(depth, 2);
    }

    #[test]
    fn test_reserved_and_empty_names_are_rejected() {
        assert_eq!(
            CommandTree::new(vec![Command::new("ok").alias("help")]).unwrap_err(),
            TreeError::Reserved {
                name: "help".to_string()
            }
        );
        assert!(matches!(
            CommandTree::new(vec![Command::new("ok").child(Command::new(""))]),
            Err(TreeError::EmptyName { .. })
        ));
    }
}
