use std::fmt;

/// An argument vector: the program followed by its arguments.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CommandLine {
    argv: Vec<String>,
}

impl CommandLine {
    /// Starts a command line with the program to run.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            argv: vec![program.into()],
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// The program to run.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    /// The arguments after the program.
    #[must_use]
    pub fn args_slice(&self) -> &[String] {
        &self.argv[1..]
    }

    /// The full argument vector.
    #[must_use]
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Whether the argument vector starts with `prefix`.
    #[must_use]
    pub fn starts_with(&self, prefix: &[&str]) -> bool {
        prefix.len() <= self.argv.len()
            && self.argv.iter().zip(prefix).all(|(arg, want)| arg == want)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))
    }
}
