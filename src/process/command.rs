use std::path::{Path, PathBuf};

/// Executable used for workers, with arguments placed before the generated ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerProgram {
    pub program: String,
    pub args: Vec<String>,
}

impl WorkerProgram {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    fn builder(&self) -> WorkerCommandBuilder {
        WorkerCommandBuilder::new(&self.program).args(&self.args)
    }
}

impl Default for WorkerProgram {
    fn default() -> Self {
        Self::new("claude")
    }
}

/// Fully built worker invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl WorkerCommand {
    pub fn display(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}

/// What the caller wants the worker to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRequest {
    pub prompt: String,
    pub cwd: Option<PathBuf>,
    pub allowed_tools: Vec<String>,
}

impl SessionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_tools = tools.into_iter().map(|t| t.as_ref().to_string()).collect();
        self
    }
}

pub struct WorkerCommandBuilder {
    command: WorkerCommand,
}

impl WorkerCommandBuilder {
    pub fn new(program: &str) -> Self {
        Self {
            command: WorkerCommand {
                program: program.to_string(),
                args: Vec::new(),
                working_dir: None,
            },
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.command.args.push(arg.to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.command
            .args
            .extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.command.working_dir = Some(dir.to_path_buf());
        self
    }

    /// Print mode with the prompt and streaming JSON output.
    pub fn prompt(self, prompt: &str) -> Self {
        self.args(["-p", prompt, "--output-format", "stream-json", "--verbose"])
    }

    pub fn resume(self, session_id: &str) -> Self {
        self.args(["--resume", session_id])
    }

    pub fn allowed_tools(self, tools: &[String]) -> Self {
        if tools.is_empty() {
            return self;
        }
        let joined = tools.join(",");
        self.args(["--allowed-tools", joined.as_str()])
    }

    pub fn build(self) -> WorkerCommand {
        self.command
    }
}

/// Command starting a fresh session.
pub fn new_session_command(program: &WorkerProgram, request: &SessionRequest) -> WorkerCommand {
    let mut builder = program
        .builder()
        .prompt(&request.prompt)
        .allowed_tools(&request.allowed_tools);
    if let Some(cwd) = &request.cwd {
        builder = builder.current_dir(cwd);
    }
    builder.build()
}

/// Command continuing `session_id` in a new process.
pub fn resume_session_command(
    program: &WorkerProgram,
    session_id: &str,
    request: &SessionRequest,
) -> WorkerCommand {
    let mut builder = program
        .builder()
        .prompt(&request.prompt)
        .resume(session_id)
        .allowed_tools(&request.allowed_tools);
    if let Some(cwd) = &request.cwd {
        builder = builder.current_dir(cwd);
    }
    builder.build()
}
