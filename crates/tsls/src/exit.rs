use std::process::ExitCode;

/// Outcome of a command: an exit status and an optional closing line.
#[derive(Debug)]
pub struct Exit {
    success: bool,
    message: Option<String>,
}

impl Exit {
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn error() -> Self {
        Self {
            success: false,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Print the closing line, unless `quiet`, and turn into a process exit code.
    pub fn report(self, quiet: bool) -> ExitCode {
        if let Some(message) = self.message.filter(|_| !quiet) {
            if self.success {
                println!("{message}");
            } else {
                eprintln!("{message}");
            }
        }

        if self.success {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}
