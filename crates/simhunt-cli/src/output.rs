//! Status lines on stderr
//!
//! Rendered reports go to stdout; everything this module prints goes to
//! stderr so reports can be piped.

use console::{style, Term};

/// Kind of status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Something held
    Success,
    /// Something did not hold
    Failure,
    /// Worth a look
    Warning,
    /// Informational
    Info,
}

impl Status {
    /// Line prefix, styled or plain
    #[must_use]
    pub fn prefix(self, use_color: bool) -> String {
        if !use_color {
            return match self {
                Self::Success => "PASS",
                Self::Failure => "FAIL",
                Self::Warning => "WARN",
                Self::Info => "INFO",
            }
            .to_string();
        }
        match self {
            Self::Success => style("✓").green().bold().to_string(),
            Self::Failure => style("✗").red().bold().to_string(),
            Self::Warning => style("⚠").yellow().bold().to_string(),
            Self::Info => style("ℹ").blue().bold().to_string(),
        }
    }
}

/// Prints status lines to stderr
#[derive(Debug)]
pub struct StatusPrinter {
    term: Term,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for StatusPrinter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl StatusPrinter {
    /// Create a new printer
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            use_color,
            quiet,
        }
    }

    /// Format one line without printing it
    #[must_use]
    pub fn line(&self, status: Status, message: &str) -> String {
        format!("{} {message}", status.prefix(self.use_color))
    }

    fn print(&self, status: Status, message: &str) {
        // Failures print even in quiet mode
        if self.quiet && status != Status::Failure {
            return;
        }
        let _ = self.term.write_line(&self.line(status, message));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        self.print(Status::Success, message);
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        self.print(Status::Failure, message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        self.print(Status::Warning, message);
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        self.print(Status::Info, message);
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }

        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };

        let _ = self.term.write_line("");
        let _ = self.term.write_line(&styled);
    }
}
