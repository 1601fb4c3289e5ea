use std::path::{Path, PathBuf};

/// A compiled CmdStan model: its executable and the data variables it declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    executable: PathBuf,
    required: Vec<String>,
}

impl Model {
    /// Describes the model binary at `executable` with no required variables.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            required: Vec::new(),
        }
    }

    /// Declares data variables that must be present before any chain launches.
    pub fn with_required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(names.into_iter().map(Into::into));
        self
    }

    /// Path of the sampler executable.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Variables declared by the model's `data` block.
    pub fn required(&self) -> &[String] {
        &self.required
    }
}
