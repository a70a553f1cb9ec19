//! Command templates and per-case command resolution.
//!
//! A template is literal text with `{{ .Name }}` actions. Two fields are
//! recognized: `File`, the case's unique input artifact path, and `Root`,
//! the artifact directory. Rendering substitutes the values verbatim; the
//! result is then split into words with POSIX shell quoting rules and no
//! other shell expansion.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::CoreError;

/// Opening delimiter of a template action.
const OPEN: &str = "{{";
/// Closing delimiter of a template action.
const CLOSE: &str = "}}";

/// A field a template action may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    File,
    Root,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// Per-case values substituted into a [`CommandTemplate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderValues {
    /// Unique artifact path for this case.
    pub file: PathBuf,
    /// Directory holding the artifacts.
    pub root: PathBuf,
}

impl PlaceholderValues {
    /// Values for an artifact named `name` inside `root`.
    #[must_use]
    pub fn new(root: &Path, name: &str) -> Self {
        Self {
            file: root.join(name),
            root: root.to_owned(),
        }
    }
}

/// A parsed command template.
///
/// Immutable after parsing; rendering borrows it, so one template serves
/// every case and may be shared across threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl CommandTemplate {
    /// Parse a template.
    ///
    /// # Errors
    /// Returns [`CoreError::TemplateParse`] for an unterminated or empty
    /// action, an action that is not a field reference, or an unknown field.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let mut segments = Vec::new();
        let mut rest = text;
        let mut offset = 0usize;

        while let Some(open) = rest.find(OPEN) {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_owned()));
            }
            let action_start = offset + open;
            let after_open = &rest[open + OPEN.len()..];
            let close = after_open.find(CLOSE).ok_or_else(|| CoreError::TemplateParse {
                offset: action_start,
                reason: "unterminated action".to_owned(),
            })?;
            segments.push(Segment::Field(parse_action(&after_open[..close], action_start)?));

            let consumed = open + OPEN.len() + close + CLOSE.len();
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_owned()));
        }

        Ok(Self { source: text.to_owned(), segments })
    }

    /// The template text as given to [`CommandTemplate::parse`].
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the template references the `File` placeholder.
    #[must_use]
    pub fn uses_file(&self) -> bool {
        self.segments.contains(&Segment::Field(Field::File))
    }

    /// Substitute the placeholder values.
    ///
    /// # Errors
    /// Returns [`CoreError::Render`] if a referenced path is not valid UTF-8.
    pub fn render(&self, values: &PlaceholderValues) -> Result<String, CoreError> {
        let mut out = String::with_capacity(self.source.len() + 64);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(Field::File) => out.push_str(path_str(&values.file)?),
                Segment::Field(Field::Root) => out.push_str(path_str(&values.root)?),
            }
        }
        Ok(out)
    }

    /// Render and tokenize into a command ready to launch.
    ///
    /// # Errors
    /// Propagates [`CoreError::Render`], [`CoreError::Tokenize`] and
    /// [`CoreError::EmptyCommand`].
    pub fn resolve(&self, values: &PlaceholderValues) -> Result<ResolvedCommand, CoreError> {
        let rendered = self.render(values)?;
        let (program, args) = tokenize(&rendered)?;
        Ok(ResolvedCommand {
            program,
            args,
            artifact: self.uses_file().then(|| values.file.clone()),
        })
    }
}

fn parse_action(inner: &str, offset: usize) -> Result<Field, CoreError> {
    let action = inner.trim();
    let err = |reason: String| CoreError::TemplateParse { offset, reason };

    if action.is_empty() {
        return Err(err("empty action".to_owned()));
    }
    let Some(name) = action.strip_prefix('.') else {
        return Err(err(format!("unsupported action [{action}], expected a field like .File")));
    };
    match name {
        "File" => Ok(Field::File),
        "Root" => Ok(Field::Root),
        "" => Err(err("bare dot has no value to render".to_owned())),
        other => Err(err(format!("unknown field [{other}]"))),
    }
}

fn path_str(path: &Path) -> Result<&str, CoreError> {
    path.to_str().ok_or_else(|| CoreError::Render {
        reason: format!("path {} is not valid UTF-8", path.display()),
    })
}

/// Split a rendered command into program and arguments.
///
/// Quotes and backslash escapes follow POSIX shell rules; nothing else is
/// expanded. Pure: the same text always yields the same words.
///
/// # Errors
/// Returns [`CoreError::Tokenize`] on unbalanced quoting and
/// [`CoreError::EmptyCommand`] if there are no words.
pub fn tokenize(rendered: &str) -> Result<(String, Vec<String>), CoreError> {
    let mut words = shlex::split(rendered).ok_or_else(|| CoreError::Tokenize {
        rendered: rendered.to_owned(),
    })?;
    if words.is_empty() {
        return Err(CoreError::EmptyCommand);
    }
    let program = words.remove(0);
    Ok((program, words))
}

/// A concrete command for one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    /// Program name or path, looked up in `PATH` when bare.
    pub program: String,
    /// Arguments in order, excluding the program.
    pub args: Vec<String>,
    /// The input artifact path, when the template references `File`.
    pub artifact: Option<PathBuf>,
}

impl fmt::Display for ResolvedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
