//! Call-site discovery and bounded backtrace capture.
//!
//! The walker works on an ordered list of [`RawFrame`]s, most recent call
//! first, supplied by a [`StackProvider`]. It looks for the frame where the
//! logging façade was entered, reports the file and line that called it and
//! optionally formats the caller frames that follow.

use std::fmt;
use std::path::Path;

/// Class name of the logging façade whose `log*` entry points mark the
/// boundary between logging internals and caller code.
pub const DEFAULT_FACADE: &str = "Logger";

/// Function name of the façade entry point for exceptions. Calls through
/// it never record a backtrace.
pub const LOG_EXCEPTION: &str = "logException";

/// Rendered in place of an empty file name.
pub const UNKNOWN_FILE: &str = "unknown_file";

/// Strings longer than this are truncated when rendered as arguments.
const MAX_TEXT_ARG: usize = 28;
const TEXT_ARG_KEEP: usize = 25;

/// How a frame's function was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallType {
    Static,
    Instance,
}

impl CallType {
    pub fn separator(self) -> &'static str {
        match self {
            CallType::Static => "::",
            CallType::Instance => "->",
        }
    }
}

/// Summary of a single call argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// Object-like value, rendered as its type name.
    Composite(String),
    /// Collection, rendered as its length.
    Collection(usize),
    Text(String),
    /// Any other value, with the name of its type and its display form.
    Scalar { type_name: String, value: String },
}

impl ArgValue {
    pub fn integer(v: i64) -> Self {
        ArgValue::Scalar { type_name: "integer".into(), value: v.to_string() }
    }

    pub fn double(v: f64) -> Self {
        ArgValue::Scalar { type_name: "double".into(), value: v.to_string() }
    }

    pub fn boolean(v: bool) -> Self {
        let value = if v { "1" } else { "" };
        ArgValue::Scalar { type_name: "boolean".into(), value: value.into() }
    }

    pub fn null() -> Self {
        ArgValue::Scalar { type_name: "NULL".into(), value: String::new() }
    }

    pub fn render(&self) -> String {
        match self {
            ArgValue::Composite(class) => class.clone(),
            ArgValue::Collection(len) => format!("array({})", len),
            ArgValue::Text(s) => {
                if s.chars().count() > MAX_TEXT_ARG {
                    let head: String = s.chars().take(TEXT_ARG_KEEP).collect();
                    format!("'{}...'", head)
                } else {
                    format!("'{}'", s)
                }
            }
            ArgValue::Scalar { type_name, value } => format!("{}({})", type_name, value),
        }
    }
}

/// One level of the call stack as reported by a [`StackProvider`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFrame {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: String,
    pub class: Option<String>,
    pub call_type: Option<CallType>,
    pub args: Vec<ArgValue>,
}

impl RawFrame {
    pub fn new(function: impl Into<String>) -> Self {
        RawFrame { function: function.into(), ..Default::default() }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn static_call(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self.call_type = Some(CallType::Static);
        self
    }

    pub fn method_call(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self.call_type = Some(CallType::Instance);
        self
    }

    pub fn arg(mut self, arg: ArgValue) -> Self {
        self.args.push(arg);
        self
    }

    fn qualified_function(&self) -> String {
        match (&self.class, self.call_type) {
            (Some(class), Some(ty)) => format!("{}{}{}", class, ty.separator(), self.function),
            (Some(class), None) => format!("{}{}", class, self.function),
            _ => self.function.clone(),
        }
    }
}

/// Source of the current call stack, most recent frame first.
pub trait StackProvider {
    fn frames(&self) -> Vec<RawFrame>;
}

impl StackProvider for Vec<RawFrame> {
    fn frames(&self) -> Vec<RawFrame> {
        self.clone()
    }
}

/// Directory prefix stripped from every rendered file path.
///
/// Built one level above the application root so that deployments
/// symlinked from a parent directory still render short paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasePath(String);

impl BasePath {
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        BasePath(prefix)
    }

    pub fn from_app_root(root: impl AsRef<Path>) -> Self {
        match root.as_ref().parent() {
            Some(parent) => Self::new(parent.to_string_lossy()),
            None => Self::default(),
        }
    }

    pub fn relative<'a>(&self, file: &'a str) -> &'a str {
        if self.0.is_empty() {
            return file;
        }
        file.strip_prefix(self.0.as_str()).unwrap_or(file)
    }
}

/// A caller frame selected for the backtrace, ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktraceFrame {
    pub file: String,
    pub line: u32,
    pub function: String,
    pub arguments: Vec<String>,
}

impl BacktraceFrame {
    fn from_raw(raw: &RawFrame, base: &BasePath) -> Self {
        let file = match raw.file.as_deref() {
            None | Some("") => UNKNOWN_FILE.to_string(),
            Some(f) => base.relative(f).to_string(),
        };
        BacktraceFrame {
            file,
            line: raw.line.unwrap_or(0),
            function: raw.qualified_function(),
            arguments: raw.args.iter().map(ArgValue::render).collect(),
        }
    }
}

impl fmt::Display for BacktraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {}({})",
            self.file,
            self.line,
            self.function,
            self.arguments.join(", ")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub file: String,
    pub line: u32,
}

/// Result of [`BacktraceWalker::capture`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Capture {
    /// `None` when no boundary frame with a known location was found.
    pub call_site: Option<CallSite>,
    pub frames: Vec<BacktraceFrame>,
}

impl Capture {
    /// Frames joined as `#<index> <file>:<line> <function>(<args>)`, one
    /// per line. `None` when nothing was recorded.
    pub fn backtrace(&self) -> Option<String> {
        if self.frames.is_empty() {
            return None;
        }
        let lines: Vec<String> = self
            .frames
            .iter()
            .enumerate()
            .map(|(index, frame)| format!("#{} {}", index, frame))
            .collect();
        Some(lines.join("\n"))
    }
}

#[derive(Debug, Clone)]
pub struct BacktraceWalker {
    facade: String,
    base: BasePath,
}

impl Default for BacktraceWalker {
    fn default() -> Self {
        Self::new(DEFAULT_FACADE, BasePath::default())
    }
}

impl BacktraceWalker {
    pub fn new(facade: impl Into<String>, base: BasePath) -> Self {
        BacktraceWalker { facade: facade.into(), base }
    }

    pub fn facade(&self) -> &str {
        &self.facade
    }

    pub fn base(&self) -> &BasePath {
        &self.base
    }

    fn is_facade_entry(&self, frame: &RawFrame) -> bool {
        frame.call_type == Some(CallType::Static)
            && frame.class.as_deref() == Some(self.facade.as_str())
            && frame.function.starts_with("log")
    }

    /// Find the call site in `stack` and record up to `max_frames` caller
    /// frames after it.
    ///
    /// Each boundary frame with a known location replaces the call site.
    /// When frames are being recorded, a later boundary also discards what
    /// was recorded so far and recording starts again after it.
    pub fn capture(&self, stack: &dyn StackProvider, max_frames: usize) -> Capture {
        let mut call_site = None;
        let mut recorded: Vec<RawFrame> = Vec::new();
        let mut next_is_first = false;
        let mut recording = false;

        for frame in stack.frames() {
            let boundary = (next_is_first && frame.function == LOG_EXCEPTION)
                || self.is_facade_entry(&frame);

            if boundary {
                if let (Some(file), Some(line)) = (frame.file.as_deref(), frame.line) {
                    call_site = Some(CallSite {
                        file: self.base.relative(file).to_string(),
                        line,
                    });
                    if max_frames > 0 {
                        recorded.clear();
                    } else if next_is_first {
                        break;
                    } else {
                        continue;
                    }
                }

                if frame.function == LOG_EXCEPTION {
                    break;
                }

                next_is_first = true;
                recording = true;
                continue;
            }

            if recording {
                if recorded.len() >= max_frames {
                    break;
                }
                recorded.push(frame);
            }
        }

        Capture {
            call_site,
            frames: recorded
                .iter()
                .map(|raw| BacktraceFrame::from_raw(raw, &self.base))
                .collect(),
        }
    }
}
