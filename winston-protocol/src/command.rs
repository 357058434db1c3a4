use std::sync::OnceLock;

use crate::channel::Scnl;
use crate::error::{Result, WinstonError};
use crate::time::TimeSpan;

/// How many positional arguments name the channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScnlForm {
    /// station, channel, network; location defaults to `--`
    Scn,
    /// station, channel, network, location
    Scnl,
}

impl ScnlForm {
    pub fn arg_count(self) -> usize {
        match self {
            Self::Scn => 3,
            Self::Scnl => 4,
        }
    }
}

/// A parsed WWS request line: `<cmd>[:] <id> [args...]`.
///
/// The SCNL and time span views are derived on first use and memoized.
#[derive(Clone, Debug)]
pub struct Command {
    name: String,
    id: String,
    args: Vec<String>,
    scnl: OnceLock<Scnl>,
    span: OnceLock<TimeSpan>,
}

impl Command {
    pub fn new(name: &str, id: &str, args: Vec<String>) -> Self {
        Self {
            name: name.trim_end_matches(':').to_uppercase(),
            id: id.to_owned(),
            args,
            scnl: OnceLock::new(),
            span: OnceLock::new(),
        }
    }

    /// Parse a request line. The trailing newline is optional.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches('\n').trim_end_matches('\r');
        let mut tokens = line.split(' ').filter(|t| !t.is_empty());

        let raw_name = tokens
            .next()
            .ok_or_else(|| WinstonError::MalformedCommand("empty command".into()))?;
        let name = raw_name.strip_suffix(':').unwrap_or(raw_name);
        if name.is_empty() {
            return Err(WinstonError::MalformedCommand(format!(
                "missing command name: {line:?}"
            )));
        }
        let id = tokens.next().ok_or_else(|| {
            WinstonError::MalformedCommand(format!("{name}: missing request id"))
        })?;
        let args = tokens.map(str::to_owned).collect();

        Ok(Self {
            name: name.to_uppercase(),
            id: id.to_owned(),
            args,
            scnl: OnceLock::new(),
            span: OnceLock::new(),
        })
    }

    /// Upper-cased command name without the trailing colon.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request id, echoed verbatim in the response header.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Positional argument; negative indices count from the end (`-1` = last).
    pub fn arg(&self, index: isize) -> Result<&str> {
        self.opt_arg(index).ok_or_else(|| {
            WinstonError::MalformedCommand(format!(
                "{}: missing argument {index} (have {})",
                self.name,
                self.args.len()
            ))
        })
    }

    pub fn opt_arg(&self, index: isize) -> Option<&str> {
        let resolved = if index < 0 {
            self.args.len().checked_sub(index.unsigned_abs())?
        } else {
            index as usize
        };
        self.args.get(resolved).map(String::as_str)
    }

    pub fn get_int(&self, index: isize) -> Result<i32> {
        let token = self.arg(index)?;
        token.parse::<i32>().map_err(|_| {
            WinstonError::MalformedCommand(format!(
                "{}: argument {index} is not an integer: {token:?}",
                self.name
            ))
        })
    }

    pub fn get_double(&self, index: isize) -> Result<f64> {
        let token = self.arg(index)?;
        match token.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(WinstonError::MalformedCommand(format!(
                "{}: argument {index} is not a number: {token:?}",
                self.name
            ))),
        }
    }

    /// `0`/`1` style flag.
    pub fn get_flag(&self, index: isize) -> Result<bool> {
        let token = self.arg(index)?;
        match token {
            "1" => Ok(true),
            "0" => Ok(false),
            t if t.eq_ignore_ascii_case("true") => Ok(true),
            t if t.eq_ignore_ascii_case("false") => Ok(false),
            _ => Err(WinstonError::MalformedCommand(format!(
                "{}: argument {index} is not a flag: {token:?}",
                self.name
            ))),
        }
    }

    /// SCN vs SCNL, from the command name or else from the argument count.
    pub fn scnl_form(&self) -> Result<ScnlForm> {
        if self.name.contains("SCNL") {
            Ok(ScnlForm::Scnl)
        } else if self.name.contains("SCN") {
            Ok(ScnlForm::Scn)
        } else if self.args.len() >= 4 {
            Ok(ScnlForm::Scnl)
        } else if self.args.len() == 3 {
            Ok(ScnlForm::Scn)
        } else {
            Err(WinstonError::MalformedCommand(format!(
                "{}: too few arguments for a channel ({})",
                self.name,
                self.args.len()
            )))
        }
    }

    pub fn scnl(&self) -> Result<&Scnl> {
        if let Some(scnl) = self.scnl.get() {
            return Ok(scnl);
        }
        let form = self.scnl_form()?;
        if self.args.len() < form.arg_count() {
            return Err(WinstonError::MalformedCommand(format!(
                "{}: expected {} channel arguments, got {}",
                self.name,
                form.arg_count(),
                self.args.len()
            )));
        }
        let scnl = match form {
            ScnlForm::Scn => Scnl::scn(&self.args[0], &self.args[1], &self.args[2]),
            ScnlForm::Scnl => {
                Scnl::new(&self.args[0], &self.args[1], &self.args[2], &self.args[3])
            }
        };
        Ok(self.scnl.get_or_init(|| scnl))
    }

    /// The two arguments immediately following the channel block.
    pub fn time_span(&self) -> Result<TimeSpan> {
        if let Some(span) = self.span.get() {
            return Ok(*span);
        }
        let offset = self.scnl_form()?.arg_count() as isize;
        if self.args.len() < offset as usize + 2 {
            return Err(WinstonError::MalformedCommand(format!(
                "{}: missing time span",
                self.name
            )));
        }
        let start = self.get_double(offset)?;
        let end = self.get_double(offset + 1)?;
        if end < start {
            return Err(WinstonError::MalformedCommand(format!(
                "{}: end time {end} precedes start time {start}",
                self.name
            )));
        }
        Ok(*self.span.get_or_init(|| TimeSpan::new(start, end)))
    }

    /// Arguments after the channel block and time span.
    pub fn extra_args(&self) -> Result<&[String]> {
        let offset = self.scnl_form()?.arg_count() + 2;
        Ok(self.args.get(offset..).unwrap_or(&[]))
    }

    /// Serialize to a wire line including the trailing newline.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut line = format!("{}: {}", self.name, self.id);
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line.push('\n');
        line.into_bytes()
    }
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.id == other.id && self.args == other.args
    }
}
