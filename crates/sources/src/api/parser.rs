//! Parsing and validation of model-written API calls.

use crate::fenced::extract_block;
use relay_core::{AppError, AppResult};
use serde::Deserialize;

/// The only program the command mode executes.
pub const COMMAND_PROGRAM: &str = "curl";

/// Unquoted shell control characters; there is no shell, so their presence
/// means the model wrote something other than a single request.
const SHELL_OPERATORS: [char; 5] = ['|', ';', '>', '<', '`'];

/// Whether a curl option takes a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    Flag,
    Value,
}

/// Short options a request may use. Everything else is rejected, which
/// keeps out the options that read or write local files.
fn short_option(c: char) -> Option<Arity> {
    match c {
        's' | 'S' | 'i' | 'L' | 'G' | 'I' | 'k' | 'f' | 'v' => Some(Arity::Flag),
        'X' | 'H' | 'd' | 'F' | 'A' | 'm' | 'u' | 'e' => Some(Arity::Value),
        _ => None,
    }
}

fn long_option(name: &str) -> Option<Arity> {
    match name {
        "silent" | "show-error" | "include" | "location" | "get" | "head" | "insecure"
        | "fail" | "verbose" | "compressed" | "http1.1" | "http2" => Some(Arity::Flag),
        "request" | "header" | "data" | "data-raw" | "data-binary" | "data-ascii"
        | "data-urlencode" | "json" | "form" | "form-string" | "user-agent" | "max-time"
        | "connect-timeout" | "user" | "referer" | "url" => Some(Arity::Value),
        _ => None,
    }
}

/// Extract the command from model output.
///
/// Output starting with `curl` is taken as-is; otherwise the first fenced
/// `bash`/`sh` block is used. `None` means the model answered in prose.
pub fn parse_command(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let is_command = trimmed
        .get(..COMMAND_PROGRAM.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(COMMAND_PROGRAM))
        && trimmed[COMMAND_PROGRAM.len()..]
            .chars()
            .next()
            .map_or(true, char::is_whitespace);
    if is_command {
        return Some(trimmed.to_string());
    }

    extract_block(trimmed, &["bash", "sh", "shell"])
}

/// Split a command into argv and check it is a single, file-free curl call.
pub fn command_argv(command: &str) -> AppResult<Vec<String>> {
    let argv = shell_words::split(command)
        .map_err(|e| AppError::Api(format!("Invalid command syntax: {}", e)))?;

    let program = argv
        .first()
        .ok_or_else(|| AppError::Api("Empty command".to_string()))?;
    if program != COMMAND_PROGRAM {
        return Err(AppError::Api(format!(
            "Only {} commands can be executed, got '{}'",
            COMMAND_PROGRAM, program
        )));
    }

    if let Some(op) = unquoted_operator(command) {
        return Err(AppError::Api(format!("Shell operator '{}' is not allowed", op)));
    }
    if command.contains("$(") {
        return Err(AppError::Api("Command substitution is not allowed".to_string()));
    }

    let mut args = argv.iter().skip(1).map(String::as_str);
    let mut options_done = false;
    while let Some(arg) = args.next() {
        if options_done || arg == "-" || !arg.starts_with('-') {
            check_url(arg)?;
        } else if arg == "--" {
            options_done = true;
        } else if let Some(long) = arg.strip_prefix("--") {
            let (name, inline) = match long.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (long, None),
            };
            match long_option(name) {
                Some(Arity::Flag) => {}
                Some(Arity::Value) => {
                    let value = inline.or_else(|| args.next()).ok_or_else(|| missing_value(arg))?;
                    check_value(name, value)?;
                }
                None => return Err(AppError::Api(format!("Option '--{}' is not allowed", name))),
            }
        } else {
            // -sSL, -o<file>, -d@<file>
            let cluster = &arg[1..];
            for (i, c) in cluster.char_indices() {
                match short_option(c) {
                    Some(Arity::Flag) => {}
                    Some(Arity::Value) => {
                        let attached = &cluster[i + c.len_utf8()..];
                        let value = if attached.is_empty() {
                            args.next().ok_or_else(|| missing_value(arg))?
                        } else {
                            attached
                        };
                        check_value(&c.to_string(), value)?;
                        break;
                    }
                    None => return Err(AppError::Api(format!("Option '-{}' is not allowed", c))),
                }
            }
        }
    }

    Ok(argv)
}

fn missing_value(option: &str) -> AppError {
    AppError::Api(format!("Option '{}' is missing its value", option))
}

/// Only plain web requests; `file:`, `dict:` and friends reach local data.
fn check_url(url: &str) -> AppResult<()> {
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Ok(())
    } else {
        Err(AppError::Api(format!("Only http(s) URLs are allowed, got '{}'", url)))
    }
}

/// Reject values that make curl read a local file.
fn check_value(option: &str, value: &str) -> AppResult<()> {
    let reads_file = match option {
        "d" | "data" | "data-binary" | "data-ascii" | "json" | "H" | "header" => {
            value.starts_with('@')
        }
        // name@file and @file
        "data-urlencode" => value.split('=').next().unwrap_or(value).contains('@'),
        "F" | "form" => value.starts_with('@') || value.contains("=@") || value.contains("=<"),
        "url" => return check_url(value),
        _ => false,
    };
    if reads_file {
        return Err(AppError::Api(
            "Reading request data from files is not allowed".to_string(),
        ));
    }
    Ok(())
}

fn unquoted_operator(command: &str) -> Option<String> {
    let mut single = false;
    let mut double = false;
    let mut escaped = false;
    let mut chars = command.chars().peekable();

    while let Some(c) = chars.next() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if !single => escaped = true,
            '\'' if !double => single = !single,
            '"' if !single => double = !double,
            _ if single || double => {}
            '&' if chars.peek() == Some(&'&') => return Some("&&".to_string()),
            c if SHELL_OPERATORS.contains(&c) => return Some(c.to_string()),
            _ => {}
        }
    }
    None
}

/// Append `-H "Name: value"` for each configured header.
pub fn with_headers(mut argv: Vec<String>, headers: &[(String, String)]) -> Vec<String> {
    for (name, value) in headers {
        argv.push("-H".to_string());
        argv.push(format!("{}: {}", name, value));
    }
    argv
}

/// Request description written by the model in request mode.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    pub url: String,

    #[serde(default = "default_method", alias = "requestMethod")]
    pub method: String,

    #[serde(default = "default_content_type")]
    pub content_type: String,

    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_content_type() -> String {
    "application/json".to_string()
}

/// Extract a request description: bare JSON or a fenced `json` block.
pub fn parse_request(text: &str) -> Option<ApiRequest> {
    let trimmed = text.trim();
    serde_json::from_str::<ApiRequest>(trimmed)
        .ok()
        .or_else(|| {
            extract_block(trimmed, &["json", ""]).and_then(|b| serde_json::from_str(&b).ok())
        })
        .filter(|r| !r.url.trim().is_empty())
}
