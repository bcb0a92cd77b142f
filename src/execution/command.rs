//! Request building, option parsing, and validation.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ExecuteError;
use crate::Result;

/// Exit statuses considered success by the strict entry point.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawStatus")]
pub enum AcceptedStatus {
    /// Every status is accepted.
    Any,
    /// Only the listed statuses are accepted.
    Codes(BTreeSet<i32>),
}

impl AcceptedStatus {
    /// Accept a single status.
    pub fn code(code: i32) -> Self {
        Self::Codes(BTreeSet::from([code]))
    }

    /// Accept any of the given statuses.
    ///
    /// An empty list accepts nothing and is rejected.
    pub fn codes<I: IntoIterator<Item = i32>>(codes: I) -> Result<Self> {
        let codes: BTreeSet<i32> = codes.into_iter().collect();
        if codes.is_empty() {
            return Err(ExecuteError::InvalidRequest(
                "accepted status set must not be empty".into(),
            ));
        }
        Ok(Self::Codes(codes))
    }

    /// Check whether `status` is accepted.
    pub fn accepts(&self, status: i32) -> bool {
        match self {
            Self::Any => true,
            Self::Codes(codes) => codes.contains(&status),
        }
    }
}

impl Default for AcceptedStatus {
    fn default() -> Self {
        Self::code(0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawStatus {
    Flag(bool),
    Code(i32),
    Codes(Vec<i32>),
}

impl TryFrom<RawStatus> for AcceptedStatus {
    type Error = String;

    fn try_from(raw: RawStatus) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawStatus::Flag(true) => Ok(Self::Any),
            RawStatus::Flag(false) => Err("`status: false` is not a valid status set".into()),
            RawStatus::Code(code) => Ok(Self::code(code)),
            RawStatus::Codes(codes) => Self::codes(codes).map_err(|e| e.to_string()),
        }
    }
}

/// Loosely typed option map, as it arrives from JSON or another caller.
///
/// Unknown keys are rejected during deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunOptions {
    /// Host upon which the command should run.
    pub host: Option<String>,
    /// Text piped to the command's standard input.
    pub stdin: Option<String>,
    /// User to become before running the command.
    pub user: Option<String>,
    /// Time limit in seconds. Zero or negative means already expired.
    pub timeout: Option<f64>,
    /// Accepted exit statuses (strict entry point only).
    pub status: Option<AcceptedStatus>,
    /// Failure message template (strict entry point only).
    pub emsg: Option<String>,
    /// Echo the final command before running it.
    #[serde(default)]
    pub debug: bool,
}

impl RunOptions {
    /// Parse options from a JSON object.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ExecuteError::InvalidRequest(e.to_string()))
    }

    /// Parse options from a string-keyed map of JSON values.
    pub fn from_map(map: HashMap<String, serde_json::Value>) -> Result<Self> {
        let object: serde_json::Map<String, serde_json::Value> = map.into_iter().collect();
        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| ExecuteError::InvalidRequest(e.to_string()))
    }

    /// Validate these options against `command` and build a request.
    ///
    /// The options are copied; `self` is left untouched.
    pub fn to_request(&self, command: impl Into<String>) -> Result<Request> {
        self.to_builder(command)?.build()
    }

    /// Like [`RunOptions::to_request`], but leaves the builder open so the
    /// caller can still attach a binary stdin payload.
    pub fn to_builder(&self, command: impl Into<String>) -> Result<RequestBuilder> {
        let mut builder = Request::builder(command).debug(self.debug);
        if let Some(host) = &self.host {
            builder = builder.host(host.clone());
        }
        if let Some(user) = &self.user {
            builder = builder.user(user.clone());
        }
        if let Some(stdin) = &self.stdin {
            builder = builder.stdin(stdin.clone().into_bytes());
        }
        if let Some(secs) = self.timeout {
            builder = builder.timeout(timeout_from_secs(secs)?);
        }
        if let Some(status) = &self.status {
            builder = builder.status(status.clone());
        }
        if let Some(emsg) = &self.emsg {
            builder = builder.emsg(emsg.clone());
        }
        Ok(builder)
    }
}

/// Convert a seconds value into a time limit.
///
/// Zero and negative values clamp to an already expired limit.
pub fn timeout_from_secs(secs: f64) -> Result<Duration> {
    if secs.is_nan() {
        return Err(ExecuteError::InvalidRequest("timeout must be a number".into()));
    }
    if secs <= 0.0 {
        return Ok(Duration::ZERO);
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|_| ExecuteError::InvalidRequest(format!("timeout out of range: {secs}")))
}

/// A validated, immutable description of one command execution.
#[derive(Debug, Clone)]
pub struct Request {
    command: String,
    stdin: Option<Vec<u8>>,
    user: Option<String>,
    host: Option<String>,
    timeout: Option<Duration>,
    status: Option<AcceptedStatus>,
    emsg: Option<String>,
    debug: bool,
}

impl Request {
    /// Build a request for `command` with no modifiers.
    pub fn new(command: impl Into<String>) -> Result<Self> {
        Self::builder(command).build()
    }

    /// Start building a request for `command`.
    pub fn builder(command: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(command)
    }

    /// The command as given by the caller, before any transformation.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn stdin(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Accepted statuses, if the caller set them explicitly.
    pub fn status(&self) -> Option<&AcceptedStatus> {
        self.status.as_ref()
    }

    /// Failure message template, if the caller set one.
    pub fn emsg(&self) -> Option<&str> {
        self.emsg.as_deref()
    }

    pub fn debug(&self) -> bool {
        self.debug
    }
}

/// Builder for creating requests with a fluent API.
#[derive(Debug, Default)]
pub struct RequestBuilder {
    command: String,
    stdin: Option<Vec<u8>>,
    user: Option<String>,
    host: Option<String>,
    timeout: Option<Duration>,
    status: Option<AcceptedStatus>,
    emsg: Option<String>,
    debug: bool,
}

impl RequestBuilder {
    /// Create a new request builder.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Set the payload written to standard input.
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Run as another user.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Run on another host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the execution time limit.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Set the accepted exit statuses.
    pub fn status(mut self, status: AcceptedStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the failure message template.
    pub fn emsg(mut self, message: impl Into<String>) -> Self {
        self.emsg = Some(message.into());
        self
    }

    /// Echo the final command before running it.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Validate and build the request.
    pub fn build(self) -> Result<Request> {
        if self.command.trim().is_empty() {
            return Err(ExecuteError::InvalidRequest("command must not be empty".into()));
        }
        if self.command.contains('\0') {
            return Err(ExecuteError::InvalidRequest(
                "command must not contain NUL bytes".into(),
            ));
        }
        if let Some(user) = &self.user {
            validate_token("user", user)?;
        }
        if let Some(host) = &self.host {
            validate_token("host", host)?;
        }

        Ok(Request {
            command: self.command,
            stdin: self.stdin,
            user: self.user,
            host: self.host,
            timeout: self.timeout,
            status: self.status,
            emsg: self.emsg,
            debug: self.debug,
        })
    }
}

/// User and host names are spliced into shell text unquoted, so only a
/// conservative character set is allowed. Empty means "not set".
///
/// A leading `-` would be read by `ssh` or `sudo` as an option.
fn validate_token(name: &str, value: &str) -> Result<()> {
    if value.starts_with('-') {
        return Err(ExecuteError::InvalidRequest(format!(
            "{name} {value:?} must not start with '-'"
        )));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || "._-@:%[]+".contains(c);
    match value.chars().find(|c| !allowed(*c)) {
        None => Ok(()),
        Some(c) => Err(ExecuteError::InvalidRequest(format!(
            "{name} {value:?} contains disallowed character {c:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_new() {
        let request = Request::new("ls -la").unwrap();
        assert_eq!(request.command(), "ls -la");
        assert!(request.stdin().is_none());
        assert!(request.user().is_none());
        assert!(request.host().is_none());
        assert!(request.timeout().is_none());
        assert!(request.status().is_none());
        assert!(!request.debug());
    }

    #[test]
    fn test_request_builder_chain() {
        let request = Request::builder("uptime")
            .host("db1.example.com")
            .user("deploy")
            .stdin("input")
            .timeout(Duration::from_secs(60))
            .status(AcceptedStatus::code(3))
            .emsg("uptime failed")
            .debug(true)
            .build()
            .unwrap();

        assert_eq!(request.host(), Some("db1.example.com"));
        assert_eq!(request.user(), Some("deploy"));
        assert_eq!(request.stdin(), Some(&b"input"[..]));
        assert_eq!(request.timeout(), Some(Duration::from_secs(60)));
        assert_eq!(request.status(), Some(&AcceptedStatus::code(3)));
        assert_eq!(request.emsg(), Some("uptime failed"));
        assert!(request.debug());
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(matches!(
            Request::new(""),
            Err(ExecuteError::InvalidRequest(_))
        ));
        assert!(Request::new("   ").is_err());
    }

    #[test]
    fn test_empty_user_and_host_allowed() {
        let request = Request::builder("pwd").user("").host("").build().unwrap();
        assert_eq!(request.user(), Some(""));
        assert_eq!(request.host(), Some(""));
    }

    #[test]
    fn test_metacharacters_in_host_rejected() {
        assert!(Request::builder("pwd").host("a;rm -rf /").build().is_err());
        assert!(Request::builder("pwd").host("a b").build().is_err());
        assert!(Request::builder("pwd").user("$(id)").build().is_err());
        assert!(Request::builder("pwd").host("[::1]").build().is_ok());
        assert!(Request::builder("pwd").host("admin@10.0.0.5").build().is_ok());
    }

    #[test]
    fn test_option_like_tokens_rejected() {
        assert!(Request::builder("pwd").host("-v").build().is_err());
        assert!(Request::builder("pwd").host("-Elog").build().is_err());
        assert!(Request::builder("pwd").user("-u").build().is_err());
        // dashes inside a name are fine
        assert!(Request::builder("pwd").host("web-1").user("svc-app").build().is_ok());
    }

    #[test]
    fn test_builder_accepts_binary_stdin_after_options() {
        let options = RunOptions::from_json(r#"{"user": "deploy"}"#).unwrap();
        let request = options
            .to_builder("cat")
            .unwrap()
            .stdin(vec![0xff, 0xfe, b'a'])
            .build()
            .unwrap();
        assert_eq!(request.stdin(), Some(&[0xff, 0xfe, b'a'][..]));
        assert_eq!(request.user(), Some("deploy"));
    }

    #[test]
    fn test_options_unknown_key_rejected() {
        let err = RunOptions::from_json(r#"{"bogus": "BOGUS"}"#).unwrap_err();
        assert!(matches!(err, ExecuteError::InvalidRequest(_)));
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_options_not_an_object_rejected() {
        assert!(RunOptions::from_json(r#""ls""#).is_err());
        assert!(RunOptions::from_json("[1, 2]").is_err());
    }

    #[test]
    fn test_options_full_surface() {
        let options = RunOptions::from_json(
            r#"{
                "host": "web1",
                "stdin": "line 1\nline 2",
                "user": "deploy",
                "timeout": 1.5,
                "status": [0, 2],
                "emsg": "failed",
                "debug": true
            }"#,
        )
        .unwrap();

        let request = options.to_request("cat -").unwrap();
        assert_eq!(request.host(), Some("web1"));
        assert_eq!(request.stdin(), Some(&b"line 1\nline 2"[..]));
        assert_eq!(request.timeout(), Some(Duration::from_millis(1500)));
        assert!(request.status().unwrap().accepts(2));
        assert!(!request.status().unwrap().accepts(1));
        assert!(request.debug());
    }

    #[test]
    fn test_options_left_untouched() {
        let options = RunOptions::from_json(r#"{"user": "deploy", "timeout": 2}"#).unwrap();
        let first = options.to_request("id").unwrap();
        let second = options.to_request("id").unwrap();
        assert_eq!(options.user.as_deref(), Some("deploy"));
        assert_eq!(first.user(), second.user());
        assert_eq!(first.timeout(), second.timeout());
    }

    #[test]
    fn test_status_forms() {
        let any: AcceptedStatus = serde_json::from_str("true").unwrap();
        assert_eq!(any, AcceptedStatus::Any);
        assert!(any.accepts(255));

        let single: AcceptedStatus = serde_json::from_str("3").unwrap();
        assert!(single.accepts(3));
        assert!(!single.accepts(0));

        let many: AcceptedStatus = serde_json::from_str("[1, 2]").unwrap();
        assert!(many.accepts(1) && many.accepts(2));
    }

    #[test]
    fn test_malformed_status_rejected() {
        assert!(serde_json::from_str::<AcceptedStatus>("false").is_err());
        assert!(serde_json::from_str::<AcceptedStatus>("[]").is_err());
        assert!(serde_json::from_str::<AcceptedStatus>(r#""zero""#).is_err());
        assert!(RunOptions::from_json(r#"{"status": "yes"}"#).is_err());
    }

    #[test]
    fn test_default_status_is_zero() {
        let status = AcceptedStatus::default();
        assert!(status.accepts(0));
        assert!(!status.accepts(1));
    }

    #[test]
    fn test_timeout_from_secs() {
        assert_eq!(timeout_from_secs(0.0).unwrap(), Duration::ZERO);
        assert_eq!(timeout_from_secs(-3.0).unwrap(), Duration::ZERO);
        assert_eq!(timeout_from_secs(2.0).unwrap(), Duration::from_secs(2));
        assert!(timeout_from_secs(f64::NAN).is_err());
        assert!(timeout_from_secs(f64::INFINITY).is_err());
    }

    #[test]
    fn test_from_map() {
        let mut map = HashMap::new();
        map.insert("host".to_string(), serde_json::json!("localhost"));
        let options = RunOptions::from_map(map).unwrap();
        assert_eq!(options.host.as_deref(), Some("localhost"));

        let mut bad = HashMap::new();
        bad.insert("hosts".to_string(), serde_json::json!("x"));
        assert!(RunOptions::from_map(bad).is_err());
    }
}
